//! get_structure_data：把缓存中的结构导出为 POSCAR 或 CIF 文本

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::store::StructureStore;
use crate::tools::{parse_args, resolve_record, schema_of, Tool, ToolError};

/// 结构文本格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StructureFormat {
    #[default]
    Poscar,
    Cif,
}

impl StructureFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureFormat::Poscar => "poscar",
            StructureFormat::Cif => "cif",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExportArgs {
    /// structure://<id> 或裸 id
    pub structure_uri: String,
    #[serde(default)]
    pub format: StructureFormat,
}

pub struct GetStructureDataTool;

#[async_trait]
impl Tool for GetStructureDataTool {
    fn name(&self) -> &str {
        "get_structure_data"
    }

    fn description(&self) -> &str {
        "Export a stored structure as POSCAR (default) or CIF text."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ExportArgs>()
    }

    async fn execute(&self, store: &mut StructureStore, args: Value) -> Result<Value, ToolError> {
        let args: ExportArgs = parse_args(args)?;
        let record = resolve_record(store, &args.structure_uri).await?;
        let content = match args.format {
            StructureFormat::Poscar => record.structure.to_poscar(),
            StructureFormat::Cif => record.structure.to_cif(),
        };
        Ok(json!({
            "structure_id": record.structure_id,
            "format": args.format.as_str(),
            "content": content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::upstream::FixtureUpstream;

    #[tokio::test]
    async fn test_export_reloads_material_structures() {
        let upstream = Arc::new(FixtureUpstream::new());
        let mut store = StructureStore::new(upstream.clone());
        let out = GetStructureDataTool
            .execute(&mut store, json!({"structure_uri": "structure://mp_mp-149"}))
            .await
            .unwrap();
        assert_eq!(out["format"], "poscar");
        assert!(out["content"].as_str().unwrap().contains("Si"));
        assert_eq!(upstream.fetch_count(), 1);

        let cif = GetStructureDataTool
            .execute(&mut store, json!({"structure_uri": "mp_mp-149", "format": "cif"}))
            .await
            .unwrap();
        assert!(cif["content"].as_str().unwrap().contains("_cell_length_a"));
        assert_eq!(upstream.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_export_missing_and_bad_format() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let err = GetStructureDataTool
            .execute(&mut store, json!({"structure_uri": "structure://0123456789ab"}))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::NotFound("Structure 0123456789ab not found".into()));

        let err = GetStructureDataTool
            .execute(&mut store, json!({"structure_uri": "mp_mp-149", "format": "xyz"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
