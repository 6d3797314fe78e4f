//! select_material_by_id：按 material_id 取结构与性质，存入缓存（id = "mp_" + material_id）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::store::{material_structure_id, StructureStore};
use crate::tools::{parse_args, record_payload, schema_of, Tool, ToolError};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SelectArgs {
    /// 上游 material_id，如 "mp-149"
    pub material_id: String,
}

pub struct SelectMaterialTool;

#[async_trait]
impl Tool for SelectMaterialTool {
    fn name(&self) -> &str {
        "select_material_by_id"
    }

    fn description(&self) -> &str {
        "Load a material by its material_id (e.g. mp-149) and keep its structure for later tools. \
         Returns structure_id, structure_uri, formula, number of sites, properties and a description."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SelectArgs>()
    }

    async fn execute(&self, store: &mut StructureStore, args: Value) -> Result<Value, ToolError> {
        let args: SelectArgs = parse_args(args)?;
        let material_id = args.material_id.trim();
        if material_id.is_empty() {
            return Err(ToolError::Invalid("material_id must not be empty".into()));
        }
        let structure_id = material_structure_id(material_id);
        match store.resolve(&structure_id).await? {
            Some(record) => Ok(record_payload(record)),
            None => Err(ToolError::NotFound(format!("Material {material_id} not found"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::upstream::FixtureUpstream;

    #[tokio::test]
    async fn test_select_stores_deterministic_id() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let first = SelectMaterialTool
            .execute(&mut store, json!({"material_id": "mp-149"}))
            .await
            .unwrap();
        let second = SelectMaterialTool
            .execute(&mut store, json!({"material_id": "mp-149"}))
            .await
            .unwrap();
        assert_eq!(first["structure_id"], "mp_mp-149");
        assert_eq!(first["structure_uri"], "structure://mp_mp-149");
        assert_eq!(first["structure_id"], second["structure_id"]);
        assert_eq!(first["num_sites"], 2);
        assert_eq!(first["properties"]["crystal_system"], "Cubic");
        assert!(store.get("mp_mp-149").is_some());
    }

    #[tokio::test]
    async fn test_select_unknown_and_bad_args() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let err = SelectMaterialTool
            .execute(&mut store, json!({"material_id": "mp-0"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));

        let err = SelectMaterialTool.execute(&mut store, json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
