//! create_structure_from_poscar / create_structure_from_cif：解析文本并以内容哈希 id 存入缓存

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::store::{StructureRecord, StructureStore};
use crate::structure::{Structure, StructureError};
use crate::tools::{parse_args, record_payload, schema_of, Tool, ToolError};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PoscarArgs {
    /// POSCAR 文件内容
    pub poscar_str: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CifArgs {
    /// CIF 文件内容
    pub cif_str: String,
}

fn store_parsed(store: &mut StructureStore, parsed: Result<Structure, StructureError>) -> Result<Value, ToolError> {
    let structure = parsed.map_err(|e| ToolError::Invalid(e.to_string()))?;
    let record = StructureRecord::derived(structure);
    let payload = record_payload(&record);
    store.put(record);
    Ok(payload)
}

pub struct CreateFromPoscarTool;

#[async_trait]
impl Tool for CreateFromPoscarTool {
    fn name(&self) -> &str {
        "create_structure_from_poscar"
    }

    fn description(&self) -> &str {
        "Create a structure from POSCAR text (VASP 4/5, direct or cartesian coordinates)."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<PoscarArgs>()
    }

    async fn execute(&self, store: &mut StructureStore, args: Value) -> Result<Value, ToolError> {
        let args: PoscarArgs = parse_args(args)?;
        store_parsed(store, Structure::from_poscar(&args.poscar_str))
    }
}

pub struct CreateFromCifTool;

#[async_trait]
impl Tool for CreateFromCifTool {
    fn name(&self) -> &str {
        "create_structure_from_cif"
    }

    fn description(&self) -> &str {
        "Create a structure from CIF text; listed symmetry operations are expanded."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CifArgs>()
    }

    async fn execute(&self, store: &mut StructureStore, args: Value) -> Result<Value, ToolError> {
        let args: CifArgs = parse_args(args)?;
        store_parsed(store, Structure::from_cif(&args.cif_str))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::structure::silicon_primitive;
    use crate::upstream::FixtureUpstream;

    #[tokio::test]
    async fn test_poscar_import_uses_content_hash() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let poscar = silicon_primitive().to_poscar();
        let first = CreateFromPoscarTool
            .execute(&mut store, json!({"poscar_str": poscar}))
            .await
            .unwrap();
        let second = CreateFromPoscarTool
            .execute(&mut store, json!({"poscar_str": poscar}))
            .await
            .unwrap();
        let id = first["structure_id"].as_str().unwrap();
        assert_eq!(id.len(), 12);
        assert_eq!(first["structure_id"], second["structure_id"]);
        assert!(first["material_id"].is_null());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cif_import_and_parse_failure() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let cif = silicon_primitive().to_cif();
        let out = CreateFromCifTool
            .execute(&mut store, json!({"cif_str": cif}))
            .await
            .unwrap();
        assert_eq!(out["num_sites"], 2);
        assert_eq!(out["formula"], "Si");

        let err = CreateFromCifTool
            .execute(&mut store, json!({"cif_str": "data_empty\n"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_poscar_with_oversized_count_is_invalid() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let poscar = "Si\n1.0\n5 0 0\n0 5 0\n0 0 5\nSi\n4000000000\nDirect\n0 0 0\n";
        let err = CreateFromPoscarTool
            .execute(&mut store, json!({"poscar_str": poscar}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Invalid(_)));
        assert_eq!(err.kind(), "invalid");
        assert!(store.is_empty());
    }
}
