//! build_supercell：按整数缩放矩阵构造超胞，以内容哈希 id 存入缓存

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::store::{StructureRecord, StructureStore};
use crate::structure::supercell::ScalingSpec;
use crate::structure::{make_supercell, ScalingMatrix};
use crate::tools::{extend_payload, parse_args, record_payload, resolve_record, schema_of, Tool, ToolError};

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct SupercellParameters {
    /// 标量、对角三元组或 3x3 整数矩阵，默认 2（即 diag(2,2,2)）
    #[serde(default)]
    pub scaling_matrix: ScalingSpec,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SupercellArgs {
    pub bulk_structure_uri: String,
    #[serde(default)]
    pub supercell_parameters: SupercellParameters,
}

pub struct BuildSupercellTool;

#[async_trait]
impl Tool for BuildSupercellTool {
    fn name(&self) -> &str {
        "build_supercell"
    }

    fn description(&self) -> &str {
        "Build a supercell of a stored structure. supercell_parameters.scaling_matrix may be an integer, \
         a diagonal [a, b, c] or a full 3x3 integer matrix (default 2)."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SupercellArgs>()
    }

    async fn execute(&self, store: &mut StructureStore, args: Value) -> Result<Value, ToolError> {
        let args: SupercellArgs = parse_args(args)?;
        let scaling = ScalingMatrix::from(args.supercell_parameters.scaling_matrix);
        let bulk = resolve_record(store, &args.bulk_structure_uri).await?;
        let original_atoms = bulk.structure.len();
        let source_id = bulk.structure_id.clone();

        let supercell = make_supercell(&bulk.structure, &scaling).map_err(|e| ToolError::Invalid(e.to_string()))?;
        let record = StructureRecord::derived(supercell);
        let payload = extend_payload(
            record_payload(&record),
            json!({
                "source_structure_id": source_id,
                "original_atoms": original_atoms,
                "supercell_atoms": record.structure.len(),
                "scaling_matrix": scaling.0,
                "determinant": scaling.determinant(),
            }),
        );
        store.put(record);
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::upstream::FixtureUpstream;

    #[tokio::test]
    async fn test_default_scaling_multiplies_atoms_by_eight() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let out = BuildSupercellTool
            .execute(&mut store, json!({"bulk_structure_uri": "structure://mp_mp-149"}))
            .await
            .unwrap();
        assert_eq!(out["original_atoms"], 2);
        assert_eq!(out["supercell_atoms"], 16);
        assert_eq!(out["num_sites"], 16);
        let id = out["structure_id"].as_str().unwrap();
        assert!(store.get(id).is_some());
    }

    #[tokio::test]
    async fn test_full_matrix_and_singular_matrix() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let out = BuildSupercellTool
            .execute(
                &mut store,
                json!({
                    "bulk_structure_uri": "mp_mp-149",
                    "supercell_parameters": {"scaling_matrix": [[1, 1, 0], [-1, 1, 0], [0, 0, 1]]}
                }),
            )
            .await
            .unwrap();
        assert_eq!(out["supercell_atoms"], 4);

        let err = BuildSupercellTool
            .execute(
                &mut store,
                json!({
                    "bulk_structure_uri": "mp_mp-149",
                    "supercell_parameters": {"scaling_matrix": [1, 0, 1]}
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_skewed_matrix_is_invalid_payload() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let started = std::time::Instant::now();
        let err = BuildSupercellTool
            .execute(
                &mut store,
                json!({
                    "bulk_structure_uri": "mp_mp-149",
                    "supercell_parameters": {
                        "scaling_matrix": [[1, 100000, 100000], [0, 1, 100000], [0, 0, 1]]
                    }
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Invalid(_)));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_bulk_structure() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let err = BuildSupercellTool
            .execute(&mut store, json!({"bulk_structure_uri": "structure://nothing-here"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
