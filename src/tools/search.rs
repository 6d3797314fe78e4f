//! search_materials_by_formula：按化学式检索上游，返回候选摘要
//!
//! 摘要里的 structure_uri 无需先 select 即可使用，缓存未命中时由 StructureStore 惰性拉取。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::store::{material_structure_id, structure_uri, StructureStore};
use crate::tools::{parse_args, schema_of, Tool, ToolError};
use crate::upstream::MaterialDoc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// 化学式，如 "Si"、"MoS2"
    pub chemical_formula: String,
}

pub struct SearchMaterialsTool {
    max_results: usize,
}

impl SearchMaterialsTool {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results: max_results.max(1),
        }
    }
}

fn summary(doc: &MaterialDoc) -> Value {
    let structure_id = material_structure_id(&doc.material_id);
    json!({
        "material_id": doc.material_id,
        "formula": doc.formula,
        "band_gap": doc.properties.band_gap,
        "formation_energy": doc.properties.formation_energy,
        "crystal_system": doc.properties.crystal_system,
        "space_group": doc.space_group,
        "structure_uri": structure_uri(&structure_id),
        "structure_id": structure_id,
    })
}

#[async_trait]
impl Tool for SearchMaterialsTool {
    fn name(&self) -> &str {
        "search_materials_by_formula"
    }

    fn description(&self) -> &str {
        "Search the materials database by chemical formula. Returns candidate materials with material_id, \
         formula, band gap, formation energy, crystal system and a structure_uri usable by the other tools."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SearchArgs>()
    }

    async fn execute(&self, store: &mut StructureStore, args: Value) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_args(args)?;
        let formula = args.chemical_formula.trim();
        if formula.is_empty() {
            return Err(ToolError::Invalid("chemical_formula must not be empty".into()));
        }
        let docs = store
            .upstream()
            .search_by_formula(formula, self.max_results)
            .await?;
        let materials: Vec<Value> = docs.iter().take(self.max_results).map(summary).collect();
        Ok(json!({
            "formula": formula,
            "count": materials.len(),
            "materials": materials,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::upstream::FixtureUpstream;

    #[tokio::test]
    async fn test_search_returns_summaries_without_storing() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let out = SearchMaterialsTool::new(10)
            .execute(&mut store, json!({"chemical_formula": "GaAs"}))
            .await
            .unwrap();
        assert_eq!(out["count"], 1);
        let hit = &out["materials"][0];
        assert_eq!(hit["material_id"], "mp-2534");
        assert_eq!(hit["structure_uri"], "structure://mp_mp-2534");
        assert_eq!(hit["space_group"], "F-43m");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_search_no_hits_and_upstream_failure() {
        let upstream = Arc::new(FixtureUpstream::new());
        let mut store = StructureStore::new(upstream.clone());
        let tool = SearchMaterialsTool::new(10);
        let out = tool
            .execute(&mut store, json!({"chemical_formula": "Xe"}))
            .await
            .unwrap();
        assert_eq!(out["count"], 0);

        upstream.set_failing(true);
        let err = tool
            .execute(&mut store, json!({"chemical_formula": "Si"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Upstream(_)));
    }
}
