//! plot_structure：渲染 PNG（base64）；结构不存在时不报错，返回空图与 found=false

use async_trait::async_trait;
use base64::Engine;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::store::{structure_id_from_uri, StructureStore};
use crate::structure::render::MAX_DUPLICATION;
use crate::structure::{render_png, RenderOptions};
use crate::tools::{parse_args, schema_of, Tool, ToolError};

const MIME_PNG: &str = "image/png";

fn default_duplication() -> [u32; 3] {
    [1, 1, 1]
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlotArgs {
    /// structure://<id> 或裸 id
    pub structure_uri: String,
    /// 沿 a、b、c 的重复次数
    #[serde(default = "default_duplication")]
    pub duplication: [u32; 3],
}

pub struct PlotStructureTool {
    size: u32,
}

impl PlotStructureTool {
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

#[async_trait]
impl Tool for PlotStructureTool {
    fn name(&self) -> &str {
        "plot_structure"
    }

    fn description(&self) -> &str {
        "Render a stored structure as a PNG image (base64). Duplication repeats the cell along a, b, c."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<PlotArgs>()
    }

    async fn execute(&self, store: &mut StructureStore, args: Value) -> Result<Value, ToolError> {
        let args: PlotArgs = parse_args(args)?;
        if args.duplication.iter().any(|n| *n == 0 || *n > MAX_DUPLICATION) {
            return Err(ToolError::Invalid(format!(
                "duplication entries must be between 1 and {MAX_DUPLICATION}"
            )));
        }
        let structure_id = structure_id_from_uri(&args.structure_uri).to_string();
        let record = match store.resolve(&structure_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(empty_image(&structure_id, "structure not found")),
            Err(e) => {
                tracing::warn!(structure_id = %structure_id, error = %e, "plot: upstream reload failed");
                return Ok(empty_image(&structure_id, &e.to_string()));
            }
        };
        let options = RenderOptions {
            size: self.size,
            duplication: args.duplication,
        };
        let png = render_png(&record.structure, &options).map_err(|e| ToolError::Internal(e.to_string()))?;
        Ok(json!({
            "structure_id": structure_id,
            "mime_type": MIME_PNG,
            "data": base64::engine::general_purpose::STANDARD.encode(png),
            "found": true,
            "duplication": args.duplication,
        }))
    }
}

fn empty_image(structure_id: &str, message: &str) -> Value {
    json!({
        "structure_id": structure_id,
        "mime_type": MIME_PNG,
        "data": "",
        "found": false,
        "message": message,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::upstream::FixtureUpstream;

    #[tokio::test]
    async fn test_plot_found_and_missing() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let tool = PlotStructureTool::new(96);
        let out = tool
            .execute(&mut store, json!({"structure_uri": "structure://mp_mp-149", "duplication": [2, 1, 1]}))
            .await
            .unwrap();
        assert_eq!(out["found"], true);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(out["data"].as_str().unwrap())
            .unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let out = tool
            .execute(&mut store, json!({"structure_uri": "structure://ffffffffffff"}))
            .await
            .unwrap();
        assert_eq!(out["found"], false);
        assert_eq!(out["data"], "");
    }

    #[tokio::test]
    async fn test_plot_rejects_zero_duplication() {
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));
        let err = PlotStructureTool::new(96)
            .execute(&mut store, json!({"structure_uri": "mp_mp-149", "duplication": [0, 1, 1]}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Invalid(_)));
    }
}
