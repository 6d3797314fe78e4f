//! moire_homobilayer：同质双层（第二层绕堆叠轴扭转），以内容哈希 id 存入缓存
//!
//! 几何失败时退回简单堆叠，payload 的 method 与 diagnostics 说明走了哪条路径。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::store::{StructureRecord, StructureStore};
use crate::structure::{build_moire_bilayer, MoireParams};
use crate::tools::{extend_payload, parse_args, record_payload, resolve_record, schema_of, Tool, ToolError};

fn default_max_num_atoms() -> usize {
    10
}

fn default_vacuum_thickness() -> f64 {
    15.0
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MoireArgs {
    pub bulk_structure_uri: String,
    /// 层间距（Å）
    pub interlayer_spacing: f64,
    /// 原子数上限
    #[serde(default = "default_max_num_atoms")]
    pub max_num_atoms: usize,
    /// 扭转角（度）
    #[serde(default)]
    pub twist_angle: f64,
    /// 真空层厚度（Å）
    #[serde(default = "default_vacuum_thickness")]
    pub vacuum_thickness: f64,
}

pub struct MoireHomobilayerTool;

#[async_trait]
impl Tool for MoireHomobilayerTool {
    fn name(&self) -> &str {
        "moire_homobilayer"
    }

    fn description(&self) -> &str {
        "Build a twisted homobilayer from a stored structure: the second layer is rotated by twist_angle about \
         the stacking axis and shifted by interlayer_spacing; at most max_num_atoms atoms are kept and vacuum \
         is added along the stacking axis."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<MoireArgs>()
    }

    async fn execute(&self, store: &mut StructureStore, args: Value) -> Result<Value, ToolError> {
        let args: MoireArgs = parse_args(args)?;
        let bulk = resolve_record(store, &args.bulk_structure_uri).await?;
        let params = MoireParams {
            interlayer_spacing: args.interlayer_spacing,
            max_num_atoms: args.max_num_atoms,
            twist_angle: args.twist_angle,
            vacuum_thickness: args.vacuum_thickness,
        };
        let source_id = bulk.structure_id.clone();
        let output = build_moire_bilayer(&bulk.structure, &params);

        let record = StructureRecord::derived(output.structure);
        let payload = extend_payload(
            record_payload(&record),
            json!({
                "source_structure_id": source_id,
                "method": output.method.as_str(),
                "diagnostics": output.diagnostics,
                "twist_angle": args.twist_angle,
                "interlayer_spacing": args.interlayer_spacing,
                "vacuum_thickness": args.vacuum_thickness,
                "max_num_atoms": args.max_num_atoms,
            }),
        );
        store.put(record);
        Ok(payload)
    }
}
