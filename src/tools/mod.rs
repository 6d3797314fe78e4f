//! 领域工具：检索、选取、导入导出、渲染、超胞与莫尔双层
//!
//! 每个工具实现 Tool trait，读写 worker 的 StructureStore；成功返回 data 对象，
//! 失败返回 ToolError。分发器把结果包装成统一的 ToolOutcome 负载。

pub mod executor;
pub mod export;
pub mod import;
pub mod moire;
pub mod registry;
pub mod render;
pub mod search;
pub mod select;
pub mod supercell;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub use executor::ToolExecutor;
pub use export::GetStructureDataTool;
pub use import::{CreateFromCifTool, CreateFromPoscarTool};
pub use moire::MoireHomobilayerTool;
pub use registry::{Tool, ToolRegistry};
pub use render::PlotStructureTool;
pub use search::SearchMaterialsTool;
pub use select::SelectMaterialTool;
pub use supercell::BuildSupercellTool;

use crate::config::WorkerSection;
use crate::store::{structure_id_from_uri, StructureRecord, StructureStore};
use crate::upstream::UpstreamError;

/// 工具执行错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// 参数缺失或类型不符（协议级 -32602）
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// 未注册的工具名（协议级 -32001）
    #[error("Tool not found: {0}")]
    NotRegistered(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    /// 输入内容无法处理（解析失败、奇异矩阵等）
    #[error("{0}")]
    Invalid(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// 工具 panic（协议级 -32603）
    #[error("Tool panicked: {0}")]
    Panicked(String),
}

impl ToolError {
    /// 工具级负载中的 kind 字段
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::NotRegistered(_) => "not_registered",
            ToolError::NotFound(_) => "not_found",
            ToolError::Upstream(_) => "upstream",
            ToolError::Invalid(_) => "invalid",
            ToolError::Internal(_) => "internal",
            ToolError::Panicked(_) => "panicked",
        }
    }

    /// 是否应作为协议级 error 对象返回（而非 status:error 负载）
    pub fn is_protocol_level(&self) -> bool {
        matches!(
            self,
            ToolError::InvalidArguments(_) | ToolError::NotRegistered(_) | ToolError::Panicked(_)
        )
    }
}

impl From<UpstreamError> for ToolError {
    fn from(e: UpstreamError) -> Self {
        ToolError::Upstream(e.to_string())
    }
}

/// 每个工具调用结果的统一形状
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    Ok { data: Value },
    Error { kind: String, message: String },
}

impl ToolOutcome {
    pub fn from_error(err: &ToolError) -> Self {
        ToolOutcome::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// 反序列化工具参数；失败即 InvalidArguments
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// 参数结构体的 JSON Schema
pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({"type": "object"}))
}

/// 新建或选取结构后返回给调用方的公共字段
pub fn record_payload(record: &StructureRecord) -> Value {
    json!({
        "structure_id": record.structure_id,
        "structure_uri": record.uri(),
        "material_id": record.material_id,
        "formula": record.structure.reduced_formula(),
        "num_sites": record.structure.len(),
        "properties": record.properties,
        "description": record.description(),
    })
}

/// 将额外字段并入 record_payload
pub fn extend_payload(mut base: Value, extra: Value) -> Value {
    if let (Some(obj), Value::Object(more)) = (base.as_object_mut(), extra) {
        obj.extend(more);
    }
    base
}

pub fn not_found(structure_id: &str) -> ToolError {
    ToolError::NotFound(format!("Structure {structure_id} not found"))
}

/// 按 URI 或裸 id 查找结构（必要时从上游重建），找不到即 NotFound
pub async fn resolve_record<'a>(store: &'a mut StructureStore, uri: &str) -> Result<&'a StructureRecord, ToolError> {
    let id = structure_id_from_uri(uri);
    store.resolve(id).await?.ok_or_else(|| not_found(id))
}

/// 注册全部八个领域工具
pub fn default_registry(config: &WorkerSection) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(SearchMaterialsTool::new(config.max_search_results));
    registry.register(SelectMaterialTool);
    registry.register(GetStructureDataTool);
    registry.register(CreateFromPoscarTool);
    registry.register(CreateFromCifTool);
    registry.register(PlotStructureTool::new(config.render_size));
    registry.register(BuildSupercellTool);
    registry.register(MoireHomobilayerTool);
    registry
}
