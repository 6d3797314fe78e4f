//! 上游数据源抽象
//!
//! worker 通过 UpstreamClient 按化学式检索、按 material_id 取结构与性质；
//! 真实后端（Materials Project）与离线 fixture 都实现该 trait，由配置选择。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::structure::Structure;

/// 上游调用错误；在 worker 内一律视为工具级失败，不影响传输层
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("MP_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}

/// 材料性质（均可缺失）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band_gap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formation_energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crystal_system: Option<String>,
}

/// 检索命中的摘要（不含结构）
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDoc {
    pub material_id: String,
    pub formula: String,
    pub space_group: Option<String>,
    pub properties: MaterialProperties,
}

/// 完整条目：结构 + 性质
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialEntry {
    pub material_id: String,
    pub formula: String,
    pub space_group: Option<String>,
    pub structure: Structure,
    pub properties: MaterialProperties,
}

impl MaterialEntry {
    pub fn doc(&self) -> MaterialDoc {
        MaterialDoc {
            material_id: self.material_id.clone(),
            formula: self.formula.clone(),
            space_group: self.space_group.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// 上游客户端 trait
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// 后端名称（用于日志）
    fn name(&self) -> &str;

    /// 按化学式检索，最多返回 limit 条
    async fn search_by_formula(&self, formula: &str, limit: usize) -> Result<Vec<MaterialDoc>, UpstreamError>;

    /// 按 material_id 获取结构与性质；不存在返回 Ok(None)
    async fn fetch_material(&self, material_id: &str) -> Result<Option<MaterialEntry>, UpstreamError>;
}
