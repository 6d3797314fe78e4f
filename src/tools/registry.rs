//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时捕获 panic 并输出审计日志。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::store::StructureStore;
use crate::tools::ToolError;

/// 工具 trait：名称、描述、参数 schema、异步执行（args 为 JSON，可读写结构缓存）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（tools/call 的 name 字段）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema（tools/list 的 inputSchema）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, store: &mut StructureStore, args: Value) -> Result<Value, ToolError>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, store: &mut StructureStore, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotRegistered(name.to_string()))?;
        tool.execute(store, args).await
    }

    /// 按名称排序
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// tools/list 的条目：{name, description, inputSchema}，按名称排序
    pub fn descriptors(&self) -> Vec<Value> {
        self.tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.parameters_schema()
                })
            })
            .collect()
    }
}
