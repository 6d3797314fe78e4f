//! 工具执行器
//!
//! 持有 ToolRegistry，execute(tool_name, store, args) 调用工具并捕获 panic（转为 ToolError::Panicked），
//! 保证单个坏调用不会拖垮 worker；每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use serde_json::Value;

use crate::store::StructureStore;
use crate::tools::{ToolError, ToolRegistry};

pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub async fn execute(&self, tool_name: &str, store: &mut StructureStore, args: Value) -> Result<Value, ToolError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = AssertUnwindSafe(self.registry.execute(tool_name, store, args))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(ToolError::Panicked(panic_message(payload.as_ref()))));

        let (ok, outcome): (bool, &str) = match &result {
            Ok(_) => (true, "ok"),
            Err(ToolError::Panicked(_)) => (false, "panic"),
            Err(ToolError::NotRegistered(_)) => (false, "unknown_tool"),
            Err(e) => (false, e.kind()),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::tools::Tool;
    use crate::upstream::FixtureUpstream;

    struct Explode;

    #[async_trait]
    impl Tool for Explode {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        async fn execute(&self, _store: &mut StructureStore, _args: Value) -> Result<Value, ToolError> {
            panic!("lattice exploded")
        }
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let mut registry = ToolRegistry::new();
        registry.register(Explode);
        let executor = ToolExecutor::new(registry);
        let mut store = StructureStore::new(Arc::new(FixtureUpstream::new()));

        let err = executor.execute("explode", &mut store, Value::Null).await.unwrap_err();
        assert_eq!(err, ToolError::Panicked("lattice exploded".into()));

        // 执行器仍可继续使用
        let err = executor.execute("missing", &mut store, Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolError::NotRegistered(_)));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = Value::String("x".repeat(500));
        assert!(args_preview(&long).ends_with("..."));
        assert_eq!(args_preview(&serde_json::json!({"a": 1})), r#"{"a":1}"#);
    }
}
