//! worker 进程：分发器与行循环
//!
//! 结构缓存只存在于 worker 内存中，进程重启即清空。

pub mod dispatcher;
pub mod server;

use std::sync::Arc;

pub use dispatcher::Dispatcher;
pub use server::run_stdio;

use crate::config::AppConfig;
use crate::store::StructureStore;
use crate::tools::{default_registry, ToolExecutor};
use crate::upstream::{create_upstream_from_config, UpstreamError};

/// 按配置组装分发器（上游数据源 + 结构缓存 + 工具表）
pub fn build_dispatcher(config: &AppConfig) -> Result<Dispatcher, UpstreamError> {
    let upstream = create_upstream_from_config(&config.upstream)?;
    tracing::info!(provider = upstream.name(), "upstream ready");
    let store = StructureStore::new(Arc::clone(&upstream));
    let executor = ToolExecutor::new(default_registry(&config.worker));
    Ok(Dispatcher::new(store, executor))
}
