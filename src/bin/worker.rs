//! matbridge-worker：在 stdin/stdout 上提供领域工具
//!
//! 日志写 stderr；stdin 关闭、Ctrl+C 或 SIGTERM 时退出。

use std::sync::Arc;

use anyhow::Context;
use matbridge::config::{load_config, AppConfig};
use matbridge::core::{ShutdownManager, ShutdownReason};
use matbridge::worker::{build_dispatcher, run_stdio};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    matbridge::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let mut dispatcher = build_dispatcher(&cfg).context("Failed to create upstream client")?;

    let shutdown = Arc::new(ShutdownManager::new());
    let mut reasons = shutdown.subscribe();
    shutdown.install_signal_handlers();

    tracing::info!(pid = std::process::id(), "worker ready");
    let result = run_stdio(
        &mut dispatcher,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown.token(),
    )
    .await;

    let reason = match result {
        Ok(ShutdownReason::InputClosed) => {
            shutdown.shutdown(ShutdownReason::InputClosed);
            ShutdownReason::InputClosed
        }
        // 循环只知道被取消，具体原因由信号处理器广播
        Ok(cancelled) => reasons.try_recv().unwrap_or(cancelled),
        Err(e) => {
            let reason = ShutdownReason::FatalError(e.to_string());
            shutdown.shutdown(reason.clone());
            tracing::error!(?reason, cached = dispatcher.store().len(), "worker exiting");
            return Err(e).context("Worker I/O failed");
        }
    };
    tracing::info!(?reason, cached = dispatcher.store().len(), "worker exiting");
    if reason != ShutdownReason::InputClosed {
        // stdin 上挂起的阻塞读会拖住运行时关闭
        std::process::exit(0);
    }
    Ok(())
}
