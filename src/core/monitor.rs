//! 调用统计：调用数、成功/失败/超时与 worker 重启次数（累计值）

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CallMonitor {
    started: Instant,
    calls: Arc<AtomicU64>,
    successes: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    timeouts: Arc<AtomicU64>,
    restarts: Arc<AtomicU64>,
}

/// 统计快照
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonitorStats {
    pub uptime_secs: u64,
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub restarts: u64,
    /// 0.0 - 1.0；尚无调用时为 1.0
    pub success_rate: f64,
}

impl Default for CallMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl CallMonitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            calls: Arc::default(),
            successes: Arc::default(),
            failures: Arc::default(),
            timeouts: Arc::default(),
            restarts: Arc::default(),
        }
    }

    pub fn record_call(&self, ok: bool) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if ok {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> MonitorStats {
        let calls = self.calls.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        MonitorStats {
            uptime_secs: self.started.elapsed().as_secs(),
            calls,
            successes,
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            success_rate: if calls == 0 {
                1.0
            } else {
                successes as f64 / calls as f64
            },
        }
    }

    pub fn log_stats(&self) {
        let s = self.stats();
        tracing::info!(
            calls = s.calls,
            successes = s.successes,
            failures = s.failures,
            timeouts = s.timeouts,
            restarts = s.restarts,
            success_rate = s.success_rate,
            uptime_secs = s.uptime_secs,
            "rpc call statistics"
        );
    }
}
