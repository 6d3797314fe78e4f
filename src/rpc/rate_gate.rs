//! 限速门：两次调用之间至少间隔 min_interval

use std::time::{Duration, Instant};

use crate::core::CallState;

#[derive(Debug, Clone)]
pub struct RateGate {
    min_interval: Duration,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// 不足最小间隔时睡眠补齐；等待结束后、发出调用前更新 last_call_time
    pub async fn wait(&self, state: &mut CallState) {
        if let Some(last) = state.last_call_time {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                tracing::debug!(wait_ms = remaining.as_millis() as u64, "rate gate sleeping");
                tokio::time::sleep(remaining).await;
            }
        }
        state.last_call_time = Some(Instant::now());
    }
}
