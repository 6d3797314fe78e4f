//! 调用状态：限速时间戳与重启策略计数器
//!
//! 每个 Client Facade 实例独有一份；只由限速门与重试控制修改，worker 重启时清零计数。

use std::time::Instant;

use serde::Serialize;

#[derive(Clone, Debug, Default)]
pub struct CallState {
    /// 上一次调用发出的时刻（限速门等待之后）
    pub last_call_time: Option<Instant>,
    /// 自上次重启以来完成的调用数
    pub call_count: u32,
    /// 连续的瞬时失败次数（重试耗尽才计一次）
    pub consecutive_failures: u32,
}

impl CallState {
    pub fn reset_counters(&mut self) {
        self.call_count = 0;
        self.consecutive_failures = 0;
    }

    pub fn record_success(&mut self) {
        self.call_count += 1;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, transient: bool) {
        self.call_count += 1;
        if transient {
            self.consecutive_failures += 1;
        }
    }

    /// 主动重启：max 为 0 时关闭
    pub fn needs_proactive_restart(&self, max_calls: u32) -> bool {
        max_calls > 0 && self.call_count >= max_calls
    }

    pub fn needs_reactive_restart(&self, max_failures: u32) -> bool {
        max_failures > 0 && self.consecutive_failures >= max_failures
    }

    pub fn snapshot(&self) -> CallStateSnapshot {
        CallStateSnapshot {
            millis_since_last_call: self.last_call_time.map(|t| t.elapsed().as_millis() as u64),
            call_count: self.call_count,
            consecutive_failures: self.consecutive_failures,
        }
    }
}

/// 可序列化的状态投影（CLI 与日志用）
#[derive(Clone, Debug, Serialize)]
pub struct CallStateSnapshot {
    pub millis_since_last_call: Option<u64>,
    pub call_count: u32,
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_policies() {
        let mut state = CallState::default();
        assert!(!state.needs_proactive_restart(1));
        state.record_failure(true);
        state.record_failure(false);
        assert_eq!(state.call_count, 2);
        assert_eq!(state.consecutive_failures, 1);
        assert!(state.needs_proactive_restart(1));
        assert!(!state.needs_proactive_restart(0));
        state.record_failure(true);
        assert!(state.needs_reactive_restart(2));

        state.reset_counters();
        assert_eq!(state.call_count, 0);
        assert_eq!(state.consecutive_failures, 0);

        state.record_failure(true);
        state.record_success();
        assert_eq!(state.consecutive_failures, 0);
    }
}
