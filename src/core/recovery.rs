//! 错误恢复引擎（重试控制）
//!
//! 根据 ClientError 与已尝试次数返回 RecoveryAction：瞬时失败在重试上限内重启并指数退避，
//! 其余一律交给调用方。

use std::time::Duration;

use crate::config::ClientSection;
use crate::core::{ClientError, RecoveryAction};

/// 有界重试 + 指数退避：第 n 次重试（n 从 0 起）前等待 min(base * 2^n, cap)
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    max_retries: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1), Duration::from_secs(10))
    }
}

impl RecoveryEngine {
    pub fn new(max_retries: u32, backoff_base: Duration, backoff_cap: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
            backoff_cap,
        }
    }

    pub fn from_config(section: &ClientSection) -> Self {
        Self::new(
            section.max_retries,
            Duration::from_millis(section.backoff_base_ms),
            Duration::from_millis(section.backoff_cap_ms),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }

    /// attempt 为刚失败的那次尝试的序号（首次调用为 0）
    pub fn handle(&self, err: &ClientError, attempt: u32) -> RecoveryAction {
        if err.is_transient() && attempt < self.max_retries {
            RecoveryAction::RestartAndRetry {
                delay: self.backoff(attempt),
            }
        } else {
            RecoveryAction::Surface
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout() -> ClientError {
        ClientError::Timeout {
            tool: "moire_homobilayer".into(),
            secs: 90,
        }
    }

    #[test]
    fn test_recovery_backoff_doubles_and_caps() {
        let engine = RecoveryEngine::default();
        assert_eq!(engine.backoff(0), Duration::from_secs(1));
        assert_eq!(engine.backoff(1), Duration::from_secs(2));
        assert_eq!(engine.backoff(3), Duration::from_secs(8));
        assert_eq!(engine.backoff(4), Duration::from_secs(10));
        assert_eq!(engine.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn test_recovery_transient_until_bound() {
        let engine = RecoveryEngine::default();
        assert!(matches!(
            engine.handle(&timeout(), 0),
            RecoveryAction::RestartAndRetry { .. }
        ));
        assert!(matches!(
            engine.handle(&ClientError::WorkerExited, 1),
            RecoveryAction::RestartAndRetry { .. }
        ));
        assert_eq!(engine.handle(&timeout(), 2), RecoveryAction::Surface);
    }

    #[test]
    fn test_recovery_non_transient_surfaces_immediately() {
        let engine = RecoveryEngine::default();
        let err = ClientError::Remote {
            code: -32602,
            message: "missing field".into(),
        };
        assert_eq!(engine.handle(&err, 0), RecoveryAction::Surface);
        let err = ClientError::ServiceUnavailable("handshake".into());
        assert_eq!(engine.handle(&err, 0), RecoveryAction::Surface);
    }

    #[test]
    fn test_recovery_zero_retries() {
        let engine = RecoveryEngine::new(0, Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(engine.handle(&timeout(), 0), RecoveryAction::Surface);
    }
}
