//! 核心层：错误与恢复、调用状态、统计、worker 关闭信号

pub mod error;
pub mod monitor;
pub mod recovery;
pub mod shutdown;
pub mod state;

pub use error::{ClientError, RecoveryAction};
pub use monitor::{CallMonitor, MonitorStats};
pub use recovery::RecoveryEngine;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{CallState, CallStateSnapshot};
