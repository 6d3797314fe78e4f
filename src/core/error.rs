//! 客户端错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 ClientError 决定 RestartAndRetry / Surface。

use std::time::Duration;

use thiserror::Error;

/// Client Facade 对调用方暴露的唯一错误类型
#[derive(Error, Debug)]
pub enum ClientError {
    /// 读超时：worker 已被强杀
    #[error("Tool '{tool}' timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// 调用过程中 worker 退出（EOF / 管道断开）
    #[error("Worker exited during call")]
    WorkerExited,

    #[error("Worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 输出流中出现无法解析或 id 不匹配的行
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// worker 返回的协议级 error 对象（未知工具、参数无效等）
    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },

    /// 工具级失败（{"status":"error"} 负载）
    #[error("Tool error ({kind}): {message}")]
    Tool { kind: String, message: String },

    /// 无法启动 worker 或握手失败；对当前客户端实例是致命的
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 结果结构与预期不符
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// 是否为瞬时失败（值得重启后重试）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout { .. }
                | ClientError::WorkerExited
                | ClientError::Io(_)
                | ClientError::Protocol(_)
        )
    }

    /// 是否为致命失败（调用方应放弃，转而使用自己的降级逻辑）
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::ServiceUnavailable(_))
    }

    /// 工具级 "not_found"
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Tool { kind, .. } if kind == "not_found")
    }
}

/// 恢复引擎根据错误类型与已尝试次数给出的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 强制重启 worker，等待 delay 后重发同一请求
    RestartAndRetry { delay: Duration },
    /// 不再重试，把错误交给调用方
    Surface,
}
