//! 客户端与 worker 之间的行协议、传输与进程监管
//!
//! - **protocol**: 请求 / 响应消息与错误码
//! - **transport**: 带读超时的一行一消息收发
//! - **supervisor**: worker 进程的启动、握手、停止与强杀
//! - **rate_gate** / **deadline**: 限速与自适应超时

pub mod deadline;
pub mod protocol;
pub mod rate_gate;
pub mod supervisor;
pub mod transport;

pub use deadline::DeadlinePolicy;
pub use protocol::{codes, methods, Request, Response, RpcError, HANDSHAKE_ID, PROTOCOL_VERSION};
pub use rate_gate::RateGate;
pub use supervisor::{Supervisor, WorkerSpec};
pub use transport::Transport;
