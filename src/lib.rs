//! matbridge - 材料结构工具的进程间 RPC
//!
//! 模块划分：
//! - **client**: Client Facade（限速、重启策略、重试、类型化结果）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、调用状态、统计、关闭信号
//! - **rpc**: 行协议、带超时的传输、worker 进程监管
//! - **worker**: 工具分发器与 stdio 主循环
//! - **store**: worker 内的结构缓存（可从上游惰性重建）
//! - **structure**: 晶体结构模型、POSCAR / CIF、超胞、莫尔双层、渲染
//! - **tools**: 八个领域工具与执行器
//! - **upstream**: 上游材料数据源（Materials Project / 内置样例）

pub mod client;
pub mod config;
pub mod core;
pub mod observability;
pub mod rpc;
pub mod store;
pub mod structure;
pub mod tools;
pub mod upstream;
pub mod worker;

pub use client::MatClient;
pub use core::ClientError;
