//! 进程监管：启动（spawn + 握手）、健康检查、优雅停止、强杀与重启
//!
//! 停止顺序：关闭 stdin → SIGTERM（unix）→ 等待 stop_grace → kill。
//! 读超时的 worker 被视为卡死，直接强杀，不走优雅停止。

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::protocol::{Request, Response};
use super::transport::Transport;
use crate::config::ClientSection;
use crate::core::ClientError;

/// worker 启动参数
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// 额外的环境变量（上游凭证等，不走协议）
    pub env: Vec<(String, String)>,
    pub startup_timeout: Duration,
    pub stop_grace: Duration,
}

impl WorkerSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            startup_timeout: Duration::from_secs(30),
            stop_grace: Duration::from_secs(5),
        }
    }

    pub fn from_config(section: &ClientSection) -> Self {
        let mut env = Vec::new();
        if let Some(ref key) = section.api_key {
            env.push(("MP_API_KEY".to_string(), key.clone()));
        }
        Self {
            program: section.resolve_worker_program(),
            args: section.worker_args.clone(),
            env,
            startup_timeout: section.startup_timeout(),
            stop_grace: section.stop_grace(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

type ChildTransport = Transport<ChildStdin, BufReader<ChildStdout>>;

struct WorkerProcess {
    child: Child,
    transport: ChildTransport,
    pid: Option<u32>,
    _stderr_task: Option<JoinHandle<()>>,
}

pub struct Supervisor {
    spec: WorkerSpec,
    process: Option<WorkerProcess>,
}

impl Supervisor {
    pub fn new(spec: WorkerSpec) -> Self {
        Self { spec, process: None }
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid)
    }

    /// 启动 worker 并完成握手；任何失败都以 ServiceUnavailable 返回，且不留下半启动的进程
    pub async fn start(&mut self) -> Result<(), ClientError> {
        if self.process.is_some() {
            self.stop().await;
        }

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .envs(self.spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ClientError::ServiceUnavailable(format!("failed to spawn {}: {e}", self.spec.program.display()))
        })?;
        let pid = child.id();

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            return Err(ClientError::ServiceUnavailable("worker stdio not captured".into()));
        };
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "matbridge::worker", pid, "{line}");
                }
            })
        });

        let mut process = WorkerProcess {
            child,
            transport: Transport::new(stdin, BufReader::new(stdout)),
            pid,
            _stderr_task: stderr_task,
        };

        let handshake = Request::initialize(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let outcome = process
            .transport
            .round_trip(&handshake, self.spec.startup_timeout, "initialize")
            .await
            .and_then(|resp| {
                resp.into_result().map_err(|e| ClientError::Remote {
                    code: e.code,
                    message: e.message,
                })
            });

        match outcome {
            Ok(info) => {
                tracing::info!(
                    pid,
                    server = %info.get("serverInfo").cloned().unwrap_or_default(),
                    "worker started"
                );
                self.process = Some(process);
                Ok(())
            }
            Err(e) => {
                let _ = process.child.start_kill();
                tracing::error!(pid, error = %e, "worker handshake failed");
                Err(ClientError::ServiceUnavailable(format!("handshake failed: {e}")))
            }
        }
    }

    /// 进程未退出即健康；不做任何阻塞 I/O
    pub fn is_healthy(&mut self) -> bool {
        match self.process.as_mut() {
            Some(p) => matches!(p.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// 优雅停止；之后进程句柄一定被清空
    pub async fn stop(&mut self) {
        let Some(process) = self.process.take() else {
            return;
        };
        let WorkerProcess {
            mut child,
            transport,
            pid,
            ..
        } = process;
        // 关闭 stdin，worker 读到 EOF 会自行退出
        drop(transport);

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            if let (Ok(None), Some(pid)) = (child.try_wait(), pid) {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    tracing::debug!(pid, error = ?e, "SIGTERM failed");
                }
            }
        }

        match tokio::time::timeout(self.spec.stop_grace, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(pid, code = ?status.code(), "worker stopped"),
            Ok(Err(e)) => tracing::warn!(pid, error = %e, "wait on worker failed"),
            Err(_) => {
                tracing::warn!(pid, grace_secs = self.spec.stop_grace.as_secs(), "worker ignored SIGTERM, killing");
                if let Err(e) = child.kill().await {
                    tracing::error!(pid, error = %e, "kill failed");
                }
            }
        }
    }

    /// 立即强杀（读超时等场景），不等待退出
    pub fn force_kill(&mut self, reason: &str) {
        if let Some(mut process) = self.process.take() {
            tracing::warn!(pid = process.pid, reason, "force-killing worker");
            if let Err(e) = process.child.start_kill() {
                tracing::debug!(pid = process.pid, error = %e, "start_kill failed");
            }
        }
    }

    pub async fn restart(&mut self, reason: &str) -> Result<(), ClientError> {
        tracing::info!(pid = self.pid(), reason, "restarting worker");
        self.stop().await;
        self.start().await
    }

    /// 发送请求并等待响应；瞬时失败后强杀 worker，下一次调用前必须重启
    pub async fn call(&mut self, request: &Request, deadline: Duration, label: &str) -> Result<Response, ClientError> {
        let Some(process) = self.process.as_mut() else {
            return Err(ClientError::WorkerExited);
        };
        let result = process.transport.round_trip(request, deadline, label).await;
        if let Err(ref e) = result {
            if e.is_transient() {
                self.force_kill(&e.to_string());
            }
        }
        result
    }
}
