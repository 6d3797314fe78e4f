//! 传输层：把请求写成一行并读取对应的一行响应
//!
//! 读操作整体包在 `tokio::time::timeout` 里；超时后读 future 被直接丢弃，由调用方强杀 worker。
//! 无法解析或 id 不匹配的行记日志后跳过，最多多读一行，仍不对则报协议错误。

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::protocol::{Request, Response};
use crate::core::ClientError;

/// 一次接收中允许跳过的坏行数
const MAX_SKIPPED_LINES: usize = 1;

pub struct Transport<W, R> {
    writer: W,
    reader: R,
}

impl<W, R> Transport<W, R>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    pub fn new(writer: W, reader: R) -> Self {
        Self { writer, reader }
    }

    pub async fn send(&mut self, request: &Request) -> Result<(), ClientError> {
        let mut line = request
            .to_line()
            .map_err(|e| ClientError::Protocol(format!("cannot encode request: {e}")))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.map_err(write_error)?;
        self.writer.flush().await.map_err(write_error)?;
        Ok(())
    }

    /// 在 deadline 内读取 id 为 expected_id 的响应；label 用于超时错误信息
    pub async fn receive(&mut self, expected_id: u64, deadline: Duration, label: &str) -> Result<Response, ClientError> {
        let reader = &mut self.reader;
        let read = async move {
            let mut skipped = 0usize;
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line).await {
                    Ok(0) => return Err(ClientError::WorkerExited),
                    Ok(_) => {}
                    Err(e) => return Err(ClientError::Io(e)),
                }
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let reason = match Response::parse_line(trimmed) {
                    Ok(response) if response.id == expected_id => return Ok(response),
                    Ok(response) => format!("unexpected response id {} (expected {expected_id})", response.id),
                    Err(e) => e,
                };
                tracing::warn!(
                    id = expected_id,
                    line = %trimmed.chars().take(200).collect::<String>(),
                    reason = %reason,
                    "skipping unexpected line from worker"
                );
                skipped += 1;
                if skipped > MAX_SKIPPED_LINES {
                    return Err(ClientError::Protocol(reason));
                }
            }
        };
        match tokio::time::timeout(deadline, read).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout {
                tool: label.to_string(),
                secs: deadline.as_secs(),
            }),
        }
    }

    pub async fn round_trip(&mut self, request: &Request, deadline: Duration, label: &str) -> Result<Response, ClientError> {
        self.send(request).await?;
        self.receive(request.id, deadline, label).await
    }
}

/// 写入时管道断开即 worker 已退出
fn write_error(e: std::io::Error) -> ClientError {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        ClientError::WorkerExited
    } else {
        ClientError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{duplex, AsyncReadExt, BufReader, DuplexStream};

    use super::*;

    /// (客户端 transport, worker 侧读端, worker 侧写端)
    fn pair() -> (Transport<DuplexStream, BufReader<DuplexStream>>, DuplexStream, DuplexStream) {
        let (client_out, worker_in) = duplex(4096);
        let (worker_out, client_in) = duplex(4096);
        (Transport::new(client_out, BufReader::new(client_in)), worker_in, worker_out)
    }

    #[tokio::test]
    async fn test_send_writes_one_line() {
        let (mut transport, mut worker_in, _worker_out) = pair();
        transport
            .send(&Request::tool_call(1, "ping_tool", json!({})))
            .await
            .unwrap();
        drop(transport);
        let mut buf = String::new();
        worker_in.read_to_string(&mut buf).await.unwrap();
        assert!(buf.ends_with('\n'));
        assert_eq!(buf.matches('\n').count(), 1);
    }

    #[tokio::test]
    async fn test_skips_one_garbage_line() {
        let (mut transport, _worker_in, mut worker_out) = pair();
        worker_out
            .write_all(b"Loading dispatcher...\n{\"id\":4,\"result\":{\"ok\":true}}\n")
            .await
            .unwrap();
        let resp = transport.receive(4, Duration::from_secs(1), "t").await.unwrap();
        assert_eq!(resp.into_result().unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_two_bad_lines_is_protocol_error() {
        let (mut transport, _worker_in, mut worker_out) = pair();
        worker_out
            .write_all(b"noise\n{\"id\":9,\"result\":{}}\n{\"id\":4,\"result\":{}}\n")
            .await
            .unwrap();
        let err = transport.receive(4, Duration::from_secs(1), "t").await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_eof_is_worker_exit() {
        let (mut transport, _worker_in, worker_out) = pair();
        drop(worker_out);
        let err = transport.receive(1, Duration::from_secs(1), "t").await.unwrap_err();
        assert!(matches!(err, ClientError::WorkerExited));
    }

    #[tokio::test]
    async fn test_silence_times_out() {
        let (mut transport, _worker_in, _worker_out) = pair();
        let err = transport
            .receive(1, Duration::from_millis(50), "build_supercell")
            .await
            .unwrap_err();
        match err {
            ClientError::Timeout { tool, .. } => assert_eq!(tool, "build_supercell"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
