//! worker 主循环：逐行读请求、逐行写响应
//!
//! 与具体 I/O 解耦，生产环境接 stdin/stdout，测试接 `tokio::io::duplex`。
//! 关闭只在请求边界上生效，正在执行的工具调用不会被打断。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::dispatcher::Dispatcher;
use crate::core::ShutdownReason;
use crate::rpc::{codes, Request, Response};

/// 服务到输入结束或收到关闭信号为止；返回退出原因
pub async fn run_stdio<R, W>(
    dispatcher: &mut Dispatcher,
    reader: R,
    mut writer: W,
    shutdown: CancellationToken,
) -> std::io::Result<ShutdownReason>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return Ok(ShutdownReason::Signal),
            next = lines.next_line() => next?,
        };
        let Some(line) = next else {
            tracing::info!("stdin closed");
            return Ok(ShutdownReason::InputClosed);
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match parse_request(line) {
            Ok(request) => {
                tracing::debug!(id = request.id, method = %request.method, "request");
                dispatcher.handle(request).await
            }
            Err(response) => {
                tracing::warn!(
                    line = %line.chars().take(200).collect::<String>(),
                    "malformed request line"
                );
                response
            }
        };
        write_response(&mut writer, &response).await?;
    }
}

/// 无法解析的行回 -32700；是 JSON 但不是请求的回 -32600。能找到 id 就回显，否则用 0
fn parse_request(line: &str) -> Result<Request, Response> {
    match serde_json::from_str::<Value>(line) {
        Ok(value) => {
            let id = value.get("id").and_then(Value::as_u64).unwrap_or(0);
            serde_json::from_value::<Request>(value)
                .map_err(|e| Response::failure(id, codes::INVALID_REQUEST, format!("Invalid request: {e}")))
        }
        Err(e) => Err(Response::failure(
            salvage_id(line).unwrap_or(0),
            codes::PARSE_ERROR,
            format!("Parse error: {e}"),
        )),
    }
}

/// 从截断或损坏的 JSON 文本里找回 "id"
fn salvage_id(line: &str) -> Option<u64> {
    static ID_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = ID_RE.get_or_init(|| Regex::new(r#""id"\s*:\s*(\d+)"#).ok()).as_ref()?;
    re.captures(line)?.get(1)?.as_str().parse().ok()
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> std::io::Result<()> {
    let mut line = response
        .to_line()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
