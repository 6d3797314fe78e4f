//! 行协议：每行一个 JSON 对象
//!
//! 请求 `{"id", "method", "params"}`；响应 `{"id", "result"}` 或 `{"id", "error": {"code", "message"}}`，
//! 二者恰有其一，id 回显请求的 id。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// initialize 握手中交换的协议版本
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// 握手请求固定使用 id 0，工具调用 id 从 1 开始
pub const HANDSHAKE_ID: u64 = 0;

pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const PING: &str = "ping";
}

pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const TOOL_NOT_FOUND: i64 = -32001;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// 客户端握手请求
    pub fn initialize(client_name: &str, client_version: &str) -> Self {
        Self::new(
            HANDSHAKE_ID,
            methods::INITIALIZE,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "clientInfo": {"name": client_name, "version": client_version},
                "capabilities": {},
            }),
        )
    }

    pub fn tool_call(id: u64, name: &str, arguments: Value) -> Self {
        Self::new(id, methods::TOOLS_CALL, json!({"name": name, "arguments": arguments}))
    }

    /// 序列化为一行（不含换行符）；serde_json 输出不会包含裸换行
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// 解析一行响应，并校验 result / error 恰有其一
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let response: Response = serde_json::from_str(line.trim()).map_err(|e| format!("not a response object: {e}"))?;
        match (&response.result, &response.error) {
            (Some(_), None) | (None, Some(_)) => Ok(response),
            (Some(_), Some(_)) => Err(format!("response {} has both result and error", response.id)),
            (None, None) => Err(format!("response {} has neither result nor error", response.id)),
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match (self.result, self.error) {
            (_, Some(err)) => Err(err),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_line_shape() {
        let req = Request::tool_call(7, "select_material_by_id", json!({"material_id": "mp-149"}));
        let line = req.to_line().unwrap();
        assert!(!line.contains('\n'));
        let back: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(back["id"], 7);
        assert_eq!(back["method"], "tools/call");
        assert_eq!(back["params"]["name"], "select_material_by_id");
        assert_eq!(back["params"]["arguments"]["material_id"], "mp-149");
    }

    #[test]
    fn test_multiline_argument_stays_on_one_line() {
        let req = Request::tool_call(1, "create_structure_from_poscar", json!({"poscar_str": "Si\n1.0\n"}));
        assert!(!req.to_line().unwrap().contains('\n'));
    }

    #[test]
    fn test_parse_line_requires_exactly_one_of_result_error() {
        assert!(Response::parse_line(r#"{"id":1,"result":{}}"#).is_ok());
        assert!(Response::parse_line(r#"{"id":1,"error":{"code":-32001,"message":"Tool not found"}}"#).is_ok());
        assert!(Response::parse_line(r#"{"id":1}"#).is_err());
        assert!(Response::parse_line(r#"{"id":1,"result":{},"error":{"code":1,"message":"x"}}"#).is_err());
        assert!(Response::parse_line("Loading dispatcher...").is_err());
        assert!(Response::parse_line(r#"{"result":{}}"#).is_err());
    }

    #[test]
    fn test_failure_serializes_without_result() {
        let line = Response::failure(3, codes::TOOL_NOT_FOUND, "Tool not found: x").to_line().unwrap();
        assert_eq!(line, r#"{"id":3,"error":{"code":-32001,"message":"Tool not found: x"}}"#);
    }
}
