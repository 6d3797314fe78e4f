//! 工具分发器：把一条请求变成一条响应
//!
//! 持有 StructureStore 与 ToolExecutor，生命周期与 worker 进程相同。
//! 分发层问题（未知方法、未知工具、参数无效、工具 panic）回协议级 error；
//! 工具自身的失败回 `{"status":"error"}` 负载。

use serde_json::{json, Value};

use crate::rpc::{codes, methods, Request, Response, PROTOCOL_VERSION};
use crate::store::StructureStore;
use crate::tools::{ToolError, ToolExecutor, ToolOutcome};

pub struct Dispatcher {
    store: StructureStore,
    executor: ToolExecutor,
}

impl Dispatcher {
    pub fn new(store: StructureStore, executor: ToolExecutor) -> Self {
        Self { store, executor }
    }

    pub fn store(&self) -> &StructureStore {
        &self.store
    }

    pub async fn handle(&mut self, request: Request) -> Response {
        let id = request.id;
        match request.method.as_str() {
            methods::INITIALIZE => {
                let client = request
                    .params
                    .get("clientInfo")
                    .and_then(|c| c.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                tracing::info!(client, "initialize");
                Response::success(
                    id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "serverInfo": {
                            "name": "matbridge-worker",
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                        "capabilities": {"tools": {}},
                    }),
                )
            }
            methods::TOOLS_LIST => Response::success(id, json!({"tools": self.executor.registry().descriptors()})),
            methods::PING => Response::success(id, json!({})),
            methods::TOOLS_CALL => self.call_tool(id, request.params).await,
            other => Response::failure(id, codes::METHOD_NOT_FOUND, format!("Method not found: {other}")),
        }
    }

    async fn call_tool(&mut self, id: u64, params: Value) -> Response {
        let Some(name) = params.get("name").and_then(Value::as_str).map(str::to_owned) else {
            return Response::failure(id, codes::INVALID_REQUEST, "tools/call requires a string 'name'");
        };
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(args @ Value::Object(_)) => args.clone(),
            Some(_) => {
                return Response::failure(id, codes::INVALID_PARAMS, "'arguments' must be an object");
            }
        };

        match self.executor.execute(&name, &mut self.store, arguments).await {
            Ok(data) => outcome_response(id, ToolOutcome::Ok { data }),
            Err(err) if err.is_protocol_level() => Response::failure(id, protocol_code(&err), err.to_string()),
            Err(err) => outcome_response(id, ToolOutcome::from_error(&err)),
        }
    }
}

fn protocol_code(err: &ToolError) -> i64 {
    match err {
        ToolError::NotRegistered(_) => codes::TOOL_NOT_FOUND,
        ToolError::InvalidArguments(_) => codes::INVALID_PARAMS,
        _ => codes::INTERNAL_ERROR,
    }
}

fn outcome_response(id: u64, outcome: ToolOutcome) -> Response {
    match serde_json::to_value(outcome) {
        Ok(value) => Response::success(id, value),
        Err(e) => Response::failure(id, codes::INTERNAL_ERROR, format!("cannot encode tool result: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::WorkerSection;
    use crate::tools::default_registry;
    use crate::upstream::FixtureUpstream;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            StructureStore::new(Arc::new(FixtureUpstream::new())),
            ToolExecutor::new(default_registry(&WorkerSection::default())),
        )
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let mut d = dispatcher();
        let resp = d
            .handle(Request::initialize("test", "0.0.0"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(resp["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(resp["serverInfo"]["name"], "matbridge-worker");

        let pong = d.handle(Request::new(5, methods::PING, json!({}))).await;
        assert_eq!(pong.id, 5);
        assert_eq!(pong.into_result().unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_tools_list_has_schemas() {
        let mut d = dispatcher();
        let result = d
            .handle(Request::new(1, methods::TOOLS_LIST, Value::Null))
            .await
            .into_result()
            .unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 8);
        assert!(tools.iter().all(|t| t["inputSchema"].is_object()));
    }

    #[tokio::test]
    async fn test_error_levels() {
        let mut d = dispatcher();

        let unknown = d.handle(Request::tool_call(1, "no_such_tool", json!({}))).await;
        assert_eq!(unknown.error.unwrap().code, codes::TOOL_NOT_FOUND);

        let bad_args = d
            .handle(Request::tool_call(2, "select_material_by_id", json!({"material": 1})))
            .await;
        assert_eq!(bad_args.error.unwrap().code, codes::INVALID_PARAMS);

        let missing = d
            .handle(Request::tool_call(3, "select_material_by_id", json!({"material_id": "mp-0"})))
            .await
            .into_result()
            .unwrap();
        assert_eq!(missing["status"], "error");
        assert_eq!(missing["kind"], "not_found");

        let no_name = d.handle(Request::new(4, methods::TOOLS_CALL, json!({}))).await;
        assert_eq!(no_name.error.unwrap().code, codes::INVALID_REQUEST);

        let method = d.handle(Request::new(5, "resources/list", json!({}))).await;
        assert_eq!(method.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_select_then_export() {
        let mut d = dispatcher();
        let selected = d
            .handle(Request::tool_call(1, "select_material_by_id", json!({"material_id": "mp-149"})))
            .await
            .into_result()
            .unwrap();
        assert_eq!(selected["status"], "ok");
        assert_eq!(selected["data"]["structure_id"], "mp_mp-149");
        assert!(d.store().get("mp_mp-149").is_some());

        let exported = d
            .handle(Request::tool_call(
                2,
                "get_structure_data",
                json!({"structure_uri": "structure://mp_mp-149", "format": "cif"}),
            ))
            .await
            .into_result()
            .unwrap();
        assert!(exported["data"]["content"].as_str().unwrap().contains("_cell_length_a"));
    }
}
