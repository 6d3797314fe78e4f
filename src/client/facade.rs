//! Client Facade：限速门 → 重启策略 → 带重试的调用 → 结果解码
//!
//! 每个实例独占一个 worker 进程；所有操作取 `&mut self`，同一实例同一时刻只有一个在途调用。

use std::time::Duration;

use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::types::{
    MaterialSummary, MoireInfo, MoireOptions, RenderPayload, RenderedImage, SearchResult, StructureData,
    StructureInfo, SupercellInfo,
};
use crate::config::{AppConfig, ClientSection};
use crate::core::{CallMonitor, CallState, ClientError, MonitorStats, RecoveryAction, RecoveryEngine};
use crate::rpc::{methods, DeadlinePolicy, RateGate, Request, Response, Supervisor, WorkerSpec};
use crate::structure::supercell::ScalingSpec;
use crate::tools::export::StructureFormat;
use crate::tools::ToolOutcome;

pub struct MatClient {
    supervisor: Supervisor,
    state: CallState,
    rate_gate: RateGate,
    deadlines: DeadlinePolicy,
    recovery: RecoveryEngine,
    monitor: CallMonitor,
    max_calls_before_restart: u32,
    max_consecutive_failures: u32,
    next_id: u64,
    /// 首次启动不计入重启次数
    booted: bool,
}

impl MatClient {
    pub fn new(spec: WorkerSpec, section: &ClientSection) -> Self {
        Self {
            supervisor: Supervisor::new(spec),
            state: CallState::default(),
            rate_gate: RateGate::new(section.min_call_interval()),
            deadlines: DeadlinePolicy::from_config(&section.timeouts),
            recovery: RecoveryEngine::from_config(section),
            monitor: CallMonitor::new(),
            max_calls_before_restart: section.max_calls_before_restart,
            max_consecutive_failures: section.max_consecutive_failures,
            next_id: 1,
            booted: false,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(WorkerSpec::from_config(&config.client), &config.client)
    }

    /// 显式启动 worker；不调用也可以，首次工具调用会按需启动
    pub async fn start(&mut self) -> Result<(), ClientError> {
        if self.supervisor.is_healthy() {
            return Ok(());
        }
        self.restart_worker("initial start").await
    }

    pub async fn restart(&mut self) -> Result<(), ClientError> {
        self.restart_worker("requested by caller").await
    }

    /// 优雅停止 worker 并输出统计
    pub async fn shutdown(&mut self) {
        self.supervisor.stop().await;
        tracing::debug!(state = ?self.state.snapshot(), "client shut down");
        self.monitor.log_stats();
    }

    pub fn is_healthy(&mut self) -> bool {
        self.supervisor.is_healthy()
    }

    pub fn pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    pub fn call_state(&self) -> &CallState {
        &self.state
    }

    pub fn stats(&self) -> MonitorStats {
        self.monitor.stats()
    }

    /// 通用工具调用：返回 status=ok 时的 data 对象
    pub async fn call_tool(&mut self, name: &str, args: Value) -> Result<Value, ClientError> {
        let params = json!({"name": name, "arguments": args});
        self.exchange(methods::TOOLS_CALL, params, name, decode_outcome).await
    }

    /// worker 提供的工具描述（name / description / inputSchema）
    pub async fn list_tools(&mut self) -> Result<Vec<Value>, ClientError> {
        self.exchange(methods::TOOLS_LIST, json!({}), methods::TOOLS_LIST, |response| {
            let result = response.into_result().map_err(|e| ClientError::Remote {
                code: e.code,
                message: e.message,
            })?;
            match result.get("tools") {
                Some(Value::Array(tools)) => Ok(tools.clone()),
                _ => Err(ClientError::InvalidResponse("tools/list result has no 'tools' array".into())),
            }
        })
        .await
    }

    /// 一次完整的逻辑调用：限速 → 重启策略 → 重试发送 → 解码，并更新计数与统计
    async fn exchange<T>(
        &mut self,
        method: &str,
        params: Value,
        label: &str,
        decode_response: impl FnOnce(Response) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        self.rate_gate.wait(&mut self.state).await;

        if let Err(e) = self.ensure_worker().await {
            self.state.record_failure(false);
            self.monitor.record_call(false);
            return Err(e);
        }

        let id = self.next_id;
        self.next_id += 1;
        let request = Request::new(id, method, params);

        match self.send_with_retry(&request, label).await {
            Ok(response) => {
                self.state.record_success();
                let decoded = decode_response(response);
                self.monitor.record_call(decoded.is_ok());
                decoded
            }
            Err(e) => {
                self.state.record_failure(e.is_transient());
                self.monitor.record_call(false);
                tracing::error!(tool = label, id, error = %e, "call failed");
                Err(e)
            }
        }
    }

    pub async fn search_materials(&mut self, chemical_formula: &str) -> Result<Vec<MaterialSummary>, ClientError> {
        let data = self
            .call_tool("search_materials_by_formula", json!({"chemical_formula": chemical_formula}))
            .await?;
        let result: SearchResult = decode("search_materials_by_formula", data)?;
        Ok(result.materials)
    }

    pub async fn select_material(&mut self, material_id: &str) -> Result<StructureInfo, ClientError> {
        let data = self
            .call_tool("select_material_by_id", json!({"material_id": material_id}))
            .await?;
        decode("select_material_by_id", data)
    }

    /// structure_uri 可以是 `structure://<id>` 或裸 id
    pub async fn get_structure_data(
        &mut self,
        structure_uri: &str,
        format: StructureFormat,
    ) -> Result<StructureData, ClientError> {
        let data = self
            .call_tool(
                "get_structure_data",
                json!({"structure_uri": structure_uri, "format": format}),
            )
            .await?;
        decode("get_structure_data", data)
    }

    pub async fn create_structure_from_poscar(&mut self, poscar: &str) -> Result<StructureInfo, ClientError> {
        let data = self
            .call_tool("create_structure_from_poscar", json!({"poscar_str": poscar}))
            .await?;
        decode("create_structure_from_poscar", data)
    }

    pub async fn create_structure_from_cif(&mut self, cif: &str) -> Result<StructureInfo, ClientError> {
        let data = self
            .call_tool("create_structure_from_cif", json!({"cif_str": cif}))
            .await?;
        decode("create_structure_from_cif", data)
    }

    /// 结构不存在时返回 found=false 的空图，而不是错误
    pub async fn plot_structure(
        &mut self,
        structure_uri: &str,
        duplication: [u32; 3],
    ) -> Result<RenderedImage, ClientError> {
        let data = self
            .call_tool(
                "plot_structure",
                json!({"structure_uri": structure_uri, "duplication": duplication}),
            )
            .await?;
        let payload: RenderPayload = decode("plot_structure", data)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.data.as_bytes())
            .map_err(|e| ClientError::InvalidResponse(format!("plot_structure: bad base64 image: {e}")))?;
        Ok(RenderedImage {
            structure_id: payload.structure_id,
            mime_type: payload.mime_type,
            bytes,
            found: payload.found,
            message: payload.message,
        })
    }

    pub async fn build_supercell(
        &mut self,
        bulk_structure_uri: &str,
        scaling_matrix: ScalingSpec,
    ) -> Result<SupercellInfo, ClientError> {
        let data = self
            .call_tool(
                "build_supercell",
                json!({
                    "bulk_structure_uri": bulk_structure_uri,
                    "supercell_parameters": {"scaling_matrix": scaling_matrix},
                }),
            )
            .await?;
        decode("build_supercell", data)
    }

    pub async fn moire_homobilayer(
        &mut self,
        bulk_structure_uri: &str,
        options: &MoireOptions,
    ) -> Result<MoireInfo, ClientError> {
        let data = self
            .call_tool(
                "moire_homobilayer",
                json!({
                    "bulk_structure_uri": bulk_structure_uri,
                    "interlayer_spacing": options.interlayer_spacing,
                    "max_num_atoms": options.max_num_atoms,
                    "twist_angle": options.twist_angle,
                    "vacuum_thickness": options.vacuum_thickness,
                }),
            )
            .await?;
        decode("moire_homobilayer", data)
    }

    /// 按优先级检查：主动重启 → 被动重启 → 进程不在则启动
    async fn ensure_worker(&mut self) -> Result<(), ClientError> {
        let reason = if self.state.needs_proactive_restart(self.max_calls_before_restart) {
            Some("call budget reached")
        } else if self.state.needs_reactive_restart(self.max_consecutive_failures) {
            Some("consecutive failures")
        } else if !self.supervisor.is_healthy() {
            Some("worker not running")
        } else {
            None
        };
        match reason {
            Some(reason) => self.restart_worker(reason).await,
            None => Ok(()),
        }
    }

    /// 每次重启（含首次启动）都清零计数器
    async fn restart_worker(&mut self, reason: &str) -> Result<(), ClientError> {
        let result = if self.booted {
            self.monitor.record_restart();
            self.supervisor.restart(reason).await
        } else {
            self.supervisor.start().await
        };
        self.booted = true;
        self.state.reset_counters();
        result
    }

    /// 同一请求（同一 id）最多发送 1 + max_retries 次
    async fn send_with_retry(&mut self, request: &Request, tool: &str) -> Result<Response, ClientError> {
        let mut attempt = 0u32;
        loop {
            // 本次调用内的失败也计入，重试时使用更短的超时
            let failures = self.state.consecutive_failures + attempt;
            let deadline = self.deadlines.for_call(tool, failures);
            tracing::debug!(tool, id = request.id, attempt, timeout_secs = deadline.as_secs(), "sending request");

            let err = match self.supervisor.call(request, deadline, tool).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            if matches!(err, ClientError::Timeout { .. }) {
                self.monitor.record_timeout();
            }

            match self.recovery.handle(&err, attempt) {
                RecoveryAction::RestartAndRetry { delay } => {
                    tracing::warn!(
                        tool,
                        id = request.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, restarting worker before retry"
                    );
                    self.restart_worker("retry after transient failure").await?;
                    sleep_backoff(delay).await;
                    attempt += 1;
                }
                RecoveryAction::Surface => return Err(err),
            }
        }
    }
}

async fn sleep_backoff(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// 协议级 error → Remote；status:error 负载 → Tool；status:ok → data
fn decode_outcome(response: Response) -> Result<Value, ClientError> {
    let result = response.into_result().map_err(|e| ClientError::Remote {
        code: e.code,
        message: e.message,
    })?;
    let outcome: ToolOutcome = serde_json::from_value(result)
        .map_err(|e| ClientError::InvalidResponse(format!("not a tool outcome: {e}")))?;
    match outcome {
        ToolOutcome::Ok { data } => Ok(data),
        ToolOutcome::Error { kind, message } => Err(ClientError::Tool { kind, message }),
    }
}

fn decode<T: DeserializeOwned>(tool: &str, data: Value) -> Result<T, ClientError> {
    serde_json::from_value(data).map_err(|e| ClientError::InvalidResponse(format!("{tool}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_outcome_variants() {
        let ok = Response::success(1, json!({"status": "ok", "data": {"n": 1}}));
        assert_eq!(decode_outcome(ok).unwrap(), json!({"n": 1}));

        let tool_err = Response::success(
            2,
            json!({"status": "error", "kind": "not_found", "message": "Structure x not found"}),
        );
        let err = decode_outcome(tool_err).unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_transient());

        let remote = Response::failure(3, -32001, "Tool not found: nope");
        assert!(matches!(
            decode_outcome(remote).unwrap_err(),
            ClientError::Remote { code: -32001, .. }
        ));

        let shapeless = Response::success(4, json!({"answer": 42}));
        assert!(matches!(
            decode_outcome(shapeless).unwrap_err(),
            ClientError::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_worker_program_is_service_unavailable() {
        let section = ClientSection {
            min_call_interval_ms: 0,
            ..Default::default()
        };
        let spec = WorkerSpec::new("/nonexistent/matbridge-worker-missing");
        let mut client = MatClient::new(spec, &section);
        let err = client.select_material("mp-149").await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!client.is_healthy());
        assert_eq!(client.stats().failures, 1);
    }
}
