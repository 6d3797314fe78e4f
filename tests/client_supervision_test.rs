//! Client Facade 监管与重试测试：用 sh 脚本扮演挂起、崩溃、输出噪声的 worker

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;
    use std::time::{Duration, Instant};

    use matbridge::client::MatClient;
    use matbridge::config::{ClientSection, TimeoutsSection};
    use matbridge::core::ClientError;
    use matbridge::rpc::WorkerSpec;
    use serde_json::json;
    use tempfile::TempDir;

    /// 启动时在 $1 追加一行，用来数启动次数
    const PRELUDE: &str = r#"echo start >> "$1"
read line
echo '{"id":0,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"fake","version":"0"},"capabilities":{"tools":{}}}}'
"#;

    /// 对每个请求回显 id，返回空 data
    const ECHO_LOOP: &str = r#"while read line; do
  id=$(printf '%s' "$line" | sed -n 's/^{"id":\([0-9]*\).*/\1/p')
  printf '{"id":%s,"result":{"status":"ok","data":{}}}\n' "$id"
done
"#;

    fn fast_section() -> ClientSection {
        ClientSection {
            startup_timeout_secs: 5,
            stop_grace_secs: 1,
            min_call_interval_ms: 0,
            max_calls_before_restart: 0,
            max_consecutive_failures: 2,
            max_retries: 2,
            backoff_base_ms: 1,
            backoff_cap_ms: 5,
            timeouts: TimeoutsSection {
                base_secs: 1,
                heavy_secs: 1,
                fetch_secs: 1,
                floor_secs: 1,
                failure_penalty_secs: 0,
            },
            ..Default::default()
        }
    }

    fn script_worker(body: &str, counter: &Path) -> WorkerSpec {
        let mut spec = WorkerSpec::new("sh")
            .arg("-c")
            .arg(format!("{PRELUDE}{body}"))
            .arg("fake-worker")
            .arg(counter.to_string_lossy().to_string());
        spec.startup_timeout = Duration::from_secs(5);
        spec.stop_grace = Duration::from_secs(1);
        spec
    }

    fn starts(counter: &Path) -> usize {
        std::fs::read_to_string(counter)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_timeout_kills_worker_and_next_call_rehandshakes() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("starts");
        let section = ClientSection {
            max_retries: 0,
            ..fast_section()
        };
        let spec = script_worker("while read line; do :; done\n", &counter);
        let mut client = MatClient::new(spec, &section);

        let err = client
            .call_tool("select_material_by_id", json!({"material_id": "mp-149"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
        assert!(err.is_transient());
        assert!(!client.is_healthy());
        assert_eq!(starts(&counter), 1);
        assert_eq!(client.stats().timeouts, 1);

        let _ = client.call_tool("select_material_by_id", json!({})).await;
        assert_eq!(starts(&counter), 2);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_bound_is_one_plus_max_retries() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("starts");
        let section = fast_section();
        // 读到工具调用就退出：每次尝试都是 worker 中途死亡
        let spec = script_worker("read line\nexit 1\n", &counter);
        let mut client = MatClient::new(spec, &section);

        let err = client
            .call_tool("build_supercell", json!({"bulk_structure_uri": "structure://mp_mp-149"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::WorkerExited | ClientError::Io(_)));
        assert_eq!(starts(&counter), 1 + section.max_retries as usize);
        assert_eq!(client.call_state().consecutive_failures, 1);
        assert_eq!(client.stats().restarts, section.max_retries as u64);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_resets_counters() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("starts");
        let spec = script_worker(ECHO_LOOP, &counter);
        let mut client = MatClient::new(spec, &fast_section());

        client.call_tool("ping_tool", json!({})).await.unwrap();
        client.call_tool("ping_tool", json!({})).await.unwrap();
        assert_eq!(client.call_state().call_count, 2);
        let first_pid = client.pid();

        client.restart().await.unwrap();
        assert_eq!(client.call_state().call_count, 0);
        assert_eq!(client.call_state().consecutive_failures, 0);
        assert_ne!(client.pid(), first_pid);
        assert_eq!(starts(&counter), 2);
        assert_eq!(client.stats().restarts, 1);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_proactive_restart_after_each_call() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("starts");
        let section = ClientSection {
            max_calls_before_restart: 1,
            ..fast_section()
        };
        let mut client = MatClient::new(script_worker(ECHO_LOOP, &counter), &section);

        for _ in 0..3 {
            client.call_tool("ping_tool", json!({})).await.unwrap();
        }
        assert_eq!(starts(&counter), 3);
        assert_eq!(client.call_state().call_count, 1);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_calls_are_spaced_by_min_interval() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("starts");
        let section = ClientSection {
            min_call_interval_ms: 150,
            ..fast_section()
        };
        let mut client = MatClient::new(script_worker(ECHO_LOOP, &counter), &section);

        client.call_tool("ping_tool", json!({})).await.unwrap();
        let first = client.call_state().last_call_time.unwrap();
        client.call_tool("ping_tool", json!({})).await.unwrap();
        let second = client.call_state().last_call_time.unwrap();
        assert!(second.duration_since(first) >= Duration::from_millis(150));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_stray_output_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("starts");
        let body = r#"while read line; do
  id=$(printf '%s' "$line" | sed -n 's/^{"id":\([0-9]*\).*/\1/p')
  echo "Loading structure dispatcher..."
  printf '{"id":%s,"result":{"status":"ok","data":{"n":1}}}\n' "$id"
done
"#;
        let mut client = MatClient::new(script_worker(body, &counter), &fast_section());
        let data = client.call_tool("ping_tool", json!({})).await.unwrap();
        assert_eq!(data, json!({"n": 1}));
        assert_eq!(starts(&counter), 1);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_tool_errors_are_not_retried() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("starts");
        let body = r#"while read line; do
  id=$(printf '%s' "$line" | sed -n 's/^{"id":\([0-9]*\).*/\1/p')
  printf '{"id":%s,"result":{"status":"error","kind":"not_found","message":"Structure x not found"}}\n' "$id"
done
"#;
        let mut client = MatClient::new(script_worker(body, &counter), &fast_section());
        let err = client
            .get_structure_data("structure://x", Default::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(starts(&counter), 1);
        assert_eq!(client.call_state().consecutive_failures, 0);
        assert!(client.is_healthy());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_handshake_failure_is_service_unavailable() {
        let spec = WorkerSpec::new("sh").arg("-c").arg("exit 3");
        let mut client = MatClient::new(spec, &fast_section());
        let started = Instant::now();
        let err = client.start().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!client.is_healthy());
    }
}
