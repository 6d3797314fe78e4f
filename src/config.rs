//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MATBRIDGE__*` 覆盖（双下划线表示嵌套，如 `MATBRIDGE__UPSTREAM__PROVIDER=fixture`）。
//! 客户端与 worker 共用同一套结构，各取所需的段。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub upstream: UpstreamSection,
}

/// [client] 段：worker 启动方式、限速、重启策略、重试与退避
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSection {
    /// worker 可执行文件；未设置时使用与当前程序同目录的 matbridge-worker
    pub worker_program: Option<PathBuf>,
    #[serde(default)]
    pub worker_args: Vec<String>,
    /// 上游数据源凭证，启动 worker 时以 MP_API_KEY 环境变量传入（不走协议）
    pub api_key: Option<String>,
    /// 握手超时（秒）
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    /// 优雅停止等待时间（秒），超时后强杀
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    /// 两次调用之间的最小间隔（毫秒）
    #[serde(default = "default_min_call_interval_ms")]
    pub min_call_interval_ms: u64,
    /// 完成多少次调用后主动重启；0 表示关闭主动重启
    #[serde(default = "default_max_calls_before_restart")]
    pub max_calls_before_restart: u32,
    /// 连续失败达到此值时被动重启
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// 瞬时失败的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 退避基数（毫秒）：第 n 次重试前等待 min(base * 2^n, cap)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_stop_grace_secs() -> u64 {
    5
}

fn default_min_call_interval_ms() -> u64 {
    1000
}

fn default_max_calls_before_restart() -> u32 {
    1
}

fn default_max_consecutive_failures() -> u32 {
    2
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_cap_ms() -> u64 {
    10_000
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            worker_program: None,
            worker_args: Vec::new(),
            api_key: None,
            startup_timeout_secs: default_startup_timeout_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            min_call_interval_ms: default_min_call_interval_ms(),
            max_calls_before_restart: default_max_calls_before_restart(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            timeouts: TimeoutsSection::default(),
        }
    }
}

impl ClientSection {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn min_call_interval(&self) -> Duration {
        Duration::from_millis(self.min_call_interval_ms)
    }

    /// 解析 worker 程序路径：显式配置优先，否则取当前可执行文件旁的 matbridge-worker
    pub fn resolve_worker_program(&self) -> PathBuf {
        if let Some(ref program) = self.worker_program {
            return program.clone();
        }
        let name = format!("matbridge-worker{}", std::env::consts::EXE_SUFFIX);
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
            .filter(|p| p.exists())
            .unwrap_or_else(|| PathBuf::from(name))
    }
}

/// [client.timeouts] 段：自适应读超时（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsSection {
    /// 普通工具
    #[serde(default = "default_base_secs")]
    pub base_secs: u64,
    /// 重计算工具（超胞、莫尔）
    #[serde(default = "default_heavy_secs")]
    pub heavy_secs: u64,
    /// 数据获取工具（get_structure_data）
    #[serde(default = "default_fetch_secs")]
    pub fetch_secs: u64,
    /// 出现连续失败后的下限
    #[serde(default = "default_floor_secs")]
    pub floor_secs: u64,
    /// 每次连续失败缩短的秒数
    #[serde(default = "default_failure_penalty_secs")]
    pub failure_penalty_secs: u64,
}

fn default_base_secs() -> u64 {
    45
}

fn default_heavy_secs() -> u64 {
    90
}

fn default_fetch_secs() -> u64 {
    60
}

fn default_floor_secs() -> u64 {
    30
}

fn default_failure_penalty_secs() -> u64 {
    10
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            base_secs: default_base_secs(),
            heavy_secs: default_heavy_secs(),
            fetch_secs: default_fetch_secs(),
            floor_secs: default_floor_secs(),
            failure_penalty_secs: default_failure_penalty_secs(),
        }
    }
}

/// [worker] 段：工具行为参数
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// search 最多返回的候选数
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
    /// 渲染画布边长（像素）
    #[serde(default = "default_render_size")]
    pub render_size: u32,
}

fn default_max_search_results() -> usize {
    10
}

fn default_render_size() -> u32 {
    480
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            max_search_results: default_max_search_results(),
            render_size: default_render_size(),
        }
    }
}

/// [upstream] 段：上游数据源选择
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSection {
    /// materials_project / fixture
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 未设置时读取环境变量 MP_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "materials_project".to_string()
}

fn default_base_url() -> String {
    "https://api.materialsproject.org".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MATBRIDGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MATBRIDGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MATBRIDGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_policy() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.client.min_call_interval(), Duration::from_secs(1));
        assert_eq!(cfg.client.max_calls_before_restart, 1);
        assert_eq!(cfg.client.max_consecutive_failures, 2);
        assert_eq!(cfg.client.max_retries, 2);
        assert_eq!(cfg.client.startup_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.client.timeouts.heavy_secs, 90);
        assert_eq!(cfg.upstream.provider, "materials_project");
    }

    #[test]
    fn test_load_from_explicit_file_keeps_unset_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[client]\nmax_retries = 5\n[client.timeouts]\nbase_secs = 12\n[upstream]\nprovider = \"fixture\""
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.client.max_retries, 5);
        assert_eq!(cfg.client.timeouts.base_secs, 12);
        assert_eq!(cfg.client.timeouts.heavy_secs, 90);
        assert_eq!(cfg.client.max_consecutive_failures, 2);
        assert_eq!(cfg.upstream.provider, "fixture");
    }
}
