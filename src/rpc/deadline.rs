//! 自适应读超时
//!
//! 有连续失败时取 max(floor, base - failures * penalty)，尽快识别卡死的 worker；
//! 否则重计算工具用 heavy，数据获取工具用 fetch，其余用 base。

use std::time::Duration;

use crate::config::TimeoutsSection;

const HEAVY_TOOLS: [&str; 2] = ["build_supercell", "moire_homobilayer"];
const FETCH_TOOLS: [&str; 1] = ["get_structure_data"];

#[derive(Debug, Clone)]
pub struct DeadlinePolicy {
    base_secs: u64,
    heavy_secs: u64,
    fetch_secs: u64,
    floor_secs: u64,
    failure_penalty_secs: u64,
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self::from_config(&TimeoutsSection::default())
    }
}

impl DeadlinePolicy {
    pub fn from_config(section: &TimeoutsSection) -> Self {
        Self {
            base_secs: section.base_secs,
            heavy_secs: section.heavy_secs,
            fetch_secs: section.fetch_secs,
            floor_secs: section.floor_secs,
            failure_penalty_secs: section.failure_penalty_secs,
        }
    }

    pub fn for_call(&self, tool: &str, consecutive_failures: u32) -> Duration {
        let secs = if consecutive_failures > 0 {
            let penalty = self.failure_penalty_secs.saturating_mul(consecutive_failures as u64);
            self.base_secs.saturating_sub(penalty).max(self.floor_secs)
        } else if HEAVY_TOOLS.contains(&tool) {
            self.heavy_secs
        } else if FETCH_TOOLS.contains(&tool) {
            self.fetch_secs
        } else {
            self.base_secs
        };
        Duration::from_secs(secs)
    }
}
