//! 上游材料数据库：Materials Project REST 客户端与离线 fixture

pub mod fixture;
pub mod materials_project;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use fixture::FixtureUpstream;
pub use materials_project::MaterialsProjectClient;
pub use traits::{MaterialDoc, MaterialEntry, MaterialProperties, UpstreamClient, UpstreamError};

use crate::config::UpstreamSection;

/// 根据 [upstream] 配置创建客户端
///
/// provider 为 "fixture" 时使用内置目录；否则使用 Materials Project，
/// api_key 未配置时回退到环境变量 MP_API_KEY。缺少 key 不阻止启动，调用时才报错。
pub fn create_upstream_from_config(section: &UpstreamSection) -> Result<Arc<dyn UpstreamClient>, UpstreamError> {
    match section.provider.as_str() {
        "fixture" => Ok(Arc::new(FixtureUpstream::new())),
        "materials_project" | "mp" => {
            let key = section
                .api_key
                .clone()
                .or_else(|| std::env::var("MP_API_KEY").ok())
                .filter(|k| !k.is_empty());
            if key.is_none() {
                tracing::warn!("MP_API_KEY not set, upstream calls will fail until it is provided");
            }
            let client = MaterialsProjectClient::new(
                &section.base_url,
                key,
                Duration::from_secs(section.timeout_secs),
            )?;
            Ok(Arc::new(client))
        }
        other => Err(UpstreamError::Unavailable(format!("unknown upstream provider: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_provider() {
        let mut section = UpstreamSection::default();
        section.provider = "fixture".into();
        assert_eq!(create_upstream_from_config(&section).unwrap().name(), "fixture");

        section.provider = "materials_project".into();
        section.api_key = Some("test-key".into());
        assert_eq!(
            create_upstream_from_config(&section).unwrap().name(),
            "materials_project"
        );

        section.provider = "nope".into();
        assert!(create_upstream_from_config(&section).is_err());
    }
}
