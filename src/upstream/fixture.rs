//! 离线上游（用于测试与演示，无需 API Key）
//!
//! 内置少量常见材料，按约化化学式精确匹配检索。可切换为失败模式以模拟上游故障，
//! 并统计 fetch 次数以便验证惰性重载。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{MaterialDoc, MaterialEntry, MaterialProperties, UpstreamClient, UpstreamError};
use crate::structure::{silicon_primitive, Lattice, Site, Structure};

/// 固定材料目录
#[derive(Debug)]
pub struct FixtureUpstream {
    entries: Vec<MaterialEntry>,
    failing: AtomicBool,
    fetches: AtomicUsize,
}

impl Default for FixtureUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureUpstream {
    pub fn new() -> Self {
        Self {
            entries: catalog(),
            failing: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    /// 打开后所有调用返回 Unavailable
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// fetch_material 被调用的次数
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), UpstreamError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(UpstreamError::Unavailable("fixture upstream set to fail".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UpstreamClient for FixtureUpstream {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn search_by_formula(&self, formula: &str, limit: usize) -> Result<Vec<MaterialDoc>, UpstreamError> {
        self.check()?;
        let wanted: String = formula.split_whitespace().collect();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.formula == wanted)
            .take(limit)
            .map(MaterialEntry::doc)
            .collect())
    }

    async fn fetch_material(&self, material_id: &str) -> Result<Option<MaterialEntry>, UpstreamError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.entries.iter().find(|e| e.material_id == material_id).cloned())
    }
}

fn entry(
    material_id: &str,
    formula: &str,
    space_group: &str,
    crystal_system: &str,
    band_gap: f64,
    formation_energy: f64,
    structure: Structure,
) -> MaterialEntry {
    MaterialEntry {
        material_id: material_id.to_string(),
        formula: formula.to_string(),
        space_group: Some(space_group.to_string()),
        structure,
        properties: MaterialProperties {
            band_gap: Some(band_gap),
            formation_energy: Some(formation_energy),
            crystal_system: Some(crystal_system.to_string()),
        },
    }
}

/// fcc 原胞，a 为惯用晶胞边长
fn fcc_primitive(a: f64, basis: [(&str, [f64; 3]); 2]) -> Structure {
    let h = a / 2.0;
    Structure::new(
        Lattice::new([[0.0, h, h], [h, 0.0, h], [h, h, 0.0]]),
        basis.iter().map(|(sp, f)| Site::new(*sp, *f)).collect(),
    )
}

fn catalog() -> Vec<MaterialEntry> {
    let gaas = fcc_primitive(5.75, [("Ga", [0.0, 0.0, 0.0]), ("As", [0.25, 0.25, 0.25])]);
    let nacl = fcc_primitive(5.69, [("Na", [0.0, 0.0, 0.0]), ("Cl", [0.5, 0.5, 0.5])]);
    let mos2 = Structure::new(
        Lattice::from_parameters(3.19, 3.19, 14.88, 90.0, 90.0, 120.0),
        vec![
            Site::new("Mo", [1.0 / 3.0, 2.0 / 3.0, 0.25]),
            Site::new("Mo", [2.0 / 3.0, 1.0 / 3.0, 0.75]),
            Site::new("S", [1.0 / 3.0, 2.0 / 3.0, 0.621]),
            Site::new("S", [2.0 / 3.0, 1.0 / 3.0, 0.121]),
            Site::new("S", [1.0 / 3.0, 2.0 / 3.0, 0.879]),
            Site::new("S", [2.0 / 3.0, 1.0 / 3.0, 0.379]),
        ],
    );
    let graphite = Structure::new(
        Lattice::from_parameters(2.468, 2.468, 6.8, 90.0, 90.0, 120.0),
        vec![
            Site::new("C", [0.0, 0.0, 0.25]),
            Site::new("C", [0.0, 0.0, 0.75]),
            Site::new("C", [1.0 / 3.0, 2.0 / 3.0, 0.25]),
            Site::new("C", [2.0 / 3.0, 1.0 / 3.0, 0.75]),
        ],
    );
    vec![
        entry("mp-149", "Si", "Fd-3m", "Cubic", 0.85, 0.0, silicon_primitive()),
        entry("mp-2534", "GaAs", "F-43m", "Cubic", 0.19, -0.46, gaas),
        entry("mp-2815", "MoS2", "P6_3/mmc", "Hexagonal", 1.23, -0.93, mos2),
        entry("mp-48", "C", "P6_3/mmc", "Hexagonal", 0.0, 0.01, graphite),
        entry("mp-22862", "NaCl", "Fm-3m", "Cubic", 5.0, -2.11, nacl),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_matches_reduced_formula() {
        let up = FixtureUpstream::new();
        let hits = up.search_by_formula("MoS2", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].material_id, "mp-2815");
        assert!(up.search_by_formula("Unobtainium", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_counts_and_failing_mode() {
        let up = FixtureUpstream::new();
        let si = up.fetch_material("mp-149").await.unwrap().unwrap();
        assert_eq!(si.structure.len(), 2);
        assert!(up.fetch_material("mp-0").await.unwrap().is_none());
        up.set_failing(true);
        assert!(up.fetch_material("mp-149").await.is_err());
        assert_eq!(up.fetch_count(), 3);
    }
}
