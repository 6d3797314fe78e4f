//! 结构缓存（worker 侧）
//!
//! structure_id → StructureRecord 的内存映射，生命周期与 worker 进程相同，重启即清空。
//! 以 "mp_" 开头的 id 编码了上游 material_id，未命中时 `resolve` 会向上游重新拉取并回填，
//! 调用方无需感知 worker 是否重启过。

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;

use crate::structure::Structure;
use crate::upstream::{MaterialEntry, MaterialProperties, UpstreamClient, UpstreamError};

/// material_id 派生 id 的前缀
pub const MATERIAL_PREFIX: &str = "mp_";

/// structure_uri 的 scheme
pub const URI_SCHEME: &str = "structure://";

/// "structure://" + id
pub fn structure_uri(structure_id: &str) -> String {
    format!("{URI_SCHEME}{structure_id}")
}

/// 接受 URI 或裸 id，返回 id
pub fn structure_id_from_uri(uri: &str) -> &str {
    let trimmed = uri.trim();
    trimmed.strip_prefix(URI_SCHEME).unwrap_or(trimmed)
}

/// "mp_" + material_id
pub fn material_structure_id(material_id: &str) -> String {
    format!("{MATERIAL_PREFIX}{material_id}")
}

/// 确定性 id：有 material_id 时为 "mp_" + material_id，否则为内容哈希
pub fn structure_id_for(material_id: Option<&str>, structure: &Structure) -> String {
    match material_id {
        Some(mid) => material_structure_id(mid),
        None => structure.content_hash(),
    }
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureRecord {
    pub structure_id: String,
    pub material_id: Option<String>,
    pub structure: Structure,
    pub properties: MaterialProperties,
}

impl StructureRecord {
    /// 无 material_id 的结构（导入、派生），id 为内容哈希
    pub fn derived(structure: Structure) -> Self {
        Self {
            structure_id: structure_id_for(None, &structure),
            material_id: None,
            structure,
            properties: MaterialProperties::default(),
        }
    }

    pub fn from_entry(entry: MaterialEntry) -> Self {
        Self {
            structure_id: structure_id_for(Some(&entry.material_id), &entry.structure),
            material_id: Some(entry.material_id),
            structure: entry.structure,
            properties: entry.properties,
        }
    }

    pub fn uri(&self) -> String {
        structure_uri(&self.structure_id)
    }

    /// 人类可读摘要：化学式、晶格参数、原子数与已知性质
    pub fn description(&self) -> String {
        let s = &self.structure;
        let [a, b, c] = s.lattice.lengths();
        let [alpha, beta, gamma] = s.lattice.angles();
        let mut out = String::new();
        let _ = writeln!(out, "Formula: {} ({})", s.reduced_formula(), s.formula());
        if let Some(ref mid) = self.material_id {
            let _ = writeln!(out, "Material ID: {mid}");
        }
        let _ = writeln!(
            out,
            "Lattice: a={a:.4} b={b:.4} c={c:.4} Å, alpha={alpha:.2} beta={beta:.2} gamma={gamma:.2}°"
        );
        let _ = writeln!(out, "Volume: {:.3} Å^3", s.lattice.volume());
        let _ = write!(out, "Sites: {}", s.len());
        if let Some(gap) = self.properties.band_gap {
            let _ = write!(out, "\nBand gap: {gap:.3} eV");
        }
        if let Some(ef) = self.properties.formation_energy {
            let _ = write!(out, "\nFormation energy: {ef:.3} eV/atom");
        }
        if let Some(ref cs) = self.properties.crystal_system {
            let _ = write!(out, "\nCrystal system: {cs}");
        }
        out
    }
}

/// worker 独占的结构缓存；一次只处理一个请求，因此不加锁
pub struct StructureStore {
    records: HashMap<String, StructureRecord>,
    upstream: Arc<dyn UpstreamClient>,
}

impl StructureStore {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            records: HashMap::new(),
            upstream,
        }
    }

    pub fn upstream(&self) -> &Arc<dyn UpstreamClient> {
        &self.upstream
    }

    pub fn get(&self, structure_id: &str) -> Option<&StructureRecord> {
        self.records.get(structure_id)
    }

    /// 按 record.structure_id 写入（覆盖同 id 旧值），返回该 id
    pub fn put(&mut self, record: StructureRecord) -> String {
        let id = record.structure_id.clone();
        self.records.insert(id.clone(), record);
        id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 查找结构，未命中且 id 带 "mp_" 前缀时向上游重新拉取
    ///
    /// 上游查无此材料或 id 不可重建时返回 Ok(None)；上游调用失败返回 Err。
    pub async fn resolve(&mut self, structure_id: &str) -> Result<Option<&StructureRecord>, UpstreamError> {
        if !self.records.contains_key(structure_id) {
            let Some(material_id) = structure_id.strip_prefix(MATERIAL_PREFIX) else {
                return Ok(None);
            };
            tracing::info!(
                structure_id = %structure_id,
                upstream = self.upstream.name(),
                "structure not resident, reloading from upstream"
            );
            match self.upstream.fetch_material(material_id).await? {
                Some(entry) => {
                    let mut record = StructureRecord::from_entry(entry);
                    // 上游可能返回规范化后的 material_id，缓存键仍以请求的 id 为准
                    if record.structure_id != structure_id {
                        tracing::warn!(
                            requested = %structure_id,
                            returned = %record.structure_id,
                            "upstream material_id differs from requested id"
                        );
                        record.structure_id = structure_id.to_string();
                    }
                    self.put(record);
                }
                None => return Ok(None),
            }
        }
        Ok(self.records.get(structure_id))
    }
}
