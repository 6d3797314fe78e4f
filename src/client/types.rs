//! Client Facade 的类型化结果
//!
//! 与 worker 返回的 data 对象字段一一对应；多出的字段会被忽略。

use serde::{Deserialize, Serialize};

use crate::upstream::MaterialProperties;

/// 检索结果中的一条候选材料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSummary {
    pub material_id: String,
    pub formula: String,
    pub band_gap: Option<f64>,
    pub formation_energy: Option<f64>,
    pub crystal_system: Option<String>,
    pub space_group: Option<String>,
    pub structure_id: String,
    pub structure_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchResult {
    #[serde(default)]
    pub materials: Vec<MaterialSummary>,
}

/// 选取、导入或派生得到的结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureInfo {
    pub structure_id: String,
    pub structure_uri: String,
    pub material_id: Option<String>,
    /// 约化化学式
    pub formula: String,
    pub num_sites: usize,
    #[serde(default)]
    pub properties: MaterialProperties,
    #[serde(default)]
    pub description: String,
}

/// 导出的结构文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureData {
    pub structure_id: String,
    pub format: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupercellInfo {
    #[serde(flatten)]
    pub structure: StructureInfo,
    pub source_structure_id: String,
    pub original_atoms: usize,
    pub supercell_atoms: usize,
    pub scaling_matrix: [[i64; 3]; 3],
    pub determinant: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoireInfo {
    #[serde(flatten)]
    pub structure: StructureInfo,
    pub source_structure_id: String,
    /// twisted | stacked_fallback
    pub method: String,
    pub diagnostics: String,
    pub twist_angle: f64,
    pub interlayer_spacing: f64,
    pub vacuum_thickness: f64,
    pub max_num_atoms: usize,
}

/// moire_homobilayer 的可选参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoireOptions {
    /// 层间距（Å）
    pub interlayer_spacing: f64,
    pub max_num_atoms: usize,
    /// 扭转角（度）
    pub twist_angle: f64,
    pub vacuum_thickness: f64,
}

impl MoireOptions {
    pub fn new(interlayer_spacing: f64) -> Self {
        Self {
            interlayer_spacing,
            max_num_atoms: 10,
            twist_angle: 0.0,
            vacuum_thickness: 15.0,
        }
    }

    pub fn twist_angle(mut self, degrees: f64) -> Self {
        self.twist_angle = degrees;
        self
    }

    pub fn max_num_atoms(mut self, max: usize) -> Self {
        self.max_num_atoms = max;
        self
    }

    pub fn vacuum_thickness(mut self, thickness: f64) -> Self {
        self.vacuum_thickness = thickness;
        self
    }
}

/// 渲染结果；found 为 false 时 bytes 为空，message 说明原因
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub structure_id: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub found: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RenderPayload {
    pub structure_id: String,
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
    pub found: bool,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_supercell_info_flattens_structure_fields() {
        let info: SupercellInfo = serde_json::from_value(json!({
            "structure_id": "a1b2c3d4e5f6",
            "structure_uri": "structure://a1b2c3d4e5f6",
            "material_id": null,
            "formula": "Si",
            "num_sites": 16,
            "properties": {},
            "description": "Formula: Si16",
            "source_structure_id": "mp_mp-149",
            "original_atoms": 2,
            "supercell_atoms": 16,
            "scaling_matrix": [[2, 0, 0], [0, 2, 0], [0, 0, 2]],
            "determinant": 8
        }))
        .unwrap();
        assert_eq!(info.structure.num_sites, 16);
        assert_eq!(info.determinant, 8);
        assert!(info.structure.material_id.is_none());
    }
}
