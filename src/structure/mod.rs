//! 晶体结构模型：晶格 + 位点列表，以及格式读写、超胞、莫尔双层与渲染
//!
//! 这里只包含工具需要的最小晶体学：不做空间群分析，CIF 仅展开显式给出的对称操作。

pub mod cif;
pub mod lattice;
pub mod moire;
pub mod poscar;
pub mod render;
pub mod supercell;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use lattice::{Lattice, Mat3, Vec3};
pub use moire::{build_moire_bilayer, MoireMethod, MoireOutput, MoireParams};
pub use render::{render_png, RenderOptions};
pub use supercell::{make_supercell, ScalingMatrix};

/// structure_id 中内容哈希的十六进制长度
const CONTENT_HASH_LEN: usize = 12;

/// 结构解析与变换错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructureError {
    #[error("POSCAR parse error: {0}")]
    Poscar(String),

    #[error("CIF parse error: {0}")]
    Cif(String),

    #[error("Lattice is singular")]
    SingularLattice,

    #[error("Invalid scaling matrix: {0}")]
    InvalidScaling(String),
}

/// 单个原子位点：元素符号 + 分数坐标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub species: String,
    pub frac_coords: Vec3,
}

impl Site {
    pub fn new(species: impl Into<String>, frac_coords: Vec3) -> Self {
        Self {
            species: species.into(),
            frac_coords,
        }
    }
}

/// 晶体结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub lattice: Lattice,
    pub sites: Vec<Site>,
}

impl Structure {
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Self {
        Self { lattice, sites }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn cart_coords(&self) -> Vec<Vec3> {
        self.sites
            .iter()
            .map(|s| self.lattice.frac_to_cart(&s.frac_coords))
            .collect()
    }

    /// 元素按首次出现顺序排列
    pub fn species_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for site in &self.sites {
            if !order.iter().any(|s| s == &site.species) {
                order.push(site.species.clone());
            }
        }
        order
    }

    /// (元素, 个数)，按首次出现顺序
    pub fn composition(&self) -> Vec<(String, usize)> {
        self.species_order()
            .into_iter()
            .map(|sp| {
                let n = self.sites.iter().filter(|s| s.species == sp).count();
                (sp, n)
            })
            .collect()
    }

    /// 完整化学式（空格分隔），如 "Si2"、"Mo2 S4"
    pub fn formula(&self) -> String {
        self.composition()
            .iter()
            .map(|(sp, n)| format!("{sp}{n}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 约化化学式，如 Si、GaAs、MoS2
    pub fn reduced_formula(&self) -> String {
        let comp = self.composition();
        let divisor = comp.iter().map(|(_, n)| *n).fold(0, gcd).max(1);
        comp.iter()
            .map(|(sp, n)| {
                let n = n / divisor;
                if n == 1 {
                    sp.clone()
                } else {
                    format!("{sp}{n}")
                }
            })
            .collect()
    }

    /// 内容哈希：对规范 JSON 序列化取 SHA-256 前 12 位十六进制
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        let mut hash = hex::encode(digest);
        hash.truncate(CONTENT_HASH_LEN);
        hash
    }

    pub fn from_poscar(text: &str) -> Result<Self, StructureError> {
        poscar::parse(text)
    }

    pub fn to_poscar(&self) -> String {
        poscar::write(self)
    }

    pub fn from_cif(text: &str) -> Result<Self, StructureError> {
        cif::parse(text)
    }

    pub fn to_cif(&self) -> String {
        cif::write(self)
    }
}

/// 将分数坐标折回 [0, 1)
pub fn wrap_frac(x: f64) -> f64 {
    let w = x - x.floor();
    if (1.0 - w).abs() < 1e-9 {
        0.0
    } else {
        w
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// 测试与 fixture 共用：金刚石结构 Si（2 原子原胞）
pub fn silicon_primitive() -> Structure {
    let lattice = Lattice::new([
        [0.0, 2.734364, 2.734364],
        [2.734364, 0.0, 2.734364],
        [2.734364, 2.734364, 0.0],
    ]);
    Structure::new(
        lattice,
        vec![
            Site::new("Si", [0.0, 0.0, 0.0]),
            Site::new("Si", [0.25, 0.25, 0.25]),
        ],
    )
}
