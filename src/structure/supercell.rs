//! 超胞构造：新晶格 = S · 旧晶格，原子数 = 原子数 × |det(S)|

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::lattice::{inv3, mat_mul, vec_mat, Mat3};
use super::{wrap_frac, Site, Structure, StructureError};

/// 超胞原子数上限，防止误传的大矩阵撑爆 worker 内存
pub const MAX_SUPERCELL_ATOMS: usize = 100_000;

/// 包围盒搜索的候选点上限（格点数 × 原胞原子数）
pub const MAX_SEARCH_POINTS: u128 = 5_000_000;

const EDGE_EPS: f64 = 1e-8;

/// 缩放矩阵的三种写法：标量、对角向量或完整 3x3 整数矩阵
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ScalingSpec {
    Uniform(i64),
    Diagonal([i64; 3]),
    Full([[i64; 3]; 3]),
}

impl Default for ScalingSpec {
    fn default() -> Self {
        ScalingSpec::Uniform(2)
    }
}

/// 3x3 整数缩放矩阵（行 = 新晶格向量在旧晶格下的分量）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingMatrix(pub [[i64; 3]; 3]);

impl From<ScalingSpec> for ScalingMatrix {
    fn from(spec: ScalingSpec) -> Self {
        match spec {
            ScalingSpec::Uniform(n) => ScalingMatrix::diagonal([n, n, n]),
            ScalingSpec::Diagonal(d) => ScalingMatrix::diagonal(d),
            ScalingSpec::Full(m) => ScalingMatrix(m),
        }
    }
}

impl ScalingMatrix {
    pub fn diagonal(d: [i64; 3]) -> Self {
        ScalingMatrix([[d[0], 0, 0], [0, d[1], 0], [0, 0, d[2]]])
    }

    /// 行列式；任何中间量溢出 i64 时返回 None
    pub fn determinant(&self) -> Option<i64> {
        let m = &self.0;
        let minor = |a: i64, b: i64, c: i64, d: i64| a.checked_mul(b)?.checked_sub(c.checked_mul(d)?);
        let t0 = m[0][0].checked_mul(minor(m[1][1], m[2][2], m[1][2], m[2][1])?)?;
        let t1 = m[0][1].checked_mul(minor(m[1][0], m[2][2], m[1][2], m[2][0])?)?;
        let t2 = m[0][2].checked_mul(minor(m[1][0], m[2][1], m[1][1], m[2][0])?)?;
        t0.checked_sub(t1)?.checked_add(t2)
    }

    fn as_f64(&self) -> Mat3 {
        let mut out = [[0.0; 3]; 3];
        for (i, row) in self.0.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                out[i][j] = *v as f64;
            }
        }
        out
    }

    /// 新晶胞顶点在旧晶格下的整数包围盒（逐分量 min / max）
    fn lattice_point_bounds(&self) -> ([i128; 3], [i128; 3]) {
        let mut lo = [0i128; 3];
        let mut hi = [0i128; 3];
        for mask in 0..8u8 {
            let mut corner = [0i128; 3];
            for (row, r) in self.0.iter().enumerate() {
                if mask & (1 << row) != 0 {
                    for k in 0..3 {
                        corner[k] += i128::from(r[k]);
                    }
                }
            }
            for k in 0..3 {
                lo[k] = lo[k].min(corner[k]);
                hi[k] = hi[k].max(corner[k]);
            }
        }
        (lo, hi)
    }
}

pub fn make_supercell(structure: &Structure, scaling: &ScalingMatrix) -> Result<Structure, StructureError> {
    let det = scaling.determinant().ok_or_else(|| {
        StructureError::InvalidScaling(format!("determinant of {:?} overflows", scaling.0))
    })?;
    if det == 0 {
        return Err(StructureError::InvalidScaling(format!(
            "matrix {:?} is singular",
            scaling.0
        )));
    }
    let expected = structure
        .len()
        .saturating_mul(usize::try_from(det.unsigned_abs()).unwrap_or(usize::MAX));
    if expected > MAX_SUPERCELL_ATOMS {
        return Err(StructureError::InvalidScaling(format!(
            "supercell would contain {expected} atoms (limit {MAX_SUPERCELL_ATOMS})"
        )));
    }

    let s = scaling.as_f64();
    let inv_s = inv3(&s).ok_or_else(|| StructureError::InvalidScaling("matrix is singular".into()))?;
    let lattice = super::Lattice::new(mat_mul(&s, structure.lattice.matrix()));
    let (lo, hi) = scaling.lattice_point_bounds();
    let search_points = (0..3)
        .map(|k| (hi[k] - lo[k] + 3) as u128)
        .try_fold(structure.len() as u128, |acc, n| acc.checked_mul(n))
        .unwrap_or(u128::MAX);
    if search_points > MAX_SEARCH_POINTS {
        return Err(StructureError::InvalidScaling(format!(
            "matrix {:?} is too skewed: {search_points} candidate positions (limit {MAX_SEARCH_POINTS})",
            scaling.0
        )));
    }

    let mut sites = Vec::with_capacity(expected);
    for i in (lo[0] - 1)..=(hi[0] + 1) {
        for j in (lo[1] - 1)..=(hi[1] + 1) {
            for k in (lo[2] - 1)..=(hi[2] + 1) {
                for site in &structure.sites {
                    let base = site.frac_coords.map(wrap_frac);
                    let shifted = [base[0] + i as f64, base[1] + j as f64, base[2] + k as f64];
                    let f = vec_mat(&shifted, &inv_s);
                    if f.iter().all(|v| *v >= -EDGE_EPS && *v < 1.0 - EDGE_EPS) {
                        sites.push(Site::new(site.species.clone(), f.map(wrap_frac)));
                    }
                }
            }
        }
    }

    Ok(Structure::new(lattice, sites))
}
