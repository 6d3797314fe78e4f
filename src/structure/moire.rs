//! 莫尔同质双层：第二层绕堆叠轴（c 方向）旋转并沿堆叠轴平移层间距，
//! 合并后截断到原子上限，c 向量加长 层间距 + 真空层。
//!
//! 不返回错误：旋转路径任何一步失败都退回不旋转的简单堆叠，并在 diagnostics 中注明走了哪条路径。

use serde::{Deserialize, Serialize};

use super::lattice::{dot, norm};
use super::{wrap_frac, Lattice, Site, Structure, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct MoireParams {
    /// 层间距（Å）
    pub interlayer_spacing: f64,
    pub max_num_atoms: usize,
    /// 扭转角（度）
    pub twist_angle: f64,
    /// 真空层厚度（Å）
    pub vacuum_thickness: f64,
}

/// 实际采用的构造路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoireMethod {
    Twisted,
    StackedFallback,
}

impl MoireMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoireMethod::Twisted => "twisted",
            MoireMethod::StackedFallback => "stacked_fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MoireOutput {
    pub structure: Structure,
    pub method: MoireMethod,
    pub diagnostics: String,
}

pub fn build_moire_bilayer(bulk: &Structure, params: &MoireParams) -> MoireOutput {
    let mut diagnostics = vec![format!(
        "input: {} atoms, twist {}°, spacing {} Å, vacuum {} Å, cap {} atoms",
        bulk.len(),
        params.twist_angle,
        params.interlayer_spacing,
        params.vacuum_thickness,
        params.max_num_atoms
    )];

    match twisted(bulk, params) {
        Ok((structure, combined)) => {
            diagnostics.push(format!(
                "twisted: rotated second layer about the stacking axis, {} of {} atoms kept",
                structure.len(),
                combined
            ));
            MoireOutput {
                structure,
                method: MoireMethod::Twisted,
                diagnostics: diagnostics.join("\n"),
            }
        }
        Err(reason) => {
            tracing::warn!(reason = %reason, "moire twisted construction failed, using stacked fallback");
            diagnostics.push(format!("stacked_fallback: twisted construction failed: {reason}"));
            let structure = stacked_fallback(bulk, params);
            diagnostics.push(format!(
                "stacked_fallback: un-rotated stacking, {} atoms",
                structure.len()
            ));
            MoireOutput {
                structure,
                method: MoireMethod::StackedFallback,
                diagnostics: diagnostics.join("\n"),
            }
        }
    }
}

/// Rodrigues 旋转：v 绕单位轴 k 旋转 theta（弧度）
fn rotate(v: &Vec3, k: &Vec3, theta: f64) -> Vec3 {
    let (sin, cos) = theta.sin_cos();
    let cross = [
        k[1] * v[2] - k[2] * v[1],
        k[2] * v[0] - k[0] * v[2],
        k[0] * v[1] - k[1] * v[0],
    ];
    let kv = dot(k, v);
    let mut out = [0.0; 3];
    for i in 0..3 {
        out[i] = v[i] * cos + cross[i] * sin + k[i] * kv * (1.0 - cos);
    }
    out
}

fn twisted(bulk: &Structure, params: &MoireParams) -> Result<(Structure, usize), String> {
    let MoireParams {
        interlayer_spacing,
        twist_angle,
        vacuum_thickness,
        max_num_atoms,
    } = *params;
    if !(interlayer_spacing.is_finite() && twist_angle.is_finite() && vacuum_thickness.is_finite()) {
        return Err("non-finite parameters".into());
    }
    if bulk.lattice.is_singular() {
        return Err("bulk lattice is singular".into());
    }

    let [a, b, c] = *bulk.lattice.matrix();
    let c_len = norm(&c);
    let axis = c.map(|v| v / c_len);
    let new_len = c_len + interlayer_spacing + vacuum_thickness;
    if new_len <= 0.0 {
        return Err(format!("stacking axis length {new_len} is not positive"));
    }
    let lattice = Lattice::new([a, b, axis.map(|v| v * new_len)]);
    if lattice.is_singular() {
        return Err("bilayer lattice is singular".into());
    }

    let theta = twist_angle.to_radians();
    let layer1 = bulk.cart_coords();
    let layer2 = layer1.iter().map(|p| {
        let r = rotate(p, &axis, theta);
        [
            r[0] + axis[0] * interlayer_spacing,
            r[1] + axis[1] * interlayer_spacing,
            r[2] + axis[2] * interlayer_spacing,
        ]
    });
    let species = bulk.sites.iter().map(|s| s.species.clone());
    let combined: Vec<(String, Vec3)> = species
        .clone()
        .zip(layer1.iter().copied())
        .chain(species.zip(layer2))
        .collect();
    let total = combined.len();

    let mut sites = Vec::with_capacity(total.min(max_num_atoms));
    for (sp, cart) in combined.into_iter().take(max_num_atoms) {
        let frac = lattice
            .cart_to_frac(&cart)
            .ok_or_else(|| "bilayer lattice is not invertible".to_string())?;
        if !frac.iter().all(|v| v.is_finite()) {
            return Err("non-finite coordinates after rotation".into());
        }
        sites.push(Site::new(sp, frac.map(wrap_frac)));
    }
    Ok((Structure::new(lattice, sites), total))
}

/// 纯分数坐标运算的简单堆叠，不需要求逆，任何输入都能完成
fn stacked_fallback(bulk: &Structure, params: &MoireParams) -> Structure {
    let finite_or_zero = |v: f64| if v.is_finite() { v } else { 0.0 };
    let spacing = finite_or_zero(params.interlayer_spacing);
    let vacuum = finite_or_zero(params.vacuum_thickness);
    let [a, b, c] = *bulk.lattice.matrix();
    let c_len = norm(&c);
    let new_len = c_len + spacing + vacuum;

    let (lattice, ratio, shift) = if c_len > 0.0 && new_len.is_finite() && new_len > 0.0 {
        let grow = new_len / c_len;
        (
            Lattice::new([a, b, c.map(|v| v * grow)]),
            c_len / new_len,
            spacing / new_len,
        )
    } else {
        (bulk.lattice.clone(), 1.0, 0.0)
    };

    let layer = |offset: f64| {
        bulk.sites.iter().map(move |s| {
            let [x, y, z] = s.frac_coords;
            Site::new(s.species.clone(), [x, y, z * ratio + offset])
        })
    };
    let sites = layer(0.0)
        .chain(layer(shift))
        .take(params.max_num_atoms)
        .collect();
    Structure::new(lattice, sites)
}
