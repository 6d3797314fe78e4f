//! 晶格：3x3 行向量矩阵（a、b、c，单位 Å）及分数/笛卡尔坐标换算

use serde::{Deserialize, Serialize};

pub type Vec3 = [f64; 3];
pub type Mat3 = [[f64; 3]; 3];

/// 奇异判定阈值（体积绝对值小于此值视为退化晶格）
const SINGULAR_EPS: f64 = 1e-10;

/// 晶格：行向量依次为 a、b、c
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    matrix: Mat3,
}

impl Lattice {
    pub fn new(matrix: Mat3) -> Self {
        Self { matrix }
    }

    /// 由晶格常数构造（角度为度），约定 c 沿 z 轴
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let (alpha, beta, gamma) = (alpha.to_radians(), beta.to_radians(), gamma.to_radians());
        let val = ((alpha.cos() * beta.cos() - gamma.cos()) / (alpha.sin() * beta.sin()))
            .clamp(-1.0, 1.0);
        let gamma_star = val.acos();
        Self::new([
            [a * beta.sin(), 0.0, a * beta.cos()],
            [
                -b * alpha.sin() * gamma_star.cos(),
                b * alpha.sin() * gamma_star.sin(),
                b * alpha.cos(),
            ],
            [0.0, 0.0, c],
        ])
    }

    /// 立方晶格
    pub fn cubic(a: f64) -> Self {
        Self::new([[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]])
    }

    pub fn matrix(&self) -> &Mat3 {
        &self.matrix
    }

    /// (a, b, c)
    pub fn lengths(&self) -> Vec3 {
        [
            norm(&self.matrix[0]),
            norm(&self.matrix[1]),
            norm(&self.matrix[2]),
        ]
    }

    /// (α, β, γ)，单位度；退化向量返回 90°
    pub fn angles(&self) -> Vec3 {
        let [a, b, c] = &self.matrix;
        [angle_deg(b, c), angle_deg(a, c), angle_deg(a, b)]
    }

    pub fn volume(&self) -> f64 {
        det3(&self.matrix).abs()
    }

    pub fn is_singular(&self) -> bool {
        det3(&self.matrix).abs() < SINGULAR_EPS || !self.matrix.iter().flatten().all(|v| v.is_finite())
    }

    /// 分数坐标 -> 笛卡尔坐标（f · M）
    pub fn frac_to_cart(&self, frac: &Vec3) -> Vec3 {
        vec_mat(frac, &self.matrix)
    }

    /// 笛卡尔坐标 -> 分数坐标；晶格退化时返回 None
    pub fn cart_to_frac(&self, cart: &Vec3) -> Option<Vec3> {
        let inv = inv3(&self.matrix)?;
        Some(vec_mat(cart, &inv))
    }
}

pub fn norm(v: &Vec3) -> f64 {
    dot(v, v).sqrt()
}

pub fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn angle_deg(u: &Vec3, v: &Vec3) -> f64 {
    let denom = norm(u) * norm(v);
    if denom == 0.0 {
        return 90.0;
    }
    (dot(u, v) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

/// 行向量乘矩阵：v · M
pub fn vec_mat(v: &Vec3, m: &Mat3) -> Vec3 {
    let mut out = [0.0; 3];
    for (j, slot) in out.iter_mut().enumerate() {
        *slot = v[0] * m[0][j] + v[1] * m[1][j] + v[2] * m[2][j];
    }
    out
}

pub fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        *row = vec_mat(&a[i], b);
    }
    out
}

pub fn det3(m: &Mat3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

pub fn inv3(m: &Mat3) -> Option<Mat3> {
    let det = det3(m);
    if det.abs() < SINGULAR_EPS || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_parameters_roundtrip_hexagonal() {
        let lattice = Lattice::from_parameters(3.16, 3.16, 12.3, 90.0, 90.0, 120.0);
        let [a, b, c] = lattice.lengths();
        let [alpha, beta, gamma] = lattice.angles();
        assert!(approx(a, 3.16) && approx(b, 3.16) && approx(c, 12.3));
        assert!(approx(alpha, 90.0) && approx(beta, 90.0) && approx(gamma, 120.0));
    }

    #[test]
    fn test_cart_frac_inverse() {
        let lattice = Lattice::from_parameters(4.0, 5.0, 6.0, 80.0, 95.0, 110.0);
        let frac = [0.25, 0.5, 0.75];
        let cart = lattice.frac_to_cart(&frac);
        let back = lattice.cart_to_frac(&cart).unwrap();
        for i in 0..3 {
            assert!(approx(frac[i], back[i]));
        }
    }

    #[test]
    fn test_singular_lattice_has_no_inverse() {
        let lattice = Lattice::new([[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(lattice.is_singular());
        assert!(lattice.cart_to_frac(&[1.0, 1.0, 1.0]).is_none());
    }

    #[test]
    fn test_cubic_volume() {
        assert!(approx(Lattice::cubic(2.0).volume(), 8.0));
    }
}
