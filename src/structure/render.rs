//! 结构渲染：斜投影到画布，按元素着色画原子，并描出（重复后的）晶胞边框，输出 PNG

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use super::{Structure, Vec3};

/// 单轴最大重复次数
pub const MAX_DUPLICATION: u32 = 8;

const MARGIN: f64 = 24.0;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const EDGE: Rgb<u8> = Rgb([90, 90, 90]);

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// 画布边长（像素）
    pub size: u32,
    /// 沿 a、b、c 的重复次数
    pub duplication: [u32; 3],
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            size: 480,
            duplication: [1, 1, 1],
        }
    }
}

fn element_color(species: &str) -> Rgb<u8> {
    match species {
        "H" => Rgb([220, 220, 220]),
        "C" => Rgb([64, 64, 64]),
        "N" => Rgb([48, 80, 248]),
        "O" => Rgb([255, 13, 13]),
        "Na" => Rgb([171, 92, 242]),
        "Cl" => Rgb([31, 240, 31]),
        "Si" => Rgb([240, 200, 160]),
        "S" => Rgb([230, 200, 40]),
        "Ga" => Rgb([194, 143, 143]),
        "As" => Rgb([189, 128, 227]),
        "Mo" => Rgb([84, 181, 181]),
        "Fe" => Rgb([224, 102, 51]),
        "Ti" => Rgb([160, 160, 170]),
        _ => {
            let h = species
                .bytes()
                .fold(2166136261u32, |acc, b| (acc ^ b as u32).wrapping_mul(16777619));
            Rgb([(h & 0xff) as u8 | 0x40, ((h >> 8) & 0xff) as u8 | 0x40, ((h >> 16) & 0xff) as u8 | 0x40])
        }
    }
}

/// 斜投影：沿 c 方向观察，z 分量略微错开以体现深度
fn project(p: &Vec3) -> (f64, f64) {
    (p[0] + 0.35 * p[2], p[1] + 0.25 * p[2])
}

fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x0, mut y0) = from;
    let (x1, y1) = to;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_disc(img: &mut RgbImage, center: (i64, i64), radius: i64, color: Rgb<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let d2 = dx * dx + dy * dy;
            if d2 <= radius * radius {
                let shade = if d2 >= (radius - 1).max(0).pow(2) { EDGE } else { color };
                put(img, center.0 + dx, center.1 + dy, shade);
            }
        }
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

pub fn render_png(structure: &Structure, options: &RenderOptions) -> Result<Vec<u8>, image::ImageError> {
    let size = options.size.max(64);
    let dup = options.duplication.map(|n| n.clamp(1, MAX_DUPLICATION));
    let lattice = &structure.lattice;

    let mut atoms: Vec<(Vec3, &str)> = Vec::new();
    for i in 0..dup[0] {
        for j in 0..dup[1] {
            for k in 0..dup[2] {
                for site in &structure.sites {
                    let f = site.frac_coords;
                    let frac = [f[0] + i as f64, f[1] + j as f64, f[2] + k as f64];
                    atoms.push((lattice.frac_to_cart(&frac), site.species.as_str()));
                }
            }
        }
    }
    atoms.retain(|(p, _)| p.iter().all(|v| v.is_finite()));
    atoms.sort_by(|a, b| a.0[2].total_cmp(&b.0[2]));

    let corner = |mask: u8| {
        let frac = [
            if mask & 1 != 0 { dup[0] as f64 } else { 0.0 },
            if mask & 2 != 0 { dup[1] as f64 } else { 0.0 },
            if mask & 4 != 0 { dup[2] as f64 } else { 0.0 },
        ];
        lattice.frac_to_cart(&frac)
    };
    let corners: Vec<Vec3> = (0..8u8).map(corner).collect();

    let projected: Vec<(f64, f64)> = corners
        .iter()
        .chain(atoms.iter().map(|(p, _)| p))
        .map(project)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();

    let mut img = RgbImage::from_pixel(size, size, BACKGROUND);
    if !projected.is_empty() {
        let (min_x, max_x, min_y, max_y) = projected.iter().fold(
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
            |(a, b, c, d), (x, y)| (a.min(*x), b.max(*x), c.min(*y), d.max(*y)),
        );
        let span = (max_x - min_x).max(max_y - min_y).max(1e-6);
        let scale = (size as f64 - 2.0 * MARGIN) / span;
        let to_px = |p: &Vec3| -> (i64, i64) {
            let (x, y) = project(p);
            let px = MARGIN + (x - min_x) * scale;
            // 图像 y 轴向下
            let py = size as f64 - MARGIN - (y - min_y) * scale;
            (px.round() as i64, py.round() as i64)
        };

        for a in 0..8u8 {
            for bit in [1u8, 2, 4] {
                if a & bit == 0 {
                    let b = a | bit;
                    draw_line(&mut img, to_px(&corners[a as usize]), to_px(&corners[b as usize]), EDGE);
                }
            }
        }

        let radius = ((size / 48) as i64).max(3);
        for (p, species) in &atoms {
            draw_disc(&mut img, to_px(p), radius, element_color(species));
        }
    }

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{silicon_primitive, Lattice};

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn test_render_produces_png() {
        let bytes = render_png(&silicon_primitive(), &RenderOptions::default()).unwrap();
        assert!(bytes.starts_with(&PNG_MAGIC));
    }

    #[test]
    fn test_render_with_duplication_and_custom_size() {
        let opts = RenderOptions {
            size: 128,
            duplication: [2, 2, 1],
        };
        let bytes = render_png(&silicon_primitive(), &opts).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 128);
    }

    #[test]
    fn test_render_empty_structure() {
        let empty = Structure::new(Lattice::cubic(3.0), Vec::new());
        assert!(render_png(&empty, &RenderOptions::default()).is_ok());
    }
}
