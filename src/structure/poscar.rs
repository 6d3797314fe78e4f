//! POSCAR 读写（VASP 4/5 格式）
//!
//! 支持：缩放因子（负值表示目标体积）、Selective dynamics、Direct / Cartesian；
//! VASP 4 无元素行时从注释行取元素符号。

use std::sync::OnceLock;

use regex::Regex;

use super::{lattice::det3, Lattice, Site, Structure, StructureError};

static ELEMENT_RE: OnceLock<Regex> = OnceLock::new();

fn element_re() -> &'static Regex {
    ELEMENT_RE.get_or_init(|| Regex::new(r"^[A-Z][a-z]?$").unwrap())
}

fn err(msg: impl Into<String>) -> StructureError {
    StructureError::Poscar(msg.into())
}

fn parse_floats(line: &str, n: usize, what: &str) -> Result<Vec<f64>, StructureError> {
    let values: Vec<f64> = line
        .split_whitespace()
        .take(n)
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| err(format!("invalid {what} '{}': {e}", line.trim())))?;
    if values.len() < n {
        return Err(err(format!("expected {n} numbers for {what}, got '{}'", line.trim())));
    }
    Ok(values)
}

/// POTCAR 风格的元素名（Si_pv、Fe/abc）只保留元素符号
fn clean_species(token: &str) -> String {
    token
        .split(['_', '/'])
        .next()
        .unwrap_or(token)
        .to_string()
}

pub fn parse(text: &str) -> Result<Structure, StructureError> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .collect();
    if lines.len() < 7 {
        return Err(err("too few lines"));
    }

    let scale_values = parse_floats(lines[1], 1, "scale factor")?;
    let scale = scale_values[0];

    let mut matrix = [[0.0; 3]; 3];
    for (i, row) in matrix.iter_mut().enumerate() {
        let v = parse_floats(lines[2 + i], 3, "lattice vector")?;
        *row = [v[0], v[1], v[2]];
    }

    let mut idx = 5;
    let first_tokens: Vec<&str> = lines[idx].split_whitespace().collect();
    let species: Vec<String> = if first_tokens
        .first()
        .map(|t| t.parse::<usize>().is_ok())
        .unwrap_or(false)
    {
        // VASP 4：元素来自注释行
        lines[0]
            .split_whitespace()
            .filter(|t| element_re().is_match(t))
            .map(str::to_string)
            .collect()
    } else {
        idx += 1;
        first_tokens.iter().map(|t| clean_species(t)).collect()
    };

    let counts: Vec<usize> = lines
        .get(idx)
        .ok_or_else(|| err("missing atom counts"))?
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| err(format!("invalid atom counts: {e}")))?;
    idx += 1;
    if species.len() != counts.len() {
        return Err(err(format!(
            "{} species but {} counts",
            species.len(),
            counts.len()
        )));
    }

    let mut mode_line = lines.get(idx).ok_or_else(|| err("missing coordinate mode"))?.trim();
    if mode_line.starts_with(['s', 'S']) {
        idx += 1;
        mode_line = lines.get(idx).ok_or_else(|| err("missing coordinate mode"))?.trim();
    }
    let cartesian = mode_line.starts_with(['c', 'C', 'k', 'K']);
    idx += 1;

    let scale = if scale < 0.0 {
        let volume = det3(&matrix).abs();
        if volume == 0.0 {
            return Err(StructureError::SingularLattice);
        }
        (scale.abs() / volume).cbrt()
    } else {
        scale
    };
    for row in matrix.iter_mut() {
        for v in row.iter_mut() {
            *v *= scale;
        }
    }
    let lattice = Lattice::new(matrix);
    if lattice.is_singular() {
        return Err(StructureError::SingularLattice);
    }

    let total = counts
        .iter()
        .try_fold(0usize, |acc, n| acc.checked_add(*n))
        .ok_or_else(|| err("atom counts overflow"))?;
    let available = lines.len().saturating_sub(idx);
    if total > available {
        return Err(err(format!(
            "expected {total} coordinate lines, found {available}"
        )));
    }
    let mut sites = Vec::with_capacity(total);
    let mut coord_lines = lines.iter().skip(idx);
    for (sp, n) in species.iter().zip(&counts) {
        for _ in 0..*n {
            let line = coord_lines
                .next()
                .ok_or_else(|| err(format!("expected {total} coordinate lines")))?;
            let v = parse_floats(line, 3, "coordinates")?;
            let mut coords = [v[0], v[1], v[2]];
            if cartesian {
                let scaled = [coords[0] * scale, coords[1] * scale, coords[2] * scale];
                coords = lattice
                    .cart_to_frac(&scaled)
                    .ok_or(StructureError::SingularLattice)?;
            }
            sites.push(Site::new(sp.clone(), coords));
        }
    }

    Ok(Structure::new(lattice, sites))
}

/// 写出 POSCAR（Direct 坐标）；位点按元素首次出现顺序分组
pub fn write(structure: &Structure) -> String {
    let composition = structure.composition();
    let mut out = String::new();
    out.push_str(&structure.reduced_formula());
    out.push('\n');
    out.push_str("1.0\n");
    for row in structure.lattice.matrix() {
        out.push_str(&format!("  {:>14.8} {:>14.8} {:>14.8}\n", row[0], row[1], row[2]));
    }
    let names: Vec<&str> = composition.iter().map(|(sp, _)| sp.as_str()).collect();
    let counts: Vec<String> = composition.iter().map(|(_, n)| n.to_string()).collect();
    out.push_str(&names.join(" "));
    out.push('\n');
    out.push_str(&counts.join(" "));
    out.push('\n');
    out.push_str("direct\n");
    for (sp, _) in &composition {
        for site in structure.sites.iter().filter(|s| &s.species == sp) {
            let [x, y, z] = site.frac_coords;
            out.push_str(&format!("  {x:.8} {y:.8} {z:.8} {sp}\n"));
        }
    }
    out
}
