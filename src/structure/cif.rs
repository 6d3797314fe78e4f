//! CIF 读写
//!
//! 读取晶胞参数、`_atom_site` 循环与对称操作（`_symmetry_equiv_pos_as_xyz` /
//! `_space_group_symop_operation_xyz`），展开后去重；写出为 P1。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use super::{wrap_frac, Lattice, Site, Structure, StructureError, Vec3};

/// 对称展开后判定为同一位点的分数坐标距离
const DEDUP_TOL: f64 = 1e-3;

/// 对称展开的候选位点上限（原子行数 × 对称操作数），去重为平方复杂度
pub const MAX_EXPANDED_SITES: usize = 20_000;

static SYMBOL_RE: OnceLock<Regex> = OnceLock::new();

fn symbol_re() -> &'static Regex {
    SYMBOL_RE.get_or_init(|| Regex::new(r"^([A-Z][a-z]?)").unwrap())
}

fn err(msg: impl Into<String>) -> StructureError {
    StructureError::Cif(msg.into())
}

/// 按空白切分，保留单/双引号内的空格
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '\'' || c == '"' {
            chars.next();
            let mut tok = String::new();
            for ch in chars.by_ref() {
                if ch == c {
                    break;
                }
                tok.push(ch);
            }
            tokens.push(tok);
        } else {
            let mut tok = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                tok.push(ch);
                chars.next();
            }
            tokens.push(tok);
        }
    }
    tokens
}

/// 数值去掉不确定度括号，如 5.4307(2)
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.split('(').next().unwrap_or(raw);
    cleaned.parse::<f64>().ok()
}

struct Loop {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Loop {
    fn column(&self, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .find_map(|name| self.headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
    }
}

/// 扫描出标量键值与 loop_ 块
fn scan(text: &str) -> (HashMap<String, String>, Vec<Loop>) {
    let mut values = HashMap::new();
    let mut loops = Vec::new();
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.eq_ignore_ascii_case("loop_") {
            i += 1;
            let mut headers = Vec::new();
            while i < lines.len() && lines[i].starts_with('_') {
                headers.push(lines[i].split_whitespace().next().unwrap_or("").to_lowercase());
                i += 1;
            }
            let mut body = Vec::new();
            while i < lines.len()
                && !lines[i].starts_with('_')
                && !lines[i].eq_ignore_ascii_case("loop_")
                && !lines[i].starts_with("data_")
            {
                body.extend(tokenize(lines[i]));
                i += 1;
            }
            let rows = if headers.is_empty() {
                Vec::new()
            } else {
                body.chunks(headers.len())
                    .filter(|c| c.len() == headers.len())
                    .map(|c| c.to_vec())
                    .collect()
            };
            loops.push(Loop { headers, rows });
            continue;
        }
        if line.starts_with('_') {
            let tokens = tokenize(line);
            if let Some(key) = tokens.first() {
                if let Some(value) = tokens.get(1) {
                    values.insert(key.to_lowercase(), value.clone());
                }
            }
        }
        i += 1;
    }
    (values, loops)
}

/// 对称操作：new = rot · f + trans
#[derive(Debug, Clone, PartialEq)]
struct SymOp {
    rot: [[f64; 3]; 3],
    trans: Vec3,
}

impl SymOp {
    fn identity() -> Self {
        Self {
            rot: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            trans: [0.0; 3],
        }
    }

    fn parse(raw: &str) -> Result<Self, StructureError> {
        let parts: Vec<&str> = raw.split(',').collect();
        if parts.len() != 3 {
            return Err(err(format!("invalid symmetry operation '{raw}'")));
        }
        let mut op = Self {
            rot: [[0.0; 3]; 3],
            trans: [0.0; 3],
        };
        for (row, expr) in parts.iter().enumerate() {
            let (coeffs, constant) = parse_linear(expr)
                .ok_or_else(|| err(format!("invalid symmetry operation '{raw}'")))?;
            op.rot[row] = coeffs;
            op.trans[row] = constant;
        }
        Ok(op)
    }

    fn apply(&self, f: &Vec3) -> Vec3 {
        let mut out = [0.0; 3];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = wrap_frac(
                self.rot[i][0] * f[0] + self.rot[i][1] * f[1] + self.rot[i][2] * f[2] + self.trans[i],
            );
        }
        out
    }
}

/// 解析形如 "-x+1/2"、"x-y"、"0.25+z" 的线性表达式
fn parse_linear(expr: &str) -> Option<(Vec3, f64)> {
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact.to_lowercase();
    if compact.is_empty() {
        return None;
    }
    let mut terms = Vec::new();
    let mut current = String::new();
    for c in compact.chars() {
        if (c == '+' || c == '-') && !current.is_empty() {
            terms.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    terms.push(current);

    let mut coeffs = [0.0; 3];
    let mut constant = 0.0;
    for term in terms {
        let (sign, body) = match term.strip_prefix('-') {
            Some(rest) => (-1.0, rest),
            None => (1.0, term.strip_prefix('+').unwrap_or(&term)),
        };
        let axis = body.chars().last().and_then(|c| match c {
            'x' => Some(0),
            'y' => Some(1),
            'z' => Some(2),
            _ => None,
        });
        match axis {
            Some(axis) => {
                let factor = body[..body.len() - 1].trim_end_matches('*');
                let factor = if factor.is_empty() {
                    1.0
                } else {
                    parse_fraction(factor)?
                };
                coeffs[axis] += sign * factor;
            }
            None => constant += sign * parse_fraction(body)?,
        }
    }
    Some((coeffs, constant))
}

fn parse_fraction(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            Some(num.parse::<f64>().ok()? / den)
        }
        None => raw.parse().ok(),
    }
}

fn periodic_close(a: &Vec3, b: &Vec3) -> bool {
    (0..3).all(|i| {
        let d = (a[i] - b[i]).abs();
        d.min(1.0 - d) < DEDUP_TOL
    })
}

pub fn parse(text: &str) -> Result<Structure, StructureError> {
    let (values, loops) = scan(text);

    let cell = |key: &str| -> Result<f64, StructureError> {
        values
            .get(key)
            .and_then(|v| parse_number(v))
            .ok_or_else(|| err(format!("missing or invalid {key}")))
    };
    let lattice = Lattice::from_parameters(
        cell("_cell_length_a")?,
        cell("_cell_length_b")?,
        cell("_cell_length_c")?,
        cell("_cell_angle_alpha")?,
        cell("_cell_angle_beta")?,
        cell("_cell_angle_gamma")?,
    );
    if lattice.is_singular() {
        return Err(StructureError::SingularLattice);
    }

    let mut ops = Vec::new();
    for lp in &loops {
        if let Some(col) =
            lp.column(&["_symmetry_equiv_pos_as_xyz", "_space_group_symop_operation_xyz"])
        {
            for row in &lp.rows {
                ops.push(SymOp::parse(&row[col])?);
            }
        }
    }
    if ops.is_empty() {
        ops.push(SymOp::identity());
    }

    let atom_loop = loops
        .iter()
        .find(|lp| lp.column(&["_atom_site_fract_x"]).is_some())
        .ok_or_else(|| err("missing _atom_site loop with fractional coordinates"))?;
    let col_x = atom_loop.column(&["_atom_site_fract_x"]).unwrap_or(0);
    let col_y = atom_loop
        .column(&["_atom_site_fract_y"])
        .ok_or_else(|| err("missing _atom_site_fract_y"))?;
    let col_z = atom_loop
        .column(&["_atom_site_fract_z"])
        .ok_or_else(|| err("missing _atom_site_fract_z"))?;
    let col_symbol = atom_loop
        .column(&["_atom_site_type_symbol", "_atom_site_label"])
        .ok_or_else(|| err("missing _atom_site_type_symbol or _atom_site_label"))?;

    let candidates = atom_loop.rows.len().saturating_mul(ops.len());
    if candidates > MAX_EXPANDED_SITES {
        return Err(err(format!(
            "{} atom sites x {} symmetry operations exceeds {MAX_EXPANDED_SITES} candidate positions",
            atom_loop.rows.len(),
            ops.len()
        )));
    }

    let mut sites: Vec<Site> = Vec::new();
    for row in &atom_loop.rows {
        let species = symbol_re()
            .captures(&row[col_symbol])
            .map(|c| c[1].to_string())
            .ok_or_else(|| err(format!("invalid atom symbol '{}'", row[col_symbol])))?;
        let coord = |col: usize| {
            parse_number(&row[col]).ok_or_else(|| err(format!("invalid coordinate '{}'", row[col])))
        };
        let base = [coord(col_x)?, coord(col_y)?, coord(col_z)?];
        for op in &ops {
            let frac = op.apply(&base);
            let duplicate = sites
                .iter()
                .any(|s| s.species == species && periodic_close(&s.frac_coords, &frac));
            if !duplicate {
                sites.push(Site::new(species.clone(), frac));
            }
        }
    }
    if sites.is_empty() {
        return Err(err("no atoms found"));
    }

    Ok(Structure::new(lattice, sites))
}

/// 写出 P1 CIF
pub fn write(structure: &Structure) -> String {
    let [a, b, c] = structure.lattice.lengths();
    let [alpha, beta, gamma] = structure.lattice.angles();
    let mut out = String::new();
    out.push_str(&format!("data_{}\n", structure.reduced_formula()));
    out.push_str("_symmetry_space_group_name_H-M   'P 1'\n");
    out.push_str(&format!("_cell_length_a   {a:.8}\n"));
    out.push_str(&format!("_cell_length_b   {b:.8}\n"));
    out.push_str(&format!("_cell_length_c   {c:.8}\n"));
    out.push_str(&format!("_cell_angle_alpha   {alpha:.8}\n"));
    out.push_str(&format!("_cell_angle_beta   {beta:.8}\n"));
    out.push_str(&format!("_cell_angle_gamma   {gamma:.8}\n"));
    out.push_str("_symmetry_Int_Tables_number   1\n");
    out.push_str(&format!("_chemical_formula_structural   {}\n", structure.reduced_formula()));
    out.push_str(&format!("_chemical_formula_sum   '{}'\n", structure.formula()));
    out.push_str(&format!("_cell_volume   {:.8}\n", structure.lattice.volume()));
    out.push_str("loop_\n _symmetry_equiv_pos_site_id\n _symmetry_equiv_pos_as_xyz\n  1  'x, y, z'\n");
    out.push_str("loop_\n _atom_site_type_symbol\n _atom_site_label\n _atom_site_symmetry_multiplicity\n");
    out.push_str(" _atom_site_fract_x\n _atom_site_fract_y\n _atom_site_fract_z\n _atom_site_occupancy\n");
    for (i, site) in structure.sites.iter().enumerate() {
        let [x, y, z] = site.frac_coords;
        out.push_str(&format!(
            "  {sp}  {sp}{i}  1  {x:.8}  {y:.8}  {z:.8}  1\n",
            sp = site.species
        ));
    }
    out
}
