//! Materials Project REST 客户端（GET /materials/summary/，X-API-KEY 认证）

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{MaterialDoc, MaterialEntry, MaterialProperties, UpstreamClient, UpstreamError};
use crate::structure::{Lattice, Mat3, Site, Structure, Vec3};

const SUMMARY_FIELDS: &str = "material_id,formula_pretty,band_gap,formation_energy_per_atom,symmetry";

pub struct MaterialsProjectClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl MaterialsProjectClient {
    /// api_key 缺失时仍可构造，调用时返回 MissingApiKey（与工具级错误一致）
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    async fn summary(&self, query: &[(&str, String)]) -> Result<Vec<SummaryDoc>, UpstreamError> {
        let api_key = self.api_key.as_deref().ok_or(UpstreamError::MissingApiKey)?;
        let url = format!("{}/materials/summary/", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("X-API-KEY", api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        let parsed: SummaryResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(parsed.data)
    }
}

#[async_trait]
impl UpstreamClient for MaterialsProjectClient {
    fn name(&self) -> &str {
        "materials_project"
    }

    async fn search_by_formula(&self, formula: &str, limit: usize) -> Result<Vec<MaterialDoc>, UpstreamError> {
        let docs = self
            .summary(&[
                ("formula", formula.to_string()),
                ("_fields", SUMMARY_FIELDS.to_string()),
                ("_limit", limit.to_string()),
            ])
            .await?;
        Ok(docs.into_iter().take(limit).map(SummaryDoc::into_doc).collect())
    }

    async fn fetch_material(&self, material_id: &str) -> Result<Option<MaterialEntry>, UpstreamError> {
        let docs = self
            .summary(&[
                ("material_ids", material_id.to_string()),
                ("_fields", format!("{SUMMARY_FIELDS},structure")),
            ])
            .await?;
        let Some(doc) = docs.into_iter().find(|d| d.material_id == material_id) else {
            return Ok(None);
        };
        let Some(raw) = doc.structure.clone() else {
            return Err(UpstreamError::Decode(format!("{material_id}: response has no structure")));
        };
        let structure = raw.into_structure()?;
        let summary = doc.into_doc();
        Ok(Some(MaterialEntry {
            material_id: summary.material_id,
            formula: summary.formula,
            space_group: summary.space_group,
            structure,
            properties: summary.properties,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    data: Vec<SummaryDoc>,
}

#[derive(Debug, Clone, Deserialize)]
struct SummaryDoc {
    material_id: String,
    formula_pretty: Option<String>,
    band_gap: Option<f64>,
    formation_energy_per_atom: Option<f64>,
    symmetry: Option<SymmetryDoc>,
    structure: Option<PmgStructure>,
}

#[derive(Debug, Clone, Deserialize)]
struct SymmetryDoc {
    crystal_system: Option<String>,
    symbol: Option<String>,
}

impl SummaryDoc {
    fn into_doc(self) -> MaterialDoc {
        let (crystal_system, space_group) = match self.symmetry {
            Some(sym) => (sym.crystal_system, sym.symbol),
            None => (None, None),
        };
        MaterialDoc {
            formula: self.formula_pretty.unwrap_or_else(|| self.material_id.clone()),
            material_id: self.material_id,
            space_group,
            properties: MaterialProperties {
                band_gap: self.band_gap,
                formation_energy: self.formation_energy_per_atom,
                crystal_system,
            },
        }
    }
}

/// pymatgen Structure.as_dict() 的子集
#[derive(Debug, Clone, Deserialize)]
struct PmgStructure {
    lattice: PmgLattice,
    sites: Vec<PmgSite>,
}

#[derive(Debug, Clone, Deserialize)]
struct PmgLattice {
    matrix: Mat3,
}

#[derive(Debug, Clone, Deserialize)]
struct PmgSite {
    species: Vec<PmgSpecies>,
    abc: Vec3,
}

#[derive(Debug, Clone, Deserialize)]
struct PmgSpecies {
    element: String,
    #[serde(default = "full_occupancy")]
    occu: f64,
}

fn full_occupancy() -> f64 {
    1.0
}

impl PmgStructure {
    fn into_structure(self) -> Result<Structure, UpstreamError> {
        let sites = self
            .sites
            .into_iter()
            .map(|site| {
                // 无序位点取占有率最高的元素
                let species = site
                    .species
                    .into_iter()
                    .max_by(|a, b| a.occu.total_cmp(&b.occu))
                    .map(|s| s.element)
                    .ok_or_else(|| UpstreamError::Decode("site without species".into()))?;
                Ok(Site::new(species, site.abc))
            })
            .collect::<Result<Vec<_>, UpstreamError>>()?;
        Ok(Structure::new(Lattice::new(self.lattice.matrix), sites))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_summary_with_structure() {
        let body = serde_json::json!({
            "data": [{
                "material_id": "mp-149",
                "formula_pretty": "Si",
                "band_gap": 0.85,
                "formation_energy_per_atom": 0.0,
                "symmetry": {"crystal_system": "Cubic", "symbol": "Fd-3m", "number": 227},
                "structure": {
                    "@module": "pymatgen.core.structure",
                    "lattice": {"matrix": [[0.0, 2.73, 2.73], [2.73, 0.0, 2.73], [2.73, 2.73, 0.0]]},
                    "sites": [
                        {"species": [{"element": "Si", "occu": 1}], "abc": [0.0, 0.0, 0.0], "label": "Si"},
                        {"species": [{"element": "Si", "occu": 1}], "abc": [0.25, 0.25, 0.25], "label": "Si"}
                    ]
                }
            }],
            "meta": {"total_doc": 1}
        });
        let parsed: SummaryResponse = serde_json::from_value(body).unwrap();
        let doc = parsed.data[0].clone();
        let structure = doc.structure.clone().unwrap().into_structure().unwrap();
        assert_eq!(structure.len(), 2);
        let summary = doc.into_doc();
        assert_eq!(summary.space_group.as_deref(), Some("Fd-3m"));
        assert_eq!(summary.properties.crystal_system.as_deref(), Some("Cubic"));
        assert_eq!(summary.properties.band_gap, Some(0.85));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_network() {
        let client = MaterialsProjectClient::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
        let err = client.search_by_formula("Si", 5).await.unwrap_err();
        assert!(matches!(err, UpstreamError::MissingApiKey));
    }
}
