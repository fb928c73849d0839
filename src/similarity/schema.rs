//! Patient records, genotype data and the access-level disclosure policy.

use indexmap::IndexMap;
use multimap::MultiMap;
use tracing::info;

/// How much matched-patient detail may be revealed to a viewer.
///
/// The variants are ordered by disclosure richness, so `Limited < Open`.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Debug,
    Default,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccessType {
    /// Nothing is disclosed.
    #[default]
    None,
    /// Counts and scores only, no identifying detail.
    Limited,
    /// Full disclosure.
    Open,
}

/// A phenotype feature of a patient.
#[serde_with::skip_serializing_none]
#[derive(serde::Serialize, serde::Deserialize, derive_new::new, Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    /// Ontology term id, e.g. `HP:0001250`.
    pub id: String,
    /// Free-text display label.
    pub label: Option<String>,
    /// Whether the feature was observed (as opposed to explicitly excluded).
    #[serde(default = "default_true")]
    pub present: bool,
}

fn default_true() -> bool {
    true
}

/// Curation status of a gene flagged for a patient.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GeneStatus {
    /// Suspected causal.
    Candidate,
    /// Confirmed causal.
    Solved,
    /// Ruled out.
    Rejected,
}

/// A manually curated gene entry of a patient.
#[derive(serde::Serialize, serde::Deserialize, derive_new::new, Debug, Clone, PartialEq, Eq)]
pub struct GeneRecord {
    /// Gene symbol.
    pub gene: String,
    /// Curation status.
    pub status: GeneStatus,
}

/// Normalize a chromosome name: upper-case, strip any `CHR` prefix, `MT`
/// becomes `M`.
pub fn normalize_chrom(chrom: &str) -> String {
    let chrom = chrom.trim().to_uppercase();
    let chrom = chrom.strip_prefix("CHR").unwrap_or(&chrom);
    if chrom == "MT" {
        "M".to_string()
    } else {
        chrom.to_string()
    }
}

/// A single scored exome variant record, as loaded from a patient's exome
/// call list (one row per variant, keyed by gene).
#[serde_with::skip_serializing_none]
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct ExomeVariantRecord {
    /// Gene symbol the variant falls in.
    pub gene: String,
    /// Chromosome name (normalized on conversion to `Variant`).
    pub chrom: String,
    /// 1-based position.
    pub position: i64,
    /// Reference allele.
    pub ref_allele: String,
    /// Alternative allele.
    pub alt_allele: String,
    /// Predicted effect label, e.g. `missense_variant`.
    pub effect: Option<String>,
    /// Harmfulness score in `[0, 1]`.
    pub score: f64,
}

/// A scored variant of one gene.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// Normalized chromosome name.
    pub chrom: String,
    /// 1-based position.
    pub position: i64,
    /// Reference allele.
    pub ref_allele: String,
    /// Alternative allele.
    pub alt_allele: String,
    /// Predicted effect label.
    pub effect: Option<String>,
    /// Harmfulness score in `[0, 1]`.
    pub score: f64,
}

impl From<&ExomeVariantRecord> for Variant {
    fn from(record: &ExomeVariantRecord) -> Self {
        Self {
            chrom: normalize_chrom(&record.chrom),
            position: record.position,
            ref_allele: record.ref_allele.clone(),
            alt_allele: record.alt_allele.clone(),
            effect: record.effect.clone(),
            score: record.score,
        }
    }
}

impl Variant {
    /// Render the variant as JSON, disclosing detail per the access level.
    ///
    /// Returns `None` for `AccessType::None`.
    pub fn to_json(&self, access: AccessType) -> Option<serde_json::Value> {
        match access {
            AccessType::None => None,
            AccessType::Limited => Some(serde_json::json!({
                "score": self.score,
                "effect": self.effect,
            })),
            AccessType::Open => Some(serde_json::json!({
                "chrom": self.chrom,
                "position": self.position,
                "ref": self.ref_allele,
                "alt": self.alt_allele,
                "effect": self.effect,
                "score": self.score,
            })),
        }
    }
}

/// Per-gene ranked variant lists of one patient's exome data.
#[derive(Debug, Clone, Default)]
pub struct Exome {
    /// Variants per gene, ranked by descending score.
    variants: IndexMap<String, Vec<Variant>>,
}

impl Exome {
    /// Group a flat variant record list per gene and rank each gene's
    /// variants by descending score.
    pub fn from_records(records: &[ExomeVariantRecord]) -> Self {
        let by_gene: MultiMap<String, Variant> = records
            .iter()
            .map(|record| (record.gene.trim().to_string(), Variant::from(record)))
            .filter(|(gene, _)| !gene.is_empty())
            .collect();
        let mut variants = IndexMap::new();
        for (gene, mut gene_variants) in by_gene {
            gene_variants.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            variants.insert(gene, gene_variants);
        }
        variants.sort_keys();
        Self { variants }
    }

    /// Return the gene symbols with at least one variant.
    pub fn genes(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    /// Return the aggregate score of a gene, the maximum over its variants.
    pub fn gene_score(&self, gene: &str) -> Option<f64> {
        self.variants
            .get(gene)
            .and_then(|variants| variants.first())
            .map(|variant| variant.score)
    }

    /// Return up to `count` top-ranked variants of a gene.
    pub fn top_variants(&self, gene: &str, count: usize) -> &[Variant] {
        self.variants
            .get(gene)
            .map(|variants| &variants[..variants.len().min(count)])
            .unwrap_or(&[])
    }

    /// Return whether the exome has no variants at all.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// A patient record as consumed by the scorers.
#[serde_with::skip_serializing_none]
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Default)]
pub struct Patient {
    /// Patient id, unique per server.
    pub id: String,
    /// Originating server id; `None` for a local patient.
    pub server_id: Option<String>,
    /// Phenotype features.
    #[serde(default)]
    pub features: Vec<Feature>,
    /// Manually curated genes.
    #[serde(default)]
    pub genes: Vec<GeneRecord>,
    /// Exome variant calls, if any.
    #[serde(default)]
    pub exome: Option<Vec<ExomeVariantRecord>>,
}

impl Patient {
    /// Return whether the patient is local, i.e. has no originating server.
    pub fn is_local(&self) -> bool {
        self.server_id.as_deref().map_or(true, str::is_empty)
    }

    /// Return the term ids of the present features.
    pub fn present_term_ids(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|f| f.present)
            .map(|f| f.id.as_str())
            .collect()
    }
}

/// Read the JSON patients file.
///
/// # Errors
///
/// In the case that the file could not be read or parsed.
pub fn load_patients<P: AsRef<std::path::Path>>(path: &P) -> Result<Vec<Patient>, anyhow::Error> {
    let reader = std::fs::File::open(path.as_ref())?;
    let patients: Vec<Patient> = serde_json::from_reader(std::io::BufReader::new(reader))?;
    info!("loaded {} patients", patients.len());
    Ok(patients)
}
