//! Combined similarity view of one ordered (reference, match) patient pair.

use crate::similarity::geno::GenotypeSimilarityView;
use crate::similarity::pheno::{FeatureClusterView, PhenotypeScorer};
use crate::similarity::schema::{AccessType, Patient};

/// Phenotype and genotype similarity of one pair, with gated disclosure.
pub struct PatientSimilarityView {
    /// Id of the reference patient.
    pub reference_id: String,
    /// Id of the matched patient.
    pub matched_id: String,
    /// Phenotype similarity score; NaN when the pair cannot be compared.
    pub phenotype_score: f64,
    /// Aggregate genotype similarity score.
    pub genotype_score: f64,
    /// Access level applied to all disclosure of matched-patient detail.
    pub access: AccessType,
    clusters: Vec<FeatureClusterView>,
    genotype: GenotypeSimilarityView,
}

impl PatientSimilarityView {
    /// Score a pair of patients.
    pub fn new(
        scorer: &PhenotypeScorer<'_>,
        reference: &Patient,
        matched: &Patient,
        access: AccessType,
    ) -> Self {
        let genotype = GenotypeSimilarityView::new(reference, matched);
        Self {
            reference_id: reference.id.clone(),
            matched_id: matched.id.clone(),
            phenotype_score: scorer.score(reference, matched),
            genotype_score: genotype.score(),
            access,
            clusters: scorer.clusters(reference, matched),
            genotype,
        }
    }

    /// Combined score used for ranking.
    ///
    /// The phenotype score alone when the genotype score is zero or either
    /// side lacks genotype data, otherwise the mean of both scores.  A NaN
    /// phenotype score propagates.
    pub fn score(&self) -> f64 {
        if self.genotype_score == 0.0 || !self.genotype.has_genotype_data() {
            self.phenotype_score
        } else {
            0.5 * self.phenotype_score + 0.5 * self.genotype_score
        }
    }

    /// The feature clusters of the pair.
    pub fn clusters(&self) -> &[FeatureClusterView] {
        &self.clusters
    }

    /// The genotype view of the pair.
    pub fn genotype(&self) -> &GenotypeSimilarityView {
        &self.genotype
    }

    /// Render the full view as JSON, gated by the view's access level.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "reference": self.reference_id,
            "match": self.matched_id,
            "access": self.access.to_string(),
            "score": json_score(self.score()),
            "phenotype_score": json_score(self.phenotype_score),
            "genotype_score": json_score(self.genotype_score),
            "feature_clusters": self
                .clusters
                .iter()
                .map(|cluster| cluster.to_json(self.access))
                .collect::<Vec<_>>(),
            "gene_matches": self.genotype.to_json(self.access),
        })
    }
}

/// NaN has no JSON representation; render it as `null`.
fn json_score(score: f64) -> serde_json::Value {
    if score.is_nan() {
        serde_json::Value::Null
    } else {
        serde_json::json!(score)
    }
}
