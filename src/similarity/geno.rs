//! Genotype similarity scoring over candidate genes and exome variants.

use indexmap::IndexSet;
use itertools::Itertools;

use crate::similarity::schema::{AccessType, Exome, GeneStatus, Patient, Variant};

/// Per-gene score of a manually curated gene.
const MANUAL_GENE_SCORE: f64 = 1.0;

/// Weight applied to exome gene scores relative to manual curation.
const EXOME_SCORE_WEIGHT: f64 = 0.5;

/// Maximum number of genes rendered in the JSON gene-match array.
const MAX_GENES_SHOWN: usize = 5;

/// Maximum number of variants rendered per gene.
const MAX_VARIANTS_SHOWN: usize = 5;

/// The genotype of one patient: the effective manual gene set plus exome
/// data.
#[derive(Debug, Clone)]
pub struct PatientGenotype {
    /// Manually curated genes; solved genes take precedence over candidates.
    manual_genes: IndexSet<String>,
    /// Per-gene ranked exome variants.
    exome: Exome,
}

impl PatientGenotype {
    /// Build from a patient record.
    ///
    /// If any solved genes exist they form the manual gene set, otherwise the
    /// candidate genes do; rejected genes and blank names never participate.
    pub fn new(patient: &Patient) -> Self {
        let genes_with_status = |status: GeneStatus| -> IndexSet<String> {
            patient
                .genes
                .iter()
                .filter(|g| g.status == status)
                .map(|g| g.gene.trim().to_string())
                .filter(|gene| !gene.is_empty())
                .collect()
        };
        let solved = genes_with_status(GeneStatus::Solved);
        let manual_genes = if solved.is_empty() {
            genes_with_status(GeneStatus::Candidate)
        } else {
            solved
        };
        let exome = patient
            .exome
            .as_deref()
            .map(Exome::from_records)
            .unwrap_or_default();
        Self {
            manual_genes,
            exome,
        }
    }

    /// Return whether the patient has any genotype data at all.
    pub fn has_genotype_data(&self) -> bool {
        !self.manual_genes.is_empty() || !self.exome.is_empty()
    }

    /// Return all genes "in" the patient: manual genes plus exome genes with
    /// a nonzero score.
    pub fn genes(&self) -> IndexSet<String> {
        let mut genes = self.manual_genes.clone();
        for gene in self.exome.genes() {
            if self.exome.gene_score(gene).unwrap_or(0.0) > 0.0 {
                genes.insert(gene.to_string());
            }
        }
        genes
    }

    /// Return the score of a gene: 1.0 if manually listed, else the
    /// down-weighted exome score, else absent.
    pub fn gene_score(&self, gene: &str) -> Option<f64> {
        if self.manual_genes.contains(gene) {
            return Some(MANUAL_GENE_SCORE);
        }
        self.exome
            .gene_score(gene)
            .filter(|score| *score > 0.0)
            .map(|score| EXOME_SCORE_WEIGHT * score)
    }

    /// Return up to `count` top-ranked exome variants of a gene.
    pub fn top_variants(&self, gene: &str, count: usize) -> &[Variant] {
        self.exome.top_variants(gene, count)
    }
}

/// Genotype similarity of one ordered (reference, match) patient pair.
#[derive(Debug, Clone)]
pub struct GenotypeSimilarityView {
    reference: PatientGenotype,
    matched: PatientGenotype,
    /// Genes in both patients with their contribution, sorted descending.
    gene_contributions: Vec<(String, f64)>,
}

impl GenotypeSimilarityView {
    /// Score the genotypes of two patients.
    pub fn new(reference: &Patient, matched: &Patient) -> Self {
        let reference = PatientGenotype::new(reference);
        let matched = PatientGenotype::new(matched);
        let gene_contributions = reference
            .genes()
            .intersection(&matched.genes())
            .filter_map(|gene| {
                match (reference.gene_score(gene), matched.gene_score(gene)) {
                    (Some(score_ref), Some(score_match)) => {
                        Some((gene.clone(), (score_ref + score_match) / 2.0))
                    }
                    _ => None,
                }
            })
            .sorted_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
            .collect();
        Self {
            reference,
            matched,
            gene_contributions,
        }
    }

    /// Return whether both patients carry genotype data.
    pub fn has_genotype_data(&self) -> bool {
        self.reference.has_genotype_data() && self.matched.has_genotype_data()
    }

    /// Return the genes present in both patients, best contribution first.
    pub fn matching_genes(&self) -> Vec<&str> {
        self.gene_contributions
            .iter()
            .map(|(gene, _)| gene.as_str())
            .collect()
    }

    /// Aggregate genotype score, the best per-gene contribution.
    pub fn score(&self) -> f64 {
        self.gene_contributions
            .first()
            .map(|(_, contribution)| *contribution)
            .unwrap_or(0.0)
    }

    /// Render the gene-match array as JSON.
    ///
    /// The reference side is always fully disclosed; the match side's
    /// variant detail is gated by the access level.  No access yields an
    /// empty array.
    pub fn to_json(&self, access: AccessType) -> serde_json::Value {
        if access == AccessType::None {
            return serde_json::json!([]);
        }
        let genes: Vec<serde_json::Value> = self
            .gene_contributions
            .iter()
            .take(MAX_GENES_SHOWN)
            .map(|(gene, contribution)| {
                serde_json::json!({
                    "gene": gene,
                    "score": contribution,
                    "reference": {
                        "variants": variants_json(
                            self.reference.top_variants(gene, MAX_VARIANTS_SHOWN),
                            AccessType::Open,
                        ),
                    },
                    "match": {
                        "variants": variants_json(
                            self.matched.top_variants(gene, MAX_VARIANTS_SHOWN),
                            access,
                        ),
                    },
                })
            })
            .collect();
        serde_json::Value::Array(genes)
    }
}

fn variants_json(variants: &[Variant], access: AccessType) -> Vec<serde_json::Value> {
    variants
        .iter()
        .filter_map(|variant| variant.to_json(access))
        .collect()
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::similarity::schema::{ExomeVariantRecord, GeneRecord};

    fn variant_record(gene: &str, score: f64) -> ExomeVariantRecord {
        ExomeVariantRecord {
            gene: gene.to_string(),
            chrom: "1".to_string(),
            position: 1000,
            ref_allele: "A".to_string(),
            alt_allele: "T".to_string(),
            effect: Some("missense_variant".to_string()),
            score,
        }
    }

    fn patient_with(
        genes: &[(&str, GeneStatus)],
        exome: Option<Vec<ExomeVariantRecord>>,
    ) -> Patient {
        Patient {
            id: "P".to_string(),
            genes: genes
                .iter()
                .map(|(gene, status)| GeneRecord::new(gene.to_string(), *status))
                .collect(),
            exome,
            ..Default::default()
        }
    }

    #[test]
    fn solved_genes_take_precedence_over_candidates() {
        let patient = patient_with(
            &[
                ("SCN1A", GeneStatus::Candidate),
                ("TTN", GeneStatus::Solved),
            ],
            None,
        );
        let genotype = PatientGenotype::new(&patient);
        assert_eq!(genotype.gene_score("TTN"), Some(1.0));
        assert_eq!(genotype.gene_score("SCN1A"), None);
    }

    #[test]
    fn rejected_genes_never_participate() {
        let patient = patient_with(&[("SCN1A", GeneStatus::Rejected)], None);
        let genotype = PatientGenotype::new(&patient);
        assert!(!genotype.has_genotype_data());
        assert_eq!(genotype.gene_score("SCN1A"), None);
    }

    #[test]
    fn manual_listing_beats_exome_score() {
        let patient = patient_with(
            &[("SCN1A", GeneStatus::Candidate)],
            Some(vec![variant_record("SCN1A", 0.2)]),
        );
        let genotype = PatientGenotype::new(&patient);
        assert_eq!(genotype.gene_score("SCN1A"), Some(1.0));
    }

    #[test]
    fn exome_only_genes_are_down_weighted() {
        let patient = patient_with(&[], Some(vec![variant_record("TTN", 0.8)]));
        let genotype = PatientGenotype::new(&patient);
        let score = genotype.gene_score("TTN").unwrap();
        assert!(approx_eq!(f64, score, 0.4, epsilon = 1e-12));
    }

    #[test]
    fn aggregate_score_is_max_of_mean_contributions() {
        let p = patient_with(
            &[("SCN1A", GeneStatus::Candidate)],
            Some(vec![variant_record("TTN", 0.8)]),
        );
        let q = patient_with(
            &[("TTN", GeneStatus::Candidate)],
            Some(vec![variant_record("SCN1A", 0.6)]),
        );
        let view = GenotypeSimilarityView::new(&p, &q);
        // SCN1A: (1.0 + 0.3) / 2 = 0.65; TTN: (0.4 + 1.0) / 2 = 0.7.
        assert_eq!(view.matching_genes(), vec!["TTN", "SCN1A"]);
        assert!(approx_eq!(f64, view.score(), 0.7, epsilon = 1e-12));
    }

    #[test]
    fn empty_gene_sets_give_zero_score() {
        let p = patient_with(&[], None);
        let q = patient_with(&[("SCN1A", GeneStatus::Candidate)], None);
        let view = GenotypeSimilarityView::new(&p, &q);
        assert!(view.matching_genes().is_empty());
        assert_eq!(view.score(), 0.0);
        assert!(!view.has_genotype_data());
    }

    #[test]
    fn json_caps_gene_count() {
        let genes = ["G1", "G2", "G3", "G4", "G5", "G6", "G7"];
        let list: Vec<(&str, GeneStatus)> =
            genes.iter().map(|g| (*g, GeneStatus::Candidate)).collect();
        let p = patient_with(&list, None);
        let q = patient_with(&list, None);
        let view = GenotypeSimilarityView::new(&p, &q);
        assert_eq!(view.matching_genes().len(), 7);
        let json = view.to_json(AccessType::Open);
        assert_eq!(json.as_array().unwrap().len(), 5);
    }

    #[test]
    fn json_gated_by_access() {
        let p = patient_with(&[("SCN1A", GeneStatus::Candidate)], None);
        let q = patient_with(&[], Some(vec![variant_record("SCN1A", 0.9)]));
        let view = GenotypeSimilarityView::new(&p, &q);

        assert_eq!(view.to_json(AccessType::None), serde_json::json!([]));

        let open = view.to_json(AccessType::Open);
        let match_variant = &open[0]["match"]["variants"][0];
        assert_eq!(match_variant["position"], 1000);

        let limited = view.to_json(AccessType::Limited);
        let match_variant = &limited[0]["match"]["variants"][0];
        assert_eq!(
            match_variant,
            &serde_json::json!({"score": 0.9, "effect": "missense_variant"})
        );
    }
}
