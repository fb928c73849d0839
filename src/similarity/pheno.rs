//! Phenotype similarity scoring and feature clustering for display.

use indexmap::IndexMap;
use tracing::warn;

use crate::ontology::stats::OntologyStatistics;
use crate::ontology::{Ontology, OntologyLookup};
use crate::similarity::schema::{AccessType, Feature, Patient};

/// Display name of the bucket for features outside every category.
const UNCATEGORIZED_NAME: &str = "Unmatched";

/// A top-level body-system category, a direct child of the ontology root.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct Category {
    /// Term id, empty for the uncategorized bucket.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A group of features of both patients under one category, for display.
#[derive(Debug, Clone)]
pub struct FeatureClusterView {
    /// The category the features fall under.
    pub category: Category,
    /// Features of the reference patient.
    pub reference: Vec<Feature>,
    /// Features of the matched patient.
    pub matched: Vec<Feature>,
}

impl FeatureClusterView {
    /// Render the cluster as JSON.
    ///
    /// The reference side always lists term ids.  The match side is gated:
    /// term ids under open access, `null` entries preserving the count under
    /// limited access, and nothing under no access.
    pub fn to_json(&self, access: AccessType) -> serde_json::Value {
        let reference: Vec<serde_json::Value> = self
            .reference
            .iter()
            .map(|f| serde_json::Value::String(f.id.clone()))
            .collect();
        let matched: Vec<serde_json::Value> = match access {
            AccessType::Open => self
                .matched
                .iter()
                .map(|f| serde_json::Value::String(f.id.clone()))
                .collect(),
            AccessType::Limited => self.matched.iter().map(|_| serde_json::Value::Null).collect(),
            AccessType::None => Vec::new(),
        };
        serde_json::json!({
            "category": {
                "id": self.category.id,
                "name": self.category.name,
            },
            "reference": reference,
            "match": matched,
        })
    }
}

/// Scores pairs of feature sets against precomputed term statistics.
///
/// Stateless apart from the shared read-only inputs; one instance can be
/// used for any number of pairs, concurrently.
pub struct PhenotypeScorer<'a> {
    /// Term resolution and ancestor closure.
    lookup: &'a dyn OntologyLookup,
    /// Precomputed per-term information content.
    statistics: &'a OntologyStatistics,
    /// Top-level categories, ordered lexicographically by term id.
    categories: Vec<Category>,
}

impl<'a> PhenotypeScorer<'a> {
    /// Construct with an explicit lookup and category list.
    pub fn new(
        lookup: &'a dyn OntologyLookup,
        statistics: &'a OntologyStatistics,
        categories: Vec<Category>,
    ) -> Self {
        Self {
            lookup,
            statistics,
            categories,
        }
    }

    /// Construct from a loaded ontology, deriving the category list from the
    /// direct children of the root.
    pub fn for_ontology(ontology: &'a Ontology, statistics: &'a OntologyStatistics) -> Self {
        let categories = ontology
            .top_level_categories()
            .into_iter()
            .map(|term| Category::new(term.id, term.name))
            .collect();
        Self::new(ontology, statistics, categories)
    }

    /// Compute the mutual-information phenotype similarity of two patients.
    ///
    /// Returns `f64::NAN` when either side has no resolvable present
    /// features; callers must treat that as "cannot be compared", not as a
    /// zero score.  Symmetric in its arguments.
    pub fn score(&self, reference: &Patient, matched: &Patient) -> f64 {
        let terms_ref = self.resolvable_present_terms(reference);
        let terms_match = self.resolvable_present_terms(matched);
        if terms_ref.is_empty() || terms_match.is_empty() {
            return f64::NAN;
        }

        let cost_ref: f64 = terms_ref.iter().map(|t| self.term_ic(t)).sum();
        let cost_match: f64 = terms_match.iter().map(|t| self.term_ic(t)).sum();

        let counts_ref = self.ancestor_counts(&terms_ref);
        let counts_match = self.ancestor_counts(&terms_match);
        let shared_cost: f64 = counts_ref
            .iter()
            .filter_map(|(term_id, count_ref)| {
                counts_match.get(term_id).map(|count_match| {
                    self.statistics.parent_cond_ic(term_id).unwrap_or(0.0)
                        * (*count_ref).min(*count_match) as f64
                })
            })
            .sum();

        (2.0 * shared_cost / (cost_ref + cost_match)).tanh()
    }

    /// Group both patients' present features into display clusters.
    ///
    /// A category cluster is only emitted when both sides contribute to it;
    /// one-sided buckets are dumped into the trailing uncategorized cluster.
    pub fn clusters(&self, reference: &Patient, matched: &Patient) -> Vec<FeatureClusterView> {
        let buckets_ref = self.categorize(reference);
        let buckets_match = self.categorize(matched);

        let mut clusters = Vec::new();
        let mut uncat_ref: Vec<Feature> = Vec::new();
        let mut uncat_match: Vec<Feature> = Vec::new();
        for category in &self.categories {
            let in_ref = buckets_ref.get(&category.id);
            let in_match = buckets_match.get(&category.id);
            match (in_ref, in_match) {
                (Some(features_ref), Some(features_match)) => {
                    let (reference, matched) =
                        self.pair_by_name(features_ref.clone(), features_match.clone());
                    clusters.push(FeatureClusterView {
                        category: category.clone(),
                        reference,
                        matched,
                    });
                }
                // One-sided categories are not informative on their own.
                (Some(features_ref), None) => uncat_ref.extend(features_ref.iter().cloned()),
                (None, Some(features_match)) => {
                    uncat_match.extend(features_match.iter().cloned());
                }
                (None, None) => (),
            }
        }

        if let Some(features) = buckets_ref.get("") {
            uncat_ref.extend(features.iter().cloned());
        }
        if let Some(features) = buckets_match.get("") {
            uncat_match.extend(features.iter().cloned());
        }
        if !uncat_ref.is_empty() || !uncat_match.is_empty() {
            let (reference, matched) = self.pair_by_name(uncat_ref, uncat_match);
            clusters.push(FeatureClusterView {
                category: Category::new(String::new(), UNCATEGORIZED_NAME.to_string()),
                reference,
                matched,
            });
        }
        clusters
    }

    /// Return the present features with a resolvable term id, logging the
    /// rest.
    fn resolvable_present_terms(&self, patient: &Patient) -> Vec<String> {
        let mut term_ids = Vec::new();
        for term_id in patient.present_term_ids() {
            if self.lookup.resolve(term_id).is_some() {
                term_ids.push(term_id.to_string());
            } else {
                warn!("skipping unresolvable term {} of {}", term_id, patient.id);
            }
        }
        term_ids
    }

    /// Information content of a term, falling back to the most informative
    /// parent when the term itself carries no statistics.
    fn term_ic(&self, term_id: &str) -> f64 {
        if let Some(ic) = self.statistics.term_ic(term_id) {
            return ic;
        }
        self.lookup
            .resolve(term_id)
            .map(|term| {
                term.parents
                    .iter()
                    .map(|parent| self.term_ic(parent))
                    .fold(0.0, f64::max)
            })
            .unwrap_or(0.0)
    }

    /// Count, per ancestor-or-self term, how many of the patient's distinct
    /// present terms it covers.
    fn ancestor_counts(&self, term_ids: &[String]) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for term_id in term_ids {
            for ancestor in self.lookup.ancestors_and_self(term_id) {
                *counts.entry(ancestor).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Assign each present feature to the first category (in category order)
    /// found in its ancestors-and-self; no category maps to the `""` bucket.
    fn categorize(&self, patient: &Patient) -> IndexMap<String, Vec<Feature>> {
        let mut buckets: IndexMap<String, Vec<Feature>> = IndexMap::new();
        for feature in patient.features.iter().filter(|f| f.present) {
            let ancestors = self.lookup.ancestors_and_self(&feature.id);
            let category_id = self
                .categories
                .iter()
                .find(|category| ancestors.contains(&category.id))
                .map(|category| category.id.clone())
                .unwrap_or_default();
            buckets.entry(category_id).or_default().push(feature.clone());
        }
        buckets
    }

    /// Reorder two feature lists so features with the same display name sit
    /// at matching leading positions.
    fn pair_by_name(
        &self,
        features_ref: Vec<Feature>,
        features_match: Vec<Feature>,
    ) -> (Vec<Feature>, Vec<Feature>) {
        let mut by_name_match: IndexMap<String, Vec<Feature>> = IndexMap::new();
        for feature in features_match {
            by_name_match
                .entry(self.display_name(&feature))
                .or_default()
                .push(feature);
        }

        let mut paired_ref = Vec::new();
        let mut rest_ref = Vec::new();
        let mut paired_match = Vec::new();
        for feature in features_ref {
            let name = self.display_name(&feature);
            if let Some(matching) = by_name_match.get_mut(&name) {
                if !matching.is_empty() {
                    paired_ref.push(feature);
                    paired_match.push(matching.remove(0));
                    continue;
                }
            }
            rest_ref.push(feature);
        }
        paired_ref.extend(rest_ref);
        paired_match.extend(by_name_match.into_iter().flat_map(|(_, features)| features));
        (paired_ref, paired_match)
    }

    /// Display name of a feature: its label, else the term name, else the id.
    fn display_name(&self, feature: &Feature) -> String {
        if let Some(label) = &feature.label {
            if !label.is_empty() {
                return label.clone();
            }
        }
        self.lookup
            .resolve(&feature.id)
            .map(|term| term.name.clone())
            .unwrap_or_else(|| feature.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ontology::stats::tests::fixture_annotations;
    use crate::ontology::tests::fixture_ontology;

    fn patient(id: &str, term_ids: &[&str]) -> Patient {
        Patient {
            id: id.to_string(),
            features: term_ids
                .iter()
                .map(|t| Feature::new(t.to_string(), None, true))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn score_is_symmetric_and_bounded() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        let scorer = PhenotypeScorer::for_ontology(&ontology, &statistics);

        let p = patient("P1", &["HP:0001250"]);
        let q = patient("P2", &["HP:0002060"]);
        let pq = scorer.score(&p, &q);
        let qp = scorer.score(&q, &p);
        assert!(approx_eq!(f64, pq, qp, epsilon = 1e-12));
        assert!(pq > 0.0 && pq < 1.0);
    }

    #[test]
    fn score_is_idempotent() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        let scorer = PhenotypeScorer::for_ontology(&ontology, &statistics);

        let p = patient("P1", &["HP:0001250", "HP:0001627"]);
        let q = patient("P2", &["HP:0002060"]);
        assert_eq!(scorer.score(&p, &q).to_bits(), scorer.score(&p, &q).to_bits());
    }

    #[test]
    fn identical_patients_score_higher_than_distant_ones() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        let scorer = PhenotypeScorer::for_ontology(&ontology, &statistics);

        let p = patient("P1", &["HP:0002060"]);
        let same = scorer.score(&p, &patient("P2", &["HP:0002060"]));
        let distant = scorer.score(&p, &patient("P3", &["HP:0001627"]));
        assert!(same > distant);
    }

    #[test]
    fn empty_or_unresolvable_side_gives_nan() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        let scorer = PhenotypeScorer::for_ontology(&ontology, &statistics);

        let p = patient("P1", &["HP:0001250"]);
        assert!(scorer.score(&p, &patient("P2", &[])).is_nan());
        assert!(scorer.score(&patient("P2", &[]), &p).is_nan());
        assert!(scorer.score(&p, &patient("P3", &["HP:9999999"])).is_nan());
    }

    #[test]
    fn absent_features_do_not_participate() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        let scorer = PhenotypeScorer::for_ontology(&ontology, &statistics);

        let p = patient("P1", &["HP:0001250"]);
        let mut q = patient("P2", &["HP:0001250"]);
        q.features.push(Feature::new("HP:0001627".to_string(), None, false));
        let with_absent = scorer.score(&p, &q);
        let without = scorer.score(&p, &patient("P2", &["HP:0001250"]));
        assert!(approx_eq!(f64, with_absent, without, epsilon = 1e-12));
    }

    #[test]
    fn clusters_emit_shared_categories_only() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        let scorer = PhenotypeScorer::for_ontology(&ontology, &statistics);

        // Both have nervous-system terms; only the reference has a heart term.
        let p = patient("P1", &["HP:0001250", "HP:0001627"]);
        let q = patient("P2", &["HP:0002060"]);
        let clusters = scorer.clusters(&p, &q);
        assert_eq!(clusters.len(), 2);

        assert_eq!(clusters[0].category.id, "HP:0000707");
        assert_eq!(clusters[0].reference.len(), 1);
        assert_eq!(clusters[0].reference[0].id, "HP:0001250");
        assert_eq!(clusters[0].matched[0].id, "HP:0002060");

        // The one-sided heart category lands in the uncategorized bucket.
        assert_eq!(clusters[1].category.id, "");
        assert_eq!(clusters[1].category.name, "Unmatched");
        assert_eq!(clusters[1].reference.len(), 1);
        assert_eq!(clusters[1].reference[0].id, "HP:0001627");
        assert!(clusters[1].matched.is_empty());
    }

    #[test]
    fn clusters_pair_identical_names_first() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        let scorer = PhenotypeScorer::for_ontology(&ontology, &statistics);

        let p = patient("P1", &["HP:0012638", "HP:0001250"]);
        let q = patient("P2", &["HP:0001250", "HP:0002060"]);
        let clusters = scorer.clusters(&p, &q);
        assert_eq!(clusters.len(), 1);
        // The shared "Seizure" feature leads both sides.
        assert_eq!(clusters[0].reference[0].id, "HP:0001250");
        assert_eq!(clusters[0].matched[0].id, "HP:0001250");
    }

    #[test]
    fn cluster_json_gated_by_access() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        let scorer = PhenotypeScorer::for_ontology(&ontology, &statistics);

        let p = patient("P1", &["HP:0001250"]);
        let q = patient("P2", &["HP:0002060", "HP:0012638"]);
        let clusters = scorer.clusters(&p, &q);
        assert_eq!(clusters.len(), 1);

        let open = clusters[0].to_json(AccessType::Open);
        assert_eq!(open["reference"], serde_json::json!(["HP:0001250"]));
        assert_eq!(
            open["match"],
            serde_json::json!(["HP:0002060", "HP:0012638"])
        );

        let limited = clusters[0].to_json(AccessType::Limited);
        assert_eq!(limited["match"], serde_json::json!([null, null]));

        let none = clusters[0].to_json(AccessType::None);
        assert_eq!(none["match"], serde_json::json!([]));
    }
}
