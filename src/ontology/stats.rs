//! Precomputation of per-term information content from disease annotations.

use std::time::Instant;

use clap::Parser;
use indexmap::{IndexMap, IndexSet};
use tracing::{info, warn};

use crate::common::trace_rss_now;
use crate::ontology::{load_ontology, Ontology, OntologyLookup, DEFAULT_ROOT_TERM};

/// Small value used to round probabilities too close to 0 or 1.
const EPS: f64 = 1e-9;

/// Frequency assumed for a disease symptom without an explicit annotation.
const DEFAULT_FREQUENCY: f64 = 0.25;

/// Data structure for representing a row of the disease annotations file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiseaseAnnotation {
    /// Disease id, e.g. `MIM:101200`.
    pub disease_id: String,
    /// Symptom term id.
    pub term_id: String,
    /// Approximate frequency of the symptom in the disease, in (0, 1].
    pub frequency: Option<f64>,
}

/// Read the TSV disease annotations file.
///
/// # Errors
///
/// In the case that the file could not be read.
pub fn load_annotations<P: AsRef<std::path::Path>>(
    path: &P,
) -> Result<Vec<DiseaseAnnotation>, anyhow::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path.as_ref())?;
    let mut annotations = Vec::new();
    for result in rdr.deserialize() {
        let annotation: DiseaseAnnotation = result?;
        annotations.push(annotation);
    }
    info!("loaded {} disease annotations", annotations.len());
    Ok(annotations)
}

/// Immutable per-term information content, computed once per ontology
/// version and shared read-only by all scoring calls.
#[derive(Debug, Clone)]
pub struct OntologyStatistics {
    /// Information content (`-ln p`) of each term under the root.
    term_ic: IndexMap<String, f64>,
    /// Bound on `-ln P(t | parents(t))` of each term under the root.
    parent_cond_ic: IndexMap<String, f64>,
}

impl OntologyStatistics {
    /// Precompute statistics from the ontology and disease annotations.
    ///
    /// This is a full-ontology traversal and is expensive; call it during
    /// startup, before any scoring.
    pub fn compute(ontology: &Ontology, annotations: &[DiseaseAnnotation]) -> Self {
        let before = Instant::now();
        let children = ontology.children_map();
        let descendants = descendants_map(ontology.root(), &children);
        let term_freq = term_frequencies(ontology, annotations, &descendants);
        let term_ic = term_ics(ontology.root(), &term_freq, &descendants);
        let parent_cond_ic = cond_ics(ontology, &term_ic);
        info!(
            "precomputed statistics for {} terms in {:?}",
            term_ic.len(),
            before.elapsed()
        );
        Self {
            term_ic,
            parent_cond_ic,
        }
    }

    /// Return the information content of a term, if known.
    pub fn term_ic(&self, term_id: &str) -> Option<f64> {
        self.term_ic.get(term_id).copied()
    }

    /// Return the parent-conditional information content of a term, if known.
    pub fn parent_cond_ic(&self, term_id: &str) -> Option<f64> {
        self.parent_cond_ic.get(term_id).copied()
    }

    /// Return the number of terms with statistics.
    pub fn len(&self) -> usize {
        self.term_ic.len()
    }

    /// Return whether no statistics were computed.
    pub fn is_empty(&self) -> bool {
        self.term_ic.is_empty()
    }

    /// Iterate over `(term id, IC, conditional IC)` rows in term order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, f64, f64)> {
        self.term_ic.iter().map(|(id, ic)| {
            (
                id.as_str(),
                *ic,
                self.parent_cond_ic.get(id).copied().unwrap_or(0.0),
            )
        })
    }
}

/// Bound probability to between (0, 1) exclusive.
fn limit_prob(prob: f64) -> f64 {
    prob.clamp(EPS, 1.0 - EPS)
}

/// Return a map of each term under `root` to its descendant set (self
/// included), via an iterative post-order traversal over the children map.
fn descendants_map(
    root: &str,
    children: &IndexMap<String, Vec<String>>,
) -> IndexMap<String, IndexSet<String>> {
    let mut descendants: IndexMap<String, IndexSet<String>> = IndexMap::new();
    let mut stack: Vec<(String, bool)> = vec![(root.to_string(), false)];
    while let Some((node, expanded)) = stack.pop() {
        if descendants.contains_key(&node) {
            continue;
        }
        if expanded {
            let mut set = IndexSet::new();
            for child in children.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(child_descendants) = descendants.get(child) {
                    set.extend(child_descendants.iter().cloned());
                }
            }
            set.insert(node.clone());
            descendants.insert(node, set);
        } else {
            stack.push((node.clone(), true));
            for child in children.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
                if !descendants.contains_key(child) {
                    stack.push((child.clone(), false));
                }
            }
        }
    }
    descendants
}

/// Return the normalized frequency distribution over annotated symptom terms.
///
/// Only terms under the root participate; annotations naming other terms are
/// counted and logged.  Missing explicit frequencies default to
/// `DEFAULT_FREQUENCY`.
fn term_frequencies(
    ontology: &Ontology,
    annotations: &[DiseaseAnnotation],
    descendants: &IndexMap<String, IndexSet<String>>,
) -> IndexMap<String, f64> {
    let mut term_freq: IndexMap<String, f64> = IndexMap::new();
    let mut freq_denom = 0.0;
    let mut ignored: IndexSet<&str> = IndexSet::new();
    for annotation in annotations {
        if ontology.resolve(&annotation.term_id).is_none()
            || !descendants.contains_key(&annotation.term_id)
        {
            ignored.insert(annotation.term_id.as_str());
            continue;
        }
        let freq = annotation.frequency.unwrap_or(DEFAULT_FREQUENCY);
        freq_denom += freq;
        *term_freq.entry(annotation.term_id.clone()).or_insert(0.0) += freq;
    }
    if !ignored.is_empty() {
        warn!("ignored {} symptoms outside the ontology root", ignored.len());
    }

    // Normalize all the term frequencies to be a proper distribution.
    for freq in term_freq.values_mut() {
        *freq = limit_prob(*freq / freq_denom);
    }
    term_freq
}

/// Return the information content of every term under the root.
fn term_ics(
    root: &str,
    term_freq: &IndexMap<String, f64>,
    descendants: &IndexMap<String, IndexSet<String>>,
) -> IndexMap<String, f64> {
    let mut term_ic = IndexMap::new();
    for (term_id, term_descendants) in descendants {
        // Sum up frequencies of all descendants (self included).
        let prob_mass: f64 = term_descendants
            .iter()
            .filter_map(|d| term_freq.get(d))
            .sum();
        if term_id == root && (prob_mass - 1.0).abs() > 1e-6 {
            warn!(
                "probability mass under {} should be 1.0, was: {:.6}",
                root, prob_mass
            );
        }
        if prob_mass > EPS {
            term_ic.insert(term_id.clone(), -limit_prob(prob_mass).ln());
        }
    }
    term_ic
}

/// Return the approximate conditional information content of every term,
/// `max(0, IC(t) - max(IC(parent)))`, or `IC(t)` for parentless terms.
fn cond_ics(ontology: &Ontology, term_ic: &IndexMap<String, f64>) -> IndexMap<String, f64> {
    let mut parent_cond_ic = IndexMap::new();
    for (term_id, ic) in term_ic {
        let parent_ic = ontology
            .resolve(term_id)
            .map(|term| {
                term.parents
                    .iter()
                    .filter_map(|p| term_ic.get(p))
                    .copied()
                    .fold(f64::NAN, f64::max)
            })
            .filter(|max| max.is_finite());
        let cond_ic = match parent_ic {
            Some(parent_ic) => (ic - parent_ic).max(0.0),
            None => *ic,
        };
        parent_cond_ic.insert(term_id.clone(), cond_ic);
    }
    parent_cond_ic
}

/// Command line arguments for `ontology stats` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Precompute term information content", long_about = None)]
pub struct Args {
    /// Path to the TSV file with ontology terms.
    #[arg(long, required = true)]
    pub path_terms: String,
    /// Path to the TSV file with disease annotations.
    #[arg(long, required = true)]
    pub path_diseases: String,
    /// Identifier of the root term.
    #[arg(long, default_value = DEFAULT_ROOT_TERM)]
    pub root_term: String,
    /// Path to the output TSV file.
    #[arg(long, required = true)]
    pub path_output: String,
}

/// Main entry point for `ontology stats` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    let ontology = load_ontology(&args.path_terms, &args.root_term)?;
    let annotations = load_annotations(&args.path_diseases)?;
    let statistics = OntologyStatistics::compute(&ontology, &annotations);
    trace_rss_now();

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&args.path_output)?;
    wtr.write_record(["term_id", "information_content", "conditional_information_content"])?;
    for (term_id, ic, cond_ic) in statistics.rows() {
        wtr.write_record([term_id, format!("{ic}").as_str(), format!("{cond_ic}").as_str()])?;
    }
    wtr.flush()?;
    info!("wrote statistics for {} terms", statistics.len());

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ontology::tests::fixture_ontology;

    /// Uniform annotations over the leaf-most terms of the fixture ontology.
    pub(crate) fn fixture_annotations() -> Vec<DiseaseAnnotation> {
        let mut annotations = Vec::new();
        for (disease, terms) in [
            ("MIM:000001", vec!["HP:0001250", "HP:0001627"]),
            ("MIM:000002", vec!["HP:0002060"]),
            ("MIM:000003", vec!["HP:0001250", "HP:0012638"]),
        ] {
            for term in terms {
                annotations.push(DiseaseAnnotation {
                    disease_id: disease.to_string(),
                    term_id: term.to_string(),
                    frequency: None,
                });
            }
        }
        annotations
    }

    #[test]
    fn root_information_content_is_zero() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        assert!(!statistics.is_empty());
        let root_ic = statistics.term_ic("HP:0000118").expect("root has IC");
        assert!(approx_eq!(f64, root_ic, 0.0, epsilon = 1e-6));
    }

    #[test]
    fn information_content_monotone_along_paths() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        // Every (ancestor, descendant) pair along the fixture paths.
        for (ancestor, descendant) in [
            ("HP:0000118", "HP:0000707"),
            ("HP:0000707", "HP:0001250"),
            ("HP:0001250", "HP:0002060"),
            ("HP:0012638", "HP:0002060"),
            ("HP:0000118", "HP:0001626"),
            ("HP:0001626", "HP:0001627"),
        ] {
            let ancestor_ic = statistics.term_ic(ancestor).expect("ancestor has IC");
            let descendant_ic = statistics.term_ic(descendant).expect("descendant has IC");
            assert!(
                ancestor_ic <= descendant_ic + 1e-12,
                "IC({ancestor}) = {ancestor_ic} > IC({descendant}) = {descendant_ic}"
            );
        }
    }

    #[test]
    fn conditional_ic_subtracts_max_parent() {
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        // HP:0002060 has parents HP:0012638 and HP:0001250.
        let ic = statistics.term_ic("HP:0002060").unwrap();
        let parent_ic = statistics
            .term_ic("HP:0012638")
            .unwrap()
            .max(statistics.term_ic("HP:0001250").unwrap());
        let cond_ic = statistics.parent_cond_ic("HP:0002060").unwrap();
        assert!(approx_eq!(f64, cond_ic, (ic - parent_ic).max(0.0), epsilon = 1e-12));
    }

    #[test]
    fn root_conditional_ic_falls_back_to_ic() {
        // The fixture root's only parent (HP:0000001) is outside the rooted
        // subgraph and has no IC, so the conditional IC equals the IC.
        let ontology = fixture_ontology();
        let statistics = OntologyStatistics::compute(&ontology, &fixture_annotations());
        let root_ic = statistics.term_ic("HP:0000118").unwrap();
        let root_cond_ic = statistics.parent_cond_ic("HP:0000118").unwrap();
        assert!(approx_eq!(f64, root_ic, root_cond_ic, epsilon = 1e-12));
    }

    #[test]
    fn annotations_outside_root_are_ignored() {
        let ontology = fixture_ontology();
        let mut annotations = fixture_annotations();
        annotations.push(DiseaseAnnotation {
            disease_id: "MIM:000004".to_string(),
            term_id: "HP:0000001".to_string(),
            frequency: Some(1.0),
        });
        annotations.push(DiseaseAnnotation {
            disease_id: "MIM:000004".to_string(),
            term_id: "HP:9999999".to_string(),
            frequency: Some(1.0),
        });
        let with_ignored = OntologyStatistics::compute(&ontology, &annotations);
        let without = OntologyStatistics::compute(&ontology, &fixture_annotations());
        assert_eq!(with_ignored.len(), without.len());
        for (term_id, ic, _) in without.rows() {
            assert!(approx_eq!(
                f64,
                ic,
                with_ignored.term_ic(term_id).unwrap(),
                epsilon = 1e-12
            ));
        }
    }

    #[test]
    fn explicit_frequencies_shift_the_distribution() {
        let ontology = fixture_ontology();
        let mut annotations = fixture_annotations();
        for annotation in &mut annotations {
            if annotation.term_id == "HP:0001627" {
                annotation.frequency = Some(0.9);
            }
        }
        let statistics = OntologyStatistics::compute(&ontology, &annotations);
        let baseline = OntologyStatistics::compute(&ontology, &fixture_annotations());
        // More probability mass makes the term less informative.
        assert!(
            statistics.term_ic("HP:0001627").unwrap() < baseline.term_ic("HP:0001627").unwrap()
        );
    }
}
