//! Matching runs: scoring patient pairs and emitting deduplicated matches.

pub mod run;
pub mod score;

use tracing::info;

use crate::ontology::stats::{load_annotations, OntologyStatistics};
use crate::ontology::{load_ontology, Ontology};
use crate::similarity::schema::{load_patients, Patient};

/// The loaded inputs shared by the `matching *` sub commands.
pub struct MatchingInputs {
    pub ontology: Ontology,
    pub statistics: OntologyStatistics,
    pub patients: Vec<Patient>,
}

/// Load ontology, disease annotations and patients, then precompute the
/// term statistics.
///
/// # Errors
///
/// In the case that any input file could not be read.
pub fn load_inputs(
    path_terms: &str,
    path_diseases: &str,
    path_patients: &str,
    root_term: &str,
) -> Result<MatchingInputs, anyhow::Error> {
    let ontology = load_ontology(&path_terms, root_term)?;
    let annotations = load_annotations(&path_diseases)?;
    let statistics = OntologyStatistics::compute(&ontology, &annotations);
    let patients = load_patients(&path_patients)?;
    info!(
        "inputs ready: {} terms, {} patients ({} local)",
        ontology.len(),
        patients.len(),
        patients.iter().filter(|p| p.is_local()).count()
    );
    Ok(MatchingInputs {
        ontology,
        statistics,
        patients,
    })
}

/// Find a patient record by id.
pub fn find_patient<'a>(patients: &'a [Patient], patient_id: &str) -> Option<&'a Patient> {
    patients.iter().find(|p| p.id == patient_id)
}
