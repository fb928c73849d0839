//! Batch matching run over all patient pairs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use clap::Parser;
use itertools::Itertools;
use tracing::{debug, info};

use crate::common::trace_rss_now;
use crate::matches::index::MatchIndex;
use crate::matches::{MatchRecord, PatientRef};
use crate::matching::load_inputs;
use crate::ontology::DEFAULT_ROOT_TERM;
use crate::similarity::pheno::PhenotypeScorer;
use crate::similarity::schema::{AccessType, Patient};
use crate::similarity::view::PatientSimilarityView;

/// Command line arguments for `matching run` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Score all patient pairs and emit matches", long_about = None)]
pub struct Args {
    /// Path to the TSV file with ontology terms.
    #[arg(long, required = true)]
    pub path_terms: String,
    /// Path to the TSV file with disease annotations.
    #[arg(long, required = true)]
    pub path_diseases: String,
    /// Path to the JSON file with patient records.
    #[arg(long, required = true)]
    pub path_patients: String,
    /// Identifier of the root term.
    #[arg(long, default_value = DEFAULT_ROOT_TERM)]
    pub root_term: String,
    /// Minimal combined score for a pair to become a match.
    #[arg(long, default_value_t = 0.1)]
    pub min_score: f64,
    /// Access level applied to the emitted match details.
    #[arg(long, default_value = "open")]
    pub access: AccessType,
    /// Path to the output JSON lines file.
    #[arg(long, required = true)]
    pub path_output: String,
}

/// Snapshot of a patient's features and genes, stored on the match record.
fn details_snapshot(patient: &Patient) -> serde_json::Value {
    serde_json::json!({
        "features": patient.features,
        "genes": patient.genes,
    })
}

/// Main entry point for `matching run` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    let inputs = load_inputs(
        &args.path_terms,
        &args.path_diseases,
        &args.path_patients,
        &args.root_term,
    )?;
    let scorer = PhenotypeScorer::for_ontology(&inputs.ontology, &inputs.statistics);
    trace_rss_now();

    let before_scoring = Instant::now();
    let mut index = MatchIndex::new();
    let mut pairs = 0;
    let mut skipped_nan = 0;
    for (reference, matched) in inputs.patients.iter().tuple_combinations() {
        pairs += 1;
        let view = PatientSimilarityView::new(&scorer, reference, matched, args.access);
        let score = view.score();
        if score.is_nan() {
            debug!("pair ({}, {}) cannot be compared", reference.id, matched.id);
            skipped_nan += 1;
            continue;
        }
        if score < args.min_score {
            continue;
        }
        let mut record = MatchRecord::new(
            PatientRef::new(&reference.id, reference.server_id.as_deref()),
            PatientRef::new(&matched.id, matched.server_id.as_deref()),
            score,
            view.phenotype_score,
            view.genotype_score,
        );
        record.reference_details = Some(details_snapshot(reference));
        record.matched_details = Some(details_snapshot(matched));
        if !index.add(record) {
            debug!(
                "pair ({}, {}) already indexed or fully remote",
                reference.id, matched.id
            );
        }
    }
    info!(
        "scored {} pairs in {:?} ({} not comparable, {} matches kept)",
        pairs,
        before_scoring.elapsed(),
        skipped_nan,
        index.size()
    );

    let mut writer = BufWriter::new(File::create(&args.path_output)?);
    for patient_id in index.local_patient_ids() {
        let matches = index.matches_for_local_patient(patient_id, true);
        let line = serde_json::json!({
            "version": crate::common::worker_version(),
            "patient_id": patient_id,
            "matches": matches,
        });
        writeln!(writer, "{}", serde_json::to_string(&line)?)?;
    }
    writer.flush()?;
    info!("wrote matches for {} patients", index.local_patient_ids().len());

    Ok(())
}
