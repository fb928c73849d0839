//! Scoring of a single (reference, match) patient pair.

use std::fs::File;
use std::io::{BufWriter, Write};

use clap::Parser;
use tracing::info;

use crate::matching::{find_patient, load_inputs};
use crate::ontology::DEFAULT_ROOT_TERM;
use crate::similarity::pheno::PhenotypeScorer;
use crate::similarity::schema::AccessType;
use crate::similarity::view::PatientSimilarityView;

/// Command line arguments for `matching score` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Score one pair of patients", long_about = None)]
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
    /// Id of the reference patient.
    #[arg(long, required = true)]
    pub reference: String,
    /// Id of the patient to match against.
    #[arg(long = "match", required = true)]
    pub matched: String,
    /// Access level applied to the emitted detail.
    #[arg(long, default_value = "open")]
    pub access: AccessType,
    /// Path to the output JSON file; stdout if missing.
    #[arg(long)]
    pub path_output: Option<String>,
}

/// Main entry point for `matching score` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    let inputs = load_inputs(
        &args.path_terms,
        &args.path_diseases,
        &args.path_patients,
        &args.root_term,
    )?;
    let reference = find_patient(&inputs.patients, &args.reference)
        .ok_or_else(|| anyhow::anyhow!("no such patient: {}", args.reference))?;
    let matched = find_patient(&inputs.patients, &args.matched)
        .ok_or_else(|| anyhow::anyhow!("no such patient: {}", args.matched))?;

    let scorer = PhenotypeScorer::for_ontology(&inputs.ontology, &inputs.statistics);
    let view = PatientSimilarityView::new(&scorer, reference, matched, args.access);
    info!(
        "pair ({}, {}): combined score {}",
        reference.id,
        matched.id,
        view.score()
    );

    let json = view.to_json();
    match &args.path_output {
        Some(path_output) => {
            let mut writer = BufWriter::new(File::create(path_output)?);
            writeln!(writer, "{}", serde_json::to_string_pretty(&json)?)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            writeln!(writer, "{}", serde_json::to_string_pretty(&json)?)?;
        }
    }

    Ok(())
}
