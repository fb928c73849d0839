//! PhenoMatch worker main executable

pub mod common;
pub mod matches;
pub mod matching;
pub mod ontology;
pub mod similarity;

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Patient similarity heavy lifting",
    long_about = "This tool performs the heavy lifting for patient matchmaking"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Ontology-related commands.
    Ontology(Ontology),
    /// Matching-related commands.
    Matching(Matching),
}

/// Parsing of "ontology *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Ontology {
    /// The sub command to run
    #[command(subcommand)]
    command: OntologyCommands,
}

/// Enum supporting the parsing of "ontology *" sub commands.
#[derive(Debug, Subcommand)]
enum OntologyCommands {
    Stats(ontology::stats::Args),
}

/// Parsing of "matching *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Matching {
    /// The sub command to run
    #[command(subcommand)]
    command: MatchingCommands,
}

/// Enum supporting the parsing of "matching *" sub commands.
#[derive(Debug, Subcommand)]
enum MatchingCommands {
    Run(matching::run::Args),
    Score(matching::score::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Ontology(ontology) => match &ontology.command {
                OntologyCommands::Stats(args) => {
                    ontology::stats::run(&cli.common, args)?;
                }
            },
            Commands::Matching(matching) => match &matching.command {
                MatchingCommands::Run(args) => {
                    matching::run::run(&cli.common, args)?;
                }
                MatchingCommands::Score(args) => {
                    matching::score::run(&cli.common, args)?;
                }
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
