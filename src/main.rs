//! Drug resistance worker main executable

pub mod common;
pub mod compare;
pub mod conf;
pub mod engine;
pub mod err;
pub mod mutations;
pub mod rules;
pub mod score;
pub mod scoring;

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Drug resistance scoring",
    long_about = "This tool scores amino acid mutations against drug resistance rule sets"
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
    /// Score mutation lists.
    Score(score::Args),
    /// Compare classifications across rule sets.
    Compare(compare::cli::Args),
    /// Rule related commands.
    Rules(Rules),
}

/// Parsing of "rules *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Rules {
    /// The sub command to run
    #[command(subcommand)]
    command: RulesCommands,
}

/// Enum supporting the parsing of "rules *" sub commands.
#[derive(Debug, Subcommand)]
enum RulesCommands {
    Check(rules::cli::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
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
            Commands::Score(args) => score::run(&cli.common, args)?,
            Commands::Compare(args) => compare::cli::run(&cli.common, args)?,
            Commands::Rules(rules) => match &rules.command {
                RulesCommands::Check(args) => rules::cli::run(&cli.common, args)?,
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
