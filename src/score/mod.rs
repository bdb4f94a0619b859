//! Implementation of the `score` sub command.

use std::{io::Write, time::Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::{
    common::{
        io::{open_write_maybe_gz, read_lines},
        worker_version, Gene,
    },
    engine::Engine,
    mutations::MutationSet,
    scoring::aggregate::GeneResistance,
};

/// Command line arguments for `score` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "score mutation lists against a rule set", long_about = None)]
pub struct Args {
    /// Path to the rule set configuration TOML file.
    #[arg(long)]
    pub path_conf: String,
    /// Identifier of the rule set; the first configured one by default.
    #[arg(long)]
    pub rule_set: Option<String>,
    /// The gene to score.
    #[arg(long, value_enum)]
    pub gene: Gene,
    /// Mutation list to score, e.g., "M41L, T215Y".
    #[arg(long, required_unless_present = "path_input")]
    pub mutations: Option<String>,
    /// File with one mutation list per line; unparsable lines are skipped.
    #[arg(long, conflicts_with = "mutations")]
    pub path_input: Option<String>,
    /// Path to the output JSONL file, "-" for stdout.
    #[arg(long, default_value = "-")]
    pub path_output: String,
}

/// One line of the output.
#[derive(Serialize, Debug)]
struct Record<'a> {
    worker_version: &'static str,
    input: &'a str,
    result: &'a GeneResistance,
    triggered_mutations: Vec<String>,
}

/// Parse one input line, with or without gene prefixes.
fn parse_line(gene: Gene, line: &str) -> Result<MutationSet, anyhow::Error> {
    MutationSet::parse_for_gene(gene, line)
        .map_err(|e| anyhow::anyhow!("invalid mutations {:?}: {}", line, e))
}

/// Score every line of `lines`, in parallel.
///
/// Lines that do not parse are logged and skipped, errors of the engine fail
/// the whole batch.
fn score_lines<'a>(
    engine: &Engine,
    rule_set: &str,
    gene: Gene,
    lines: &'a [String],
) -> Result<Vec<(&'a str, GeneResistance)>, anyhow::Error> {
    let results = lines
        .par_iter()
        .map(|line| -> Result<Option<(&'a str, GeneResistance)>, anyhow::Error> {
            match parse_line(gene, line) {
                Ok(mutations) => {
                    let result = engine.score(rule_set, gene, &mutations)?;
                    Ok(Some((line.as_str(), result)))
                }
                Err(e) => {
                    tracing::warn!("skipping line: {}", e);
                    Ok(None)
                }
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(results.into_iter().flatten().collect())
}

/// Main entry point for `score` sub command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `score`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let engine = Engine::load(&args.path_conf)?;
    let rule_set = match &args.rule_set {
        Some(rule_set) => rule_set.clone(),
        None => engine
            .rule_set_ids()
            .first()
            .map(|id| id.to_string())
            .ok_or_else(|| anyhow::anyhow!("no rule sets in {:?}", &args.path_conf))?,
    };

    let lines = match (&args.mutations, &args.path_input) {
        (Some(mutations), _) => {
            // a single list on the command line must parse
            parse_line(args.gene, mutations)?;
            vec![mutations.clone()]
        }
        (None, Some(path_input)) => read_lines(path_input)?,
        (None, None) => anyhow::bail!("either --mutations or --path-input is required"),
    };

    tracing::info!("Scoring {} mutation list(s) with {:?}...", lines.len(), &rule_set);
    let before_scoring = Instant::now();
    let results = score_lines(&engine, &rule_set, args.gene, &lines)?;
    tracing::info!(
        "... done scoring {} line(s) in {:?}",
        results.len(),
        before_scoring.elapsed()
    );

    let mut writer = open_write_maybe_gz(&args.path_output)?;
    for (line, result) in &results {
        let record = Record {
            worker_version: worker_version(),
            input: line,
            result,
            triggered_mutations: result.triggered_mutations_display(),
        };
        serde_json::to_writer(&mut writer, &record)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    Ok(())
}
