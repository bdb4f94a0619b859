//! Implementation of the `compare` sub command.

use serde::Serialize;

use crate::{
    common::{io::open_write_maybe_gz, Gene},
    engine::Engine,
    mutations::MutationSet,
    scoring::levels::Sir,
};

use super::{compare, Comparison};

/// Command line arguments for `compare` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "compare classifications across rule sets", long_about = None)]
pub struct Args {
    /// Path to the rule set configuration TOML file.
    #[arg(long)]
    pub path_conf: String,
    /// The gene to score.
    #[arg(long, value_enum)]
    pub gene: Gene,
    /// Mutations to score, e.g., "M41L, T215Y".
    #[arg(long)]
    pub mutations: String,
    /// Rule sets to compare; all configured ones if empty.
    #[arg(long)]
    pub rule_set: Vec<String>,
    /// Only write drugs with differing SIR classes.
    #[arg(long)]
    pub discordant_only: bool,
    /// Path to the output TSV file, "-" for stdout.
    #[arg(long, default_value = "-")]
    pub path_output: String,
}

/// One line of the comparison output.
#[derive(Serialize, Debug)]
struct Row<'a> {
    drug: &'a str,
    rule_set: &'a str,
    total_score: f64,
    level: u8,
    text: &'a str,
    sir: Sir,
    discordant: bool,
}

/// Write `comparison` as TSV to `path`.
fn write_comparison(
    comparison: &Comparison,
    discordant_only: bool,
    path: &str,
) -> Result<(), anyhow::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(open_write_maybe_gz(path)?);
    for drug in comparison.drugs.values() {
        let discordant = drug.is_discordant();
        if discordant_only && !discordant {
            continue;
        }
        for entry in &drug.entries {
            writer.serialize(Row {
                drug: &drug.drug,
                rule_set: &entry.rule_set,
                total_score: entry.total_score,
                level: entry.level,
                text: &entry.text,
                sir: entry.sir,
                discordant,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Main entry point for `compare` sub command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `compare`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let mutations = MutationSet::parse_for_gene(args.gene, &args.mutations)
        .map_err(|e| anyhow::anyhow!("invalid mutations {:?}: {}", &args.mutations, e))?;

    let engine = Engine::load(&args.path_conf)?;
    let rule_sets = if args.rule_set.is_empty() {
        engine.rule_set_ids()
    } else {
        args.rule_set.iter().map(String::as_str).collect()
    };

    let comparison = compare(&engine, args.gene, &mutations, &rule_sets)?;
    tracing::info!(
        "{} of {} drug(s) classified differently",
        comparison.discordant().len(),
        comparison.drugs.len()
    );
    write_comparison(&comparison, args.discordant_only, &args.path_output)?;

    Ok(())
}
