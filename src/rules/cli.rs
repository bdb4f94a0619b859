//! Implementation of the `rules check` sub command.

use std::time::Instant;

use strum::IntoEnumIterator;

use crate::{
    common::Gene,
    conf::EngineConf,
    rules::{drugs::DrugCatalog, io::load_records, trie::RuleTrie, RuleStore},
};

/// Command line arguments for `rules check` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "validate rule records and build their tries", long_about = None)]
pub struct Args {
    /// Path to the rule records, TSV or JSON, optionally gzipped.
    #[arg(long)]
    pub path_rules: String,
    /// Configuration to take the drug catalog from; built-in catalog otherwise.
    #[arg(long)]
    pub path_conf: Option<String>,
}

/// Statistics of one gene's trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieStats {
    pub gene: Gene,
    pub rules: usize,
    pub nodes: usize,
}

/// Validate the records at `path_rules` and build all tries.
pub fn check(path_rules: &str, catalog: DrugCatalog) -> Result<Vec<TrieStats>, anyhow::Error> {
    let records = load_records(path_rules)?;
    let store = RuleStore::from_records(&records, catalog)
        .map_err(|e| anyhow::anyhow!("invalid rules in {:?}: {}", path_rules, e))?;
    Ok(Gene::iter()
        .map(|gene| {
            let trie = RuleTrie::build(gene, store.rules(gene));
            TrieStats {
                gene,
                rules: trie.rule_count(),
                nodes: trie.node_count(),
            }
        })
        .collect())
}

/// Main entry point for `rules check` sub command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `rules check`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let catalog = match &args.path_conf {
        Some(path_conf) => EngineConf::load(path_conf)?.catalog(),
        None => DrugCatalog::hiv1(),
    };

    let before_check = Instant::now();
    for stats in check(&args.path_rules, catalog)? {
        tracing::info!(
            "  {}: {} rule(s), {} trie node(s)",
            stats.gene,
            stats.rules,
            stats.nodes
        );
    }
    tracing::info!("... rules are valid, checked in {:?}", before_check.elapsed());

    Ok(())
}

#[cfg(test)]
mod test {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use crate::rules::drugs::DrugClass;

    use super::*;

    #[test]
    fn check_fixture() -> Result<(), anyhow::Error> {
        let stats = check("tests/data/rules/hivdb-mini.tsv", DrugCatalog::hiv1())?;

        assert_eq!(
            stats,
            vec![
                TrieStats {
                    gene: Gene::Pr,
                    rules: 1,
                    nodes: 2,
                },
                TrieStats {
                    gene: Gene::Rt,
                    rules: 10,
                    nodes: 13,
                },
                TrieStats {
                    gene: Gene::In,
                    rules: 0,
                    nodes: 1,
                },
                TrieStats {
                    gene: Gene::Ca,
                    rules: 0,
                    nodes: 1,
                },
            ]
        );

        Ok(())
    }

    #[test]
    fn check_invalid_catalog() {
        // no NNRTIs, so the EFV rule has an unknown drug
        let catalog = DrugCatalog::from(IndexMap::from([(
            DrugClass::Nrti,
            vec!["ABC".to_string(), "AZT".to_string(), "D4T".to_string(), "3TC".to_string()],
        )]));

        assert!(check("tests/data/rules/hivdb-mini.tsv", catalog).is_err());
    }
}
