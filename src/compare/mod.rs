//! Comparison of classifications across rule sets.

pub mod cli;

use indexmap::IndexMap;
use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    common::Gene, engine::Engine, err::EngineError, mutations::MutationSet, scoring::levels::Sir,
};

/// Classification of one drug under one rule set.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ComparisonEntry {
    pub rule_set: String,
    pub total_score: f64,
    pub level: u8,
    pub text: String,
    pub sir: Sir,
    pub explanation: String,
}

/// Classifications of one drug, in the order of the compared rule sets.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DrugComparison {
    pub drug: String,
    pub entries: Vec<ComparisonEntry>,
}

impl DrugComparison {
    /// Whether the rule sets disagree on the SIR class.
    pub fn is_discordant(&self) -> bool {
        !self.entries.iter().map(|entry| entry.sir).all_equal()
    }
}

/// Result of comparing rule sets for one gene and mutation set.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Comparison {
    pub gene: Gene,
    pub rule_sets: Vec<String>,
    pub drugs: IndexMap<String, DrugComparison>,
}

impl Comparison {
    /// The drugs with differing SIR classes.
    pub fn discordant(&self) -> Vec<&DrugComparison> {
        self.drugs
            .values()
            .filter(|drug| drug.is_discordant())
            .collect()
    }
}

/// Score `mutations` under each of `rule_sets`, in parallel.
pub fn compare(
    engine: &Engine,
    gene: Gene,
    mutations: &MutationSet,
    rule_sets: &[&str],
) -> Result<Comparison, EngineError> {
    let results = rule_sets
        .par_iter()
        .map(|id| engine.score(id, gene, mutations))
        .collect::<Result<Vec<_>, _>>()?;

    let mut drugs: IndexMap<String, DrugComparison> = IndexMap::new();
    for result in &results {
        for (drug, drug_result) in &result.drugs {
            drugs
                .entry(drug.name().to_string())
                .or_insert_with(|| DrugComparison {
                    drug: drug.name().to_string(),
                    entries: Vec::new(),
                })
                .entries
                .push(ComparisonEntry {
                    rule_set: result.rule_set.clone(),
                    total_score: drug_result.total_score,
                    level: drug_result.level.level,
                    text: drug_result.level.text.clone(),
                    sir: drug_result.sir(),
                    explanation: drug_result.explanation.clone(),
                });
        }
    }

    Ok(Comparison {
        gene,
        rule_sets: rule_sets.iter().map(|id| id.to_string()).collect(),
        drugs,
    })
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use crate::{
        engine::RuleSet,
        rules::{drugs::DrugCatalog, test::individual, RuleStore},
        scoring::levels::{AlgorithmConfig, AlgorithmFamily},
    };

    use super::*;

    fn engine() -> Result<Engine, anyhow::Error> {
        let mut engine = Engine::new();
        engine.register(RuleSet::new(
            "v1",
            RuleStore::from_records(
                &[
                    individual("ABC", 184, "V", 15.0),
                    individual("3TC", 184, "V", 60.0),
                ],
                DrugCatalog::hiv1(),
            )?,
            AlgorithmConfig::for_family(AlgorithmFamily::Hivdb),
        ))?;
        engine.register(RuleSet::new(
            "v2",
            RuleStore::from_records(
                &[
                    individual("ABC", 184, "V", 10.0),
                    individual("3TC", 184, "V", 60.0),
                ],
                DrugCatalog::hiv1(),
            )?,
            AlgorithmConfig::for_family(AlgorithmFamily::Generic),
        ))?;
        Ok(engine)
    }

    #[test]
    fn compare_rule_sets() -> Result<(), anyhow::Error> {
        let engine = engine()?;

        let comparison = compare(
            &engine,
            Gene::Rt,
            &MutationSet::from_str("RT184V")?,
            &["v1", "v2"],
        )?;

        assert_eq!(comparison.rule_sets, vec!["v1", "v2"]);
        assert_eq!(comparison.drugs.len(), 12);

        let abc = &comparison.drugs["ABC"];
        assert_eq!(
            abc.entries
                .iter()
                .map(|entry| (entry.rule_set.as_str(), entry.total_score, entry.sir))
                .collect::<Vec<_>>(),
            vec![("v1", 15.0, Sir::I), ("v2", 10.0, Sir::S)]
        );
        assert_eq!(abc.entries[1].text, "Susceptible");

        let discordant = comparison.discordant();
        assert_eq!(discordant.len(), 1);
        assert_eq!(discordant[0].drug, "ABC");
        assert!(!comparison.drugs["3TC"].is_discordant());

        Ok(())
    }

    #[test]
    fn compare_unknown_rule_set() -> Result<(), anyhow::Error> {
        let engine = engine()?;

        assert_eq!(
            compare(
                &engine,
                Gene::Rt,
                &MutationSet::from_str("RT184V")?,
                &["v1", "v3"]
            )
            .err(),
            Some(EngineError::UnknownRuleSet("v3".to_string()))
        );

        Ok(())
    }
}
