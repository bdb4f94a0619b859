//! Aggregation of raw scores into per-drug results.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

use crate::{
    common::Gene,
    mutations::MutationSet,
    rules::drugs::{Drug, DrugClass},
};

use super::{
    levels::{AlgorithmConfig, ResistanceLevel, Sir},
    Contribution, ContributionKind, DrugRawScores, GroupKey, RawScores, TriggeredCondition,
};

/// Final result for one drug.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DrugScoreResult {
    pub drug: Drug,
    /// Sum of the winning contributions.
    pub total_score: f64,
    pub level: ResistanceLevel,
    /// Winning contributions of single mutations.
    pub individual: Vec<Contribution>,
    /// Winning contributions of mutation combinations and compound rules.
    pub combinations: Vec<Contribution>,
    /// Boolean conditions that passed the trigger filter.
    pub triggered_conditions: Vec<TriggeredCondition>,
    /// Mutations of all winning contributions and kept conditions.
    pub triggered_mutations: MutationSet,
    pub explanation: String,
}

impl DrugScoreResult {
    pub fn sir(&self) -> Sir {
        self.level.sir
    }

    /// Winning contributions, individual ones first.
    pub fn contributions(&self) -> impl Iterator<Item = &Contribution> {
        self.individual.iter().chain(self.combinations.iter())
    }
}

/// Result of scoring one gene under one rule set.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GeneResistance {
    pub gene: Gene,
    pub rule_set: String,
    /// Results in drug order of the catalog.
    pub drugs: IndexMap<Drug, DrugScoreResult>,
}

impl GeneResistance {
    /// Result for the drug with the given name.
    pub fn get(&self, name: &str) -> Option<&DrugScoreResult> {
        self.drugs
            .iter()
            .find(|(drug, _)| drug.name() == name)
            .map(|(_, result)| result)
    }

    /// Union of the triggered mutations of all drugs.
    pub fn triggered_mutations(&self) -> MutationSet {
        self.drugs
            .values()
            .fold(MutationSet::new(), |acc, result| {
                acc.merge(&result.triggered_mutations)
            })
    }

    /// Union of the triggered mutations of the drugs in `class`.
    pub fn triggered_mutations_for_class(&self, class: DrugClass) -> MutationSet {
        self.drugs
            .iter()
            .filter(|(drug, _)| drug.class() == class)
            .fold(MutationSet::new(), |acc, (_, result)| {
                acc.merge(&result.triggered_mutations)
            })
    }

    /// Display strings of all triggered mutations, ambiguous calls collapsed.
    pub fn triggered_mutations_display(&self) -> Vec<String> {
        self.triggered_mutations().display_normalized()
    }
}

/// Turns `RawScores` into `GeneResistance` results.
#[derive(Debug, Clone, Copy)]
pub struct ScoreAggregator<'c> {
    config: &'c AlgorithmConfig,
}

impl<'c> ScoreAggregator<'c> {
    pub fn new(config: &'c AlgorithmConfig) -> Self {
        Self { config }
    }

    /// Aggregate `raw` for every drug in `drugs`.
    ///
    /// Drugs without raw scores get a zero score and the baseline level;
    /// raw scores of drugs not in `drugs` are ignored.
    pub fn aggregate(
        &self,
        gene: Gene,
        rule_set: &str,
        drugs: &[Drug],
        mut raw: RawScores,
    ) -> GeneResistance {
        let drugs = drugs
            .iter()
            .map(|drug| {
                let drug_raw = raw.drugs.remove(drug).unwrap_or_default();
                (drug.clone(), self.aggregate_drug(drug, drug_raw))
            })
            .collect::<IndexMap<_, _>>();
        if !raw.drugs.is_empty() {
            tracing::debug!(
                "ignoring scores for drugs outside of {}: {}",
                gene,
                raw.drugs.keys().join(", ")
            );
        }
        GeneResistance {
            gene,
            rule_set: rule_set.to_string(),
            drugs,
        }
    }

    fn aggregate_drug(&self, drug: &Drug, raw: DrugRawScores) -> DrugScoreResult {
        // best contribution per group, ties keep the first
        let mut winners: BTreeMap<GroupKey, Contribution> = BTreeMap::new();
        for contribution in raw.contributions {
            let key = contribution.group_key();
            match winners.get(&key) {
                Some(best) if best.score >= contribution.score => (),
                _ => {
                    winners.insert(key, contribution);
                }
            }
        }
        let total_score: f64 = winners.values().map(|c| c.score).sum();

        let triggered_conditions = raw
            .triggered
            .into_iter()
            .filter(|triggered| self.config.keeps_trigger(&triggered.level))
            .collect::<Vec<_>>();

        let level = self.level(total_score, !winners.is_empty(), &triggered_conditions);

        let triggered_mutations = winners
            .values()
            .map(|c| &c.mutations)
            .chain(triggered_conditions.iter().map(|t| &t.mutations))
            .fold(MutationSet::new(), |acc, mutations| acc.merge(mutations));

        let explanation = explain(total_score, &winners, &triggered_conditions);

        let (individual, combinations): (Vec<_>, Vec<_>) = winners
            .into_values()
            .partition(|c| c.kind == ContributionKind::Individual);

        tracing::trace!(
            "{}: total score {} at level {}",
            drug,
            total_score,
            level.level
        );

        DrugScoreResult {
            drug: drug.clone(),
            total_score,
            level,
            individual,
            combinations,
            triggered_conditions,
            triggered_mutations,
            explanation,
        }
    }

    /// Level from the score table, raised by the labels of triggered conditions.
    fn level(
        &self,
        total_score: f64,
        has_scores: bool,
        triggered: &[TriggeredCondition],
    ) -> ResistanceLevel {
        let levels = &self.config.levels;
        let by_score = if has_scores {
            levels.level_for(total_score)
        } else {
            levels.baseline()
        };
        triggered
            .iter()
            .filter_map(|t| levels.find_by_label(&t.level))
            .fold(by_score, |best, level| {
                if level.level > best.level {
                    level
                } else {
                    best
                }
            })
            .clone()
    }
}

/// Human-readable explanation of a drug result.
fn explain(
    total_score: f64,
    winners: &BTreeMap<GroupKey, Contribution>,
    triggered: &[TriggeredCondition],
) -> String {
    if !winners.is_empty() {
        let mut ranked = winners.values().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        let lines = ranked.iter().map(|c| {
            let label = if c.mutations.is_empty() {
                c.rule.clone()
            } else {
                c.mutations
                    .iter()
                    .map(|m| m.display_normalized())
                    .join(" + ")
            };
            format!("{} ({})", label, c.score)
        });
        std::iter::once(format!("Total score: {}", total_score))
            .chain(lines)
            .join("\n")
    } else if !triggered.is_empty() {
        std::iter::once("Triggered rules:".to_string())
            .chain(
                triggered
                    .iter()
                    .map(|t| format!("{} => {}", t.condition, t.level)),
            )
            .join("\n")
    } else {
        "No rules were triggered.".to_string()
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{
        rules::{
            drugs::DrugCatalog,
            test::{combination, compound, individual},
            trie::RuleTrie,
            RuleRecord, RuleStore,
        },
        scoring::{evaluator::EvaluatedCondition, levels::AlgorithmFamily, matcher::TrieMatcher},
    };

    use super::*;

    fn score(
        records: &[RuleRecord],
        mutations: &str,
        config: &AlgorithmConfig,
    ) -> Result<GeneResistance, anyhow::Error> {
        let store = RuleStore::from_records(records, DrugCatalog::hiv1())?;
        let trie = RuleTrie::build(Gene::Rt, store.rules(Gene::Rt));
        let raw = RawScores::from_matches(
            TrieMatcher::new(&trie).find_matches(&MutationSet::from_str(mutations)?),
        );
        Ok(ScoreAggregator::new(config).aggregate(
            Gene::Rt,
            "test",
            &store.catalog().drugs_for_gene(Gene::Rt),
            raw,
        ))
    }

    #[test]
    fn individual_scores_are_summed() -> Result<(), anyhow::Error> {
        let result = score(
            &[
                individual("D4T", 67, "N", 5.0),
                individual("AZT", 184, "V", -10.0),
                individual("AZT", 219, "Q", 10.0),
                individual("ABC", 184, "V", 15.0),
            ],
            "RT67N, RT184V, RT219Q",
            &AlgorithmConfig::default(),
        )?;

        let azt = result.get("AZT").expect("AZT result");
        assert_eq!(azt.total_score, 0.0);
        assert_eq!(azt.level.level, 1);
        assert_eq!(azt.individual.len(), 2);
        assert!(azt.combinations.is_empty());

        let abc = result.get("ABC").expect("ABC result");
        assert_eq!(abc.total_score, 15.0);
        assert_eq!(abc.level.level, 3);
        assert_eq!(abc.sir(), Sir::I);
        assert_eq!(abc.triggered_mutations.to_string(), "RT184V");

        let d4t = result.get("D4T").expect("D4T result");
        assert_eq!(d4t.total_score, 5.0);

        Ok(())
    }

    #[test]
    fn drugs_without_matches() -> Result<(), anyhow::Error> {
        let result = score(
            &[individual("ABC", 184, "V", 15.0)],
            "RT184V",
            &AlgorithmConfig::default(),
        )?;

        // every NRTI and NNRTI of the catalog
        assert_eq!(result.drugs.len(), 12);
        let tdf = result.get("TDF").expect("TDF result");
        assert_eq!(tdf.total_score, 0.0);
        assert_eq!(tdf.level.text, "Susceptible");
        assert!(tdf.triggered_mutations.is_empty());
        assert_eq!(tdf.explanation, "No rules were triggered.");

        Ok(())
    }

    #[test]
    fn max_not_sum_for_mixture() -> Result<(), anyhow::Error> {
        let result = score(
            &[
                individual("3TC", 184, "V", 60.0),
                individual("3TC", 184, "I", 50.0),
            ],
            "RT:M184IV",
            &AlgorithmConfig::default(),
        )?;

        let lamivudine = result.get("3TC").expect("3TC result");
        assert_eq!(lamivudine.total_score, 60.0);
        assert_eq!(lamivudine.level.sir, Sir::R);
        assert_eq!(lamivudine.triggered_mutations.to_string(), "RT:M184V");

        Ok(())
    }

    #[test]
    fn tie_keeps_smallest_amino_acid() -> Result<(), anyhow::Error> {
        let result = score(
            &[
                individual("3TC", 184, "V", 60.0),
                individual("3TC", 184, "I", 60.0),
            ],
            "RT:M184VI",
            &AlgorithmConfig::default(),
        )?;

        let lamivudine = result.get("3TC").expect("3TC result");
        assert_eq!(lamivudine.total_score, 60.0);
        assert_eq!(lamivudine.triggered_mutations.to_string(), "RT:M184I");

        Ok(())
    }

    #[test]
    fn combination_contribution() -> Result<(), anyhow::Error> {
        let records = [combination("AZT", "41+215", "L+SY", 15.0)];

        let result = score(&records, "RT41L, RT215Y", &AlgorithmConfig::default())?;
        let azt = result.get("AZT").expect("AZT result");
        assert_eq!(azt.total_score, 15.0);
        assert!(azt.individual.is_empty());
        assert_eq!(azt.combinations.len(), 1);
        assert_eq!(azt.combinations[0].kind, ContributionKind::Combination);
        assert_eq!(azt.combinations[0].mutations.to_string(), "RT41L, RT215Y");

        let result = score(&records, "RT41L", &AlgorithmConfig::default())?;
        let azt = result.get("AZT").expect("AZT result");
        assert_eq!(azt.total_score, 0.0);
        assert!(azt.combinations.is_empty());

        Ok(())
    }

    #[test]
    fn compound_keeps_best_alternative() -> Result<(), anyhow::Error> {
        let result = score(
            &[
                compound("AZT", "tams", "41+210", "L+W", 10.0),
                compound("AZT", "tams", "41+215", "L+Y", 25.0),
            ],
            "RT41L, RT210W, RT215Y",
            &AlgorithmConfig::default(),
        )?;

        let azt = result.get("AZT").expect("AZT result");
        assert_eq!(azt.total_score, 25.0);
        assert_eq!(azt.combinations.len(), 1);
        assert_eq!(
            azt.combinations[0].kind,
            ContributionKind::Compound("tams".to_string())
        );
        assert_eq!(azt.combinations[0].rule, "tams:41L+215Y");

        Ok(())
    }

    #[test]
    fn compound_name_shared_across_drugs() -> Result<(), anyhow::Error> {
        let result = score(
            &[
                compound("AZT", "tams", "41+210", "L+W", 10.0),
                compound("AZT", "tams", "41+215", "L+Y", 25.0),
                compound("D4T", "tams", "41+210", "L+W", 20.0),
                compound("D4T", "tams", "41+215", "L+Y", 5.0),
            ],
            "RT41L, RT210W, RT215Y",
            &AlgorithmConfig::default(),
        )?;

        let azt = result.get("AZT").expect("AZT result");
        assert_eq!(azt.total_score, 25.0);
        assert_eq!(azt.combinations[0].rule, "tams:41L+215Y");
        let d4t = result.get("D4T").expect("D4T result");
        assert_eq!(d4t.total_score, 20.0);
        assert_eq!(d4t.combinations[0].rule, "tams:41L+210W");

        Ok(())
    }

    #[test]
    fn explanation_ranked_by_score() -> Result<(), anyhow::Error> {
        let result = score(
            &[
                individual("AZT", 41, "L", 15.0),
                individual("AZT", 215, "Y", 40.0),
                combination("AZT", "41+215", "L+SY", 15.0),
            ],
            "RT:M41L, RT:T215Y",
            &AlgorithmConfig::default(),
        )?;

        let azt = result.get("AZT").expect("AZT result");
        assert_eq!(azt.total_score, 70.0);
        assert_eq!(azt.level.text, "High-Level Resistance");
        insta::assert_snapshot!(azt.explanation, @r###"
        Total score: 70
        T215Y (40)
        M41L (15)
        M41L + T215Y (15)
        "###);

        Ok(())
    }

    #[test]
    fn family_level_labels() -> Result<(), anyhow::Error> {
        let records = [individual("ABC", 184, "V", 10.0)];

        let hivdb = score(
            &records,
            "RT184V",
            &AlgorithmConfig::for_family(AlgorithmFamily::Hivdb),
        )?;
        let generic = score(
            &records,
            "RT184V",
            &AlgorithmConfig::for_family(AlgorithmFamily::Generic),
        )?;

        let hivdb = hivdb.get("ABC").expect("ABC result");
        let generic = generic.get("ABC").expect("ABC result");
        assert_eq!(hivdb.level.level, 2);
        assert_eq!(hivdb.level.text, "Potential Low-Level Resistance");
        assert_eq!(generic.level.level, 2);
        assert_eq!(generic.level.text, "Susceptible");

        Ok(())
    }

    #[test]
    fn triggered_conditions() -> Result<(), anyhow::Error> {
        let catalog = DrugCatalog::hiv1();
        let azt = catalog.get("AZT").expect("AZT in catalog");
        let raw = RawScores::from_conditions(vec![
            (
                azt.clone(),
                EvaluatedCondition::Triggered {
                    condition: "M41L AND T215Y".to_string(),
                    level: "Intermediate Resistance".to_string(),
                    mutations: MutationSet::from_str("RT:M41L, RT:T215Y")?,
                },
            ),
            (
                azt.clone(),
                EvaluatedCondition::Triggered {
                    condition: "K70R".to_string(),
                    level: "Susceptible".to_string(),
                    mutations: MutationSet::from_str("RT:K70R")?,
                },
            ),
        ]);

        let config = AlgorithmConfig::for_family(AlgorithmFamily::Generic);
        let result =
            ScoreAggregator::new(&config).aggregate(Gene::Rt, "generic", &[azt.clone()], raw);

        let azt = result.get("AZT").expect("AZT result");
        assert_eq!(azt.total_score, 0.0);
        assert_eq!(azt.level.level, 4);
        assert_eq!(azt.sir(), Sir::I);
        assert_eq!(azt.triggered_conditions.len(), 1);
        assert_eq!(azt.triggered_mutations.to_string(), "RT:M41L, RT:T215Y");
        assert_eq!(
            azt.explanation,
            "Triggered rules:\nM41L AND T215Y => Intermediate Resistance"
        );

        Ok(())
    }

    #[rstest]
    #[case("S", 1, "Susceptible", Sir::S)]
    #[case("I", 3, "Low-Level Resistance", Sir::I)]
    #[case("R", 5, "High-Level Resistance", Sir::R)]
    #[case("intermediate resistance", 4, "Intermediate Resistance", Sir::I)]
    fn triggered_sir_letter_maps_to_lowest_level(
        #[case] label: &str,
        #[case] level: u8,
        #[case] text: &str,
        #[case] sir: Sir,
    ) -> Result<(), anyhow::Error> {
        let catalog = DrugCatalog::hiv1();
        let azt = catalog.get("AZT").expect("AZT in catalog");
        let raw = RawScores::from_conditions(vec![(
            azt.clone(),
            EvaluatedCondition::Triggered {
                condition: "K70R".to_string(),
                level: label.to_string(),
                mutations: MutationSet::from_str("RT:K70R")?,
            },
        )]);

        let config = AlgorithmConfig::default();
        let result =
            ScoreAggregator::new(&config).aggregate(Gene::Rt, "hivdb", &[azt.clone()], raw);

        let azt = result.get("AZT").expect("AZT result");
        assert_eq!(azt.level.level, level);
        assert_eq!(azt.level.text, text);
        assert_eq!(azt.sir(), sir);

        Ok(())
    }

    #[test]
    fn triggered_mutations_by_class() -> Result<(), anyhow::Error> {
        let result = score(
            &[
                individual("ABC", 184, "V", 15.0),
                individual("3TC", 184, "I", 50.0),
                individual("EFV", 103, "N", 60.0),
            ],
            "RT103N, RT184IV",
            &AlgorithmConfig::default(),
        )?;

        assert_eq!(result.triggered_mutations().to_string(), "RT103N, RT184IV");
        assert_eq!(
            result
                .triggered_mutations_for_class(DrugClass::Nrti)
                .to_string(),
            "RT184IV"
        );
        assert_eq!(
            result
                .triggered_mutations_for_class(DrugClass::Nnrti)
                .to_string(),
            "RT103N"
        );
        assert!(result
            .triggered_mutations_for_class(DrugClass::Pi)
            .is_empty());

        Ok(())
    }

    #[test]
    fn gene_without_drugs() {
        let config = AlgorithmConfig::default();
        let result = ScoreAggregator::new(&config).aggregate(
            Gene::Ca,
            "test",
            &[],
            RawScores::default(),
        );

        assert!(result.drugs.is_empty());
        assert!(result.triggered_mutations().is_empty());
    }
}
