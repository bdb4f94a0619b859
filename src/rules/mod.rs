//! Drug resistance rules: input records, validated rules, and the rule store.

pub mod cli;
pub mod drugs;
pub mod io;
pub mod trie;

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    str::FromStr,
};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    common::Gene,
    err::RuleError,
    mutations::{parse_amino_acids, INSERTION, DELETION},
};

use self::drugs::{Drug, DrugCatalog, DrugClass};

/// The kind of a rule record.
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RuleKind {
    /// Single mutation.
    Individual,
    /// Mutations that must occur together.
    Combination,
    /// One alternative of a compound rule; only the best alternative counts.
    Compound,
}

/// One rule as read from the rule file.
///
/// `positions` is a `+`-separated list (`41+215`) and `amino_acids` holds the
/// matching `+`-separated amino acid sets (`L+SY`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RuleRecord {
    pub gene: String,
    pub drug: String,
    pub drug_class: String,
    pub kind: RuleKind,
    /// Name of the compound rule, only used for `kind == compound`.
    #[serde(default)]
    pub group: Option<String>,
    pub positions: String,
    pub amino_acids: String,
    pub score: f64,
}

/// Allowed amino acids at one position of a rule.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Condition {
    pub position: u32,
    pub aas: BTreeSet<char>,
}

impl Condition {
    /// Text such as `215SY`, `69ins`.
    pub fn text(&self) -> String {
        let aas = self
            .aas
            .iter()
            .map(|aa| match *aa {
                INSERTION => "ins".to_string(),
                DELETION => "del".to_string(),
                aa => aa.to_string(),
            })
            .join("");
        format!("{}{}", self.position, aas)
    }
}

/// Mutations at several positions that must all be present.
///
/// Positions are sorted ascending and unique.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Combination {
    conditions: Vec<Condition>,
    score: f64,
}

impl Combination {
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

/// Where a trie leaf score comes from.
///
/// Alternatives of a compound rule share their origin so that only the best
/// one is counted during aggregation.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleOrigin {
    /// Individual or combination rule.
    Pattern,
    /// Alternative of the named compound rule.
    Compound(String),
}

/// The variants of a validated rule.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum RuleVariant {
    Individual { position: u32, aa: char, score: f64 },
    Combination(Combination),
    Compound {
        name: String,
        alternatives: Vec<Combination>,
    },
}

/// A validated rule for one gene and drug.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Rule {
    gene: Gene,
    drug: Drug,
    variant: RuleVariant,
}

/// Uniform view on rules used for building the trie.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub conditions: Vec<Condition>,
    pub score: f64,
    pub origin: RuleOrigin,
}

impl Rule {
    pub fn gene(&self) -> Gene {
        self.gene
    }

    pub fn drug(&self) -> &Drug {
        &self.drug
    }

    pub fn variant(&self) -> &RuleVariant {
        &self.variant
    }

    /// Individual rules become one-position patterns, compound rules yield
    /// one pattern per alternative.
    pub fn patterns(&self) -> Vec<Pattern> {
        match &self.variant {
            RuleVariant::Individual { position, aa, score } => vec![Pattern {
                conditions: vec![Condition {
                    position: *position,
                    aas: BTreeSet::from([*aa]),
                }],
                score: *score,
                origin: RuleOrigin::Pattern,
            }],
            RuleVariant::Combination(combination) => vec![Pattern {
                conditions: combination.conditions.clone(),
                score: combination.score,
                origin: RuleOrigin::Pattern,
            }],
            RuleVariant::Compound { name, alternatives } => alternatives
                .iter()
                .map(|alternative| Pattern {
                    conditions: alternative.conditions.clone(),
                    score: alternative.score,
                    origin: RuleOrigin::Compound(name.clone()),
                })
                .collect(),
        }
    }
}

/// Parse and validate the `+`-separated positions and amino acid sets.
fn parse_conditions(idx: usize, record: &RuleRecord) -> Result<Vec<Condition>, RuleError> {
    let positions = record
        .positions
        .split('+')
        .map(|token| match token.trim().parse::<u32>() {
            Ok(position) if position > 0 => Ok(position),
            _ => Err(RuleError::InvalidPosition(idx, token.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if positions.iter().tuple_windows().any(|(a, b)| a >= b) {
        return Err(RuleError::UnsortedPositions(idx, record.positions.clone()));
    }

    let aas = record
        .amino_acids
        .split('+')
        .map(|token| {
            parse_amino_acids(token.trim())
                .map_err(|_| RuleError::UnknownAminoAcid(idx, token.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if aas.len() != positions.len() {
        return Err(RuleError::LengthMismatch(idx, positions.len(), aas.len()));
    }

    Ok(positions
        .into_iter()
        .zip(aas)
        .map(|(position, aas)| Condition { position, aas })
        .collect())
}

/// Resolve gene and drug of a record against the catalog.
fn resolve_drug(
    idx: usize,
    record: &RuleRecord,
    catalog: &DrugCatalog,
) -> Result<(Gene, Drug), RuleError> {
    let gene = Gene::from_str(record.gene.trim())
        .map_err(|_| RuleError::UnknownGene(idx, record.gene.clone()))?;
    let class = DrugClass::from_str(record.drug_class.trim())
        .map_err(|_| RuleError::UnknownDrugClass(idx, record.drug_class.clone()))?;
    let drug = catalog
        .get(record.drug.trim())
        .ok_or_else(|| RuleError::UnknownDrug(idx, record.drug.clone()))?;
    if drug.class() != class {
        return Err(RuleError::DrugClassMismatch(
            idx,
            drug.to_string(),
            drug.class().to_string(),
            class.to_string(),
        ));
    }
    if class.gene() != gene {
        return Err(RuleError::GeneMismatch(
            idx,
            class.to_string(),
            gene.to_string(),
        ));
    }
    Ok((gene, drug))
}

/// Validated, immutable rules of one rule set, by gene.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: BTreeMap<Gene, Vec<Rule>>,
    catalog: DrugCatalog,
}

impl RuleStore {
    /// Validate `records` against `catalog` and build the store.
    ///
    /// Any malformed record makes the whole rule set fail.
    pub fn from_records(records: &[RuleRecord], catalog: DrugCatalog) -> Result<Self, RuleError> {
        let mut rules: BTreeMap<Gene, Vec<Rule>> = BTreeMap::new();
        // compound names are scoped to their drug
        let mut compounds: IndexMap<(Gene, Drug, String), Vec<Combination>> = IndexMap::new();

        for (idx, record) in records.iter().enumerate() {
            let (gene, drug) = resolve_drug(idx, record, &catalog)?;
            if !record.score.is_finite() {
                return Err(RuleError::InvalidScore(idx, record.score));
            }
            let conditions = parse_conditions(idx, record)?;

            match record.kind {
                RuleKind::Individual => {
                    let (position, aa) = match conditions.as_slice() {
                        [condition] if condition.aas.len() == 1 => (
                            condition.position,
                            *condition.aas.iter().next().ok_or(RuleError::NotIndividual(idx))?,
                        ),
                        _ => return Err(RuleError::NotIndividual(idx)),
                    };
                    rules.entry(gene).or_default().push(Rule {
                        gene,
                        drug,
                        variant: RuleVariant::Individual {
                            position,
                            aa,
                            score: record.score,
                        },
                    });
                }
                RuleKind::Combination => {
                    rules.entry(gene).or_default().push(Rule {
                        gene,
                        drug,
                        variant: RuleVariant::Combination(Combination {
                            conditions,
                            score: record.score,
                        }),
                    });
                }
                RuleKind::Compound => {
                    let name = record
                        .group
                        .as_ref()
                        .map(|group| group.trim().to_string())
                        .filter(|group| !group.is_empty())
                        .ok_or(RuleError::MissingGroup(idx))?;
                    compounds
                        .entry((gene, drug, name))
                        .or_default()
                        .push(Combination {
                            conditions,
                            score: record.score,
                        });
                }
            }
        }

        for ((gene, drug, name), alternatives) in compounds {
            rules.entry(gene).or_default().push(Rule {
                gene,
                drug,
                variant: RuleVariant::Compound { name, alternatives },
            });
        }

        let result = Self { rules, catalog };
        result.check_duplicates()?;
        tracing::debug!(
            "validated {} rule records into {} rules",
            records.len(),
            result.len()
        );
        Ok(result)
    }

    /// Reject two rules for the same drug that match the very same mutations.
    fn check_duplicates(&self) -> Result<(), RuleError> {
        let mut seen = HashSet::new();
        for rule in self.rules.values().flatten() {
            for pattern in rule.patterns() {
                for path in pattern
                    .conditions
                    .iter()
                    .map(|condition| {
                        condition
                            .aas
                            .iter()
                            .map(move |aa| (condition.position, *aa))
                    })
                    .multi_cartesian_product()
                {
                    let key = (rule.drug.clone(), pattern.origin.clone(), path);
                    if !seen.insert(key) {
                        return Err(RuleError::DuplicateRule(
                            rule.drug.to_string(),
                            pattern.conditions.iter().map(Condition::text).join("+"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// The rules for `gene`, empty if there are none.
    pub fn rules(&self, gene: Gene) -> &[Rule] {
        self.rules.get(&gene).map(|rules| rules.as_slice()).unwrap_or(&[])
    }

    /// The genes with at least one rule.
    pub fn genes(&self) -> Vec<Gene> {
        self.rules.keys().cloned().collect()
    }

    pub fn catalog(&self) -> &DrugCatalog {
        &self.catalog
    }

    /// Total number of rules.
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    /// Helper for building records in tests.
    pub fn record(
        gene: &str,
        drug: &str,
        drug_class: &str,
        kind: RuleKind,
        group: Option<&str>,
        positions: &str,
        amino_acids: &str,
        score: f64,
    ) -> RuleRecord {
        RuleRecord {
            gene: gene.to_string(),
            drug: drug.to_string(),
            drug_class: drug_class.to_string(),
            kind,
            group: group.map(String::from),
            positions: positions.to_string(),
            amino_acids: amino_acids.to_string(),
            score,
        }
    }

    pub fn individual(drug: &str, position: u32, aa: &str, score: f64) -> RuleRecord {
        let catalog = DrugCatalog::hiv1();
        let class = catalog.get(drug).expect("drug in catalog").class();
        record(
            &class.gene().to_string(),
            drug,
            &class.to_string(),
            RuleKind::Individual,
            None,
            &position.to_string(),
            aa,
            score,
        )
    }

    pub fn combination(drug: &str, positions: &str, aas: &str, score: f64) -> RuleRecord {
        let catalog = DrugCatalog::hiv1();
        let class = catalog.get(drug).expect("drug in catalog").class();
        record(
            &class.gene().to_string(),
            drug,
            &class.to_string(),
            RuleKind::Combination,
            None,
            positions,
            aas,
            score,
        )
    }

    pub fn compound(drug: &str, group: &str, positions: &str, aas: &str, score: f64) -> RuleRecord {
        RuleRecord {
            kind: RuleKind::Compound,
            group: Some(group.to_string()),
            ..combination(drug, positions, aas, score)
        }
    }

    #[test]
    fn from_records_smoke() -> Result<(), anyhow::Error> {
        let records = vec![
            individual("AZT", 41, "L", 5.0),
            combination("AZT", "41+215", "L+SY", 15.0),
            compound("AZT", "tams", "41+210", "L+W", 10.0),
            compound("AZT", "tams", "67+70", "N+R", 25.0),
            individual("DRV/r", 50, "V", 10.0),
        ];
        let store = RuleStore::from_records(&records, DrugCatalog::hiv1())?;

        assert_eq!(store.len(), 4);
        assert_eq!(store.genes(), vec![Gene::Pr, Gene::Rt]);
        assert_eq!(store.rules(Gene::Rt).len(), 3);
        assert!(store.rules(Gene::In).is_empty());

        let patterns = store.rules(Gene::Rt)[2].patterns();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[1].origin, RuleOrigin::Compound("tams".to_string()));
        assert_eq!(
            patterns[1]
                .conditions
                .iter()
                .map(Condition::text)
                .collect::<Vec<_>>(),
            vec!["67N", "70R"]
        );

        Ok(())
    }

    #[test]
    fn individual_as_pattern() -> Result<(), anyhow::Error> {
        let store =
            RuleStore::from_records(&[individual("3TC", 69, "ins", 30.0)], DrugCatalog::hiv1())?;

        let patterns = store.rules(Gene::Rt)[0].patterns();
        assert_eq!(
            patterns,
            vec![Pattern {
                conditions: vec![Condition {
                    position: 69,
                    aas: BTreeSet::from([INSERTION]),
                }],
                score: 30.0,
                origin: RuleOrigin::Pattern,
            }]
        );

        Ok(())
    }

    #[rstest]
    #[case::unknown_gene(
        record("ENV", "AZT", "NRTI", RuleKind::Individual, None, "41", "L", 5.0),
        RuleError::UnknownGene(0, "ENV".to_string())
    )]
    #[case::unknown_drug(
        record("RT", "XYZ", "NRTI", RuleKind::Individual, None, "41", "L", 5.0),
        RuleError::UnknownDrug(0, "XYZ".to_string())
    )]
    #[case::unknown_class(
        record("RT", "AZT", "FOO", RuleKind::Individual, None, "41", "L", 5.0),
        RuleError::UnknownDrugClass(0, "FOO".to_string())
    )]
    #[case::class_mismatch(
        record("RT", "AZT", "NNRTI", RuleKind::Individual, None, "41", "L", 5.0),
        RuleError::DrugClassMismatch(0, "AZT".to_string(), "NRTI".to_string(), "NNRTI".to_string())
    )]
    #[case::gene_mismatch(
        record("PR", "AZT", "NRTI", RuleKind::Individual, None, "41", "L", 5.0),
        RuleError::GeneMismatch(0, "NRTI".to_string(), "PR".to_string())
    )]
    #[case::zero_position(
        record("RT", "AZT", "NRTI", RuleKind::Individual, None, "0", "L", 5.0),
        RuleError::InvalidPosition(0, "0".to_string())
    )]
    #[case::unsorted(
        record("RT", "AZT", "NRTI", RuleKind::Combination, None, "215+41", "Y+L", 5.0),
        RuleError::UnsortedPositions(0, "215+41".to_string())
    )]
    #[case::duplicate_position(
        record("RT", "AZT", "NRTI", RuleKind::Combination, None, "41+41", "L+M", 5.0),
        RuleError::UnsortedPositions(0, "41+41".to_string())
    )]
    #[case::unknown_aa(
        record("RT", "AZT", "NRTI", RuleKind::Individual, None, "41", "B", 5.0),
        RuleError::UnknownAminoAcid(0, "B".to_string())
    )]
    #[case::empty_aa(
        record("RT", "AZT", "NRTI", RuleKind::Combination, None, "41+215", "L+", 5.0),
        RuleError::UnknownAminoAcid(0, "".to_string())
    )]
    #[case::length_mismatch(
        record("RT", "AZT", "NRTI", RuleKind::Combination, None, "41+215", "L", 5.0),
        RuleError::LengthMismatch(0, 2, 1)
    )]
    #[case::mixture_individual(
        record("RT", "AZT", "NRTI", RuleKind::Individual, None, "215", "FY", 5.0),
        RuleError::NotIndividual(0)
    )]
    #[case::missing_group(
        record("RT", "AZT", "NRTI", RuleKind::Compound, None, "41+215", "L+Y", 5.0),
        RuleError::MissingGroup(0)
    )]
    #[case::nan_score(
        record("RT", "AZT", "NRTI", RuleKind::Individual, None, "41", "L", f64::NAN),
        RuleError::InvalidScore(0, f64::NAN)
    )]
    fn from_records_invalid(#[case] record: RuleRecord, #[case] expected: RuleError) {
        let result = RuleStore::from_records(&[record], DrugCatalog::hiv1());

        match (result, expected) {
            (Err(RuleError::InvalidScore(idx, score)), RuleError::InvalidScore(e_idx, _)) => {
                assert_eq!(idx, e_idx);
                assert!(score.is_nan());
            }
            (Err(err), expected) => assert_eq!(err, expected),
            (Ok(_), expected) => panic!("expected error {:?}", expected),
        }
    }

    #[test]
    fn from_records_duplicate() {
        let records = vec![
            individual("AZT", 215, "Y", 10.0),
            combination("AZT", "215", "FY", 15.0),
        ];

        assert_eq!(
            RuleStore::from_records(&records, DrugCatalog::hiv1()).unwrap_err(),
            RuleError::DuplicateRule("AZT".to_string(), "215FY".to_string())
        );
    }

    #[test]
    fn from_records_compound_name_per_drug() -> Result<(), anyhow::Error> {
        let records = vec![
            compound("AZT", "tams", "41+215", "L+Y", 25.0),
            compound("D4T", "tams", "41+215", "L+Y", 20.0),
            compound("AZT", "tams", "41+210", "L+W", 10.0),
        ];
        let store = RuleStore::from_records(&records, DrugCatalog::hiv1())?;

        let rules = store.rules(Gene::Rt);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].drug().name(), "AZT");
        assert_eq!(rules[0].patterns().len(), 2);
        assert_eq!(rules[1].drug().name(), "D4T");
        assert_eq!(rules[1].patterns().len(), 1);

        Ok(())
    }

    #[test]
    fn compound_alternatives_are_not_duplicates_of_patterns() -> Result<(), anyhow::Error> {
        let records = vec![
            combination("AZT", "41+215", "L+Y", 15.0),
            compound("AZT", "tams", "41+215", "L+Y", 20.0),
        ];

        let store = RuleStore::from_records(&records, DrugCatalog::hiv1())?;
        assert_eq!(store.len(), 2);

        Ok(())
    }
}
