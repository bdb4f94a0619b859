//! Boundary to external rule-grammar evaluators.
//!
//! Rule families that are written in a condition language are evaluated by
//! an engine outside of this crate.  It reports, per drug, either a score
//! together with the mutations that produced it or a triggered boolean
//! condition with a level label.  `AllOfEvaluator` is a minimal evaluator for
//! conditions that require a list of mutations to be present.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    common::{io::open_read_maybe_gz, Gene},
    mutations::MutationSet,
    rules::drugs::{Drug, DrugCatalog},
};

/// Result of evaluating one condition for one drug.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum EvaluatedCondition {
    /// Numeric score, tied to the triggering mutations.
    Scored {
        condition: String,
        score: f64,
        mutations: MutationSet,
    },
    /// Boolean trigger with a qualitative level label.
    Triggered {
        condition: String,
        level: String,
        mutations: MutationSet,
    },
}

/// An external evaluator of drug resistance conditions.
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate all conditions for `gene` against `mutations`.
    fn evaluate(
        &self,
        gene: Gene,
        mutations: &MutationSet,
    ) -> Result<Vec<(Drug, EvaluatedCondition)>, anyhow::Error>;
}

/// One line of an all-of condition file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AllOfRecord {
    pub gene: Gene,
    pub drug: String,
    /// Mutations that must all be present, e.g., `M41L + T215Y`.
    pub condition: String,
    /// Level label to report when triggered.
    pub level: String,
    /// Optional score; conditions without score are boolean triggers.
    #[serde(default)]
    pub score: Option<f64>,
}

/// Condition of an `AllOfEvaluator`.
#[derive(Debug, Clone, PartialEq)]
struct AllOfCondition {
    drug: Drug,
    text: String,
    required: MutationSet,
    level: String,
    score: Option<f64>,
}

/// Evaluator firing when all listed mutations are observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllOfEvaluator {
    conditions: Vec<AllOfCondition>,
}

impl AllOfEvaluator {
    /// Build from records, resolving drugs against `catalog`.
    pub fn new(records: &[AllOfRecord], catalog: &DrugCatalog) -> Result<Self, anyhow::Error> {
        let conditions = records
            .iter()
            .map(|record| {
                let drug = catalog
                    .get(&record.drug)
                    .ok_or_else(|| anyhow::anyhow!("unknown drug {:?}", &record.drug))?;
                if drug.class().gene() != record.gene {
                    anyhow::bail!("drug {} does not target gene {}", drug, record.gene);
                }
                let required = MutationSet::parse_with_gene(record.gene, &record.condition)
                    .map_err(|e| anyhow::anyhow!("invalid condition {:?}: {}", &record.condition, e))?;
                if required.is_empty() {
                    anyhow::bail!("empty condition for drug {}", drug);
                }
                Ok(AllOfCondition {
                    drug,
                    text: record.condition.clone(),
                    required,
                    level: record.level.clone(),
                    score: record.score,
                })
            })
            .collect::<Result<Vec<_>, anyhow::Error>>()?;
        Ok(Self { conditions })
    }

    /// Load tab-separated records from `path`.
    pub fn load<P: AsRef<Path>>(path: P, catalog: &DrugCatalog) -> Result<Self, anyhow::Error> {
        let reader = open_read_maybe_gz(path.as_ref())?;
        let records = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .from_reader(reader)
            .deserialize()
            .collect::<Result<Vec<AllOfRecord>, _>>()
            .map_err(|e| anyhow::anyhow!("could not parse {:?}: {}", path.as_ref(), e))?;
        Self::new(&records, catalog)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl ConditionEvaluator for AllOfEvaluator {
    fn evaluate(
        &self,
        gene: Gene,
        mutations: &MutationSet,
    ) -> Result<Vec<(Drug, EvaluatedCondition)>, anyhow::Error> {
        let mutations = mutations.filter_by_gene(gene);
        Ok(self
            .conditions
            .iter()
            .filter(|condition| condition.drug.class().gene() == gene)
            .filter_map(|condition| {
                let found = mutations.intersect(&condition.required);
                if found.len() != condition.required.len() {
                    return None;
                }
                let evaluated = match condition.score {
                    Some(score) => EvaluatedCondition::Scored {
                        condition: condition.text.clone(),
                        score,
                        mutations: found,
                    },
                    None => EvaluatedCondition::Triggered {
                        condition: condition.text.clone(),
                        level: condition.level.clone(),
                        mutations: found,
                    },
                };
                Some((condition.drug.clone(), evaluated))
            })
            .collect())
    }
}
