//! Scoring of mutation sets: trie matching, external evaluators, aggregation.
//!
//! Both the trie matcher and an external `ConditionEvaluator` produce
//! `RawScores`, which the `ScoreAggregator` turns into per-drug results.

pub mod aggregate;
pub mod evaluator;
pub mod levels;
pub mod matcher;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    common::Gene,
    mutations::MutationSet,
    rules::{drugs::Drug, RuleOrigin},
};

use self::{evaluator::EvaluatedCondition, matcher::MatchResult};

/// How a scored contribution came about.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    /// A single mutation.
    Individual,
    /// Mutations at more than one position.
    Combination,
    /// An alternative of the named compound rule.
    Compound(String),
}

/// Key under which contributions compete; only the maximum per key counts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    /// Individual mutations at the same position.
    Position(Gene, u32),
    /// Combinations over the same positions.
    Positions(Vec<(Gene, u32)>),
    /// Alternatives of one compound rule.
    Compound(String),
    /// Scored conditions without mutations, by condition text.
    Label(String),
}

/// One raw score for a drug with the mutations that produced it.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Contribution {
    pub kind: ContributionKind,
    /// Rule key or condition text.
    pub rule: String,
    pub score: f64,
    pub mutations: MutationSet,
}

impl Contribution {
    /// Contribution from matched mutations, kind derived from the arity.
    pub fn from_mutations(rule: String, score: f64, mutations: MutationSet) -> Self {
        let kind = if mutations.len() > 1 {
            ContributionKind::Combination
        } else {
            ContributionKind::Individual
        };
        Self {
            kind,
            rule,
            score,
            mutations,
        }
    }

    pub fn group_key(&self) -> GroupKey {
        match &self.kind {
            ContributionKind::Compound(name) => GroupKey::Compound(name.clone()),
            ContributionKind::Individual => match self.mutations.iter().next() {
                Some(mutation) => GroupKey::Position(mutation.gene(), mutation.position()),
                None => GroupKey::Label(self.rule.clone()),
            },
            ContributionKind::Combination => GroupKey::Positions(
                self.mutations
                    .iter()
                    .map(|mutation| (mutation.gene(), mutation.position()))
                    .collect(),
            ),
        }
    }
}

/// A boolean condition that fired, with a qualitative level label.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TriggeredCondition {
    pub condition: String,
    pub level: String,
    pub mutations: MutationSet,
}

/// Raw scores and triggers for one drug.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct DrugRawScores {
    pub contributions: Vec<Contribution>,
    pub triggered: Vec<TriggeredCondition>,
}

/// Input of the score aggregator, independent of the producing engine.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct RawScores {
    pub drugs: BTreeMap<Drug, DrugRawScores>,
}

impl RawScores {
    /// Convert the result of the trie matcher.
    pub fn from_matches(matches: MatchResult) -> Self {
        let drugs = matches
            .into_iter()
            .map(|(drug, by_key)| {
                let contributions = by_key
                    .into_iter()
                    .map(|(key, rule_match)| match &key.origin {
                        RuleOrigin::Compound(name) => Contribution {
                            kind: ContributionKind::Compound(name.clone()),
                            rule: key.to_string(),
                            score: rule_match.score,
                            mutations: rule_match.mutations,
                        },
                        RuleOrigin::Pattern => Contribution::from_mutations(
                            key.to_string(),
                            rule_match.score,
                            rule_match.mutations,
                        ),
                    })
                    .collect();
                (
                    drug,
                    DrugRawScores {
                        contributions,
                        triggered: Vec::new(),
                    },
                )
            })
            .collect();
        Self { drugs }
    }

    /// Convert the output of an external condition evaluator.
    pub fn from_conditions(conditions: Vec<(Drug, EvaluatedCondition)>) -> Self {
        let mut result = Self::default();
        for (drug, condition) in conditions {
            let entry = result.drugs.entry(drug).or_default();
            match condition {
                EvaluatedCondition::Scored {
                    condition,
                    score,
                    mutations,
                } => entry
                    .contributions
                    .push(Contribution::from_mutations(condition, score, mutations)),
                EvaluatedCondition::Triggered {
                    condition,
                    level,
                    mutations,
                } => entry.triggered.push(TriggeredCondition {
                    condition,
                    level,
                    mutations,
                }),
            }
        }
        result
    }

    /// Combine with raw scores from another source.
    pub fn extend(&mut self, other: RawScores) {
        for (drug, raw) in other.drugs {
            let entry = self.drugs.entry(drug).or_default();
            entry.contributions.extend(raw.contributions);
            entry.triggered.extend(raw.triggered);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty()
    }
}
