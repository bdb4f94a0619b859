//! Backtracking search of observed mutations through a `RuleTrie`.
//!
//! The observed positions are visited in ascending order.  At every position
//! the walk branches in two ways: it *skips* the position (rules that do not
//! involve it) and, if the current trie node has edges for it, it *descends*
//! along every observed amino acid with an edge.  This explores all subsets of
//! observed positions that the trie can actually match, and nothing more.

use std::{collections::BTreeMap, fmt};

use itertools::Itertools;
use serde::Serialize;

use crate::{
    common::Gene,
    mutations::{Mutation, MutationSet, DELETION, INSERTION},
    rules::{drugs::Drug, trie::RuleTrie, trie::TrieNode, RuleOrigin},
};

/// Candidate amino acids at one mutated position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedPosition {
    pub position: u32,
    pub reference: Option<char>,
    /// Sorted; indels are the sentinel characters.
    pub aas: Vec<char>,
}

/// Prepare the observed positions of `gene`, sorted by position.
pub fn observed_positions(gene: Gene, mutations: &MutationSet) -> Vec<ObservedPosition> {
    mutations
        .filter_by_gene(gene)
        .iter()
        .map(|mutation| ObservedPosition {
            position: mutation.position(),
            reference: mutation.reference(),
            aas: mutation.aas().iter().cloned().collect(),
        })
        .collect()
}

/// Identifies a matched rule: its origin and the matched (position, aa) path.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchKey {
    pub origin: RuleOrigin,
    pub path: Vec<(u32, char)>,
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .path
            .iter()
            .map(|(position, aa)| match *aa {
                INSERTION => format!("{}ins", position),
                DELETION => format!("{}del", position),
                aa => format!("{}{}", position, aa),
            })
            .join("+");
        match &self.origin {
            RuleOrigin::Pattern => write!(f, "{}", path),
            RuleOrigin::Compound(name) => write!(f, "{}:{}", name, path),
        }
    }
}

/// Best score of a matched rule and the mutations that triggered it.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub score: f64,
    pub mutations: MutationSet,
}

/// Per drug, the matched rules.
pub type MatchResult = BTreeMap<Drug, BTreeMap<MatchKey, RuleMatch>>;

/// Pending work item of the walk.
struct Frame<'t> {
    node: &'t TrieNode,
    /// Index of the next observed position to consider.
    offset: usize,
    /// Matched (observed index, amino acid) pairs so far.
    path: Vec<(usize, char)>,
}

/// Matches observed mutations against one trie; holds no per-query state.
#[derive(Debug, Clone, Copy)]
pub struct TrieMatcher<'t> {
    trie: &'t RuleTrie,
}

impl<'t> TrieMatcher<'t> {
    pub fn new(trie: &'t RuleTrie) -> Self {
        Self { trie }
    }

    /// Find all rules matched by `mutations`, keeping the best score per
    /// drug and rule key.
    pub fn find_matches(&self, mutations: &MutationSet) -> MatchResult {
        let observed = observed_positions(self.trie.gene(), mutations);
        let mut result = MatchResult::new();
        let mut steps = 0usize;

        let mut stack = vec![Frame {
            node: self.trie.root(),
            offset: 0,
            path: Vec::new(),
        }];
        while let Some(frame) = stack.pop() {
            let Some(current) = observed.get(frame.offset) else {
                continue;
            };
            steps += 1;

            if let Some(edges) = frame.node.edges(current.position) {
                for aa in &current.aas {
                    let Some(child) = edges.get(aa) else {
                        continue;
                    };
                    let mut path = frame.path.clone();
                    path.push((frame.offset, *aa));
                    if child.is_leaf() {
                        self.record(&observed, &path, child, &mut result);
                    }
                    if child.has_children() {
                        stack.push(Frame {
                            node: child,
                            offset: frame.offset + 1,
                            path,
                        });
                    }
                }
            }

            // rules that do not involve the current position
            stack.push(Frame {
                node: frame.node,
                offset: frame.offset + 1,
                path: frame.path,
            });
        }

        tracing::trace!(
            "matched {} drugs over {} positions in {} steps",
            result.len(),
            observed.len(),
            steps
        );
        result
    }

    /// Record the leaf scores of `node` reached via `path`.
    fn record(
        &self,
        observed: &[ObservedPosition],
        path: &[(usize, char)],
        node: &TrieNode,
        result: &mut MatchResult,
    ) {
        let gene = self.trie.gene();
        let key_path = path
            .iter()
            .map(|(idx, aa)| (observed[*idx].position, *aa))
            .collect::<Vec<_>>();
        for ((drug, origin), score) in node.scores() {
            let key = MatchKey {
                origin: origin.clone(),
                path: key_path.clone(),
            };
            let by_key = result.entry(drug.clone()).or_default();
            match by_key.get(&key) {
                Some(existing) if existing.score >= *score => (),
                _ => {
                    let mutations = path
                        .iter()
                        .map(|(idx, aa)| {
                            let position = &observed[*idx];
                            Mutation::single(gene, position.position, position.reference, *aa)
                        })
                        .collect();
                    by_key.insert(
                        key,
                        RuleMatch {
                            score: *score,
                            mutations,
                        },
                    );
                }
            }
        }
    }
}
