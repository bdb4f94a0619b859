//! Prefix tree over the rules of one gene.
//!
//! Rules are indexed by ascending position: every node branches by position
//! and then by amino acid.  A node reached by a rule's last position carries
//! the rule's score for its drug; nodes may carry scores and children at the
//! same time.

use std::{collections::BTreeMap, time::Instant};

use crate::common::Gene;

use super::{drugs::Drug, Condition, Rule, RuleOrigin};

/// Scores at a trie node, keyed by drug and rule origin.
pub type LeafScores = BTreeMap<(Drug, RuleOrigin), f64>;

/// One node of the trie.
#[derive(Debug, Default)]
pub struct TrieNode {
    scores: LeafScores,
    children: BTreeMap<u32, BTreeMap<char, TrieNode>>,
}

impl TrieNode {
    /// Scores of the rules ending at this node.
    pub fn scores(&self) -> &LeafScores {
        &self.scores
    }

    /// The amino acid edges for `position`, if any rule continues there.
    pub fn edges(&self, position: u32) -> Option<&BTreeMap<char, TrieNode>> {
        self.children.get(&position)
    }

    pub fn is_leaf(&self) -> bool {
        !self.scores.is_empty()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    fn count_nodes(&self) -> usize {
        1 + self
            .children
            .values()
            .flat_map(|edges| edges.values())
            .map(TrieNode::count_nodes)
            .sum::<usize>()
    }
}

/// The rule trie for one gene, immutable after building.
#[derive(Debug)]
pub struct RuleTrie {
    gene: Gene,
    root: TrieNode,
    rule_count: usize,
}

impl RuleTrie {
    /// Build the trie from the rules of `gene`; rules of other genes are skipped.
    #[tracing::instrument(skip(rules))]
    pub fn build(gene: Gene, rules: &[Rule]) -> Self {
        let before_building = Instant::now();
        let mut root = TrieNode::default();
        let mut rule_count = 0;
        for rule in rules.iter().filter(|rule| rule.gene() == gene) {
            for pattern in rule.patterns() {
                let key = (rule.drug().clone(), pattern.origin);
                insert(&mut root, &pattern.conditions, &key, pattern.score);
            }
            rule_count += 1;
        }

        let result = Self {
            gene,
            root,
            rule_count,
        };
        tracing::debug!(
            "built trie for {} with {} rules and {} nodes in {:?}",
            gene,
            result.rule_count,
            result.node_count(),
            before_building.elapsed()
        );
        result
    }

    pub fn gene(&self) -> Gene {
        self.gene
    }

    pub fn root(&self) -> &TrieNode {
        &self.root
    }

    /// Number of rules inserted into the trie.
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    /// Number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }

    /// Follow the given path of (position, amino acid) edges from the root.
    pub fn lookup(&self, path: &[(u32, char)]) -> Option<&TrieNode> {
        path.iter().try_fold(&self.root, |node, (position, aa)| {
            node.edges(*position).and_then(|edges| edges.get(aa))
        })
    }
}

/// Insert a rule along its sorted conditions, one edge per allowed amino acid.
fn insert(node: &mut TrieNode, conditions: &[Condition], key: &(Drug, RuleOrigin), score: f64) {
    let Some((head, tail)) = conditions.split_first() else {
        return;
    };
    let edges = node.children.entry(head.position).or_default();
    for aa in &head.aas {
        let child = edges.entry(*aa).or_default();
        if tail.is_empty() {
            // duplicates are rejected by the rule store, keep the maximum anyway
            child
                .scores
                .entry(key.clone())
                .and_modify(|existing| *existing = existing.max(score))
                .or_insert(score);
        } else {
            insert(child, tail, key, score);
        }
    }
}
