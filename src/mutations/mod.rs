//! Amino acid mutations and sets thereof.
//!
//! A `Mutation` describes the amino acid call at one position of a gene.
//! Mixtures are stored as a set of residues at the same position, insertions
//! and deletions as the sentinel characters `INSERTION` and `DELETION`.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use itertools::Itertools;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{common::Gene, err::MutationError};

/// Sentinel character for insertions.
pub const INSERTION: char = '_';
/// Sentinel character for deletions.
pub const DELETION: char = '-';
/// Stop codon.
pub const STOP: char = '*';
/// The standard amino acid residues.
pub const RESIDUES: &str = "ACDEFGHIKLMNPQRSTVWY";
/// Calls with more residues than this are displayed as `X`.
pub const MAX_DISPLAY_AAS: usize = 4;

lazy_static::lazy_static! {
    static ref RE_MUTATION: regex::Regex = regex::Regex::new(
        r"^(?P<gene>[A-Za-z]+)(?::(?P<reference>[A-Z*])?)?(?P<pos>\d+)(?P<aas>.+)$"
    )
    .expect("invalid regex in source code");
    static ref RE_MUTATION_NO_GENE: regex::Regex = regex::Regex::new(
        r"^(?P<reference>[A-Z*])?(?P<pos>\d+)(?P<aas>.+)$"
    )
    .expect("invalid regex in source code");
}

/// Return whether `aa` is a character allowed in an amino acid call.
pub fn is_valid_aa(aa: char) -> bool {
    RESIDUES.contains(aa) || aa == INSERTION || aa == DELETION || aa == STOP
}

/// Parse an amino acid token such as `V`, `VI`, `ins`, `insSS`, `del`, `#`
/// or `~`.
///
/// Residues following an insertion marker are checked but not kept. The
/// markers `ins` and `del` and the short forms `i` and `d` are lowercase
/// only, so `INS` is the mixture of I, N and S.
/// Returns the offending character on failure, `None` as error for the empty
/// token.
pub fn parse_amino_acids(token: &str) -> Result<BTreeSet<char>, Option<char>> {
    match token {
        "" => return Err(None),
        "i" => return Ok(BTreeSet::from([INSERTION])),
        "d" => return Ok(BTreeSet::from([DELETION])),
        _ => (),
    }
    match token.to_ascii_lowercase().as_str() {
        "insertion" => return Ok(BTreeSet::from([INSERTION])),
        "deletion" => return Ok(BTreeSet::from([DELETION])),
        _ => (),
    }
    if let Some(inserted) = ["ins", "#", "_"]
        .into_iter()
        .find_map(|marker| token.strip_prefix(marker))
    {
        return match inserted
            .chars()
            .map(|c| c.to_ascii_uppercase())
            .find(|c| !RESIDUES.contains(*c))
        {
            Some(c) => Err(Some(c)),
            None => Ok(BTreeSet::from([INSERTION])),
        };
    }
    if let Some(rest) = ["del", "~", "-"]
        .into_iter()
        .find_map(|marker| token.strip_prefix(marker))
    {
        return match rest.chars().next() {
            Some(c) => Err(Some(c.to_ascii_uppercase())),
            None => Ok(BTreeSet::from([DELETION])),
        };
    }
    token
        .chars()
        .map(|c| match c {
            '#' => INSERTION,
            '~' => DELETION,
            _ => c.to_ascii_uppercase(),
        })
        .map(|c| if is_valid_aa(c) { Ok(c) } else { Err(Some(c)) })
        .collect()
}

/// Render a set of amino acids, `ins`/`del` for pure insertions and deletions.
fn amino_acids_text(aas: &BTreeSet<char>) -> String {
    match aas.iter().collect::<Vec<_>>().as_slice() {
        [&INSERTION] => "ins".to_string(),
        [&DELETION] => "del".to_string(),
        _ => aas.iter().collect(),
    }
}

/// One (possibly ambiguous) amino acid call at a gene position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mutation {
    gene: Gene,
    position: u32,
    reference: Option<char>,
    aas: BTreeSet<char>,
}

impl Mutation {
    /// Construct a new mutation, validating position and amino acids.
    pub fn new<I>(gene: Gene, position: u32, aas: I) -> Result<Self, MutationError>
    where
        I: IntoIterator<Item = char>,
    {
        let aas = aas.into_iter().collect::<BTreeSet<_>>();
        let label = format!("{}{}{}", gene, position, aas.iter().collect::<String>());
        if position == 0 {
            return Err(MutationError::InvalidPosition(label));
        }
        if aas.is_empty() {
            return Err(MutationError::EmptyAminoAcids(label));
        }
        if let Some(aa) = aas.iter().find(|aa| !is_valid_aa(**aa)) {
            return Err(MutationError::InvalidAminoAcid(label, *aa));
        }
        Ok(Self {
            gene,
            position,
            reference: None,
            aas,
        })
    }

    /// Single-residue mutation, used for the triggering subsets of rules.
    pub(crate) fn single(gene: Gene, position: u32, reference: Option<char>, aa: char) -> Self {
        Self {
            gene,
            position,
            reference,
            aas: BTreeSet::from([aa]),
        }
    }

    /// Return copy with the given reference (consensus) residue.
    pub fn with_reference(self, reference: char) -> Self {
        Self {
            reference: Some(reference.to_ascii_uppercase()),
            ..self
        }
    }

    /// Parse mutation such as `M184V` or `184VI` for the given gene.
    pub fn parse_with_gene(gene: Gene, text: &str) -> Result<Self, MutationError> {
        let caps = RE_MUTATION_NO_GENE
            .captures(text.trim())
            .ok_or_else(|| MutationError::InvalidFormat(text.to_string()))?;
        Self::from_captures(gene, &caps, text)
    }

    fn from_captures(
        gene: Gene,
        caps: &regex::Captures,
        text: &str,
    ) -> Result<Self, MutationError> {
        let position = caps["pos"]
            .parse::<u32>()
            .map_err(|_| MutationError::InvalidPosition(text.to_string()))?;
        let aas = parse_amino_acids(&caps["aas"]).map_err(|e| match e {
            Some(aa) => MutationError::InvalidAminoAcid(text.to_string(), aa),
            None => MutationError::EmptyAminoAcids(text.to_string()),
        })?;
        let result = Self::new(gene, position, aas)?;
        Ok(
            match caps
                .name("reference")
                .and_then(|reference| reference.as_str().chars().next())
            {
                Some(reference) => result.with_reference(reference),
                None => result,
            },
        )
    }

    pub fn gene(&self) -> Gene {
        self.gene
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn reference(&self) -> Option<char> {
        self.reference
    }

    /// The called amino acids, sorted.
    pub fn aas(&self) -> &BTreeSet<char> {
        &self.aas
    }

    pub fn contains_aa(&self, aa: char) -> bool {
        self.aas.contains(&aa)
    }

    pub fn is_insertion(&self) -> bool {
        self.aas.contains(&INSERTION)
    }

    pub fn is_deletion(&self) -> bool {
        self.aas.contains(&DELETION)
    }

    /// Whether more than one amino acid was called at this position.
    pub fn is_mixture(&self) -> bool {
        self.aas.len() > 1
    }

    /// Whether `other` is at the same position and shares an amino acid.
    pub fn overlaps(&self, other: &Mutation) -> bool {
        self.gene == other.gene
            && self.position == other.position
            && !self.aas.is_disjoint(&other.aas)
    }

    /// Union of the amino acids of two mutations at the same position.
    pub fn merge(&self, other: &Mutation) -> Result<Mutation, MutationError> {
        if self.gene != other.gene || self.position != other.position {
            return Err(MutationError::PositionMismatch(
                self.to_string(),
                other.to_string(),
            ));
        }
        Ok(Mutation {
            gene: self.gene,
            position: self.position,
            reference: self.reference.or(other.reference),
            aas: self.aas.union(&other.aas).cloned().collect(),
        })
    }

    /// The shared amino acids of two mutations, if any.
    pub fn intersect(&self, other: &Mutation) -> Option<Mutation> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Mutation {
            gene: self.gene,
            position: self.position,
            reference: self.reference.or(other.reference),
            aas: self.aas.intersection(&other.aas).cloned().collect(),
        })
    }

    /// Display without gene prefix, e.g., `M184V`.
    pub fn short(&self) -> String {
        format!(
            "{}{}{}",
            self.reference.map(String::from).unwrap_or_default(),
            self.position,
            amino_acids_text(&self.aas)
        )
    }

    /// Short display with highly ambiguous calls collapsed to `X`.
    pub fn display_normalized(&self) -> String {
        let residues = self.aas.iter().filter(|aa| RESIDUES.contains(**aa)).count();
        if residues > MAX_DISPLAY_AAS {
            format!(
                "{}{}X",
                self.reference.map(String::from).unwrap_or_default(),
                self.position
            )
        } else {
            self.short()
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reference {
            Some(reference) => write!(
                f,
                "{}:{}{}{}",
                self.gene,
                reference,
                self.position,
                amino_acids_text(&self.aas)
            ),
            None => write!(
                f,
                "{}{}{}",
                self.gene,
                self.position,
                amino_acids_text(&self.aas)
            ),
        }
    }
}

impl FromStr for Mutation {
    type Err = MutationError;

    /// Parse mutation such as `RT184V`, `RT:M184VI` or `RT69ins`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = RE_MUTATION
            .captures(s.trim())
            .ok_or_else(|| MutationError::InvalidFormat(s.to_string()))?;
        let gene = Gene::from_str(&caps["gene"])
            .map_err(|_| MutationError::UnknownGene(caps["gene"].to_string()))?;
        Self::from_captures(gene, &caps, s)
    }
}

impl Serialize for Mutation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Mutation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Mutation::from_str(&s).map_err(de::Error::custom)
    }
}

/// Set of mutations with at most one entry per gene and position.
///
/// All operations return new sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationSet {
    mutations: BTreeMap<(Gene, u32), Mutation>,
}

impl MutationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of mutations for the given gene, e.g., `M184V, K65R`.
    pub fn parse_with_gene(gene: Gene, text: &str) -> Result<Self, MutationError> {
        split_tokens(text)
            .map(|token| Mutation::parse_with_gene(gene, token))
            .collect()
    }

    /// Parse a list of mutations for `gene`, with or without gene prefixes.
    ///
    /// If neither form parses, the error of the form the text looks like is
    /// returned.
    pub fn parse_for_gene(gene: Gene, text: &str) -> Result<Self, MutationError> {
        Self::parse_with_gene(gene, text).or_else(|err| match Self::from_str(text) {
            Ok(result) => Ok(result),
            Err(MutationError::InvalidFormat(_) | MutationError::UnknownGene(_)) => Err(err),
            Err(prefixed_err) => Err(prefixed_err),
        })
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Iterate mutations ordered by gene and position.
    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.values()
    }

    pub fn get(&self, gene: Gene, position: u32) -> Option<&Mutation> {
        self.mutations.get(&(gene, position))
    }

    /// Whether a mutation at the same position with an overlapping call exists.
    pub fn contains(&self, mutation: &Mutation) -> bool {
        self.get(mutation.gene(), mutation.position())
            .map_or(false, |m| m.overlaps(mutation))
    }

    /// The distinct genes of the mutations.
    pub fn genes(&self) -> Vec<Gene> {
        self.mutations.keys().map(|(gene, _)| *gene).dedup().collect()
    }

    /// Sorted positions of the mutations in `gene`.
    pub fn positions(&self, gene: Gene) -> Vec<u32> {
        self.mutations
            .keys()
            .filter(|(g, _)| *g == gene)
            .map(|(_, pos)| *pos)
            .collect()
    }

    /// Return copy with `mutation` added, merging into an existing entry.
    pub fn with(&self, mutation: Mutation) -> Self {
        let mut result = self.clone();
        result.insert(mutation);
        result
    }

    /// Union of both sets, same-position entries are merged.
    pub fn merge(&self, other: &MutationSet) -> Self {
        let mut result = self.clone();
        for mutation in other.iter() {
            result.insert(mutation.clone());
        }
        result
    }

    /// Keep the mutations present in both sets with overlapping calls.
    pub fn intersect(&self, other: &MutationSet) -> Self {
        Self {
            mutations: self
                .mutations
                .iter()
                .filter_map(|(key, lhs)| {
                    other
                        .mutations
                        .get(key)
                        .and_then(|rhs| lhs.intersect(rhs))
                        .map(|m| (*key, m))
                })
                .collect(),
        }
    }

    /// Keep only mutations of the given gene.
    pub fn filter_by_gene(&self, gene: Gene) -> Self {
        Self {
            mutations: self
                .mutations
                .iter()
                .filter(|((g, _), _)| *g == gene)
                .map(|(key, m)| (*key, m.clone()))
                .collect(),
        }
    }

    /// Keep only mutations of `gene` at one of `positions`.
    pub fn filter_by_positions(&self, gene: Gene, positions: &[u32]) -> Self {
        Self {
            mutations: self
                .mutations
                .iter()
                .filter(|((g, pos), _)| *g == gene && positions.contains(pos))
                .map(|(key, m)| (*key, m.clone()))
                .collect(),
        }
    }

    /// Canonical string representation, e.g., `RT41L+RT215Y`.
    pub fn join(&self, sep: &str) -> String {
        self.iter().map(|m| m.to_string()).join(sep)
    }

    /// Canonical string without gene prefix, e.g., `41L + 215Y`.
    pub fn join_short(&self, sep: &str) -> String {
        self.iter().map(|m| m.short()).join(sep)
    }

    /// Display strings with highly ambiguous calls collapsed.
    pub fn display_normalized(&self) -> Vec<String> {
        self.iter()
            .map(|m| format!("{}{}", m.gene(), m.display_normalized()))
            .collect()
    }

    fn insert(&mut self, mutation: Mutation) {
        let key = (mutation.gene(), mutation.position());
        let merged = match self.mutations.get(&key) {
            Some(existing) => Mutation {
                reference: existing.reference.or(mutation.reference),
                aas: existing.aas.union(&mutation.aas).cloned().collect(),
                ..mutation
            },
            None => mutation,
        };
        self.mutations.insert(key, merged);
    }
}

/// Split mutation list on commas, plus signs, and whitespace.
fn split_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c == '+' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}

impl FromIterator<Mutation> for MutationSet {
    fn from_iter<I: IntoIterator<Item = Mutation>>(iter: I) -> Self {
        let mut result = Self::default();
        for mutation in iter {
            result.insert(mutation);
        }
        result
    }
}

impl FromStr for MutationSet {
    type Err = MutationError;

    /// Parse a list of mutations such as `RT67N, RT184V, RT219Q`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_tokens(s).map(Mutation::from_str).collect()
    }
}

impl fmt::Display for MutationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.join(", "))
    }
}

impl Serialize for MutationSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(|m| m.to_string()))
    }
}

impl<'de> Deserialize<'de> for MutationSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mutations: Vec<Mutation> = Deserialize::deserialize(deserializer)?;
        Ok(mutations.into_iter().collect())
    }
}
