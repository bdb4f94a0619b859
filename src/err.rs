//! Error types used throughout the worker.

/// Errors raised when parsing or combining mutations.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("cannot parse mutation: {0:?}")]
    InvalidFormat(String),
    #[error("unknown gene: {0:?}")]
    UnknownGene(String),
    #[error("invalid position in mutation {0:?}")]
    InvalidPosition(String),
    #[error("invalid amino acid {1:?} in {0:?}")]
    InvalidAminoAcid(String, char),
    #[error("empty amino acid call in {0:?}")]
    EmptyAminoAcids(String),
    #[error("cannot merge mutations at different positions: {0} vs. {1}")]
    PositionMismatch(String, String),
}

/// Fatal errors when building a rule set.
///
/// None of these are recoverable; a rule set failing with any of them must not
/// be used for scoring.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("rule #{0}: unknown gene {1:?}")]
    UnknownGene(usize, String),
    #[error("rule #{0}: unknown drug {1:?}")]
    UnknownDrug(usize, String),
    #[error("rule #{0}: unknown drug class {1:?}")]
    UnknownDrugClass(usize, String),
    #[error("rule #{0}: drug {1} belongs to class {2}, not {3}")]
    DrugClassMismatch(usize, String, String, String),
    #[error("rule #{0}: drug class {1} does not target gene {2}")]
    GeneMismatch(usize, String, String),
    #[error("rule #{0}: invalid position {1:?}")]
    InvalidPosition(usize, String),
    #[error("rule #{0}: positions must be sorted ascending and unique: {1:?}")]
    UnsortedPositions(usize, String),
    #[error("rule #{0}: unknown amino acid token {1:?}")]
    UnknownAminoAcid(usize, String),
    #[error("rule #{0}: {1} positions but {2} amino acid sets")]
    LengthMismatch(usize, usize, usize),
    #[error("rule #{0}: individual rule must have exactly one position and residue")]
    NotIndividual(usize),
    #[error("rule #{0}: compound rule without group name")]
    MissingGroup(usize),
    #[error("rule #{0}: invalid score {1}")]
    InvalidScore(usize, f64),
    #[error("duplicate rule for drug {0} at {1}")]
    DuplicateRule(String, String),
    #[error("invalid level table: {0}")]
    InvalidLevelTable(String),
}

/// Errors raised by the scoring engine at query time.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("unknown rule set {0:?}")]
    UnknownRuleSet(String),
    #[error("rule set {0:?} registered twice")]
    DuplicateRuleSet(String),
    #[error("condition evaluator failed for rule set {0:?}: {1}")]
    Evaluator(String, String),
}
