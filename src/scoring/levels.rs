//! Mapping of total scores to resistance levels and SIR classes.

use serde::{Deserialize, Serialize};

use crate::err::RuleError;

/// Susceptible / intermediate / resistant classification.
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    Debug,
    strum::EnumString,
    strum::Display,
)]
pub enum Sir {
    /// Susceptible
    S,
    /// Intermediate
    I,
    /// Resistant
    R,
}

/// A resistance level with its text label and SIR class.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct ResistanceLevel {
    /// Ordinal level, starting at 1.
    pub level: u8,
    /// Human-readable label.
    pub text: String,
    /// The SIR class of the level.
    pub sir: Sir,
}

/// Lower score bound of a resistance level.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct LevelThreshold {
    /// Minimal total score; ignored for the first level.
    pub min_score: f64,
    #[serde(flatten)]
    pub level: ResistanceLevel,
}

/// Ordered threshold table, swappable per rule set version.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(try_from = "Vec<LevelThreshold>", into = "Vec<LevelThreshold>")]
pub struct LevelTable {
    thresholds: Vec<LevelThreshold>,
}

fn threshold(min_score: f64, level: u8, text: &str, sir: Sir) -> LevelThreshold {
    LevelThreshold {
        min_score,
        level: ResistanceLevel {
            level,
            text: text.to_string(),
            sir,
        },
    }
}

impl LevelTable {
    /// Validate and build a table.
    ///
    /// Levels must be numbered `1..=n` in order and the minimal scores after
    /// the first level must be strictly increasing.
    pub fn new(thresholds: Vec<LevelThreshold>) -> Result<Self, RuleError> {
        if thresholds.is_empty() {
            return Err(RuleError::InvalidLevelTable("no levels".to_string()));
        }
        for (idx, threshold) in thresholds.iter().enumerate() {
            if usize::from(threshold.level.level) != idx + 1 {
                return Err(RuleError::InvalidLevelTable(format!(
                    "level {} at index {}",
                    threshold.level.level, idx
                )));
            }
            if idx > 0 && !threshold.min_score.is_finite() {
                return Err(RuleError::InvalidLevelTable(format!(
                    "invalid minimal score for level {}",
                    threshold.level.level
                )));
            }
            if idx > 1 && threshold.min_score <= thresholds[idx - 1].min_score {
                return Err(RuleError::InvalidLevelTable(format!(
                    "minimal score of level {} is not above level {}",
                    threshold.level.level,
                    thresholds[idx - 1].level.level
                )));
            }
        }
        Ok(Self { thresholds })
    }

    /// The five-level table with "Potential Low-Level Resistance" at level 2.
    pub fn hivdb() -> Self {
        Self {
            thresholds: vec![
                threshold(0.0, 1, "Susceptible", Sir::S),
                threshold(10.0, 2, "Potential Low-Level Resistance", Sir::S),
                threshold(15.0, 3, "Low-Level Resistance", Sir::I),
                threshold(30.0, 4, "Intermediate Resistance", Sir::I),
                threshold(60.0, 5, "High-Level Resistance", Sir::R),
            ],
        }
    }

    /// Same thresholds as `hivdb()` but level 2 reads "Susceptible".
    pub fn generic() -> Self {
        let mut result = Self::hivdb();
        result.thresholds[1].level.text = "Susceptible".to_string();
        result
    }

    /// The level for a total score.
    pub fn level_for(&self, score: f64) -> &ResistanceLevel {
        self.thresholds
            .iter()
            .skip(1)
            .filter(|threshold| score >= threshold.min_score)
            .last()
            .map(|threshold| &threshold.level)
            .unwrap_or(&self.thresholds[0].level)
    }

    /// The level for drugs without any triggered rule.
    pub fn baseline(&self) -> &ResistanceLevel {
        &self.thresholds[0].level
    }

    /// Find the level named by a trigger `label`.
    ///
    /// The level text is matched first and the SIR letter only if no text
    /// matches. Of several matching levels, the lowest one is returned.
    pub fn find_by_label(&self, label: &str) -> Option<&ResistanceLevel> {
        let label = label.trim();
        let levels = || self.thresholds.iter().map(|threshold| &threshold.level);
        levels()
            .find(|level| level.text.eq_ignore_ascii_case(label))
            .or_else(|| levels().find(|level| level.sir.to_string().eq_ignore_ascii_case(label)))
    }

    pub fn thresholds(&self) -> &[LevelThreshold] {
        &self.thresholds
    }
}

impl TryFrom<Vec<LevelThreshold>> for LevelTable {
    type Error = RuleError;

    fn try_from(thresholds: Vec<LevelThreshold>) -> Result<Self, Self::Error> {
        Self::new(thresholds)
    }
}

impl From<LevelTable> for Vec<LevelThreshold> {
    fn from(table: LevelTable) -> Self {
        table.thresholds
    }
}

/// Which boolean conditions from an external evaluator count as triggered.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerFilter {
    /// Every triggered condition.
    #[default]
    All,
    /// Only conditions whose level is not susceptible.
    NonSusceptible,
}

/// The rule families with their default labels and trigger filters.
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Debug,
    Clone,
    Copy,
    Default,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlgorithmFamily {
    #[default]
    Hivdb,
    Generic,
}

impl AlgorithmFamily {
    pub fn default_levels(&self) -> LevelTable {
        match self {
            AlgorithmFamily::Hivdb => LevelTable::hivdb(),
            AlgorithmFamily::Generic => LevelTable::generic(),
        }
    }

    pub fn default_trigger_filter(&self) -> TriggerFilter {
        match self {
            AlgorithmFamily::Hivdb => TriggerFilter::All,
            AlgorithmFamily::Generic => TriggerFilter::NonSusceptible,
        }
    }
}

/// Configuration passed into the score aggregator.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct AlgorithmConfig {
    pub family: AlgorithmFamily,
    pub levels: LevelTable,
    pub trigger_filter: TriggerFilter,
}

impl AlgorithmConfig {
    /// The defaults of `family`.
    pub fn for_family(family: AlgorithmFamily) -> Self {
        Self {
            family,
            levels: family.default_levels(),
            trigger_filter: family.default_trigger_filter(),
        }
    }

    /// Whether a boolean condition at `label` counts as triggered.
    pub fn keeps_trigger(&self, label: &str) -> bool {
        match self.trigger_filter {
            TriggerFilter::All => true,
            TriggerFilter::NonSusceptible => self
                .levels
                .find_by_label(label)
                .map_or(true, |level| level.sir != Sir::S),
        }
    }
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self::for_family(AlgorithmFamily::default())
    }
}
