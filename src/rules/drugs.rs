//! Drugs, drug classes, and the catalog of drugs known to a rule set.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::common::Gene;

/// Enumeration of the drug classes.
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
    strum::EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum DrugClass {
    /// Protease inhibitors
    Pi,
    /// Nucleoside reverse transcriptase inhibitors
    Nrti,
    /// Non-nucleoside reverse transcriptase inhibitors
    Nnrti,
    /// Integrase strand transfer inhibitors
    Insti,
    /// Capsid inhibitors
    Cai,
}

impl DrugClass {
    /// The gene targeted by the drug class.
    pub fn gene(&self) -> Gene {
        match self {
            DrugClass::Pi => Gene::Pr,
            DrugClass::Nrti | DrugClass::Nnrti => Gene::Rt,
            DrugClass::Insti => Gene::In,
            DrugClass::Cai => Gene::Ca,
        }
    }
}

/// A drug with its class; ordered by class, then name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Drug {
    class: DrugClass,
    name: String,
}

impl Drug {
    pub fn new(name: &str, class: DrugClass) -> Self {
        Self {
            class,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> DrugClass {
        self.class
    }
}

impl fmt::Display for Drug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Drugs serialize as their name so they can be used as JSON keys.
impl Serialize for Drug {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// The drugs known to a rule set, by name.
///
/// In configuration files, the catalog is written as a table from drug
/// class to the list of drug names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "IndexMap<DrugClass, Vec<String>>",
    into = "IndexMap<DrugClass, Vec<String>>"
)]
pub struct DrugCatalog {
    drugs: IndexMap<String, DrugClass>,
}

impl DrugCatalog {
    /// The HIV-1 drugs with resistance interpretation.
    pub fn hiv1() -> Self {
        IndexMap::from([
            (
                DrugClass::Pi,
                vec![
                    "ATV/r", "DRV/r", "FPV/r", "IDV/r", "LPV/r", "NFV", "SQV/r", "TPV/r",
                ],
            ),
            (
                DrugClass::Nrti,
                vec!["ABC", "AZT", "D4T", "DDI", "FTC", "3TC", "TDF"],
            ),
            (DrugClass::Nnrti, vec!["DOR", "EFV", "ETR", "NVP", "RPV"]),
            (DrugClass::Insti, vec!["BIC", "CAB", "DTG", "EVG", "RAL"]),
            (DrugClass::Cai, vec!["LEN"]),
        ])
        .into_iter()
        .map(|(class, names)| {
            (
                class,
                names.into_iter().map(String::from).collect::<Vec<_>>(),
            )
        })
        .collect::<IndexMap<_, _>>()
        .into()
    }

    /// Look up drug by name.
    pub fn get(&self, name: &str) -> Option<Drug> {
        self.drugs.get(name).map(|class| Drug::new(name, *class))
    }

    /// The drugs targeting `gene`, ordered by class and name.
    pub fn drugs_for_gene(&self, gene: Gene) -> Vec<Drug> {
        let mut result = self
            .drugs
            .iter()
            .filter(|(_, class)| class.gene() == gene)
            .map(|(name, class)| Drug::new(name, *class))
            .collect::<Vec<_>>();
        result.sort();
        result
    }

    pub fn len(&self) -> usize {
        self.drugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty()
    }
}

impl Default for DrugCatalog {
    fn default() -> Self {
        Self::hiv1()
    }
}

impl From<IndexMap<DrugClass, Vec<String>>> for DrugCatalog {
    fn from(by_class: IndexMap<DrugClass, Vec<String>>) -> Self {
        Self {
            drugs: by_class
                .into_iter()
                .flat_map(|(class, names)| names.into_iter().map(move |name| (name, class)))
                .collect(),
        }
    }
}

impl From<DrugCatalog> for IndexMap<DrugClass, Vec<String>> {
    fn from(catalog: DrugCatalog) -> Self {
        let mut result: IndexMap<DrugClass, Vec<String>> = IndexMap::new();
        for (name, class) in catalog.drugs {
            result.entry(class).or_default().push(name);
        }
        result
    }
}
