//! Definition of the rule set configuration file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    rules::drugs::DrugCatalog,
    scoring::levels::{AlgorithmConfig, AlgorithmFamily, LevelTable, TriggerFilter},
};

/// Configuration of the rule sets served by the engine.
#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct EngineConf {
    /// Drug catalog replacing the built-in HIV-1 catalog.
    #[serde(default)]
    pub drugs: Option<DrugCatalog>,
    /// The rule sets, in order of registration.
    pub rule_sets: Vec<RuleSetConf>,
}

/// Configuration of one rule set.
#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct RuleSetConf {
    /// Identifier of the rule set, e.g., `hivdb-9.5`.
    pub id: String,
    /// Rule family, selects the default labels and trigger filter.
    #[serde(default)]
    pub family: AlgorithmFamily,
    /// Path to the rule records, relative to the configuration file.
    pub path: String,
    /// Optional path to all-of conditions, relative to the configuration file.
    #[serde(default)]
    pub conditions: Option<String>,
    /// Threshold table overriding the family's default.
    #[serde(default)]
    pub levels: Option<LevelTable>,
    /// Trigger filter overriding the family's default.
    #[serde(default)]
    pub trigger_filter: Option<TriggerFilter>,
}

impl RuleSetConf {
    /// The algorithm configuration with overrides applied.
    pub fn algorithm_config(&self) -> AlgorithmConfig {
        let defaults = AlgorithmConfig::for_family(self.family);
        AlgorithmConfig {
            family: self.family,
            levels: self.levels.clone().unwrap_or(defaults.levels),
            trigger_filter: self.trigger_filter.unwrap_or(defaults.trigger_filter),
        }
    }
}

impl EngineConf {
    /// Load configuration from the TOML file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let toml_str = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("could not read {:?}: {}", path.as_ref(), e))?;
        toml::from_str(&toml_str)
            .map_err(|e| anyhow::anyhow!("could not parse {:?}: {}", path.as_ref(), e))
    }

    /// The configured drug catalog or the built-in one.
    pub fn catalog(&self) -> DrugCatalog {
        self.drugs.clone().unwrap_or_default()
    }
}

/// Resolve `path` relative to the directory of the configuration file.
pub fn resolve_path<P: AsRef<Path>>(conf_path: P, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        conf_path
            .as_ref()
            .parent()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|| path.to_path_buf())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::{rules::drugs::DrugClass, scoring::levels::Sir};

    use super::*;

    #[test]
    fn parse_config_full() -> Result<(), anyhow::Error> {
        let conf = EngineConf::load("tests/data/conf/full.toml")?;

        assert_eq!(conf.rule_sets.len(), 2);

        let hivdb = &conf.rule_sets[0];
        assert_eq!(hivdb.id, "hivdb-mini");
        assert_eq!(hivdb.family, AlgorithmFamily::Hivdb);
        assert_eq!(hivdb.path, "../rules/hivdb-mini.tsv");
        assert_eq!(hivdb.conditions, None);
        assert_eq!(hivdb.algorithm_config(), AlgorithmConfig::default());

        let generic = &conf.rule_sets[1];
        assert_eq!(generic.family, AlgorithmFamily::Generic);
        assert_eq!(
            generic.conditions.as_deref(),
            Some("../conditions/all-of.tsv")
        );
        let config = generic.algorithm_config();
        assert_eq!(config.trigger_filter, TriggerFilter::All);
        assert_eq!(config.levels.thresholds().len(), 3);
        assert_eq!(config.levels.level_for(20.0).sir, Sir::I);
        assert_eq!(config.levels.level_for(40.0).text, "Resistant");

        let catalog = conf.catalog();
        assert_eq!(catalog.len(), 26);
        assert_eq!(
            catalog.get("LEN").map(|drug| drug.class()),
            Some(DrugClass::Cai)
        );

        Ok(())
    }

    #[test]
    fn parse_config_minimal() -> Result<(), anyhow::Error> {
        let conf: EngineConf = toml::from_str(
            r#"
            [[rule_sets]]
            id = "hivdb"
            path = "rules.tsv"
            "#,
        )?;

        assert_eq!(conf.drugs, None);
        assert_eq!(conf.catalog(), DrugCatalog::hiv1());
        assert_eq!(conf.rule_sets[0].family, AlgorithmFamily::Hivdb);

        Ok(())
    }

    #[test]
    fn parse_config_invalid_levels() {
        let result = toml::from_str::<EngineConf>(
            r#"
            [[rule_sets]]
            id = "broken"
            path = "rules.tsv"

            [[rule_sets.levels]]
            min_score = 0.0
            level = 2
            text = "Susceptible"
            sir = "S"
            "#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn resolve_relative_paths() {
        assert_eq!(
            resolve_path("tests/data/conf/full.toml", "../rules/x.tsv"),
            PathBuf::from("tests/data/conf/../rules/x.tsv")
        );
        assert_eq!(
            resolve_path("tests/data/conf/full.toml", "/abs/x.tsv"),
            PathBuf::from("/abs/x.tsv")
        );
    }
}
