//! Registry of rule sets and scoring entry point.

pub mod cache;

use std::{path::Path, sync::Arc, time::Instant};

use indexmap::IndexMap;

use crate::{
    common::Gene,
    conf::{resolve_path, EngineConf, RuleSetConf},
    err::EngineError,
    mutations::MutationSet,
    rules::{drugs::DrugCatalog, io::load_records, trie::RuleTrie, RuleStore},
    scoring::{
        aggregate::{GeneResistance, ScoreAggregator},
        evaluator::{AllOfEvaluator, ConditionEvaluator},
        levels::AlgorithmConfig,
        matcher::TrieMatcher,
        RawScores,
    },
};

use self::cache::TrieCache;

/// A validated rule set with its algorithm configuration.
pub struct RuleSet {
    pub id: String,
    pub store: RuleStore,
    pub config: AlgorithmConfig,
    /// Evaluator for conditions outside of the rule store.
    pub evaluator: Option<Arc<dyn ConditionEvaluator>>,
}

impl RuleSet {
    pub fn new(id: &str, store: RuleStore, config: AlgorithmConfig) -> Self {
        Self {
            id: id.to_string(),
            store,
            config,
            evaluator: None,
        }
    }

    /// Return copy with the given condition evaluator.
    pub fn with_evaluator(self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        Self {
            evaluator: Some(evaluator),
            ..self
        }
    }

    /// Load the rule set described by `conf`; relative paths are resolved
    /// against `conf_path`.
    pub fn load<P: AsRef<Path>>(
        conf_path: P,
        conf: &RuleSetConf,
        catalog: &DrugCatalog,
    ) -> Result<Self, anyhow::Error> {
        let records = load_records(resolve_path(conf_path.as_ref(), &conf.path))?;
        let store = RuleStore::from_records(&records, catalog.clone())
            .map_err(|e| anyhow::anyhow!("rule set {:?} failed to load: {}", &conf.id, e))?;
        let result = Self::new(&conf.id, store, conf.algorithm_config());
        Ok(match &conf.conditions {
            Some(conditions) => {
                let evaluator =
                    AllOfEvaluator::load(resolve_path(conf_path.as_ref(), conditions), catalog)?;
                result.with_evaluator(Arc::new(evaluator))
            }
            None => result,
        })
    }
}

/// Scores mutation sets against registered rule sets.
///
/// Tries are built on first use per rule set and gene and shared afterwards.
/// The engine is `Sync` and may be queried from many threads.
#[derive(Default)]
pub struct Engine {
    rule_sets: IndexMap<String, RuleSet>,
    cache: TrieCache,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the engine from the configuration file at `path`.
    ///
    /// Fails if any rule set fails to load; no partially loaded engine is
    /// returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let before_loading = Instant::now();
        let conf = EngineConf::load(path.as_ref())?;
        let catalog = conf.catalog();
        let mut engine = Self::new();
        for rule_set_conf in &conf.rule_sets {
            tracing::info!("loading rule set {:?}", &rule_set_conf.id);
            engine.register(RuleSet::load(path.as_ref(), rule_set_conf, &catalog)?)?;
        }
        tracing::info!(
            "... loaded {} rule set(s) in {:?}",
            engine.rule_sets.len(),
            before_loading.elapsed()
        );
        Ok(engine)
    }

    /// Register a rule set; identifiers must be unique.
    pub fn register(&mut self, rule_set: RuleSet) -> Result<(), EngineError> {
        if self.rule_sets.contains_key(&rule_set.id) {
            return Err(EngineError::DuplicateRuleSet(rule_set.id));
        }
        tracing::debug!(
            "registering rule set {:?} with {} rules",
            &rule_set.id,
            rule_set.store.len()
        );
        self.rule_sets.insert(rule_set.id.clone(), rule_set);
        Ok(())
    }

    /// Identifiers of the registered rule sets, in registration order.
    pub fn rule_set_ids(&self) -> Vec<&str> {
        self.rule_sets.keys().map(String::as_str).collect()
    }

    pub fn rule_set(&self, id: &str) -> Result<&RuleSet, EngineError> {
        self.rule_sets
            .get(id)
            .ok_or_else(|| EngineError::UnknownRuleSet(id.to_string()))
    }

    pub fn cache(&self) -> &TrieCache {
        &self.cache
    }

    /// The trie for `gene` in rule set `id`, built on first use.
    pub fn trie(&self, id: &str, gene: Gene) -> Result<Arc<RuleTrie>, EngineError> {
        let rule_set = self.rule_set(id)?;
        Ok(self.cache.get_or_build(id, gene, || {
            RuleTrie::build(gene, rule_set.store.rules(gene))
        }))
    }

    /// Score `mutations` of `gene` with rule set `id` and its own evaluator, if any.
    pub fn score(
        &self,
        id: &str,
        gene: Gene,
        mutations: &MutationSet,
    ) -> Result<GeneResistance, EngineError> {
        let rule_set = self.rule_set(id)?;
        self.score_impl(rule_set, gene, mutations, rule_set.evaluator.as_deref())
    }

    /// Score with the trie of rule set `id` and the given evaluator.
    pub fn score_with_evaluator(
        &self,
        id: &str,
        gene: Gene,
        mutations: &MutationSet,
        evaluator: &dyn ConditionEvaluator,
    ) -> Result<GeneResistance, EngineError> {
        let rule_set = self.rule_set(id)?;
        self.score_impl(rule_set, gene, mutations, Some(evaluator))
    }

    fn score_impl(
        &self,
        rule_set: &RuleSet,
        gene: Gene,
        mutations: &MutationSet,
        evaluator: Option<&dyn ConditionEvaluator>,
    ) -> Result<GeneResistance, EngineError> {
        let trie = self.trie(&rule_set.id, gene)?;
        let mut raw = RawScores::from_matches(TrieMatcher::new(&trie).find_matches(mutations));
        if let Some(evaluator) = evaluator {
            let conditions = evaluator
                .evaluate(gene, mutations)
                .map_err(|e| EngineError::Evaluator(rule_set.id.clone(), e.to_string()))?;
            raw.extend(RawScores::from_conditions(conditions));
        }
        Ok(ScoreAggregator::new(&rule_set.config).aggregate(
            gene,
            &rule_set.id,
            &rule_set.store.catalog().drugs_for_gene(gene),
            raw,
        ))
    }
}
