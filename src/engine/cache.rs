//! Build-once cache of rule tries.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, OnceLock,
    },
};

use crate::{common::Gene, rules::trie::RuleTrie};

type Cell = Arc<OnceLock<Arc<RuleTrie>>>;

/// Tries keyed by rule set identifier and gene.
///
/// The first caller for a key builds the trie while concurrent callers for the
/// same key wait for it; the map lock is only held to look up the key's cell.
/// Entries live until the owning engine is dropped or the rule set evicted.
#[derive(Debug, Default)]
pub struct TrieCache {
    cells: Mutex<HashMap<(String, Gene), Cell>>,
    builds: AtomicUsize,
}

impl TrieCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached trie, calling `build` if there is none yet.
    pub fn get_or_build<F>(&self, rule_set: &str, gene: Gene, build: F) -> Arc<RuleTrie>
    where
        F: FnOnce() -> RuleTrie,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
            cells
                .entry((rule_set.to_string(), gene))
                .or_default()
                .clone()
        };
        cell.get_or_init(|| {
            self.builds.fetch_add(1, Ordering::Relaxed);
            Arc::new(build())
        })
        .clone()
    }

    /// The cached trie, without building it.
    pub fn get(&self, rule_set: &str, gene: Gene) -> Option<Arc<RuleTrie>> {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells
            .get(&(rule_set.to_string(), gene))
            .and_then(|cell| cell.get().cloned())
    }

    /// Drop all tries of `rule_set`.
    pub fn evict(&self, rule_set: &str) {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.retain(|(id, _), _| id != rule_set);
    }

    /// Number of tries built so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of cached tries.
    pub fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.values().filter(|cell| cell.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
