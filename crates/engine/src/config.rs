//! Engine settings, read by the host from the `[engine]` table of its
//! settings file.
//!
//! Missing keys fall back to defaults, so an empty table is valid.

use serde::{Deserialize, Serialize};

use expr::VariableCatalogue;

/// Tuning knobs and policies for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of transitions in one pass before it is cut short.
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    /// Let dispatch rules match numbers against their string form
    /// (`42` matches `"42"`).
    #[serde(default = "default_true")]
    pub dispatch_coercion: bool,

    /// Queue notifications as after-jobs instead of sending them inline.
    /// `status-engine serve` always sets this: its gateways are async and
    /// run on the after-job worker.
    #[serde(default)]
    pub defer_notifications: bool,

    #[serde(default = "default_cache_capacity")]
    pub expression_cache_capacity: usize,

    /// Variables expressions may reference. `None` accepts any name not
    /// starting with `_`; entries ending with `*` match by prefix.
    #[serde(default)]
    pub declared_variables: Option<Vec<String>>,
}

fn default_max_hops() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    expr::evaluator::DEFAULT_CACHE_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            dispatch_coercion: true,
            defer_notifications: false,
            expression_cache_capacity: default_cache_capacity(),
            declared_variables: None,
        }
    }
}

impl EngineConfig {
    pub fn catalogue(&self) -> VariableCatalogue {
        match &self.declared_variables {
            Some(names) => VariableCatalogue::declared(names.iter().cloned()),
            None => VariableCatalogue::Open,
        }
    }
}
