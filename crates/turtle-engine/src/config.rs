use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// How the resolver computes a descendant closure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescendantStrategy {
    /// Ask the log for the closure.
    #[default]
    PushDown,
    /// Fetch every current parent edge and expand in memory.
    InMemory,
}

/// Engine settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Actor tag written on every event the pipeline appends.
    pub actor: String,
    /// Upper bound on parent hops fetched per ancestor walk.
    pub max_ancestor_depth: usize,
    pub descendant_strategy: DescendantStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            actor: "Service".to_string(),
            max_ancestor_depth: 4096,
            descendant_strategy: DescendantStrategy::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.actor.trim().is_empty() {
            return Err(EngineError::Config("actor must not be empty".into()));
        }
        if self.max_ancestor_depth == 0 {
            return Err(EngineError::Config("max_ancestor_depth must be at least 1".into()));
        }
        Ok(())
    }
}
