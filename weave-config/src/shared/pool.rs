use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Worker pool sizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    /// Number of workers draining the dispatch queue.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl PoolConfig {
    pub const DEFAULT_WORKERS: usize = 4;

    /// Rejects a pool without workers, which would never run a task.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::must_be_positive("pool.workers"));
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    PoolConfig::DEFAULT_WORKERS
}
