use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Sizing of the source, transform and filter stages of a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Capacity of every inter-stage channel. Zero makes each hand-off a rendezvous.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// Number of concurrent transform workers.
    #[serde(default = "default_width")]
    pub width: usize,
}

impl PipelineConfig {
    pub const DEFAULT_BUFFER: usize = 16;

    pub const DEFAULT_WIDTH: usize = 4;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.width == 0 {
            return Err(ValidationError::must_be_positive("pipeline.width"));
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer: default_buffer(),
            width: default_width(),
        }
    }
}

fn default_buffer() -> usize {
    PipelineConfig::DEFAULT_BUFFER
}

fn default_width() -> usize {
    PipelineConfig::DEFAULT_WIDTH
}
