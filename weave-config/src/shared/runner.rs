use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{FanInConfig, PipelineConfig, PoolConfig, RallyConfig, ValidationError};

/// Workload executed by the runner service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Workload {
    /// Submits `tasks` tasks to a worker pool and waits for them.
    Pool { tasks: usize },
    /// Pushes `0..items` through the square-and-filter pipeline.
    Pipeline { items: u64 },
    /// Merges `inputs` streams of `items_per_input` values each.
    FanIn {
        inputs: usize,
        items_per_input: usize,
    },
    /// Plays a ping/pong rally.
    Rally,
}

/// Complete configuration of the runner service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    pub workload: Workload,
    /// Deadline for the whole run, in milliseconds. Runs until done or Ctrl-C when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Port of the Prometheus scrape endpoint. Metrics are only logged at exit when absent.
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub fan_in: FanInConfig,
    #[serde(default)]
    pub rally: RallyConfig,
}

impl RunnerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Validates the sections the selected workload depends on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_ms == Some(0) {
            return Err(ValidationError::must_be_positive("timeout_ms"));
        }

        match &self.workload {
            Workload::Pool { .. } => self.pool.validate(),
            Workload::Pipeline { .. } => self.pipeline.validate(),
            Workload::FanIn { .. } => self.fan_in.validate(),
            Workload::Rally => Ok(()),
        }
    }
}

impl Config for RunnerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
