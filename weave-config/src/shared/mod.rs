//! Shared configuration types for weave workloads.

mod base;
mod fan_in;
mod pipeline;
mod pool;
mod rally;
mod runner;

pub use base::ValidationError;
pub use fan_in::FanInConfig;
pub use pipeline::PipelineConfig;
pub use pool::PoolConfig;
pub use rally::RallyConfig;
pub use runner::{RunnerConfig, Workload};
