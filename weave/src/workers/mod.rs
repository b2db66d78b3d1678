//! Worker pool executing submitted tasks on a fixed number of workers.

pub mod pool;

pub use pool::{PoolStats, Task, WorkerPool};
