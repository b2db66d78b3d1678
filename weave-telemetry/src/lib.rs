//! Tracing and metrics initialization shared by weave binaries and tests.

pub mod metrics;
pub mod tracing;
