//! Testing utilities for weave components.
//!
//! Available with the `test-utils` feature and in unit tests.
//!
//! - [`notify`] wraps [`tokio::sync::Notify`] and futures with timeouts so that a test waiting on
//!   a state that is never reached fails instead of hanging.
//! - [`channel`] builds channels already filled with values, open or closed.
//! - [`task`] provides pool tasks that count, fail, panic or block on demand.

pub mod channel;
pub mod notify;
pub mod task;
