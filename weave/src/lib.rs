//! In-process concurrency coordination primitives.
//!
//! Every component communicates exclusively through the bounded channels of
//! [`concurrency::channel`] and observes an explicit [`concurrency::cancel::CancelToken`] at every
//! point where it may block.
//!
//! - [`workers`] runs submitted tasks on a fixed set of workers with backpressure.
//! - [`pipeline`] chains a source, a parallel transform and a filter stage.
//! - [`combinators`] merges, splits and races streams.
//! - [`rally`] drives two parties through a strictly alternating exchange.

pub mod combinators;
pub mod concurrency;
pub mod error;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod rally;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod workers;

pub use concurrency::cancel::{CancelCause, CancelResult, CancelToken};
pub use concurrency::channel::{ChannelError, ChannelRx, ChannelTx, bounded};
pub use error::{ErrorKind, WeaveError, WeaveResult};
