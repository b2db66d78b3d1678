//! Concurrency primitives shared by every weave component.
//!
//! These are the leaves of the crate. Higher level components such as the worker pool, the
//! pipeline engine and the combinators are built only from the pieces in this module.
//!
//! - [`cancel`] provides the [`cancel::CancelToken`] threaded explicitly through every operation
//!   that may block, together with [`cancel::CancelResult`] for partial results.
//! - [`channel`] provides typed bounded channels whose send and receive race cancellation. They
//!   are the only way components exchange data.
//! - [`arena`] runs per-input tasks in a bounded number of slots.
//! - [`signal`] provides one-shot latches used for close notifications.
//! - [`lazy`] and [`counter`] cover exactly-once initialization and shared tallies.
//!
//! Every suspension point inside these primitives is a multi-way wait that also listens for
//! cancellation, so no task built on top of them can block past the firing of its token.

pub mod arena;
pub mod cancel;
pub mod channel;
pub mod counter;
pub mod future;
pub mod lazy;
pub mod signal;
