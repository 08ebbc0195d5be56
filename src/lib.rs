//! One-shot settlement cells.
//!
//! A [`Promise`] starts out pending and is settled exactly once, by a
//! producer running on a shared worker pool, with either a value or an
//! error. Consumers attach continuations with [`Promise::then`] and
//! [`Promise::catch_error`], fan in with [`Promise::all`] and
//! [`Promise::race`], block for an outcome with [`Promise::mirror`], or
//! simply `.await` the cell.
//!
//! Settlement is monotonic: once a cell leaves the pending state, every
//! later resolve or reject call is a silent no-op. Continuations registered
//! on the same cell fire in registration order, on whichever thread
//! performs the settling call.
//!
//! A cell that ends rejected without any failure handler ever observing the
//! error emits a `tracing` warning when its last handle drops. Rejections
//! are easy to lose silently otherwise.
//!
//! # Examples
//!
//! ```
//! use promise_cell::Promise;
//! use futures::executor::block_on;
//! use std::{thread, time::Duration};
//!
//! let cell: Promise<i32, String> = Promise::new(|resolver, _rejector| {
//!     thread::sleep(Duration::from_millis(10));
//!     resolver.resolve(41);
//! });
//! let sum = cell.then(|n| n + 1);
//! assert_eq!(block_on(sum), Ok(42));
//! ```

use std::time::Duration;
use thiserror::Error;

mod cell;
mod combine;
mod pool;

pub use cell::{Promise, Rejector, Resolver, State};

/// Error returned by [`Promise::mirror_timeout`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The source cell was still pending when the deadline expired.
    #[error("timed out after {0:?} waiting for a pending cell to settle")]
    Timeout(Duration),
}
