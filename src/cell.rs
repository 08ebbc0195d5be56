//! The settlement cell: a single-assignment container settled exactly once
//! with a value or an error, broadcasting that outcome to continuations,
//! blocked waiters, and parked wakers.

use crate::{pool, WaitError};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::task::Waker;
use std::time::Duration;
use tracing::warn;

/// Settlement state of a cell. The transition out of [`State::Pending`] is
/// one-shot: it happens at most once, and never reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Resolved,
    Rejected,
}

enum Payload<T, E> {
    Empty,
    Value(T),
    Error(E),
}

type ValueFn<T> = Box<dyn FnOnce(T) + Send>;
type ErrorFn<E> = Box<dyn FnOnce(E) + Send>;

struct Inner<T, E> {
    state: State,
    payload: Payload<T, E>,
    on_value: Vec<ValueFn<T>>,
    on_error: Vec<ErrorFn<E>>,
    wakers: Vec<Waker>, // Every waker is kept and woken, not just the last.
    error_observed: bool,
}

impl<T: Clone, E: Clone> Inner<T, E> {
    /// Clone out the settled outcome. Only called once `state` has left
    /// `Pending`, at which point the payload tag matches the state.
    fn outcome(&mut self) -> Result<T, E> {
        match &self.payload {
            Payload::Value(value) => Ok(value.clone()),
            Payload::Error(error) => {
                self.error_observed = true;
                Err(error.clone())
            }
            Payload::Empty => unreachable!("settled cell with an empty payload"),
        }
    }
}

struct Shared<T, E> {
    inner: Mutex<Inner<T, E>>,
    settled: Condvar,
}

impl<T: Clone, E: Clone> Shared<T, E> {
    /// The one-shot transition. First caller out of `Pending` wins; every
    /// later call returns without touching state or payload.
    ///
    /// Continuations of the winning kind are drained under the lock and
    /// fired after it is released, in registration order, on the calling
    /// thread. The losing kind is dropped unfired.
    fn settle(&self, outcome: Result<T, E>) {
        match outcome {
            Ok(value) => {
                let (callbacks, wakers) = {
                    let mut inner = self.inner.lock();
                    if inner.state != State::Pending {
                        return;
                    }
                    inner.state = State::Resolved;
                    inner.payload = Payload::Value(value.clone());
                    inner.on_error.clear();
                    (
                        std::mem::take(&mut inner.on_value),
                        std::mem::take(&mut inner.wakers),
                    )
                };
                self.settled.notify_all();
                for waker in wakers {
                    waker.wake();
                }
                for callback in callbacks {
                    callback(value.clone());
                }
            }
            Err(error) => {
                let (callbacks, wakers) = {
                    let mut inner = self.inner.lock();
                    if inner.state != State::Pending {
                        return;
                    }
                    inner.state = State::Rejected;
                    inner.payload = Payload::Error(error.clone());
                    inner.on_value.clear();
                    if !inner.on_error.is_empty() {
                        inner.error_observed = true;
                    }
                    (
                        std::mem::take(&mut inner.on_error),
                        std::mem::take(&mut inner.wakers),
                    )
                };
                self.settled.notify_all();
                for waker in wakers {
                    waker.wake();
                }
                for callback in callbacks {
                    callback(error.clone());
                }
            }
        }
    }
}

impl<T, E> Drop for Shared<T, E> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.state == State::Rejected && !inner.error_observed {
            warn!("promise dropped while rejected; no failure handler ever observed the error");
        }
    }
}

/// A one-shot settlement cell.
///
/// Cloning a `Promise` clones a handle to the same cell; the cell lives as
/// long as its longest-lived handle, producer-side
/// ([`Resolver`]/[`Rejector`]) or consumer-side.
///
/// `Promise` also implements [`Future`](std::future::Future), yielding
/// `Result<T, E>`, so a cell can be awaited directly.
///
/// # Examples
///
/// ```
/// use promise_cell::Promise;
/// use futures::executor::block_on;
/// use std::{thread, time::Duration};
///
/// let cell: Promise<String, String> = Promise::new(|resolver, _rejector| {
///     thread::sleep(Duration::from_millis(10));
///     resolver.resolve("🍓".into());
/// });
/// assert_eq!(block_on(cell), Ok("🍓".to_string()));
/// ```
pub struct Promise<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Promise {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> std::fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise").field("state", &self.state()).finish()
    }
}

/// The success entry point handed to an executor. Calling
/// [`resolve`](Resolver::resolve) more than once, or after the cell was
/// rejected, is a silent no-op.
pub struct Resolver<T, E> {
    shared: Arc<Shared<T, E>>,
}

/// The failure entry point handed to an executor. Calling
/// [`reject`](Rejector::reject) more than once, or after the cell was
/// resolved, is a silent no-op.
pub struct Rejector<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Resolver {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Clone for Rejector<T, E> {
    fn clone(&self) -> Self {
        Rejector {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone, E: Clone> Resolver<T, E> {
    pub fn resolve(&self, value: T) {
        self.shared.settle(Ok(value));
    }
}

impl<T: Clone, E: Clone> Rejector<T, E> {
    pub fn reject(&self, error: E) {
        self.shared.settle(Err(error));
    }
}

impl<T, E> Promise<T, E> {
    pub(crate) fn pending() -> Self {
        Promise {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: State::Pending,
                    payload: Payload::Empty,
                    on_value: Vec::new(),
                    on_error: Vec::new(),
                    wakers: Vec::new(),
                    error_observed: false,
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Current settlement state.
    pub fn state(&self) -> State {
        self.shared.inner.lock().state
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a pending cell and schedules `executor` on the shared worker
    /// pool. The executor receives the cell's two settlement entry points
    /// and is expected to invoke one of them, once, at some later time;
    /// extra invocations are no-ops.
    ///
    /// Returns immediately, without waiting for the executor to run.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::{Promise, State};
    ///
    /// let cell: Promise<i32, String> = Promise::new(|resolver, _rejector| {
    ///     resolver.resolve(7);
    /// });
    /// // The executor may not have run yet; the cell settles on its own time.
    /// assert!(matches!(cell.state(), State::Pending | State::Resolved));
    /// ```
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T, E>, Rejector<T, E>) + Send + 'static,
    {
        let cell = Self::pending();
        let resolver = Resolver {
            shared: Arc::clone(&cell.shared),
        };
        let rejector = Rejector {
            shared: Arc::clone(&cell.shared),
        };
        pool::spawn(move || executor(resolver, rejector));
        cell
    }

    /// An already-resolved cell. Settles directly on the caller, with no
    /// worker-pool dispatch.
    pub fn resolved(value: T) -> Self {
        let cell = Self::pending();
        cell.shared.settle(Ok(value));
        cell
    }

    /// An already-rejected cell. Settles directly on the caller, with no
    /// worker-pool dispatch.
    pub fn rejected(error: E) -> Self {
        let cell = Self::pending();
        cell.shared.settle(Err(error));
        cell
    }

    /// Evaluates `f` synchronously on the caller and settles a cell from
    /// the returned `Result`.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::{Promise, State};
    ///
    /// let cell: Promise<i32, String> = Promise::try_with(|| "41".parse().map_err(|_| "bad".into()));
    /// assert_eq!(cell.state(), State::Resolved);
    /// ```
    pub fn try_with<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T, E>,
    {
        match f() {
            Ok(value) => Self::resolved(value),
            Err(error) => Self::rejected(error),
        }
    }

    /// Blocks the calling thread until `source` settles, then returns a new
    /// already-settled cell carrying the same outcome. If `source` is
    /// already settled, returns without blocking.
    ///
    /// Only the calling thread is parked; worker-pool threads are not
    /// involved. For a wait with a deadline use [`Promise::mirror_timeout`].
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::{Promise, State};
    /// use std::{thread, time::Duration};
    ///
    /// let source: Promise<i32, String> = Promise::new(|resolver, _rejector| {
    ///     thread::sleep(Duration::from_millis(10));
    ///     resolver.resolve(3);
    /// });
    /// let settled = Promise::mirror(&source);
    /// assert_eq!(settled.state(), State::Resolved);
    /// ```
    pub fn mirror(source: &Promise<T, E>) -> Promise<T, E> {
        let mut inner = source.shared.inner.lock();
        source
            .shared
            .settled
            .wait_while(&mut inner, |inner| inner.state == State::Pending);
        match inner.outcome() {
            Ok(value) => Self::resolved(value),
            Err(error) => Self::rejected(error),
        }
    }

    /// As [`Promise::mirror`], but gives up after `timeout` with
    /// [`WaitError::Timeout`] instead of waiting indefinitely. The source
    /// cell is left untouched and may still settle later.
    pub fn mirror_timeout(
        source: &Promise<T, E>,
        timeout: Duration,
    ) -> Result<Promise<T, E>, WaitError> {
        let mut inner = source.shared.inner.lock();
        let wait = source.shared.settled.wait_while_for(
            &mut inner,
            |inner| inner.state == State::Pending,
            timeout,
        );
        if wait.timed_out() {
            return Err(WaitError::Timeout(timeout));
        }
        match inner.outcome() {
            Ok(value) => Ok(Self::resolved(value)),
            Err(error) => Ok(Self::rejected(error)),
        }
    }

    /// Derives a cell that settles with `on_success` applied to this cell's
    /// value. A rejection skips `on_success` entirely and propagates the
    /// error unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    /// use futures::executor::block_on;
    ///
    /// let cell = Promise::<i32, String>::resolved(5).then(|n| n + 1).then(|n| n * 2);
    /// assert_eq!(block_on(cell), Ok(12));
    /// ```
    pub fn then<U, F>(&self, on_success: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(on_success, None::<fn(E)>)
    }

    /// As [`Promise::then`], but additionally observes a rejection with
    /// `on_failure`. The error itself is never transformed; it propagates
    /// unchanged to the derived cell.
    pub fn then_catch<U, F, H>(&self, on_success: F, on_failure: H) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
        H: FnOnce(E) + Send + 'static,
    {
        self.chain(on_success, Some(on_failure))
    }

    /// Observes a rejection with `on_failure`, passing both the value and
    /// the error through unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    /// use futures::executor::block_on;
    ///
    /// let cell = Promise::<i32, String>::rejected("boom".into())
    ///     .catch_error(|e| eprintln!("failed: {e}"));
    /// assert_eq!(block_on(cell), Err("boom".to_string()));
    /// ```
    pub fn catch_error<H>(&self, on_failure: H) -> Promise<T, E>
    where
        H: FnOnce(E) + Send + 'static,
    {
        self.chain(|value| value, Some(on_failure))
    }

    fn chain<U, F, H>(&self, on_success: F, on_failure: Option<H>) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
        H: FnOnce(E) + Send + 'static,
    {
        let derived = Promise::pending();
        let on_resolved = {
            let derived = derived.clone();
            move |value: T| derived.complete(Ok(on_success(value)))
        };
        let on_rejected = {
            let derived = derived.clone();
            move |error: E| {
                if let Some(observe) = on_failure {
                    observe(error.clone());
                }
                derived.complete(Err(error));
            }
        };
        self.on_settle(on_resolved, on_rejected);
        derived
    }

    pub(crate) fn complete(&self, outcome: Result<T, E>) {
        self.shared.settle(outcome);
    }

    /// Registers one continuation of each kind. On a pending cell both are
    /// appended behind the settlement lock, so registration is linearizable
    /// with settlement and fires in registration order. On a settled cell
    /// the matching continuation fires immediately on the caller, exactly
    /// once, with a clone of the stored payload.
    pub(crate) fn on_settle<F, H>(&self, on_value: F, on_error: H)
    where
        F: FnOnce(T) + Send + 'static,
        H: FnOnce(E) + Send + 'static,
    {
        let immediate = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                State::Pending => {
                    inner.on_value.push(Box::new(on_value));
                    inner.on_error.push(Box::new(on_error));
                    return;
                }
                State::Resolved | State::Rejected => inner.outcome(),
            }
        };
        match immediate {
            Ok(value) => on_value(value),
            Err(error) => on_error(error),
        }
    }
}

impl<T, E> std::future::Future for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<T, E>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            State::Pending => {
                inner.wakers.push(cx.waker().clone());
                std::task::Poll::Pending
            }
            State::Resolved | State::Rejected => std::task::Poll::Ready(inner.outcome()),
        }
    }
}
