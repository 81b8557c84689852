//! Bounded-concurrency run queue.
//!
//! [`RunQueue`] collects deferred work items up front, then runs them with at
//! most `max_concurrency` in flight at once. The run settles exactly once:
//! with every result (in completion order) when all items succeed, or with
//! the first failure as soon as it happens.
//!
//! # Lifecycle
//!
//! ```text
//!   add()/push() ──► pending (FIFO) ──► admission ──► inflight ──► completion
//!                                          ▲                           │
//!                                          └──── backfill freed slot ◄─┤
//!                                                                      ▼
//!                                              RunHandle settles Ok(results) | Err(first)
//! ```
//!
//! A queue is single-use. Calling [`RunQueue::run`] again returns the same
//! [`RunHandle`] without starting a second pass, and once the run has
//! finished the queue rejects new work with [`QueueError::Finished`].
//!
//! Failing fast does not cancel siblings. Items already in flight when the
//! first failure arrives keep running on the runtime; their outcomes are
//! dropped. There is no queue-level timeout either: an item that never
//! settles keeps the run pending forever.
//!
//! # Example
//!
//! ```no_run
//! use routecheck::queue::{RunQueue, WorkPanic};
//!
//! #[derive(Debug, Clone)]
//! struct Failed(String);
//!
//! impl From<WorkPanic> for Failed {
//!     fn from(panic: WorkPanic) -> Self {
//!         Failed(panic.to_string())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue: RunQueue<u64, Failed> = RunQueue::new(2);
//!     for n in 1..=4u64 {
//!         queue.add(|n: u64| async move { Ok(n * n) }, n).unwrap();
//!     }
//!
//!     let squares = queue.run().await.unwrap();
//!     assert_eq!(squares.len(), 4);
//! }
//! ```

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The single outcome of a full run.
pub type Completion<T, E> = Result<Vec<T>, E>;

/// Misuse of a [`RunQueue`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Work was added after the run finished.
    #[error("Can't add to a finished queue. Create a new queue.")]
    Finished,
}

/// A work item that did not settle normally.
///
/// Work items report failure through their own error type. A panic, whether
/// raised while the item is being invoked or while its future is polled, is
/// folded into that same error type through `From<WorkPanic>`, so a run has
/// exactly one failure channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct WorkPanic {
    message: String,
}

impl WorkPanic {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        Self {
            message: format!("work item panicked: {}", detail),
        }
    }

    /// The run can no longer settle.
    ///
    /// Handles observe this once the runtime has dropped the run's pending
    /// tasks and every [`RunQueue`] owner is gone too. While a queue is
    /// still alive an unsettled run simply stays pending.
    pub fn abandoned() -> Self {
        Self {
            message: "run abandoned before all work items settled".to_string(),
        }
    }

    /// Human-readable description of what went wrong.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Queue construction options.
///
/// `max_concurrency` is the only recognized option; anything else in a
/// deserialized table is rejected. A missing or zero value means 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueOptions {
    /// Maximum number of work items in flight at once.
    pub max_concurrency: Option<usize>,
}

impl QueueOptions {
    /// The effective concurrency ceiling.
    pub fn ceiling(&self) -> usize {
        self.max_concurrency.unwrap_or(1).max(1)
    }
}

/// Point-in-time view of a queue's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Concurrency ceiling the queue was built with.
    pub max_concurrency: usize,
    /// Items added but not yet dispatched.
    pub queued: usize,
    /// Items dispatched whose outcome has not arrived yet.
    pub inflight: usize,
    /// Items whose outcome has arrived, kept or discarded.
    pub completed: usize,
    /// Whether the run has settled.
    pub finished: bool,
}

type WorkFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// A callable bound to the arguments it will be invoked with.
struct WorkItem<T, E> {
    invoke: Box<dyn FnOnce() -> WorkFuture<T, E> + Send>,
}

impl<T, E> WorkItem<T, E>
where
    T: Send + 'static,
    E: From<WorkPanic> + Send + 'static,
{
    fn new<F, A, Fut>(work: F, args: A) -> Self
    where
        F: FnOnce(A) -> Fut + Send + 'static,
        A: Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            invoke: Box::new(move || Box::pin(async move { work(args).await })),
        }
    }

    /// Invokes the item and waits for its outcome.
    ///
    /// The call happens inside the guarded future, so a panic in the callable
    /// itself lands on the same path as a panic during polling.
    async fn settle(self) -> Result<T, E> {
        let invoke = self.invoke;
        match AssertUnwindSafe(async move { invoke().await })
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(payload) => Err(E::from(WorkPanic::from_payload(payload))),
        }
    }
}

struct QueueState<T, E> {
    pending: VecDeque<WorkItem<T, E>>,
    inflight: usize,
    completed: usize,
    started: bool,
    finished: bool,
    results: Vec<T>,
    settle: Option<oneshot::Sender<Completion<T, E>>>,
}

impl<T, E> QueueState<T, E> {
    fn finish(&mut self, completion: Completion<T, E>) {
        self.finished = true;
        if let Some(tx) = self.settle.take() {
            // Every handle may already be gone; nobody is left to tell.
            let _ = tx.send(completion);
        }
    }
}

struct Inner<T, E> {
    max_concurrency: usize,
    state: Mutex<QueueState<T, E>>,
    handle: OnceLock<RunHandle<T, E>>,
}

impl<T, E> Inner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: From<WorkPanic> + Clone + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, QueueState<T, E>> {
        // Nothing panics while holding the lock, so a poisoned guard is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims every free slot, dispatching pending items in FIFO order.
    fn admit(self: &Arc<Self>, state: &mut QueueState<T, E>) {
        while !state.finished && state.inflight < self.max_concurrency {
            let Some(item) = state.pending.pop_front() else {
                break;
            };
            state.inflight += 1;

            debug!(
                inflight = state.inflight,
                queued = state.pending.len(),
                "Dispatching work item"
            );

            let inner = Arc::clone(self);
            tokio::spawn(async move {
                let outcome = item.settle().await;
                inner.complete(outcome);
            });
        }
    }

    fn complete(self: &Arc<Self>, outcome: Result<T, E>) {
        let mut state = self.lock();
        state.inflight -= 1;
        state.completed += 1;

        match outcome {
            Ok(_) if state.finished => {
                debug!("Discarding result that arrived after the run settled");
            }
            Ok(result) => {
                state.results.push(result);
                if state.pending.is_empty() && state.inflight == 0 {
                    debug!(results = state.results.len(), "All work items completed");
                    let results = std::mem::take(&mut state.results);
                    state.finish(Ok(results));
                } else {
                    self.admit(&mut state);
                }
            }
            Err(_) if state.finished => {
                debug!("Discarding failure that arrived after the run settled");
            }
            Err(err) => {
                warn!(
                    inflight = state.inflight,
                    queued = state.pending.len(),
                    "Work item failed, settling run"
                );
                state.results.clear();
                state.finish(Err(err));
            }
        }
    }
}

/// Single-use scheduler running deferred work with a concurrency ceiling.
///
/// Cloning is not supported; share a queue behind `Arc` if several owners
/// need to add work. Work added while a run is active is admitted as soon as
/// a slot is free, but items added concurrently by different callers are
/// admitted in an unspecified relative order.
pub struct RunQueue<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> RunQueue<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: From<WorkPanic> + Clone + Send + Sync + 'static,
{
    /// Creates a queue allowing `max_concurrency` items in flight.
    ///
    /// Zero is treated as 1.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrency: max_concurrency.max(1),
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    inflight: 0,
                    completed: 0,
                    started: false,
                    finished: false,
                    results: Vec::new(),
                    settle: None,
                }),
                handle: OnceLock::new(),
            }),
        }
    }

    /// Creates a fully sequential queue.
    pub fn sequential() -> Self {
        Self::new(1)
    }

    /// Creates a queue from deserialized options.
    pub fn from_options(options: &QueueOptions) -> Self {
        Self::new(options.ceiling())
    }

    /// The concurrency ceiling.
    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Enqueues `work`, to be invoked with `args` once admitted.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Finished`] if the run has already settled.
    pub fn add<F, A, Fut>(&self, work: F, args: A) -> Result<(), QueueError>
    where
        F: FnOnce(A) -> Fut + Send + 'static,
        A: Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut state = self.inner.lock();
        if state.finished {
            return Err(QueueError::Finished);
        }

        state.pending.push_back(WorkItem::new(work, args));
        if state.started {
            self.inner.admit(&mut state);
        }

        Ok(())
    }

    /// Enqueues a work item that takes no arguments.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Finished`] if the run has already settled.
    pub fn push<F, Fut>(&self, work: F) -> Result<(), QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.add(move |()| work(), ())
    }

    /// Starts the run, or returns the handle of the run already started.
    ///
    /// The first call dispatches as many items as the ceiling allows and
    /// returns immediately; the handle settles as work completes. Every later
    /// call returns a clone of that same handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self) -> RunHandle<T, E> {
        self.inner
            .handle
            .get_or_init(|| {
                let (tx, rx) = oneshot::channel();
                let mut state = self.inner.lock();
                state.started = true;
                state.settle = Some(tx);

                debug!(
                    queued = state.pending.len(),
                    max_concurrency = self.inner.max_concurrency,
                    "Starting run"
                );

                if state.pending.is_empty() && state.inflight == 0 {
                    state.finish(Ok(Vec::new()));
                } else {
                    self.inner.admit(&mut state);
                }

                RunHandle::new(rx)
            })
            .clone()
    }

    /// Snapshot of the queue's counters.
    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock();
        QueueStats {
            max_concurrency: self.inner.max_concurrency,
            queued: state.pending.len(),
            inflight: state.inflight,
            completed: state.completed,
            finished: state.finished,
        }
    }

    /// Returns `true` once the run has settled.
    pub fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }
}

impl<T, E> Default for RunQueue<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: From<WorkPanic> + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::sequential()
    }
}

/// Future of a run's [`Completion`].
///
/// Handles are cheap to clone and every clone resolves to the same outcome.
pub struct RunHandle<T, E> {
    completion: Shared<BoxFuture<'static, Completion<T, E>>>,
}

impl<T, E> RunHandle<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: From<WorkPanic> + Clone + Send + Sync + 'static,
{
    fn new(rx: oneshot::Receiver<Completion<T, E>>) -> Self {
        let completion = async move {
            match rx.await {
                Ok(completion) => completion,
                Err(_) => Err(E::from(WorkPanic::abandoned())),
            }
        }
        .boxed()
        .shared();

        Self { completion }
    }

    /// The outcome, if the run has settled and this handle has observed it.
    pub fn peek(&self) -> Option<&Completion<T, E>> {
        self.completion.peek()
    }

    /// Returns `true` if both handles belong to the same run.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.completion.ptr_eq(&other.completion)
    }
}

impl<T, E> Clone for RunHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            completion: self.completion.clone(),
        }
    }
}

impl<T, E> Future for RunHandle<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Output = Completion<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.completion.poll_unpin(cx)
    }
}

impl<T, E> std::fmt::Debug for RunHandle<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle").finish_non_exhaustive()
    }
}
