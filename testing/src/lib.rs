//! # Flowstore Testing
//!
//! Testing utilities for the flowstore architecture.
//!
//! This crate provides:
//! - [`settle`]/[`settle_with`]: wait for a store's loop to go idle, the
//!   synchronization point for asserting that all synchronous and
//!   asynchronous work has finished
//! - [`StateRecorder`]: captures the de-duplicated snapshot stream so tests
//!   can assert on the exact sequence of published states
//! - [`init_logging`]: opt-in tracing output for debugging a failing test
//!
//! ## Example
//!
//! ```ignore
//! use flowstore_runtime::Store;
//! use flowstore_testing::{settle, StateRecorder};
//!
//! #[tokio::test]
//! async fn counts_up() {
//!     let store = Store::new(CounterState::default(), CounterReducer);
//!     let recorder = StateRecorder::attach(&store);
//!
//!     store.send(CounterAction::Increment);
//!     settle(&store).await.unwrap();
//!
//!     assert_eq!(store.state(|s| s.count), 1);
//!     // Attach-time value plus one change.
//!     assert_eq!(recorder.snapshot().len(), 2);
//! }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowstore_core::reducer::Reducer;
use flowstore_runtime::Store;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default timeout for [`settle`].
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default poll interval for [`settle`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Error returned when a store fails to go idle in time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettleError {
    /// The store was still draining or had running workers when the
    /// timeout elapsed.
    #[error("store did not become idle within {0:?}")]
    Timeout(Duration),
}

/// Wait until the store is idle: not draining and no running workers apart
/// from the persistent bind subscription.
///
/// Uses [`DEFAULT_SETTLE_TIMEOUT`] and [`DEFAULT_POLL_INTERVAL`]. Under
/// `#[tokio::test(start_paused = true)]` the poll sleeps auto-advance
/// virtual time, so pending timers (delays, debounce windows) fire without
/// real waiting.
///
/// # Errors
///
/// Returns [`SettleError::Timeout`] if the store is still busy when the
/// timeout elapses.
pub async fn settle<S, A, R>(store: &Store<S, A, R>) -> Result<(), SettleError>
where
    S: Clone + PartialEq + Send + Sync + 'static,
    A: Send + 'static,
    R: Reducer<State = S, Action = A> + Send + Sync + 'static,
{
    settle_with(store, DEFAULT_SETTLE_TIMEOUT, DEFAULT_POLL_INTERVAL).await
}

/// [`settle`] with explicit timeout and poll interval.
///
/// # Errors
///
/// Returns [`SettleError::Timeout`] if the store is still busy when the
/// timeout elapses.
pub async fn settle_with<S, A, R>(
    store: &Store<S, A, R>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), SettleError>
where
    S: Clone + PartialEq + Send + Sync + 'static,
    A: Send + 'static,
    R: Reducer<State = S, Action = A> + Send + Sync + 'static,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if store.is_idle() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(SettleError::Timeout(timeout));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Captures every state-change notification published after attachment.
///
/// The de-duplicated snapshot stream is a `watch` channel, so a recorder
/// that lags may observe only the latest of several rapid publishes; tests
/// should settle the store between bursts they want to count.
#[derive(Debug)]
pub struct StateRecorder<S> {
    states: Arc<Mutex<Vec<S>>>,
    worker: JoinHandle<()>,
}

impl<S> StateRecorder<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Attach a recorder to a store's snapshot stream.
    ///
    /// The value current at attachment time is captured as the first
    /// entry, followed by every change published afterwards.
    #[must_use]
    pub fn attach<A, R>(store: &Store<S, A, R>) -> Self
    where
        S: PartialEq,
        A: Send + 'static,
        R: Reducer<State = S, Action = A> + Send + Sync + 'static,
    {
        Self::from_receiver(store.states())
    }

    /// Attach a recorder to a raw snapshot receiver.
    ///
    /// Captures whatever the receiver reports as changes; a receiver from
    /// [`Store::states`] delivers the attach-time value first, a plain
    /// `watch` receiver does not.
    #[must_use]
    pub fn from_receiver(mut receiver: watch::Receiver<S>) -> Self {
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);

        let worker = tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let value = receiver.borrow_and_update().clone();
                #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
                sink.lock().unwrap().push(value);
            }
        });

        Self { states, worker }
    }

    /// The states recorded so far, in publish order.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn snapshot(&self) -> Vec<S> {
        self.states.lock().unwrap().clone()
    }

    /// Number of change notifications recorded so far.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn len(&self) -> usize {
        self.states.lock().unwrap().len()
    }

    /// Whether no change notification has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> Drop for StateRecorder<S> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// Initialize tracing output for a test run, honoring `RUST_LOG`.
///
/// Safe to call from several tests; only the first call installs a
/// subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
