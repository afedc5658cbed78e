//! The Store: the dispatch loop that owns state and schedules effects.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::Poll;
use std::time::Duration;

use flowstore_core::effect::{Directive, Effect};
use flowstore_core::ident::EffectId;
use flowstore_core::reducer::Reducer;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::stream::action_stream;

/// Configuration for a [`Store`].
///
/// # Example
///
/// ```
/// use flowstore_runtime::StoreConfig;
///
/// let config = StoreConfig::default().with_effect_channel_capacity(64);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Intake buffer size for callback-driven effects ([`Effect::run`]).
    ///
    /// A callback body that outpaces the loop suspends on `send` once this
    /// many actions are buffered.
    pub effect_channel_capacity: usize,
}

impl StoreConfig {
    /// Set the callback-effect intake buffer size.
    #[must_use]
    pub const fn with_effect_channel_capacity(mut self, capacity: usize) -> Self {
        self.effect_channel_capacity = capacity;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            effect_channel_capacity: 16,
        }
    }
}

/// Runtime record of one admitted effect's in-flight worker.
struct RunningHandle {
    abort: AbortHandle,
    /// Identity the worker was registered under, if any.
    id: Option<EffectId>,
}

/// A suppressed throttle admission waiting for its window to elapse.
struct Trailing<A> {
    effect: Effect<A>,
    /// Worker seq of the scheduled release job.
    seq: u64,
}

/// Per-identity throttle bookkeeping.
struct ThrottleRecord<A> {
    last_fired: Instant,
    trailing: Option<Trailing<A>>,
}

/// Everything the loop owns. Touched only under the store's mutex, which is
/// never held across an await.
struct Core<S, A> {
    state: S,
    queue: VecDeque<A>,
    draining: bool,
    next_seq: u64,
    running: HashMap<u64, RunningHandle>,
    by_id: HashMap<EffectId, Vec<u64>>,
    throttle: HashMap<EffectId, ThrottleRecord<A>>,
    /// Identity → seq of the currently scheduled debounce run.
    debounce: HashMap<EffectId, u64>,
    /// Seq of the persistent bind subscription.
    bind_seq: Option<u64>,
    /// Whether the bind stream is parked with no action ready. Only a
    /// parked bind is excluded from idleness.
    bind_parked: bool,
}

struct Inner<S, A, R> {
    reducer: R,
    config: StoreConfig,
    core: Mutex<Core<S, A>>,
    snapshots: watch::Sender<S>,
}

/// The dispatch loop: owns the state, serializes reduction against
/// concurrent inbound actions, and turns declarative effects into
/// supervised, cancellable workers.
///
/// # Type Parameters
///
/// - `S`: state type (equatable snapshot)
/// - `A`: action type (opaque message)
/// - `R`: reducer implementation
///
/// Cloning a `Store` is cheap and shares the same loop. Workers spawned for
/// effects hold only a weak reference, so dropping every external clone
/// lets in-flight work wind down instead of keeping the loop alive.
///
/// # Example
///
/// ```no_run
/// use flowstore_core::{Effect, Reducer};
/// use flowstore_runtime::Store;
///
/// #[derive(Clone, Debug, Default, PartialEq)]
/// struct State {
///     count: i64,
/// }
///
/// #[derive(Clone, Debug)]
/// enum Action {
///     Increment,
/// }
///
/// struct CountReducer;
///
/// impl Reducer for CountReducer {
///     type State = State;
///     type Action = Action;
///
///     fn reduce(&self, state: &mut State, action: Action) -> Effect<Action> {
///         match action {
///             Action::Increment => {
///                 state.count += 1;
///                 Effect::none()
///             },
///         }
///     }
/// }
///
/// # async fn example() {
/// let store = Store::new(State::default(), CountReducer);
/// store.send(Action::Increment);
/// assert_eq!(store.state(|s| s.count), 1);
/// # }
/// ```
pub struct Store<S, A, R>
where
    R: Reducer<State = S, Action = A>,
{
    inner: Arc<Inner<S, A, R>>,
}

impl<S, A, R> Clone for Store<S, A, R>
where
    R: Reducer<State = S, Action = A>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A, R> fmt::Debug for Store<S, A, R>
where
    R: Reducer<State = S, Action = A>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
        let core = self.inner.core.lock().unwrap();
        f.debug_struct("Store")
            .field("draining", &core.draining)
            .field("queued_actions", &core.queue.len())
            .field("running_effects", &core.running.len())
            .finish_non_exhaustive()
    }
}

impl<S, A, R> Store<S, A, R>
where
    S: Clone + PartialEq + Send + Sync + 'static,
    A: Send + 'static,
    R: Reducer<State = S, Action = A> + Send + Sync + 'static,
{
    /// Create a store and subscribe to the reducer's [`bind`](Reducer::bind)
    /// effect.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime: the bind subscription is
    /// spawned immediately.
    #[must_use]
    pub fn new(initial_state: S, reducer: R) -> Self {
        Self::with_config(initial_state, reducer, StoreConfig::default())
    }

    /// Create a store with custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime: the bind subscription is
    /// spawned immediately.
    #[must_use]
    pub fn with_config(initial_state: S, reducer: R, config: StoreConfig) -> Self {
        let (snapshots, _) = watch::channel(initial_state.clone());

        let store = Self {
            inner: Arc::new(Inner {
                reducer,
                config,
                core: Mutex::new(Core {
                    state: initial_state,
                    queue: VecDeque::new(),
                    draining: false,
                    next_seq: 0,
                    running: HashMap::new(),
                    by_id: HashMap::new(),
                    throttle: HashMap::new(),
                    debounce: HashMap::new(),
                    bind_seq: None,
                    bind_parked: false,
                }),
                snapshots,
            }),
        };

        store.subscribe_bind();
        store
    }

    /// Submit an action to the loop.
    ///
    /// Appends the action to the FIFO queue. The first caller not already
    /// inside a drain processes the queue to exhaustion, invoking the
    /// reducer strictly serially and admitting returned effects, before
    /// returning; a reentrant call during a drain only appends. Returns
    /// once the action and all synchronously cascading actions have been
    /// reduced; asynchronous effects are still in flight.
    #[tracing::instrument(skip(self, action), level = "debug", name = "store_send")]
    pub fn send(&self, action: A) {
        metrics::counter!("store.actions.total").increment(1);

        {
            let mut core = self.core();
            core.queue.push_back(action);
            if core.draining {
                // An active drain will pick this up.
                tracing::trace!("action enqueued into active drain");
                return;
            }
            core.draining = true;
        }

        self.drain();
    }

    /// Process the queue to exhaustion, then publish the state snapshot if
    /// it changed.
    ///
    /// The lock is re-acquired per action, so actions produced recursively
    /// by fast effects can interleave at single-action granularity while
    /// each reduction step stays atomic.
    fn drain(&self) {
        loop {
            let mut core = self.core();
            let Some(action) = core.queue.pop_front() else {
                core.draining = false;
                self.publish(&core);
                return;
            };

            let start = std::time::Instant::now();
            let effect = self.inner.reducer.reduce(&mut core.state, action);
            metrics::histogram!("store.reducer.duration_seconds")
                .record(start.elapsed().as_secs_f64());

            self.admit(&mut core, effect);
        }
    }

    /// Emit a state-change notification iff the state differs from the
    /// last published snapshot.
    fn publish(&self, core: &Core<S, A>) {
        self.inner.snapshots.send_if_modified(|published| {
            if *published == core.state {
                false
            } else {
                published.clone_from(&core.state);
                true
            }
        });
    }

    /// Read the current state through a closure, under the loop's lock.
    ///
    /// ```ignore
    /// let count = store.state(|s| s.count);
    /// ```
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let core = self.core();
        f(&core.state)
    }

    /// Subscribe to de-duplicated state snapshots.
    ///
    /// The value current at subscription time is delivered as the first
    /// change notification, so an observer looping on
    /// [`watch::Receiver::changed`] sees it without a separate read; after
    /// that, one notification per published change. Consecutive equal
    /// states publish only once.
    #[must_use]
    pub fn states(&self) -> watch::Receiver<S> {
        let mut receiver = self.inner.snapshots.subscribe();
        receiver.mark_changed();
        receiver
    }

    /// Cancel all in-flight work and start over.
    ///
    /// Cancels every running worker (the bind subscription included),
    /// clears the pending queue and all throttle/debounce bookkeeping, then
    /// re-subscribes to the reducer's `bind()` effect as if the loop were
    /// freshly constructed. Published state history is untouched.
    /// Idempotent: calling it again immediately is a cheap no-op apart from
    /// the bind resubscription.
    pub fn reset(&self) {
        tracing::info!("store reset");
        metrics::counter!("store.resets.total").increment(1);

        let mut core = self.core();
        for (_, handle) in core.running.drain() {
            handle.abort.abort();
        }
        core.by_id.clear();
        core.throttle.clear();
        core.debounce.clear();
        core.queue.clear();
        core.bind_seq = None;
        core.bind_parked = false;
        drop(core);

        self.subscribe_bind();
    }

    /// Whether the loop has settled: not draining and no running workers
    /// remain, apart from a bind subscription that is parked awaiting
    /// external events. A bind with an action ready or still undelivered
    /// counts as running, so settling on this predicate never races past
    /// bind-produced actions.
    ///
    /// Intended for test and debug tooling, never for production logic.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let core = self.core();
        !core.draining
            && core
                .running
                .keys()
                .all(|seq| core.bind_seq == Some(*seq) && core.bind_parked)
    }

    /// Admit the reducer's `bind()` effect as a directive-less, long-lived
    /// worker.
    ///
    /// Unlike ordinary workers, the bind worker reports when its stream
    /// parks with no action ready; until the first park (and between
    /// parks) the handle counts toward idleness like any other.
    fn subscribe_bind(&self) {
        let bind = self.inner.reducer.bind();
        let mut core = self.core();
        let seq = core.next_seq;
        core.next_seq += 1;

        let weak = Arc::downgrade(&self.inner);
        let capacity = self.inner.config.effect_channel_capacity;

        let join = tokio::spawn(async move {
            let mut actions = action_stream(bind, capacity);
            loop {
                let next = std::future::poll_fn(|cx| match actions.poll_next_unpin(cx) {
                    Poll::Ready(next) => Poll::Ready(next),
                    Poll::Pending => {
                        if let Some(inner) = weak.upgrade() {
                            Store { inner }.park_bind(seq, true);
                        }
                        Poll::Pending
                    },
                })
                .await;

                let Some(action) = next else {
                    if let Some(inner) = weak.upgrade() {
                        Store { inner }.finish_worker(seq);
                    }
                    return;
                };
                let Some(inner) = weak.upgrade() else { return };
                let store = Store { inner };
                store.park_bind(seq, false);
                store.send(action);
            }
        });

        core.running.insert(
            seq,
            RunningHandle {
                abort: join.abort_handle(),
                id: None,
            },
        );
        core.bind_seq = Some(seq);
        core.bind_parked = false;
        tracing::trace!(seq, "bind subscription started");
    }

    /// Record whether the current bind stream is parked. A stale seq from
    /// a bind superseded by `reset` is ignored.
    fn park_bind(&self, seq: u64, parked: bool) {
        let mut core = self.core();
        if core.bind_seq == Some(seq) {
            core.bind_parked = parked;
        }
    }

    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn core(&self) -> MutexGuard<'_, Core<S, A>> {
        self.inner.core.lock().unwrap()
    }

    /// Evaluate an effect's control directive and start a worker unless the
    /// directive suppresses it.
    fn admit(&self, core: &mut Core<S, A>, effect: Effect<A>) {
        match effect.directive().cloned() {
            None => {
                self.spawn_worker(core, effect, None);
            },
            Some(Directive::Register {
                id,
                cancel_in_flight,
            }) => {
                if cancel_in_flight {
                    self.cancel_identity(core, &id);
                }
                self.spawn_worker(core, effect, Some(id));
            },
            Some(Directive::Cancel { id }) => {
                tracing::debug!(id = ?id, "cancel directive");
                self.cancel_identity(core, &id);
            },
            Some(Directive::Throttle {
                id,
                window,
                latest,
            }) => self.admit_throttled(core, effect, id, window, latest),
            Some(Directive::Debounce { id, window }) => {
                self.admit_debounced(core, effect, id, window);
            },
        }
    }

    /// Cancel and unregister every worker under `id`, along with any
    /// pending throttle-trailing or debounce run correlated to it.
    fn cancel_identity(&self, core: &mut Core<S, A>, id: &EffectId) {
        if let Some(seqs) = core.by_id.remove(id) {
            for seq in seqs {
                if let Some(handle) = core.running.remove(&seq) {
                    handle.abort.abort();
                    metrics::counter!("store.effects.cancelled").increment(1);
                }
            }
        }

        let trailing_seq = core
            .throttle
            .get_mut(id)
            .and_then(|record| record.trailing.take().map(|trailing| trailing.seq));
        if let Some(seq) = trailing_seq {
            if let Some(handle) = core.running.remove(&seq) {
                handle.abort.abort();
            }
        }

        if let Some(seq) = core.debounce.remove(id) {
            if let Some(handle) = core.running.remove(&seq) {
                handle.abort.abort();
            }
        }
    }

    /// Start a supervised worker draining the effect's action stream back
    /// into `send`. Returns the worker's seq.
    fn spawn_worker(&self, core: &mut Core<S, A>, effect: Effect<A>, id: Option<EffectId>) -> u64 {
        let seq = core.next_seq;
        core.next_seq += 1;

        let weak = Arc::downgrade(&self.inner);
        let capacity = self.inner.config.effect_channel_capacity;

        let join = tokio::spawn(async move {
            let mut actions = action_stream(effect, capacity);
            while let Some(action) = actions.next().await {
                // Workers hold only a weak reference; if every external
                // clone of the store is gone, stop producing.
                let Some(inner) = weak.upgrade() else { return };
                Store { inner }.send(action);
            }
            if let Some(inner) = weak.upgrade() {
                Store { inner }.finish_worker(seq);
            }
        });

        core.running.insert(
            seq,
            RunningHandle {
                abort: join.abort_handle(),
                id: id.clone(),
            },
        );
        if let Some(id) = id {
            core.by_id.entry(id).or_default().push(seq);
        }

        metrics::counter!("store.effects.admitted").increment(1);
        tracing::trace!(seq, "effect worker started");
        seq
    }

    /// Unregister a naturally completed worker. A worker canceled before
    /// completion never reaches this; the cancel path already removed its
    /// entries.
    fn finish_worker(&self, seq: u64) {
        let mut core = self.core();
        if let Some(handle) = core.running.remove(&seq) {
            if let Some(id) = handle.id {
                if let Some(seqs) = core.by_id.get_mut(&id) {
                    seqs.retain(|s| *s != seq);
                    if seqs.is_empty() {
                        core.by_id.remove(&id);
                    }
                }
            }
        }
        if core.bind_seq == Some(seq) {
            core.bind_seq = None;
        }
        tracing::trace!(seq, "effect worker completed");
    }

    /// Gate an admission on the throttle window for `id`.
    fn admit_throttled(
        &self,
        core: &mut Core<S, A>,
        effect: Effect<A>,
        id: EffectId,
        window: Duration,
        latest: bool,
    ) {
        let now = Instant::now();
        let within_window = core
            .throttle
            .get(&id)
            .is_some_and(|record| now.duration_since(record.last_fired) < window);

        if !within_window {
            // Fresh fire. A trailing run scheduled for a window that has
            // already elapsed is stale: this newer admission supersedes it.
            let stale = core
                .throttle
                .get_mut(&id)
                .and_then(|record| record.trailing.take().map(|trailing| trailing.seq));
            if let Some(seq) = stale {
                if let Some(handle) = core.running.remove(&seq) {
                    handle.abort.abort();
                }
            }
            core.throttle.insert(
                id,
                ThrottleRecord {
                    last_fired: now,
                    trailing: None,
                },
            );
            self.spawn_worker(core, effect, None);
            return;
        }

        if !latest {
            tracing::debug!(id = ?id, "throttled effect dropped");
            metrics::counter!("store.effects.throttled").increment(1);
            return;
        }

        // Latest-wins: keep only the most recent suppressed attempt. The
        // release job stays scheduled for the end of the current window.
        let already_scheduled = core
            .throttle
            .get(&id)
            .is_some_and(|record| record.trailing.is_some());
        if already_scheduled {
            if let Some(record) = core.throttle.get_mut(&id) {
                if let Some(trailing) = record.trailing.as_mut() {
                    trailing.effect = effect;
                }
            }
            return;
        }

        let Some(deadline) = core
            .throttle
            .get(&id)
            .map(|record| record.last_fired + window)
        else {
            return;
        };
        let seq = self.spawn_throttle_release(core, id.clone(), deadline);
        if let Some(record) = core.throttle.get_mut(&id) {
            record.trailing = Some(Trailing { effect, seq });
        }
    }

    /// Schedule the trailing run for a suppressed throttle admission.
    fn spawn_throttle_release(
        &self,
        core: &mut Core<S, A>,
        id: EffectId,
        deadline: Instant,
    ) -> u64 {
        let seq = core.next_seq;
        core.next_seq += 1;

        let weak = Arc::downgrade(&self.inner);
        let join = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                Store { inner }.release_throttle(&id, seq);
            }
        });

        core.running.insert(
            seq,
            RunningHandle {
                abort: join.abort_handle(),
                id: None,
            },
        );
        seq
    }

    /// Run the pending trailing effect for `id`, provided no newer
    /// admission has superseded this release.
    fn release_throttle(&self, id: &EffectId, seq: u64) {
        let mut core = self.core();
        core.running.remove(&seq);

        let effect = match core.throttle.get_mut(id) {
            Some(record)
                if record
                    .trailing
                    .as_ref()
                    .is_some_and(|trailing| trailing.seq == seq) =>
            {
                record.last_fired = Instant::now();
                record.trailing.take().map(|trailing| trailing.effect)
            },
            _ => None,
        };

        if let Some(effect) = effect {
            tracing::trace!(id = ?id, "throttle trailing run");
            self.spawn_worker(&mut core, effect, None);
        }
    }

    /// Replace any scheduled run for `id` and schedule a fresh one `window`
    /// from now.
    fn admit_debounced(
        &self,
        core: &mut Core<S, A>,
        effect: Effect<A>,
        id: EffectId,
        window: Duration,
    ) {
        if let Some(old_seq) = core.debounce.remove(&id) {
            if let Some(handle) = core.running.remove(&old_seq) {
                handle.abort.abort();
            }
        }

        let seq = core.next_seq;
        core.next_seq += 1;

        let weak = Arc::downgrade(&self.inner);
        let task_id = id.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(inner) = weak.upgrade() {
                Store { inner }.release_debounce(&task_id, seq, effect);
            }
        });

        core.running.insert(
            seq,
            RunningHandle {
                abort: join.abort_handle(),
                id: None,
            },
        );
        core.debounce.insert(id, seq);
    }

    /// Run a debounced effect whose quiet period elapsed without a newer
    /// admission.
    fn release_debounce(&self, id: &EffectId, seq: u64, effect: Effect<A>) {
        let mut core = self.core();
        core.running.remove(&seq);

        if core.debounce.get(id) == Some(&seq) {
            core.debounce.remove(id);
            tracing::trace!(id = ?id, "debounced effect released");
            self.spawn_worker(&mut core, effect, None);
        }
    }
}
