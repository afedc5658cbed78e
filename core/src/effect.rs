//! Effect descriptions and control directives.
//!
//! An [`Effect`] is a value describing zero, one, or many future actions.
//! Effects are NOT executed here: they are descriptions returned from
//! reducers and turned into supervised workers by the dispatch loop. Until
//! an effect is admitted by the loop it performs no work at all.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::ident::EffectId;

/// Control directive attached to an effect value.
///
/// A directive rides alongside the effect's action stream, not inside it:
/// the dispatch loop evaluates the directive at admission time, before any
/// of the effect's work starts. Each effect carries at most one directive;
/// attaching a second replaces the first (last write wins).
#[derive(Debug, Clone)]
pub enum Directive {
    /// Track the effect's worker under `id` so it can be canceled later.
    ///
    /// With `cancel_in_flight` set, any workers already registered under
    /// the same identity are canceled before the new one is registered.
    Register {
        /// Identity to register the running worker under.
        id: EffectId,
        /// Cancel workers already registered under `id` first.
        cancel_in_flight: bool,
    },

    /// Cancel every worker registered under `id`.
    ///
    /// The carrying effect itself is discarded and produces no actions.
    Cancel {
        /// Identity whose workers are canceled.
        id: EffectId,
    },

    /// Rate-limit admissions for `id` to one per `window`.
    ///
    /// An admission outside the window runs immediately and records a fire
    /// time. An admission inside the window is suppressed: with `latest`
    /// set, the most recent suppressed effect runs once the window elapses;
    /// without it, suppressed effects are dropped.
    Throttle {
        /// Identity the rate limit is keyed on.
        id: EffectId,
        /// Minimum spacing between admitted runs.
        window: Duration,
        /// Keep the newest suppressed effect for a trailing run.
        latest: bool,
    },

    /// Wait for quiet: run only once no admission for `id` has arrived for
    /// a full `window`.
    ///
    /// Every admission cancels the previously scheduled run and schedules a
    /// fresh one `window` after itself, so only the last admission of a
    /// busy period executes.
    Debounce {
        /// Identity the quiet period is keyed on.
        id: EffectId,
        /// Quiet period that must elapse before the effect runs.
        window: Duration,
    },
}

/// Handle passed to [`Effect::run`] bodies for emitting actions.
///
/// The callback sequence stays open until the driver future completes and
/// every clone of its sender has been dropped. Sending into a loop that has
/// canceled the effect is a silent no-op; cancellation is not an error.
pub struct EffectSender<A> {
    tx: mpsc::Sender<A>,
}

impl<A> EffectSender<A> {
    /// Wrap a channel sender. Used by the runtime when it starts the
    /// callback's driver future.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<A>) -> Self {
        Self { tx }
    }

    /// Emit one action into the loop.
    ///
    /// Suspends while the loop's intake buffer is full. If the effect has
    /// been canceled the action is dropped silently.
    pub async fn send(&self, action: A) {
        let _ = self.tx.send(action).await;
    }

    /// Whether the consuming side has gone away (effect canceled or loop
    /// dropped). Long-running callbacks can poll this to stop early.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<A> Clone for EffectSender<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<A> fmt::Debug for EffectSender<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// The shape of one effect, without its directive.
///
/// Public so the runtime crate can interpret descriptions; construct
/// effects through the methods on [`Effect`] rather than these variants.
pub enum EffectKind<A> {
    /// Produces nothing and completes immediately.
    None,

    /// Produces exactly one action immediately.
    Just(A),

    /// Produces exactly one action once an async computation resolves.
    Future(BoxFuture<'static, A>),

    /// Produces one action after a delay (timeouts, scheduled retries).
    Delay {
        /// How long to wait.
        duration: Duration,
        /// Action to produce after the delay.
        action: Box<A>,
    },

    /// Produces zero or more actions over time via a caller-driven
    /// callback, until the caller signals completion.
    Run(Box<dyn FnOnce(EffectSender<A>) -> BoxFuture<'static, ()> + Send>),

    /// Runs effects one after another, preserving order.
    Concat(Vec<Effect<A>>),

    /// Runs effects concurrently; actions interleave as branches resolve.
    Merge(Vec<Effect<A>>),
}

/// A composable description of future asynchronous work yielding actions.
///
/// # Type Parameters
///
/// - `A`: the action type the effect can produce (feedback loop)
///
/// # Example
///
/// ```
/// use flowstore_core::Effect;
///
/// #[derive(Clone, Debug)]
/// enum Action {
///     Ping,
///     Pong,
/// }
///
/// // One action now, one after an async computation, in declared order.
/// let effect = Effect::concat(vec![
///     Effect::just(Action::Ping),
///     Effect::future(async { Action::Pong }),
/// ]);
/// # drop(effect);
/// ```
pub struct Effect<A> {
    kind: EffectKind<A>,
    directive: Option<Directive>,
}

impl<A> Effect<A> {
    const fn from_kind(kind: EffectKind<A>) -> Self {
        Self {
            kind,
            directive: None,
        }
    }

    /// The empty effect: produces nothing, completes immediately.
    #[must_use]
    pub const fn none() -> Self {
        Self::from_kind(EffectKind::None)
    }

    /// Produce exactly one action immediately.
    #[must_use]
    pub const fn just(action: A) -> Self {
        Self::from_kind(EffectKind::Just(action))
    }

    /// Produce exactly one action once `fut` resolves.
    ///
    /// Recoverable failures must be mapped into an ordinary action inside
    /// the future (e.g. a `Failed(reason)` variant); nothing propagates
    /// out of an effect as an error.
    #[must_use]
    pub fn future<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = A> + Send + 'static,
    {
        Self::from_kind(EffectKind::Future(Box::pin(fut)))
    }

    /// Produce `action` after `duration` has elapsed.
    #[must_use]
    pub fn delay(duration: Duration, action: A) -> Self {
        Self::from_kind(EffectKind::Delay {
            duration,
            action: Box::new(action),
        })
    }

    /// Produce zero or more actions via a caller-driven callback.
    ///
    /// The body receives an [`EffectSender`] and may emit actions for as
    /// long as it likes; the sequence completes when the body returns and
    /// every sender clone has been dropped. This is the constructor for
    /// external subscriptions (sockets, watchers, timers).
    ///
    /// # Example
    ///
    /// ```
    /// use flowstore_core::Effect;
    ///
    /// #[derive(Clone, Debug)]
    /// enum Action {
    ///     Tick(u32),
    /// }
    ///
    /// let effect = Effect::run(|sender| async move {
    ///     for n in 0..3 {
    ///         sender.send(Action::Tick(n)).await;
    ///     }
    /// });
    /// # drop(effect);
    /// ```
    #[must_use]
    pub fn run<F, Fut>(f: F) -> Self
    where
        F: FnOnce(EffectSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::from_kind(EffectKind::Run(Box::new(move |sender| {
            Box::pin(f(sender))
        })))
    }

    /// Run `effects` one after another, preserving order.
    ///
    /// Effect *n + 1* starts only after effect *n*'s action stream has
    /// fully completed. An empty vector behaves as [`Effect::none`].
    #[must_use]
    pub fn concat(effects: Vec<Effect<A>>) -> Self {
        Self::from_kind(EffectKind::Concat(effects))
    }

    /// Run `effects` concurrently, forwarding actions as branches resolve.
    ///
    /// No cross-branch ordering is guaranteed. An empty vector behaves as
    /// [`Effect::none`].
    #[must_use]
    pub fn merge(effects: Vec<Effect<A>>) -> Self {
        Self::from_kind(EffectKind::Merge(effects))
    }

    /// An effect that cancels every worker registered under `id` and
    /// produces no actions itself.
    #[must_use]
    pub fn cancel(id: impl Into<EffectId>) -> Self {
        Self {
            kind: EffectKind::None,
            directive: Some(Directive::Cancel { id: id.into() }),
        }
    }

    /// Register this effect's worker under `id`, optionally canceling any
    /// workers already in flight under the same identity.
    #[must_use]
    pub fn cancellable(mut self, id: impl Into<EffectId>, cancel_in_flight: bool) -> Self {
        self.directive = Some(Directive::Register {
            id: id.into(),
            cancel_in_flight,
        });
        self
    }

    /// Rate-limit admissions under `id` to one per `window`.
    ///
    /// See [`Directive::Throttle`] for the `latest` trailing-run policy.
    #[must_use]
    pub fn throttle(mut self, id: impl Into<EffectId>, window: Duration, latest: bool) -> Self {
        self.directive = Some(Directive::Throttle {
            id: id.into(),
            window,
            latest,
        });
        self
    }

    /// Run only after no admission under `id` has arrived for `window`.
    #[must_use]
    pub fn debounce(mut self, id: impl Into<EffectId>, window: Duration) -> Self {
        self.directive = Some(Directive::Debounce {
            id: id.into(),
            window,
        });
        self
    }

    /// The directive currently attached, if any.
    #[must_use]
    pub const fn directive(&self) -> Option<&Directive> {
        self.directive.as_ref()
    }

    /// Split the effect into its shape and directive for execution.
    #[must_use]
    pub fn into_parts(self) -> (EffectKind<A>, Option<Directive>) {
        (self.kind, self.directive)
    }
}

// Manual Debug implementation since futures and closures don't implement it
impl<A> fmt::Debug for Effect<A>
where
    A: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Effect");
        match &self.kind {
            EffectKind::None => s.field("kind", &"None"),
            EffectKind::Just(a) => s.field("kind", &format_args!("Just({a:?})")),
            EffectKind::Future(_) => s.field("kind", &"Future(<future>)"),
            EffectKind::Delay { duration, action } => {
                s.field("kind", &format_args!("Delay({duration:?}, {action:?})"))
            },
            EffectKind::Run(_) => s.field("kind", &"Run(<callback>)"),
            EffectKind::Concat(effects) => {
                s.field("kind", &format_args!("Concat({} effects)", effects.len()))
            },
            EffectKind::Merge(effects) => {
                s.field("kind", &format_args!("Merge({} effects)", effects.len()))
            },
        };
        s.field("directive", &self.directive).finish()
    }
}
