//! The `Reducer` trait, the loop's only collaborator.

use crate::effect::Effect;

/// Pure business logic: maps `(state, action)` to the next state and an
/// effect describing any follow-up asynchronous work.
///
/// Reducers are total over their input domain and must not fail or panic:
/// any recoverable failure belongs inside the returned effect, mapped into
/// an ordinary action before it reaches the loop. A reducer holds no
/// concurrency state of its own: replacement, rate-limiting, and
/// cancellation policies are expressed through effect directives and all
/// bookkeeping lives in the loop.
///
/// # Example
///
/// ```
/// use flowstore_core::{Effect, Reducer};
///
/// #[derive(Clone, Debug, Default, PartialEq)]
/// struct Counter {
///     count: i64,
/// }
///
/// #[derive(Clone, Debug)]
/// enum CounterAction {
///     Increment,
///     Twice,
/// }
///
/// struct CounterReducer;
///
/// impl Reducer for CounterReducer {
///     type State = Counter;
///     type Action = CounterAction;
///
///     fn reduce(&self, state: &mut Counter, action: CounterAction) -> Effect<CounterAction> {
///         match action {
///             CounterAction::Increment => {
///                 state.count += 1;
///                 Effect::none()
///             },
///             CounterAction::Twice => Effect::concat(vec![
///                 Effect::just(CounterAction::Increment),
///                 Effect::just(CounterAction::Increment),
///             ]),
///         }
///     }
/// }
/// ```
pub trait Reducer {
    /// The state type this reducer operates on.
    type State;

    /// The action type this reducer processes.
    type Action;

    /// Reduce one action into a state change and an effect.
    ///
    /// Invoked strictly serially by the loop: no two calls ever observe the
    /// same state concurrently, regardless of how many effects are in
    /// flight.
    fn reduce(&self, state: &mut Self::State, action: Self::Action) -> Effect<Self::Action>;

    /// The persistent effect representing external event sources.
    ///
    /// Admitted once at loop construction and again on every reset, as an
    /// ordinary directive-less effect whose worker lives for the lifetime
    /// of the loop. Defaults to the empty effect.
    fn bind(&self) -> Effect<Self::Action> {
        Effect::none()
    }
}
