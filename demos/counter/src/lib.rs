//! # Counter Demo
//!
//! A small counter demonstrating the flowstore architecture.
//!
//! This demo showcases:
//! - A reducer as a pure state transition plus effect description
//! - Synchronous actions (`Increment`, `Decrement`)
//! - A cascading effect (`Twice` feeds two `Increment`s back in)
//! - A timer effect (`DelayedIncrement`)
//!
//! ## Example
//!
//! ```no_run
//! use counter::{CounterAction, CounterReducer, CounterState};
//! use flowstore_runtime::Store;
//! use flowstore_testing::settle;
//!
//! # async fn example() {
//! let store = Store::new(CounterState::default(), CounterReducer);
//!
//! store.send(CounterAction::Increment);
//! settle(&store).await.unwrap();
//! assert_eq!(store.state(|s| s.count), 1);
//! # }
//! ```

use std::time::Duration;

use flowstore_core::{Effect, Reducer};

/// Counter state
///
/// The state is just a count. In a real application this would hold
/// richer domain data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
}

/// Counter actions
///
/// The events the counter reacts to. Each one is processed by the
/// reducer under the store's serialization guarantee.
#[derive(Debug, Clone)]
pub enum CounterAction {
    /// Increment the counter by 1
    Increment,
    /// Decrement the counter by 1
    Decrement,
    /// Feed two `Increment` actions back into the loop, in order
    Twice,
    /// Increment after the given delay has elapsed
    DelayedIncrement {
        /// How long to wait before the increment lands
        delay: Duration,
    },
}

/// Counter reducer
///
/// `Increment` and `Decrement` are pure transitions. `Twice` and
/// `DelayedIncrement` return effects, so the actual increments arrive
/// through the loop like any externally sent action.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterReducer;

impl Reducer for CounterReducer {
    type State = CounterState;
    type Action = CounterAction;

    fn reduce(&self, state: &mut CounterState, action: CounterAction) -> Effect<CounterAction> {
        match action {
            CounterAction::Increment => {
                state.count += 1;
                Effect::none()
            },
            CounterAction::Decrement => {
                state.count -= 1;
                Effect::none()
            },
            CounterAction::Twice => Effect::concat(vec![
                Effect::just(CounterAction::Increment),
                Effect::just(CounterAction::Increment),
            ]),
            CounterAction::DelayedIncrement { delay } => {
                Effect::delay(delay, CounterAction::Increment)
            },
        }
    }
}
