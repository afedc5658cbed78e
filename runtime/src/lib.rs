//! # Flowstore Runtime
//!
//! The dispatch loop for the flowstore architecture.
//!
//! This crate turns the value types of `flowstore-core` into running
//! machinery: the [`Store`] owns a state value, serializes reduction
//! against concurrent inbound actions, and supervises a cancellable worker
//! for every admitted effect. Control directives (register, cancel,
//! throttle, debounce) are evaluated at admission time against the loop's
//! registries, so reducers stay free of concurrency state.
//!
//! ## Guarantees
//!
//! - Reduction is strictly sequential: no two actions ever reduce
//!   concurrently against the same state, regardless of how many effects
//!   are in flight.
//! - Observers see a de-duplicated snapshot stream: a change notification
//!   is published iff the new state differs from the last published one.
//! - Cancellation is silent and complete: a canceled worker stops
//!   producing actions and leaves no orphaned registry entries.
//! - Nothing escapes the loop as an error: `send`, `reset`, and state
//!   access always succeed. Effects map their own failures into actions.
//!
//! ## Example
//!
//! ```ignore
//! use flowstore_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer);
//!
//! store.send(Action::Refresh);
//!
//! // Point-in-time read
//! let value = store.state(|s| s.some_field.clone());
//!
//! // De-duplicated snapshot stream
//! let mut states = store.states();
//! while states.changed().await.is_ok() {
//!     render(&*states.borrow());
//! }
//! ```

/// The `Store` dispatch loop.
pub mod store;

mod stream;

pub use store::{Store, StoreConfig};
