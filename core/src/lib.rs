//! # Flowstore Core
//!
//! Core value types for the flowstore unidirectional-state-flow runtime.
//!
//! This crate defines the vocabulary shared by reducers and the dispatch
//! loop. Nothing in here performs work: an [`Effect`](effect::Effect) is an
//! inert description of future actions, a [`Directive`](effect::Directive)
//! is a tag the loop interprets, and an [`EffectId`](ident::EffectId) is an
//! opaque correlation token. The loop itself lives in `flowstore-runtime`.
//!
//! ## Core Concepts
//!
//! - **State**: the single, equatable snapshot of data owned by one loop
//! - **Action**: a discrete message describing something that happened
//! - **Reducer**: pure function `(&mut State, Action) → Effect<Action>`
//! - **Effect**: a composable description of asynchronous work that yields
//!   further actions
//! - **Directive**: register/cancel/throttle/debounce metadata carried
//!   alongside an effect
//!
//! ## Architecture Principles
//!
//! - Unidirectional data flow
//! - Explicit effects (no hidden I/O in reducers)
//! - Strictly serialized state mutation
//! - Failure is data: effects map their errors into ordinary actions
//!
//! ## Example
//!
//! ```
//! use flowstore_core::{Effect, Reducer};
//!
//! #[derive(Clone, Debug, Default, PartialEq)]
//! struct SearchState {
//!     query: String,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum SearchAction {
//!     QueryChanged(String),
//!     ResultsLoaded(Vec<String>),
//! }
//!
//! struct SearchReducer;
//!
//! impl Reducer for SearchReducer {
//!     type State = SearchState;
//!     type Action = SearchAction;
//!
//!     fn reduce(&self, state: &mut SearchState, action: SearchAction) -> Effect<SearchAction> {
//!         match action {
//!             SearchAction::QueryChanged(q) => {
//!                 state.query = q.clone();
//!                 Effect::future(async move {
//!                     // would hit a search backend here
//!                     SearchAction::ResultsLoaded(vec![q])
//!                 })
//!                 .debounce("search", std::time::Duration::from_millis(300))
//!             },
//!             SearchAction::ResultsLoaded(_) => Effect::none(),
//!         }
//!     }
//! }
//! ```

/// Effect descriptions, combinators, and control directives.
pub mod effect;

/// Type-erased effect identity tokens.
pub mod ident;

/// The `Reducer` trait.
pub mod reducer;

pub use effect::{Directive, Effect, EffectKind, EffectSender};
pub use ident::EffectId;
pub use reducer::Reducer;
