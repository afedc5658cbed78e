//! Rate-limiting directive tests. All of these run under paused virtual
//! time so windows are exact.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::time::Duration;

use flowstore_core::{Effect, Reducer};
use flowstore_runtime::Store;
use flowstore_testing::settle;

const WINDOW: Duration = Duration::from_millis(100);
const QUIET: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, Default, PartialEq)]
struct RateState {
    runs: Vec<u32>,
}

#[derive(Clone, Debug)]
enum RateAction {
    FireThrottled { n: u32, latest: bool },
    FireDebounced { n: u32 },
    CancelQuiet,
    Ran(u32),
}

#[derive(Clone)]
struct RateReducer;

impl Reducer for RateReducer {
    type State = RateState;
    type Action = RateAction;

    fn reduce(&self, state: &mut RateState, action: RateAction) -> Effect<RateAction> {
        match action {
            RateAction::FireThrottled { n, latest } => {
                Effect::just(RateAction::Ran(n)).throttle("pulse", WINDOW, latest)
            },
            RateAction::FireDebounced { n } => {
                Effect::just(RateAction::Ran(n)).debounce("quiet", QUIET)
            },
            RateAction::CancelQuiet => Effect::cancel("quiet"),
            RateAction::Ran(n) => {
                state.runs.push(n);
                Effect::none()
            },
        }
    }
}

/// Let ready tasks run without advancing virtual time.
async fn flush() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    flush().await;
}

#[tokio::test(start_paused = true)]
async fn throttle_drops_mid_window_arrivals() {
    let store = Store::new(RateState::default(), RateReducer);

    // t = 0: window opens, runs immediately.
    store.send(RateAction::FireThrottled { n: 1, latest: false });
    flush().await;

    // t = 1: mid-window, dropped.
    advance(Duration::from_millis(1)).await;
    store.send(RateAction::FireThrottled { n: 2, latest: false });
    flush().await;

    // t = 101: window elapsed, runs.
    advance(WINDOW).await;
    store.send(RateAction::FireThrottled { n: 3, latest: false });
    settle(&store).await.unwrap();

    assert_eq!(store.state(|s| s.runs.clone()), vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn throttle_latest_runs_trailing_payload_at_window_end() {
    let store = Store::new(RateState::default(), RateReducer);

    store.send(RateAction::FireThrottled { n: 1, latest: true });
    flush().await;

    advance(Duration::from_millis(10)).await;
    store.send(RateAction::FireThrottled { n: 2, latest: true });
    flush().await;

    // Newer arrival replaces the held payload.
    advance(Duration::from_millis(10)).await;
    store.send(RateAction::FireThrottled { n: 3, latest: true });
    flush().await;

    assert_eq!(store.state(|s| s.runs.clone()), vec![1]);

    // t = 99: still inside the window.
    advance(Duration::from_millis(79)).await;
    assert_eq!(store.state(|s| s.runs.clone()), vec![1]);

    // t = 100: trailing payload fires.
    advance(Duration::from_millis(1)).await;
    settle(&store).await.unwrap();
    assert_eq!(store.state(|s| s.runs.clone()), vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn throttle_trailing_run_opens_a_new_window() {
    let store = Store::new(RateState::default(), RateReducer);

    store.send(RateAction::FireThrottled { n: 1, latest: true });
    flush().await;
    advance(Duration::from_millis(50)).await;
    store.send(RateAction::FireThrottled { n: 2, latest: true });
    flush().await;

    // Trailing run at t = 100 restarts the window, so an arrival at
    // t = 150 is mid-window again and gets held until t = 200.
    advance(WINDOW).await;
    assert_eq!(store.state(|s| s.runs.clone()), vec![1, 2]);

    store.send(RateAction::FireThrottled { n: 3, latest: true });
    flush().await;
    assert_eq!(store.state(|s| s.runs.clone()), vec![1, 2]);

    advance(Duration::from_millis(50)).await;
    settle(&store).await.unwrap();
    assert_eq!(store.state(|s| s.runs.clone()), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn debounce_runs_only_the_last_of_a_burst() {
    let store = Store::new(RateState::default(), RateReducer);

    // Five firings 10ms apart, all inside the 50ms quiet period of the
    // previous one.
    for n in 1..=5 {
        store.send(RateAction::FireDebounced { n });
        flush().await;
        if n < 5 {
            advance(Duration::from_millis(10)).await;
        }
    }

    // A held debounce counts as pending work.
    assert!(!store.is_idle());

    // Last firing was at t = 40; its quiet period ends at t = 90.
    advance(Duration::from_millis(49)).await;
    assert!(store.state(|s| s.runs.is_empty()));

    advance(Duration::from_millis(1)).await;
    settle(&store).await.unwrap();
    assert_eq!(store.state(|s| s.runs.clone()), vec![5]);
}

#[tokio::test(start_paused = true)]
async fn debounce_separate_bursts_each_run_once() {
    let store = Store::new(RateState::default(), RateReducer);

    store.send(RateAction::FireDebounced { n: 1 });
    flush().await;
    advance(Duration::from_millis(10)).await;
    store.send(RateAction::FireDebounced { n: 2 });
    flush().await;

    advance(QUIET).await;
    settle(&store).await.unwrap();
    assert_eq!(store.state(|s| s.runs.clone()), vec![2]);

    store.send(RateAction::FireDebounced { n: 3 });
    flush().await;
    advance(Duration::from_millis(10)).await;
    store.send(RateAction::FireDebounced { n: 4 });
    flush().await;

    advance(QUIET).await;
    settle(&store).await.unwrap();
    assert_eq!(store.state(|s| s.runs.clone()), vec![2, 4]);
}

#[tokio::test(start_paused = true)]
async fn cancel_discards_a_held_debounce() {
    let store = Store::new(RateState::default(), RateReducer);

    store.send(RateAction::FireDebounced { n: 1 });
    flush().await;

    store.send(RateAction::CancelQuiet);
    flush().await;
    assert!(store.is_idle());

    advance(Duration::from_millis(200)).await;
    settle(&store).await.unwrap();
    assert!(store.state(|s| s.runs.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn throttle_and_debounce_identities_are_independent() {
    let store = Store::new(RateState::default(), RateReducer);

    store.send(RateAction::FireThrottled { n: 1, latest: false });
    store.send(RateAction::FireDebounced { n: 2 });
    flush().await;

    advance(QUIET).await;
    settle(&store).await.unwrap();
    assert_eq!(store.state(|s| s.runs.clone()), vec![1, 2]);
}
