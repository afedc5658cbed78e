//! Integration tests for the Store dispatch loop: serialization, snapshot
//! de-duplication, combinator ordering, cancellation, reset, and bind.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::time::Duration;

use flowstore_core::{Effect, Reducer};
use flowstore_runtime::Store;
use flowstore_testing::{StateRecorder, settle};

#[derive(Clone, Debug, Default, PartialEq)]
struct TrackState {
    seen: Vec<u32>,
}

#[derive(Clone, Debug)]
enum TrackAction {
    Mark(u32),
    Noop,
    StartConcat,
    StartMerge,
    StartSlow {
        delay: Duration,
        value: u32,
        key: &'static str,
    },
    StartSubscription,
    CancelSubscription,
    StartForever,
}

#[derive(Clone)]
struct TrackReducer;

impl Reducer for TrackReducer {
    type State = TrackState;
    type Action = TrackAction;

    fn reduce(&self, state: &mut TrackState, action: TrackAction) -> Effect<TrackAction> {
        match action {
            TrackAction::Mark(n) => {
                state.seen.push(n);
                Effect::none()
            },
            TrackAction::Noop => Effect::none(),
            TrackAction::StartConcat => Effect::concat(vec![
                Effect::just(TrackAction::Mark(1)),
                Effect::just(TrackAction::Mark(2)),
                Effect::just(TrackAction::Mark(3)),
            ]),
            TrackAction::StartMerge => Effect::merge(vec![
                Effect::delay(Duration::from_millis(100), TrackAction::Mark(1)),
                Effect::delay(Duration::from_millis(10), TrackAction::Mark(2)),
            ]),
            TrackAction::StartSlow { delay, value, key } => {
                Effect::delay(delay, TrackAction::Mark(value)).cancellable(key, true)
            },
            TrackAction::StartSubscription => Effect::run(|sender| async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    sender.send(TrackAction::Mark(77)).await;
                }
            })
            .cancellable("sub", false),
            TrackAction::CancelSubscription => Effect::cancel("sub"),
            TrackAction::StartForever => Effect::delay(Duration::from_secs(3600), TrackAction::Mark(99)),
        }
    }
}

/// Let ready tasks run without advancing virtual time.
async fn flush() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_serialize() {
    let store = Store::new(TrackState::default(), TrackReducer);

    let mut tasks = Vec::new();
    for chunk in 0..8_u32 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for n in 0..25 {
                store.send(TrackAction::Mark(chunk * 25 + n));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    settle(&store).await.unwrap();

    // Every reduction was atomic: all 200 marks landed, none lost to a
    // torn read-modify-write.
    let seen = store.state(|s| s.seen.clone());
    assert_eq!(seen.len(), 200);
    let mut sorted = seen;
    sorted.sort_unstable();
    assert_eq!(sorted, (0..200).collect::<Vec<u32>>());
}

#[tokio::test]
async fn duplicate_states_publish_once() {
    let store = Store::new(TrackState::default(), TrackReducer);
    let recorder = StateRecorder::attach(&store);

    // The attach-time value arrives as the first notification.
    settle(&store).await.unwrap();
    assert_eq!(recorder.snapshot(), vec![TrackState::default()]);

    store.send(TrackAction::Noop);
    settle(&store).await.unwrap();
    assert_eq!(recorder.len(), 1);

    store.send(TrackAction::Mark(1));
    settle(&store).await.unwrap();

    store.send(TrackAction::Noop);
    settle(&store).await.unwrap();

    assert_eq!(
        recorder.snapshot(),
        vec![TrackState::default(), TrackState { seen: vec![1] }]
    );
}

#[tokio::test]
async fn new_observer_sees_current_value_immediately() {
    let store = Store::new(TrackState { seen: vec![42] }, TrackReducer);
    let mut states = store.states();

    // The current value counts as the first change notification.
    states.changed().await.unwrap();
    assert_eq!(states.borrow_and_update().seen, vec![42]);
}

#[tokio::test]
async fn concat_yields_in_declared_order() {
    let store = Store::new(TrackState::default(), TrackReducer);
    store.send(TrackAction::StartConcat);
    settle(&store).await.unwrap();
    assert_eq!(store.state(|s| s.seen.clone()), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn merge_yields_in_resolution_order() {
    let store = Store::new(TrackState::default(), TrackReducer);
    store.send(TrackAction::StartMerge);
    settle(&store).await.unwrap();
    // The 10ms branch resolves before the 100ms branch.
    assert_eq!(store.state(|s| s.seen.clone()), vec![2, 1]);
}

#[tokio::test(start_paused = true)]
async fn send_returns_before_async_effects_finish() {
    let store = Store::new(TrackState::default(), TrackReducer);
    store.send(TrackAction::StartSlow {
        delay: Duration::from_millis(50),
        value: 1,
        key: "slow",
    });

    assert!(store.state(|s| s.seen.is_empty()));
    assert!(!store.is_idle());

    settle(&store).await.unwrap();
    assert_eq!(store.state(|s| s.seen.clone()), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn register_with_cancel_in_flight_replaces_prior_effect() {
    let store = Store::new(TrackState::default(), TrackReducer);

    store.send(TrackAction::StartSlow {
        delay: Duration::from_millis(50),
        value: 1,
        key: "req",
    });
    flush().await;

    // Same identity, cancel-in-flight: the first effect's pending action
    // must never reach the loop.
    store.send(TrackAction::StartSlow {
        delay: Duration::from_millis(5),
        value: 2,
        key: "req",
    });
    settle(&store).await.unwrap();

    assert_eq!(store.state(|s| s.seen.clone()), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn distinct_identities_do_not_interfere() {
    let store = Store::new(TrackState::default(), TrackReducer);

    store.send(TrackAction::StartSlow {
        delay: Duration::from_millis(50),
        value: 1,
        key: "a",
    });
    flush().await;
    store.send(TrackAction::StartSlow {
        delay: Duration::from_millis(5),
        value: 2,
        key: "b",
    });
    settle(&store).await.unwrap();

    assert_eq!(store.state(|s| s.seen.clone()), vec![2, 1]);
}

#[tokio::test(start_paused = true)]
async fn cancel_directive_stops_subscription_silently() {
    let store = Store::new(TrackState::default(), TrackReducer);

    store.send(TrackAction::StartSubscription);
    flush().await;
    assert!(!store.is_idle());

    store.send(TrackAction::CancelSubscription);
    settle(&store).await.unwrap();

    assert!(store.is_idle());
    assert!(store.state(|s| s.seen.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn cancel_without_registered_work_is_a_no_op() {
    let store = Store::new(TrackState::default(), TrackReducer);
    store.send(TrackAction::CancelSubscription);
    settle(&store).await.unwrap();
    assert!(store.is_idle());
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_running_effects_and_clears_registries() {
    let store = Store::new(TrackState::default(), TrackReducer);

    for _ in 0..5 {
        store.send(TrackAction::StartForever);
    }
    flush().await;
    assert!(!store.is_idle());

    store.reset();
    settle(&store).await.unwrap();
    assert!(store.is_idle());

    // The loop keeps working after a reset.
    store.send(TrackAction::Mark(1));
    settle(&store).await.unwrap();
    assert_eq!(store.state(|s| s.seen.clone()), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn reset_is_idempotent() {
    let store = Store::new(TrackState::default(), TrackReducer);

    store.send(TrackAction::StartForever);
    flush().await;

    store.reset();
    store.reset();
    settle(&store).await.unwrap();
    assert!(store.is_idle());

    store.send(TrackAction::Mark(7));
    settle(&store).await.unwrap();
    assert_eq!(store.state(|s| s.seen.clone()), vec![7]);
}

mod bind {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct BindState {
        pings: u32,
    }

    #[derive(Clone, Debug)]
    enum BindAction {
        Ping,
    }

    #[derive(Clone)]
    struct PingOnBind;

    impl Reducer for PingOnBind {
        type State = BindState;
        type Action = BindAction;

        fn reduce(&self, state: &mut BindState, action: BindAction) -> Effect<BindAction> {
            match action {
                BindAction::Ping => {
                    state.pings += 1;
                    Effect::none()
                },
            }
        }

        fn bind(&self) -> Effect<BindAction> {
            Effect::just(BindAction::Ping)
        }
    }

    #[derive(Clone)]
    struct ForeverBind;

    impl Reducer for ForeverBind {
        type State = BindState;
        type Action = BindAction;

        fn reduce(&self, state: &mut BindState, action: BindAction) -> Effect<BindAction> {
            match action {
                BindAction::Ping => {
                    state.pings += 1;
                    Effect::none()
                },
            }
        }

        fn bind(&self) -> Effect<BindAction> {
            Effect::run(|sender| async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    sender.send(BindAction::Ping).await;
                }
            })
        }
    }

    #[tokio::test]
    async fn bind_is_subscribed_at_construction() {
        let store = Store::new(BindState::default(), PingOnBind);
        settle(&store).await.unwrap();
        assert_eq!(store.state(|s| s.pings), 1);
    }

    #[tokio::test]
    async fn settle_waits_for_bind_delivery() {
        // The bind worker has not even been polled yet; the store must not
        // report idle until its action has gone through the loop.
        let store = Store::new(BindState::default(), PingOnBind);
        assert!(!store.is_idle());

        settle(&store).await.unwrap();
        assert_eq!(store.state(|s| s.pings), 1);
        assert!(store.is_idle());
    }

    #[tokio::test]
    async fn reset_resubscribes_bind() {
        let store = Store::new(BindState::default(), PingOnBind);
        settle(&store).await.unwrap();

        store.reset();
        settle(&store).await.unwrap();
        assert_eq!(store.state(|s| s.pings), 2);

        store.reset();
        settle(&store).await.unwrap();
        assert_eq!(store.state(|s| s.pings), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_bind_does_not_block_idleness() {
        let store = Store::new(BindState::default(), ForeverBind);
        settle(&store).await.unwrap();
        assert!(store.is_idle());
        assert_eq!(store.state(|s| s.pings), 0);
    }
}
