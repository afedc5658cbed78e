//! Counter demo binary
//!
//! Drives the counter reducer through a store and prints each observed
//! state, including the ones produced by cascading and delayed effects.

use std::time::Duration;

use counter::{CounterAction, CounterReducer, CounterState};
use flowstore_runtime::Store;
use flowstore_testing::settle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,flowstore_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Store::new(CounterState::default(), CounterReducer);

    let count = store.state(|s| s.count);
    println!("Initial count: {count}");

    println!(">>> Sending: Increment");
    store.send(CounterAction::Increment);

    println!(">>> Sending: Decrement");
    store.send(CounterAction::Decrement);

    println!(">>> Sending: Twice");
    store.send(CounterAction::Twice);

    println!(">>> Sending: DelayedIncrement (100ms)");
    store.send(CounterAction::DelayedIncrement {
        delay: Duration::from_millis(100),
    });

    // Sends return immediately; wait for the cascading and delayed
    // effects to finish before reading the final count.
    match settle(&store).await {
        Ok(()) => {
            let count = store.state(|s| s.count);
            println!("Settled count: {count}");
        },
        Err(error) => {
            tracing::error!(%error, "store did not settle");
        },
    }
}
