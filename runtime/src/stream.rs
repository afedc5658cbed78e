//! Turning effect descriptions into action streams.
//!
//! This is the single point where an inert [`Effect`] becomes work: the
//! store hands an admitted effect to [`action_stream`] and drains the
//! resulting stream on a supervised worker task. Dropping the stream stops
//! all further production: callback drivers, delays, and every branch of a
//! combinator live inside the stream itself, so cancellation of the worker
//! cancels everything and leaves no orphan task behind.

use flowstore_core::effect::{Effect, EffectKind, EffectSender};
use futures::future::ready;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

/// Convert an effect into a boxed, single-consumption action stream.
///
/// The effect's directive has already been evaluated by the store at
/// admission time and is ignored here; directives attached to combinator
/// arguments are inert by design.
pub(crate) fn action_stream<A>(effect: Effect<A>, channel_capacity: usize) -> BoxStream<'static, A>
where
    A: Send + 'static,
{
    let (kind, _directive) = effect.into_parts();
    match kind {
        EffectKind::None => stream::empty().boxed(),
        EffectKind::Just(action) => stream::once(ready(action)).boxed(),
        EffectKind::Future(fut) => stream::once(fut).boxed(),
        EffectKind::Delay { duration, action } => stream::once(async move {
            tokio::time::sleep(duration).await;
            *action
        })
        .boxed(),
        EffectKind::Run(f) => {
            let (tx, rx) = mpsc::channel(channel_capacity);
            let actions = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|action| (action, rx))
            });
            // The driver is polled alongside the channel; once it finishes
            // and every sender clone is gone, the channel closes and the
            // stream completes.
            let driver = stream::once(f(EffectSender::new(tx))).filter_map(|()| ready(None));
            stream::select(actions, driver).boxed()
        },
        EffectKind::Concat(effects) => {
            // Lazy per segment: effect n + 1 is not even converted until
            // segment n's stream has fully completed.
            stream::iter(
                effects
                    .into_iter()
                    .map(move |effect| action_stream(effect, channel_capacity)),
            )
            .flatten()
            .boxed()
        },
        EffectKind::Merge(effects) => stream::select_all(
            effects
                .into_iter()
                .map(|effect| action_stream(effect, channel_capacity)),
        )
        .boxed(),
    }
}
