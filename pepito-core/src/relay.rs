// ABOUTME: The ingestion pipeline: feed event → translate → registry snapshot → fan-out
// ABOUTME: Each event is handled to completion before the next is read

use futures_util::{Stream, StreamExt};

use crate::dispatch::{dispatch, DispatchReport};
use crate::feed::RawEvent;
use crate::registry::SharedRegistry;
use crate::traits::ChatPlatform;
use crate::translate::Translator;

/// Translate one event and deliver it to every configured destination.
/// Returns `None` when the event produced no notification.
pub async fn relay_event<P: ChatPlatform>(
    platform: &P,
    registry: &SharedRegistry,
    translator: &Translator,
    event: &RawEvent,
) -> Option<DispatchReport> {
    let notification = translator.translate(event)?;

    // Lock only long enough to copy the entries; never across a send.
    let entries = registry.lock().await.snapshot();
    if entries.is_empty() {
        tracing::info!(title = %notification.title, "No channels configured, nothing to deliver");
        return Some(DispatchReport::default());
    }

    let report = dispatch(platform, &entries, &notification.to_content()).await;
    tracing::info!(
        title = %notification.title,
        delivered = report.delivered.len(),
        unresolved = report.unresolved.len(),
        failed = report.failed.len(),
        "Notification relayed"
    );
    Some(report)
}

/// Consume the feed until it ends
pub async fn run_relay<P, S>(
    platform: &P,
    registry: SharedRegistry,
    translator: &Translator,
    events: S,
) where
    P: ChatPlatform,
    S: Stream<Item = RawEvent>,
{
    futures_util::pin_mut!(events);
    while let Some(event) = events.next().await {
        relay_event(platform, &registry, translator, &event).await;
    }
    tracing::info!("Feed event stream ended, relay stopped");
}
