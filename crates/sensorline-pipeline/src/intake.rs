use crate::message::{MessageSource, RawMessage};
use crate::queue::IntakeProducer;
use crate::tracker::{AckOutcome, AckTracker};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Pull loop: one task moves deliveries from the transport into the
/// intake queue, registering each with the tracker first.
///
/// Suspends inside `enqueue` while the queue is full, which is what
/// slows the transport pull rate down. Dropping the producer on exit
/// closes the queue; the workers drain what is buffered and stop.
pub async fn run_intake(
    source: Arc<dyn MessageSource>,
    producer: IntakeProducer,
    tracker: Arc<AckTracker>,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    info!("intake loop started");

    loop {
        let delivery = tokio::select! {
            _ = ctx.cancelled() => {
                info!("intake loop stopping on cancellation");
                break;
            }
            next = source.next() => match next.context("message source failed")? {
                Some(delivery) => delivery,
                None => {
                    info!("message source ended");
                    break;
                }
            },
        };

        if let Err(e) = tracker.track(&delivery.id, Arc::clone(&delivery.handle)) {
            // The first tracked copy is still in flight and will
            // settle normally; this duplicate is settled directly so
            // the transport is not left hanging on it.
            error!(
                message_id = %delivery.id,
                error = %e,
                "transport delivered a duplicate in-flight id"
            );
            if let Err(e) = delivery.handle.nack().await {
                warn!(message_id = %delivery.id, error = %e, "failed to nack duplicate delivery");
            }
            continue;
        }

        let msg = RawMessage {
            id: delivery.id,
            payload: delivery.payload,
            received_at: Utc::now(),
        };
        if let Err(e) = producer.enqueue(msg).await {
            // Queue closed under us: shutdown is racing intake. Undo
            // the tracking so this message goes straight back to the
            // transport.
            warn!(message_id = %e.id, "intake queue closed, returning message to transport");
            if let Err(err) = tracker.resolve(&e.id, AckOutcome::Nack).await {
                error!(message_id = %e.id, error = %err, "failed to settle message after queue closure");
            }
            break;
        }
    }

    info!("intake loop stopped");
    Ok(())
}
