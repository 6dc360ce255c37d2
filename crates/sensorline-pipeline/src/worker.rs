use crate::message::RawMessage;
use crate::queue::IntakeConsumer;
use crate::tracker::{AckOutcome, AckTracker};
use sensorline_domain::{Decoder, ReadingSink};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Fixed-size pool of message processors.
///
/// Each worker loops: dequeue one message, decode it, hand the
/// reading to the sink, settle through the tracker. A failed message
/// never kills a worker; only cancellation or queue closure does, and
/// only between messages, so an in-flight message is always settled
/// before its worker exits.
pub struct WorkerPool {
    worker_count: usize,
    consumer: IntakeConsumer,
    decoder: Decoder,
    sink: Arc<dyn ReadingSink>,
    tracker: Arc<AckTracker>,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        consumer: IntakeConsumer,
        decoder: Decoder,
        sink: Arc<dyn ReadingSink>,
        tracker: Arc<AckTracker>,
    ) -> Self {
        Self {
            worker_count,
            consumer,
            decoder,
            sink,
            tracker,
        }
    }

    /// Run all workers until cancellation or queue closure; returns
    /// once every worker has exited.
    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(worker_count = self.worker_count, "starting worker pool");

        let mut workers = JoinSet::new();
        for worker_id in 0..self.worker_count {
            let consumer = self.consumer.clone();
            let decoder = self.decoder.clone();
            let sink = Arc::clone(&self.sink);
            let tracker = Arc::clone(&self.tracker);
            let ctx = ctx.clone();
            workers.spawn(async move {
                worker_loop(worker_id, consumer, decoder, sink, tracker, ctx).await;
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task panicked");
            }
        }

        info!("worker pool stopped");
        Ok(())
    }
}

async fn worker_loop(
    worker_id: usize,
    consumer: IntakeConsumer,
    decoder: Decoder,
    sink: Arc<dyn ReadingSink>,
    tracker: Arc<AckTracker>,
    ctx: CancellationToken,
) {
    debug!(worker_id, "worker started");
    loop {
        let msg = tokio::select! {
            _ = ctx.cancelled() => {
                debug!(worker_id, "worker stopping on cancellation");
                break;
            }
            msg = consumer.dequeue() => msg,
        };
        let Some(msg) = msg else {
            debug!(worker_id, "intake queue closed and drained, worker stopping");
            break;
        };

        // Fully settled before the next iteration looks at the
        // cancellation token again.
        process_message(worker_id, &decoder, sink.as_ref(), &tracker, msg).await;
    }
}

async fn process_message(
    worker_id: usize,
    decoder: &Decoder,
    sink: &dyn ReadingSink,
    tracker: &AckTracker,
    msg: RawMessage,
) {
    let reading = match decoder.decode(&msg.payload) {
        Ok(reading) => reading,
        Err(e) => {
            // A malformed payload is terminal here: nack and move on,
            // no local retry.
            warn!(worker_id, message_id = %msg.id, error = %e, "decode failed, nacking");
            settle(tracker, &msg.id, AckOutcome::Nack).await;
            return;
        }
    };

    match sink.handle(reading).await {
        Ok(()) => {
            debug!(worker_id, message_id = %msg.id, "reading handled, acking");
            settle(tracker, &msg.id, AckOutcome::Ack).await;
        }
        Err(e) => {
            warn!(
                worker_id,
                message_id = %msg.id,
                error = %e,
                "sink failed, nacking for redelivery"
            );
            settle(tracker, &msg.id, AckOutcome::Nack).await;
        }
    }
}

async fn settle(tracker: &AckTracker, id: &str, outcome: AckOutcome) {
    if let Err(e) = tracker.resolve(id, outcome).await {
        // Exactly-one-settlement invariant broken. This is a bug to
        // fix, not a condition to recover from; the pool stays up but
        // the violation is loud.
        error!(message_id = %id, error = %e, "acknowledgement bookkeeping violation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DeliveryHandle, MockDeliveryHandle};
    use bytes::Bytes;
    use chrono::Utc;
    use sensorline_domain::MockReadingSink;

    fn raw(id: &str, payload: &'static [u8]) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            payload: Bytes::from_static(payload),
            received_at: Utc::now(),
        }
    }

    fn tracked(tracker: &AckTracker, id: &str, handle: MockDeliveryHandle) {
        let handle: Arc<dyn DeliveryHandle> = Arc::new(handle);
        tracker.track(id, handle).unwrap();
    }

    #[tokio::test]
    async fn acks_when_decode_and_sink_succeed() {
        let tracker = AckTracker::new();
        let mut handle = MockDeliveryHandle::new();
        handle.expect_ack().times(1).returning(|| Ok(()));
        tracked(&tracker, "m-1", handle);

        let mut sink = MockReadingSink::new();
        sink.expect_handle()
            .withf(|r| r.sensor_id == 7 && r.temperature == 21.5 && r.humidity == 55.2)
            .times(1)
            .returning(|_| Ok(()));

        process_message(
            0,
            &Decoder::default(),
            &sink,
            &tracker,
            raw(
                "m-1",
                br#"{"sensor_id":7,"temperature":21.5,"humidity":55.2,"timestamp":"bogus"}"#,
            ),
        )
        .await;

        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn nacks_malformed_payload_without_calling_sink() {
        let tracker = AckTracker::new();
        let mut handle = MockDeliveryHandle::new();
        handle.expect_nack().times(1).returning(|| Ok(()));
        tracked(&tracker, "m-1", handle);

        // No expectations: any sink call fails the test.
        let sink = MockReadingSink::new();

        process_message(
            0,
            &Decoder::default(),
            &sink,
            &tracker,
            raw(
                "m-1",
                br#"{"sensor_id":"not-a-number","temperature":21.5,"humidity":55.2}"#,
            ),
        )
        .await;

        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn nacks_when_sink_fails() {
        let tracker = AckTracker::new();
        let mut handle = MockDeliveryHandle::new();
        handle.expect_nack().times(1).returning(|| Ok(()));
        tracked(&tracker, "m-1", handle);

        let mut sink = MockReadingSink::new();
        sink.expect_handle()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("downstream unavailable").into()));

        process_message(
            0,
            &Decoder::default(),
            &sink,
            &tracker,
            raw("m-1", br#"{"sensor_id":1,"temperature":20.0,"humidity":50.0}"#),
        )
        .await;

        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn pool_drains_queue_and_stops_on_closure() {
        let (producer, consumer) = crate::queue::intake_queue(8);
        let tracker = Arc::new(AckTracker::new());

        for i in 0..5 {
            let id = format!("m-{i}");
            let mut handle = MockDeliveryHandle::new();
            handle.expect_ack().times(1).returning(|| Ok(()));
            let handle: Arc<dyn DeliveryHandle> = Arc::new(handle);
            tracker.track(&id, handle).unwrap();
            producer
                .enqueue(RawMessage {
                    id,
                    payload: Bytes::from_static(
                        br#"{"sensor_id":1,"temperature":20.0,"humidity":50.0}"#,
                    ),
                    received_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        drop(producer);

        let mut sink = MockReadingSink::new();
        sink.expect_handle().times(5).returning(|_| Ok(()));

        let pool = WorkerPool::new(
            3,
            consumer,
            Decoder::default(),
            Arc::new(sink),
            Arc::clone(&tracker),
        );
        pool.run(CancellationToken::new()).await.unwrap();

        assert_eq!(tracker.in_flight_count(), 0);
    }
}
