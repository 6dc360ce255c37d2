use crate::error::EnqueueError;
use crate::message::RawMessage;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Create a bounded intake queue with the given capacity.
///
/// The producer half goes to the intake task, the consumer half is
/// cloned across the worker pool.
pub fn intake_queue(capacity: usize) -> (IntakeProducer, IntakeConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        IntakeProducer { tx },
        IntakeConsumer {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer half of the intake queue.
///
/// `enqueue` suspends while the buffer is full; that suspension is
/// the pipeline's backpressure toward the transport pull loop.
/// Dropping every producer closes the queue.
#[derive(Clone)]
pub struct IntakeProducer {
    tx: mpsc::Sender<RawMessage>,
}

impl IntakeProducer {
    pub async fn enqueue(&self, msg: RawMessage) -> Result<(), EnqueueError> {
        self.tx
            .send(msg)
            .await
            .map_err(|e| EnqueueError { id: e.0.id })
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer half of the intake queue, shared by all workers.
///
/// The buffer is FIFO and each message is handed to exactly one
/// worker. Once the producers are gone and the buffer is drained,
/// `dequeue` returns `None` as the closed sentinel.
#[derive(Clone)]
pub struct IntakeConsumer {
    rx: Arc<Mutex<mpsc::Receiver<RawMessage>>>,
}

impl IntakeConsumer {
    pub async fn dequeue(&self) -> Option<RawMessage> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use std::time::Duration;

    fn msg(id: &str) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            payload: Bytes::from_static(b"{}"),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let (producer, consumer) = intake_queue(8);

        producer.enqueue(msg("a")).await.unwrap();
        producer.enqueue(msg("b")).await.unwrap();
        producer.enqueue(msg("c")).await.unwrap();

        assert_eq!(consumer.dequeue().await.unwrap().id, "a");
        assert_eq!(consumer.dequeue().await.unwrap().id, "b");
        assert_eq!(consumer.dequeue().await.unwrap().id, "c");
    }

    #[tokio::test]
    async fn dequeue_returns_none_once_closed_and_drained() {
        let (producer, consumer) = intake_queue(8);

        producer.enqueue(msg("a")).await.unwrap();
        drop(producer);

        assert_eq!(consumer.dequeue().await.unwrap().id, "a");
        assert!(consumer.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn enqueue_blocks_when_full_until_space_frees() {
        let (producer, consumer) = intake_queue(2);

        producer.enqueue(msg("a")).await.unwrap();
        producer.enqueue(msg("b")).await.unwrap();

        // Third enqueue must suspend while the buffer is full.
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), producer.enqueue(msg("c"))).await;
        assert!(blocked.is_err());

        // Freeing one slot lets the pending message in.
        let pending = tokio::spawn({
            let producer = producer.clone();
            async move { producer.enqueue(msg("c")).await }
        });
        assert_eq!(consumer.dequeue().await.unwrap().id, "a");
        pending.await.unwrap().unwrap();

        assert_eq!(consumer.dequeue().await.unwrap().id, "b");
        assert_eq!(consumer.dequeue().await.unwrap().id, "c");
    }

    #[tokio::test]
    async fn enqueue_fails_after_consumer_dropped() {
        let (producer, consumer) = intake_queue(2);
        drop(consumer);

        let err = producer.enqueue(msg("a")).await.unwrap_err();
        assert_eq!(err.id, "a");
    }
}
