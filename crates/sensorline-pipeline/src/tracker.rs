use crate::error::TrackerError;
use crate::message::DeliveryHandle;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Which way a message was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Ack,
    Nack,
}

struct InFlight {
    handle: Arc<dyn DeliveryHandle>,
    enqueued_at: DateTime<Utc>,
}

/// Maps in-flight message ids to their delivery handles and enforces
/// exactly one ack or nack per id.
///
/// The map behind a single mutex is the pipeline's only shared
/// mutable state. The lock is never held across an await: `resolve`
/// removes the entry first, then settles the handle.
pub struct AckTracker {
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AckTracker {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Register a delivery before it enters the intake queue.
    ///
    /// `DuplicateId` means the transport delivered a second copy of a
    /// message that is still in flight, or dispatch has a bug.
    pub fn track(
        &self,
        id: &str,
        handle: Arc<dyn DeliveryHandle>,
    ) -> Result<(), TrackerError> {
        let mut map = self.lock_map();
        if map.contains_key(id) {
            return Err(TrackerError::DuplicateId(id.to_string()));
        }
        map.insert(
            id.to_string(),
            InFlight {
                handle,
                enqueued_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Settle a message: remove its entry and issue exactly one ack
    /// or nack on the transport handle.
    ///
    /// `UnknownId` on a second settlement attempt or an id that was
    /// never tracked.
    pub async fn resolve(&self, id: &str, outcome: AckOutcome) -> Result<(), TrackerError> {
        let entry = self
            .lock_map()
            .remove(id)
            .ok_or_else(|| TrackerError::UnknownId(id.to_string()))?;

        debug!(
            message_id = %id,
            outcome = ?outcome,
            in_flight_ms = (Utc::now() - entry.enqueued_at).num_milliseconds(),
            "settling message"
        );

        let settled = match outcome {
            AckOutcome::Ack => entry.handle.ack().await,
            AckOutcome::Nack => entry.handle.nack().await,
        };
        if let Err(e) = settled {
            // The entry is already removed; a settlement the broker
            // refused becomes the transport's redelivery problem.
            warn!(error = %e, message_id = %id, "transport rejected settlement");
        }
        Ok(())
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock_map().len()
    }

    /// Nack everything still tracked and return how many messages
    /// were settled this way.
    ///
    /// Used once the shutdown grace period has elapsed so the
    /// transport can redeliver whatever the workers never finished.
    pub async fn force_nack_all(&self) -> usize {
        let drained: Vec<(String, Arc<dyn DeliveryHandle>)> = self
            .lock_map()
            .drain()
            .map(|(id, entry)| (id, entry.handle))
            .collect();

        let count = drained.len();
        for (id, handle) in drained {
            warn!(message_id = %id, "force-nacking unresolved message at shutdown");
            if let Err(e) = handle.nack().await {
                warn!(error = %e, message_id = %id, "failed to nack during shutdown");
            }
        }
        count
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, InFlight>> {
        // A poisoned lock only means a worker panicked between lock
        // and unlock; entries are inserted and removed atomically, so
        // the map itself is still consistent.
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MockDeliveryHandle;

    fn acking_handle() -> Arc<dyn DeliveryHandle> {
        let mut handle = MockDeliveryHandle::new();
        handle.expect_ack().times(1).returning(|| Ok(()));
        Arc::new(handle)
    }

    #[tokio::test]
    async fn tracks_and_resolves_exactly_once() {
        let tracker = AckTracker::new();
        tracker.track("m-1", acking_handle()).unwrap();
        assert_eq!(tracker.in_flight_count(), 1);

        tracker.resolve("m-1", AckOutcome::Ack).await.unwrap();
        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn rejects_duplicate_id() {
        let tracker = AckTracker::new();
        tracker
            .track("m-1", Arc::new(MockDeliveryHandle::new()))
            .unwrap();

        let err = tracker
            .track("m-1", Arc::new(MockDeliveryHandle::new()))
            .unwrap_err();
        assert_eq!(err, TrackerError::DuplicateId("m-1".to_string()));
    }

    #[tokio::test]
    async fn rejects_second_resolution() {
        let tracker = AckTracker::new();
        tracker.track("m-1", acking_handle()).unwrap();

        tracker.resolve("m-1", AckOutcome::Ack).await.unwrap();
        let err = tracker.resolve("m-1", AckOutcome::Ack).await.unwrap_err();
        assert_eq!(err, TrackerError::UnknownId("m-1".to_string()));
    }

    #[tokio::test]
    async fn rejects_resolution_of_untracked_id() {
        let tracker = AckTracker::new();
        let err = tracker
            .resolve("never-seen", AckOutcome::Nack)
            .await
            .unwrap_err();
        assert_eq!(err, TrackerError::UnknownId("never-seen".to_string()));
    }

    #[tokio::test]
    async fn nack_outcome_invokes_nack_on_handle() {
        let tracker = AckTracker::new();
        let mut handle = MockDeliveryHandle::new();
        handle.expect_nack().times(1).returning(|| Ok(()));
        tracker.track("m-1", Arc::new(handle)).unwrap();

        tracker.resolve("m-1", AckOutcome::Nack).await.unwrap();
    }

    #[tokio::test]
    async fn settlement_failure_still_removes_entry() {
        let tracker = AckTracker::new();
        let mut handle = MockDeliveryHandle::new();
        handle
            .expect_ack()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("broker gone").into()));
        tracker.track("m-1", Arc::new(handle)).unwrap();

        tracker.resolve("m-1", AckOutcome::Ack).await.unwrap();
        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn force_nack_all_drains_everything() {
        let tracker = AckTracker::new();
        for i in 0..3 {
            let mut handle = MockDeliveryHandle::new();
            handle.expect_nack().times(1).returning(|| Ok(()));
            tracker.track(&format!("m-{i}"), Arc::new(handle)).unwrap();
        }

        assert_eq!(tracker.force_nack_all().await, 3);
        assert_eq!(tracker.in_flight_count(), 0);
    }
}
