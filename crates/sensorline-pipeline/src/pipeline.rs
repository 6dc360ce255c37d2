use crate::intake::run_intake;
use crate::message::MessageSource;
use crate::queue::intake_queue;
use crate::tracker::AckTracker;
use crate::worker::WorkerPool;
use sensorline_domain::{Decoder, ReadingSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Tunables for the intake pipeline core.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bound of the intake queue; a full queue suspends the intake
    /// task and thereby the transport pull loop.
    pub queue_capacity: usize,
    /// Number of concurrent workers.
    pub worker_count: usize,
    /// Truncation limit for payload snippets in decode errors.
    pub decode_snippet_max_bytes: usize,
    /// Grace period for in-flight messages after cancellation before
    /// the rest are force-nacked.
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            worker_count: 8,
            decode_snippet_max_bytes: 256,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Wires source → intake queue → worker pool → sink and owns the
/// shutdown sequence.
///
/// Cross-message ordering is explicitly not guaranteed: two messages
/// enqueued in order may be acknowledged in the opposite order when
/// worker timing differs. The sink is expected to be idempotent per
/// reading, so this only matters to consumers that assume ordering.
pub struct IntakePipeline {
    source: Arc<dyn MessageSource>,
    sink: Arc<dyn ReadingSink>,
    config: PipelineConfig,
    tracker: Arc<AckTracker>,
}

impl IntakePipeline {
    pub fn new(
        source: Arc<dyn MessageSource>,
        sink: Arc<dyn ReadingSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            sink,
            config,
            tracker: Arc::new(AckTracker::new()),
        }
    }

    /// Shared view of the acknowledgement tracker, mainly for
    /// observability and tests.
    pub fn tracker(&self) -> Arc<AckTracker> {
        Arc::clone(&self.tracker)
    }

    /// Run until the source ends or `ctx` is cancelled.
    ///
    /// On the way out this waits up to `shutdown_timeout` for the
    /// intake task and workers to settle their in-flight messages,
    /// aborts whatever is still running once the grace period
    /// elapses, and force-nacks every message still tracked so the
    /// transport redelivers it.
    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(
            queue_capacity = self.config.queue_capacity,
            worker_count = self.config.worker_count,
            "starting intake pipeline"
        );

        let (producer, consumer) = intake_queue(self.config.queue_capacity);
        let decoder = Decoder::new(self.config.decode_snippet_max_bytes);
        let pool = WorkerPool::new(
            self.config.worker_count,
            consumer,
            decoder,
            Arc::clone(&self.sink),
            Arc::clone(&self.tracker),
        );

        let mut tasks = JoinSet::new();
        {
            let source = Arc::clone(&self.source);
            let tracker = Arc::clone(&self.tracker);
            let intake_ctx = ctx.clone();
            tasks.spawn(async move { run_intake(source, producer, tracker, intake_ctx).await });
        }
        {
            let pool_ctx = ctx.clone();
            tasks.spawn(async move { pool.run(pool_ctx).await });
        }

        let shutdown_timeout = self.config.shutdown_timeout;
        let grace = {
            let ctx = ctx.clone();
            async move {
                ctx.cancelled().await;
                tokio::time::sleep(shutdown_timeout).await;
            }
        };
        tokio::pin!(grace);

        let mut first_error: Option<anyhow::Error> = None;
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        error!(error = %e, "pipeline task failed, shutting down");
                        ctx.cancel();
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "pipeline task panicked, shutting down");
                        ctx.cancel();
                        if first_error.is_none() {
                            first_error = Some(anyhow::Error::new(e));
                        }
                    }
                },
                _ = &mut grace => {
                    warn!(
                        timeout_secs = shutdown_timeout.as_secs(),
                        "shutdown grace period elapsed, aborting pipeline tasks"
                    );
                    tasks.shutdown().await;
                    break;
                }
            }
        }

        let forced = self.tracker.force_nack_all().await;
        if forced > 0 {
            warn!(count = forced, "force-nacked unresolved messages at shutdown");
        }

        info!("intake pipeline stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
