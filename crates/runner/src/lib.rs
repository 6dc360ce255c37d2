//! Concurrent process runner with graceful shutdown.
//!
//! Long-running loops register as named processes sharing one
//! `CancellationToken`. The runner cancels everything when a process
//! fails, when one panics, or when SIGTERM/ctrl-c arrives, then runs
//! the registered closers under a timeout. `run` returns the first
//! process error instead of exiting, so the binary owns the exit
//! code.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type ProcessFn =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send>;
type CloserFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

pub struct Runner {
    processes: Vec<(String, ProcessFn)>,
    closers: Vec<CloserFn>,
    closer_timeout: Duration,
    token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            token: CancellationToken::new(),
        }
    }

    /// Register a named long-running process.
    ///
    /// Processes run concurrently; each receives the shared
    /// cancellation token and is expected to return promptly once it
    /// is cancelled.
    pub fn with_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Register a cleanup function, run after every process has
    /// stopped regardless of outcome.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    /// Overall timeout for the closers. Defaults to 10 seconds.
    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned cancellation token instead of the
    /// runner's own.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Run all processes until they finish or shutdown is triggered,
    /// then run the closers. Returns the first process failure, if
    /// any.
    pub async fn run(self) -> anyhow::Result<()> {
        let token = self.token;
        let mut processes = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            processes.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_listener(token.clone());

        let mut first_error: Option<anyhow::Error> = None;
        while let Some(joined) = processes.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "process finished");
                }
                Ok((name, Err(e))) => {
                    error!(process = %name, error = %e, "process failed, shutting down");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    token.cancel();
                }
                Err(e) => {
                    error!(error = %e, "process panicked, shutting down");
                    if first_error.is_none() {
                        first_error = Some(anyhow::Error::new(e));
                    }
                    token.cancel();
                }
            }
        }

        if !self.closers.is_empty() {
            info!(
                timeout_secs = self.closer_timeout.as_secs(),
                "running closers"
            );
            if tokio::time::timeout(self.closer_timeout, run_closers(self.closers))
                .await
                .is_err()
            {
                error!("closers timed out");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn spawn_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "signal listener failed");
                return;
            }
            info!("received ctrl-c, shutting down");
        }
        token.cancel();
    });
}

async fn run_closers(closers: Vec<CloserFn>) {
    let mut set = JoinSet::new();
    for closer in closers {
        set.spawn(async move { closer().await });
    }
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => debug!("closer finished"),
            Ok(Err(e)) => error!(error = %e, "closer failed"),
            Err(e) => error!(error = %e, "closer panicked"),
        }
    }
}
