//! Two ticking processes under one runner, stopped with Ctrl+C.
//!
//! Run with: cargo run --example basic_runner

use sensorline_runner::Runner;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runner = Runner::new()
        .with_process("counter", |ctx| async move {
            let mut counter = 0u64;
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        tracing::info!(counter, "counter stopping");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        counter += 1;
                        tracing::info!(counter, "tick");
                    }
                }
            }
            Ok(())
        })
        .with_process("heartbeat", |ctx| async move {
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        tracing::info!("heartbeat stopping");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(2)) => {
                        tracing::info!("still running");
                    }
                }
            }
            Ok(())
        })
        .with_closer(|| async move {
            tracing::info!("flushing before exit");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(5));

    if let Err(e) = runner.run().await {
        tracing::error!(error = %e, "runner exited with error");
        std::process::exit(1);
    }
}
