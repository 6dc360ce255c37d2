mod config;
mod demo;
mod telemetry;

use config::ServiceConfig;
use demo::{DemoSource, DemoSourceConfig, LogSink};
use sensorline_pipeline::IntakePipeline;
use sensorline_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{init_telemetry, TelemetryConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig {
        log_level: config.log_level.clone(),
    }) {
        eprintln!("Failed to initialize telemetry: {e}");
        std::process::exit(1);
    }

    info!(
        queue_capacity = config.queue_capacity,
        worker_count = config.worker_count,
        shutdown_timeout_secs = config.shutdown_timeout_secs,
        "starting sensorline"
    );

    let source = Arc::new(DemoSource::new(DemoSourceConfig {
        interval: Duration::from_millis(config.demo_interval_ms),
        malformed_every: config.demo_malformed_every,
    }));
    let sink = Arc::new(LogSink::new());
    let pipeline = IntakePipeline::new(source, sink, config.pipeline_config());

    let runner = Runner::new()
        .with_process("intake_pipeline", move |ctx| async move {
            pipeline.run(ctx).await
        })
        .with_closer(|| async move {
            info!("sensorline stopped");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    if let Err(e) = runner.run().await {
        error!(error = %e, "sensorline exited with error");
        std::process::exit(1);
    }
}
