use config::{Config, ConfigError, Environment};
use sensorline_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Intake queue bound; a full queue backpressures the transport
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Number of concurrent workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Truncation limit for malformed payloads quoted in logs
    #[serde(default = "default_decode_snippet_max_bytes")]
    pub decode_snippet_max_bytes: usize,

    /// Grace period for in-flight messages before force-nack, in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Interval between demo sensor payloads in milliseconds
    #[serde(default = "default_demo_interval_ms")]
    pub demo_interval_ms: u64,

    /// Every Nth demo payload is intentionally malformed (0 disables)
    #[serde(default = "default_demo_malformed_every")]
    pub demo_malformed_every: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

fn default_worker_count() -> usize {
    8
}

fn default_decode_snippet_max_bytes() -> usize {
    256
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_demo_interval_ms() -> u64 {
    1000
}

fn default_demo_malformed_every() -> u32 {
    5
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("SENSORLINE"))
            .build()?
            .try_deserialize()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_capacity: self.queue_capacity,
            worker_count: self.worker_count,
            decode_snippet_max_bytes: self.decode_snippet_max_bytes,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }
}
