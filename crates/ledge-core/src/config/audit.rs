//! Audit logging configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the audit logging engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Directory holding the audit log files (`records.jsonl`,
    /// `schemas.jsonl`).
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Capacity of the in-memory queue between callers and the writer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum records accumulated before a batch is flushed.
    #[serde(default = "default_batch_max_records")]
    pub batch_max_records: usize,

    /// Maximum time in milliseconds a record waits before its batch is
    /// flushed.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// What to do when the queue is full.
    #[serde(default)]
    pub backpressure: BackpressurePolicy,

    /// How many times a failed batch write is retried before the batch is
    /// dropped and counted.
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,

    /// How long `shutdown()` waits for the final drain+flush, in
    /// milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// Policy applied when the audit queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Drop the new record, count it, and log a warning. Keeps `log_event`
    /// suspension-free.
    #[default]
    Reject,
    /// Wait for queue capacity. The caller trades latency for completeness.
    Block,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            directory: default_directory(),
            queue_capacity: default_queue_capacity(),
            batch_max_records: default_batch_max_records(),
            flush_interval_ms: default_flush_interval_ms(),
            backpressure: BackpressurePolicy::default(),
            write_retries: default_write_retries(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_directory() -> String {
    "audit".to_string()
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_batch_max_records() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    50
}

fn default_write_retries() -> u32 {
    3
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}
