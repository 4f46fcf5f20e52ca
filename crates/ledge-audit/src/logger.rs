//! Audit logger facade and the batching writer behind it.
//!
//! The logger is an explicitly constructed, dependency-injected instance:
//! the runtime container owns its lifecycle and must call
//! [`AuditLogger::shutdown`] for guaranteed durability. `log_event` is
//! fire-and-forget — it redacts, builds the record, and enqueues it on a
//! bounded channel; a dedicated worker drains the queue into durable batch
//! appends.
//!
//! Enqueue failures (unknown schema, full queue under the `reject` policy)
//! are counted and logged internally, never propagated: the request path
//! must not pay for audit storage.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use ledge_core::{AuditConfig, BackpressurePolicy, CallerType, OperationStatus, OperationType, PolicyDecision};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{AuditBackend, RecordStream};
use crate::error::AuditError;
use crate::integrity::IntegrityResult;
use crate::jsonl::JsonlBackend;
use crate::query::RecordFilter;
use crate::record::AuditRecord;
use crate::redact::redact_in_place;
use crate::registry::SchemaRegistry;
use crate::retention::RetentionReport;
use crate::schema::AuditSchema;

/// Schema used when a caller logs without naming one.
pub const DEFAULT_SCHEMA_NAME: &str = "operation";

/// One loggable invocation, as handed over by the execution/policy layers.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub caller_type: CallerType,
    pub operation_type: OperationType,
    pub operation_name: String,
    pub input_params: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub duration_ms: Option<u64>,
    /// Owning schema; `None` falls back to [`DEFAULT_SCHEMA_NAME`].
    pub schema_name: Option<String>,
    pub policy_decision: PolicyDecision,
    pub policy_reason: Option<String>,
    pub policies_evaluated: Option<Vec<String>>,
    pub operation_status: OperationStatus,
    pub error: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
    pub business_context: serde_json::Value,
}

impl LogEvent {
    pub fn new(
        caller_type: CallerType,
        operation_type: OperationType,
        operation_name: impl Into<String>,
    ) -> Self {
        Self {
            caller_type,
            operation_type,
            operation_name: operation_name.into(),
            input_params: serde_json::Value::Null,
            output: None,
            duration_ms: None,
            schema_name: None,
            policy_decision: PolicyDecision::NotApplicable,
            policy_reason: None,
            policies_evaluated: None,
            operation_status: OperationStatus::Success,
            error: None,
            user_id: None,
            session_id: None,
            trace_id: None,
            business_context: serde_json::Value::Null,
        }
    }

    pub fn input_params(mut self, params: serde_json::Value) -> Self {
        self.input_params = params;
        self
    }

    pub fn output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn duration_ms(mut self, duration: u64) -> Self {
        self.duration_ms = Some(duration);
        self
    }

    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.schema_name = Some(name.into());
        self
    }

    pub fn decision(mut self, decision: PolicyDecision, reason: Option<String>) -> Self {
        self.policy_decision = decision;
        self.policy_reason = reason;
        self
    }

    pub fn policies_evaluated(mut self, policies: Vec<String>) -> Self {
        self.policies_evaluated = Some(policies);
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.operation_status = OperationStatus::Error;
        self.error = Some(error.into());
        self
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn trace_id(mut self, id: impl Into<String>) -> Self {
        self.trace_id = Some(id.into());
        self
    }

    pub fn business_context(mut self, context: serde_json::Value) -> Self {
        self.business_context = context;
        self
    }
}

/// Writer counters, readable at any time.
#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    write_errors: AtomicU64,
}

/// Snapshot of the writer counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerStats {
    /// Records accepted onto the queue.
    pub enqueued: u64,
    /// Records dropped before the queue (full queue, unknown schema,
    /// closed logger).
    pub dropped: u64,
    /// Records durably written.
    pub written: u64,
    /// Records lost to write failures after retries.
    pub write_errors: u64,
}

struct ActiveState {
    backend: Arc<dyn AuditBackend>,
    registry: Arc<SchemaRegistry>,
    tx: StdMutex<Option<mpsc::Sender<AuditRecord>>>,
    worker: StdMutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
    shut_down: AtomicBool,
}

impl Drop for ActiveState {
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::SeqCst) {
            // Safety net only; durability requires an explicit shutdown().
            tracing::warn!("audit logger dropped without shutdown(); queued records may be lost");
        }
    }
}

/// The main audit logger.
pub struct AuditLogger {
    config: AuditConfig,
    state: Option<ActiveState>,
}

impl AuditLogger {
    /// Open a logger over the JSONL backend at `config.directory`.
    pub async fn open(config: AuditConfig) -> Result<Self, AuditError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let backend = Arc::new(JsonlBackend::open(&config.directory).await?);
        Self::with_backend(config, backend).await
    }

    /// Create a logger over a custom backend.
    pub async fn with_backend(
        config: AuditConfig,
        backend: Arc<dyn AuditBackend>,
    ) -> Result<Self, AuditError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let registry = Arc::new(SchemaRegistry::load(Arc::clone(&backend)).await?);

        // Callers that log without a schema land on a baseline one.
        if registry.get_schema(DEFAULT_SCHEMA_NAME, None).is_none() {
            registry
                .create_schema(
                    AuditSchema::builder(DEFAULT_SCHEMA_NAME, 1)
                        .description("Baseline schema for uncategorized operations")
                        .build(),
                )
                .await?;
        }

        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&backend),
            config.clone(),
            Arc::clone(&counters),
        ));

        Ok(Self {
            config,
            state: Some(ActiveState {
                backend,
                registry,
                tx: StdMutex::new(Some(tx)),
                worker: StdMutex::new(Some(worker)),
                counters,
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Create a disabled (no-op) logger.
    pub fn disabled() -> Self {
        Self {
            config: AuditConfig {
                enabled: false,
                ..Default::default()
            },
            state: None,
        }
    }

    /// Check if logging is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.state.is_some()
    }

    /// The schema registry backing this logger.
    pub fn registry(&self) -> Option<Arc<SchemaRegistry>> {
        self.state.as_ref().map(|s| Arc::clone(&s.registry))
    }

    /// Register a new schema version.
    pub async fn create_schema(&self, schema: AuditSchema) -> Result<(), AuditError> {
        match self.state {
            Some(ref state) => state.registry.create_schema(schema).await,
            None => Ok(()),
        }
    }

    /// Log one operation invocation. Fire-and-forget: malformed input and
    /// queue pressure are handled internally and never reach the caller.
    pub async fn log_event(&self, event: LogEvent) {
        let Some(ref state) = self.state else {
            return;
        };

        let schema_name = event
            .schema_name
            .clone()
            .unwrap_or_else(|| DEFAULT_SCHEMA_NAME.to_string());

        let Some(schema) = state.registry.get_schema(&schema_name, None) else {
            state.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                schema = %schema_name,
                operation = %event.operation_name,
                "audit event dropped: unknown schema"
            );
            return;
        };

        // Declared redactions happen before the value ever leaves this
        // function; what reaches the queue is already safe to persist.
        let mut input_data = event.input_params;
        redact_in_place(&mut input_data, &schema.field_redactions);
        let output_data = event.output.map(|mut output| {
            redact_in_place(&mut output, &schema.field_redactions);
            output
        });

        let mut builder = AuditRecord::builder(
            event.operation_type,
            event.operation_name,
            event.caller_type,
        )
        .schema(schema.schema_name.clone(), schema.version)
        .input_data(input_data)
        .status(event.operation_status)
        .policy_decision(event.policy_decision)
        .business_context(event.business_context);

        if let Some(output) = output_data {
            builder = builder.output_data(output);
        }
        if let Some(duration) = event.duration_ms {
            builder = builder.duration_ms(duration);
        }
        if let Some(reason) = event.policy_reason {
            builder = builder.policy_reason(reason);
        }
        if let Some(policies) = event.policies_evaluated {
            builder = builder.policies_evaluated(policies);
        }
        if let Some(error) = event.error {
            builder = builder.error(error);
        }
        if let Some(user) = event.user_id {
            builder = builder.user_id(user);
        }
        if let Some(session) = event.session_id {
            builder = builder.session_id(session);
        }
        if let Some(trace) = event.trace_id {
            builder = builder.trace_id(trace);
        }

        let record = builder.build();

        tracing::debug!(
            schema = %record.schema_name,
            operation = %record.operation_name,
            caller = %record.caller_type,
            decision = %record.policy_decision,
            status = %record.operation_status,
            "audit event"
        );

        let tx = {
            let guard = state.tx.lock().expect("audit sender poisoned");
            guard.clone()
        };
        let Some(tx) = tx else {
            state.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("audit event dropped: logger is shut down");
            return;
        };

        match self.config.backpressure {
            BackpressurePolicy::Reject => match tx.try_send(record) {
                Ok(()) => {
                    state.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    state.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("audit event dropped: queue full");
                }
            },
            BackpressurePolicy::Block => match tx.send(record).await {
                Ok(()) => {
                    state.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    state.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("audit event dropped: logger is shut down");
                }
            },
        }
    }

    /// Stop accepting events, drain the queue, flush, and close the backend.
    ///
    /// Bounded by `config.shutdown_timeout_ms`. On timeout the flush still
    /// completes in the background; the error only tells the caller it was
    /// not observed to finish.
    pub async fn shutdown(&self) -> Result<(), AuditError> {
        self.shutdown_with_timeout(Duration::from_millis(self.config.shutdown_timeout_ms))
            .await
    }

    /// [`Self::shutdown`] with an explicit wait bound.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), AuditError> {
        let Some(ref state) = self.state else {
            return Ok(());
        };
        state.shut_down.store(true, Ordering::SeqCst);

        // Dropping the sender closes the channel; the worker drains whatever
        // remains and exits.
        {
            let mut guard = state.tx.lock().expect("audit sender poisoned");
            guard.take();
        }
        let worker = {
            let mut guard = state.worker.lock().expect("audit worker poisoned");
            guard.take()
        };
        let Some(worker) = worker else {
            // A previous shutdown already drained.
            return Ok(());
        };

        match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(())) => state.backend.close().await,
            Ok(Err(join_err)) => Err(AuditError::Storage(format!(
                "audit worker panicked: {join_err}"
            ))),
            Err(_) => {
                tracing::warn!(
                    ?timeout,
                    "audit shutdown timed out waiting for drain; flush continues in background"
                );
                Err(AuditError::ShutdownTimeout(timeout))
            }
        }
    }

    /// Snapshot the writer counters.
    pub fn stats(&self) -> LoggerStats {
        match self.state {
            Some(ref state) => LoggerStats {
                enqueued: state.counters.enqueued.load(Ordering::Relaxed),
                dropped: state.counters.dropped.load(Ordering::Relaxed),
                written: state.counters.written.load(Ordering::Relaxed),
                write_errors: state.counters.write_errors.load(Ordering::Relaxed),
            },
            None => LoggerStats {
                enqueued: 0,
                dropped: 0,
                written: 0,
                write_errors: 0,
            },
        }
    }

    /// Stream records matching the filter.
    pub async fn query_records(&self, filter: RecordFilter) -> Result<RecordStream, AuditError> {
        match self.state {
            Some(ref state) => state.backend.query_records(filter).await,
            None => Ok(Box::pin(futures::stream::empty())),
        }
    }

    /// Fetch one record by id.
    pub async fn get_record(&self, record_id: &str) -> Result<Option<AuditRecord>, AuditError> {
        match self.state {
            Some(ref state) => state.backend.get_record(record_id).await,
            None => Ok(None),
        }
    }

    /// Walk the hash chain between two record ids.
    pub async fn verify_integrity(
        &self,
        start_id: &str,
        end_id: &str,
    ) -> Result<IntegrityResult, AuditError> {
        match self.state {
            Some(ref state) => state.backend.verify_integrity(start_id, end_id).await,
            None => Ok(IntegrityResult::empty()),
        }
    }

    /// Run a retention sweep.
    pub async fn apply_retention(&self, dry_run: bool) -> Result<RetentionReport, AuditError> {
        match self.state {
            Some(ref state) => state.backend.apply_retention(dry_run).await,
            None => Ok(RetentionReport::new(dry_run)),
        }
    }
}

/// Background worker: drain the queue, batch, flush.
async fn run_worker(
    mut rx: mpsc::Receiver<AuditRecord>,
    backend: Arc<dyn AuditBackend>,
    config: AuditConfig,
    counters: Arc<Counters>,
) {
    let batch_max = config.batch_max_records.max(1);
    let mut batch: Vec<AuditRecord> = Vec::with_capacity(batch_max);
    let mut ticker =
        tokio::time::interval(Duration::from_millis(config.flush_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(record) => {
                    batch.push(record);
                    if batch.len() >= batch_max {
                        flush_batch(&*backend, &mut batch, &config, &counters).await;
                    }
                }
                // Channel closed: shutdown drain.
                None => break,
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush_batch(&*backend, &mut batch, &config, &counters).await;
                }
            }
        }
    }

    if !batch.is_empty() {
        flush_batch(&*backend, &mut batch, &config, &counters).await;
    }
}

async fn flush_batch(
    backend: &dyn AuditBackend,
    batch: &mut Vec<AuditRecord>,
    config: &AuditConfig,
    counters: &Counters,
) {
    let records = std::mem::take(batch);
    let count = records.len() as u64;

    let mut attempt = 0u32;
    loop {
        match backend.write_batch(records.clone()).await {
            Ok(_) => {
                counters.written.fetch_add(count, Ordering::Relaxed);
                return;
            }
            Err(e) if attempt < config.write_retries => {
                attempt += 1;
                tracing::warn!(
                    error = %e,
                    attempt,
                    "audit batch write failed; retrying"
                );
                tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
            }
            Err(e) => {
                // Degraded, not fatal: the process keeps serving.
                counters.write_errors.fetch_add(count, Ordering::Relaxed);
                tracing::error!(
                    error = %e,
                    records = count,
                    "audit batch dropped after retries"
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use async_trait::async_trait;

    #[tokio::test]
    async fn disabled_logger_accepts_everything() {
        let logger = AuditLogger::disabled();
        assert!(!logger.is_enabled());

        logger
            .log_event(LogEvent::new(CallerType::Cli, OperationType::Tool, "noop"))
            .await;
        logger.shutdown().await.unwrap();
        assert_eq!(logger.stats().enqueued, 0);
    }

    #[tokio::test]
    async fn events_are_written_after_shutdown() {
        let config = AuditConfig {
            enabled: true,
            ..Default::default()
        };
        let backend = Arc::new(NullBackend::new());
        let logger = AuditLogger::with_backend(config, backend).await.unwrap();

        for i in 0..5 {
            logger
                .log_event(
                    LogEvent::new(CallerType::Http, OperationType::Tool, format!("op_{i}"))
                        .input_params(serde_json::json!({"i": i})),
                )
                .await;
        }
        logger.shutdown().await.unwrap();

        let stats = logger.stats();
        assert_eq!(stats.enqueued, 5);
        assert_eq!(stats.written, 5);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn events_after_shutdown_are_dropped_not_errored() {
        let config = AuditConfig {
            enabled: true,
            ..Default::default()
        };
        let logger = AuditLogger::with_backend(config, Arc::new(NullBackend::new()))
            .await
            .unwrap();
        logger.shutdown().await.unwrap();

        logger
            .log_event(LogEvent::new(CallerType::Cli, OperationType::Tool, "late"))
            .await;
        assert_eq!(logger.stats().dropped, 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let config = AuditConfig {
            enabled: true,
            ..Default::default()
        };
        let logger = AuditLogger::with_backend(config, Arc::new(NullBackend::new()))
            .await
            .unwrap();
        logger.shutdown().await.unwrap();
        logger.shutdown().await.unwrap();
    }

    /// Backend that fails a configurable number of times before accepting.
    struct FlakyBackend {
        failures_left: StdMutex<u32>,
        inner: NullBackend,
    }

    #[async_trait]
    impl AuditBackend for FlakyBackend {
        async fn create_schema(&self, schema: AuditSchema) -> Result<(), AuditError> {
            self.inner.create_schema(schema).await
        }

        async fn get_schema(
            &self,
            name: &str,
            version: Option<u32>,
        ) -> Result<Option<AuditSchema>, AuditError> {
            self.inner.get_schema(name, version).await
        }

        async fn list_schemas(&self, active_only: bool) -> Result<Vec<AuditSchema>, AuditError> {
            self.inner.list_schemas(active_only).await
        }

        async fn deactivate_schema(&self, name: &str, version: u32) -> Result<(), AuditError> {
            self.inner.deactivate_schema(name, version).await
        }

        async fn write_batch(
            &self,
            records: Vec<AuditRecord>,
        ) -> Result<Vec<String>, AuditError> {
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(AuditError::Storage("disk on fire".to_string()));
                }
            }
            self.inner.write_batch(records).await
        }

        async fn get_record(&self, record_id: &str) -> Result<Option<AuditRecord>, AuditError> {
            self.inner.get_record(record_id).await
        }

        async fn query_records(&self, filter: RecordFilter) -> Result<RecordStream, AuditError> {
            self.inner.query_records(filter).await
        }

        async fn verify_integrity(
            &self,
            start_id: &str,
            end_id: &str,
        ) -> Result<IntegrityResult, AuditError> {
            self.inner.verify_integrity(start_id, end_id).await
        }

        async fn apply_retention(&self, dry_run: bool) -> Result<RetentionReport, AuditError> {
            self.inner.apply_retention(dry_run).await
        }

        async fn close(&self) -> Result<(), AuditError> {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn transient_write_failures_are_retried() {
        let config = AuditConfig {
            enabled: true,
            write_retries: 3,
            ..Default::default()
        };
        let backend = Arc::new(FlakyBackend {
            failures_left: StdMutex::new(2),
            inner: NullBackend::new(),
        });
        let logger = AuditLogger::with_backend(config, backend).await.unwrap();

        logger
            .log_event(LogEvent::new(CallerType::Cli, OperationType::Tool, "retry_me"))
            .await;
        logger.shutdown().await.unwrap();

        let stats = logger.stats();
        assert_eq!(stats.written, 1);
        assert_eq!(stats.write_errors, 0);
    }

    #[tokio::test]
    async fn sustained_write_failure_is_degraded_not_fatal() {
        let config = AuditConfig {
            enabled: true,
            write_retries: 1,
            ..Default::default()
        };
        let backend = Arc::new(FlakyBackend {
            failures_left: StdMutex::new(10),
            inner: NullBackend::new(),
        });
        let logger = AuditLogger::with_backend(config, backend).await.unwrap();

        logger
            .log_event(LogEvent::new(CallerType::Cli, OperationType::Tool, "doomed"))
            .await;
        logger.shutdown().await.unwrap();

        let stats = logger.stats();
        assert_eq!(stats.written, 0);
        assert_eq!(stats.write_errors, 1);
    }
}
