//! # ledge-audit
//!
//! Tamper-evident audit logging for the Ledge MCP server.
//!
//! This crate provides functionality for:
//! - Recording every served operation (tool / resource / prompt) with the
//!   caller, redacted parameters, policy decision, and outcome
//! - Versioned audit schemas with field-level redaction and retention rules
//! - A SHA-256 hash chain over the log for tamper evidence, with optional
//!   signatures for forensic evidence levels
//! - A batching background writer that keeps `log_event` off the I/O path
//! - Memory-bounded streaming queries and CSV/JSON/JSONL export
//! - Schema-driven retention sweeps with a dry-run mode
//!
//! ## Redaction strategies
//!
//! | Strategy | Effect |
//! |----------|--------|
//! | `full` | replace the whole value with `[REDACTED]` |
//! | `partial` | mask all but the last `show_last` characters |
//! | `hash` | replace with a one-way SHA-256 digest |
//! | `truncate` | cut to `length` characters, mark truncated |
//! | `email` | mask the local part, keep the domain |
//! | `preserve_type` | type-appropriate empty value |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ledge_audit::{AuditLogger, AuditSchema, LogEvent};
//! use ledge_core::{AuditConfig, CallerType, OperationType, PolicyDecision};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Open a logger over the JSONL backend.
//! let config = AuditConfig::default();
//! let logger = AuditLogger::open(config).await?;
//!
//! // Register a schema for tool calls, keep 90 days.
//! logger
//!     .create_schema(AuditSchema::builder("tool_call", 1).retention_days(90).build())
//!     .await?;
//!
//! // Fire-and-forget from the request path.
//! logger
//!     .log_event(
//!         LogEvent::new(CallerType::Http, OperationType::Tool, "listOrders")
//!             .schema("tool_call")
//!             .input_params(serde_json::json!({"tenant": "client_a"}))
//!             .decision(PolicyDecision::Allow, None)
//!             .duration_ms(15),
//!     )
//!     .await;
//!
//! // Durability requires an explicit shutdown.
//! logger.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod export;
pub mod integrity;
pub mod jsonl;
pub mod logger;
pub mod query;
pub mod record;
pub mod redact;
pub mod registry;
pub mod retention;
pub mod schema;

pub use backend::{AuditBackend, NullBackend, RecordStream};
pub use error::AuditError;
pub use export::{ExportFormat, ExportSummary, Exporter};
pub use integrity::{
    BreakKind, ChainBreak, IntegrityResult, SignatureProvider, GENESIS_HASH,
};
pub use jsonl::JsonlBackend;
pub use logger::{AuditLogger, LogEvent, LoggerStats, DEFAULT_SCHEMA_NAME};
pub use query::RecordFilter;
pub use record::{AuditRecord, AuditRecordBuilder};
pub use redact::{FieldRedaction, RedactionStrategy, REDACTION_MARKER};
pub use registry::SchemaRegistry;
pub use retention::RetentionReport;
pub use schema::{AuditSchema, AuditSchemaBuilder, EvidenceLevel, FieldDefinition};
