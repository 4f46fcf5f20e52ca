//! CLI command implementations for the Ledge audit engine.

pub mod export;
pub mod retention;
pub mod schema;
pub mod verify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use ledge_audit::{JsonlBackend, SchemaRegistry};
use ledge_core::{LedgeConfig, OperationStatus, OperationType, PolicyDecision};

/// Resolve the audit directory: explicit flag, then ledge.yaml, then the
/// default.
pub fn resolve_audit_dir(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if Path::new("ledge.yaml").exists() {
        let config = LedgeConfig::from_cwd().context("failed to load ledge.yaml")?;
        return Ok(PathBuf::from(config.audit.directory));
    }
    Ok(PathBuf::from("audit"))
}

/// Open the backend and a hydrated registry for read/admin commands.
pub async fn open_store(
    dir: &Path,
) -> anyhow::Result<(Arc<JsonlBackend>, Arc<SchemaRegistry>)> {
    let backend = Arc::new(
        JsonlBackend::open(dir)
            .await
            .with_context(|| format!("failed to open audit store at {}", dir.display()))?,
    );
    let dyn_backend: Arc<dyn ledge_audit::AuditBackend> = backend.clone();
    let registry = Arc::new(SchemaRegistry::load(dyn_backend).await?);
    Ok((backend, registry))
}

pub fn parse_operation_type(s: &str) -> anyhow::Result<OperationType> {
    match s.to_ascii_lowercase().as_str() {
        "tool" => Ok(OperationType::Tool),
        "resource" => Ok(OperationType::Resource),
        "prompt" => Ok(OperationType::Prompt),
        other => anyhow::bail!("unknown operation type '{other}' (tool|resource|prompt)"),
    }
}

pub fn parse_status(s: &str) -> anyhow::Result<OperationStatus> {
    match s.to_ascii_lowercase().as_str() {
        "success" => Ok(OperationStatus::Success),
        "error" => Ok(OperationStatus::Error),
        other => anyhow::bail!("unknown status '{other}' (success|error)"),
    }
}

pub fn parse_decision(s: &str) -> anyhow::Result<PolicyDecision> {
    match s.to_ascii_lowercase().as_str() {
        "allow" => Ok(PolicyDecision::Allow),
        "deny" => Ok(PolicyDecision::Deny),
        "warn" => Ok(PolicyDecision::Warn),
        "n/a" | "na" => Ok(PolicyDecision::NotApplicable),
        other => anyhow::bail!("unknown decision '{other}' (allow|deny|warn|n/a)"),
    }
}

pub fn parse_time(s: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("'{s}' is not an RFC3339 timestamp"))
}
