//! The canonical unit of record.
//!
//! An [`AuditRecord`] captures one invocation of a served operation: who
//! called it, what (redacted) parameters it saw, what the policy engine
//! decided, and what happened. Records are immutable after write; the
//! `record_id`, `prev_hash`, `record_hash`, and `signature` fields are
//! assigned by the backend at append time.

use chrono::{DateTime, Utc};
use ledge_core::{CallerType, OperationStatus, OperationType, PolicyDecision};
use serde::{Deserialize, Serialize};

/// An audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Globally unique id, generated at write time.
    #[serde(default)]
    pub record_id: String,

    /// When the operation was logged (UTC).
    pub timestamp: DateTime<Utc>,

    /// Owning schema name.
    pub schema_name: String,

    /// Owning schema version.
    pub schema_version: u32,

    pub operation_type: OperationType,

    /// Name of the tool/resource/prompt that was invoked.
    pub operation_name: String,

    pub caller_type: CallerType,

    /// Input parameters, already redacted per the schema's declared
    /// redactions.
    pub input_data: serde_json::Value,

    /// Operation output, already redacted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    // ===== Correlation keys =====
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    pub operation_status: OperationStatus,

    /// Error message (if `operation_status` is `error`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // ===== Policy outcome (recorded, not evaluated here) =====
    #[serde(default)]
    pub policy_decision: PolicyDecision,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies_evaluated: Option<Vec<String>>,

    /// Free-form caller-supplied context.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub business_context: serde_json::Value,

    // ===== Tamper evidence, assigned at write time =====
    /// Hash of the immediately preceding record in the same log.
    #[serde(default)]
    pub prev_hash: String,

    /// Hash over all other fields plus `prev_hash`. Never mutated.
    #[serde(default)]
    pub record_hash: String,

    /// Signature over `record_hash` for forensic-level schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AuditRecord {
    /// Create a builder with the required fields.
    pub fn builder(
        operation_type: OperationType,
        operation_name: impl Into<String>,
        caller_type: CallerType,
    ) -> AuditRecordBuilder {
        AuditRecordBuilder {
            record: AuditRecord {
                record_id: String::new(),
                timestamp: Utc::now(),
                schema_name: String::new(),
                schema_version: 0,
                operation_type,
                operation_name: operation_name.into(),
                caller_type,
                input_data: serde_json::Value::Null,
                output_data: None,
                duration_ms: None,
                user_id: None,
                session_id: None,
                trace_id: None,
                operation_status: OperationStatus::Success,
                error: None,
                policy_decision: PolicyDecision::NotApplicable,
                policy_reason: None,
                policies_evaluated: None,
                business_context: serde_json::Value::Null,
                prev_hash: String::new(),
                record_hash: String::new(),
                signature: None,
            },
        }
    }

    /// Format the record as a human-readable log line.
    ///
    /// Format: `[timestamp] TYPE name caller=... status=... decision=...`
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "[{}] {} {} caller={} status={} decision={}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.operation_type,
            self.operation_name,
            self.caller_type,
            self.operation_status,
            self.policy_decision,
        );

        if let Some(duration) = self.duration_ms {
            line.push_str(&format!(" duration_ms={duration}"));
        }

        if let Some(ref user) = self.user_id {
            line.push_str(&format!(" user={user}"));
        }

        if let Some(ref error) = self.error {
            line.push_str(&format!(" error=\"{}\"", error.replace('"', "'")));
        }

        if !self.record_id.is_empty() {
            line.push_str(&format!(" id={}", self.record_id));
        }

        line
    }
}

/// Builder for creating audit records.
#[derive(Debug)]
pub struct AuditRecordBuilder {
    record: AuditRecord,
}

impl AuditRecordBuilder {
    pub fn schema(mut self, name: impl Into<String>, version: u32) -> Self {
        self.record.schema_name = name.into();
        self.record.schema_version = version;
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.record.timestamp = timestamp;
        self
    }

    pub fn input_data(mut self, data: serde_json::Value) -> Self {
        self.record.input_data = data;
        self
    }

    pub fn output_data(mut self, data: serde_json::Value) -> Self {
        self.record.output_data = Some(data);
        self
    }

    pub fn duration_ms(mut self, duration: u64) -> Self {
        self.record.duration_ms = Some(duration);
        self
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.record.user_id = Some(id.into());
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.record.session_id = Some(id.into());
        self
    }

    pub fn trace_id(mut self, id: impl Into<String>) -> Self {
        self.record.trace_id = Some(id.into());
        self
    }

    pub fn status(mut self, status: OperationStatus) -> Self {
        self.record.operation_status = status;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.record.error = Some(error.into());
        self.record.operation_status = OperationStatus::Error;
        self
    }

    pub fn policy_decision(mut self, decision: PolicyDecision) -> Self {
        self.record.policy_decision = decision;
        self
    }

    pub fn policy_reason(mut self, reason: impl Into<String>) -> Self {
        self.record.policy_reason = Some(reason.into());
        self
    }

    pub fn policies_evaluated(mut self, policies: Vec<String>) -> Self {
        self.record.policies_evaluated = Some(policies);
        self
    }

    pub fn business_context(mut self, context: serde_json::Value) -> Self {
        self.record.business_context = context;
        self
    }

    pub fn build(self) -> AuditRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_required_and_optional_fields() {
        let record = AuditRecord::builder(OperationType::Tool, "run_query", CallerType::Http)
            .schema("tool_call", 1)
            .input_data(json!({"sql": "SELECT 1"}))
            .duration_ms(12)
            .user_id("alice")
            .policy_decision(PolicyDecision::Allow)
            .build();

        assert_eq!(record.operation_name, "run_query");
        assert_eq!(record.schema_version, 1);
        assert_eq!(record.duration_ms, Some(12));
        assert_eq!(record.policy_decision, PolicyDecision::Allow);
        assert_eq!(record.operation_status, OperationStatus::Success);
        assert!(record.record_id.is_empty());
    }

    #[test]
    fn error_setter_flips_status() {
        let record = AuditRecord::builder(OperationType::Tool, "run_query", CallerType::Cli)
            .error("connection refused")
            .build();

        assert_eq!(record.operation_status, OperationStatus::Error);
        assert_eq!(record.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn to_log_line_contains_core_fields() {
        let record = AuditRecord::builder(OperationType::Prompt, "summarize", CallerType::Stdio)
            .schema("prompt_call", 2)
            .duration_ms(7)
            .user_id("bob")
            .build();

        let line = record.to_log_line();
        assert!(line.contains("prompt"));
        assert!(line.contains("summarize"));
        assert!(line.contains("caller=stdio"));
        assert!(line.contains("duration_ms=7"));
        assert!(line.contains("user=bob"));
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let record = AuditRecord::builder(OperationType::Tool, "t", CallerType::System)
            .schema("s", 1)
            .build();
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("output_data"));
        assert!(!obj.contains_key("error"));
        assert!(!obj.contains_key("signature"));
        assert!(!obj.contains_key("business_context"));
    }
}
