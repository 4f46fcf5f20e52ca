//! Audit schema definitions.
//!
//! A schema describes what an audit record for a given domain looks like:
//! its fields, which of them are sensitive, which redactions apply at write
//! time, how long records are retained, and what evidence level the trail
//! must provide. Schemas are versioned; a `schema_id` (`"{name}:v{version}"`)
//! is globally unique and immutable once created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::redact::{FieldRedaction, RedactionStrategy};

/// How strong a compliance guarantee a schema's audit trail must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceLevel {
    /// Plain append-only records.
    #[default]
    Basic,
    /// Records with full input/output capture.
    Detailed,
    /// Hash-chained records suitable for regulatory review.
    Regulatory,
    /// Hash-chained and signed records suitable for forensic evidence.
    Forensic,
}

impl std::fmt::Display for EvidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Detailed => write!(f, "detailed"),
            Self::Regulatory => write!(f, "regulatory"),
            Self::Forensic => write!(f, "forensic"),
        }
    }
}

/// A single field in an audit schema.
///
/// `name` is a dotted path into the record's `input_data`/`output_data`;
/// marking a path `sensitive` masks the entire subtree at that path on
/// export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,

    /// Declared type ("string", "number", "object", ...). Informational;
    /// used by export tooling, not enforced on write.
    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Sensitive values never appear unredacted in exports.
    #[serde(default)]
    pub sensitive: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            required: true,
            description: None,
            sensitive: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn default_required() -> bool {
    true
}

fn default_active() -> bool {
    true
}

/// A versioned description of audit records for one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSchema {
    pub schema_name: String,

    /// Positive, monotonic per `schema_name`, never reused.
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Records older than this many days are removed by the retention
    /// sweep. `None` retains indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,

    #[serde(default)]
    pub evidence_level: EvidenceLevel,

    #[serde(default)]
    pub fields: Vec<FieldDefinition>,

    /// Write-time redactions applied before a record is persisted.
    #[serde(default)]
    pub field_redactions: Vec<FieldRedaction>,

    /// Fields promoted for indexed query by richer backends.
    #[serde(default)]
    pub extract_fields: Vec<String>,

    #[serde(default)]
    pub indexes: Vec<String>,

    /// Deactivation hides a schema from active listings but not from
    /// historical queries.
    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AuditSchema {
    /// Create a schema with the given name and version and all defaults.
    pub fn new(schema_name: impl Into<String>, version: u32) -> Self {
        Self {
            schema_name: schema_name.into(),
            version,
            description: None,
            retention_days: None,
            evidence_level: EvidenceLevel::default(),
            fields: Vec::new(),
            field_redactions: Vec::new(),
            extract_fields: Vec::new(),
            indexes: Vec::new(),
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Create a builder for a schema.
    pub fn builder(schema_name: impl Into<String>, version: u32) -> AuditSchemaBuilder {
        AuditSchemaBuilder {
            schema: Self::new(schema_name, version),
        }
    }

    /// Globally unique schema identity: `"{schema_name}:v{version}"`.
    pub fn schema_id(&self) -> String {
        format!("{}:v{}", self.schema_name, self.version)
    }

    /// Structural validation, applied before a schema is registered.
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.schema_name.trim().is_empty() {
            return Err(AuditError::InvalidSchema(
                "schema_name must be non-empty".to_string(),
            ));
        }
        if self.schema_name.contains(':') {
            return Err(AuditError::InvalidSchema(
                "schema_name must not contain ':'".to_string(),
            ));
        }
        if self.version == 0 {
            return Err(AuditError::InvalidSchema(
                "version must be positive".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(AuditError::InvalidSchema(
                    "field names must be non-empty".to_string(),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(AuditError::InvalidSchema(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }
        }

        for redaction in &self.field_redactions {
            if redaction.field_path.trim().is_empty() {
                return Err(AuditError::InvalidSchema(
                    "redaction field_path must be non-empty".to_string(),
                ));
            }
            if let RedactionStrategy::Truncate { length } = &redaction.strategy {
                if *length == 0 {
                    return Err(AuditError::InvalidSchema(
                        "truncate length must be positive".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Builder for creating audit schemas.
#[derive(Debug)]
pub struct AuditSchemaBuilder {
    schema: AuditSchema,
}

impl AuditSchemaBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.schema.description = Some(description.into());
        self
    }

    pub fn retention_days(mut self, days: u32) -> Self {
        self.schema.retention_days = Some(days);
        self
    }

    pub fn evidence_level(mut self, level: EvidenceLevel) -> Self {
        self.schema.evidence_level = level;
        self
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.schema.fields.push(field);
        self
    }

    pub fn redaction(mut self, field_path: impl Into<String>, strategy: RedactionStrategy) -> Self {
        self.schema.field_redactions.push(FieldRedaction {
            field_path: field_path.into(),
            strategy,
        });
        self
    }

    pub fn extract_field(mut self, name: impl Into<String>) -> Self {
        self.schema.extract_fields.push(name.into());
        self
    }

    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.schema.indexes.push(name.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.schema.active = false;
        self
    }

    pub fn build(self) -> AuditSchema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_id_format() {
        let schema = AuditSchema::new("tool_call", 3);
        assert_eq!(schema.schema_id(), "tool_call:v3");
    }

    #[test]
    fn builder_collects_fields_and_redactions() {
        let schema = AuditSchema::builder("tool_call", 1)
            .description("Tool invocations")
            .retention_days(90)
            .evidence_level(EvidenceLevel::Regulatory)
            .field(FieldDefinition::new("query", "string"))
            .field(FieldDefinition::new("api_key", "string").sensitive())
            .redaction("api_key", RedactionStrategy::Full)
            .build();

        assert_eq!(schema.retention_days, Some(90));
        assert_eq!(schema.fields.len(), 2);
        assert!(schema.fields[1].sensitive);
        assert_eq!(schema.field_redactions.len(), 1);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_version() {
        let schema = AuditSchema::new("tool_call", 0);
        assert!(matches!(
            schema.validate(),
            Err(AuditError::InvalidSchema(_))
        ));
    }

    #[test]
    fn validate_rejects_duplicate_fields() {
        let schema = AuditSchema::builder("tool_call", 1)
            .field(FieldDefinition::new("query", "string"))
            .field(FieldDefinition::new("query", "number"))
            .build();
        assert!(matches!(
            schema.validate(),
            Err(AuditError::InvalidSchema(_))
        ));
    }

    #[test]
    fn serde_round_trip_preserves_redactions() {
        let schema = AuditSchema::builder("payment", 2)
            .redaction("card.number", RedactionStrategy::Partial { show_last: 4 })
            .redaction("card.cvv", RedactionStrategy::Full)
            .build();

        let json = serde_json::to_string(&schema).unwrap();
        let back: AuditSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back.schema_id(), "payment:v2");
        assert_eq!(back.field_redactions.len(), 2);
        assert_eq!(
            back.field_redactions[0].strategy,
            RedactionStrategy::Partial { show_last: 4 }
        );
    }
}
