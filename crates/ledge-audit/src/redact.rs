//! Field-level redaction.
//!
//! Two independent mechanisms:
//!
//! 1. **Declared redaction** ([`redact_in_place`]): a schema's
//!    [`FieldRedaction`]s are applied to `input_data`/`output_data` before
//!    the record is ever persisted. This cannot be undone later.
//! 2. **Sensitive-field masking** ([`mask_sensitive`]): applied at export
//!    time against the schema's [`FieldDefinition`]s; the stored record is
//!    untouched, so export policy can change without a rewrite.
//!
//! ## Strategies
//!
//! | Strategy | Effect |
//! |----------|--------|
//! | `full` | replace the whole value with `[REDACTED]` |
//! | `partial` | mask all but the last `show_last` characters |
//! | `hash` | replace with `sha256:<hex>` of the value |
//! | `truncate` | cut to `length` characters, mark truncated |
//! | `email` | mask the local part, keep the domain |
//! | `preserve_type` | type-appropriate empty value |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::schema::FieldDefinition;

/// Marker substituted for redacted and masked values.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// A named transformation applied to one field before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RedactionStrategy {
    /// Replace the entire value with [`REDACTION_MARKER`].
    Full,
    /// Keep the last `show_last` characters, mask the rest.
    Partial {
        #[serde(default = "default_show_last")]
        show_last: usize,
    },
    /// Replace with a one-way SHA-256 digest of the value.
    Hash,
    /// Cut the string form to `length` characters and mark it truncated.
    Truncate { length: usize },
    /// Keep the domain of an email address, mask the local part.
    Email,
    /// Replace with a type-appropriate empty value so consumers relying on
    /// the type keep working.
    PreserveType,
}

fn default_show_last() -> usize {
    4
}

/// A redaction rule: a dotted path into the record's data plus the strategy
/// applied at that path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRedaction {
    pub field_path: String,

    #[serde(flatten)]
    pub strategy: RedactionStrategy,
}

/// Apply a single strategy to a value.
pub fn apply_strategy(value: &Value, strategy: &RedactionStrategy) -> Value {
    match strategy {
        RedactionStrategy::Full => Value::String(REDACTION_MARKER.to_string()),

        RedactionStrategy::Partial { show_last } => {
            let s = string_form(value);
            let chars: Vec<char> = s.chars().collect();
            if chars.len() <= *show_last {
                Value::String("*".repeat(chars.len().max(1)))
            } else {
                let visible: String = chars[chars.len() - show_last..].iter().collect();
                Value::String(format!("{}{}", "*".repeat(chars.len() - show_last), visible))
            }
        }

        RedactionStrategy::Hash => {
            // Canonical JSON so the digest is stable across re-serialization.
            let canonical = value.to_string();
            let digest = Sha256::digest(canonical.as_bytes());
            Value::String(format!("sha256:{}", hex::encode(digest)))
        }

        RedactionStrategy::Truncate { length } => {
            let s = string_form(value);
            let chars: Vec<char> = s.chars().collect();
            if chars.len() <= *length {
                value.clone()
            } else {
                let prefix: String = chars[..*length].iter().collect();
                Value::String(format!("{prefix}...[truncated]"))
            }
        }

        RedactionStrategy::Email => {
            let s = string_form(value);
            match s.split_once('@') {
                Some((_, domain)) if !domain.is_empty() => {
                    Value::String(format!("***@{domain}"))
                }
                _ => Value::String(REDACTION_MARKER.to_string()),
            }
        }

        RedactionStrategy::PreserveType => match value {
            Value::Null => Value::Null,
            Value::Bool(_) => Value::Bool(false),
            Value::Number(n) => {
                if n.is_f64() {
                    serde_json::json!(0.0)
                } else {
                    serde_json::json!(0)
                }
            }
            Value::String(_) => Value::String(String::new()),
            Value::Array(_) => Value::Array(Vec::new()),
            Value::Object(_) => Value::Object(serde_json::Map::new()),
        },
    }
}

/// Apply a schema's declared redactions to a structured value.
///
/// A `field_path` that does not resolve is a no-op: callers may share one
/// schema across operations with differing payload shapes.
pub fn redact_in_place(data: &mut Value, redactions: &[FieldRedaction]) {
    for redaction in redactions {
        if let Some(slot) = resolve_path_mut(data, &redaction.field_path) {
            let replacement = apply_strategy(slot, &redaction.strategy);
            *slot = replacement;
        }
    }
}

/// Mask every `sensitive` field for export.
///
/// Returns a masked copy; the input is untouched. A sensitive path masks the
/// entire subtree at that path. Fields the schema does not declare pass
/// through unchanged.
pub fn mask_sensitive(data: &Value, fields: &[FieldDefinition]) -> Value {
    let mut out = data.clone();
    for field in fields {
        if !field.sensitive {
            continue;
        }
        if let Some(slot) = resolve_path_mut(&mut out, &field.name) {
            *slot = Value::String(REDACTION_MARKER.to_string());
        }
    }
    out
}

fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn resolve_path_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}
