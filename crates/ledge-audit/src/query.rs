//! Streaming query filters.
//!
//! A [`RecordFilter`] describes which records a query should yield. All set
//! filters are ANDed; omitted filters impose no constraint. `limit` and
//! `offset` apply after filtering. Results come back as a lazy, finite,
//! forward-only stream — see [`crate::backend::RecordStream`].

use chrono::{DateTime, Utc};
use ledge_core::{OperationStatus, OperationType, PolicyDecision};

use crate::record::AuditRecord;

/// Filter for querying audit records.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Filter by owning schema name (any version).
    pub schema_name: Option<String>,
    /// Filter by operation types.
    pub operation_types: Option<Vec<OperationType>>,
    /// Filter by operation names.
    pub operation_names: Option<Vec<String>>,
    /// Filter by user ids.
    pub user_ids: Option<Vec<String>>,
    /// Filter by terminal status.
    pub operation_status: Option<OperationStatus>,
    /// Filter by policy decisions.
    pub policy_decisions: Option<Vec<PolicyDecision>>,
    /// Inclusive lower bound on `timestamp`.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub end_time: Option<DateTime<Utc>>,
    /// Maximum number of results, applied after filtering.
    pub limit: Option<usize>,
    /// Results skipped after filtering, before `limit`.
    pub offset: Option<usize>,
}

impl RecordFilter {
    /// Whether a record passes every set filter. `limit`/`offset` are the
    /// stream driver's concern, not part of the match.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(ref schema) = self.schema_name {
            if record.schema_name != *schema {
                return false;
            }
        }
        if let Some(ref types) = self.operation_types {
            if !types.contains(&record.operation_type) {
                return false;
            }
        }
        if let Some(ref names) = self.operation_names {
            if !names.iter().any(|n| *n == record.operation_name) {
                return false;
            }
        }
        if let Some(ref users) = self.user_ids {
            match record.user_id {
                Some(ref user) if users.iter().any(|u| u == user) => {}
                _ => return false,
            }
        }
        if let Some(status) = self.operation_status {
            if record.operation_status != status {
                return false;
            }
        }
        if let Some(ref decisions) = self.policy_decisions {
            if !decisions.contains(&record.policy_decision) {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if record.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.timestamp > end {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledge_core::CallerType;
    use serde_json::json;

    fn record(name: &str, ty: OperationType, user: Option<&str>) -> AuditRecord {
        let mut builder = AuditRecord::builder(ty, name, CallerType::Http)
            .schema("tool_call", 1)
            .input_data(json!({}));
        if let Some(user) = user {
            builder = builder.user_id(user);
        }
        builder.build()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = RecordFilter::default();
        assert!(filter.matches(&record("a", OperationType::Tool, None)));
        assert!(filter.matches(&record("b", OperationType::Prompt, Some("alice"))));
    }

    #[test]
    fn filters_are_anded() {
        let filter = RecordFilter {
            operation_types: Some(vec![OperationType::Tool]),
            user_ids: Some(vec!["alice".to_string()]),
            ..Default::default()
        };

        assert!(filter.matches(&record("a", OperationType::Tool, Some("alice"))));
        assert!(!filter.matches(&record("a", OperationType::Tool, Some("bob"))));
        assert!(!filter.matches(&record("a", OperationType::Prompt, Some("alice"))));
        // Missing user never matches a user filter.
        assert!(!filter.matches(&record("a", OperationType::Tool, None)));
    }

    #[test]
    fn time_bounds_are_inclusive() {
        let r = record("a", OperationType::Tool, None);
        let filter = RecordFilter {
            start_time: Some(r.timestamp),
            end_time: Some(r.timestamp),
            ..Default::default()
        };
        assert!(filter.matches(&r));
    }
}
