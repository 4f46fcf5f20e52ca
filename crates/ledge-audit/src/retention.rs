//! Retention sweep results.
//!
//! The enforcement itself lives in each backend (it has to hold the write
//! lock); this module holds the shared report type and cutoff computation.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::schema::AuditSchema;

/// Result of one retention sweep.
///
/// One schema's failure never aborts the sweep: `deleted` carries the
/// partial results and `failures` the per-schema errors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    /// Whether this was a counting-only run.
    pub dry_run: bool,

    /// Records deleted (or, for a dry run, that would be deleted), per
    /// `schema_id`.
    pub deleted: BTreeMap<String, u64>,

    /// Per-schema enforcement failures.
    pub failures: BTreeMap<String, String>,

    /// Lines that could not be decoded during the sweep. They are always
    /// preserved, never deleted.
    pub unreadable_lines: u64,
}

impl RetentionReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Total records deleted (or counted) across all schemas.
    pub fn total(&self) -> u64 {
        self.deleted.values().sum()
    }
}

/// The deletion cutoff for a schema, or `None` if it retains indefinitely.
pub fn retention_cutoff(schema: &AuditSchema, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let days = schema.retention_days?;
    Some(now - Duration::days(i64::from(days)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_none_without_retention() {
        let schema = AuditSchema::new("tool_call", 1);
        assert!(retention_cutoff(&schema, Utc::now()).is_none());
    }

    #[test]
    fn cutoff_subtracts_days() {
        let schema = AuditSchema::builder("tool_call", 1).retention_days(30).build();
        let now = Utc::now();
        let cutoff = retention_cutoff(&schema, now).unwrap();
        assert_eq!(now - cutoff, Duration::days(30));
    }
}
