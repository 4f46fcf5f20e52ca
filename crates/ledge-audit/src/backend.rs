//! Storage-agnostic backend contract.
//!
//! A backend owns durable storage for schemas and records. Implementations
//! must honor the ordering and streaming semantics of the reference
//! [`crate::jsonl::JsonlBackend`]: appends happen in batch order under a
//! write lock, queries stream without materializing the store, and the
//! hash chain is scoped to the backend's log.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::AuditError;
use crate::integrity::IntegrityResult;
use crate::query::RecordFilter;
use crate::record::AuditRecord;
use crate::retention::RetentionReport;
use crate::schema::AuditSchema;

/// A lazy, finite, forward-only sequence of records. Dropping the stream
/// cancels the underlying read; partial iteration is valid and cheap.
pub type RecordStream = BoxStream<'static, Result<AuditRecord, AuditError>>;

/// Trait for audit storage backends.
#[async_trait]
pub trait AuditBackend: Send + Sync {
    /// Persist a new schema version. Fails if the `schema_id` already
    /// exists or the version is not greater than every existing version of
    /// the same name.
    async fn create_schema(&self, schema: AuditSchema) -> Result<(), AuditError>;

    /// Fetch a schema. An omitted version resolves the highest version,
    /// active or not.
    async fn get_schema(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> Result<Option<AuditSchema>, AuditError>;

    async fn list_schemas(&self, active_only: bool) -> Result<Vec<AuditSchema>, AuditError>;

    /// Deactivate one schema version. Idempotent.
    async fn deactivate_schema(&self, name: &str, version: u32) -> Result<(), AuditError>;

    /// Append a batch atomically: assign record ids, chain the hashes, and
    /// flush under the write lock. Returns the assigned ids in batch order.
    async fn write_batch(&self, records: Vec<AuditRecord>) -> Result<Vec<String>, AuditError>;

    /// Append a single record.
    async fn write_record(&self, record: AuditRecord) -> Result<String, AuditError> {
        let mut ids = self.write_batch(vec![record]).await?;
        ids.pop()
            .ok_or_else(|| AuditError::Storage("write_batch returned no id".to_string()))
    }

    async fn get_record(&self, record_id: &str) -> Result<Option<AuditRecord>, AuditError>;

    /// Stream records matching the filter, in append order.
    async fn query_records(&self, filter: RecordFilter) -> Result<RecordStream, AuditError>;

    /// Walk the hash chain from `start_id` to `end_id` (inclusive) and
    /// report every position where the stored hashes disagree with the
    /// recomputed ones.
    async fn verify_integrity(
        &self,
        start_id: &str,
        end_id: &str,
    ) -> Result<IntegrityResult, AuditError>;

    /// Delete (or, for a dry run, count) records older than their schema's
    /// retention window.
    async fn apply_retention(&self, dry_run: bool) -> Result<RetentionReport, AuditError>;

    /// Release storage handles. Appends after close fail.
    async fn close(&self) -> Result<(), AuditError>;
}

/// Backend that drops everything. Backs disabled loggers.
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditBackend for NullBackend {
    async fn create_schema(&self, _schema: AuditSchema) -> Result<(), AuditError> {
        Ok(())
    }

    async fn get_schema(
        &self,
        _name: &str,
        _version: Option<u32>,
    ) -> Result<Option<AuditSchema>, AuditError> {
        Ok(None)
    }

    async fn list_schemas(&self, _active_only: bool) -> Result<Vec<AuditSchema>, AuditError> {
        Ok(Vec::new())
    }

    async fn deactivate_schema(&self, _name: &str, _version: u32) -> Result<(), AuditError> {
        Ok(())
    }

    async fn write_batch(&self, records: Vec<AuditRecord>) -> Result<Vec<String>, AuditError> {
        Ok(records
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect())
    }

    async fn get_record(&self, _record_id: &str) -> Result<Option<AuditRecord>, AuditError> {
        Ok(None)
    }

    async fn query_records(&self, _filter: RecordFilter) -> Result<RecordStream, AuditError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn verify_integrity(
        &self,
        _start_id: &str,
        _end_id: &str,
    ) -> Result<IntegrityResult, AuditError> {
        Ok(IntegrityResult::empty())
    }

    async fn apply_retention(&self, dry_run: bool) -> Result<RetentionReport, AuditError> {
        Ok(RetentionReport::new(dry_run))
    }

    async fn close(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use ledge_core::{CallerType, OperationType};

    #[tokio::test]
    async fn null_backend_accepts_and_forgets() {
        let backend = NullBackend::new();

        let record =
            AuditRecord::builder(OperationType::Tool, "t", CallerType::System).build();
        let id = backend.write_record(record).await.unwrap();
        assert!(!id.is_empty());

        assert!(backend.get_record(&id).await.unwrap().is_none());

        let mut stream = backend.query_records(RecordFilter::default()).await.unwrap();
        assert!(stream.next().await.is_none());
    }
}
