//! Streaming export of audit records.
//!
//! All three formats stream through a record stream and buffer only the
//! bytes being written, never the result set. Sensitive-field masking is
//! applied here, at export time, against the owning schema's field
//! definitions — the stored records stay untouched.
//!
//! Corrupt records are skipped and counted rather than aborting the export.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::backend::RecordStream;
use crate::error::AuditError;
use crate::record::AuditRecord;
use crate::redact::mask_sensitive;
use crate::registry::SchemaRegistry;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// One JSON array of objects.
    Json,
    /// One JSON object per line.
    Jsonl,
}

impl std::str::FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "jsonl" => Ok(Self::Jsonl),
            other => Err(AuditError::ExportFailed(format!(
                "unknown format '{other}' (expected csv, json, or jsonl)"
            ))),
        }
    }
}

/// Outcome of one export run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Records written to the output.
    pub written: u64,
    /// Corrupt records skipped.
    pub skipped: u64,
}

const CSV_HEADER: &[&str] = &[
    "record_id",
    "timestamp",
    "schema_name",
    "schema_version",
    "operation_type",
    "operation_name",
    "caller_type",
    "operation_status",
    "policy_decision",
    "policy_reason",
    "duration_ms",
    "user_id",
    "session_id",
    "trace_id",
    "error",
    "input_data",
    "output_data",
    "record_hash",
];

/// Streaming exporter with export-time sensitive masking.
pub struct Exporter {
    registry: Option<Arc<SchemaRegistry>>,
}

impl Exporter {
    /// Exporter that masks sensitive fields using the registry's schemas.
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    /// Exporter without masking, for trails with no sensitive fields.
    pub fn unmasked() -> Self {
        Self { registry: None }
    }

    /// Stream `records` into `out` in the given format.
    pub async fn export<W>(
        &self,
        mut records: RecordStream,
        format: ExportFormat,
        out: &mut W,
    ) -> Result<ExportSummary, AuditError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut summary = ExportSummary::default();

        if format == ExportFormat::Csv {
            out.write_all(CSV_HEADER.join(",").as_bytes()).await?;
            out.write_all(b"\n").await?;
        }
        if format == ExportFormat::Json {
            out.write_all(b"[").await?;
        }

        while let Some(item) = records.next().await {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    // Skip-and-report: one bad line must not sink the export.
                    summary.skipped += 1;
                    tracing::warn!(error = %e, "skipping unreadable record during export");
                    continue;
                }
            };

            let record = self.masked(record);

            match format {
                ExportFormat::Csv => {
                    let row = csv_row(&record)?;
                    out.write_all(row.as_bytes()).await?;
                    out.write_all(b"\n").await?;
                }
                ExportFormat::Json => {
                    if summary.written > 0 {
                        out.write_all(b",").await?;
                    }
                    out.write_all(serde_json::to_string(&record)?.as_bytes())
                        .await?;
                }
                ExportFormat::Jsonl => {
                    out.write_all(serde_json::to_string(&record)?.as_bytes())
                        .await?;
                    out.write_all(b"\n").await?;
                }
            }
            summary.written += 1;
        }

        if format == ExportFormat::Json {
            out.write_all(b"]").await?;
        }
        out.flush().await?;

        Ok(summary)
    }

    fn masked(&self, mut record: AuditRecord) -> AuditRecord {
        let Some(ref registry) = self.registry else {
            return record;
        };
        let Some(schema) =
            registry.get_schema(&record.schema_name, Some(record.schema_version))
        else {
            return record;
        };
        if schema.fields.iter().any(|f| f.sensitive) {
            record.input_data = mask_sensitive(&record.input_data, &schema.fields);
            if let Some(ref output) = record.output_data {
                record.output_data = Some(mask_sensitive(output, &schema.fields));
            }
        }
        record
    }
}

fn csv_row(record: &AuditRecord) -> Result<String, AuditError> {
    let cells: Vec<String> = vec![
        record.record_id.clone(),
        record.timestamp.to_rfc3339(),
        record.schema_name.clone(),
        record.schema_version.to_string(),
        record.operation_type.to_string(),
        record.operation_name.clone(),
        record.caller_type.to_string(),
        record.operation_status.to_string(),
        record.policy_decision.to_string(),
        record.policy_reason.clone().unwrap_or_default(),
        record
            .duration_ms
            .map(|d| d.to_string())
            .unwrap_or_default(),
        record.user_id.clone().unwrap_or_default(),
        record.session_id.clone().unwrap_or_default(),
        record.trace_id.clone().unwrap_or_default(),
        record.error.clone().unwrap_or_default(),
        json_cell(&record.input_data)?,
        match record.output_data {
            Some(ref output) => json_cell(output)?,
            None => String::new(),
        },
        record.record_hash.clone(),
    ];

    Ok(cells
        .into_iter()
        .map(|cell| csv_escape(&cell))
        .collect::<Vec<_>>()
        .join(","))
}

fn json_cell(value: &Value) -> Result<String, AuditError> {
    if value.is_null() {
        return Ok(String::new());
    }
    Ok(serde_json::to_string(value)?)
}

fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AuditSchema, FieldDefinition};
    use futures::stream;
    use ledge_core::{CallerType, OperationType};
    use serde_json::json;

    fn record(name: &str, input: Value) -> AuditRecord {
        let mut record = AuditRecord::builder(OperationType::Tool, name, CallerType::Http)
            .schema("tool_call", 1)
            .input_data(input)
            .build();
        record.record_id = uuid::Uuid::new_v4().to_string();
        record
    }

    fn stream_of(records: Vec<AuditRecord>) -> RecordStream {
        Box::pin(stream::iter(records.into_iter().map(Ok)))
    }

    async fn registry_with_sensitive_schema() -> Arc<SchemaRegistry> {
        let backend = Arc::new(crate::backend::NullBackend::new());
        let registry = SchemaRegistry::load(backend).await.unwrap();
        registry
            .create_schema(
                AuditSchema::builder("tool_call", 1)
                    .field(FieldDefinition::new("query", "string"))
                    .field(FieldDefinition::new("api_key", "string").sensitive())
                    .build(),
            )
            .await
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn jsonl_export_writes_one_line_per_record() {
        let exporter = Exporter::unmasked();
        let records = vec![record("a", json!({})), record("b", json!({}))];

        let mut out = Vec::new();
        let summary = exporter
            .export(stream_of(records), ExportFormat::Jsonl, &mut out)
            .await
            .unwrap();

        assert_eq!(summary.written, 2);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn json_export_is_a_single_array() {
        let exporter = Exporter::unmasked();
        let records = vec![record("a", json!({})), record("b", json!({}))];

        let mut out = Vec::new();
        exporter
            .export(stream_of(records), ExportFormat::Json, &mut out)
            .await
            .unwrap();

        let parsed: Value = serde_json::from_slice(&out).unwrap();
        let array = parsed.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["operation_name"], json!("a"));
    }

    #[tokio::test]
    async fn csv_export_has_header_and_escaping() {
        let exporter = Exporter::unmasked();
        let records = vec![record("needs,escaping", json!({"k": "v"}))];

        let mut out = Vec::new();
        exporter
            .export(stream_of(records), ExportFormat::Csv, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("record_id,timestamp,"));
        let row = lines.next().unwrap();
        assert!(row.contains("\"needs,escaping\""));
        assert!(row.contains("\"{\"\"k\"\":\"\"v\"\"}\""));
    }

    #[tokio::test]
    async fn sensitive_fields_are_masked_on_export_only() {
        let registry = registry_with_sensitive_schema().await;
        let exporter = Exporter::new(registry);

        let original = record("call", json!({"query": "SELECT 1", "api_key": "sk-123"}));
        let mut out = Vec::new();
        exporter
            .export(stream_of(vec![original.clone()]), ExportFormat::Json, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("sk-123"));
        assert!(text.contains("SELECT 1"));
        // The in-memory record was not mutated.
        assert_eq!(original.input_data["api_key"], json!("sk-123"));
    }

    #[tokio::test]
    async fn corrupt_records_are_skipped_and_counted() {
        let exporter = Exporter::unmasked();
        let items: Vec<Result<AuditRecord, AuditError>> = vec![
            Ok(record("good", json!({}))),
            Err(AuditError::Storage("unreadable record line".to_string())),
            Ok(record("also_good", json!({}))),
        ];
        let stream: RecordStream = Box::pin(stream::iter(items));

        let mut out = Vec::new();
        let summary = exporter
            .export(stream, ExportFormat::Jsonl, &mut out)
            .await
            .unwrap();

        assert_eq!(summary.written, 2);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn empty_stream_produces_empty_array() {
        let exporter = Exporter::unmasked();
        let stream: RecordStream = Box::pin(stream::iter(
            Vec::<Result<AuditRecord, AuditError>>::new(),
        ));
        let mut out = Vec::new();
        let summary = exporter
            .export(stream, ExportFormat::Json, &mut out)
            .await
            .unwrap();
        assert_eq!(summary.written, 0);
        assert_eq!(out, b"[]");
    }
}
