//! `ledge export` / `ledge tail` - streaming record export.

use std::path::{Path, PathBuf};

use clap::Args;
use futures::StreamExt;
use ledge_audit::{AuditBackend, ExportFormat, Exporter, RecordFilter};

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output format: csv, json, or jsonl.
    #[arg(long, default_value = "jsonl")]
    format: String,

    /// Output file. Defaults to stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Filter by schema name.
    #[arg(long)]
    schema: Option<String>,

    /// Filter by operation type (repeatable): tool, resource, prompt.
    #[arg(long = "operation-type")]
    operation_types: Vec<String>,

    /// Filter by operation name (repeatable).
    #[arg(long = "operation-name")]
    operation_names: Vec<String>,

    /// Filter by user id (repeatable).
    #[arg(long = "user")]
    users: Vec<String>,

    /// Filter by status: success or error.
    #[arg(long)]
    status: Option<String>,

    /// Filter by policy decision (repeatable): allow, deny, warn, n/a.
    #[arg(long = "decision")]
    decisions: Vec<String>,

    /// Only records at or after this RFC3339 timestamp.
    #[arg(long)]
    since: Option<String>,

    /// Only records at or before this RFC3339 timestamp.
    #[arg(long)]
    until: Option<String>,

    #[arg(long)]
    limit: Option<usize>,

    #[arg(long)]
    offset: Option<usize>,
}

impl ExportArgs {
    fn filter(&self) -> anyhow::Result<RecordFilter> {
        let operation_types = if self.operation_types.is_empty() {
            None
        } else {
            Some(
                self.operation_types
                    .iter()
                    .map(|s| super::parse_operation_type(s))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        };
        let policy_decisions = if self.decisions.is_empty() {
            None
        } else {
            Some(
                self.decisions
                    .iter()
                    .map(|s| super::parse_decision(s))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        };

        Ok(RecordFilter {
            schema_name: self.schema.clone(),
            operation_types,
            operation_names: none_if_empty(&self.operation_names),
            user_ids: none_if_empty(&self.users),
            operation_status: self
                .status
                .as_deref()
                .map(super::parse_status)
                .transpose()?,
            policy_decisions,
            start_time: self.since.as_deref().map(super::parse_time).transpose()?,
            end_time: self.until.as_deref().map(super::parse_time).transpose()?,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

fn none_if_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

pub async fn run(args: ExportArgs, dir: &Path) -> anyhow::Result<()> {
    let format: ExportFormat = args.format.parse()?;
    let filter = args.filter()?;

    let (backend, registry) = super::open_store(dir).await?;
    let stream = backend.query_records(filter).await?;
    let exporter = Exporter::new(registry);

    let summary = match args.out {
        Some(ref path) => {
            let mut file = tokio::fs::File::create(path).await?;
            exporter.export(stream, format, &mut file).await?
        }
        None => {
            let mut stdout = tokio::io::stdout();
            exporter.export(stream, format, &mut stdout).await?
        }
    };

    if let Some(ref path) = args.out {
        eprintln!(
            "Exported {} record(s) to {} ({} skipped)",
            summary.written,
            path.display(),
            summary.skipped
        );
    } else if summary.skipped > 0 {
        eprintln!("{} unreadable record(s) skipped", summary.skipped);
    }

    Ok(())
}

/// `ledge tail`: the last `count` records as human-readable log lines.
pub async fn run_tail(count: usize, dir: &Path) -> anyhow::Result<()> {
    let (backend, _registry) = super::open_store(dir).await?;

    // Two passes keep memory bounded: count matches, then skip to the tail.
    let total = backend
        .query_records(RecordFilter::default())
        .await?
        .filter(|item| futures::future::ready(item.is_ok()))
        .count()
        .await;
    let offset = total.saturating_sub(count);

    let mut stream = backend
        .query_records(RecordFilter {
            offset: Some(offset),
            ..Default::default()
        })
        .await?;

    while let Some(item) = stream.next().await {
        match item {
            Ok(record) => println!("{}", record.to_log_line()),
            Err(e) => eprintln!("(unreadable record: {e})"),
        }
    }

    Ok(())
}
