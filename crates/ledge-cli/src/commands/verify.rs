//! `ledge verify` - hash chain verification.

use std::path::Path;

use futures::StreamExt;
use ledge_audit::{AuditBackend, RecordFilter};

pub async fn run(from: Option<String>, to: Option<String>, dir: &Path) -> anyhow::Result<()> {
    let (backend, _registry) = super::open_store(dir).await?;

    let (from, to) = match (from, to) {
        (Some(from), Some(to)) => (from, to),
        (from, to) => {
            let Some((first, last)) = range_endpoints(&*backend).await? else {
                println!("Log is empty; nothing to verify.");
                return Ok(());
            };
            (from.unwrap_or(first), to.unwrap_or(last))
        }
    };

    let result = backend.verify_integrity(&from, &to).await?;

    println!("Records checked: {}", result.records_checked);
    if result.valid {
        println!("✔ Chain intact.");
        return Ok(());
    }

    println!("✖ Chain broken ({} break(s)):", result.chain_breaks.len());
    for b in &result.chain_breaks {
        println!(
            "  - position={} record={} kind={:?} expected={} actual={}",
            b.position,
            if b.record_id.is_empty() { "<unreadable>" } else { b.record_id.as_str() },
            b.kind,
            short(&b.expected),
            short(&b.actual),
        );
    }
    anyhow::bail!("integrity verification failed")
}

/// Oldest and newest record ids, streaming the log once.
async fn range_endpoints(
    backend: &dyn AuditBackend,
) -> anyhow::Result<Option<(String, String)>> {
    let mut stream = backend.query_records(RecordFilter::default()).await?;
    let mut first: Option<String> = None;
    let mut last: Option<String> = None;
    while let Some(item) = stream.next().await {
        if let Ok(record) = item {
            if first.is_none() {
                first = Some(record.record_id.clone());
            }
            last = Some(record.record_id);
        }
    }
    Ok(first.zip(last))
}

fn short(hash: &str) -> &str {
    if hash.len() > 12 { &hash[..12] } else { hash }
}
