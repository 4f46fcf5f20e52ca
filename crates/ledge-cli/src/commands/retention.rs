//! `ledge retention` - schema-driven retention sweeps.

use std::path::Path;

use ledge_audit::AuditBackend;

pub async fn run(dry_run: bool, dir: &Path) -> anyhow::Result<()> {
    let (backend, _registry) = super::open_store(dir).await?;

    let report = backend.apply_retention(dry_run).await?;

    let verb = if report.dry_run { "would delete" } else { "deleted" };
    if report.deleted.is_empty() {
        println!("Nothing to delete.");
    } else {
        for (schema_id, count) in &report.deleted {
            println!("  - {schema_id}: {verb} {count} record(s)");
        }
        println!("Total: {verb} {} record(s)", report.total());
    }

    if report.unreadable_lines > 0 {
        println!(
            "(note) {} unreadable line(s) preserved",
            report.unreadable_lines
        );
    }

    for (schema_id, error) in &report.failures {
        eprintln!("✖ {schema_id}: {error}");
    }
    if !report.failures.is_empty() {
        anyhow::bail!("retention failed for {} schema(s)", report.failures.len());
    }

    Ok(())
}
