//! `ledge schema` - audit schema management.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use ledge_audit::AuditSchema;

#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// List schemas. Active versions only unless --all is given.
    List {
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Print one schema as pretty JSON
    Show {
        name: String,

        /// Schema version. Defaults to the highest version.
        #[arg(long)]
        version: Option<u32>,
    },

    /// Register a new schema version from a YAML or JSON file
    Create { file: PathBuf },

    /// Deactivate a schema version (hides it from active listings)
    Deactivate {
        name: String,

        #[arg(long)]
        version: u32,
    },
}

pub async fn run(cmd: SchemaCommand, dir: &Path) -> anyhow::Result<()> {
    let (_backend, registry) = super::open_store(dir).await?;

    match cmd {
        SchemaCommand::List { all } => {
            let schemas = registry.list_schemas(!all);
            if schemas.is_empty() {
                println!("No schemas.");
                return Ok(());
            }
            println!("Schemas ({}):", schemas.len());
            for schema in &schemas {
                println!(
                    "  - {:<32} evidence={:<10} retention={:<8} active={}",
                    schema.schema_id(),
                    schema.evidence_level.to_string(),
                    schema
                        .retention_days
                        .map(|d| format!("{d}d"))
                        .unwrap_or_else(|| "forever".to_string()),
                    schema.active,
                );
            }
        }

        SchemaCommand::Show { name, version } => {
            let schema = registry
                .get_schema(&name, version)
                .with_context(|| format!("schema '{name}' not found"))?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }

        SchemaCommand::Create { file } => {
            let schema = read_schema_file(&file)?;
            let schema_id = schema.schema_id();
            registry.create_schema(schema).await?;
            println!("Created schema: {schema_id}");
        }

        SchemaCommand::Deactivate { name, version } => {
            registry.deactivate_schema(&name, version).await?;
            println!("Deactivated schema: {name}:v{version}");
        }
    }

    Ok(())
}

fn read_schema_file(path: &Path) -> anyhow::Result<AuditSchema> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    let schema: AuditSchema = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else if ext == "yaml" || ext == "yml" {
        serde_yaml::from_slice(&bytes)?
    } else {
        anyhow::bail!(
            "Unsupported schema extension. Use .yaml/.yml or .json (got '{ext}')"
        );
    };
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_yaml_schema_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(
            &path,
            r#"
schema_name: tool_call
version: 1
retention_days: 90
evidence_level: regulatory
created_at: "2026-01-01T00:00:00Z"
fields:
  - name: query
    type: string
  - name: api_key
    type: string
    sensitive: true
field_redactions:
  - field_path: api_key
    strategy: full
"#,
        )
        .unwrap();

        let schema = read_schema_file(&path).unwrap();
        assert_eq!(schema.schema_id(), "tool_call:v1");
        assert_eq!(schema.retention_days, Some(90));
        assert!(schema.fields[1].sensitive);
        assert_eq!(schema.field_redactions.len(), 1);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.toml");
        std::fs::write(&path, "x = 1").unwrap();
        assert!(read_schema_file(&path).is_err());
    }
}
