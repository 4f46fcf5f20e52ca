use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "ledge", version, about = "Ledge audit administration")]
struct Cli {
    /// Audit log directory. Defaults to the `audit.directory` setting in
    /// ledge.yaml, or `audit/`.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Audit schema management (list/show/create/deactivate)
    Schema {
        #[command(subcommand)]
        cmd: commands::schema::SchemaCommand,
    },

    /// Stream records into CSV, JSON, or JSONL
    Export(commands::export::ExportArgs),

    /// Print recent records as human-readable log lines
    Tail {
        /// Number of records to show.
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },

    /// Verify the hash chain between two record ids
    Verify {
        /// First record id of the range. Defaults to the oldest record.
        #[arg(long)]
        from: Option<String>,

        /// Last record id of the range. Defaults to the newest record.
        #[arg(long)]
        to: Option<String>,
    },

    /// Run a retention sweep
    Retention {
        /// Report what would be deleted without mutating storage.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let dir = commands::resolve_audit_dir(cli.dir)?;

    match cli.cmd {
        Command::Schema { cmd } => commands::schema::run(cmd, &dir).await?,
        Command::Export(args) => commands::export::run(args, &dir).await?,
        Command::Tail { count } => commands::export::run_tail(count, &dir).await?,
        Command::Verify { from, to } => commands::verify::run(from, to, &dir).await?,
        Command::Retention { dry_run } => commands::retention::run(dry_run, &dir).await?,
    }

    Ok(())
}
