//! oxide-schema-diff CLI
//!
//! Command-line tool for diffing schema snapshots and pushing the result to
//! a database.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schema_diff::prelude::*;

/// Snapshot diffing and DDL generation for schema migrations.
#[derive(Parser)]
#[command(name = "oxide-schema-diff")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SQL that turns `prev` into `cur`.
    Diff {
        /// Previous snapshot (JSON).
        #[arg(long)]
        prev: PathBuf,

        /// Current snapshot (JSON).
        #[arg(long)]
        cur: PathBuf,

        /// Rename decision, `<kind>:<from>=<to>` (repeatable).
        #[arg(long = "rename")]
        renames: Vec<RenameRule>,

        /// Write `cur`, linked after `prev` and carrying the rename record,
        /// to this file.
        #[arg(long)]
        emit_snapshot: Option<PathBuf>,
    },

    /// Diff, check for data loss against a live SQLite database, and apply.
    Push {
        /// Previous snapshot (JSON).
        #[arg(long)]
        prev: PathBuf,

        /// Current snapshot (JSON).
        #[arg(long)]
        cur: PathBuf,

        /// Database URL.
        #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
        database: String,

        /// Rename decision, `<kind>:<from>=<to>` (repeatable).
        #[arg(long = "rename")]
        renames: Vec<RenameRule>,

        /// Apply even if data would be lost.
        #[arg(long)]
        force: bool,
    },
}

fn load_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Snapshot::from_json(&json).with_context(|| format!("Failed to load {}", path.display()))
}

/// Rules recorded in the current snapshot's `_meta`, then the ones given on
/// the command line.
fn resolver_for(cur: &Snapshot, renames: Vec<RenameRule>) -> ScriptedResolver {
    let mut rules = ScriptedResolver::from_meta(&cur.meta).rules().to_vec();
    rules.extend(renames);
    ScriptedResolver::new(rules)
}

async fn run_diff(
    prev: &Path,
    cur: &Path,
    renames: Vec<RenameRule>,
    emit_snapshot: Option<&Path>,
) -> anyhow::Result<()> {
    let prev = load_snapshot(prev)?;
    let cur = load_snapshot(cur)?;
    let resolver = resolver_for(&cur, renames);

    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::uniform(&resolver)).await?;
    if diff.is_empty() {
        info!("No schema changes detected.");
    }

    let generator = generator_for(cur.dialect);
    for sql in generator.generate_all(&diff.statements)? {
        println!("{sql};");
    }
    if !diff.meta.is_empty() {
        println!("\n-- _meta");
        println!("{}", serde_json::to_string_pretty(&diff.meta)?);
    }

    if let Some(path) = emit_snapshot {
        let mut next = Snapshot::stamp_next(&prev, cur, &mut UuidGenerator);
        next.meta = diff.meta;
        std::fs::write(path, next.to_json_pretty()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote snapshot {} to {}", next.id, path.display());
    }
    Ok(())
}

async fn run_push(
    prev: &Path,
    cur: &Path,
    database: &str,
    renames: Vec<RenameRule>,
    force: bool,
) -> anyhow::Result<()> {
    let prev = load_snapshot(prev)?;
    let cur = load_snapshot(cur)?;
    let resolver = resolver_for(&cur, renames);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database)
        .await?;
    let live = SqliteLiveQuery::new(pool);

    let outcome = push(
        &prev,
        &cur,
        &Resolvers::uniform(&resolver),
        &SqliteGenerator::new(),
        &live,
        ApplyOptions { force },
    )
    .await;

    match outcome {
        Ok(outcome) => {
            for warning in &outcome.plan.info_to_print {
                println!(" [!] {warning}");
            }
            info!(
                "Applied {} statement(s) in {} ms.",
                outcome.report.executed,
                (outcome.report.finished_at - outcome.report.started_at).num_milliseconds()
            );
            Ok(())
        }
        Err(DiffError::ApprovalRequired { warnings }) => {
            println!("\nData loss warnings:");
            println!("{:-<60}", "");
            for warning in &warnings {
                println!(" [!] {warning}");
            }
            println!();
            anyhow::bail!("Refusing to apply without approval; re-run with --force")
        }
        Err(err) => Err(err.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Diff {
            prev,
            cur,
            renames,
            emit_snapshot,
        } => run_diff(&prev, &cur, renames, emit_snapshot.as_deref()).await,

        Commands::Push {
            prev,
            cur,
            database,
            renames,
            force,
        } => run_push(&prev, &cur, &database, renames, force).await,
    }
}
