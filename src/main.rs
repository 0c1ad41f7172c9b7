use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use tabular_import::config::ImportConfig;
use tabular_import::ingestion::{
    CompositeObserver, FileObserver, ImportOptions, Importer, IngestionObserver, MatchPolicy, TracingObserver, Upload,
};
use tabular_import::lock::{FileLock, ImportLocks};
use tabular_import::logging;
use tabular_import::persist::CommitMode;
use tabular_import::storage::{RecordStore, SqliteStore};

#[derive(Parser)]
#[command(name = "tabular-import")]
#[command(about = "Load CSV exports into a typed SQLite table")]
#[command(version)]
struct Cli {
    /// Config file (TOML). Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database file; overrides the config.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Target table; overrides the config.
    #[arg(long, global = true)]
    table: Option<String>,
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a CSV/TSV file
    Import {
        file: PathBuf,
        /// Delete existing records first
        #[arg(long)]
        replace: bool,
        /// Records per committed batch (at least 1)
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        batch_size: Option<usize>,
        /// Commit everything in one transaction
        #[arg(long)]
        all_or_nothing: bool,
        /// Score every alias/header pair instead of taking the first match
        #[arg(long)]
        best_match: bool,
        /// Also append import events to this file
        #[arg(long)]
        event_log: Option<PathBuf>,
    },
    /// Show how a file would be imported without writing anything
    Preview {
        file: PathBuf,
        /// Sample rows to include
        #[arg(long, default_value_t = 10)]
        rows: usize,
    },
    /// Delete every stored record
    Clear,
    /// Print the number of stored records
    Count,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.json_logs);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ImportConfig::load(path)?,
        None => ImportConfig::default(),
    };
    if let Some(db) = cli.database {
        config.database = db;
    }
    if let Some(table) = cli.table {
        config.table = table;
    }
    config.validate()?;
    let catalog = config.catalog()?;

    match cli.command {
        Commands::Import {
            file,
            replace,
            batch_size,
            all_or_nothing,
            best_match,
            event_log,
        } => {
            let mut opts = ImportOptions {
                replace,
                ..config.import_options()
            };
            if let Some(n) = batch_size {
                opts.batch_size = n;
            }
            if all_or_nothing {
                opts.commit_mode = CommitMode::AllOrNothing;
            }
            if best_match {
                opts.match_policy = MatchPolicy::BestScore;
            }
            if let Some(path) = event_log {
                let observers: Vec<Arc<dyn IngestionObserver>> =
                    vec![Arc::new(TracingObserver), Arc::new(FileObserver::new(path))];
                opts.observer = Some(Arc::new(CompositeObserver::new(observers)));
            }

            let upload = Upload::from_path(&file)?;
            let mut store = SqliteStore::open(&config.database, &config.table, &catalog)?;
            let report = Importer::new(catalog).import(&upload, &mut store, &opts);

            println!("{}", serde_json::to_string_pretty(&report.to_response(opts.max_reported_errors))?);
            Ok(if report.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Preview { file, rows } => {
            let upload = Upload::from_path(&file)?;
            let preview = Importer::new(catalog).preview(&upload, &config.import_options(), rows)?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Clear => {
            let mut store = SqliteStore::open(&config.database, &config.table, &catalog)?;
            let locks = ImportLocks::global();
            let _guard = locks.acquire(&config.table);
            let _file_lock = store.lock_path().map(FileLock::acquire).transpose()?;
            let deleted = store.delete_all()?;
            tracing::info!(table = %config.table, deleted, "table cleared");
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "success": true,
                    "message": format!("{deleted} records deleted"),
                    "deleted_rows": deleted,
                }))?
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Count => {
            let store = SqliteStore::open(&config.database, &config.table, &catalog)?;
            let count = store.count()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "table": config.table, "count": count }))?
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
