use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use qps_core::{IndexConfig, Note, QpsPersistence, QpsService, SledIndexTable};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "qps-indexer")]
#[command(about = "Build and manage the quantum proximity search index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from note JSON/JSONL files or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Index database directory
        #[arg(long, default_value = "./qps-index")]
        db: String,
        /// Upper bound on proximity segments per note
        #[arg(long, default_value_t = qps_core::config::DEFAULT_MAX_SEGMENTS)]
        max_segments: u32,
        /// Score bonus per query-token pair in the same or adjacent segment
        #[arg(long, default_value_t = qps_core::config::DEFAULT_PROXIMITY_BONUS)]
        proximity_bonus: f64,
    },
    /// Print status and metadata of the stored index
    Status {
        #[arg(long, default_value = "./qps-index")]
        db: String,
    },
    /// Query the stored index
    Search {
        #[arg(long, default_value = "./qps-index")]
        db: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete the stored index record
    Delete {
        #[arg(long, default_value = "./qps-index")]
        db: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, db, max_segments, proximity_bonus } => {
            let config = IndexConfig::new(max_segments, proximity_bonus)?;
            build_index(&input, &open_persistence(&db)?, config).await?;
            tracing::info!(db, "index build complete");
            Ok(())
        }
        Commands::Status { db } => {
            let service = load_required(&open_persistence(&db)?).await?;
            let report = serde_json::json!({
                "status": service.index_status(),
                "metadata": service.index_metadata()?,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Search { db, query, limit } => {
            let service = load_required(&open_persistence(&db)?).await?;
            let results = service.search(&query, limit);
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Commands::Delete { db } => {
            open_persistence(&db)?.delete_index().await?;
            tracing::info!(db, "index deleted");
            Ok(())
        }
    }
}

fn open_persistence(db: &str) -> Result<QpsPersistence<SledIndexTable>> {
    Ok(QpsPersistence::new(SledIndexTable::open(db)?))
}

async fn load_required(persistence: &QpsPersistence<SledIndexTable>) -> Result<QpsService> {
    persistence
        .load_index()
        .await?
        .ok_or_else(|| anyhow!("no valid index stored under {}", persistence.index_id()))
}

async fn build_index(input: &str, persistence: &QpsPersistence<SledIndexTable>, config: IndexConfig) -> Result<()> {
    let notes = load_notes(Path::new(input))?;
    tracing::info!(num_notes = notes.len(), input, "loaded notes");

    let mut service = QpsService::new(config);
    let synced = service.sync_all_notes(&notes);
    let metadata = persistence.save_index(&service).await?;
    tracing::info!(synced, tokens = metadata.token_count, checksum = %metadata.checksum, "index saved");
    Ok(())
}

/// Collect notes from a `.json` / `.jsonl` file, or from every such file under a directory.
fn load_notes(input_path: &Path) -> Result<Vec<Note>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(extension(p), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        return Err(anyhow!("input {} does not exist", input_path.display()));
    }

    let mut notes = Vec::new();
    for file in files {
        if extension(&file) == Some("jsonl") {
            read_jsonl(&file, &mut notes)?;
        } else {
            read_json(&file, &mut notes)?;
        }
    }
    Ok(notes)
}

fn extension(p: &Path) -> Option<&str> {
    p.extension().and_then(|s| s.to_str())
}

fn read_jsonl(file: &Path, notes: &mut Vec<Note>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        notes.push(serde_json::from_str(&line)?);
    }
    Ok(())
}

fn read_json(file: &Path, notes: &mut Vec<Note>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                notes.push(serde_json::from_value(v)?);
            }
        }
        serde_json::Value::Object(_) => notes.push(serde_json::from_value(json)?),
        _ => tracing::warn!(file = %file.display(), "skipping file without note objects"),
    }
    Ok(())
}
