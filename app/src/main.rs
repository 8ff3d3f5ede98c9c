// ==============================================================================
// main.rs - Reputation Processor Entry Point
// ==============================================================================
// Description: Runs the full pipeline on a local genome export against a JSON
//              reference catalog and prints per-gene reputation scores
// Version: 2.0.0
// ==============================================================================

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use reputation_processor::memory::{InMemoryCatalog, InMemoryStore, LogNotifier};
use reputation_processor::models::{FileRecord, FileStatus, GeneId, ProcessorConfig};
use reputation_processor::storage::LocalGenomeSource;
use reputation_processor::{GenomeFileProcessor, ProcessorServices};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Genome export (23andMe, AncestryDNA, Courtagen, FamilyTreeDNA, VCF; .zip/.gz accepted)
    #[arg(short, long)]
    file: PathBuf,

    /// Reference catalog (JSON)
    #[arg(short, long, env = "REPUTATION_CATALOG")]
    catalog: PathBuf,

    /// Number of parallel aggregation batches
    #[arg(short, long, env = "REPUTATION_BATCHES", default_value_t = 8)]
    batches: usize,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report {
    file: String,
    format: String,
    sequenced_at: Option<String>,
    scores: Vec<GeneScore>,
}

#[derive(Debug, Serialize)]
struct GeneScore {
    gene_id: GeneId,
    gene: String,
    score: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reputation_processor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let upload_dir = args
        .file
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = args
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .context("Genome file name is not valid UTF-8")?
        .to_string();

    let catalog = Arc::new(InMemoryCatalog::from_json_file(&args.catalog)?);
    let store = Arc::new(InMemoryStore::new());

    let file_id = Uuid::new_v4();
    store.insert_file(FileRecord::new(file_id, "local", file_name.clone())).await;

    let services = ProcessorServices {
        catalog: catalog.clone(),
        store: store.clone(),
        records: store.clone(),
        source: Arc::new(LocalGenomeSource::new(upload_dir)),
        notifier: Arc::new(LogNotifier),
    };
    let config = ProcessorConfig {
        batches: args.batches,
        ..ProcessorConfig::default()
    };

    info!("Reputation processor starting for {}", args.file.display());
    let status = GenomeFileProcessor::new(services, config).run(file_id).await;
    if status != FileStatus::Complete {
        bail!("Processing of {} failed", args.file.display());
    }

    let record = store.get_file(file_id).await.context("File record disappeared")?;
    let mut scores: Vec<GeneScore> = store
        .scores(file_id)
        .await
        .into_iter()
        .map(|(gene_id, score)| GeneScore {
            gene_id,
            gene: catalog.gene(gene_id).map(|g| g.name.clone()).unwrap_or_default(),
            score,
        })
        .collect();
    scores.sort_by_key(|s| s.gene_id);

    let report = Report {
        file: file_name,
        format: record.format.as_str().to_string(),
        sequenced_at: record.sequenced_at,
        scores,
    };
    let json = serde_json::to_string_pretty(&report)?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
