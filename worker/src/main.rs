// ==============================================================================
// main.rs - Reputation Worker Process
// ==============================================================================
// Description: Background worker that runs uploaded genome files through the
//              reputation processor as jobs arrive on the Redis queue
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client as RedisClient;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};

use reputation_processor::memory::LogNotifier;
use reputation_processor::models::ProcessorConfig;
use reputation_processor::services::Notifier;
use reputation_processor::storage::LocalGenomeSource;
use reputation_processor::{GenomeFileProcessor, ProcessorServices};

mod email;
mod queue;
mod store;

use email::{EmailConfig, EmailNotifier};
use queue::{JobPayload, JobQueue};
use store::PgStore;

/// Settings read from the environment (and `.env`)
#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    redis_url: String,
    upload_dir: PathBuf,
    max_connections: u32,
    processor: ProcessorConfig,
}

impl WorkerConfig {
    fn from_env() -> Result<Self> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                let file_path = std::env::var("DATABASE_URL_FILE")
                    .context("DATABASE_URL or DATABASE_URL_FILE must be set")?;
                std::fs::read_to_string(&file_path)
                    .with_context(|| format!("Failed to read DATABASE_URL_FILE {}", file_path))?
                    .trim()
                    .to_string()
            }
        };

        let mut processor = ProcessorConfig::default();
        if let Ok(batches) = std::env::var("REPUTATION_BATCHES") {
            processor.batches = batches.parse().context("REPUTATION_BATCHES must be a number")?;
        }

        Ok(Self {
            database_url,
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            upload_dir: PathBuf::from(
                std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "/var/lib/reputation/uploads".to_string()),
            ),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            processor,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    info!("Starting Reputation Worker v{}", env!("CARGO_PKG_VERSION"));

    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    info!("Connected to PostgreSQL");

    let redis_client = RedisClient::open(config.redis_url.clone()).context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to create Redis connection manager")?;
    info!("Connected to Redis");

    if !config.upload_dir.is_dir() {
        error!("Upload directory not accessible at {:?}", config.upload_dir);
        return Err(anyhow::anyhow!("Upload directory not accessible"));
    }

    let notifier: Arc<dyn Notifier> = match EmailConfig::from_env() {
        Ok(email_config) => Arc::new(EmailNotifier::new(email_config)),
        Err(e) => {
            warn!("Email disabled ({:#}), notifications will only be logged", e);
            Arc::new(LogNotifier)
        }
    };

    let store = Arc::new(PgStore::new(db_pool));
    let services = ProcessorServices {
        catalog: store.clone(),
        store: store.clone(),
        records: store.clone(),
        source: Arc::new(LocalGenomeSource::new(config.upload_dir.clone())),
        notifier,
    };

    let worker = Worker {
        processor: Arc::new(GenomeFileProcessor::new(services, config.processor.clone())),
        store,
        redis_conn,
    };

    info!("Checking for files interrupted by a previous worker instance...");
    if let Err(e) = worker.recover_interrupted_files().await {
        error!("Failed to recover interrupted files: {}", e);
    }

    info!("Worker ready, waiting for jobs...");
    worker.run().await
}

#[derive(Clone)]
struct Worker {
    processor: Arc<GenomeFileProcessor>,
    store: Arc<PgStore>,
    redis_conn: ConnectionManager,
}

impl Worker {
    /// Main processing loop - polls Redis queue for jobs
    async fn run(&self) -> Result<()> {
        let mut job_queue = JobQueue::new(self.redis_conn.clone());

        loop {
            match job_queue.dequeue().await {
                Ok(Some(payload)) => {
                    info!(
                        "Received {} job for file {}",
                        if payload.rescan { "re-scan" } else { "processing" },
                        payload.file_id
                    );

                    let worker = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = worker.process_job(payload).await {
                            error!("Job processing failed: {:#}", e);
                        }
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to dequeue job: {:#}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn process_job(&self, payload: JobPayload) -> Result<()> {
        let status = if payload.rescan {
            self.processor.rescan(payload.file_id).await
        } else {
            self.processor.run(payload.file_id).await
        };
        info!("File {} finished as {}", payload.file_id, status);

        JobQueue::new(self.redis_conn.clone())
            .publish_status(payload.file_id, status)
            .await
    }

    /// Files left mid-pipeline can never finish: their worker is gone
    async fn recover_interrupted_files(&self) -> Result<()> {
        let interrupted = self.store.fail_interrupted_files().await?;

        if interrupted.is_empty() {
            info!("No interrupted files found");
            return Ok(());
        }

        let mut queue = JobQueue::new(self.redis_conn.clone());
        for file_id in interrupted {
            warn!("Marked interrupted file {} as failed", file_id);
            if let Err(e) = queue
                .publish_status(file_id, reputation_processor::models::FileStatus::Failed)
                .await
            {
                warn!("Failed to publish status for {}: {:#}", file_id, e);
            }
        }

        Ok(())
    }
}
