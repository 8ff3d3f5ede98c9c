// ==============================================================================
// processor.rs - Genome File Orchestration
// ==============================================================================
// Description: Runs one uploaded file through fetch, detection, ingestion and
//              gene aggregation, and finalizes it as COMPLETE or FAILED
// Version: 3.0.0
// ==============================================================================
// Pipeline:
//   PENDING → DOWNLOADING → DETECTING → PROCESSING → AGGREGATING → COMPLETE
//   any non-terminal state → FAILED
//   COMPLETE → PENDING on re-scan, then the pipeline again
// ==============================================================================

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::aggregator::GeneReputationAggregator;
use crate::error::ProcessingError;
use crate::ingest::VariantIngestor;
use crate::models::{FileId, FileRecord, FileStatus, GenomeFormat, ProcessorConfig};
use crate::parsers::parse_genome;
use crate::progress::ProgressCounter;
use crate::secure_delete;
use crate::services::{FetchedGenome, FileRecords, GenomeSource, Notifier, ReferenceCatalog, ResultStore};
use crate::sniffer;

/// Collaborators a processor run talks to
#[derive(Clone)]
pub struct ProcessorServices {
    pub catalog: Arc<dyn ReferenceCatalog>,
    pub store: Arc<dyn ResultStore>,
    pub records: Arc<dyn FileRecords>,
    pub source: Arc<dyn GenomeSource>,
    pub notifier: Arc<dyn Notifier>,
}

/// Mutable bookkeeping of one run, kept outside the fallible pipeline so the
/// failure path can see how far the run got
struct RunState {
    status: FileStatus,
    genome: Option<FetchedGenome>,
}

pub struct GenomeFileProcessor {
    services: ProcessorServices,
    config: ProcessorConfig,
}

impl GenomeFileProcessor {
    pub fn new(services: ProcessorServices, config: ProcessorConfig) -> Self {
        Self { services, config }
    }

    /// Process one file to a terminal status
    ///
    /// Never returns an error: failures are recorded on the file, routed to
    /// the notifier's failure handler and reflected in the returned status.
    /// Files already COMPLETE or FAILED are left untouched.
    pub async fn run(&self, file_id: FileId) -> FileStatus {
        let record = match self.services.records.get(file_id).await {
            Ok(record) => record,
            Err(e) => {
                error!("Cannot load file record {}: {}", file_id, e);
                return FileStatus::Failed;
            }
        };

        if record.status.is_terminal() {
            warn!("File {} is already {}, skipping", file_id, record.status);
            return record.status;
        }

        info!("Processing file {} ({})", file_id, record.original_name);

        let progress = Arc::new(ProgressCounter::new(file_id, Arc::clone(&self.services.records)));
        let mut state = RunState {
            status: record.status,
            genome: None,
        };

        match self.execute(&record, &mut state, &progress).await {
            Ok(()) => {
                self.finish_success(&record, state.genome.take()).await;
                FileStatus::Complete
            }
            Err(e) => {
                self.finish_failure(&record, &mut state, e).await;
                FileStatus::Failed
            }
        }
    }

    /// Reprocess a COMPLETE file whose re-scan is enabled
    ///
    /// Calls are overwritten in place and gene scores are recomputed from
    /// scratch. Files in any other state, or with re-scan disabled, are
    /// returned untouched.
    pub async fn rescan(&self, file_id: FileId) -> FileStatus {
        let record = match self.services.records.get(file_id).await {
            Ok(record) => record,
            Err(e) => {
                error!("Cannot load file record {}: {}", file_id, e);
                return FileStatus::Failed;
            }
        };

        if record.status != FileStatus::Complete || !record.rescan_available {
            warn!(
                "Re-scan of file {} not available ({}, rescan_available={})",
                file_id, record.status, record.rescan_available
            );
            return record.status;
        }

        if let Err(e) = self.reopen(file_id).await {
            error!("Cannot reopen file {} for re-scan: {}", file_id, e);
            return record.status;
        }

        info!("Re-scanning file {}", file_id);
        self.run(file_id).await
    }

    async fn reopen(&self, file_id: FileId) -> Result<(), ProcessingError> {
        self.services.records.set_rescan_available(file_id, false).await?;
        self.services.records.set_status(file_id, FileStatus::Pending).await?;
        self.services.records.set_progress(file_id, 0).await?;
        Ok(())
    }

    async fn execute(
        &self,
        record: &FileRecord,
        state: &mut RunState,
        progress: &Arc<ProgressCounter>,
    ) -> Result<(), ProcessingError> {
        let file_id = record.id;

        self.transition(file_id, state, FileStatus::Downloading).await?;
        let genome = self.services.source.fetch(record).await?;
        let path = genome.path().to_path_buf();
        state.genome = Some(genome);

        self.transition(file_id, state, FileStatus::Detecting).await?;
        let format = sniffer::detect_format(&path, self.config.sniff_lines)?;
        self.services.records.set_format(file_id, format).await?;
        if format == GenomeFormat::Unknown {
            return Err(ProcessingError::DetectionFailure {
                first_line: sniffer::first_line(&path)?,
            });
        }
        info!("Detected {} export for file {}", format, file_id);

        self.transition(file_id, state, FileStatus::Processing).await?;
        let table = parse_genome(format, &path)?;
        if let Some(sequenced_at) = &table.sequenced_at {
            self.services.records.set_sequenced_at(file_id, sequenced_at).await?;
        }

        let gene_count = self.services.catalog.gene_count().await?;
        progress
            .set_total(table.rows.len() as u64 + gene_count, self.config.ingest_latency)
            .await;

        let ingestor = VariantIngestor::new(Arc::clone(&self.services.catalog), Arc::clone(&self.services.store));
        let ingested = ingestor.ingest(file_id, &table.rows, progress).await?;
        drop(table);

        self.transition(file_id, state, FileStatus::Aggregating).await?;
        progress.set_latency(self.config.aggregate_latency).await;

        let cleared = self.services.store.clear_scores(file_id).await?;
        if cleared > 0 {
            info!("Cleared {} previous gene scores for file {}", cleared, file_id);
        }

        let aggregator = GeneReputationAggregator::new(
            Arc::clone(&self.services.catalog),
            Arc::clone(&self.services.store),
            self.config.batches,
        );
        let aggregated = aggregator.aggregate(file_id, Arc::clone(progress)).await?;
        // Catalog genes without a reported variant have nothing left to score
        progress.advance_to(99).await;

        self.services.records.set_rescan_available(file_id, true).await?;
        self.transition(file_id, state, FileStatus::Complete).await?;
        progress.complete().await;

        info!(
            "File {} complete: {} rows ({} matched), {} genes scored",
            file_id, ingested.rows, ingested.matched, aggregated.scored
        );
        Ok(())
    }

    async fn transition(
        &self,
        file_id: FileId,
        state: &mut RunState,
        next: FileStatus,
    ) -> Result<(), ProcessingError> {
        if !state.status.can_transition_to(next) {
            return Err(ProcessingError::InvalidTransition {
                from: state.status,
                to: next,
            });
        }

        self.services.records.set_status(file_id, next).await?;
        debug!("File {}: {} -> {}", file_id, state.status, next);
        state.status = next;
        Ok(())
    }

    async fn finish_success(&self, record: &FileRecord, genome: Option<FetchedGenome>) {
        let record = self.services.records.get(record.id).await.unwrap_or_else(|e| {
            warn!("Could not reload file record {}: {}", record.id, e);
            record.clone()
        });

        if let Err(e) = self.services.notifier.send_completion(&record.recipient, &record).await {
            warn!("Completion notification for file {} failed: {:#}", record.id, e);
        }

        release(genome).await;
    }

    async fn finish_failure(&self, record: &FileRecord, state: &mut RunState, cause: ProcessingError) {
        error!("Processing of file {} failed during {}: {}", record.id, state.status, cause);

        if state.status.can_transition_to(FileStatus::Failed) {
            match self.services.records.set_status(record.id, FileStatus::Failed).await {
                Ok(()) => state.status = FileStatus::Failed,
                Err(e) => error!("Could not mark file {} as failed: {}", record.id, e),
            }
        }

        let record = self.services.records.get(record.id).await.unwrap_or_else(|_| record.clone());
        if let Err(e) = self.services.notifier.handle_failure(&record, &cause).await {
            error!("Failure handler for file {} failed: {:#}", record.id, e);
        }

        release(state.genome.take()).await;
    }
}

async fn release(genome: Option<FetchedGenome>) {
    if let Some(genome) = genome {
        // Errors are logged inside; the TempDir guard removes what is left
        let _ = secure_delete::release(genome).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCatalog, InMemoryStore, Notification, RecordingNotifier};
    use crate::models::{Gene, ReferenceVariant};
    use crate::storage::LocalGenomeSource;
    use tempfile::TempDir;
    use uuid::Uuid;

    const TWENTYTHREE: &str = "\
# This data file generated by 23andMe at: Thu Mar 07 12:00:00 2019
# rsid\tchromosome\tposition\tgenotype
rs4680\t22\t19951271\tAA
rs1801133\t1\t11856378\tAG
rs0000001\t1\t100\tTT
";

    struct Harness {
        uploads: TempDir,
        store: Arc<InMemoryStore>,
        notifier: Arc<RecordingNotifier>,
        processor: GenomeFileProcessor,
    }

    fn catalog() -> InMemoryCatalog {
        let mut catalog = InMemoryCatalog::new();
        catalog.add_gene(
            Gene { id: 1, name: "COMT".to_string() },
            vec![ReferenceVariant::new("rs4680", "A", 2.0)],
        );
        catalog.add_gene(
            Gene { id: 2, name: "MTHFR".to_string() },
            vec![ReferenceVariant::new("rs1801133", "A", 3.0)],
        );
        catalog.add_gene(Gene { id: 3, name: "APOE".to_string() }, vec![]);
        catalog
    }

    fn harness(notifier: RecordingNotifier) -> Harness {
        let uploads = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(notifier);

        let services = ProcessorServices {
            catalog: Arc::new(catalog()),
            store: store.clone(),
            records: store.clone(),
            source: Arc::new(LocalGenomeSource::new(uploads.path())),
            notifier: notifier.clone(),
        };

        Harness {
            uploads,
            store,
            notifier,
            processor: GenomeFileProcessor::new(services, ProcessorConfig::default()),
        }
    }

    impl Harness {
        async fn upload(&self, name: &str, contents: &str) -> FileId {
            std::fs::write(self.uploads.path().join(name), contents).unwrap();
            let id = Uuid::new_v4();
            self.store.insert_file(FileRecord::new(id, "user@example.com", name)).await;
            id
        }
    }

    #[tokio::test]
    async fn test_successful_run() {
        let h = harness(RecordingNotifier::new());
        let id = h.upload("genome.txt", TWENTYTHREE).await;

        assert_eq!(h.processor.run(id).await, FileStatus::Complete);

        let record = h.store.get_file(id).await.unwrap();
        assert_eq!(record.status, FileStatus::Complete);
        assert_eq!(record.format, GenomeFormat::TwentyThreeAndMe);
        assert_eq!(record.progress, 100);
        assert!(record.rescan_available);
        assert!(record.completed_at.is_some());
        assert_eq!(record.sequenced_at.as_deref(), Some("Thu Mar 07 12:00:00 2019"));

        let scores = h.store.scores(id).await;
        assert_eq!(scores.len(), 2);
        // rs4680 AA vs minor A → homozygous minor, Bad: 1.3^(2 × 1.5)
        assert!((scores[&1] - 1.3f64.powf(3.0)).abs() < 1e-9);
        // rs1801133 AG → heterozygous, Okay: 1.3^(3 × 0.5)
        assert!((scores[&2] - 1.3f64.powf(1.5)).abs() < 1e-9);

        assert_eq!(
            h.notifier.sent().await,
            vec![Notification::Completion {
                recipient: "user@example.com".to_string(),
                file_id: id,
            }]
        );
        // The upload itself is not the working copy
        assert!(h.uploads.path().join("genome.txt").exists());
    }

    #[tokio::test]
    async fn test_progress_reaches_100_once() {
        let h = harness(RecordingNotifier::new());
        let id = h.upload("genome.txt", TWENTYTHREE).await;

        h.processor.run(id).await;

        let history = h.store.progress_history(id).await;
        assert!(history.windows(2).all(|w| w[0] < w[1]), "{:?}", history);
        assert_eq!(history.iter().filter(|p| **p == 100).count(), 1);
        // APOE has no variants and is never visited; aggregation still ends at 99
        assert_eq!(history[history.len() - 2..], [99, 100]);
    }

    #[tokio::test]
    async fn test_unknown_format_fails_with_first_line() {
        let h = harness(RecordingNotifier::new());
        let id = h.upload("notes.txt", "hello world\nnothing genomic here\n").await;

        assert_eq!(h.processor.run(id).await, FileStatus::Failed);

        let record = h.store.get_file(id).await.unwrap();
        assert_eq!(record.status, FileStatus::Failed);
        assert_eq!(record.format, GenomeFormat::Unknown);
        assert!(h.store.scores(id).await.is_empty());

        match h.notifier.sent().await.as_slice() {
            [Notification::Failure { file_id, message }] => {
                assert_eq!(*file_id, id);
                assert!(message.contains("hello world"), "{}", message);
            }
            other => panic!("Expected a single failure notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_parse_failure_fails_run() {
        let h = harness(RecordingNotifier::new());
        let id = h
            .upload("genome.txt", "# This data file generated by 23andMe at: today\nrs4680\t22\t1\tAA\n")
            .await;

        assert_eq!(h.processor.run(id).await, FileStatus::Failed);
        assert!(matches!(
            h.notifier.sent().await.as_slice(),
            [Notification::Failure { .. }]
        ));
        assert_eq!(h.store.call_count(id).await, 0);
    }

    #[tokio::test]
    async fn test_missing_upload_fails_run() {
        let h = harness(RecordingNotifier::new());
        let id = Uuid::new_v4();
        h.store.insert_file(FileRecord::new(id, "user@example.com", "gone.txt")).await;

        assert_eq!(h.processor.run(id).await, FileStatus::Failed);
        assert_eq!(h.store.get_file(id).await.unwrap().status, FileStatus::Failed);
    }

    #[tokio::test]
    async fn test_completion_notifier_failure_keeps_complete() {
        let h = harness(RecordingNotifier::failing_completion());
        let id = h.upload("genome.txt", TWENTYTHREE).await;

        assert_eq!(h.processor.run(id).await, FileStatus::Complete);
        assert_eq!(h.store.get_file(id).await.unwrap().status, FileStatus::Complete);
        // No failure handler after a completed run
        assert!(h
            .notifier
            .sent()
            .await
            .iter()
            .all(|n| matches!(n, Notification::Completion { .. })));
    }

    #[tokio::test]
    async fn test_terminal_file_is_skipped() {
        let h = harness(RecordingNotifier::new());
        let id = h.upload("genome.txt", TWENTYTHREE).await;
        h.processor.run(id).await;

        assert_eq!(h.processor.run(id).await, FileStatus::Complete);
        assert_eq!(h.notifier.sent().await.len(), 1);
    }

    const TWENTYTHREE_RESEQUENCED: &str = "\
# This data file generated by 23andMe at: Fri Jan 10 09:00:00 2020
# rsid\tchromosome\tposition\tgenotype
rs4680\t22\t19951271\tGG
rs1801133\t1\t11856378\tAG
";

    #[tokio::test]
    async fn test_rescan_recomputes_scores() {
        let h = harness(RecordingNotifier::new());
        let id = h.upload("genome.txt", TWENTYTHREE).await;
        h.processor.run(id).await;
        assert!((h.store.scores(id).await[&1] - 1.3f64.powf(3.0)).abs() < 1e-9);

        std::fs::write(h.uploads.path().join("genome.txt"), TWENTYTHREE_RESEQUENCED).unwrap();
        assert_eq!(h.processor.rescan(id).await, FileStatus::Complete);

        let call = h.store.find_call(id, "rs4680").await.unwrap().unwrap();
        assert_eq!(call.genotype, "GG");
        assert_eq!(call.zygosity, crate::zygosity::Zygosity::HomozygousMajor);

        let scores = h.store.scores(id).await;
        assert_eq!(scores[&1], 0.0);
        assert!((scores[&2] - 1.3f64.powf(1.5)).abs() < 1e-9);

        let record = h.store.get_file(id).await.unwrap();
        assert_eq!(record.status, FileStatus::Complete);
        assert_eq!(record.progress, 100);
        assert!(record.rescan_available);
        assert_eq!(record.sequenced_at.as_deref(), Some("Fri Jan 10 09:00:00 2020"));
        assert_eq!(h.notifier.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn test_reopened_file_does_not_keep_stale_scores() {
        let h = harness(RecordingNotifier::new());
        let id = h.upload("genome.txt", TWENTYTHREE).await;
        h.processor.run(id).await;

        std::fs::write(h.uploads.path().join("genome.txt"), TWENTYTHREE_RESEQUENCED).unwrap();
        h.store.set_status(id, FileStatus::Pending).await.unwrap();

        assert_eq!(h.processor.run(id).await, FileStatus::Complete);
        assert_eq!(h.store.score_for(id, 1).await, Some(0.0));
    }

    #[tokio::test]
    async fn test_rescan_requires_completed_file() {
        let h = harness(RecordingNotifier::new());
        let pending = h.upload("genome.txt", TWENTYTHREE).await;
        assert_eq!(h.processor.rescan(pending).await, FileStatus::Pending);

        let failed = h.upload("notes.txt", "hello world\n").await;
        h.processor.run(failed).await;
        assert_eq!(h.processor.rescan(failed).await, FileStatus::Failed);

        let locked = h.upload("locked.txt", TWENTYTHREE).await;
        h.processor.run(locked).await;
        h.store.set_rescan_available(locked, false).await.unwrap();
        assert_eq!(h.processor.rescan(locked).await, FileStatus::Complete);

        // Only the failure and the one completion were notified
        assert_eq!(h.notifier.sent().await.len(), 2);
        assert_eq!(h.store.call_count(pending).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_file_id_reports_failed() {
        let h = harness(RecordingNotifier::new());
        assert_eq!(h.processor.run(Uuid::new_v4()).await, FileStatus::Failed);
        assert!(h.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_ancestry_run() {
        let h = harness(RecordingNotifier::new());
        let id = h
            .upload(
                "ancestry.txt",
                "#AncestryDNA raw data download\nrsid\tchromosome\tposition\tallele1\tallele2\nrs4680\t22\t19951271\tG\tG\n",
            )
            .await;

        assert_eq!(h.processor.run(id).await, FileStatus::Complete);
        assert_eq!(h.store.get_file(id).await.unwrap().format, GenomeFormat::AncestryDna);
        // Homozygous major only → gene scored at zero
        assert_eq!(h.store.scores(id).await.get(&1), Some(&0.0));
    }
}
