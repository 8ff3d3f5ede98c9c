// ==============================================================================
// aggregator.rs - Parallel Gene Reputation Aggregation
// ==============================================================================
// Description: Scores every gene touched by a file's calls in independent
//              batches and persists one score per (file, gene)
// Version: 1.0.0
// ==============================================================================
// Each gene's total depends only on its own variants, summed in catalog
// order, so the result set is identical for any batch count or schedule.
// ==============================================================================

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{ProcessingError, StoreError};
use crate::models::{FileId, Gene, GeneReputationScore};
use crate::progress::ProgressCounter;
use crate::reputation::{resolve_reputation, variant_contribution, Reputation};
use crate::services::{ReferenceCatalog, ResultStore};

/// Default number of parallel batches
pub const DEFAULT_BATCHES: usize = 8;

/// Outcome of one aggregation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationSummary {
    pub genes: usize,
    pub scored: usize,
    /// Genes whose score could not be persisted (logged and skipped)
    pub conflicts: usize,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    genes: usize,
    scored: usize,
    conflicts: usize,
}

pub struct GeneReputationAggregator {
    catalog: Arc<dyn ReferenceCatalog>,
    store: Arc<dyn ResultStore>,
    batches: usize,
}

impl GeneReputationAggregator {
    pub fn new(catalog: Arc<dyn ReferenceCatalog>, store: Arc<dyn ResultStore>, batches: usize) -> Self {
        Self {
            catalog,
            store,
            batches: batches.max(1),
        }
    }

    /// Score and persist every gene with at least one variant reported by the file
    ///
    /// Blocks until every batch has finished. A batch that errors or panics
    /// fails the whole aggregation after its peers are joined.
    pub async fn aggregate(
        &self,
        file_id: FileId,
        progress: Arc<ProgressCounter>,
    ) -> Result<AggregationSummary, ProcessingError> {
        info!("Calculating gene reputations for file {}", file_id);

        let rsids = self.store.reported_variant_ids(file_id).await?;
        let genes = self.catalog.genes_for_variant_ids(&rsids).await?;
        let gene_count = genes.len();

        let workload = split(genes, self.batches);
        debug!("Scoring {} genes in {} batches", gene_count, workload.len());

        let mut workers = JoinSet::new();
        for batch in workload {
            let catalog = Arc::clone(&self.catalog);
            let store = Arc::clone(&self.store);
            let progress = Arc::clone(&progress);
            workers.spawn(async move { process_batch(catalog, store, file_id, batch, progress).await });
        }

        let mut summary = AggregationSummary::default();
        let mut first_failure = None;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(outcome)) => {
                    summary.genes += outcome.genes;
                    summary.scored += outcome.scored;
                    summary.conflicts += outcome.conflicts;
                }
                Ok(Err(e)) => {
                    error!("Aggregation batch failed for file {}: {}", file_id, e);
                    first_failure.get_or_insert_with(|| e.to_string());
                }
                Err(e) => {
                    error!("Aggregation worker panicked for file {}: {}", file_id, e);
                    first_failure.get_or_insert_with(|| e.to_string());
                }
            }
        }

        if let Some(reason) = first_failure {
            return Err(ProcessingError::AggregationWorker(reason));
        }

        info!(
            "Gene reputations for file {}: {} scored, {} conflicts",
            file_id, summary.scored, summary.conflicts
        );
        Ok(summary)
    }
}

async fn process_batch(
    catalog: Arc<dyn ReferenceCatalog>,
    store: Arc<dyn ResultStore>,
    file_id: FileId,
    genes: Vec<Gene>,
    progress: Arc<ProgressCounter>,
) -> Result<BatchOutcome, StoreError> {
    let mut outcome = BatchOutcome::default();

    for gene in genes {
        let score = score_gene(catalog.as_ref(), store.as_ref(), file_id, &gene).await?;
        outcome.genes += 1;

        match store
            .create_score(GeneReputationScore {
                file_id,
                gene_id: gene.id,
                score,
            })
            .await
        {
            Ok(()) => outcome.scored += 1,
            Err(e) => {
                warn!("Gene reputation creation failure for {} on {}: {}", gene.name, file_id, e);
                outcome.conflicts += 1;
            }
        }

        progress.advance().await;
    }

    Ok(outcome)
}

/// Total reputation of one gene for one file
pub async fn score_gene(
    catalog: &dyn ReferenceCatalog,
    store: &dyn ResultStore,
    file_id: FileId,
    gene: &Gene,
) -> Result<f64, StoreError> {
    let mut total = 0.0;

    for variant in catalog.variants_of_gene(gene).await? {
        let Some(call) = store.find_call(file_id, &variant.rsid).await? else {
            continue;
        };

        let (reputation, zygosity) = resolve_reputation(call.zygosity, &variant);
        if matches!(reputation, Reputation::Good | Reputation::Unknown) {
            continue;
        }

        total += variant_contribution(reputation, zygosity, variant.importance);
    }

    Ok(total)
}

/// Partition items into at most `n` contiguous batches whose sizes differ by
/// at most one
pub fn split<T>(items: Vec<T>, n: usize) -> Vec<Vec<T>> {
    let n = n.max(1).min(items.len());
    if n == 0 {
        return Vec::new();
    }

    let base = items.len() / n;
    let extra = items.len() % n;

    let mut batches = Vec::with_capacity(n);
    let mut iter = items.into_iter();
    for index in 0..n {
        let size = base + usize::from(index < extra);
        batches.push(iter.by_ref().take(size).collect());
    }
    batches
}
