// ==============================================================================
// ingest.rs - Variant Ingestion
// ==============================================================================
// Description: Classifies normalized genotype rows against the reference
//              catalog and upserts one call per (file, variant id)
// Version: 1.0.0
// ==============================================================================

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{FileId, RawGenotypeRow, UserVariantCall};
use crate::progress::ProgressCounter;
use crate::services::{ReferenceCatalog, ResultStore};
use crate::zygosity::classify;

/// Row counts from one ingestion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub rows: usize,
    pub matched: usize,
    /// Rows whose variant id is absent from the catalog
    pub skipped: usize,
}

pub struct VariantIngestor {
    catalog: Arc<dyn ReferenceCatalog>,
    store: Arc<dyn ResultStore>,
}

impl VariantIngestor {
    pub fn new(catalog: Arc<dyn ReferenceCatalog>, store: Arc<dyn ResultStore>) -> Self {
        Self { catalog, store }
    }

    /// Classify and persist every row of a normalized table
    ///
    /// Rows without a catalog match are skipped silently. Progress advances
    /// by one unit per row either way.
    pub async fn ingest(
        &self,
        file_id: FileId,
        rows: &[RawGenotypeRow],
        progress: &ProgressCounter,
    ) -> Result<IngestSummary, StoreError> {
        info!("Processing {} rows for file {}", rows.len(), file_id);

        let mut summary = IngestSummary {
            rows: rows.len(),
            ..IngestSummary::default()
        };

        for row in rows {
            match self.catalog.find_variant(&row.rsid).await? {
                Some(reference) => {
                    let zygosity = classify(&row.genotype, &reference.minor_allele);
                    self.store
                        .upsert_call(UserVariantCall {
                            file_id,
                            rsid: row.rsid.clone(),
                            genotype: row.genotype.clone(),
                            zygosity,
                        })
                        .await?;
                    summary.matched += 1;
                }
                None => summary.skipped += 1,
            }

            progress.advance().await;
        }

        debug!(
            "Ingested file {}: {} matched, {} not in catalog",
            file_id, summary.matched, summary.skipped
        );
        Ok(summary)
    }
}
