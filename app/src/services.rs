// ==============================================================================
// services.rs - External Collaborator Contracts
// ==============================================================================
// Description: Narrow interfaces to the reference catalog, persistence,
//              raw file storage and notification services
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::{ProcessingError, StoreError};
use crate::models::{
    FileId, FileRecord, FileStatus, Gene, GeneReputationScore, GenomeFormat, ReferenceVariant,
    UserVariantCall,
};

/// Read-only reference catalog
#[async_trait]
pub trait ReferenceCatalog: Send + Sync {
    async fn find_variant(&self, rsid: &str) -> Result<Option<ReferenceVariant>, StoreError>;

    /// Distinct genes owning any of the given variants, ordered by gene id
    async fn genes_for_variant_ids(&self, rsids: &[String]) -> Result<Vec<Gene>, StoreError>;

    async fn variants_of_gene(&self, gene: &Gene) -> Result<Vec<ReferenceVariant>, StoreError>;

    /// Total number of genes in the catalog
    async fn gene_count(&self) -> Result<u64, StoreError>;
}

/// Per-file classification and score persistence
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Create the call, or overwrite genotype and zygosity of the existing
    /// call for the same (file, rsid)
    async fn upsert_call(&self, call: UserVariantCall) -> Result<(), StoreError>;

    async fn find_call(&self, file_id: FileId, rsid: &str) -> Result<Option<UserVariantCall>, StoreError>;

    /// Distinct variant ids with a call for this file
    async fn reported_variant_ids(&self, file_id: FileId) -> Result<Vec<String>, StoreError>;

    /// Fails with `StoreError::Conflict` if a score already exists for the
    /// (file, gene) pair
    async fn create_score(&self, score: GeneReputationScore) -> Result<(), StoreError>;

    /// Drop every score of the file before it is aggregated again; returns
    /// the number removed
    async fn clear_scores(&self, file_id: FileId) -> Result<u64, StoreError>;
}

/// Status and progress of uploaded files
#[async_trait]
pub trait FileRecords: Send + Sync {
    async fn get(&self, file_id: FileId) -> Result<FileRecord, StoreError>;

    async fn set_status(&self, file_id: FileId, status: FileStatus) -> Result<(), StoreError>;

    async fn set_format(&self, file_id: FileId, format: GenomeFormat) -> Result<(), StoreError>;

    async fn set_progress(&self, file_id: FileId, percent: u8) -> Result<(), StoreError>;

    async fn set_sequenced_at(&self, file_id: FileId, sequenced_at: &str) -> Result<(), StoreError>;

    async fn set_rescan_available(&self, file_id: FileId, available: bool) -> Result<(), StoreError>;
}

/// Local working copy of an uploaded file, scoped to one run
#[derive(Debug)]
pub struct FetchedGenome {
    pub path: PathBuf,
    pub original_name: String,
    /// Removed (with its contents) when dropped
    pub workspace: TempDir,
}

impl FetchedGenome {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Raw file storage
#[async_trait]
pub trait GenomeSource: Send + Sync {
    async fn fetch(&self, record: &FileRecord) -> Result<FetchedGenome, ProcessingError>;
}

/// Outbound notifications; exactly one of the two is invoked per run
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_completion(&self, recipient: &str, record: &FileRecord) -> anyhow::Result<()>;

    async fn handle_failure(&self, record: &FileRecord, error: &ProcessingError) -> anyhow::Result<()>;
}
