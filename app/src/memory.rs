// ==============================================================================
// memory.rs - In-Process Catalog, Store and Notifier
// ==============================================================================
// Description: Collaborator implementations held entirely in memory, used by
//              the command-line pipeline and by tests
// Version: 1.0.0
// ==============================================================================
// Catalog file layout (JSON):
//   {
//     "genes": [
//       { "id": 1, "name": "COMT",
//         "variants": [ { "rsid": "rs4680", "minor_allele": "A", "importance": 2.0,
//                         "homozygous_minor_color": "red" } ] }
//     ]
//   }
// ==============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::error::{ProcessingError, StoreError};
use crate::models::{
    FileId, FileRecord, FileStatus, Gene, GeneId, GeneReputationScore, GenomeFormat,
    ReferenceVariant, UserVariantCall,
};
use crate::services::{FileRecords, Notifier, ReferenceCatalog, ResultStore};

// ------------------------------------------------------------------------------
// Reference catalog
// ------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CatalogFile {
    genes: Vec<CatalogGene>,
}

#[derive(Debug, Deserialize)]
struct CatalogGene {
    id: GeneId,
    name: String,
    #[serde(default)]
    variants: Vec<ReferenceVariant>,
}

/// Reference catalog loaded up front; a variant may belong to several genes
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    genes: BTreeMap<GeneId, Gene>,
    /// Variant ids of each gene, in insertion order
    members: HashMap<GeneId, Vec<String>>,
    variants: HashMap<String, ReferenceVariant>,
    owners: HashMap<String, BTreeSet<GeneId>>,
    #[cfg(test)]
    failing: BTreeSet<GeneId>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        Self::from_json_str(&content).with_context(|| format!("Invalid catalog {}", path.display()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;

        let mut catalog = Self::new();
        for gene in file.genes {
            catalog.add_gene(
                Gene {
                    id: gene.id,
                    name: gene.name,
                },
                gene.variants,
            );
        }

        info!(
            "Loaded catalog: {} genes, {} variants",
            catalog.genes.len(),
            catalog.variants.len()
        );
        Ok(catalog)
    }

    /// Register a gene and its variants; a variant seen again replaces the
    /// earlier definition
    pub fn add_gene(&mut self, gene: Gene, variants: Vec<ReferenceVariant>) {
        let members = self.members.entry(gene.id).or_default();
        for variant in variants {
            if !members.contains(&variant.rsid) {
                members.push(variant.rsid.clone());
            }
            self.owners.entry(variant.rsid.clone()).or_default().insert(gene.id);
            self.variants.insert(variant.rsid.clone(), variant);
        }
        self.genes.insert(gene.id, gene);
    }

    pub fn gene(&self, gene_id: GeneId) -> Option<&Gene> {
        self.genes.get(&gene_id)
    }

    #[cfg(test)]
    pub(crate) fn fail_variants_of(&mut self, gene_id: GeneId) {
        self.failing.insert(gene_id);
    }
}

#[async_trait]
impl ReferenceCatalog for InMemoryCatalog {
    async fn find_variant(&self, rsid: &str) -> Result<Option<ReferenceVariant>, StoreError> {
        Ok(self.variants.get(rsid).cloned())
    }

    async fn genes_for_variant_ids(&self, rsids: &[String]) -> Result<Vec<Gene>, StoreError> {
        let ids: BTreeSet<GeneId> = rsids
            .iter()
            .filter_map(|rsid| self.owners.get(rsid))
            .flatten()
            .copied()
            .collect();

        Ok(ids.iter().filter_map(|id| self.genes.get(id)).cloned().collect())
    }

    async fn variants_of_gene(&self, gene: &Gene) -> Result<Vec<ReferenceVariant>, StoreError> {
        #[cfg(test)]
        if self.failing.contains(&gene.id) {
            return Err(StoreError::Backend(format!("variants of gene {} unavailable", gene.id)));
        }

        Ok(self
            .members
            .get(&gene.id)
            .map(|rsids| rsids.iter().filter_map(|rsid| self.variants.get(rsid)).cloned().collect())
            .unwrap_or_default())
    }

    async fn gene_count(&self) -> Result<u64, StoreError> {
        Ok(self.genes.len() as u64)
    }
}

// ------------------------------------------------------------------------------
// Result store and file records
// ------------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    files: HashMap<FileId, FileRecord>,
    /// Every percentage written, in order
    progress_history: HashMap<FileId, Vec<u8>>,
    calls: HashMap<(FileId, String), UserVariantCall>,
    scores: HashMap<(FileId, GeneId), f64>,
}

/// File records, calls and scores behind a single lock
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_file(&self, record: FileRecord) {
        self.state.write().await.files.insert(record.id, record);
    }

    pub async fn get_file(&self, file_id: FileId) -> Option<FileRecord> {
        self.state.read().await.files.get(&file_id).cloned()
    }

    pub async fn progress_history(&self, file_id: FileId) -> Vec<u8> {
        self.state
            .read()
            .await
            .progress_history
            .get(&file_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn call_count(&self, file_id: FileId) -> usize {
        self.state.read().await.calls.keys().filter(|(id, _)| *id == file_id).count()
    }

    pub async fn score_for(&self, file_id: FileId, gene_id: GeneId) -> Option<f64> {
        self.state.read().await.scores.get(&(file_id, gene_id)).copied()
    }

    /// All persisted scores of a file keyed by gene id
    pub async fn scores(&self, file_id: FileId) -> HashMap<GeneId, f64> {
        self.state
            .read()
            .await
            .scores
            .iter()
            .filter(|((id, _), _)| *id == file_id)
            .map(|((_, gene_id), score)| (*gene_id, *score))
            .collect()
    }

    async fn update_file<F>(&self, file_id: FileId, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut FileRecord) + Send,
    {
        let mut state = self.state.write().await;
        let record = state.files.get_mut(&file_id).ok_or(StoreError::FileNotFound(file_id))?;
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl ResultStore for InMemoryStore {
    async fn upsert_call(&self, call: UserVariantCall) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.calls.insert((call.file_id, call.rsid.clone()), call);
        Ok(())
    }

    async fn find_call(&self, file_id: FileId, rsid: &str) -> Result<Option<UserVariantCall>, StoreError> {
        Ok(self.state.read().await.calls.get(&(file_id, rsid.to_string())).cloned())
    }

    async fn reported_variant_ids(&self, file_id: FileId) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        let mut rsids: Vec<String> = state
            .calls
            .keys()
            .filter(|(id, _)| *id == file_id)
            .map(|(_, rsid)| rsid.clone())
            .collect();
        rsids.sort();
        Ok(rsids)
    }

    async fn create_score(&self, score: GeneReputationScore) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let key = (score.file_id, score.gene_id);
        if state.scores.contains_key(&key) {
            return Err(StoreError::duplicate_score(score.file_id, score.gene_id));
        }
        state.scores.insert(key, score.score);
        Ok(())
    }

    async fn clear_scores(&self, file_id: FileId) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.scores.len();
        state.scores.retain(|(id, _), _| *id != file_id);
        Ok((before - state.scores.len()) as u64)
    }
}

#[async_trait]
impl FileRecords for InMemoryStore {
    async fn get(&self, file_id: FileId) -> Result<FileRecord, StoreError> {
        self.get_file(file_id).await.ok_or(StoreError::FileNotFound(file_id))
    }

    async fn set_status(&self, file_id: FileId, status: FileStatus) -> Result<(), StoreError> {
        self.update_file(file_id, |record| {
            record.status = status;
            if status == FileStatus::Complete {
                record.completed_at = Some(Utc::now());
            }
        })
        .await
    }

    async fn set_format(&self, file_id: FileId, format: GenomeFormat) -> Result<(), StoreError> {
        self.update_file(file_id, |record| record.format = format).await
    }

    async fn set_progress(&self, file_id: FileId, percent: u8) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = state.files.get_mut(&file_id).ok_or(StoreError::FileNotFound(file_id))?;
        record.progress = percent;
        state.progress_history.entry(file_id).or_default().push(percent);
        Ok(())
    }

    async fn set_sequenced_at(&self, file_id: FileId, sequenced_at: &str) -> Result<(), StoreError> {
        let sequenced_at = sequenced_at.to_string();
        self.update_file(file_id, move |record| record.sequenced_at = Some(sequenced_at))
            .await
    }

    async fn set_rescan_available(&self, file_id: FileId, available: bool) -> Result<(), StoreError> {
        self.update_file(file_id, |record| record.rescan_available = available).await
    }
}

// ------------------------------------------------------------------------------
// Notifiers
// ------------------------------------------------------------------------------

/// Notifier that only logs; used when no mail transport is configured
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_completion(&self, recipient: &str, record: &FileRecord) -> anyhow::Result<()> {
        info!(
            "Processing of {} ({}) complete, notifying {}",
            record.original_name, record.id, recipient
        );
        Ok(())
    }

    async fn handle_failure(&self, record: &FileRecord, error: &ProcessingError) -> anyhow::Result<()> {
        error!("Processing of {} ({}) failed: {}", record.original_name, record.id, error);
        Ok(())
    }
}

/// One notifier invocation
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Completion { recipient: String, file_id: FileId },
    Failure { file_id: FileId, message: String },
}

/// Notifier that remembers every call, optionally failing completions
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<Notification>>,
    fail_completion: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completion notifications record the attempt, then fail
    pub fn failing_completion() -> Self {
        Self {
            fail_completion: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_completion(&self, recipient: &str, record: &FileRecord) -> anyhow::Result<()> {
        self.sent.write().await.push(Notification::Completion {
            recipient: recipient.to_string(),
            file_id: record.id,
        });
        if self.fail_completion {
            anyhow::bail!("mail transport unavailable");
        }
        Ok(())
    }

    async fn handle_failure(&self, record: &FileRecord, error: &ProcessingError) -> anyhow::Result<()> {
        self.sent.write().await.push(Notification::Failure {
            file_id: record.id,
            message: error.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const CATALOG: &str = r#"{
        "genes": [
            { "id": 2, "name": "MTHFR", "variants": [
                { "rsid": "rs1801133", "minor_allele": "A", "importance": 3.0 },
                { "rsid": "rs1801131", "minor_allele": "G", "importance": 1.0,
                  "heterozygous_color": "yellow" }
            ] },
            { "id": 1, "name": "COMT", "variants": [
                { "rsid": "rs4680", "minor_allele": "A", "importance": 2.0 },
                { "rsid": "rs1801133", "minor_allele": "A", "importance": 3.0 }
            ] }
        ]
    }"#;

    #[tokio::test]
    async fn test_catalog_from_json() {
        let catalog = InMemoryCatalog::from_json_str(CATALOG).unwrap();

        assert_eq!(catalog.gene_count().await.unwrap(), 2);
        let variant = catalog.find_variant("rs1801131").await.unwrap().unwrap();
        assert_eq!(variant.heterozygous_color.as_deref(), Some("yellow"));
        assert!(catalog.find_variant("rs0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_genes_for_variant_ids_distinct_and_ordered() {
        let catalog = InMemoryCatalog::from_json_str(CATALOG).unwrap();

        let genes = catalog
            .genes_for_variant_ids(&["rs1801133".to_string(), "rs4680".to_string()])
            .await
            .unwrap();
        let ids: Vec<GeneId> = genes.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let mthfr = &genes[1];
        let rsids: Vec<String> = catalog
            .variants_of_gene(mthfr)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.rsid)
            .collect();
        assert_eq!(rsids, vec!["rs1801133", "rs1801131"]);
    }

    #[test]
    fn test_malformed_catalog_rejected() {
        assert!(InMemoryCatalog::from_json_str(r#"{"genes": [{"id": "x"}]}"#).is_err());
    }

    #[tokio::test]
    async fn test_duplicate_score_conflicts() {
        let store = InMemoryStore::new();
        let score = GeneReputationScore {
            file_id: Uuid::new_v4(),
            gene_id: 7,
            score: 1.0,
        };

        store.create_score(score.clone()).await.unwrap();
        let err = store.create_score(score).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_clear_scores_only_touches_one_file() {
        let store = InMemoryStore::new();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        for (file_id, gene_id) in [(first, 1), (first, 2), (second, 1)] {
            store
                .create_score(GeneReputationScore { file_id, gene_id, score: 2.0 })
                .await
                .unwrap();
        }

        assert_eq!(store.clear_scores(first).await.unwrap(), 2);
        assert!(store.scores(first).await.is_empty());
        assert_eq!(store.score_for(second, 1).await, Some(2.0));

        // Cleared pairs accept a fresh score
        store
            .create_score(GeneReputationScore { file_id: first, gene_id: 1, score: 0.0 })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_file_record_updates() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        store.insert_file(FileRecord::new(id, "user@example.com", "genome.txt")).await;

        store.set_status(id, FileStatus::Complete).await.unwrap();
        store.set_sequenced_at(id, "Mon Jan 01 2018").await.unwrap();

        let record = store.get(id).await.unwrap();
        assert_eq!(record.status, FileStatus::Complete);
        assert!(record.completed_at.is_some());
        assert_eq!(record.sequenced_at.as_deref(), Some("Mon Jan 01 2018"));

        assert!(matches!(
            store.set_progress(Uuid::new_v4(), 5).await,
            Err(StoreError::FileNotFound(_))
        ));
    }
}
