// ==============================================================================
// error.rs - Processing Error Kinds
// ==============================================================================
// Description: Error types for persistence and per-file orchestration
// Version: 1.0.0
// ==============================================================================

use thiserror::Error;

use crate::models::{FileId, FileStatus, GeneId};
use crate::parsers::ParseError;

/// Errors raised by catalog and persistence collaborators
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record already exists (e.g., duplicate score for a gene)
    #[error("Duplicate record: {0}")]
    Conflict(String),

    #[error("File record not found: {0}")]
    FileNotFound(FileId),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn duplicate_score(file_id: FileId, gene_id: GeneId) -> Self {
        StoreError::Conflict(format!("score for gene {} on file {}", gene_id, file_id))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Fatal errors for one orchestration run
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Could not identify service, first line: {first_line}")]
    DetectionFailure { first_line: String },

    #[error("Failed to parse genome file: {0}")]
    Parse(#[from] ParseError),

    #[error("Persistence failure: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to acquire genome file: {0}")]
    Storage(String),

    #[error("Aggregation worker failed: {0}")]
    AggregationWorker(String),

    #[error("Invalid status transition {from} -> {to}")]
    InvalidTransition { from: FileStatus, to: FileStatus },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
