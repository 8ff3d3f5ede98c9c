// ==============================================================================
// lib.rs - Reputation Processor Library
// ==============================================================================
// Description: Genotype file ingestion, zygosity classification and per-gene
//              reputation scoring
// Version: 1.0.0
// ==============================================================================

pub mod aggregator;
pub mod error;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod parsers;
pub mod processor;
pub mod progress;
pub mod reputation;
pub mod secure_delete;
pub mod services;
pub mod sniffer;
pub mod storage;
pub mod zygosity;

pub use error::{ProcessingError, StoreError};
pub use processor::{GenomeFileProcessor, ProcessorServices};
