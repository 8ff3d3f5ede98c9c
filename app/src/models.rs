// ==============================================================================
// models.rs - Reference Catalog and Per-File Result Models
// ==============================================================================
// Description: Data structures shared by ingestion, scoring and orchestration
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::zygosity::Zygosity;

/// Opaque identifier of an uploaded genome file
pub type FileId = Uuid;

/// Catalog gene identifier
pub type GeneId = i64;

/// Catalog variant with scoring policy attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceVariant {
    /// Variant identifier (e.g., "rs4680")
    pub rsid: String,

    /// Minor allele (single base, or "I"/"D" for indels)
    pub minor_allele: String,

    /// Importance weight supplied by the catalog
    pub importance: f64,

    /// Override colors, one per zygosity bucket ("green", "yellow", "red", "gray")
    #[serde(default)]
    pub heterozygous_color: Option<String>,
    #[serde(default)]
    pub homozygous_minor_color: Option<String>,
    #[serde(default)]
    pub homozygous_major_color: Option<String>,
}

impl ReferenceVariant {
    pub fn new(rsid: impl Into<String>, minor_allele: impl Into<String>, importance: f64) -> Self {
        Self {
            rsid: rsid.into(),
            minor_allele: minor_allele.into(),
            importance,
            heterozygous_color: None,
            homozygous_minor_color: None,
            homozygous_major_color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gene {
    pub id: GeneId,
    pub name: String,
}

/// One line of an uploaded file after vendor normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawGenotypeRow {
    /// Variant identifier as reported by the vendor
    pub rsid: String,
    /// Chromosome ("1"-"22", "X", "Y", "MT")
    pub chromosome: String,
    /// Base pair position
    pub position: u64,
    /// Genotype string (e.g., "AG", "--", "I")
    pub genotype: String,
}

/// Classification of one reported variant for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserVariantCall {
    pub file_id: FileId,
    pub rsid: String,
    pub genotype: String,
    pub zygosity: Zygosity,
}

/// Aggregate reputation of one gene for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneReputationScore {
    pub file_id: FileId,
    pub gene_id: GeneId,
    pub score: f64,
}

/// Recognized vendor export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenomeFormat {
    Vcf,
    /// 23andMe: tab-separated, commented header ending in "# rsid ..."
    TwentyThreeAndMe,
    /// AncestryDNA: tab-separated with separate allele1/allele2 columns
    AncestryDna,
    /// Courtagen: headered tab-separated rsid/chromosome/position/genotype
    Courtagen,
    /// FamilyTreeDNA: comma-separated RSID,CHROMOSOME,POSITION,RESULT
    FamilyTreeDna,
    Unknown,
}

impl GenomeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenomeFormat::Vcf => "vcf",
            GenomeFormat::TwentyThreeAndMe => "23andme",
            GenomeFormat::AncestryDna => "ancestry",
            GenomeFormat::Courtagen => "courtagen",
            GenomeFormat::FamilyTreeDna => "family_tree",
            GenomeFormat::Unknown => "unknown",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            GenomeFormat::Vcf => "VCF",
            GenomeFormat::TwentyThreeAndMe => "23andMe",
            GenomeFormat::AncestryDna => "AncestryDNA",
            GenomeFormat::Courtagen => "Courtagen",
            GenomeFormat::FamilyTreeDna => "FamilyTreeDNA",
            GenomeFormat::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for GenomeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for GenomeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vcf" => Ok(GenomeFormat::Vcf),
            "23andme" => Ok(GenomeFormat::TwentyThreeAndMe),
            "ancestry" => Ok(GenomeFormat::AncestryDna),
            "courtagen" => Ok(GenomeFormat::Courtagen),
            "family_tree" => Ok(GenomeFormat::FamilyTreeDna),
            "unknown" => Ok(GenomeFormat::Unknown),
            other => Err(format!("unknown genome format '{}'", other)),
        }
    }
}

/// Processing state of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Downloading,
    Detecting,
    Processing,
    Aggregating,
    Complete,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Downloading => "downloading",
            FileStatus::Detecting => "detecting",
            FileStatus::Processing => "processing",
            FileStatus::Aggregating => "aggregating",
            FileStatus::Complete => "complete",
            FileStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Complete | FileStatus::Failed)
    }

    /// Forward-only pipeline; FAILED is reachable from any non-terminal state
    /// and a COMPLETE file may be reopened as PENDING for a re-scan
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        use FileStatus::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Complete, Pending)
            | (Pending, Downloading)
            | (Downloading, Detecting)
            | (Detecting, Processing)
            | (Processing, Aggregating)
            | (Aggregating, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "downloading" => Ok(FileStatus::Downloading),
            "detecting" => Ok(FileStatus::Detecting),
            "processing" => Ok(FileStatus::Processing),
            "aggregating" => Ok(FileStatus::Aggregating),
            "complete" => Ok(FileStatus::Complete),
            "failed" => Ok(FileStatus::Failed),
            other => Err(format!("unknown file status '{}'", other)),
        }
    }
}

/// Uploaded file as tracked by the persistence collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    /// Notification recipient (owner's email address)
    pub recipient: String,
    pub original_name: String,
    pub status: FileStatus,
    pub format: GenomeFormat,
    /// Percent complete (0-100)
    pub progress: u8,
    /// Sequencing date as printed by the vendor, if any
    pub sequenced_at: Option<String>,
    pub rescan_available: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub fn new(id: FileId, recipient: impl Into<String>, original_name: impl Into<String>) -> Self {
        Self {
            id,
            recipient: recipient.into(),
            original_name: original_name.into(),
            status: FileStatus::Pending,
            format: GenomeFormat::Unknown,
            progress: 0,
            sequenced_at: None,
            rescan_available: false,
            completed_at: None,
        }
    }
}

/// Tunables for one processing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Number of parallel aggregation batches
    pub batches: usize,
    /// Progress flush interval (units) while ingesting rows
    pub ingest_latency: u64,
    /// Progress flush interval (units) while scoring genes
    pub aggregate_latency: u64,
    /// Lines inspected by the format sniffer
    pub sniff_lines: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batches: 8,
            ingest_latency: 100,
            aggregate_latency: 200,
            sniff_lines: 50,
        }
    }
}
