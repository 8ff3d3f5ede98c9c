// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Vendor adapters normalizing genome exports into
//              (rsid, chromosome, position, genotype) rows
// Version: 2.0.0
// ==============================================================================

pub mod genome23andme;
pub mod tabular;
pub mod vcf;

pub use genome23andme::Genome23Parser;
pub use tabular::{ColumnLayout, TabularParser};
pub use vcf::VcfGenotypeParser;

use std::path::Path;
use thiserror::Error;

use crate::models::{GenomeFormat, RawGenotypeRow};

/// Errors that can occur while normalizing a vendor export
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed delimited data: {0}")]
    Csv(#[from] csv::Error),

    #[error("Header row starting with '{marker}' not found")]
    MissingHeader { marker: String },

    #[error("Required column '{column}' missing from header")]
    MissingColumn { column: String },

    #[error("Invalid line format at line {line}: {details}")]
    InvalidFormat { line: usize, details: String },

    #[error("Invalid VCF record {record}: {details}")]
    InvalidRecord { record: usize, details: String },

    #[error("Invalid position value at line {line}: {value}")]
    InvalidPosition { line: usize, value: String },

    #[error("No ingestion adapter for format {0}")]
    UnsupportedFormat(GenomeFormat),
}

/// Normalized content of one uploaded file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenomeTable {
    /// Rows in file order
    pub rows: Vec<RawGenotypeRow>,
    /// Sequencing date printed by the vendor, if any
    pub sequenced_at: Option<String>,
}

/// Dispatch to the adapter for a detected format
pub fn parse_genome(format: GenomeFormat, path: impl AsRef<Path>) -> Result<GenomeTable, ParseError> {
    let path = path.as_ref();
    match format {
        GenomeFormat::TwentyThreeAndMe => Genome23Parser::new().parse(path),
        GenomeFormat::AncestryDna => TabularParser::new(ColumnLayout::ancestry()).parse(path),
        GenomeFormat::Courtagen => TabularParser::new(ColumnLayout::courtagen()).parse(path),
        GenomeFormat::FamilyTreeDna => TabularParser::new(ColumnLayout::family_tree()).parse(path),
        GenomeFormat::Vcf => VcfGenotypeParser::new().parse(path),
        GenomeFormat::Unknown => Err(ParseError::UnsupportedFormat(format)),
    }
}

pub(crate) fn parse_position(value: &str, line: usize) -> Result<u64, ParseError> {
    value.trim().parse::<u64>().map_err(|_| ParseError::InvalidPosition {
        line,
        value: value.to_string(),
    })
}
