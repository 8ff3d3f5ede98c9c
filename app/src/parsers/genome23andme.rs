// ==============================================================================
// genome23andme.rs - 23andMe Raw Data Parser
// ==============================================================================
// Description: Normalizes 23andMe raw genome exports
// Version: 1.1.0
// ==============================================================================
// Format: Tab-delimited text with header comments
// Example:
//   # This data file generated by 23andMe at: Thu Mar 07 12:00:00 2019
//   # rsid    chromosome    position    genotype
//   rs548049170    1    69869    TT
//   rs13328684    1    74792    --
//   rs9283150    1    565508    AA
// ==============================================================================

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{parse_position, GenomeTable, ParseError};
use crate::models::RawGenotypeRow;

/// Header row that ends the comment preamble
const HEADER_MARKER: &str = "# rsid";

/// Parser for 23andMe raw genome files
#[derive(Debug, Clone, Default)]
pub struct Genome23Parser;

impl Genome23Parser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a 23andMe genome file
    ///
    /// Every line up to and including the `# rsid` header row is skipped.
    /// The remaining lines are 4 tab-delimited columns:
    /// - rsid: SNP identifier
    /// - chromosome: Chromosome number or name
    /// - position: Base pair position (GRCh37)
    /// - genotype: Genotype or "--" for no-call
    ///
    /// The sequencing date is taken from the first line (text after ": ").
    pub fn parse(&self, path: impl AsRef<Path>) -> Result<GenomeTable, ParseError> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);

        let mut first_line = None;
        let mut line_number = 0;
        let mut found_header = false;
        let mut line = String::new();

        while reader.read_line(&mut line)? > 0 {
            line_number += 1;
            if first_line.is_none() {
                first_line = Some(line.trim_end().to_string());
            }
            if line.starts_with(HEADER_MARKER) {
                found_header = true;
                break;
            }
            line.clear();
        }

        if !found_header {
            return Err(ParseError::MissingHeader {
                marker: HEADER_MARKER.to_string(),
            });
        }

        let mut rows = Vec::new();
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        for result in csv_reader.records() {
            let record = result?;
            let line = line_number + record.position().map_or(0, |p| p.line() as usize);

            if record.iter().all(str::is_empty) {
                continue;
            }
            rows.push(self.parse_record(&record, line)?);
        }

        Ok(GenomeTable {
            rows,
            sequenced_at: first_line.as_deref().and_then(sequenced_at),
        })
    }

    /// Parse a single data row from the 23andMe file
    fn parse_record(&self, record: &csv::StringRecord, line: usize) -> Result<RawGenotypeRow, ParseError> {
        if record.len() != 4 {
            return Err(ParseError::InvalidFormat {
                line,
                details: format!("Expected 4 tab-delimited fields, found {}", record.len()),
            });
        }

        Ok(RawGenotypeRow {
            rsid: record[0].to_string(),
            chromosome: record[1].to_string(),
            position: parse_position(&record[2], line)?,
            genotype: record[3].to_string(),
        })
    }
}

/// Extract the date printed after the first ": " of the preamble line
fn sequenced_at(first_line: &str) -> Option<String> {
    let (_, date) = first_line.split_once(": ")?;
    let date = date.trim();
    (!date.is_empty()).then(|| date.to_string())
}
