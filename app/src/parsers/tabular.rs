// ==============================================================================
// tabular.rs - Headered Delimited Export Parser
// ==============================================================================
// Description: Column-name driven parser shared by AncestryDNA, Courtagen and
//              FamilyTreeDNA exports
// Version: 1.0.0
// ==============================================================================
// Examples:
//   AncestryDNA (tab, '#' preamble, split alleles):
//     rsid    chromosome    position    allele1    allele2
//     rs4477212    1    82154    T    T
//   Courtagen (tab):
//     rsid    chromosome    position    genotype
//   FamilyTreeDNA (comma, quoted):
//     RSID,CHROMOSOME,POSITION,RESULT
//     "rs4477212","1","82154","AA"
// ==============================================================================

use std::fs::File;
use std::path::Path;

use super::{parse_position, GenomeTable, ParseError};
use crate::models::RawGenotypeRow;

/// How the genotype is laid out in a vendor export
#[derive(Debug, Clone, PartialEq)]
pub enum GenotypeColumns {
    /// One column holding the full genotype
    Combined(&'static str),
    /// Two allele columns concatenated into the genotype
    Split(&'static str, &'static str),
}

/// Header names of the columns kept after normalization
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    pub delimiter: u8,
    pub rsid: &'static str,
    pub chromosome: &'static str,
    pub position: &'static str,
    pub genotype: GenotypeColumns,
}

impl ColumnLayout {
    pub fn ancestry() -> Self {
        Self {
            delimiter: b'\t',
            rsid: "rsid",
            chromosome: "chromosome",
            position: "position",
            genotype: GenotypeColumns::Split("allele1", "allele2"),
        }
    }

    pub fn courtagen() -> Self {
        Self {
            delimiter: b'\t',
            rsid: "rsid",
            chromosome: "chromosome",
            position: "position",
            genotype: GenotypeColumns::Combined("genotype"),
        }
    }

    pub fn family_tree() -> Self {
        Self {
            delimiter: b',',
            rsid: "RSID",
            chromosome: "CHROMOSOME",
            position: "POSITION",
            genotype: GenotypeColumns::Combined("RESULT"),
        }
    }
}

/// Resolved column indices for one file
struct ColumnIndex {
    rsid: usize,
    chromosome: usize,
    position: usize,
    genotype: (usize, Option<usize>),
}

/// Parser for vendor exports with a named header row
#[derive(Debug, Clone)]
pub struct TabularParser {
    layout: ColumnLayout,
}

impl TabularParser {
    pub fn new(layout: ColumnLayout) -> Self {
        Self { layout }
    }

    /// Parse an export, discarding every column beyond the normalized four
    ///
    /// Lines starting with '#' are preamble comments. The first remaining
    /// line must be the header row naming the layout's columns.
    pub fn parse(&self, path: impl AsRef<Path>) -> Result<GenomeTable, ParseError> {
        let file = File::open(path.as_ref())?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.layout.delimiter)
            .comment(Some(b'#'))
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers = reader.headers()?.clone();
        if headers.is_empty() || headers.iter().all(str::is_empty) {
            return Err(ParseError::MissingHeader {
                marker: self.layout.rsid.to_string(),
            });
        }
        let index = self.resolve(&headers)?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let line = record.position().map_or(0, |p| p.line() as usize);

            if record.iter().all(str::is_empty) {
                continue;
            }
            rows.push(self.parse_record(&record, &index, line)?);
        }

        Ok(GenomeTable {
            rows,
            sequenced_at: None,
        })
    }

    fn resolve(&self, headers: &csv::StringRecord) -> Result<ColumnIndex, ParseError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| ParseError::MissingColumn {
                    column: name.to_string(),
                })
        };

        let genotype = match self.layout.genotype {
            GenotypeColumns::Combined(column) => (find(column)?, None),
            GenotypeColumns::Split(first, second) => (find(first)?, Some(find(second)?)),
        };

        Ok(ColumnIndex {
            rsid: find(self.layout.rsid)?,
            chromosome: find(self.layout.chromosome)?,
            position: find(self.layout.position)?,
            genotype,
        })
    }

    fn parse_record(
        &self,
        record: &csv::StringRecord,
        index: &ColumnIndex,
        line: usize,
    ) -> Result<RawGenotypeRow, ParseError> {
        let field = |column: usize| {
            record.get(column).ok_or_else(|| ParseError::InvalidFormat {
                line,
                details: format!("Expected at least {} fields, found {}", column + 1, record.len()),
            })
        };

        let genotype = match index.genotype {
            (column, None) => field(column)?.to_string(),
            (first, Some(second)) => format!("{}{}", field(first)?, field(second)?),
        };

        Ok(RawGenotypeRow {
            rsid: field(index.rsid)?.to_string(),
            chromosome: field(index.chromosome)?.to_string(),
            position: parse_position(field(index.position)?, line)?,
            genotype,
        })
    }
}
