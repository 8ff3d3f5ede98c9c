// ==============================================================================
// sniffer.rs - Genome File Format Detection
// ==============================================================================
// Description: Identifies the vendor format of an uploaded genome file
// Version: 1.0.0
// ==============================================================================
// Detection order (first match wins):
//   1. Content signature "ASCII text, with very long lines"   → VCF
//   2. First line contains "23andMe", or any sampled line
//      contains "# rsid\tchromosome\tposition\tgenotype"      → 23andMe
//   3. First line contains "AncestryDNA"                      → AncestryDNA
//   4. First line contains "Courtagen", or any sampled line
//      contains "rsid\tchromosome\tposition\tgenotype"        → Courtagen
//   5. First line contains "RSID,CHROMOSOME,POSITION,RESULT"  → FamilyTreeDNA
//   6. First line contains "fileformat=VCF"                   → VCF
//   otherwise                                                 → Unknown
// ==============================================================================

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::debug;

use crate::models::GenomeFormat;

/// Bytes inspected when computing the content signature
const SIGNATURE_SAMPLE_BYTES: u64 = 1024 * 1024;

/// Lines longer than this make a text file "with very long lines"
const LONG_LINE_THRESHOLD: usize = 300;

/// Default number of lines sampled for marker matching
pub const DEFAULT_SNIFF_LINES: usize = 50;

const TWENTYTHREE_HEADER: &str = "# rsid\tchromosome\tposition\tgenotype";
const COURTAGEN_HEADER: &str = "rsid\tchromosome\tposition\tgenotype";
const FAMILY_TREE_HEADER: &str = "RSID,CHROMOSOME,POSITION,RESULT";

/// Coarse content signature of a file sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSignature {
    /// Every byte is printable ASCII or common whitespace
    pub ascii: bool,
    /// At least one line exceeds the long-line threshold
    pub very_long_lines: bool,
    /// CRLF line terminators were seen
    pub crlf: bool,
}

impl TextSignature {
    /// Compute the signature of a byte sample
    pub fn of(sample: &[u8]) -> Self {
        let ascii = !sample.is_empty() && sample.iter().all(|b| is_text_byte(*b));

        let mut very_long_lines = false;
        let mut line_length = 0usize;
        let mut crlf = false;
        let mut previous = 0u8;

        for &byte in sample {
            if byte == b'\n' {
                if previous == b'\r' {
                    crlf = true;
                }
                line_length = 0;
            } else {
                line_length += 1;
                if line_length > LONG_LINE_THRESHOLD {
                    very_long_lines = true;
                }
            }
            previous = byte;
        }

        Self {
            ascii,
            very_long_lines,
            crlf,
        }
    }

    /// Exactly "ASCII text, with very long lines"
    pub fn is_long_line_ascii(&self) -> bool {
        self.ascii && self.very_long_lines && !self.crlf
    }
}

fn is_text_byte(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7e | b'\t' | b'\n' | b'\r' | 0x0c | 0x08 | 0x1b | 0x07)
}

/// Detect the vendor format of a file on disk
///
/// # Arguments
/// * `path` - Local path of the uploaded (already extracted) file
/// * `max_lines` - Number of leading lines to sample for markers
pub fn detect_format(path: impl AsRef<Path>, max_lines: usize) -> std::io::Result<GenomeFormat> {
    let path = path.as_ref();

    let mut sample = Vec::new();
    File::open(path)?
        .take(SIGNATURE_SAMPLE_BYTES)
        .read_to_end(&mut sample)?;

    let signature = TextSignature::of(&sample);
    if signature.is_long_line_ascii() {
        debug!("Content signature reports long-line ASCII text: {:?}", path);
        return Ok(GenomeFormat::Vcf);
    }

    let lines = read_leading_lines(path, max_lines)?;
    Ok(detect_from_lines(&lines))
}

/// Apply the marker rules to already-decoded leading lines
pub fn detect_from_lines(lines: &[String]) -> GenomeFormat {
    let first = lines.first().map(String::as_str).unwrap_or("");
    let any_line = |marker: &str| lines.iter().any(|line| line.contains(marker));

    if first.contains("23andMe") || any_line(TWENTYTHREE_HEADER) {
        GenomeFormat::TwentyThreeAndMe
    } else if first.contains("AncestryDNA") {
        GenomeFormat::AncestryDna
    } else if first.contains("Courtagen") || any_line(COURTAGEN_HEADER) {
        GenomeFormat::Courtagen
    } else if first.contains(FAMILY_TREE_HEADER) {
        GenomeFormat::FamilyTreeDna
    } else if first.contains("fileformat=VCF") {
        GenomeFormat::Vcf
    } else {
        GenomeFormat::Unknown
    }
}

/// First raw line of a file, lossily decoded (used in detection diagnostics)
pub fn first_line(path: impl AsRef<Path>) -> std::io::Result<String> {
    Ok(read_leading_lines(path, 1)?.into_iter().next().unwrap_or_default())
}

fn read_leading_lines(path: impl AsRef<Path>, max_lines: usize) -> std::io::Result<Vec<String>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::with_capacity(max_lines);
    let mut buffer = Vec::new();

    while lines.len() < max_lines {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buffer);
        lines.push(line.trim_end_matches(['\r', '\n']).to_string());
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    fn detect(contents: &str) -> GenomeFormat {
        let file = create_test_file(contents.as_bytes());
        detect_format(file.path(), DEFAULT_SNIFF_LINES).unwrap()
    }

    #[test]
    fn test_detect_23andme_by_vendor_name() {
        let contents = "\
# This data file generated by 23andMe at: Thu Mar 07 12:00:00 2019
# rsid\tchromosome\tposition\tgenotype
rs548049170\t1\t69869\tTT
";
        assert_eq!(detect(contents), GenomeFormat::TwentyThreeAndMe);
    }

    #[test]
    fn test_detect_23andme_by_header_row() {
        let contents = "\
# Some other preamble
# more comments
# rsid\tchromosome\tposition\tgenotype
rs1\t1\t100\tAA
";
        assert_eq!(detect(contents), GenomeFormat::TwentyThreeAndMe);
    }

    #[test]
    fn test_detect_ancestry() {
        let contents = "\
#AncestryDNA raw data download
#This file was generated by AncestryDNA
rsid\tchromosome\tposition\tallele1\tallele2
rs4477212\t1\t82154\tT\tT
";
        assert_eq!(detect(contents), GenomeFormat::AncestryDna);
    }

    #[test]
    fn test_detect_courtagen_by_header() {
        let contents = "rsid\tchromosome\tposition\tgenotype\nrs1\t1\t100\tAG\n";
        assert_eq!(detect(contents), GenomeFormat::Courtagen);
    }

    #[test]
    fn test_detect_family_tree() {
        let contents = "RSID,CHROMOSOME,POSITION,RESULT\n\"rs4477212\",\"1\",\"82154\",\"AA\"\n";
        assert_eq!(detect(contents), GenomeFormat::FamilyTreeDna);
    }

    #[test]
    fn test_detect_vcf_by_fileformat_marker() {
        let contents = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";
        assert_eq!(detect(contents), GenomeFormat::Vcf);
    }

    #[test]
    fn test_long_line_signature_wins_over_markers() {
        let long_line = "x".repeat(LONG_LINE_THRESHOLD + 50);
        let contents = format!(
            "#AncestryDNA raw data download\n{}\nrsid\tchromosome\tposition\tallele1\tallele2\n",
            long_line
        );
        assert_eq!(detect(&contents), GenomeFormat::Vcf);
    }

    #[test]
    fn test_crlf_long_lines_fall_through_to_markers() {
        let long_line = "x".repeat(LONG_LINE_THRESHOLD + 50);
        let contents = format!("#AncestryDNA raw data download\r\n{}\r\n", long_line);
        assert_eq!(detect(&contents), GenomeFormat::AncestryDna);
    }

    #[test]
    fn test_marker_matching_is_case_sensitive() {
        assert_eq!(detect("# generated by 23ANDME\nrs1\t1\t1\tAA\n"), GenomeFormat::Unknown);
    }

    #[test]
    fn test_only_leading_lines_are_sampled() {
        let mut contents = String::new();
        for i in 0..60 {
            contents.push_str(&format!("# comment {}\n", i));
        }
        contents.push_str("# rsid\tchromosome\tposition\tgenotype\n");
        assert_eq!(detect(&contents), GenomeFormat::Unknown);
    }

    #[test]
    fn test_binary_content_is_unknown() {
        let file = create_test_file(&[0x1f, 0x8b, 0x08, 0x00, 0xff, 0x00]);
        assert_eq!(detect_format(file.path(), DEFAULT_SNIFF_LINES).unwrap(), GenomeFormat::Unknown);
    }

    #[test]
    fn test_signature() {
        let signature = TextSignature::of(b"short\nlines\n");
        assert!(signature.ascii);
        assert!(!signature.very_long_lines);
        assert!(!TextSignature::of(&[0xff, b'a']).ascii);
    }

    #[test]
    fn test_first_line() {
        let file = create_test_file(b"NOT A GENOME FILE\r\nsecond\n");
        assert_eq!(first_line(file.path()).unwrap(), "NOT A GENOME FILE");
    }
}
