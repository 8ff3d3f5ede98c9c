// ==============================================================================
// parsers/vcf.rs - VCF genotype parser
// ==============================================================================
// Description: Reads single-sample VCF exports with noodles-vcf and renders the
//              first sample's GT call as a vendor-style genotype string
// Version: 3.0.0
// ==============================================================================
// Rendering:
//   - SNV alleles are written verbatim      0/1, REF=A, ALT=G → "AG"
//   - at length-changing sites the longer   0/1, REF=A, ALT=AT → "DI"
//     allele is "I", the shorter "D"
//   - haploid calls yield one allele        1, REF=A, ALT=G → "G"
//   - missing calls ("./.", ".") yield "--"
// References:
// - VCF 4.2 Spec: https://samtools.github.io/hts-specs/VCFv4.2.pdf
// - noodles-vcf: https://docs.rs/noodles-vcf/0.81.0/noodles_vcf/
// ==============================================================================

use noodles_vcf as vcf;
use noodles_vcf::variant::record::samples::keys::key;
use noodles_vcf::variant::record_buf::samples::sample::value::Genotype;
use noodles_vcf::variant::record_buf::samples::sample::Value;
use noodles_vcf::variant::RecordBuf;
use std::path::Path;
use std::str::FromStr;

use super::{GenomeTable, ParseError};
use crate::models::RawGenotypeRow;

const NO_CALL: &str = "--";

/// VCF parser for single-sample personal genome exports
#[derive(Debug, Clone, Default)]
pub struct VcfGenotypeParser;

impl VcfGenotypeParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a VCF file into normalized genotype rows
    ///
    /// Records without an ID use "CHROM:POS" as the variant id.
    pub fn parse(&self, path: impl AsRef<Path>) -> Result<GenomeTable, ParseError> {
        let mut reader = vcf::io::reader::Builder::default().build_from_path(path.as_ref())?;
        let header = reader.read_header()?;

        let mut rows = Vec::new();
        for (index, result) in reader.record_bufs(&header).enumerate() {
            let number = index + 1;
            let record = result.map_err(|e| ParseError::InvalidRecord {
                record: number,
                details: e.to_string(),
            })?;

            rows.push(self.parse_record(&record, number)?);
        }

        Ok(GenomeTable {
            rows,
            sequenced_at: None,
        })
    }

    fn parse_record(&self, record: &RecordBuf, number: usize) -> Result<RawGenotypeRow, ParseError> {
        let invalid = |details: String| ParseError::InvalidRecord { record: number, details };

        let chromosome = record.reference_sequence_name().trim_start_matches("chr").to_string();
        let position = record
            .variant_start()
            .map(|pos| usize::from(pos) as u64)
            .ok_or_else(|| invalid("missing position".to_string()))?;

        let rsid = match record.ids().as_ref().iter().next() {
            Some(id) => id.clone(),
            None => format!("{}:{}", chromosome, position),
        };

        let mut alleles = vec![record.reference_bases()];
        alleles.extend(record.alternate_bases().as_ref().iter().map(String::as_str));

        let sample = record
            .samples()
            .get_index(0)
            .ok_or_else(|| invalid("no sample column".to_string()))?;

        let positions = match sample.get(key::GENOTYPE) {
            None => return Err(invalid("GT not found in FORMAT".to_string())),
            Some(None) => Vec::new(),
            Some(Some(Value::Genotype(genotype))) => allele_positions(genotype),
            Some(Some(Value::String(text))) => {
                let genotype = Genotype::from_str(text)
                    .map_err(|e| invalid(format!("Unrecognized GT call '{}': {}", text, e)))?;
                allele_positions(&genotype)
            }
            Some(Some(other)) => return Err(invalid(format!("Unexpected GT value {:?}", other))),
        };

        let genotype = render_genotype(&positions, &alleles)
            .ok_or_else(|| invalid(format!("GT allele index out of range for {} alleles", alleles.len())))?;

        Ok(RawGenotypeRow {
            rsid,
            chromosome,
            position,
            genotype,
        })
    }
}

fn allele_positions(genotype: &Genotype) -> Vec<Option<usize>> {
    genotype.as_ref().iter().map(|allele| allele.position()).collect()
}

/// Render GT allele indices against REF + ALT alleles
///
/// An empty or partially missing call is a no-call. Returns None when an
/// allele index is out of range.
fn render_genotype(positions: &[Option<usize>], alleles: &[&str]) -> Option<String> {
    if positions.is_empty() || positions.iter().any(Option::is_none) {
        return Some(NO_CALL.to_string());
    }

    let length_changing = alleles.iter().any(|allele| allele.len() != alleles[0].len());
    let shortest = alleles.iter().map(|allele| allele.len()).min().unwrap_or(0);

    let mut genotype = String::new();
    for index in positions.iter().flatten() {
        let allele = alleles.get(*index)?;

        if length_changing {
            genotype.push(if allele.len() > shortest { 'I' } else { 'D' });
        } else {
            genotype.push_str(allele);
        }
    }

    Some(genotype)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "\
##fileformat=VCFv4.2
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read depth\">
##FORMAT=<ID=DS,Number=1,Type=Float,Description=\"Dosage\">
";

    fn create_test_file(records: &str, with_sample: bool) -> NamedTempFile {
        let columns = if with_sample {
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tSAMPLE\n"
        } else {
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n"
        };
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}{}{}", HEADER, columns, records).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_single_sample_vcf() {
        let records = "\
1\t69869\trs548049170\tT\tC\t.\tPASS\t.\tGT\t0/0
chr1\t74792\trs13328684\tA\tG\t.\tPASS\t.\tGT:DP\t0|1:12
2\t100\t.\tC\tT\t.\tPASS\t.\tGT\t1/1
X\t500\trs5\tG\tA\t.\tPASS\t.\tGT\t1
3\t42\trs6\tA\tAT\t.\tPASS\t.\tGT\t0/1
4\t7\trs7\tC\tG\t.\tPASS\t.\tGT\t./.
";
        let file = create_test_file(records, true);
        let table = VcfGenotypeParser::new().parse(file.path()).unwrap();

        assert_eq!(table.rows.len(), 6);
        assert_eq!(table.rows[0].rsid, "rs548049170");
        assert_eq!(table.rows[0].position, 69869);
        assert_eq!(table.rows[0].genotype, "TT");
        assert_eq!(table.rows[1].chromosome, "1");
        assert_eq!(table.rows[1].genotype, "AG");
        assert_eq!(table.rows[2].rsid, "2:100");
        assert_eq!(table.rows[2].genotype, "TT");
        assert_eq!(table.rows[3].genotype, "A");
        assert_eq!(table.rows[4].genotype, "DI");
        assert_eq!(table.rows[5].genotype, "--");
        assert!(table.sequenced_at.is_none());
    }

    #[test]
    fn test_render_indels_and_missing() {
        assert_eq!(render_genotype(&[Some(0), Some(1)], &["A", "AT"]).as_deref(), Some("DI"));
        assert_eq!(render_genotype(&[Some(1), Some(1)], &["AT", "A"]).as_deref(), Some("DD"));
        assert_eq!(render_genotype(&[Some(0), Some(0)], &["AT", "A"]).as_deref(), Some("II"));
        assert_eq!(render_genotype(&[None, None], &["A", "G"]).as_deref(), Some("--"));
        assert_eq!(render_genotype(&[], &["A", "G"]).as_deref(), Some("--"));
        assert_eq!(render_genotype(&[Some(0), Some(3)], &["A", "G"]), None);
    }

    #[test]
    fn test_missing_gt_is_invalid() {
        let file = create_test_file("1\t100\trs1\tA\tG\t.\tPASS\t.\tDS\t0.5\n", true);
        assert!(matches!(
            VcfGenotypeParser::new().parse(file.path()),
            Err(ParseError::InvalidRecord { record: 1, .. })
        ));
    }

    #[test]
    fn test_sites_only_file_is_invalid() {
        let file = create_test_file("1\t100\trs1\tA\tG\t.\tPASS\t.\n", false);
        assert!(matches!(
            VcfGenotypeParser::new().parse(file.path()),
            Err(ParseError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_out_of_range_allele_is_invalid() {
        let file = create_test_file("1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0/1\n5\t1\trs2\tA\tG\t.\tPASS\t.\tGT\t0/3\n", true);
        match VcfGenotypeParser::new().parse(file.path()) {
            Err(ParseError::InvalidRecord { record, .. }) => assert_eq!(record, 2),
            other => panic!("Expected InvalidRecord, got {:?}", other),
        }
    }
}
