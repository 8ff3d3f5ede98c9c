// ==============================================================================
// zygosity.rs - Genotype Zygosity Classification
// ==============================================================================
// Description: Classifies a reported genotype against a catalog minor allele
// Version: 1.0.0
// ==============================================================================
// Decision list (first match wins):
//   1. two+ chars, first two differ                  → heterozygous
//   2. two+ chars, equal, equal to minor allele      → homozygous_minor
//   3. two+ chars, equal, not minor (not I/D)        → homozygous_major
//   4. one char, not minor (not I/D)                 → hemizygous_major
//   5. one char, equal to minor allele               → hemizygous_minor
//   6. "II" / "DD" / "I" / "D"                       → indel categories
//   7. anything else                                 → unknown
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Zygosity category of a reported genotype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zygosity {
    Heterozygous,
    HomozygousMajor,
    HomozygousMinor,
    HemizygousMajor,
    HemizygousMinor,
    DoubleInsertion,
    DoubleDeletion,
    Insertion,
    Deletion,
    Unknown,
    /// Legacy category found on older persisted calls
    Major,
    /// Legacy category found on older persisted calls
    Minor,
}

impl Zygosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zygosity::Heterozygous => "heterozygous",
            Zygosity::HomozygousMajor => "homozygous_major",
            Zygosity::HomozygousMinor => "homozygous_minor",
            Zygosity::HemizygousMajor => "hemizygous_major",
            Zygosity::HemizygousMinor => "hemizygous_minor",
            Zygosity::DoubleInsertion => "double_insertion",
            Zygosity::DoubleDeletion => "double_deletion",
            Zygosity::Insertion => "insertion",
            Zygosity::Deletion => "deletion",
            Zygosity::Unknown => "unknown",
            Zygosity::Major => "major",
            Zygosity::Minor => "minor",
        }
    }
}

impl fmt::Display for Zygosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zygosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heterozygous" => Ok(Zygosity::Heterozygous),
            "homozygous_major" => Ok(Zygosity::HomozygousMajor),
            "homozygous_minor" => Ok(Zygosity::HomozygousMinor),
            "hemizygous_major" => Ok(Zygosity::HemizygousMajor),
            "hemizygous_minor" => Ok(Zygosity::HemizygousMinor),
            "double_insertion" => Ok(Zygosity::DoubleInsertion),
            "double_deletion" => Ok(Zygosity::DoubleDeletion),
            "insertion" => Ok(Zygosity::Insertion),
            "deletion" => Ok(Zygosity::Deletion),
            "unknown" => Ok(Zygosity::Unknown),
            "major" => Ok(Zygosity::Major),
            "minor" => Ok(Zygosity::Minor),
            other => Err(format!("unknown zygosity '{}'", other)),
        }
    }
}

/// Classify a genotype string relative to the catalog's minor allele
///
/// # Arguments
/// * `genotype` - Raw genotype as reported (e.g., "AG", "T", "--", "II");
///   surrounding whitespace is ignored
/// * `minor_allele` - Minor allele from the reference variant (e.g., "G")
///
/// # Examples
/// ```
/// use reputation_processor::zygosity::{classify, Zygosity};
///
/// assert_eq!(classify("AG", "G"), Zygosity::Heterozygous);
/// assert_eq!(classify("GG", "G"), Zygosity::HomozygousMinor);
/// assert_eq!(classify("AA", "G"), Zygosity::HomozygousMajor);
/// assert_eq!(classify("II", "X"), Zygosity::DoubleInsertion);
/// assert_eq!(classify("D", "X"), Zygosity::Deletion);
/// ```
///
/// The rules are evaluated in order and are not mutually exclusive: when the
/// minor allele is itself "I" or "D", the minor branches claim "II", "DD",
/// "I" and "D" before the indel branch is reached.
pub fn classify(genotype: &str, minor_allele: &str) -> Zygosity {
    let genotype = genotype.trim();
    let mut chars = genotype.chars();
    let first = chars.next();
    let second = chars.next();

    match (first, second) {
        (Some(a), Some(b)) if a != b => Zygosity::Heterozygous,
        (Some(a), Some(_)) if is_minor(a, minor_allele) => Zygosity::HomozygousMinor,
        (Some(a), Some(_)) if !is_indel_marker(a) => Zygosity::HomozygousMajor,
        (Some(a), None) if !is_minor(a, minor_allele) && !is_indel_marker(a) => {
            Zygosity::HemizygousMajor
        }
        (Some(a), None) if is_minor(a, minor_allele) => Zygosity::HemizygousMinor,
        _ => match genotype {
            "II" => Zygosity::DoubleInsertion,
            "DD" => Zygosity::DoubleDeletion,
            "I" => Zygosity::Insertion,
            "D" => Zygosity::Deletion,
            _ => Zygosity::Unknown,
        },
    }
}

/// A single allele character equals the minor allele only when the minor
/// allele is exactly that one character
fn is_minor(allele: char, minor_allele: &str) -> bool {
    let mut minor = minor_allele.chars();
    minor.next() == Some(allele) && minor.next().is_none()
}

/// Vendor notation for insertion/deletion calls
fn is_indel_marker(allele: char) -> bool {
    matches!(allele, 'I' | 'D')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_allele_genotypes() {
        assert_eq!(classify("AG", "G"), Zygosity::Heterozygous);
        assert_eq!(classify("GA", "G"), Zygosity::Heterozygous);
        assert_eq!(classify("GG", "G"), Zygosity::HomozygousMinor);
        assert_eq!(classify("AA", "G"), Zygosity::HomozygousMajor);
    }

    #[test]
    fn test_single_allele_genotypes() {
        for allele in ['A', 'C', 'G', 'T'] {
            for minor in ["A", "C", "G", "T", "X"] {
                let expected = if minor.starts_with(allele) {
                    Zygosity::HemizygousMinor
                } else {
                    Zygosity::HemizygousMajor
                };
                assert_eq!(classify(&allele.to_string(), minor), expected, "{} vs {}", allele, minor);
            }
        }
    }

    #[test]
    fn test_indel_genotypes() {
        assert_eq!(classify("II", "X"), Zygosity::DoubleInsertion);
        assert_eq!(classify("DD", "A"), Zygosity::DoubleDeletion);
        assert_eq!(classify("I", "G"), Zygosity::Insertion);
        assert_eq!(classify("D", "X"), Zygosity::Deletion);
        assert_eq!(classify("DI", "X"), Zygosity::Heterozygous);
    }

    #[test]
    fn test_indel_minor_allele_preempts_indel_branch() {
        assert_eq!(classify("II", "I"), Zygosity::HomozygousMinor);
        assert_eq!(classify("D", "D"), Zygosity::HemizygousMinor);
        // Other marker still reaches the indel branch
        assert_eq!(classify("DD", "I"), Zygosity::DoubleDeletion);
    }

    #[test]
    fn test_whitespace_and_no_calls() {
        assert_eq!(classify("  AG \n", "G"), Zygosity::Heterozygous);
        assert_eq!(classify("--", "G"), Zygosity::HomozygousMajor);
        assert_eq!(classify("", "G"), Zygosity::Unknown);
        assert_eq!(classify("   ", "G"), Zygosity::Unknown);
    }

    #[test]
    fn test_multi_char_minor_allele_never_matches() {
        assert_eq!(classify("AA", "AA"), Zygosity::HomozygousMajor);
        assert_eq!(classify("A", ""), Zygosity::HemizygousMajor);
    }

    #[test]
    fn test_zygosity_str_roundtrip() {
        assert_eq!("homozygous_minor".parse::<Zygosity>().unwrap(), Zygosity::HomozygousMinor);
        assert_eq!(Zygosity::DoubleDeletion.to_string(), "double_deletion");
        assert!("triploid".parse::<Zygosity>().is_err());
    }
}
