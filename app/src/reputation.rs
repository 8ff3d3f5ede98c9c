// ==============================================================================
// reputation.rs - Reputation Policy Table
// ==============================================================================
// Description: Static display metadata, override-color buckets and scoring
//              multipliers per zygosity category
// Version: 1.0.0
// ==============================================================================
// Scoring (per variant, only for O/B reputations):
//   weighted     = importance × base(reputation)         O → 0.5, B → 1.0
//   weighted    ×= amplification(zygosity)               (B only)
//   contribution = SPREAD ^ weighted                     SPREAD = 1.3
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::models::ReferenceVariant;
use crate::zygosity::Zygosity;

/// Exponential base applied to weighted bad-variant contributions
pub const SPREAD: f64 = 1.3;

/// Coarse severity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reputation {
    #[serde(rename = "G")]
    Good,
    #[serde(rename = "O")]
    Okay,
    #[serde(rename = "B")]
    Bad,
    #[serde(rename = "U")]
    Unknown,
}

impl Reputation {
    pub fn letter(&self) -> char {
        match self {
            Reputation::Good => 'G',
            Reputation::Okay => 'O',
            Reputation::Bad => 'B',
            Reputation::Unknown => 'U',
        }
    }

    /// Base multiplier; Good and Unknown never contribute
    pub fn base_multiplier(&self) -> f64 {
        match self {
            Reputation::Good | Reputation::Unknown => 0.0,
            Reputation::Okay => 0.5,
            Reputation::Bad => 1.0,
        }
    }
}

impl fmt::Display for Reputation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Display metadata for one zygosity category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZygosityInfo {
    pub label: &'static str,
    /// Heterozygosity notation (e.g., "+/-")
    pub notation: &'static str,
    pub reputation: Reputation,
}

/// Which override-color field of a reference variant applies to a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideField {
    Heterozygous,
    HomozygousMinor,
    HomozygousMajor,
}

impl OverrideField {
    pub fn value<'a>(&self, variant: &'a ReferenceVariant) -> Option<&'a str> {
        let field = match self {
            OverrideField::Heterozygous => &variant.heterozygous_color,
            OverrideField::HomozygousMinor => &variant.homozygous_minor_color,
            OverrideField::HomozygousMajor => &variant.homozygous_major_color,
        };

        field.as_deref().map(str::trim).filter(|color| !color.is_empty())
    }
}

/// Per-variant override color as stored in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideColor {
    Green,
    Yellow,
    Red,
    Gray,
}

/// Display metadata for one override color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorInfo {
    pub reputation: Reputation,
    pub expressive: &'static str,
    pub status: &'static str,
}

impl OverrideColor {
    /// Accepts color names or the matching reputation letter
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "green" | "G" => Some(OverrideColor::Green),
            "yellow" | "O" => Some(OverrideColor::Yellow),
            "red" | "B" => Some(OverrideColor::Red),
            "gray" | "U" => Some(OverrideColor::Gray),
            _ => None,
        }
    }

    pub fn info(&self) -> ColorInfo {
        match self {
            OverrideColor::Green => ColorInfo {
                reputation: Reputation::Good,
                expressive: "Good",
                status: "success",
            },
            OverrideColor::Yellow => ColorInfo {
                reputation: Reputation::Okay,
                expressive: "Okay",
                status: "warning",
            },
            OverrideColor::Red => ColorInfo {
                reputation: Reputation::Bad,
                expressive: "Bad",
                status: "danger",
            },
            OverrideColor::Gray => ColorInfo {
                reputation: Reputation::Unknown,
                expressive: "Unknown",
                status: "default",
            },
        }
    }
}

/// Category metadata (label, notation, default reputation)
pub fn zygosity_info(zygosity: Zygosity) -> ZygosityInfo {
    let (label, notation, reputation) = match zygosity {
        Zygosity::Heterozygous => ("Heterozygous", "+/-", Reputation::Okay),
        Zygosity::HomozygousMajor => ("Homozygous Major", "-/-", Reputation::Good),
        Zygosity::HomozygousMinor => ("Homozygous Minor", "+/+", Reputation::Bad),
        Zygosity::HemizygousMajor => ("Hemizygous Major", "-", Reputation::Good),
        Zygosity::HemizygousMinor => ("Hemizygous Minor", "+", Reputation::Bad),
        Zygosity::Unknown => ("Unknown", "?/?", Reputation::Unknown),
        Zygosity::DoubleInsertion => ("Double Insertion", "I/I", Reputation::Okay),
        Zygosity::DoubleDeletion => ("Double Deletion", "D/D", Reputation::Okay),
        Zygosity::Insertion => ("Single Insertion", "I", Reputation::Okay),
        Zygosity::Deletion => ("Single Deletion", "D", Reputation::Okay),
        Zygosity::Major => ("Major", "-/-", Reputation::Good),
        Zygosity::Minor => ("Minor", "+/+", Reputation::Bad),
    };

    ZygosityInfo {
        label,
        notation,
        reputation,
    }
}

/// Override field consulted for a category; unknown calls have none
pub fn override_field(zygosity: Zygosity) -> Option<OverrideField> {
    match zygosity {
        Zygosity::Heterozygous
        | Zygosity::Insertion
        | Zygosity::Deletion
        | Zygosity::DoubleInsertion
        | Zygosity::DoubleDeletion => Some(OverrideField::Heterozygous),
        Zygosity::HomozygousMinor | Zygosity::HemizygousMinor | Zygosity::Minor => {
            Some(OverrideField::HomozygousMinor)
        }
        Zygosity::HomozygousMajor | Zygosity::HemizygousMajor | Zygosity::Major => {
            Some(OverrideField::HomozygousMajor)
        }
        Zygosity::Unknown => None,
    }
}

/// Extra multiplier applied to Bad reputations
pub fn amplification(zygosity: Zygosity) -> f64 {
    match zygosity {
        Zygosity::Heterozygous => 1.2,
        Zygosity::HomozygousMajor | Zygosity::Major => 1.0,
        Zygosity::HomozygousMinor | Zygosity::Minor => 1.5,
        Zygosity::HemizygousMajor => 1.0,
        Zygosity::HemizygousMinor => 1.3,
        Zygosity::Unknown => 1.0,
        Zygosity::DoubleInsertion | Zygosity::DoubleDeletion => 1.3,
        Zygosity::Insertion | Zygosity::Deletion => 1.2,
    }
}

/// Resolve the effective reputation of a call against its reference variant
///
/// A non-empty override color on the bucket's field wins; otherwise the
/// category's default reputation applies. Unrecognized colors are ignored.
pub fn resolve_reputation(zygosity: Zygosity, variant: &ReferenceVariant) -> (Reputation, Zygosity) {
    let override_color = override_field(zygosity).and_then(|field| field.value(variant));

    if let Some(color) = override_color {
        match OverrideColor::parse(color) {
            Some(parsed) => return (parsed.info().reputation, zygosity),
            None => debug!(
                "Ignoring unrecognized override color '{}' on {}",
                color, variant.rsid
            ),
        }
    }

    (zygosity_info(zygosity).reputation, zygosity)
}

/// Contribution of one variant to its gene's total
///
/// Returns 0.0 for Good and Unknown reputations without evaluating the
/// power law.
pub fn variant_contribution(reputation: Reputation, zygosity: Zygosity, importance: f64) -> f64 {
    if matches!(reputation, Reputation::Good | Reputation::Unknown) {
        return 0.0;
    }

    let mut weighted = importance * reputation.base_multiplier();
    if reputation == Reputation::Bad {
        weighted *= amplification(zygosity);
    }

    SPREAD.powf(weighted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant() -> ReferenceVariant {
        ReferenceVariant::new("rs1", "A", 10.0)
    }

    #[test]
    fn test_default_reputation_without_override() {
        let (rep, zyg) = resolve_reputation(Zygosity::HomozygousMinor, &variant());
        assert_eq!(rep, Reputation::Bad);
        assert_eq!(zyg, Zygosity::HomozygousMinor);

        let (rep, _) = resolve_reputation(Zygosity::Heterozygous, &variant());
        assert_eq!(rep, Reputation::Okay);
    }

    #[test]
    fn test_override_color_wins() {
        let mut v = variant();
        v.homozygous_minor_color = Some("green".to_string());
        let (rep, _) = resolve_reputation(Zygosity::HemizygousMinor, &v);
        assert_eq!(rep, Reputation::Good);

        // Other buckets keep their defaults
        let (rep, _) = resolve_reputation(Zygosity::Heterozygous, &v);
        assert_eq!(rep, Reputation::Okay);
    }

    #[test]
    fn test_blank_or_unrecognized_override_falls_back() {
        let mut v = variant();
        v.heterozygous_color = Some("   ".to_string());
        assert_eq!(resolve_reputation(Zygosity::Deletion, &v).0, Reputation::Okay);

        v.heterozygous_color = Some("purple".to_string());
        assert_eq!(resolve_reputation(Zygosity::Deletion, &v).0, Reputation::Okay);

        v.heterozygous_color = Some(" red ".to_string());
        assert_eq!(resolve_reputation(Zygosity::Deletion, &v).0, Reputation::Bad);
    }

    #[test]
    fn test_unknown_has_no_override_field() {
        let mut v = variant();
        v.heterozygous_color = Some("red".to_string());
        v.homozygous_minor_color = Some("red".to_string());
        v.homozygous_major_color = Some("red".to_string());
        assert_eq!(resolve_reputation(Zygosity::Unknown, &v).0, Reputation::Unknown);
    }

    #[test]
    fn test_contribution_homozygous_minor_bad() {
        // 10 × 1.0 × 1.5 = 15 → 1.3^15
        let contribution = variant_contribution(Reputation::Bad, Zygosity::HomozygousMinor, 10.0);
        assert!((contribution - 51.186).abs() < 0.01, "got {}", contribution);
    }

    #[test]
    fn test_contribution_okay_skips_amplification() {
        // 10 × 0.5 = 5 → 1.3^5
        let contribution = variant_contribution(Reputation::Okay, Zygosity::Heterozygous, 10.0);
        assert!((contribution - 1.3f64.powi(5)).abs() < 1e-9);
    }

    #[test]
    fn test_good_and_unknown_contribute_nothing() {
        assert_eq!(variant_contribution(Reputation::Good, Zygosity::HomozygousMajor, 10.0), 0.0);
        assert_eq!(variant_contribution(Reputation::Unknown, Zygosity::Unknown, 10.0), 0.0);
    }

    #[test]
    fn test_zygosity_info_labels() {
        let info = zygosity_info(Zygosity::Insertion);
        assert_eq!(info.label, "Single Insertion");
        assert_eq!(info.notation, "I");
        assert_eq!(OverrideColor::Red.info().status, "danger");
    }
}
