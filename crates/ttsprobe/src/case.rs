//! Test cases: one concrete (language, voice, text) combination.

use crate::catalog::Voice;
use serde::{Deserialize, Serialize};

/// Stable case identifier, assigned at generation time and never reused
pub type CaseId = u64;

/// Test class a case belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseCategory {
    /// Equivalence-partition representative
    Partition,
    /// Boundary-value probe
    Boundary,
}

impl CaseCategory {
    /// Lowercase label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Partition => "partition",
            Self::Boundary => "boundary",
        }
    }
}

impl std::fmt::Display for CaseCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subcategory of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Subcategory {
    /// One representative per (language, gender) class
    LanguageFamily,
    /// ""
    EmptyText,
    /// A single character
    SingleCharacter,
    /// Text at or just above the configured length threshold
    VeryLongText,
    /// Only punctuation and symbols
    SpecialCharacters,
    /// Only digits
    NumericOnly,
    /// Several boundary conditions in one string
    MixedExtremes,
}

impl Subcategory {
    /// Boundary subcategories in generation order
    pub const BOUNDARY: [Self; 6] = [
        Self::EmptyText,
        Self::SingleCharacter,
        Self::VeryLongText,
        Self::SpecialCharacters,
        Self::NumericOnly,
        Self::MixedExtremes,
    ];

    /// Kebab-case label used in documents and reports
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LanguageFamily => "language-family",
            Self::EmptyText => "empty-text",
            Self::SingleCharacter => "single-character",
            Self::VeryLongText => "very-long-text",
            Self::SpecialCharacters => "special-characters",
            Self::NumericOnly => "numeric-only",
            Self::MixedExtremes => "mixed-extremes",
        }
    }

    /// Whether this is a boundary subcategory
    #[must_use]
    pub const fn is_boundary(self) -> bool {
        !matches!(self, Self::LanguageFamily)
    }

    /// Category implied by the subcategory
    #[must_use]
    pub const fn category(self) -> CaseCategory {
        if self.is_boundary() {
            CaseCategory::Boundary
        } else {
            CaseCategory::Partition
        }
    }
}

impl std::fmt::Display for Subcategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete input combination. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Stable identifier
    pub id: CaseId,
    /// Test class
    pub category: CaseCategory,
    /// Subcategory within the class
    pub subcategory: Subcategory,
    /// Language label to select
    pub language: String,
    /// Voice to select
    pub voice: Voice,
    /// Text to synthesize
    pub text: String,
    /// Language family for partition cases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

impl TestCase {
    /// Text length in characters (not bytes)
    #[must_use]
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Human-readable label, e.g. `European_lang.f_gender.language-family`
    #[must_use]
    pub fn label(&self) -> String {
        match self.category {
            CaseCategory::Partition => format!(
                "{}_lang.{}_gender.{}",
                self.family.as_deref().unwrap_or("Other"),
                self.voice.gender,
                self.subcategory
            ),
            CaseCategory::Boundary => format!("boundary_{}", self.subcategory),
        }
    }
}
