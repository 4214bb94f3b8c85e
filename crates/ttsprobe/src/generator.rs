//! Case generation: equivalence partitioning and boundary value analysis.
//!
//! Generation is deterministic. The same catalog and configuration always
//! produce the same sequence with the same ids, regardless of any shuffling
//! done afterwards. Order is category, then subcategory, then catalog order.

use crate::case::{CaseCategory, CaseId, Subcategory, TestCase};
use crate::catalog::{Gender, Voice, VoiceCatalog};
use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Default length for the very-long-text probe (100 x "This is a test. ")
pub const DEFAULT_LONG_TEXT_THRESHOLD: usize = 1600;

/// Sentence repeated to build the very-long-text probe
const LONG_TEXT_UNIT: &str = "This is a test. ";

/// Fallback canonical text for languages without a dedicated one
const DEFAULT_CANONICAL_TEXT: &str = "Hello world.";

const CANONICAL_TEXTS: &[(&str, &str)] = &[
    ("English (US)", "Hello world."),
    ("English (UK)", "Hello world."),
    ("Spanish", "Hola mundo."),
    ("French", "Bonjour le monde."),
    ("Italian", "Ciao mondo."),
    ("Portuguese (Brazil)", "Olá mundo."),
];

const EUROPEAN_LANGUAGES: &[&str] = &[
    "English (US)",
    "English (UK)",
    "French",
    "Italian",
    "Spanish",
    "Portuguese (Brazil)",
];

/// Short canonical text paired with partition representatives
#[must_use]
pub fn canonical_text(language: &str) -> &'static str {
    CANONICAL_TEXTS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map_or(DEFAULT_CANONICAL_TEXT, |(_, text)| *text)
}

/// Language family used in partition labels
#[must_use]
pub fn language_family(language: &str) -> &'static str {
    if EUROPEAN_LANGUAGES.contains(&language) {
        "European"
    } else {
        "Other"
    }
}

/// Text for one boundary subcategory
#[must_use]
pub fn boundary_text(subcategory: Subcategory, long_text_threshold: usize) -> String {
    match subcategory {
        Subcategory::EmptyText | Subcategory::LanguageFamily => String::new(),
        Subcategory::SingleCharacter => "A".to_string(),
        Subcategory::VeryLongText => {
            let unit = LONG_TEXT_UNIT.chars().count();
            let repeats = long_text_threshold.div_ceil(unit).max(1);
            LONG_TEXT_UNIT.repeat(repeats)
        }
        Subcategory::SpecialCharacters => "!@#$%^&*()_+{}|:<>?~`-=[]\\;',./".to_string(),
        Subcategory::NumericOnly => "12345678901234567890".to_string(),
        Subcategory::MixedExtremes => format!("A{}!@#$%^&*()", "1".repeat(50)),
    }
}

/// Which test classes to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestClasses {
    /// Partition and boundary cases
    #[default]
    Both,
    /// Only equivalence-partition cases
    PartitionOnly,
    /// Only boundary-value cases
    BoundaryOnly,
}

impl TestClasses {
    /// Resolve the mutually exclusive `only-*` switches.
    pub fn from_flags(only_partitioning: bool, only_boundary: bool) -> ProbeResult<Self> {
        match (only_partitioning, only_boundary) {
            (true, true) => Err(ProbeError::configuration(
                "--only-partitioning and --only-boundary are mutually exclusive",
            )),
            (true, false) => Ok(Self::PartitionOnly),
            (false, true) => Ok(Self::BoundaryOnly),
            (false, false) => Ok(Self::Both),
        }
    }

    /// Whether partition cases are generated
    #[must_use]
    pub const fn partition(self) -> bool {
        matches!(self, Self::Both | Self::PartitionOnly)
    }

    /// Whether boundary cases are generated
    #[must_use]
    pub const fn boundary(self) -> bool {
        matches!(self, Self::Both | Self::BoundaryOnly)
    }
}

/// Languages that receive boundary cases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryLanguages {
    /// Every language present in the catalog
    All,
    /// An explicit list
    Selected(Vec<String>),
}

impl Default for BoundaryLanguages {
    fn default() -> Self {
        Self::Selected(vec!["English (US)".to_string()])
    }
}

/// Generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Test classes to generate
    pub classes: TestClasses,
    /// Languages that receive boundary cases
    pub boundary_languages: BoundaryLanguages,
    /// Minimum length of the very-long-text probe, in characters
    pub long_text_threshold: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            classes: TestClasses::Both,
            boundary_languages: BoundaryLanguages::default(),
            long_text_threshold: DEFAULT_LONG_TEXT_THRESHOLD,
        }
    }
}

impl GenerationConfig {
    /// Create config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set test classes
    #[must_use]
    pub fn with_classes(mut self, classes: TestClasses) -> Self {
        self.classes = classes;
        self
    }

    /// Set boundary languages
    #[must_use]
    pub fn with_boundary_languages(mut self, languages: BoundaryLanguages) -> Self {
        self.boundary_languages = languages;
        self
    }

    /// Set the very-long-text threshold
    #[must_use]
    pub fn with_long_text_threshold(mut self, threshold: usize) -> Self {
        self.long_text_threshold = threshold;
        self
    }

    /// Check the configuration before generating
    pub fn validate(&self) -> ProbeResult<()> {
        if self.long_text_threshold < 2 {
            return Err(ProbeError::configuration(format!(
                "long text threshold must be at least 2 characters, got {}",
                self.long_text_threshold
            )));
        }
        if let BoundaryLanguages::Selected(languages) = &self.boundary_languages {
            if self.classes.boundary() && languages.is_empty() {
                return Err(ProbeError::configuration(
                    "boundary testing requested with no boundary languages",
                ));
            }
        }
        Ok(())
    }
}

/// A configured boundary language that produced no cases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLanguage {
    /// Language label
    pub language: String,
    /// Why it was skipped
    pub reason: String,
}

/// Diagnostics of one generation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSummary {
    /// Number of partition cases
    pub partition_cases: usize,
    /// Number of boundary cases
    pub boundary_cases: usize,
    /// Boundary languages skipped for lack of voices
    pub skipped_languages: Vec<SkippedLanguage>,
    /// SHA-256 over the generated sequence, for reproducibility checks
    pub fingerprint: String,
}

impl GenerationSummary {
    /// Total cases generated
    #[must_use]
    pub const fn total(&self) -> usize {
        self.partition_cases + self.boundary_cases
    }
}

/// Output of a generation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCases {
    /// Cases in generation order
    pub cases: Vec<TestCase>,
    /// Diagnostics
    pub summary: GenerationSummary,
}

/// Builds the test-case matrix from a voice catalog
#[derive(Debug, Clone)]
pub struct CaseGenerator<'a> {
    catalog: &'a VoiceCatalog,
    config: GenerationConfig,
}

impl<'a> CaseGenerator<'a> {
    /// Create a generator over a catalog
    #[must_use]
    pub fn new(catalog: &'a VoiceCatalog, config: GenerationConfig) -> Self {
        Self { catalog, config }
    }

    /// Generate the full ordered case sequence
    pub fn generate(&self) -> ProbeResult<GeneratedCases> {
        self.config.validate()?;

        let mut next_id: CaseId = 1;
        let mut cases = Vec::new();
        let mut summary = GenerationSummary::default();

        if self.config.classes.partition() {
            for voice in self.partition_representatives() {
                cases.push(TestCase {
                    id: next_id,
                    category: CaseCategory::Partition,
                    subcategory: Subcategory::LanguageFamily,
                    language: voice.language.clone(),
                    voice: voice.clone(),
                    text: canonical_text(&voice.language).to_string(),
                    family: Some(language_family(&voice.language).to_string()),
                });
                next_id += 1;
            }
            summary.partition_cases = cases.len();
        }

        if self.config.classes.boundary() {
            let (voices, skipped) = self.boundary_voices();
            for skip in &skipped {
                tracing::warn!(
                    language = %skip.language,
                    reason = %skip.reason,
                    "boundary language skipped"
                );
            }
            summary.skipped_languages = skipped;

            for subcategory in Subcategory::BOUNDARY {
                let text = boundary_text(subcategory, self.config.long_text_threshold);
                for voice in &voices {
                    cases.push(TestCase {
                        id: next_id,
                        category: CaseCategory::Boundary,
                        subcategory,
                        language: voice.language.clone(),
                        voice: (*voice).clone(),
                        text: text.clone(),
                        family: None,
                    });
                    next_id += 1;
                }
            }
            summary.boundary_cases = cases.len() - summary.partition_cases;
        }

        summary.fingerprint = fingerprint(&cases)?;
        tracing::info!(
            partition = summary.partition_cases,
            boundary = summary.boundary_cases,
            skipped = summary.skipped_languages.len(),
            "generated test cases"
        );

        Ok(GeneratedCases { cases, summary })
    }

    /// First voice of every (language, gender) class, in catalog order
    fn partition_representatives(&self) -> Vec<&'a Voice> {
        let catalog: &'a VoiceCatalog = self.catalog;
        let mut seen: BTreeSet<(&str, Gender)> = BTreeSet::new();
        catalog
            .voices()
            .iter()
            .filter(|v| seen.insert((v.language.as_str(), v.gender)))
            .collect()
    }

    /// Representative voice per boundary language, in catalog language order
    fn boundary_voices(&self) -> (Vec<&'a Voice>, Vec<SkippedLanguage>) {
        let catalog: &'a VoiceCatalog = self.catalog;
        let catalog_languages = catalog.languages();
        match &self.config.boundary_languages {
            BoundaryLanguages::All => {
                let voices = catalog_languages
                    .iter()
                    .filter_map(|lang| catalog.first_voice(lang))
                    .collect();
                (voices, Vec::new())
            }
            BoundaryLanguages::Selected(selected) => {
                let mut skipped = Vec::new();
                let mut seen = BTreeSet::new();
                for language in selected {
                    if !seen.insert(language.as_str()) {
                        continue;
                    }
                    if catalog.first_voice(language).is_none() {
                        skipped.push(SkippedLanguage {
                            language: language.clone(),
                            reason: "no voices in catalog".to_string(),
                        });
                    }
                }
                let voices = catalog_languages
                    .iter()
                    .filter(|lang| selected.iter().any(|s| s == *lang))
                    .filter_map(|lang| catalog.first_voice(lang))
                    .collect();
                (voices, skipped)
            }
        }
    }
}

fn fingerprint(cases: &[TestCase]) -> ProbeResult<String> {
    let mut hasher = Sha256::new();
    for case in cases {
        hasher.update(serde_json::to_vec(case)?);
        hasher.update(b"\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}
