//! Voice catalog: the static registry of voices the frontend offers.
//!
//! The catalog is loaded once at startup and never mutated. Catalog order is
//! significant: representative voices are always the first match in it.

use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Voice gender
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Male voice
    Male,
    /// Female voice
    Female,
}

impl Gender {
    /// Parse the single-letter gender marker used by voice codes ("m"/"f")
    #[must_use]
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "m" | "male" => Some(Self::Male),
            "f" | "female" => Some(Self::Female),
            _ => None,
        }
    }

    /// Lowercase label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selectable voice
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Voice {
    /// Voice code submitted to the backend (e.g. "af_heart")
    pub code: String,
    /// Display name shown in the voice list
    pub display_name: String,
    /// Voice gender
    pub gender: Gender,
    /// Language label as shown in the language list
    pub language: String,
}

impl Voice {
    /// Create a new voice
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        display_name: impl Into<String>,
        gender: Gender,
        language: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
            gender,
            language: language.into(),
        }
    }
}

/// Language labels keyed by the first letter of a Kokoro voice code
const LANGUAGE_PREFIXES: &[(char, &str)] = &[
    ('a', "English (US)"),
    ('b', "English (UK)"),
    ('e', "Spanish"),
    ('f', "French"),
    ('i', "Italian"),
    ('p', "Portuguese (Brazil)"),
];

/// (display name, code) in the order the web app lists them
const KOKORO_VOICES: &[(&str, &str)] = &[
    ("KOKORO US Fenrir", "am_fenrir"),
    ("KOKORO US Nicole", "af_nicole"),
    ("KOKORO US Jessica", "af_jessica"),
    ("KOKORO US River", "af_river"),
    ("KOKORO US Eric", "am_eric"),
    ("KOKORO US Adam", "am_adam"),
    ("KOKORO US Alloy", "af_alloy"),
    ("KOKORO US Heart", "af_heart"),
    ("KOKORO US Onyx", "am_onyx"),
    ("KOKORO US Bella", "af_bella"),
    ("KOKORO US Aoede", "af_aoede"),
    ("KOKORO US Santa", "am_santa"),
    ("KOKORO US Sky", "af_sky"),
    ("KOKORO US Puck", "am_puck"),
    ("KOKORO US Nova", "af_nova"),
    ("KOKORO US Liam", "am_liam"),
    ("KOKORO US Sarah", "af_sarah"),
    ("KOKORO US Kore", "af_kore"),
    ("KOKORO US Echo", "am_echo"),
    ("KOKORO US Michael", "am_michael"),
    ("KOKORO GB Alice", "bf_alice"),
    ("KOKORO GB George", "bm_george"),
    ("KOKORO GB Fable", "bm_fable"),
    ("KOKORO GB Lily", "bf_lily"),
    ("KOKORO GB Emma", "bf_emma"),
    ("KOKORO GB Isabella", "bf_isabella"),
    ("KOKORO GB Lewis", "bm_lewis"),
    ("KOKORO GB Daniel", "bm_daniel"),
    ("KOKORO PT Dora", "pf_dora"),
    ("KOKORO PT Alex", "pm_alex"),
    ("KOKORO PT Santa", "pm_santa"),
    ("KOKORO IT Nicola", "im_nicola"),
    ("KOKORO IT Sara", "if_sara"),
    ("KOKORO FR Siwis", "ff_siwis"),
    ("KOKORO ES Dora", "ef_dora"),
    ("KOKORO ES Alex", "em_alex"),
    ("KOKORO ES Santa", "em_santa"),
];

/// Language label for a Kokoro voice code, derived from its prefix letter
#[must_use]
pub fn language_for_code(code: &str) -> Option<&'static str> {
    let prefix = code.chars().next()?;
    LANGUAGE_PREFIXES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, lang)| *lang)
}

/// Expression that reads the page's voice table, `null` when absent
pub const PAGE_VOICES_EXPRESSION: &str =
    "typeof voicesByLanguage === 'undefined' ? null : voicesByLanguage";

/// Entry of the page's `voicesByLanguage` object
#[derive(Debug, Deserialize)]
struct PageVoice {
    name: String,
    code: String,
    gender: String,
}

/// Immutable, ordered registry of voices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCatalog {
    voices: Vec<Voice>,
}

impl VoiceCatalog {
    /// Create a catalog from voices in catalog order
    #[must_use]
    pub fn new(voices: Vec<Voice>) -> Self {
        Self { voices }
    }

    /// The Kokoro voice set served by the reference web app
    #[must_use]
    pub fn builtin() -> Self {
        let voices = KOKORO_VOICES
            .iter()
            .filter_map(|(name, code)| {
                let language = language_for_code(code)?;
                let gender = code.get(1..2).and_then(Gender::from_marker)?;
                Some(Voice::new(*code, *name, gender, language))
            })
            .collect();
        Self { voices }
    }

    /// Build a catalog from the page's `voicesByLanguage` object:
    /// `{ "<language>": [{ "name": ..., "code": ..., "gender": "m" | "f" }] }`.
    ///
    /// Languages come out in lexicographic order; voices keep page order.
    pub fn from_page_json(value: &serde_json::Value) -> ProbeResult<Self> {
        let map = value.as_object().ok_or_else(|| ProbeError::Script {
            message: "voicesByLanguage is not an object".to_string(),
        })?;

        let mut voices = Vec::new();
        for (language, entries) in map {
            let entries: Vec<PageVoice> = serde_json::from_value(entries.clone())?;
            for entry in entries {
                let gender = Gender::from_marker(&entry.gender).ok_or_else(|| {
                    ProbeError::Script {
                        message: format!(
                            "voice {} has unknown gender marker {:?}",
                            entry.code, entry.gender
                        ),
                    }
                })?;
                voices.push(Voice::new(entry.code, entry.name, gender, language.clone()));
            }
        }

        if voices.is_empty() {
            return Err(ProbeError::Script {
                message: "voicesByLanguage is empty".to_string(),
            });
        }
        Ok(Self { voices })
    }

    /// Render in the page's `voicesByLanguage` shape
    #[must_use]
    pub fn to_page_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for language in self.languages() {
            let entries = self
                .voices_for(language)
                .map(|v| {
                    serde_json::json!({
                        "name": v.display_name,
                        "code": v.code,
                        "gender": &v.gender.as_str()[..1],
                    })
                })
                .collect();
            map.insert(language.to_string(), serde_json::Value::Array(entries));
        }
        serde_json::Value::Object(map)
    }

    /// All voices in catalog order
    #[must_use]
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Number of voices
    #[must_use]
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Whether the catalog has no voices
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Distinct languages in order of first appearance
    #[must_use]
    pub fn languages(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.voices
            .iter()
            .filter(|v| seen.insert(v.language.as_str()))
            .map(|v| v.language.as_str())
            .collect()
    }

    /// Voices of one language, in catalog order
    pub fn voices_for<'a>(&'a self, language: &'a str) -> impl Iterator<Item = &'a Voice> + 'a {
        self.voices.iter().filter(move |v| v.language == language)
    }

    /// First voice of a language in catalog order
    #[must_use]
    pub fn first_voice<'a>(&'a self, language: &'a str) -> Option<&'a Voice> {
        self.voices_for(language).next()
    }

    #[cfg(test)]
    pub fn by_code(&self, code: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod builtin_tests {
        use super::*;

        #[test]
        fn test_builtin_has_all_voices() {
            let catalog = VoiceCatalog::builtin();
            assert_eq!(catalog.len(), 37);
        }

        #[test]
        fn test_builtin_language_order() {
            let catalog = VoiceCatalog::builtin();
            assert_eq!(
                catalog.languages(),
                vec![
                    "English (US)",
                    "English (UK)",
                    "Portuguese (Brazil)",
                    "Italian",
                    "French",
                    "Spanish"
                ]
            );
        }

        #[test]
        fn test_builtin_genders_from_code() {
            let catalog = VoiceCatalog::builtin();
            let fenrir = catalog.by_code("am_fenrir").unwrap();
            assert_eq!(fenrir.gender, Gender::Male);
            assert_eq!(fenrir.language, "English (US)");
            let siwis = catalog.by_code("ff_siwis").unwrap();
            assert_eq!(siwis.gender, Gender::Female);
            assert_eq!(siwis.language, "French");
        }

        #[test]
        fn test_first_voice_follows_catalog_order() {
            let catalog = VoiceCatalog::builtin();
            assert_eq!(catalog.first_voice("English (US)").unwrap().code, "am_fenrir");
            assert_eq!(catalog.first_voice("Spanish").unwrap().code, "ef_dora");
            assert!(catalog.first_voice("Klingon").is_none());
        }

        #[test]
        fn test_language_for_code() {
            assert_eq!(language_for_code("bf_emma"), Some("English (UK)"));
            assert_eq!(language_for_code("zz_nobody"), None);
            assert_eq!(language_for_code(""), None);
        }
    }

    mod page_json_tests {
        use super::*;

        #[test]
        fn test_from_page_json() {
            let value = serde_json::json!({
                "English (US)": [
                    {"name": "KOKORO US Heart", "code": "af_heart", "gender": "f"},
                    {"name": "KOKORO US Adam", "code": "am_adam", "gender": "m"}
                ],
                "French": [
                    {"name": "KOKORO FR Siwis", "code": "ff_siwis", "gender": "f"}
                ]
            });
            let catalog = VoiceCatalog::from_page_json(&value).unwrap();
            assert_eq!(catalog.len(), 3);
            assert_eq!(catalog.voices_for("English (US)").count(), 2);
            assert_eq!(catalog.by_code("am_adam").unwrap().gender, Gender::Male);
        }

        #[test]
        fn test_from_page_json_rejects_non_object() {
            let err = VoiceCatalog::from_page_json(&serde_json::json!([1, 2])).unwrap_err();
            assert!(err.to_string().contains("not an object"));
        }

        #[test]
        fn test_from_page_json_rejects_bad_gender() {
            let value = serde_json::json!({
                "French": [{"name": "X", "code": "fx_x", "gender": "?"}]
            });
            assert!(VoiceCatalog::from_page_json(&value).is_err());
        }

        #[test]
        fn test_from_page_json_rejects_empty() {
            assert!(VoiceCatalog::from_page_json(&serde_json::json!({})).is_err());
        }

        #[test]
        fn test_page_json_keeps_voices() {
            let builtin = VoiceCatalog::builtin();
            let page = builtin.to_page_json();
            assert_eq!(page["French"][0]["gender"], "f");
            let reread = VoiceCatalog::from_page_json(&page).unwrap();
            assert_eq!(reread.len(), builtin.len());
            assert_eq!(reread.by_code("bm_george"), builtin.by_code("bm_george"));
        }
    }
}
