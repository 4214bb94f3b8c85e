//! BrowserSession: the capability seam between the executor and a browser.
//!
//! The executor only ever talks to the frontend through this trait, using the
//! element ids in [`dom`]. Implementations:
//!
//! - `ChromiumSession` - CDP via chromiumoxide (feature `browser`)
//! - [`SimulatedFrontend`](crate::simulated::SimulatedFrontend) - in-process
//!   model of the frontend and backend, for tests and dry runs
//!
//! Every operation is bounded and none retries internally.

#[cfg(feature = "browser")]
mod chromium;

#[cfg(feature = "browser")]
pub use chromium::{ChromiumSession, SessionConfig};

use crate::result::ProbeResult;
use crate::wait::{Poller, WaitOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Element ids and CSS class markers of the frontend's DOM contract.
///
/// Changing any of these is a breaking change for the executor.
pub mod dom {
    /// Language `<select>`
    pub const LANGUAGE_SELECT: &str = "language-select";
    /// Voice `<select>`, repopulated after a language change
    pub const VOICE_SELECT: &str = "voice-select";
    /// Text input
    pub const TEXT_AREA: &str = "text-area";
    /// Generate button
    pub const GENERATE_BTN: &str = "generate-btn";
    /// Status region; its class is `loading`, `success` or `error`
    pub const STATUS: &str = "status";
    /// Audio container, hidden until audio is ready
    pub const AUDIO_CONTAINER: &str = "audio-container";
    /// `<audio>` element
    pub const AUDIO_PLAYER: &str = "audio-player";
    /// Download link
    pub const DOWNLOAD_BTN: &str = "download-btn";

    /// Status class while generating
    pub const CLASS_LOADING: &str = "loading";
    /// Status class on success
    pub const CLASS_SUCCESS: &str = "success";
    /// Status class on error
    pub const CLASS_ERROR: &str = "error";
    /// Visibility marker on the audio container
    pub const CLASS_HIDDEN: &str = "hidden";

    /// Whether a class attribute contains a class token
    #[must_use]
    pub fn has_class(class_attr: &str, class: &str) -> bool {
        class_attr.split_whitespace().any(|c| c == class)
    }
}

/// Prefix of console entries that record a `/generate` response
pub const GENERATE_MARKER: &str = "ttsprobe:generate ";

/// Console message level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    /// Log level
    Log,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level
    Error,
    /// Debug level
    Debug,
}

/// Console message captured from the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// Message level
    pub level: ConsoleLevel,
    /// Message text
    pub text: String,
}

impl ConsoleEntry {
    /// Create a console entry
    #[must_use]
    pub fn new(level: ConsoleLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    /// Whether this entry signals a problem worth recording on the result:
    /// error level, or any mention of the inference runtime's tensors.
    #[must_use]
    pub fn is_error(&self) -> bool {
        if self.text.starts_with(GENERATE_MARKER) {
            return false;
        }
        self.level == ConsoleLevel::Error || self.text.to_lowercase().contains("tensor")
    }
}

/// One observed `/generate` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateObservation {
    /// HTTP status
    pub status: u16,
    /// Parsed JSON body (`null` if it was not JSON)
    #[serde(default)]
    pub body: serde_json::Value,
    /// Request payload, when the hook could read it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<serde_json::Value>,
}

impl GenerateObservation {
    /// Create an observation
    #[must_use]
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body,
            request: None,
        }
    }

    /// Attach the request payload
    #[must_use]
    pub fn with_request(mut self, request: serde_json::Value) -> Self {
        self.request = Some(request);
        self
    }

    /// Parse a console entry written by a generate hook
    #[must_use]
    pub fn parse(entry: &ConsoleEntry) -> Option<Self> {
        let json = entry.text.strip_prefix(GENERATE_MARKER)?;
        serde_json::from_str(json).ok()
    }

    /// Render as a console entry
    #[must_use]
    pub fn to_entry(&self) -> ConsoleEntry {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        ConsoleEntry::new(ConsoleLevel::Info, format!("{GENERATE_MARKER}{json}"))
    }

    /// Whether the HTTP status is 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// `segments` field of the body
    #[must_use]
    pub fn segments(&self) -> Option<u32> {
        self.body
            .get("segments")
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    /// `filename` field of the body
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.body.get("filename").and_then(serde_json::Value::as_str)
    }

    /// `error` field of the body
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.body.get("error").and_then(serde_json::Value::as_str)
    }
}

/// Most recent generate observation among console entries
#[must_use]
pub fn latest_generate_observation(entries: &[ConsoleEntry]) -> Option<GenerateObservation> {
    entries.iter().rev().find_map(GenerateObservation::parse)
}

/// Capability wrapper over one driven browser page.
///
/// Selectors are element ids from [`dom`].
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to URL
    async fn navigate(&mut self, url: &str) -> ProbeResult<()>;

    /// Whether an element with this id is currently present
    async fn element_exists(&mut self, selector: &str) -> ProbeResult<bool>;

    /// Wait for an element to be present, polling at `options.poll_interval`
    async fn wait_for_element(&mut self, selector: &str, options: WaitOptions) -> ProbeResult<()> {
        let mut poller = Poller::new(options, selector);
        loop {
            if self.element_exists(selector).await? {
                return Ok(());
            }
            poller.tick().await?;
        }
    }

    /// Select an option of a `<select>` by value and fire `change`
    async fn select_option(&mut self, selector: &str, value: &str) -> ProbeResult<()>;

    /// Replace the value of an input and fire `input`
    async fn type_text(&mut self, selector: &str, text: &str) -> ProbeResult<()>;

    /// Click an element
    async fn click(&mut self, selector: &str) -> ProbeResult<()>;

    /// Text content of an element
    async fn read_text(&mut self, selector: &str) -> ProbeResult<String>;

    /// Attribute of an element, `None` if unset
    async fn read_attribute(&mut self, selector: &str, name: &str) -> ProbeResult<Option<String>>;

    /// Option values of a `<select>`, in list order
    async fn option_values(&mut self, selector: &str) -> ProbeResult<Vec<String>>;

    /// Save a PNG screenshot of the page
    async fn screenshot(&mut self, path: &Path) -> ProbeResult<()>;

    /// Console entries captured since the previous call
    async fn read_console_log(&mut self) -> ProbeResult<Vec<ConsoleEntry>>;

    /// Evaluate a JavaScript expression and return its JSON value
    async fn evaluate_json(&mut self, expression: &str) -> ProbeResult<serde_json::Value>;

    /// Tear the session down
    async fn close(&mut self) -> ProbeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod dom_tests {
        use super::dom::*;

        #[test]
        fn test_has_class() {
            assert!(has_class("status success", CLASS_SUCCESS));
            assert!(!has_class("status unsuccessful", CLASS_SUCCESS));
            assert!(has_class("hidden", CLASS_HIDDEN));
            assert!(!has_class("", CLASS_HIDDEN));
        }
    }

    mod console_tests {
        use super::*;

        #[test]
        fn test_is_error() {
            assert!(ConsoleEntry::new(ConsoleLevel::Error, "boom").is_error());
            assert!(ConsoleEntry::new(ConsoleLevel::Log, "Tensor shape mismatch").is_error());
            assert!(!ConsoleEntry::new(ConsoleLevel::Info, "ready").is_error());
        }

        #[test]
        fn test_generate_marker_is_not_an_error() {
            let entry = GenerateObservation::new(500, serde_json::json!({"error": "tensor"}))
                .to_entry();
            assert!(!entry.is_error());
        }
    }

    mod observation_tests {
        use super::*;

        #[test]
        fn test_entry_roundtrip_fields() {
            let obs = GenerateObservation::new(
                200,
                serde_json::json!({"segments": 3, "filename": "output/x.wav", "success": true}),
            );
            let parsed = GenerateObservation::parse(&obs.to_entry()).unwrap();
            assert!(parsed.is_success());
            assert_eq!(parsed.segments(), Some(3));
            assert_eq!(parsed.filename(), Some("output/x.wav"));
            assert!(parsed.error().is_none());
            assert!(parsed.request.is_none());
        }

        #[test]
        fn test_parse_hook_output_with_request() {
            let entry = ConsoleEntry::new(
                ConsoleLevel::Info,
                r#"ttsprobe:generate {"status":400,"body":{"error":"Text is required"},"request":{"text":"","voice":"af_heart"}}"#,
            );
            let obs = GenerateObservation::parse(&entry).unwrap();
            assert_eq!(obs.status, 400);
            assert!(!obs.is_success());
            assert_eq!(obs.error(), Some("Text is required"));
            assert_eq!(obs.request.unwrap()["voice"], "af_heart");
        }

        #[test]
        fn test_parse_ignores_other_entries() {
            let entry = ConsoleEntry::new(ConsoleLevel::Log, "hello");
            assert!(GenerateObservation::parse(&entry).is_none());
        }

        #[test]
        fn test_latest_wins() {
            let entries = vec![
                GenerateObservation::new(500, serde_json::json!({"error": "first"})).to_entry(),
                ConsoleEntry::new(ConsoleLevel::Log, "noise"),
                GenerateObservation::new(400, serde_json::json!({"error": "second"})).to_entry(),
            ];
            let latest = latest_generate_observation(&entries).unwrap();
            assert_eq!(latest.status, 400);
            assert_eq!(latest.error(), Some("second"));
        }
    }
}
