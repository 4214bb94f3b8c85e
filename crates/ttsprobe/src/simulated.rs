//! In-process model of the speech-synthesis frontend and its backend.
//!
//! [`SimulatedFrontend`] implements [`BrowserSession`] over a small DOM state
//! machine that follows the same contract as the real page: the voice list is
//! repopulated after a language change, the generate button posts
//! `{text, voice}` to a [`SimulatedBackend`], and the status region moves from
//! `loading` to `success` or `error`. The empty text is forwarded to the
//! backend like any other text; the backend decides.
//!
//! Faults (slow or missing voice lists, failed navigations, console noise, a
//! hidden audio player) are injectable for tests.

use crate::catalog::VoiceCatalog;
use crate::result::{ProbeError, ProbeResult};
use crate::session::{dom, BrowserSession, ConsoleEntry, GenerateObservation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

/// 1x1 transparent PNG written by [`SimulatedFrontend::screenshot`]
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Body of `POST /generate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Text to synthesize
    pub text: String,
    /// Voice code
    pub voice: String,
}

/// Backend answer to one generate request
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    /// HTTP status
    pub status: u16,
    /// JSON body
    pub body: serde_json::Value,
    /// Time until the response arrives
    pub latency: Duration,
}

impl BackendReply {
    /// `200 {success, filename, segments}`
    #[must_use]
    pub fn success(segments: u32, filename: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: serde_json::json!({
                "success": true,
                "filename": filename.into(),
                "segments": segments,
            }),
            latency: Duration::ZERO,
        }
    }

    /// `<status> {error}`
    #[must_use]
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message.into() }),
            latency: Duration::ZERO,
        }
    }

    /// Set the response latency
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Server side of the simulated frontend
pub trait SimulatedBackend: Send {
    /// Answer one generate request
    fn generate(&mut self, request: &GenerateRequest) -> BackendReply;
}

impl<F> SimulatedBackend for F
where
    F: FnMut(&GenerateRequest) -> BackendReply + Send,
{
    fn generate(&mut self, request: &GenerateRequest) -> BackendReply {
        self(request)
    }
}

/// Behaves like the Kokoro web app: rejects empty text with 400, otherwise
/// succeeds with one segment per started 400 characters and a latency that
/// grows with text length.
#[derive(Debug, Default, Clone)]
pub struct KokoroBackend {
    generated: u64,
}

impl KokoroBackend {
    /// Create a backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SimulatedBackend for KokoroBackend {
    fn generate(&mut self, request: &GenerateRequest) -> BackendReply {
        if request.text.is_empty() {
            return BackendReply::error(400, "Text is required");
        }
        self.generated += 1;
        let chars = request.text.chars().count() as u64;
        let segments = u32::try_from(chars.div_ceil(400)).unwrap_or(u32::MAX);
        BackendReply::success(segments, format!("output/sim_{:04}.wav", self.generated))
            .with_latency(Duration::from_millis(20 + chars / 8))
    }
}

/// When the voice list comes back after a language change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoicePopulation {
    /// On the first read
    #[default]
    Immediate,
    /// After this many empty reads
    AfterReads(u32),
    /// Never
    Never,
}

#[derive(Debug)]
struct PendingGeneration {
    reply: BackendReply,
    request: GenerateRequest,
    ready_at: Instant,
}

/// Simulated page + backend implementing [`BrowserSession`]
pub struct SimulatedFrontend {
    catalog: VoiceCatalog,
    backend: Box<dyn SimulatedBackend>,
    population: VoicePopulation,

    loaded: bool,
    language: String,
    voice_options: Vec<String>,
    pending_voice_reads: Option<u32>,
    voice: String,
    text: String,
    status_class: String,
    status_text: String,
    audio_hidden: bool,
    audio_src: Option<String>,
    pending: Option<PendingGeneration>,
    console: Vec<ConsoleEntry>,

    navigation_failures: u32,
    console_noise: Vec<ConsoleEntry>,
    hide_audio: bool,

    requests: Vec<GenerateRequest>,
    closed: bool,
}

impl std::fmt::Debug for SimulatedFrontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedFrontend")
            .field("language", &self.language)
            .field("voice", &self.voice)
            .field("status_class", &self.status_class)
            .field("requests", &self.requests.len())
            .finish_non_exhaustive()
    }
}

impl SimulatedFrontend {
    /// Frontend over `catalog` answering with `backend`
    #[must_use]
    pub fn new(catalog: VoiceCatalog, backend: impl SimulatedBackend + 'static) -> Self {
        Self {
            catalog,
            backend: Box::new(backend),
            population: VoicePopulation::Immediate,
            loaded: false,
            language: String::new(),
            voice_options: Vec::new(),
            pending_voice_reads: None,
            voice: String::new(),
            text: String::new(),
            status_class: "status".to_string(),
            status_text: String::new(),
            audio_hidden: true,
            audio_src: None,
            pending: None,
            console: Vec::new(),
            navigation_failures: 0,
            console_noise: Vec::new(),
            hide_audio: false,
            requests: Vec::new(),
            closed: false,
        }
    }

    /// Builtin catalog with the Kokoro-like backend
    #[must_use]
    pub fn kokoro() -> Self {
        Self::new(VoiceCatalog::builtin(), KokoroBackend::new())
    }

    /// Set when the voice list repopulates after a language change
    #[must_use]
    pub const fn with_voice_population(mut self, population: VoicePopulation) -> Self {
        self.population = population;
        self
    }

    /// Fail the next `count` navigations
    #[must_use]
    pub const fn with_navigation_failures(mut self, count: u32) -> Self {
        self.navigation_failures = count;
        self
    }

    /// Log these entries on every generation
    #[must_use]
    pub fn with_console_noise(mut self, entries: Vec<ConsoleEntry>) -> Self {
        self.console_noise = entries;
        self
    }

    /// Keep the audio player hidden even on success
    #[must_use]
    pub const fn with_hidden_audio(mut self) -> Self {
        self.hide_audio = true;
        self
    }

    /// Generate requests received by the backend, in order
    #[must_use]
    pub fn requests(&self) -> &[GenerateRequest] {
        &self.requests
    }

    /// Whether the session was closed
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> ProbeResult<()> {
        if self.closed {
            return Err(ProbeError::browser_fault("session closed"));
        }
        Ok(())
    }

    fn ensure_element(&self, selector: &str) -> ProbeResult<()> {
        self.ensure_open()?;
        if self.loaded && is_contract_id(selector) {
            Ok(())
        } else {
            Err(ProbeError::StaleElement {
                selector: selector.to_string(),
            })
        }
    }

    fn voices_of(&self, language: &str) -> Vec<String> {
        self.catalog
            .voices_for(language)
            .map(|v| v.code.clone())
            .collect()
    }

    fn change_language(&mut self, language: &str) {
        self.language = language.to_string();
        self.voice_options.clear();
        self.voice.clear();
        self.pending_voice_reads = match self.population {
            VoicePopulation::Immediate => Some(0),
            VoicePopulation::AfterReads(n) => Some(n),
            VoicePopulation::Never => None,
        };
    }

    /// One read of the voice list; it fills in once the pending reads run out
    fn read_voice_options(&mut self) -> Vec<String> {
        match self.pending_voice_reads {
            Some(0) => {
                self.voice_options = self.voices_of(&self.language.clone());
                if let Some(first) = self.voice_options.first() {
                    self.voice.clone_from(first);
                }
                self.pending_voice_reads = None;
            }
            Some(n) => self.pending_voice_reads = Some(n - 1),
            None => {}
        }
        self.voice_options.clone()
    }

    fn start_generation(&mut self) {
        let request = GenerateRequest {
            text: self.text.clone(),
            voice: self.voice.clone(),
        };
        let reply = self.backend.generate(&request);
        self.requests.push(request.clone());
        self.status_class = format!("status {}", dom::CLASS_LOADING);
        self.status_text = "Generating speech...".to_string();
        self.audio_hidden = true;
        self.audio_src = None;
        self.console.extend(self.console_noise.iter().cloned());
        self.pending = Some(PendingGeneration {
            ready_at: Instant::now() + reply.latency,
            reply,
            request,
        });
    }

    /// Resolve the in-flight generation if its response has arrived
    fn settle(&mut self) {
        let ready = self
            .pending
            .as_ref()
            .is_some_and(|p| Instant::now() >= p.ready_at);
        if !ready {
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        let observation = GenerateObservation::new(pending.reply.status, pending.reply.body)
            .with_request(serde_json::to_value(&pending.request).unwrap_or_default());
        self.console.push(observation.to_entry());

        if observation.is_success() {
            let segments = observation.segments().unwrap_or(1);
            self.status_class = format!("status {}", dom::CLASS_SUCCESS);
            self.status_text = format!("Audio generated successfully! ({segments} segments)");
            if !self.hide_audio {
                self.audio_hidden = false;
                self.audio_src = observation.filename().map(|f| format!("/audio/{f}"));
            }
        } else {
            let message = observation.error().map_or_else(
                || format!("Request failed with status {}", observation.status),
                ToString::to_string,
            );
            self.status_class = format!("status {}", dom::CLASS_ERROR);
            self.status_text = format!("Error: {message}");
        }
    }
}

fn is_contract_id(selector: &str) -> bool {
    [
        dom::LANGUAGE_SELECT,
        dom::VOICE_SELECT,
        dom::TEXT_AREA,
        dom::GENERATE_BTN,
        dom::STATUS,
        dom::AUDIO_CONTAINER,
        dom::AUDIO_PLAYER,
        dom::DOWNLOAD_BTN,
    ]
    .contains(&selector)
}

#[async_trait]
impl BrowserSession for SimulatedFrontend {
    async fn navigate(&mut self, url: &str) -> ProbeResult<()> {
        self.ensure_open()?;
        if self.navigation_failures > 0 {
            self.navigation_failures -= 1;
            self.loaded = false;
            return Err(ProbeError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }
        self.loaded = true;
        self.pending = None;
        self.console.clear();
        self.text.clear();
        self.status_class = "status".to_string();
        self.status_text.clear();
        self.audio_hidden = true;
        self.audio_src = None;

        // The page renders the first language with its voices already listed
        self.language = self
            .catalog
            .languages()
            .first()
            .map(ToString::to_string)
            .unwrap_or_default();
        self.voice_options = self.voices_of(&self.language.clone());
        self.voice = self.voice_options.first().cloned().unwrap_or_default();
        self.pending_voice_reads = None;
        Ok(())
    }

    async fn element_exists(&mut self, selector: &str) -> ProbeResult<bool> {
        self.ensure_open()?;
        Ok(self.loaded && is_contract_id(selector))
    }

    async fn select_option(&mut self, selector: &str, value: &str) -> ProbeResult<()> {
        self.ensure_element(selector)?;
        match selector {
            dom::LANGUAGE_SELECT => {
                if !self.catalog.languages().contains(&value) {
                    return Err(ProbeError::Script {
                        message: format!("option {value:?} not present in #{selector}"),
                    });
                }
                self.change_language(value);
                Ok(())
            }
            dom::VOICE_SELECT => {
                if !self.voice_options.iter().any(|v| v == value) {
                    return Err(ProbeError::Script {
                        message: format!("option {value:?} not present in #{selector}"),
                    });
                }
                self.voice = value.to_string();
                Ok(())
            }
            _ => Err(ProbeError::Script {
                message: format!("#{selector} is not a select"),
            }),
        }
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> ProbeResult<()> {
        self.ensure_element(selector)?;
        if selector != dom::TEXT_AREA {
            return Err(ProbeError::Script {
                message: format!("#{selector} is not a text input"),
            });
        }
        self.text = text.to_string();
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> ProbeResult<()> {
        self.ensure_element(selector)?;
        if selector == dom::GENERATE_BTN {
            self.start_generation();
        }
        Ok(())
    }

    async fn read_text(&mut self, selector: &str) -> ProbeResult<String> {
        self.ensure_element(selector)?;
        self.settle();
        Ok(match selector {
            dom::STATUS => self.status_text.clone(),
            dom::TEXT_AREA => self.text.clone(),
            _ => String::new(),
        })
    }

    async fn read_attribute(&mut self, selector: &str, name: &str) -> ProbeResult<Option<String>> {
        self.ensure_element(selector)?;
        self.settle();
        Ok(match (selector, name) {
            (dom::STATUS, "class") => Some(self.status_class.clone()),
            (dom::AUDIO_CONTAINER, "class") => Some(if self.audio_hidden {
                dom::CLASS_HIDDEN.to_string()
            } else {
                String::new()
            }),
            (dom::AUDIO_PLAYER, "src") => self.audio_src.clone(),
            _ => None,
        })
    }

    async fn option_values(&mut self, selector: &str) -> ProbeResult<Vec<String>> {
        self.ensure_element(selector)?;
        match selector {
            dom::LANGUAGE_SELECT => Ok(self
                .catalog
                .languages()
                .into_iter()
                .map(ToString::to_string)
                .collect()),
            dom::VOICE_SELECT => Ok(self.read_voice_options()),
            _ => Ok(Vec::new()),
        }
    }

    async fn screenshot(&mut self, path: &Path) -> ProbeResult<()> {
        self.ensure_open()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, PLACEHOLDER_PNG).await?;
        Ok(())
    }

    async fn read_console_log(&mut self) -> ProbeResult<Vec<ConsoleEntry>> {
        self.ensure_open()?;
        self.settle();
        Ok(std::mem::take(&mut self.console))
    }

    async fn evaluate_json(&mut self, expression: &str) -> ProbeResult<serde_json::Value> {
        self.ensure_open()?;
        if expression.contains("voicesByLanguage") {
            return Ok(self.catalog.to_page_json());
        }
        Err(ProbeError::Script {
            message: format!("simulated page cannot evaluate {expression:?}"),
        })
    }

    async fn close(&mut self) -> ProbeResult<()> {
        self.closed = true;
        self.loaded = false;
        Ok(())
    }
}
