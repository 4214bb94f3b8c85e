//! Case execution: drives one session through the frontend's DOM contract.
//!
//! A case moves `pending -> in-progress -> {success | failure | error}`.
//! Each attempt starts from a fresh page load and runs the full sequence:
//!
//! 1. select the language and wait for the voice list to contain the voice
//! 2. select the voice
//! 3. enter the text
//! 4. click generate and wait for a `success` or `error` status
//! 5. on success, check the audio player and record time and segments
//! 6. on error, record the rendered error text
//!
//! Retryable errors ([`ProbeError::is_retryable`]) repeat the whole case with
//! exponential backoff until [`RetryPolicy::max_attempts`] is used up, which
//! turns the outcome into `error`. Everything else, including panics inside
//! the session, ends the case as `error` at once. The executor never returns
//! an error: every case yields exactly one [`TestResult`].

use crate::case::{CaseCategory, Subcategory, TestCase};
use crate::catalog::Voice;
use crate::result::{ProbeError, ProbeResult};
use crate::session::{
    dom, latest_generate_observation, BrowserSession, ConsoleEntry, GenerateObservation,
};
use crate::store::{elapsed_ms, CaseStatus, TestResult};
use crate::wait::{Poller, WaitOptions};
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Default retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default delay before the first retry
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;

/// Upper bound on any single backoff delay
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;

/// Default per-element wait (seconds on the command line)
pub const DEFAULT_ELEMENT_TIMEOUT_MS: u64 = 120_000;

/// Upper bound on the audio presence check
pub const AUDIO_CHECK_TIMEOUT_MS: u64 = 5_000;

/// Text used to load models before the recorded cases
pub const WARMUP_TEXT: &str = "This is a warmup test.";

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff_ms: u64,
    /// Cap on any delay
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_retries` and default backoff
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Set the initial backoff
    #[must_use]
    pub const fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Attempts a case may use in total
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based): doubles each time, capped
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2_u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

/// Lifecycle state of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseState {
    /// Not started
    Pending,
    /// An attempt is running
    InProgress,
    /// Finished with audio
    Success,
    /// Retryable condition hit
    Failure,
    /// Terminal error
    Error,
}

impl CaseState {
    /// Kebab-case label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }
}

/// Executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Frontend base URL
    pub base_url: String,
    /// Timeout of each element wait
    pub element_timeout_ms: u64,
    /// Timeout of the wait for a terminal status after clicking generate
    pub generation_timeout_ms: u64,
    /// Poll interval of every wait
    pub poll_interval_ms: u64,
    /// Retry policy
    pub retry: RetryPolicy,
    /// Capture a screenshot on failure and error
    pub screenshots: bool,
    /// Screenshot directory
    pub screenshot_dir: PathBuf,
    /// Run timestamp used in screenshot names
    pub run_stamp: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            element_timeout_ms: DEFAULT_ELEMENT_TIMEOUT_MS,
            generation_timeout_ms: DEFAULT_ELEMENT_TIMEOUT_MS * 2,
            poll_interval_ms: crate::wait::DEFAULT_POLL_INTERVAL_MS,
            retry: RetryPolicy::default(),
            screenshots: false,
            screenshot_dir: PathBuf::from("test_results/screenshots"),
            run_stamp: String::new(),
        }
    }
}

impl ExecutorConfig {
    fn wait(&self, timeout_ms: u64) -> WaitOptions {
        WaitOptions::new()
            .with_timeout(timeout_ms)
            .with_poll_interval(self.poll_interval_ms)
    }

    /// Element wait options
    #[must_use]
    pub fn element_wait(&self) -> WaitOptions {
        self.wait(self.element_timeout_ms)
    }

    /// Terminal-status wait options
    #[must_use]
    pub fn generation_wait(&self) -> WaitOptions {
        self.wait(self.generation_timeout_ms)
    }

    /// Audio presence wait options
    #[must_use]
    pub fn audio_wait(&self) -> WaitOptions {
        self.wait(self.element_timeout_ms.min(AUDIO_CHECK_TIMEOUT_MS))
    }

    /// Screenshot path for one attempt
    #[must_use]
    pub fn screenshot_path(&self, case_id: u64, attempt: u32, state: CaseState) -> PathBuf {
        self.screenshot_dir.join(format!(
            "case{case_id}_attempt{attempt}_{}_{}.png",
            state.as_str(),
            self.run_stamp
        ))
    }

    /// Check the settings
    pub fn validate(&self) -> ProbeResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ProbeError::configuration("target URL is empty"));
        }
        if self.element_timeout_ms == 0 || self.generation_timeout_ms == 0 {
            return Err(ProbeError::configuration("timeouts must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ProbeError::configuration("poll interval must be positive"));
        }
        Ok(())
    }
}

/// What a successful attempt produced
#[derive(Debug, Clone, PartialEq)]
struct Generated {
    generation_time_ms: f64,
    segments: u32,
    audio_filename: Option<String>,
}

/// Console findings of one attempt
#[derive(Debug, Default)]
struct AttemptTrace {
    console_errors: Vec<String>,
    observation: Option<GenerateObservation>,
    console_read: bool,
}

impl AttemptTrace {
    fn absorb(&mut self, entries: &[ConsoleEntry]) {
        self.console_errors.extend(
            entries
                .iter()
                .filter(|e| e.is_error())
                .map(|e| e.text.clone()),
        );
        if let Some(observation) = latest_generate_observation(entries) {
            self.observation = Some(observation);
        }
        self.console_read = true;
    }
}

/// Runs single cases against a session
#[derive(Debug, Clone)]
pub struct CaseExecutor {
    config: ExecutorConfig,
}

impl CaseExecutor {
    /// Create an executor
    #[must_use]
    pub const fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Run one case to completion. Never fails: every outcome is a result.
    pub async fn execute(&self, session: &mut dyn BrowserSession, case: &TestCase) -> TestResult {
        let start_time = Utc::now();
        let max_attempts = self.config.retry.max_attempts();
        let mut screenshot_path = None;
        let mut attempt: u32 = 1;

        tracing::debug!(
            case_id = case.id,
            state = CaseState::Pending.as_str(),
            language = %case.language,
            voice = %case.voice.code,
            "case queued"
        );

        loop {
            tracing::debug!(
                case_id = case.id,
                attempt,
                state = CaseState::InProgress.as_str(),
                "attempt started"
            );
            let mut trace = AttemptTrace::default();
            let outcome = AssertUnwindSafe(self.attempt(session, case, &mut trace))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(ProbeError::application(format!(
                        "unexpected panic during case: {}",
                        panic_message(panic.as_ref())
                    )))
                });

            if !trace.console_read {
                if let Ok(entries) = session.read_console_log().await {
                    trace.absorb(&entries);
                }
            }

            let err = match outcome {
                Ok(generated) => {
                    tracing::info!(
                        case_id = case.id,
                        attempt,
                        ms = generated.generation_time_ms,
                        segments = generated.segments,
                        "case succeeded"
                    );
                    return TestResult {
                        case_id: case.id,
                        status: CaseStatus::Success,
                        start_time,
                        end_time: Utc::now(),
                        generation_time_ms: generated.generation_time_ms,
                        segments: generated.segments,
                        error_message: None,
                        screenshot_path,
                        retries_used: attempt - 1,
                        console_errors: trace.console_errors,
                        audio_filename: generated.audio_filename,
                    };
                }
                Err(err) => err,
            };

            if err.is_retryable() && attempt < max_attempts {
                tracing::warn!(
                    case_id = case.id,
                    attempt,
                    state = CaseState::Failure.as_str(),
                    error = %err,
                    "attempt failed, retrying"
                );
                screenshot_path = self
                    .capture(session, case.id, attempt, CaseState::Failure)
                    .await
                    .or(screenshot_path);
                tokio::time::sleep(self.config.retry.backoff(attempt)).await;
                attempt += 1;
                continue;
            }

            let message = if err.is_retryable() {
                format!("retries exhausted after {attempt} attempts: {err}")
            } else {
                err.to_string()
            };
            tracing::warn!(
                case_id = case.id,
                attempt,
                state = CaseState::Error.as_str(),
                error = %message,
                "case errored"
            );
            screenshot_path = self
                .capture(session, case.id, attempt, CaseState::Error)
                .await
                .or(screenshot_path);

            let end_time = Utc::now();
            return TestResult {
                case_id: case.id,
                status: CaseStatus::Error,
                start_time,
                end_time,
                generation_time_ms: elapsed_ms(start_time, end_time),
                segments: 0,
                error_message: Some(message),
                screenshot_path,
                retries_used: attempt - 1,
                console_errors: trace.console_errors,
                audio_filename: None,
            };
        }
    }

    /// One unrecorded generation to load the backend's models for a language
    pub async fn warm_up(&self, session: &mut dyn BrowserSession, voice: &Voice) -> ProbeResult<()> {
        let case = TestCase {
            id: 0,
            category: CaseCategory::Partition,
            subcategory: Subcategory::LanguageFamily,
            language: voice.language.clone(),
            voice: voice.clone(),
            text: WARMUP_TEXT.to_string(),
            family: None,
        };
        let mut trace = AttemptTrace::default();
        self.attempt(session, &case, &mut trace).await.map(|_| ())
    }

    async fn attempt(
        &self,
        session: &mut dyn BrowserSession,
        case: &TestCase,
        trace: &mut AttemptTrace,
    ) -> ProbeResult<Generated> {
        let element = self.config.element_wait();

        session.navigate(&self.config.base_url).await?;
        session.wait_for_element(dom::LANGUAGE_SELECT, element).await?;

        // 1. language, then the voice list repopulates
        session
            .select_option(dom::LANGUAGE_SELECT, &case.language)
            .await?;
        self.wait_for_voice(session, &case.voice.code).await?;

        // 2. voice
        session
            .select_option(dom::VOICE_SELECT, &case.voice.code)
            .await?;

        // 3. text
        session.wait_for_element(dom::TEXT_AREA, element).await?;
        session.type_text(dom::TEXT_AREA, &case.text).await?;

        // 4. generate
        session.wait_for_element(dom::GENERATE_BTN, element).await?;
        let triggered = Instant::now();
        session.click(dom::GENERATE_BTN).await?;
        let class = self.wait_for_terminal_status(session).await?;
        let generation_time_ms = triggered.elapsed().as_secs_f64() * 1000.0;

        let entries = session.read_console_log().await?;
        trace.absorb(&entries);

        if dom::has_class(&class, dom::CLASS_SUCCESS) {
            // 5. success
            self.wait_for_audio(session).await?;
            let status_text = session.read_text(dom::STATUS).await?;
            let segments = trace
                .observation
                .as_ref()
                .and_then(GenerateObservation::segments)
                .or_else(|| segments_from_status(&status_text))
                .unwrap_or(0);
            let audio_filename = trace
                .observation
                .as_ref()
                .and_then(|o| o.filename().map(ToString::to_string));
            return Ok(Generated {
                generation_time_ms,
                segments,
                audio_filename,
            });
        }

        // 6. error
        let rendered = session.read_text(dom::STATUS).await?.trim().to_string();
        let observation = trace.observation.as_ref();
        let message = if rendered.is_empty() {
            observation
                .and_then(GenerateObservation::error)
                .map_or_else(
                    || "error status without message".to_string(),
                    |e| format!("Error: {e}"),
                )
        } else {
            rendered
        };
        match observation {
            Some(obs) if !obs.is_success() => Err(ProbeError::Backend {
                status: obs.status,
                message,
            }),
            _ => Err(ProbeError::application(message)),
        }
    }

    async fn wait_for_voice(&self, session: &mut dyn BrowserSession, code: &str) -> ProbeResult<()> {
        let mut poller = Poller::new(self.config.element_wait(), dom::VOICE_SELECT);
        loop {
            let options = session.option_values(dom::VOICE_SELECT).await?;
            if options.iter().any(|v| v == code) {
                return Ok(());
            }
            poller.tick().await?;
        }
    }

    async fn wait_for_terminal_status(&self, session: &mut dyn BrowserSession) -> ProbeResult<String> {
        let mut poller = Poller::new(self.config.generation_wait(), dom::STATUS);
        loop {
            let class = session
                .read_attribute(dom::STATUS, "class")
                .await?
                .unwrap_or_default();
            if dom::has_class(&class, dom::CLASS_SUCCESS) || dom::has_class(&class, dom::CLASS_ERROR)
            {
                return Ok(class);
            }
            poller.tick().await?;
        }
    }

    async fn wait_for_audio(&self, session: &mut dyn BrowserSession) -> ProbeResult<()> {
        let mut poller = Poller::new(self.config.audio_wait(), dom::AUDIO_PLAYER);
        loop {
            let container = session
                .read_attribute(dom::AUDIO_CONTAINER, "class")
                .await?
                .unwrap_or_default();
            let src = session
                .read_attribute(dom::AUDIO_PLAYER, "src")
                .await?
                .unwrap_or_default();
            if !dom::has_class(&container, dom::CLASS_HIDDEN) && !src.is_empty() {
                return Ok(());
            }
            if let Err(ProbeError::ElementTimeout { .. }) = poller.tick().await {
                return Err(ProbeError::application(
                    "audio player not shown despite success status",
                ));
            }
        }
    }

    /// Best-effort screenshot; failures are logged and swallowed
    async fn capture(
        &self,
        session: &mut dyn BrowserSession,
        case_id: u64,
        attempt: u32,
        state: CaseState,
    ) -> Option<String> {
        if !self.config.screenshots {
            return None;
        }
        let path = self.config.screenshot_path(case_id, attempt, state);
        match session.screenshot(&path).await {
            Ok(()) => Some(path.display().to_string()),
            Err(e) => {
                tracing::warn!(case_id, attempt, error = %e, "screenshot failed");
                None
            }
        }
    }
}

/// First number in a status line such as `Audio generated successfully! (3 segments)`
fn segments_from_status(text: &str) -> Option<u32> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

/// Text of a caught panic payload
#[must_use]
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VoiceCatalog;
    use crate::session::ConsoleLevel;
    use crate::simulated::{
        BackendReply, GenerateRequest, SimulatedFrontend, VoicePopulation,
    };
    use std::path::Path;

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            element_timeout_ms: 60,
            generation_timeout_ms: 200,
            poll_interval_ms: 5,
            retry: RetryPolicy::new(2).with_initial_backoff(1),
            ..ExecutorConfig::default()
        }
    }

    fn case_for(language: &str, code: &str, text: &str, subcategory: Subcategory) -> TestCase {
        let catalog = VoiceCatalog::builtin();
        TestCase {
            id: 1,
            category: subcategory.category(),
            subcategory,
            language: language.to_string(),
            voice: catalog.by_code(code).unwrap().clone(),
            text: text.to_string(),
            family: None,
        }
    }

    mod retry_policy_tests {
        use super::*;

        #[test]
        fn test_backoff_doubles_and_caps() {
            let policy = RetryPolicy::default();
            assert_eq!(policy.backoff(1), Duration::from_millis(500));
            assert_eq!(policy.backoff(2), Duration::from_millis(1000));
            assert_eq!(policy.backoff(3), Duration::from_millis(2000));
            assert_eq!(policy.backoff(10), Duration::from_millis(8000));
            assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(8000));
        }

        #[test]
        fn test_attempts() {
            assert_eq!(RetryPolicy::default().max_attempts(), 3);
            assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
            assert_eq!(RetryPolicy::new(u32::MAX).max_attempts(), u32::MAX);
        }
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_screenshot_name() {
            let config = ExecutorConfig {
                screenshot_dir: PathBuf::from("out/screenshots"),
                run_stamp: "20260102_030405".into(),
                ..ExecutorConfig::default()
            };
            assert_eq!(
                config.screenshot_path(7, 2, CaseState::Failure),
                Path::new("out/screenshots/case7_attempt2_failure_20260102_030405.png")
            );
        }

        #[test]
        fn test_default_waits() {
            let config = ExecutorConfig::default();
            assert_eq!(config.element_wait().timeout_ms, 120_000);
            assert_eq!(config.generation_wait().timeout_ms, 240_000);
        }

        #[test]
        fn test_audio_wait_is_capped() {
            let config = ExecutorConfig::default();
            assert_eq!(config.audio_wait().timeout_ms, AUDIO_CHECK_TIMEOUT_MS);
            let config = ExecutorConfig {
                element_timeout_ms: 1000,
                ..ExecutorConfig::default()
            };
            assert_eq!(config.audio_wait().timeout_ms, 1000);
        }

        #[test]
        fn test_validate() {
            assert!(ExecutorConfig::default().validate().is_ok());
            let bad = ExecutorConfig {
                base_url: " ".into(),
                ..ExecutorConfig::default()
            };
            assert!(bad.validate().is_err());
        }

        #[test]
        fn test_segments_from_status() {
            assert_eq!(
                segments_from_status("Audio generated successfully! (3 segments)"),
                Some(3)
            );
            assert_eq!(segments_from_status("done"), None);
        }
    }

    mod scenario_tests {
        use super::*;

        #[tokio::test]
        async fn test_hello_world_success() {
            let mut frontend = SimulatedFrontend::new(VoiceCatalog::builtin(), |_: &GenerateRequest| {
                BackendReply::success(1, "x.wav")
            });
            let case = case_for(
                "English (US)",
                "af_heart",
                "Hello world",
                Subcategory::LanguageFamily,
            );

            let result = CaseExecutor::new(fast_config())
                .execute(&mut frontend, &case)
                .await;

            assert_eq!(result.status, CaseStatus::Success, "{result:?}");
            assert_eq!(result.segments, 1);
            assert_eq!(result.retries_used, 0);
            assert_eq!(result.audio_filename.as_deref(), Some("x.wav"));
            assert!(result.error_message.is_none());
            assert_eq!(
                frontend.requests(),
                &[GenerateRequest {
                    text: "Hello world".into(),
                    voice: "af_heart".into(),
                }]
            );
        }

        #[tokio::test]
        async fn test_empty_text_rejected_by_backend() {
            let mut frontend = SimulatedFrontend::kokoro();
            let case = case_for("English (US)", "af_heart", "", Subcategory::EmptyText);

            let result = CaseExecutor::new(fast_config())
                .execute(&mut frontend, &case)
                .await;

            assert_eq!(result.status, CaseStatus::Error);
            assert_eq!(result.retries_used, 0);
            let message = result.error_message.unwrap();
            assert!(message.contains("Text is required"), "{message}");
            assert!(message.contains("HTTP 400"), "{message}");
            assert_eq!(frontend.requests().len(), 1);
            assert_eq!(frontend.requests()[0].text, "");
        }

        #[tokio::test]
        async fn test_server_error_carries_status() {
            let mut frontend = SimulatedFrontend::new(
                VoiceCatalog::builtin(),
                |_: &GenerateRequest| BackendReply::error(500, "CUDA out of memory"),
            );
            let case = case_for("French", "ff_siwis", "Bonjour", Subcategory::LanguageFamily);

            let result = CaseExecutor::new(fast_config())
                .execute(&mut frontend, &case)
                .await;

            assert_eq!(result.status, CaseStatus::Error);
            assert_eq!(result.retries_used, 0, "backend errors are not retried");
            assert!(result.error_message.unwrap().contains("HTTP 500"));
            assert_eq!(frontend.requests().len(), 1);
        }

        #[tokio::test]
        async fn test_voice_list_never_populates() {
            let mut frontend =
                SimulatedFrontend::kokoro().with_voice_population(VoicePopulation::Never);
            let case = case_for("Italian", "if_sara", "Ciao", Subcategory::LanguageFamily);
            let config = fast_config();
            let max_retries = config.retry.max_retries;

            let result = CaseExecutor::new(config).execute(&mut frontend, &case).await;

            assert_eq!(result.status, CaseStatus::Error);
            assert_eq!(result.retries_used, max_retries);
            let message = result.error_message.unwrap();
            assert!(message.contains("Element timeout"), "{message}");
            assert!(message.contains("#voice-select"), "{message}");
            assert!(frontend.requests().is_empty());
        }
    }

    mod retry_tests {
        use super::*;

        #[tokio::test]
        async fn test_transient_failures_below_limit_recover() {
            let mut frontend = SimulatedFrontend::kokoro().with_navigation_failures(2);
            let case = case_for("English (UK)", "bf_emma", "Hello world.", Subcategory::LanguageFamily);

            let result = CaseExecutor::new(fast_config())
                .execute(&mut frontend, &case)
                .await;

            assert_eq!(result.status, CaseStatus::Success);
            assert_eq!(result.retries_used, 2);
        }

        #[tokio::test]
        async fn test_slow_voice_list_within_timeout() {
            let mut frontend = SimulatedFrontend::kokoro()
                .with_voice_population(VoicePopulation::AfterReads(3));
            let case = case_for("French", "ff_siwis", "Bonjour", Subcategory::LanguageFamily);

            let result = CaseExecutor::new(fast_config())
                .execute(&mut frontend, &case)
                .await;

            assert_eq!(result.status, CaseStatus::Success);
            assert_eq!(result.retries_used, 0);
        }

        #[tokio::test]
        async fn test_no_retries_configured() {
            let mut frontend = SimulatedFrontend::kokoro().with_navigation_failures(1);
            let config = ExecutorConfig {
                retry: RetryPolicy::new(0),
                ..fast_config()
            };
            let case = case_for("French", "ff_siwis", "Bonjour", Subcategory::LanguageFamily);

            let result = CaseExecutor::new(config).execute(&mut frontend, &case).await;

            assert_eq!(result.status, CaseStatus::Error);
            assert_eq!(result.retries_used, 0);
            assert!(result.error_message.unwrap().contains("retries exhausted after 1 attempts"));
        }
    }

    mod detail_tests {
        use super::*;

        #[tokio::test]
        async fn test_missing_audio_player_is_error() {
            let mut frontend = SimulatedFrontend::kokoro().with_hidden_audio();
            let case = case_for("English (US)", "am_adam", "Hi", Subcategory::SingleCharacter);

            let result = CaseExecutor::new(fast_config())
                .execute(&mut frontend, &case)
                .await;

            assert_eq!(result.status, CaseStatus::Error);
            assert_eq!(result.retries_used, 0);
            assert_eq!(
                result.error_message.as_deref(),
                Some("audio player not shown despite success status")
            );
        }

        #[tokio::test]
        async fn test_console_errors_recorded() {
            let mut frontend = SimulatedFrontend::kokoro().with_console_noise(vec![
                ConsoleEntry::new(ConsoleLevel::Log, "model loaded"),
                ConsoleEntry::new(ConsoleLevel::Warn, "Tensor allocation slow"),
            ]);
            let case = case_for("English (US)", "af_heart", "Hello world.", Subcategory::LanguageFamily);

            let result = CaseExecutor::new(fast_config())
                .execute(&mut frontend, &case)
                .await;

            assert_eq!(result.status, CaseStatus::Success);
            assert_eq!(result.console_errors, vec!["Tensor allocation slow".to_string()]);
        }

        #[tokio::test]
        async fn test_screenshots_on_failure_and_error() {
            let dir = tempfile::tempdir().unwrap();
            let mut frontend =
                SimulatedFrontend::kokoro().with_voice_population(VoicePopulation::Never);
            let config = ExecutorConfig {
                screenshots: true,
                screenshot_dir: dir.path().to_path_buf(),
                run_stamp: "20260101_120000".into(),
                retry: RetryPolicy::new(1).with_initial_backoff(1),
                ..fast_config()
            };
            let case = case_for("French", "ff_siwis", "Bonjour", Subcategory::LanguageFamily);

            let result = CaseExecutor::new(config).execute(&mut frontend, &case).await;

            assert!(dir.path().join("case1_attempt1_failure_20260101_120000.png").exists());
            let last = dir.path().join("case1_attempt2_error_20260101_120000.png");
            assert!(last.exists());
            assert_eq!(result.screenshot_path, Some(last.display().to_string()));
        }

        #[tokio::test]
        async fn test_generation_time_measured() {
            let mut frontend = SimulatedFrontend::new(VoiceCatalog::builtin(), |_: &GenerateRequest| {
                BackendReply::success(1, "slow.wav").with_latency(Duration::from_millis(30))
            });
            let case = case_for("English (US)", "af_heart", "Hello world.", Subcategory::LanguageFamily);

            let result = CaseExecutor::new(fast_config())
                .execute(&mut frontend, &case)
                .await;

            assert_eq!(result.status, CaseStatus::Success);
            assert!(result.generation_time_ms >= 30.0, "{}", result.generation_time_ms);
            assert!(result.end_time >= result.start_time);
        }

        #[tokio::test]
        async fn test_panicking_backend_is_contained() {
            let mut frontend = SimulatedFrontend::new(
                VoiceCatalog::builtin(),
                |_: &GenerateRequest| -> BackendReply { panic!("backend exploded") },
            );
            let case = case_for("English (US)", "af_heart", "Hello world.", Subcategory::LanguageFamily);

            let result = CaseExecutor::new(fast_config())
                .execute(&mut frontend, &case)
                .await;

            assert_eq!(result.status, CaseStatus::Error);
            let message = result.error_message.unwrap();
            assert!(message.contains("backend exploded"), "{message}");
        }

        #[tokio::test]
        async fn test_warm_up_is_unrecorded_generation() {
            let mut frontend = SimulatedFrontend::kokoro();
            let catalog = VoiceCatalog::builtin();
            let voice = catalog.first_voice("Portuguese (Brazil)").unwrap();

            CaseExecutor::new(fast_config())
                .warm_up(&mut frontend, voice)
                .await
                .unwrap();

            assert_eq!(frontend.requests().len(), 1);
            assert_eq!(frontend.requests()[0].text, WARMUP_TEXT);
        }
    }
}
