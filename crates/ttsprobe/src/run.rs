//! Whole-run orchestration.
//!
//! A run generates the case matrix, orders it, registers every case with the
//! result store, warms the backend up, then executes cases one at a time.
//! The overall run timeout and the external stop signal abandon only the
//! case in flight: it is recorded as an error, nothing further starts, and
//! the partial document is still persisted and reported.

use crate::aggregate::{Aggregator, RunSummary};
use crate::case::TestCase;
use crate::catalog::{VoiceCatalog, PAGE_VOICES_EXPRESSION};
use crate::chart::SvgChartRenderer;
use crate::executor::{
    CaseExecutor, ExecutorConfig, RetryPolicy, DEFAULT_ELEMENT_TIMEOUT_MS,
    DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_RETRIES,
};
use crate::generator::{CaseGenerator, GenerationConfig};
use crate::orderer::{CaseOrderer, Seed};
use crate::report::{ReportArtifacts, Reporter};
use crate::result::{ProbeError, ProbeResult};
use crate::session::BrowserSession;
use crate::store::{ResultStore, RunDocument, TestResult};
use crate::wait::DEFAULT_POLL_INTERVAL_MS;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Default overall run timeout (two hours)
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 7_200_000;

/// Default output directory
pub const DEFAULT_OUTPUT_DIR: &str = "test_results";

/// Default frontend URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Why a run ended before every case had a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The overall run timeout expired
    RunTimeout,
    /// The stop signal fired
    Cancelled,
}

impl StopReason {
    /// Message recorded on the abandoned case and the document
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunTimeout => "run timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Settings of one run, after merging flags, file and defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Frontend base URL
    pub base_url: String,
    /// Directory for the result document, reports and screenshots
    pub output_dir: PathBuf,
    /// Case generation
    pub generation: GenerationConfig,
    /// Shuffle the case order
    pub randomize: bool,
    /// Shuffle seed (random when absent)
    pub seed: Option<u64>,
    /// Timeout of each element wait
    pub element_timeout_ms: u64,
    /// Poll interval of every wait
    pub poll_interval_ms: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry
    pub initial_backoff_ms: u64,
    /// Overall run timeout
    pub run_timeout_ms: u64,
    /// Capture screenshots on failure and error
    pub screenshots: bool,
    /// Warm the backend up once per language
    pub warmup: bool,
    /// Read the voice catalog from the page instead of the built-in one
    pub discover_voices: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            generation: GenerationConfig::default(),
            randomize: true,
            seed: None,
            element_timeout_ms: DEFAULT_ELEMENT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            screenshots: false,
            warmup: true,
            discover_voices: false,
        }
    }
}

impl RunConfig {
    /// Create config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the frontend URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set generation settings
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Set shuffling and seed
    #[must_use]
    pub const fn with_order(mut self, randomize: bool, seed: Option<u64>) -> Self {
        self.randomize = randomize;
        self.seed = seed;
        self
    }

    /// Set element timeout and poll interval
    #[must_use]
    pub const fn with_waits(mut self, element_timeout_ms: u64, poll_interval_ms: u64) -> Self {
        self.element_timeout_ms = element_timeout_ms;
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set retries and initial backoff
    #[must_use]
    pub const fn with_retries(mut self, max_retries: u32, initial_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Set the overall run timeout
    #[must_use]
    pub const fn with_run_timeout_ms(mut self, ms: u64) -> Self {
        self.run_timeout_ms = ms;
        self
    }

    /// Enable screenshots
    #[must_use]
    pub const fn with_screenshots(mut self, enabled: bool) -> Self {
        self.screenshots = enabled;
        self
    }

    /// Enable warmup
    #[must_use]
    pub const fn with_warmup(mut self, enabled: bool) -> Self {
        self.warmup = enabled;
        self
    }

    /// Enable voice discovery
    #[must_use]
    pub const fn with_discover_voices(mut self, enabled: bool) -> Self {
        self.discover_voices = enabled;
        self
    }

    /// Screenshot directory
    #[must_use]
    pub fn screenshot_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }

    /// Result document path for a run stamp
    #[must_use]
    pub fn results_path(&self, run_stamp: &str) -> PathBuf {
        self.output_dir
            .join(format!("ttsprobe_results_{run_stamp}.json"))
    }

    /// Executor settings for a run stamp
    #[must_use]
    pub fn executor_config(&self, run_stamp: &str) -> ExecutorConfig {
        ExecutorConfig {
            base_url: self.base_url.clone(),
            element_timeout_ms: self.element_timeout_ms,
            generation_timeout_ms: self.element_timeout_ms.saturating_mul(2),
            poll_interval_ms: self.poll_interval_ms,
            retry: RetryPolicy::new(self.max_retries)
                .with_initial_backoff(self.initial_backoff_ms),
            screenshots: self.screenshots,
            screenshot_dir: self.screenshot_dir(),
            run_stamp: run_stamp.to_string(),
        }
    }

    /// Check every setting before anything runs
    pub fn validate(&self) -> ProbeResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ProbeError::configuration(format!(
                "target URL must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ProbeError::configuration("output directory is empty"));
        }
        if self.run_timeout_ms == 0 {
            return Err(ProbeError::configuration("run timeout must be positive"));
        }
        if self.initial_backoff_ms == 0 && self.max_retries > 0 {
            return Err(ProbeError::configuration(
                "retry backoff must be positive when retries are enabled",
            ));
        }
        if self.seed.is_some() && !self.randomize {
            tracing::warn!("seed given with shuffling disabled; the seed is ignored");
        }
        self.generation.validate()?;
        self.executor_config("").validate()
    }
}

/// Timestamp naming every artifact of a run
#[must_use]
pub fn run_stamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Progress callbacks. Every method defaults to doing nothing.
pub trait RunObserver {
    /// Cases are issued and about to run
    fn run_started(&mut self, _total: usize) {}

    /// A warmup generation finished
    fn warmed_up(&mut self, _language: &str, _outcome: &ProbeResult<()>) {}

    /// A case is starting
    fn case_started(&mut self, _index: usize, _case: &TestCase) {}

    /// A case has a result
    fn case_finished(&mut self, _case: &TestCase, _result: &TestResult) {}

    /// The run stopped before every case ran
    fn run_stopped(&mut self, _reason: StopReason) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The final result document
    pub document: RunDocument,
    /// Statistics over it
    pub summary: RunSummary,
    /// Report files
    pub artifacts: ReportArtifacts,
    /// Where the document was written
    pub results_path: Option<PathBuf>,
}

impl RunOutcome {
    /// Every issued case ran and succeeded
    #[must_use]
    pub fn all_passed(&self) -> bool {
        let counts = self.summary.counts;
        counts.completed == counts.issued
            && counts.success == counts.completed
            && self.document.stop_reason.is_none()
    }
}

/// External stop request, optional
#[derive(Debug, Clone, Default)]
struct StopSignal(Option<watch::Receiver<bool>>);

impl StopSignal {
    fn is_set(&self) -> bool {
        self.0.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn wait(&mut self) {
        let Some(rx) = self.0.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            let stopped = *rx.borrow_and_update();
            if stopped {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without stopping
                return std::future::pending().await;
            }
        }
    }
}

/// Drives a complete run against one session
#[derive(Debug, Clone)]
pub struct Runner {
    config: RunConfig,
    stop: StopSignal,
}

impl Runner {
    /// Create a runner over the built-in voice catalog
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            stop: StopSignal::default(),
        }
    }

    /// Stop the run when the channel turns `true`
    #[must_use]
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = StopSignal(Some(stop));
        self
    }


    /// Execute the run and write every report.
    ///
    /// Only configuration problems fail the call; everything that goes wrong
    /// while cases run ends up in the returned document.
    pub async fn run(
        &self,
        session: &mut dyn BrowserSession,
        observer: &mut dyn RunObserver,
    ) -> ProbeResult<RunOutcome> {
        self.config.validate()?;
        let deadline = Instant::now() + Duration::from_millis(self.config.run_timeout_ms);
        let mut stop = self.stop.clone();
        let stamp = run_stamp();

        let catalog = if self.config.discover_voices {
            self.discover_catalog(session).await
        } else {
            VoiceCatalog::builtin()
        };

        let generated = CaseGenerator::new(&catalog, self.config.generation.clone()).generate()?;
        let ordered = CaseOrderer::new(self.config.randomize, self.config.seed.map(Seed::from_u64))
            .order(generated.cases);

        let document = RunDocument::new(&stamp, &self.config.base_url, generated.summary)
            .with_seed(ordered.seed.map(Seed::value))
            .with_config(serde_json::to_value(&self.config)?);
        let results_path = self.config.results_path(&stamp);
        let mut store = ResultStore::new(&results_path, document);
        store.issue(&ordered.cases);

        tracing::info!(
            run_stamp = %stamp,
            cases = ordered.cases.len(),
            url = %self.config.base_url,
            "run started"
        );
        observer.run_started(ordered.cases.len());

        let executor = CaseExecutor::new(self.config.executor_config(&stamp));
        let mut stopped = None;

        if self.config.warmup {
            if let Err(reason) = self
                .warm_up(&executor, session, &catalog, &ordered.cases, deadline, &mut stop, observer)
                .await
            {
                stopped = Some(reason);
            }
        }

        if stopped.is_none() {
            for (index, case) in ordered.cases.iter().enumerate() {
                if let Some(reason) = check_stop(deadline, &stop) {
                    stopped = Some(reason);
                    break;
                }
                observer.case_started(index, case);
                let start_time = Utc::now();
                let result = match guarded(executor.execute(session, case), deadline, &mut stop).await {
                    Ok(result) => result,
                    Err(reason) => {
                        tracing::warn!(case_id = case.id, reason = reason.as_str(), "case abandoned");
                        stopped = Some(reason);
                        TestResult::abandoned(case.id, start_time, reason.as_str())
                    }
                };
                observer.case_finished(case, &result);
                if let Err(e) = store.append(result) {
                    tracing::error!(case_id = case.id, error = %e, "result rejected");
                }
                if stopped.is_some() {
                    break;
                }
            }
        }

        if let Some(reason) = stopped {
            tracing::warn!(
                reason = reason.as_str(),
                completed = store.results().len(),
                issued = store.document().cases.len(),
                "run stopped early"
            );
            observer.run_stopped(reason);
        }
        store.finish(stopped.map(|r| r.as_str().to_string()));
        if !store.persistence_faults().is_empty() {
            tracing::error!(
                faults = store.persistence_faults().len(),
                "result document could not always be written"
            );
        }

        let document = store.into_document();
        let (summary, artifacts) = report_document(&document, &self.config.output_dir);
        tracing::info!(
            success = summary.counts.success,
            failure = summary.counts.failure,
            error = summary.counts.error,
            "run finished"
        );
        Ok(RunOutcome {
            document,
            summary,
            artifacts,
            results_path: Some(results_path),
        })
    }

    /// Catalog read from the page, or the built-in one when that fails
    async fn discover_catalog(&self, session: &mut dyn BrowserSession) -> VoiceCatalog {
        let discovered = async {
            session.navigate(&self.config.base_url).await?;
            let value = session.evaluate_json(PAGE_VOICES_EXPRESSION).await?;
            if value.is_null() {
                return Err(ProbeError::Script {
                    message: "page defines no voicesByLanguage".to_string(),
                });
            }
            VoiceCatalog::from_page_json(&value)
        }
        .await;

        match discovered {
            Ok(catalog) if !catalog.is_empty() => {
                tracing::info!(voices = catalog.len(), "voice catalog read from page");
                catalog
            }
            Ok(_) => {
                tracing::warn!("page voice catalog is empty, using built-in catalog");
                VoiceCatalog::builtin()
            }
            Err(e) => {
                tracing::warn!(error = %e, "voice discovery failed, using built-in catalog");
                VoiceCatalog::builtin()
            }
        }
    }

    /// One unrecorded generation per distinct language, in run order
    #[allow(clippy::too_many_arguments)]
    async fn warm_up(
        &self,
        executor: &CaseExecutor,
        session: &mut dyn BrowserSession,
        catalog: &VoiceCatalog,
        cases: &[TestCase],
        deadline: Instant,
        stop: &mut StopSignal,
        observer: &mut dyn RunObserver,
    ) -> Result<(), StopReason> {
        let mut seen = BTreeSet::new();
        for case in cases {
            if !seen.insert(case.language.as_str()) {
                continue;
            }
            if let Some(reason) = check_stop(deadline, stop) {
                return Err(reason);
            }
            let voice = catalog
                .first_voice(&case.language)
                .unwrap_or(&case.voice)
                .clone();
            let outcome = guarded(executor.warm_up(session, &voice), deadline, stop).await?;
            match &outcome {
                Ok(()) => tracing::info!(language = %case.language, voice = %voice.code, "warmup done"),
                Err(e) => tracing::warn!(language = %case.language, error = %e, "warmup failed"),
            }
            observer.warmed_up(&case.language, &outcome);
        }
        Ok(())
    }
}

fn check_stop(deadline: Instant, stop: &StopSignal) -> Option<StopReason> {
    if stop.is_set() {
        Some(StopReason::Cancelled)
    } else if Instant::now() >= deadline {
        Some(StopReason::RunTimeout)
    } else {
        None
    }
}

/// Run `work` unless the deadline passes or the stop signal fires first
async fn guarded<T>(
    work: impl Future<Output = T>,
    deadline: Instant,
    stop: &mut StopSignal,
) -> Result<T, StopReason> {
    tokio::select! {
        out = work => Ok(out),
        () = tokio::time::sleep_until(deadline) => Err(StopReason::RunTimeout),
        () = stop.wait() => Err(StopReason::Cancelled),
    }
}

/// Summarize a document and write its reports into `output_dir`
pub fn report_document(document: &RunDocument, output_dir: &Path) -> (RunSummary, ReportArtifacts) {
    let summary = Aggregator::summarize(document);
    let mut charts = SvgChartRenderer::new(output_dir, &document.run_stamp);
    let artifacts = Reporter::new(output_dir, &document.run_stamp).write_all(document, &summary, &mut charts);
    (summary, artifacts)
}

/// Re-report a stored result document without executing anything
pub fn reaggregate(results: &Path, output_dir: &Path) -> ProbeResult<RunOutcome> {
    let document = ResultStore::load(results)?;
    tracing::info!(
        path = %results.display(),
        results = document.results.len(),
        "re-aggregating stored run"
    );
    let (summary, artifacts) = report_document(&document, output_dir);
    Ok(RunOutcome {
        document,
        summary,
        artifacts,
        results_path: None,
    })
}
