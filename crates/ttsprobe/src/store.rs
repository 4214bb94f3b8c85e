//! Append-only result log with atomic persistence.
//!
//! The store owns the run document. [`ResultStore::append`] is its only
//! mutator for results; after every append the whole document is rewritten
//! atomically (temp file, fsync, rename), so a crash loses at most the
//! in-flight case. Write failures never stop the run: they are logged and
//! kept in [`RunDocument::persistence_faults`] for the final summary.

use crate::case::{CaseId, TestCase};
use crate::generator::GenerationSummary;
use crate::result::{ProbeError, ProbeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Final status of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    /// Audio generated
    Success,
    /// Retryable condition (element timeout, stale element, browser fault)
    Failure,
    /// Terminal application error, or retries exhausted
    Error,
}

impl CaseStatus {
    /// Lowercase label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }

    /// Whether the case passed
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one case. Written once, never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Id of the case this result belongs to
    pub case_id: CaseId,
    /// Final status
    pub status: CaseStatus,
    /// When the case started
    pub start_time: DateTime<Utc>,
    /// When the case finished
    pub end_time: DateTime<Utc>,
    /// On success, trigger-to-terminal-status time; otherwise wall time of
    /// the whole case
    pub generation_time_ms: f64,
    /// Segment count reported by the backend
    pub segments: u32,
    /// Error text for non-success results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Screenshot taken on failure or error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    /// Retries after the first attempt
    pub retries_used: u32,
    /// Console errors seen during the final attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console_errors: Vec<String>,
    /// Audio file reported by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_filename: Option<String>,
}

impl TestResult {
    /// Error result for a case that was cut short before it finished
    #[must_use]
    pub fn abandoned(
        case_id: CaseId,
        start_time: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        let end_time = Utc::now();
        Self {
            case_id,
            status: CaseStatus::Error,
            start_time,
            end_time,
            generation_time_ms: elapsed_ms(start_time, end_time),
            segments: 0,
            error_message: Some(reason.into()),
            screenshot_path: None,
            retries_used: 0,
            console_errors: Vec::new(),
            audio_filename: None,
        }
    }
}

/// Milliseconds between two timestamps, never negative
#[must_use]
pub fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let micros = (end - start).num_microseconds().unwrap_or(0).max(0);
    micros as f64 / 1000.0
}

/// Result counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Cases issued for execution
    pub issued: usize,
    /// Results recorded
    pub completed: usize,
    /// Successes
    pub success: usize,
    /// Failures
    pub failure: usize,
    /// Errors
    pub error: usize,
}

/// The persisted run document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDocument {
    /// Unique run id
    pub run_id: uuid::Uuid,
    /// Run timestamp used in artifact names (`YYYYmmdd_HHMMSS`)
    pub run_stamp: String,
    /// Version of the tool that produced the document
    pub tool_version: String,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end, set when the run finishes
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Frontend under test
    pub target_url: String,
    /// Shuffle seed, if the order was randomized
    #[serde(default)]
    pub seed: Option<u64>,
    /// Configuration snapshot
    #[serde(default)]
    pub config: serde_json::Value,
    /// Generation diagnostics
    pub generation: GenerationSummary,
    /// Issued cases, in execution order
    pub cases: Vec<TestCase>,
    /// Results, in run order
    pub results: Vec<TestResult>,
    /// Persistence problems seen during the run
    #[serde(default)]
    pub persistence_faults: Vec<String>,
    /// Why the run stopped early, if it did
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Counts by status
    #[serde(default)]
    pub counts: StatusCounts,
}

impl RunDocument {
    /// Start a document for a new run
    #[must_use]
    pub fn new(
        run_stamp: impl Into<String>,
        target_url: impl Into<String>,
        generation: GenerationSummary,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            run_stamp: run_stamp.into(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
            finished_at: None,
            target_url: target_url.into(),
            seed: None,
            config: serde_json::Value::Null,
            generation,
            cases: Vec::new(),
            results: Vec::new(),
            persistence_faults: Vec::new(),
            stop_reason: None,
            counts: StatusCounts::default(),
        }
    }

    /// Set the shuffle seed
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Set the configuration snapshot
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Issued case by id
    #[must_use]
    pub fn case(&self, id: CaseId) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Issued cases without a result, in execution order
    #[must_use]
    pub fn not_run(&self) -> Vec<&TestCase> {
        let done: BTreeSet<CaseId> = self.results.iter().map(|r| r.case_id).collect();
        self.cases.iter().filter(|c| !done.contains(&c.id)).collect()
    }

    /// Recount results by status
    #[must_use]
    pub fn tally(&self) -> StatusCounts {
        let mut counts = StatusCounts {
            issued: self.cases.len(),
            completed: self.results.len(),
            ..StatusCounts::default()
        };
        for result in &self.results {
            match result.status {
                CaseStatus::Success => counts.success += 1,
                CaseStatus::Failure => counts.failure += 1,
                CaseStatus::Error => counts.error += 1,
            }
        }
        counts
    }
}

/// Accumulates results for one run
#[derive(Debug)]
pub struct ResultStore {
    path: Option<PathBuf>,
    document: RunDocument,
    recorded: BTreeSet<CaseId>,
}

impl ResultStore {
    /// Store persisting to `path` after every change
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, document: RunDocument) -> Self {
        Self {
            path: Some(path.into()),
            document,
            recorded: BTreeSet::new(),
        }
    }

    #[cfg(test)]
    fn in_memory(document: RunDocument) -> Self {
        Self {
            path: None,
            document,
            recorded: BTreeSet::new(),
        }
    }

    /// Register the cases about to run, in execution order
    pub fn issue(&mut self, cases: &[TestCase]) {
        self.document.cases.extend(cases.iter().cloned());
        self.document.counts = self.document.tally();
        self.persist();
    }

    /// Append one result.
    ///
    /// Rejects results for unknown cases or for cases that already have one.
    /// Persistence failures are recorded, not returned.
    pub fn append(&mut self, result: TestResult) -> ProbeResult<()> {
        if self.document.case(result.case_id).is_none() {
            return Err(ProbeError::invalid_state(format!(
                "result for case {} which was never issued",
                result.case_id
            )));
        }
        if !self.recorded.insert(result.case_id) {
            return Err(ProbeError::invalid_state(format!(
                "case {} already has a result",
                result.case_id
            )));
        }

        tracing::debug!(
            case_id = result.case_id,
            status = %result.status,
            retries = result.retries_used,
            "result recorded"
        );
        self.document.results.push(result);
        self.document.counts = self.document.tally();
        self.persist();
        Ok(())
    }

    /// Close the run and write the final document
    pub fn finish(&mut self, stop_reason: Option<String>) {
        self.document.finished_at = Some(Utc::now());
        self.document.stop_reason = stop_reason;
        self.document.counts = self.document.tally();
        self.persist();
    }

    /// Results in run order
    #[must_use]
    pub fn results(&self) -> &[TestResult] {
        &self.document.results
    }

    /// The run document
    #[must_use]
    pub const fn document(&self) -> &RunDocument {
        &self.document
    }

    /// Consume the store, returning its document
    #[must_use]
    pub fn into_document(self) -> RunDocument {
        self.document
    }

    /// Persistence problems so far
    #[must_use]
    pub fn persistence_faults(&self) -> &[String] {
        &self.document.persistence_faults
    }

    fn persist(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };
        let written = serde_json::to_vec_pretty(&self.document)
            .map_err(ProbeError::from)
            .and_then(|bytes| write_atomic(&path, &bytes));
        if let Err(e) = written {
            let fault = format!("{}: {e}", path.display());
            tracing::error!(path = %path.display(), error = %e, "failed to persist results");
            // Repeated faults of the same kind are recorded once
            if !self.document.persistence_faults.contains(&fault) {
                self.document.persistence_faults.push(fault);
            }
        }
    }

    /// Load a stored run document
    pub fn load(path: &Path) -> ProbeResult<RunDocument> {
        let bytes = fs::read(path).map_err(|e| ProbeError::Persistence {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Write `bytes` to `path` via a synced temp file and a rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> ProbeResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_owned();
    tmp_name.push(".tmp");
    let tmp = parent.join(tmp_name);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_parent_dir(parent);
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(parent: &Path) {
    let synced = fs::File::open(parent).and_then(|dir| dir.sync_all());
    if let Err(e) = synced {
        tracing::debug!(dir = %parent.display(), error = %e, "directory sync skipped");
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_parent: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VoiceCatalog;
    use crate::generator::{CaseGenerator, GenerationConfig};
    use tempfile::tempdir;

    fn generated() -> (Vec<TestCase>, GenerationSummary) {
        let catalog = VoiceCatalog::builtin();
        let generated = CaseGenerator::new(&catalog, GenerationConfig::new())
            .generate()
            .unwrap();
        (generated.cases, generated.summary)
    }

    fn result(case_id: CaseId, status: CaseStatus) -> TestResult {
        let now = Utc::now();
        TestResult {
            case_id,
            status,
            start_time: now,
            end_time: now,
            generation_time_ms: 120.0,
            segments: u32::from(status.is_success()),
            error_message: (!status.is_success()).then(|| "Error: boom (HTTP 500)".to_string()),
            screenshot_path: None,
            retries_used: 0,
            console_errors: Vec::new(),
            audio_filename: None,
        }
    }

    mod append_tests {
        use super::*;

        #[test]
        fn test_append_and_count() {
            let (cases, summary) = generated();
            let mut store = ResultStore::in_memory(RunDocument::new("20260101_000000", "u", summary));
            store.issue(&cases);
            store.append(result(1, CaseStatus::Success)).unwrap();
            store.append(result(2, CaseStatus::Error)).unwrap();
            let counts = store.document().counts;
            assert_eq!(counts.issued, cases.len());
            assert_eq!(counts.completed, 2);
            assert_eq!(counts.success, 1);
            assert_eq!(counts.error, 1);
            let not_run: Vec<_> = store.document().not_run().iter().map(|c| c.id).collect();
            assert_eq!(not_run.len(), cases.len() - 2);
            assert!(!not_run.contains(&1) && !not_run.contains(&2));
        }

        #[test]
        fn test_rejects_unknown_and_duplicate() {
            let (cases, summary) = generated();
            let mut store = ResultStore::in_memory(RunDocument::new("s", "u", summary));
            store.issue(&cases[..2]);
            assert!(store.append(result(99, CaseStatus::Success)).is_err());
            store.append(result(1, CaseStatus::Success)).unwrap();
            let err = store.append(result(1, CaseStatus::Error)).unwrap_err();
            assert!(err.to_string().contains("already has a result"));
            assert_eq!(store.results().len(), 1);
        }

        #[test]
        fn test_complete_run_is_one_to_one() {
            let (cases, summary) = generated();
            let mut store = ResultStore::in_memory(RunDocument::new("s", "u", summary));
            store.issue(&cases);
            for case in &cases {
                store.append(result(case.id, CaseStatus::Success)).unwrap();
            }
            assert!(store.document().not_run().is_empty());
            let ids: BTreeSet<_> = store.results().iter().map(|r| r.case_id).collect();
            assert_eq!(ids.len(), cases.len());
        }
    }

    mod persistence_tests {
        use super::*;

        #[test]
        fn test_every_append_is_on_disk() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("out").join("results.json");
            let (cases, summary) = generated();
            let mut store = ResultStore::new(&path, RunDocument::new("s", "http://x", summary));
            store.issue(&cases);
            store.append(result(1, CaseStatus::Success)).unwrap();

            let loaded = ResultStore::load(&path).unwrap();
            assert_eq!(loaded.results.len(), 1);
            assert_eq!(loaded.cases.len(), cases.len());
            assert!(loaded.finished_at.is_none());

            store.append(result(2, CaseStatus::Error)).unwrap();
            store.finish(Some("run timeout".into()));
            let loaded = ResultStore::load(&path).unwrap();
            assert_eq!(loaded.results.len(), 2);
            assert_eq!(loaded.stop_reason.as_deref(), Some("run timeout"));
            assert!(loaded.finished_at.is_some());
            assert!(!dir.path().join("out").join("results.json.tmp").exists());
        }

        #[test]
        fn test_write_fault_does_not_stop_appends() {
            let dir = tempdir().unwrap();
            let blocker = dir.path().join("blocker");
            fs::write(&blocker, b"not a directory").unwrap();
            let (cases, summary) = generated();
            let mut store =
                ResultStore::new(blocker.join("results.json"), RunDocument::new("s", "u", summary));
            store.issue(&cases);
            store.append(result(1, CaseStatus::Success)).unwrap();
            store.append(result(2, CaseStatus::Success)).unwrap();
            assert_eq!(store.results().len(), 2);
            assert!(!store.persistence_faults().is_empty());
        }

        #[test]
        fn test_unsyncable_dir_is_not_a_fault() {
            let dir = tempdir().unwrap();
            sync_parent_dir(&dir.path().join("missing"));
            sync_parent_dir(dir.path());
        }

        #[test]
        fn test_load_missing_file() {
            let err = ResultStore::load(Path::new("/nonexistent/ttsprobe.json")).unwrap_err();
            assert!(matches!(err, ProbeError::Persistence { .. }));
        }
    }

    mod result_tests {
        use super::*;

        #[test]
        fn test_abandoned_result() {
            let r = TestResult::abandoned(4, Utc::now(), "run timeout");
            assert_eq!(r.status, CaseStatus::Error);
            assert_eq!(r.error_message.as_deref(), Some("run timeout"));
            assert!(r.generation_time_ms >= 0.0);
        }

        #[test]
        fn test_status_serializes_lowercase() {
            assert_eq!(serde_json::to_string(&CaseStatus::Failure).unwrap(), "\"failure\"");
        }

        #[test]
        fn test_elapsed_never_negative() {
            let now = Utc::now();
            let earlier = now - chrono::Duration::milliseconds(5);
            assert!((elapsed_ms(earlier, now) - 5.0).abs() < 1e-9);
            assert!(elapsed_ms(now, earlier).abs() < f64::EPSILON);
        }
    }
}
