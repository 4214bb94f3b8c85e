//! Progress reporting and the end-of-run summary

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use ttsprobe::{ProbeResult, RunObserver, RunOutcome, StopReason, TestCase, TestResult};

/// Progress reporter for a run
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` cases
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish progress bar
    pub fn finish(&mut self) {
        if let Some(pb) = self.progress_bar.take() {
            pb.finish_and_clear();
        }
    }

    /// Print a line without tearing the progress bar
    fn line(&self, text: &str) {
        match &self.progress_bar {
            Some(pb) => pb.suspend(|| {
                let _ = self.term.write_line(text);
            }),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    fn prefixed(&self, symbol: &str, plain: &str, paint: fn(&str) -> String, message: &str) {
        let prefix = if self.use_color {
            paint(symbol)
        } else {
            plain.to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            self.prefixed("✓", "PASS", |s| style(s).green().bold().to_string(), message);
        }
    }

    /// Print a failure message, even in quiet mode
    pub fn failure(&self, message: &str) {
        self.prefixed("✗", "FAIL", |s| style(s).red().bold().to_string(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            self.prefixed("⚠", "WARN", |s| style(s).yellow().bold().to_string(), message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.prefixed("ℹ", "INFO", |s| style(s).blue().bold().to_string(), message);
        }
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.line("");
        self.line(&styled);
    }

    /// Print the outcome of a run or a re-aggregation
    pub fn outcome(&self, outcome: &RunOutcome) {
        let counts = outcome.summary.counts;
        let failed = counts.failure + counts.error;
        if self.quiet && outcome.all_passed() {
            return;
        }

        self.line("");
        let unrun = counts.issued.saturating_sub(counts.completed);
        let passed = outcome.all_passed();
        let status = if self.use_color {
            let paint = if passed {
                Style::new().green().bold()
            } else {
                Style::new().red().bold()
            };
            paint
                .apply_to(if passed { "PASSED" } else { "FAILED" })
                .to_string()
        } else if passed {
            "PASSED".to_string()
        } else {
            "FAILED".to_string()
        };
        self.line(&format!(
            "{status} {} cases ({} succeeded, {} failed, {} errored, {unrun} not run)",
            counts.issued, counts.success, counts.failure, counts.error
        ));
        if let Some(reason) = &outcome.summary.stop_reason {
            self.line(&format!("Stopped early: {reason}"));
        }
        if failed > 0 {
            if let Some(rate) = outcome.summary.overall.success_percent() {
                self.line(&format!("Success rate: {rate:.2}%"));
            }
        }

        if self.quiet {
            return;
        }
        if let Some(path) = &outcome.results_path {
            self.line(&format!("Results:  {}", path.display()));
        }
        let artifacts = &outcome.artifacts;
        if let Some(path) = &artifacts.junit {
            self.line(&format!("JUnit:    {}", path.display()));
        }
        if let Some(path) = &artifacts.summary {
            self.line(&format!("Summary:  {}", path.display()));
        }
        for chart in &artifacts.charts {
            self.line(&format!("Chart:    {}", chart.display()));
        }
        for fault in &artifacts.faults {
            self.warning(fault);
        }
    }
}

impl RunObserver for ProgressReporter {
    fn run_started(&mut self, total: usize) {
        self.header("ttsprobe");
        self.start_progress(total as u64, "warming up");
    }

    fn warmed_up(&mut self, language: &str, outcome: &ProbeResult<()>) {
        match outcome {
            Ok(()) => self.set_message(&format!("warmed up {language}")),
            Err(e) => self.warning(&format!("warmup for {language} failed: {e}")),
        }
    }

    fn case_started(&mut self, _index: usize, case: &TestCase) {
        self.set_message(&case.label());
    }

    fn case_finished(&mut self, case: &TestCase, result: &TestResult) {
        self.increment(1);
        if !result.status.is_success() {
            self.failure(&format!(
                "#{} {} [{}]: {}",
                case.id,
                case.label(),
                result.status,
                result.error_message.as_deref().unwrap_or("no message")
            ));
        }
    }

    fn run_stopped(&mut self, reason: StopReason) {
        self.warning(&format!("run stopped: {}", reason.as_str()));
        self.finish();
    }
}
