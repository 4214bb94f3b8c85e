//! Run reports: JUnit XML, a plain-text summary and charts.
//!
//! Every renderer here reads only the [`RunDocument`] and its
//! [`RunSummary`], so re-reporting a stored document reproduces the same
//! files byte for byte.

use crate::aggregate::{GroupStats, RunSummary};
use crate::chart::ChartSink;
use crate::result::ProbeError;
use crate::case::CaseId;
use crate::store::{write_atomic, CaseStatus, RunDocument};
use std::path::PathBuf;

/// Files produced by one reporting pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportArtifacts {
    /// JUnit XML file
    pub junit: Option<PathBuf>,
    /// Plain-text summary file
    pub summary: Option<PathBuf>,
    /// Chart files
    pub charts: Vec<PathBuf>,
    /// Reports that could not be written
    pub faults: Vec<String>,
}

/// Writes the report files of a run into one directory
#[derive(Debug, Clone)]
pub struct Reporter {
    output_dir: PathBuf,
    run_stamp: String,
}

impl Reporter {
    /// Create a reporter for a run stamp
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, run_stamp: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_stamp: run_stamp.into(),
        }
    }

    /// JUnit file path
    #[must_use]
    pub fn junit_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("ttsprobe_junit_{}.xml", self.run_stamp))
    }

    /// Summary file path
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("ttsprobe_summary_{}.txt", self.run_stamp))
    }

    /// Write JUnit, summary and every chart. A failing report is logged and
    /// recorded in [`ReportArtifacts::faults`]; the others are still written.
    pub fn write_all(
        &self,
        document: &RunDocument,
        summary: &RunSummary,
        charts: &mut dyn ChartSink,
    ) -> ReportArtifacts {
        let mut artifacts = ReportArtifacts::default();

        let junit = self.junit_path();
        match write_atomic(&junit, render_junit(document).as_bytes()) {
            Ok(()) => artifacts.junit = Some(junit),
            Err(e) => record_fault(&mut artifacts, "junit report", &e),
        }

        let text = self.summary_path();
        match write_atomic(&text, render_summary(document, summary).as_bytes()) {
            Ok(()) => artifacts.summary = Some(text),
            Err(e) => record_fault(&mut artifacts, "summary report", &e),
        }

        for series in summary.series(document) {
            match charts.render(&series) {
                Ok(Some(path)) => artifacts.charts.push(path),
                Ok(None) => {}
                Err(e) => record_fault(&mut artifacts, &format!("chart {}", series.name), &e),
            }
        }

        tracing::info!(
            charts = artifacts.charts.len(),
            faults = artifacts.faults.len(),
            "reports written"
        );
        artifacts
    }
}

fn record_fault(artifacts: &mut ReportArtifacts, what: &str, error: &ProbeError) {
    tracing::error!(report = what, error = %error, "report not written");
    artifacts.faults.push(format!("{what}: {error}"));
}

/// Status recorded for issued cases that never started
pub const NOT_RUN: &str = "not run";

fn case_names(document: &RunDocument, case_id: CaseId) -> (String, String) {
    document.case(case_id).map_or_else(
        || (format!("case_{case_id}"), "ttsprobe".to_string()),
        |case| {
            (
                format!("case_{}.{}", case.id, case.label()),
                format!("ttsprobe.{}.{}", case.category, case.language),
            )
        },
    )
}

/// Render JUnit XML content.
///
/// Issued cases that never started appear as `<skipped/>` test cases.
#[must_use]
pub fn render_junit(document: &RunDocument) -> String {
    let counts = document.tally();
    let not_run = document.not_run();
    let total_secs: f64 = document
        .results
        .iter()
        .map(|r| r.generation_time_ms / 1000.0)
        .sum();
    let mut xml = String::new();

    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(
        r#"<testsuite name="ttsprobe" tests="{}" failures="{}" errors="{}" skipped="{}" time="{:.3}" timestamp="{}">"#,
        counts.completed + not_run.len(),
        counts.failure,
        counts.error,
        not_run.len(),
        total_secs,
        document.started_at.format("%Y-%m-%dT%H:%M:%S")
    ));
    xml.push('\n');
    xml.push_str("  <properties>\n");
    for (name, value) in [
        ("run_id", document.run_id.to_string()),
        ("target_url", document.target_url.clone()),
        ("tool_version", document.tool_version.clone()),
        (
            "seed",
            document
                .seed
                .map_or_else(|| "none".to_string(), |s| s.to_string()),
        ),
    ] {
        xml.push_str(&format!(
            r#"    <property name="{name}" value="{}"/>"#,
            escape_xml(&value)
        ));
        xml.push('\n');
    }
    if let Some(reason) = &document.stop_reason {
        xml.push_str(&format!(
            r#"    <property name="stop_reason" value="{}"/>"#,
            escape_xml(reason)
        ));
        xml.push('\n');
    }
    xml.push_str("  </properties>\n");

    for result in &document.results {
        let (name, classname) = case_names(document, result.case_id);
        xml.push_str(&format!(
            r#"  <testcase name="{}" classname="{}" time="{:.3}">"#,
            escape_xml(&name),
            escape_xml(&classname),
            result.generation_time_ms / 1000.0
        ));
        xml.push('\n');

        let message = result.error_message.as_deref().unwrap_or("");
        match result.status {
            CaseStatus::Success => {}
            CaseStatus::Failure => {
                xml.push_str(&format!(
                    r#"    <failure message="{}">{}</failure>"#,
                    escape_xml(message),
                    escape_xml(message)
                ));
                xml.push('\n');
            }
            CaseStatus::Error => {
                xml.push_str(&format!(
                    r#"    <error message="{}">{}</error>"#,
                    escape_xml(message),
                    escape_xml(message)
                ));
                xml.push('\n');
            }
        }

        if !result.console_errors.is_empty() || result.retries_used > 0 {
            let mut out = format!("retries_used={}", result.retries_used);
            for line in &result.console_errors {
                out.push('\n');
                out.push_str(line);
            }
            xml.push_str(&format!(
                "    <system-out>{}</system-out>\n",
                escape_xml(&out)
            ));
        }

        xml.push_str("  </testcase>\n");
    }

    for case in not_run {
        let (name, classname) = case_names(document, case.id);
        xml.push_str(&format!(
            r#"  <testcase name="{}" classname="{}" time="0.000">"#,
            escape_xml(&name),
            escape_xml(&classname)
        ));
        xml.push('\n');
        xml.push_str(&format!("    <skipped message=\"{NOT_RUN}\"/>\n"));
        xml.push_str("  </testcase>\n");
    }

    xml.push_str("</testsuite>\n");
    xml
}

fn percent(rate: Option<f64>) -> String {
    rate.map_or_else(|| "no data".to_string(), |r| format!("{:.2}%", r * 100.0))
}

fn seconds(ms: Option<f64>) -> String {
    ms.map_or_else(|| "no data".to_string(), |m| format!("{:.2} seconds", m / 1000.0))
}

fn group_total(groups: &[GroupStats], key: &str) -> usize {
    groups.iter().find(|g| g.key == key).map_or(0, |g| g.total)
}

/// Render the plain-text summary
#[must_use]
pub fn render_summary(document: &RunDocument, summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str("ttsprobe test summary\n");
    out.push_str("=====================\n\n");
    out.push_str(&format!("Run: {} ({})\n", document.run_id, document.run_stamp));
    out.push_str(&format!("Target: {}\n", document.target_url));
    if let Some(seed) = document.seed {
        out.push_str(&format!("Shuffle seed: {seed}\n"));
    }
    out.push('\n');

    out.push_str(&format!("Total tests: {}\n", summary.overall.total));
    out.push_str(&format!(
        "Issued: {}, success: {}, failure: {}, error: {}\n",
        summary.counts.issued, summary.counts.success, summary.counts.failure, summary.counts.error
    ));
    out.push_str(&format!(
        "Overall success rate: {}\n",
        percent(summary.overall.success_rate)
    ));
    out.push_str(&format!(
        "Average generation time: {}\n",
        seconds(summary.overall.mean_ms)
    ));
    out.push_str(&format!(
        "Partition tests: {}\n",
        group_total(&summary.by_category, "partition")
    ));
    out.push_str(&format!(
        "Boundary tests: {}\n",
        group_total(&summary.by_category, "boundary")
    ));

    if let Some(best) = &summary.best_language {
        out.push_str(&format!(
            "Language with highest success rate: {} ({:.2}%)\n",
            best.language,
            best.success_rate * 100.0
        ));
    }
    if let Some(worst) = &summary.worst_language {
        out.push_str(&format!(
            "Language with lowest success rate: {} ({:.2}%)\n",
            worst.language,
            worst.success_rate * 100.0
        ));
    }

    out.push_str(&format!(
        "Male voice tests: {}\n",
        group_total(&summary.by_gender, "male")
    ));
    out.push_str(&format!(
        "Female voice tests: {}\n",
        group_total(&summary.by_gender, "female")
    ));

    if let Some(lengths) = summary.text_length {
        out.push_str(&format!(
            "Text length: min {}, max {}, avg {:.1} characters\n",
            lengths.min, lengths.max, lengths.mean
        ));
    }
    if let Some(fit) = summary.length_fit {
        out.push_str(&format!(
            "Length trend: {:.3} ms per character (n = {})\n",
            fit.slope, fit.n
        ));
    }
    out.push_str(&format!(
        "Tests with console errors: {}\n",
        summary.console_error_cases
    ));
    out.push_str(&format!("Retries used: {}\n", summary.retries_total));

    if !summary.by_language.is_empty() {
        out.push_str("\nBy language:\n");
        for group in &summary.by_language {
            out.push_str(&format!(
                "  {:<24} {:>3}/{:<3} {:>10}  {}\n",
                group.key,
                group.successes,
                group.total,
                percent(group.success_rate),
                seconds(group.mean_ms)
            ));
        }
    }
    if !summary.by_boundary.is_empty() {
        out.push_str("\nBoundary tests:\n");
        for group in &summary.by_boundary {
            out.push_str(&format!(
                "  {:<24} {:>3}/{:<3} {:>10}\n",
                group.key,
                group.successes,
                group.total,
                percent(group.success_rate)
            ));
        }
    }

    if summary.persistence_faults > 0 {
        out.push_str(&format!(
            "\nPersistence faults: {} (see result document)\n",
            summary.persistence_faults
        ));
    }
    if let Some(reason) = &summary.stop_reason {
        out.push_str(&format!("\nRun stopped early: {reason}\n"));
    }
    let not_run = document.not_run();
    if !not_run.is_empty() {
        out.push_str(&format!("\nNot run: {}\n", not_run.len()));
        for case in not_run {
            out.push_str(&format!("  case {} {}: {NOT_RUN}\n", case.id, case.label()));
        }
    }
    let generated = document.finished_at.unwrap_or(document.started_at);
    out.push_str(&format!(
        "\nGenerated on: {}\n",
        generated.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
