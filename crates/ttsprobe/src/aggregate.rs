//! Post-run statistics over a finished result document.
//!
//! [`Aggregator::summarize`] is pure: it reads the document and nothing
//! else, so summarizing the same document twice gives identical output.
//! Groups are keyed in sorted order. Time statistics use successful results
//! only; a group without data reports `None` rather than dividing by zero.

use crate::case::{CaseCategory, Subcategory, TestCase};
use crate::store::{RunDocument, StatusCounts, TestResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Series names, also used as chart file stems
pub mod series {
    /// Mean generation time per language
    pub const GENERATION_TIME_BY_LANGUAGE: &str = "generation_time_by_language";
    /// Success rate per language
    pub const SUCCESS_RATE_BY_LANGUAGE: &str = "success_rate_by_language";
    /// Mean generation time per voice gender
    pub const GENERATION_TIME_BY_GENDER: &str = "generation_time_by_gender";
    /// Success rate per boundary subcategory
    pub const BOUNDARY_SUCCESS_RATE: &str = "boundary_success_rate";
    /// Text length against generation time
    pub const TEXT_LENGTH_VS_GENERATION_TIME: &str = "text_length_vs_generation_time";
}

/// Statistics of one group of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    /// Group key
    pub key: String,
    /// Results in the group
    pub total: usize,
    /// Successful results
    pub successes: usize,
    /// `successes / total`, `None` for an empty group
    pub success_rate: Option<f64>,
    /// Mean generation time of successes (ms)
    pub mean_ms: Option<f64>,
    /// Population variance of generation time of successes (ms²)
    pub variance_ms: Option<f64>,
}

impl GroupStats {
    fn from_samples(key: impl Into<String>, total: usize, times: &[f64]) -> Self {
        let successes = times.len();
        let (mean_ms, variance_ms) = mean_variance(times).map_or((None, None), |(m, v)| (Some(m), Some(v)));
        Self {
            key: key.into(),
            total,
            successes,
            success_rate: success_rate(successes, total),
            mean_ms,
            variance_ms,
        }
    }

    /// Success rate in percent
    #[must_use]
    pub fn success_percent(&self) -> Option<f64> {
        self.success_rate.map(|r| r * 100.0)
    }
}

/// `k / n`, or `None` when `n == 0`
#[must_use]
pub fn success_rate(successes: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| successes as f64 / total as f64)
}

/// Mean and population variance, `None` for no samples
#[must_use]
pub fn mean_variance(samples: &[f64]) -> Option<(f64, f64)> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance))
}

/// Least-squares line `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// Slope (ms per character)
    pub slope: f64,
    /// Intercept (ms)
    pub intercept: f64,
    /// Coefficient of determination, `None` when y is constant
    pub r_squared: Option<f64>,
    /// Points used
    pub n: usize,
}

impl LinearFit {
    /// Fit `points`; needs at least two distinct x values
    #[must_use]
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
        let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
        if sxx == 0.0 {
            return None;
        }
        let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let ss_tot: f64 = points.iter().map(|p| (p.1 - mean_y).powi(2)).sum();
        let ss_res: f64 = points
            .iter()
            .map(|p| (p.1 - (slope * p.0 + intercept)).powi(2))
            .sum();
        let r_squared = (ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot);

        Some(Self {
            slope,
            intercept,
            r_squared,
            n: points.len(),
        })
    }

    /// Predicted y at x
    #[must_use]
    pub fn predict(&self, x: f64) -> f64 {
        self.slope.mul_add(x, self.intercept)
    }
}

/// How a series should be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    /// One labelled bar per point
    Bar,
    /// Points on two numeric axes
    Scatter,
}

/// One data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Category label (bars) or point label
    pub label: String,
    /// X value (position for bars)
    pub x: f64,
    /// Y value
    pub y: f64,
}

/// A named numeric series handed to a chart sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Series name
    pub name: String,
    /// Chart title
    pub title: String,
    /// X axis label
    pub x_label: String,
    /// Y axis label
    pub y_label: String,
    /// Drawing hint
    pub kind: SeriesKind,
    /// Data
    pub points: Vec<Point>,
    /// Trend line for scatter series
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<LinearFit>,
}

impl Series {
    fn bars(name: &str, title: &str, x_label: &str, y_label: &str, bars: Vec<(String, f64)>) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            kind: SeriesKind::Bar,
            points: bars
                .into_iter()
                .enumerate()
                .map(|(i, (label, y))| Point {
                    label,
                    x: i as f64,
                    y,
                })
                .collect(),
            trend: None,
        }
    }

    /// Whether the series has no data
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Min, max and mean text length
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LengthStats {
    /// Shortest text
    pub min: usize,
    /// Longest text
    pub max: usize,
    /// Mean length
    pub mean: f64,
}

/// A language picked out by success rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLanguage {
    /// Language label
    pub language: String,
    /// Its success rate
    pub success_rate: f64,
}

/// Derived view of a run. Recomputed from the document, never persisted as
/// a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Counts by status
    pub counts: StatusCounts,
    /// All results
    pub overall: GroupStats,
    /// Partition and boundary
    pub by_category: Vec<GroupStats>,
    /// Per language
    pub by_language: Vec<GroupStats>,
    /// Per voice gender
    pub by_gender: Vec<GroupStats>,
    /// Per boundary subcategory
    pub by_boundary: Vec<GroupStats>,
    /// Text length against generation time over successes
    pub length_fit: Option<LinearFit>,
    /// Text lengths of executed cases
    pub text_length: Option<LengthStats>,
    /// Highest success rate
    pub best_language: Option<RankedLanguage>,
    /// Lowest success rate
    pub worst_language: Option<RankedLanguage>,
    /// Results with console errors
    pub console_error_cases: usize,
    /// Retries across all results
    pub retries_total: u64,
    /// Persistence problems
    pub persistence_faults: usize,
    /// Why the run stopped early
    pub stop_reason: Option<String>,
}

impl RunSummary {
    /// Named series for rendering, empty ones dropped
    #[must_use]
    pub fn series(&self, document: &RunDocument) -> Vec<Series> {
        let mut by_time: Vec<(String, f64)> = self
            .by_language
            .iter()
            .filter_map(|g| g.mean_ms.map(|m| (g.key.clone(), m)))
            .collect();
        by_time.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let percent = |groups: &[GroupStats]| -> Vec<(String, f64)> {
            groups
                .iter()
                .filter_map(|g| g.success_percent().map(|p| (g.key.clone(), p)))
                .collect()
        };
        let by_gender: Vec<(String, f64)> = self
            .by_gender
            .iter()
            .filter_map(|g| g.mean_ms.map(|m| (g.key.clone(), m)))
            .collect();

        let mut scatter = Series {
            name: series::TEXT_LENGTH_VS_GENERATION_TIME.to_string(),
            title: "Text Length vs. Generation Time".to_string(),
            x_label: "Text Length (characters)".to_string(),
            y_label: "Generation Time (ms)".to_string(),
            kind: SeriesKind::Scatter,
            points: Vec::new(),
            trend: self.length_fit,
        };
        for (case, result) in joined(document) {
            if result.status.is_success() {
                scatter.points.push(Point {
                    label: format!("case {}", case.id),
                    x: case.text_len() as f64,
                    y: result.generation_time_ms,
                });
            }
        }

        [
            Series::bars(
                series::GENERATION_TIME_BY_LANGUAGE,
                "Average Generation Time by Language",
                "Language",
                "Time (ms)",
                by_time,
            ),
            Series::bars(
                series::SUCCESS_RATE_BY_LANGUAGE,
                "Success Rate by Language (%)",
                "Language",
                "Success Rate (%)",
                percent(&self.by_language),
            ),
            Series::bars(
                series::GENERATION_TIME_BY_GENDER,
                "Average Generation Time by Voice Gender",
                "Voice Gender",
                "Time (ms)",
                by_gender,
            ),
            Series::bars(
                series::BOUNDARY_SUCCESS_RATE,
                "Success Rate for Boundary Tests (%)",
                "Boundary Test",
                "Success Rate (%)",
                percent(&self.by_boundary),
            ),
            scatter,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect()
    }
}

/// Results paired with their issued cases, in run order
fn joined(document: &RunDocument) -> impl Iterator<Item = (&TestCase, &TestResult)> {
    let cases: HashMap<_, _> = document.cases.iter().map(|c| (c.id, c)).collect();
    document
        .results
        .iter()
        .filter_map(move |r| cases.get(&r.case_id).map(|c| (*c, r)))
}

#[derive(Default)]
struct Bucket {
    total: usize,
    times: Vec<f64>,
}

impl Bucket {
    fn add(&mut self, result: &TestResult) {
        self.total += 1;
        if result.status.is_success() {
            self.times.push(result.generation_time_ms);
        }
    }

    fn stats(&self, key: impl Into<String>) -> GroupStats {
        GroupStats::from_samples(key, self.total, &self.times)
    }
}

/// Computes [`RunSummary`] values
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator;

impl Aggregator {
    /// Summarize a result document
    #[must_use]
    pub fn summarize(document: &RunDocument) -> RunSummary {
        let mut overall = Bucket::default();
        let mut by_category: BTreeMap<CaseCategory, Bucket> = BTreeMap::new();
        let mut by_language: BTreeMap<&str, Bucket> = BTreeMap::new();
        let mut by_gender: BTreeMap<&str, Bucket> = BTreeMap::new();
        let mut by_boundary: BTreeMap<Subcategory, Bucket> = BTreeMap::new();
        let mut fit_points = Vec::new();
        let mut lengths = Vec::new();

        let unmatched = document
            .results
            .iter()
            .filter(|r| document.case(r.case_id).is_none())
            .count();
        if unmatched > 0 {
            tracing::warn!(unmatched, "results without an issued case are left out of groups");
        }

        for result in &document.results {
            overall.add(result);
        }
        for (case, result) in joined(document) {
            by_category.entry(case.category).or_default().add(result);
            by_language
                .entry(case.language.as_str())
                .or_default()
                .add(result);
            by_gender
                .entry(case.voice.gender.as_str())
                .or_default()
                .add(result);
            if case.subcategory.is_boundary() {
                by_boundary.entry(case.subcategory).or_default().add(result);
            }
            lengths.push(case.text_len());
            if result.status.is_success() {
                fit_points.push((case.text_len() as f64, result.generation_time_ms));
            }
        }

        let by_language: Vec<GroupStats> = by_language
            .iter()
            .map(|(k, b)| b.stats(*k))
            .collect();

        let mut best: Option<RankedLanguage> = None;
        let mut worst: Option<RankedLanguage> = None;
        for group in &by_language {
            let Some(rate) = group.success_rate else {
                continue;
            };
            if best.as_ref().map_or(true, |b| rate > b.success_rate) {
                best = Some(RankedLanguage {
                    language: group.key.clone(),
                    success_rate: rate,
                });
            }
            if worst.as_ref().map_or(true, |w| rate < w.success_rate) {
                worst = Some(RankedLanguage {
                    language: group.key.clone(),
                    success_rate: rate,
                });
            }
        }

        let text_length = (!lengths.is_empty()).then(|| LengthStats {
            min: lengths.iter().copied().min().unwrap_or(0),
            max: lengths.iter().copied().max().unwrap_or(0),
            mean: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
        });

        RunSummary {
            counts: document.tally(),
            overall: overall.stats("all"),
            by_category: by_category
                .iter()
                .map(|(k, b)| b.stats(k.as_str()))
                .collect(),
            by_language,
            by_gender: by_gender.iter().map(|(k, b)| b.stats(*k)).collect(),
            by_boundary: by_boundary
                .iter()
                .map(|(k, b)| b.stats(k.as_str()))
                .collect(),
            length_fit: LinearFit::fit(&fit_points),
            text_length,
            best_language: best,
            worst_language: worst,
            console_error_cases: document
                .results
                .iter()
                .filter(|r| !r.console_errors.is_empty())
                .count(),
            retries_total: document
                .results
                .iter()
                .map(|r| u64::from(r.retries_used))
                .sum(),
            persistence_faults: document.persistence_faults.len(),
            stop_reason: document.stop_reason.clone(),
        }
    }
}
