//! Chart rendering for aggregated series.
//!
//! A [`ChartSink`] receives each named [`Series`] of a run summary. The
//! bundled [`SvgChartRenderer`] draws bar and scatter charts as standalone
//! SVG files named `<series>_<run stamp>.svg`.

use crate::aggregate::{Series, SeriesKind};
use crate::report::escape_xml;
use crate::result::ProbeResult;
use crate::store::write_atomic;
use std::path::PathBuf;

/// Receives series for rendering
pub trait ChartSink {
    /// Render one series; returns the artifact path if one was written
    fn render(&mut self, series: &Series) -> ProbeResult<Option<PathBuf>>;
}

/// Chart geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartConfig {
    /// Canvas width
    pub width: u32,
    /// Canvas height
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 540,
        }
    }
}

const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 110.0;
const Y_TICKS: usize = 5;
const BAR_FILL: &str = "#4c72b0";
const POINT_FILL: &str = "#55a868";
const TREND_STROKE: &str = "#c44e52";

/// Writes one SVG file per series
#[derive(Debug, Clone)]
pub struct SvgChartRenderer {
    output_dir: PathBuf,
    run_stamp: String,
}

impl SvgChartRenderer {
    /// Create a renderer writing into `output_dir`
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, run_stamp: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_stamp: run_stamp.into(),
        }
    }
}

impl ChartSink for SvgChartRenderer {
    fn render(&mut self, series: &Series) -> ProbeResult<Option<PathBuf>> {
        if series.is_empty() {
            tracing::debug!(series = %series.name, "empty series, no chart");
            return Ok(None);
        }
        let svg = render_svg(series, ChartConfig::default());
        let path = self
            .output_dir
            .join(format!("{}_{}.svg", series.name, self.run_stamp));
        write_atomic(&path, svg.as_bytes())?;
        tracing::debug!(path = %path.display(), "chart written");
        Ok(Some(path))
    }
}

/// Plot area in canvas coordinates
#[derive(Debug, Clone, Copy)]
struct Frame {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl Frame {
    fn new(config: ChartConfig) -> Self {
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: (f64::from(config.width) - MARGIN_LEFT - MARGIN_RIGHT).max(1.0),
            height: (f64::from(config.height) - MARGIN_TOP - MARGIN_BOTTOM).max(1.0),
        }
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn y_at(&self, value: f64, max: f64) -> f64 {
        self.bottom() - value / max * self.height
    }
}

/// Render a series as an SVG document
#[must_use]
pub fn render_svg(series: &Series, config: ChartConfig) -> String {
    let (width, height) = (config.width, config.height);
    let frame = Frame::new(config);
    let mut svg = String::with_capacity(4096);

    svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" \
         viewBox=\"0 0 {width} {height}\" font-family=\"sans-serif\">\n"
    ));
    svg.push_str(&format!("  <title>{}</title>\n", escape_xml(&series.title)));
    svg.push_str(&format!(
        "  <rect x=\"0\" y=\"0\" width=\"{width}\" height=\"{height}\" fill=\"white\"/>\n"
    ));
    svg.push_str(&format!(
        "  <text x=\"{:.1}\" y=\"28\" font-size=\"18\" text-anchor=\"middle\">{}</text>\n",
        f64::from(width) / 2.0,
        escape_xml(&series.title)
    ));

    let y_max = nice_max(series.points.iter().map(|p| p.y).fold(0.0, f64::max));
    axes(&mut svg, series, frame, y_max);

    match series.kind {
        SeriesKind::Bar => bars(&mut svg, series, frame, y_max),
        SeriesKind::Scatter => scatter(&mut svg, series, frame, y_max),
    }

    svg.push_str("</svg>\n");
    svg
}

fn axes(svg: &mut String, series: &Series, frame: Frame, y_max: f64) {
    let right = frame.left + frame.width;
    let bottom = frame.bottom();
    svg.push_str(&format!(
        "  <line x1=\"{l:.1}\" y1=\"{t:.1}\" x2=\"{l:.1}\" y2=\"{bottom:.1}\" stroke=\"black\"/>\n",
        l = frame.left,
        t = frame.top
    ));
    svg.push_str(&format!(
        "  <line x1=\"{l:.1}\" y1=\"{bottom:.1}\" x2=\"{right:.1}\" y2=\"{bottom:.1}\" stroke=\"black\"/>\n",
        l = frame.left
    ));
    for i in 0..=Y_TICKS {
        let value = y_max * i as f64 / Y_TICKS as f64;
        let y = frame.y_at(value, y_max);
        svg.push_str(&format!(
            "  <line x1=\"{:.1}\" y1=\"{y:.1}\" x2=\"{right:.1}\" y2=\"{y:.1}\" stroke=\"#dddddd\"/>\n",
            frame.left
        ));
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"11\" text-anchor=\"end\">{}</text>\n",
            frame.left - 6.0,
            y + 4.0,
            format_value(value)
        ));
    }
    svg.push_str(&format!(
        "  <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"13\" text-anchor=\"middle\">{}</text>\n",
        frame.left + frame.width / 2.0,
        bottom + MARGIN_BOTTOM - 12.0,
        escape_xml(&series.x_label)
    ));
    let mid = frame.top + frame.height / 2.0;
    svg.push_str(&format!(
        "  <text x=\"18\" y=\"{mid:.1}\" font-size=\"13\" text-anchor=\"middle\" \
         transform=\"rotate(-90 18 {mid:.1})\">{}</text>\n",
        escape_xml(&series.y_label)
    ));
}

fn bars(svg: &mut String, series: &Series, frame: Frame, y_max: f64) {
    let slot = frame.width / series.points.len() as f64;
    let bar_width = slot * 0.7;
    let bottom = frame.bottom();
    svg.push_str("  <g class=\"bars\">\n");
    for (i, point) in series.points.iter().enumerate() {
        let x = frame.left + slot * i as f64 + (slot - bar_width) / 2.0;
        let y = frame.y_at(point.y, y_max);
        let center = x + bar_width / 2.0;
        svg.push_str(&format!(
            "    <rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{bar_width:.1}\" height=\"{:.1}\" fill=\"{BAR_FILL}\">\
             <title>{}: {}</title></rect>\n",
            bottom - y,
            escape_xml(&point.label),
            format_value(point.y)
        ));
        svg.push_str(&format!(
            "    <text x=\"{center:.1}\" y=\"{:.1}\" font-size=\"10\" text-anchor=\"middle\">{}</text>\n",
            y - 4.0,
            format_value(point.y)
        ));
        let label_y = bottom + 14.0;
        svg.push_str(&format!(
            "    <text x=\"{center:.1}\" y=\"{label_y:.1}\" font-size=\"11\" text-anchor=\"end\" \
             transform=\"rotate(-35 {center:.1} {label_y:.1})\">{}</text>\n",
            escape_xml(&point.label)
        ));
    }
    svg.push_str("  </g>\n");
}

fn scatter(svg: &mut String, series: &Series, frame: Frame, y_max: f64) {
    let x_max = nice_max(series.points.iter().map(|p| p.x).fold(0.0, f64::max));
    let x_at = |x: f64| frame.left + x / x_max * frame.width;
    let bottom = frame.bottom();

    for i in 0..=Y_TICKS {
        let value = x_max * i as f64 / Y_TICKS as f64;
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"11\" text-anchor=\"middle\">{}</text>\n",
            x_at(value),
            bottom + 16.0,
            format_value(value)
        ));
    }

    svg.push_str("  <g class=\"points\">\n");
    for point in &series.points {
        svg.push_str(&format!(
            "    <circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"4\" fill=\"{POINT_FILL}\" fill-opacity=\"0.7\">\
             <title>{}</title></circle>\n",
            x_at(point.x),
            frame.y_at(point.y, y_max),
            escape_xml(&point.label)
        ));
    }
    svg.push_str("  </g>\n");

    if let Some(fit) = series.trend {
        let (x0, x1) = series
            .points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.x), hi.max(p.x))
            });
        let clamp = |y: f64| y.clamp(0.0, y_max);
        svg.push_str(&format!(
            "  <line class=\"trend\" x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" \
             stroke=\"{TREND_STROKE}\" stroke-width=\"2\" stroke-dasharray=\"6 4\"/>\n",
            x_at(x0),
            frame.y_at(clamp(fit.predict(x0)), y_max),
            x_at(x1),
            frame.y_at(clamp(fit.predict(x1)), y_max)
        ));
        let r2 = fit
            .r_squared
            .map_or_else(|| "n/a".to_string(), |r| format!("{r:.3}"));
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"11\" text-anchor=\"end\" fill=\"{TREND_STROKE}\">\
             y = {:.3}x + {:.1} (R² {r2})</text>\n",
            frame.left + frame.width,
            frame.top - 6.0,
            fit.slope,
            fit.intercept
        ));
    }
}

/// Round an axis maximum up to 1, 2 or 5 times a power of ten
fn nice_max(max: f64) -> f64 {
    if !max.is_finite() || max <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(max.log10().floor());
    let scaled = max / magnitude;
    let step = if scaled <= 1.0 {
        1.0
    } else if scaled <= 2.0 {
        2.0
    } else if scaled <= 5.0 {
        5.0
    } else {
        10.0
    };
    step * magnitude
}

fn format_value(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{LinearFit, Point};
    use tempfile::TempDir;

    fn bar_series() -> Series {
        Series {
            name: "success_rate_by_language".to_string(),
            title: "Success Rate by Language (%)".to_string(),
            x_label: "Language".to_string(),
            y_label: "Success Rate (%)".to_string(),
            kind: SeriesKind::Bar,
            points: vec![
                Point {
                    label: "English (US)".to_string(),
                    x: 0.0,
                    y: 75.0,
                },
                Point {
                    label: "French".to_string(),
                    x: 1.0,
                    y: 100.0,
                },
            ],
            trend: None,
        }
    }

    mod svg_tests {
        use super::*;

        #[test]
        fn test_bar_chart_contents() {
            let svg = render_svg(&bar_series(), ChartConfig::default());
            assert!(svg.starts_with("<?xml"));
            assert!(svg.trim_end().ends_with("</svg>"));
            assert_eq!(svg.matches("<rect x=").count(), 3); // background + 2 bars
            assert!(svg.contains("English (US)"));
            assert!(svg.contains(">75<"));
        }

        #[test]
        fn test_scatter_with_trend() {
            let series = Series {
                name: "text_length_vs_generation_time".to_string(),
                title: "Text Length vs. Generation Time".to_string(),
                x_label: "Text Length (characters)".to_string(),
                y_label: "Generation Time (ms)".to_string(),
                kind: SeriesKind::Scatter,
                points: vec![
                    Point {
                        label: "case 1".to_string(),
                        x: 12.0,
                        y: 100.0,
                    },
                    Point {
                        label: "case 2".to_string(),
                        x: 1600.0,
                        y: 900.0,
                    },
                ],
                trend: LinearFit::fit(&[(12.0, 100.0), (1600.0, 900.0)]),
            };
            let svg = render_svg(&series, ChartConfig {
                width: 640,
                height: 480,
            });
            assert_eq!(svg.matches("<circle").count(), 2);
            assert!(svg.contains("class=\"trend\""));
            assert!(svg.contains("R² 1.000"));
        }

        #[test]
        fn test_labels_escaped() {
            let mut series = bar_series();
            series.points[0].label = "<b>&".to_string();
            let svg = render_svg(&series, ChartConfig::default());
            assert!(svg.contains("&lt;b&gt;&amp;"));
            assert!(!svg.contains("<b>&"));
        }

        #[test]
        fn test_nice_max() {
            assert_eq!(nice_max(0.0), 1.0);
            assert_eq!(nice_max(75.0), 100.0);
            assert_eq!(nice_max(100.0), 100.0);
            assert_eq!(nice_max(130.0), 200.0);
            assert_eq!(nice_max(4100.0), 5000.0);
            assert_eq!(nice_max(f64::NAN), 1.0);
        }
    }

    mod renderer_tests {
        use super::*;

        #[test]
        fn test_writes_named_file() {
            let dir = TempDir::new().unwrap();
            let mut renderer = SvgChartRenderer::new(dir.path(), "20260101_120000");
            let path = renderer.render(&bar_series()).unwrap().unwrap();
            assert_eq!(
                path.file_name().unwrap().to_str().unwrap(),
                "success_rate_by_language_20260101_120000.svg"
            );
            assert!(std::fs::read_to_string(&path).unwrap().contains("<svg"));
        }

        #[test]
        fn test_empty_series_skipped() {
            let dir = TempDir::new().unwrap();
            let mut renderer = SvgChartRenderer::new(dir.path(), "stamp");
            let mut series = bar_series();
            series.points.clear();
            assert!(renderer.render(&series).unwrap().is_none());
            assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        }
    }
}
