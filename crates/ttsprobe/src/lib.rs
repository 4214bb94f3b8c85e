//! ttsprobe: equivalence-partition and boundary-value testing for
//! speech-synthesis web frontends.
//!
//! The engine generates a matrix of (language, voice, text) cases from a
//! voice catalog, drives each one through the frontend's fixed DOM contract
//! in a browser session, records every outcome and aggregates the results
//! into reports and charts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      TTSPROBE Architecture                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌───────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐  │
//! │   │ Catalog + │──►│ Orderer  │──►│ Executor  │──►│  Result   │  │
//! │   │ Generator │   │ (seeded) │   │ (retries) │   │  Store    │  │
//! │   └───────────┘   └──────────┘   └─────┬─────┘   └─────┬─────┘  │
//! │                                        │               │        │
//! │                                  ┌─────▼─────┐   ┌─────▼─────┐  │
//! │                                  │  Browser  │   │ Aggregate │  │
//! │                                  │  Session  │   │ + Reports │  │
//! │                                  └───────────┘   └───────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `browser` feature adds [`ChromiumSession`], a CDP-backed session.
//! Without it the crate still runs end to end against
//! [`SimulatedFrontend`].

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Post-run statistics and chart series
pub mod aggregate;

/// Voice catalog
pub mod catalog;

/// Test cases
pub mod case;

/// SVG chart rendering
pub mod chart;

/// Single-case execution with retries
pub mod executor;

/// Case matrix generation
pub mod generator;

/// Seeded case ordering
pub mod orderer;

/// JUnit and text reports
pub mod report;

/// Error types
mod result;

/// Whole-run orchestration
pub mod run;

/// Browser session capability and DOM contract
pub mod session;

/// In-process frontend for tests and dry runs
pub mod simulated;

/// Results and their persistence
pub mod store;

/// Bounded polling
pub mod wait;

pub use aggregate::{
    Aggregator, GroupStats, LengthStats, LinearFit, Point, RankedLanguage, RunSummary, Series,
    SeriesKind,
};
pub use case::{CaseCategory, CaseId, Subcategory, TestCase};
pub use catalog::{Gender, Voice, VoiceCatalog};
pub use chart::{ChartConfig, ChartSink, SvgChartRenderer};
pub use executor::{CaseExecutor, CaseState, ExecutorConfig, RetryPolicy};
pub use generator::{
    BoundaryLanguages, CaseGenerator, GeneratedCases, GenerationConfig, GenerationSummary,
    TestClasses,
};
pub use orderer::{CaseOrderer, OrderedCases, Seed};
pub use report::{ReportArtifacts, Reporter};
pub use result::{ProbeError, ProbeResult};
pub use run::{
    reaggregate, report_document, NoopObserver, RunConfig, RunObserver, RunOutcome, Runner,
    StopReason,
};
#[cfg(feature = "browser")]
pub use session::{ChromiumSession, SessionConfig};
pub use session::{BrowserSession, ConsoleEntry, ConsoleLevel, GenerateObservation};
pub use simulated::{BackendReply, GenerateRequest, KokoroBackend, SimulatedBackend, SimulatedFrontend};
pub use store::{CaseStatus, ResultStore, RunDocument, StatusCounts, TestResult};
pub use wait::WaitOptions;

#[cfg(test)]
mod tests {
    use super::*;

    mod export_tests {
        use super::*;

        #[test]
        fn test_error_reexport() {
            let err = ProbeError::configuration("--only-boundary and --only-partitioning");
            assert!(err.to_string().starts_with("Configuration error"));
            assert!(!err.is_retryable());
        }

        #[test]
        fn test_engine_wiring_defaults() {
            let config = RunConfig::default();
            let exec = config.executor_config("stamp");
            assert_eq!(exec.retry, RetryPolicy::default());
            assert_eq!(exec.base_url, config.base_url);
            assert_eq!(
                CaseGenerator::new(&VoiceCatalog::builtin(), config.generation)
                    .generate()
                    .unwrap()
                    .cases
                    .len(),
                17
            );
        }
    }
}
