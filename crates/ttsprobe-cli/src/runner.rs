//! One invocation: resolve settings, run or re-aggregate, report

use crate::commands::Cli;
use crate::config::{self, ColorChoice, FileConfig, Settings};
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use ttsprobe::{BrowserSession, RunObserver, RunOutcome, Runner, SimulatedFrontend};

/// Timeout of the preflight request
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(10);

/// How an invocation ended, when it did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every issued case ran and succeeded
    Passed,
    /// Some case failed, errored or never ran
    CasesFailed,
}

impl RunStatus {
    fn of(outcome: &RunOutcome) -> Self {
        if outcome.all_passed() {
            Self::Passed
        } else {
            Self::CasesFailed
        }
    }
}

/// Execute the invocation described by `cli`
pub fn execute(cli: &Cli) -> CliResult<RunStatus> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = config::resolve(cli, &file)?;
    let use_color = ColorChoice::from(cli.color).should_color();
    let mut reporter = ProgressReporter::new(use_color, cli.quiet);

    if let Some(results) = &cli.from_results {
        let outcome = ttsprobe::reaggregate(results, &settings.run.output_dir)?;
        reporter.info(&format!("re-aggregated {}", results.display()));
        reporter.outcome(&outcome);
        return Ok(RunStatus::of(&outcome));
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(run_session(cli.dry_run, &settings, &mut reporter))?;
    reporter.outcome(&outcome);
    Ok(RunStatus::of(&outcome))
}

async fn run_session(
    dry_run: bool,
    settings: &Settings,
    reporter: &mut ProgressReporter,
) -> CliResult<RunOutcome> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing the current case");
            let _ = stop_tx.send(true);
        }
    });
    let runner = Runner::new(settings.run.clone()).with_stop_signal(stop_rx);

    let outcome = if dry_run {
        tracing::info!("dry run against the simulated frontend");
        let mut session = SimulatedFrontend::kokoro();
        drive(&runner, &mut session, reporter).await
    } else {
        preflight(&settings.run.base_url).await?;
        let mut session = launch(settings).await?;
        drive(&runner, session.as_mut(), reporter).await
    };
    reporter.finish();
    outcome
}

/// Run, then close the session whatever happened, a panic included
async fn drive(
    runner: &Runner,
    session: &mut dyn BrowserSession,
    observer: &mut dyn RunObserver,
) -> CliResult<RunOutcome> {
    let outcome = AssertUnwindSafe(runner.run(&mut *session, observer))
        .catch_unwind()
        .await;
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "session did not close cleanly");
    }
    match outcome {
        Ok(outcome) => outcome.map_err(CliError::from),
        Err(panic) => {
            let message = ttsprobe::executor::panic_message(panic.as_ref());
            tracing::error!(panic = %message, "run panicked");
            Err(CliError::aborted(message))
        }
    }
}

/// Fail fast when the frontend does not answer
async fn preflight(url: &str) -> CliResult<()> {
    let client = reqwest::Client::builder()
        .timeout(PREFLIGHT_TIMEOUT)
        .build()
        .map_err(|e| CliError::session(format!("cannot build HTTP client: {e}")))?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CliError::session(format!("{url} is unreachable: {e}")))?;
    let status = response.status();
    if status.is_server_error() || status.is_client_error() {
        return Err(CliError::session(format!("{url} answered HTTP {}", status.as_u16())));
    }
    tracing::debug!(url, status = status.as_u16(), "preflight ok");
    Ok(())
}

#[cfg(feature = "browser")]
async fn launch(settings: &Settings) -> CliResult<Box<dyn BrowserSession>> {
    use ttsprobe::{ChromiumSession, SessionConfig};

    let mut config = SessionConfig::default().with_headless(!settings.visible);
    if let Some(path) = &settings.chromium_path {
        config = config.with_chromium_path(path);
    }
    if settings.no_sandbox {
        config = config.with_no_sandbox();
    }
    let session = ChromiumSession::launch(config)
        .await
        .map_err(|e| CliError::session(e.to_string()))?;
    Ok(Box::new(session))
}

#[cfg(not(feature = "browser"))]
async fn launch(_settings: &Settings) -> CliResult<Box<dyn BrowserSession>> {
    Err(CliError::session(
        "built without the `browser` feature; use --dry-run",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["ttsprobe"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    mod execute_tests {
        use super::*;

        #[test]
        fn test_dry_run_partition_passes() {
            let dir = tempfile::tempdir().unwrap();
            let out = dir.path().to_str().unwrap();
            let status = execute(&cli(&[
                "--dry-run",
                "--only-partitioning",
                "--no-warmup",
                "--seed",
                "3",
                "--output-dir",
                out,
                "-q",
            ]))
            .unwrap();
            assert_eq!(status, RunStatus::Passed);
            let names: Vec<_> = std::fs::read_dir(dir.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            assert!(names.iter().any(|n| n.starts_with("ttsprobe_results_")));
            assert!(names.iter().any(|n| n.starts_with("ttsprobe_junit_")));
            assert!(names.iter().any(|n| n.starts_with("ttsprobe_summary_")));
        }

        #[test]
        fn test_dry_run_boundary_reports_failure() {
            let dir = tempfile::tempdir().unwrap();
            let status = execute(&cli(&[
                "--dry-run",
                "--only-boundary",
                "--no-warmup",
                "--max-retries",
                "0",
                "--output-dir",
                dir.path().to_str().unwrap(),
                "-q",
            ]))
            .unwrap();
            // the backend rejects the empty-text case
            assert_eq!(status, RunStatus::CasesFailed);
        }

        #[test]
        fn test_from_results_missing_file() {
            let dir = tempfile::tempdir().unwrap();
            let missing = dir.path().join("ttsprobe_results_x.json");
            let err = execute(&cli(&[
                "--from-results",
                missing.to_str().unwrap(),
                "--output-dir",
                dir.path().to_str().unwrap(),
            ]))
            .unwrap_err();
            assert!(matches!(err, CliError::Probe(ttsprobe::ProbeError::Persistence { .. })));
        }

        #[test]
        fn test_invalid_config_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("bad.yaml");
            std::fs::write(&path, "timeout: soon\n").unwrap();
            let err = execute(&cli(&["--config", path.to_str().unwrap(), "--dry-run"])).unwrap_err();
            assert!(matches!(err, CliError::Config { .. }));
        }
    }

    mod drive_tests {
        use super::*;
        use ttsprobe::{GenerationConfig, RunConfig, TestCase, TestClasses};

        struct ExplodingObserver;

        impl RunObserver for ExplodingObserver {
            fn case_started(&mut self, _index: usize, _case: &TestCase) {
                panic!("observer exploded");
            }
        }

        fn runner(dir: &tempfile::TempDir) -> Runner {
            Runner::new(
                RunConfig::new()
                    .with_output_dir(dir.path())
                    .with_warmup(false)
                    .with_generation(
                        GenerationConfig::new().with_classes(TestClasses::PartitionOnly),
                    ),
            )
        }

        #[tokio::test]
        async fn test_session_closed_after_success() {
            let dir = tempfile::tempdir().unwrap();
            let mut session = SimulatedFrontend::kokoro();
            let outcome = drive(&runner(&dir), &mut session, &mut ttsprobe::NoopObserver)
                .await
                .unwrap();
            assert!(outcome.all_passed());
            assert!(session.is_closed());
        }

        #[tokio::test]
        async fn test_session_closed_after_panic() {
            let dir = tempfile::tempdir().unwrap();
            let mut session = SimulatedFrontend::kokoro();
            let err = drive(&runner(&dir), &mut session, &mut ExplodingObserver)
                .await
                .unwrap_err();
            assert!(session.is_closed());
            assert!(matches!(err, CliError::Aborted { ref message } if message == "observer exploded"));
        }
    }

    mod preflight_tests {
        use super::*;

        #[tokio::test]
        async fn test_unreachable_target() {
            // port 9 (discard) is closed on test hosts
            let err = preflight("http://127.0.0.1:9/").await.unwrap_err();
            assert!(matches!(err, CliError::Session { .. }));
        }
    }
}
