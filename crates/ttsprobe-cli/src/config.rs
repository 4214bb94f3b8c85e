//! Configuration merging: flags, then the YAML file, then defaults

use crate::commands::{Cli, ColorArg};
use crate::error::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use ttsprobe::{BoundaryLanguages, GenerationConfig, RunConfig, TestClasses};

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when stderr is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Run configuration file. Every key is optional; flags take precedence.
///
/// ```yaml
/// url: http://localhost:5000
/// output_dir: test_results
/// timeout: 30
/// only_boundary: true
/// boundary_languages: [French, Spanish]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Frontend base URL
    pub url: Option<String>,
    /// Output directory
    pub output_dir: Option<PathBuf>,
    /// Show the browser window
    pub visible: Option<bool>,
    /// Element wait timeout, seconds
    pub timeout: Option<u64>,
    /// Only boundary cases
    pub only_boundary: Option<bool>,
    /// Only partition cases
    pub only_partitioning: Option<bool>,
    /// Shuffle the case order
    pub randomize: Option<bool>,
    /// Shuffle seed
    pub seed: Option<u64>,
    /// Screenshots on failure
    pub screenshots: Option<bool>,
    /// Retries after the first attempt
    pub max_retries: Option<u32>,
    /// Initial retry backoff, milliseconds
    pub backoff_ms: Option<u64>,
    /// Overall run timeout, seconds
    pub run_timeout: Option<u64>,
    /// Very-long-text threshold, characters
    pub long_text_threshold: Option<usize>,
    /// Boundary languages, or `[all]`
    pub boundary_languages: Option<Vec<String>>,
    /// Per-language warmup
    pub warmup: Option<bool>,
    /// Read voices from the page
    pub discover_voices: Option<bool>,
    /// Chromium binary
    pub chromium_path: Option<PathBuf>,
}

impl FileConfig {
    /// Load and parse a YAML config file
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))
    }

    /// Parse YAML text
    pub fn parse(text: &str) -> Result<Self, serde_yaml_ng::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(text)
    }
}

/// Everything one invocation needs, after merging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Engine settings
    pub run: RunConfig,
    /// Show the browser window
    pub visible: bool,
    /// Chromium binary
    pub chromium_path: Option<PathBuf>,
    /// Disable the chromium sandbox
    pub no_sandbox: bool,
}

/// Merge flags over the file over the defaults, then validate
pub fn resolve(cli: &Cli, file: &FileConfig) -> CliResult<Settings> {
    let defaults = RunConfig::default();

    let only_boundary = cli.only_boundary || file.only_boundary.unwrap_or(false);
    let only_partitioning = cli.only_partitioning || file.only_partitioning.unwrap_or(false);
    let classes = TestClasses::from_flags(only_partitioning, only_boundary)?;

    let languages = if cli.boundary_languages.is_empty() {
        file.boundary_languages.clone()
    } else {
        Some(cli.boundary_languages.clone())
    };
    let boundary_languages = match languages {
        Some(list) => parse_boundary_languages(&list)?,
        None => BoundaryLanguages::default(),
    };

    let mut generation = GenerationConfig::new()
        .with_classes(classes)
        .with_boundary_languages(boundary_languages);
    if let Some(threshold) = cli.long_text_threshold.or(file.long_text_threshold) {
        generation = generation.with_long_text_threshold(threshold);
    }

    let randomize = !cli.no_random && file.randomize.unwrap_or(true);
    let element_timeout_ms = cli
        .timeout
        .or(file.timeout)
        .map_or(defaults.element_timeout_ms, seconds_to_ms);
    let run_timeout_ms = cli
        .run_timeout
        .or(file.run_timeout)
        .map_or(defaults.run_timeout_ms, seconds_to_ms);

    let run = RunConfig::new()
        .with_base_url(
            cli.url
                .clone()
                .or_else(|| file.url.clone())
                .unwrap_or(defaults.base_url),
        )
        .with_output_dir(
            cli.output_dir
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or(defaults.output_dir),
        )
        .with_generation(generation)
        .with_order(randomize, cli.seed.or(file.seed))
        .with_waits(element_timeout_ms, defaults.poll_interval_ms)
        .with_retries(
            cli.max_retries.or(file.max_retries).unwrap_or(defaults.max_retries),
            cli.backoff_ms
                .or(file.backoff_ms)
                .unwrap_or(defaults.initial_backoff_ms),
        )
        .with_run_timeout_ms(run_timeout_ms)
        .with_screenshots(cli.screenshots || file.screenshots.unwrap_or(false))
        .with_warmup(!cli.no_warmup && file.warmup.unwrap_or(true))
        .with_discover_voices(cli.discover_voices || file.discover_voices.unwrap_or(false));

    run.validate()?;

    Ok(Settings {
        run,
        visible: cli.visible || file.visible.unwrap_or(false),
        chromium_path: cli.chromium_path.clone().or_else(|| file.chromium_path.clone()),
        no_sandbox: cli.no_sandbox,
    })
}

/// `["all"]` selects every catalog language; anything else is a list
fn parse_boundary_languages(list: &[String]) -> CliResult<BoundaryLanguages> {
    if list.iter().any(|l| l.trim().is_empty()) {
        return Err(CliError::invalid_argument("boundary language is empty"));
    }
    if list.iter().any(|l| l.eq_ignore_ascii_case("all")) {
        if list.len() > 1 {
            return Err(CliError::invalid_argument(
                "boundary language \"all\" cannot be combined with named languages",
            ));
        }
        return Ok(BoundaryLanguages::All);
    }
    Ok(BoundaryLanguages::Selected(
        list.iter().map(|l| l.trim().to_string()).collect(),
    ))
}

const fn seconds_to_ms(seconds: u64) -> u64 {
    seconds.saturating_mul(1000)
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

    mod file_tests {
        use super::*;

        #[test]
        fn test_parse_full_file() {
            let file = FileConfig::parse(
                "url: http://tts.local:8080\n\
                 output_dir: reports\n\
                 timeout: 10\n\
                 randomize: false\n\
                 boundary_languages: [French, Spanish]\n\
                 warmup: false\n",
            )
            .unwrap();
            assert_eq!(file.url.as_deref(), Some("http://tts.local:8080"));
            assert_eq!(file.timeout, Some(10));
            assert_eq!(file.randomize, Some(false));
            assert_eq!(
                file.boundary_languages,
                Some(vec!["French".to_string(), "Spanish".to_string()])
            );
        }

        #[test]
        fn test_empty_file_is_default() {
            assert_eq!(FileConfig::parse("  \n").unwrap(), FileConfig::default());
        }

        #[test]
        fn test_unknown_key_rejected() {
            assert!(FileConfig::parse("colour: red\n").is_err());
        }

        #[test]
        fn test_load_missing_file() {
            let err = FileConfig::load(Path::new("/nonexistent/ttsprobe.yaml")).unwrap_err();
            assert!(matches!(err, CliError::Config { .. }));
        }

        #[test]
        fn test_load_from_disk() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("run.yaml");
            std::fs::write(&path, "seed: 42\nscreenshots: true\n").unwrap();
            let file = FileConfig::load(&path).unwrap();
            assert_eq!(file.seed, Some(42));
            assert_eq!(file.screenshots, Some(true));
        }
    }

    mod resolve_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let settings = resolve(&cli(&[]), &FileConfig::default()).unwrap();
            assert_eq!(settings.run, RunConfig::default());
            assert!(!settings.visible);
            assert!(settings.chromium_path.is_none());
        }

        #[test]
        fn test_flags_override_file() {
            let file = FileConfig {
                url: Some("http://file.local".to_string()),
                timeout: Some(5),
                seed: Some(1),
                randomize: Some(false),
                ..FileConfig::default()
            };
            let settings = resolve(
                &cli(&["--url", "http://flag.local", "--timeout", "12", "--seed", "9"]),
                &file,
            )
            .unwrap();
            assert_eq!(settings.run.base_url, "http://flag.local");
            assert_eq!(settings.run.element_timeout_ms, 12_000);
            assert_eq!(settings.run.seed, Some(9));
            // no flag for re-enabling shuffle, so the file wins
            assert!(!settings.run.randomize);
        }

        #[test]
        fn test_file_fills_unset_flags() {
            let file = FileConfig {
                output_dir: Some(PathBuf::from("from_file")),
                run_timeout: Some(60),
                max_retries: Some(0),
                visible: Some(true),
                ..FileConfig::default()
            };
            let settings = resolve(&cli(&[]), &file).unwrap();
            assert_eq!(settings.run.output_dir, PathBuf::from("from_file"));
            assert_eq!(settings.run.run_timeout_ms, 60_000);
            assert_eq!(settings.run.max_retries, 0);
            assert!(settings.visible);
        }

        #[test]
        fn test_exclusive_classes_across_sources() {
            let file = FileConfig {
                only_partitioning: Some(true),
                ..FileConfig::default()
            };
            let err = resolve(&cli(&["--only-boundary"]), &file).unwrap_err();
            assert!(matches!(err, CliError::Probe(ttsprobe::ProbeError::Configuration { .. })));
        }

        #[test]
        fn test_boundary_languages() {
            let all = resolve(&cli(&["--boundary-language", "ALL"]), &FileConfig::default()).unwrap();
            assert_eq!(all.run.generation.boundary_languages, BoundaryLanguages::All);

            let named = resolve(
                &cli(&["--boundary-language", "French", "--boundary-language", "Japanese"]),
                &FileConfig::default(),
            )
            .unwrap();
            assert_eq!(
                named.run.generation.boundary_languages,
                BoundaryLanguages::Selected(vec!["French".to_string(), "Japanese".to_string()])
            );

            assert!(resolve(
                &cli(&["--boundary-language", "all", "--boundary-language", "French"]),
                &FileConfig::default()
            )
            .is_err());
        }

        #[test]
        fn test_invalid_url_rejected() {
            let err = resolve(&cli(&["--url", "localhost:5000"]), &FileConfig::default()).unwrap_err();
            assert!(err.to_string().contains("http://"));
        }

        #[test]
        fn test_zero_run_timeout_rejected() {
            assert!(resolve(&cli(&["--run-timeout", "0"]), &FileConfig::default()).is_err());
        }

        #[test]
        fn test_color_choice() {
            assert!(ColorChoice::from(ColorArg::Always).should_color());
            assert!(!ColorChoice::from(ColorArg::Never).should_color());
        }
    }
}
