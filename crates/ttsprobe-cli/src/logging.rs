//! Structured logging setup.
//!
//! `RUST_LOG` wins when set. Otherwise the level follows `-v`/`-q`.
//! `TTSPROBE_LOG_FORMAT=json` switches to one JSON object per line.

use tracing_subscriber::EnvFilter;

/// Default filter directive for a verbosity level
#[must_use]
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "ttsprobe=warn,ttsprobe_cli=warn";
    }
    match verbose {
        0 => "ttsprobe=info,ttsprobe_cli=info",
        1 => "ttsprobe=debug,ttsprobe_cli=debug",
        _ => "ttsprobe=trace,ttsprobe_cli=trace",
    }
}

/// Initialize the global subscriber. Later calls are no-ops.
pub fn init(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let is_json = std::env::var("TTSPROBE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if is_json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init(0, false);
        init(2, false);
    }

    #[test]
    fn test_directive_levels() {
        assert!(default_directive(0, false).contains("=info"));
        assert!(default_directive(1, false).contains("=debug"));
        assert!(default_directive(5, false).contains("=trace"));
        assert!(default_directive(3, true).contains("=warn"));
    }

    #[test]
    fn test_directives_parse() {
        for verbose in 0..3 {
            let filter = EnvFilter::try_new(default_directive(verbose, false)).unwrap();
            assert!(format!("{filter:?}").contains("ttsprobe"));
        }
    }
}
