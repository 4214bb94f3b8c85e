//! Result and error types for ttsprobe.
//!
//! Errors are classified once, here: [`ProbeError::is_retryable`] is the only
//! place that decides whether a case attempt may be repeated.

use thiserror::Error;

/// Result type for ttsprobe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur while generating, driving or reporting cases
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Invalid or contradictory run configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Connection to browser failed or was lost
    #[error("Failed to connect to browser: {message}")]
    ConnectionFailed {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Element did not appear (or reach the awaited state) in time
    #[error("Element timeout after {ms}ms waiting for #{selector}")]
    ElementTimeout {
        /// Element id that was awaited
        selector: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Element reference went stale between lookup and use
    #[error("Stale element reference: #{selector}")]
    StaleElement {
        /// Element id
        selector: String,
    },

    /// Transient browser-level fault
    #[error("Browser fault: {message}")]
    BrowserFault {
        /// Error message
        message: String,
    },

    /// Backend answered with an error payload
    #[error("{message} (HTTP {status})")]
    Backend {
        /// HTTP status code
        status: u16,
        /// Error text as rendered by the frontend
        message: String,
    },

    /// The frontend reached a state the case cannot recover from
    #[error("{message}")]
    Application {
        /// Error message
        message: String,
    },

    /// Script evaluation error
    #[error("Script evaluation failed: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Result persistence error
    #[error("Persistence failed: {message}")]
    Persistence {
        /// Error message
        message: String,
    },

    /// Invalid state error (operation called in wrong state)
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbeError {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a browser fault
    #[must_use]
    pub fn browser_fault(message: impl Into<String>) -> Self {
        Self::BrowserFault {
            message: message.into(),
        }
    }

    /// Create an element timeout
    #[must_use]
    pub fn element_timeout(selector: impl Into<String>, ms: u64) -> Self {
        Self::ElementTimeout {
            selector: selector.into(),
            ms,
        }
    }

    /// Create an application error
    #[must_use]
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether a case attempt failing with this error may be retried.
    ///
    /// Timing and environment faults are retryable; application-level and
    /// unrecoverable browser states are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ElementTimeout { .. }
                | Self::StaleElement { .. }
                | Self::BrowserFault { .. }
                | Self::Navigation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod classification_tests {
        use super::*;

        #[test]
        fn test_transient_errors_are_retryable() {
            assert!(ProbeError::element_timeout("voice-select", 100).is_retryable());
            assert!(ProbeError::StaleElement {
                selector: "status".into()
            }
            .is_retryable());
            assert!(ProbeError::browser_fault("target crashed").is_retryable());
            assert!(ProbeError::Navigation {
                url: "http://localhost:5000".into(),
                message: "net::ERR_CONNECTION_RESET".into()
            }
            .is_retryable());
        }

        #[test]
        fn test_terminal_errors_are_not_retryable() {
            assert!(!ProbeError::Backend {
                status: 500,
                message: "boom".into()
            }
            .is_retryable());
            assert!(!ProbeError::ConnectionFailed {
                message: "closed".into()
            }
            .is_retryable());
            assert!(!ProbeError::configuration("bad").is_retryable());
            assert!(!ProbeError::application("audio missing").is_retryable());
            assert!(!ProbeError::invalid_state("bad").is_retryable());
        }
    }

    mod display_tests {
        use super::*;

        #[test]
        fn test_element_timeout_message() {
            let err = ProbeError::element_timeout("voice-select", 2500);
            let msg = err.to_string();
            assert!(msg.contains("Element timeout"));
            assert!(msg.contains("#voice-select"));
            assert!(msg.contains("2500ms"));
        }

        #[test]
        fn test_backend_message_carries_status() {
            let err = ProbeError::Backend {
                status: 500,
                message: "Error: pipeline crashed".into(),
            };
            assert_eq!(err.to_string(), "Error: pipeline crashed (HTTP 500)");
        }

        #[test]
        fn test_io_conversion() {
            let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
            let err: ProbeError = io.into();
            assert!(matches!(err, ProbeError::Io(_)));
        }
    }
}
