//! Bounded polling.
//!
//! Element, status and audio waits each drive a [`Poller`]: the caller checks
//! its condition, then calls [`Poller::tick`], which sleeps one interval or
//! fails with [`ProbeError::ElementTimeout`] once the deadline has passed.
//! Waits never retry on their own; retrying a whole case is the executor's
//! job.

use crate::result::{ProbeError, ProbeResult};
use std::time::Duration;
use tokio::time::Instant;

/// Default timeout for wait operations (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default polling interval (250ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Deadline-bound poll loop driver.
///
/// The condition is checked by the caller, so it may borrow the session
/// mutably:
///
/// ```ignore
/// let mut poller = Poller::new(options, "status");
/// loop {
///     if session.element_exists("status").await? {
///         break;
///     }
///     poller.tick().await?;
/// }
/// ```
#[derive(Debug)]
pub struct Poller<'a> {
    options: WaitOptions,
    subject: &'a str,
    deadline: Instant,
}

impl<'a> Poller<'a> {
    /// Start the clock now
    #[must_use]
    pub fn new(options: WaitOptions, subject: &'a str) -> Self {
        Self {
            options,
            subject,
            deadline: Instant::now() + options.timeout(),
        }
    }

    /// Sleep one interval, or fail with a timeout if the deadline has passed
    pub async fn tick(&mut self) -> ProbeResult<()> {
        let now = Instant::now();
        if now >= self.deadline {
            return Err(ProbeError::element_timeout(
                self.subject,
                self.options.timeout_ms,
            ));
        }
        let remaining = self.deadline - now;
        tokio::time::sleep(self.options.poll_interval().min(remaining)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    mod options_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout_ms, DEFAULT_WAIT_TIMEOUT_MS);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }

        #[test]
        fn test_builder() {
            let opts = WaitOptions::new().with_timeout(1000).with_poll_interval(10);
            assert_eq!(opts.timeout(), Duration::from_secs(1));
            assert_eq!(opts.poll_interval(), Duration::from_millis(10));
        }
    }

    mod poller_tests {
        use super::*;

        async fn wait_for(options: WaitOptions, ready_at: u32, calls: &Cell<u32>) -> ProbeResult<u32> {
            let mut poller = Poller::new(options, "status");
            loop {
                calls.set(calls.get() + 1);
                if calls.get() >= ready_at {
                    return Ok(calls.get());
                }
                poller.tick().await?;
            }
        }

        #[tokio::test]
        async fn test_returns_when_condition_met() {
            let calls = Cell::new(0);
            let opts = WaitOptions::new().with_timeout(1_000).with_poll_interval(1);
            assert_eq!(wait_for(opts, 3, &calls).await.unwrap(), 3);
        }

        #[tokio::test]
        async fn test_zero_timeout_checks_once() {
            let calls = Cell::new(0);
            let opts = WaitOptions::new().with_timeout(0);
            assert!(wait_for(opts, 1, &calls).await.is_ok());
            assert_eq!(calls.get(), 1);

            let calls = Cell::new(0);
            assert!(wait_for(opts, 2, &calls).await.is_err());
            assert_eq!(calls.get(), 1);
        }

        #[tokio::test]
        async fn test_times_out_with_subject() {
            let mut poller = Poller::new(
                WaitOptions::new().with_timeout(20).with_poll_interval(5),
                "voice-select",
            );
            let err = loop {
                if let Err(e) = poller.tick().await {
                    break e;
                }
            };
            match err {
                ProbeError::ElementTimeout { selector, ms } => {
                    assert_eq!(selector, "voice-select");
                    assert_eq!(ms, 20);
                }
                other => panic!("unexpected error {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_ticks_before_timing_out() {
            let mut poller = Poller::new(
                WaitOptions::new().with_timeout(10).with_poll_interval(2),
                "status",
            );
            let mut ticks = 0;
            let err = loop {
                match poller.tick().await {
                    Ok(()) => ticks += 1,
                    Err(e) => break e,
                }
            };
            assert!(ticks >= 1);
            assert!(err.to_string().contains("#status"));
        }
    }
}
