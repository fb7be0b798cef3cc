//! Client configuration

use std::time::Duration;

/// Slice the client talks to unless configured otherwise
pub const DEFAULT_SLICE_NAME: &str = "default";

/// Per-attempt timeout for methods that don't declare one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause before re-routing a call that hit a stale route
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// How calls that hit a stale route are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep between a stale attempt and the next one
    pub backoff: Duration,

    /// Total attempts allowed per call. `None` retries until the call
    /// succeeds, fails remotely, or times out.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            backoff,
            max_attempts: None,
        }
    }

    pub fn bounded(backoff: Duration, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: Some(max_attempts),
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn allows_another(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(DEFAULT_RETRY_BACKOFF)
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Slice every call is addressed to
    pub slice_name: String,

    /// Timeout of methods declaring none
    pub default_timeout: Duration,

    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let slice_name = std::env::var("MERIDIAN_SLICE_NAME")
            .unwrap_or_else(|_| DEFAULT_SLICE_NAME.to_string());

        let default_timeout = env_millis("MERIDIAN_DEFAULT_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT);

        let backoff = env_millis("MERIDIAN_RETRY_BACKOFF_MS").unwrap_or(DEFAULT_RETRY_BACKOFF);

        let max_attempts = std::env::var("MERIDIAN_MAX_RETRY_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok());

        Self {
            slice_name,
            default_timeout,
            retry: RetryPolicy {
                backoff,
                max_attempts,
            },
        }
    }

    pub fn with_slice_name(mut self, slice_name: impl Into<String>) -> Self {
        self.slice_name = slice_name.into();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.slice_name.is_empty() {
            anyhow::bail!("Slice name must not be empty");
        }
        if self.default_timeout.is_zero() {
            anyhow::bail!("Default timeout must be greater than zero");
        }
        if self.retry.max_attempts == Some(0) {
            anyhow::bail!("Max retry attempts must be at least 1 when set");
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            slice_name: DEFAULT_SLICE_NAME.to_string(),
            default_timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
