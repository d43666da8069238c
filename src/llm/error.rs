//! Error classification for LLM requests.

use std::fmt;
use std::time::Duration;

/// Broad category of a failed LLM request, used to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// 429 from the provider.
    RateLimited,
    /// 5xx from the provider.
    ServerError,
    /// Other 4xx; retrying will not help.
    ClientError,
    /// Connection, timeout or transport failure.
    NetworkError,
    /// The body could not be understood.
    ParseError,
}

impl LlmErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::NetworkError
        )
    }
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RateLimited => "rate limit",
            Self::ServerError => "server error",
            Self::ClientError => "client error",
            Self::NetworkError => "network error",
            Self::ParseError => "parse error",
        };
        f.write_str(name)
    }
}

/// Map an HTTP status code to an error kind.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        500..=599 => LlmErrorKind::ServerError,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}

#[derive(Debug, Clone)]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    /// Provider-supplied `Retry-After`.
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn new(kind: LlmErrorKind, status_code: Option<u16>, message: String) -> Self {
        Self {
            kind,
            message,
            status_code,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(LlmErrorKind::RateLimited, Some(429), message)
        }
    }

    pub fn server_error(status: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ServerError, Some(status), message)
    }

    pub fn client_error(status: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ClientError, Some(status), message)
    }

    pub fn network_error(message: String) -> Self {
        Self::new(LlmErrorKind::NetworkError, None, message)
    }

    pub fn parse_error(message: String) -> Self {
        Self::new(LlmErrorKind::ParseError, None, message)
    }

    /// Delay before retry number `attempt` (0-based): `Retry-After` when the
    /// provider sent one, otherwise exponential backoff from one second capped at 30s.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(delay) = self.retry_after {
            return delay;
        }
        let base = match self.kind {
            LlmErrorKind::RateLimited => 2_000u64,
            _ => 1_000u64,
        };
        let millis = base.saturating_mul(1u64 << attempt.min(5));
        Duration::from_millis(millis.min(30_000))
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "LLM {} ({}): {}", self.kind, status, self.message),
            None => write!(f, "LLM {}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for LlmError {}

/// Retry policy for transient LLM failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Wall-clock bound across all attempts of one request.
    pub max_retry_duration: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    pub fn should_retry(&self, error: &LlmError) -> bool {
        error.kind.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_http_status(429), LlmErrorKind::RateLimited);
        assert_eq!(classify_http_status(503), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(401), LlmErrorKind::ClientError);
    }

    #[test]
    fn test_only_transient_errors_retry() {
        let config = RetryConfig::default();
        assert!(config.should_retry(&LlmError::server_error(502, "bad gateway".into())));
        assert!(config.should_retry(&LlmError::network_error("reset".into())));
        assert!(!config.should_retry(&LlmError::client_error(400, "bad request".into())));
        assert!(!config.should_retry(&LlmError::parse_error("junk".into())));
    }

    #[test]
    fn test_suggested_delay_prefers_retry_after() {
        let err = LlmError::rate_limited("slow down".into(), Some(Duration::from_secs(7)));
        assert_eq!(err.suggested_delay(3), Duration::from_secs(7));

        let err = LlmError::server_error(500, "oops".into());
        assert_eq!(err.suggested_delay(0), Duration::from_secs(1));
        assert_eq!(err.suggested_delay(2), Duration::from_secs(4));
        assert_eq!(err.suggested_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_display_includes_status() {
        let err = LlmError::client_error(401, "invalid key".into());
        assert_eq!(err.to_string(), "LLM client error (401): invalid key");
    }
}
