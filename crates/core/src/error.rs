use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single request against an external feed or quote provider.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{provider} rate limited (retry_after={retry_after:?})")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider} HTTP {status}: {body}")]
    Http {
        provider: String,
        status: StatusCode,
        body: String,
    },

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} response could not be decoded: {source}")]
    Decode {
        provider: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider} has no data for {symbol}")]
    NoData { provider: String, symbol: String },

    #[error("{provider} misconfigured: {detail}")]
    Config { provider: String, detail: String },
}

impl FetchError {
    /// Transient failures are worth retrying with backoff; everything else is final for the cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } | FetchError::Decode { .. } => true,
            FetchError::Http { status, .. } => status.is_server_error(),
            FetchError::RateLimited { .. }
            | FetchError::NoData { .. }
            | FetchError::Config { .. } => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    pub fn provider(&self) -> &str {
        match self {
            FetchError::RateLimited { provider, .. }
            | FetchError::Http { provider, .. }
            | FetchError::Transport { provider, .. }
            | FetchError::Decode { provider, .. }
            | FetchError::NoData { provider, .. }
            | FetchError::Config { provider, .. } => provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: StatusCode) -> FetchError {
        FetchError::Http {
            provider: "test".to_string(),
            status,
            body: String::new(),
        }
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        assert!(http(StatusCode::BAD_GATEWAY).is_transient());
        assert!(http(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(!http(StatusCode::NOT_FOUND).is_transient());
        assert!(!http(StatusCode::UNAUTHORIZED).is_transient());
    }

    #[test]
    fn rate_limited_is_never_retried() {
        let err = FetchError::RateLimited {
            provider: "reddit".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert!(!err.is_transient());
        assert!(err.is_rate_limited());
        assert_eq!(err.provider(), "reddit");
    }
}
