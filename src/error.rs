//! Error types for feedboard.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Widget #{position} ({kind}): {message}")]
    InvalidWidget {
        position: usize,
        kind: String,
        message: String,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of fetching data for a widget.
///
/// `NoContent` and `PartialContent` are the two sentinels the refresh
/// scheduler distinguishes. Every other variant describes a single fetch
/// that failed outright and counts as a total failure once it reaches the
/// scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("failed to retrieve any content: {0}")]
    NoContent(String),

    #[error("failed to retrieve some of the content: missing {failed} of {total} {what}")]
    PartialContent {
        failed: usize,
        total: usize,
        what: String,
    },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("unexpected status code {status} from {url}, response: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl FetchError {
    /// Whether this error still leaves displayable content behind.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialContent { .. })
    }
}

/// Worker pool errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("batch cancelled after dispatching {dispatched} of {total} items")]
    Cancelled { dispatched: usize, total: usize },

    #[error("dispatcher failed: {0}")]
    Dispatcher(String),
}

/// Result type alias for feedboard.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_content_reports_counts() {
        let err = FetchError::PartialContent {
            failed: 3,
            total: 10,
            what: "RSS feeds".into(),
        };
        assert!(err.is_partial());
        assert_eq!(
            err.to_string(),
            "failed to retrieve some of the content: missing 3 of 10 RSS feeds"
        );
    }

    #[test]
    fn transport_errors_are_not_partial() {
        let err = FetchError::Status {
            status: 503,
            url: "http://example.test".into(),
            body: "busy".into(),
        };
        assert!(!err.is_partial());
        assert!(!FetchError::NoContent("nothing".into()).is_partial());
    }

    #[test]
    fn top_level_wraps_pool_errors() {
        let err: Error = PoolError::Cancelled {
            dispatched: 2,
            total: 5,
        }
        .into();
        assert!(err.to_string().contains("2 of 5"));
    }
}
