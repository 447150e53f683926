use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when fetching permissions from a code host.
#[derive(Debug, Error)]
pub enum FetcherError {
    /// API error from the code host.
    #[error("API error: {message}")]
    Api { message: String },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Authentication required or failed.
    #[error("Authentication required")]
    AuthRequired,

    /// Resource not found (account, repo, etc.).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The account or repo belongs to a different code host than the fetcher.
    #[error("not a code host of the {subject}: want {want} but have {have}")]
    ServiceMismatch {
        subject: &'static str,
        want: String,
        have: String,
    },

    /// Unexpected/internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FetcherError {
    /// Create an API error.
    #[inline]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a not found error.
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a service mismatch error for an account lookup.
    #[inline]
    pub fn account_mismatch(want: impl Into<String>, have: impl Into<String>) -> Self {
        Self::ServiceMismatch {
            subject: "account",
            want: want.into(),
            have: have.into(),
        }
    }

    /// Create a service mismatch error for a repo lookup.
    #[inline]
    pub fn repo_mismatch(want: impl Into<String>, have: impl Into<String>) -> Self {
        Self::ServiceMismatch {
            subject: "repo",
            want: want.into(),
            have: have.into(),
        }
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is a rate limit error (retryable).
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if this error is transient: the next scheduled sync may succeed
    /// without any configuration change.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Network { .. } | Self::Api { .. }
        )
    }
}

/// Result type for fetcher operations.
pub type Result<T> = std::result::Result<T, FetcherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_mismatch_uses_code_host_wording() {
        let err = FetcherError::account_mismatch("https://a.example.com/", "https://b.example.com/");
        let msg = err.to_string();
        assert!(msg.contains("not a code host of the account"));
        assert!(msg.contains("want https://a.example.com/"));
    }

    #[test]
    fn transient_classification() {
        assert!(FetcherError::network("timeout").is_transient());
        assert!(
            FetcherError::RateLimited {
                reset_at: Utc::now()
            }
            .is_transient()
        );
        assert!(!FetcherError::AuthRequired.is_transient());
        assert!(!FetcherError::account_mismatch("a", "b").is_transient());
    }
}
