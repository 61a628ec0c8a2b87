//! Core traits and error types for the enrichment stage.
//!
//! - Source abstraction via [`SourceEnricher`]
//! - Outbound call failures via [`FetchError`], converted into `fail` markers

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{FetchFailure, PackageName};

// ============================================================================
// Source Trait
// ============================================================================

/// One external source that augments a package name with metadata.
///
/// Enrichers never return an error: every outcome, including failed calls,
/// is expressed in `Output` so a single source cannot abort a run.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// package task of a run.
#[async_trait]
pub trait SourceEnricher: Send + Sync {
    /// Record produced for one package.
    type Output: Send;

    /// Returns a short identifier for logs (e.g. "pypi", "stackoverflow").
    fn source_id(&self) -> &'static str;

    /// Queries the source for `package`.
    async fn enrich(&self, package: &PackageName) -> Self::Output;
}

// ============================================================================
// Error Types
// ============================================================================

/// Reasons an outbound call did not produce a usable response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Non-success HTTP status
    #[error("HTTP status {code}")]
    Status { code: u16 },

    /// Connection, TLS or timeout failure before a status was received
    #[error("Transport error: {0}")]
    Transport(String),

    /// Body could not be read or decoded
    #[error("Malformed response body: {0}")]
    Decode(String),

    /// Local request budget for the API is exhausted
    #[error("Rate limit budget exhausted for {api}")]
    RateLimited { api: String },
}

impl FetchError {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            FetchError::Status { code } => Some(*code),
            _ => None,
        }
    }

    /// Converts the error into the `fail` marker recorded in a report.
    pub fn into_failure(self, api_url: impl Into<String>) -> FetchFailure {
        FetchFailure {
            api_url: api_url.into(),
            http_status: self.http_status(),
            error: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_failure_keeps_code() {
        let failure = FetchError::Status { code: 404 }.into_failure("http://index/pypi/x/json");
        assert_eq!(failure.http_status, Some(404));
        assert_eq!(failure.error, "HTTP status 404");
        assert_eq!(failure.api_url, "http://index/pypi/x/json");
    }

    #[test]
    fn test_transport_failure_has_no_code() {
        let failure = FetchError::Transport("connection refused".into()).into_failure("http://x");
        assert_eq!(failure.http_status, None);
        assert!(failure.error.contains("connection refused"));
    }
}
