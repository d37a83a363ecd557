// Copyright (c) 2026 Lakegate Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lakegate - Error Types
 * Query lifecycle error taxonomy with thiserror
 *
 * @copyright 2026 Lakegate Oy
 * @license Proprietary
 */

use std::time::Duration;
use thiserror::Error;

use crate::types::QueryStatus;

/// Every failure a lifecycle run can surface. Transient transport conditions
/// are absorbed by the retry layer; everything that crosses the orchestrator
/// boundary carries a reason specific enough for the caller to act on.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Query rejected before submission; never retried, never sent remotely
    #[error("query rejected: {0}")]
    Validation(String),

    /// Transport failure expected to succeed on retry (network blip, 5xx,
    /// explicit rate-limit signal). Surfaced only once retries are exhausted.
    #[error("transient transport failure: {message}")]
    TransportTransient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Transport failure retrying cannot fix (4xx other than rate limiting,
    /// auth rejection, malformed response body)
    #[error("transport failure{}: {message}", status_suffix(.status))]
    TransportPermanent {
        status: Option<u16>,
        message: String,
    },

    /// The remote query itself failed; carries the platform's reason verbatim
    #[error("platform reported query failure: {0}")]
    PlatformFailure(String),

    /// Could not acquire a concurrency slot or rate token in time
    #[error("governor timed out after {0:?} waiting for capacity")]
    GovernorTimeout(Duration),

    /// Wall-clock deadline exceeded while the query was still in flight;
    /// a best-effort cancel was issued toward the platform
    #[error("lifecycle deadline of {0:?} exceeded")]
    LifecycleTimeout(Duration),

    /// Caller cancelled the run before a terminal status
    #[error("query cancelled by caller")]
    Cancelled,
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

impl QueryError {
    /// Whether the retry layer may re-attempt the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::TransportTransient { .. })
    }

    /// Platform-suggested delay before the next attempt, if any
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            QueryError::TransportTransient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Terminal status this error maps to at the lifecycle boundary
    pub fn terminal_status(&self) -> QueryStatus {
        match self {
            QueryError::LifecycleTimeout(_) => QueryStatus::TimedOut,
            QueryError::Cancelled => QueryStatus::Cancelled,
            other => QueryStatus::Failed {
                reason: other.to_string(),
            },
        }
    }
}

/// Classify reqwest failures: timeouts and connection errors are worth
/// retrying, body decode failures are not.
impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            QueryError::TransportTransient {
                message: err.to_string(),
                retry_after: None,
            }
        } else if err.is_decode() {
            QueryError::TransportPermanent {
                status: None,
                message: format!("malformed response body: {}", err),
            }
        } else {
            QueryError::TransportTransient {
                message: err.to_string(),
                retry_after: None,
            }
        }
    }
}

/// Result type for lifecycle operations
pub type QueryResult<T> = Result<T, QueryError>;
