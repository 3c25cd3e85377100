//! Error types raised while talking to the upstream AI agents.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`ValidatorError`] failures.
pub type ValidatorResult<T> = Result<T, ValidatorError>;

/// Failures that can occur while asking an agent for a verdict or an answer.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Credentials or agent identifiers are missing.
    #[error("{what} is not configured")]
    NotConfigured { what: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build agent HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The request could not be sent or its body could not be read.
    #[error("request to `{endpoint}` failed")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// The agent answered with a non-success status.
    #[error("unexpected response status {status} from `{endpoint}`")]
    Status { endpoint: String, status: StatusCode },
    /// The response did not carry a usable verdict.
    #[error("malformed agent response: {reason}")]
    Malformed { reason: String },
    /// The agent did not answer in time.
    #[error("agent call timed out")]
    Timeout,
}
