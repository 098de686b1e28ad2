//! bbx - Export a Bitbucket Cloud repository into a migration archive.
//!
//! This library provides the core functionality for the `bbx` CLI tool:
//! an authenticated, paginated Bitbucket Cloud API client, reconstruction
//! of review threads from flat comments, git mirroring with default-branch
//! reconciliation, and the archive writer.

pub mod api;
pub mod archive;
pub mod cli;
pub mod export;
pub mod git;
pub mod models;
pub mod threads;
pub mod validate;

/// Library-level error type for export operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Credential rejected by the source API (401/403). Fatal.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The target repository does not exist or is not visible. Fatal.
    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    /// Retry budget for HTTP 429 exhausted. Fatal.
    #[error("Rate limit exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// Non-2xx response outside the retry/auth/not-found cases.
    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Transport-level HTTP failure (DNS, connect, TLS).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Response body did not decode into the expected shape.
    #[error("Failed to decode API response: {0}")]
    Decode(String),

    /// git mirror clone or ref reconciliation failed. Routes to the
    /// empty-repository fallback, never aborts the export by itself.
    #[error("Clone failed: {0}")]
    Clone(String),

    #[error("Invalid branch name: {0:?}")]
    InvalidBranchName(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Errors that must terminate the whole run even when raised on a
    /// best-effort fetch path: rejected credentials, a missing target
    /// repository, and an exhausted rate-limit retry budget. Everything
    /// else on those paths degrades to an empty/synthetic result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Auth(_) | Error::RepoNotFound(_) | Error::RateLimitExhausted { .. }
        )
    }
}

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, Error>;
