//! Resolution errors.
//!
//! Every pipeline stage fails with a [`MediaError`]. The facade wraps it in a
//! [`ResolveError`] that records which [`Stage`] produced it, so callers get
//! both a typed kind (for retry policy) and a readable message.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Failure raised by a single pipeline stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("malformed url: {0}")]
    MalformedUrl(String),

    #[error("too many redirects (more than {limit}) starting at {url}")]
    TooManyRedirects { url: String, limit: usize },

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("cancelled by caller")]
    Cancelled,
}

impl MediaError {
    /// Closed kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::UnsupportedSource(_) => ErrorKind::UnsupportedSource,
            Self::MalformedUrl(_) => ErrorKind::MalformedUrl,
            Self::TooManyRedirects { .. } => ErrorKind::TooManyRedirects,
            Self::UpstreamUnreachable(_) => ErrorKind::UpstreamUnreachable,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Shorthand for a missing field in an upstream payload.
    pub(crate) fn missing(platform: &str, field: &str) -> Self {
        Self::SchemaMismatch(format!("{platform}: missing `{field}`"))
    }

    /// Map a transport failure. Timeouts keep their own kind.
    pub(crate) fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::UpstreamUnreachable(err.to_string())
        }
    }
}

/// Serializable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    UnsupportedSource,
    MalformedUrl,
    TooManyRedirects,
    UpstreamUnreachable,
    #[serde(rename = "upstream_error")]
    Upstream,
    RateLimited,
    SchemaMismatch,
    Timeout,
    Cancelled,
}

impl ErrorKind {
    /// Wire name used in JSON envelopes and the audit log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::UnsupportedSource => "unsupported_source",
            Self::MalformedUrl => "malformed_url",
            Self::TooManyRedirects => "too_many_redirects",
            Self::UpstreamUnreachable => "upstream_unreachable",
            Self::Upstream => "upstream_error",
            Self::RateLimited => "rate_limited",
            Self::SchemaMismatch => "schema_mismatch",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::UpstreamUnreachable | Self::Timeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Redirect,
    Match,
    Extract,
    Fetch,
    Parse,
    Normalize,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Redirect => "redirect",
            Self::Match => "match",
            Self::Extract => "extract",
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Normalize => "normalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-annotated failure returned by the resolution facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage}: {error}")]
pub struct ResolveError {
    pub stage: Stage,
    #[source]
    pub error: MediaError,
}

impl ResolveError {
    #[must_use]
    pub fn new(stage: Stage, error: MediaError) -> Self {
        Self { stage, error }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Extension for tagging a stage result with its stage.
pub(crate) trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, ResolveError>;
}

impl<T> AtStage<T> for std::result::Result<T, MediaError> {
    fn at(self, stage: Stage) -> std::result::Result<T, ResolveError> {
        self.map_err(|error| ResolveError::new(stage, error))
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
