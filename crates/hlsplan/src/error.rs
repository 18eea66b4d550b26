use std::path::PathBuf;

use crate::fetch::FetchError;

// Error type for a resolution job. Every fatal variant names the stage and the
// URL or path it failed on.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("parse failed for {url}: {reason}")]
    InvalidManifest { url: String, reason: String },

    #[error("write failed for {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write failed: could not serialize {what}: {source}")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ResolveError {
    pub(crate) fn fetch(url: impl Into<String>, source: FetchError) -> Self {
        ResolveError::Fetch {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn invalid(url: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolveError::InvalidManifest {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ResolveError::Write {
            path: path.into(),
            source,
        }
    }

    /// The pipeline stage this error belongs to: `fetch`, `parse`, `write` or `config`.
    pub fn stage(&self) -> &'static str {
        match self {
            ResolveError::Fetch { .. } => "fetch",
            ResolveError::InvalidManifest { .. } => "parse",
            ResolveError::Write { .. } | ResolveError::Serialization { .. } => "write",
            ResolveError::Config(_) => "config",
        }
    }
}
