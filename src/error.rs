//! Error taxonomy surfaced to front-ends.
//!
//! | Variant | Raised when | Effect |
//! |---------|-------------|--------|
//! | [`Upstream`](Error::Upstream) | model, embedding or index backend unreachable or faulting | request fails, nothing retried here |
//! | [`Precondition`](Error::Precondition) | empty query, no artifacts, bad filename | rejected before any remote call |
//! | [`PartialDelete`](Error::PartialDelete) | clear could not remove one resource | reported, cleanup continues |
//! | [`Filesystem`](Error::Filesystem) | artifact read or write failed | that file only |
//! | [`NotFound`](Error::NotFound) | unknown page, tab, session or file | request fails |
//!
//! Lower layers (config, SQLite, HTTP clients) use `anyhow`; those errors are
//! mapped into this enum where they cross a component boundary.

use std::path::PathBuf;

use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    PartialDelete(#[from] PartialDeleteError),

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} not found")]
    NotFound(String),
}

/// One resource that a best-effort clear failed to remove.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("could not remove {resource}: {reason}")]
pub struct PartialDeleteError {
    /// Collection name or directory path.
    pub resource: String,
    pub reason: String,
}

impl Error {
    /// Wrap an `anyhow` chain from a backend service.
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Error::Upstream(format!("{:#}", err))
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code used by the HTTP front-end.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Upstream(_) => "upstream",
            Error::Precondition(_) => "precondition",
            Error::PartialDelete(_) => "partial_delete",
            Error::Filesystem { .. } => "filesystem",
            Error::NotFound(_) => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_keeps_anyhow_context() {
        let err = anyhow::anyhow!("connection refused").context("POST /api/chat");
        let e = Error::upstream(err);
        assert_eq!(
            e.to_string(),
            "upstream service error: POST /api/chat: connection refused"
        );
        assert_eq!(e.code(), "upstream");
    }

    #[test]
    fn partial_delete_message_names_resource() {
        let e: Error = PartialDeleteError {
            resource: "uploaded_code".into(),
            reason: "permission denied".into(),
        }
        .into();
        assert_eq!(
            e.to_string(),
            "could not remove uploaded_code: permission denied"
        );
    }
}
