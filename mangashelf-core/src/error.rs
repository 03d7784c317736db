//! Catalog error types
//!
//! Transport and upstream status failures are surfaced to the caller as-is.
//! Schema failures only appear once both the strict schema and the manual
//! extraction path have given up.

use thiserror::Error;

/// Boxed source error carried by transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// Network unreachable, connection reset, timeout
    #[error("GET {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: BoxError,
    },

    /// Upstream answered with a non-success status
    #[error("GET {path} failed: HTTP {status}")]
    UpstreamStatus { path: String, status: u16 },

    /// Payload matched neither the strict schema nor the fallback extraction
    #[error("Unexpected {shape} payload: {reason}")]
    Schema { shape: &'static str, reason: String },

    /// A request URL could not be assembled
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CatalogError {
    pub fn transport(path: impl Into<String>, source: impl Into<BoxError>) -> Self {
        CatalogError::Transport {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Request path the error is tagged with, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            CatalogError::Transport { path, .. } | CatalogError::UpstreamStatus { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }

    /// HTTP status of the failure; transport failures report 0
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Transport { .. } => Some(0),
            CatalogError::UpstreamStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
