//! Error types for archive operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`BoaClient`](crate::BoaClient) operations.
///
/// Every error ends the requested operation. No partial table or partial
/// file is ever handed back alongside one.
#[derive(Error, Debug)]
pub enum Error {
    /// Credentials file missing, unreadable, or incomplete.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The archive rejected the credentials (HTTP 401/403).
    #[error("authentication rejected by {url} (status {status})")]
    Auth {
        /// The URL that rejected the request.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The TAP service rejected the ADQL query.
    #[error("query rejected (status {status}): {message}")]
    Query {
        /// The HTTP status code of the response.
        status: u16,
        /// Message reported by the service.
        message: String,
    },

    /// Transport failure: no response, or the body stream broke off.
    #[error("request to {url} failed: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The requested product does not exist.
    #[error("product not found: {identifier}")]
    NotFound {
        /// Identifier that was requested.
        identifier: String,
    },

    /// Local file system failure while writing a download.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being written.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The download endpoint returned an unexpected status.
    #[error("server error from {url} (status {status}): {message}")]
    Server {
        /// The URL that returned the error.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// The response body could not be interpreted.
    #[error("invalid response from {url}: {detail}")]
    InvalidResponse {
        /// The URL that produced the response.
        url: String,
        /// Description of what was wrong.
        detail: String,
    },

    /// A subsystem name that the archive does not know.
    #[error("subsystem {name} is not valid, should be one of: {}", valid.join(", "))]
    InvalidSubsystem {
        /// The rejected name.
        name: String,
        /// Subsystems reported by the archive.
        valid: Vec<String>,
    },

    /// A downloaded archive could not be unpacked.
    #[error("failed to extract {}: {source}", path.display())]
    Archive {
        /// The archive being extracted.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn network(
        url: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Network {
            url: url.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn invalid_response(url: &str, detail: impl Into<String>) -> Self {
        Error::InvalidResponse {
            url: url.to_string(),
            detail: detail.into(),
        }
    }
}
