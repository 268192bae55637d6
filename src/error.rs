//! Error types for render sessions

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classified origin of an engine-reported load failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorDomain {
    /// Transport-level failure (connection refused, DNS, TLS, ...)
    Network,
    /// HTTP protocol failure reported by the server
    Http,
    /// Failure inside the rendering engine itself
    Engine,
    /// The engine could not classify the failure
    Unknown,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorDomain::Network => "Network",
            ErrorDomain::Http => "HTTP",
            ErrorDomain::Engine => "Engine",
            ErrorDomain::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// A structured load failure reported by the engine's error path.
///
/// Only the engine produces these; the session records the most recent one
/// and hands it to the load-outcome classifier verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadError {
    pub domain: ErrorDomain,
    pub code: i32,
    pub message: String,
    pub url: String,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error #{} loading {}: {}",
            self.domain, self.code, self.url, self.message
        )
    }
}

/// Errors that can terminate a render session
#[derive(Error, Debug)]
pub enum Error {
    /// The request was rejected before the session started
    #[error("Invalid request: {0}")]
    Config(String),

    /// The engine reported a structured load failure
    #[error("Page load failed: {0}")]
    Navigation(LoadError),

    /// The network fetcher failed outright
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Reading the script profile directory failed
    #[error("Script profile error: {0}")]
    Script(String),

    /// Building the output representation failed
    #[error("Output assembly failed: {0}")]
    Assembly(String),

    /// The engine adapter failed or went away
    #[error("Engine error: {0}")]
    Engine(String),

    /// The caller aborted the session before it completed
    #[error("Session aborted")]
    Aborted,
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Engine(err.to_string())
    }
}
