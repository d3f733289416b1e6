//! Error types shared across the crate.
//!
//! Probe failures (refused or timed out connects) never show up here: the
//! scanner absorbs them and they only surface as a missing
//! [`Candidate`](crate::scanner::Candidate).
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used by every fallible operation in the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad user input: range expression, export format, filter file.
    /// Always fatal and never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Catalog or mapping retrieval failed. Callers degrade to partial data.
    #[error("Metadata request to {url} failed: {reason}")]
    Metadata { url: String, reason: String },

    /// A scroll page could not be fetched after every retry attempt.
    #[error("Paging '{collection}' failed after {attempts} attempt(s): {source}")]
    Paging {
        collection: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A filter stage could not evaluate a value (e.g. an unparsable date).
    #[error("Filter '{stage}' failed: {reason}")]
    Filter { stage: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with something other than the expected document.
    #[error("Unexpected response from {url}: {reason}")]
    Response { url: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a configuration problem that must abort the run.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_error_keeps_the_cause() {
        let err = Error::Paging {
            collection: "logs".to_owned(),
            attempts: 3,
            source: Box::new(Error::Response {
                url: "http://10.0.0.1:9200/_search/scroll".to_owned(),
                reason: "missing hits".to_owned(),
            }),
        };

        let msg = err.to_string();
        assert!(msg.contains("'logs'"));
        assert!(msg.contains("3 attempt(s)"));
        assert!(msg.contains("missing hits"));
    }

    #[test]
    fn only_configuration_errors_are_configuration() {
        assert!(Error::config("bad range").is_configuration());
        assert!(!Error::Metadata {
            url: String::new(),
            reason: String::new()
        }
        .is_configuration());
    }
}
