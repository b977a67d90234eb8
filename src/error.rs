//! Top-level error type for one feed conversion.
//!
//! Every failed request yields exactly one [`Error`] of exactly one kind.
//! The kinds let the HTTP layer tell "bad request" from "could not reach the
//! source" from "the source answered with something unusable".

use thiserror::Error;

use crate::feed::{FetchError, ParseError};

/// The request itself was unusable; detected before any network call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("URL parameter is required")]
    MissingUrl,
    /// The query string could not be read (e.g. `url` given twice)
    #[error("{0}")]
    MalformedQuery(String),
}

/// Outcome of a failed conversion.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Fetch,
    Parse,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Fetch(_) => ErrorKind::Fetch,
            Error::Parse(_) => ErrorKind::Parse,
        }
    }

    /// HTTP status the transport layer should answer with.
    ///
    /// - 400: missing URL, or a URL the fetcher refuses
    /// - 504: upstream timed out
    /// - 502: any other upstream failure
    /// - 500: upstream content is not a usable feed
    pub fn status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Fetch(FetchError::InvalidUrl(_)) => 400,
            Error::Fetch(FetchError::Timeout) => 504,
            Error::Fetch(_) => 502,
            Error::Parse(_) => 500,
        }
    }

    /// Short human-readable summary for the `error` field of the response.
    pub fn message(&self) -> &'static str {
        match self {
            Error::Validation(_) => "URL parameter is required",
            Error::Fetch(_) => "Failed to fetch RSS",
            Error::Parse(_) => "Invalid RSS format",
        }
    }

    /// Underlying cause for the `details` field, if there is one worth reporting.
    pub fn details(&self) -> Option<String> {
        match self {
            Error::Validation(ValidationError::MissingUrl) => None,
            Error::Validation(e @ ValidationError::MalformedQuery(_)) => Some(e.to_string()),
            Error::Fetch(e) => Some(e.to_string()),
            Error::Parse(e) => Some(e.to_string()),
        }
    }
}
