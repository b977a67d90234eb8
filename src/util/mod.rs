//! Utility functions shared by the fetcher and the CLI.
//!
//! - **URL validation**: absolute http(s) URLs, with an optional guard
//!   against localhost and private networks

mod url_validator;

pub use url_validator::{validate_url, UrlValidationError};
