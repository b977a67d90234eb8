//! Request/response boundary shared by the HTTP server and the CLI.
//!
//! Takes the raw `url` parameter, runs fetch → normalize, and renders the
//! outcome as a status code plus JSON body. This is also where failures are
//! logged; the feed modules only return errors.

use serde::{Deserialize, Serialize};

use crate::error::{Error, ValidationError};
use crate::feed::{self, FeedItem, Fetcher};

/// Query parameters accepted by the conversion endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub url: Option<String>,
}

impl FeedQuery {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
        }
    }
}

/// JSON body of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            error: err.message().to_string(),
            details: err.details(),
        }
    }
}

/// A rendered response: HTTP status and serialized JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Runs the conversion pipeline for one request.
///
/// # Errors
///
/// - [`Error::Validation`] - `url` missing or blank (no network call is made)
/// - [`Error::Fetch`] - the feed could not be retrieved
/// - [`Error::Parse`] - the body is not a usable feed
pub async fn convert(fetcher: &Fetcher, query: &FeedQuery) -> Result<Vec<FeedItem>, Error> {
    let url = query
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(ValidationError::MissingUrl)?;

    let document = fetcher.fetch(url).await?;
    let feed = feed::parse_feed(&document.decode()?)?;

    tracing::info!(
        url = %url,
        format = %feed.format,
        items = feed.items.len(),
        "Converted feed"
    );
    Ok(feed.items)
}

/// Runs [`convert`] and renders the result as status + JSON.
pub async fn handle(fetcher: &Fetcher, query: &FeedQuery) -> ApiResponse {
    match convert(fetcher, query).await {
        Ok(items) => render_items(&items),
        Err(err) => {
            log_failure(query, &err);
            render_error(&err)
        }
    }
}

/// Serializes items as the success body.
pub fn render_items(items: &[FeedItem]) -> ApiResponse {
    match serde_json::to_string(items) {
        Ok(body) => ApiResponse { status: 200, body },
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize feed items");
            internal_error()
        }
    }
}

/// Serializes an error as the failure body.
pub fn render_error(err: &Error) -> ApiResponse {
    match serde_json::to_string(&ErrorBody::from(err)) {
        Ok(body) => ApiResponse {
            status: err.status(),
            body,
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize error body");
            internal_error()
        }
    }
}

fn internal_error() -> ApiResponse {
    ApiResponse {
        status: 500,
        body: r#"{"error":"Internal Server Error"}"#.to_string(),
    }
}

fn log_failure(query: &FeedQuery, err: &Error) {
    let url = query.url.as_deref().unwrap_or("");
    match err {
        Error::Validation(_) => {
            tracing::debug!(error = %err, "Rejected request");
        }
        Error::Fetch(e) => {
            tracing::warn!(
                url = %url,
                error = %e,
                upstream_status = ?e.upstream_status(),
                status = err.status(),
                "Feed fetch failed"
            );
        }
        Error::Parse(e) => {
            tracing::warn!(url = %url, error = %e, "Feed parse failed");
        }
    }
}
