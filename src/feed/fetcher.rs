use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::document::{charset_from_content_type, RawDocument};
use crate::config::Config;
use crate::util::{validate_url, UrlValidationError};

/// Errors that can occur while retrieving a feed document.
///
/// Each variant is a distinct upstream failure so the HTTP layer can pick a
/// status code (e.g. 504 for [`FetchError::Timeout`], 502 otherwise).
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL is not an absolute http(s) URL, or is blocked by the host guard
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// DNS resolution or TCP/TLS connection failed
    #[error("Connection failed: {0}")]
    Connect(#[source] reqwest::Error),
    /// Any other transport-level failure
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Connect or read exceeded the configured timeouts
    #[error("Request timed out")]
    Timeout,
    /// The redirect chain exceeded the configured limit
    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(u32),
    /// Response body exceeded the configured size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Upstream HTTP status, when the failure was a non-2xx response.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus(status) => Some(*status),
            _ => None,
        }
    }
}

/// Limits applied to every fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_redirects: u32,
    pub max_body_bytes: usize,
    pub user_agent: String,
    pub deny_private_hosts: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for FetchOptions {
    fn from(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_body_bytes,
            user_agent: config.user_agent.clone(),
            deny_private_hosts: config.deny_private_hosts,
        }
    }
}

/// Retrieves feed documents with bounded time, size and redirects.
///
/// Cloning is cheap: clones share the underlying connection pool. No other
/// state is kept between calls, so one `Fetcher` can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl Fetcher {
    /// Builds a fetcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend or resolver cannot
    /// be initialized.
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .read_timeout(options.read_timeout)
            .redirect(reqwest::redirect::Policy::limited(
                options.max_redirects as usize,
            ))
            .user_agent(options.user_agent.as_str())
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client, options })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(FetchOptions::from(config))
    }

    /// Fetches the document at `url` with a single GET request.
    ///
    /// The whole call, body included, is bounded by
    /// `connect_timeout + read_timeout`. There are no retries. Dropping the
    /// returned future aborts the request and releases its connection.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - Not an absolute http(s) URL (no request is made)
    /// - [`FetchError::Connect`] - DNS or connection failure
    /// - [`FetchError::Timeout`] - Time budget exceeded
    /// - [`FetchError::TooManyRedirects`] - Redirect limit exceeded
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded `max_body_bytes`
    /// - [`FetchError::IncompleteResponse`] - Body shorter than Content-Length
    /// - [`FetchError::Network`] - Other transport errors
    pub async fn fetch(&self, url: &str) -> Result<RawDocument, FetchError> {
        let url = validate_url(url, self.options.deny_private_hosts)?;
        let budget = self
            .options
            .connect_timeout
            .saturating_add(self.options.read_timeout);

        tokio::time::timeout(budget, self.fetch_url(url))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn fetch_url(&self, url: Url) -> Result<RawDocument, FetchError> {
        tracing::debug!(url = %url, "Fetching feed");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let charset = content_type.as_deref().and_then(charset_from_content_type);
        let media_type = content_type.as_deref().and_then(|ct| {
            let media = ct.split(';').next().unwrap_or("").trim();
            (!media.is_empty()).then(|| media.to_ascii_lowercase())
        });

        let body = self.read_limited_bytes(response).await?;

        tracing::debug!(
            url = %final_url,
            bytes = body.len(),
            content_type = ?media_type,
            charset = ?charset,
            "Fetched feed"
        );

        Ok(RawDocument {
            body,
            charset,
            content_type: media_type,
            url: final_url,
        })
    }

    async fn read_limited_bytes(&self, response: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        let limit = self.options.max_body_bytes;
        let expected_length = response.content_length();

        // Fast path: check Content-Length header
        if let Some(len) = expected_length {
            if len > limit as u64 {
                return Err(FetchError::ResponseTooLarge(limit));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                // EDGE-005: hyper reports a body cut short of Content-Length as a body error
                Err(e) if !e.is_timeout() => {
                    return Err(match expected_length {
                        Some(expected) if (bytes.len() as u64) < expected => {
                            tracing::debug!(error = %e, "Response body ended early");
                            FetchError::IncompleteResponse {
                                expected,
                                received: bytes.len(),
                            }
                        }
                        _ => self.classify(e),
                    });
                }
                Err(e) => return Err(self.classify(e)),
            };
            if bytes.len().saturating_add(chunk.len()) > limit {
                return Err(FetchError::ResponseTooLarge(limit));
            }
            bytes.extend_from_slice(&chunk);
        }

        // EDGE-005: A truncated body is never treated as a complete document
        if let Some(expected) = expected_length {
            if (bytes.len() as u64) < expected {
                return Err(FetchError::IncompleteResponse {
                    expected,
                    received: bytes.len(),
                });
            }
        }

        Ok(bytes)
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_redirect() {
            FetchError::TooManyRedirects(self.options.max_redirects)
        } else if err.is_connect() {
            FetchError::Connect(err)
        } else {
            FetchError::Network(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Test</title></item>
</channel></rss>"#;

    fn fetcher(options: FetchOptions) -> Fetcher {
        Fetcher::new(options).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(VALID_RSS, "application/rss+xml; charset=UTF-8"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let doc = fetcher(FetchOptions::default()).fetch(&url).await.unwrap();

        assert_eq!(doc.body, VALID_RSS.as_bytes());
        assert_eq!(doc.charset.as_deref(), Some("UTF-8"));
        assert_eq!(doc.content_type.as_deref(), Some("application/rss+xml"));
        assert_eq!(doc.url, url);
    }

    #[tokio::test]
    async fn test_fetch_404_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let err = fetcher(FetchOptions::default()).fetch(&url).await.unwrap_err();
        assert_eq!(err.upstream_status(), Some(404));
        match err {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let err = fetcher(FetchOptions::default()).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_bounded() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let options = FetchOptions {
            connect_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(300),
            ..FetchOptions::default()
        };
        let started = Instant::now();
        let result = fetcher(options)
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await;

        assert!(matches!(result, Err(FetchError::Timeout)));
        assert!(
            started.elapsed() < Duration::from_millis(1500),
            "timeout took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(1000)))
            .mount(&mock_server)
            .await;

        let options = FetchOptions {
            max_body_bytes: 64,
            ..FetchOptions::default()
        };
        let result = fetcher(options)
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge(64))));
    }

    /// Serves one connection with a hand-written HTTP response, then closes it.
    async fn raw_upstream(response: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            // The client may hang up early once it has seen enough
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/feed", addr)
    }

    #[tokio::test]
    async fn test_oversized_chunked_body_rejected_while_streaming() {
        // No Content-Length, so only the streaming cap can catch it
        let mut response =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
        for _ in 0..8 {
            response.extend_from_slice(b"20\r\n");
            response.extend_from_slice(&[b'x'; 32]);
            response.extend_from_slice(b"\r\n");
        }
        response.extend_from_slice(b"0\r\n\r\n");
        let url = raw_upstream(response).await;

        let options = FetchOptions {
            max_body_bytes: 64,
            ..FetchOptions::default()
        };
        let result = fetcher(options).fetch(&url).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge(64))));
    }

    #[tokio::test]
    async fn test_truncated_body_is_incomplete_response() {
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(b"<rss></rss");
        let url = raw_upstream(response).await;

        let result = fetcher(FetchOptions::default()).fetch(&url).await;
        match result {
            Err(FetchError::IncompleteResponse { expected, received }) => {
                assert_eq!(expected, 100);
                assert!(received <= 10);
            }
            other => panic!("expected IncompleteResponse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_body_at_limit_accepted() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&mock_server)
            .await;

        let options = FetchOptions {
            max_body_bytes: 64,
            ..FetchOptions::default()
        };
        let doc = fetcher(options)
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(doc.body.len(), 64);
    }

    #[tokio::test]
    async fn test_redirect_followed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/feed", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let doc = fetcher(FetchOptions::default())
            .fetch(&format!("{}/old", mock_server.uri()))
            .await
            .unwrap();
        assert!(doc.url.ends_with("/feed"));
    }

    #[tokio::test]
    async fn test_redirect_loop_stops_at_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/loop", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;

        let options = FetchOptions {
            max_redirects: 2,
            ..FetchOptions::default()
        };
        let result = fetcher(options)
            .fetch(&format!("{}/loop", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(FetchError::TooManyRedirects(2))));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_without_request() {
        let f = fetcher(FetchOptions::default());
        assert!(matches!(
            f.fetch("not-a-valid-url").await,
            Err(FetchError::InvalidUrl(UrlValidationError::InvalidUrl(_)))
        ));
        assert!(matches!(
            f.fetch("ftp://example.com/feed").await,
            Err(FetchError::InvalidUrl(UrlValidationError::UnsupportedScheme(_)))
        ));
    }

    #[tokio::test]
    async fn test_private_host_guard() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(0)
            .mount(&mock_server)
            .await;

        let options = FetchOptions {
            deny_private_hosts: true,
            ..FetchOptions::default()
        };
        let result = fetcher(options)
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await;
        assert!(matches!(
            result,
            Err(FetchError::InvalidUrl(UrlValidationError::Localhost))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Reserve a port, then free it so nothing is listening there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = fetcher(FetchOptions::default())
            .fetch(&format!("http://127.0.0.1:{}/feed", port))
            .await;
        assert!(matches!(result, Err(FetchError::Connect(_))));
    }

    #[test]
    fn test_options_from_config() {
        let config = Config {
            connect_timeout_secs: 3,
            read_timeout_secs: 7,
            max_redirects: 1,
            ..Config::default()
        };
        let options = FetchOptions::from(&config);
        assert_eq!(options.connect_timeout, Duration::from_secs(3));
        assert_eq!(options.read_timeout, Duration::from_secs(7));
        assert_eq!(options.max_redirects, 1);
        assert!(!options.deny_private_hosts);
    }
}
