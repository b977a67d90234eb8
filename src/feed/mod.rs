//! Feed retrieval and normalization.
//!
//! This module provides the two halves of the conversion pipeline:
//!
//! - **Fetching**: one bounded HTTP GET per call, returning the raw body
//! - **Normalizing**: RSS 2.0, RSS 1.0 (RDF) and Atom entries mapped onto [`FeedItem`]
//!
//! # Architecture
//!
//! - [`fetcher`] - HTTP retrieval with timeouts, redirect and size limits
//! - [`document`] - The raw body plus character-encoding resolution
//! - [`normalizer`] - Streaming `quick-xml` parse into canonical items
//! - [`item`] - The canonical item record
//!
//! # Example
//!
//! ```no_run
//! use feedbridge::feed::{normalize, FetchOptions, Fetcher};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::new(FetchOptions::default())?;
//! let document = fetcher.fetch("https://example.com/feed.xml").await?;
//! let items = normalize(&document)?;
//! println!("{}", serde_json::to_string(&items)?);
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod fetcher;
pub mod item;
pub mod normalizer;

pub use document::RawDocument;
pub use fetcher::{FetchError, FetchOptions, Fetcher};
pub use item::{FeedFormat, FeedItem, ParsedFeed};
pub use normalizer::{normalize, normalize_str, parse_feed, ParseError};
