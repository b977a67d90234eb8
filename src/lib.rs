//! Fetches a syndication feed and normalizes its entries into a flat JSON list.
//!
//! The pipeline is `Fetcher::fetch` → [`feed::normalize`] → `Vec<FeedItem>`,
//! wrapped by [`api`] for request validation and JSON rendering, and exposed
//! over HTTP by [`server`].

pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod server;
pub mod util;

pub use config::Config;
pub use error::{Error, ErrorKind, ValidationError};
pub use feed::{FeedItem, Fetcher};
