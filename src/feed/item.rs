use serde::Serialize;
use std::fmt;

/// One feed entry in canonical form.
///
/// Every field is plain text as found in the source entry. Absent elements
/// become empty strings, except the publish date which is omitted from the
/// JSON output entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw date string (`pubDate`, `published`, `dc:date` or `updated`), unparsed.
    #[serde(rename = "pubDate", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

/// Syndication dialect, detected from the document's root element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// `<rss>` (RSS 0.9x / 2.0)
    Rss,
    /// `<rdf:RDF>` (RSS 0.90 / 1.0)
    Rdf,
    /// `<feed>` (Atom 1.0)
    Atom,
}

impl FeedFormat {
    /// Maps a qualified root element name to a format.
    pub(crate) fn from_root(name: &[u8]) -> Option<Self> {
        match name {
            b"rss" => Some(Self::Rss),
            b"rdf:RDF" | b"RDF" => Some(Self::Rdf),
            b"feed" => Some(Self::Atom),
            _ => None,
        }
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rss => "rss",
            Self::Rdf => "rdf",
            Self::Atom => "atom",
        };
        f.write_str(name)
    }
}

/// A parsed feed: its dialect plus entries in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub format: FeedFormat,
    pub items: Vec<FeedItem>,
}
