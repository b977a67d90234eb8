//! Streaming normalizer from RSS/RDF/Atom XML to [`FeedItem`]s.
//!
//! The document is read once with `quick-xml`. Any syntax error fails the
//! whole call; there is no best-effort salvage of a broken document. Within
//! a well-formed document, missing fields are defaulted per entry instead.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::document::RawDocument;
use super::item::{FeedFormat, FeedItem, ParsedFeed};

/// SEC-003: Maximum element nesting depth accepted from a feed.
const MAX_DEPTH: usize = 256;

/// Errors that make a fetched body unusable as a feed.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The XML itself is not well-formed (mismatched tags, bad entities, ...).
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },
    /// The body contains bytes that are invalid in its character encoding.
    #[error("Document is not valid {encoding}")]
    InvalidEncoding { encoding: &'static str },
    /// The declared character encoding is not known.
    #[error("Unsupported character encoding: {0}")]
    UnsupportedEncoding(String),
    /// The document ended before any element was seen.
    #[error("Document has no root element")]
    NoRoot,
    /// The root element is not a known syndication format.
    #[error("Unsupported root element <{0}>, expected <rss>, <rdf:RDF> or <feed>")]
    UnsupportedRoot(String),
    /// The document ended with elements still open.
    #[error("Unexpected end of document: {0} element(s) left open")]
    UnexpectedEof(usize),
    /// Text or a second element appeared outside the root element.
    #[error("Content outside the root element")]
    ContentOutsideRoot,
    /// SEC-003: Nesting exceeded [`MAX_DEPTH`].
    #[error("Element nesting exceeds maximum of {0} levels")]
    TooDeep(usize),
}

/// Decodes and normalizes a fetched document.
pub fn normalize(document: &RawDocument) -> Result<Vec<FeedItem>, ParseError> {
    let text = document.decode()?;
    normalize_str(&text)
}

/// Normalizes already-decoded feed XML into items in document order.
///
/// # Examples
///
/// ```
/// use feedbridge::feed::normalize_str;
///
/// let items = normalize_str(
///     "<rss><channel><item><title>A</title><link>http://x</link></item></channel></rss>",
/// )
/// .unwrap();
/// assert_eq!(items.len(), 1);
/// assert_eq!(items[0].title, "A");
/// assert_eq!(items[0].description, "");
/// ```
pub fn normalize_str(xml: &str) -> Result<Vec<FeedItem>, ParseError> {
    parse_feed(xml).map(|feed| feed.items)
}

/// Parses feed XML, returning the detected format alongside the items.
pub fn parse_feed(xml: &str) -> Result<ParsedFeed, ParseError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations; only the five
    // predefined entities and character references are unescaped. Anything else is
    // a syntax error rather than an external fetch.
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = true;

    let mut format = None;
    let mut depth: usize = 0;
    let mut entry: Option<EntryState> = None;
    let mut items = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| ParseError::Syntax {
            position: reader.error_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(ParseError::TooDeep(MAX_DEPTH));
                }
                if depth == 1 {
                    format = Some(open_root(&e, format.is_some())?);
                } else if let Some(state) = entry.as_mut() {
                    state.open_child(&e, &reader, depth, false)?;
                } else if is_entry(e.name().as_ref()) {
                    entry = Some(EntryState::new(depth));
                }
            }
            Event::Empty(e) => {
                if depth == 0 {
                    format = Some(open_root(&e, format.is_some())?);
                } else if let Some(state) = entry.as_mut() {
                    state.open_child(&e, &reader, depth + 1, true)?;
                } else if is_entry(e.name().as_ref()) {
                    items.push(FeedItem::default());
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    return Err(ParseError::ContentOutsideRoot);
                }
                let closes_entry = entry.as_ref().is_some_and(|state| state.depth == depth);
                if closes_entry {
                    if let Some(done) = entry.take() {
                        items.push(done.into_item());
                    }
                } else if let Some(state) = entry.as_mut() {
                    state.close_child(depth);
                }
                depth -= 1;
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| ParseError::Syntax {
                    position: reader.buffer_position() as u64,
                    message: err.to_string(),
                })?;
                if depth == 0 {
                    // Only whitespace may surround the root element
                    if !text.trim().is_empty() {
                        return Err(ParseError::ContentOutsideRoot);
                    }
                } else if let Some(state) = entry.as_mut() {
                    state.push_text(&text);
                }
            }
            Event::CData(e) => {
                if depth == 0 {
                    return Err(ParseError::ContentOutsideRoot);
                }
                if let Some(state) = entry.as_mut() {
                    let text = std::str::from_utf8(&e)
                        .map_err(|_| ParseError::InvalidEncoding { encoding: "UTF-8" })?;
                    state.push_text(text);
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and DOCTYPE carry no content
            _ => {}
        }
    }

    if depth > 0 {
        return Err(ParseError::UnexpectedEof(depth));
    }
    match format {
        Some(format) => Ok(ParsedFeed { format, items }),
        None => Err(ParseError::NoRoot),
    }
}

/// Validates the root element and returns the feed format it denotes.
fn open_root(e: &BytesStart<'_>, seen_root: bool) -> Result<FeedFormat, ParseError> {
    if seen_root {
        return Err(ParseError::ContentOutsideRoot);
    }
    let name = e.name();
    FeedFormat::from_root(name.as_ref()).ok_or_else(|| {
        ParseError::UnsupportedRoot(String::from_utf8_lossy(name.as_ref()).into_owned())
    })
}

fn is_entry(name: &[u8]) -> bool {
    matches!(name, b"item" | b"entry")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    Published,
}

/// Maps a child element name to the field it fills and its precedence
/// (lower rank wins over higher rank, equal rank keeps the first seen).
fn classify(name: &[u8]) -> Option<(Field, u8)> {
    let field = match name {
        b"title" => (Field::Title, 0),
        b"link" => (Field::Link, 0),
        b"description" => (Field::Description, 0),
        b"summary" => (Field::Description, 1),
        b"content" => (Field::Description, 2),
        b"content:encoded" => (Field::Description, 3),
        b"pubDate" => (Field::Published, 0),
        b"published" => (Field::Published, 1),
        b"dc:date" => (Field::Published, 2),
        b"updated" => (Field::Published, 3),
        _ => return None,
    };
    Some(field)
}

#[derive(Debug, Default)]
struct Slot {
    value: Option<String>,
    rank: u8,
}

impl Slot {
    fn accepts(&self, rank: u8) -> bool {
        self.value.is_none() || rank < self.rank
    }

    fn offer(&mut self, rank: u8, value: &str) {
        if self.accepts(rank) {
            self.value = Some(value.trim().to_string());
            self.rank = rank;
        }
    }
}

/// Text being collected for one field element, including its descendants.
#[derive(Debug)]
struct Capture {
    field: Field,
    rank: u8,
    depth: usize,
    text: String,
}

/// Per-entry accumulator; lives from `<item>`/`<entry>` to its end tag.
#[derive(Debug)]
struct EntryState {
    depth: usize,
    title: Slot,
    link: Slot,
    description: Slot,
    published: Slot,
    capture: Option<Capture>,
}

impl EntryState {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            title: Slot::default(),
            link: Slot::default(),
            description: Slot::default(),
            published: Slot::default(),
            capture: None,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Slot {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::Published => &mut self.published,
        }
    }

    /// Handles an element opening at `depth` inside this entry.
    fn open_child(
        &mut self,
        e: &BytesStart<'_>,
        reader: &Reader<&[u8]>,
        depth: usize,
        empty: bool,
    ) -> Result<(), ParseError> {
        // Only direct children are fields; anything deeper is content of a field
        if self.capture.is_some() || depth != self.depth + 1 {
            return Ok(());
        }
        let Some((field, rank)) = classify(e.name().as_ref()) else {
            return Ok(());
        };

        if field == Field::Link {
            let (href, rel) = link_attributes(e, reader)?;
            if let Some(href) = href {
                let rank = match rel.as_deref() {
                    None | Some("alternate") => 0,
                    Some(_) => 1,
                };
                self.link.offer(rank, &href);
                return Ok(());
            }
            if empty {
                // `<link/>` without href: weakest possible candidate
                self.link.offer(2, "");
                return Ok(());
            }
        }

        if !self.slot_mut(field).accepts(rank) {
            return Ok(());
        }
        if empty {
            self.slot_mut(field).offer(rank, "");
        } else {
            self.capture = Some(Capture {
                field,
                rank,
                depth,
                text: String::new(),
            });
        }
        Ok(())
    }

    /// Handles an end tag at `depth` (which is deeper than the entry itself).
    fn close_child(&mut self, depth: usize) {
        if self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            if let Some(capture) = self.capture.take() {
                self.slot_mut(capture.field)
                    .offer(capture.rank, &capture.text);
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(text);
        }
    }

    fn into_item(self) -> FeedItem {
        FeedItem {
            title: self.title.value.unwrap_or_default(),
            link: self.link.value.unwrap_or_default(),
            description: self.description.value.unwrap_or_default(),
            published_at: self.published.value,
        }
    }
}

/// Reads `href` and `rel` from a `<link>` element.
fn link_attributes(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<(Option<String>, Option<String>), ParseError> {
    let mut href = None;
    let mut rel = None;

    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::Syntax {
            position: reader.buffer_position() as u64,
            message: err.to_string(),
        })?;
        let target = match attr.key.as_ref() {
            b"href" => &mut href,
            b"rel" => &mut rel,
            _ => continue,
        };
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| ParseError::Syntax {
                position: reader.buffer_position() as u64,
                message: err.to_string(),
            })?;
        *target = Some(value.trim().to_string());
    }

    Ok((href, rel))
}
