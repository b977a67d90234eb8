use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use std::borrow::Cow;

use super::normalizer::ParseError;

/// How far into the body to look for an XML declaration.
const PROLOG_SCAN_LIMIT: usize = 512;

/// A feed body exactly as the upstream server returned it.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Response body bytes, undecoded.
    pub body: Vec<u8>,
    /// `charset` parameter of the `Content-Type` header, if any.
    pub charset: Option<String>,
    /// Media type from the `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Final URL after redirects.
    pub url: String,
}

impl RawDocument {
    /// Wraps bytes that did not come from an HTTP response.
    pub fn from_bytes(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            charset: None,
            content_type: None,
            url: String::new(),
        }
    }

    /// Decodes the body to text.
    ///
    /// The encoding is resolved from, in order: a byte-order mark, the HTTP
    /// `charset`, the XML declaration, then UTF-8. Byte sequences that are
    /// invalid in the resolved encoding fail the whole document.
    pub fn decode(&self) -> Result<Cow<'_, str>, ParseError> {
        let (encoding, bom_len) = match Encoding::for_bom(&self.body) {
            Some((encoding, len)) => (encoding, len),
            None => (self.declared_encoding()?, 0),
        };

        encoding
            .decode_without_bom_handling_and_without_replacement(&self.body[bom_len..])
            .ok_or(ParseError::InvalidEncoding {
                encoding: encoding.name(),
            })
    }

    /// Encoding named by the HTTP header or XML prolog, defaulting to UTF-8.
    pub fn declared_encoding(&self) -> Result<&'static Encoding, ParseError> {
        if let Some(label) = self.charset.as_deref() {
            return Encoding::for_label(label.as_bytes())
                .ok_or_else(|| ParseError::UnsupportedEncoding(label.to_string()));
        }

        match xml_declared_encoding(&self.body) {
            Some(label) => {
                let encoding = Encoding::for_label(label.as_bytes())
                    .ok_or_else(|| ParseError::UnsupportedEncoding(label.clone()))?;
                // A prolog we could read as ASCII cannot really be UTF-16
                if encoding == UTF_16LE || encoding == UTF_16BE {
                    Ok(UTF_8)
                } else {
                    Ok(encoding)
                }
            }
            None => Ok(UTF_8),
        }
    }
}

/// Extracts the `encoding` pseudo-attribute from a leading `<?xml ...?>` declaration.
fn xml_declared_encoding(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(PROLOG_SCAN_LIMIT)];
    let head = head.strip_prefix(b"<?xml")?;
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&head[..end]).ok()?;

    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let close = value.find(quote)?;
    Some(value[..close].trim().to_string())
}

/// Extracts the `charset` parameter from a `Content-Type` header value.
pub(crate) fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}
