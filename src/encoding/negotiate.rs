//! `Accept-Encoding` parsing and negotiation.
//!
//! Header grammar handled here:
//! ```text
//! header  = token *( "," token )
//! token   = name [ ";q=" quality ]
//! quality = digits                  ; parts per hundred, "80" -> 0.80
//!         | digit "." digits        ; plain decimal
//! ```
//! Malformed tokens are skipped. A `*` token expands in place into one
//! entry per supported codec, followed by the literal `*` entry itself.

use std::fmt;

use axum::http::{header, HeaderMap, HeaderValue};

use crate::encoding::codec::ContentCoding;
use crate::http::headers::header_str;

/// A single weighted coding preference.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    pub name: String,
    pub quality: f32,
}

impl Encoding {
    pub fn new(name: impl Into<String>, quality: f32) -> Self {
        Self {
            name: name.into(),
            quality,
        }
    }

    /// The identity coding at full weight.
    pub fn identity() -> Self {
        Self::new(ContentCoding::Identity.name(), 1.0)
    }

    /// Parse one `name[;q=...]` token.
    ///
    /// Returns `None` for tokens that do not fit the grammar.
    pub fn parse(token: &str) -> Option<Self> {
        let mut pieces = token.split(';');
        let name = pieces.next()?.trim().to_ascii_lowercase();
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return None;
        }

        let mut quality = 1.0;
        for param in pieces {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let value = param
                .strip_prefix("q=")
                .or_else(|| param.strip_prefix("Q="))?;
            quality = parse_quality(value)?;
        }

        Some(Self { name, quality })
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'*'
}

fn parse_quality(value: &str) -> Option<f32> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }

    let quality = if value.contains('.') {
        value.parse::<f32>().ok()?
    } else {
        value.parse::<u32>().ok()? as f32 / 100.0
    };

    (0.0..=1.0).contains(&quality).then_some(quality)
}

/// Ordered list of encodings in header order. Not deduplicated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingSet {
    encodings: Vec<Encoding>,
}

impl EncodingSet {
    pub fn new(encodings: Vec<Encoding>) -> Self {
        Self { encodings }
    }

    pub fn as_slice(&self) -> &[Encoding] {
        &self.encodings
    }

    pub fn len(&self) -> usize {
        self.encodings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }

    /// First entry with the highest quality.
    ///
    /// `None` when the set is empty or every quality is zero; callers treat
    /// that as identity.
    pub fn preferred(&self) -> Option<&Encoding> {
        let mut best: Option<&Encoding> = None;
        for encoding in &self.encodings {
            let current = best.map_or(0.0, |b| b.quality);
            if encoding.quality > current {
                best = Some(encoding);
            }
        }
        best
    }
}

impl fmt::Display for EncodingSet {
    /// Header form. Qualities below 1 are kept so a client refusal (`q=0`)
    /// survives the rewrite.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, encoding) in self.encodings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if encoding.quality < 1.0 {
                write!(f, "{};q={}", encoding.name, encoding.quality)?;
            } else {
                write!(f, "{}", encoding.name)?;
            }
        }
        Ok(())
    }
}

/// Negotiates content codings against a fixed supported list.
///
/// Built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct Negotiator {
    supported: Vec<ContentCoding>,
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new(ContentCoding::ALL.to_vec())
    }
}

impl Negotiator {
    pub fn new(supported: Vec<ContentCoding>) -> Self {
        Self { supported }
    }

    fn is_supported(&self, name: &str) -> bool {
        name == "*" || self.supported.iter().any(|c| c.name() == name)
    }

    /// Parse an `Accept-Encoding` style header value.
    pub fn parse(&self, header_value: &str) -> EncodingSet {
        let mut encodings = Vec::new();

        for token in header_value.split(',') {
            let Some(encoding) = Encoding::parse(token) else {
                continue;
            };
            if encoding.name == "*" {
                encodings.extend(
                    self.supported
                        .iter()
                        .map(|coding| Encoding::new(coding.name(), encoding.quality)),
                );
            }
            encodings.push(encoding);
        }

        if encodings.is_empty() {
            encodings.push(Encoding::identity());
        }

        EncodingSet::new(encodings)
    }

    /// Keep supported names (and `*`), preserving order.
    pub fn filter_supported(&self, set: &EncodingSet) -> EncodingSet {
        EncodingSet::new(
            set.as_slice()
                .iter()
                .filter(|e| self.is_supported(&e.name))
                .cloned()
                .collect(),
        )
    }

    /// The coding the client response should be re-encoded with.
    pub fn negotiate(&self, headers: &HeaderMap) -> ContentCoding {
        let accept = header_str(headers, header::ACCEPT_ENCODING);
        self.filter_supported(&self.parse(accept))
            .preferred()
            .and_then(|e| ContentCoding::from_name(&e.name))
            .unwrap_or(ContentCoding::Identity)
    }

    /// Rewrite `Accept-Encoding` so the downstream handler can only pick a
    /// coding this pipeline can round-trip.
    pub fn restrict_accept_encoding(&self, headers: &mut HeaderMap) {
        let accept = header_str(headers, header::ACCEPT_ENCODING);
        let filtered = self.filter_supported(&self.parse(accept));

        let value = if filtered.is_empty() {
            HeaderValue::from_static("identity")
        } else {
            match HeaderValue::from_str(&filtered.to_string()) {
                Ok(value) => value,
                Err(_) => HeaderValue::from_static("identity"),
            }
        };
        headers.insert(header::ACCEPT_ENCODING, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(set: &EncodingSet) -> Vec<(&str, f32)> {
        set.as_slice()
            .iter()
            .map(|e| (e.name.as_str(), e.quality))
            .collect()
    }

    #[test]
    fn test_parse_plain_list() {
        let set = Negotiator::default().parse("gzip, deflate,br");
        assert_eq!(names(&set), vec![("gzip", 1.0), ("deflate", 1.0), ("br", 1.0)]);
    }

    #[test]
    fn test_parse_empty_is_identity() {
        let negotiator = Negotiator::default();
        assert_eq!(names(&negotiator.parse("")), vec![("identity", 1.0)]);
        assert_eq!(names(&negotiator.parse(" , ;q=0.5,")), vec![("identity", 1.0)]);
    }

    #[test]
    fn test_parse_wildcard_expansion() {
        let set = Negotiator::default().parse("identity;q=0.5, *;q=0");
        assert_eq!(
            names(&set),
            vec![
                ("identity", 0.5),
                ("identity", 0.0),
                ("gzip", 0.0),
                ("deflate", 0.0),
                ("*", 0.0),
            ]
        );
    }

    #[test]
    fn test_parse_qualities() {
        let set = Negotiator::default().parse("gzip, deflate, br;q=0.5, zstd;q=80");
        assert_eq!(
            names(&set),
            vec![("gzip", 1.0), ("deflate", 1.0), ("br", 0.5), ("zstd", 0.8)]
        );
    }

    #[test]
    fn test_malformed_tokens_skipped() {
        let set = Negotiator::default().parse("gzip;q=abc, deflate;level=1, br;q=2.5, identity");
        assert_eq!(names(&set), vec![("identity", 1.0)]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let negotiator = Negotiator::default();
        let header = "br;q=0.9, gzip;q=0.8, *;q=0.1";
        assert_eq!(negotiator.parse(header), negotiator.parse(header));
    }

    #[test]
    fn test_filter_keeps_order() {
        let negotiator = Negotiator::default();
        let filtered = negotiator.filter_supported(&negotiator.parse("br, deflate, zstd, gzip, *"));
        assert_eq!(
            names(&filtered),
            vec![
                ("deflate", 1.0),
                ("gzip", 1.0),
                ("identity", 1.0),
                ("gzip", 1.0),
                ("deflate", 1.0),
                ("*", 1.0),
            ]
        );
        assert!(filtered
            .as_slice()
            .iter()
            .all(|e| matches!(e.name.as_str(), "identity" | "gzip" | "deflate" | "*")));
    }

    #[test]
    fn test_preferred_first_max_wins() {
        let negotiator = Negotiator::default();
        let set = negotiator.parse("deflate;q=0.5, gzip;q=0.9, identity;q=0.9");
        assert_eq!(set.preferred(), Some(&Encoding::new("gzip", 0.9)));
    }

    #[test]
    fn test_preferred_undefined() {
        let negotiator = Negotiator::default();
        assert_eq!(EncodingSet::default().preferred(), None);
        assert_eq!(negotiator.parse("gzip;q=0, deflate;q=0").preferred(), None);
    }

    #[test]
    fn test_negotiate() {
        let negotiator = Negotiator::default();
        let mut headers = HeaderMap::new();
        assert_eq!(negotiator.negotiate(&headers), ContentCoding::Identity);

        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("br, gzip;q=0.8"));
        assert_eq!(negotiator.negotiate(&headers), ContentCoding::Gzip);

        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("br, zstd"));
        assert_eq!(negotiator.negotiate(&headers), ContentCoding::Identity);
    }

    #[test]
    fn test_restrict_accept_encoding() {
        let negotiator = Negotiator::default();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static("br, gzip;q=0.5, deflate"),
        );
        negotiator.restrict_accept_encoding(&mut headers);
        assert_eq!(headers[header::ACCEPT_ENCODING], "gzip;q=0.5, deflate");

        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("br"));
        negotiator.restrict_accept_encoding(&mut headers);
        assert_eq!(headers[header::ACCEPT_ENCODING], "identity");
    }
}
