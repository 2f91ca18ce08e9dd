//! Snippet insertion at a fixed anchor literal.
//!
//! Byte-level and not DOM-aware: the first occurrence of the anchor wins,
//! later occurrences are never touched, and a body without the anchor is
//! returned as-is.

use bytes::{Bytes, BytesMut};
use memchr::memmem::Finder;

/// Literal marking the insertion point, with a prebuilt searcher.
#[derive(Debug, Clone)]
pub struct Anchor {
    literal: Bytes,
    finder: Finder<'static>,
}

impl Anchor {
    pub fn new(literal: impl Into<Bytes>) -> Self {
        let literal = literal.into();
        let finder = Finder::new(&literal[..]).into_owned();
        Self { literal, finder }
    }

    /// The closing body tag.
    pub fn body_end() -> Self {
        Self::new(Bytes::from_static(b"</body>"))
    }

    pub fn literal(&self) -> &[u8] {
        &self.literal
    }

    /// Offset of the first match.
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        self.finder.find(haystack)
    }
}

/// Insert `snippet` immediately before the first match of `anchor`.
///
/// Returns `None` when the anchor does not occur.
pub fn try_insert_at_anchor(body: &[u8], anchor: &Anchor, snippet: &[u8]) -> Option<Bytes> {
    let at = anchor.find(body)?;
    let mut out = BytesMut::with_capacity(body.len() + snippet.len());
    out.extend_from_slice(&body[..at]);
    out.extend_from_slice(snippet);
    out.extend_from_slice(&body[at..]);
    Some(out.freeze())
}

/// Like [`try_insert_at_anchor`], handing back `body` itself when the
/// anchor is missing.
pub fn insert_at_anchor(body: Bytes, anchor: &Anchor, snippet: &[u8]) -> Bytes {
    try_insert_at_anchor(&body, anchor, snippet).unwrap_or(body)
}

/// Anchor and snippet bound together for the request path.
#[derive(Debug, Clone)]
pub struct Injector {
    anchor: Anchor,
    snippet: Bytes,
}

impl Injector {
    pub fn new(anchor: Anchor, snippet: impl Into<Bytes>) -> Self {
        Self {
            anchor,
            snippet: snippet.into(),
        }
    }

    pub fn snippet(&self) -> &[u8] {
        &self.snippet
    }

    /// Rewritten body, or `None` if nothing was inserted.
    pub fn inject(&self, body: &[u8]) -> Option<Bytes> {
        if self.snippet.is_empty() {
            return None;
        }
        try_insert_at_anchor(body, &self.anchor, &self.snippet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNIPPET: &[u8] = b"<script src='/t.js'></script>";

    #[test]
    fn test_inserts_before_anchor() {
        let body = Bytes::from_static(b"<html><body><p>hi</p></body></html>");
        let out = insert_at_anchor(body, &Anchor::body_end(), SNIPPET);
        assert_eq!(
            out.as_ref(),
            b"<html><body><p>hi</p><script src='/t.js'></script></body></html>".as_ref()
        );
    }

    #[test]
    fn test_only_first_match() {
        let body = Bytes::from_static(b"a</body>b</body>");
        let out = insert_at_anchor(body, &Anchor::body_end(), b"X");
        assert_eq!(out.as_ref(), b"aX</body>b</body>".as_ref());
    }

    #[test]
    fn test_missing_anchor_returns_input() {
        let body = Bytes::from_static(b"<html><BODY></BODY></html>");
        let out = insert_at_anchor(body.clone(), &Anchor::body_end(), SNIPPET);
        assert_eq!(out.as_ptr(), body.as_ptr());
        assert_eq!(out.len(), body.len());
    }

    #[test]
    fn test_injection_is_not_idempotent() {
        let injector = Injector::new(Anchor::body_end(), "S");
        let once = injector.inject(b"<body></body>").unwrap();
        let twice = injector.inject(&once).unwrap();
        assert_eq!(twice.as_ref(), b"<body>SS</body>".as_ref());
    }

    #[test]
    fn test_custom_anchor() {
        let injector = Injector::new(Anchor::new("</head>"), "S");
        let out = injector.inject(b"<head></head><body></body>").unwrap();
        assert_eq!(out.as_ref(), b"<head>S</head><body></body>".as_ref());
    }

    #[test]
    fn test_empty_snippet_never_injects() {
        let injector = Injector::new(Anchor::body_end(), Bytes::new());
        assert!(injector.inject(b"<body></body>").is_none());
    }
}
