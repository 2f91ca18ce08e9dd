//! Response capture buffer.
//!
//! Holds the downstream response head and, once filled, its complete body
//! so the orchestrator can inspect and rewrite it before anything reaches
//! the client.
//!
//! # Design Decisions
//! - Headers stay in the response head untouched until a rewrite sets
//!   the framing headers
//! - `fill` accumulates every body frame and finalizes when the stream
//!   ends, so chunked downstream bodies are captured whole
//! - A body that outgrows the capture limit is handed back intact
//!   (bytes read so far followed by the rest of the stream)
//! - `write` replaces the buffer; the last full write wins
//! - One buffer per request, never shared across tasks

use axum::body::Body;
use axum::http::{header, response::Parts, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt};
use http_body_util::BodyExt;
use thiserror::Error;

use crate::encoding::{CodecError, ContentCoding};

/// The only content type eligible for injection. Parameters such as
/// `; charset=utf-8` make a response ineligible.
pub const INJECTABLE_CONTENT_TYPE: &str = "text/html";

/// Errors raised while reading the downstream body.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read downstream body: {0}")]
    Body(#[source] axum::Error),
}

/// Result of [`CaptureBuffer::fill`].
#[derive(Debug)]
pub enum Fill {
    /// The whole body is in the buffer.
    Complete,
    /// The body exceeded the limit. Holds the complete, unmodified body.
    Overflow(Body),
}

/// Captured downstream response.
#[derive(Debug)]
pub struct CaptureBuffer {
    parts: Parts,
    body: Bytes,
}

impl CaptureBuffer {
    /// Start capturing a response whose head has been produced.
    pub fn new(parts: Parts) -> Self {
        Self {
            parts,
            body: Bytes::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    /// True iff `Content-Type` is exactly `text/html`.
    pub fn is_injectable(&self) -> bool {
        self.parts
            .headers
            .get(header::CONTENT_TYPE)
            .is_some_and(|v| v.as_bytes() == INJECTABLE_CONTENT_TYPE.as_bytes())
    }

    /// `Content-Length` announced by the downstream handler, if any.
    pub fn declared_length(&self) -> Option<u64> {
        self.parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Read the downstream body to its end and store it as the buffer.
    ///
    /// Stops at `limit` bytes and returns the body rebuilt from what was
    /// read plus the unread remainder; the buffer is left empty then.
    pub async fn fill(&mut self, mut body: Body, limit: usize) -> Result<Fill, CaptureError> {
        let mut buf = BytesMut::new();
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(CaptureError::Body)?;
            let Ok(data) = frame.into_data() else {
                continue;
            };
            if buf.len() + data.len() > limit {
                buf.extend_from_slice(&data);
                let head = stream::once(async move { Ok::<_, axum::Error>(buf.freeze()) });
                let rest = head.chain(body.into_data_stream());
                return Ok(Fill::Overflow(Body::from_stream(rest)));
            }
            buf.extend_from_slice(&data);
        }
        self.write(buf.freeze());
        Ok(Fill::Complete)
    }

    /// Replace the buffered body.
    pub fn write(&mut self, bytes: Bytes) {
        self.body = bytes;
    }

    /// Body as last written, still in its declared `Content-Encoding`.
    pub fn read_raw(&self) -> &Bytes {
        &self.body
    }

    /// Coding declared by the response's `Content-Encoding` header.
    pub fn declared_coding(&self) -> Result<ContentCoding, CodecError> {
        ContentCoding::from_header(self.parts.headers.get(header::CONTENT_ENCODING))
    }

    /// Body decoded from its declared `Content-Encoding`.
    pub fn read_decoded(&self) -> Result<Bytes, CodecError> {
        self.declared_coding()?.decode(self.body.clone())
    }

    /// Store `plain` as an identity-encoded body with matching framing
    /// headers.
    pub fn write_plain(&mut self, plain: Bytes) {
        self.set_content_encoding(ContentCoding::Identity);
        self.set_content_length(plain.len());
        self.write(plain);
    }

    /// Encode `plain` with `coding`, update the framing headers and store
    /// the result. Nothing is sent until [`CaptureBuffer::into_response`].
    pub fn write_encoded(&mut self, plain: Bytes, coding: ContentCoding) -> Result<(), CodecError> {
        if coding == ContentCoding::Identity {
            self.write_plain(plain);
            return Ok(());
        }
        let encoded = coding.encode(plain)?;
        self.set_content_encoding(coding);
        self.set_content_length(encoded.len());
        self.write(encoded);
        Ok(())
    }

    fn set_content_encoding(&mut self, coding: ContentCoding) {
        let headers = &mut self.parts.headers;
        match coding {
            ContentCoding::Identity => {
                headers.remove(header::CONTENT_ENCODING);
            }
            other => {
                headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(other.name()));
            }
        }
    }

    fn set_content_length(&mut self, size: usize) {
        let headers = &mut self.parts.headers;
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }

    /// Flush: rebuild the response from the head and the buffered body.
    pub fn into_response(self) -> Response {
        Response::from_parts(self.parts, Body::from(self.body))
    }

    /// Reattach the untouched downstream body without buffering it.
    pub fn pass_through(self, body: Body) -> Response {
        Response::from_parts(self.parts, body)
    }
}
