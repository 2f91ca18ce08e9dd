//! Content-coding codecs: identity, gzip and raw deflate.

use std::io::{Read, Write};

use axum::http::HeaderValue;
use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use thiserror::Error;

/// Errors raised while transcoding a body.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The body could not be decompressed.
    #[error("corrupt {coding} stream: {source}")]
    Corrupt {
        coding: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The compressor failed to write or finish.
    #[error("failed to encode {coding} stream: {source}")]
    Encode {
        coding: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The declared `Content-Encoding` is not one this pipeline handles.
    #[error("unsupported content-encoding {0:?}")]
    Unsupported(String),
}

/// A supported content coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentCoding {
    /// Every supported coding, in wildcard expansion order.
    pub const ALL: [ContentCoding; 3] = [Self::Identity, Self::Gzip, Self::Deflate];

    /// Token used in `Accept-Encoding` / `Content-Encoding`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "identity" | "*" => Some(Self::Identity),
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            _ => None,
        }
    }

    /// Coding declared by a `Content-Encoding` header. A missing or empty
    /// header means identity; stacked codings are not supported.
    pub fn from_header(value: Option<&HeaderValue>) -> Result<Self, CodecError> {
        let Some(value) = value else {
            return Ok(Self::Identity);
        };
        let raw = value
            .to_str()
            .map_err(|_| CodecError::Unsupported(String::from_utf8_lossy(value.as_bytes()).into()))?
            .trim();
        if raw.is_empty() {
            return Ok(Self::Identity);
        }
        Self::from_name(raw).ok_or_else(|| CodecError::Unsupported(raw.to_string()))
    }

    /// Decompress `data` fully into memory.
    pub fn decode(&self, data: Bytes) -> Result<Bytes, CodecError> {
        let mut out = Vec::with_capacity(data.len().saturating_mul(4));
        let result = match self {
            Self::Identity => return Ok(data),
            Self::Gzip => GzDecoder::new(&data[..]).read_to_end(&mut out),
            // Servers commonly send zlib-wrapped bodies labelled "deflate".
            Self::Deflate if looks_like_zlib(&data) => {
                ZlibDecoder::new(&data[..]).read_to_end(&mut out)
            }
            Self::Deflate => DeflateDecoder::new(&data[..]).read_to_end(&mut out),
        };

        result.map_err(|source| CodecError::Corrupt {
            coding: self.name(),
            source,
        })?;
        Ok(Bytes::from(out))
    }

    /// Compress `data` at the default level. Deflate output is raw (no zlib
    /// wrapper).
    pub fn encode(&self, data: Bytes) -> Result<Bytes, CodecError> {
        let result = match self {
            Self::Identity => return Ok(data),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&data).and_then(|_| encoder.finish())
            }
            Self::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&data).and_then(|_| encoder.finish())
            }
        };

        result
            .map(Bytes::from)
            .map_err(|source| CodecError::Encode {
                coding: self.name(),
                source,
            })
    }
}

/// RFC 1950 header check: CM = 8, window <= 32K, FCHECK valid.
fn looks_like_zlib(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => {
            cmf & 0x0f == 8 && cmf >> 4 <= 7 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0
        }
        _ => false,
    }
}
