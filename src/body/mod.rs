//! # Request Body Decoding
//!
//! Bodies are decoded in three steps:
//!
//! 1. `Content-Encoding` (gzip, deflate, br, zstd) is undone once, up front,
//!    under the configured size limit ([`decode_content_encoding`]).
//! 2. A missing `Content-Type` is assigned by sniffing the bytes ([`sniff`]).
//! 3. The media type picks a [`BodyDecoder`] from the [`DecoderRegistry`],
//!    by exact essence first and then by structured-syntax suffix
//!    (`application/problem+json` uses the JSON decoder).
//!
//! Every decoder yields a JSON value for schema validation plus the list of
//! field names the body carried, which unknown-parameter detection compares
//! against the declared properties.

mod csv;
mod encoding;
mod form;
mod json;
mod multipart;
mod sniff;
mod xml;

pub use self::csv::CsvDecoder;
pub use encoding::decode_content_encoding;
pub use form::{exploded_fields, FormDecoder};
pub use json::JsonDecoder;
pub use multipart::{MultipartDecoder, Part, Parts};
pub use sniff::sniff;
pub use xml::XmlDecoder;

use crate::spec::{MediaTypeMeta, SchemaArena};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(String),
    #[error("unsupported content encoding {0:?}")]
    UnsupportedEncoding(String),
    #[error("failed to decode {encoding} body: {reason}")]
    Decompression { encoding: String, reason: String },
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("malformed {media_type} body: {reason}")]
    Malformed { media_type: String, reason: String },
}

impl BodyError {
    pub fn malformed(media_type: &str, reason: impl ToString) -> Self {
        BodyError::Malformed {
            media_type: media_type.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Failures that are the firewall's own rather than the client's.
    pub fn is_internal(&self) -> bool {
        !matches!(self, BodyError::Malformed { .. })
    }
}

/// A decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBody {
    pub value: Value,
    /// Top-level field names as they appeared in the body.
    pub fields: Vec<String>,
}

impl DecodedBody {
    /// Body whose fields are the keys of a JSON object, if it is one.
    pub fn from_value(value: Value) -> Self {
        let fields = match &value {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        Self { value, fields }
    }
}

/// What a decoder may consult besides the bytes.
pub struct BodyContext<'a> {
    /// Full `Content-Type` header value, parameters included.
    pub content_type: &'a str,
    /// Declared media type the request matched, when there is one.
    pub media: Option<&'a MediaTypeMeta>,
    pub arena: &'a SchemaArena,
    /// For decoders that dispatch nested content (multipart parts).
    pub registry: &'a DecoderRegistry,
}

pub trait BodyDecoder: Send + Sync {
    fn decode(&self, body: &[u8], ctx: &BodyContext<'_>) -> Result<DecodedBody, BodyError>;
}

/// `text/plain` and friends: the body as a string.
#[derive(Debug, Default)]
pub struct PlainDecoder;

impl BodyDecoder for PlainDecoder {
    fn decode(&self, body: &[u8], ctx: &BodyContext<'_>) -> Result<DecodedBody, BodyError> {
        let text = std::str::from_utf8(body)
            .map_err(|e| BodyError::malformed(&media_essence(ctx.content_type), e))?;
        Ok(DecodedBody {
            value: Value::String(text.to_string()),
            fields: Vec::new(),
        })
    }
}

/// `application/octet-stream`: opaque bytes, validated as a string.
#[derive(Debug, Default)]
pub struct OctetDecoder;

impl BodyDecoder for OctetDecoder {
    fn decode(&self, body: &[u8], _ctx: &BodyContext<'_>) -> Result<DecodedBody, BodyError> {
        Ok(DecodedBody {
            value: Value::String(String::from_utf8_lossy(body).into_owned()),
            fields: Vec::new(),
        })
    }
}

/// Media type without parameters, lowercased: `Application/JSON; charset=utf-8`
/// becomes `application/json`.
pub fn media_essence(content_type: &str) -> String {
    match content_type.parse::<mime::Mime>() {
        Ok(m) => m.essence_str().to_ascii_lowercase(),
        Err(_) => content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase(),
    }
}

/// Media type → decoder table.
#[derive(Clone)]
pub struct DecoderRegistry {
    by_essence: HashMap<String, Arc<dyn BodyDecoder>>,
    by_suffix: HashMap<String, Arc<dyn BodyDecoder>>,
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut essences: Vec<_> = self.by_essence.keys().collect();
        essences.sort();
        let mut suffixes: Vec<_> = self.by_suffix.keys().collect();
        suffixes.sort();
        f.debug_struct("DecoderRegistry")
            .field("essences", &essences)
            .field("suffixes", &suffixes)
            .finish()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl DecoderRegistry {
    pub fn empty() -> Self {
        Self {
            by_essence: HashMap::new(),
            by_suffix: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let json: Arc<dyn BodyDecoder> = Arc::new(JsonDecoder);
        let xml: Arc<dyn BodyDecoder> = Arc::new(XmlDecoder);
        let csv: Arc<dyn BodyDecoder> = Arc::new(CsvDecoder);
        let plain: Arc<dyn BodyDecoder> = Arc::new(PlainDecoder);

        let mut r = Self::empty();
        r.register("application/json", Arc::clone(&json));
        r.register("application/x-www-form-urlencoded", Arc::new(FormDecoder));
        r.register("multipart/form-data", Arc::new(MultipartDecoder));
        r.register("application/xml", Arc::clone(&xml));
        r.register("text/xml", Arc::clone(&xml));
        r.register("text/csv", Arc::clone(&csv));
        r.register("text/plain", Arc::clone(&plain));
        r.register("application/octet-stream", Arc::new(OctetDecoder));
        r.register_suffix("json", json);
        r.register_suffix("xml", xml);
        r.register_suffix("csv", csv);
        r.register_suffix("plain", plain);
        r
    }

    pub fn register(&mut self, essence: &str, decoder: Arc<dyn BodyDecoder>) {
        self.by_essence.insert(essence.to_ascii_lowercase(), decoder);
    }

    /// Register a decoder for a structured-syntax suffix (`json` for `*/*+json`).
    pub fn register_suffix(&mut self, suffix: &str, decoder: Arc<dyn BodyDecoder>) {
        self.by_suffix.insert(suffix.to_ascii_lowercase(), decoder);
    }

    pub fn lookup(&self, essence: &str) -> Option<&Arc<dyn BodyDecoder>> {
        if let Some(d) = self.by_essence.get(essence) {
            return Some(d);
        }
        let (_, suffix) = essence.rsplit_once('+')?;
        self.by_suffix.get(suffix)
    }

    /// Decode `body` with the decoder registered for `ctx.content_type`.
    pub fn decode(&self, body: &[u8], ctx: &BodyContext<'_>) -> Result<DecodedBody, BodyError> {
        let essence = media_essence(ctx.content_type);
        let decoder = self
            .lookup(&essence)
            .ok_or(BodyError::UnsupportedContentType(essence))?;
        decoder.decode(body, ctx)
    }
}
