//! # Parameter Decoding
//!
//! Turns serialized parameter text into JSON values ready for schema
//! validation. The decoder is picked by the parameter's location
//! ([`ParamDecoder::for_location`]) and honors the declared `style` and
//! `explode`:
//!
//! | location | styles |
//! |---|---|
//! | path | simple, label, matrix |
//! | query | form, spaceDelimited, pipeDelimited, deepObject |
//! | header | simple |
//! | cookie | form (no exploded arrays or objects) |
//!
//! Parameters declared through `content` are read as a single value and
//! parsed with the media type (JSON, or kept as text).

mod encode;
mod error;
mod query;
mod styles;
mod value;

pub use encode::encode_query_param;
pub use error::{ParseError, ParseErrorKind};
pub use query::{base_key, decode_deep_object, form_decode, split_decode, QueryPairs, QuerySource};
pub use styles::{parse_cookies, CookieSource, HeaderSource, PathSource};
pub use value::{
    conforms, decode_value, parse_boolean, parse_integer, parse_number, parse_primitive,
    property_schema, StyleSource,
};

use crate::body::media_essence;
use crate::spec::{ParameterLocation, ParameterMeta, ParameterStyle, SchemaArena};
use http::HeaderMap;
use serde_json::Value;
use std::sync::Arc;

/// Raw parameter material of one request.
#[derive(Debug, Clone, Copy)]
pub struct ParamSources<'a> {
    /// Captured path values, still escaped.
    pub path: &'a [(Arc<str>, String)],
    pub query: &'a QueryPairs,
    pub headers: &'a HeaderMap,
    pub cookies: &'a [(String, String)],
}

impl ParamSources<'_> {
    /// Header value by name; repeated headers are joined with `,`.
    pub fn header(&self, name: &str) -> Option<String> {
        let mut values = self.headers.get_all(name).iter().peekable();
        values.peek()?;
        let joined = values
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        Some(joined)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn path_value(&self, name: &str) -> Option<&str> {
        self.path
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the parameter's own key is present, whatever its value.
    ///
    /// Exploded form objects spread their properties over the query and are
    /// not seen here; decoding reports those.
    pub fn is_present(&self, param: &ParameterMeta) -> bool {
        match param.location {
            ParameterLocation::Path => self.path_value(&param.name).is_some(),
            ParameterLocation::Query if param.style == ParameterStyle::DeepObject => {
                let prefix = format!("{}[", param.name);
                self.query.keys().any(|k| k.starts_with(&prefix))
            }
            ParameterLocation::Query => self.query.contains(&param.name),
            ParameterLocation::Header => self.headers.contains_key(param.name.as_str()),
            ParameterLocation::Cookie => self.cookie(&param.name).is_some(),
        }
    }
}

/// Decoder selected by a parameter's `in`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDecoder {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamDecoder {
    pub fn for_location(location: ParameterLocation) -> Self {
        match location {
            ParameterLocation::Path => ParamDecoder::Path,
            ParameterLocation::Query => ParamDecoder::Query,
            ParameterLocation::Header => ParamDecoder::Header,
            ParameterLocation::Cookie => ParamDecoder::Cookie,
        }
    }

    /// Decode `param` from `sources`; `Ok(None)` when it is absent.
    pub fn decode(
        &self,
        param: &ParameterMeta,
        sources: &ParamSources<'_>,
        arena: &SchemaArena,
    ) -> Result<Option<Value>, ParseError> {
        if let Some(content) = &param.content {
            let Some(text) = self.single_text(param, sources) else {
                return Ok(None);
            };
            return decode_content(&content.media_type, &text).map(Some);
        }
        let schema = param.schema;
        match self {
            ParamDecoder::Path => {
                let source = PathSource {
                    name: &param.name,
                    style: param.style,
                    explode: param.explode,
                    raw: sources.path_value(&param.name),
                };
                decode_value(&source, arena, schema)
            }
            ParamDecoder::Query if param.style == ParameterStyle::DeepObject => {
                decode_deep_object(&param.name, sources.query, arena, schema)
            }
            ParamDecoder::Query => {
                let source = QuerySource {
                    name: &param.name,
                    style: param.style,
                    explode: param.explode,
                    pairs: sources.query,
                };
                decode_value(&source, arena, schema)
            }
            ParamDecoder::Header => {
                let raw = sources.header(&param.name);
                let source = HeaderSource {
                    explode: param.explode,
                    raw: raw.as_deref(),
                };
                decode_value(&source, arena, schema)
            }
            ParamDecoder::Cookie => {
                let source = CookieSource {
                    name: &param.name,
                    explode: param.explode,
                    raw: sources.cookie(&param.name),
                };
                decode_value(&source, arena, schema)
            }
        }
    }

    fn single_text(&self, param: &ParameterMeta, sources: &ParamSources<'_>) -> Option<String> {
        match self {
            ParamDecoder::Path => sources
                .path_value(&param.name)
                .map(|v| crate::router::percent_decode(v).into_owned()),
            ParamDecoder::Query => sources
                .query
                .first(&param.name)
                .map(|v| form_decode(v).into_owned()),
            ParamDecoder::Header => sources.header(&param.name),
            ParamDecoder::Cookie => sources.cookie(&param.name).map(str::to_string),
        }
    }
}

/// Parse a `content`-declared parameter value.
pub fn decode_content(media_type: &str, text: &str) -> Result<Value, ParseError> {
    let essence = media_essence(media_type);
    if essence == "application/json" || essence.ends_with("+json") {
        serde_json::from_str(text)
            .map_err(|e| ParseError::invalid(text, "value is not valid JSON").with_cause(e))
    } else {
        Ok(Value::String(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::schema::ArenaBuilder;
    use crate::spec::{ParameterContent, SchemaDialect};
    use http::HeaderValue;
    use serde_json::json;

    fn meta(name: &str, location: ParameterLocation) -> ParameterMeta {
        ParameterMeta {
            name: name.to_string(),
            location,
            required: false,
            style: location.default_style(),
            explode: location.default_style() == ParameterStyle::Form,
            allow_empty_value: false,
            schema: None,
            content: None,
            validator: None,
        }
    }

    #[test]
    fn test_dispatch_by_location() {
        let doc = json!({});
        let mut b = ArenaBuilder::new(&doc, SchemaDialect::Oas30);
        let int = b.add(&json!({"type": "integer"})).unwrap();
        let arena = b.finish();

        let path = vec![(Arc::from("id"), "7".to_string())];
        let query = QueryPairs::parse("limit=10");
        let mut headers = HeaderMap::new();
        headers.insert("x-rate", HeaderValue::from_static("3"));
        let cookies = vec![("session".to_string(), "12".to_string())];
        let sources = ParamSources {
            path: &path,
            query: &query,
            headers: &headers,
            cookies: &cookies,
        };

        for (name, loc, expected) in [
            ("id", ParameterLocation::Path, 7),
            ("limit", ParameterLocation::Query, 10),
            ("x-rate", ParameterLocation::Header, 3),
            ("session", ParameterLocation::Cookie, 12),
        ] {
            let mut p = meta(name, loc);
            p.schema = Some(int);
            let v = ParamDecoder::for_location(loc).decode(&p, &sources, &arena).unwrap();
            assert_eq!(v, Some(json!(expected)), "{loc}");
            assert!(sources.is_present(&p));
        }

        let missing = meta("absent", ParameterLocation::Query);
        assert_eq!(
            ParamDecoder::Query.decode(&missing, &sources, &arena).unwrap(),
            None
        );
    }

    #[test]
    fn test_content_parameter_is_parsed_as_json() {
        let arena = ArenaBuilder::new(&json!({}), SchemaDialect::Oas30).finish();
        let query = QueryPairs::parse("filter=%7B%22a%22%3A1%7D&bad=%7B");
        let headers = HeaderMap::new();
        let sources = ParamSources {
            path: &[],
            query: &query,
            headers: &headers,
            cookies: &[],
        };
        let mut p = meta("filter", ParameterLocation::Query);
        p.content = Some(ParameterContent {
            media_type: "application/json".to_string(),
            schema: None,
        });
        let v = ParamDecoder::Query.decode(&p, &sources, &arena).unwrap();
        assert_eq!(v, Some(json!({"a": 1})));

        p.name = "bad".to_string();
        assert!(ParamDecoder::Query.decode(&p, &sources, &arena).is_err());
    }
}
