//! Path, header and cookie serializations.
//!
//! Path values arrive still percent-encoded: they are split on the style's
//! delimiters first and every piece is decoded afterwards, so an escaped
//! delimiter inside a value survives. Header and cookie values are used as
//! they appear on the wire.

use super::error::ParseError;
use super::query::pairs_from_list;
use super::value::StyleSource;
use crate::router::percent_decode;
use crate::spec::ParameterStyle;

fn decode_all<'a>(pieces: impl Iterator<Item = &'a str>) -> Vec<String> {
    pieces.map(|p| percent_decode(p).into_owned()).collect()
}

/// Split `k=v` items into pairs, decoding both sides.
fn kv_pairs<'a>(
    raw: &str,
    items: impl Iterator<Item = &'a str>,
    decode: bool,
) -> Result<Vec<(String, String)>, ParseError> {
    items
        .filter(|i| !i.is_empty())
        .map(|item| {
            let (k, v) = item.split_once('=').ok_or_else(|| {
                ParseError::invalid(raw, "a value must be a list of object's properties in format \"name=value\"")
            })?;
            if decode {
                Ok((percent_decode(k).into_owned(), percent_decode(v).into_owned()))
            } else {
                Ok((k.trim().to_string(), v.trim().to_string()))
            }
        })
        .collect()
}

pub struct PathSource<'a> {
    pub name: &'a str,
    pub style: ParameterStyle,
    pub explode: bool,
    /// Captured segment, still escaped.
    pub raw: Option<&'a str>,
}

impl PathSource<'_> {
    /// Strip the style prefix (`.` for label, `;name=` for matrix).
    fn body<'r>(&self, raw: &'r str) -> Result<&'r str, ParseError> {
        match self.style {
            ParameterStyle::Label => raw
                .strip_prefix('.')
                .ok_or_else(|| ParseError::invalid(raw, "a value must be prefixed with a dot")),
            ParameterStyle::Matrix => {
                let prefix = format!(";{}=", self.name);
                match raw.strip_prefix(prefix.as_str()) {
                    Some(rest) => Ok(rest),
                    // `;name` alone carries an empty value.
                    None if raw == format!(";{}", self.name) => Ok(""),
                    None => Err(ParseError::invalid(
                        raw,
                        format!("a value must be prefixed with \";{}=\"", self.name),
                    )),
                }
            }
            _ => Ok(raw),
        }
    }
}

impl StyleSource for PathSource<'_> {
    fn primitive(&self) -> Result<Option<String>, ParseError> {
        let Some(raw) = self.raw else {
            return Ok(None);
        };
        Ok(Some(percent_decode(self.body(raw)?).into_owned()))
    }

    fn array(&self) -> Result<Option<Vec<String>>, ParseError> {
        let Some(raw) = self.raw else {
            return Ok(None);
        };
        let items = match (self.style, self.explode) {
            (ParameterStyle::Label, true) => {
                decode_all(self.body(raw)?.split('.'))
            }
            (ParameterStyle::Matrix, true) => {
                let prefix = format!("{}=", self.name);
                let mut out = Vec::new();
                for part in raw.split(';').filter(|p| !p.is_empty()) {
                    let v = part.strip_prefix(prefix.as_str()).ok_or_else(|| {
                        ParseError::invalid(raw, format!("every item must be prefixed with \";{}=\"", self.name))
                    })?;
                    out.push(percent_decode(v).into_owned());
                }
                out
            }
            _ => {
                let body = self.body(raw)?;
                if body.is_empty() {
                    Vec::new()
                } else {
                    decode_all(body.split(','))
                }
            }
        };
        Ok(Some(items))
    }

    fn object(&self, _declared: &[&str]) -> Result<Option<Vec<(String, String)>>, ParseError> {
        let Some(raw) = self.raw else {
            return Ok(None);
        };
        let pairs = match (self.style, self.explode) {
            (ParameterStyle::Simple, true) => kv_pairs(raw, raw.split(','), true)?,
            (ParameterStyle::Label, true) => kv_pairs(raw, self.body(raw)?.split('.'), true)?,
            (ParameterStyle::Matrix, true) => kv_pairs(raw, raw.split(';'), true)?,
            _ => {
                let body = self.body(raw)?;
                pairs_from_list(raw, decode_all(body.split(',')))?
            }
        };
        Ok(Some(pairs))
    }
}

pub struct HeaderSource<'a> {
    pub explode: bool,
    pub raw: Option<&'a str>,
}

impl StyleSource for HeaderSource<'_> {
    fn primitive(&self) -> Result<Option<String>, ParseError> {
        Ok(self.raw.map(str::to_string))
    }

    fn array(&self) -> Result<Option<Vec<String>>, ParseError> {
        Ok(self
            .raw
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect()))
    }

    fn object(&self, _declared: &[&str]) -> Result<Option<Vec<(String, String)>>, ParseError> {
        let Some(raw) = self.raw else {
            return Ok(None);
        };
        if self.explode {
            return kv_pairs(raw, raw.split(','), false).map(Some);
        }
        let items = raw.split(',').map(|s| s.trim().to_string()).collect();
        pairs_from_list(raw, items).map(Some)
    }
}

pub struct CookieSource<'a> {
    pub name: &'a str,
    pub explode: bool,
    pub raw: Option<&'a str>,
}

impl StyleSource for CookieSource<'_> {
    fn primitive(&self) -> Result<Option<String>, ParseError> {
        Ok(self.raw.map(str::to_string))
    }

    fn array(&self) -> Result<Option<Vec<String>>, ParseError> {
        if self.explode {
            return Err(ParseError::unsupported(format!(
                "cookie parameter {:?}: exploded arrays are not supported",
                self.name
            )));
        }
        Ok(self
            .raw
            .map(|raw| raw.split(',').map(str::to_string).collect()))
    }

    fn object(&self, _declared: &[&str]) -> Result<Option<Vec<(String, String)>>, ParseError> {
        if self.explode {
            return Err(ParseError::unsupported(format!(
                "cookie parameter {:?}: exploded objects are not supported",
                self.name
            )));
        }
        let Some(raw) = self.raw else {
            return Ok(None);
        };
        pairs_from_list(raw, raw.split(',').map(str::to_string).collect()).map(Some)
    }
}

/// Parse `Cookie` header values into `(name, value)` pairs.
pub fn parse_cookies<'h>(headers: impl Iterator<Item = &'h str>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for header in headers {
        for part in header.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            let v = v.trim().trim_matches('"');
            out.push((k.trim().to_string(), v.to_string()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::value::decode_value;
    use crate::decode::ParseErrorKind;
    use crate::spec::schema::ArenaBuilder;
    use crate::spec::{SchemaArena, SchemaDialect, SchemaId};
    use serde_json::{json, Value};

    fn arena(schema: Value) -> (SchemaArena, SchemaId) {
        let doc = json!({});
        let mut b = ArenaBuilder::new(&doc, SchemaDialect::Oas30);
        let id = b.add(&schema).unwrap();
        (b.finish(), id)
    }

    fn path<'a>(style: ParameterStyle, explode: bool, raw: &'a str) -> PathSource<'a> {
        PathSource {
            name: "id",
            style,
            explode,
            raw: Some(raw),
        }
    }

    #[test]
    fn test_path_array_styles() {
        let (a, id) = arena(json!({"type": "array", "items": {"type": "integer"}}));
        let cases = [
            (ParameterStyle::Simple, false, "3,4,5"),
            (ParameterStyle::Simple, true, "3,4,5"),
            (ParameterStyle::Label, false, ".3,4,5"),
            (ParameterStyle::Label, true, ".3.4.5"),
            (ParameterStyle::Matrix, false, ";id=3,4,5"),
            (ParameterStyle::Matrix, true, ";id=3;id=4;id=5"),
        ];
        for (style, explode, raw) in cases {
            let v = decode_value(&path(style, explode, raw), &a, Some(id)).unwrap();
            assert_eq!(v, Some(json!([3, 4, 5])), "{style} explode={explode}");
        }
    }

    #[test]
    fn test_path_object_styles() {
        let (a, id) = arena(json!({"type": "object", "properties": {
            "role": {"type": "string"}, "age": {"type": "integer"}
        }}));
        let cases = [
            (ParameterStyle::Simple, false, "role,admin,age,7"),
            (ParameterStyle::Simple, true, "role=admin,age=7"),
            (ParameterStyle::Label, false, ".role,admin,age,7"),
            (ParameterStyle::Label, true, ".role=admin.age=7"),
            (ParameterStyle::Matrix, false, ";id=role,admin,age,7"),
            (ParameterStyle::Matrix, true, ";role=admin;age=7"),
        ];
        for (style, explode, raw) in cases {
            let v = decode_value(&path(style, explode, raw), &a, Some(id)).unwrap();
            assert_eq!(v, Some(json!({"role": "admin", "age": 7})), "{style} explode={explode}");
        }
    }

    #[test]
    fn test_escaped_delimiter_survives_split() {
        let (a, id) = arena(json!({"type": "array", "items": {"type": "string"}}));
        let v = decode_value(&path(ParameterStyle::Simple, false, "a%2Cb,c"), &a, Some(id)).unwrap();
        assert_eq!(v, Some(json!(["a,b", "c"])));
    }

    #[test]
    fn test_label_requires_prefix() {
        let (a, id) = arena(json!({"type": "integer"}));
        let err = decode_value(&path(ParameterStyle::Label, false, "5"), &a, Some(id)).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidFormat);
    }

    #[test]
    fn test_header_object_explode() {
        let (a, id) = arena(json!({"type": "object", "properties": {"x": {"type": "integer"}}}));
        let src = HeaderSource { explode: true, raw: Some("x=1, y=two") };
        assert_eq!(
            decode_value(&src, &a, Some(id)).unwrap(),
            Some(json!({"x": 1, "y": "two"}))
        );
        let src = HeaderSource { explode: false, raw: Some("x,1,y,two") };
        assert_eq!(
            decode_value(&src, &a, Some(id)).unwrap(),
            Some(json!({"x": 1, "y": "two"}))
        );
    }

    #[test]
    fn test_cookie_explode_structured_is_unsupported() {
        let (a, id) = arena(json!({"type": "array", "items": {"type": "string"}}));
        let src = CookieSource { name: "c", explode: true, raw: Some("a,b") };
        let err = decode_value(&src, &a, Some(id)).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnsupportedFormat);

        let src = CookieSource { name: "c", explode: false, raw: Some("a,b") };
        assert_eq!(decode_value(&src, &a, Some(id)).unwrap(), Some(json!(["a", "b"])));
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies(["a=1; b=\"two\"", "c"].into_iter());
        assert_eq!(
            cookies,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string()),
                ("c".to_string(), String::new()),
            ]
        );
    }
}
