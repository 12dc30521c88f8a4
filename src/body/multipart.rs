use super::{media_essence, BodyContext, BodyDecoder, BodyError, DecodedBody};
use crate::decode::{parse_primitive, property_schema};
use crate::spec::{SchemaId, SchemaType};
use serde_json::{Map, Value};

const MEDIA: &str = "multipart/form-data";

/// One part of a multipart body, borrowing its data from the body buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part<'a> {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: &'a [u8],
}

/// Lazy iterator over the parts of an already buffered multipart body.
///
/// Parsing stops at the first malformed part; the error is yielded once and
/// the iterator is exhausted afterwards.
#[derive(Debug)]
pub struct Parts<'a> {
    body: &'a [u8],
    delimiter: Vec<u8>,
    pos: usize,
    done: bool,
}

fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }
    hay.windows(needle.len()).position(|w| w == needle)
}

/// Length of the part headers and of the blank line ending them. Bare `\n`
/// line breaks are accepted as well as `\r\n`.
fn header_end(hay: &[u8]) -> Option<(usize, usize)> {
    let crlf = find(hay, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(hay, b"\n\n").map(|i| (i, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
        (a, b) => a.or(b),
    }
}

fn header_params(value: &str) -> impl Iterator<Item = (String, String)> + '_ {
    value.split(';').skip(1).filter_map(|p| {
        let (k, v) = p.trim().split_once('=')?;
        Some((k.trim().to_ascii_lowercase(), v.trim().trim_matches('"').to_string()))
    })
}

impl<'a> Parts<'a> {
    pub fn new(body: &'a [u8], boundary: &str) -> Self {
        Self {
            body,
            delimiter: format!("--{boundary}").into_bytes(),
            pos: 0,
            done: false,
        }
    }

    fn fail(&mut self, reason: &str) -> Option<Result<Part<'a>, BodyError>> {
        self.done = true;
        Some(Err(BodyError::malformed(MEDIA, reason)))
    }
}

impl<'a> Iterator for Parts<'a> {
    type Item = Result<Part<'a>, BodyError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let body = self.body;
        let Some(start) = find(&body[self.pos..], &self.delimiter) else {
            return self.fail("missing boundary");
        };
        let mut cur = self.pos + start + self.delimiter.len();
        if body[cur..].starts_with(b"--") {
            self.done = true;
            return None;
        }
        if body[cur..].starts_with(b"\r\n") {
            cur += 2;
        } else if body[cur..].starts_with(b"\n") {
            cur += 1;
        }

        let Some((head_len, blank_len)) = header_end(&body[cur..]) else {
            return self.fail("unterminated part headers");
        };
        let head = String::from_utf8_lossy(&body[cur..cur + head_len]);
        let data_start = cur + head_len + blank_len;

        let mut closing = b"\n".to_vec();
        closing.extend_from_slice(&self.delimiter);
        let Some(nl) = find(&body[data_start..], &closing) else {
            return self.fail("missing closing boundary");
        };
        self.pos = data_start + nl + 1;
        let data_end = match body[data_start..data_start + nl].last() {
            Some(b'\r') => data_start + nl - 1,
            _ => data_start + nl,
        };

        let mut part = Part {
            name: None,
            filename: None,
            content_type: None,
            data: &body[data_start..data_end],
        };
        for line in head.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "content-disposition" => {
                    for (k, v) in header_params(value) {
                        match k.as_str() {
                            "name" => part.name = Some(v),
                            "filename" => part.filename = Some(v),
                            _ => {}
                        }
                    }
                }
                "content-type" => part.content_type = Some(value.to_string()),
                _ => {}
            }
        }
        Some(Ok(part))
    }
}

/// `multipart/form-data`.
///
/// Parts are walked lazily. A part with a JSON content type is decoded
/// through the registry; file parts are kept as strings; other parts are
/// parsed with the property's schema. Array-typed properties collect every
/// part with their name.
#[derive(Debug, Default)]
pub struct MultipartDecoder;

impl MultipartDecoder {
    fn part_value(
        part: &Part<'_>,
        prop: Option<SchemaId>,
        declared_ct: Option<&str>,
        ctx: &BodyContext<'_>,
    ) -> Result<Value, BodyError> {
        let ct = part.content_type.as_deref().or(declared_ct);
        if let Some(ct) = ct {
            let essence = media_essence(ct);
            if essence == "application/json" || essence.ends_with("+json") {
                let nested = BodyContext {
                    content_type: ct,
                    media: None,
                    arena: ctx.arena,
                    registry: ctx.registry,
                };
                return ctx.registry.decode(part.data, &nested).map(|b| b.value);
            }
        }
        let text = String::from_utf8_lossy(part.data);
        if part.filename.is_some() {
            return Ok(Value::String(text.into_owned()));
        }
        parse_primitive(&text, ctx.arena, prop).map_err(|e| BodyError::malformed(MEDIA, e))
    }
}

impl BodyDecoder for MultipartDecoder {
    fn decode(&self, body: &[u8], ctx: &BodyContext<'_>) -> Result<DecodedBody, BodyError> {
        let mime: mime::Mime = ctx
            .content_type
            .parse()
            .map_err(|e| BodyError::malformed(MEDIA, e))?;
        let boundary = mime
            .get_param(mime::BOUNDARY)
            .ok_or_else(|| BodyError::malformed(MEDIA, "missing boundary parameter"))?;

        let arena = ctx.arena;
        let schema = ctx.media.and_then(|m| m.schema);
        let mut out = Map::new();
        let mut fields = Vec::new();

        for part in Parts::new(body, boundary.as_str()) {
            let part = part?;
            let Some(name) = part.name.clone() else {
                continue;
            };
            if !fields.contains(&name) {
                fields.push(name.clone());
            }
            let prop = schema.and_then(|id| property_schema(arena, arena.get(id), &name));
            let is_array = prop.is_some_and(|p| arena.get(p).has_type(SchemaType::Array));
            let item_schema = if is_array {
                prop.and_then(|p| arena.get(p).items)
            } else {
                prop
            };
            let declared_ct = ctx
                .media
                .and_then(|m| m.encoding.get(&name))
                .and_then(|e| e.content_type.as_deref());
            let value = Self::part_value(&part, item_schema, declared_ct, ctx)?;

            if is_array {
                match out.entry(name).or_insert_with(|| Value::Array(Vec::new())) {
                    Value::Array(items) => items.push(value),
                    other => {
                        let prev = other.take();
                        *other = Value::Array(vec![prev, value]);
                    }
                }
            } else {
                out.entry(name).or_insert(value);
            }
        }

        Ok(DecodedBody {
            value: Value::Object(out),
            fields,
        })
    }
}
