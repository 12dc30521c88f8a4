use super::{BodyContext, BodyDecoder, BodyError, DecodedBody};
use crate::decode::{parse_primitive, property_schema};
use crate::spec::{SchemaArena, SchemaId, SchemaType};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

const MEDIA: &str = "application/xml";
const TEXT_KEY: &str = "#text";
const ATTR_PREFIX: char = '-';

/// `application/xml`, `text/xml` and `*/*+xml`.
///
/// Elements become objects keyed by child name, attributes are stored under
/// `-name` and mixed text under `#text`; an element with only text becomes a
/// string. Repeated children turn into arrays. A document with exactly one
/// root element is collapsed to that element's value. Text leaves are then
/// coerced to the types the schema declares.
#[derive(Debug, Default)]
pub struct XmlDecoder;

struct Frame {
    name: String,
    map: Map<String, Value>,
    text: String,
}

fn attributes(start: &BytesStart<'_>) -> Result<Map<String, Value>, BodyError> {
    let mut map = Map::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| BodyError::malformed(MEDIA, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| BodyError::malformed(MEDIA, e))?;
        map.insert(format!("{ATTR_PREFIX}{key}"), Value::String(value.into_owned()));
    }
    Ok(map)
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn finish(frame: Frame) -> (String, Value) {
    let text = frame.text.trim().to_string();
    if frame.map.is_empty() {
        return (frame.name, Value::String(text));
    }
    let mut map = frame.map;
    if !text.is_empty() {
        map.insert(TEXT_KEY.to_string(), Value::String(text));
    }
    (frame.name, Value::Object(map))
}

fn attach(parent: &mut Map<String, Value>, name: String, value: Value) {
    match parent.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let prev = existing.take();
            *existing = Value::Array(vec![prev, value]);
        }
        None => {
            parent.insert(name, value);
        }
    }
}

/// Parse an XML document into its JSON shape, before coercion.
pub fn xml_to_value(body: &[u8]) -> Result<Value, BodyError> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut root = Map::new();
    let mut stack: Vec<Frame> = Vec::new();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| BodyError::malformed(MEDIA, e))?;
        match event {
            Event::Start(start) => stack.push(Frame {
                name: element_name(&start),
                map: attributes(&start)?,
                text: String::new(),
            }),
            Event::Empty(start) => {
                let frame = Frame {
                    name: element_name(&start),
                    map: attributes(&start)?,
                    text: String::new(),
                };
                let (name, value) = finish(frame);
                let parent = stack.last_mut().map_or(&mut root, |f| &mut f.map);
                attach(parent, name, value);
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| BodyError::malformed(MEDIA, e))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    return Err(BodyError::malformed(MEDIA, "unbalanced closing tag"));
                };
                let (name, value) = finish(frame);
                let parent = stack.last_mut().map_or(&mut root, |f| &mut f.map);
                attach(parent, name, value);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(BodyError::malformed(MEDIA, "unexpected end of document"));
    }
    if root.is_empty() {
        return Err(BodyError::malformed(MEDIA, "no root element"));
    }
    if root.len() == 1 {
        if let Some((_, only)) = root.into_iter().next() {
            return Ok(only);
        }
        return Ok(Value::Null);
    }
    Ok(Value::Object(root))
}

/// Convert string leaves to the types the schema declares.
///
/// Text that does not parse is left as a string so schema validation
/// reports it against the field.
fn coerce(value: Value, arena: &SchemaArena, id: Option<SchemaId>) -> Value {
    let Some(id) = id else {
        return value;
    };
    let node = arena.get(id);
    if node.has_type(SchemaType::Array) {
        let items = match value {
            Value::Array(items) => items,
            single => vec![single],
        };
        return Value::Array(items.into_iter().map(|v| coerce(v, arena, node.items)).collect());
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let prop = property_schema(arena, node, &k);
                    let v = coerce(v, arena, prop);
                    (k, v)
                })
                .collect(),
        ),
        Value::String(text) => match parse_primitive(&text, arena, Some(id)) {
            Ok(v) => v,
            Err(_) => Value::String(text),
        },
        other => other,
    }
}

impl BodyDecoder for XmlDecoder {
    fn decode(&self, body: &[u8], ctx: &BodyContext<'_>) -> Result<DecodedBody, BodyError> {
        let raw = xml_to_value(body)?;
        let fields = match &raw {
            Value::Object(map) => map
                .keys()
                .filter(|k| !k.starts_with(ATTR_PREFIX) && k.as_str() != TEXT_KEY)
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        let value = coerce(raw, ctx.arena, ctx.media.and_then(|m| m.schema));
        Ok(DecodedBody { value, fields })
    }
}
