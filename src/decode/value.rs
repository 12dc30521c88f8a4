//! Schema-directed conversion of serialized text into JSON values.
//!
//! Each location/style pair implements [`StyleSource`], which knows how to
//! pull a primitive, a list of items or a list of `(property, value)` pairs
//! out of the wire form. [`decode_value`] walks the schema and asks the source
//! for the shape the schema wants.

use super::error::{ParseError, ParseErrorKind};
use crate::spec::{AdditionalProperties, SchemaArena, SchemaId, SchemaNode, SchemaType};
use serde_json::{Map, Number, Value};

/// Wire-format access for one parameter.
///
/// Every method returns `Ok(None)` when the parameter is absent.
pub trait StyleSource {
    fn primitive(&self) -> Result<Option<String>, ParseError>;
    fn array(&self) -> Result<Option<Vec<String>>, ParseError>;
    /// `declared` lists the property names the schema knows, for styles that
    /// look properties up one by one.
    fn object(&self, declared: &[&str]) -> Result<Option<Vec<(String, String)>>, ParseError>;
}

/// Parse one scalar according to the schema's type.
///
/// Without a type the text is kept as a string. Composed schemas try their
/// branches with the same rules as structured values.
pub fn parse_primitive(
    text: &str,
    arena: &SchemaArena,
    id: Option<SchemaId>,
) -> Result<Value, ParseError> {
    let Some(id) = id else {
        return Ok(Value::String(text.to_string()));
    };
    let node = arena.get(id);
    if node.is_composed() && node.types.is_empty() {
        let source = ScalarSource(text);
        return compose(&source, arena, node).map(|v| v.unwrap_or(Value::Null));
    }
    if node.nullable && text.is_empty() && !node.has_type(SchemaType::String) {
        return Ok(Value::Null);
    }
    match node.primary_type() {
        Some(SchemaType::Integer) => parse_integer(text),
        Some(SchemaType::Number) => parse_number(text),
        Some(SchemaType::Boolean) => parse_boolean(text),
        _ => Ok(Value::String(text.to_string())),
    }
}

/// Optional sign followed by decimal digits, surrounding whitespace ignored.
/// Exponents, fractions and values past the 64-bit range are rejected.
pub fn parse_integer(text: &str) -> Result<Value, ParseError> {
    let err = |cause: &str| {
        ParseError::invalid(text, "an invalid integer")
            .with_expected(SchemaType::Integer)
            .with_cause(cause.to_string())
    };
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err("not a decimal integer"));
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(Value::from(i));
    }
    match trimmed.parse::<u64>() {
        Ok(u) => Ok(Value::from(u)),
        Err(_) => Err(err("out of range")),
    }
}

pub fn parse_number(text: &str) -> Result<Value, ParseError> {
    let err = |cause: String| {
        ParseError::invalid(text, "an invalid number")
            .with_expected(SchemaType::Number)
            .with_cause(cause)
    };
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(Value::from(i));
    }
    let f: f64 = trimmed.parse().map_err(|e: std::num::ParseFloatError| err(e.to_string()))?;
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| err("not a finite number".to_string()))
}

pub fn parse_boolean(text: &str) -> Result<Value, ParseError> {
    match text {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        _ => Err(ParseError::invalid(text, "an invalid boolean").with_expected(SchemaType::Boolean)),
    }
}

/// Decode a parameter according to its schema.
pub fn decode_value<S: StyleSource + ?Sized>(
    source: &S,
    arena: &SchemaArena,
    id: Option<SchemaId>,
) -> Result<Option<Value>, ParseError> {
    let Some(id) = id else {
        return Ok(source.primitive()?.map(Value::String));
    };
    let node = arena.get(id);
    if node.is_composed() && node.types.is_empty() {
        return compose(source, arena, node);
    }
    match node.primary_type() {
        Some(SchemaType::Array) => {
            let Some(items) = source.array()? else {
                return Ok(None);
            };
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(parse_primitive(item, arena, node.items).map_err(|e| e.within(i))?);
            }
            Ok(Some(Value::Array(out)))
        }
        Some(SchemaType::Object) => {
            let (declared, _) = arena.declared_properties(id);
            let Some(pairs) = source.object(&declared)? else {
                return Ok(None);
            };
            let mut out = Map::new();
            for (key, text) in pairs {
                let prop = property_schema(arena, node, &key);
                let v = parse_primitive(&text, arena, prop).map_err(|e| e.within(&key))?;
                out.insert(key, v);
            }
            Ok(Some(Value::Object(out)))
        }
        _ => match source.primitive()? {
            Some(text) => parse_primitive(&text, arena, Some(id)).map(Some),
            None => Ok(None),
        },
    }
}

/// Schema of property `key`, following `allOf` branches and
/// `additionalProperties`.
pub fn property_schema(arena: &SchemaArena, node: &SchemaNode, key: &str) -> Option<SchemaId> {
    if let Some(id) = node.property(key) {
        return Some(id);
    }
    for branch in node.all_of.iter().chain(&node.any_of).chain(&node.one_of) {
        if let Some(id) = property_schema(arena, arena.get(*branch), key) {
            return Some(id);
        }
    }
    match node.additional_properties {
        AdditionalProperties::Schema(id) => Some(id),
        _ => None,
    }
}

fn compose<S: StyleSource + ?Sized>(
    source: &S,
    arena: &SchemaArena,
    node: &SchemaNode,
) -> Result<Option<Value>, ParseError> {
    if !node.all_of.is_empty() {
        let mut last = None;
        for branch in &node.all_of {
            match decode_value(source, arena, Some(*branch))? {
                Some(v) => last = Some(v),
                None => return Ok(None),
            }
        }
        return Ok(last);
    }

    if !node.any_of.is_empty() {
        let mut first_err = None;
        for branch in &node.any_of {
            match decode_value(source, arena, Some(*branch)) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        let value = first_err.map(|e| e.value).unwrap_or_default();
        return Err(ParseError::new(
            ParseErrorKind::NoMatch,
            value,
            "value doesn't match any schema from anyOf",
        ));
    }

    let mut matched: Option<Value> = None;
    let mut count = 0usize;
    let mut sample = String::new();
    for branch in &node.one_of {
        match decode_value(source, arena, Some(*branch)) {
            Ok(None) => return Ok(None),
            Ok(Some(v)) if conforms(arena, *branch, &v) => {
                count += 1;
                matched = Some(v);
            }
            Ok(Some(_)) => {}
            Err(e) => {
                if sample.is_empty() {
                    sample = e.value;
                }
            }
        }
    }
    match count {
        1 => Ok(matched),
        0 => Err(ParseError::new(
            ParseErrorKind::NoMatch,
            sample,
            "value doesn't match any schema from oneOf",
        )),
        _ => Err(ParseError::new(
            ParseErrorKind::Ambiguous,
            "",
            "value matches more than one schema from oneOf",
        )),
    }
}

/// Structural check used to disambiguate `oneOf` branches: type, `enum` and
/// `required` only.
pub fn conforms(arena: &SchemaArena, id: SchemaId, value: &Value) -> bool {
    let node = arena.get(id);
    if value.is_null() {
        return node.nullable || node.types.is_empty();
    }
    if !node.types.is_empty() {
        let ok = node.types.iter().any(|t| match t {
            SchemaType::Null => value.is_null(),
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Object => value.is_object(),
            SchemaType::Array => value.is_array(),
            SchemaType::Number => value.is_number(),
            SchemaType::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            SchemaType::String => value.is_string(),
        });
        if !ok {
            return false;
        }
    }
    if let Some(Value::Array(allowed)) = node.json.get("enum") {
        if !allowed.contains(value) {
            return false;
        }
    }
    if let Value::Object(map) = value {
        if node.required.iter().any(|r| !map.contains_key(r)) {
            return false;
        }
        for (key, v) in map {
            if let Some(prop) = node.property(key) {
                if !conforms(arena, prop, v) {
                    return false;
                }
            }
        }
    }
    node.all_of.iter().all(|b| conforms(arena, *b, value))
}

/// A single already-extracted scalar, used when a composed schema appears in
/// primitive position.
struct ScalarSource<'a>(&'a str);

impl StyleSource for ScalarSource<'_> {
    fn primitive(&self) -> Result<Option<String>, ParseError> {
        Ok(Some(self.0.to_string()))
    }

    fn array(&self) -> Result<Option<Vec<String>>, ParseError> {
        Ok(Some(vec![self.0.to_string()]))
    }

    fn object(&self, _declared: &[&str]) -> Result<Option<Vec<(String, String)>>, ParseError> {
        Err(ParseError::invalid(self.0, "an object cannot be nested here"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::schema::ArenaBuilder;
    use crate::spec::SchemaDialect;
    use serde_json::json;

    fn arena(schema: Value) -> (SchemaArena, SchemaId) {
        let doc = json!({});
        let mut b = ArenaBuilder::new(&doc, SchemaDialect::Oas30);
        let id = b.add(&schema).unwrap();
        (b.finish(), id)
    }

    #[test]
    fn test_integer_forms() {
        assert_eq!(parse_integer("42").unwrap(), json!(42));
        assert_eq!(parse_integer(" -7 ").unwrap(), json!(-7));
        assert_eq!(parse_integer("+3").unwrap(), json!(3));
        assert_eq!(parse_integer("18446744073709551615").unwrap(), json!(u64::MAX));
        assert!(parse_integer("4e1").is_err());
        assert!(parse_integer("4.0").is_err());
        assert!(parse_integer("-").is_err());
        assert!(parse_integer("1_000").is_err());
        let err = parse_integer("99999999999999999999").unwrap_err();
        assert_eq!(err.cause.as_deref(), Some("out of range"));
        let err = parse_integer("4.5").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidFormat);
        let err = parse_integer("notAnInt").unwrap_err();
        assert_eq!(err.value, "notAnInt");
        assert_eq!(err.expected, Some(SchemaType::Integer));
        assert!(err.cause.is_some());
    }

    #[test]
    fn test_boolean_is_strict() {
        assert_eq!(parse_boolean("true").unwrap(), json!(true));
        assert!(parse_boolean("True").is_err());
        assert!(parse_boolean("1").is_err());
    }

    #[test]
    fn test_one_of_ambiguous_none_and_single() {
        let (a, id) = arena(json!({"oneOf": [{"type": "integer"}, {"type": "number"}]}));
        let err = parse_primitive("5", &a, Some(id)).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Ambiguous);

        let (a, id) = arena(json!({"oneOf": [{"type": "integer"}, {"type": "boolean"}]}));
        let err = parse_primitive("abc", &a, Some(id)).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::NoMatch);
        assert_eq!(parse_primitive("true", &a, Some(id)).unwrap(), json!(true));
        assert_eq!(parse_primitive("7", &a, Some(id)).unwrap(), json!(7));
    }

    #[test]
    fn test_any_of_first_success_all_of_last() {
        let (a, id) = arena(json!({"anyOf": [{"type": "integer"}, {"type": "string"}]}));
        assert_eq!(parse_primitive("5", &a, Some(id)).unwrap(), json!(5));
        assert_eq!(parse_primitive("x", &a, Some(id)).unwrap(), json!("x"));

        let (a, id) = arena(json!({"allOf": [{"type": "string"}, {"type": "integer"}]}));
        assert_eq!(parse_primitive("5", &a, Some(id)).unwrap(), json!(5));
        assert!(parse_primitive("x", &a, Some(id)).is_err());
    }

    #[test]
    fn test_conforms_checks_required() {
        let (a, id) = arena(json!({"type": "object", "required": ["a"]}));
        assert!(conforms(&a, id, &json!({"a": 1})));
        assert!(!conforms(&a, id, &json!({"b": 1})));
    }
}
