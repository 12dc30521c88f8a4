//! Unknown-parameter detection: request fields the operation never declared.

use crate::body::{exploded_fields, media_essence, DecodedBody};
use crate::decode::{base_key, form_decode, parse_integer, parse_number, ParamSources};
use crate::spec::{
    ApiKeyLocation, MediaTypeMeta, OpenApiDocument, Operation, ParameterLocation, ParameterStyle,
    SchemaType, SecurityScheme,
};
use std::collections::HashSet;

/// An undeclared field found in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    pub name: String,
    /// Type guessed from the value.
    pub inferred_type: &'static str,
    pub value: Option<String>,
}

/// Best-effort type of a textual value.
pub fn infer_type(text: &str) -> &'static str {
    if parse_integer(text).is_ok() {
        "integer"
    } else if parse_number(text).is_ok() {
        "number"
    } else if text == "true" || text == "false" {
        "boolean"
    } else {
        "string"
    }
}

fn body_value_type(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Query names the operation accepts: declared parameters, the properties
/// of exploded form objects, and apiKey query credentials.
fn declared_query_names<'a>(doc: &'a OpenApiDocument, op: &'a Operation) -> HashSet<&'a str> {
    let mut names = HashSet::new();
    for param in op.parameters_in(ParameterLocation::Query) {
        names.insert(param.name.as_str());
        if param.explode && param.style == ParameterStyle::Form {
            if let Some(id) = param.effective_schema() {
                if doc.schemas.expected_type(id) == Some(SchemaType::Object) {
                    let (props, _) = doc.schemas.declared_properties(id);
                    names.extend(props);
                }
            }
        }
    }
    for req in doc.effective_security(op) {
        for (scheme_name, _) in &req.schemes {
            if let Some(SecurityScheme::ApiKey {
                name,
                location: ApiKeyLocation::Query,
            }) = doc.security_schemes.get(scheme_name)
            {
                names.insert(name.as_str());
            }
        }
    }
    names
}

/// Query keys the operation does not declare. `name[...]` keys are matched
/// by their bracketed prefix.
pub fn unknown_query(doc: &OpenApiDocument, op: &Operation, req: &ParamSources<'_>) -> Vec<UnknownField> {
    let declared = declared_query_names(doc, op);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (key, raw) in req.query.iter() {
        let base = base_key(key);
        if declared.contains(base) || declared.contains(key) || !seen.insert(key) {
            continue;
        }
        let value = form_decode(raw).into_owned();
        out.push(UnknownField {
            name: key.to_string(),
            inferred_type: infer_type(&value),
            value: Some(value),
        });
    }
    out
}

/// Body fields the media type's schema does not declare.
///
/// Nothing is reported when the schema accepts additional properties or
/// declares no object properties at all. Form bodies also accept the
/// properties of exploded object fields. XML element names compare
/// case-insensitively.
pub fn unknown_body(doc: &OpenApiDocument, media: &MediaTypeMeta, body: &DecodedBody) -> Vec<UnknownField> {
    let Some(id) = media.schema else {
        return Vec::new();
    };
    let (mut declared, open) = doc.schemas.declared_properties(id);
    if open || declared.is_empty() {
        return Vec::new();
    }
    let essence = media_essence(&media.media_type);
    if essence == "application/x-www-form-urlencoded" {
        declared.extend(exploded_fields(&doc.schemas, media));
    }
    let xml = essence.ends_with("/xml") || essence.ends_with("+xml");
    let known = |field: &str| {
        if xml {
            declared.iter().any(|d| d.eq_ignore_ascii_case(field))
        } else {
            declared.contains(&field)
        }
    };
    body.fields
        .iter()
        .filter(|f| !known(f))
        .map(|f| {
            let v = body.value.get(f.as_str());
            UnknownField {
                name: f.clone(),
                inferred_type: v.map_or("string", body_value_type),
                value: v.filter(|v| !v.is_object() && !v.is_array()).map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
            }
        })
        .collect()
}
