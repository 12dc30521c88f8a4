//! Translation of JSON Schema failures into report fields.

use super::errors::FieldDetail;
use crate::validator_cache::CompiledSchema;
use jsonschema::error::ValidationErrorKind;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// A `required` property is absent.
    Missed,
    Invalid,
}

/// One failing schema rule, mapped onto the request field it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub kind: IssueKind,
    /// Dotted field path; empty for the body root.
    pub field: String,
    pub message: String,
    pub detail: FieldDetail,
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// `prefix.seg1.seg2` from a JSON pointer.
fn field_path(prefix: &str, pointer: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !prefix.is_empty() {
        parts.push(prefix.to_string());
    }
    parts.extend(pointer.split('/').skip(1).map(unescape));
    parts.join(".")
}

fn join_field(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
    }
}

/// Text of a scalar for `current_value`; strings are unquoted.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Array(list) => list
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .map(str::to_string),
        _ => None,
    }
}

/// `pattern` source, or a bound formatted as `>=x.xxxx` / `<=x.xxxx`.
fn pattern_detail(compiled: &CompiledSchema, keyword: &str, schema_path: &str) -> Option<String> {
    let value = compiled.keyword_value(schema_path)?;
    match keyword {
        "pattern" => value.as_str().map(str::to_string),
        "minimum" => value.as_f64().map(|n| format!(">={n:.4}")),
        "maximum" => value.as_f64().map(|n| format!("<={n:.4}")),
        _ => None,
    }
}

/// Validate `value` and map each failure onto a field.
///
/// `prefix` names the root (a parameter name, or empty for a body). With
/// `multi` unset only the first failing field is reported. `fallback_type` fills
/// `expected_type` when the failing subschema declares no `type`.
pub fn schema_issues(
    compiled: &CompiledSchema,
    value: &Value,
    prefix: &str,
    multi: bool,
    fallback_type: Option<&str>,
) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();
    for err in compiled.validator().iter_errors(value) {
        let instance_ptr = err.instance_path().to_string();
        let schema_ptr = err.schema_path().to_string();
        let (parent, keyword) = schema_ptr.rsplit_once('/').unwrap_or(("", schema_ptr.as_str()));
        let field = field_path(prefix, &instance_ptr);
        let instance = value.pointer(&instance_ptr);
        let message = err.to_string();

        match err.kind() {
            ValidationErrorKind::Required { property } => {
                let Some(name) = property.as_str() else { continue };
                let field = join_field(&field, name);
                issues.push(SchemaIssue {
                    kind: IssueKind::Missed,
                    detail: FieldDetail::new(field.clone()),
                    field,
                    message,
                });
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                for name in unexpected {
                    let field = join_field(&field, name);
                    issues.push(SchemaIssue {
                        kind: IssueKind::Invalid,
                        detail: FieldDetail::new(field.clone()),
                        field,
                        message: message.clone(),
                    });
                    if !multi {
                        break;
                    }
                }
            }
            _ => {
                let expected = compiled
                    .keyword_value(&format!("{parent}/type"))
                    .and_then(type_name)
                    .or_else(|| fallback_type.filter(|_| instance_ptr.is_empty()).map(str::to_string));
                let detail = FieldDetail::new(field.clone())
                    .expected_type(expected)
                    .pattern(pattern_detail(compiled, keyword, &schema_ptr))
                    .current_value(instance.map(value_text));
                issues.push(SchemaIssue {
                    kind: IssueKind::Invalid,
                    field,
                    message,
                    detail,
                });
            }
        }
        if !multi && !issues.is_empty() {
            break;
        }
    }
    issues
}
