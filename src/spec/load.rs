use super::build::build_document;
use super::types::{OpenApiDocument, SchemaDialect};
use crate::validator_cache::ValidatorCache;
use oas3::OpenApiV3Spec;
use serde_json::Value;

/// Serialization of a raw document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Yaml,
    Json,
}

impl SpecFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(SpecFormat::Yaml),
            "json" => Some(SpecFormat::Json),
            _ => None,
        }
    }

    /// Guess from the first non-blank byte; JSON documents open with `{`.
    pub fn sniff(raw: &[u8]) -> Self {
        let body = strip_bom(raw);
        match body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => SpecFormat::Json,
            _ => SpecFormat::Yaml,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecFormat::Yaml => "yaml",
            SpecFormat::Json => "json",
        }
    }
}

/// Failure to turn raw bytes into an [`OpenApiDocument`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpecError {
    #[error("schema {schema_id} (version {version:?}): parse error: {reason}")]
    Parse {
        schema_id: i64,
        version: String,
        reason: String,
    },
    #[error("schema {schema_id} (version {version:?}): validation error: {reason}")]
    Validate {
        schema_id: i64,
        version: String,
        reason: String,
    },
    #[error("schema {schema_id} (version {version:?}): unreadable catalog row: {reason}")]
    Record {
        schema_id: i64,
        version: String,
        reason: String,
    },
}

impl SpecError {
    pub fn schema_id(&self) -> i64 {
        match self {
            SpecError::Parse { schema_id, .. }
            | SpecError::Validate { schema_id, .. }
            | SpecError::Record { schema_id, .. } => *schema_id,
        }
    }
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn strip_bom(raw: &[u8]) -> &[u8] {
    raw.strip_prefix(UTF8_BOM).unwrap_or(raw)
}

fn strip_unknown_verbs(val: &mut Value) {
    const METHODS: [&str; 8] = [
        "get", "post", "put", "delete", "patch", "options", "head", "trace",
    ];

    if let Some(Value::Object(paths_map)) = val.get_mut("paths") {
        for item in paths_map.values_mut() {
            if let Value::Object(obj) = item {
                obj.retain(|k, _| {
                    let lk = k.to_ascii_lowercase();
                    match lk.as_str() {
                        "summary" | "description" | "servers" | "parameters" | "$ref" => true,
                        m if METHODS.contains(&m) => true,
                        _ => k.starts_with("x-"),
                    }
                });
            }
        }
    }
}

/// Copy of the document with every schema object replaced by `{}`.
///
/// The structural check only looks at the OpenAPI object model; schemas are
/// checked by compiling them, and `example`/`default` values are never checked.
fn skeleton(val: &Value) -> Value {
    match val {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "example" | "examples"))
                .map(|(k, v)| {
                    let v = match k.as_str() {
                        "schema" if v.is_object() => Value::Object(Default::default()),
                        "schemas" => match v {
                            Value::Object(named) => Value::Object(
                                named
                                    .keys()
                                    .map(|n| (n.clone(), Value::Object(Default::default())))
                                    .collect(),
                            ),
                            other => other.clone(),
                        },
                        _ => skeleton(v),
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(list) => Value::Array(list.iter().map(skeleton).collect()),
        other => other.clone(),
    }
}

fn dialect_of(openapi: &str) -> Option<SchemaDialect> {
    if openapi.starts_with("3.0") {
        Some(SchemaDialect::Oas30)
    } else if openapi.starts_with("3.1") {
        Some(SchemaDialect::Oas31)
    } else {
        None
    }
}

/// Parse and validate one OpenAPI document.
///
/// `schema_id` and `version` only annotate errors. A UTF-8 BOM is tolerated.
pub fn parse_document(
    raw: &[u8],
    format: Option<SpecFormat>,
    schema_id: i64,
    version: &str,
    cache: &ValidatorCache,
) -> Result<OpenApiDocument, SpecError> {
    let parse_err = |reason: String| SpecError::Parse {
        schema_id,
        version: version.to_string(),
        reason,
    };
    let validate_err = |reason: String| SpecError::Validate {
        schema_id,
        version: version.to_string(),
        reason,
    };

    let body = strip_bom(raw);
    let format = format.unwrap_or_else(|| SpecFormat::sniff(body));
    let mut value: Value = match format {
        SpecFormat::Json => serde_json::from_slice(body).map_err(|e| parse_err(e.to_string()))?,
        // YAML is a superset of JSON, so a mislabelled JSON document still parses.
        SpecFormat::Yaml => serde_yaml::from_slice(body).map_err(|e| parse_err(e.to_string()))?,
    };
    if !value.is_object() {
        return Err(parse_err("document root is not a mapping".to_string()));
    }

    strip_unknown_verbs(&mut value);

    let openapi = value
        .get("openapi")
        .and_then(Value::as_str)
        .ok_or_else(|| validate_err("missing `openapi` version field".to_string()))?
        .to_string();
    let dialect = dialect_of(&openapi)
        .ok_or_else(|| validate_err(format!("unsupported openapi version {openapi:?}")))?;

    let _structure: OpenApiV3Spec =
        serde_json::from_value(skeleton(&value)).map_err(|e| validate_err(e.to_string()))?;

    build_document(&value, openapi, dialect, cache).map_err(|e| validate_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PETSTORE: &str = r#"
openapi: 3.0.3
info: {title: Petstore, version: "1"}
servers:
  - url: https://example.com/api/v1/
paths:
  /pet/{id}:
    get:
      parameters:
        - {name: id, in: path, required: true, schema: {type: integer, example: "not an int"}}
      responses:
        "200": {description: ok}
"#;

    #[test]
    fn test_strip_unknown_verbs() {
        let mut v = json!({
            "paths": {
                "/x": { "get": {}, "patch": {}, "unknown": {}, "x-ext": 1 }
            }
        });
        strip_unknown_verbs(&mut v);
        assert!(v["paths"]["/x"].get("unknown").is_none());
        assert!(v["paths"]["/x"].get("x-ext").is_some());
    }

    #[test]
    fn test_parse_yaml_with_bom_and_bad_example() {
        let mut raw = UTF8_BOM.to_vec();
        raw.extend_from_slice(PETSTORE.as_bytes());
        let cache = ValidatorCache::new();
        let doc = parse_document(&raw, Some(SpecFormat::Yaml), 1, "v1", &cache).unwrap();
        assert_eq!(doc.title, "Petstore");
        assert_eq!(doc.base_path, "/api/v1");
        assert_eq!(doc.operations.len(), 1);
    }

    #[test]
    fn test_parse_error_carries_schema_id() {
        let cache = ValidatorCache::new();
        let err = parse_document(b"{ not json", Some(SpecFormat::Json), 7, "v9", &cache)
            .unwrap_err();
        assert!(matches!(err, SpecError::Parse { schema_id: 7, .. }));
        assert!(err.to_string().contains("v9"));
    }

    #[test]
    fn test_validate_error_on_swagger2() {
        let cache = ValidatorCache::new();
        let err = parse_document(
            br#"{"swagger": "2.0", "info": {"title": "t", "version": "1"}, "paths": {}}"#,
            None,
            3,
            "v",
            &cache,
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::Validate { schema_id: 3, .. }));
    }

    #[test]
    fn test_sniff_format() {
        assert_eq!(SpecFormat::sniff(b"  {\"openapi\": 1}"), SpecFormat::Json);
        assert_eq!(SpecFormat::sniff(b"openapi: 3.0.0"), SpecFormat::Yaml);
    }
}
