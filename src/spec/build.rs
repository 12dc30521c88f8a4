use super::schema::{ArenaBuilder, SchemaArena, SchemaRefError};
use super::types::{
    ApiKeyLocation, EncodingMeta, MediaTypeMeta, OpenApiDocument, Operation, ParameterContent,
    ParameterLocation, ParameterMeta, ParameterStyle, RequestBodyMeta, SchemaDialect,
    SecurityRequirement, SecurityScheme,
};
use crate::validator_cache::{CompileError, ValidatorCache};
use http::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const METHODS: [(&str, Method); 8] = [
    ("get", Method::GET),
    ("put", Method::PUT),
    ("post", Method::POST),
    ("delete", Method::DELETE),
    ("options", Method::OPTIONS),
    ("head", Method::HEAD),
    ("patch", Method::PATCH),
    ("trace", Method::TRACE),
];

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Ref(#[from] SchemaRefError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{location}: {reason}")]
    Invalid { location: String, reason: String },
}

fn invalid(location: impl Into<String>, reason: impl Into<String>) -> BuildError {
    BuildError::Invalid {
        location: location.into(),
        reason: reason.into(),
    }
}

/// Path component of the first server URL, trailing slash removed.
///
/// Server variables are substituted with their defaults before parsing.
pub fn base_path(doc: &Value) -> String {
    let Some(server) = doc
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
    else {
        return String::new();
    };
    let mut url_str = server
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if let Some(vars) = server.get("variables").and_then(Value::as_object) {
        for (name, var) in vars {
            let default = var.get("default").and_then(Value::as_str).unwrap_or_default();
            url_str = url_str.replace(&format!("{{{name}}}"), default);
        }
    }
    url::Url::parse(&url_str)
        .or_else(|_| url::Url::parse(&format!("http://dummy{url_str}")))
        .map(|u| {
            let p = u.path().trim_end_matches('/');
            if p == "/" || p.is_empty() {
                String::new()
            } else {
                urlencoding::decode(p)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| p.to_string())
            }
        })
        .unwrap_or_default()
}

fn parse_security(value: Option<&Value>) -> Option<Vec<SecurityRequirement>> {
    let list = value?.as_array()?;
    Some(
        list.iter()
            .filter_map(Value::as_object)
            .map(|req| SecurityRequirement {
                schemes: req
                    .iter()
                    .map(|(name, scopes)| {
                        let scopes = scopes
                            .as_array()
                            .map(|s| s.iter().filter_map(Value::as_str).map(str::to_string).collect())
                            .unwrap_or_default();
                        (name.clone(), scopes)
                    })
                    .collect(),
            })
            .collect(),
    )
}

/// Extract `components.securitySchemes`.
pub fn extract_security_schemes(
    doc: &Value,
    arena: &ArenaBuilder<'_>,
) -> Result<BTreeMap<String, SecurityScheme>, BuildError> {
    let mut out = BTreeMap::new();
    let Some(schemes) = doc
        .pointer("/components/securitySchemes")
        .and_then(Value::as_object)
    else {
        return Ok(out);
    };
    for (name, raw) in schemes {
        let scheme = arena.deref(raw)?;
        let location = format!("securitySchemes.{name}");
        let kind = scheme.get("type").and_then(Value::as_str).unwrap_or_default();
        let parsed = match kind {
            "apiKey" => {
                let key = scheme
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(&location, "apiKey scheme without `name`"))?;
                let loc = match scheme.get("in").and_then(Value::as_str) {
                    Some("header") => ApiKeyLocation::Header,
                    Some("query") => ApiKeyLocation::Query,
                    Some("cookie") => ApiKeyLocation::Cookie,
                    other => return Err(invalid(&location, format!("apiKey `in` {other:?}"))),
                };
                SecurityScheme::ApiKey {
                    name: key.to_string(),
                    location: loc,
                }
            }
            "http" => SecurityScheme::Http {
                scheme: scheme
                    .get("scheme")
                    .and_then(Value::as_str)
                    .unwrap_or("basic")
                    .to_ascii_lowercase(),
            },
            "oauth2" => SecurityScheme::OAuth2,
            "openIdConnect" => SecurityScheme::OpenIdConnect,
            "mutualTLS" => SecurityScheme::MutualTls,
            other => return Err(invalid(&location, format!("unknown scheme type {other:?}"))),
        };
        out.insert(name.clone(), parsed);
    }
    Ok(out)
}

fn extract_parameters(
    arena: &mut ArenaBuilder<'_>,
    params: Option<&Value>,
    location: &str,
    out: &mut Vec<ParameterMeta>,
) -> Result<(), BuildError> {
    let Some(list) = params.and_then(Value::as_array) else {
        return Ok(());
    };
    for raw in list {
        let param = arena.deref(raw)?;
        let name = param
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(location, "parameter without `name`"))?;
        let loc_str = param.get("in").and_then(Value::as_str).unwrap_or_default();
        let loc = ParameterLocation::parse(loc_str)
            .ok_or_else(|| invalid(location, format!("parameter {name}: bad `in` {loc_str:?}")))?;
        let style = match param.get("style").and_then(Value::as_str) {
            Some(s) => ParameterStyle::parse(s)
                .filter(|st| loc.allows_style(*st))
                .ok_or_else(|| {
                    invalid(location, format!("parameter {name}: style {s:?} not allowed in {loc}"))
                })?,
            None => loc.default_style(),
        };
        let explode = param
            .get("explode")
            .and_then(Value::as_bool)
            .unwrap_or(style == ParameterStyle::Form);
        let schema = match param.get("schema") {
            Some(s) => Some(arena.add(s)?),
            None => None,
        };
        let content = match param.get("content").and_then(Value::as_object) {
            Some(map) => match map.iter().next() {
                Some((media_type, media)) => Some(ParameterContent {
                    media_type: media_type.clone(),
                    schema: match media.get("schema") {
                        Some(s) => Some(arena.add(s)?),
                        None => None,
                    },
                }),
                None => None,
            },
            None => None,
        };
        let meta = ParameterMeta {
            name: name.to_string(),
            location: loc,
            required: loc == ParameterLocation::Path
                || param.get("required").and_then(Value::as_bool).unwrap_or(false),
            style,
            explode,
            allow_empty_value: param
                .get("allowEmptyValue")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            schema,
            content,
            validator: None,
        };
        // Operation level overrides path-item level by (name, in).
        match out
            .iter_mut()
            .find(|p| p.name == meta.name && p.location == meta.location)
        {
            Some(existing) => *existing = meta,
            None => out.push(meta),
        }
    }
    Ok(())
}

fn extract_request_body(
    arena: &mut ArenaBuilder<'_>,
    body: Option<&Value>,
) -> Result<Option<RequestBodyMeta>, BuildError> {
    let Some(raw) = body else {
        return Ok(None);
    };
    let body = arena.deref(raw)?;
    let mut content = Vec::new();
    if let Some(map) = body.get("content").and_then(Value::as_object) {
        for (media_type, media) in map {
            let schema = match media.get("schema") {
                Some(s) => Some(arena.add(s)?),
                None => None,
            };
            let mut encoding = BTreeMap::new();
            if let Some(enc) = media.get("encoding").and_then(Value::as_object) {
                for (prop, e) in enc {
                    encoding.insert(
                        prop.clone(),
                        EncodingMeta {
                            content_type: e.get("contentType").and_then(Value::as_str).map(str::to_string),
                            style: e.get("style").and_then(Value::as_str).and_then(ParameterStyle::parse),
                            explode: e.get("explode").and_then(Value::as_bool),
                        },
                    );
                }
            }
            content.push(MediaTypeMeta {
                media_type: media_type.to_ascii_lowercase(),
                schema,
                encoding,
                validator: None,
            });
        }
    }
    Ok(Some(RequestBodyMeta {
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
        content,
    }))
}

fn attach_validators(
    op: &mut Operation,
    arena: &SchemaArena,
    dialect: SchemaDialect,
    cache: &ValidatorCache,
) -> Result<(), BuildError> {
    for p in &mut op.parameters {
        if let Some(id) = p.effective_schema() {
            p.validator = Some(cache.get_or_compile(dialect, arena.compile_root(id))?);
        }
    }
    if let Some(body) = &mut op.request_body {
        for media in &mut body.content {
            if let Some(id) = media.schema {
                media.validator = Some(cache.get_or_compile(dialect, arena.compile_root(id))?);
            }
        }
    }
    Ok(())
}

/// Build the document model from an already parsed and checked JSON tree.
pub fn build_document(
    doc: &Value,
    openapi: String,
    dialect: SchemaDialect,
    cache: &ValidatorCache,
) -> Result<OpenApiDocument, BuildError> {
    let mut arena = ArenaBuilder::new(doc, dialect);
    let security_schemes = extract_security_schemes(doc, &arena)?;
    let mut operations = Vec::new();

    if let Some(paths) = doc.get("paths").and_then(Value::as_object) {
        for (path, raw_item) in paths {
            let item = arena.deref(raw_item)?;
            for (verb, method) in &METHODS {
                let Some(op) = item.get(*verb) else {
                    continue;
                };
                let location = format!("{path} {}", method.as_str());
                let mut parameters = Vec::new();
                extract_parameters(&mut arena, item.get("parameters"), &location, &mut parameters)?;
                extract_parameters(&mut arena, op.get("parameters"), &location, &mut parameters)?;
                let request_body = extract_request_body(&mut arena, op.get("requestBody"))?;
                operations.push(Operation {
                    method: method.clone(),
                    path: path.clone(),
                    operation_id: op.get("operationId").and_then(Value::as_str).map(str::to_string),
                    parameters,
                    request_body,
                    security: parse_security(op.get("security")),
                });
            }
        }
    }

    let schemas = arena.finish();
    for op in &mut operations {
        attach_validators(op, &schemas, dialect, cache)?;
    }
    debug!(
        operations = operations.len(),
        schemas = schemas.len(),
        "built OpenAPI document"
    );

    Ok(OpenApiDocument {
        title: doc
            .pointer("/info/title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        openapi,
        dialect,
        base_path: base_path(doc),
        operations: operations.into_iter().map(Arc::new).collect(),
        security: parse_security(doc.get("security")).unwrap_or_default(),
        security_schemes,
        schemas,
    })
}
