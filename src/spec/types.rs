use super::schema::{SchemaArena, SchemaId};
use crate::validator_cache::CompiledSchema;
use http::Method;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Where a parameter is carried in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(ParameterLocation::Path),
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            "cookie" => Some(ParameterLocation::Cookie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        }
    }

    /// Serialization style OpenAPI assumes when a parameter omits `style`.
    pub fn default_style(&self) -> ParameterStyle {
        match self {
            ParameterLocation::Path | ParameterLocation::Header => ParameterStyle::Simple,
            ParameterLocation::Query | ParameterLocation::Cookie => ParameterStyle::Form,
        }
    }

    /// Styles a parameter in this location may declare.
    pub fn allows_style(&self, style: ParameterStyle) -> bool {
        use ParameterStyle as S;
        match self {
            ParameterLocation::Path => matches!(style, S::Simple | S::Label | S::Matrix),
            ParameterLocation::Query => matches!(
                style,
                S::Form | S::SpaceDelimited | S::PipeDelimited | S::DeepObject
            ),
            ParameterLocation::Header => matches!(style, S::Simple),
            ParameterLocation::Cookie => matches!(style, S::Form),
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OpenAPI parameter serialization style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterStyle {
    Matrix,
    Label,
    Form,
    Simple,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl ParameterStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matrix" => Some(ParameterStyle::Matrix),
            "label" => Some(ParameterStyle::Label),
            "form" => Some(ParameterStyle::Form),
            "simple" => Some(ParameterStyle::Simple),
            "spaceDelimited" => Some(ParameterStyle::SpaceDelimited),
            "pipeDelimited" => Some(ParameterStyle::PipeDelimited),
            "deepObject" => Some(ParameterStyle::DeepObject),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParameterStyle::Matrix => "matrix",
            ParameterStyle::Label => "label",
            ParameterStyle::Form => "form",
            ParameterStyle::Simple => "simple",
            ParameterStyle::SpaceDelimited => "spaceDelimited",
            ParameterStyle::PipeDelimited => "pipeDelimited",
            ParameterStyle::DeepObject => "deepObject",
        };
        f.write_str(s)
    }
}

/// Parameter declared through `content` instead of `schema`.
#[derive(Debug, Clone)]
pub struct ParameterContent {
    pub media_type: String,
    pub schema: Option<SchemaId>,
}

/// A fully resolved operation parameter.
///
/// `style` and `explode` already carry the OpenAPI defaults for the location,
/// so decoders never need to re-derive them.
#[derive(Debug, Clone)]
pub struct ParameterMeta {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub style: ParameterStyle,
    pub explode: bool,
    pub allow_empty_value: bool,
    pub schema: Option<SchemaId>,
    pub content: Option<ParameterContent>,
    /// Validator for the decoded value (schema or content schema).
    pub validator: Option<Arc<CompiledSchema>>,
}

impl ParameterMeta {
    /// Schema used for decoding, whichever of `schema`/`content` declared it.
    pub fn effective_schema(&self) -> Option<SchemaId> {
        self.schema
            .or_else(|| self.content.as_ref().and_then(|c| c.schema))
    }
}

/// Per-property serialization override inside a request body media type.
#[derive(Debug, Clone, Default)]
pub struct EncodingMeta {
    pub content_type: Option<String>,
    pub style: Option<ParameterStyle>,
    pub explode: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct MediaTypeMeta {
    /// Media range as written in the document (`application/json`, `image/*`, ...).
    pub media_type: String,
    pub schema: Option<SchemaId>,
    pub encoding: BTreeMap<String, EncodingMeta>,
    pub validator: Option<Arc<CompiledSchema>>,
}

#[derive(Debug, Clone)]
pub struct RequestBodyMeta {
    pub required: bool,
    /// Declaration order is kept so wildcard ranges resolve deterministically.
    pub content: Vec<MediaTypeMeta>,
}

impl RequestBodyMeta {
    /// Find the declared media range matching a concrete request media type.
    ///
    /// Exact match wins, then `type/*`, then `*/*`.
    pub fn media_for(&self, essence: &str) -> Option<&MediaTypeMeta> {
        let essence = essence.to_ascii_lowercase();
        if let Some(m) = self
            .content
            .iter()
            .find(|m| m.media_type.eq_ignore_ascii_case(&essence))
        {
            return Some(m);
        }
        let top = essence.split('/').next().unwrap_or_default();
        let wildcard = format!("{top}/*");
        if let Some(m) = self
            .content
            .iter()
            .find(|m| m.media_type.eq_ignore_ascii_case(&wildcard))
        {
            return Some(m);
        }
        self.content.iter().find(|m| m.media_type == "*/*")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

/// Security scheme reduced to what presence checks need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityScheme {
    ApiKey {
        name: String,
        location: ApiKeyLocation,
    },
    /// `http` scheme; `scheme` is lowercased (`basic`, `bearer`, ...).
    Http { scheme: String },
    OAuth2,
    OpenIdConnect,
    MutualTls,
}

/// One entry of a `security` array: every named scheme must pass (AND).
/// Alternatives across entries are OR-ed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRequirement {
    pub schemes: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub method: Method,
    /// Path template as written under `paths`.
    pub path: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<ParameterMeta>,
    pub request_body: Option<RequestBodyMeta>,
    /// `None` inherits document security; `Some(vec![])` disables it.
    pub security: Option<Vec<SecurityRequirement>>,
}

impl Operation {
    pub fn parameters_in(
        &self,
        location: ParameterLocation,
    ) -> impl Iterator<Item = &ParameterMeta> + '_ {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }
}

/// JSON Schema dialect the document's schemas are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaDialect {
    /// OpenAPI 3.0.x: Draft 4 superset with `nullable`.
    Oas30,
    /// OpenAPI 3.1.x: JSON Schema 2020-12.
    Oas31,
}

/// A parsed and validated OpenAPI document.
///
/// Schemas live in a single arena addressed by [`SchemaId`]; dropping the
/// document frees every schema, operation and compiled validator at once.
#[derive(Debug)]
pub struct OpenApiDocument {
    pub title: String,
    pub openapi: String,
    pub dialect: SchemaDialect,
    /// Path component of `servers[0].url`, without trailing slash.
    pub base_path: String,
    pub operations: Vec<Arc<Operation>>,
    pub security: Vec<SecurityRequirement>,
    pub security_schemes: BTreeMap<String, SecurityScheme>,
    pub schemas: SchemaArena,
}

impl OpenApiDocument {
    /// Security requirements that apply to `op`.
    pub fn effective_security<'a>(&'a self, op: &'a Operation) -> &'a [SecurityRequirement] {
        match &op.security {
            Some(reqs) => reqs,
            None => &self.security,
        }
    }

    pub fn operation(&self, method: &Method, path: &str) -> Option<&Arc<Operation>> {
        self.operations
            .iter()
            .find(|op| &op.method == method && op.path == path)
    }
}
