use super::errors::{ErrorCode, FieldDetail, ValidationError};
use super::schema::{schema_issues, IssueKind, SchemaIssue};
use super::security::{check_security, PresenceProvider, SecurityProvider};
use super::unknown::{unknown_body, unknown_query, UnknownField};
use crate::body::{media_essence, BodyContext, BodyError, DecodedBody, DecoderRegistry};
use crate::decode::{encode_query_param, ParamDecoder, ParamSources, ParseError, QueryPairs};
use crate::router::RouteMatch;
use crate::spec::{OpenApiDocument, ParameterLocation, ParameterMeta, RequestBodyMeta};
use http::HeaderMap;
use std::sync::Arc;
use tracing::debug;

/// Knobs that change what a validation run reports.
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    pub unknown_parameters: bool,
    /// Report every failing schema rule instead of the first one.
    pub multi_errors: bool,
    /// Add absent query parameters' `default` values to a rewritten query.
    pub apply_query_defaults: bool,
}

/// Borrowed view of a prepared request: everything validation reads.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    pub query: &'a QueryPairs,
    pub headers: &'a HeaderMap,
    pub cookies: &'a [(String, String)],
    /// Effective content type (declared, or sniffed when the header is absent).
    pub content_type: Option<&'a str>,
    /// Body after `Content-Encoding` has been removed.
    pub body: Option<&'a [u8]>,
}

/// Outcome of validating one request against one schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Ok { rewritten_query: Option<String> },
    Forbidden(Vec<ValidationError>),
    /// The firewall could not judge the request.
    Internal(String),
}

impl Verdict {
    pub fn status_code(&self) -> u16 {
        match self {
            Verdict::Ok { .. } => 200,
            Verdict::Forbidden(_) => 403,
            Verdict::Internal(_) => 500,
        }
    }
}

/// Checks a request against the operation it was routed to.
#[derive(Clone)]
pub struct RequestValidator {
    options: ValidationOptions,
    registry: Arc<DecoderRegistry>,
    security: Arc<dyn SecurityProvider>,
}

impl std::fmt::Debug for RequestValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestValidator")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Per-run error sink carrying the schema attribution.
struct Report<'a> {
    schema_id: i64,
    version: &'a str,
    errors: Vec<ValidationError>,
}

impl Report<'_> {
    fn push(&mut self, code: ErrorCode, message: impl Into<String>) -> &mut ValidationError {
        let err = ValidationError::new(code, message, self.schema_id).with_version(self.version);
        self.errors.push(err);
        let last = self.errors.len() - 1;
        &mut self.errors[last]
    }
}

fn location_label(location: ParameterLocation) -> &'static str {
    match location {
        ParameterLocation::Header => "header",
        ParameterLocation::Path => "path parameter",
        ParameterLocation::Query => "query parameter",
        ParameterLocation::Cookie => "cookie parameter",
    }
}

impl RequestValidator {
    pub fn new(options: ValidationOptions) -> Self {
        Self {
            options,
            registry: Arc::new(DecoderRegistry::with_defaults()),
            security: Arc::new(PresenceProvider),
        }
    }

    pub fn with_registry(mut self, registry: Arc<DecoderRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_security_provider(mut self, provider: Arc<dyn SecurityProvider>) -> Self {
        self.security = provider;
        self
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Validate `req`, routed to `route`, against document `doc`.
    pub fn validate(
        &self,
        schema_id: i64,
        version: &str,
        doc: &OpenApiDocument,
        route: &RouteMatch,
        req: &RequestView<'_>,
    ) -> Verdict {
        let op = &route.operation;
        let sources = ParamSources {
            path: &route.path_params,
            query: req.query,
            headers: req.headers,
            cookies: req.cookies,
        };
        let mut report = Report {
            schema_id,
            version,
            errors: Vec::new(),
        };

        if let Err(fields) = check_security(self.security.as_ref(), doc, doc.effective_security(op), &sources) {
            let err = report.push(
                ErrorCode::RequiredSecurityRequirementsFailed,
                format!("security requirements failed: missing credentials in {}", fields.join(", ")),
            );
            err.related_fields = fields;
        }

        let mut defaults: Vec<&ParameterMeta> = Vec::new();
        let ordered = op
            .parameters
            .iter()
            .filter(|p| p.location != ParameterLocation::Query)
            .chain(op.parameters_in(ParameterLocation::Query));
        for param in ordered {
            if let Some(missing_default) = self.check_parameter(doc, param, &sources, &mut report) {
                defaults.push(missing_default);
            }
        }

        let mut decoded_body = None;
        if let Some(body_meta) = &op.request_body {
            match self.check_body(doc, body_meta, req, &mut report) {
                Ok(decoded) => decoded_body = decoded,
                Err(reason) => return Verdict::Internal(reason),
            }
        }

        if self.options.unknown_parameters {
            let mut unknown = unknown_query(doc, op, &sources);
            if let (Some((media_type, body)), Some(body_meta)) = (&decoded_body, &op.request_body) {
                if let Some(media) = body_meta.media_for(media_type) {
                    unknown.extend(unknown_body(doc, media, body));
                }
            }
            for field in unknown {
                push_unknown(&mut report, field);
            }
        }

        if !report.errors.is_empty() {
            debug!(schema_id, errors = report.errors.len(), "request rejected");
            return Verdict::Forbidden(report.errors);
        }

        let rewritten_query = if self.options.apply_query_defaults && !defaults.is_empty() {
            Some(rewrite_query(doc, req.query, &defaults))
        } else {
            None
        };
        Verdict::Ok { rewritten_query }
    }

    /// Decode and validate one parameter. Returns the parameter when it is
    /// absent but declares a default.
    fn check_parameter<'p>(
        &self,
        doc: &OpenApiDocument,
        param: &'p ParameterMeta,
        sources: &ParamSources<'_>,
        report: &mut Report<'_>,
    ) -> Option<&'p ParameterMeta> {
        let arena = &doc.schemas;
        let decoded = ParamDecoder::for_location(param.location).decode(param, sources, arena);
        let value = match decoded {
            Err(e) => {
                push_parse_error(report, doc, param, &e);
                return None;
            }
            Ok(None) => {
                if param.required {
                    push_missed(report, param);
                    return None;
                }
                let has_default = param
                    .effective_schema()
                    .is_some_and(|id| arena.get(id).default.is_some());
                return (has_default && param.location == ParameterLocation::Query).then_some(param);
            }
            Ok(Some(v)) => v,
        };

        if param.required && !param.allow_empty_value && value.as_str() == Some("") {
            push_missed(report, param);
            return None;
        }

        let Some(compiled) = &param.validator else {
            return None;
        };
        let fallback = param
            .effective_schema()
            .and_then(|id| arena.expected_type(id))
            .map(|t| t.as_str());
        let issues = schema_issues(compiled, &value, &param.name, self.options.multi_errors, fallback);
        for issue in issues {
            let code = match issue.kind {
                IssueKind::Missed => ErrorCode::missed(param.location),
                IssueKind::Invalid => ErrorCode::invalid(param.location),
            };
            let SchemaIssue { message, detail, .. } = issue;
            let err = report.push(
                code,
                format!("{} {:?} is invalid: {message}", location_label(param.location), param.name),
            );
            err.related_fields.push(param.name.clone());
            err.related_fields_details.push(FieldDetail {
                name: param.name.clone(),
                ..detail
            });
        }
        None
    }

    /// Decode and validate the request body.
    ///
    /// `Err` carries the reason for an internal failure. On success the
    /// decoded body is returned with the media type it was decoded as.
    fn check_body(
        &self,
        doc: &OpenApiDocument,
        body_meta: &RequestBodyMeta,
        req: &RequestView<'_>,
        report: &mut Report<'_>,
    ) -> Result<Option<(String, DecodedBody)>, String> {
        let body = req.body.filter(|b| !b.is_empty());
        let Some(body) = body else {
            if body_meta.required {
                report.push(ErrorCode::RequiredBodyMissed, "request body is required but missing");
            }
            return Ok(None);
        };
        let content_type = req.content_type.unwrap_or("application/octet-stream");
        let essence = media_essence(content_type);
        let Some(media) = body_meta.media_for(&essence) else {
            return Err(BodyError::UnsupportedContentType(essence).to_string());
        };

        let ctx = BodyContext {
            content_type,
            media: Some(media),
            arena: &doc.schemas,
            registry: &self.registry,
        };
        let decoded = match self.registry.decode(body, &ctx) {
            Ok(d) => d,
            Err(e) if e.is_internal() => return Err(e.to_string()),
            Err(e) => {
                report.push(
                    ErrorCode::RequiredBodyParseError,
                    format!("request body could not be parsed: {e}"),
                );
                return Ok(None);
            }
        };

        if let Some(compiled) = &media.validator {
            let fallback = media
                .schema
                .and_then(|id| doc.schemas.expected_type(id))
                .map(|t| t.as_str());
            let issues = schema_issues(compiled, &decoded.value, "", self.options.multi_errors, fallback);
            let (missed, invalid): (Vec<_>, Vec<_>) =
                issues.into_iter().partition(|i| i.kind == IssueKind::Missed);
            if let Some(first) = missed.first() {
                let message = format!("required body field is missing: {}", first.message);
                let err = report.push(ErrorCode::RequiredBodyParameterMissed, message);
                for issue in &missed {
                    err.related_fields.push(issue.field.clone());
                }
            }
            for issue in invalid {
                let err = report.push(
                    ErrorCode::RequiredBodyParameterInvalidValue,
                    format!("body field has an invalid value: {}", issue.message),
                );
                if !issue.field.is_empty() {
                    err.related_fields.push(issue.field.clone());
                }
                err.related_fields_details.push(issue.detail);
            }
        }
        Ok(Some((essence, decoded)))
    }
}

fn push_missed(report: &mut Report<'_>, param: &ParameterMeta) {
    let err = report.push(
        ErrorCode::missed(param.location),
        format!("{} {:?} is required but missing", location_label(param.location), param.name),
    );
    err.related_fields.push(param.name.clone());
}

fn push_parse_error(report: &mut Report<'_>, doc: &OpenApiDocument, param: &ParameterMeta, e: &ParseError) {
    let expected = e
        .expected
        .or_else(|| param.effective_schema().and_then(|id| doc.schemas.expected_type(id)))
        .map(|t| t.as_str());
    let err = report.push(
        ErrorCode::invalid(param.location),
        format!("{} {:?} has an invalid value: {e}", location_label(param.location), param.name),
    );
    err.related_fields.push(param.name.clone());
    err.related_fields_details.push(
        FieldDetail::new(param.name.clone())
            .expected_type(expected)
            .current_value((!e.value.is_empty()).then(|| e.value.clone())),
    );
}

fn push_unknown(report: &mut Report<'_>, field: UnknownField) {
    let err = report.push(
        ErrorCode::UnknownParameterFound,
        format!("unknown parameter found: {:?}", field.name),
    );
    err.related_fields.push(field.name.clone());
    err.related_fields_details.push(
        FieldDetail::new(field.name)
            .expected_type(Some(field.inferred_type))
            .current_value(field.value),
    );
}

/// The request query with defaults of absent parameters appended.
fn rewrite_query(doc: &OpenApiDocument, query: &QueryPairs, defaults: &[&ParameterMeta]) -> String {
    let mut pairs = query.clone();
    for param in defaults {
        let Some(default) = param
            .effective_schema()
            .and_then(|id| doc.schemas.get(id).default.as_ref())
        else {
            continue;
        };
        for (k, v) in encode_query_param(&param.name, param.style, param.explode, default) {
            pairs.push(k, v);
        }
    }
    pairs.encode()
}
