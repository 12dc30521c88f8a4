use super::*;
use crate::decode::{parse_cookies, QueryPairs};
use crate::router::{RouteLookup, Router};
use crate::spec::{parse_document, OpenApiDocument, SpecFormat};
use crate::validator_cache::ValidatorCache;
use http::{HeaderMap, HeaderValue, Method};

const PETSTORE: &str = r##"
openapi: 3.0.1
info: {title: petstore, version: "1"}
paths:
  /pet:
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema: {$ref: "#/components/schemas/Pet"}
          application/x-www-form-urlencoded:
            schema: {$ref: "#/components/schemas/Pet"}
      responses: {"200": {description: ok}}
  /pet/findByStatus:
    get:
      parameters:
        - name: status
          in: query
          required: true
          schema: {type: string, enum: [available, pending, sold]}
        - name: limit
          in: query
          schema: {type: integer, default: 20, maximum: 100}
      responses: {"200": {description: ok}}
  /pet/findByIds:
    get:
      parameters:
        - name: ids
          in: query
          required: true
          explode: false
          schema: {type: array, items: {type: integer}}
      responses: {"200": {description: ok}}
  /pet/{petId}:
    get:
      parameters:
        - {name: petId, in: path, required: true, schema: {type: integer, minimum: 1}}
        - {name: X-Request-ID, in: header, required: true, schema: {type: string, pattern: "^[0-9a-f]+$"}}
        - {name: session, in: cookie, schema: {type: integer}}
      responses: {"200": {description: ok}}
  /c:
    get:
      parameters:
        - name: f
          in: query
          style: deepObject
          schema:
            type: object
            required: [a, b]
            properties: {a: {type: integer}, b: {type: integer}}
      responses: {"200": {description: ok}}
components:
  schemas:
    Pet:
      type: object
      required: [name, photoUrls]
      properties:
        id: {type: integer}
        name: {type: string}
        photoUrls: {type: array, items: {type: string}}
"##;

fn doc() -> OpenApiDocument {
    let cache = ValidatorCache::new();
    parse_document(PETSTORE.as_bytes(), Some(SpecFormat::Yaml), 7, "v3", &cache).unwrap()
}

struct Req {
    method: Method,
    path: &'static str,
    query: QueryPairs,
    headers: HeaderMap,
    content_type: Option<&'static str>,
    body: Option<&'static [u8]>,
}

impl Req {
    fn get(path: &'static str, query: &str) -> Self {
        Self {
            method: Method::GET,
            path,
            query: QueryPairs::parse(query),
            headers: HeaderMap::new(),
            content_type: None,
            body: None,
        }
    }

    fn post(path: &'static str, content_type: &'static str, body: &'static [u8]) -> Self {
        Self {
            method: Method::POST,
            content_type: Some(content_type),
            body: Some(body),
            ..Self::get(path, "")
        }
    }

    fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.append(name, HeaderValue::from_static(value));
        self
    }
}

fn run(validator: &RequestValidator, doc: &OpenApiDocument, req: &Req) -> Verdict {
    let router = Router::from_document(doc).unwrap();
    let RouteLookup::Found(route) = router.find(&req.method, req.path) else {
        panic!("no route for {}", req.path);
    };
    let cookies = parse_cookies(req.headers.get_all("cookie").iter().filter_map(|v| v.to_str().ok()));
    let view = RequestView {
        query: &req.query,
        headers: &req.headers,
        cookies: &cookies,
        content_type: req.content_type,
        body: req.body,
    };
    validator.validate(7, "v3", doc, &route, &view)
}

fn errors(v: Verdict) -> Vec<ValidationError> {
    match v {
        Verdict::Forbidden(errors) => errors,
        other => panic!("expected forbidden, got {other:?}"),
    }
}

#[test]
fn test_missing_required_query_parameter() {
    let d = doc();
    let errs = errors(run(&RequestValidator::new(Default::default()), &d, &Req::get("/pet/findByStatus", "")));
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].code, ErrorCode::RequiredQueryParameterMissed);
    assert_eq!(errs[0].related_fields, vec!["status"]);
    assert_eq!(errs[0].schema_id, 7);
    assert_eq!(errs[0].schema_version.as_deref(), Some("v3"));
}

#[test]
fn test_wrong_integer_in_array() {
    let d = doc();
    let errs = errors(run(
        &RequestValidator::new(Default::default()),
        &d,
        &Req::get("/pet/findByIds", "ids=1,notAnInt"),
    ));
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].code, ErrorCode::RequiredQueryParameterInvalidValue);
    let detail = &errs[0].related_fields_details[0];
    assert_eq!(detail.name, "ids");
    assert_eq!(detail.expected_type.as_deref(), Some("integer"));
    assert_eq!(detail.current_value.as_deref(), Some("notAnInt"));
}

#[test]
fn test_missing_required_body_field() {
    let d = doc();
    let errs = errors(run(
        &RequestValidator::new(Default::default()),
        &d,
        &Req::post("/pet", "application/json", br#"{"name":"Bahama"}"#),
    ));
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].code, ErrorCode::RequiredBodyParameterMissed);
    assert_eq!(errs[0].related_fields, vec!["photoUrls"]);
}

#[test]
fn test_multi_mode_lists_each_missing_body_field_once() {
    let d = doc();
    let multi = RequestValidator::new(ValidationOptions {
        multi_errors: true,
        ..Default::default()
    });
    let errs = errors(run(&multi, &d, &Req::post("/pet", "application/json", b"{}")));
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].code, ErrorCode::RequiredBodyParameterMissed);
    assert_eq!(errs[0].related_fields, vec!["name", "photoUrls"]);
}

#[test]
fn test_body_presence_parse_and_content_type() {
    let d = doc();
    let v = RequestValidator::new(Default::default());

    let mut missing = Req::post("/pet", "application/json", b"");
    missing.body = None;
    assert_eq!(errors(run(&v, &d, &missing))[0].code, ErrorCode::RequiredBodyMissed);

    let broken = Req::post("/pet", "application/json", b"{\"name\":");
    assert_eq!(errors(run(&v, &d, &broken))[0].code, ErrorCode::RequiredBodyParseError);

    let unsupported = Req::post("/pet", "text/csv", b"name\nx\n");
    assert!(matches!(run(&v, &d, &unsupported), Verdict::Internal(_)));

    let form = Req::post("/pet", "application/x-www-form-urlencoded", b"name=rex&photoUrls=a&photoUrls=b");
    assert_eq!(run(&v, &d, &form), Verdict::Ok { rewritten_query: None });
}

#[test]
fn test_path_header_and_cookie_parameters() {
    let d = doc();
    let v = RequestValidator::new(ValidationOptions {
        multi_errors: true,
        ..Default::default()
    });

    let ok = Req::get("/pet/5", "").header("x-request-id", "beef").header("cookie", "session=3");
    assert!(matches!(run(&v, &d, &ok), Verdict::Ok { .. }));

    let bad = Req::get("/pet/0", "").header("cookie", "session=abc");
    let mut codes: Vec<_> = errors(run(&v, &d, &bad)).into_iter().map(|e| e.code).collect();
    codes.sort_by_key(|c| c.as_str());
    assert_eq!(
        codes,
        vec![
            ErrorCode::RequiredCookieParameterInvalidValue,
            ErrorCode::RequiredHeaderMissed,
            ErrorCode::RequiredPathParameterInvalidValue,
        ]
    );

    let pattern = Req::get("/pet/5", "").header("x-request-id", "XYZ");
    let errs = errors(run(&v, &d, &pattern));
    assert_eq!(errs[0].code, ErrorCode::RequiredHeaderInvalidValue);
    assert_eq!(errs[0].related_fields_details[0].pattern.as_deref(), Some("^[0-9a-f]+$"));
}

#[test]
fn test_single_error_mode_reports_one_error_per_parameter() {
    let d = doc();
    let req = Req::get("/c", "f[c]=1");

    let errs = errors(run(&RequestValidator::new(Default::default()), &d, &req));
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].code, ErrorCode::RequiredQueryParameterMissed);
    assert_eq!(errs[0].related_fields, vec!["f"]);

    let multi = RequestValidator::new(ValidationOptions {
        multi_errors: true,
        ..Default::default()
    });
    assert_eq!(errors(run(&multi, &d, &req)).len(), 2);
}

#[test]
fn test_bound_reported_as_pattern() {
    let d = doc();
    let v = RequestValidator::new(Default::default());
    let errs = errors(run(&v, &d, &Req::get("/pet/findByStatus", "status=sold&limit=500")));
    assert_eq!(errs[0].related_fields, vec!["limit"]);
    assert_eq!(errs[0].related_fields_details[0].pattern.as_deref(), Some("<=100.0000"));
}

#[test]
fn test_query_defaults_only_with_opt_in() {
    let d = doc();
    let req = Req::get("/pet/findByStatus", "status=sold");
    let plain = RequestValidator::new(Default::default());
    assert_eq!(run(&plain, &d, &req), Verdict::Ok { rewritten_query: None });

    let rewriting = RequestValidator::new(ValidationOptions {
        apply_query_defaults: true,
        ..Default::default()
    });
    assert_eq!(
        run(&rewriting, &d, &req),
        Verdict::Ok {
            rewritten_query: Some("status=sold&limit=20".to_string())
        }
    );
}

#[test]
fn test_unknown_parameters_only_when_enabled() {
    let d = doc();
    let req = Req::get("/pet/findByStatus", "status=sold&unknown=test");
    assert!(matches!(
        run(&RequestValidator::new(Default::default()), &d, &req),
        Verdict::Ok { .. }
    ));
    let v = RequestValidator::new(ValidationOptions {
        unknown_parameters: true,
        ..Default::default()
    });
    let errs = errors(run(&v, &d, &req));
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].code, ErrorCode::UnknownParameterFound);
    assert_eq!(errs[0].related_fields, vec!["unknown"]);
    assert_eq!(errs[0].related_fields_details[0].expected_type.as_deref(), Some("string"));
}

#[test]
fn test_same_request_same_report() {
    let d = doc();
    let v = RequestValidator::new(ValidationOptions {
        multi_errors: true,
        unknown_parameters: true,
        ..Default::default()
    });
    let req = Req::get("/pet/findByStatus", "status=lost&limit=x&z=1");
    assert_eq!(run(&v, &d, &req), run(&v, &d, &req));
}
