//! Requests validated through the orchestrator against a multi-feature
//! document: parameter styles, security, encoded and non-JSON bodies,
//! composition and query rewriting.

use api_firewall::catalog::{CatalogLoad, CatalogVersion, SpecRecord};
use api_firewall::firewall::{FirewallRequest, FirewallResponse, Orchestrator, OrchestratorConfig};
use api_firewall::spec::SpecFormat;
use api_firewall::store::{SharedSnapshot, Snapshot, SpecStore};
use api_firewall::validator::{ErrorCode, RequestValidator, ValidationOptions};
use api_firewall::ValidationReport;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::Method;
use std::io::Write;

mod common;
use common::specs::{PETSTORE, ROOT_ONLY};
use common::test_server::setup_may_runtime;

const SHOP: &str = r##"
openapi: 3.0.3
info: {title: shop, version: "4.2"}
components:
  securitySchemes:
    key: {type: apiKey, in: header, name: X-API-Key}
  schemas:
    Pet:
      type: object
      required: [name, photoUrls]
      properties:
        name: {type: string}
        photoUrls: {type: array, items: {type: string}}
paths:
  /store/{ids}:
    get:
      parameters:
        - name: ids
          in: path
          required: true
          style: label
          schema: {type: array, items: {type: integer}}
      responses: {"200": {description: ok}}
  /search:
    get:
      parameters:
        - name: filter
          in: query
          style: deepObject
          explode: true
          schema:
            type: object
            properties:
              min: {type: integer}
              tag: {type: string}
        - name: limit
          in: query
          schema: {type: integer, default: 20}
      responses: {"200": {description: ok}}
  /secure:
    get:
      security: [{key: []}]
      responses: {"200": {description: ok}}
  /pet:
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema: {$ref: "#/components/schemas/Pet"}
          application/xml:
            schema: {$ref: "#/components/schemas/Pet"}
      responses: {"200": {description: ok}}
  /upload:
    post:
      requestBody:
        content:
          multipart/form-data:
            schema:
              type: object
              required: [id]
              properties:
                id: {type: integer}
                file: {type: string, format: binary}
      responses: {"200": {description: ok}}
  /shape:
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema:
              oneOf:
                - type: object
                  properties:
                    a: {type: integer}
                - type: object
                  required: [b]
      responses: {"200": {description: ok}}
"##;

fn snapshot() -> SharedSnapshot {
    let records = vec![
        SpecRecord::new(1, "4.2", SpecFormat::Yaml, SHOP.as_bytes().to_vec(), None),
        SpecRecord::new(2, "1.0.0", SpecFormat::Yaml, PETSTORE.as_bytes().to_vec(), None),
        SpecRecord::new(3, "1", SpecFormat::Yaml, ROOT_ONLY.as_bytes().to_vec(), None),
    ];
    let store = SpecStore::from_catalog(CatalogLoad {
        version: CatalogVersion::V1,
        records,
        rejected: Vec::new(),
    });
    assert_eq!(store.schema_ids(), vec![1, 2, 3], "{:?}", store.load_errors());
    Snapshot::build(store).into_shared()
}

fn firewall(options: ValidationOptions, max_errors: usize) -> Orchestrator {
    setup_may_runtime();
    let config = OrchestratorConfig {
        max_errors,
        stack_size: 0x8000,
        ..Default::default()
    };
    Orchestrator::new(snapshot(), RequestValidator::new(options), config)
}

fn report(orch: &Orchestrator, req: FirewallRequest, ids: &[i64]) -> ValidationReport {
    match orch.validate(req, ids) {
        FirewallResponse::Report(r) => r,
        FirewallResponse::Blocked(s) => panic!("unexpected block {s}"),
    }
}

fn status(orch: &Orchestrator, req: FirewallRequest) -> (u16, Vec<ErrorCode>) {
    let r = report(orch, req, &[1]);
    (r.status_of(1).unwrap(), r.errors.iter().map(|e| e.code).collect())
}

fn get(target: &str) -> FirewallRequest {
    FirewallRequest::builder(Method::GET, target).build()
}

fn post(target: &str, content_type: &str, body: impl Into<Vec<u8>>) -> FirewallRequest {
    FirewallRequest::builder(Method::POST, target)
        .header("content-type", content_type)
        .body(body)
        .build()
}

#[test]
fn test_label_path_parameter() {
    let fw = firewall(Default::default(), 0);
    assert_eq!(status(&fw, get("/store/.1,2,3")), (200, vec![]));
    assert_eq!(
        status(&fw, get("/store/.1,x")),
        (403, vec![ErrorCode::RequiredPathParameterInvalidValue])
    );
}

#[test]
fn test_deep_object_query() {
    let fw = firewall(Default::default(), 0);
    assert_eq!(status(&fw, get("/search?filter[min]=3&filter[tag]=x")).0, 200);
    assert_eq!(
        status(&fw, get("/search?filter[min]=abc")),
        (403, vec![ErrorCode::RequiredQueryParameterInvalidValue])
    );
}

#[test]
fn test_api_key_presence() {
    let fw = firewall(Default::default(), 0);
    assert_eq!(
        status(&fw, get("/secure")),
        (403, vec![ErrorCode::RequiredSecurityRequirementsFailed])
    );
    let with_key = FirewallRequest::builder(Method::GET, "/secure")
        .header("x-api-key", "k-123")
        .build();
    assert_eq!(status(&fw, with_key).0, 200);
}

#[test]
fn test_gzip_json_body() {
    let fw = firewall(Default::default(), 0);
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(br#"{"name":"rex","photoUrls":["a"]}"#).unwrap();
    let compressed = enc.finish().unwrap();

    let req = FirewallRequest::builder(Method::POST, "/pet")
        .header("content-type", "application/json")
        .header("content-encoding", "gzip")
        .body(compressed)
        .build();
    assert_eq!(status(&fw, req), (200, vec![]));
}

#[test]
fn test_xml_body() {
    let fw = firewall(Default::default(), 0);
    let ok = post(
        "/pet",
        "application/xml",
        "<pet><name>Rex</name><photoUrls>a</photoUrls><photoUrls>b</photoUrls></pet>",
    );
    assert_eq!(status(&fw, ok), (200, vec![]));

    let missing = post("/pet", "application/xml", "<pet><name>Rex</name></pet>");
    assert_eq!(status(&fw, missing), (403, vec![ErrorCode::RequiredBodyParameterMissed]));

    let broken = post("/pet", "application/xml", "<pet><name>Rex</pet>");
    assert_eq!(status(&fw, broken), (403, vec![ErrorCode::RequiredBodyParseError]));
}

#[test]
fn test_multipart_body() {
    let fw = firewall(Default::default(), 0);
    let body = "--XyZ\r\n\
Content-Disposition: form-data; name=\"id\"\r\n\r\n\
42\r\n--XyZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\n\
hello\r\n--XyZ--\r\n";
    let ok = post("/upload", "multipart/form-data; boundary=XyZ", body);
    assert_eq!(status(&fw, ok), (200, vec![]));

    let bad = post("/upload", "multipart/form-data; boundary=XyZ", body.replace("42", "forty-two"));
    assert_eq!(status(&fw, bad), (403, vec![ErrorCode::RequiredBodyParseError]));

    let only_file = "--XyZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\n\
hello\r\n--XyZ--\r\n";
    let missing = post("/upload", "multipart/form-data; boundary=XyZ", only_file);
    assert_eq!(status(&fw, missing), (403, vec![ErrorCode::RequiredBodyParameterMissed]));
}

#[test]
fn test_one_of_needs_exactly_one_match() {
    let fw = firewall(Default::default(), 0);
    assert_eq!(status(&fw, post("/shape", "application/json", r#"{"a":1}"#)).0, 200);
    assert_eq!(status(&fw, post("/shape", "application/json", r#"{"a":1,"b":2}"#)).0, 403);
    assert_eq!(status(&fw, post("/shape", "application/json", r#"{"a":"x"}"#)).0, 403);
}

#[test]
fn test_unsupported_body_type_is_internal() {
    let fw = firewall(Default::default(), 0);
    let r = report(&fw, post("/pet", "text/csv", "name\nrex\n"), &[1]);
    assert_eq!(r.status_of(1), Some(500));
    assert!(r.errors.is_empty());
}

#[test]
fn test_query_defaults_are_reported() {
    let fw = firewall(
        ValidationOptions {
            apply_query_defaults: true,
            ..Default::default()
        },
        0,
    );
    let r = report(&fw, get("/search?filter[min]=1"), &[1]);
    assert_eq!(r.summary[0].status_code, 200);
    assert_eq!(
        r.summary[0].rewritten_query.as_deref(),
        Some("filter%5Bmin%5D=1&limit=20")
    );
}

#[test]
fn test_verdicts_per_schema() {
    let fw = firewall(Default::default(), 0);
    let r = report(&fw, get("/pet/findByStatus"), &[2, 3, 1]);

    let statuses: Vec<_> = r.summary.iter().map(|s| (s.schema_id, s.status_code)).collect();
    assert_eq!(statuses, vec![(2, 403), (3, 403), (1, 403)]);

    let mut by_schema: Vec<_> = r.errors.iter().map(|e| (e.schema_id, e.code)).collect();
    by_schema.sort_by_key(|(id, _)| *id);
    assert_eq!(
        by_schema,
        vec![
            (1, ErrorCode::MethodAndPathNotFound),
            (2, ErrorCode::RequiredQueryParameterMissed),
            (3, ErrorCode::MethodAndPathNotFound),
        ]
    );
    let versions: Vec<_> = r
        .errors
        .iter()
        .filter(|e| e.schema_id == 1)
        .map(|e| e.schema_version.as_deref())
        .collect();
    assert_eq!(versions, vec![Some("4.2")]);
}

#[test]
fn test_error_cap_samples() {
    let options = ValidationOptions {
        multi_errors: true,
        unknown_parameters: true,
        ..Default::default()
    };
    let uncapped = firewall(options.clone(), 0);
    let capped = firewall(options, 2);
    let target = "/search?filter[min]=x&limit=y&a=1&b=2&c=3";

    let all = report(&uncapped, get(target), &[1]);
    assert!(all.errors.len() > 2, "{all:?}");
    let some = report(&capped, get(target), &[1]);
    assert_eq!(some.errors.len(), 2);
    assert!(some.errors.iter().all(|e| all.errors.contains(e)));
    assert_eq!(some.status_of(1), Some(403));
}
