//! Security requirement checks.
//!
//! The firewall only checks that credentials are present and well formed:
//! it never verifies a token or key. Requirements form an OR of ANDs: the
//! request passes when every scheme of at least one requirement passes.

use crate::decode::{form_decode, ParamSources};
use crate::spec::{ApiKeyLocation, OpenApiDocument, SecurityRequirement, SecurityScheme};

/// Checks one security scheme against a request.
pub trait SecurityProvider: Send + Sync {
    fn validate(&self, scheme: &SecurityScheme, scopes: &[String], req: &ParamSources<'_>) -> bool;
}

/// Presence-only checks:
///
/// - `http` schemes need an `Authorization` header starting with the scheme
///   name (`Basic `, `Bearer `, case-insensitive) followed by a credential.
/// - `apiKey` needs the named header, query parameter or cookie, non-empty.
/// - `oauth2` and `openIdConnect` need a bearer `Authorization` header.
/// - `mutualTLS` is established below HTTP and always passes here.
#[derive(Debug, Default, Clone, Copy)]
pub struct PresenceProvider;

fn has_auth_prefix(req: &ParamSources<'_>, scheme: &str) -> bool {
    let Some(value) = req.header("authorization") else {
        return false;
    };
    let value = value.trim_start();
    let Some((prefix, credential)) = value.split_once(' ') else {
        return false;
    };
    prefix.eq_ignore_ascii_case(scheme) && !credential.trim().is_empty()
}

impl SecurityProvider for PresenceProvider {
    fn validate(&self, scheme: &SecurityScheme, _scopes: &[String], req: &ParamSources<'_>) -> bool {
        match scheme {
            SecurityScheme::Http { scheme } => has_auth_prefix(req, scheme),
            SecurityScheme::OAuth2 | SecurityScheme::OpenIdConnect => has_auth_prefix(req, "bearer"),
            SecurityScheme::ApiKey { name, location } => match location {
                ApiKeyLocation::Header => req.header(name).is_some_and(|v| !v.trim().is_empty()),
                ApiKeyLocation::Query => req
                    .query
                    .first(name)
                    .is_some_and(|v| !form_decode(v).is_empty()),
                ApiKeyLocation::Cookie => req.cookie(name).is_some_and(|v| !v.is_empty()),
            },
            SecurityScheme::MutualTls => true,
        }
    }
}

/// Request field a scheme reads its credential from.
pub fn credential_field(scheme: Option<&SecurityScheme>, scheme_name: &str) -> String {
    match scheme {
        Some(SecurityScheme::ApiKey { name, .. }) => name.clone(),
        Some(SecurityScheme::MutualTls) => scheme_name.to_string(),
        Some(_) => "Authorization".to_string(),
        None => scheme_name.to_string(),
    }
}

/// Evaluate `requirements`; on failure return the credential fields that
/// were missing, in declaration order and without duplicates.
pub fn check_security(
    provider: &dyn SecurityProvider,
    doc: &OpenApiDocument,
    requirements: &[SecurityRequirement],
    req: &ParamSources<'_>,
) -> Result<(), Vec<String>> {
    if requirements.is_empty() {
        return Ok(());
    }
    let mut failed: Vec<String> = Vec::new();
    for requirement in requirements {
        let mut ok = true;
        for (name, scopes) in &requirement.schemes {
            let scheme = doc.security_schemes.get(name);
            let passed = scheme.is_some_and(|s| provider.validate(s, scopes, req));
            if !passed {
                ok = false;
                let field = credential_field(scheme, name);
                if !failed.contains(&field) {
                    failed.push(field);
                }
            }
        }
        if ok {
            return Ok(());
        }
    }
    Err(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::QueryPairs;
    use crate::spec::{parse_document, SpecFormat};
    use crate::validator_cache::ValidatorCache;
    use http::{HeaderMap, HeaderValue};

    const DOC: &str = r#"
openapi: 3.0.3
info: {title: sec, version: "1"}
security:
  - bearerAuth: []
  - apiKey: []
components:
  securitySchemes:
    bearerAuth: {type: http, scheme: bearer}
    basicAuth: {type: http, scheme: basic}
    apiKey: {type: apiKey, in: query, name: api_key}
    session: {type: apiKey, in: cookie, name: sid}
paths:
  /open:
    get:
      security: []
      responses: {"200": {description: ok}}
  /both:
    get:
      security:
        - basicAuth: []
          session: []
      responses: {"200": {description: ok}}
"#;

    fn check(doc: &OpenApiDocument, path: &str, headers: &HeaderMap, query: &str) -> Result<(), Vec<String>> {
        let op = doc.operation(&http::Method::GET, path).unwrap();
        let q = QueryPairs::parse(query);
        let cookies = crate::decode::parse_cookies(
            headers.get_all("cookie").iter().filter_map(|v| v.to_str().ok()),
        );
        let req = ParamSources {
            path: &[],
            query: &q,
            headers,
            cookies: &cookies,
        };
        check_security(&PresenceProvider, doc, doc.effective_security(op), &req)
    }

    #[test]
    fn test_alternatives_and_conjunctions() {
        let cache = ValidatorCache::new();
        let doc = parse_document(DOC.as_bytes(), Some(SpecFormat::Yaml), 1, "1", &cache).unwrap();
        let empty = HeaderMap::new();

        assert!(check(&doc, "/open", &empty, "").is_ok());

        let mut bearer = HeaderMap::new();
        bearer.insert("authorization", HeaderValue::from_static("bearer abc"));
        // /both overrides the document requirements.
        assert_eq!(
            check(&doc, "/both", &bearer, ""),
            Err(vec!["Authorization".to_string(), "sid".to_string()])
        );

        let mut both = HeaderMap::new();
        both.insert("authorization", HeaderValue::from_static("Basic dXNlcjpwdw=="));
        both.insert("cookie", HeaderValue::from_static("sid=42"));
        assert!(check(&doc, "/both", &both, "").is_ok());
    }

    #[test]
    fn test_document_level_requirements() {
        let doc_yaml = DOC.replace("  /open:\n    get:\n      security: []", "  /open:\n    get:");
        let cache = ValidatorCache::new();
        let doc = parse_document(doc_yaml.as_bytes(), Some(SpecFormat::Yaml), 1, "1", &cache).unwrap();

        let empty = HeaderMap::new();
        assert_eq!(
            check(&doc, "/open", &empty, ""),
            Err(vec!["Authorization".to_string(), "api_key".to_string()])
        );
        assert!(check(&doc, "/open", &empty, "api_key=k").is_ok());
        assert!(check(&doc, "/open", &empty, "api_key=").is_err());

        let mut wrong = HeaderMap::new();
        wrong.insert("authorization", HeaderValue::from_static("Token abc"));
        assert!(check(&doc, "/open", &wrong, "").is_err());
        let mut bare = HeaderMap::new();
        bare.insert("authorization", HeaderValue::from_static("Bearer "));
        assert!(check(&doc, "/open", &bare, "").is_err());
    }
}
