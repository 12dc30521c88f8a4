use super::pool::{BufferPool, PooledBuffer};
use crate::body::{decode_content_encoding, sniff, BodyError};
use crate::decode::{parse_cookies, QueryPairs};
use crate::validator::RequestView;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::net::IpAddr;

/// Header carrying the comma-separated schema IDs a request is checked against.
pub const SCHEMA_ID_HEADER: &str = "x-wallarm-schema-id";

/// A buffered HTTP request as received by the firewall.
#[derive(Debug, Clone)]
pub struct FirewallRequest {
    pub method: Method,
    /// Raw (still escaped) path.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub remote_addr: Option<IpAddr>,
}

impl FirewallRequest {
    pub fn builder(method: Method, target: &str) -> FirewallRequestBuilder {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        FirewallRequestBuilder {
            inner: FirewallRequest {
                method,
                path: path.to_string(),
                query: query.to_string(),
                headers: HeaderMap::new(),
                body: Vec::new(),
                remote_addr: None,
            },
        }
    }

    /// Remove the schema selector header and parse it.
    ///
    /// `None` when the header is missing, empty, or holds anything but
    /// integers.
    pub fn take_schema_ids(&mut self) -> Option<Vec<i64>> {
        let value = self.headers.remove(SCHEMA_ID_HEADER)?;
        parse_schema_ids(value.to_str().ok()?)
    }
}

/// Parse `"1, 2,3"` into schema IDs.
pub fn parse_schema_ids(raw: &str) -> Option<Vec<i64>> {
    let ids: Option<Vec<i64>> = raw
        .split(',')
        .map(|s| s.trim().parse::<i64>().ok())
        .collect();
    ids.filter(|ids| !ids.is_empty())
}

#[derive(Debug)]
pub struct FirewallRequestBuilder {
    inner: FirewallRequest,
}

impl FirewallRequestBuilder {
    /// Append a header; invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.inner.headers.append(n, v);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.inner.body = body.into();
        self
    }

    pub fn remote_addr(mut self, addr: IpAddr) -> Self {
        self.inner.remote_addr = Some(addr);
        self
    }

    pub fn build(self) -> FirewallRequest {
        self.inner
    }
}

/// Request material parsed once and shared read-only by every schema worker.
#[derive(Debug)]
pub struct PreparedRequest {
    pub method: Method,
    pub path: String,
    pub query: QueryPairs,
    pub headers: HeaderMap,
    pub cookies: Vec<(String, String)>,
    /// `Content-Type` header, or the sniffed type for an untyped body.
    pub content_type: Option<String>,
    body: PooledBuffer,
    has_body: bool,
}

impl PreparedRequest {
    /// Parse query and cookies, undo `Content-Encoding` and settle the
    /// content type.
    pub fn prepare(req: &FirewallRequest, pool: &BufferPool, max_body_size: usize) -> Result<Self, BodyError> {
        let mut body = pool.acquire();
        let has_body = !req.body.is_empty();
        if has_body {
            if req.body.len() > max_body_size {
                return Err(BodyError::TooLarge { limit: max_body_size });
            }
            let encoding = req
                .headers
                .get_all(CONTENT_ENCODING)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(",");
            decode_content_encoding(&encoding, &req.body, max_body_size, &mut body)?;
        }

        let content_type = match req.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            Some(ct) => Some(ct.to_string()),
            None if has_body => Some(sniff(&body).to_string()),
            None => None,
        };
        let cookies = parse_cookies(req.headers.get_all(COOKIE).iter().filter_map(|v| v.to_str().ok()));

        Ok(Self {
            method: req.method.clone(),
            path: req.path.clone(),
            query: QueryPairs::parse(&req.query),
            headers: req.headers.clone(),
            cookies,
            content_type,
            body,
            has_body,
        })
    }

    /// Decoded body bytes, if the request carried a body.
    pub fn body(&self) -> Option<&[u8]> {
        self.has_body.then_some(&self.body[..])
    }

    pub fn view(&self) -> RequestView<'_> {
        RequestView {
            query: &self.query,
            headers: &self.headers,
            cookies: &self.cookies,
            content_type: self.content_type.as_deref(),
            body: self.body(),
        }
    }
}
