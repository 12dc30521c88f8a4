use crate::firewall::FirewallRequest;
use http::Method;
use may_minihttp::Request;
use std::io::{self, Read};
use tracing::debug;

/// Why a request could not be buffered.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("invalid method {0:?}")]
    Method(String),
    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),
    #[error("reading request body: {0}")]
    Io(#[from] io::Error),
}

/// Buffer a `may_minihttp` request into a [`FirewallRequest`].
///
/// Reads at most `max_body_size + 1` bytes so an oversized body is detected
/// without consuming it all.
pub fn read_request(req: Request, max_body_size: usize) -> Result<FirewallRequest, ReadError> {
    let method = req.method().to_string();
    let target = req.path().to_string();
    let headers: Vec<(String, Vec<u8>)> = req
        .headers()
        .iter()
        .map(|h| (h.name.to_string(), h.value.to_vec()))
        .collect();

    let mut body = Vec::new();
    req.body()
        .take(max_body_size as u64 + 1)
        .read_to_end(&mut body)?;

    let built = build_request(&method, &target, headers.iter().map(|(n, v)| (n.as_str(), v.as_slice())), body, max_body_size)?;
    debug!(
        method = %built.method,
        path = %built.path,
        headers = built.headers.len(),
        body_bytes = built.body.len(),
        "request buffered"
    );
    Ok(built)
}

/// Assemble a request from its raw parts.
///
/// Headers whose value is not visible ASCII are kept only if `http` accepts
/// the bytes.
pub fn build_request<'a>(
    method: &str,
    target: &str,
    headers: impl IntoIterator<Item = (&'a str, &'a [u8])>,
    body: Vec<u8>,
    max_body_size: usize,
) -> Result<FirewallRequest, ReadError> {
    if body.len() > max_body_size {
        return Err(ReadError::TooLarge(max_body_size));
    }
    let method = Method::from_bytes(method.as_bytes()).map_err(|_| ReadError::Method(method.to_string()))?;
    let mut req = FirewallRequest::builder(method, target).body(body).build();
    for (name, value) in headers {
        if let (Ok(n), Ok(v)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_bytes(value),
        ) {
            req.headers.append(n, v);
        }
    }
    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_splits_target() {
        let req = build_request(
            "POST",
            "/pets/1?x=1&y=%20",
            [("Content-Type", &b"application/json"[..]), ("X-Multi", &b"a"[..]), ("X-Multi", &b"b"[..])],
            b"{}".to_vec(),
            16,
        )
        .unwrap();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.path, "/pets/1");
        assert_eq!(req.query, "x=1&y=%20");
        assert_eq!(req.headers.get_all("x-multi").iter().count(), 2);
        assert_eq!(req.body, b"{}");
    }

    #[test]
    fn test_build_request_limits() {
        assert!(matches!(
            build_request("GET", "/", std::iter::empty(), vec![0; 17], 16),
            Err(ReadError::TooLarge(16))
        ));
        assert!(matches!(
            build_request("G E T", "/", std::iter::empty(), Vec::new(), 16),
            Err(ReadError::Method(_))
        ));
    }
}
