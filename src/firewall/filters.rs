//! Checks that run before schema validation and can block a request outright.

use super::request::FirewallRequest;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    Continue,
    /// Stop validating and answer the whole request with `status`.
    Block { status: u16 },
}

/// A pre-validation hook run once per schema worker.
pub trait RequestFilter: Send + Sync + fmt::Debug {
    fn check(&self, _schema_id: i64, _req: &FirewallRequest) -> FilterOutcome {
        FilterOutcome::Continue
    }
}

/// Lets through only clients whose address is listed.
///
/// The address is read from `header` when set (first entry of a
/// comma-separated list, as proxies append), else the peer address.
#[derive(Debug, Clone)]
pub struct IpAllowlistFilter {
    allowed: HashSet<IpAddr>,
    header: Option<String>,
    status: u16,
}

impl IpAllowlistFilter {
    pub fn new(allowed: impl IntoIterator<Item = IpAddr>, header: Option<String>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            header,
            status: 403,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    fn client_ip(&self, req: &FirewallRequest) -> Option<IpAddr> {
        match &self.header {
            Some(name) => req
                .headers
                .get(name.as_str())?
                .to_str()
                .ok()?
                .split(',')
                .next()?
                .trim()
                .parse()
                .ok(),
            None => req.remote_addr,
        }
    }
}

impl RequestFilter for IpAllowlistFilter {
    fn check(&self, schema_id: i64, req: &FirewallRequest) -> FilterOutcome {
        match self.client_ip(req) {
            Some(ip) if self.allowed.contains(&ip) => FilterOutcome::Continue,
            ip => {
                debug!(schema_id, client_ip = ?ip, "client not in allow-list");
                FilterOutcome::Block { status: self.status }
            }
        }
    }
}

/// Blocks requests presenting a revoked token.
///
/// A `Bearer ` prefix on the header value is ignored.
#[derive(Debug, Clone)]
pub struct TokenDenylistFilter {
    header: String,
    denied: HashSet<String>,
    status: u16,
}

impl TokenDenylistFilter {
    pub fn new(header: impl Into<String>, denied: impl IntoIterator<Item = String>) -> Self {
        Self {
            header: header.into(),
            denied: denied.into_iter().collect(),
            status: 403,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

impl RequestFilter for TokenDenylistFilter {
    fn check(&self, schema_id: i64, req: &FirewallRequest) -> FilterOutcome {
        let denied = req
            .headers
            .get_all(self.header.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|v| {
                v.strip_prefix("Bearer ")
                    .or_else(|| v.strip_prefix("bearer "))
                    .unwrap_or(v)
                    .trim()
            })
            .any(|token| self.denied.contains(token));
        if denied {
            debug!(schema_id, header = %self.header, "denied token presented");
            FilterOutcome::Block { status: self.status }
        } else {
            FilterOutcome::Continue
        }
    }
}
