use super::request::read_request;
use super::response::{write_empty, write_probe, write_report};
use crate::firewall::{FirewallResponse, Orchestrator};
use crate::store::SharedSnapshot;
use may_minihttp::{HttpService, Request, Response};
use std::io;
use tracing::{debug, warn};

/// API mode: validate the request, answer with the verdict, forward nothing.
///
/// - missing or malformed `X-Wallarm-Schema-ID`: `500`, empty body
/// - a filter blocked the request: the filter's status, empty body
/// - otherwise: `200` with the JSON report
#[derive(Debug, Clone)]
pub struct ApiModeService {
    orchestrator: Orchestrator,
}

impl ApiModeService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

impl HttpService for ApiModeService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let mut request = match read_request(req, self.orchestrator.config().max_body_size) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to read request");
                write_empty(res, 500);
                return Ok(());
            }
        };
        let Some(schema_ids) = request.take_schema_ids() else {
            debug!(path = %request.path, "missing or malformed schema id header");
            write_empty(res, 500);
            return Ok(());
        };

        match self.orchestrator.validate(request, &schema_ids) {
            FirewallResponse::Report(report) => write_report(res, &report),
            FirewallResponse::Blocked(status) => write_empty(res, status),
        }
        Ok(())
    }
}

/// Liveness and readiness probes on their own listener.
#[derive(Debug, Clone)]
pub struct HealthService {
    snapshot: SharedSnapshot,
}

impl HealthService {
    pub fn new(snapshot: SharedSnapshot) -> Self {
        Self { snapshot }
    }

    /// Status code and state for a probe path; `None` for unknown paths.
    pub fn probe(&self, method: &str, path: &str) -> Option<(u16, &'static str)> {
        if method != "GET" {
            return None;
        }
        match path.split('?').next().unwrap_or_default() {
            "/v1/liveness" => Some((200, "ok")),
            "/v1/readiness" if self.snapshot.load().store.is_ready() => Some((200, "ready")),
            "/v1/readiness" => Some((500, "not ready")),
            _ => None,
        }
    }
}

impl HttpService for HealthService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        match self.probe(req.method(), req.path()) {
            Some((status, state)) => write_probe(res, status, state),
            None => write_empty(res, 404),
        }
        Ok(())
    }
}
