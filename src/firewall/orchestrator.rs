use super::filters::{FilterOutcome, RequestFilter};
use super::pool::BufferPool;
use super::report::{SchemaSummary, ValidationReport};
use super::request::{FirewallRequest, PreparedRequest};
use crate::router::RouteLookup;
use crate::store::{SharedSnapshot, Snapshot};
use crate::validator::{ErrorCode, RequestValidator, ValidationError, Verdict};
use http::Method;
use may::coroutine;
use may::sync::mpsc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Accept every `OPTIONS` request without validation.
    pub pass_options: bool,
    /// Cap on `errors[]`; `0` keeps every error.
    pub max_errors: usize,
    /// Budget for all schema workers of one request.
    pub timeout: Option<Duration>,
    /// Stack size of validation coroutines.
    pub stack_size: usize,
    pub max_body_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pass_options: false,
            max_errors: 0,
            timeout: None,
            stack_size: 0x10000,
            max_body_size: 4 << 20,
        }
    }
}

/// What the API-mode service answers.
#[derive(Debug, Clone, PartialEq)]
pub enum FirewallResponse {
    Report(ValidationReport),
    /// A filter blocked the request; answer with this status and no body.
    Blocked(u16),
}

/// Result of one schema worker.
#[derive(Debug)]
struct WorkerOutcome {
    verdict: Verdict,
    block: Option<u16>,
}

impl WorkerOutcome {
    fn verdict(verdict: Verdict) -> Self {
        Self { verdict, block: None }
    }
}

/// Shared, read-only inputs of every worker of one request.
struct WorkerContext {
    snapshot: Arc<Snapshot>,
    request: FirewallRequest,
    prepared: PreparedRequest,
    validator: RequestValidator,
    filters: Arc<[Arc<dyn RequestFilter>]>,
    pass_options: bool,
}

/// Fans a request out to one validation worker per schema and merges the
/// verdicts into a report.
#[derive(Clone)]
pub struct Orchestrator {
    snapshot: SharedSnapshot,
    validator: RequestValidator,
    filters: Arc<[Arc<dyn RequestFilter>]>,
    pool: BufferPool,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("validator", &self.validator)
            .field("filters", &self.filters)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(snapshot: SharedSnapshot, validator: RequestValidator, config: OrchestratorConfig) -> Self {
        Self {
            snapshot,
            validator,
            filters: Arc::from(Vec::new()),
            pool: BufferPool::default(),
            config,
        }
    }

    pub fn with_filters(mut self, filters: Vec<Arc<dyn RequestFilter>>) -> Self {
        self.filters = Arc::from(filters);
        self
    }

    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn snapshot(&self) -> &SharedSnapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate `req` against every schema in `schema_ids`.
    ///
    /// The summary lists each distinct ID once, in selector order.
    pub fn validate(&self, req: FirewallRequest, schema_ids: &[i64]) -> FirewallResponse {
        let start = Instant::now();
        let snapshot = self.snapshot.load_full();

        let mut ids: Vec<i64> = Vec::with_capacity(schema_ids.len());
        for id in schema_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        let mut summary: Vec<SchemaSummary> = ids.iter().map(|id| SchemaSummary::new(*id, 500)).collect();
        let mut errors: Vec<ValidationError> = Vec::new();

        let prepared = match PreparedRequest::prepare(&req, &self.pool, self.config.max_body_size) {
            Ok(p) => p,
            Err(e) => {
                warn!(method = %req.method, path = %req.path, error = %e, "request could not be prepared");
                return FirewallResponse::Report(ValidationReport { summary, errors });
            }
        };

        let ctx = Arc::new(WorkerContext {
            snapshot: Arc::clone(&snapshot),
            request: req,
            prepared,
            validator: self.validator.clone(),
            filters: Arc::clone(&self.filters),
            pass_options: self.config.pass_options,
        });

        let (tx, rx) = mpsc::channel::<(usize, WorkerOutcome)>();
        let mut pending = 0usize;
        for (slot, id) in ids.iter().copied().enumerate() {
            if !snapshot.store.is_loaded(id) {
                debug!(schema_id = id, "schema id not in store");
                continue;
            }
            let ctx = Arc::clone(&ctx);
            let tx = tx.clone();
            // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
            // The closure owns everything it touches.
            let spawned = unsafe {
                coroutine::Builder::new()
                    .stack_size(self.config.stack_size)
                    .spawn(move || {
                        let outcome = run_worker(&ctx, id);
                        // The caller may have stopped waiting.
                        let _ = tx.send((slot, outcome));
                    })
            };
            match spawned {
                Ok(_) => pending += 1,
                Err(e) => error!(schema_id = id, error = %e, "failed to spawn validation coroutine"),
            }
        }
        drop(tx);

        let deadline = self.config.timeout.map(|t| start + t);
        let mut block: Option<u16> = None;
        while pending > 0 {
            let received = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    rx.recv_timeout(left).ok()
                }
                None => rx.recv().ok(),
            };
            let Some((slot, outcome)) = received else {
                warn!(pending, "validation workers missed the deadline");
                break;
            };
            pending -= 1;
            if block.is_none() {
                block = outcome.block;
            }
            let entry = &mut summary[slot];
            entry.status_code = outcome.verdict.status_code();
            match outcome.verdict {
                Verdict::Ok { rewritten_query } => entry.rewritten_query = rewritten_query,
                Verdict::Forbidden(errs) => errors.extend(errs),
                Verdict::Internal(reason) => {
                    warn!(schema_id = entry.schema_id, reason = %reason, "validation failed internally");
                }
            }
        }

        if let Some(status) = block {
            debug!(status, "request blocked by filter");
            return FirewallResponse::Blocked(status);
        }

        let mut report = ValidationReport { summary, errors };
        report.sample_errors(self.config.max_errors);
        debug!(
            schemas = report.summary.len(),
            errors = report.errors.len(),
            duration_us = start.elapsed().as_micros() as u64,
            "request validated"
        );
        FirewallResponse::Report(report)
    }
}

/// Validate against one schema, turning a panic into an internal verdict.
fn run_worker(ctx: &WorkerContext, schema_id: i64) -> WorkerOutcome {
    match catch_unwind(AssertUnwindSafe(|| validate_one(ctx, schema_id))) {
        Ok(outcome) => outcome,
        Err(panic) => {
            error!(schema_id, panic_message = ?panic, "validation worker panicked");
            WorkerOutcome::verdict(Verdict::Internal("validation worker panicked".to_string()))
        }
    }
}

fn validate_one(ctx: &WorkerContext, schema_id: i64) -> WorkerOutcome {
    for filter in ctx.filters.iter() {
        if let FilterOutcome::Block { status } = filter.check(schema_id, &ctx.request) {
            return WorkerOutcome {
                verdict: Verdict::Ok { rewritten_query: None },
                block: Some(status),
            };
        }
    }

    let prepared = &ctx.prepared;
    if ctx.pass_options && prepared.method == Method::OPTIONS {
        return WorkerOutcome::verdict(Verdict::Ok { rewritten_query: None });
    }

    let store = &ctx.snapshot.store;
    let (Some(doc), Some(router)) = (store.specification(schema_id), ctx.snapshot.routers.get(schema_id)) else {
        return WorkerOutcome::verdict(Verdict::Internal(format!("no router for schema {schema_id}")));
    };
    let version = store.specification_version(schema_id);

    let verdict = match router.find(&prepared.method, &prepared.path) {
        RouteLookup::Found(route) => ctx
            .validator
            .validate(schema_id, version, doc, &route, &prepared.view()),
        RouteLookup::MethodNotAllowed(_) | RouteLookup::NotFound => {
            let err = ValidationError::new(
                ErrorCode::MethodAndPathNotFound,
                format!("method and path are not found: {} {}", prepared.method, prepared.path),
                schema_id,
            )
            .with_version(version);
            Verdict::Forbidden(vec![err])
        }
    };
    WorkerOutcome::verdict(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogLoad, CatalogVersion, SpecRecord};
    use crate::spec::SpecFormat;
    use crate::store::SpecStore;
    use crate::validator::ValidationOptions;

    const DOC: &str = "openapi: 3.0.1\ninfo: {title: t, version: '1'}\npaths:\n  /pets:\n    get:\n      parameters:\n        - {name: limit, in: query, required: true, schema: {type: integer}}\n      responses:\n        '200': {description: ok}\n";

    fn orchestrator(config: OrchestratorConfig) -> Orchestrator {
        let store = SpecStore::from_catalog(CatalogLoad {
            version: CatalogVersion::V1,
            records: vec![
                SpecRecord::new(1, "a", SpecFormat::Yaml, DOC.as_bytes().to_vec(), None),
                SpecRecord::new(2, "b", SpecFormat::Yaml, DOC.as_bytes().to_vec(), None),
            ],
            rejected: Vec::new(),
        });
        Orchestrator::new(
            Snapshot::build(store).into_shared(),
            RequestValidator::new(ValidationOptions::default()),
            config,
        )
    }

    fn report(resp: FirewallResponse) -> ValidationReport {
        match resp {
            FirewallResponse::Report(r) => r,
            other => panic!("expected report, got {other:?}"),
        }
    }

    fn get(target: &str) -> FirewallRequest {
        FirewallRequest::builder(Method::GET, target).build()
    }

    #[test]
    fn test_summary_per_schema_and_unknown_ids() {
        let o = orchestrator(OrchestratorConfig::default());
        let r = report(o.validate(get("/pets"), &[1, 2, 99, 1]));
        assert_eq!(r.summary.len(), 3);
        assert_eq!(r.status_of(1), Some(403));
        assert_eq!(r.status_of(2), Some(403));
        assert_eq!(r.status_of(99), Some(500));
        assert_eq!(r.errors.len(), 2);
        assert!(r.errors.iter().all(|e| e.schema_id == 1 || e.schema_id == 2));

        let ok = report(o.validate(get("/pets?limit=3"), &[1]));
        assert!(ok.passed());
        assert!(ok.errors.is_empty());
    }

    #[test]
    fn test_unrouted_request() {
        let o = orchestrator(OrchestratorConfig::default());
        let r = report(o.validate(get("/nope"), &[1]));
        assert_eq!(r.errors[0].code, ErrorCode::MethodAndPathNotFound);
        assert_eq!(r.errors[0].schema_version.as_deref(), Some("a"));
    }

    #[test]
    fn test_options_pass_through() {
        let o = orchestrator(OrchestratorConfig {
            pass_options: true,
            ..Default::default()
        });
        let req = FirewallRequest::builder(Method::OPTIONS, "/anything").build();
        let r = report(o.validate(req, &[1]));
        assert_eq!(r.summary, vec![SchemaSummary::new(1, 200)]);
    }

    #[test]
    fn test_error_cap() {
        let o = orchestrator(OrchestratorConfig {
            max_errors: 1,
            ..Default::default()
        });
        let r = report(o.validate(get("/pets"), &[1, 2]));
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.summary.len(), 2);
    }

    #[derive(Debug)]
    struct Blocker;
    impl RequestFilter for Blocker {
        fn check(&self, _schema_id: i64, _req: &FirewallRequest) -> FilterOutcome {
            FilterOutcome::Block { status: 429 }
        }
    }

    #[derive(Debug)]
    struct Panicker;
    impl RequestFilter for Panicker {
        fn check(&self, schema_id: i64, _req: &FirewallRequest) -> FilterOutcome {
            if schema_id == 2 {
                panic!("filter crashed");
            }
            FilterOutcome::Continue
        }
    }

    #[derive(Debug)]
    struct Sleeper;
    impl RequestFilter for Sleeper {
        fn check(&self, _schema_id: i64, _req: &FirewallRequest) -> FilterOutcome {
            std::thread::sleep(Duration::from_millis(300));
            FilterOutcome::Continue
        }
    }

    #[test]
    fn test_filter_block_overrides_everything() {
        let o = orchestrator(OrchestratorConfig::default()).with_filters(vec![Arc::new(Blocker)]);
        assert_eq!(o.validate(get("/pets"), &[1, 2]), FirewallResponse::Blocked(429));
    }

    #[test]
    fn test_panic_is_contained_to_its_schema() {
        let o = orchestrator(OrchestratorConfig::default()).with_filters(vec![Arc::new(Panicker)]);
        let r = report(o.validate(get("/pets?limit=1"), &[1, 2]));
        assert_eq!(r.status_of(1), Some(200));
        assert_eq!(r.status_of(2), Some(500));
        assert!(r.errors.is_empty());
    }

    #[test]
    fn test_late_workers_report_internal() {
        let o = orchestrator(OrchestratorConfig {
            timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        })
        .with_filters(vec![Arc::new(Sleeper)]);
        let r = report(o.validate(get("/pets?limit=1"), &[1]));
        assert_eq!(r.status_of(1), Some(500));
    }

    #[test]
    fn test_broken_encoding_fails_every_schema() {
        let o = orchestrator(OrchestratorConfig::default());
        let req = FirewallRequest::builder(Method::GET, "/pets?limit=1")
            .header("content-encoding", "gzip")
            .body(b"not gzip".to_vec())
            .build();
        let r = report(o.validate(req, &[1, 2]));
        assert_eq!(r.status_of(1), Some(500));
        assert_eq!(r.status_of(2), Some(500));
    }
}
