//! HTTP surface on `may_minihttp`: the API-mode validation service and the
//! health probes.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{build_request, read_request, ReadError};
pub use service::{ApiModeService, HealthService};
