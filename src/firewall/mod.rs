//! # Validation Orchestrator
//!
//! Entry point of API mode. A [`FirewallRequest`] is buffered and prepared
//! once ([`PreparedRequest`]: query pairs, cookies, decompressed body,
//! effective content type), then validated against every selected schema in
//! parallel, one `may` coroutine per schema. Verdicts are merged into a
//! [`ValidationReport`]:
//!
//! - unknown schema IDs, worker panics and workers that miss the deadline
//!   report `500`
//! - a [`RequestFilter`] that blocks overrides the whole answer
//! - `errors[]` is sampled down to the configured maximum

mod filters;
mod orchestrator;
mod pool;
mod report;
mod request;

pub use filters::{FilterOutcome, IpAllowlistFilter, RequestFilter, TokenDenylistFilter};
pub use orchestrator::{FirewallResponse, Orchestrator, OrchestratorConfig};
pub use pool::{BufferPool, PooledBuffer};
pub use report::{SchemaSummary, ValidationReport};
pub use request::{parse_schema_ids, FirewallRequest, FirewallRequestBuilder, PreparedRequest, SCHEMA_ID_HEADER};
