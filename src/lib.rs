//! # api-firewall
//!
//! An inline API firewall driven by OpenAPI 3 documents. Every request is
//! checked against the operation it addresses in one or more specifications,
//! each identified by an integer *schema ID*, and the firewall answers with a
//! per-schema verdict.
//!
//! ## Architecture
//!
//! - **[`catalog`]** - where specification records come from (SQLite, a file, a URL)
//! - **[`spec`]** - OpenAPI parsing into a document with a `$ref`-resolved schema arena
//! - **[`store`]** - the immutable specification store and its published [`store::Snapshot`]
//! - **[`router`]** - per-schema radix-tree route matching
//! - **[`decode`]** - parameter decoding by `style` / `explode`
//! - **[`body`]** - body decoding by media type, content sniffing, `Content-Encoding`
//! - **[`validator`]** - request validation and error reporting
//! - **[`validator_cache`]** - compiled JSON-schema validators shared across documents
//! - **[`firewall`]** - per-request orchestration over many schemas
//! - **[`hot_reload`]** - periodic catalog reload and atomic snapshot swap
//! - **[`server`]** - API-mode and health listeners on `may_minihttp`
//! - **[`cli`]**, **[`otel`]**, **[`runtime_config`]** - process setup
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as ApiModeService<br/>(may_minihttp)
//!     participant Orch as Orchestrator
//!     participant Worker as Schema worker<br/>(coroutine)
//!     participant Router as Router
//!     participant Val as RequestValidator
//!
//!     Client->>Server: GET /pet/findByStatus<br/>X-Wallarm-Schema-ID: 1,2
//!     Server->>Server: Buffer request, strip schema header
//!     Server->>Orch: validate(request, [1, 2])
//!     Orch->>Orch: Load snapshot, decompress body,<br/>parse query and cookies
//!     par one worker per schema
//!         Orch->>Worker: spawn
//!         Worker->>Worker: Pre-validation filters
//!         Worker->>Router: find(method, path)
//!         Router-->>Worker: RouteMatch / not found
//!         Worker->>Val: validate(route, request)
//!         Val-->>Worker: Verdict
//!         Worker-->>Orch: (schema, verdict)
//!     end
//!     Orch->>Orch: Summary + sampled errors
//!     Orch-->>Server: ValidationReport
//!     Server-->>Client: 200 {"summary": [...], "errors": [...]}
//! ```
//!
//! ### Reload Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Timer
//!     participant Ctl as HotReloadController
//!     participant Cat as CatalogSource
//!     participant Snap as SharedSnapshot
//!
//!     Timer->>Ctl: tick
//!     Ctl->>Cat: load()
//!     Cat-->>Ctl: candidate SpecStore
//!     alt older layout or unchanged
//!         Ctl->>Ctl: keep current
//!     else changed
//!         Ctl->>Ctl: build routers
//!         Ctl->>Snap: store(new snapshot)
//!         Ctl->>Cat: after_load() marks records applied
//!     end
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! api-firewall serve --spec-db /var/lib/catalog.db --update-period 1m
//!
//! curl -s localhost:8282/pet/findByStatus -H 'X-Wallarm-Schema-ID: 1'
//! # {"summary":[{"schema_id":1,"status_code":403}],"errors":[...]}
//! ```
//!
//! ## Library Use
//!
//! ```rust,no_run
//! use api_firewall::catalog::{CatalogSource, FileCatalog};
//! use api_firewall::firewall::{FirewallRequest, Orchestrator, OrchestratorConfig};
//! use api_firewall::store::Snapshot;
//! use api_firewall::validator::{RequestValidator, ValidationOptions};
//! use http::Method;
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = FileCatalog::new("openapi.yaml", 1).load()?;
//! let orchestrator = Orchestrator::new(
//!     Snapshot::build(store).into_shared(),
//!     RequestValidator::new(ValidationOptions::default()),
//!     OrchestratorConfig::default(),
//! );
//! let request = FirewallRequest::builder(Method::GET, "/pets?limit=10").build();
//! let verdict = orchestrator.validate(request, &[1]);
//! println!("{verdict:?}");
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod catalog;
pub mod cli;
pub mod decode;
pub mod firewall;
pub mod hot_reload;
pub mod otel;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod spec;
pub mod store;
pub mod validator;
pub mod validator_cache;

pub use firewall::{FirewallRequest, FirewallResponse, Orchestrator, ValidationReport};
pub use spec::{
    parse_document, OpenApiDocument, ParameterLocation, ParameterMeta, ParameterStyle, SecurityScheme,
    SpecFormat,
};
pub use store::{SharedSnapshot, Snapshot, SpecStore};
