//! # CLI Module
//!
//! `api-firewall serve` runs the API-mode validation service and the health
//! listener; `api-firewall check` loads a catalog offline and exits non-zero
//! when any record fails.
//!
//! Every flag can also be set through an `APIFW_*` environment variable, so
//! container deployments need no command line at all:
//!
//! ```bash
//! APIFW_PATH_TO_SPEC_DB=/var/lib/wallarm-api/2/wallarm_api.db \
//! APIFW_SPECIFICATION_UPDATE_PERIOD=1m \
//! APIFW_UNKNOWN_PARAMETERS_DETECTION=true \
//!   api-firewall serve
//! ```

mod commands;


pub use commands::{parse_duration, run_cli, CatalogArgs, Cli, Commands, ServeArgs};
