use crate::catalog::{CatalogSource, CatalogVersion, FileCatalog, SqliteCatalog, UrlCatalog};
use crate::firewall::{IpAllowlistFilter, Orchestrator, OrchestratorConfig, RequestFilter, TokenDenylistFilter};
use crate::hot_reload::HotReloadController;
use crate::runtime_config::RuntimeConfig;
use crate::server::{ApiModeService, HealthService, HttpServer};
use crate::store::Snapshot;
use crate::validator::{RequestValidator, ValidationOptions};
use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// OpenAPI 3 API firewall
#[derive(Debug, Parser)]
#[command(name = "api-firewall", version)]
#[command(about = "Validates HTTP requests against OpenAPI 3 specifications", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the API-mode validation service
    Serve(ServeArgs),
    /// Load a catalog and report records that fail to parse
    Check {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
}

/// Where specifications come from. Exactly one source must be given.
#[derive(Debug, Clone, Args)]
pub struct CatalogArgs {
    /// SQLite catalog with an `openapi_schemas` table
    #[arg(long, env = "APIFW_PATH_TO_SPEC_DB")]
    pub spec_db: Option<PathBuf>,

    /// Single OpenAPI document on disk
    #[arg(long, env = "APIFW_API_SPECS")]
    pub spec_file: Option<PathBuf>,

    /// Single OpenAPI document fetched over HTTP
    #[arg(long, env = "APIFW_API_SPECS_URL")]
    pub spec_url: Option<String>,

    /// Extra request header for `--spec-url`, as `Name: value`
    #[arg(long, env = "APIFW_API_SPECS_CUSTOM_HEADER")]
    pub spec_url_header: Option<String>,

    /// Schema ID assigned to a `--spec-file` or `--spec-url` document
    #[arg(long, env = "APIFW_SCHEMA_ID", default_value_t = 1)]
    pub schema_id: i64,

    /// Catalog table layout (1 or 2); 0 reads it from the table
    #[arg(long, env = "APIFW_DB_VERSION", default_value_t = 0)]
    pub db_version: u32,
}

impl CatalogArgs {
    pub fn source(&self) -> anyhow::Result<Arc<dyn CatalogSource>> {
        let given = [self.spec_db.is_some(), self.spec_file.is_some(), self.spec_url.is_some()]
            .iter()
            .filter(|g| **g)
            .count();
        if given != 1 {
            bail!("exactly one of --spec-db, --spec-file or --spec-url is required");
        }
        if let Some(path) = &self.spec_db {
            let version = match self.db_version {
                0 => None,
                n => Some(CatalogVersion::from_number(n).with_context(|| format!("unsupported --db-version {n}"))?),
            };
            return Ok(Arc::new(SqliteCatalog::new(path, version)));
        }
        if let Some(path) = &self.spec_file {
            return Ok(Arc::new(FileCatalog::new(path, self.schema_id)));
        }
        let url = self.spec_url.as_deref().unwrap_or_default();
        let mut catalog = UrlCatalog::new(url, self.schema_id);
        if let Some(header) = &self.spec_url_header {
            catalog = catalog
                .with_header_spec(header)
                .with_context(|| format!("malformed --spec-url-header {header:?}, expected `Name: value`"))?;
        }
        Ok(Arc::new(catalog))
    }

    /// Local file backing the catalog, if any.
    pub fn local_path(&self) -> Option<&Path> {
        self.spec_db.as_deref().or(self.spec_file.as_deref())
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Validation listener
    #[arg(long, env = "APIFW_URL", default_value = "0.0.0.0:8282")]
    pub api_host: String,

    /// Liveness and readiness listener
    #[arg(long, env = "APIFW_HEALTH_HOST", default_value = "0.0.0.0:9667")]
    pub health_host: String,

    /// Catalog reload period (`0` disables)
    #[arg(long, env = "APIFW_SPECIFICATION_UPDATE_PERIOD", default_value = "1m", value_parser = parse_duration)]
    pub update_period: Duration,

    /// Also reload when the catalog file changes
    #[arg(long, env = "APIFW_WATCH_CATALOG")]
    pub watch_catalog: bool,

    /// Accept OPTIONS requests without validation
    #[arg(long, env = "APIFW_PASS_OPTIONS")]
    pub pass_options: bool,

    /// Report query parameters and body fields the operation does not declare
    #[arg(long, env = "APIFW_UNKNOWN_PARAMETERS_DETECTION")]
    pub unknown_parameters_detection: bool,

    /// Cap on errors in a report (`0` keeps all)
    #[arg(long, env = "APIFW_MAX_ERRORS_IN_RESPONSE", default_value_t = 0)]
    pub max_errors_in_response: usize,

    /// Report every failing schema rule of a field
    #[arg(long, env = "APIFW_MULTI_ERRORS")]
    pub multi_errors: bool,

    /// Return the query string with absent parameters' defaults added
    #[arg(long, env = "APIFW_APPLY_QUERY_DEFAULTS")]
    pub apply_query_defaults: bool,

    /// Budget for validating one request
    #[arg(long, env = "APIFW_READ_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    #[arg(long, env = "APIFW_MAX_REQUEST_BODY_SIZE", default_value_t = 4 * 1024 * 1024)]
    pub max_request_body_size: usize,

    /// Header carrying the client address for the allow-list (peer address otherwise)
    #[arg(long, env = "APIFW_ALLOWED_IP_HEADER")]
    pub allowed_ip_header: Option<String>,

    /// Client addresses allowed through; empty disables the allow-list
    #[arg(long, env = "APIFW_ALLOWED_IPS", value_delimiter = ',')]
    pub allowed_ips: Vec<IpAddr>,

    /// Tokens to block; empty disables the deny-list
    #[arg(long, env = "APIFW_DENIED_TOKENS", value_delimiter = ',')]
    pub denied_tokens: Vec<String>,

    #[arg(long, env = "APIFW_DENIED_TOKEN_HEADER", default_value = "authorization")]
    pub denied_token_header: String,
}

impl ServeArgs {
    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            unknown_parameters: self.unknown_parameters_detection,
            multi_errors: self.multi_errors,
            apply_query_defaults: self.apply_query_defaults,
        }
    }

    pub fn orchestrator_config(&self, runtime: &RuntimeConfig) -> OrchestratorConfig {
        OrchestratorConfig {
            pass_options: self.pass_options,
            max_errors: self.max_errors_in_response,
            timeout: (!self.request_timeout.is_zero()).then_some(self.request_timeout),
            stack_size: runtime.stack_size,
            max_body_size: self.max_request_body_size,
        }
    }

    pub fn filters(&self) -> Vec<Arc<dyn RequestFilter>> {
        let mut filters: Vec<Arc<dyn RequestFilter>> = Vec::new();
        if !self.allowed_ips.is_empty() {
            filters.push(Arc::new(IpAllowlistFilter::new(
                self.allowed_ips.iter().copied(),
                self.allowed_ip_header.clone(),
            )));
        }
        if !self.denied_tokens.is_empty() {
            filters.push(Arc::new(TokenDenylistFilter::new(
                self.denied_token_header.clone(),
                self.denied_tokens.iter().cloned(),
            )));
        }
        filters
    }
}

/// Parse `500ms`, `30s`, `5m`, `1h` or bare seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {raw:?}"))?;
    match unit.trim() {
        "" | "s" => Ok(Duration::from_secs(n)),
        "ms" => Ok(Duration::from_millis(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        other => Err(format!("unknown duration unit {other:?} in {raw:?}")),
    }
}

/// Execute the parsed command.
///
/// # Errors
///
/// Startup failures (catalog unreadable, listener bind) and, for `check`,
/// any record that fails to load.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => serve(&args),
        Commands::Check { catalog } => check(&catalog),
    }
}

fn check(args: &CatalogArgs) -> anyhow::Result<()> {
    let source = args.source()?;
    let store = source
        .load()
        .with_context(|| format!("loading {}", source.describe()))?;
    for id in store.schema_ids() {
        println!("ok      schema {id} ({})", store.specification_version(id));
    }
    for e in store.load_errors() {
        println!("failed  {e}");
    }
    if !store.load_errors().is_empty() {
        bail!("{} record(s) failed to load", store.load_errors().len());
    }
    Ok(())
}

fn serve(args: &ServeArgs) -> anyhow::Result<()> {
    let runtime = RuntimeConfig::from_env();
    may::config().set_stack_size(runtime.stack_size);

    let source = args.catalog.source()?;
    let store = source
        .load()
        .with_context(|| format!("loading {}", source.describe()))?;
    for e in store.load_errors() {
        warn!(error = %e, "specification dropped");
    }
    if let Err(e) = source.after_load(&store) {
        warn!(error = %e, "failed to mark catalog records applied");
    }
    info!(
        catalog = %source.describe(),
        schemas = store.schema_ids().len(),
        version = %store.version(),
        "catalog loaded"
    );
    let snapshot = Snapshot::build(store).into_shared();

    let validator = RequestValidator::new(args.validation_options());
    let orchestrator = Orchestrator::new(Arc::clone(&snapshot), validator, args.orchestrator_config(&runtime))
        .with_filters(args.filters());

    let api = HttpServer(ApiModeService::new(orchestrator))
        .start(args.api_host.as_str())
        .with_context(|| format!("binding {}", args.api_host))?;
    let health = HttpServer(HealthService::new(Arc::clone(&snapshot)))
        .start(args.health_host.as_str())
        .with_context(|| format!("binding {}", args.health_host))?;
    info!(api = %api.addr(), health = %health.addr(), "listening");

    let watch = if args.watch_catalog { args.catalog.local_path() } else { None };
    let reload = HotReloadController::new(source, snapshot).spawn(args.update_period, watch)?;

    wait_for_shutdown(api)?;
    info!("shutting down");
    if let Some(reload) = reload {
        reload.stop();
    }
    health.stop();
    Ok(())
}

#[cfg(unix)]
fn wait_for_shutdown(api: crate::server::ServerHandle) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "shutdown signal received");
    }
    api.stop();
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown(api: crate::server::ServerHandle) -> anyhow::Result<()> {
    if api.join().is_err() {
        tracing::error!("api listener panicked");
        bail!("api listener panicked");
    }
    Ok(())
}
