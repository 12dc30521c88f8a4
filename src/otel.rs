//! Structured logging setup.
//!
//! JSON lines for production, pretty output for development, optionally
//! written through a non-blocking appender so request paths never wait on
//! stdout. Configured from `APIFW_LOG_*` variables; `RUST_LOG`, when set,
//! takes precedence over `APIFW_LOG_LEVEL`.

use anyhow::{Context, Result};
use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Write through a background thread.
    pub async_logging: bool,
    /// Extra `target=level` directives, comma-separated.
    pub target_filter: Option<String>,
    /// Include file:line in events.
    pub include_location: bool,
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("APIFW_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: LogFormat::parse(&env::var("APIFW_LOG_FORMAT").unwrap_or_else(|_| "json".to_string())),
            async_logging: env_flag("APIFW_LOG_ASYNC"),
            target_filter: env::var("APIFW_LOG_TARGET_FILTER").ok(),
            include_location: env_flag("APIFW_LOG_INCLUDE_LOCATION"),
        }
    }

    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            async_logging: false,
            target_filter: None,
            include_location: true,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level()));
        // Client disconnects are logged by the listener at info.
        if let Ok(directive) = "may_minihttp::http_server=warn".parse() {
            filter = filter.add_directive(directive);
        }
        if let Some(targets) = &self.target_filter {
            for raw in targets.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match raw.parse() {
                    Ok(directive) => filter = filter.add_directive(directive),
                    Err(_) => eprintln!("Warning: invalid log filter directive: {raw}"),
                }
            }
        }
        filter
    }

    fn level(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "warn" => "warn",
            "error" => "error",
            _ => "info",
        }
    }
}

/// Keeps the async writer flushing; drop it last.
#[derive(Debug)]
pub struct LoggingGuard(Option<WorkerGuard>);

/// Install the global subscriber.
///
/// # Errors
///
/// Fails when a global subscriber is already set.
pub fn init_logging_with_config(config: &LogConfig) -> Result<LoggingGuard> {
    let (writer, guard) = if config.async_logging {
        let (nb, guard) = tracing_appender::non_blocking(std::io::stdout());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(nb), Some(guard))
    } else {
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout), None)
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(LoggingGuard(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
    }

    #[test]
    fn test_level_normalisation() {
        let mut c = LogConfig::default_dev();
        assert_eq!(c.level(), "debug");
        c.log_level = "WARN".to_string();
        assert_eq!(c.level(), "warn");
        c.log_level = "loud".to_string();
        assert_eq!(c.level(), "info");
    }

    #[test]
    fn test_bad_directives_are_skipped() {
        let mut c = LogConfig::default_dev();
        c.target_filter = Some("api_firewall=trace, ,not a directive=".to_string());
        let filter = c.env_filter().to_string();
        assert!(filter.contains("api_firewall=trace"));
    }
}
