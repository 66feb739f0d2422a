//! Logging setup with a reloadable filter.
//!
//! This module provides:
//! - Runtime log level changes via `tracing_subscriber::reload`
//! - Optional daily-rotated log file next to the console output
//! - Local timezone timestamps for logs
//! - Debug-level helpers for recording webhook and upstream bodies

use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::config::LogSettings;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "certlink=info,tower_http=info,reqwest=warn,hyper=warn";

/// Bodies longer than this are cut when logged.
const MAX_LOGGED_BODY: usize = 2048;

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Logging configuration with a reloadable filter.
pub struct LoggingConfig {
    handle: FilterHandle,
}

impl LoggingConfig {
    /// Get the current filter directive string.
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Set a new filter directive (e.g. `certlink=debug,reqwest=info`).
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let new_filter = EnvFilter::try_new(directive).map_err(|e| {
            crate::Error::invalid_payload(format!("Invalid filter directive: {}", e))
        })?;

        self.handle
            .reload(new_filter)
            .map_err(|e| crate::Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }
}

/// Turn `LOG_LEVEL` into a filter directive. A bare level applies to this
/// crate and the HTTP middleware; anything else is used verbatim.
pub fn directive_for_level(level: &str) -> String {
    let level = level.trim();
    match level.to_ascii_lowercase().as_str() {
        "" => DEFAULT_LOG_FILTER.to_string(),
        lvl @ ("trace" | "debug" | "info" | "warn" | "error") => {
            format!("certlink={lvl},tower_http={lvl},reqwest=warn,hyper=warn")
        }
        _ => level.to_string(),
    }
}

/// Initialize logging.
///
/// `RUST_LOG` takes precedence over the configured level. When a log file
/// is configured the returned guard must be kept alive for the lifetime of
/// the process so buffered lines are flushed.
pub fn init_logging(
    settings: &LogSettings,
) -> crate::Result<(Arc<LoggingConfig>, Option<WorkerGuard>)> {
    let initial_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive_for_level(&settings.level)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, handle) = reload::Layer::new(initial_filter);

    let (file_layer, guard) = match settings.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let prefix = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("certlink.log");

            std::fs::create_dir_all(dir)?;

            let file_appender = tracing_appender::rolling::daily(dir, prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok((Arc::new(LoggingConfig { handle }), guard))
}

/// Record an inbound webhook body.
pub fn log_payload(source: &str, payload: &serde_json::Value) {
    debug!(source, payload = %truncate(&payload.to_string()), "Webhook payload received");
}

/// Record an upstream response body.
pub fn log_response(service: &str, status: u16, body: &str) {
    debug!(service, status, body = %truncate(body), "Upstream response");
}

fn truncate(body: &str) -> &str {
    if body.len() <= MAX_LOGGED_BODY {
        return body;
    }
    let mut end = MAX_LOGGED_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Available logging modules for documentation/API responses.
pub fn available_modules() -> Vec<(&'static str, &'static str)> {
    vec![
        ("certlink", "Main application"),
        ("certlink::credentials", "NowCerts token lifecycle"),
        ("certlink::clients", "Outbound NowCerts and GoHighLevel calls"),
        ("certlink::dispatcher", "Webhook routing"),
        ("certlink::dedup", "Duplicate suppression"),
        ("reqwest", "HTTP requests"),
        ("tower_http", "HTTP middleware"),
    ]
}
