//! Application configuration.
//!
//! Settings are read from environment variables (a `.env` file in the
//! working directory is loaded first, if present). Every value has a
//! default so the service starts with a bare environment; upstream
//! credentials are only checked when a client actually needs them.

use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Default body limit for inbound webhooks (1MB).
const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// NowCerts issues tokens to this client unless told otherwise.
pub const DEFAULT_NOWCERTS_CLIENT_ID: &str = "ngAuthApp";

/// Inbound API server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
    pub body_limit: usize,
    pub api_prefix: String,
}

/// NowCerts (credential-backed upstream) settings.
#[derive(Clone)]
pub struct NowCertsSettings {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub token_refresh_buffer: Duration,
}

impl std::fmt::Debug for NowCertsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NowCertsSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field("token_refresh_buffer", &self.token_refresh_buffer)
            .finish()
    }
}

/// GoHighLevel (static-key upstream) settings.
#[derive(Clone)]
pub struct GhlSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub location_id: Option<String>,
}

impl std::fmt::Debug for GhlSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhlSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("location_id", &self.location_id)
            .finish()
    }
}

/// Deduplication window settings.
#[derive(Debug, Clone)]
pub struct DedupSettings {
    pub retention: Duration,
    pub sweep_interval: Duration,
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Level or full filter directive (e.g. `info` or `certlink=debug`).
    pub level: String,
    /// Optional log file; rotated daily next to the given path.
    pub file: Option<String>,
}

/// Complete application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub app_version: String,
    pub server: ServerSettings,
    pub nowcerts: NowCertsSettings,
    pub ghl: GhlSettings,
    pub retry: RetryPolicy,
    /// Per-call timeout for every outbound request.
    pub request_timeout: Duration,
    pub dedup: DedupSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Load settings from the process environment (after `.env`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let cors_origins = get("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        let server = ServerSettings {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 8000)?,
            cors_origins,
            body_limit: parse_or(&get, "BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT)?,
            api_prefix: get("API_V1_PREFIX").unwrap_or_else(|| "/api/v1".to_string()),
        };

        let nowcerts = NowCertsSettings {
            base_url: base_url(&get, "NOWCERTS_BASE_URL", "https://api.nowcerts.com")?,
            username: get("NOWCERTS_USERNAME"),
            password: get("NOWCERTS_PASSWORD"),
            client_id: get("NOWCERTS_CLIENT_ID")
                .unwrap_or_else(|| DEFAULT_NOWCERTS_CLIENT_ID.to_string()),
            token_refresh_buffer: Duration::from_secs(parse_or(
                &get,
                "TOKEN_REFRESH_BUFFER_SECONDS",
                300u64,
            )?),
        };

        let ghl = GhlSettings {
            base_url: base_url(&get, "GHL_BASE_URL", "https://services.leadconnectorhq.com")?,
            api_key: get("GHL_API_KEY"),
            location_id: get("GHL_LOCATION_ID"),
        };

        let retry = RetryPolicy::new(
            parse_or(&get, "MAX_RETRIES", 3u32)?,
            parse_or(&get, "RETRY_BACKOFF_FACTOR", 2.0f64)?,
            parse_or(&get, "RETRY_INITIAL_DELAY", 1.0f64)?,
        )?;

        let retention_hours: u64 = parse_or(&get, "DEDUP_RETENTION_HOURS", 24)?;
        if retention_hours == 0 {
            return Err(Error::config(
                "DEDUP_RETENTION_HOURS must be greater than 0",
            ));
        }
        let retention_secs = retention_hours
            .checked_mul(60 * 60)
            .ok_or_else(|| Error::config("DEDUP_RETENTION_HOURS is too large"))?;
        let dedup = DedupSettings {
            retention: Duration::from_secs(retention_secs),
            sweep_interval: Duration::from_secs(parse_or(
                &get,
                "DEDUP_SWEEP_INTERVAL_SECONDS",
                3600u64,
            )?),
        };

        let request_timeout_secs: u64 = parse_or(&get, "REQUEST_TIMEOUT_SECONDS", 30)?;
        if request_timeout_secs == 0 {
            return Err(Error::config(
                "REQUEST_TIMEOUT_SECONDS must be greater than 0",
            ));
        }

        Ok(Self {
            app_name: get("APP_NAME")
                .unwrap_or_else(|| "NowCerts GHL Integration API".to_string()),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            server,
            nowcerts,
            ghl,
            retry,
            request_timeout: Duration::from_secs(request_timeout_secs),
            dedup,
            log: LogSettings {
                level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                file: get("LOG_FILE"),
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| Error::config(format!("{key}: invalid value {raw:?}: {e}"))),
        None => Ok(default),
    }
}

/// Read a base URL, validating it and stripping any trailing slash so
/// endpoint paths can be appended verbatim.
fn base_url<G>(get: &G, key: &str, default: &str) -> Result<String>
where
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    Url::parse(&raw).map_err(|e| Error::config(format!("{key}: invalid URL {raw:?}: {e}")))?;
    Ok(raw.trim_end_matches('/').to_string())
}
