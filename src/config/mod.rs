//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::{DEFAULT_FORCED_REFRESH_WINDOW_MS, DEFAULT_TTL_MS};

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "farmgate";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SETTINGS_PATH: &str = "rest/v1/system_settings";
const DEFAULT_VISITORS_PATH: &str = "rest/v1/visitor_entries";
const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 10;
const DEFAULT_RATE_LIMIT_PURGE_INTERVAL_SECS: u64 = 300;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub backend: BackendSettings,
    pub settings_cache: SettingsCacheSettings,
    pub visitor_rate_limit: RateLimitSettings,
    pub push: PushSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL of the managed backend. `None` runs the service detached:
    /// settings fall back to defaults and visitor routes are unavailable.
    pub url: Option<Url>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub settings_path: String,
    pub visitors_path: String,
}

#[derive(Debug, Clone)]
pub struct SettingsCacheSettings {
    pub ttl: Duration,
    pub forced_refresh_window: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: NonZeroU32,
    pub purge_interval: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct PushSettings {
    pub vapid_public_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FARMGATE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    backend: RawBackendSettings,
    settings_cache: RawSettingsCacheSettings,
    visitor_rate_limit: RawRateLimitSettings,
    push: RawPushSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.backend_url.as_ref() {
            self.backend.url = Some(url.clone());
        }
        if let Some(timeout) = overrides.backend_timeout_ms {
            self.backend.timeout_ms = Some(timeout);
        }
        if let Some(ttl) = overrides.settings_cache_ttl_ms {
            self.settings_cache.ttl_ms = Some(ttl);
        }
        if let Some(window) = overrides.settings_cache_forced_refresh_window_ms {
            self.settings_cache.forced_refresh_window_ms = Some(window);
        }
        if let Some(window) = overrides.visitor_rate_limit_window_ms {
            self.visitor_rate_limit.window_ms = Some(window);
        }
        if let Some(max) = overrides.visitor_rate_limit_max_requests {
            self.visitor_rate_limit.max_requests = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            backend,
            settings_cache,
            visitor_rate_limit,
            push,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            backend: build_backend_settings(backend)?,
            settings_cache: build_settings_cache_settings(settings_cache)?,
            visitor_rate_limit: build_rate_limit_settings(visitor_rate_limit)?,
            push: build_push_settings(push),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let url = match non_blank(backend.url) {
        Some(raw) => {
            let parsed = Url::parse(&raw)
                .map_err(|err| LoadError::invalid("backend.url", format!("invalid URL: {err}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "backend.url",
                    "scheme must be http or https",
                ));
            }
            Some(parsed)
        }
        None => None,
    };

    let timeout_ms = backend.timeout_ms.unwrap_or(DEFAULT_BACKEND_TIMEOUT_MS);
    let timeout = non_zero_millis(timeout_ms, "backend.timeout_ms")?;

    let settings_path = non_blank(backend.settings_path)
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let visitors_path = non_blank(backend.visitors_path)
        .unwrap_or_else(|| DEFAULT_VISITORS_PATH.to_string());

    Ok(BackendSettings {
        url,
        api_key: non_blank(backend.api_key),
        timeout,
        settings_path,
        visitors_path,
    })
}

fn build_settings_cache_settings(
    cache: RawSettingsCacheSettings,
) -> Result<SettingsCacheSettings, LoadError> {
    let ttl = non_zero_millis(
        cache.ttl_ms.unwrap_or(DEFAULT_TTL_MS),
        "settings_cache.ttl_ms",
    )?;
    let forced_refresh_window = non_zero_millis(
        cache
            .forced_refresh_window_ms
            .unwrap_or(DEFAULT_FORCED_REFRESH_WINDOW_MS),
        "settings_cache.forced_refresh_window_ms",
    )?;

    Ok(SettingsCacheSettings {
        ttl,
        forced_refresh_window,
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window = non_zero_millis(
        rate_limit.window_ms.unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_MS),
        "visitor_rate_limit.window_ms",
    )?;

    let max_requests_val = rate_limit
        .max_requests
        .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS);
    let max_requests = non_zero_u32(max_requests_val, "visitor_rate_limit.max_requests")?;

    let purge_secs = rate_limit
        .purge_interval_seconds
        .unwrap_or(DEFAULT_RATE_LIMIT_PURGE_INTERVAL_SECS);
    if purge_secs == 0 {
        return Err(LoadError::invalid(
            "visitor_rate_limit.purge_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(RateLimitSettings {
        window,
        max_requests,
        purge_interval: Duration::from_secs(purge_secs),
    })
}

fn build_push_settings(push: RawPushSettings) -> PushSettings {
    PushSettings {
        vapid_public_key: non_blank(push.vapid_public_key),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    url: Option<String>,
    api_key: Option<String>,
    timeout_ms: Option<u64>,
    settings_path: Option<String>,
    visitors_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettingsCacheSettings {
    ttl_ms: Option<u64>,
    forced_refresh_window_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    window_ms: Option<u64>,
    max_requests: Option<u64>,
    purge_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPushSettings {
    vapid_public_key: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
