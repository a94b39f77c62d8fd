use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the farmgate binary.
#[derive(Debug, Parser)]
#[command(name = "farmgate", version, about = "Farm visitor access service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FARMGATE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the backend base URL.
    #[arg(long = "backend-url", value_name = "URL")]
    pub backend_url: Option<String>,

    /// Override the backend request timeout.
    #[arg(long = "backend-timeout-ms", value_name = "MILLISECONDS")]
    pub backend_timeout_ms: Option<u64>,

    /// Override the settings cache TTL.
    #[arg(long = "settings-cache-ttl-ms", value_name = "MILLISECONDS")]
    pub settings_cache_ttl_ms: Option<u64>,

    /// Override the forced-refresh window that follows a cache invalidation.
    #[arg(long = "settings-cache-forced-refresh-window-ms", value_name = "MILLISECONDS")]
    pub settings_cache_forced_refresh_window_ms: Option<u64>,

    /// Override the visitor rate limit window size.
    #[arg(long = "visitor-rate-limit-window-ms", value_name = "MILLISECONDS")]
    pub visitor_rate_limit_window_ms: Option<u64>,

    /// Override the visitor rate limit request ceiling.
    #[arg(long = "visitor-rate-limit-max-requests", value_name = "COUNT")]
    pub visitor_rate_limit_max_requests: Option<u64>,
}
