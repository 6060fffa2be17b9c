use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the embed-relay binary.
#[derive(Debug, Parser)]
#[command(
    name = "embed-relay",
    version,
    about = "Serve exported landing pages from your own domain"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "EMBED_RELAY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the relay HTTP listener.
    Serve(Box<ServeArgs>),
    /// Relay a single request and print the outcome to stdout.
    Render(Box<RenderArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub relay: RelayOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,
}

/// Overrides shared by every command that talks to the export API.
#[derive(Debug, Args, Default, Clone)]
pub struct RelayOverrides {
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

    /// Override the export API base URL.
    #[arg(long = "export-endpoint", value_name = "URL")]
    pub export_endpoint: Option<String>,

    /// Override the export hash identifying the landing page export.
    #[arg(long = "export-hash", value_name = "HASH")]
    pub export_hash: Option<String>,

    /// Treat inbound requests as HTTPS when building canonical links.
    #[arg(
        long = "export-assume-https",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub export_assume_https: Option<bool>,

    /// Override the upstream connect timeout.
    #[arg(long = "upstream-connect-timeout-seconds", value_name = "SECONDS")]
    pub upstream_connect_timeout_seconds: Option<u64>,

    /// Override the upstream total request timeout.
    #[arg(long = "upstream-timeout-seconds", value_name = "SECONDS")]
    pub upstream_timeout_seconds: Option<u64>,

    /// Route upstream calls through this proxy address.
    #[arg(long = "proxy-address", value_name = "HOST")]
    pub proxy_address: Option<String>,

    /// Proxy port.
    #[arg(long = "proxy-port", value_name = "PORT")]
    pub proxy_port: Option<String>,

    /// Proxy login.
    #[arg(long = "proxy-login", value_name = "LOGIN")]
    pub proxy_login: Option<String>,

    /// Proxy password.
    #[arg(long = "proxy-password", env = "EMBED_RELAY_PROXY_PASSWORD", value_name = "PASSWORD")]
    pub proxy_password: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RelayOverrides,

    /// URL of the simulated visitor request (its query becomes the request parameters).
    #[arg(long, value_name = "URL", default_value = "http://localhost/")]
    pub url: String,

    /// Conversion hash to render.
    #[arg(long, value_name = "HASH")]
    pub hash: Option<String>,

    /// Tracking id the visitor already carries in the `tid` cookie.
    #[arg(long, value_name = "TID")]
    pub tid: Option<String>,

    /// Value of the `X-Forwarded-Host` header.
    #[arg(long = "forwarded-host", value_name = "HOST")]
    pub forwarded_host: Option<String>,

    /// Extra form parameter (`key=value`); repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))
}
