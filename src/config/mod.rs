//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::{render::DEFAULT_TRACKING_MAX_AGE_SECS, session::ProxyConfig};

mod cli;

pub use cli::{CliArgs, Command, RelayOverrides, RenderArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "embed-relay";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
pub const DEFAULT_EXPORT_ENDPOINT: &str = "https://www.landingiexport.com";
const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub export: ExportSettings,
    pub upstream: UpstreamSettings,
    pub tracking: TrackingSettings,
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
pub struct ExportSettings {
    pub endpoint: Url,
    pub hash: String,
    pub assume_https: bool,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub proxy: Option<ProxyConfig>,
}

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub cookie_max_age: Duration,
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

    builder = builder.add_source(Environment::with_prefix("EMBED_RELAY").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_relay_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    export: RawExportSettings,
    upstream: RawUpstreamSettings,
    tracking: RawTrackingSettings,
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

        self.apply_relay_overrides(&overrides.relay);
    }

    fn apply_relay_overrides(&mut self, overrides: &RelayOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(endpoint) = overrides.export_endpoint.as_ref() {
            self.export.endpoint = Some(endpoint.clone());
        }
        if let Some(hash) = overrides.export_hash.as_ref() {
            self.export.hash = Some(hash.clone());
        }
        if let Some(assume_https) = overrides.export_assume_https {
            self.export.assume_https = Some(assume_https);
        }
        if let Some(seconds) = overrides.upstream_connect_timeout_seconds {
            self.upstream.connect_timeout_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.upstream_timeout_seconds {
            self.upstream.timeout_seconds = Some(seconds);
        }
        if let Some(address) = overrides.proxy_address.as_ref() {
            self.upstream.proxy.address = Some(address.clone());
        }
        if let Some(port) = overrides.proxy_port.as_ref() {
            self.upstream.proxy.port = Some(port.clone());
        }
        if let Some(login) = overrides.proxy_login.as_ref() {
            self.upstream.proxy.login = Some(login.clone());
        }
        if let Some(password) = overrides.proxy_password.as_ref() {
            self.upstream.proxy.password = Some(password.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            export,
            upstream,
            tracking,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            export: build_export_settings(export)?,
            upstream: build_upstream_settings(upstream)?,
            tracking: build_tracking_settings(tracking)?,
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
    let graceful_shutdown = positive_seconds(graceful_secs, "server.graceful_shutdown_seconds")?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
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

fn build_export_settings(export: RawExportSettings) -> Result<ExportSettings, LoadError> {
    let endpoint_raw = export
        .endpoint
        .unwrap_or_else(|| DEFAULT_EXPORT_ENDPOINT.to_string());
    let endpoint = Url::parse(endpoint_raw.trim())
        .map_err(|err| LoadError::invalid("export.endpoint", format!("invalid URL: {err}")))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "export.endpoint",
            "scheme must be http or https",
        ));
    }

    let hash = export
        .hash
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("export.hash", "must be set"))?;

    Ok(ExportSettings {
        endpoint,
        hash,
        assume_https: export.assume_https.unwrap_or(false),
    })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let connect_timeout = positive_seconds(
        upstream
            .connect_timeout_seconds
            .unwrap_or(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS),
        "upstream.connect_timeout_seconds",
    )?;
    let timeout = positive_seconds(
        upstream
            .timeout_seconds
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        "upstream.timeout_seconds",
    )?;

    let RawProxySettings {
        address,
        port,
        login,
        password,
    } = upstream.proxy;
    let proxy = ProxyConfig::from_parts(
        address.as_deref(),
        port.as_deref(),
        login.as_deref(),
        password.as_deref(),
    );

    Ok(UpstreamSettings {
        connect_timeout,
        timeout,
        proxy,
    })
}

fn build_tracking_settings(tracking: RawTrackingSettings) -> Result<TrackingSettings, LoadError> {
    let max_age = tracking
        .cookie_max_age_seconds
        .unwrap_or(DEFAULT_TRACKING_MAX_AGE_SECS);

    Ok(TrackingSettings {
        cookie_max_age: positive_seconds(max_age, "tracking.cookie_max_age_seconds")?,
    })
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
struct RawExportSettings {
    endpoint: Option<String>,
    hash: Option<String>,
    assume_https: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    connect_timeout_seconds: Option<u64>,
    timeout_seconds: Option<u64>,
    proxy: RawProxySettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProxySettings {
    address: Option<String>,
    port: Option<String>,
    login: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTrackingSettings {
    cookie_max_age_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
