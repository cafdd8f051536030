//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;
use uuid::Uuid;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pagepress";
const ENV_PREFIX: &str = "PAGEPRESS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_ARTIFACT_DIR: &str = "artifacts";
const DEFAULT_ARTIFACT_PUBLIC_BASE_URL: &str = "https://artifacts.pagepress.site";
pub(crate) const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 15;
pub(crate) const DEFAULT_PUBLISHED_DOMAIN: &str = "pagepress.site";
const DEFAULT_ASSET_BASE_URL: &str = "https://pagepress.site";
const DEFAULT_STYLESHEET_HREF: &str = "https://pagepress.site/assets/published.v1.css";
const DEFAULT_FORM_SCRIPT_SRC: &str = "https://pagepress.site/assets/form.v1.js";
const DEFAULT_ANALYTICS_SCRIPT_SRC: &str = "https://pagepress.site/assets/a.v1.js";
pub(crate) const DEFAULT_KEEP_COUNT: u32 = 10;
const UNLIMITED: i64 = -1;

/// Command-line arguments for the pagepress binary.
#[derive(Debug, Parser)]
#[command(name = "pagepress", version, about = "Landing page publish service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PAGEPRESS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the publish API and public page server.
    Serve(Box<ServeArgs>),
    /// Render a content document to stdout without touching any store.
    Render(RenderArgs),
    /// Run retention for one page and print the report.
    Sweep(SweepArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// JSON document with `sections`, `content`, `theme` and optional `analytics_opt_in`.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Slug used for the canonical link and analytics tag.
    #[arg(long, default_value = "preview")]
    pub slug: String,

    /// Document title.
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SweepArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Page whose versions are swept.
    #[arg(long = "page-id", value_name = "UUID")]
    pub page_id: Uuid,

    /// Number of most recent versions to keep (the live version is always kept).
    #[arg(long, value_name = "COUNT")]
    pub keep: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the artifact backend (filesystem|http).
    #[arg(long = "artifacts-backend", value_name = "BACKEND")]
    pub artifacts_backend: Option<String>,

    /// Override the filesystem artifact directory.
    #[arg(long = "artifacts-directory", value_name = "PATH")]
    pub artifacts_directory: Option<PathBuf>,

    /// Override the HTTP object store endpoint.
    #[arg(long = "artifacts-endpoint", value_name = "URL")]
    pub artifacts_endpoint: Option<String>,

    /// Override the public base URL artifacts are addressed under.
    #[arg(long = "artifacts-public-base-url", value_name = "URL")]
    pub artifacts_public_base_url: Option<String>,

    /// Override the artifact upload deadline.
    #[arg(long = "artifacts-upload-timeout-seconds", value_name = "SECONDS")]
    pub artifacts_upload_timeout_seconds: Option<u64>,

    /// Override the domain published pages are served under.
    #[arg(long = "publish-domain", value_name = "DOMAIN")]
    pub publish_domain: Option<String>,

    /// Override the number of versions kept per page.
    #[arg(long = "publish-keep-count", value_name = "COUNT")]
    pub publish_keep_count: Option<u32>,

    /// Override the per-owner page limit (-1 for unlimited).
    #[arg(long = "plans-published-page-limit", value_name = "COUNT", allow_negative_numbers = true)]
    pub plans_published_page_limit: Option<i64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub artifacts: ArtifactSettings,
    pub publish: PublishSettings,
    pub plans: PlanSettings,
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
pub struct DatabaseSettings {
    /// `None` keeps every store in memory.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactBackend {
    Filesystem { directory: PathBuf },
    Http { endpoint: Url, token: Option<String> },
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub backend: ArtifactBackend,
    pub public_base_url: Url,
    pub upload_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub published_domain: String,
    pub asset_base_url: Url,
    pub stylesheet_href: String,
    pub form_script_src: String,
    pub analytics_script_src: String,
    pub keep_count: u32,
    pub bundle_version: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PlanSettings {
    /// Negative means unlimited.
    pub published_page_limit: i64,
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

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(_)) => {}
        Some(Command::Sweep(args)) => {
            raw.apply_database_override(&args.database);
            if let Some(keep) = args.keep {
                raw.publish.keep_count = Some(keep);
            }
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    artifacts: RawArtifactSettings,
    publish: RawPublishSettings,
    plans: RawPlanSettings,
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
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.artifacts_backend.as_ref() {
            self.artifacts.backend = Some(backend.clone());
        }
        if let Some(directory) = overrides.artifacts_directory.as_ref() {
            self.artifacts.directory = Some(directory.clone());
        }
        if let Some(endpoint) = overrides.artifacts_endpoint.as_ref() {
            self.artifacts.endpoint = Some(endpoint.clone());
        }
        if let Some(url) = overrides.artifacts_public_base_url.as_ref() {
            self.artifacts.public_base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.artifacts_upload_timeout_seconds {
            self.artifacts.upload_timeout_seconds = Some(seconds);
        }
        if let Some(domain) = overrides.publish_domain.as_ref() {
            self.publish.published_domain = Some(domain.clone());
        }
        if let Some(keep) = overrides.publish_keep_count {
            self.publish.keep_count = Some(keep);
        }
        if let Some(limit) = overrides.plans_published_page_limit {
            self.plans.published_page_limit = Some(limit);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            artifacts,
            publish,
            plans,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            artifacts: build_artifact_settings(artifacts)?,
            publish: build_publish_settings(publish)?,
            plans: build_plan_settings(plans)?,
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_empty(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_artifact_settings(artifacts: RawArtifactSettings) -> Result<ArtifactSettings, LoadError> {
    let backend = match non_empty(artifacts.backend)
        .unwrap_or_else(|| "filesystem".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "filesystem" => {
            let directory = artifacts
                .directory
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR));
            if directory.as_os_str().is_empty() {
                return Err(LoadError::invalid(
                    "artifacts.directory",
                    "path must not be empty",
                ));
            }
            ArtifactBackend::Filesystem { directory }
        }
        "http" => {
            let endpoint = non_empty(artifacts.endpoint).ok_or_else(|| {
                LoadError::invalid("artifacts.endpoint", "required for the http backend")
            })?;
            ArtifactBackend::Http {
                endpoint: parse_http_url(&endpoint, "artifacts.endpoint")?,
                token: non_empty(artifacts.token),
            }
        }
        other => {
            return Err(LoadError::invalid(
                "artifacts.backend",
                format!("unknown backend `{other}` (expected filesystem or http)"),
            ));
        }
    };

    let public_base_url = parse_http_url(
        artifacts
            .public_base_url
            .as_deref()
            .unwrap_or(DEFAULT_ARTIFACT_PUBLIC_BASE_URL),
        "artifacts.public_base_url",
    )?;

    let timeout = NonZeroU64::new(
        artifacts
            .upload_timeout_seconds
            .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
    )
    .ok_or_else(|| {
        LoadError::invalid("artifacts.upload_timeout_seconds", "must be greater than zero")
    })?;

    Ok(ArtifactSettings {
        backend,
        public_base_url,
        upload_timeout: Duration::from_secs(timeout.get()),
    })
}

fn build_publish_settings(publish: RawPublishSettings) -> Result<PublishSettings, LoadError> {
    let published_domain = non_empty(publish.published_domain)
        .unwrap_or_else(|| DEFAULT_PUBLISHED_DOMAIN.to_string())
        .trim_matches('.')
        .to_ascii_lowercase();
    if published_domain.is_empty()
        || !published_domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(LoadError::invalid(
            "publish.published_domain",
            "must be a DNS name",
        ));
    }

    let asset_base_url = parse_http_url(
        publish
            .asset_base_url
            .as_deref()
            .unwrap_or(DEFAULT_ASSET_BASE_URL),
        "publish.asset_base_url",
    )?;

    Ok(PublishSettings {
        published_domain,
        asset_base_url,
        stylesheet_href: non_empty(publish.stylesheet_href)
            .unwrap_or_else(|| DEFAULT_STYLESHEET_HREF.to_string()),
        form_script_src: non_empty(publish.form_script_src)
            .unwrap_or_else(|| DEFAULT_FORM_SCRIPT_SRC.to_string()),
        analytics_script_src: non_empty(publish.analytics_script_src)
            .unwrap_or_else(|| DEFAULT_ANALYTICS_SCRIPT_SRC.to_string()),
        keep_count: publish.keep_count.unwrap_or(DEFAULT_KEEP_COUNT),
        bundle_version: non_empty(publish.bundle_version)
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
    })
}

fn build_plan_settings(plans: RawPlanSettings) -> Result<PlanSettings, LoadError> {
    let published_page_limit = plans.published_page_limit.unwrap_or(UNLIMITED);
    if published_page_limit < UNLIMITED {
        return Err(LoadError::invalid(
            "plans.published_page_limit",
            "must be -1 (unlimited) or a non-negative count",
        ));
    }
    Ok(PlanSettings {
        published_page_limit,
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
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawArtifactSettings {
    backend: Option<String>,
    directory: Option<PathBuf>,
    endpoint: Option<String>,
    token: Option<String>,
    public_base_url: Option<String>,
    upload_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPublishSettings {
    published_domain: Option<String>,
    asset_base_url: Option<String>,
    stylesheet_href: Option<String>,
    form_script_src: Option<String>,
    analytics_script_src: Option<String>,
    keep_count: Option<u32>,
    bundle_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPlanSettings {
    published_page_limit: Option<i64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_http_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{value}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "url must use http or https"));
    }
    Ok(url)
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
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

#[cfg(test)]
mod tests;
