//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    fmt,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{
    BuildArgs, BuildOverrides, CliArgs, Command, LoggingOverrides, PreviewArgs, ServeArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pressrun";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_EDITIONS: u64 = 10;
const DEFAULT_BUNDLE_DIR: &str = "build-steps/01-project-bundle";
const DEFAULT_ARTIFACTS_DIR: &str = "build-steps/02-animation-files";
const DEFAULT_THUMBNAILS_DIR: &str = "build-steps/03-thumbnail-images";
const DEFAULT_MANIFEST_PATH: &str = "build-steps/04-publications.json";
pub(crate) const DEFAULT_BROWSER_PATH: &str = "chromium";
const DEFAULT_CAPTURE_CONCURRENCY: u64 = 2;
const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_VIEWPORT_SIDE: u64 = 1080;
const DEFAULT_PUBLISH_CONCURRENCY: u64 = 4;
const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 120;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub project: ProjectSettings,
    pub output: OutputSettings,
    pub capture: CaptureSettings,
    pub publish: PublishSettings,
    pub server: ServerSettings,
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
pub struct ProjectSettings {
    pub editions: NonZeroU32,
    pub bundle_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub artifacts_dir: PathBuf,
    pub thumbnails_dir: PathBuf,
    pub manifest_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub browser_path: PathBuf,
    /// Pass `--no-sandbox` when false; needed when running as root in containers.
    pub sandbox: bool,
    pub concurrency: NonZeroUsize,
    pub timeout: Duration,
    pub width: NonZeroU32,
    pub height: NonZeroU32,
}

#[derive(Clone)]
pub struct PublishSettings {
    pub gateway_url: Option<Url>,
    pub token: Option<String>,
    pub group_id: Option<String>,
    pub concurrency: NonZeroUsize,
    pub timeout: Duration,
}

impl fmt::Debug for PublishSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishSettings")
            .field("gateway_url", &self.gateway_url.as_ref().map(Url::as_str))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("group_id", &self.group_id)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
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

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PRESSRUN").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Build(args)) => raw.apply_build_overrides(&args.overrides),
        Some(Command::Preview(args)) => raw.apply_preview_overrides(args),
        Some(Command::Serve(args)) => raw.apply_serve_overrides(args),
        None => raw.apply_build_overrides(&BuildOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    project: RawProjectSettings,
    output: RawOutputSettings,
    capture: RawCaptureSettings,
    publish: RawPublishSettings,
    server: RawServerSettings,
}

impl RawSettings {
    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_build_overrides(&mut self, overrides: &BuildOverrides) {
        self.apply_logging_overrides(&overrides.logging);

        if let Some(editions) = overrides.editions {
            self.project.editions = Some(editions);
        }
        if let Some(dir) = overrides.bundle_dir.as_ref() {
            self.project.bundle_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.artifacts_dir.as_ref() {
            self.output.artifacts_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.thumbnails_dir.as_ref() {
            self.output.thumbnails_dir = Some(dir.clone());
        }
        if let Some(path) = overrides.manifest_path.as_ref() {
            self.output.manifest_path = Some(path.clone());
        }
        if let Some(path) = overrides.capture_browser_path.as_ref() {
            self.capture.browser_path = Some(path.clone());
        }
        if let Some(value) = overrides.capture_concurrency {
            self.capture.concurrency = Some(value);
        }
        if let Some(seconds) = overrides.capture_timeout_seconds {
            self.capture.timeout_seconds = Some(seconds);
        }
        if let Some(url) = overrides.publish_gateway_url.as_ref() {
            self.publish.gateway_url = Some(url.clone());
        }
        if let Some(group) = overrides.publish_group_id.as_ref() {
            self.publish.group_id = Some(group.clone());
        }
        if let Some(value) = overrides.publish_concurrency {
            self.publish.concurrency = Some(value);
        }
        if let Some(seconds) = overrides.publish_timeout_seconds {
            self.publish.timeout_seconds = Some(seconds);
        }
    }

    fn apply_preview_overrides(&mut self, args: &PreviewArgs) {
        self.apply_logging_overrides(&args.logging);
        if let Some(dir) = args.bundle_dir.as_ref() {
            self.project.bundle_dir = Some(dir.clone());
        }
    }

    fn apply_serve_overrides(&mut self, args: &ServeArgs) {
        self.apply_build_overrides(&args.build);
        if let Some(host) = args.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = args.server_port {
            self.server.port = Some(port);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            project,
            output,
            capture,
            publish,
            server,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let project = build_project_settings(project)?;
        let output = build_output_settings(output)?;
        let capture = build_capture_settings(capture)?;
        let publish = build_publish_settings(publish)?;
        let server = build_server_settings(server)?;

        Ok(Self {
            logging,
            project,
            output,
            capture,
            publish,
            server,
        })
    }
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

fn build_project_settings(project: RawProjectSettings) -> Result<ProjectSettings, LoadError> {
    let editions = non_zero_u32(
        project.editions.unwrap_or(DEFAULT_EDITIONS),
        "project.editions",
    )?;
    let bundle_dir = non_empty_path(
        project.bundle_dir,
        DEFAULT_BUNDLE_DIR,
        "project.bundle_dir",
    )?;

    Ok(ProjectSettings {
        editions,
        bundle_dir,
    })
}

fn build_output_settings(output: RawOutputSettings) -> Result<OutputSettings, LoadError> {
    Ok(OutputSettings {
        artifacts_dir: non_empty_path(
            output.artifacts_dir,
            DEFAULT_ARTIFACTS_DIR,
            "output.artifacts_dir",
        )?,
        thumbnails_dir: non_empty_path(
            output.thumbnails_dir,
            DEFAULT_THUMBNAILS_DIR,
            "output.thumbnails_dir",
        )?,
        manifest_path: non_empty_path(
            output.manifest_path,
            DEFAULT_MANIFEST_PATH,
            "output.manifest_path",
        )?,
    })
}

fn build_capture_settings(capture: RawCaptureSettings) -> Result<CaptureSettings, LoadError> {
    let browser_path = non_empty_path(
        capture.browser_path,
        DEFAULT_BROWSER_PATH,
        "capture.browser_path",
    )?;
    let concurrency = non_zero_usize(
        capture.concurrency.unwrap_or(DEFAULT_CAPTURE_CONCURRENCY),
        "capture.concurrency",
    )?;
    let timeout = seconds(
        capture
            .timeout_seconds
            .unwrap_or(DEFAULT_CAPTURE_TIMEOUT_SECS),
        "capture.timeout_seconds",
    )?;
    let width = non_zero_u32(
        capture.width.unwrap_or(DEFAULT_VIEWPORT_SIDE),
        "capture.width",
    )?;
    let height = non_zero_u32(
        capture.height.unwrap_or(DEFAULT_VIEWPORT_SIDE),
        "capture.height",
    )?;

    Ok(CaptureSettings {
        browser_path,
        sandbox: capture.sandbox.unwrap_or(true),
        concurrency,
        timeout,
        width,
        height,
    })
}

fn build_publish_settings(publish: RawPublishSettings) -> Result<PublishSettings, LoadError> {
    let gateway_url = match trimmed(publish.gateway_url) {
        Some(raw) => {
            let url = Url::parse(&raw).map_err(|err| {
                LoadError::invalid("publish.gateway_url", format!("invalid url `{raw}`: {err}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "publish.gateway_url",
                    "scheme must be http or https",
                ));
            }
            Some(url)
        }
        None => None,
    };

    let concurrency = non_zero_usize(
        publish.concurrency.unwrap_or(DEFAULT_PUBLISH_CONCURRENCY),
        "publish.concurrency",
    )?;
    let timeout = seconds(
        publish
            .timeout_seconds
            .unwrap_or(DEFAULT_PUBLISH_TIMEOUT_SECS),
        "publish.timeout_seconds",
    )?;

    Ok(PublishSettings {
        gateway_url,
        token: trimmed(publish.token),
        group_id: trimmed(publish.group_id),
        concurrency,
        timeout,
    })
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
    Ok(ServerSettings { addr })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProjectSettings {
    editions: Option<u64>,
    bundle_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOutputSettings {
    artifacts_dir: Option<PathBuf>,
    thumbnails_dir: Option<PathBuf>,
    manifest_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCaptureSettings {
    browser_path: Option<PathBuf>,
    sandbox: Option<bool>,
    concurrency: Option<u64>,
    timeout_seconds: Option<u64>,
    width: Option<u64>,
    height: Option<u64>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawPublishSettings {
    gateway_url: Option<String>,
    token: Option<String>,
    group_id: Option<String>,
    concurrency: Option<u64>,
    timeout_seconds: Option<u64>,
}

impl fmt::Debug for RawPublishSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawPublishSettings")
            .field("gateway_url", &self.gateway_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("group_id", &self.group_id)
            .field("concurrency", &self.concurrency)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

fn seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
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

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value = non_zero_u32(value, key)?;
    usize::try_from(value.get())
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid(key, "value exceeds supported range for usize"))
}
