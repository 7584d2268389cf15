use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the pressrun binary.
#[derive(Debug, Parser)]
#[command(
    name = "pressrun",
    version,
    about = "Generate, capture and publish a fixed run of seeded editions"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRESSRUN_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run one full build sequence and write the publication manifest.
    Build(BuildArgs),
    /// Render the preview document for a single seed.
    Preview(PreviewArgs),
    /// Serve the build trigger and the preview endpoint over HTTP.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
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
}

#[derive(Debug, Args, Default, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub overrides: BuildOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct BuildOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the number of editions in the run.
    #[arg(long = "editions", value_name = "COUNT")]
    pub editions: Option<u64>,

    /// Override the directory holding the static project bundle.
    #[arg(long = "bundle-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub bundle_dir: Option<PathBuf>,

    /// Override the directory artifact documents are written to.
    #[arg(long = "artifacts-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub artifacts_dir: Option<PathBuf>,

    /// Override the directory thumbnails are written to.
    #[arg(long = "thumbnails-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub thumbnails_dir: Option<PathBuf>,

    /// Override the path of the publication manifest.
    #[arg(long = "manifest-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub manifest_path: Option<PathBuf>,

    /// Override the headless browser executable used for captures.
    #[arg(long = "capture-browser-path", value_name = "PATH", value_hint = ValueHint::ExecutablePath)]
    pub capture_browser_path: Option<PathBuf>,

    /// Override the maximum number of concurrent captures.
    #[arg(long = "capture-concurrency", value_name = "N")]
    pub capture_concurrency: Option<u64>,

    /// Override the per-capture timeout.
    #[arg(long = "capture-timeout-seconds", value_name = "SECONDS")]
    pub capture_timeout_seconds: Option<u64>,

    /// Override the storage gateway base URL.
    #[arg(long = "publish-gateway-url", value_name = "URL")]
    pub publish_gateway_url: Option<String>,

    /// Override the destination group uploads are filed under.
    #[arg(long = "publish-group-id", value_name = "ID")]
    pub publish_group_id: Option<String>,

    /// Override the maximum number of concurrent uploads.
    #[arg(long = "publish-concurrency", value_name = "N")]
    pub publish_concurrency: Option<u64>,

    /// Override the per-upload timeout.
    #[arg(long = "publish-timeout-seconds", value_name = "SECONDS")]
    pub publish_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the directory holding the static project bundle.
    #[arg(long = "bundle-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub bundle_dir: Option<PathBuf>,

    /// Seed to preview; the default seed is used when omitted.
    #[arg(long = "seed", value_name = "SEED")]
    pub seed: Option<String>,

    /// Write the document to a file instead of stdout.
    #[arg(long = "output", short = 'o', value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub build: BuildOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", env = "PORT", value_name = "PORT")]
    pub server_port: Option<u16>,
}
