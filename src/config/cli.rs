use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the presswork binary.
#[derive(Debug, Parser)]
#[command(name = "presswork", version, about = "HTML to PDF rendering server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "PRESSWORK_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP rendering service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the browser executable used for rendering.
    #[arg(long = "render-chrome-path", value_name = "PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Override the directory holding transient render artifacts.
    #[arg(long = "render-temp-dir", value_name = "PATH")]
    pub temp_dir: Option<PathBuf>,

    /// Override the number of rendering sessions open at once.
    #[arg(long = "render-max-sessions", value_name = "COUNT")]
    pub max_sessions: Option<u32>,

    /// Override the number of fragments of one request rendered at once.
    #[arg(long = "render-max-concurrent-pages", value_name = "COUNT")]
    pub max_concurrent_pages: Option<u32>,

    /// Override the number of fragments accepted per request.
    #[arg(long = "render-max-pages", value_name = "COUNT")]
    pub max_pages: Option<u32>,

    /// Override the per-request render timeout.
    #[arg(long = "render-request-timeout-seconds", value_name = "SECONDS")]
    pub request_timeout_seconds: Option<u64>,

    /// Override how long a fragment's network must stay idle before printing.
    #[arg(long = "render-settle-millis", value_name = "MILLIS")]
    pub settle_millis: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the maximum request body size in bytes.
    #[arg(long = "server-body-limit-bytes", value_name = "BYTES")]
    pub server_body_limit_bytes: Option<u64>,

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
