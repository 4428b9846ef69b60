//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{builder::BoolishValueParser, Args, Parser};
use config::{Config, Environment, File};
use regex::RegexBuilder;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::queue::QueueSettings;
use crate::infra::browser::profile::DeviceProfile;
use crate::infra::browser::{BrowserSettings, PdfOptions};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "stampa";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3030;
const DEFAULT_QUEUE_CONCURRENCY: u32 = 4;
const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 90_000;
const DEFAULT_MAX_TASK_COUNT: u32 = 50;
const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
];
const DEFAULT_ARTICLE_TEMPLATE: &str = "https://{domain}/api/rest_v1/page/html/{title}";
const DEFAULT_PROBE_TEMPLATE: &str = "https://{domain}/api/rest_v1/page/title/{title}";
const DEFAULT_DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DEFAULT_MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
const DEFAULT_PDF_MARGIN_IN: f64 = 0.5;
const DEFAULT_PDF_SCALE: f64 = 1.0;

/// Command-line arguments for the stampa binary.
#[derive(Debug, Parser)]
#[command(name = "stampa", version, about = "Wiki article to PDF render service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STAMPA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

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

    /// Override the number of parallel renders.
    #[arg(long = "queue-concurrency", value_name = "COUNT")]
    pub queue_concurrency: Option<u32>,

    /// Override the queue residency budget in milliseconds.
    #[arg(long = "queue-timeout-ms", value_name = "MILLIS")]
    pub queue_timeout_ms: Option<u64>,

    /// Override the per-render execution budget in milliseconds.
    #[arg(long = "queue-execution-timeout-ms", value_name = "MILLIS")]
    pub execution_timeout_ms: Option<u64>,

    /// Override the ceiling on waiting plus running jobs.
    #[arg(long = "queue-max-task-count", value_name = "COUNT")]
    pub max_task_count: Option<u32>,

    /// Override the browser executable path.
    #[arg(long = "browser-executable", value_name = "PATH")]
    pub browser_executable: Option<PathBuf>,

    /// Override the graceful browser close budget in milliseconds.
    #[arg(long = "browser-close-timeout-ms", value_name = "MILLIS")]
    pub close_timeout_ms: Option<u64>,

    /// Override the host deny-list regex.
    #[arg(long = "render-restricted-hosts", value_name = "REGEX")]
    pub restricted_hosts: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and
/// validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub queue: QueueSettings,
    pub browser: BrowserSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
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
pub struct RenderSettings {
    pub article_template: String,
    pub probe_template: String,
    /// Static header overrides applied to every render.
    pub headers: BTreeMap<String, String>,
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

/// Parse CLI arguments and load settings with the configured precedence.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("STAMPA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    queue: RawQueueSettings,
    browser: RawBrowserSettings,
    render: RawRenderSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQueueSettings {
    concurrency: Option<u32>,
    queue_timeout_ms: Option<u64>,
    execution_timeout_ms: Option<u64>,
    max_task_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBrowserSettings {
    executable: Option<PathBuf>,
    launch_args: Option<Vec<String>>,
    close_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    article_template: Option<String>,
    probe_template: Option<String>,
    restricted_hosts: Option<String>,
    desktop_user_agent: Option<String>,
    mobile_user_agent: Option<String>,
    headers: Option<BTreeMap<String, String>>,
    pdf: RawPdfSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPdfSettings {
    print_background: Option<bool>,
    margin_in: Option<f64>,
    scale: Option<f64>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(concurrency) = overrides.queue_concurrency {
            self.queue.concurrency = Some(concurrency);
        }
        if let Some(timeout) = overrides.queue_timeout_ms {
            self.queue.queue_timeout_ms = Some(timeout);
        }
        if let Some(timeout) = overrides.execution_timeout_ms {
            self.queue.execution_timeout_ms = Some(timeout);
        }
        if let Some(count) = overrides.max_task_count {
            self.queue.max_task_count = Some(count);
        }
        if let Some(path) = overrides.browser_executable.as_ref() {
            self.browser.executable = Some(path.clone());
        }
        if let Some(timeout) = overrides.close_timeout_ms {
            self.browser.close_timeout_ms = Some(timeout);
        }
        if let Some(pattern) = overrides.restricted_hosts.as_ref() {
            self.render.restricted_hosts = Some(pattern.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            queue,
            browser,
            render,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let queue = build_queue_settings(queue)?;
        let (browser, render) = build_render_settings(browser, render)?;

        Ok(Self {
            server,
            logging,
            queue,
            browser,
            render,
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

    Ok(ServerSettings { addr })
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

fn build_queue_settings(queue: RawQueueSettings) -> Result<QueueSettings, LoadError> {
    let concurrency = queue.concurrency.unwrap_or(DEFAULT_QUEUE_CONCURRENCY) as usize;

    let queue_timeout_ms = queue.queue_timeout_ms.unwrap_or(DEFAULT_QUEUE_TIMEOUT_MS);
    let queue_timeout = NonZeroU64::new(queue_timeout_ms)
        .ok_or_else(|| LoadError::invalid("queue.queue_timeout_ms", "must be greater than zero"))?;

    let execution_timeout_ms = queue
        .execution_timeout_ms
        .unwrap_or(DEFAULT_EXECUTION_TIMEOUT_MS);
    let execution_timeout = NonZeroU64::new(execution_timeout_ms).ok_or_else(|| {
        LoadError::invalid("queue.execution_timeout_ms", "must be greater than zero")
    })?;

    let max_task_count = queue.max_task_count.unwrap_or(DEFAULT_MAX_TASK_COUNT);
    let max_task_count = NonZeroU32::new(max_task_count)
        .ok_or_else(|| LoadError::invalid("queue.max_task_count", "must be at least one"))?;

    Ok(QueueSettings {
        concurrency,
        queue_timeout: Duration::from_millis(queue_timeout.get()),
        execution_timeout: Duration::from_millis(execution_timeout.get()),
        max_task_count: max_task_count.get() as usize,
    })
}

fn build_render_settings(
    browser: RawBrowserSettings,
    render: RawRenderSettings,
) -> Result<(BrowserSettings, RenderSettings), LoadError> {
    let close_timeout_ms = browser.close_timeout_ms.unwrap_or(DEFAULT_CLOSE_TIMEOUT_MS);
    if close_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "browser.close_timeout_ms",
            "must be greater than zero",
        ));
    }

    let launch_args = browser.launch_args.unwrap_or_else(|| {
        DEFAULT_LAUNCH_ARGS
            .iter()
            .map(|arg| (*arg).to_string())
            .collect()
    });

    let deny_hosts = match render.restricted_hosts.as_deref() {
        None | Some("") => None,
        Some(pattern) => Some(
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|err| {
                    LoadError::invalid(
                        "render.restricted_hosts",
                        format!("failed to compile: {err}"),
                    )
                })?,
        ),
    };

    let article_template = render
        .article_template
        .unwrap_or_else(|| DEFAULT_ARTICLE_TEMPLATE.to_string());
    validate_template("render.article_template", &article_template)?;
    let probe_template = render
        .probe_template
        .unwrap_or_else(|| DEFAULT_PROBE_TEMPLATE.to_string());
    validate_template("render.probe_template", &probe_template)?;

    let margin_in = render.pdf.margin_in.unwrap_or(DEFAULT_PDF_MARGIN_IN);
    if !(0.0..=2.0).contains(&margin_in) {
        return Err(LoadError::invalid(
            "render.pdf.margin_in",
            "margin must be between 0 and 2 inches",
        ));
    }
    let scale = render.pdf.scale.unwrap_or(DEFAULT_PDF_SCALE);
    if !(0.1..=2.0).contains(&scale) {
        return Err(LoadError::invalid(
            "render.pdf.scale",
            "scale must be between 0.1 and 2",
        ));
    }

    let desktop_user_agent = render
        .desktop_user_agent
        .unwrap_or_else(|| DEFAULT_DESKTOP_USER_AGENT.to_string());
    let mobile_user_agent = render
        .mobile_user_agent
        .unwrap_or_else(|| DEFAULT_MOBILE_USER_AGENT.to_string());

    let browser = BrowserSettings {
        executable: browser.executable,
        launch_args,
        close_timeout: Duration::from_millis(close_timeout_ms),
        desktop_profile: DeviceProfile::desktop(desktop_user_agent),
        mobile_profile: DeviceProfile::mobile(mobile_user_agent),
        deny_hosts,
        pdf: PdfOptions {
            print_background: render.pdf.print_background.unwrap_or(true),
            margin_in,
            scale,
        },
    };

    let render = RenderSettings {
        article_template,
        probe_template,
        headers: render.headers.unwrap_or_default(),
    };

    Ok((browser, render))
}

fn validate_template(key: &'static str, template: &str) -> Result<(), LoadError> {
    if !template.contains("{domain}") || !template.contains("{title}") {
        return Err(LoadError::invalid(
            key,
            "template must contain `{domain}` and `{title}` placeholders",
        ));
    }
    Ok(())
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    candidate
        .parse::<SocketAddr>()
        .map_err(|err| format!("failed to parse `{candidate}`: {err}"))
}
