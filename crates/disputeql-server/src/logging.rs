//! Structured logging for the disputeql server
//!
//! Console output in pretty, compact or JSON form, optionally mirrored to
//! daily rolling files.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "disputeql-server.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for production (structured logging)
    Json,
    Compact,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    File,
    Both,
}

impl LogOutput {
    pub fn from_env() -> Self {
        match std::env::var("LOG_OUTPUT").as_deref() {
            Ok("file") => LogOutput::File,
            Ok("both") => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }
}

fn log_dir() -> String {
    std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string())
}

fn env_filter() -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Quiet the transport stack unless asked for explicitly
    ["hyper=warn", "tokio=warn", "tower=warn", "h2=warn", "reqwest=warn"]
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(filter, |filter, directive| filter.add_directive(directive))
}

/// Initialize the logging system
///
/// Environment variables:
/// - `RUST_LOG`: Log level (e.g., "debug", "info", "disputeql_server=debug")
/// - `LOG_FORMAT`: Output format ("pretty", "json", "compact")
/// - `LOG_OUTPUT`: Where to write logs ("stdout", "file", "both")
/// - `LOG_DIR`: Directory for log files (default: "./logs")
///
/// ```bash
/// RUST_LOG=info LOG_FORMAT=json LOG_OUTPUT=file LOG_DIR=/var/log/disputeql cargo run
/// ```
pub fn init() {
    let format = LogFormat::from_env();
    let output = LogOutput::from_env();

    let stdout_layer = || match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    let file_layer = || {
        let dir = log_dir();
        std::fs::create_dir_all(&dir).ok();
        let appender = RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_PREFIX);
        fmt::layer().with_writer(appender).with_ansi(false).boxed()
    };

    let stdout = matches!(output, LogOutput::Stdout | LogOutput::Both).then(stdout_layer);
    let file = matches!(output, LogOutput::File | LogOutput::Both).then(file_layer);

    let result = tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout)
        .with(file)
        .try_init();

    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
        return;
    }

    tracing::info!(format = ?format, output = ?output, "Logging system initialized");
    if matches!(output, LogOutput::File | LogOutput::Both) {
        tracing::debug!("  LOG_DIR: {}", log_dir());
    }
}

/// Helper macro for logging with structured fields
///
/// Usage:
/// ```rust
/// disputeql_server::log_event!(
///     level: tracing::Level::INFO,
///     event: "query_executed",
///     generated_code: "len(df_combined)",
///     success: true
/// );
/// ```
#[macro_export]
macro_rules! log_event {
    (level: $level:expr, event: $event:expr $(, $key:ident: $value:expr)* $(,)?) => {
        tracing::event!(
            $level,
            event = $event
            $(, $key = ?$value)*
        );
    };
}
