use crate::config::Config;
use crate::stream::{EventClass, Hub};
use crate::{CONSOLE_TARGET, DISPATCH_TARGET, ERROR_TARGET, Error, HUB_TARGET};
use std::fmt::Display;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Hub log file name
pub const HUB_LOG_FILE: &str = "hub";

/// Initialize the logging system with console and file outputs
pub fn init(config: &Config) -> Result<(), Error> {
    let log_dir = Path::new(&config.log_dir);
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)?;
    }

    let hub_file = RollingFileAppender::new(Rotation::DAILY, log_dir, HUB_LOG_FILE);

    // Console output (human-readable format)
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // File output (JSON format)
    let file_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(hub_file);

    // RUST_LOG wins over the debug flag
    let default_level = if config.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!(log_dir = %log_dir.display(), debug = config.debug, "Logging system initialized");
    Ok(())
}

/// Log the start of a producer request
pub fn log_request_start(operation: &str, target: &str) -> Instant {
    info!(
        target: DISPATCH_TARGET,
        operation,
        target_name = %target,
        event = "start",
        "Request started"
    );
    Instant::now()
}

/// Log the end of a producer request
pub fn log_request_end(operation: &str, target: &str, started: Instant, outcome: impl Display) {
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or_default();
    info!(
        target: DISPATCH_TARGET,
        operation,
        target_name = %target,
        outcome = %outcome,
        duration_ms,
        event = "end",
        "Request completed"
    );
}

/// Log a failed producer request
pub fn log_request_error(operation: &str, target: &str, error: &dyn Display) {
    error!(
        target: ERROR_TARGET,
        operation,
        target_name = %target,
        error = %error,
        "Request failed"
    );
}

/// Log the number of connected consumers per class
pub fn log_stats(hub: &Hub) {
    info!(
        target: HUB_TARGET,
        action = hub.consumer_count(EventClass::Action),
        player = hub.consumer_count(EventClass::Player),
        punish = hub.consumer_count(EventClass::Punish),
        event = "stats",
        "Connected consumers"
    );
}

pub fn log_console(message: impl Display) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
