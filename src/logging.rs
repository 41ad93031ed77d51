use anyhow::Result;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize console logging and, when `log_dir` is set, a JSON log file
///
/// # Arguments
/// * `log_dir` - Directory for rotated log files; console only when `None`
/// * `log_level` - Minimum log level (trace, debug, info, warn, error)
///
/// # Returns
/// * `WorkerGuard` - Must be kept alive for the duration of the program
pub fn init_logging(log_dir: Option<PathBuf>, log_level: &str) -> Result<Option<WorkerGuard>> {
    let level = parse_level(log_level);

    // RUST_LOG wins over the configured level
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let (file_layer, guard) = match &log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix("periodic-backup")
                .filename_suffix("log")
                .max_log_files(7)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // File layer: JSON format for structured parsing
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    match &log_dir {
        Some(dir) => tracing::info!("Logging at level {} to {}", level, dir.display()),
        None => tracing::debug!("Logging at level {} to console", level),
    }

    Ok(guard)
}

/// Parse a level name, falling back to INFO
pub fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("trace", Level::TRACE)]
    #[test_case("DEBUG", Level::DEBUG)]
    #[test_case("warn", Level::WARN)]
    #[test_case("error", Level::ERROR)]
    #[test_case("verbose", Level::INFO ; "unknown falls back to info")]
    fn test_parse_level(input: &str, expected: Level) {
        assert_eq!(parse_level(input), expected);
    }
}
