use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Map the configured rotation name; unknown names mean a single file.
pub fn rotation_from(name: &str) -> Rotation {
    match name {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

/// Filter directives: `RUST_LOG` wins, otherwise the configured level for
/// everything with sqlx statement logging capped at `warn`.
fn filter_for(config: &AppConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.log_level)))
}

/// Install the global subscriber.
///
/// Returns `None` when `log_dir` is empty (stdout only). Otherwise the guard
/// must outlive the program or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> Option<WorkerGuard> {
    let registry = tracing_subscriber::registry().with(filter_for(config));

    if config.log_dir.is_empty() {
        registry
            .with(fmt::layer().with_target(false).with_ansi(true))
            .init();
        return None;
    }

    let file_appender = RollingFileAppender::new(
        rotation_from(&config.rotation),
        &config.log_dir,
        &config.log_file,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true) // Keep target in JSON for structured queries
            .with_current_span(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    Some(guard)
}
