//! Subscriber setup for the binary.

use anyhow::Result;
use pulse_core::LogConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

const FALLBACK_LEVEL: &str = "warn";

/// Filter directive for a configured level.
///
/// Plain levels and `target=level` directives are accepted; anything else
/// falls back to `warn`.
pub fn filter_directive(level: &str) -> &str {
    let level = level.trim();
    if level.parse::<LevelFilter>().is_ok() {
        return level;
    }
    if level.contains('=') && EnvFilter::try_new(level).is_ok() {
        return level;
    }
    FALLBACK_LEVEL
}

/// Install the global subscriber.
///
/// Logs go to stderr, and additionally to a daily-rotated file when
/// `config.file` is set. The returned guard flushes the file writer and
/// must be held until exit.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let directive = filter_directive(&config.level);
    let filter = EnvFilter::new(directive);

    let (file_layer, guard) = match &config.file {
        Some(file) => {
            let dir = config.directory.clone().unwrap_or_else(|| PathBuf::from("."));
            std::fs::create_dir_all(&dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, &dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = (config.stdout || config.file.is_none()).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let subscriber = Registry::default()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    if directive != config.level.trim() {
        info!("Unrecognised log level {:?}, using {}", config.level, directive);
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_levels_are_kept() {
        assert_eq!(filter_directive("debug"), "debug");
        assert_eq!(filter_directive(" TRACE "), "TRACE");
        assert_eq!(filter_directive("off"), "off");
    }

    #[test]
    fn test_target_directives_are_kept() {
        assert_eq!(filter_directive("pulse_progress=debug"), "pulse_progress=debug");
        assert_eq!(
            filter_directive("info,pulse_dispatch=trace"),
            "info,pulse_dispatch=trace"
        );
    }

    #[test]
    fn test_unknown_level_falls_back_to_warn() {
        assert_eq!(filter_directive("loud"), "warn");
        assert_eq!(filter_directive(""), "warn");
    }
}
