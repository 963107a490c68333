//! Logging setup.
//!
//! The crate logs through the `log` facade. [`OutputRuntime::new`](crate::OutputRuntime::new)
//! calls [`init`] with the configured level; `RUST_LOG` takes precedence when set.

use crate::config::LogLevel;

/// Install an `env_logger` backend. Safe to call more than once; when a logger is already
/// installed only the max level changes.
pub fn init(level: LogLevel) {
    let filters = std::env::var("RUST_LOG").ok();
    if builder(level, filters.as_deref()).try_init().is_err() {
        set_level(level);
    }
}

fn builder(level: LogLevel, filters: Option<&str>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level.into());
    if let Some(filters) = filters {
        builder.parse_filters(filters);
    }
    builder
}

/// Change the max log level at runtime (`enable-logging` host command).
pub fn set_level(level: LogLevel) {
    log::set_max_level(level.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_sets_the_filter() {
        assert_eq!(builder(LogLevel::Debug, None).build().filter(), log::LevelFilter::Debug);
        assert_eq!(builder(LogLevel::Off, None).build().filter(), log::LevelFilter::Off);
    }

    #[test]
    fn rust_log_overrides_the_configured_level() {
        assert_eq!(builder(LogLevel::Warn, Some("trace")).build().filter(), log::LevelFilter::Trace);
    }
}
