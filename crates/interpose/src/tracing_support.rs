//! Log output for tests that use mocks.
//!
//! Interpose emits `tracing` events under the `interpose::*` targets:
//! installation and teardown at `debug`, every intercepted call at `trace`
//! (when `MockConfig::log_calls` is set), reported failures at `warn`.
//! Nothing is printed until a subscriber is installed, for example with
//! [`init_test_tracing`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for Interpose, checked before `RUST_LOG`
pub const ENV_LOG: &str = "INTERPOSE_LOG";

const DEFAULT_DIRECTIVES: &str = "warn";

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Filter from `INTERPOSE_LOG`, then `RUST_LOG`, then `warn`
#[must_use]
pub fn env_filter() -> EnvFilter {
    filter_from(|key| std::env::var(key).ok())
}

fn filter_from(lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
    let directives = lookup(ENV_LOG)
        .or_else(|| lookup("RUST_LOG"))
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string());
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install a test-writer subscriber; returns false if one was already set
pub fn init_test_tracing() -> bool {
    init_tracing(LogFormat::Pretty)
}

/// Install a subscriber writing through the test harness in `format`.
///
/// Safe to call from every test: only the first call installs anything.
pub fn init_tracing(format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter());
    let result = match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .without_time(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_test_writer())
            .try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_prefers_interpose_variable() {
        let filter = filter_from(|key| match key {
            ENV_LOG => Some("interpose=trace".to_string()),
            "RUST_LOG" => Some("error".to_string()),
            _ => None,
        });
        assert_eq!(filter.to_string(), "interpose=trace");
    }

    #[test]
    fn test_filter_falls_back_to_rust_log_then_warn() {
        let filter = filter_from(|key| (key == "RUST_LOG").then(|| "debug".to_string()));
        assert_eq!(filter.to_string(), "debug");
        assert_eq!(filter_from(|_| None).to_string(), "warn");
    }

    #[test]
    fn test_invalid_directives_use_default() {
        let filter = filter_from(|_| Some("interpose=loud".to_string()));
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_init_is_idempotent() {
        let _ = init_test_tracing();
        assert!(!init_test_tracing());
    }
}
