//! Logging initialization for the CLI.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber, writing to stderr.
///
/// * `verbosity` - 0 = INFO, 1 = DEBUG, 2+ = TRACE
/// * `json` - emit one JSON object per event
pub fn init(verbosity: u8, json: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let subscriber = tracing_subscriber::registry().with(build_filter(verbosity, rust_log.as_deref()));

    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

/// `RUST_LOG` decides the crate's level unless `-v` was given; without
/// `RUST_LOG` the crate logs at the verbosity level and everything else at warn.
fn build_filter(verbosity: u8, rust_log: Option<&str>) -> EnvFilter {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let crate_directive = format!("package_health={level}");

    match rust_log.map(EnvFilter::try_new) {
        Some(Ok(filter)) if verbosity == 0 => filter,
        Some(Ok(filter)) => match crate_directive.parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        },
        _ => EnvFilter::new(format!("warn,{crate_directive}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_sets_crate_level_by_default() {
        let filter = build_filter(0, Some("package_health=error")).to_string();
        assert!(filter.contains("package_health=error"));
        assert!(!filter.contains("package_health=info"));
    }

    #[test]
    fn test_verbose_flag_raises_level_over_rust_log() {
        let filter = build_filter(1, Some("package_health=error")).to_string();
        assert!(filter.contains("package_health=debug"));
    }

    #[test]
    fn test_default_without_rust_log() {
        let filter = build_filter(0, None).to_string();
        assert!(filter.contains("package_health=info"));
        assert!(filter.contains("warn"));
    }
}
