//! Tracing subscriber setup for the `estate` binary.
//!
//! Logs go to stderr so command output on stdout stays clean. `RUST_LOG`
//! wins over `[logging].level` when set.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.level)));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn filter_directive(level: &str) -> String {
    let level = level.trim();
    format!(
        "estate_harness={0},estate_harness_core={0},estate={0},warn",
        if level.is_empty() { "info" } else { level }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(
            filter_directive("debug"),
            "estate_harness=debug,estate_harness_core=debug,estate=debug,warn"
        );
        assert!(filter_directive("").starts_with("estate_harness=info"));
    }
}
