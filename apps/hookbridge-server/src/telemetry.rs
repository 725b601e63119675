//! Logging initialization

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Args;

/// Guards that must be kept alive for the duration of the program
pub struct TelemetryGuards;

/// Initialize the tracing subscriber. `RUST_LOG` takes precedence over `--log-level`.
pub fn init_telemetry(args: &Args) -> Result<TelemetryGuards> {
    let env_filter = build_filter(&args.log_level)?;

    if args.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true),
            )
            .init();
    };

    Ok(TelemetryGuards)
}

fn build_filter(log_level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(log_level)))
        .context("Failed to create environment filter")
}

/// Crate-level directives; dependencies stay at `warn` unless `trace` is requested.
fn default_directives(log_level: &str) -> String {
    if log_level == "trace" {
        return "trace".to_string();
    }
    format!(
        "warn,hookbridge_server={level},hookbridge_webhook={level},tower_http={level}",
        level = log_level
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives("trace"), "trace");
        assert!(default_directives("debug").contains("hookbridge_webhook=debug"));
        assert!(default_directives("info").starts_with("warn,"));
    }

    #[test]
    fn test_build_filter() {
        assert!(build_filter("info").is_ok());
    }
}
