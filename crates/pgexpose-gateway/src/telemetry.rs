//! Logging setup
//!
//! `RUST_LOG` overrides the configured level. `JSON_LOGS=true` switches to
//! one JSON object per line for log shippers.

use anyhow::Result;
use pgexpose_common::config::TelemetrySettings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber
pub fn init(settings: &TelemetrySettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))?;

    let subscriber = tracing_subscriber::registry().with(filter);

    if settings.json_logs {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        subscriber.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    Ok(())
}

/// Settings from the CLI level plus the `JSON_LOGS` switch
pub fn settings_from_env(log_level: &str) -> TelemetrySettings {
    TelemetrySettings {
        log_level: log_level.to_string(),
        json_logs: pgexpose_common::config::env_parse_or_default("JSON_LOGS", false),
    }
}
