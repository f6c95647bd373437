use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Build the log filter: `RUST_LOG` wins, otherwise the configured level
pub fn env_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("Invalid log level: {}", config.log_level)),
    }
}

/// Install the global tracing subscriber.
///
/// JSON output carries the current span, so every line logged during a
/// transition includes its correlation id.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = env_filter(config)?;

    if config.json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(filter)
            .try_init()?;
    }

    tracing::info!(json = config.json_logs, "Auth lifecycle telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the steps of one transition
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create the span one `handle` call runs in
pub fn create_transition_span(
    state: &str,
    event: &str,
    machine: Option<&str>,
    correlation_id: &str,
) -> tracing::Span {
    tracing::info_span!(
        "auth_transition",
        auth.state = state,
        auth.event = event,
        machine = machine,
        correlation.id = correlation_id,
    )
}
