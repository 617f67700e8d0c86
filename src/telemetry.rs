//! Tracing Setup
//!
//! Installs the global `tracing` subscriber for binaries and tests that
//! embed the engine. Library code only emits events.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingSettings;
use crate::utils::error::{EngineError, EngineResult};

/// Install a compact fmt subscriber. `RUST_LOG` wins over the configured
/// filter. Fails instead of panicking when a subscriber is already set.
pub fn init_tracing(settings: &LoggingSettings) -> EngineResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .map_err(|e| EngineError::telemetry(format!("invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(settings.with_target)
                .compact(),
        )
        .try_init()
        .map_err(|e| EngineError::telemetry(e.to_string()))
}
