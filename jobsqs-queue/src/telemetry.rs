//! Tracing subscriber installation.

use std::sync::Arc;

use jobsqs_config::LoggingConfig;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

/// Replaces the active filter at runtime.
pub type ReloadHandle = Arc<dyn Fn(EnvFilter) -> Result<(), String> + Send + Sync>;

/// Filter directive in effect: `RUST_LOG` wins over the configured level.
pub fn filter_directive(cfg: &LoggingConfig) -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| cfg.level.clone())
}

/// Install a global fmt subscriber from configuration.
///
/// Fails instead of panicking when a global subscriber is already set.
pub fn install_tracing(cfg: &LoggingConfig) -> Result<ReloadHandle, TryInitError> {
    use tracing_subscriber::fmt::time::ChronoUtc;

    let (filter_layer, reload_handle) =
        tracing_subscriber::reload::Layer::new(EnvFilter::new(filter_directive(cfg)));

    // The two branches build different layer types, so each initializes on its own.
    if cfg.json {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339()),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
    }

    Ok(Arc::new(move |filter| {
        reload_handle
            .reload(filter)
            .map_err(|e| format!("reload failed: {e}"))
    }))
}
