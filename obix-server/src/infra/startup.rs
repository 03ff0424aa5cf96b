//! Process startup: logging init and engine bring-up, split out of
//! `main.rs` the way the teacher's `infra/startup.rs` does, minus the
//! media-specific demo/RBAC hooks this crate has no equivalent of.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::app_state::AppState;
use super::config::Config;

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides
/// `config.log_level` when set, matching the teacher's `EnvFilter` usage.
pub fn init_tracing(config: &Config) {
    let default_filter = format!("{}={},tower_http=info", config.log_facility.replace('-', "_"), config.log_level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Builds the core engine and wraps it with the HTTP-layer state.
pub fn build_state(config: Config) -> Result<AppState> {
    let config = Arc::new(config);
    let core = obix_core::Server::start(config.core_config())?;
    Ok(AppState::new(core, config))
}
