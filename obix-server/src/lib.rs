//! HTTP binding for the oBIX server engine (spec §6.1), analogous to
//! `ferrex-server`: wires `obix-core`'s blocking [`obix_core::Server`] to an
//! `axum` router, owns configuration loading and the logging/startup
//! ambient stack.

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod middleware;
pub mod routes;

pub use infra::{AppState, Config};
pub use routes::build_router;
