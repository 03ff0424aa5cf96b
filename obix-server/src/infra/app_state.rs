use std::sync::Arc;

use obix_core::Server;

use super::config::Config;

/// Shared application state handed to every handler (mirrors the teacher's
/// `AppState`, minus the media-specific services this crate has no use
/// for): the blocking core engine plus the resolved configuration.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<Server>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(core: Arc<Server>, config: Arc<Config>) -> Self {
        Self { core, config }
    }
}
