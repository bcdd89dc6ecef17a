// Application state module
// Process-wide state shared by every connection

use std::sync::Arc;
use tokio::sync::Notify;

use super::types::Config;
use crate::store::SharedStore;

/// Application state
///
/// Built once at startup; handlers borrow the store from here instead of
/// opening their own.
pub struct AppState {
    pub config: Config,
    pub store: SharedStore,
    pub shutdown_signal: Arc<Notify>,
}

impl AppState {
    pub fn new(config: &Config, store: SharedStore) -> Self {
        Self {
            config: config.clone(),
            store,
            shutdown_signal: Arc::new(Notify::new()),
        }
    }
}
