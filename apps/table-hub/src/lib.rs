pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod query;
pub mod routes;

use std::sync::Arc;

use config::Config;
use gateway::HubHandle;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub config: Arc<Config>,
}
