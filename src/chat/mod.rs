pub mod delivery;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod router;
pub mod session;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::ChatConfig;
use registry::ConnectionRegistry;

/// Everything an event handler needs, shared by every session task and the
/// REST handlers that broadcast live events.
#[derive(Clone)]
pub struct ChatContext {
    pub db: DatabaseConnection,
    pub registry: Arc<ConnectionRegistry>,
    pub config: ChatConfig,
}

impl ChatContext {
    pub fn new(db: DatabaseConnection, config: ChatConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(&config));
        Self {
            db,
            registry,
            config,
        }
    }
}
