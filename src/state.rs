use std::sync::Arc;

use crate::{config::AppConfig, database::Database, ledger::LedgerSettings};

/// Shared by every handler through `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    pub fn ledger(&self) -> &LedgerSettings {
        &self.config.ledger
    }
}
