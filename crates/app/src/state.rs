//! Server bootstrap state

use std::sync::Arc;

use planpoker_core::config::StorageConfig;
use planpoker_core::{Config, Database, RoomRepository};
use tracing::{info, warn};

/// Everything the server needs before it starts listening
pub struct AppState {
    pub config: Config,
    /// `None` when persistence is disabled or the database could not be opened
    pub repo: Option<Arc<dyn RoomRepository>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let repo = open_storage(&config.storage);
        Self { config, repo }
    }
}

/// Open the snapshot database. Failure is logged and the server runs
/// without persistence.
fn open_storage(storage: &StorageConfig) -> Option<Arc<dyn RoomRepository>> {
    if !storage.enabled {
        info!("Room persistence disabled");
        return None;
    }

    let path = match storage.resolve_db_path() {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "No database path, continuing without persistence");
            return None;
        }
    };

    match Database::open(&path) {
        Ok(db) => {
            info!(
                path = %path.display(),
                schema_version = db.schema_version(),
                "Opened room database"
            );
            Some(Arc::new(db))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to open database, continuing without persistence");
            None
        }
    }
}
