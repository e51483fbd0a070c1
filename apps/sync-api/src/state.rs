//! Shared application state handed to every handler.

use std::sync::Arc;

use orderly_db::Database;
use orderly_sync::SyncEngine;

/// Cloneable handle shared across requests.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    engine: SyncEngine,
    db: Database,
}

impl AppState {
    pub fn new(engine: SyncEngine, db: Database) -> Self {
        AppState {
            inner: Arc::new(Inner { engine, db }),
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.inner.engine
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }
}
