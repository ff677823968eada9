//! Async handle over the synchronous SQLite [`Database`].
//!
//! A single connection is shared behind a mutex; every call runs on the
//! blocking pool so that no tokio worker ever waits on SQLite.

use std::path::Path;
use std::sync::{Arc, Mutex};

use parley_store::{Database, StoreError};

#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let db = tokio::task::spawn_blocking(move || Database::open_at(&path))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(Self::new(db))
    }

    /// Run `f` against the database on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|_| StoreError::Unavailable("database lock poisoned".into()))?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }
}
