//! Lazily opened database handle
//!
//! `Database` is cheap to clone and owns at most one open [`Store`]. The first
//! `open` runs schema migrations while holding the handle lock, so concurrent
//! callers wait for the upgrade and then share the same store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::store::Store;
use crate::Result;

#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    handle: Mutex<Option<Arc<Store>>>,
}

impl Database {
    /// Database stored in `dir`; nothing is touched until the first `open`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                dir: dir.into(),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Database at the location named by `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(settings.store_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Open the store, creating and migrating it on first use
    pub async fn open(&self) -> Result<Arc<Store>> {
        let mut handle = self.inner.handle.lock().await;
        if let Some(store) = handle.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(crate::schema::open(&self.inner.dir).await?);
        tracing::debug!(dir = %self.inner.dir.display(), version = store.version(), "opened store");
        *handle = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Drop the cached handle; the next call to `open` reloads from disk
    pub async fn close(&self) {
        self.inner.handle.lock().await.take();
    }

    pub async fn is_open(&self) -> bool {
        self.inner.handle.lock().await.is_some()
    }

    /// Close and delete every persisted record, index and the schema version
    ///
    /// Destructive and unconditional. Store handles obtained earlier keep
    /// their in-memory contents but no longer reach the disk.
    pub async fn reset(&self) -> Result<()> {
        let mut handle = self.inner.handle.lock().await;
        handle.take();

        match tokio::fs::remove_dir_all(&self.inner.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::warn!(dir = %self.inner.dir.display(), "store reset, all data deleted");
        Ok(())
    }
}
