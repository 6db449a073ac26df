//! JSON-file counter store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{CounterStore, check_revision, validate_api_name};
use crate::quota::UsageCounters;
use crate::{ItineraError, Result};

/// Stores each API's counters as `<dir>/<api>.json`.
///
/// Writes go to a temporary sibling file that is renamed over the target,
/// so a crash mid-write leaves the previous document intact. Writes through
/// one store instance (and its clones) are serialised, which makes
/// [`save_if`](CounterStore::save_if) atomic within a process; separate
/// processes must not share a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Default location: `~/.itinera/usage`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".itinera").join("usage"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, api: &str) -> Result<PathBuf> {
        validate_api_name(api)?;
        Ok(self.dir.join(format!("{api}.json")))
    }

    async fn read(&self, path: &Path) -> Result<Option<UsageCounters>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ItineraError::Persistence(format!(
                    "failed to read {path:?}: {e}"
                )));
            }
        };
        let counters = serde_json::from_slice(&bytes).map_err(|e| {
            ItineraError::Persistence(format!("failed to parse {path:?}: {e}"))
        })?;
        Ok(Some(counters))
    }

    async fn write(&self, path: &Path, counters: &UsageCounters) -> Result<()> {
        let json = serde_json::to_vec_pretty(counters)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            ItineraError::Persistence(format!("failed to create {:?}: {e}", self.dir))
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| ItineraError::Persistence(format!("failed to write {tmp:?}: {e}")))?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            ItineraError::Persistence(format!("failed to replace {path:?}: {e}"))
        })?;
        debug!(path = ?path, revision = counters.revision, "counters saved");
        Ok(())
    }
}

#[async_trait]
impl CounterStore for JsonFileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, api: &str) -> Result<Option<UsageCounters>> {
        let path = self.path_for(api)?;
        self.read(&path).await
    }

    async fn save(&self, api: &str, counters: &UsageCounters) -> Result<()> {
        let path = self.path_for(api)?;
        let _guard = self.write_lock.lock().await;
        self.write(&path, counters).await
    }

    async fn save_if(&self, api: &str, expected: u64, counters: &UsageCounters) -> Result<()> {
        let path = self.path_for(api)?;
        let _guard = self.write_lock.lock().await;
        let stored = self.read(&path).await?;
        check_revision(api, stored.as_ref(), expected)?;
        self.write(&path, counters).await
    }
}
