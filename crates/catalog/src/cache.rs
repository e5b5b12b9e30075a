//! Snapshot cache for computed aggregates.
//!
//! One JSON file per requested artist count, so runs of different sizes
//! never read each other's results. There is no expiry: a readable file
//! with the right version and scope is always a hit. Anything unreadable is
//! reported as a miss and the caller fetches afresh.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use common::Error;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::aggregator::CatalogTables;

/// Bumped whenever the on-disk layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything persisted by a successful fresh load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    /// The requested artist count this snapshot answers.
    pub scope: i64,
    pub created_at: DateTime<Utc>,
    pub tables: CatalogTables,
}

impl CacheSnapshot {
    pub fn new(scope: i64, tables: CatalogTables) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            scope,
            created_at: Utc::now(),
            tables,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
    scope: i64,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>, scope: i64) -> Self {
        Self {
            path: path.into(),
            scope,
        }
    }

    /// Store at `{dir}/artists-{scope}.json`.
    pub fn for_scope(dir: impl AsRef<Path>, scope: i64) -> Self {
        Self::new(dir.as_ref().join(format!("artists-{}.json", scope)), scope)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scope(&self) -> i64 {
        self.scope
    }

    /// Read the snapshot, or `None` when it is absent or unusable.
    pub fn load(&self) -> Option<CacheSnapshot> {
        match self.read() {
            Ok(Some(snapshot)) => {
                info!(
                    "Cached data loaded from {} ({} artists, saved {})",
                    self.path.display(),
                    snapshot.tables.artists.len(),
                    snapshot.created_at
                );
                Some(snapshot)
            }
            Ok(None) => {
                debug!("No cache file at {}", self.path.display());
                None
            }
            Err(e) => {
                warn!("Ignoring unusable cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn read(&self) -> Result<Option<CacheSnapshot>, Error> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)?;
        let snapshot: CacheSnapshot = serde_json::from_slice(&bytes)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Cache(format!(
                "snapshot version {} != expected {}",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        if snapshot.scope != self.scope {
            return Err(Error::Cache(format!(
                "snapshot scope {} != expected {}",
                snapshot.scope, self.scope
            )));
        }
        if !snapshot.tables.is_consistent() {
            return Err(Error::Cache(
                "per-country artist counts do not match the artist list".into(),
            ));
        }

        Ok(Some(snapshot))
    }

    /// Persist the snapshot. Failures are logged and reported as `false`.
    pub fn save(&self, snapshot: &CacheSnapshot) -> bool {
        info!("Saving cached data to {}...", self.path.display());
        match self.write(snapshot) {
            Ok(()) => {
                info!("Cache saved ({} artists)", snapshot.tables.artists.len());
                true
            }
            Err(e) => {
                error!("Error saving cache to {}: {}", self.path.display(), e);
                false
            }
        }
    }

    fn write(&self, snapshot: &CacheSnapshot) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Write beside the target and rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(snapshot)?;
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}
