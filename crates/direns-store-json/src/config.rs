//! Typed configuration for the JSON backend.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use direns_core::store::Collection;

pub const TEACHERS_FILE: &str = "teachers.json";
pub const SCHOOLS_FILE: &str = "schools.json";
pub const DISCIPLINES_FILE: &str = "disciplinas.json";
pub const HISTORY_DIR: &str = "history";
pub const HISTORY_INDEX_FILE: &str = "history_index.json";

/// Where documents live and how long to wait for their locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
  /// Holds `teachers.json`, `schools.json` and the `history/` directory.
  pub data_dir:         PathBuf,
  /// Holds `disciplinas.json`.
  pub disciplines_dir:  PathBuf,
  /// Upper bound on waiting for a document lock.
  pub lock_timeout:     Duration,
  /// Lock files older than this are treated as abandoned and removed.
  /// `None` never breaks a lock.
  pub stale_lock_after: Option<Duration>,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      data_dir:         PathBuf::from("data"),
      disciplines_dir:  PathBuf::from("dados"),
      lock_timeout:     Duration::from_secs(5),
      stale_lock_after: Some(Duration::from_secs(60)),
    }
  }
}

impl StoreConfig {
  /// Both directories under `root`, as `root/data` and `root/dados`.
  pub fn in_dir(root: impl AsRef<Path>) -> Self {
    let root = root.as_ref();
    Self {
      data_dir: root.join("data"),
      disciplines_dir: root.join("dados"),
      ..Self::default()
    }
  }

  pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.data_dir = dir.into();
    self
  }

  pub fn with_disciplines_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.disciplines_dir = dir.into();
    self
  }

  pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
    self.lock_timeout = timeout;
    self
  }

  pub fn with_stale_lock_after(mut self, after: Option<Duration>) -> Self {
    self.stale_lock_after = after;
    self
  }

  pub fn document_path(&self, collection: Collection) -> PathBuf {
    match collection {
      Collection::Teachers => self.data_dir.join(TEACHERS_FILE),
      Collection::Disciplines => self.disciplines_dir.join(DISCIPLINES_FILE),
    }
  }

  pub fn schools_path(&self) -> PathBuf { self.data_dir.join(SCHOOLS_FILE) }

  pub fn history_dir(&self) -> PathBuf { self.data_dir.join(HISTORY_DIR) }

  pub fn history_index_path(&self) -> PathBuf {
    self.history_dir().join(HISTORY_INDEX_FILE)
  }
}
