//! Runtime configuration, deserialised from `direns.toml` and `DIRENS_*`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use direns_store_json::StoreConfig;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub data_dir:        PathBuf,
  pub disciplines_dir: PathBuf,
  pub lock_timeout_ms: u64,
  /// `0` disables stale-lock breaking.
  pub stale_lock_secs: u64,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      data_dir:        PathBuf::from("data"),
      disciplines_dir: PathBuf::from("dados"),
      lock_timeout_ms: 5_000,
      stale_lock_secs: 60,
    }
  }
}

impl AppConfig {
  /// Layer the optional file at `path` under `DIRENS_*` environment variables.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("DIRENS"))
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?
      .try_deserialize()
      .context("failed to deserialise AppConfig")
  }

  pub fn store_config(&self) -> StoreConfig {
    let stale = (self.stale_lock_secs > 0).then(|| Duration::from_secs(self.stale_lock_secs));
    StoreConfig::default()
      .with_data_dir(&self.data_dir)
      .with_disciplines_dir(&self.disciplines_dir)
      .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
      .with_stale_lock_after(stale)
  }
}
