//! Error type for `direns-store-json`.

use std::path::PathBuf;

use direns_core::store::{StoreError, StoreErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The document's lock file stayed held past the configured timeout.
  #[error("timed out waiting for lock on {}", .0.display())]
  LockTimeout(PathBuf),

  #[error("i/o error on {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("json error in {}: {source}", path.display())]
  Json {
    path:   PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// The document parsed but does not have the expected shape.
  #[error("corrupt document {}: {reason}", path.display())]
  Corrupt { path: PathBuf, reason: String },

  #[error("not found: {0}")]
  NotFound(String),

  /// A history entry without the identity its ledger file is named by.
  #[error("history entry without {0}")]
  IncompleteEntry(&'static str),

  #[error("blocking task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl Error {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }

  pub(crate) fn json(
    path: impl Into<PathBuf>,
  ) -> impl FnOnce(serde_json::Error) -> Self {
    let path = path.into();
    move |source| Self::Json { path, source }
  }

  pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
    Self::Corrupt { path: path.into(), reason: reason.into() }
  }
}

impl StoreError for Error {
  fn kind(&self) -> StoreErrorKind {
    match self {
      Self::LockTimeout(_) => StoreErrorKind::LockTimeout,
      Self::NotFound(_) => StoreErrorKind::NotFound,
      _ => StoreErrorKind::Io,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
