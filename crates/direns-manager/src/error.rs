//! Manager error type: the uniform result callers see.

use direns_core::store::{StoreError, StoreErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
  /// Input failed validation; nothing was written.
  #[error("{}", .0.join("; "))]
  Validation(Vec<String>),

  #[error("{0}")]
  NotFound(String),

  /// A uniqueness rule would be violated.
  #[error("{0}")]
  Conflict(String),

  /// Exclusive access could not be obtained in time. Safe to retry.
  #[error("tempo esgotado aguardando acesso exclusivo: {0}")]
  LockTimeout(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ManagerError {
  /// Classify a backend failure.
  pub fn from_store<E: StoreError>(err: E) -> Self {
    match err.kind() {
      StoreErrorKind::LockTimeout => Self::LockTimeout(err.to_string()),
      StoreErrorKind::NotFound => Self::NotFound(err.to_string()),
      StoreErrorKind::Io => Self::Store(Box::new(err)),
    }
  }

  /// Human-readable messages, one per violation for validation failures.
  pub fn messages(&self) -> Vec<String> {
    match self {
      Self::Validation(messages) => messages.clone(),
      other => vec![other.to_string()],
    }
  }

  pub fn is_retryable(&self) -> bool { matches!(self, Self::LockTimeout(_)) }
}

impl From<direns_core::Error> for ManagerError {
  fn from(err: direns_core::Error) -> Self {
    Self::Validation(vec![err.to_string()])
  }
}

pub type Result<T, E = ManagerError> = std::result::Result<T, E>;
