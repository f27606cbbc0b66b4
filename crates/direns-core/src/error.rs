//! Error types for `direns-core`.

use thiserror::Error;

/// Raised when a draft is turned into a typed record. Drafts that passed
/// validation never produce these.
#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown value {value:?} for field {field}")]
  UnknownValue { field: &'static str, value: String },

  #[error("invalid date {0:?} (expected DD-MM-YYYY)")]
  InvalidDate(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
