//! Record managers for the DIRENS teacher records system.
//!
//! Managers are the caller-facing contract: each write runs
//! validate → persist → record history as one unit over any
//! [`direns_core::store::RecordStore`] and
//! [`direns_core::store::HistoryLedger`], injected at construction.
//!
//! # Wiring
//!
//! ```rust,ignore
//! let store = Arc::new(JsonStore::open(config.clone()).await?);
//! let ledger = Arc::new(JsonLedger::open(&config).await?);
//! let teachers = TeacherManager::new(store.clone(), ledger);
//! let disciplines = DisciplineManager::new(store);
//! ```

pub mod diff;
pub mod disciplines;
pub mod error;
pub mod teachers;

pub use disciplines::{DisciplineManager, DisciplineStats};
pub use error::{ManagerError, Result};
pub use teachers::{
  ConsistencyIssue, TeacherFilter, TeacherManager, TeacherStats, UpdateOutcome,
};
