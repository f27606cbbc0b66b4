//! JSON-file backend for the DIRENS record store and history ledger.
//!
//! Every document is guarded by an advisory lock file and rewritten whole
//! through a temp-file-and-rename cycle. The blocking file work runs on
//! [`tokio::task::spawn_blocking`] so callers never stall the async runtime.

mod document;
mod ledger;
mod store;

pub mod config;
pub mod error;
pub mod lock;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use ledger::JsonLedger;
pub use store::{JsonStore, StoreIntegrity, StoreStatistics};

#[cfg(test)]
mod tests;
