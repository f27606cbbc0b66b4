//! Core types and trait definitions for the DIRENS teacher records system.
//!
//! This crate is deliberately free of filesystem and runtime dependencies.
//! Backends implement the traits in [`store`]; the managers orchestrate them.

pub mod discipline;
pub mod error;
pub mod history;
pub mod school;
pub mod store;
pub mod teacher;
pub mod validate;

pub use error::{Error, Result};
