//! The `RecordStore` and `HistoryLedger` traits and supporting types.
//!
//! The traits are implemented by storage backends (e.g. `direns-store-json`).
//! The managers depend on these abstractions, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
  history::{HistoryAction, HistoryEntry, HistoryStats, IntegrityReport, NewHistoryEntry},
  school::School,
};

/// Number of recent entries the derived history queries look at.
pub const FILTER_WINDOW: usize = 1000;

/// Window used for [`HistoryLedger::stats`].
pub const STATS_WINDOW: usize = 10_000;

// ─── Collections and records ─────────────────────────────────────────────────

/// A named set of records persisted together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  /// Partitioned by school, keyed by SIAPE.
  Teachers,
  /// Flat, keyed by discipline code.
  Disciplines,
}

impl Collection {
  /// The top-level key holding the records in the collection's document.
  pub fn root_key(self) -> &'static str {
    match self {
      Self::Teachers => "teachers",
      Self::Disciplines => "disciplinas",
    }
  }

  pub fn is_partitioned(self) -> bool { matches!(self, Self::Teachers) }
}

/// An entity type a [`RecordStore`] can persist.
pub trait Record:
  Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
  const COLLECTION: Collection;

  /// Unique key within the record's partition.
  fn key(&self) -> &str;

  /// The school partition, or `None` for unpartitioned collections.
  fn partition(&self) -> Option<&str>;
}

/// Outcome of [`RecordStore::update_with`]: the record as it was before the
/// write and as it was written.
#[derive(Debug, Clone)]
pub struct Written<R> {
  pub previous: Option<R>,
  pub record:   R,
}

// ─── Error classification ────────────────────────────────────────────────────

/// Backend-independent classification of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
  /// Exclusive access could not be obtained within the configured bound.
  /// Safe to retry.
  LockTimeout,
  NotFound,
  /// Any other persistence failure: disk, permissions, corrupt documents.
  Io,
}

/// Errors returned by store backends expose their kind so that callers can
/// react without knowing the concrete error type.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn kind(&self) -> StoreErrorKind;
}

// ─── RecordStore ─────────────────────────────────────────────────────────────

/// Key-addressed document store for records.
///
/// Every write replaces the whole document atomically; a failed write leaves
/// the previous document untouched.
pub trait RecordStore: Send + Sync {
  type Error: StoreError;

  /// Insert or replace `record`, creating its partition if needed.
  fn put<R: Record>(
    &self,
    record: R,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Read the record under `key`, pass it to `f` and store what `f` returns,
  /// all under one exclusive hold of the document. When `f` refuses, nothing
  /// is written and its error comes back as the inner `Err`.
  ///
  /// `f` must return a record with the same key and partition.
  fn update_with<'a, R, E, F>(
    &'a self,
    school: Option<&'a str>,
    key: &'a str,
    f: F,
  ) -> impl Future<Output = Result<Result<Written<R>, E>, Self::Error>> + Send + 'a
  where
    R: Record,
    E: Send + 'static,
    F: FnOnce(Option<&R>) -> Result<R, E> + Send + 'static;

  /// Fetch one record. `school` is ignored for unpartitioned collections.
  fn get<'a, R: Record>(
    &'a self,
    school: Option<&'a str>,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<R>, Self::Error>> + Send + 'a;

  /// All records of a partition in storage order. For a partitioned
  /// collection, `None` lists every partition in turn.
  fn list<'a, R: Record>(
    &'a self,
    school: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<R>, Self::Error>> + Send + 'a;

  /// Remove a record outright. Administrative use only; business deletes go
  /// through [`RecordStore::put`] with a soft-delete marker.
  ///
  /// Returns `false` if there was nothing to remove.
  fn delete_physical<'a, R: Record>(
    &'a self,
    school: Option<&'a str>,
    key: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// The school directory.
  fn schools(
    &self,
  ) -> impl Future<Output = Result<Vec<School>, Self::Error>> + Send + '_;
}

// ─── HistoryLedger ───────────────────────────────────────────────────────────

/// Append-only per-teacher change log.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded runtimes.
pub trait HistoryLedger: Send + Sync {
  type Error: StoreError;

  /// Record `entry` in its teacher's ledger and return the stored entry. The
  /// timestamp is assigned by the ledger.
  fn append(
    &self,
    entry: NewHistoryEntry,
  ) -> impl Future<Output = Result<HistoryEntry, Self::Error>> + Send + '_;

  /// One teacher's entries, newest first. Empty if the teacher has no ledger.
  fn query<'a>(
    &'a self,
    siape: &'a str,
    school: &'a str,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + 'a;

  /// Entries across every indexed ledger (optionally one school's), newest
  /// first, truncated to `limit`.
  fn recent<'a>(
    &'a self,
    school: Option<&'a str>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + 'a;

  /// Purge one teacher's ledger and its index entry. Returns `false` if
  /// there was no ledger.
  fn delete<'a>(
    &'a self,
    siape: &'a str,
    school: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Walk the index and report problems without repairing entries.
  fn check_integrity(
    &self,
  ) -> impl Future<Output = Result<IntegrityReport, Self::Error>> + Send + '_;

  /// Regenerate the index from the ledger files on disk. Returns the number
  /// of ledgers indexed.
  fn rebuild_index(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Derived queries ───────────────────────────────────────────────────

  fn by_action<'a>(
    &'a self,
    action: HistoryAction,
    school: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + 'a
  {
    async move {
      let mut entries = self.recent(school, FILTER_WINDOW).await?;
      entries.retain(|e| e.action == action);
      Ok(entries)
    }
  }

  fn by_user<'a>(
    &'a self,
    user: &'a str,
    school: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + 'a
  {
    async move {
      let mut entries = self.recent(school, FILTER_WINDOW).await?;
      entries.retain(|e| e.user == user);
      Ok(entries)
    }
  }

  /// Entries with `start <= timestamp <= end`.
  fn by_date_range<'a>(
    &'a self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    school: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + 'a
  {
    async move {
      let mut entries = self.recent(school, FILTER_WINDOW).await?;
      entries.retain(|e| start <= e.timestamp && e.timestamp <= end);
      Ok(entries)
    }
  }

  fn stats<'a>(
    &'a self,
    school: Option<&'a str>,
  ) -> impl Future<Output = Result<HistoryStats, Self::Error>> + Send + 'a {
    async move {
      let entries = self.recent(school, STATS_WINDOW).await?;
      Ok(HistoryStats::from_entries(&entries, school))
    }
  }
}
