//! Change-history types.
//!
//! Every create, update and soft delete of a teacher produces entries in that
//! teacher's ledger. Entries are immutable; a ledger only ever grows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// What happened to the entity.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HistoryAction {
  Create,
  Update,
  Delete,
}

/// Input to [`crate::store::HistoryLedger::append`].
/// The timestamp is always assigned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
  pub siape:     String,
  pub escola:    String,
  pub action:    HistoryAction,
  pub user:      String,
  pub field:     String,
  pub old_value: Option<String>,
  pub new_value: Option<String>,
  pub notes:     String,
}

impl NewHistoryEntry {
  /// Entry with no field values and an empty note.
  pub fn new(
    siape: impl Into<String>,
    escola: impl Into<String>,
    action: HistoryAction,
    user: impl Into<String>,
    field: impl Into<String>,
  ) -> Self {
    Self {
      siape: siape.into(),
      escola: escola.into(),
      action,
      user: user.into(),
      field: field.into(),
      old_value: None,
      new_value: None,
      notes: String::new(),
    }
  }

  pub fn values(
    mut self,
    old_value: Option<String>,
    new_value: Option<String>,
  ) -> Self {
    self.old_value = old_value;
    self.new_value = new_value;
    self
  }

  pub fn notes(mut self, notes: impl Into<String>) -> Self {
    self.notes = notes.into();
    self
  }
}

/// A recorded change. One entry per changed field per operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub siape:     String,
  pub escola:    String,
  /// Ledger-assigned; strictly increasing within one ledger.
  pub timestamp: DateTime<Utc>,
  pub action:    HistoryAction,
  pub user:      String,
  pub field:     String,
  pub old_value: Option<String>,
  pub new_value: Option<String>,
  #[serde(default)]
  pub notes:     String,
}

impl HistoryEntry {
  pub fn from_new(input: NewHistoryEntry, timestamp: DateTime<Utc>) -> Self {
    Self {
      siape: input.siape,
      escola: input.escola,
      timestamp,
      action: input.action,
      user: input.user,
      field: input.field,
      old_value: input.old_value,
      new_value: input.new_value,
      notes: input.notes,
    }
  }
}

/// Aggregate counts over a window of recent history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
  pub total_entries: usize,
  pub actions_count: BTreeMap<HistoryAction, usize>,
  pub users_count:   BTreeMap<String, usize>,
  pub first_entry:   Option<DateTime<Utc>>,
  pub last_entry:    Option<DateTime<Utc>>,
  pub school:        Option<String>,
}

impl HistoryStats {
  /// Summarise `entries`, which may be in any order.
  pub fn from_entries(entries: &[HistoryEntry], school: Option<&str>) -> Self {
    let mut stats = Self {
      total_entries: entries.len(),
      school: school.map(str::to_owned),
      ..Self::default()
    };
    for entry in entries {
      *stats.actions_count.entry(entry.action).or_default() += 1;
      *stats.users_count.entry(entry.user.clone()).or_default() += 1;
    }
    stats.first_entry = entries.iter().map(|e| e.timestamp).min();
    stats.last_entry = entries.iter().map(|e| e.timestamp).max();
    stats
  }
}

/// Result of walking the ledger index. Nothing is repaired except a missing
/// index file, which is recreated empty and listed in `fixed_issues`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
  pub valid:        bool,
  pub issues:       Vec<String>,
  pub fixed_issues: Vec<String>,
  /// Number of ledgers referenced by the index.
  pub ledgers:      usize,
}
