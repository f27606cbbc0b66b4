//! Field-level diff between two versions of a teacher record.

use direns_core::teacher::{MONITORED_FIELDS, TeacherRecord};
use serde::Serialize;

/// One monitored field whose text form differs between versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
  pub field: &'static str,
  pub old:   String,
  pub new:   String,
}

/// Changes to [`MONITORED_FIELDS`] going from `old` to `new`, in the order
/// the fields are listed there. Fields outside that list are ignored even if
/// they changed.
pub fn changed_fields(old: &TeacherRecord, new: &TeacherRecord) -> Vec<FieldChange> {
  MONITORED_FIELDS
    .iter()
    .filter_map(|&field| {
      let before = old.field_text(field)?;
      let after = new.field_text(field)?;
      (before != after).then_some(FieldChange { field, old: before, new: after })
    })
    .collect()
}
