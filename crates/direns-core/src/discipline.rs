//! Discipline (course subject) records.
//!
//! Disciplines are not partitioned by school: `codigo` is globally unique.
//! They are never soft-deleted through a status string; the `active` flag is
//! their only lifecycle state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Collection, Record};

const RESERVED_KEYS: &[&str] = &[
  "active",
  "created_at",
  "created_by",
  "updated_at",
  "updated_by",
];

/// Raw discipline input as submitted by a form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisciplineDraft {
  pub codigo:               String,
  pub nome:                 String,
  pub requisito_especifico: String,
  /// Knowledge area (CNPq), optional.
  pub area:                 String,
  #[serde(flatten)]
  pub extra:                BTreeMap<String, Value>,
}

impl DisciplineDraft {
  /// Trimmed copy with the code upper-cased.
  pub fn normalized(&self) -> Self {
    Self {
      codigo:               self.codigo.trim().to_uppercase(),
      nome:                 self.nome.trim().to_owned(),
      requisito_especifico: self.requisito_especifico.trim().to_owned(),
      area:                 self.area.trim().to_owned(),
      extra:                self.extra.clone(),
    }
  }

  /// Build an active record; metadata is stamped by the caller.
  pub fn build(&self) -> DisciplineRecord {
    let area = self.area.trim();
    DisciplineRecord {
      codigo:               normalize_code(&self.codigo),
      nome:                 self.nome.trim().to_owned(),
      requisito_especifico: self.requisito_especifico.trim().to_owned(),
      area:                 (!area.is_empty()).then(|| area.to_owned()),
      active:               true,
      created_at:           None,
      created_by:           None,
      updated_at:           None,
      updated_by:           None,
      extra:                self
        .extra
        .iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
    }
  }
}

/// Canonical form of a discipline code used for storage and lookup.
pub fn normalize_code(raw: &str) -> String { raw.trim().to_uppercase() }

fn default_active() -> bool { true }

/// A persisted discipline. Identity is `codigo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisciplineRecord {
  pub codigo:               String,
  pub nome:                 String,
  #[serde(default)]
  pub requisito_especifico: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub area:                 Option<String>,
  #[serde(default = "default_active")]
  pub active:               bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at:           Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_by:           Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at:           Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_by:           Option<String>,
  #[serde(flatten)]
  pub extra:                BTreeMap<String, Value>,
}

impl Record for DisciplineRecord {
  const COLLECTION: Collection = Collection::Disciplines;

  fn key(&self) -> &str { &self.codigo }

  fn partition(&self) -> Option<&str> { None }
}
