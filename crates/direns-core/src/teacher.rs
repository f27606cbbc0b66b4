//! Teacher records, the main entity of the system.
//!
//! Callers submit a [`TeacherDraft`] (raw form input, all strings). The
//! validation engine checks drafts; the managers turn valid drafts into typed
//! [`TeacherRecord`]s, which are what the store persists.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{Error, Result, store::{Collection, Record}};

/// Status given to every newly created teacher.
pub const STATUS_ACTIVE: &str = "Ativo";

/// Status marking a soft-deleted teacher.
pub const STATUS_DELETED: &str = "Excluído";

/// Literal recorded as the new value of a DELETE history entry.
pub const DELETED_MARKER: &str = "EXCLUÍDO";

/// Fields compared when computing the history of an update. Changes to any
/// other field are persisted but not recorded.
pub const MONITORED_FIELDS: &[&str] = &[
  "nome",
  "data_nascimento",
  "sexo",
  "estado",
  "email",
  "telefone",
  "carga_horaria",
  "carreira",
  "data_ingresso",
  "status",
  "area_atuacao",
  "pos_graduacao",
  "graduacao",
  "instituicao_graduacao",
  "curso_pos",
  "instituicao_pos",
];

/// Keys owned by the record itself; never accepted through the `extra` map.
const RESERVED_KEYS: &[&str] = &[
  "escola",
  "created_at",
  "created_by",
  "updated_at",
  "updated_by",
  "deleted_at",
  "deleted_by",
];

// ─── Closed enumerations ─────────────────────────────────────────────────────

/// Weekly workload regime.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, EnumIter, AsRefStr,
)]
pub enum Workload {
  #[serde(rename = "20H")]
  #[strum(serialize = "20H")]
  Hours20,
  #[serde(rename = "40H")]
  #[strum(serialize = "40H")]
  Hours40,
  /// 40 hours with exclusive dedication.
  #[serde(rename = "40H_DE")]
  #[strum(serialize = "40H_DE")]
  Hours40Exclusive,
}

/// Teaching career track.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, EnumIter, AsRefStr,
)]
pub enum Career {
  /// Magistério Superior.
  #[serde(rename = "MS")]
  #[strum(serialize = "MS")]
  Ms,
  /// Ensino Básico, Técnico e Tecnológico.
  #[serde(rename = "EBTT")]
  #[strum(serialize = "EBTT")]
  Ebtt,
}

/// Highest academic level attained. Ordered from lowest to highest.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum PostgradLevel {
  #[serde(rename = "GRADUAÇÃO")]
  #[strum(serialize = "GRADUAÇÃO")]
  Graduacao,
  #[serde(rename = "ESPECIALIZAÇÃO")]
  #[strum(serialize = "ESPECIALIZAÇÃO")]
  Especializacao,
  #[serde(rename = "MESTRADO")]
  #[strum(serialize = "MESTRADO")]
  Mestrado,
  #[serde(rename = "DOUTORADO")]
  #[strum(serialize = "DOUTORADO")]
  Doutorado,
}

impl PostgradLevel {
  /// Levels above plain graduation require the underlying degree to be named.
  pub fn requires_degree(self) -> bool { self > Self::Graduacao }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, EnumIter, AsRefStr,
)]
pub enum Sex {
  #[serde(rename = "M")]
  #[strum(serialize = "M")]
  Male,
  #[serde(rename = "F")]
  #[strum(serialize = "F")]
  Female,
}

// ─── Dates ───────────────────────────────────────────────────────────────────

/// Serde adapter for the `DD-MM-YYYY` calendar dates used in stored records.
pub mod dmy {
  use chrono::NaiveDate;
  use serde::{Deserialize, Deserializer, Serializer};

  pub const FORMAT: &str = "%d-%m-%Y";

  pub fn serialize<S: Serializer>(
    date: &NaiveDate,
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.format(FORMAT).to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    NaiveDate::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
  }
}

fn format_date(date: NaiveDate) -> String { date.format(dmy::FORMAT).to_string() }

fn default_status() -> String { STATUS_ACTIVE.to_owned() }

// ─── TeacherDraft ────────────────────────────────────────────────────────────

/// Raw teacher input as submitted by a form. Every field is a string so that
/// incomplete or malformed input can still be represented and validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeacherDraft {
  pub siape:                 String,
  pub nome:                  String,
  pub data_nascimento:       String,
  pub sexo:                  String,
  pub carga_horaria:         String,
  pub carreira:              String,
  pub data_ingresso:         String,
  pub pos_graduacao:         String,
  pub status:                String,
  /// Brazilian state (UF).
  pub estado:                String,
  pub email:                 String,
  pub telefone:              String,
  pub area_atuacao:          String,
  pub graduacao:             String,
  pub instituicao_graduacao: String,
  pub curso_pos:             String,
  pub instituicao_pos:       String,
  /// Form fields this system does not know about; carried through untouched.
  #[serde(flatten)]
  pub extra:                 BTreeMap<String, Value>,
}

impl TeacherDraft {
  /// Canonical form applied before validation: trims every field, upper-cases
  /// the name, keeps only the digits of the SIAPE and pretty-prints phones.
  pub fn normalized(&self) -> Self {
    let trim = |s: &String| s.trim().to_owned();
    Self {
      siape:                 self.siape.chars().filter(char::is_ascii_digit).collect(),
      nome:                  self.nome.trim().to_uppercase(),
      data_nascimento:       trim(&self.data_nascimento),
      sexo:                  self.sexo.trim().to_uppercase(),
      carga_horaria:         trim(&self.carga_horaria),
      carreira:              trim(&self.carreira),
      data_ingresso:         trim(&self.data_ingresso),
      pos_graduacao:         trim(&self.pos_graduacao),
      status:                trim(&self.status),
      estado:                trim(&self.estado),
      email:                 trim(&self.email),
      telefone:              format_phone(self.telefone.trim()),
      area_atuacao:          trim(&self.area_atuacao),
      graduacao:             trim(&self.graduacao),
      instituicao_graduacao: trim(&self.instituicao_graduacao),
      curso_pos:             trim(&self.curso_pos),
      instituicao_pos:       trim(&self.instituicao_pos),
      extra:                 self.extra.clone(),
    }
  }

  /// Build the typed record for `school`. Metadata is left empty for the
  /// caller to stamp.
  ///
  /// Fails on values the validation engine would also reject; call this only
  /// on drafts that passed [`crate::validate::validate_teacher`].
  pub fn build(&self, school: &str) -> Result<TeacherRecord> {
    let opt = |s: &String| {
      let s = s.trim();
      (!s.is_empty()).then(|| s.to_owned())
    };
    let extra = self
      .extra
      .iter()
      .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();

    Ok(TeacherRecord {
      siape:                 self.siape.trim().to_owned(),
      escola:                school.to_owned(),
      nome:                  self.nome.trim().to_owned(),
      data_nascimento:       parse_dmy(&self.data_nascimento)?,
      sexo:                  parse_enum("sexo", &self.sexo)?,
      carga_horaria:         parse_enum("carga_horaria", &self.carga_horaria)?,
      carreira:              parse_enum("carreira", &self.carreira)?,
      pos_graduacao:         parse_enum("pos_graduacao", &self.pos_graduacao)?,
      data_ingresso:         parse_dmy(&self.data_ingresso)?,
      status:                opt(&self.status).unwrap_or_else(default_status),
      estado:                opt(&self.estado),
      email:                 opt(&self.email),
      telefone:              opt(&self.telefone),
      area_atuacao:          opt(&self.area_atuacao),
      graduacao:             opt(&self.graduacao),
      instituicao_graduacao: opt(&self.instituicao_graduacao),
      curso_pos:             opt(&self.curso_pos),
      instituicao_pos:       opt(&self.instituicao_pos),
      created_at:            None,
      created_by:            None,
      updated_at:            None,
      updated_by:            None,
      deleted_at:            None,
      deleted_by:            None,
      extra,
    })
  }
}

impl From<&TeacherRecord> for TeacherDraft {
  fn from(r: &TeacherRecord) -> Self {
    let text = |o: &Option<String>| o.clone().unwrap_or_default();
    Self {
      siape:                 r.siape.clone(),
      nome:                  r.nome.clone(),
      data_nascimento:       format_date(r.data_nascimento),
      sexo:                  r.sexo.to_string(),
      carga_horaria:         r.carga_horaria.to_string(),
      carreira:              r.carreira.to_string(),
      data_ingresso:         format_date(r.data_ingresso),
      pos_graduacao:         r.pos_graduacao.to_string(),
      status:                r.status.clone(),
      estado:                text(&r.estado),
      email:                 text(&r.email),
      telefone:              text(&r.telefone),
      area_atuacao:          text(&r.area_atuacao),
      graduacao:             text(&r.graduacao),
      instituicao_graduacao: text(&r.instituicao_graduacao),
      curso_pos:             text(&r.curso_pos),
      instituicao_pos:       text(&r.instituicao_pos),
      extra:                 r.extra.clone(),
    }
  }
}

fn parse_dmy(raw: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(raw.trim(), dmy::FORMAT)
    .map_err(|_| Error::InvalidDate(raw.to_owned()))
}

fn parse_enum<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T> {
  raw.trim().parse().map_err(|_| Error::UnknownValue {
    field,
    value: raw.to_owned(),
  })
}

/// `(DD) NNNNN-NNNN` for mobiles, `(DD) NNNN-NNNN` for landlines. Anything
/// that is not 10 or 11 digits is returned unchanged for validation to flag.
pub fn format_phone(raw: &str) -> String {
  let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
  match digits.len() {
    11 => format!("({}) {}-{}", &digits[..2], &digits[2..7], &digits[7..]),
    10 => format!("({}) {}-{}", &digits[..2], &digits[2..6], &digits[6..]),
    _ => raw.to_owned(),
  }
}

// ─── TeacherRecord ───────────────────────────────────────────────────────────

/// A persisted teacher. Identity is `(escola, siape)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherRecord {
  pub siape:                 String,
  pub escola:                String,
  pub nome:                  String,
  #[serde(with = "dmy")]
  pub data_nascimento:       NaiveDate,
  pub sexo:                  Sex,
  pub carga_horaria:         Workload,
  pub carreira:              Career,
  pub pos_graduacao:         PostgradLevel,
  #[serde(with = "dmy")]
  pub data_ingresso:         NaiveDate,
  #[serde(default = "default_status")]
  pub status:                String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub estado:                Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email:                 Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub telefone:              Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub area_atuacao:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub graduacao:             Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instituicao_graduacao: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub curso_pos:             Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instituicao_pos:       Option<String>,

  // ── Metadata ────────────────────────────────────────────────────────────
  /// Set once on create and carried over by every update.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at:            Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_by:            Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at:            Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_by:            Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deleted_at:            Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deleted_by:            Option<String>,

  /// Side-map for fields outside the known schema.
  #[serde(flatten)]
  pub extra:                 BTreeMap<String, Value>,
}

impl TeacherRecord {
  pub fn is_deleted(&self) -> bool { self.status == STATUS_DELETED }

  /// The text form of a monitored field, as recorded in history entries.
  /// Absent optional fields render as the empty string. Returns `None` for
  /// names outside [`MONITORED_FIELDS`].
  pub fn field_text(&self, field: &str) -> Option<String> {
    let text = |o: &Option<String>| o.clone().unwrap_or_default();
    let value = match field {
      "nome" => self.nome.clone(),
      "data_nascimento" => format_date(self.data_nascimento),
      "sexo" => self.sexo.to_string(),
      "estado" => text(&self.estado),
      "email" => text(&self.email),
      "telefone" => text(&self.telefone),
      "carga_horaria" => self.carga_horaria.to_string(),
      "carreira" => self.carreira.to_string(),
      "data_ingresso" => format_date(self.data_ingresso),
      "status" => self.status.clone(),
      "area_atuacao" => text(&self.area_atuacao),
      "pos_graduacao" => self.pos_graduacao.to_string(),
      "graduacao" => text(&self.graduacao),
      "instituicao_graduacao" => text(&self.instituicao_graduacao),
      "curso_pos" => text(&self.curso_pos),
      "instituicao_pos" => text(&self.instituicao_pos),
      _ => return None,
    };
    Some(value)
  }
}

impl Record for TeacherRecord {
  const COLLECTION: Collection = Collection::Teachers;

  fn key(&self) -> &str { &self.siape }

  fn partition(&self) -> Option<&str> { Some(&self.escola) }
}
