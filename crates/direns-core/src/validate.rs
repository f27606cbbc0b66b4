//! The validation engine: pure checks over drafts before they are persisted.
//!
//! Teacher validation runs in two phases. Missing required fields are
//! reported alone; only a complete draft gets the format, enumeration and
//! business-rule checks, and then every applicable violation is collected.

use std::{fmt, sync::LazyLock};

use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use serde::Serialize;

use crate::{
  discipline::DisciplineDraft,
  teacher::{Career, PostgradLevel, Sex, TeacherDraft, Workload},
};

/// Fields every teacher draft must carry.
pub const REQUIRED_TEACHER_FIELDS: &[&str] = &[
  "siape",
  "nome",
  "data_nascimento",
  "sexo",
  "carga_horaria",
  "carreira",
  "data_ingresso",
  "pos_graduacao",
];

pub const MIN_AGE: u32 = 18;
/// Ages above this are accepted but flagged.
pub const MAX_PLAUSIBLE_AGE: u32 = 80;

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^([0-9]{2})-([0-9]{2})-([0-9]{4})$").expect("valid regex")
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
    .expect("valid regex")
});

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[A-ZÁÀÂÃÉÈÊÍÏÓÔÕÖÚÇÑ\s]+$").expect("valid regex")
});

// ─── Result types ────────────────────────────────────────────────────────────

/// One reason a draft cannot be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
  MissingField {
    field: &'static str,
  },
  Format {
    field:   &'static str,
    message: &'static str,
  },
  /// A value outside a closed list.
  UnknownValue {
    field: &'static str,
    value: String,
  },
  Rule {
    field:   &'static str,
    message: &'static str,
  },
}

impl Violation {
  pub fn field(&self) -> &'static str {
    match self {
      Self::MissingField { field }
      | Self::Format { field, .. }
      | Self::UnknownValue { field, .. }
      | Self::Rule { field, .. } => field,
    }
  }

  pub fn is_missing_field(&self) -> bool { matches!(self, Self::MissingField { .. }) }
}

impl fmt::Display for Violation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::MissingField { field } => write!(f, "Campo obrigatório: {field}"),
      Self::Format { message, .. } | Self::Rule { message, .. } => {
        f.write_str(message)
      }
      Self::UnknownValue { field: "sexo", .. } => {
        f.write_str("Sexo deve ser 'M' ou 'F'")
      }
      Self::UnknownValue { field, value } => {
        let label = match *field {
          "carga_horaria" => "Carga horária",
          "carreira" => "Carreira",
          "pos_graduacao" => "Pós-graduação",
          other => other,
        };
        write!(f, "{label} inválida: {value}")
      }
    }
  }
}

/// Outcome of validating one draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validation {
  pub violations: Vec<Violation>,
  /// Non-blocking observations, e.g. an implausibly high age.
  pub notes:      Vec<String>,
}

impl Validation {
  pub fn is_valid(&self) -> bool { self.violations.is_empty() }

  /// Human-readable violation messages, in detection order.
  pub fn messages(&self) -> Vec<String> {
    self.violations.iter().map(ToString::to_string).collect()
  }

  fn push(&mut self, violation: Violation) { self.violations.push(violation); }
}

// ─── Predicates ──────────────────────────────────────────────────────────────

/// A SIAPE is exactly seven digits once everything else is stripped.
pub fn is_valid_siape(raw: &str) -> bool {
  raw.chars().filter(char::is_ascii_digit).count() == 7
}

/// Parse a `DD-MM-YYYY` date that exists on the calendar and whose year lies
/// in `1900..=today.year() + 1`.
pub fn parse_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
  let caps = DATE_PATTERN.captures(raw.trim())?;
  let day: u32 = caps[1].parse().ok()?;
  let month: u32 = caps[2].parse().ok()?;
  let year: i32 = caps[3].parse().ok()?;
  if !(1900..=today.year() + 1).contains(&year) {
    return None;
  }
  NaiveDate::from_ymd_opt(year, month, day)
}

/// Email is optional; an empty value is valid.
pub fn is_valid_email(raw: &str) -> bool {
  let raw = raw.trim();
  raw.is_empty() || EMAIL_PATTERN.is_match(raw)
}

/// Phone is optional; otherwise it must carry 10 (landline) or 11 (mobile)
/// digits.
pub fn is_valid_phone(raw: &str) -> bool {
  let raw = raw.trim();
  let digits = raw.chars().filter(char::is_ascii_digit).count();
  raw.is_empty() || digits == 10 || digits == 11
}

/// Completed years between `birth` and `on`.
pub fn age_on(birth: NaiveDate, on: NaiveDate) -> u32 {
  on.years_since(birth).unwrap_or(0)
}

// ─── Teacher ─────────────────────────────────────────────────────────────────

/// Validate a teacher draft as of `today`.
pub fn validate_teacher(draft: &TeacherDraft, today: NaiveDate) -> Validation {
  let mut result = Validation::default();

  for &field in REQUIRED_TEACHER_FIELDS {
    if required_value(draft, field).trim().is_empty() {
      result.push(Violation::MissingField { field });
    }
  }
  if !result.is_valid() {
    return result;
  }

  // ── Formats ─────────────────────────────────────────────────────────────
  if !is_valid_siape(&draft.siape) {
    result.push(Violation::Format {
      field:   "siape",
      message: "SIAPE deve ter exatamente 7 dígitos numéricos",
    });
  }

  let birth = parse_date(&draft.data_nascimento, today);
  if birth.is_none() {
    result.push(Violation::Format {
      field:   "data_nascimento",
      message: "Data de nascimento inválida (formato: DD-MM-AAAA)",
    });
  }

  let admission = parse_date(&draft.data_ingresso, today);
  if admission.is_none() {
    result.push(Violation::Format {
      field:   "data_ingresso",
      message: "Data de ingresso inválida (formato: DD-MM-AAAA)",
    });
  }

  if !is_valid_email(&draft.email) {
    result.push(Violation::Format { field: "email", message: "Email inválido" });
  }
  if !is_valid_phone(&draft.telefone) {
    result.push(Violation::Format {
      field:   "telefone",
      message: "Telefone inválido",
    });
  }

  // ── Closed lists ────────────────────────────────────────────────────────
  check_enum::<Workload>(&mut result, "carga_horaria", &draft.carga_horaria);
  check_enum::<Career>(&mut result, "carreira", &draft.carreira);
  let level =
    check_enum::<PostgradLevel>(&mut result, "pos_graduacao", &draft.pos_graduacao);
  check_enum::<Sex>(&mut result, "sexo", &draft.sexo);

  // ── Business rules ──────────────────────────────────────────────────────
  if let Some(birth) = birth {
    let age = age_on(birth, today);
    if birth > today || age < MIN_AGE {
      result.push(Violation::Rule {
        field:   "data_nascimento",
        message: "Professor deve ter pelo menos 18 anos",
      });
    } else if age > MAX_PLAUSIBLE_AGE {
      result
        .notes
        .push("Verifique a data de nascimento (idade muito alta)".to_owned());
    }
  }

  if let Some(admission) = admission {
    if admission > today {
      result.push(Violation::Rule {
        field:   "data_ingresso",
        message: "Data de ingresso não pode ser futura",
      });
    }
    let adulthood =
      birth.and_then(|b| b.checked_add_months(Months::new(MIN_AGE * 12)));
    if adulthood.is_some_and(|adult| admission < adult) {
      result.push(Violation::Rule {
        field:   "data_ingresso",
        message: "Data de ingresso deve ser posterior aos 18 anos",
      });
    }
  }

  if level.is_some_and(PostgradLevel::requires_degree)
    && draft.graduacao.trim().is_empty()
  {
    result.push(Violation::Rule {
      field:   "graduacao",
      message: "Graduação é obrigatória para pós-graduação",
    });
  }

  // ── Name ────────────────────────────────────────────────────────────────
  let name = draft.nome.trim();
  let len = name.chars().count();
  if len < 2 {
    result.push(Violation::Format {
      field:   "nome",
      message: "Nome deve ter pelo menos 2 caracteres",
    });
  } else if len > 100 {
    result.push(Violation::Format {
      field:   "nome",
      message: "Nome muito longo (máximo 100 caracteres)",
    });
  }
  if !NAME_PATTERN.is_match(name) {
    result.push(Violation::Format {
      field:   "nome",
      message: "Nome deve conter apenas letras e espaços",
    });
  }

  result
}

fn required_value<'a>(draft: &'a TeacherDraft, field: &str) -> &'a str {
  match field {
    "siape" => &draft.siape,
    "nome" => &draft.nome,
    "data_nascimento" => &draft.data_nascimento,
    "sexo" => &draft.sexo,
    "carga_horaria" => &draft.carga_horaria,
    "carreira" => &draft.carreira,
    "data_ingresso" => &draft.data_ingresso,
    "pos_graduacao" => &draft.pos_graduacao,
    _ => "",
  }
}

fn check_enum<T: std::str::FromStr>(
  result: &mut Validation,
  field: &'static str,
  raw: &str,
) -> Option<T> {
  match raw.trim().parse() {
    Ok(value) => Some(value),
    Err(_) => {
      result.push(Violation::UnknownValue { field, value: raw.to_owned() });
      None
    }
  }
}

// ─── Discipline ──────────────────────────────────────────────────────────────

/// Validate a discipline draft. All violations are collected.
pub fn validate_discipline(draft: &DisciplineDraft) -> Validation {
  let mut result = Validation::default();

  let code = draft.codigo.trim();
  let name = draft.nome.trim();
  let requirement = draft.requisito_especifico.trim();

  for (field, value) in [
    ("codigo", code),
    ("nome", name),
    ("requisito_especifico", requirement),
  ] {
    if value.is_empty() {
      result.push(Violation::MissingField { field });
    }
  }

  if !code.is_empty() {
    let len = code.chars().count();
    let charset_ok = code
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
      && code.chars().any(|c| c.is_ascii_alphanumeric());
    if len < 3 {
      result.push(Violation::Format {
        field:   "codigo",
        message: "Código deve ter pelo menos 3 caracteres",
      });
    } else if len > 10 {
      result.push(Violation::Format {
        field:   "codigo",
        message: "Código deve ter no máximo 10 caracteres",
      });
    } else if !charset_ok {
      result.push(Violation::Format {
        field:   "codigo",
        message: "Código deve conter apenas letras, números, hífens e underscores",
      });
    }
  }

  if !name.is_empty() {
    let len = name.chars().count();
    if len < 3 {
      result.push(Violation::Format {
        field:   "nome",
        message: "Nome deve ter pelo menos 3 caracteres",
      });
    } else if len > 100 {
      result.push(Violation::Format {
        field:   "nome",
        message: "Nome deve ter no máximo 100 caracteres",
      });
    }
  }

  if requirement.chars().count() > 200 {
    result.push(Violation::Format {
      field:   "requisito_especifico",
      message: "Requisito específico deve ter no máximo 200 caracteres",
    });
  }

  result
}
