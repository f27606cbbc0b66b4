//! [`TeacherManager`] creates, updates and soft-deletes teachers with history.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use direns_core::{
  history::{HistoryAction, HistoryEntry, NewHistoryEntry},
  store::{HistoryLedger, RecordStore},
  teacher::{
    Career, DELETED_MARKER, PostgradLevel, STATUS_ACTIVE, STATUS_DELETED,
    TeacherDraft, TeacherRecord, Workload,
  },
  validate::{is_valid_siape, parse_date, validate_teacher},
};

use crate::{
  ManagerError, Result,
  diff::{self, FieldChange},
};

/// Field name recorded on CREATE and DELETE entries, which concern the whole
/// record rather than one field.
const WHOLE_RECORD: &str = "professor";

// ─── Types ───────────────────────────────────────────────────────────────────

/// Result of [`TeacherManager::update`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
  pub record:  TeacherRecord,
  /// One per history entry emitted. Empty when no monitored field changed.
  pub changes: Vec<FieldChange>,
}

/// Search criteria. Every `Some` filter must match.
#[derive(Debug, Clone, Default)]
pub struct TeacherFilter {
  /// Case-insensitive substring of the name, or substring of the SIAPE.
  pub term:            Option<String>,
  pub pos_graduacao:   Option<PostgradLevel>,
  pub carga_horaria:   Option<Workload>,
  pub carreira:        Option<Career>,
  pub status:          Option<String>,
  /// Soft-deleted teachers are skipped unless this is set or `status` asks
  /// for them explicitly.
  pub include_deleted: bool,
}

impl TeacherFilter {
  pub fn matches(&self, teacher: &TeacherRecord) -> bool {
    if let Some(term) = self.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
      let term = term.to_lowercase();
      if !teacher.nome.to_lowercase().contains(&term) && !teacher.siape.contains(&term) {
        return false;
      }
    }
    self.pos_graduacao.is_none_or(|p| teacher.pos_graduacao == p)
      && self.carga_horaria.is_none_or(|c| teacher.carga_horaria == c)
      && self.carreira.is_none_or(|c| teacher.carreira == c)
      && self.status.as_deref().is_none_or(|s| teacher.status == s)
  }

  fn admits_deleted(&self) -> bool {
    self.include_deleted || self.status.as_deref() == Some(STATUS_DELETED)
  }
}

/// Problems found in one stored teacher by
/// [`TeacherManager::check_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyIssue {
  pub siape:  String,
  pub nome:   String,
  pub issues: Vec<String>,
}

impl ConsistencyIssue {
  fn inspect(teacher: &TeacherRecord, today: NaiveDate) -> Option<Self> {
    let mut issues = Vec::new();

    let present = [
      ("siape", !teacher.siape.trim().is_empty()),
      ("nome", !teacher.nome.trim().is_empty()),
      ("estado", has_text(&teacher.estado)),
      ("email", has_text(&teacher.email)),
      ("telefone", has_text(&teacher.telefone)),
    ];
    for (field, ok) in present {
      if !ok {
        issues.push(format!("Campo obrigatório ausente: {field}"));
      }
    }

    if !is_valid_siape(&teacher.siape) {
      issues.push("SIAPE inválido".to_owned());
    }
    let draft = TeacherDraft::from(teacher);
    if parse_date(&draft.data_nascimento, today).is_none() {
      issues.push("Data de nascimento inválida".to_owned());
    }
    if parse_date(&draft.data_ingresso, today).is_none() {
      issues.push("Data de ingresso inválida".to_owned());
    }

    (!issues.is_empty()).then(|| Self {
      siape: teacher.siape.clone(),
      nome: teacher.nome.clone(),
      issues,
    })
  }
}

fn has_text(value: &Option<String>) -> bool {
  value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Distribution of one school's non-deleted teachers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeacherStats {
  pub total:             usize,
  pub ativos:            usize,
  pub por_pos_graduacao: BTreeMap<String, usize>,
  pub por_carga_horaria: BTreeMap<String, usize>,
  pub por_carreira:      BTreeMap<String, usize>,
  pub por_status:        BTreeMap<String, usize>,
}

impl TeacherStats {
  fn from_teachers(teachers: &[TeacherRecord]) -> Self {
    let mut stats = Self { total: teachers.len(), ..Self::default() };
    for t in teachers {
      if t.status == STATUS_ACTIVE {
        stats.ativos += 1;
      }
      *stats.por_pos_graduacao.entry(t.pos_graduacao.to_string()).or_default() += 1;
      *stats.por_carga_horaria.entry(t.carga_horaria.to_string()).or_default() += 1;
      *stats.por_carreira.entry(t.carreira.to_string()).or_default() += 1;
      *stats.por_status.entry(t.status.clone()).or_default() += 1;
    }
    stats
  }
}

// ─── Manager ─────────────────────────────────────────────────────────────────

/// Teacher operations over an injected store and ledger.
pub struct TeacherManager<S, L> {
  store:  Arc<S>,
  ledger: Arc<L>,
}

impl<S, L> Clone for TeacherManager<S, L> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), ledger: self.ledger.clone() }
  }
}

impl<S, L> TeacherManager<S, L>
where
  S: RecordStore,
  L: HistoryLedger,
{
  pub fn new(store: Arc<S>, ledger: Arc<L>) -> Self { Self { store, ledger } }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn ledger(&self) -> &Arc<L> { &self.ledger }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Register a new teacher at `school`.
  ///
  /// The draft is normalised (names upper-cased, SIAPE digits only) before
  /// validation. Fails with `Conflict` if a non-deleted teacher already holds
  /// the SIAPE at this school; a soft-deleted one is replaced.
  pub async fn create(
    &self,
    school: &str,
    draft: &TeacherDraft,
    user: &str,
  ) -> Result<TeacherRecord> {
    let draft = draft.normalized();
    let siape = draft.siape.clone();
    let result = self.try_create(school, draft, user).await;
    self.report("create", school, &siape, result)
  }

  async fn try_create(
    &self,
    school: &str,
    draft: TeacherDraft,
    user: &str,
  ) -> Result<TeacherRecord> {
    self.ensure_school(school).await?;
    check(&draft)?;

    let mut record = draft.build(school)?;
    record.status = STATUS_ACTIVE.to_owned();
    record.created_at = Some(Utc::now());
    record.created_by = Some(user.to_owned());

    // The duplicate check and the write share one hold of the document.
    let conflict = ManagerError::Conflict(format!(
      "Professor com SIAPE {} já cadastrado na escola {school}",
      draft.siape
    ));
    let record = self
      .store
      .update_with(Some(school), &draft.siape, move |current: Option<&TeacherRecord>| {
        if current.is_some_and(|r| !r.is_deleted()) {
          return Err(conflict);
        }
        Ok(record)
      })
      .await
      .map_err(ManagerError::from_store)??
      .record;

    let entry = NewHistoryEntry::new(
      &record.siape,
      school,
      HistoryAction::Create,
      user,
      WHOLE_RECORD,
    )
    .values(None, Some("Novo professor criado".to_owned()))
    .notes(format!("Professor {} criado com SIAPE {}", record.nome, record.siape));
    self.record_history(entry).await;

    Ok(record)
  }

  /// Replace the stored teacher with `draft`, keeping creation and deletion
  /// metadata, and record one UPDATE entry per changed monitored field.
  ///
  /// The SIAPE in the path is authoritative; the draft's is ignored. An empty
  /// `status` in the draft keeps the current status.
  pub async fn update(
    &self,
    school: &str,
    siape: &str,
    draft: &TeacherDraft,
    user: &str,
  ) -> Result<UpdateOutcome> {
    let result = self.try_update(school, siape, draft, user).await;
    self.report("update", school, siape, result)
  }

  async fn try_update(
    &self,
    school: &str,
    siape: &str,
    draft: &TeacherDraft,
    user: &str,
  ) -> Result<UpdateOutcome> {
    self.ensure_school(school).await?;
    if self.fetch(school, siape).await?.is_none() {
      return Err(not_found(school, siape));
    }

    let mut draft = draft.normalized();
    draft.siape = siape.to_owned();
    check(&draft)?;

    let mut record = draft.build(school)?;
    record.updated_at = Some(Utc::now());
    record.updated_by = Some(user.to_owned());
    let keep_status = draft.status.is_empty();

    // Metadata and the diff base come from the record read under the lock.
    let missing = not_found(school, siape);
    let written = self
      .store
      .update_with(Some(school), siape, move |current: Option<&TeacherRecord>| {
        let Some(current) = current else {
          return Err(missing);
        };
        if keep_status {
          record.status = current.status.clone();
        }
        record.created_at = current.created_at;
        record.created_by = current.created_by.clone();
        record.deleted_at = current.deleted_at;
        record.deleted_by = current.deleted_by.clone();
        Ok(record)
      })
      .await
      .map_err(ManagerError::from_store)??;

    let record = written.record;
    let changes = written
      .previous
      .map(|previous| diff::changed_fields(&previous, &record))
      .unwrap_or_default();

    for change in &changes {
      let entry = NewHistoryEntry::new(
        &record.siape,
        school,
        HistoryAction::Update,
        user,
        change.field,
      )
      .values(Some(change.old.clone()), Some(change.new.clone()))
      .notes(format!("Campo {} alterado", change.field));
      self.record_history(entry).await;
    }

    Ok(UpdateOutcome { record, changes })
  }

  /// Soft delete: mark the teacher `Excluído` and record one DELETE entry.
  /// The record stays retrievable with `include_deleted`.
  pub async fn delete(
    &self,
    school: &str,
    siape: &str,
    user: &str,
  ) -> Result<TeacherRecord> {
    let result = self.try_delete(school, siape, user).await;
    self.report("delete", school, siape, result)
  }

  async fn try_delete(
    &self,
    school: &str,
    siape: &str,
    user: &str,
  ) -> Result<TeacherRecord> {
    self.ensure_school(school).await?;

    let missing = not_found(school, siape);
    let user_owned = user.to_owned();
    let record = self
      .store
      .update_with(Some(school), siape, move |current: Option<&TeacherRecord>| {
        let Some(current) = current.filter(|r| !r.is_deleted()) else {
          return Err(missing);
        };
        let now = Utc::now();
        let mut record = current.clone();
        record.status = STATUS_DELETED.to_owned();
        record.deleted_at = Some(now);
        record.deleted_by = Some(user_owned.clone());
        record.updated_at = Some(now);
        record.updated_by = Some(user_owned);
        Ok(record)
      })
      .await
      .map_err(ManagerError::from_store)??
      .record;

    let entry = NewHistoryEntry::new(
      &record.siape,
      school,
      HistoryAction::Delete,
      user,
      WHOLE_RECORD,
    )
    .values(Some(record.nome.clone()), Some(DELETED_MARKER.to_owned()))
    .notes(format!("Professor {} excluído", record.nome));
    self.record_history(entry).await;

    Ok(record)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn get(
    &self,
    school: &str,
    siape: &str,
    include_deleted: bool,
  ) -> Result<Option<TeacherRecord>> {
    self.ensure_school(school).await?;
    let record = self.fetch(school, siape).await?;
    Ok(record.filter(|r| include_deleted || !r.is_deleted()))
  }

  /// Whether a non-deleted teacher holds `siape` at `school`.
  pub async fn exists(&self, school: &str, siape: &str) -> Result<bool> {
    Ok(self.get(school, siape, false).await?.is_some())
  }

  /// One school's teachers in storage order.
  pub async fn list(
    &self,
    school: &str,
    include_deleted: bool,
  ) -> Result<Vec<TeacherRecord>> {
    self.ensure_school(school).await?;
    let mut teachers: Vec<TeacherRecord> = self
      .store
      .list(Some(school))
      .await
      .map_err(ManagerError::from_store)?;
    teachers.retain(|t| include_deleted || !t.is_deleted());
    Ok(teachers)
  }

  /// Every school's teachers.
  pub async fn list_all(&self, include_deleted: bool) -> Result<Vec<TeacherRecord>> {
    let mut teachers: Vec<TeacherRecord> =
      self.store.list(None).await.map_err(ManagerError::from_store)?;
    teachers.retain(|t| include_deleted || !t.is_deleted());
    Ok(teachers)
  }

  pub async fn search(
    &self,
    school: &str,
    filter: &TeacherFilter,
  ) -> Result<Vec<TeacherRecord>> {
    let mut teachers = self.list(school, filter.admits_deleted()).await?;
    teachers.retain(|t| filter.matches(t));
    Ok(teachers)
  }

  pub async fn statistics(&self, school: &str) -> Result<TeacherStats> {
    let teachers = self.list(school, false).await?;
    Ok(TeacherStats::from_teachers(&teachers))
  }

  // ── Maintenance ───────────────────────────────────────────────────────────

  /// Inspect every stored teacher of `school`, deleted ones included, and
  /// list those with missing contact data, a malformed SIAPE or a date
  /// outside the accepted range. Nothing is changed.
  pub async fn check_consistency(&self, school: &str) -> Result<Vec<ConsistencyIssue>> {
    let today = today();
    let teachers = self.list(school, true).await?;
    let issues: Vec<_> = teachers
      .iter()
      .filter_map(|t| ConsistencyIssue::inspect(t, today))
      .collect();
    info!(school, checked = teachers.len(), flagged = issues.len(), "consistency check done");
    Ok(issues)
  }

  /// Upper-case names stored in another case and give an empty status the
  /// active value. Each fix goes through [`Self::update`], so it is recorded
  /// in history. Records that no longer validate are skipped with a warning.
  ///
  /// Returns the number of teachers corrected.
  pub async fn fix_data_issues(&self, school: &str, user: &str) -> Result<usize> {
    let mut fixed = 0;
    for teacher in self.list(school, true).await? {
      let rename = teacher.nome != teacher.nome.to_uppercase();
      let no_status = teacher.status.trim().is_empty();
      if !rename && !no_status {
        continue;
      }

      let mut draft = TeacherDraft::from(&teacher);
      if no_status {
        draft.status = STATUS_ACTIVE.to_owned();
      }
      match self.update(school, &teacher.siape, &draft, user).await {
        Ok(_) => fixed += 1,
        Err(ManagerError::Validation(messages)) => {
          warn!(school, siape = %teacher.siape, errors = ?messages, "not fixable automatically");
        }
        Err(e) => return Err(e),
      }
    }
    info!(school, fixed, "automatic correction done");
    Ok(fixed)
  }

  // ── History ───────────────────────────────────────────────────────────────

  /// The teacher's history, newest first.
  pub async fn history(&self, school: &str, siape: &str) -> Result<Vec<HistoryEntry>> {
    self
      .ledger
      .query(siape, school)
      .await
      .map_err(ManagerError::from_store)
  }

  /// Remove the teacher's whole ledger. Independent of soft deletion.
  pub async fn purge_history(&self, school: &str, siape: &str) -> Result<bool> {
    let purged = self
      .ledger
      .delete(siape, school)
      .await
      .map_err(ManagerError::from_store)?;
    if purged {
      warn!(school, siape, "history purged");
    }
    Ok(purged)
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  async fn ensure_school(&self, school: &str) -> Result<()> {
    let schools = self.store.schools().await.map_err(ManagerError::from_store)?;
    if schools.iter().any(|s| s.sigla == school) {
      Ok(())
    } else {
      Err(ManagerError::NotFound(format!("Escola não encontrada: {school}")))
    }
  }

  async fn fetch(&self, school: &str, siape: &str) -> Result<Option<TeacherRecord>> {
    self
      .store
      .get(Some(school), siape)
      .await
      .map_err(ManagerError::from_store)
  }

  /// The record is already persisted; a failed append is logged and the
  /// operation still succeeds.
  async fn record_history(&self, entry: NewHistoryEntry) {
    let (siape, school, field) =
      (entry.siape.clone(), entry.escola.clone(), entry.field.clone());
    if let Err(e) = self.ledger.append(entry).await {
      error!(
        school = %school,
        siape = %siape,
        field = %field,
        error = %e,
        "failed to record history entry"
      );
    }
  }

  fn report<T>(
    &self,
    operation: &'static str,
    school: &str,
    siape: &str,
    result: Result<T>,
  ) -> Result<T> {
    match &result {
      Ok(_) => info!(operation, school, siape, "teacher {operation} succeeded"),
      Err(ManagerError::Validation(messages)) => {
        warn!(operation, school, siape, errors = ?messages, "teacher rejected");
      }
      Err(e) => error!(operation, school, siape, error = %e, "teacher {operation} failed"),
    }
    result
  }
}

fn check(draft: &TeacherDraft) -> Result<()> {
  let validation = validate_teacher(draft, today());
  if validation.is_valid() {
    Ok(())
  } else {
    Err(ManagerError::Validation(validation.messages()))
  }
}

fn today() -> NaiveDate { Local::now().date_naive() }

fn not_found(school: &str, siape: &str) -> ManagerError {
  ManagerError::NotFound(format!(
    "Professor com SIAPE {siape} não encontrado na escola {school}"
  ))
}
