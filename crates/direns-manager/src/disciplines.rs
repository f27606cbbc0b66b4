//! [`DisciplineManager`] manages the discipline catalogue.
//!
//! Disciplines are not partitioned by school and carry no history; `active`
//! is their only lifecycle state.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use direns_core::{
  discipline::{DisciplineDraft, DisciplineRecord, normalize_code},
  store::RecordStore,
  validate::validate_discipline,
};

use crate::{ManagerError, Result};

/// Requirements longer than this are truncated when grouped in statistics.
const REQUIREMENT_LABEL_LEN: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisciplineStats {
  pub total_disciplines:       usize,
  pub active_disciplines:      usize,
  pub inactive_disciplines:    usize,
  /// Active disciplines grouped by (possibly truncated) requirement text.
  pub requisitos_distribution: BTreeMap<String, usize>,
}

pub struct DisciplineManager<S> {
  store: Arc<S>,
}

impl<S> Clone for DisciplineManager<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: RecordStore> DisciplineManager<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Add a discipline. The code is upper-cased and must not exist yet,
  /// active or not.
  pub async fn create(
    &self,
    draft: &DisciplineDraft,
    user: &str,
  ) -> Result<DisciplineRecord> {
    let draft = draft.normalized();
    let result = self.try_create(&draft, user).await;
    report("create", &draft.codigo, result)
  }

  async fn try_create(
    &self,
    draft: &DisciplineDraft,
    user: &str,
  ) -> Result<DisciplineRecord> {
    check(draft)?;

    let mut record = draft.build();
    record.created_at = Some(Utc::now());
    record.created_by = Some(user.to_owned());

    let conflict =
      ManagerError::Conflict(format!("Disciplina com código {} já existe", draft.codigo));
    let written = self
      .store
      .update_with(None, &draft.codigo, move |current: Option<&DisciplineRecord>| {
        match current {
          Some(_) => Err(conflict),
          None => Ok(record),
        }
      })
      .await
      .map_err(ManagerError::from_store)??;
    Ok(written.record)
  }

  /// Replace a discipline, keeping its creation metadata and active flag.
  pub async fn update(
    &self,
    codigo: &str,
    draft: &DisciplineDraft,
    user: &str,
  ) -> Result<DisciplineRecord> {
    let codigo = normalize_code(codigo);
    let result = self.try_update(&codigo, draft, user).await;
    report("update", &codigo, result)
  }

  async fn try_update(
    &self,
    codigo: &str,
    draft: &DisciplineDraft,
    user: &str,
  ) -> Result<DisciplineRecord> {
    if self.fetch(codigo).await?.is_none() {
      return Err(not_found(codigo));
    }

    let mut draft = draft.normalized();
    draft.codigo = codigo.to_owned();
    check(&draft)?;

    let mut record = draft.build();
    record.updated_at = Some(Utc::now());
    record.updated_by = Some(user.to_owned());

    let missing = not_found(codigo);
    let written = self
      .store
      .update_with(None, codigo, move |current: Option<&DisciplineRecord>| {
        let Some(current) = current else {
          return Err(missing);
        };
        record.active = current.active;
        record.created_at = current.created_at;
        record.created_by = current.created_by.clone();
        Ok(record)
      })
      .await
      .map_err(ManagerError::from_store)??;
    Ok(written.record)
  }

  /// Mark a discipline inactive. It stays in the catalogue.
  pub async fn deactivate(&self, codigo: &str, user: &str) -> Result<DisciplineRecord> {
    let codigo = normalize_code(codigo);
    let result: Result<DisciplineRecord> = async {
      let missing = not_found(&codigo);
      let user = user.to_owned();
      let written = self
        .store
        .update_with(None, &codigo, move |current: Option<&DisciplineRecord>| {
          let Some(mut record) = current.cloned() else {
            return Err(missing);
          };
          record.active = false;
          record.updated_at = Some(Utc::now());
          record.updated_by = Some(user);
          Ok(record)
        })
        .await
        .map_err(ManagerError::from_store)??;
      Ok(written.record)
    }
    .await;
    report("deactivate", &codigo, result)
  }

  /// Remove a discipline outright. Administrative use only.
  pub async fn remove(&self, codigo: &str) -> Result<()> {
    let codigo = normalize_code(codigo);
    let result: Result<()> = async {
      let removed = self
        .store
        .delete_physical::<DisciplineRecord>(None, &codigo)
        .await
        .map_err(ManagerError::from_store)?;
      if removed { Ok(()) } else { Err(not_found(&codigo)) }
    }
    .await;
    report("remove", &codigo, result)
  }

  pub async fn get(&self, codigo: &str) -> Result<Option<DisciplineRecord>> {
    self.fetch(&normalize_code(codigo)).await
  }

  /// Every discipline, sorted by name.
  pub async fn list(&self) -> Result<Vec<DisciplineRecord>> {
    let mut all: Vec<DisciplineRecord> =
      self.store.list(None).await.map_err(ManagerError::from_store)?;
    all.sort_by(|a, b| a.nome.cmp(&b.nome));
    Ok(all)
  }

  pub async fn list_active(&self) -> Result<Vec<DisciplineRecord>> {
    let mut all = self.list().await?;
    all.retain(|d| d.active);
    Ok(all)
  }

  pub async fn by_area(&self, area: &str) -> Result<Vec<DisciplineRecord>> {
    let mut all = self.list().await?;
    all.retain(|d| d.area.as_deref() == Some(area));
    Ok(all)
  }

  /// Case-insensitive substring search over code, name and area. An empty
  /// term returns everything.
  pub async fn search(&self, term: &str) -> Result<Vec<DisciplineRecord>> {
    let term = term.trim().to_lowercase();
    let mut all = self.list().await?;
    if !term.is_empty() {
      all.retain(|d| {
        d.codigo.to_lowercase().contains(&term)
          || d.nome.to_lowercase().contains(&term)
          || d.area.as_deref().is_some_and(|a| a.to_lowercase().contains(&term))
      });
    }
    Ok(all)
  }

  /// Codes of active disciplines, in name order.
  pub async fn codes(&self) -> Result<Vec<String>> {
    Ok(self.list_active().await?.into_iter().map(|d| d.codigo).collect())
  }

  /// `"<codigo> - <nome>"` for each active discipline, for pick lists.
  pub async fn labels(&self) -> Result<Vec<String>> {
    Ok(
      self
        .list_active()
        .await?
        .iter()
        .map(|d| format!("{} - {}", d.codigo, d.nome))
        .collect(),
    )
  }

  pub async fn statistics(&self) -> Result<DisciplineStats> {
    let all = self.list().await?;
    let active: Vec<_> = all.iter().filter(|d| d.active).collect();

    let mut requisitos_distribution = BTreeMap::new();
    for d in &active {
      let req = d.requisito_especifico.as_str();
      if req.is_empty() {
        continue;
      }
      let label = if req.chars().count() > REQUIREMENT_LABEL_LEN {
        let short: String = req.chars().take(REQUIREMENT_LABEL_LEN).collect();
        format!("{short}...")
      } else {
        req.to_owned()
      };
      *requisitos_distribution.entry(label).or_default() += 1;
    }

    Ok(DisciplineStats {
      total_disciplines: all.len(),
      active_disciplines: active.len(),
      inactive_disciplines: all.len() - active.len(),
      requisitos_distribution,
    })
  }

  async fn fetch(&self, codigo: &str) -> Result<Option<DisciplineRecord>> {
    self.store.get(None, codigo).await.map_err(ManagerError::from_store)
  }
}

fn check(draft: &DisciplineDraft) -> Result<()> {
  let validation = validate_discipline(draft);
  if validation.is_valid() {
    Ok(())
  } else {
    Err(ManagerError::Validation(validation.messages()))
  }
}

fn not_found(codigo: &str) -> ManagerError {
  ManagerError::NotFound(format!("Disciplina {codigo} não encontrada"))
}

fn report<T>(operation: &'static str, codigo: &str, result: Result<T>) -> Result<T> {
  match &result {
    Ok(_) => info!(operation, codigo, "discipline {operation} succeeded"),
    Err(ManagerError::Validation(messages)) => {
      warn!(operation, codigo, errors = ?messages, "discipline rejected");
    }
    Err(e) => error!(operation, codigo, error = %e, "discipline {operation} failed"),
  }
  result
}
