//! [`JsonStore`]: the JSON-file implementation of [`RecordStore`].

use std::{
  collections::BTreeMap,
  fs,
  path::{Path, PathBuf},
  sync::Arc,
};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use direns_core::{
  school::{self, School},
  store::{Collection, Record, RecordStore, Written},
  teacher::STATUS_DELETED,
};

use crate::{
  Error, Result, StoreConfig,
  document::{self, Document},
  lock::Locker,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A record store over `teachers.json`, `schools.json` and
/// `disciplinas.json`.
///
/// Cloning is cheap; clones share configuration and the fallback mutex.
#[derive(Debug, Clone)]
pub struct JsonStore {
  config: Arc<StoreConfig>,
  locker: Locker,
}

impl JsonStore {
  /// Open the store, creating directories and seeding any missing document.
  pub async fn open(config: StoreConfig) -> Result<Self> {
    let store = Self {
      locker: Locker::from_config(&config),
      config: Arc::new(config),
    };
    store.init_documents().await?;
    Ok(store)
  }

  pub fn config(&self) -> &StoreConfig { &self.config }

  async fn init_documents(&self) -> Result<()> {
    let config = self.config.clone();
    let locker = self.locker.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
      for dir in [&config.data_dir, &config.disciplines_dir] {
        fs::create_dir_all(dir).map_err(Error::io(dir))?;
      }

      let mut seeds = vec![
        (
          config.document_path(Collection::Teachers),
          document::empty(Collection::Teachers.root_key()),
        ),
        (config.schools_path(), schools_document()?),
      ];
      let mut disciplines = document::empty(Collection::Disciplines.root_key());
      if let Some(Value::Object(meta)) = disciplines.get_mut("metadata") {
        meta.insert("total_disciplines".to_owned(), Value::from(0));
      }
      seeds.push((config.document_path(Collection::Disciplines), disciplines));

      for (path, doc) in seeds {
        let _guard = locker.acquire(&path)?;
        if document::create_if_absent(&path, &doc)? {
          info!(path = %path.display(), "created document");
        }
      }
      Ok(())
    })
    .await?
  }

  /// Run `f` over a snapshot of the document at `path`, under its lock.
  async fn read<T, F>(&self, path: PathBuf, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Document, &Path) -> Result<T> + Send + 'static,
  {
    let locker = self.locker.clone();
    tokio::task::spawn_blocking(move || {
      let _guard = locker.acquire(&path)?;
      let doc = document::read(&path)?;
      f(&doc, &path)
    })
    .await?
  }

  /// Lock, read, let `f` mutate, and write back atomically if `f` reports a
  /// change. The lock is held until the write completes or fails.
  async fn modify<T, F>(&self, path: PathBuf, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Document, &Path) -> Result<(T, bool)> + Send + 'static,
  {
    let locker = self.locker.clone();
    tokio::task::spawn_blocking(move || {
      let _guard = locker.acquire(&path)?;
      let mut doc = document::read(&path)?;
      let (out, changed) = f(&mut doc, &path)?;
      if changed {
        document::touch(&mut doc);
        document::write_atomic(&path, &doc)?;
      }
      Ok(out)
    })
    .await?
  }

  /// Per-school counts and document sizes.
  pub async fn statistics(&self) -> Result<StoreStatistics> {
    let teachers_path = self.config.document_path(Collection::Teachers);
    let schools_path = self.config.schools_path();
    let disciplines_path = self.config.document_path(Collection::Disciplines);

    let mut stats = self
      .read(teachers_path.clone(), |doc, path| {
        let mut stats = StoreStatistics::default();
        for (school, teachers) in partitions(doc, Collection::Teachers, path)? {
          let active = teachers.values().filter(|t| !is_deleted(t)).count();
          stats.total_teachers += teachers.len();
          stats.teachers_by_school.insert(school.clone(), active);
        }
        stats.last_update = doc
          .get("metadata")
          .and_then(|m| m.get("last_updated"))
          .and_then(Value::as_str)
          .map(str::to_owned);
        Ok(stats)
      })
      .await?;

    stats.teachers_file_size = file_size(&teachers_path);
    stats.schools_file_size = file_size(&schools_path);
    stats.disciplines_file_size = file_size(&disciplines_path);
    Ok(stats)
  }

  /// Check that every document exists and parses, and that every stored
  /// teacher carries `siape`, `nome` and `escola`. Nothing is repaired.
  pub async fn check_integrity(&self) -> Result<StoreIntegrity> {
    let config = self.config.clone();
    let locker = self.locker.clone();
    tokio::task::spawn_blocking(move || -> Result<StoreIntegrity> {
      let mut issues = Vec::new();

      let documents = [
        (config.document_path(Collection::Teachers), Some(Collection::Teachers)),
        (config.schools_path(), None),
        (config.document_path(Collection::Disciplines), Some(Collection::Disciplines)),
      ];
      for (path, collection) in documents {
        let name = path.display().to_string();
        if !path.exists() {
          issues.push(format!("Arquivo não encontrado: {name}"));
          continue;
        }
        let doc = {
          let _guard = locker.acquire(&path)?;
          document::read(&path)
        };
        let doc = match doc {
          Ok(doc) => doc,
          Err(e) => {
            issues.push(format!("Erro ao ler {name}: {e}"));
            continue;
          }
        };
        let Some(collection) = collection else { continue };
        if !matches!(doc.get(collection.root_key()), Some(Value::Object(_))) {
          issues.push(format!("Estrutura de dados inválida: {name}"));
          continue;
        }
        if collection == Collection::Teachers {
          for (_, teachers) in partitions(&doc, collection, &path)? {
            for (key, teacher) in teachers {
              for field in ["siape", "nome", "escola"] {
                let present = teacher
                  .get(field)
                  .and_then(Value::as_str)
                  .is_some_and(|v| !v.is_empty());
                if !present {
                  issues.push(format!("Professor {key} sem {field}"));
                  break;
                }
              }
            }
          }
        }
      }

      Ok(StoreIntegrity { valid: issues.is_empty(), issues })
    })
    .await?
  }
}

/// Document-level counts. `teachers_by_school` excludes soft-deleted
/// teachers; `total_teachers` does not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatistics {
  pub total_teachers:        usize,
  pub teachers_by_school:    BTreeMap<String, usize>,
  pub teachers_file_size:    u64,
  pub schools_file_size:     u64,
  pub disciplines_file_size: u64,
  pub last_update:           Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreIntegrity {
  pub valid:  bool,
  pub issues: Vec<String>,
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for JsonStore {
  type Error = Error;

  async fn put<R: Record>(&self, record: R) -> Result<()> {
    let path = self.config.document_path(R::COLLECTION);
    let key = record.key().to_owned();
    let partition = partition_key(R::COLLECTION, record.partition())?;
    let value = serde_json::to_value(&record).map_err(Error::json(&path))?;

    self
      .modify(path.clone(), move |doc, path| {
        let records = partition_records_mut(doc, R::COLLECTION, partition.as_deref(), path)?;
        records.insert(key, value);
        if R::COLLECTION == Collection::Disciplines {
          let total = records.len();
          set_metadata(doc, "total_disciplines", Value::from(total));
        }
        Ok(((), true))
      })
      .await?;

    debug!(
      path = %path.display(),
      key = record.key(),
      school = record.partition(),
      "record written"
    );
    Ok(())
  }

  async fn update_with<'a, R, E, F>(
    &'a self,
    school: Option<&'a str>,
    key: &'a str,
    f: F,
  ) -> Result<Result<Written<R>, E>>
  where
    R: Record,
    E: Send + 'static,
    F: FnOnce(Option<&R>) -> Result<R, E> + Send + 'static,
  {
    let path = self.config.document_path(R::COLLECTION);
    let partition = partition_key(R::COLLECTION, school)?;
    let owned_key = key.to_owned();

    let outcome = self
      .modify(path.clone(), move |doc, path| {
        let previous: Option<R> =
          partition_records(doc, R::COLLECTION, partition.as_deref(), path)?
            .and_then(|records| records.get(&owned_key))
            .map(|v| decode(v, path))
            .transpose()?;
        let record = match f(previous.as_ref()) {
          Ok(record) => record,
          Err(refused) => return Ok((Err(refused), false)),
        };
        let value = serde_json::to_value(&record).map_err(Error::json(path))?;
        let records = partition_records_mut(doc, R::COLLECTION, partition.as_deref(), path)?;
        records.insert(owned_key, value);
        if R::COLLECTION == Collection::Disciplines {
          let total = records.len();
          set_metadata(doc, "total_disciplines", Value::from(total));
        }
        Ok((Ok(Written { previous, record }), true))
      })
      .await?;

    if outcome.is_ok() {
      debug!(path = %path.display(), key, school, "record written");
    }
    Ok(outcome)
  }

  async fn get<'a, R: Record>(
    &'a self,
    school: Option<&'a str>,
    key: &'a str,
  ) -> Result<Option<R>> {
    let path = self.config.document_path(R::COLLECTION);
    let partition = partition_key(R::COLLECTION, school)?;
    let key = key.to_owned();

    self
      .read(path, move |doc, path| {
        let Some(records) = partition_records(doc, R::COLLECTION, partition.as_deref(), path)?
        else {
          return Ok(None);
        };
        records.get(&key).map(|v| decode(v, path)).transpose()
      })
      .await
  }

  async fn list<'a, R: Record>(&'a self, school: Option<&'a str>) -> Result<Vec<R>> {
    let path = self.config.document_path(R::COLLECTION);
    let school = school.map(str::to_owned);

    self
      .read(path, move |doc, path| {
        let buckets: Vec<&Document> = match (R::COLLECTION.is_partitioned(), school) {
          (true, None) => partitions(doc, R::COLLECTION, path)?
            .into_iter()
            .map(|(_, records)| records)
            .collect(),
          (_, school) => {
            partition_records(doc, R::COLLECTION, school.as_deref(), path)?
              .into_iter()
              .collect()
          }
        };
        buckets
          .into_iter()
          .flat_map(|records| records.values())
          .map(|v| decode(v, path))
          .collect()
      })
      .await
  }

  async fn delete_physical<'a, R: Record>(
    &'a self,
    school: Option<&'a str>,
    key: &'a str,
  ) -> Result<bool> {
    let path = self.config.document_path(R::COLLECTION);
    let partition = partition_key(R::COLLECTION, school)?;
    let owned_key = key.to_owned();

    let removed = self
      .modify(path, move |doc, path| {
        let records = partition_records_mut(doc, R::COLLECTION, partition.as_deref(), path)?;
        let removed = records.shift_remove(&owned_key).is_some();
        if removed && R::COLLECTION == Collection::Disciplines {
          let total = records.len();
          set_metadata(doc, "total_disciplines", Value::from(total));
        }
        Ok((removed, removed))
      })
      .await?;

    if removed {
      info!(key, school, "record physically removed");
    }
    Ok(removed)
  }

  async fn schools(&self) -> Result<Vec<School>> {
    self
      .read(self.config.schools_path(), |doc, path| {
        let Some(schools) = document::child(doc, "schools", path)? else {
          return Ok(Vec::new());
        };
        schools
          .iter()
          .map(|(sigla, value)| {
            let mut school: School = decode(value, path)?;
            school.sigla = sigla.clone();
            Ok(school)
          })
          .collect()
      })
      .await
  }
}

// ─── Document navigation ─────────────────────────────────────────────────────

fn partition_key(collection: Collection, school: Option<&str>) -> Result<Option<String>> {
  match (collection.is_partitioned(), school) {
    (true, Some(school)) => Ok(Some(school.to_owned())),
    (true, None) => Err(Error::NotFound(format!(
      "school partition required for {}",
      collection.root_key()
    ))),
    (false, _) => Ok(None),
  }
}

/// The key → record map for one partition, if it exists.
fn partition_records<'d>(
  doc: &'d Document,
  collection: Collection,
  partition: Option<&str>,
  path: &Path,
) -> Result<Option<&'d Document>> {
  let Some(root) = document::child(doc, collection.root_key(), path)? else {
    return Ok(None);
  };
  match partition {
    Some(school) if collection.is_partitioned() => document::child(root, school, path),
    _ => Ok(Some(root)),
  }
}

fn partition_records_mut<'d>(
  doc: &'d mut Document,
  collection: Collection,
  partition: Option<&str>,
  path: &Path,
) -> Result<&'d mut Document> {
  let root = document::child_mut(doc, collection.root_key(), path)?;
  match partition {
    Some(school) if collection.is_partitioned() => {
      document::child_mut(root, school, path)
    }
    _ => Ok(root),
  }
}

/// Every `(school, records)` pair of a partitioned collection, in storage
/// order.
fn partitions<'d>(
  doc: &'d Document,
  collection: Collection,
  path: &Path,
) -> Result<Vec<(&'d String, &'d Document)>> {
  let Some(root) = document::child(doc, collection.root_key(), path)? else {
    return Ok(Vec::new());
  };
  root
    .iter()
    .map(|(school, value)| match value {
      Value::Object(records) => Ok((school, records)),
      _ => Err(Error::corrupt(path, format!("partition `{school}` is not an object"))),
    })
    .collect()
}

fn set_metadata(doc: &mut Document, key: &str, value: Value) {
  if let Some(Value::Object(meta)) = doc.get_mut("metadata") {
    meta.insert(key.to_owned(), value);
  }
}

fn decode<T: serde::de::DeserializeOwned>(value: &Value, path: &Path) -> Result<T> {
  T::deserialize(value).map_err(Error::json(path))
}

fn is_deleted(teacher: &Value) -> bool {
  teacher.get("status").and_then(Value::as_str) == Some(STATUS_DELETED)
}

fn file_size(path: &Path) -> u64 { fs::metadata(path).map(|m| m.len()).unwrap_or(0) }

fn schools_document() -> Result<Document> {
  let mut doc = document::empty("schools");
  let path = Path::new("schools.json");
  let schools = document::child_mut(&mut doc, "schools", path)?;
  for school in school::directory() {
    let value = serde_json::to_value(&school).map_err(Error::json(path))?;
    schools.insert(school.sigla, value);
  }
  Ok(doc)
}
