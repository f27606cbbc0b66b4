//! [`JsonLedger`]: per-teacher history files plus a lookup index.
//!
//! Each teacher's entries live in `history/history_<school>_<siape>.json`.
//! `history/history_index.json` maps `<school>_<siape>` to that file. The
//! index is a cache: [`JsonLedger::rebuild_index`] can always regenerate it
//! from the ledger files.

use std::{
  collections::{BTreeMap, BTreeSet},
  fs,
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use direns_core::{
  history::{HistoryEntry, IntegrityReport, NewHistoryEntry},
  store::HistoryLedger,
};

use crate::{
  Error, Result, StoreConfig,
  config::HISTORY_INDEX_FILE,
  document::{self, FORMAT_VERSION},
  lock::Locker,
};

const LEDGER_PREFIX: &str = "history_";

// ─── On-disk shapes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerFile {
  siape:        String,
  escola:       String,
  created_at:   DateTime<Utc>,
  entries:      Vec<HistoryEntry>,
  last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IndexFile {
  #[serde(default)]
  metadata: IndexMetadata,
  #[serde(default)]
  teachers: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexMetadata {
  created_at:   DateTime<Utc>,
  version:      String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  last_updated: Option<DateTime<Utc>>,
}

impl Default for IndexMetadata {
  fn default() -> Self {
    Self {
      created_at:   Utc::now(),
      version:      FORMAT_VERSION.to_owned(),
      last_updated: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct IndexEntry {
  siape:        String,
  escola:       String,
  /// File name relative to the history directory.
  history_file: String,
  last_updated: DateTime<Utc>,
}

/// `<school>_<siape>`, the index key of a teacher's ledger.
pub fn index_key(siape: &str, school: &str) -> String { format!("{school}_{siape}") }

/// `history_<school>_<siape>.json`, with the school lower-cased and spaces
/// and slashes replaced by underscores.
pub fn ledger_file_name(siape: &str, school: &str) -> String {
  let school = school.to_lowercase().replace([' ', '/'], "_");
  format!("{LEDGER_PREFIX}{school}_{siape}.json")
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// History ledger over a directory of JSON files.
///
/// Cloning is cheap; clones share the fallback mutex.
#[derive(Debug, Clone)]
pub struct JsonLedger {
  dir:    Arc<PathBuf>,
  locker: Locker,
}

impl JsonLedger {
  /// Open the ledger under `config.history_dir()`, creating the directory and
  /// an empty index if absent.
  pub async fn open(config: &StoreConfig) -> Result<Self> {
    let ledger = Self {
      dir:    Arc::new(config.history_dir()),
      locker: Locker::from_config(config),
    };
    let this = ledger.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
      fs::create_dir_all(this.dir.as_path()).map_err(Error::io(this.dir.as_path()))?;
      let index = this.index_path();
      let _guard = this.locker.acquire(&index)?;
      if !index.exists() {
        document::write_atomic(&index, &IndexFile::default())?;
        info!(path = %index.display(), "created history index");
      }
      Ok(())
    })
    .await??;
    Ok(ledger)
  }

  pub fn dir(&self) -> &Path { &self.dir }

  fn index_path(&self) -> PathBuf { self.dir.join(HISTORY_INDEX_FILE) }

  /// Resolve an index `history_file` value. Older indexes stored paths with
  /// directory components; only the file name is meaningful.
  fn resolve(&self, history_file: &str) -> PathBuf {
    let name = Path::new(history_file)
      .file_name()
      .map(|n| n.to_os_string())
      .unwrap_or_else(|| history_file.into());
    self.dir.join(name)
  }

  fn read_index(&self) -> Result<IndexFile> {
    let path = self.index_path();
    let _guard = self.locker.acquire(&path)?;
    if !path.exists() {
      return Ok(IndexFile::default());
    }
    document::read_typed(&path)
  }

  fn update_index(&self, f: impl FnOnce(&mut IndexFile)) -> Result<()> {
    let path = self.index_path();
    let _guard = self.locker.acquire(&path)?;
    let mut index = if path.exists() {
      document::read_typed(&path)?
    } else {
      IndexFile::default()
    };
    f(&mut index);
    index.metadata.last_updated = Some(Utc::now());
    document::write_atomic(&path, &index)
  }

  fn read_ledger(&self, path: &Path) -> Result<Option<LedgerFile>> {
    let _guard = self.locker.acquire(path)?;
    if !path.exists() {
      return Ok(None);
    }
    document::read_typed(path).map(Some)
  }

  fn append_blocking(&self, input: NewHistoryEntry) -> Result<HistoryEntry> {
    if input.siape.trim().is_empty() {
      return Err(Error::IncompleteEntry("siape"));
    }
    if input.escola.trim().is_empty() {
      return Err(Error::IncompleteEntry("escola"));
    }
    let name = ledger_file_name(&input.siape, &input.escola);
    let path = self.dir.join(&name);
    let key = index_key(&input.siape, &input.escola);
    let (siape, escola) = (input.siape.clone(), input.escola.clone());

    let stored = {
      let _guard = self.locker.acquire(&path)?;
      let now = Utc::now();
      let mut ledger = if path.exists() {
        document::read_typed(&path)?
      } else {
        LedgerFile {
          siape:        siape.clone(),
          escola:       escola.clone(),
          created_at:   now,
          entries:      Vec::new(),
          last_updated: now,
        }
      };

      // Entries within one ledger are strictly ordered by timestamp.
      let timestamp = match ledger.entries.iter().map(|e| e.timestamp).max() {
        Some(last) if now <= last => last + TimeDelta::microseconds(1),
        _ => now,
      };
      let stored = HistoryEntry::from_new(input, timestamp);
      ledger.entries.push(stored.clone());
      ledger.last_updated = timestamp;
      document::write_atomic(&path, &ledger)?;
      stored
    };

    let indexed = self.update_index(|index| {
      index.teachers.insert(key, IndexEntry {
        siape:        siape.clone(),
        escola:       escola.clone(),
        history_file: name,
        last_updated: stored.timestamp,
      });
    });
    if let Err(e) = indexed {
      error!(
        siape = %siape,
        school = %escola,
        error = %e,
        "history index update failed; rebuild the index to recover"
      );
    }

    Ok(stored)
  }

  fn query_blocking(&self, siape: &str, school: &str) -> Result<Vec<HistoryEntry>> {
    let path = self.dir.join(ledger_file_name(siape, school));
    let mut entries = self
      .read_ledger(&path)?
      .map(|ledger| ledger.entries)
      .unwrap_or_default();
    sort_newest_first(&mut entries);
    Ok(entries)
  }

  fn recent_blocking(&self, school: Option<&str>, limit: usize) -> Result<Vec<HistoryEntry>> {
    let index = self.read_index()?;
    let mut entries = Vec::new();

    for (key, item) in &index.teachers {
      if school.is_some_and(|s| s != item.escola) {
        continue;
      }
      let path = self.resolve(&item.history_file);
      match self.read_ledger(&path) {
        Ok(Some(ledger)) => entries.extend(ledger.entries),
        Ok(None) => warn!(key = %key, path = %path.display(), "indexed ledger is missing"),
        Err(Error::LockTimeout(p)) => return Err(Error::LockTimeout(p)),
        Err(e) => warn!(key = %key, error = %e, "skipping unreadable ledger"),
      }
    }

    sort_newest_first(&mut entries);
    entries.truncate(limit);
    Ok(entries)
  }

  fn delete_blocking(&self, siape: &str, school: &str) -> Result<bool> {
    let path = self.dir.join(ledger_file_name(siape, school));
    let removed_file = {
      let _guard = self.locker.acquire(&path)?;
      match fs::remove_file(&path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(Error::io(&path)(e)),
      }
    };

    let key = index_key(siape, school);
    let mut removed_entry = false;
    self.update_index(|index| removed_entry = index.teachers.remove(&key).is_some())?;

    if removed_file || removed_entry {
      info!(siape, school, "history purged");
    }
    Ok(removed_file || removed_entry)
  }

  fn check_integrity_blocking(&self) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();
    let index_path = self.index_path();

    let index: Value = {
      let _guard = self.locker.acquire(&index_path)?;
      if index_path.exists() {
        match document::read_typed(&index_path) {
          Ok(value) => value,
          Err(e) => {
            report.issues.push(format!("Erro ao ler índice de histórico: {e}"));
            report.valid = false;
            return Ok(report);
          }
        }
      } else {
        document::write_atomic(&index_path, &IndexFile::default())?;
        report
          .fixed_issues
          .push("Índice de histórico ausente foi recriado".to_owned());
        serde_json::to_value(IndexFile::default()).map_err(Error::json(&index_path))?
      }
    };

    let teachers = index
      .get("teachers")
      .and_then(Value::as_object)
      .cloned()
      .unwrap_or_default();
    report.ledgers = teachers.len();

    let mut referenced = BTreeSet::new();
    for (key, item) in &teachers {
      let Some(file) = item.get("history_file").and_then(Value::as_str) else {
        report.issues.push(format!("Entrada do índice sem arquivo: {key}"));
        continue;
      };
      let path = self.resolve(file);
      if let Some(name) = path.file_name() {
        referenced.insert(name.to_os_string());
      }
      if !path.exists() {
        report
          .issues
          .push(format!("Arquivo de histórico não encontrado: {}", path.display()));
        continue;
      }

      let ledger: Value = {
        let _guard = self.locker.acquire(&path)?;
        match document::read_typed(&path) {
          Ok(value) => value,
          Err(e) => {
            report.issues.push(format!("Erro ao ler {key}: {e}"));
            continue;
          }
        }
      };
      let Some(entries) = ledger.get("entries").and_then(Value::as_array) else {
        report.issues.push(format!("Histórico {key} sem lista de entradas"));
        continue;
      };
      for (i, entry) in entries.iter().enumerate() {
        for field in ["timestamp", "action"] {
          if entry.get(field).is_none_or(Value::is_null) {
            report
              .issues
              .push(format!("Entrada {i} do histórico {key} sem {field}"));
          }
        }
      }
    }

    for name in self.ledger_files()? {
      if !referenced.contains(name.as_os_str()) {
        report.issues.push(format!(
          "Arquivo de histórico não indexado: {}",
          name.to_string_lossy()
        ));
      }
    }

    report.valid = report.issues.is_empty();
    Ok(report)
  }

  fn rebuild_index_blocking(&self) -> Result<usize> {
    let mut rebuilt = BTreeMap::new();
    for name in self.ledger_files()? {
      let path = self.dir.join(&name);
      let ledger = match self.read_ledger(&path) {
        Ok(Some(ledger)) => ledger,
        Ok(None) => continue,
        Err(e) => {
          warn!(path = %path.display(), error = %e, "skipping unreadable ledger");
          continue;
        }
      };
      rebuilt.insert(index_key(&ledger.siape, &ledger.escola), IndexEntry {
        history_file: name.to_string_lossy().into_owned(),
        last_updated: ledger.last_updated,
        siape:        ledger.siape,
        escola:       ledger.escola,
      });
    }

    let count = rebuilt.len();
    self.update_index(|index| index.teachers = rebuilt)?;
    info!(ledgers = count, "history index rebuilt");
    Ok(count)
  }

  /// File names of every ledger file in the history directory.
  fn ledger_files(&self) -> Result<Vec<std::ffi::OsString>> {
    let dir = self.dir.as_path();
    let mut names = Vec::new();
    for item in fs::read_dir(dir).map_err(Error::io(dir))? {
      let name = item.map_err(Error::io(dir))?.file_name();
      let text = name.to_string_lossy();
      if text.starts_with(LEDGER_PREFIX)
        && text.ends_with(".json")
        && text != HISTORY_INDEX_FILE
      {
        names.push(name);
      }
    }
    names.sort();
    Ok(names)
  }
}

fn sort_newest_first(entries: &mut [HistoryEntry]) {
  entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

// ─── HistoryLedger impl ──────────────────────────────────────────────────────

impl HistoryLedger for JsonLedger {
  type Error = Error;

  async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry> {
    let this = self.clone();
    tokio::task::spawn_blocking(move || this.append_blocking(entry)).await?
  }

  async fn query<'a>(&'a self, siape: &'a str, school: &'a str) -> Result<Vec<HistoryEntry>> {
    let this = self.clone();
    let (siape, school) = (siape.to_owned(), school.to_owned());
    tokio::task::spawn_blocking(move || this.query_blocking(&siape, &school)).await?
  }

  async fn recent<'a>(
    &'a self,
    school: Option<&'a str>,
    limit: usize,
  ) -> Result<Vec<HistoryEntry>> {
    let this = self.clone();
    let school = school.map(str::to_owned);
    tokio::task::spawn_blocking(move || this.recent_blocking(school.as_deref(), limit))
      .await?
  }

  async fn delete<'a>(&'a self, siape: &'a str, school: &'a str) -> Result<bool> {
    let this = self.clone();
    let (siape, school) = (siape.to_owned(), school.to_owned());
    tokio::task::spawn_blocking(move || this.delete_blocking(&siape, &school)).await?
  }

  async fn check_integrity(&self) -> Result<IntegrityReport> {
    let this = self.clone();
    tokio::task::spawn_blocking(move || this.check_integrity_blocking()).await?
  }

  async fn rebuild_index(&self) -> Result<usize> {
    let this = self.clone();
    tokio::task::spawn_blocking(move || this.rebuild_index_blocking()).await?
  }
}
