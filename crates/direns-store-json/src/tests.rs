//! Integration tests for `JsonStore` and `JsonLedger` against a temporary
//! data directory.

use std::{fs, time::Duration};

use chrono::{NaiveDate, TimeDelta, Utc};
use tempfile::TempDir;

use direns_core::{
  discipline::{DisciplineDraft, DisciplineRecord},
  history::{HistoryAction, NewHistoryEntry},
  store::{HistoryLedger, RecordStore, StoreError, StoreErrorKind},
  teacher::{STATUS_DELETED, TeacherDraft, TeacherRecord},
};

use crate::{Error, JsonLedger, JsonStore, StoreConfig, lock::lock_path_for};

async fn store() -> (TempDir, JsonStore) {
  let dir = tempfile::tempdir().expect("tempdir");
  let store = JsonStore::open(StoreConfig::in_dir(dir.path()))
    .await
    .expect("open store");
  (dir, store)
}

async fn ledger() -> (TempDir, JsonLedger) {
  let dir = tempfile::tempdir().expect("tempdir");
  let ledger = JsonLedger::open(&StoreConfig::in_dir(dir.path()))
    .await
    .expect("open ledger");
  (dir, ledger)
}

fn teacher(siape: &str, school: &str, nome: &str) -> TeacherRecord {
  TeacherDraft {
    siape: siape.into(),
    nome: nome.into(),
    data_nascimento: "15-03-1980".into(),
    sexo: "M".into(),
    carga_horaria: "40H".into(),
    carreira: "MS".into(),
    data_ingresso: "01-02-2010".into(),
    pos_graduacao: "MESTRADO".into(),
    graduacao: "FÍSICA".into(),
    ..Default::default()
  }
  .build(school)
  .unwrap()
}

fn discipline(codigo: &str, nome: &str) -> DisciplineRecord {
  DisciplineDraft {
    codigo: codigo.into(),
    nome: nome.into(),
    requisito_especifico: "Licenciatura".into(),
    ..Default::default()
  }
  .build()
}

fn entry(siape: &str, school: &str, action: HistoryAction, field: &str) -> NewHistoryEntry {
  NewHistoryEntry::new(siape, school, action, "admin", field)
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn open_seeds_documents() {
  let (dir, store) = store().await;
  assert!(dir.path().join("data/teachers.json").exists());
  assert!(dir.path().join("data/schools.json").exists());
  assert!(dir.path().join("dados/disciplinas.json").exists());

  let schools = store.schools().await.unwrap();
  assert_eq!(schools.len(), 11);
  assert_eq!(schools[0].sigla, "DIRENS");
  assert!(schools.iter().any(|s| s.sigla == "AFA" && s.cidade == "Pirassununga"));
}

#[tokio::test]
async fn reopen_keeps_existing_documents() {
  let (dir, store) = store().await;
  store.put(teacher("1234567", "AFA", "JOAO SILVA")).await.unwrap();

  let again = JsonStore::open(StoreConfig::in_dir(dir.path())).await.unwrap();
  let got: Option<TeacherRecord> = again.get(Some("AFA"), "1234567").await.unwrap();
  assert!(got.is_some());
}

#[tokio::test]
async fn document_shape_is_school_then_key() {
  let (dir, store) = store().await;
  store.put(teacher("1234567", "AFA", "JOAO SILVA")).await.unwrap();

  let raw = fs::read_to_string(dir.path().join("data/teachers.json")).unwrap();
  let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
  assert_eq!(doc["teachers"]["AFA"]["1234567"]["nome"], "JOAO SILVA");
  assert!(doc["metadata"]["last_updated"].is_string());
  assert!(!lock_path_for(&dir.path().join("data/teachers.json")).exists());
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_then_get_round_trips() {
  let (_dir, store) = store().await;
  let mut record = teacher("1234567", "AFA", "JOAO SILVA");
  record.email = Some("joao@fab.mil.br".into());
  record.extra.insert("lattes".into(), "http://lattes.cnpq.br/1".into());
  record.created_at = Some(Utc::now());
  record.created_by = Some("admin".into());

  store.put(record.clone()).await.unwrap();
  let got: TeacherRecord = store.get(Some("AFA"), "1234567").await.unwrap().unwrap();
  assert_eq!(got, record);
}

#[tokio::test]
async fn get_missing_returns_none() {
  let (_dir, store) = store().await;
  let missing: Option<TeacherRecord> = store.get(Some("AFA"), "7654321").await.unwrap();
  assert!(missing.is_none());
  let missing: Option<TeacherRecord> = store.get(Some("NOPE"), "7654321").await.unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn partitions_are_independent() {
  let (_dir, store) = store().await;
  store.put(teacher("1234567", "AFA", "JOAO SILVA")).await.unwrap();
  store.put(teacher("1234567", "EEAR", "MARIA SOUZA")).await.unwrap();
  store.put(teacher("7654321", "AFA", "ANA LIMA")).await.unwrap();

  let afa: Vec<TeacherRecord> = store.list(Some("AFA")).await.unwrap();
  let names: Vec<_> = afa.iter().map(|t| t.nome.as_str()).collect();
  assert_eq!(names, vec!["JOAO SILVA", "ANA LIMA"], "storage order");

  let all: Vec<TeacherRecord> = store.list(None).await.unwrap();
  assert_eq!(all.len(), 3);

  let eear: TeacherRecord = store.get(Some("EEAR"), "1234567").await.unwrap().unwrap();
  assert_eq!(eear.nome, "MARIA SOUZA");
}

#[tokio::test]
async fn put_replaces_existing_key() {
  let (_dir, store) = store().await;
  store.put(teacher("1234567", "AFA", "JOAO SILVA")).await.unwrap();
  let mut updated = teacher("1234567", "AFA", "JOAO DA SILVA");
  updated.status = STATUS_DELETED.into();
  store.put(updated).await.unwrap();

  let all: Vec<TeacherRecord> = store.list(Some("AFA")).await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0].nome, "JOAO DA SILVA");
  assert!(all[0].is_deleted());
}

#[tokio::test]
async fn update_with_sees_previous_and_writes_result() {
  let (_dir, store) = store().await;
  let first = store
    .update_with(Some("AFA"), "1234567", |current: Option<&TeacherRecord>| {
      assert!(current.is_none());
      Ok::<_, String>(teacher("1234567", "AFA", "JOAO SILVA"))
    })
    .await
    .unwrap()
    .unwrap();
  assert!(first.previous.is_none());

  let second = store
    .update_with(Some("AFA"), "1234567", |current: Option<&TeacherRecord>| {
      let Some(mut next) = current.cloned() else {
        return Err("missing".to_owned());
      };
      next.nome = "JOAO DA SILVA".into();
      Ok(next)
    })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(second.previous.map(|p| p.nome).as_deref(), Some("JOAO SILVA"));
  assert_eq!(second.record.nome, "JOAO DA SILVA");

  let stored: TeacherRecord = store.get(Some("AFA"), "1234567").await.unwrap().unwrap();
  assert_eq!(stored.nome, "JOAO DA SILVA");
}

#[tokio::test]
async fn refused_update_with_leaves_document_untouched() {
  let (dir, store) = store().await;
  store.put(discipline("MAT101", "Cálculo I")).await.unwrap();
  let doc = dir.path().join("dados/disciplinas.json");
  let before = fs::read(&doc).unwrap();

  let refused = store
    .update_with(None, "MAT101", |current: Option<&DisciplineRecord>| {
      match current {
        Some(_) => Err("exists"),
        None => Ok(discipline("MAT101", "Outra")),
      }
    })
    .await
    .unwrap();
  assert!(matches!(refused, Err("exists")));
  assert_eq!(fs::read(&doc).unwrap(), before);
}

#[tokio::test]
async fn delete_physical_removes_record() {
  let (_dir, store) = store().await;
  store.put(teacher("1234567", "AFA", "JOAO SILVA")).await.unwrap();

  assert!(store.delete_physical::<TeacherRecord>(Some("AFA"), "1234567").await.unwrap());
  assert!(!store.delete_physical::<TeacherRecord>(Some("AFA"), "1234567").await.unwrap());
  let gone: Option<TeacherRecord> = store.get(Some("AFA"), "1234567").await.unwrap();
  assert!(gone.is_none());
}

#[tokio::test]
async fn partitioned_collection_requires_school() {
  let (_dir, store) = store().await;
  let err = store.get::<TeacherRecord>(None, "1234567").await.unwrap_err();
  assert_eq!(err.kind(), StoreErrorKind::NotFound);
}

#[tokio::test]
async fn disciplines_are_flat_and_counted() {
  let (dir, store) = store().await;
  store.put(discipline("MAT101", "Cálculo I")).await.unwrap();
  store.put(discipline("FIS101", "Física I")).await.unwrap();

  let got: DisciplineRecord = store.get(None, "FIS101").await.unwrap().unwrap();
  assert_eq!(got.nome, "Física I");
  // The school argument is ignored for unpartitioned collections.
  let same: Option<DisciplineRecord> = store.get(Some("AFA"), "FIS101").await.unwrap();
  assert!(same.is_some());

  let raw = fs::read_to_string(dir.path().join("dados/disciplinas.json")).unwrap();
  let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
  assert_eq!(doc["disciplinas"]["MAT101"]["nome"], "Cálculo I");
  assert_eq!(doc["metadata"]["total_disciplines"], 2);
}

#[tokio::test]
async fn statistics_count_active_by_school() {
  let (_dir, store) = store().await;
  store.put(teacher("1234567", "AFA", "JOAO SILVA")).await.unwrap();
  let mut gone = teacher("7654321", "AFA", "ANA LIMA");
  gone.status = STATUS_DELETED.into();
  store.put(gone).await.unwrap();
  store.put(teacher("1111111", "EEAR", "MARIA SOUZA")).await.unwrap();

  let stats = store.statistics().await.unwrap();
  assert_eq!(stats.total_teachers, 3);
  assert_eq!(stats.teachers_by_school["AFA"], 1);
  assert_eq!(stats.teachers_by_school["EEAR"], 1);
  assert!(stats.teachers_file_size > 0);
  assert!(stats.last_update.is_some());
}

#[tokio::test]
async fn integrity_reports_incomplete_teachers() {
  let (dir, store) = store().await;
  assert!(store.check_integrity().await.unwrap().valid);

  let path = dir.path().join("data/teachers.json");
  fs::write(&path, r#"{"teachers":{"AFA":{"1234567":{"siape":"1234567","escola":"AFA"}}}}"#)
    .unwrap();
  fs::remove_file(dir.path().join("data/schools.json")).unwrap();

  let report = store.check_integrity().await.unwrap();
  assert!(!report.valid);
  assert_eq!(report.issues.len(), 2, "{:?}", report.issues);
  assert!(report.issues.iter().any(|i| i.contains("sem nome")));
}

// ─── Locking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn held_lock_times_out_without_touching_document() {
  let dir = tempfile::tempdir().unwrap();
  let config =
    StoreConfig::in_dir(dir.path()).with_lock_timeout(Duration::from_millis(100));
  let store = JsonStore::open(config).await.unwrap();
  store.put(teacher("1234567", "AFA", "JOAO SILVA")).await.unwrap();

  let doc = dir.path().join("data/teachers.json");
  let before = fs::read(&doc).unwrap();
  fs::write(lock_path_for(&doc), "{}").unwrap();

  let err = store.put(teacher("7654321", "AFA", "ANA LIMA")).await.unwrap_err();
  assert!(matches!(err, Error::LockTimeout(_)));
  assert_eq!(err.kind(), StoreErrorKind::LockTimeout);
  assert_eq!(fs::read(&doc).unwrap(), before);

  fs::remove_file(lock_path_for(&doc)).unwrap();
  store.put(teacher("7654321", "AFA", "ANA LIMA")).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_never_lose_updates() {
  let dir = tempfile::tempdir().unwrap();
  let config = StoreConfig::in_dir(dir.path());
  // Independent instances stand in for separate processes: they share only
  // the lock files on disk.
  let a = JsonStore::open(config.clone()).await.unwrap();
  let b = JsonStore::open(config).await.unwrap();

  let mut tasks = Vec::new();
  for i in 0..20u32 {
    let store = if i % 2 == 0 { a.clone() } else { b.clone() };
    tasks.push(tokio::spawn(async move {
      let siape = format!("{:07}", 1_000_000 + i);
      store.put(teacher(&siape, "AFA", "JOAO SILVA")).await
    }));
  }
  for task in tasks {
    task.await.unwrap().unwrap();
  }

  let all: Vec<TeacherRecord> = a.list(Some("AFA")).await.unwrap();
  assert_eq!(all.len(), 20);
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_creates_ledger_and_index() {
  let (dir, ledger) = ledger().await;
  let stored = ledger
    .append(
      entry("1234567", "AFA", HistoryAction::Create, "professor")
        .values(None, Some("Novo professor criado".into()))
        .notes("Professor JOAO SILVA criado com SIAPE 1234567"),
    )
    .await
    .unwrap();
  assert_eq!(stored.action, HistoryAction::Create);

  let history = dir.path().join("data/history");
  let raw = fs::read_to_string(history.join("history_afa_1234567.json")).unwrap();
  let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
  assert_eq!(doc["siape"], "1234567");
  assert_eq!(doc["entries"][0]["new_value"], "Novo professor criado");
  assert!(doc["entries"][0]["old_value"].is_null());

  let raw = fs::read_to_string(history.join("history_index.json")).unwrap();
  let index: serde_json::Value = serde_json::from_str(&raw).unwrap();
  assert_eq!(
    index["teachers"]["AFA_1234567"]["history_file"],
    "history_afa_1234567.json"
  );
}

#[tokio::test]
async fn query_is_newest_first_and_strictly_ordered() {
  let (_dir, ledger) = ledger().await;
  let fields = ["nome", "email", "telefone", "status", "graduacao"];
  for field in fields {
    ledger
      .append(entry("1234567", "AFA", HistoryAction::Update, field))
      .await
      .unwrap();
  }

  let entries = ledger.query("1234567", "AFA").await.unwrap();
  let got: Vec<_> = entries.iter().map(|e| e.field.as_str()).collect();
  let mut expected = fields.to_vec();
  expected.reverse();
  assert_eq!(got, expected);
  assert!(entries.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
}

#[tokio::test]
async fn query_unknown_teacher_is_empty() {
  let (_dir, ledger) = ledger().await;
  assert!(ledger.query("7654321", "AFA").await.unwrap().is_empty());
}

#[tokio::test]
async fn recent_and_derived_queries() {
  let (_dir, ledger) = ledger().await;
  let start = Utc::now() - TimeDelta::seconds(1);
  ledger.append(entry("1111111", "AFA", HistoryAction::Create, "professor")).await.unwrap();
  ledger.append(entry("2222222", "EEAR", HistoryAction::Create, "professor")).await.unwrap();
  ledger
    .append(NewHistoryEntry::new("1111111", "AFA", HistoryAction::Update, "maria", "nome"))
    .await
    .unwrap();
  ledger.append(entry("1111111", "AFA", HistoryAction::Delete, "professor")).await.unwrap();

  let recent = ledger.recent(None, 10).await.unwrap();
  assert_eq!(recent.len(), 4);
  assert!(recent.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
  assert_eq!(ledger.recent(None, 2).await.unwrap().len(), 2);
  assert_eq!(ledger.recent(Some("EEAR"), 10).await.unwrap().len(), 1);

  let creates = ledger.by_action(HistoryAction::Create, None).await.unwrap();
  assert_eq!(creates.len(), 2);
  let by_maria = ledger.by_user("maria", Some("AFA")).await.unwrap();
  assert_eq!(by_maria.len(), 1);
  assert_eq!(by_maria[0].field, "nome");

  let all = ledger.by_date_range(start, Utc::now(), None).await.unwrap();
  assert_eq!(all.len(), 4);
  let none = ledger
    .by_date_range(start - TimeDelta::days(2), start - TimeDelta::days(1), None)
    .await
    .unwrap();
  assert!(none.is_empty());

  let stats = ledger.stats(Some("AFA")).await.unwrap();
  assert_eq!(stats.total_entries, 3);
  assert_eq!(stats.actions_count[&HistoryAction::Update], 1);
  assert_eq!(stats.users_count["admin"], 2);
  assert_eq!(stats.school.as_deref(), Some("AFA"));
}

#[tokio::test]
async fn append_rejects_entry_without_identity() {
  let (dir, ledger) = ledger().await;
  let err = ledger
    .append(entry("", "AFA", HistoryAction::Create, "professor"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::IncompleteEntry("siape")));
  let err = ledger
    .append(entry("1234567", " ", HistoryAction::Create, "professor"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::IncompleteEntry("escola")));

  let written: Vec<_> = fs::read_dir(dir.path().join("data/history"))
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .filter(|name| name != "history_index.json")
    .collect();
  assert!(written.is_empty(), "unexpected ledger files: {written:?}");
}

#[tokio::test]
async fn delete_purges_ledger_and_index_entry() {
  let (dir, ledger) = ledger().await;
  ledger.append(entry("1234567", "AFA", HistoryAction::Create, "professor")).await.unwrap();

  assert!(ledger.delete("1234567", "AFA").await.unwrap());
  assert!(!dir.path().join("data/history/history_afa_1234567.json").exists());
  assert!(ledger.query("1234567", "AFA").await.unwrap().is_empty());
  assert!(ledger.recent(None, 10).await.unwrap().is_empty());
  assert!(!ledger.delete("1234567", "AFA").await.unwrap());
}

#[tokio::test]
async fn integrity_check_reports_without_repairing() {
  let (dir, ledger) = ledger().await;
  ledger.append(entry("1111111", "AFA", HistoryAction::Create, "professor")).await.unwrap();
  ledger.append(entry("2222222", "AFA", HistoryAction::Create, "professor")).await.unwrap();
  let report = ledger.check_integrity().await.unwrap();
  assert!(report.valid, "{:?}", report.issues);
  assert_eq!(report.ledgers, 2);

  let history = dir.path().join("data/history");
  fs::remove_file(history.join("history_afa_1111111.json")).unwrap();
  let broken = r#"{"siape":"3333333","escola":"AFA","entries":[{"user":"x"}]}"#;
  fs::write(history.join("history_afa_3333333.json"), broken).unwrap();
  let raw = fs::read_to_string(history.join("history_afa_2222222.json")).unwrap();
  let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
  doc["entries"][0].as_object_mut().unwrap().remove("action");
  fs::write(history.join("history_afa_2222222.json"), doc.to_string()).unwrap();

  let report = ledger.check_integrity().await.unwrap();
  assert!(!report.valid);
  assert_eq!(report.issues.len(), 3, "{:?}", report.issues);
  assert!(report.fixed_issues.is_empty());
  // Entries are not repaired.
  let raw = fs::read_to_string(history.join("history_afa_2222222.json")).unwrap();
  assert!(!raw.contains("\"action\""));
}

#[tokio::test]
async fn integrity_check_recreates_missing_index() {
  let (dir, ledger) = ledger().await;
  let index = dir.path().join("data/history/history_index.json");
  fs::remove_file(&index).unwrap();

  let report = ledger.check_integrity().await.unwrap();
  assert!(report.valid);
  assert_eq!(report.fixed_issues.len(), 1);
  assert!(index.exists());
}

#[tokio::test]
async fn rebuild_index_recovers_lost_index() {
  let (dir, ledger) = ledger().await;
  ledger.append(entry("1111111", "AFA", HistoryAction::Create, "professor")).await.unwrap();
  ledger.append(entry("2222222", "EEAR", HistoryAction::Create, "professor")).await.unwrap();

  let index = dir.path().join("data/history/history_index.json");
  fs::write(&index, r#"{"teachers":{}}"#).unwrap();
  assert!(ledger.recent(None, 10).await.unwrap().is_empty());

  assert_eq!(ledger.rebuild_index().await.unwrap(), 2);
  assert_eq!(ledger.recent(None, 10).await.unwrap().len(), 2);
  assert!(ledger.check_integrity().await.unwrap().valid);
}

#[tokio::test]
async fn ledger_entries_keep_record_dates_readable() {
  // Field values are plain strings; dates are recorded as DD-MM-YYYY.
  let (_dir, ledger) = ledger().await;
  let old = teacher("1234567", "AFA", "JOAO SILVA");
  let value = old.field_text("data_ingresso").unwrap();
  assert_eq!(
    NaiveDate::parse_from_str(&value, "%d-%m-%Y").unwrap(),
    old.data_ingresso
  );
  ledger
    .append(
      entry("1234567", "AFA", HistoryAction::Update, "data_ingresso")
        .values(Some(value.clone()), Some("01-03-2010".into())),
    )
    .await
    .unwrap();
  let entries = ledger.query("1234567", "AFA").await.unwrap();
  assert_eq!(entries[0].old_value.as_deref(), Some(value.as_str()));
}
