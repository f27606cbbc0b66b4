//! `direns`: command-line front end for the DIRENS teacher records.
//!
//! Reads `direns.toml` (or the path given with `--config`) and `DIRENS_*`
//! environment variables, opens the JSON store and history ledger, and runs
//! one command against them.
//!
//! # Usage
//!
//! ```
//! direns teacher add AFA professor.json --user maria
//! cat alteracao.json | direns teacher update AFA 1234567 -
//! direns history recent --school AFA --limit 20
//! ```

mod config;

use std::{
  io::Read as _,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, anyhow};
use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use direns_core::{
  discipline::DisciplineDraft,
  history::HistoryAction,
  store::{HistoryLedger, RecordStore},
  teacher::{Career, PostgradLevel, TeacherDraft, Workload},
};
use direns_manager::{DisciplineManager, ManagerError, TeacherFilter, TeacherManager};
use direns_store_json::{JsonLedger, JsonStore};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "direns", version, about = "DIRENS teacher records")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "direns.toml", global = true)]
  config: PathBuf,

  /// Acting user recorded in metadata and history.
  #[arg(short, long, env = "DIRENS_USER", default_value = "sistema", global = true)]
  user: String,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List the school directory.
  Schools,
  /// Document statistics and integrity.
  Status,
  #[command(subcommand)]
  Teacher(TeacherCommand),
  #[command(subcommand)]
  History(HistoryCommand),
  #[command(subcommand)]
  Discipline(DisciplineCommand),
}

#[derive(Subcommand, Debug)]
enum TeacherCommand {
  /// Create a teacher from a JSON payload.
  Add {
    school:  String,
    /// JSON file, or `-` for stdin.
    payload: PathBuf,
  },
  /// Replace a teacher's fields from a JSON payload.
  Update {
    school:  String,
    siape:   String,
    payload: PathBuf,
  },
  /// Soft-delete a teacher.
  Delete { school: String, siape: String },
  Show {
    school: String,
    siape:  String,
    #[arg(long)]
    include_deleted: bool,
  },
  List {
    /// Every school when omitted.
    school: Option<String>,
    #[arg(long)]
    include_deleted: bool,
  },
  Search {
    school: String,
    #[command(flatten)]
    filter: FilterArgs,
  },
  Stats { school: String },
  /// Report stored teachers with missing or malformed data.
  Check { school: String },
  /// Upper-case names and fill empty statuses, recording history.
  Fix { school: String },
}

#[derive(Args, Debug)]
struct FilterArgs {
  /// Substring of the name or SIAPE.
  term:            Option<String>,
  #[arg(long)]
  pos_graduacao:   Option<PostgradLevel>,
  #[arg(long)]
  carga_horaria:   Option<Workload>,
  #[arg(long)]
  carreira:        Option<Career>,
  #[arg(long)]
  status:          Option<String>,
  #[arg(long)]
  include_deleted: bool,
}

impl From<FilterArgs> for TeacherFilter {
  fn from(a: FilterArgs) -> Self {
    Self {
      term:            a.term,
      pos_graduacao:   a.pos_graduacao,
      carga_horaria:   a.carga_horaria,
      carreira:        a.carreira,
      status:          a.status,
      include_deleted: a.include_deleted,
    }
  }
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
  /// One teacher's history, newest first.
  Show { school: String, siape: String },
  /// Latest entries across all ledgers.
  Recent {
    #[arg(long)]
    school: Option<String>,
    #[arg(long, default_value_t = 50)]
    limit:  usize,
    /// CREATE, UPDATE or DELETE.
    #[arg(long, conflicts_with = "by")]
    action: Option<HistoryAction>,
    /// Only entries recorded by this user.
    #[arg(long)]
    by:     Option<String>,
  },
  /// Entries between two dates (YYYY-MM-DD), inclusive.
  Range {
    from: NaiveDate,
    to:   NaiveDate,
    #[arg(long)]
    school: Option<String>,
  },
  Stats {
    #[arg(long)]
    school: Option<String>,
  },
  /// Report ledger problems without repairing them.
  Check,
  /// Regenerate the history index from the ledger files.
  RebuildIndex,
  /// Delete one teacher's whole ledger.
  Purge { school: String, siape: String },
}

#[derive(Subcommand, Debug)]
enum DisciplineCommand {
  Add { payload: PathBuf },
  Update { codigo: String, payload: PathBuf },
  Deactivate { codigo: String },
  /// Physically remove a discipline.
  Remove { codigo: String },
  List {
    /// Only active disciplines.
    #[arg(long)]
    active: bool,
    /// Case-insensitive match on code, name or area.
    #[arg(long)]
    search: Option<String>,
  },
  Show { codigo: String },
  Stats,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

struct App {
  store:       Arc<JsonStore>,
  ledger:      Arc<JsonLedger>,
  teachers:    TeacherManager<JsonStore, JsonLedger>,
  disciplines: DisciplineManager<JsonStore>,
  user:        String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let app_config = AppConfig::load(&cli.config)?;
  let store_config = app_config.store_config();

  let store = JsonStore::open(store_config.clone())
    .await
    .with_context(|| format!("failed to open store at {:?}", store_config.data_dir))?;
  let ledger = JsonLedger::open(&store_config)
    .await
    .context("failed to open history ledger")?;

  let store = Arc::new(store);
  let ledger = Arc::new(ledger);
  let app = App {
    teachers: TeacherManager::new(store.clone(), ledger.clone()),
    disciplines: DisciplineManager::new(store.clone()),
    store,
    ledger,
    user: cli.user,
  };

  match cli.command {
    Command::Schools => print(&schools(&app).await?),
    Command::Status => {
      let statistics = app.store.statistics().await.context("reading statistics")?;
      let integrity = app.store.check_integrity().await.context("checking documents")?;
      print(&json!({ "statistics": statistics, "integrity": integrity }))
    }
    Command::Teacher(cmd) => teacher(&app, cmd).await,
    Command::History(cmd) => history(&app, cmd).await,
    Command::Discipline(cmd) => discipline(&app, cmd).await,
  }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn schools(app: &App) -> anyhow::Result<serde_json::Value> {
  let schools = app.store.schools().await.context("reading schools")?;
  Ok(
    schools
      .into_iter()
      .map(|s| {
        let sigla = s.sigla.clone();
        serde_json::to_value(s).map(|v| (sigla, v))
      })
      .collect::<Result<serde_json::Map<_, _>, _>>()?
      .into(),
  )
}

async fn teacher(app: &App, cmd: TeacherCommand) -> anyhow::Result<()> {
  let m = &app.teachers;
  let user = app.user.as_str();
  match cmd {
    TeacherCommand::Add { school, payload } => {
      let draft: TeacherDraft = read_payload(&payload)?;
      print(&m.create(&school, &draft, user).await.map_err(fail)?)
    }
    TeacherCommand::Update { school, siape, payload } => {
      let draft: TeacherDraft = read_payload(&payload)?;
      print(&m.update(&school, &siape, &draft, user).await.map_err(fail)?)
    }
    TeacherCommand::Delete { school, siape } => {
      print(&m.delete(&school, &siape, user).await.map_err(fail)?)
    }
    TeacherCommand::Show { school, siape, include_deleted } => {
      let record = m
        .get(&school, &siape, include_deleted)
        .await
        .map_err(fail)?
        .ok_or_else(|| anyhow!("Professor com SIAPE {siape} não encontrado na escola {school}"))?;
      print(&record)
    }
    TeacherCommand::List { school: Some(school), include_deleted } => {
      print(&m.list(&school, include_deleted).await.map_err(fail)?)
    }
    TeacherCommand::List { school: None, include_deleted } => {
      print(&m.list_all(include_deleted).await.map_err(fail)?)
    }
    TeacherCommand::Search { school, filter } => {
      print(&m.search(&school, &filter.into()).await.map_err(fail)?)
    }
    TeacherCommand::Stats { school } => print(&m.statistics(&school).await.map_err(fail)?),
    TeacherCommand::Check { school } => {
      print(&m.check_consistency(&school).await.map_err(fail)?)
    }
    TeacherCommand::Fix { school } => {
      let fixed = m.fix_data_issues(&school, user).await.map_err(fail)?;
      print(&json!({ "fixed": fixed }))
    }
  }
}

async fn history(app: &App, cmd: HistoryCommand) -> anyhow::Result<()> {
  let ledger = &app.ledger;
  match cmd {
    HistoryCommand::Show { school, siape } => {
      print(&app.teachers.history(&school, &siape).await.map_err(fail)?)
    }
    HistoryCommand::Recent { school, limit, action, by } => {
      let school = school.as_deref();
      let mut entries = match (action, by.as_deref()) {
        (Some(action), _) => ledger.by_action(action, school).await?,
        (None, Some(user)) => ledger.by_user(user, school).await?,
        (None, None) => ledger.recent(school, limit).await?,
      };
      entries.truncate(limit);
      print(&entries)
    }
    HistoryCommand::Range { from, to, school } => {
      let start = from.and_time(NaiveTime::MIN).and_utc();
      let end = to
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .ok_or_else(|| anyhow!("invalid end date {to}"))?
        .and_utc();
      print(&ledger.by_date_range(start, end, school.as_deref()).await?)
    }
    HistoryCommand::Stats { school } => print(&ledger.stats(school.as_deref()).await?),
    HistoryCommand::Check => print(&ledger.check_integrity().await?),
    HistoryCommand::RebuildIndex => {
      let indexed = ledger.rebuild_index().await?;
      print(&json!({ "indexed": indexed }))
    }
    HistoryCommand::Purge { school, siape } => {
      let purged = app.teachers.purge_history(&school, &siape).await.map_err(fail)?;
      print(&json!({ "purged": purged }))
    }
  }
}

async fn discipline(app: &App, cmd: DisciplineCommand) -> anyhow::Result<()> {
  let m = &app.disciplines;
  let user = app.user.as_str();
  match cmd {
    DisciplineCommand::Add { payload } => {
      let draft: DisciplineDraft = read_payload(&payload)?;
      print(&m.create(&draft, user).await.map_err(fail)?)
    }
    DisciplineCommand::Update { codigo, payload } => {
      let draft: DisciplineDraft = read_payload(&payload)?;
      print(&m.update(&codigo, &draft, user).await.map_err(fail)?)
    }
    DisciplineCommand::Deactivate { codigo } => {
      print(&m.deactivate(&codigo, user).await.map_err(fail)?)
    }
    DisciplineCommand::Remove { codigo } => {
      m.remove(&codigo).await.map_err(fail)?;
      print(&json!({ "removed": codigo }))
    }
    DisciplineCommand::List { active, search } => {
      let mut found = match search {
        Some(term) => m.search(&term).await,
        None => m.list().await,
      }
      .map_err(fail)?;
      if active {
        found.retain(|d| d.active);
      }
      print(&found)
    }
    DisciplineCommand::Show { codigo } => {
      let record = m
        .get(&codigo)
        .await
        .map_err(fail)?
        .ok_or_else(|| anyhow!("Disciplina {codigo} não encontrada"))?;
      print(&record)
    }
    DisciplineCommand::Stats => print(&m.statistics().await.map_err(fail)?),
  }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Manager failures are reported by their messages, one per line.
fn fail(err: ManagerError) -> anyhow::Error { anyhow!(err.messages().join("\n")) }

/// Parse a JSON object from `source`, or from stdin when it is `-`.
fn read_payload<T: DeserializeOwned>(source: &Path) -> anyhow::Result<T> {
  let raw = if source == Path::new("-") {
    let mut buf = String::new();
    std::io::stdin()
      .read_to_string(&mut buf)
      .context("reading payload from stdin")?;
    buf
  } else {
    std::fs::read_to_string(source)
      .with_context(|| format!("reading payload {}", source.display()))?
  };
  serde_json::from_str(&raw).context("parsing payload")
}

fn print<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
