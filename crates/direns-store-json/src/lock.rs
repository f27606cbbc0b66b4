//! Advisory per-document locks.
//!
//! A lock is a sidecar file `<document>.lock` created with create-exclusive
//! semantics; whoever creates it owns the document until the guard drops.
//! The file body records the owner's pid and acquisition time for humans
//! inspecting a stuck lock, and a token naming the owning guard.
//!
//! A stale lock is moved aside under a unique name before it is deleted, and
//! only deleted if it still carries the token seen when it was judged stale.
//! A guard only removes a lock file that still carries its own token.
//!
//! When the filesystem refuses to create lock files at all (read-only mount,
//! permissions, missing directory), acquisition degrades to an in-process
//! mutex. That mode only serialises callers sharing the same [`Locker`] and
//! is always logged.

use std::{
  fs::{self, OpenOptions},
  io::{self, Write as _},
  path::{Path, PathBuf},
  sync::Arc,
  thread,
  time::{Duration, Instant, SystemTime},
};

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Error, Result, StoreConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// `/data/teachers.json` → `/data/teachers.json.lock`.
pub fn lock_path_for(document: &Path) -> PathBuf {
  let mut name = document
    .file_name()
    .map(|n| n.to_os_string())
    .unwrap_or_default();
  name.push(".lock");
  document.with_file_name(name)
}

/// Hands out document locks with a bounded wait.
///
/// Cloning is cheap; clones share the fallback mutex.
#[derive(Debug, Clone)]
pub struct Locker {
  timeout:     Duration,
  stale_after: Option<Duration>,
  fallback:    Arc<Mutex<()>>,
}

impl Locker {
  pub fn new(timeout: Duration, stale_after: Option<Duration>) -> Self {
    Self { timeout, stale_after, fallback: Arc::new(Mutex::new(())) }
  }

  pub fn from_config(config: &StoreConfig) -> Self {
    Self::new(config.lock_timeout, config.stale_lock_after)
  }

  /// Block until `document` is exclusively ours or the timeout elapses.
  pub fn acquire(&self, document: &Path) -> Result<LockGuard<'_>> {
    let path = lock_path_for(document);
    let deadline = Instant::now() + self.timeout;

    loop {
      match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
          let token = Uuid::new_v4().simple().to_string();
          let body = serde_json::json!({
            "pid": std::process::id(),
            "acquired_at": Utc::now().to_rfc3339(),
            "token": token,
          });
          if let Err(e) = writeln!(file, "{body}").and_then(|()| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(Error::io(&path)(e));
          }
          return Ok(LockGuard::File(FileLock { path, token }));
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
          // Token first: if the file is replaced in between, the age check
          // sees the fresh file and nothing is broken.
          let seen = read_token(&path);
          if self.is_stale(&path) {
            break_stale(&path, seen.as_deref())?;
            continue;
          }
          let now = Instant::now();
          if now >= deadline {
            return Err(Error::LockTimeout(path));
          }
          thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
        Err(e) => {
          warn!(
            path = %path.display(),
            error = %e,
            "lock file unavailable; falling back to in-process mutex"
          );
          let remaining = deadline.saturating_duration_since(Instant::now());
          return self
            .fallback
            .try_lock_for(remaining)
            .map(LockGuard::Process)
            .ok_or(Error::LockTimeout(path));
        }
      }
    }
  }

  fn is_stale(&self, path: &Path) -> bool {
    let Some(limit) = self.stale_after else {
      return false;
    };
    fs::metadata(path)
      .and_then(|m| m.modified())
      .ok()
      .and_then(|modified| SystemTime::now().duration_since(modified).ok())
      .is_some_and(|age| age >= limit)
  }
}

/// Move the stale lock at `path` aside and delete it, unless it turns out to
/// be a fresh lock taken after `seen` was read, in which case it is put back.
fn break_stale(path: &Path, seen: Option<&str>) -> Result<()> {
  let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(format!(".{}.stale", Uuid::new_v4().simple()));
  let aside = path.with_file_name(name);

  match fs::rename(path, &aside) {
    Ok(()) => {}
    // Another waiter broke it first.
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(Error::io(path)(e)),
  }

  if read_token(&aside).as_deref() == seen {
    warn!(path = %path.display(), "removed stale lock file");
  } else if let Err(e) = fs::hard_link(&aside, path) {
    warn!(
      path = %path.display(),
      error = %e,
      "could not restore a live lock moved while breaking a stale one"
    );
  } else {
    debug!(path = %path.display(), "restored live lock file");
  }

  if let Err(e) = fs::remove_file(&aside) {
    debug!(path = %aside.display(), error = %e, "failed to remove moved lock file");
  }
  Ok(())
}

/// The owner token recorded in a lock file body, if readable.
fn read_token(path: &Path) -> Option<String> {
  let raw = fs::read_to_string(path).ok()?;
  let body: Value = serde_json::from_str(&raw).ok()?;
  body.get("token")?.as_str().map(str::to_owned)
}

/// Proof of exclusive access. Released on drop.
#[derive(Debug)]
pub enum LockGuard<'a> {
  File(FileLock),
  /// Degraded mode: only guards against callers sharing this process's
  /// [`Locker`].
  Process(MutexGuard<'a, ()>),
}

impl LockGuard<'_> {
  pub fn is_degraded(&self) -> bool { matches!(self, Self::Process(_)) }
}

#[derive(Debug)]
pub struct FileLock {
  path:  PathBuf,
  token: String,
}

impl FileLock {
  pub fn path(&self) -> &Path { &self.path }
}

impl Drop for FileLock {
  fn drop(&mut self) {
    if read_token(&self.path).as_deref() != Some(self.token.as_str()) {
      warn!(path = %self.path.display(), "lock file no longer ours; leaving it");
      return;
    }
    if let Err(e) = fs::remove_file(&self.path) {
      debug!(path = %self.path.display(), error = %e, "failed to remove lock file");
    }
  }
}
