//! Whole-document JSON I/O.
//!
//! Callers hold the document's lock around every function here.

use std::{
  fs::{self, File},
  io::Write as _,
  path::{Path, PathBuf},
};

use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::{Error, Result};

pub(crate) const FORMAT_VERSION: &str = "1.0";

/// A top-level JSON object. Key order is preserved.
pub(crate) type Document = Map<String, Value>;

/// A fresh document: an empty `root_key` map plus a metadata block.
pub(crate) fn empty(root_key: &str) -> Document {
  let now = Utc::now().to_rfc3339();
  let mut doc = Document::new();
  doc.insert(root_key.to_owned(), Value::Object(Map::new()));
  doc.insert(
    "metadata".to_owned(),
    json!({ "created_at": now, "version": FORMAT_VERSION, "last_updated": now }),
  );
  doc
}

pub(crate) fn read(path: &Path) -> Result<Document> {
  match read_typed::<Value>(path)? {
    Value::Object(doc) => Ok(doc),
    _ => Err(Error::corrupt(path, "top-level value is not an object")),
  }
}

pub(crate) fn read_typed<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let bytes = fs::read(path).map_err(Error::io(path))?;
  serde_json::from_slice(&bytes).map_err(Error::json(path))
}

/// Replace `path` with `value` so that readers see either the old or the new
/// document, never a mix.
pub(crate) fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
  let mut bytes = serde_json::to_vec_pretty(value).map_err(Error::json(path))?;
  bytes.push(b'\n');

  let tmp = temp_path_for(path);
  let written = File::create(&tmp).and_then(|mut file| {
    file.write_all(&bytes)?;
    file.sync_all()
  });
  let result = written.and_then(|()| fs::rename(&tmp, path));
  if let Err(e) = result {
    let _ = fs::remove_file(&tmp);
    return Err(Error::io(path)(e));
  }
  Ok(())
}

/// Write `doc` only if `path` does not exist yet. Returns whether it wrote.
pub(crate) fn create_if_absent(path: &Path, doc: &Document) -> Result<bool> {
  if path.exists() {
    return Ok(false);
  }
  write_atomic(path, doc)?;
  Ok(true)
}

/// Set `metadata.last_updated` to now, creating the block if needed.
pub(crate) fn touch(doc: &mut Document) {
  let now = Value::String(Utc::now().to_rfc3339());
  match doc.get_mut("metadata") {
    Some(Value::Object(meta)) => {
      meta.insert("last_updated".to_owned(), now);
    }
    _ => {
      doc.insert("metadata".to_owned(), json!({ "last_updated": now }));
    }
  }
}

/// The object under `key`, inserted empty if absent.
pub(crate) fn child_mut<'d>(
  doc: &'d mut Document,
  key: &str,
  path: &Path,
) -> Result<&'d mut Document> {
  doc
    .entry(key.to_owned())
    .or_insert_with(|| Value::Object(Map::new()))
    .as_object_mut()
    .ok_or_else(|| Error::corrupt(path, format!("`{key}` is not an object")))
}

/// The object under `key`, if present.
pub(crate) fn child<'d>(
  doc: &'d Document,
  key: &str,
  path: &Path,
) -> Result<Option<&'d Document>> {
  match doc.get(key) {
    None => Ok(None),
    Some(Value::Object(map)) => Ok(Some(map)),
    Some(_) => Err(Error::corrupt(path, format!("`{key}` is not an object"))),
  }
}

fn temp_path_for(path: &Path) -> PathBuf {
  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}
