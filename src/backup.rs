//! Export, import and reset of everything the app persists locally.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::collection::ALL_STORAGE_KEYS;
use crate::local::canonical_json;
use crate::storage::{KvStore, StorageError};

/// Text an operator must type to wipe local storage
pub const RESET_TOKEN: &str = "RESET";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("No data to export")]
    NothingToExport,
    #[error("Import file must contain a JSON object")]
    MalformedImport,
    #[error("Reset not confirmed: type {RESET_TOKEN} to wipe all local data")]
    ResetNotConfirmed,
    #[error("Stored value for '{key}' is not valid JSON")]
    CorruptEntry { key: String },
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// `travel_backup_YYYY-MM-DD.json`
pub fn export_filename(date: NaiveDate) -> String {
    format!("travel_backup_{}.json", date.format("%Y-%m-%d"))
}

/// Every known key present in storage, parsed, as one pretty-printed object
pub fn export_data(kv: &KvStore) -> Result<String, BackupError> {
    let mut data = Map::new();
    for key in ALL_STORAGE_KEYS {
        let Some(raw) = kv.get_item(key)? else {
            continue;
        };
        let value: Value = serde_json::from_str(&raw).map_err(|_| BackupError::CorruptEntry { key: key.to_string() })?;
        data.insert(key.to_string(), value);
    }

    if data.is_empty() {
        return Err(BackupError::NothingToExport);
    }
    tracing::info!(keys = data.len(), "Exported local data");
    Ok(serde_json::to_string_pretty(&Value::Object(data))?)
}

/// Write an export file named for `date` into `dir`
pub fn export_to_dir(kv: &KvStore, dir: &Path, date: NaiveDate) -> Result<PathBuf, BackupError> {
    let json = export_data(kv)?;
    fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(date));
    fs::write(&path, json)?;
    tracing::info!(path = ?path, "Wrote backup file");
    Ok(path)
}

/// Apply a backup. Known keys are written in one transaction, unknown keys are
/// ignored. Returns the keys that were written.
pub fn import_data(kv: &KvStore, json: &str) -> Result<Vec<String>, BackupError> {
    let Ok(Value::Object(data)) = serde_json::from_str::<Value>(json) else {
        tracing::warn!("Rejected import: not a JSON object");
        return Err(BackupError::MalformedImport);
    };

    let mut entries = Vec::new();
    for key in ALL_STORAGE_KEYS {
        if let Some(value) = data.get(key) {
            entries.push((key.to_string(), canonical_json(value)?));
        }
    }
    for key in data.keys().filter(|k| !ALL_STORAGE_KEYS.contains(&k.as_str())) {
        tracing::debug!(key = %key, "Ignoring unknown import key");
    }

    kv.set_items(&entries)?;
    let applied: Vec<String> = entries.into_iter().map(|(key, _)| key).collect();
    tracing::info!(keys = applied.len(), "Imported local data");
    Ok(applied)
}

pub fn import_file(kv: &KvStore, path: &Path) -> Result<Vec<String>, BackupError> {
    let json = fs::read_to_string(path)?;
    import_data(kv, &json)
}

/// Wipe the whole store. Returns the number of keys removed.
pub fn reset(kv: &KvStore, confirmation: &str) -> Result<usize, BackupError> {
    if confirmation != RESET_TOKEN {
        return Err(BackupError::ResetNotConfirmed);
    }
    let removed = kv.clear()?;
    tracing::warn!(removed, "Local storage wiped");
    Ok(removed)
}
