//! Local store adapter
//!
//! Reads and writes entity arrays as JSON strings in the key-value store.
//! Loading never fails: unreadable data falls back to the caller's default.

use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::collection::EXCHANGE_RATE_KEY;
use crate::models::coerce_id;
use crate::storage::{KvStore, StorageError};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 5;

pub struct LocalStore {
    kv: KvStore,
    /// Per key, entries that carry an id but did not decode. `save` writes them back.
    retained: RefCell<HashMap<String, Vec<Value>>>,
}

impl LocalStore {
    pub fn new(kv: KvStore) -> Self {
        Self {
            kv,
            retained: RefCell::new(HashMap::new()),
        }
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub fn contains(&self, key: &str) -> Result<bool, StorageError> {
        self.kv.contains(key)
    }

    /// Load the array stored under `key`, deduplicated by id (last occurrence wins).
    ///
    /// A missing key, unparsable JSON or a non-array root yields `default`.
    /// Entries without an id are dropped. Entries that don't decode as `T` are
    /// left out of the result but kept for the next `save` of this key.
    pub fn load<T: DeserializeOwned>(&self, key: &str, default: Vec<T>) -> Vec<T> {
        self.retained.borrow_mut().remove(key);
        let raw = match self.kv.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key, "No local data stored, using defaults");
                return default;
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Failed to read local data");
                return default;
            }
        };

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key, error = %e, "Failed to load local data");
                return default;
            }
        };

        let Value::Array(entries) = parsed else {
            tracing::error!(key, "Stored local data is not an array");
            return default;
        };

        let mut items = Vec::new();
        let mut undecodable = Vec::new();
        for entry in dedupe_by_id(entries) {
            match serde_json::from_value::<T>(entry.clone()) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(key, id = ?entry.get("id"), error = %e, "Keeping undecodable local entry as-is");
                    undecodable.push(entry);
                }
            }
        }
        if !undecodable.is_empty() {
            self.retained.borrow_mut().insert(key.to_string(), undecodable);
        }
        items
    }

    /// Number of entries under `key` held back by the last `load`
    pub fn retained_count(&self, key: &str) -> usize {
        self.retained.borrow().get(key).map_or(0, Vec::len)
    }

    /// Forget a held-back entry so the next `save` drops it. Returns true if one was held.
    pub fn discard_retained(&self, key: &str, id: &str) -> bool {
        let mut retained = self.retained.borrow_mut();
        let Some(entries) = retained.get_mut(key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.get("id").and_then(coerce_id).as_deref() != Some(id));
        before != entries.len()
    }

    /// Persist `items` under `key` as canonical JSON (object keys sorted),
    /// followed by any held-back entries whose id `items` doesn't reuse.
    pub fn save<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), StorageError> {
        let mut entries = items
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;

        if let Some(kept) = self.retained.borrow().get(key) {
            let present: HashSet<String> = entries.iter().filter_map(|e| e.get("id").and_then(coerce_id)).collect();
            entries.extend(
                kept.iter()
                    .filter(|e| e.get("id").and_then(coerce_id).is_some_and(|id| !present.contains(&id)))
                    .cloned(),
            );
        }

        let json = canonical_json(&entries)?;
        self.kv.set_item(key, &json)?;
        tracing::debug!(key, count = entries.len(), "Saved local data");
        Ok(())
    }

    /// Stored exchange rate, or `default` when missing or not a positive number
    pub fn load_exchange_rate(&self, default: f64) -> f64 {
        match self.kv.get_item(EXCHANGE_RATE_KEY) {
            Ok(Some(raw)) => match raw.trim().parse::<f64>() {
                Ok(rate) if rate.is_finite() && rate > 0.0 => rate,
                _ => {
                    tracing::warn!(value = %raw, "Ignoring invalid stored exchange rate");
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read exchange rate");
                default
            }
        }
    }

    pub fn save_exchange_rate(&self, rate: f64) -> Result<(), StorageError> {
        let json = serde_json::to_string(&rate)?;
        self.kv.set_item(EXCHANGE_RATE_KEY, &json)
    }
}

/// Serialize through `Value` so the text is identical to what an export/import
/// cycle writes back.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&value)
}

/// Collapse repeated ids, coercing each id to a string. The surviving entry
/// sits at the position of the first occurrence and carries the last one's data.
pub fn dedupe_by_id(entries: Vec<Value>) -> Vec<Value> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Value> = Vec::with_capacity(entries.len());

    for mut entry in entries {
        let Some(id) = entry.get("id").and_then(coerce_id) else {
            continue;
        };
        if id.is_empty() {
            continue;
        }
        entry["id"] = Value::String(id.clone());

        match positions.get(&id) {
            Some(&index) => unique[index] = entry,
            None => {
                positions.insert(id, unique.len());
                unique.push(entry);
            }
        }
    }

    unique
}

/// Millisecond timestamp followed by a short random base-36 suffix.
///
/// Unique enough on one device; two offline devices can collide when their
/// exports are merged.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", chrono::Utc::now().timestamp_millis(), suffix)
}
