//! Remote store adapter
//!
//! Talks to a live document database through the `DocumentDb` trait. Writes
//! are not echoed locally: every change, including our own, comes back as a
//! full collection snapshot the next time the database is polled.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryDocumentDb;
pub use sqlite::SqliteDocumentDb;

use rand::Rng;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::rc::Rc;
use thiserror::Error;

use crate::collection::{Collection, Entity};

/// Document body: every field except the id.
pub type Fields = Map<String, Value>;

/// Receives the complete, ordered contents of a collection after each change.
pub type SnapshotListener = Box<dyn FnMut(Vec<Document>)>;

const DOCUMENT_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const DOCUMENT_ID_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Document {id} not found in {collection}")]
    NotFound { collection: Collection, id: String },
    #[error("Entity did not serialize to a JSON object")]
    NotAnObject,
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Document database belongs to project '{found}', expected '{expected}'")]
    ProjectMismatch { expected: String, found: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// Document fields with the server id spread in as `id`.
    pub fn into_value(self) -> Value {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        Value::Object(fields)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// What a listener watches: one collection, optionally ordered by a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: Collection,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn collection(collection: Collection) -> Self {
        Self {
            collection,
            order_by: None,
        }
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    /// Sort documents already in id order. Documents missing the field go last.
    pub fn apply(&self, docs: &mut [Document]) {
        let Some((field, direction)) = &self.order_by else {
            return;
        };
        docs.sort_by(|a, b| {
            match (a.fields.get(field), b.fields.get(field)) {
                (Some(x), Some(y)) => {
                    let ord = compare_values(x, y);
                    match direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// A document database with push-style change listeners.
///
/// Listeners are invoked from `poll`, never from inside a write, so callers
/// stay single-threaded and never observe their own writes synchronously.
pub trait DocumentDb {
    fn listen(&self, query: Query, listener: SnapshotListener) -> Result<ListenerId, RemoteError>;
    fn unlisten(&self, id: ListenerId);
    /// Insert a new document and return its server-assigned id
    fn add_document(&self, collection: Collection, fields: Fields) -> Result<String, RemoteError>;
    /// Overwrite an existing document
    fn set_document(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), RemoteError>;
    fn delete_document(&self, collection: Collection, id: &str) -> Result<(), RemoteError>;
    /// Deliver a snapshot to every listener whose collection changed since its
    /// last delivery (or that has never received one). Returns deliveries made.
    fn poll(&self) -> Result<usize, RemoteError>;
}

/// Opaque 20-character document id
pub fn generate_document_id() -> String {
    let mut rng = rand::thread_rng();
    (0..DOCUMENT_ID_LEN)
        .map(|_| DOCUMENT_ID_ALPHABET[rng.gen_range(0..DOCUMENT_ID_ALPHABET.len())] as char)
        .collect()
}

/// The query each collection is watched with.
pub fn query_for(collection: Collection) -> Query {
    match collection {
        Collection::Expenses => Query::collection(collection).order_by("date", Direction::Descending),
        _ => Query::collection(collection),
    }
}

/// Live listener registration. Detaches exactly once, on `unsubscribe` or drop.
pub struct Subscription {
    db: Rc<dyn DocumentDb>,
    id: Option<ListenerId>,
    collection: Collection,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.db.unlisten(id);
            tracing::debug!(collection = %self.collection, "Unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Typed facade over a `DocumentDb`.
#[derive(Clone)]
pub struct RemoteStore {
    db: Rc<dyn DocumentDb>,
}

impl RemoteStore {
    pub fn new(db: Rc<dyn DocumentDb>) -> Self {
        Self { db }
    }

    /// Watch `T`'s collection; `on_change` gets the full decoded array on every change
    pub fn subscribe<T, F>(&self, mut on_change: F) -> Result<Subscription, RemoteError>
    where
        T: Entity,
        F: FnMut(Vec<T>) + 'static,
    {
        let collection = T::COLLECTION;
        let id = self.db.listen(
            query_for(collection),
            Box::new(move |docs| on_change(decode_documents::<T>(collection, docs))),
        )?;
        tracing::debug!(%collection, "Subscribed");
        Ok(Subscription {
            db: Rc::clone(&self.db),
            id: Some(id),
            collection,
        })
    }

    /// Insert `item` as a new document, ignoring any client-side id
    pub fn create<T: Entity>(&self, item: &T) -> Result<String, RemoteError> {
        let fields = to_fields(item)?;
        self.db.add_document(T::COLLECTION, fields)
    }

    pub fn replace<T: Entity>(&self, id: &str, item: &T) -> Result<(), RemoteError> {
        let fields = to_fields(item)?;
        self.db.set_document(T::COLLECTION, id, fields)
    }

    pub fn remove(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        self.db.delete_document(collection, id)
    }

    pub fn poll(&self) -> Result<usize, RemoteError> {
        self.db.poll()
    }
}

fn to_fields<T: Entity>(item: &T) -> Result<Fields, RemoteError> {
    match serde_json::to_value(item)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        _ => Err(RemoteError::NotAnObject),
    }
}

fn decode_documents<T: Entity>(collection: Collection, docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match serde_json::from_value::<T>(doc.into_value()) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(%collection, id = %id, error = %e, "Skipping undecodable document");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Expense, ExpenseType, Member};
    use serde_json::json;
    use std::cell::RefCell;

    fn doc(id: &str, fields: Value) -> Document {
        let Value::Object(fields) = fields else { panic!("fields must be an object") };
        Document { id: id.to_string(), fields }
    }

    #[test]
    fn test_query_orders_descending_with_missing_last() {
        let query = query_for(Collection::Expenses);
        let mut docs = vec![
            doc("a", json!({"date": "2025-12-24"})),
            doc("b", json!({})),
            doc("c", json!({"date": "2025-12-26"})),
        ];
        query.apply(&mut docs);
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_create_strips_client_id() {
        let db = MemoryDocumentDb::new();
        let store = RemoteStore::new(Rc::new(db.clone()));
        let mut member = Member::new("Lily".to_string());
        member.id = "client-side".to_string();

        let server_id = store.create(&member).unwrap();
        assert_ne!(server_id, "client-side");
        assert_eq!(server_id.len(), DOCUMENT_ID_LEN);

        let stored = db.documents(Collection::Members);
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].fields.contains_key("id"));
    }

    #[test]
    fn test_subscription_delivers_decoded_entities() {
        let db = MemoryDocumentDb::new();
        let store = RemoteStore::new(Rc::new(db));
        let seen: Rc<RefCell<Vec<Vec<Expense>>>> = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        let _sub = store
            .subscribe::<Expense, _>(move |items| sink.borrow_mut().push(items))
            .unwrap();

        let mut older = Expense::new("Taxi".into(), 8000.0, "KRW".into(), ExpenseType::Public, "mem_0".into());
        older.date = "2025-12-24T10:00:00.000Z".to_string();
        let mut newer = Expense::new("Dinner".into(), 30000.0, "KRW".into(), ExpenseType::Public, "mem_0".into());
        newer.date = "2025-12-25T19:00:00.000Z".to_string();
        store.create(&older).unwrap();
        store.create(&newer).unwrap();

        store.poll().unwrap();
        let seen = seen.borrow();
        let last = seen.last().unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].description, "Dinner");
        assert!(last.iter().all(|e| e.id.len() == DOCUMENT_ID_LEN));
    }

    #[test]
    fn test_dropping_subscription_detaches_listener() {
        let db = MemoryDocumentDb::new();
        let store = RemoteStore::new(Rc::new(db.clone()));

        let sub = store.subscribe::<Member, _>(|_| {}).unwrap();
        assert_eq!(db.listener_count(), 1);
        sub.unsubscribe();
        assert_eq!(db.listener_count(), 0);

        {
            let _sub = store.subscribe::<Member, _>(|_| {}).unwrap();
            assert_eq!(db.listener_count(), 1);
        }
        assert_eq!(db.listener_count(), 0);
    }

    #[test]
    fn test_replace_missing_document_is_not_found() {
        let store = RemoteStore::new(Rc::new(MemoryDocumentDb::new()));
        let member = Member::new("Ghost".to_string());
        let err = store.replace("missing", &member).unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }
}
