//! Document database kept in a shared SQLite file.
//!
//! Every client opens the same file. Each write bumps a per-collection
//! revision counter; `poll` compares counters to decide which listeners are
//! due a fresh snapshot, so writes from other processes are picked up too.

use rusqlite::{Connection, OptionalExtension};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::{Document, DocumentDb, Fields, ListenerId, Query, RemoteError, SnapshotListener, generate_document_id};
use crate::collection::Collection;

struct Listener {
    query: Query,
    seen_revision: Option<i64>,
    callback: SnapshotListener,
}

pub struct SqliteDocumentDb {
    conn: Connection,
    listeners: RefCell<BTreeMap<ListenerId, Listener>>,
    next_listener: Cell<u64>,
}

impl SqliteDocumentDb {
    /// Open the shared database for `project_id`, claiming it on first use.
    pub fn open(path: &Path, project_id: &str) -> Result<Self, RemoteError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| RemoteError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self::with_connection(conn)?;
        db.claim_project(project_id)?;

        tracing::info!(project = project_id, "Connected to document database at {:?}", path);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, RemoteError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RemoteError> {
        let db = Self {
            conn,
            listeners: RefCell::new(BTreeMap::new()),
            next_listener: Cell::new(0),
        };
        db.initialize_schema()?;
        Ok(db)
    }

    fn initialize_schema(&self) -> Result<(), RemoteError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection      TEXT NOT NULL,
                id              TEXT NOT NULL,
                fields          TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS revisions (
                collection      TEXT PRIMARY KEY NOT NULL,
                revision        INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key             TEXT PRIMARY KEY NOT NULL,
                value           TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    fn claim_project(&self, project_id: &str) -> Result<(), RemoteError> {
        let found: Option<String> = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'project_id'", [], |row| row.get(0))
            .optional()?;

        match found {
            Some(found) if found != project_id => Err(RemoteError::ProjectMismatch {
                expected: project_id.to_string(),
                found,
            }),
            Some(_) => Ok(()),
            None => {
                self.conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('project_id', ?1)",
                    rusqlite::params![project_id],
                )?;
                Ok(())
            }
        }
    }

    fn revision(&self, collection: Collection) -> Result<i64, RemoteError> {
        let revision: Option<i64> = self
            .conn
            .query_row(
                "SELECT revision FROM revisions WHERE collection = ?1",
                rusqlite::params![collection.name()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(revision.unwrap_or(0))
    }

    fn bump(tx: &rusqlite::Transaction<'_>, collection: Collection) -> Result<(), RemoteError> {
        tx.execute(
            "INSERT INTO revisions (collection, revision) VALUES (?1, 1)
             ON CONFLICT(collection) DO UPDATE SET revision = revision + 1",
            rusqlite::params![collection.name()],
        )?;
        Ok(())
    }

    fn snapshot(&self, query: &Query) -> Result<Vec<Document>, RemoteError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, fields FROM documents WHERE collection = ?1 ORDER BY id ASC")?;
        let rows = stmt
            .query_map(rusqlite::params![query.collection.name()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut docs = Vec::with_capacity(rows.len());
        for (id, raw) in rows {
            match serde_json::from_str::<Fields>(&raw) {
                Ok(fields) => docs.push(Document { id, fields }),
                Err(e) => tracing::warn!(collection = %query.collection, id = %id, error = %e, "Skipping corrupt document"),
            }
        }
        query.apply(&mut docs);
        Ok(docs)
    }
}

impl DocumentDb for SqliteDocumentDb {
    fn listen(&self, query: Query, listener: SnapshotListener) -> Result<ListenerId, RemoteError> {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().insert(
            id,
            Listener {
                query,
                seen_revision: None,
                callback: listener,
            },
        );
        Ok(id)
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.borrow_mut().remove(&id);
    }

    fn add_document(&self, collection: Collection, fields: Fields) -> Result<String, RemoteError> {
        let body = serde_json::to_string(&fields)?;
        let tx = self.conn.unchecked_transaction()?;
        let mut id = generate_document_id();
        loop {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO documents (collection, id, fields) VALUES (?1, ?2, ?3)",
                rusqlite::params![collection.name(), id, body],
            )?;
            if inserted == 1 {
                break;
            }
            id = generate_document_id();
        }
        Self::bump(&tx, collection)?;
        tx.commit()?;
        Ok(id)
    }

    fn set_document(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), RemoteError> {
        let body = serde_json::to_string(&fields)?;
        let tx = self.conn.unchecked_transaction()?;
        let updated = tx.execute(
            "UPDATE documents SET fields = ?1 WHERE collection = ?2 AND id = ?3",
            rusqlite::params![body, collection.name(), id],
        )?;
        if updated == 0 {
            return Err(RemoteError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        Self::bump(&tx, collection)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_document(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        let tx = self.conn.unchecked_transaction()?;
        let deleted = tx.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection.name(), id],
        )?;
        if deleted > 0 {
            Self::bump(&tx, collection)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn poll(&self) -> Result<usize, RemoteError> {
        let mut due: Vec<(ListenerId, i64, Vec<Document>)> = Vec::new();
        {
            let listeners = self.listeners.borrow();
            for (id, listener) in listeners.iter() {
                let revision = self.revision(listener.query.collection)?;
                if listener.seen_revision != Some(revision) {
                    due.push((*id, revision, self.snapshot(&listener.query)?));
                }
            }
        }

        let mut delivered = 0;
        for (id, revision, docs) in due {
            let taken = self.listeners.borrow_mut().remove(&id);
            if let Some(mut listener) = taken {
                (listener.callback)(docs);
                listener.seen_revision = Some(revision);
                self.listeners.borrow_mut().insert(id, listener);
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_two_handles_on_one_file_see_each_other() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("remote.db");
        let first = SqliteDocumentDb::open(&path, "trip").unwrap();
        let second = SqliteDocumentDb::open(&path, "trip").unwrap();

        let counts = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&counts);
        second
            .listen(
                Query::collection(Collection::Itinerary),
                Box::new(move |docs| sink.borrow_mut().push(docs.len())),
            )
            .unwrap();
        second.poll().unwrap();

        first.add_document(Collection::Itinerary, fields(json!({"title": "Arrive"}))).unwrap();
        second.poll().unwrap();

        assert_eq!(*counts.borrow(), vec![0, 1]);
    }

    #[test]
    fn test_project_mismatch_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("remote.db");
        SqliteDocumentDb::open(&path, "trip").unwrap();

        let err = SqliteDocumentDb::open(&path, "other-trip").err().unwrap();
        assert!(matches!(err, RemoteError::ProjectMismatch { .. }));
    }

    #[test]
    fn test_crud_and_ordering() {
        let db = SqliteDocumentDb::open_in_memory().unwrap();
        let a = db
            .add_document(Collection::Expenses, fields(json!({"date": "2025-12-24", "amount": 1})))
            .unwrap();
        db.add_document(Collection::Expenses, fields(json!({"date": "2025-12-27", "amount": 2})))
            .unwrap();

        db.set_document(Collection::Expenses, &a, fields(json!({"date": "2025-12-30", "amount": 3})))
            .unwrap();
        let docs = db
            .snapshot(&crate::remote::query_for(Collection::Expenses))
            .unwrap();
        assert_eq!(docs[0].id, a);
        assert_eq!(docs[0].fields["amount"], json!(3));

        db.delete_document(Collection::Expenses, &a).unwrap();
        assert_eq!(db.snapshot(&Query::collection(Collection::Expenses)).unwrap().len(), 1);

        let err = db
            .set_document(Collection::Expenses, &a, fields(json!({})))
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }
}
