//! In-process document database. Cloned handles share the same data, which
//! lets several clients in one process observe each other's writes.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use super::{Document, DocumentDb, Fields, ListenerId, Query, RemoteError, SnapshotListener, generate_document_id};
use crate::collection::Collection;

struct Listener {
    query: Query,
    seen_revision: Option<u64>,
    callback: SnapshotListener,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<Collection, BTreeMap<String, Fields>>,
    revisions: HashMap<Collection, u64>,
    listeners: BTreeMap<ListenerId, Listener>,
    next_listener: u64,
}

impl Inner {
    fn revision(&self, collection: Collection) -> u64 {
        self.revisions.get(&collection).copied().unwrap_or(0)
    }

    fn bump(&mut self, collection: Collection) {
        *self.revisions.entry(collection).or_insert(0) += 1;
    }

    fn snapshot(&self, query: &Query) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        query.apply(&mut docs);
        docs
    }
}

#[derive(Clone, Default)]
pub struct MemoryDocumentDb {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryDocumentDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current documents of a collection in id order
    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        self.inner.borrow().snapshot(&Query::collection(collection))
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

impl DocumentDb for MemoryDocumentDb {
    fn listen(&self, query: Query, listener: SnapshotListener) -> Result<ListenerId, RemoteError> {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.insert(
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
        self.inner.borrow_mut().listeners.remove(&id);
    }

    fn add_document(&self, collection: Collection, fields: Fields) -> Result<String, RemoteError> {
        let mut inner = self.inner.borrow_mut();
        let docs = inner.collections.entry(collection).or_default();
        let mut id = generate_document_id();
        while docs.contains_key(&id) {
            id = generate_document_id();
        }
        docs.insert(id.clone(), fields);
        inner.bump(collection);
        Ok(id)
    }

    fn set_document(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), RemoteError> {
        let mut inner = self.inner.borrow_mut();
        let doc = inner
            .collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| RemoteError::NotFound {
                collection,
                id: id.to_string(),
            })?;
        *doc = fields;
        inner.bump(collection);
        Ok(())
    }

    fn delete_document(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        let mut inner = self.inner.borrow_mut();
        let removed = inner
            .collections
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            inner.bump(collection);
        }
        Ok(())
    }

    fn poll(&self) -> Result<usize, RemoteError> {
        let due: Vec<(ListenerId, u64, Vec<Document>)> = {
            let inner = self.inner.borrow();
            inner
                .listeners
                .iter()
                .filter_map(|(id, listener)| {
                    let revision = inner.revision(listener.query.collection);
                    (listener.seen_revision != Some(revision))
                        .then(|| (*id, revision, inner.snapshot(&listener.query)))
                })
                .collect()
        };

        let mut delivered = 0;
        for (id, revision, docs) in due {
            // Run the callback without holding the borrow so it may read the db
            let taken = self.inner.borrow_mut().listeners.remove(&id);
            if let Some(mut listener) = taken {
                (listener.callback)(docs);
                listener.seen_revision = Some(revision);
                self.inner.borrow_mut().listeners.insert(id, listener);
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}
