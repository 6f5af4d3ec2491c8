//! In-process document store with push snapshots.

use super::eval::evaluate;
use crate::backend::{DocumentStore, Listener, ListenerId};
use crate::error::{LinkError, Result};
use crate::types::{CollectionPath, Document, Query, SnapshotEvent};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default buffered snapshots per listener.
const DEFAULT_LISTENER_BUFFER: usize = 256;

/// Listener lifecycle, in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenerEvent {
    Opened { id: ListenerId, path: String },
    Closed { id: ListenerId, path: String },
}

struct ActiveListener {
    query: Query,
    sender: Sender<SnapshotEvent>,
}

impl ActiveListener {
    /// Returns false if the listener should be dropped.
    fn try_send(&self, event: SnapshotEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

type Collection = BTreeMap<String, Map<String, Value>>;

struct StoreInner {
    collections: RwLock<HashMap<CollectionPath, Collection>>,
    listeners: Mutex<BTreeMap<ListenerId, ActiveListener>>,
    lifecycle: Mutex<Vec<ListenerEvent>>,
    next_id: AtomicU64,
    opened: AtomicU64,
    listen_error: RwLock<Option<LinkError>>,
    denied: RwLock<Vec<CollectionPath>>,
    buffer_size: usize,
}

impl StoreInner {
    fn close(&self, id: ListenerId) -> bool {
        let removed = self.listeners.lock().remove(&id);
        match removed {
            Some(listener) => {
                self.lifecycle.lock().push(ListenerEvent::Closed {
                    id,
                    path: listener.query.path.to_string(),
                });
                true
            }
            None => false,
        }
    }
}

/// Document store held in memory.
///
/// Every write pushes a fresh full snapshot to each listener on the written
/// collection. Cloning shares the same store.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<StoreInner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_LISTENER_BUFFER)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                collections: RwLock::new(HashMap::new()),
                listeners: Mutex::new(BTreeMap::new()),
                lifecycle: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                opened: AtomicU64::new(0),
                listen_error: RwLock::new(None),
                denied: RwLock::new(Vec::new()),
                buffer_size: buffer_size.max(1),
            }),
        }
    }

    // --- Writes ---

    /// Create or replace a document. `value` should be a JSON object.
    pub fn set_document(&self, path: &str, id: &str, value: Value) -> Result<()> {
        let path = CollectionPath::parse(path)?;
        let fields = Document::from_json(id, value).fields;
        self.inner
            .collections
            .write()
            .entry(path.clone())
            .or_default()
            .insert(id.to_string(), fields);
        self.notify(&path);
        Ok(())
    }

    /// Returns false if the document did not exist.
    pub fn delete_document(&self, path: &str, id: &str) -> Result<bool> {
        let path = CollectionPath::parse(path)?;
        let removed = self
            .inner
            .collections
            .write()
            .get_mut(&path)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false);
        if removed {
            self.notify(&path);
        }
        Ok(removed)
    }

    /// All documents in a collection, in key order.
    pub fn documents(&self, path: &str) -> Result<Vec<Document>> {
        let path = CollectionPath::parse(path)?;
        Ok(self
            .inner
            .collections
            .read()
            .get(&path)
            .map(|c| {
                c.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    // --- Fault injection ---

    /// Send `error` to every listener on `path` and close them.
    /// Returns how many listeners were failed.
    pub fn fail_listeners(&self, path: &str, error: LinkError) -> Result<usize> {
        let path = CollectionPath::parse(path)?;
        let ids: Vec<ListenerId> = {
            let listeners = self.inner.listeners.lock();
            listeners
                .iter()
                .filter(|(_, l)| l.query.path == path)
                .map(|(id, l)| {
                    let _ = l.sender.try_send(Err(error.clone()));
                    *id
                })
                .collect()
        };
        for id in &ids {
            self.inner.close(*id);
        }
        Ok(ids.len())
    }

    /// New listeners on `path` receive a permission error as their only event.
    pub fn deny(&self, path: &str) -> Result<()> {
        let path = CollectionPath::parse(path)?;
        self.inner.denied.write().push(path);
        Ok(())
    }

    pub fn allow(&self, path: &str) -> Result<()> {
        let path = CollectionPath::parse(path)?;
        self.inner.denied.write().retain(|p| *p != path);
        Ok(())
    }

    /// Make `listen` itself fail until cleared.
    pub fn set_listen_error(&self, error: Option<LinkError>) {
        *self.inner.listen_error.write() = error;
    }

    // --- Introspection ---

    /// Total listeners ever opened.
    pub fn opened_count(&self) -> u64 {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn active_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    pub fn active_count_for(&self, path: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .values()
            .filter(|l| l.query.path.as_str() == path)
            .count()
    }

    /// Queries of the currently open listeners.
    pub fn active_queries(&self) -> Vec<Query> {
        self.inner
            .listeners
            .lock()
            .values()
            .map(|l| l.query.clone())
            .collect()
    }

    pub fn lifecycle(&self) -> Vec<ListenerEvent> {
        self.inner.lifecycle.lock().clone()
    }

    fn notify(&self, path: &CollectionPath) {
        let collections = self.inner.collections.read();
        let empty = Collection::new();
        let collection = collections.get(path).unwrap_or(&empty);

        let mut dropped = Vec::new();
        {
            let listeners = self.inner.listeners.lock();
            for (id, listener) in listeners.iter() {
                if listener.query.path != *path {
                    continue;
                }
                let snapshot = evaluate(&listener.query, collection);
                if !listener.try_send(Ok(snapshot)) {
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            tracing::warn!(listener = %id, path = %path, "dropping slow snapshot listener");
            self.inner.close(id);
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn listen(&self, query: &Query) -> Result<Listener<SnapshotEvent>> {
        if let Some(error) = self.inner.listen_error.read().clone() {
            return Err(error);
        }

        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.inner.buffer_size);

        if self.inner.denied.read().contains(&query.path) {
            let _ = sender.try_send(Err(LinkError::PermissionDenied(query.path.to_string())));
            return Ok(Listener::detached(id, receiver));
        }

        {
            let collections = self.inner.collections.read();
            let initial = match collections.get(&query.path) {
                Some(collection) => evaluate(query, collection),
                None => evaluate(query, &Collection::new()),
            };
            let _ = sender.try_send(Ok(initial));

            self.inner.listeners.lock().insert(
                id,
                ActiveListener {
                    query: query.clone(),
                    sender,
                },
            );
        }

        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.lifecycle.lock().push(ListenerEvent::Opened {
            id,
            path: query.path.to_string(),
        });

        let weak = Arc::downgrade(&self.inner);
        Ok(Listener::new(id, receiver, move || {
            if let Some(inner) = weak.upgrade() {
                inner.close(id);
            }
        }))
    }
}
