//! Client Registry
//!
//! Issues monotonic client identifiers and owns per-client metadata for
//! the lifetime of each session. Clients are shared by reference count:
//! the registry holds one `Arc<Client>` and the connection task holds
//! another, so `CLIENT ID` keeps working even while the registry entry
//! is being dropped on a racing disconnect.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata attached to one connected client.
#[derive(Debug)]
pub struct Client {
    id: i64,
    name: RwLock<Option<Bytes>>,
    created_at_ms: u64,
}

impl Client {
    fn new(id: i64) -> Self {
        let created_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        Self {
            id,
            name: RwLock::new(None),
            created_at_ms,
        }
    }

    /// The monotonic identifier assigned at registration.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The name set by `CLIENT SETNAME`, if any.
    pub fn name(&self) -> Option<Bytes> {
        self.name.read().unwrap().clone()
    }

    /// Sets or clears the client name.
    pub fn set_name(&self, name: Option<Bytes>) {
        *self.name.write().unwrap() = name;
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }
}

/// Registry of connected clients keyed by id.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<i64, Arc<Client>>>,
    next_id: AtomicI64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Allocates the next id, records the client, and returns the
    /// connection's retained reference.
    pub fn register_connection(&self) -> Arc<Client> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(Client::new(id));
        self.clients
            .write()
            .unwrap()
            .insert(id, Arc::clone(&client));
        client
    }

    /// Drops the registry's reference for `id`. Returns whether the id
    /// was registered.
    pub fn drop_connection(&self, id: i64) -> bool {
        self.clients.write().unwrap().remove(&id).is_some()
    }

    /// Looks up a client by id.
    pub fn get(&self, id: i64) -> Option<Arc<Client>> {
        self.clients.read().unwrap().get(&id).cloned()
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
