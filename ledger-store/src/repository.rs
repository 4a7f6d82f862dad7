//! Remote document store contract and in-memory implementation

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::error::{Error, Result};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Default capacity of each change feed
pub const FEED_CAPACITY: usize = 64;

/// Remote collections replicated by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Accounts,
    Trades,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Accounts => "accounts",
            Collection::Trades => "trades",
        }
    }
}

/// Full snapshot of one owner's documents in a collection, as delivered by
/// a change feed
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub collection: Collection,
    pub owner_id: Uuid,
    pub documents: Vec<Value>,
}

/// Document store trait defining the remote persistence contract
///
/// Documents are JSON values; timestamps round-trip through serde. Every
/// write to a collection republishes the affected owner's full snapshot on
/// that collection's change feed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or replace a document
    async fn put(&self, collection: Collection, id: Uuid, document: Value) -> Result<()>;

    /// Delete a document; deleting an absent document is not an error
    async fn delete(&self, collection: Collection, id: Uuid) -> Result<()>;

    /// All documents whose `field` equals `value`
    async fn query(&self, collection: Collection, field: &str, value: Value) -> Result<Vec<Value>>;

    /// Follow snapshot events for `owner_id`'s documents in a collection
    async fn subscribe(&self, collection: Collection, owner_id: Uuid) -> Result<broadcast::Receiver<Snapshot>>;
}

/// In-memory document store
///
/// Serves as the replication target in tests and demo sessions. The
/// availability switch simulates a connectivity outage: while unavailable
/// every operation fails, which is how the offline path of the service is
/// exercised.
pub struct InMemoryDocumentStore {
    /// Documents by collection and ID
    documents: DashMap<(Collection, Uuid), Value>,
    /// Change feed senders by collection
    feeds: DashMap<Collection, broadcast::Sender<Snapshot>>,
    /// Whether operations currently succeed
    available: AtomicBool,
    /// Capacity of each change feed
    feed_capacity: usize,
}

impl InMemoryDocumentStore {
    /// Create a new in-memory document store
    pub fn new() -> Self {
        Self::with_feed_capacity(FEED_CAPACITY)
    }

    /// Create a store with a specific change-feed capacity
    pub fn with_feed_capacity(feed_capacity: usize) -> Self {
        Self {
            documents: DashMap::new(),
            feeds: DashMap::new(),
            available: AtomicBool::new(true),
            feed_capacity: feed_capacity.max(1),
        }
    }

    /// Flip the simulated connectivity state
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of documents currently held in a collection
    pub fn len(&self, collection: Collection) -> usize {
        self.documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .count()
    }

    /// Whether a collection holds no documents
    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    /// Fetch a single document
    pub fn get(&self, collection: Collection, id: Uuid) -> Option<Value> {
        self.documents.get(&(collection, id)).map(|doc| doc.clone())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::RemoteStore("document store unavailable".to_string()))
        }
    }

    fn sender(&self, collection: Collection) -> broadcast::Sender<Snapshot> {
        self.feeds
            .entry(collection)
            .or_insert_with(|| broadcast::channel(self.feed_capacity).0)
            .value()
            .clone()
    }

    fn publish(&self, collection: Collection, owner_id: Uuid) {
        let owner_value = json!(owner_id);
        let documents = self
            .documents
            .iter()
            .filter(|entry| {
                entry.key().0 == collection && entry.value().get("owner_id") == Some(&owner_value)
            })
            .map(|entry| entry.value().clone())
            .collect();

        // No receivers is fine; the snapshot is simply dropped
        let _ = self.sender(collection).send(Snapshot {
            collection,
            owner_id,
            documents,
        });
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn document_owner(document: &Value) -> Option<Uuid> {
    document
        .get("owner_id")
        .and_then(|value| value.as_str())
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(&self, collection: Collection, id: Uuid, document: Value) -> Result<()> {
        self.ensure_available()?;

        debug!("Storing {} document {}", collection.as_str(), id);
        let owner = document_owner(&document);
        self.documents.insert((collection, id), document);

        if let Some(owner) = owner {
            self.publish(collection, owner);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<()> {
        self.ensure_available()?;

        debug!("Deleting {} document {}", collection.as_str(), id);
        if let Some((_, document)) = self.documents.remove(&(collection, id)) {
            if let Some(owner) = document_owner(&document) {
                self.publish(collection, owner);
            }
        }
        Ok(())
    }

    async fn query(&self, collection: Collection, field: &str, value: Value) -> Result<Vec<Value>> {
        self.ensure_available()?;

        let matches = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == collection && entry.value().get(field) == Some(&value))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(matches)
    }

    async fn subscribe(&self, collection: Collection, owner_id: Uuid) -> Result<broadcast::Receiver<Snapshot>> {
        debug!("New {} feed subscription for {}", collection.as_str(), owner_id);
        Ok(self.sender(collection).subscribe())
    }
}
