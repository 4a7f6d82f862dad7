//! Remote replication and last-writer-wins merge
//!
//! A session watcher follows the auth provider's sign-in feed. While a
//! user is signed in, one feed task per collection seeds itself with a
//! one-shot owner query and then applies every delivered snapshot to the
//! service state. Merging is last-writer-wins on `last_synced_at`: this is
//! not conflict-free under clock skew or concurrent multi-device writers,
//! it only guarantees that the most recently stamped write survives.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::model::account::Account;
use common::model::trade::Trade;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::repository::Collection;
use crate::service::LedgerService;

/// Record that participates in snapshot merging
pub trait Replicated {
    fn record_id(&self) -> Uuid;
    fn synced_at(&self) -> Option<DateTime<Utc>>;
}

impl Replicated for Account {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }
}

impl Replicated for Trade {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }
}

/// Merge a remote snapshot with local records
///
/// The remote snapshot seeds the result; a local record replaces its
/// remote counterpart only when its sync timestamp is strictly newer than
/// the remote's (both present). Local records the remote lacks are
/// appended. Applying the same snapshot twice yields the same result.
pub fn merge_snapshots<T: Replicated + Clone>(local: &[T], remote: Vec<T>) -> Vec<T> {
    let mut merged = remote;
    let mut index: HashMap<Uuid, usize> = merged
        .iter()
        .enumerate()
        .map(|(position, record)| (record.record_id(), position))
        .collect();

    for record in local {
        match index.get(&record.record_id()) {
            Some(&position) => {
                let local_is_newer = match (record.synced_at(), merged[position].synced_at()) {
                    (Some(local_ts), Some(remote_ts)) => local_ts > remote_ts,
                    _ => false,
                };
                if local_is_newer {
                    merged[position] = record.clone();
                }
            }
            None => {
                index.insert(record.record_id(), merged.len());
                merged.push(record.clone());
            }
        }
    }

    merged
}

/// Follow the auth session feed, starting replication on sign-in and
/// clearing local state on sign-out
pub(crate) fn spawn_session_watcher(service: Arc<LedgerService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sessions = service.auth.watch_sessions();
        loop {
            let user = *sessions.borrow_and_update();
            match user {
                Some(owner) => {
                    info!("Session active for {}, starting replication", owner);
                    begin_replication(&service, owner);
                }
                None => {
                    service.abort_feeds();
                    service.clear_local().await;
                }
            }

            if sessions.changed().await.is_err() {
                break;
            }
        }
    })
}

fn begin_replication(service: &Arc<LedgerService>, owner: Uuid) {
    service.abort_feeds();
    service.syncing.store(true, Ordering::SeqCst);

    let handles = vec![
        tokio::spawn(run_feed(Arc::clone(service), Collection::Accounts, owner)),
        tokio::spawn(run_feed(Arc::clone(service), Collection::Trades, owner)),
    ];
    service.set_feeds(handles);
}

async fn run_feed(service: Arc<LedgerService>, collection: Collection, owner: Uuid) {
    let mut feed = match service.store.subscribe(collection, owner).await {
        Ok(feed) => feed,
        Err(e) => {
            warn!("Failed to subscribe to {} feed: {}", collection.as_str(), e);
            service.online.store(false, Ordering::SeqCst);
            service.syncing.store(false, Ordering::SeqCst);
            return;
        }
    };

    // Seed from the current remote state before following the feed
    match service.store.query(collection, "owner_id", json!(owner)).await {
        Ok(documents) => {
            debug!(
                "Seeding {} from remote: {} documents",
                collection.as_str(),
                documents.len()
            );
            service.apply_snapshot(collection, documents).await;
        }
        Err(e) => {
            warn!("Failed to seed {} from remote: {}", collection.as_str(), e);
            service.online.store(false, Ordering::SeqCst);
        }
    }
    service.syncing.store(false, Ordering::SeqCst);

    loop {
        match feed.recv().await {
            Ok(snapshot) if snapshot.collection == collection && snapshot.owner_id == owner => {
                debug!(
                    "{} snapshot received: {} documents",
                    collection.as_str(),
                    snapshot.documents.len()
                );
                service.apply_snapshot(collection, snapshot.documents).await;
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    "{} feed lagged, skipped {} snapshots",
                    collection.as_str(),
                    skipped
                );
                continue;
            }
            Err(RecvError::Closed) => break,
        }
    }
}
