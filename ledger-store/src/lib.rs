//! Ledger store for the trading journal
//!
//! Single source of truth for accounts, trades, the selected-account
//! pointer and sync status. Callers route every mutation through
//! [`LedgerService`]; the service persists each change to a local durable
//! cache and replicates it to a remote document store on a best-effort
//! basis, merging remote snapshots back in by a last-writer-wins rule.

pub mod service;
pub mod repository;
pub mod cache;
pub mod auth;
pub mod sync;
pub mod stats;
pub mod config;

pub use service::LedgerService;
pub use repository::{Collection, DocumentStore, InMemoryDocumentStore, Snapshot};
pub use cache::{FileCache, LocalCache, MemoryCache};
pub use auth::{AuthProvider, SessionAuth};
pub use stats::AccountStats;
pub use config::LedgerConfig;
