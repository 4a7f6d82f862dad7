//! Ledger service implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use common::decimal::Amount;
use common::error::{Error, Result};
use common::model::account::Account;
use common::model::trade::{self, Trade, TradeDraft, TradePatch};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::cache::{self, FileCache, LocalCache};
use crate::config::LedgerConfig;
use crate::repository::{Collection, DocumentStore, InMemoryDocumentStore};
use crate::stats::{self, AccountStats, DailyPerformance, PairPerformance, WeekdayPerformance};
use crate::sync;

const ACCOUNTS_KEY: &str = "accounts";
const TRADES_KEY: &str = "trades";
const SELECTED_KEY: &str = "selected_account";

/// In-memory ledger state: the two collections and the selection pointer
struct LedgerState {
    accounts: Vec<Account>,
    trades: Vec<Trade>,
    selected_account_id: Option<Uuid>,
}

/// Ledger service: the single owner of accounts, trades, the selected
/// account and connectivity status
///
/// Every mutation updates the in-memory state, persists a snapshot to the
/// local cache, and issues a fire-and-forget remote write. A failed remote
/// write only flips the `online` flag; the local mutation always stands.
pub struct LedgerService {
    state: RwLock<LedgerState>,
    pub(crate) store: Arc<dyn DocumentStore>,
    cache: Arc<dyn LocalCache>,
    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) online: Arc<AtomicBool>,
    pub(crate) syncing: Arc<AtomicBool>,
    feeds: StdMutex<Vec<JoinHandle<()>>>,
    watcher: StdMutex<Option<JoinHandle<()>>>,
}

impl LedgerService {
    /// Create a new ledger service, reloading any state the local cache
    /// holds from a previous session
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn LocalCache>,
        auth: Arc<dyn AuthProvider>,
    ) -> Arc<Self> {
        let state = LedgerState {
            accounts: cache::load_json(cache.as_ref(), ACCOUNTS_KEY, Vec::new()),
            trades: cache::load_json(cache.as_ref(), TRADES_KEY, Vec::new()),
            selected_account_id: cache::load_json(cache.as_ref(), SELECTED_KEY, None),
        };

        Arc::new(Self {
            state: RwLock::new(state),
            store,
            cache,
            auth,
            online: Arc::new(AtomicBool::new(true)),
            syncing: Arc::new(AtomicBool::new(false)),
            feeds: StdMutex::new(Vec::new()),
            watcher: StdMutex::new(None),
        })
    }

    /// Create a ledger service from a configuration: file-backed cache and
    /// an in-memory document store (unavailable when configured offline)
    pub fn with_config(config: &LedgerConfig, auth: Arc<dyn AuthProvider>) -> Result<Arc<Self>> {
        let cache: Arc<dyn LocalCache> = match &config.cache_dir {
            Some(dir) => Arc::new(FileCache::new(dir.clone())?),
            None => Arc::new(FileCache::in_user_data()?),
        };

        let store = Arc::new(InMemoryDocumentStore::with_feed_capacity(config.feed_capacity));
        if config.offline {
            store.set_available(false);
        }

        Ok(Self::new(store, cache, auth))
    }

    /// Start session watching and remote replication
    pub fn start(service: &Arc<LedgerService>) {
        let handle = sync::spawn_session_watcher(Arc::clone(service));
        if let Ok(mut watcher) = service.watcher.lock() {
            if let Some(previous) = watcher.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Whether the last remote interaction succeeded
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether a replication pass is currently in flight
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Create a new account and select it if nothing is selected yet
    pub async fn add_account(&self, name: &str, size: Amount, currency: &str) -> Result<Account> {
        let owner = self.require_user("adding an account")?;

        if name.trim().is_empty() {
            return Err(Error::ValidationError("account name must not be empty".to_string()));
        }
        if size <= Amount::ZERO {
            return Err(Error::ValidationError(format!(
                "account size must be positive, got {}",
                size
            )));
        }

        let account = Account::new(name, size, currency, owner);
        info!("Creating account {} ({} {})", account.name, account.size, account.currency);

        {
            let mut state = self.state.write().await;
            state.accounts.push(account.clone());
            if state.selected_account_id.is_none() {
                state.selected_account_id = Some(account.id);
            }
            self.persist(&state);
        }

        self.push_remote(Collection::Accounts, account.id, serde_json::to_value(&account)?);
        Ok(account)
    }

    /// Point the selection at `id`; no existence check, downstream queries
    /// for an unknown id return defaults
    pub async fn select_account(&self, id: Uuid) {
        let mut state = self.state.write().await;
        state.selected_account_id = Some(id);
        self.persist(&state);
    }

    /// Record a new trade, resolving its profit at entry time
    pub async fn add_trade(&self, draft: TradeDraft) -> Result<Trade> {
        let owner = self.require_user("adding a trade")?;

        let mut state = self.state.write().await;
        let account_size = state
            .accounts
            .iter()
            .find(|account| account.id == draft.account_id)
            .map(|account| account.size)
            .unwrap_or(Amount::ZERO);

        let profit = trade::resolve_profit(
            account_size,
            draft.risk,
            &draft.risk_reward,
            draft.result,
            draft.profit_basis,
            draft.manual_profit_loss,
        );

        let new_trade = Trade {
            id: draft.id.unwrap_or_else(Uuid::new_v4),
            account_id: draft.account_id,
            pair: draft.pair,
            date: draft.date,
            direction: draft.direction,
            risk: draft.risk,
            risk_reward: draft.risk_reward,
            result: draft.result,
            profit_basis: draft.profit_basis,
            manual_profit_loss: draft.manual_profit_loss,
            profit,
            duration: draft.duration,
            notes: draft.notes,
            screenshot: draft.screenshot,
            owner_id: Some(owner),
            last_synced_at: Some(chrono::Utc::now()),
        };

        info!("Recording {} trade on {} (profit {})", new_trade.pair, new_trade.date, profit);
        state.trades.insert(0, new_trade.clone());
        self.persist(&state);
        drop(state);

        self.push_remote(Collection::Trades, new_trade.id, serde_json::to_value(&new_trade)?);
        Ok(new_trade)
    }

    /// Apply a partial update to a trade, recomputing profit when any of
    /// risk, risk:reward or result changed
    ///
    /// The recomputation keeps the trade's pre-patch profit basis and only
    /// sees a manual amount if the patch carries one.
    pub async fn update_trade(&self, id: Uuid, patch: TradePatch) -> Result<Trade> {
        self.require_user("updating a trade")?;

        let mut state = self.state.write().await;
        let position = state
            .trades
            .iter()
            .position(|trade| trade.id == id)
            .ok_or_else(|| Error::TradeNotFound(id.to_string()))?;

        let new_profit = if patch.affects_profit() {
            let existing = &state.trades[position];
            let account_size = state
                .accounts
                .iter()
                .find(|account| account.id == existing.account_id)
                .map(|account| account.size)
                .unwrap_or(Amount::ZERO);

            trade::resolve_profit(
                account_size,
                patch.risk.unwrap_or(existing.risk),
                patch.risk_reward.as_deref().unwrap_or(&existing.risk_reward),
                patch.result.unwrap_or(existing.result),
                existing.profit_basis,
                patch.manual_profit_loss,
            )
        } else {
            state.trades[position].profit
        };

        let trade = &mut state.trades[position];
        if let Some(pair) = patch.pair {
            trade.pair = pair;
        }
        if let Some(date) = patch.date {
            trade.date = date;
        }
        if let Some(direction) = patch.direction {
            trade.direction = direction;
        }
        if let Some(risk) = patch.risk {
            trade.risk = risk;
        }
        if let Some(risk_reward) = patch.risk_reward {
            trade.risk_reward = risk_reward;
        }
        if let Some(result) = patch.result {
            trade.result = result;
        }
        if let Some(profit_basis) = patch.profit_basis {
            trade.profit_basis = profit_basis;
        }
        if let Some(manual) = patch.manual_profit_loss {
            trade.manual_profit_loss = Some(manual);
        }
        if let Some(duration) = patch.duration {
            trade.duration = Some(duration);
        }
        if let Some(notes) = patch.notes {
            trade.notes = notes;
        }
        if let Some(screenshot) = patch.screenshot {
            trade.screenshot = Some(screenshot);
        }
        trade.profit = new_profit;
        trade.mark_synced();

        let updated = trade.clone();
        self.persist(&state);
        drop(state);

        self.push_remote(Collection::Trades, id, serde_json::to_value(&updated)?);
        Ok(updated)
    }

    /// Delete a trade; the local removal is authoritative regardless of the
    /// remote outcome
    pub async fn delete_trade(&self, id: Uuid) -> Result<()> {
        self.require_user("deleting a trade")?;

        let mut state = self.state.write().await;
        let before = state.trades.len();
        state.trades.retain(|trade| trade.id != id);
        if state.trades.len() == before {
            return Err(Error::TradeNotFound(id.to_string()));
        }
        self.persist(&state);
        drop(state);

        self.delete_remote(Collection::Trades, id);
        Ok(())
    }

    /// Remove an account and every trade referencing it
    pub async fn remove_account(&self, id: Uuid) -> Result<()> {
        self.require_user("removing an account")?;

        let mut state = self.state.write().await;
        if !state.accounts.iter().any(|account| account.id == id) {
            return Err(Error::AccountNotFound(id.to_string()));
        }

        info!("Removing account {} and its trades", id);
        state.accounts.retain(|account| account.id != id);
        state.trades.retain(|trade| trade.account_id != id);
        if state.selected_account_id == Some(id) {
            state.selected_account_id = state.accounts.first().map(|account| account.id);
        }
        self.persist(&state);
        drop(state);

        self.delete_remote(Collection::Accounts, id);
        self.purge_remote(Collection::Trades, "account_id", json!(id));
        Ok(())
    }

    /// Clear both collections and the selection, locally and remotely
    ///
    /// Individual per-document failures in the remote batch are logged and
    /// skipped; the local clear happens regardless.
    pub async fn reset_all_accounts(&self) -> Result<()> {
        let owner = self.require_user("resetting all accounts")?;

        info!("Resetting all accounts for {}", owner);
        {
            let mut state = self.state.write().await;
            state.accounts.clear();
            state.trades.clear();
            state.selected_account_id = None;
            self.persist(&state);
        }

        self.purge_remote(Collection::Trades, "owner_id", json!(owner));
        self.purge_remote(Collection::Accounts, "owner_id", json!(owner));
        Ok(())
    }

    /// Realize an account's current profit: add it to the withdrawn total,
    /// stamp the withdrawal date and wipe the account's trade history
    ///
    /// Returns zero and mutates nothing when the current profit is not
    /// positive.
    pub async fn withdraw_profit_and_reset(&self, account_id: Uuid) -> Result<Amount> {
        self.require_user("withdrawing profit")?;

        let mut state = self.state.write().await;
        let position = state
            .accounts
            .iter()
            .position(|account| account.id == account_id)
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;

        let mine = stats::trades_for(&state.trades, account_id);
        let profit = stats::account_stats(&state.accounts[position], &mine).total_profit;
        if profit <= Amount::ZERO {
            return Ok(Amount::ZERO);
        }

        info!("Withdrawing {} from account {}", profit, account_id);
        let account = &mut state.accounts[position];
        account.record_withdrawal(profit);
        let updated = account.clone();
        state.trades.retain(|trade| trade.account_id != account_id);
        self.persist(&state);
        drop(state);

        self.push_remote(Collection::Accounts, account_id, serde_json::to_value(&updated)?);
        self.purge_remote(Collection::Trades, "account_id", json!(account_id));
        Ok(profit)
    }

    /// Realize an account's current profit and remove the account entirely
    pub async fn withdraw_and_remove_account(&self, account_id: Uuid) -> Result<Amount> {
        self.require_user("withdrawing profit")?;

        let mut state = self.state.write().await;
        let account = state
            .accounts
            .iter()
            .find(|account| account.id == account_id)
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;

        let mine = stats::trades_for(&state.trades, account_id);
        let profit = stats::account_stats(account, &mine).total_profit;
        if profit <= Amount::ZERO {
            return Ok(Amount::ZERO);
        }

        info!("Withdrawing {} and removing account {}", profit, account_id);
        state.accounts.retain(|account| account.id != account_id);
        state.trades.retain(|trade| trade.account_id != account_id);
        if state.selected_account_id == Some(account_id) {
            state.selected_account_id = state.accounts.first().map(|account| account.id);
        }
        self.persist(&state);
        drop(state);

        self.delete_remote(Collection::Accounts, account_id);
        self.purge_remote(Collection::Trades, "account_id", json!(account_id));
        Ok(profit)
    }

    /// Zero the withdrawn total on every account, keeping accounts and
    /// trades otherwise intact
    pub async fn reset_total_withdrawn(&self) -> Result<()> {
        self.require_user("resetting withdrawn totals")?;

        let mut updates = Vec::new();
        {
            let mut state = self.state.write().await;
            for account in &mut state.accounts {
                account.reset_withdrawn();
                updates.push((account.id, serde_json::to_value(&*account)?));
            }
            self.persist(&state);
        }

        for (id, document) in updates {
            self.push_remote(Collection::Accounts, id, document);
        }
        Ok(())
    }

    /// Current account list
    pub async fn accounts(&self) -> Vec<Account> {
        self.state.read().await.accounts.clone()
    }

    /// Current trade list
    pub async fn trades(&self) -> Vec<Trade> {
        self.state.read().await.trades.clone()
    }

    /// Currently selected account, if any
    pub async fn selected_account_id(&self) -> Option<Uuid> {
        self.state.read().await.selected_account_id
    }

    /// Look up an account by id
    pub async fn account_by_id(&self, id: Uuid) -> Option<Account> {
        self.state
            .read()
            .await
            .accounts
            .iter()
            .find(|account| account.id == id)
            .cloned()
    }

    /// Look up a trade by id
    pub async fn trade_by_id(&self, id: Uuid) -> Option<Trade> {
        self.state
            .read()
            .await
            .trades
            .iter()
            .find(|trade| trade.id == id)
            .cloned()
    }

    /// An account's trades, most recent date first
    pub async fn trades_by_account(&self, account_id: Uuid) -> Vec<Trade> {
        let state = self.state.read().await;
        let mut mine = stats::trades_for(&state.trades, account_id);
        mine.sort_by(|a, b| b.date.cmp(&a.date));
        mine
    }

    /// Derived statistics for one account; defaults for an unknown id
    pub async fn account_stats(&self, account_id: Uuid) -> AccountStats {
        let state = self.state.read().await;
        match state.accounts.iter().find(|account| account.id == account_id) {
            Some(account) => stats::account_stats(account, &stats::trades_for(&state.trades, account_id)),
            None => AccountStats::default(),
        }
    }

    /// Number of accounts currently in profit
    pub async fn accounts_in_profit(&self) -> usize {
        let state = self.state.read().await;
        stats::accounts_in_profit(&state.accounts, &state.trades)
    }

    /// Number of accounts currently in loss
    pub async fn accounts_in_loss(&self) -> usize {
        let state = self.state.read().await;
        stats::accounts_in_loss(&state.accounts, &state.trades)
    }

    /// Sum of profit across profitable accounts
    pub async fn profit_from_profitable_accounts(&self) -> Amount {
        let state = self.state.read().await;
        stats::profit_from_profitable_accounts(&state.accounts, &state.trades)
    }

    /// Sum of loss across unprofitable accounts
    pub async fn loss_from_unprofitable_accounts(&self) -> Amount {
        let state = self.state.read().await;
        stats::loss_from_unprofitable_accounts(&state.accounts, &state.trades)
    }

    /// Accounts eligible for a withdrawal
    pub async fn withdrawable_accounts(&self) -> Vec<Account> {
        let state = self.state.read().await;
        stats::withdrawable_accounts(&state.accounts, &state.trades)
    }

    /// Sum of realized withdrawals across all accounts
    pub async fn total_withdrawn(&self) -> Amount {
        let state = self.state.read().await;
        stats::total_withdrawn(&state.accounts)
    }

    /// Per-instrument performance for one account's trades
    pub async fn pair_performance(&self, account_id: Uuid) -> Vec<PairPerformance> {
        let state = self.state.read().await;
        stats::pair_performance(&stats::trades_for(&state.trades, account_id))
    }

    /// Per-day performance for one account's trades
    pub async fn daily_performance(&self, account_id: Uuid) -> Vec<DailyPerformance> {
        let state = self.state.read().await;
        stats::daily_performance(&stats::trades_for(&state.trades, account_id))
    }

    /// Per-weekday performance for one account's trades
    pub async fn weekday_performance(&self, account_id: Uuid) -> Vec<WeekdayPerformance> {
        let state = self.state.read().await;
        stats::weekday_performance(&stats::trades_for(&state.trades, account_id))
    }

    /// Merge a remote snapshot into local state and persist the result
    pub(crate) async fn apply_snapshot(&self, collection: Collection, documents: Vec<Value>) {
        let mut state = self.state.write().await;
        match collection {
            Collection::Accounts => {
                let remote: Vec<Account> = decode_documents(documents);
                let merged = sync::merge_snapshots(&state.accounts, remote);
                state.accounts = merged;
            }
            Collection::Trades => {
                let remote: Vec<Trade> = decode_documents(documents);
                let merged = sync::merge_snapshots(&state.trades, remote);
                state.trades = merged;
            }
        }
        self.persist(&state);
    }

    /// Drop all local state on sign-out; remote documents are untouched
    pub(crate) async fn clear_local(&self) {
        let mut state = self.state.write().await;
        state.accounts.clear();
        state.trades.clear();
        state.selected_account_id = None;
        self.persist(&state);
        debug!("Cleared local ledger state");
    }

    pub(crate) fn abort_feeds(&self) {
        if let Ok(mut feeds) = self.feeds.lock() {
            for handle in feeds.drain(..) {
                handle.abort();
            }
        }
    }

    pub(crate) fn set_feeds(&self, handles: Vec<JoinHandle<()>>) {
        if let Ok(mut feeds) = self.feeds.lock() {
            for handle in feeds.drain(..) {
                handle.abort();
            }
            *feeds = handles;
        }
    }

    fn require_user(&self, action: &str) -> Result<Uuid> {
        self.auth
            .current_user()
            .ok_or_else(|| Error::Unauthenticated(format!("{} requires a signed-in user", action)))
    }

    fn persist(&self, state: &LedgerState) {
        if let Err(e) = cache::save_json(self.cache.as_ref(), ACCOUNTS_KEY, &state.accounts) {
            warn!("Failed to persist accounts cache: {}", e);
        }
        if let Err(e) = cache::save_json(self.cache.as_ref(), TRADES_KEY, &state.trades) {
            warn!("Failed to persist trades cache: {}", e);
        }
        if let Err(e) = cache::save_json(self.cache.as_ref(), SELECTED_KEY, &state.selected_account_id) {
            warn!("Failed to persist selection cache: {}", e);
        }
    }

    /// Fire-and-forget remote write; a failure flips `online` and stands
    fn push_remote(&self, collection: Collection, id: Uuid, document: Value) {
        let store = Arc::clone(&self.store);
        let online = Arc::clone(&self.online);
        let syncing = Arc::clone(&self.syncing);

        tokio::spawn(async move {
            syncing.store(true, Ordering::SeqCst);
            if let Err(e) = store.put(collection, id, document).await {
                warn!("Remote write failed for {} {}: {}", collection.as_str(), id, e);
                online.store(false, Ordering::SeqCst);
            }
            syncing.store(false, Ordering::SeqCst);
        });
    }

    /// Fire-and-forget remote delete
    fn delete_remote(&self, collection: Collection, id: Uuid) {
        let store = Arc::clone(&self.store);
        let online = Arc::clone(&self.online);
        let syncing = Arc::clone(&self.syncing);

        tokio::spawn(async move {
            syncing.store(true, Ordering::SeqCst);
            if let Err(e) = store.delete(collection, id).await {
                warn!("Remote delete failed for {} {}: {}", collection.as_str(), id, e);
                online.store(false, Ordering::SeqCst);
            }
            syncing.store(false, Ordering::SeqCst);
        });
    }

    /// Fire-and-forget batched remote delete of every document matching
    /// `field == value`; per-document failures are skipped
    fn purge_remote(&self, collection: Collection, field: &'static str, value: Value) {
        let store = Arc::clone(&self.store);
        let online = Arc::clone(&self.online);
        let syncing = Arc::clone(&self.syncing);

        tokio::spawn(async move {
            syncing.store(true, Ordering::SeqCst);
            match store.query(collection, field, value).await {
                Ok(documents) => {
                    for document in documents {
                        let id = match document
                            .get("id")
                            .and_then(|value| value.as_str())
                            .and_then(|raw| Uuid::parse_str(raw).ok())
                        {
                            Some(id) => id,
                            None => continue,
                        };

                        if let Err(e) = store.delete(collection, id).await {
                            warn!("Remote delete failed for {} {}: {}", collection.as_str(), id, e);
                            online.store(false, Ordering::SeqCst);
                        }
                    }
                }
                Err(e) => {
                    warn!("Remote purge query failed for {}: {}", collection.as_str(), e);
                    online.store(false, Ordering::SeqCst);
                }
            }
            syncing.store(false, Ordering::SeqCst);
        });
    }
}

impl Drop for LedgerService {
    fn drop(&mut self) {
        self.abort_feeds();
        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(handle) = watcher.take() {
                handle.abort();
            }
        }
    }
}

fn decode_documents<T: DeserializeOwned>(documents: Vec<Value>) -> Vec<T> {
    documents
        .into_iter()
        .filter_map(|document| match serde_json::from_value(document) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed remote document: {}", e);
                None
            }
        })
        .collect()
}
