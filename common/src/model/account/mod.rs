//! Account models and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Amount;

/// Journal account model
///
/// `size` is the starting balance and never changes after creation; the
/// current balance is always derived from the trades recorded against the
/// account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Starting balance, fixed at creation
    pub size: Amount,
    /// Currency code (informational only)
    pub currency: String,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
    /// Cumulative amount realized through profit withdrawals
    #[serde(default)]
    pub total_withdrawn: Amount,
    /// Timestamp of the most recent withdrawal; profit from trades that
    /// predate it is suppressed in derived statistics
    #[serde(default)]
    pub last_withdrawal_date: Option<DateTime<Utc>>,
    /// Owner of the account; required for any remote persistence
    #[serde(default)]
    pub owner_id: Option<Uuid>,
    /// Last successful write observed for this record, merge tie-breaking only
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new account owned by `owner_id`
    pub fn new(name: impl Into<String>, size: Amount, currency: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            size,
            currency: currency.into(),
            created_at: Utc::now(),
            total_withdrawn: Amount::ZERO,
            last_withdrawal_date: None,
            owner_id: Some(owner_id),
            last_synced_at: Some(Utc::now()),
        }
    }

    /// Realize `amount` of profit out of the account
    pub fn record_withdrawal(&mut self, amount: Amount) {
        self.total_withdrawn += amount;
        self.last_withdrawal_date = Some(Utc::now());
        self.mark_synced();
    }

    /// Zero the cumulative withdrawn amount
    pub fn reset_withdrawn(&mut self) {
        self.total_withdrawn = Amount::ZERO;
        self.mark_synced();
    }

    /// Advance the sync timestamp to now
    pub fn mark_synced(&mut self) {
        self.last_synced_at = Some(Utc::now());
    }
}
