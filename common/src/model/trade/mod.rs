//! Trade models and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{dec, Amount, Percent};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

/// Outcome of a closed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeResult {
    Win,
    Loss,
    Breakeven,
}

/// Which profit formula applies to a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfitBasis {
    /// Profit derived from risk, risk:reward ratio and result
    Calculated,
    /// Signed amount supplied directly by the caller
    Manual,
}

/// Journal trade model
///
/// `profit` is a cached derived value: it is resolved from the other fields
/// at creation/update time and stored, not re-derived on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade ID
    pub id: Uuid,
    /// Account this trade belongs to
    pub account_id: Uuid,
    /// Instrument label (e.g. "EUR/USD")
    pub pair: String,
    /// Trade date, used for display ordering and withdrawal suppression
    pub date: DateTime<Utc>,
    /// Buy or sell
    pub direction: Direction,
    /// Percentage of account size at risk
    pub risk: Percent,
    /// Ratio string of the form "<risk>:<reward>" (e.g. "1:2")
    pub risk_reward: String,
    /// Win, loss or breakeven
    pub result: TradeResult,
    /// Selects which profit formula applies
    pub profit_basis: ProfitBasis,
    /// Caller-supplied signed amount, used only with the manual basis
    #[serde(default)]
    pub manual_profit_loss: Option<Amount>,
    /// Resolved signed profit/loss amount
    pub profit: Amount,
    /// Display label for how long the trade was held (e.g. "1-4 hours")
    #[serde(default)]
    pub duration: Option<String>,
    /// Free-form notes
    #[serde(default)]
    pub notes: String,
    /// Opaque attachment reference
    #[serde(default)]
    pub screenshot: Option<String>,
    /// Owner of the trade; required for any remote persistence
    #[serde(default)]
    pub owner_id: Option<Uuid>,
    /// Last successful write observed for this record, merge tie-breaking only
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Trade {
    /// Advance the sync timestamp to now
    pub fn mark_synced(&mut self) {
        self.last_synced_at = Some(Utc::now());
    }
}

/// Input shape for creating a trade
///
/// The store resolves `profit`, stamps ownership and assigns an id when the
/// draft carries none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDraft {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub account_id: Uuid,
    pub pair: String,
    pub date: DateTime<Utc>,
    pub direction: Direction,
    pub risk: Percent,
    pub risk_reward: String,
    pub result: TradeResult,
    pub profit_basis: ProfitBasis,
    #[serde(default)]
    pub manual_profit_loss: Option<Amount>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub screenshot: Option<String>,
}

/// Partial update for an existing trade; `id` and `account_id` are not
/// patchable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradePatch {
    #[serde(default)]
    pub pair: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub risk: Option<Percent>,
    #[serde(default)]
    pub risk_reward: Option<String>,
    #[serde(default)]
    pub result: Option<TradeResult>,
    #[serde(default)]
    pub profit_basis: Option<ProfitBasis>,
    #[serde(default)]
    pub manual_profit_loss: Option<Amount>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub screenshot: Option<String>,
}

impl TradePatch {
    /// Whether the patch touches any input of the profit formula
    pub fn affects_profit(&self) -> bool {
        self.risk.is_some() || self.risk_reward.is_some() || self.result.is_some()
    }
}

/// Parse the reward component of a "<risk>:<reward>" ratio string
///
/// Defaults to 1 when the string is unparseable.
pub fn reward_units(risk_reward: &str) -> Decimal {
    risk_reward
        .split(':')
        .nth(1)
        .and_then(|part| part.trim().parse::<Decimal>().ok())
        .unwrap_or(Decimal::ONE)
}

/// Resolve the signed profit/loss amount for a trade
///
/// A manual basis with a supplied amount bypasses the formula entirely.
pub fn resolve_profit(
    account_size: Amount,
    risk: Percent,
    risk_reward: &str,
    result: TradeResult,
    basis: ProfitBasis,
    manual_profit_loss: Option<Amount>,
) -> Amount {
    if basis == ProfitBasis::Manual {
        if let Some(amount) = manual_profit_loss {
            return amount;
        }
    }

    match result {
        TradeResult::Breakeven => Amount::ZERO,
        TradeResult::Win => risk / dec!(100) * account_size * reward_units(risk_reward),
        TradeResult::Loss => -(risk / dec!(100) * account_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_units_parses_second_component() {
        assert_eq!(reward_units("1:2"), dec!(2));
        assert_eq!(reward_units("1:2.5"), dec!(2.5));
        assert_eq!(reward_units("2:3"), dec!(3));
    }

    #[test]
    fn reward_units_defaults_to_one() {
        assert_eq!(reward_units("garbage"), Decimal::ONE);
        assert_eq!(reward_units(""), Decimal::ONE);
        assert_eq!(reward_units("1:"), Decimal::ONE);
    }
}
