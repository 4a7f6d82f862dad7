//! Derived statistics over the ledger collections
//!
//! Pure functions; the service passes in read-only views of its state.
//! Aggregate queries each re-derive per-account stats independently rather
//! than sharing intermediate results.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use common::decimal::{dec, Amount, Percent};
use common::model::account::Account;
use common::model::trade::{Trade, TradeResult};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Derived per-account statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountStats {
    pub total_profit: Amount,
    pub win_rate: Percent,
    pub total_trades: usize,
    pub balance: Amount,
    pub total_withdrawn: Amount,
}

/// Trades belonging to one account
pub fn trades_for(trades: &[Trade], account_id: Uuid) -> Vec<Trade> {
    trades
        .iter()
        .filter(|trade| trade.account_id == account_id)
        .cloned()
        .collect()
}

/// Derived statistics for one account
///
/// `account_trades` must contain only this account's trades. When the
/// account has a withdrawal date and no trade is strictly newer than it,
/// profit is forced to zero so already-withdrawn profit is not shown
/// again. A trade back-dated before the withdrawal date is suppressed by
/// the same comparison.
pub fn account_stats(account: &Account, account_trades: &[Trade]) -> AccountStats {
    let total_profit: Amount = account_trades.iter().map(|trade| trade.profit).sum();

    let wins = account_trades
        .iter()
        .filter(|trade| trade.result == TradeResult::Win)
        .count();
    let win_rate = win_rate_percent(wins, account_trades.len());

    let has_new_trades = match account.last_withdrawal_date {
        Some(cutoff) => account_trades.iter().any(|trade| trade.date > cutoff),
        None => true,
    };
    let shown_profit = if has_new_trades { total_profit } else { Amount::ZERO };

    AccountStats {
        total_profit: shown_profit,
        win_rate,
        total_trades: account_trades.len(),
        balance: account.size + shown_profit,
        total_withdrawn: account.total_withdrawn,
    }
}

fn win_rate_percent(wins: usize, total: usize) -> Percent {
    if total == 0 {
        return Percent::ZERO;
    }
    Decimal::from(wins as u64) / Decimal::from(total as u64) * dec!(100)
}

/// Number of accounts whose current profit is positive
pub fn accounts_in_profit(accounts: &[Account], trades: &[Trade]) -> usize {
    accounts
        .iter()
        .filter(|account| account_stats(account, &trades_for(trades, account.id)).total_profit > Amount::ZERO)
        .count()
}

/// Number of accounts whose current profit is negative
pub fn accounts_in_loss(accounts: &[Account], trades: &[Trade]) -> usize {
    accounts
        .iter()
        .filter(|account| account_stats(account, &trades_for(trades, account.id)).total_profit < Amount::ZERO)
        .count()
}

/// Sum of profit across currently profitable accounts
pub fn profit_from_profitable_accounts(accounts: &[Account], trades: &[Trade]) -> Amount {
    accounts
        .iter()
        .map(|account| account_stats(account, &trades_for(trades, account.id)).total_profit)
        .filter(|profit| *profit > Amount::ZERO)
        .sum()
}

/// Sum of loss across currently unprofitable accounts (a negative amount)
pub fn loss_from_unprofitable_accounts(accounts: &[Account], trades: &[Trade]) -> Amount {
    accounts
        .iter()
        .map(|account| account_stats(account, &trades_for(trades, account.id)).total_profit)
        .filter(|profit| *profit < Amount::ZERO)
        .sum()
}

/// Accounts eligible for withdrawal: positive profit and at least one trade
pub fn withdrawable_accounts(accounts: &[Account], trades: &[Trade]) -> Vec<Account> {
    accounts
        .iter()
        .filter(|account| {
            let mine = trades_for(trades, account.id);
            !mine.is_empty() && account_stats(account, &mine).total_profit > Amount::ZERO
        })
        .cloned()
        .collect()
}

/// Sum of realized withdrawals across all accounts
pub fn total_withdrawn(accounts: &[Account]) -> Amount {
    accounts.iter().map(|account| account.total_withdrawn).sum()
}

/// Per-instrument performance breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct PairPerformance {
    pub pair: String,
    pub profit: Amount,
    pub trades: usize,
    pub wins: usize,
    /// Rounded to a whole percent
    pub win_rate: Percent,
}

/// Profit, trade count and win rate per instrument, sorted by profit
/// descending
pub fn pair_performance(trades: &[Trade]) -> Vec<PairPerformance> {
    let mut by_pair: BTreeMap<String, (Amount, usize, usize)> = BTreeMap::new();
    for trade in trades {
        let entry = by_pair.entry(trade.pair.clone()).or_default();
        entry.0 += trade.profit;
        entry.1 += 1;
        if trade.result == TradeResult::Win {
            entry.2 += 1;
        }
    }

    let mut rows: Vec<PairPerformance> = by_pair
        .into_iter()
        .map(|(pair, (profit, trades, wins))| PairPerformance {
            pair,
            profit,
            trades,
            wins,
            win_rate: win_rate_percent(wins, trades).round_dp(0),
        })
        .collect();
    rows.sort_by(|a, b| b.profit.cmp(&a.profit));
    rows
}

/// Per-day performance row with a running cumulative profit
#[derive(Debug, Clone, PartialEq)]
pub struct DailyPerformance {
    pub date: NaiveDate,
    pub profit: Amount,
    pub trades: usize,
    pub cumulative_profit: Amount,
}

/// Daily profit in ascending date order
pub fn daily_performance(trades: &[Trade]) -> Vec<DailyPerformance> {
    let mut by_day: BTreeMap<NaiveDate, (Amount, usize)> = BTreeMap::new();
    for trade in trades {
        let entry = by_day.entry(trade.date.date_naive()).or_default();
        entry.0 += trade.profit;
        entry.1 += 1;
    }

    let mut cumulative = Amount::ZERO;
    by_day
        .into_iter()
        .map(|(date, (profit, trades))| {
            cumulative += profit;
            DailyPerformance {
                date,
                profit,
                trades,
                cumulative_profit: cumulative,
            }
        })
        .collect()
}

/// Per-weekday performance breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct WeekdayPerformance {
    pub weekday: Weekday,
    pub profit: Amount,
    pub trades: usize,
    pub wins: usize,
    /// Rounded to a whole percent
    pub win_rate: Percent,
}

/// Profit per weekday in Monday..Sunday order, only for weekdays that have
/// trades
pub fn weekday_performance(trades: &[Trade]) -> Vec<WeekdayPerformance> {
    const DAYS: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    DAYS.iter()
        .filter_map(|&weekday| {
            let mine: Vec<&Trade> = trades
                .iter()
                .filter(|trade| trade.date.weekday() == weekday)
                .collect();
            if mine.is_empty() {
                return None;
            }

            let profit = mine.iter().map(|trade| trade.profit).sum();
            let wins = mine
                .iter()
                .filter(|trade| trade.result == TradeResult::Win)
                .count();
            Some(WeekdayPerformance {
                weekday,
                profit,
                trades: mine.len(),
                wins,
                win_rate: win_rate_percent(wins, mine.len()).round_dp(0),
            })
        })
        .collect()
}
