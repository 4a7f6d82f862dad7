//! Demo journal session wiring the full ledger engine together

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::model::trade::{Direction, ProfitBasis, TradeDraft, TradeResult};
use ledger_store::{InMemoryDocumentStore, LedgerService, MemoryCache, SessionAuth};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

fn draft(
    account_id: Uuid,
    pair: &str,
    days_ago: i64,
    direction: Direction,
    risk: Decimal,
    risk_reward: &str,
    result: TradeResult,
    duration: &str,
    notes: &str,
) -> TradeDraft {
    TradeDraft {
        id: None,
        account_id,
        pair: pair.to_string(),
        date: Utc::now() - Duration::days(days_ago),
        direction,
        risk,
        risk_reward: risk_reward.to_string(),
        result,
        profit_basis: ProfitBasis::Calculated,
        manual_profit_loss: None,
        duration: Some(duration.to_string()),
        notes: notes.to_string(),
        screenshot: None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new("tradelog=info,ledger_store=info"))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let auth = Arc::new(SessionAuth::new());
    let store = Arc::new(InMemoryDocumentStore::new());
    let service = LedgerService::new(store, Arc::new(MemoryCache::new()), auth.clone());
    LedgerService::start(&service);
    auth.sign_in(Uuid::new_v4());

    let main_account = service.add_account("Main Trading Account", dec!(10000), "USD").await?;
    let demo_account = service.add_account("Demo Account", dec!(5000), "USD").await?;

    service
        .add_trade(draft(
            main_account.id, "XAU/USD (Gold)", 1, Direction::Buy, dec!(1.5), "1:2",
            TradeResult::Win, "1-4 hours", "Strong breakout above resistance",
        ))
        .await?;
    service
        .add_trade(draft(
            main_account.id, "BTC/USD (Bitcoin)", 2, Direction::Sell, dec!(2), "1:1.5",
            TradeResult::Loss, "4-12 hours", "Failed support level",
        ))
        .await?;
    service
        .add_trade(draft(
            main_account.id, "NAS100 (Nasdaq)", 3, Direction::Buy, dec!(1), "1:3",
            TradeResult::Win, "12-24 hours", "Bullish engulfing pattern",
        ))
        .await?;
    service
        .add_trade(draft(
            main_account.id, "EUR/USD", 4, Direction::Sell, dec!(1.5), "1:2",
            TradeResult::Win, "1-3 days", "Bearish trend continuation",
        ))
        .await?;
    service
        .add_trade(draft(
            main_account.id, "US30 (Dow Jones)", 5, Direction::Buy, dec!(2), "1:1",
            TradeResult::Loss, "< 1 hour", "False breakout",
        ))
        .await?;
    service
        .add_trade(draft(
            demo_account.id, "GBP/USD", 6, Direction::Buy, dec!(1), "1:2",
            TradeResult::Win, "3-7 days", "Demo account test trade",
        ))
        .await?;

    let stats = service.account_stats(main_account.id).await;
    info!(
        "{}: balance {} {} over {} trades, win rate {}%",
        main_account.name,
        stats.balance,
        main_account.currency,
        stats.total_trades,
        stats.win_rate.round_dp(2)
    );

    for row in service.pair_performance(main_account.id).await {
        info!("  {}: {} across {} trades ({}% wins)", row.pair, row.profit, row.trades, row.win_rate);
    }

    info!("Accounts in profit: {}", service.accounts_in_profit().await);
    info!("Eligible for withdrawal: {}", service.withdrawable_accounts().await.len());

    let withdrawn = service.withdraw_profit_and_reset(main_account.id).await?;
    info!("Withdrew {} from {}", withdrawn, main_account.name);

    let after = service.account_stats(main_account.id).await;
    info!(
        "Post-withdrawal balance {} (total withdrawn {})",
        after.balance, after.total_withdrawn
    );

    auth.sign_out();
    Ok(())
}
