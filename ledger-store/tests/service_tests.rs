use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::decimal::{dec, Amount};
use common::error::Error;
use common::model::trade::{Direction, ProfitBasis, TradeDraft, TradePatch, TradeResult};
use ledger_store::{Collection, InMemoryDocumentStore, LedgerService, MemoryCache, SessionAuth};
use uuid::Uuid;

fn new_service() -> (Arc<LedgerService>, Arc<InMemoryDocumentStore>, Arc<SessionAuth>) {
    let auth = Arc::new(SessionAuth::new());
    let store = Arc::new(InMemoryDocumentStore::new());
    let cache = Arc::new(MemoryCache::new());
    let service = LedgerService::new(store.clone(), cache, auth.clone());
    (service, store, auth)
}

fn signed_in_service() -> (Arc<LedgerService>, Arc<InMemoryDocumentStore>, Arc<SessionAuth>) {
    let (service, store, auth) = new_service();
    auth.sign_in(Uuid::new_v4());
    (service, store, auth)
}

fn draft(account_id: Uuid, risk: Amount, risk_reward: &str, result: TradeResult) -> TradeDraft {
    TradeDraft {
        id: None,
        account_id,
        pair: "EUR/USD".to_string(),
        date: Utc::now(),
        direction: Direction::Buy,
        risk,
        risk_reward: risk_reward.to_string(),
        result,
        profit_basis: ProfitBasis::Calculated,
        manual_profit_loss: None,
        duration: None,
        notes: String::new(),
        screenshot: None,
    }
}

async fn settle() {
    // Give fire-and-forget remote tasks a chance to run
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test]
async fn test_add_account_starts_flat() {
    let (service, _store, _auth) = signed_in_service();

    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();

    let stats = service.account_stats(account.id).await;
    assert_eq!(stats.total_profit, Amount::ZERO);
    assert_eq!(stats.win_rate, Amount::ZERO);
    assert_eq!(stats.total_trades, 0);
    assert_eq!(stats.balance, dec!(10000));
    assert_eq!(stats.total_withdrawn, Amount::ZERO);
}

#[tokio::test]
async fn test_add_account_requires_sign_in() {
    let (service, _store, _auth) = new_service();

    let result = service.add_account("Main", dec!(10000), "USD").await;
    assert!(matches!(result, Err(Error::Unauthenticated(_))));
    assert!(service.accounts().await.is_empty());
}

#[tokio::test]
async fn test_add_account_validates_input() {
    let (service, _store, _auth) = signed_in_service();

    let result = service.add_account("  ", dec!(10000), "USD").await;
    assert!(matches!(result, Err(Error::ValidationError(_))));

    let result = service.add_account("Main", Amount::ZERO, "USD").await;
    assert!(matches!(result, Err(Error::ValidationError(_))));

    let result = service.add_account("Main", dec!(-500), "USD").await;
    assert!(matches!(result, Err(Error::ValidationError(_))));
}

#[tokio::test]
async fn test_first_account_gets_selected() {
    let (service, _store, _auth) = signed_in_service();

    let first = service.add_account("First", dec!(1000), "USD").await.unwrap();
    let second = service.add_account("Second", dec!(2000), "USD").await.unwrap();

    assert_eq!(service.selected_account_id().await, Some(first.id));

    service.select_account(second.id).await;
    assert_eq!(service.selected_account_id().await, Some(second.id));
}

#[tokio::test]
async fn test_breakeven_profit_is_zero() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();

    let trade = service
        .add_trade(draft(account.id, dec!(5), "1:10", TradeResult::Breakeven))
        .await
        .unwrap();

    assert_eq!(trade.profit, Amount::ZERO);
}

#[tokio::test]
async fn test_win_profit_uses_reward_units() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();

    let trade = service
        .add_trade(draft(account.id, dec!(1.5), "1:2", TradeResult::Win))
        .await
        .unwrap();

    // 1.5% of 10000, doubled by the reward ratio
    assert_eq!(trade.profit, dec!(300));
}

#[tokio::test]
async fn test_loss_profit_ignores_reward_units() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();

    let trade = service
        .add_trade(draft(account.id, dec!(2), "1:3", TradeResult::Loss))
        .await
        .unwrap();

    assert_eq!(trade.profit, dec!(-200));
}

#[tokio::test]
async fn test_manual_profit_overrides_formula() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();

    let mut manual = draft(account.id, dec!(2), "1:3", TradeResult::Loss);
    manual.profit_basis = ProfitBasis::Manual;
    manual.manual_profit_loss = Some(dec!(-75.50));

    let trade = service.add_trade(manual).await.unwrap();
    assert_eq!(trade.profit, dec!(-75.50));

    // A manual basis without an amount falls back to the formula
    let mut unfilled = draft(account.id, dec!(2), "1:3", TradeResult::Loss);
    unfilled.profit_basis = ProfitBasis::Manual;

    let trade = service.add_trade(unfilled).await.unwrap();
    assert_eq!(trade.profit, dec!(-200));
}

#[tokio::test]
async fn test_unparseable_reward_defaults_to_one() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();

    let trade = service
        .add_trade(draft(account.id, dec!(1), "whatever", TradeResult::Win))
        .await
        .unwrap();

    assert_eq!(trade.profit, dec!(100));
}

#[tokio::test]
async fn test_orphan_trade_resolves_zero_profit() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();

    let orphan = service
        .add_trade(draft(Uuid::new_v4(), dec!(1), "1:2", TradeResult::Win))
        .await
        .unwrap();
    assert_eq!(orphan.profit, Amount::ZERO);

    // The orphan is invisible to the real account's stats
    let stats = service.account_stats(account.id).await;
    assert_eq!(stats.total_trades, 0);
    assert_eq!(stats.balance, dec!(10000));
}

#[tokio::test]
async fn test_sample_portfolio_stats() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();

    service.add_trade(draft(account.id, dec!(1.5), "1:2", TradeResult::Win)).await.unwrap();
    service.add_trade(draft(account.id, dec!(2), "1:1.5", TradeResult::Loss)).await.unwrap();
    service.add_trade(draft(account.id, dec!(1), "1:2", TradeResult::Breakeven)).await.unwrap();

    let stats = service.account_stats(account.id).await;
    assert_eq!(stats.total_profit, dec!(100));
    assert_eq!(stats.win_rate.round_dp(2), dec!(33.33));
    assert_eq!(stats.total_trades, 3);
    assert_eq!(stats.balance, dec!(10100));
}

#[tokio::test]
async fn test_update_trade_recomputes_profit() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();
    let trade = service
        .add_trade(draft(account.id, dec!(1.5), "1:2", TradeResult::Win))
        .await
        .unwrap();
    assert_eq!(trade.profit, dec!(300));

    let updated = service
        .update_trade(
            trade.id,
            TradePatch {
                result: Some(TradeResult::Loss),
                ..TradePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.profit, dec!(-150));

    // A patch that does not touch the formula inputs keeps the profit
    let updated = service
        .update_trade(
            trade.id,
            TradePatch {
                notes: Some("late entry".to_string()),
                ..TradePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.profit, dec!(-150));
    assert_eq!(updated.notes, "late entry");
}

#[tokio::test]
async fn test_update_unknown_trade_errors() {
    let (service, _store, _auth) = signed_in_service();

    let result = service.update_trade(Uuid::new_v4(), TradePatch::default()).await;
    assert!(matches!(result, Err(Error::TradeNotFound(_))));
}

#[tokio::test]
async fn test_delete_trade_removes_locally_and_remotely() {
    let (service, store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();
    let trade = service
        .add_trade(draft(account.id, dec!(1), "1:2", TradeResult::Win))
        .await
        .unwrap();
    settle().await;
    assert_eq!(store.len(Collection::Trades), 1);

    service.delete_trade(trade.id).await.unwrap();
    assert!(service.trade_by_id(trade.id).await.is_none());

    settle().await;
    assert!(store.is_empty(Collection::Trades));
}

#[tokio::test]
async fn test_delete_trade_is_authoritative_when_remote_down() {
    let (service, store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();
    let trade = service
        .add_trade(draft(account.id, dec!(1), "1:2", TradeResult::Win))
        .await
        .unwrap();
    settle().await;

    store.set_available(false);
    service.delete_trade(trade.id).await.unwrap();

    // The local deletion stands; the failed remote call only flips the flag
    assert!(service.trade_by_id(trade.id).await.is_none());
    settle().await;
    assert!(!service.is_online());
    assert_eq!(store.len(Collection::Trades), 1);
}

#[tokio::test]
async fn test_remove_account_cascades_to_trades() {
    let (service, store, _auth) = signed_in_service();
    let first = service.add_account("First", dec!(10000), "USD").await.unwrap();
    let second = service.add_account("Second", dec!(5000), "USD").await.unwrap();

    service.add_trade(draft(first.id, dec!(1), "1:2", TradeResult::Win)).await.unwrap();
    service.add_trade(draft(first.id, dec!(2), "1:1", TradeResult::Loss)).await.unwrap();
    service.add_trade(draft(second.id, dec!(1), "1:2", TradeResult::Win)).await.unwrap();
    settle().await;

    service.remove_account(first.id).await.unwrap();

    assert!(service.account_by_id(first.id).await.is_none());
    assert!(service.trades_by_account(first.id).await.is_empty());
    assert_eq!(service.trades_by_account(second.id).await.len(), 1);

    // The selection moves to a remaining account
    assert_eq!(service.selected_account_id().await, Some(second.id));

    settle().await;
    assert_eq!(store.len(Collection::Accounts), 1);
    assert_eq!(store.len(Collection::Trades), 1);
}

#[tokio::test]
async fn test_remove_unknown_account_errors() {
    let (service, _store, _auth) = signed_in_service();

    let result = service.remove_account(Uuid::new_v4()).await;
    assert!(matches!(result, Err(Error::AccountNotFound(_))));
}

#[tokio::test]
async fn test_withdraw_profit_and_reset() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();
    service.add_trade(draft(account.id, dec!(1.5), "1:2", TradeResult::Win)).await.unwrap();
    service.add_trade(draft(account.id, dec!(2), "1:1.5", TradeResult::Loss)).await.unwrap();

    let withdrawn = service.withdraw_profit_and_reset(account.id).await.unwrap();
    assert_eq!(withdrawn, dec!(100));

    let updated = service.account_by_id(account.id).await.unwrap();
    assert_eq!(updated.total_withdrawn, dec!(100));
    assert!(updated.last_withdrawal_date.is_some());
    assert_eq!(updated.size, dec!(10000));

    assert!(service.trades_by_account(account.id).await.is_empty());
    let stats = service.account_stats(account.id).await;
    assert_eq!(stats.total_profit, Amount::ZERO);
    assert_eq!(stats.balance, dec!(10000));
    assert_eq!(stats.total_withdrawn, dec!(100));
}

#[tokio::test]
async fn test_withdraw_refused_when_not_profitable() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();
    service.add_trade(draft(account.id, dec!(2), "1:1", TradeResult::Loss)).await.unwrap();

    let withdrawn = service.withdraw_profit_and_reset(account.id).await.unwrap();
    assert_eq!(withdrawn, Amount::ZERO);

    // Nothing changed
    let account = service.account_by_id(account.id).await.unwrap();
    assert_eq!(account.total_withdrawn, Amount::ZERO);
    assert!(account.last_withdrawal_date.is_none());
    assert_eq!(service.trades_by_account(account.id).await.len(), 1);
}

#[tokio::test]
async fn test_withdrawal_suppresses_backdated_profit() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();
    service.add_trade(draft(account.id, dec!(1), "1:2", TradeResult::Win)).await.unwrap();

    let withdrawn = service.withdraw_profit_and_reset(account.id).await.unwrap();
    assert_eq!(withdrawn, dec!(200));

    // A trade back-dated before the withdrawal date stays suppressed
    let mut backdated = draft(account.id, dec!(1), "1:2", TradeResult::Win);
    backdated.date = Utc::now() - chrono::Duration::days(10);
    service.add_trade(backdated).await.unwrap();

    let stats = service.account_stats(account.id).await;
    assert_eq!(stats.total_profit, Amount::ZERO);
    assert_eq!(stats.balance, dec!(10000));

    // One trade newer than the withdrawal lifts the suppression for all
    let mut fresh = draft(account.id, dec!(1), "1:2", TradeResult::Win);
    fresh.date = Utc::now() + chrono::Duration::minutes(1);
    service.add_trade(fresh).await.unwrap();

    let stats = service.account_stats(account.id).await;
    assert_eq!(stats.total_profit, dec!(400));
    assert_eq!(stats.balance, dec!(10400));
}

#[tokio::test]
async fn test_withdraw_and_remove_account() {
    let (service, store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();
    let keeper = service.add_account("Keeper", dec!(5000), "USD").await.unwrap();
    service.add_trade(draft(account.id, dec!(1.5), "1:2", TradeResult::Win)).await.unwrap();
    settle().await;

    let withdrawn = service.withdraw_and_remove_account(account.id).await.unwrap();
    assert_eq!(withdrawn, dec!(300));

    assert!(service.account_by_id(account.id).await.is_none());
    assert!(service.trades_by_account(account.id).await.is_empty());
    assert_eq!(service.selected_account_id().await, Some(keeper.id));

    settle().await;
    assert_eq!(store.len(Collection::Accounts), 1);
    assert!(store.is_empty(Collection::Trades));
}

#[tokio::test]
async fn test_withdraw_and_remove_refused_when_not_profitable() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();
    service.add_trade(draft(account.id, dec!(2), "1:1", TradeResult::Loss)).await.unwrap();

    let withdrawn = service.withdraw_and_remove_account(account.id).await.unwrap();
    assert_eq!(withdrawn, Amount::ZERO);
    assert!(service.account_by_id(account.id).await.is_some());
}

#[tokio::test]
async fn test_reset_total_withdrawn() {
    let (service, _store, _auth) = signed_in_service();
    let first = service.add_account("First", dec!(10000), "USD").await.unwrap();
    let second = service.add_account("Second", dec!(5000), "USD").await.unwrap();
    service.add_trade(draft(first.id, dec!(1), "1:2", TradeResult::Win)).await.unwrap();
    service.add_trade(draft(second.id, dec!(1), "1:2", TradeResult::Win)).await.unwrap();

    service.withdraw_profit_and_reset(first.id).await.unwrap();
    service.withdraw_profit_and_reset(second.id).await.unwrap();
    assert!(service.total_withdrawn().await > Amount::ZERO);

    service.reset_total_withdrawn().await.unwrap();

    assert_eq!(service.total_withdrawn().await, Amount::ZERO);
    assert_eq!(service.accounts().await.len(), 2);
}

#[tokio::test]
async fn test_reset_all_accounts() {
    let (service, store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();
    service.add_trade(draft(account.id, dec!(1), "1:2", TradeResult::Win)).await.unwrap();
    settle().await;
    assert_eq!(store.len(Collection::Accounts), 1);
    assert_eq!(store.len(Collection::Trades), 1);

    service.reset_all_accounts().await.unwrap();

    assert!(service.accounts().await.is_empty());
    assert!(service.trades().await.is_empty());
    assert_eq!(service.selected_account_id().await, None);

    settle().await;
    assert!(store.is_empty(Collection::Accounts));
    assert!(store.is_empty(Collection::Trades));
}

#[tokio::test]
async fn test_trades_by_account_sorted_newest_first() {
    let (service, _store, _auth) = signed_in_service();
    let account = service.add_account("Main", dec!(10000), "USD").await.unwrap();

    let mut oldest = draft(account.id, dec!(1), "1:2", TradeResult::Win);
    oldest.date = Utc::now() - chrono::Duration::days(3);
    oldest.pair = "oldest".to_string();
    let mut middle = draft(account.id, dec!(1), "1:2", TradeResult::Loss);
    middle.date = Utc::now() - chrono::Duration::days(2);
    middle.pair = "middle".to_string();
    let mut newest = draft(account.id, dec!(1), "1:2", TradeResult::Win);
    newest.date = Utc::now() - chrono::Duration::days(1);
    newest.pair = "newest".to_string();

    // Insertion order deliberately scrambled
    service.add_trade(middle).await.unwrap();
    service.add_trade(newest).await.unwrap();
    service.add_trade(oldest).await.unwrap();

    let trades = service.trades_by_account(account.id).await;
    let pairs: Vec<&str> = trades.iter().map(|t| t.pair.as_str()).collect();
    assert_eq!(pairs, vec!["newest", "middle", "oldest"]);
}

#[tokio::test]
async fn test_aggregate_queries() {
    let (service, _store, _auth) = signed_in_service();
    let winner = service.add_account("Winner", dec!(10000), "USD").await.unwrap();
    let loser = service.add_account("Loser", dec!(10000), "USD").await.unwrap();
    let idle = service.add_account("Idle", dec!(10000), "USD").await.unwrap();

    service.add_trade(draft(winner.id, dec!(1.5), "1:2", TradeResult::Win)).await.unwrap();
    service.add_trade(draft(loser.id, dec!(2), "1:1", TradeResult::Loss)).await.unwrap();

    assert_eq!(service.accounts_in_profit().await, 1);
    assert_eq!(service.accounts_in_loss().await, 1);
    assert_eq!(service.profit_from_profitable_accounts().await, dec!(300));
    assert_eq!(service.loss_from_unprofitable_accounts().await, dec!(-200));

    let withdrawable = service.withdrawable_accounts().await;
    assert_eq!(withdrawable.len(), 1);
    assert_eq!(withdrawable[0].id, winner.id);

    // An idle account is neither profitable nor withdrawable
    assert!(service.account_stats(idle.id).await.total_profit == Amount::ZERO);
    assert_eq!(service.total_withdrawn().await, Amount::ZERO);
}

#[tokio::test]
async fn test_stats_for_unknown_account_are_default() {
    let (service, _store, _auth) = signed_in_service();

    let stats = service.account_stats(Uuid::new_v4()).await;
    assert_eq!(stats.total_profit, Amount::ZERO);
    assert_eq!(stats.balance, Amount::ZERO);
    assert_eq!(stats.total_trades, 0);
}

#[tokio::test]
async fn test_mutations_require_sign_in() {
    let (service, _store, _auth) = new_service();
    let id = Uuid::new_v4();

    assert!(matches!(
        service.add_trade(draft(id, dec!(1), "1:2", TradeResult::Win)).await,
        Err(Error::Unauthenticated(_))
    ));
    assert!(matches!(service.delete_trade(id).await, Err(Error::Unauthenticated(_))));
    assert!(matches!(service.remove_account(id).await, Err(Error::Unauthenticated(_))));
    assert!(matches!(service.reset_all_accounts().await, Err(Error::Unauthenticated(_))));
    assert!(matches!(
        service.withdraw_profit_and_reset(id).await,
        Err(Error::Unauthenticated(_))
    ));
    assert!(matches!(service.reset_total_withdrawn().await, Err(Error::Unauthenticated(_))));
}
