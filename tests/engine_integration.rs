//! End-to-end scenarios against `Engine` backed by `InMemoryStore`, covering
//! the round-trip laws and worked examples.

use broker::domain::{Price, Symbol};
use broker::engine::Engine;
use broker::error::EngineError;
use broker::store::{InMemoryStore, Store};
use std::sync::Arc;
use tokio::sync::watch;

async fn engine_with_symbols(symbols: Vec<Symbol>) -> Engine {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    Engine::start(symbols, store, cancel_rx).await.unwrap()
}

fn symbols() -> Vec<Symbol> {
    vec![
        Symbol { id: 1, title: "AAA".into() },
        Symbol { id: 2, title: "BBB".into() },
    ]
}

fn quote(symbol_id: i32, bid: f64, ask: f64) -> Price {
    Price {
        symbol_id,
        bid,
        ask,
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn sign_up_then_get_balance_returns_deposit() {
    let engine = engine_with_symbols(symbols()).await;
    let user_id = engine.sign_up(1000.0).await.unwrap();
    assert_eq!(engine.get_balance(user_id).await.unwrap(), 1000.0);
}

#[tokio::test]
async fn scenario_stop_loss_auto_close() {
    let engine = engine_with_symbols(symbols()).await;
    let user_id = engine.sign_up(1000.0).await.unwrap();

    engine.ingest_price(quote(1, 100.0, 101.0)).await;

    engine
        .open_position(user_id, 1, 100.0, 2, 90.0, 120.0, true)
        .await
        .unwrap();
    assert_eq!(engine.get_balance(user_id).await.unwrap(), 800.0);

    engine.ingest_price(quote(1, 88.0, 89.0)).await;

    assert_eq!(engine.get_balance(user_id).await.unwrap(), 800.0 + 89.0 * 2.0);
}

#[tokio::test]
async fn scenario_take_profit_auto_close_for_sell() {
    // A sell opens at the ask and closes at the bid (spec.md §4.4.1/§4.4.2);
    // take-profit for a sell fires once the bid falls to or below the
    // target.
    let engine = engine_with_symbols(symbols()).await;
    let user_id = engine.sign_up(500.0).await.unwrap();

    engine.ingest_price(quote(2, 50.0, 51.0)).await;

    engine
        .open_position(user_id, 2, 51.0, 4, 60.0, 40.0, false)
        .await
        .unwrap();
    assert_eq!(engine.get_balance(user_id).await.unwrap(), 500.0 + 51.0 * 4.0);

    engine.ingest_price(quote(2, 39.0, 40.0)).await;

    assert_eq!(
        engine.get_balance(user_id).await.unwrap(),
        500.0 + 51.0 * 4.0 - 39.0 * 4.0
    );
}

#[tokio::test]
async fn scenario_insufficient_funds_leaves_balance_untouched() {
    let engine = engine_with_symbols(symbols()).await;
    let user_id = engine.sign_up(100.0).await.unwrap();

    engine.ingest_price(quote(1, 59.0, 60.0)).await;

    let result = engine.open_position(user_id, 1, 60.0, 2, 50.0, 70.0, true).await;
    assert!(matches!(result, Err(EngineError::InsufficientFunds { .. })));
    assert_eq!(engine.get_balance(user_id).await.unwrap(), 100.0);
}

#[tokio::test]
async fn scenario_price_changed_when_stale() {
    let engine = engine_with_symbols(symbols()).await;
    let user_id = engine.sign_up(1000.0).await.unwrap();

    engine.ingest_price(quote(1, 100.0, 101.0)).await;
    engine.open_position(user_id, 1, 100.0, 2, 90.0, 120.0, true).await.unwrap();

    let result = engine.open_position(user_id, 1, 99.0, 1, 90.0, 120.0, true).await;
    assert!(matches!(result, Err(EngineError::PriceChanged)));
}

#[tokio::test]
async fn close_position_manually_then_again_fails() {
    let engine = engine_with_symbols(symbols()).await;
    let user_id = engine.sign_up(1000.0).await.unwrap();
    engine.ingest_price(quote(1, 100.0, 101.0)).await;

    let position_id = engine
        .open_position(user_id, 1, 100.0, 1, 80.0, 150.0, true)
        .await
        .unwrap();

    engine.close_position(position_id).await.unwrap();
    assert!(engine.close_position(position_id).await.is_err());
}

#[tokio::test]
async fn close_position_unknown_id_fails() {
    let engine = engine_with_symbols(symbols()).await;
    let result = engine.close_position(999).await;
    assert!(matches!(result, Err(EngineError::UnknownPosition(999))));
}

#[tokio::test]
async fn set_balance_adjusts_stored_and_in_memory_balance() {
    let engine = engine_with_symbols(symbols()).await;
    let user_id = engine.sign_up(200.0).await.unwrap();
    engine.set_balance(user_id, -50.0).await.unwrap();
    assert_eq!(engine.get_balance(user_id).await.unwrap(), 150.0);
}
