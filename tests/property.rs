//! Randomized interleavings of ticks and RPC-style operations, checking the
//! invariants from spec.md §8 hold throughout and after the stream drains.

use broker::domain::{Price, Symbol};
use broker::engine::Engine;
use broker::store::{InMemoryStore, Store};
use proptest::prelude::*;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::watch;

#[derive(Debug, Clone)]
enum Op {
    Open { requested_price: f64, count: i32, is_buy: bool },
    CloseOldest,
    Tick { bid: f64, ask: f64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (80.0..120.0_f64, 1..5_i32, any::<bool>())
            .prop_map(|(requested_price, count, is_buy)| Op::Open { requested_price, count, is_buy }),
        Just(Op::CloseOldest),
        (80.0..120.0_f64, 80.0..120.0_f64).prop_map(|(a, b)| Op::Tick {
            bid: a.min(b),
            ask: a.max(b),
        }),
    ]
}

async fn run_ops(ops: &[Op]) -> Result<(), String> {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let symbols = vec![Symbol { id: 1, title: "X".into() }];
    let engine = Engine::start(symbols, store.clone(), cancel_rx)
        .await
        .map_err(|e| e.to_string())?;

    let user_id = engine.sign_up(100_000.0).await.map_err(|e| e.to_string())?;
    let mut open_positions: Vec<i32> = Vec::new();

    // Seed a price so the first open has something to execute against.
    engine
        .ingest_price(Price {
            symbol_id: 1,
            bid: 99.0,
            ask: 100.0,
            timestamp: chrono::Utc::now(),
        })
        .await;

    for op in ops {
        match op {
            Op::Open { requested_price, count, is_buy } => {
                if let Ok(position_id) = engine
                    .open_position(user_id, 1, *requested_price, *count, 1.0, 10_000.0, *is_buy)
                    .await
                {
                    open_positions.push(position_id);
                }
            }
            Op::CloseOldest => {
                if !open_positions.is_empty() {
                    let position_id = open_positions.remove(0);
                    let _ = engine.close_position(position_id).await;
                }
            }
            Op::Tick { bid, ask } => {
                engine
                    .ingest_price(Price {
                        symbol_id: 1,
                        bid: *bid,
                        ask: *ask,
                        timestamp: chrono::Utc::now(),
                    })
                    .await;
            }
        }

        // Invariant 1: the actor's in-memory balance matches the Store's,
        // since no operation is in flight between steps.
        let memory_balance = engine.get_balance(user_id).await.map_err(|e| e.to_string())?;
        let stored_users = store.get_all_users().await.map_err(|e| e.to_string())?;
        let stored_balance = stored_users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.balance)
            .ok_or("user vanished from store")?;
        if (memory_balance - stored_balance).abs() > 1e-6 {
            return Err(format!(
                "balance divergence: memory={memory_balance} store={stored_balance}"
            ));
        }

        // Invariant 2: the store's open-position set and what we think is
        // open agree in count (positions we closed are gone from both).
        let stored_open = store.get_open_positions(user_id).await.map_err(|e| e.to_string())?;
        if stored_open.len() > open_positions.len() {
            return Err(format!(
                "store has more open positions ({}) than tracked ({})",
                stored_open.len(),
                open_positions.len()
            ));
        }
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_across_random_interleavings(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = Runtime::new().unwrap();
        let result = runtime.block_on(run_ops(&ops));
        prop_assert!(result.is_ok(), "{:?}", result.err());
    }
}
