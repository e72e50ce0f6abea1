//! The trading engine: symbol table, live price cache, the user registry,
//! and the dispatcher that fans price ticks out to every `UserActor`.
//! Grounded on the original engine/service pairing: a thin, mostly-stateless
//! coordinator in front of per-user workers.

mod user_actor;

pub use user_actor::{UserActor, UserCommand};

use crate::domain::{Price, Symbol};
use crate::error::{EngineError, StoreError};
use crate::store::Store;
use parking_lot::RwLock as SyncRwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tracing::{info, warn};

const USER_CHANNEL_CAPACITY: usize = 256;

struct UserHandle {
    sender: mpsc::Sender<UserCommand>,
    task: tokio::task::JoinHandle<()>,
}

/// Owns the symbol universe, the live price cache, and the registry of
/// running `UserActor`s. Cheaply cloneable: every field is an `Arc`.
#[derive(Clone)]
pub struct Engine {
    symbols: Arc<HashMap<i32, Symbol>>,
    users: Arc<RwLock<HashMap<i32, UserHandle>>>,
    prices: Arc<SyncRwLock<HashMap<i32, Price>>>,
    store: Arc<dyn Store>,
    cancel: watch::Receiver<bool>,
}

impl Engine {
    /// spec.md §4.3.1: load symbols, load every user and their open
    /// positions, spawn one actor per user.
    pub async fn start(
        symbols: Vec<Symbol>,
        store: Arc<dyn Store>,
        cancel: watch::Receiver<bool>,
    ) -> Result<Self, EngineError> {
        let symbols: HashMap<i32, Symbol> = symbols.into_iter().map(|s| (s.id, s)).collect();
        let prices = Arc::new(SyncRwLock::new(HashMap::new()));
        let users = Arc::new(RwLock::new(HashMap::new()));

        let engine = Engine {
            symbols: Arc::new(symbols),
            users,
            prices,
            store,
            cancel,
        };

        let all_users = engine.store.get_all_users().await?;
        for user in all_users {
            let positions = engine.store.get_open_positions(user.id).await?;
            engine.spawn_actor(user.id, user.balance, positions).await;
        }

        info!(user_count = engine.users.read().await.len(), "engine started");
        Ok(engine)
    }

    async fn spawn_actor(&self, user_id: i32, balance: f64, positions: Vec<crate::domain::Position>) {
        let (tx, rx) = mpsc::channel(USER_CHANNEL_CAPACITY);
        let actor = UserActor::new(
            user_id,
            balance,
            positions,
            self.store.clone(),
            self.prices.clone(),
            rx,
            self.cancel.clone(),
        );
        let task = tokio::spawn(actor.run());
        self.users.write().await.insert(user_id, UserHandle { sender: tx, task });
    }

    /// spec.md §4.3.2: the dispatcher loop. Consumes the feed's inbound
    /// channel for the process lifetime; never returns until cancelled.
    pub async fn run_dispatcher(&self, mut inbound: mpsc::Receiver<Price>) {
        let mut cancel = self.cancel.clone();
        loop {
            tokio::select! {
                price = inbound.recv() => {
                    match price {
                        Some(price) => self.ingest_price(price).await,
                        None => return,
                    }
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Updates the live price cache and fans the tick out to every running
    /// actor. Public so callers that feed prices directly (tests, or an
    /// embedder wiring its own feed) don't need a channel round-trip.
    pub async fn ingest_price(&self, price: Price) {
        self.prices.write().insert(price.symbol_id, price);

        let users = self.users.read().await;
        for handle in users.values() {
            // Latest-wins, never blocks on a slow actor: a full channel
            // means that actor drops this tick.
            let _ = handle.sender.try_send(UserCommand::Tick(price));
        }
    }

    pub async fn sign_up(&self, deposit: f64) -> Result<i32, EngineError> {
        let user_id = self.store.sign_up(deposit).await?;
        self.spawn_actor(user_id, deposit, Vec::new()).await;
        Ok(user_id)
    }

    pub async fn open_position(
        &self,
        user_id: i32,
        symbol_id: i32,
        requested_price: f64,
        count: i32,
        stop_loss: f64,
        take_profit: f64,
        is_buy: bool,
    ) -> Result<i32, EngineError> {
        let symbol_title = self
            .symbols
            .get(&symbol_id)
            .ok_or(EngineError::UnknownSymbol(symbol_id))?
            .title
            .clone();

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_to_user(
            user_id,
            UserCommand::Open {
                symbol_id,
                symbol_title,
                requested_price,
                count,
                stop_loss,
                take_profit,
                is_buy,
                reply: reply_tx,
            },
        )
        .await?;

        reply_rx.await.map_err(|_| EngineError::Cancelled)?
    }

    pub async fn close_position(&self, position_id: i32) -> Result<(), EngineError> {
        let user_id = self
            .store
            .get_user_id_by_position_id(position_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => EngineError::UnknownPosition(position_id),
                other => EngineError::Store(other),
            })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_to_user(user_id, UserCommand::Close { position_id, reply: reply_tx })
            .await?;

        reply_rx.await.map_err(|_| EngineError::Cancelled)?
    }

    pub async fn set_balance(&self, user_id: i32, delta: f64) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_to_user(user_id, UserCommand::SetBalance { delta, reply: reply_tx })
            .await?;

        reply_rx.await.map_err(|_| EngineError::Cancelled)?
    }

    pub async fn get_balance(&self, user_id: i32) -> Result<f64, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_to_user(user_id, UserCommand::GetBalance { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| EngineError::Cancelled)
    }

    async fn send_to_user(&self, user_id: i32, command: UserCommand) -> Result<(), EngineError> {
        let users = self.users.read().await;
        let handle = users.get(&user_id).ok_or(EngineError::UnknownUser(user_id))?;
        handle
            .sender
            .send(command)
            .await
            .map_err(|_| EngineError::UnknownUser(user_id))
    }

    /// Awaits every actor task to completion. Called after cancellation has
    /// been signalled, during graceful shutdown.
    pub async fn join(&self) {
        let mut users = self.users.write().await;
        for (user_id, handle) in users.drain() {
            if let Err(err) = handle.task.await {
                warn!(user_id, %err, "user actor task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    async fn test_engine() -> Engine {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let symbols = vec![Symbol { id: 1, title: "X".into() }];
        Engine::start(symbols, store, cancel_rx).await.unwrap()
    }

    #[tokio::test]
    async fn sign_up_spawns_an_actor_reachable_by_rpc_methods() {
        let engine = test_engine().await;
        let user_id = engine.sign_up(500.0).await.unwrap();
        assert_eq!(engine.get_balance(user_id).await.unwrap(), 500.0);
    }

    #[tokio::test]
    async fn open_position_rejects_unknown_symbol() {
        let engine = test_engine().await;
        let user_id = engine.sign_up(500.0).await.unwrap();
        let result = engine.open_position(user_id, 99, 100.0, 1, 90.0, 110.0, true).await;
        assert!(matches!(result, Err(EngineError::UnknownSymbol(99))));
    }

    #[tokio::test]
    async fn open_position_rejects_unknown_user() {
        let engine = test_engine().await;
        let result = engine.open_position(42, 1, 100.0, 1, 90.0, 110.0, true).await;
        assert!(matches!(result, Err(EngineError::UnknownUser(42))));
    }

    #[tokio::test]
    async fn ingest_price_updates_the_live_cache() {
        let engine = test_engine().await;
        let tick = Price {
            symbol_id: 1,
            bid: 99.0,
            ask: 100.0,
            timestamp: chrono::Utc::now(),
        };
        engine.ingest_price(tick).await;
        assert_eq!(engine.prices.read().get(&1).copied(), Some(tick));
    }
}
