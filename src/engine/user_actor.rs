//! Per-user actor: the serialization boundary for one account's balance and
//! open positions, grounded on the original per-user evaluator goroutine.
//! Ticks and RPC-issued commands arrive through the same inbox so every
//! mutation of a user's state is structurally ordered, not lock-guarded.

use crate::domain::{pnl, price_acceptable, stop_loss_fires, take_profit_fires, NewPosition, Position, Price};
use crate::error::EngineError;
use crate::store::Store;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

pub enum UserCommand {
    Open {
        symbol_id: i32,
        symbol_title: String,
        requested_price: f64,
        count: i32,
        stop_loss: f64,
        take_profit: f64,
        is_buy: bool,
        reply: oneshot::Sender<Result<i32, EngineError>>,
    },
    Close {
        position_id: i32,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    SetBalance {
        delta: f64,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    GetBalance {
        reply: oneshot::Sender<f64>,
    },
    Tick(Price),
}

pub struct UserActor {
    user_id: i32,
    balance: f64,
    /// spec.md §3's `positionsBySymbol`: symbol -> position id -> Position.
    /// The inner map is insertion-ordered so the evaluator in `on_tick` can
    /// honor spec.md §4.4.3's tie-break rule.
    positions_by_symbol: HashMap<i32, IndexMap<i32, Position>>,
    /// Secondary index so a manual close, which only carries a position id,
    /// can locate the owning symbol bucket in O(1) rather than scanning
    /// every symbol.
    symbol_of_position: HashMap<i32, i32>,
    store: Arc<dyn Store>,
    prices: Arc<RwLock<HashMap<i32, Price>>>,
    inbox: mpsc::Receiver<UserCommand>,
    cancel: watch::Receiver<bool>,
}

impl UserActor {
    pub fn new(
        user_id: i32,
        balance: f64,
        positions: Vec<Position>,
        store: Arc<dyn Store>,
        prices: Arc<RwLock<HashMap<i32, Price>>>,
        inbox: mpsc::Receiver<UserCommand>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let mut actor = UserActor {
            user_id,
            balance,
            positions_by_symbol: HashMap::new(),
            symbol_of_position: HashMap::new(),
            store,
            prices,
            inbox,
            cancel,
        };
        for position in positions {
            actor.track(position);
        }
        actor
    }

    /// Inserts a position into both the primary `positionsBySymbol` cache
    /// and the id->symbol lookup.
    fn track(&mut self, position: Position) {
        self.symbol_of_position.insert(position.id, position.symbol_id);
        self.positions_by_symbol
            .entry(position.symbol_id)
            .or_default()
            .insert(position.id, position);
    }

    /// Removes a position from both structures; returns it if present.
    fn untrack(&mut self, position_id: i32) -> Option<Position> {
        let symbol_id = self.symbol_of_position.remove(&position_id)?;
        let bucket = self.positions_by_symbol.get_mut(&symbol_id)?;
        let position = bucket.shift_remove(&position_id);
        if bucket.is_empty() {
            self.positions_by_symbol.remove(&symbol_id);
        }
        position
    }

    fn position(&self, position_id: i32) -> Option<&Position> {
        let symbol_id = self.symbol_of_position.get(&position_id)?;
        self.positions_by_symbol.get(symbol_id)?.get(&position_id)
    }

    fn is_open(&self, position_id: i32) -> bool {
        self.symbol_of_position.contains_key(&position_id)
    }

    fn all_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions_by_symbol.values().flat_map(|bucket| bucket.values())
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.inbox.recv() => {
                    match command {
                        Some(command) => self.handle(command).await,
                        None => return,
                    }
                }
                _ = self.cancel.changed() => {
                    if *self.cancel.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn handle(&mut self, command: UserCommand) {
        match command {
            UserCommand::Open {
                symbol_id,
                symbol_title,
                requested_price,
                count,
                stop_loss,
                take_profit,
                is_buy,
                reply,
            } => {
                let result = self
                    .open(symbol_id, symbol_title, requested_price, count, stop_loss, take_profit, is_buy)
                    .await;
                let _ = reply.send(result);
            }
            UserCommand::Close { position_id, reply } => {
                let result = self.close(position_id).await;
                let _ = reply.send(result);
            }
            UserCommand::SetBalance { delta, reply } => {
                let result = self.set_balance(delta).await;
                let _ = reply.send(result);
            }
            UserCommand::GetBalance { reply } => {
                let _ = reply.send(self.balance);
            }
            UserCommand::Tick(price) => {
                self.on_tick(price).await;
            }
        }
    }

    /// spec.md §4.4.1: the open protocol, steps 1-8.
    async fn open(
        &mut self,
        symbol_id: i32,
        symbol_title: String,
        requested_price: f64,
        count: i32,
        stop_loss: f64,
        take_profit: f64,
        is_buy: bool,
    ) -> Result<i32, EngineError> {
        // 1. execution price: bid for buys, ask for sells.
        let execution_price = {
            let prices = self.prices.read();
            let price = prices.get(&symbol_id).ok_or(EngineError::UnknownSymbol(symbol_id))?;
            if is_buy {
                price.bid
            } else {
                price.ask
            }
        };

        // 2. price-staleness check
        if !price_acceptable(execution_price, requested_price, is_buy) {
            return Err(EngineError::PriceChanged);
        }

        // 3. notional
        let sum = execution_price * count as f64;

        // 4. affordability, buys only
        if is_buy && self.balance - sum < 0.0 {
            return Err(EngineError::InsufficientFunds {
                balance: self.balance,
                required: sum,
            });
        }

        // 5. reserve
        let delta = if is_buy { -sum } else { sum };
        self.store.change_balance(self.user_id, delta).await?;

        // 6. mirror in-memory
        self.balance += delta;

        // 7. persist the position, compensating on failure
        let spec = NewPosition {
            user_id: self.user_id,
            symbol_id,
            symbol_title,
            count,
            price_open: execution_price,
            stop_loss,
            take_profit,
            is_buy,
        };

        let position_id = match self.store.open_position(spec.clone(), chrono::Utc::now()).await {
            Ok(id) => id,
            Err(err) => {
                if let Err(compensation_err) = self.store.change_balance(self.user_id, -delta).await {
                    warn!(user_id = self.user_id, %compensation_err, "failed to compensate balance after open_position failure");
                } else {
                    self.balance -= delta;
                }
                return Err(EngineError::Store(err));
            }
        };

        // 8. track the new position
        self.track(Position {
            id: position_id,
            user_id: self.user_id,
            symbol_id: spec.symbol_id,
            symbol_title: spec.symbol_title,
            count: spec.count,
            price_open: spec.price_open,
            time_open: chrono::Utc::now(),
            stop_loss: spec.stop_loss,
            take_profit: spec.take_profit,
            is_buy: spec.is_buy,
            price_close: None,
            time_close: None,
        });

        Ok(position_id)
    }

    /// spec.md §4.4.2: the manual close protocol, steps 1-7.
    async fn close(&mut self, position_id: i32) -> Result<(), EngineError> {
        let position = self
            .position(position_id)
            .cloned()
            .ok_or(EngineError::UnknownPosition(position_id))?;

        self.close_position(&position).await
    }

    /// Shared by manual close and auto-close: both execute the same
    /// sequence, only the triggering predicate differs.
    async fn close_position(&mut self, position: &Position) -> Result<(), EngineError> {
        let close_price = {
            let prices = self.prices.read();
            let price = prices
                .get(&position.symbol_id)
                .ok_or(EngineError::UnknownSymbol(position.symbol_id))?;
            if position.is_buy {
                price.ask
            } else {
                price.bid
            }
        };

        let sum = close_price * position.count as f64;
        let delta = if position.is_buy { sum } else { -sum };

        self.store.change_balance(self.user_id, delta).await?;
        self.balance += delta;

        if let Err(err) = self.store.close_position(position.id, close_price).await {
            if let Err(compensation_err) = self.store.change_balance(self.user_id, -delta).await {
                warn!(user_id = self.user_id, %compensation_err, "failed to compensate balance after close_position failure");
            } else {
                self.balance -= delta;
            }
            return Err(EngineError::Store(err));
        }

        self.untrack(position.id);
        Ok(())
    }

    async fn set_balance(&mut self, delta: f64) -> Result<(), EngineError> {
        self.store.change_balance(self.user_id, delta).await?;
        self.balance += delta;
        Ok(())
    }

    /// spec.md §4.4.3: the auto-close hot path, evaluated once per tick
    /// against every open position on the ticked symbol. The Engine already
    /// wrote this tick into the shared price map before fan-out (spec.md
    /// §3); actors only ever read it.
    async fn on_tick(&mut self, price: Price) {
        let candidates: Vec<Position> = match self.positions_by_symbol.get(&price.symbol_id) {
            Some(bucket) => bucket.values().cloned().collect(),
            None => return,
        };

        for position in candidates {
            if !self.is_open(position.id) {
                // already closed earlier this tick by another firing predicate
                continue;
            }

            let fires = stop_loss_fires(&position, &price)
                || take_profit_fires(&position, &price)
                || self.margin_call_fires();

            if fires {
                debug!(user_id = self.user_id, position_id = position.id, "auto-close triggered");
                if let Err(err) = self.close_position(&position).await {
                    warn!(user_id = self.user_id, position_id = position.id, %err, "auto-close failed");
                } else {
                    info!(user_id = self.user_id, position_id = position.id, "position auto-closed");
                }
            }
        }
    }

    /// spec.md §4.4.3's margin-call predicate: projected equity across every
    /// open position, each marked at its own symbol's current price. Uses
    /// each position's own `is_buy`/`count` — never the triggering
    /// position's, per spec.md §9's disambiguation.
    fn margin_call_fires(&self) -> bool {
        let prices = self.prices.read();
        let mut projected = self.balance;

        for position in self.all_positions() {
            let sign = if position.is_buy { 1.0 } else { -1.0 };
            projected += sign * position.price_open * position.count as f64;

            if let Some(current) = prices.get(&position.symbol_id) {
                projected += pnl(position, current);
            }
        }

        projected < 0.0
    }
}
