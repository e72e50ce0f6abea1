//! In-memory `Store` fake used by the integration and property tests so the
//! suite needs no live database. Mirrors the Postgres semantics (monotonic
//! ids, rows-affected failures) closely enough to exercise the engine.

use super::Store;
use crate::domain::{NewPosition, Position, User};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct State {
    users: HashMap<i32, User>,
    positions: HashMap<i32, Position>,
    next_user_id: i32,
    next_position_id: i32,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn sign_up(&self, deposit: f64) -> Result<i32, StoreError> {
        let mut state = self.state.lock();
        state.next_user_id += 1;
        let id = state.next_user_id;
        state.users.insert(id, User { id, balance: deposit });
        Ok(id)
    }

    async fn open_position(
        &self,
        spec: NewPosition,
        open_time: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let mut state = self.state.lock();
        state.next_position_id += 1;
        let id = state.next_position_id;
        state.positions.insert(
            id,
            Position {
                id,
                user_id: spec.user_id,
                symbol_id: spec.symbol_id,
                symbol_title: spec.symbol_title,
                count: spec.count,
                price_open: spec.price_open,
                time_open: open_time,
                stop_loss: spec.stop_loss,
                take_profit: spec.take_profit,
                is_buy: spec.is_buy,
                price_close: None,
                time_close: None,
            },
        );
        Ok(id)
    }

    async fn close_position(&self, position_id: i32, price_close: f64) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let position = state
            .positions
            .get_mut(&position_id)
            .ok_or(StoreError::NoRowsAffected)?;
        if position.price_close.is_some() {
            return Err(StoreError::NoRowsAffected);
        }
        position.price_close = Some(price_close);
        position.time_close = Some(Utc::now());
        Ok(())
    }

    async fn get_position(&self, position_id: i32) -> Result<Position, StoreError> {
        let state = self.state.lock();
        state
            .positions
            .get(&position_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_id_by_position_id(&self, position_id: i32) -> Result<i32, StoreError> {
        let state = self.state.lock();
        state
            .positions
            .get(&position_id)
            .map(|position| position.user_id)
            .ok_or(StoreError::NotFound)
    }

    async fn get_open_positions(&self, user_id: i32) -> Result<Vec<Position>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .positions
            .values()
            .filter(|position| position.user_id == user_id && position.is_open())
            .cloned()
            .collect())
    }

    async fn get_all_users(&self) -> Result<Vec<User>, StoreError> {
        let state = self.state.lock();
        Ok(state.users.values().copied().collect())
    }

    async fn change_balance(&self, user_id: i32, delta: f64) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let user = state.users.get_mut(&user_id).ok_or(StoreError::NoRowsAffected)?;
        user.balance += delta;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_up_then_get_balance_round_trips() {
        let store = InMemoryStore::new();
        let id = store.sign_up(1000.0).await.unwrap();
        let users = store.get_all_users().await.unwrap();
        assert_eq!(users.iter().find(|u| u.id == id).unwrap().balance, 1000.0);
    }

    #[tokio::test]
    async fn close_position_twice_fails_second_time() {
        let store = InMemoryStore::new();
        let user_id = store.sign_up(1000.0).await.unwrap();
        let position_id = store
            .open_position(
                NewPosition {
                    user_id,
                    symbol_id: 1,
                    symbol_title: "X".into(),
                    count: 1,
                    price_open: 100.0,
                    stop_loss: 90.0,
                    take_profit: 110.0,
                    is_buy: true,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        store.close_position(position_id, 105.0).await.unwrap();
        assert!(store.close_position(position_id, 105.0).await.is_err());
    }

    #[tokio::test]
    async fn change_balance_unknown_user_fails() {
        let store = InMemoryStore::new();
        assert!(store.change_balance(42, 10.0).await.is_err());
    }
}
