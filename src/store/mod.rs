//! Durable row store: users, symbols, and positions. A narrow transactional
//! interface — every call is atomic at the row level; no cross-call
//! transactions are required by the core.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use crate::domain::{NewPosition, Position, User};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts a user row with the next id from the monotonic sequence.
    async fn sign_up(&self, deposit: f64) -> Result<i32, StoreError>;

    /// Inserts one position row with `price_close`/`time_close` unset.
    async fn open_position(
        &self,
        spec: NewPosition,
        open_time: DateTime<Utc>,
    ) -> Result<i32, StoreError>;

    /// Sets `price_close` and `time_close = now()` for the row.
    async fn close_position(&self, position_id: i32, price_close: f64) -> Result<(), StoreError>;

    /// Single-row lookup; fails when absent.
    async fn get_position(&self, position_id: i32) -> Result<Position, StoreError>;

    /// Single-row lookup; absence is the signal the Engine uses to reject
    /// a manual close for an unknown position.
    async fn get_user_id_by_position_id(&self, position_id: i32) -> Result<i32, StoreError>;

    /// Rows where `price_close` is unset.
    async fn get_open_positions(&self, user_id: i32) -> Result<Vec<Position>, StoreError>;

    /// Full user table; used only at startup.
    async fn get_all_users(&self) -> Result<Vec<User>, StoreError>;

    /// `balance += delta`; fails if zero rows affected.
    async fn change_balance(&self, user_id: i32, delta: f64) -> Result<(), StoreError>;
}
