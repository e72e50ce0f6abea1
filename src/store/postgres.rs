//! Postgres-backed `Store`, grounded on the original `internal/repository`
//! SQL shapes: a monotonic sequence per table and rows-affected checks in
//! place of a richer error type from the driver.

use super::Store;
use crate::domain::{NewPosition, Position, User};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::debug;

pub struct PostgresStore {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresStore {
    pub async fn connect(dsn: &str, timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPool::connect(dsn).await?;
        Ok(PostgresStore { pool, timeout })
    }

    async fn with_timeout<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn sign_up(&self, deposit: f64) -> Result<i32, StoreError> {
        self.with_timeout(async {
            let row = sqlx::query(
                "INSERT INTO users (id, balance) VALUES (nextval('users_sequence'), $1) RETURNING id",
            )
            .bind(deposit)
            .fetch_one(&self.pool)
            .await?;
            Ok(row.try_get::<i32, _>("id")?)
        })
        .await
    }

    async fn open_position(
        &self,
        spec: NewPosition,
        open_time: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        self.with_timeout(async {
            let result = sqlx::query(
                "INSERT INTO positions \
                 (id, user_id, symbol_id, symbol_title, count, price_open, time_open, \
                  price_close, time_close, stop_loss, take_profit, is_buy) \
                 VALUES (nextval('positions_sequence'), $1, $2, $3, $4, $5, $6, NULL, NULL, $7, $8, $9) \
                 RETURNING id",
            )
            .bind(spec.user_id)
            .bind(spec.symbol_id)
            .bind(&spec.symbol_title)
            .bind(spec.count)
            .bind(spec.price_open)
            .bind(open_time)
            .bind(spec.stop_loss)
            .bind(spec.take_profit)
            .bind(spec.is_buy)
            .fetch_optional(&self.pool)
            .await?;

            match result {
                Some(row) => Ok(row.try_get::<i32, _>("id")?),
                None => Err(StoreError::NoRowsAffected),
            }
        })
        .await
    }

    async fn close_position(&self, position_id: i32, price_close: f64) -> Result<(), StoreError> {
        self.with_timeout(async {
            let result = sqlx::query(
                "UPDATE positions SET price_close = $1, time_close = now() WHERE id = $2 AND price_close IS NULL",
            )
            .bind(price_close)
            .bind(position_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() != 1 {
                return Err(StoreError::NoRowsAffected);
            }
            Ok(())
        })
        .await
    }

    async fn get_position(&self, position_id: i32) -> Result<Position, StoreError> {
        self.with_timeout(async {
            let row = sqlx::query(
                "SELECT id, user_id, symbol_id, symbol_title, count, price_open, time_open, \
                 stop_loss, take_profit, is_buy, price_close, time_close \
                 FROM positions WHERE id = $1",
            )
            .bind(position_id)
            .fetch_optional(&self.pool)
            .await?;

            let row = row.ok_or(StoreError::NotFound)?;
            Ok(position_from_row(&row)?)
        })
        .await
    }

    async fn get_user_id_by_position_id(&self, position_id: i32) -> Result<i32, StoreError> {
        self.with_timeout(async {
            let row = sqlx::query("SELECT user_id FROM positions WHERE id = $1")
                .bind(position_id)
                .fetch_optional(&self.pool)
                .await?;

            let row = row.ok_or(StoreError::NotFound)?;
            Ok(row.try_get::<i32, _>("user_id")?)
        })
        .await
    }

    async fn get_open_positions(&self, user_id: i32) -> Result<Vec<Position>, StoreError> {
        self.with_timeout(async {
            let rows = sqlx::query(
                "SELECT id, user_id, symbol_id, symbol_title, count, price_open, time_open, \
                 stop_loss, take_profit, is_buy, price_close, time_close \
                 FROM positions WHERE user_id = $1 AND price_close IS NULL",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

            debug!(user_id, count = rows.len(), "loaded open positions");
            rows.iter().map(position_from_row).collect()
        })
        .await
    }

    async fn get_all_users(&self) -> Result<Vec<User>, StoreError> {
        self.with_timeout(async {
            let rows = sqlx::query("SELECT id, balance FROM users")
                .fetch_all(&self.pool)
                .await?;

            rows.iter()
                .map(|row| {
                    Ok(User {
                        id: row.try_get("id")?,
                        balance: row.try_get("balance")?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn change_balance(&self, user_id: i32, delta: f64) -> Result<(), StoreError> {
        self.with_timeout(async {
            let result = sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
                .bind(delta)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() != 1 {
                return Err(StoreError::NoRowsAffected);
            }
            Ok(())
        })
        .await
    }
}

fn position_from_row(row: &sqlx::postgres::PgRow) -> Result<Position, StoreError> {
    Ok(Position {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        symbol_id: row.try_get("symbol_id")?,
        symbol_title: row.try_get("symbol_title")?,
        count: row.try_get("count")?,
        price_open: row.try_get("price_open")?,
        time_open: row.try_get("time_open")?,
        stop_loss: row.try_get("stop_loss")?,
        take_profit: row.try_get("take_profit")?,
        is_buy: row.try_get("is_buy")?,
        price_close: row.try_get("price_close")?,
        time_close: row.try_get("time_close")?,
    })
}
