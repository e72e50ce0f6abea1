//! Error kinds and their propagation across the store/engine/rpc boundary.

use thiserror::Error;

/// Failures surfaced by the `Store` trait. Internal to the store layer;
/// the engine folds these into `EngineError::Store`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("write affected zero rows")]
    NoRowsAffected,
    #[error("store call timed out")]
    Timeout,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised by `Engine`/`UserActor` operations. These map directly
/// onto the wire-level errors in the RPC facade.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown user {0}")]
    UnknownUser(i32),
    #[error("unknown symbol {0}")]
    UnknownSymbol(i32),
    #[error("unknown position {0}")]
    UnknownPosition(i32),
    #[error("insufficient funds: balance {balance} < required {required}")]
    InsufficientFunds { balance: f64, required: f64 },
    #[error("price changed, retry")]
    PriceChanged,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("operation cancelled")]
    Cancelled,
}
