//! Core data model: symbols, prices, users, and positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tradable instrument. Immutable once loaded; the symbol universe is
/// fixed at startup from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: i32,
    pub title: String,
}

/// The current two-sided quote for a symbol. At most one current `Price`
/// exists per symbol at a time; newer timestamps supersede older ones.
/// Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub symbol_id: i32,
    pub bid: f64,
    pub ask: f64,
    pub timestamp: DateTime<Utc>,
}

/// A registered account. `balance` is the authoritative in-memory mirror
/// of the stored balance except during a compensating-failure window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub balance: f64,
}

/// A commitment to hold `count` units of a symbol, long or short, opened
/// at `price_open`. Open iff `price_close` is `None`. Closed exactly once,
/// retained forever after close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: i32,
    pub user_id: i32,
    pub symbol_id: i32,
    pub symbol_title: String,
    pub count: i32,
    pub price_open: f64,
    pub time_open: DateTime<Utc>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub is_buy: bool,
    pub price_close: Option<f64>,
    pub time_close: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.price_close.is_none()
    }
}

/// Parameters for opening a new position, as supplied by a caller (RPC or
/// internal) before the engine has resolved an execution price.
#[derive(Debug, Clone, Copy)]
pub struct OpenPositionRequest {
    pub symbol_id: i32,
    pub requested_price: f64,
    pub count: i32,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub is_buy: bool,
}

/// The fully-resolved spec for a position about to be inserted into the
/// store: execution price has already been chosen and checked.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub user_id: i32,
    pub symbol_id: i32,
    pub symbol_title: String,
    pub count: i32,
    pub price_open: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub is_buy: bool,
}

/// PnL of an open position evaluated against a price.
pub fn pnl(position: &Position, price: &Price) -> f64 {
    if position.is_buy {
        price.ask * position.count as f64 - position.price_open * position.count as f64
    } else {
        position.price_open * position.count as f64 - price.bid * position.count as f64
    }
}

pub fn stop_loss_fires(position: &Position, price: &Price) -> bool {
    if position.is_buy {
        price.ask <= position.stop_loss
    } else {
        price.bid >= position.stop_loss
    }
}

pub fn take_profit_fires(position: &Position, price: &Price) -> bool {
    if position.is_buy {
        price.ask >= position.take_profit
    } else {
        price.bid <= position.take_profit
    }
}

/// Price-staleness check for opening a position: the client's requested
/// price must still be honored by the current execution price.
pub fn price_acceptable(execution_price: f64, requested_price: f64, is_buy: bool) -> bool {
    if is_buy {
        requested_price >= execution_price
    } else {
        requested_price <= execution_price
    }
}
