//! # Broker
//!
//! Server side of a simulated brokerage: users deposit funds, open long or
//! short positions on a fixed symbol universe at a live bid/ask price, hold
//! them while PnL fluctuates, and close them manually or automatically on
//! stop-loss, take-profit, or margin-call.
//!
//! The engine is the centre of gravity: a hot price stream fanned out to a
//! per-user actor that owns that user's balance and open-positions index,
//! serializing tick-driven auto-close against RPC-driven manual open/close
//! through a single inbox per user.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod feed;
pub mod proto;
pub mod rpc;
pub mod store;

pub use config::BrokerConfig;
pub use engine::Engine;
pub use error::EngineError;

/// Convenience re-exports for consumers wiring up a `BrokerServer`.
pub mod prelude {
    pub use crate::config::BrokerConfig;
    pub use crate::domain::{NewPosition, Position, Price, Symbol, User};
    pub use crate::engine::Engine;
    pub use crate::error::{EngineError, StoreError};
    pub use crate::feed::{GrpcPriceFeed, PriceFeed};
    pub use crate::rpc::BrokerServer;
    pub use crate::store::{InMemoryStore, PostgresStore, Store};
}
