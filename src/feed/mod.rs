//! Upstream price feed adapter: turns a remote tick stream into `Price`
//! values delivered onto an internal channel. Best-effort delivery — the
//! adapter reconnects transparently on feed failure and never propagates
//! that failure to the Engine.

mod grpc;

pub use grpc::GrpcPriceFeed;

use crate::domain::Price;
use tokio::sync::mpsc;

/// Runs the feed adapter until cancelled, forwarding decoded prices onto
/// `tx`. Implementations own their own reconnect loop.
#[async_trait::async_trait]
pub trait PriceFeed: Send + Sync {
    async fn run(&self, symbol_ids: Vec<i32>, tx: mpsc::Sender<Price>, cancel: tokio::sync::watch::Receiver<bool>);
}
