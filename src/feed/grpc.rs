//! gRPC client adapter for the upstream `Prices.SubAll` stream, grounded on
//! the `Prices`/`SubAll` server-streaming service in the original broker's
//! protocol definition.

use super::PriceFeed;
use crate::domain::Price;
use crate::proto::feed::prices_client::PricesClient;
use crate::proto::feed::SubscribeRequest;
use chrono::{TimeZone, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tracing::{info, warn};

pub struct GrpcPriceFeed {
    addr: String,
}

impl GrpcPriceFeed {
    pub fn new(addr: impl Into<String>) -> Self {
        GrpcPriceFeed { addr: addr.into() }
    }

    async fn run_once(
        &self,
        symbol_ids: &[i32],
        tx: &mpsc::Sender<Price>,
    ) -> Result<(), tonic::transport::Error> {
        let mut client = PricesClient::connect(self.addr.clone()).await?;
        info!(addr = %self.addr, "connected to price feed");

        let request = SubscribeRequest {
            symbol_ids: symbol_ids.to_vec(),
        };

        let mut stream = match client.sub_all(request).await {
            Ok(response) => response.into_inner(),
            Err(status) => {
                warn!(%status, "price feed subscribe failed");
                return Ok(());
            }
        };

        loop {
            match stream.next().await {
                Some(Ok(tick)) => {
                    let price = Price {
                        symbol_id: tick.symbol_id,
                        bid: tick.bid,
                        ask: tick.ask,
                        timestamp: Utc
                            .timestamp_millis_opt(tick.timestamp_ms)
                            .single()
                            .unwrap_or_else(Utc::now),
                    };
                    // Best-effort: a full channel means every current
                    // consumer is behind: drop this tick rather than block
                    // the feed, per the latest-wins delivery contract.
                    let _ = tx.try_send(price);
                }
                Some(Err(status)) => {
                    warn!(%status, "price feed stream error");
                    return Ok(());
                }
                None => {
                    warn!("price feed stream ended");
                    return Ok(());
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl PriceFeed for GrpcPriceFeed {
    async fn run(&self, symbol_ids: Vec<i32>, tx: mpsc::Sender<Price>, mut cancel: watch::Receiver<bool>) {
        let mut backoff = Duration::from_millis(200);
        const MAX_BACKOFF: Duration = Duration::from_secs(10);

        loop {
            if *cancel.borrow() {
                return;
            }

            tokio::select! {
                result = self.run_once(&symbol_ids, &tx) => {
                    if let Err(err) = result {
                        warn!(%err, "price feed connection failed, reconnecting");
                    }
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return;
                    }
                }
            }

            if *cancel.borrow() {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return;
                    }
                }
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}
