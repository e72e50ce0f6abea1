//! Broker server bootstrap: load config, connect the store, spawn the feed
//! adapter and dispatcher, serve the gRPC facade, shut down on Ctrl+C.

use broker::config::BrokerConfig;
use broker::engine::Engine;
use broker::feed::{GrpcPriceFeed, PriceFeed};
use broker::proto::broker::broker_service_server::BrokerServiceServer;
use broker::rpc::BrokerServer;
use broker::store::{PostgresStore, Store};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BrokerConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .init();

    info!(bind_addr = %config.bind_addr, feed_addr = %config.feed_addr, "starting broker");

    let store: Arc<dyn Store> =
        Arc::new(PostgresStore::connect(&config.postgres.dsn(), config.store_timeout).await?);

    let (cancel_tx, cancel_rx) = watch::channel(false);

    let engine = Engine::start(config.symbols.clone(), store, cancel_rx.clone()).await?;

    let (tick_tx, tick_rx) = mpsc::channel(1024);

    let feed = Arc::new(GrpcPriceFeed::new(config.feed_addr.clone()));
    let symbol_ids: Vec<i32> = config.symbols.iter().map(|s| s.id).collect();
    let feed_cancel = cancel_rx.clone();
    let feed_task = tokio::spawn(async move {
        feed.run(symbol_ids, tick_tx, feed_cancel).await;
    });

    let dispatcher_engine = engine.clone();
    let dispatcher_task = tokio::spawn(async move {
        dispatcher_engine.run_dispatcher(tick_rx).await;
    });

    let addr = config.bind_addr.parse()?;
    let server = BrokerServer::new(engine.clone());

    let shutdown_cancel_tx = cancel_tx.clone();
    let serve_result = tonic::transport::Server::builder()
        .add_service(BrokerServiceServer::new(server))
        .serve_with_shutdown(addr, async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            let _ = shutdown_cancel_tx.send(true);
        })
        .await;

    let _ = cancel_tx.send(true);
    let _ = feed_task.await;
    let _ = dispatcher_task.await;
    engine.join().await;

    serve_result?;
    info!("broker shut down cleanly");
    Ok(())
}
