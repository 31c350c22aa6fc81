//! Bookstock inbound adapter service.
//!
//! Subscribes to the stock-change topic and applies each event to the book
//! inventory. Runs until terminated (Ctrl-C / SIGINT), then drains the
//! current batch, commits progress, and releases the subscription before
//! exiting.

use anyhow::{Context, Result};
use bookstock_consumer::{ConsumerOptions, StockConsumer};
use bookstock_kafka::KafkaRecordSource;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod inventory;

use config::ServiceConfig;
use inventory::InMemoryInventory;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting bookstock inbound adapter");

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    info!(
        brokers = %config.brokers,
        group_id = %config.group_id,
        topic = %config.topic,
        poll_timeout = ?config.poll_timeout,
        "configuration loaded"
    );

    let source = Arc::new(
        KafkaRecordSource::builder()
            .brokers(&config.brokers)
            .group_id(&config.group_id)
            .topic(&config.topic)
            .build()
            .context("failed to subscribe to the stock-change topic")?,
    );
    let inventory = Arc::new(InMemoryInventory::new());

    let consumer = StockConsumer::new(
        source,
        Arc::clone(&inventory),
        ConsumerOptions::default()
            .with_poll_timeout(config.poll_timeout)
            .with_signal_handler(true),
    );

    consumer.start()?;
    info!("consumer running; send SIGINT to stop");

    consumer.join().await?;
    info!(books = inventory.len(), "bookstock inbound adapter stopped");
    Ok(())
}
