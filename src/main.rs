mod bot;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use signal_copy_bot::broker::{BridgeBroker, Broker, PaperBroker};
use signal_copy_bot::config::{BrokerMode, Config};
use signal_copy_bot::messaging::JsonLinesSource;

use crate::bot::SignalBot;

#[tokio::main]
async fn main() -> Result<()> {
    let mut cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    if let Err(e) = cfg.reload_settings() {
        warn!("Using default trading settings: {}", e);
    }

    let broker: Arc<dyn Broker> = match cfg.broker_mode {
        BrokerMode::Paper => {
            info!("Paper broker with balance {:.2}", cfg.initial_balance);
            Arc::new(PaperBroker::with_default_catalog(cfg.initial_balance))
        }
        BrokerMode::Bridge => {
            Arc::new(BridgeBroker::new(&cfg).context("creating bridge client")?)
        }
    };

    let source = Box::new(JsonLinesSource::stdin());
    let shared_config = cfg.shared();

    let mut bot = SignalBot::new(shared_config, broker, source).await;
    bot.run().await?;

    Ok(())
}
