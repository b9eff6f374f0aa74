use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use signal_copy_bot::broker::{BridgeBroker, Broker, PaperBroker};
use signal_copy_bot::config::{BrokerMode, Config, TradingSettings};
use signal_copy_bot::trading::symbol_properties::{save_all, SymbolProperties};
use signal_copy_bot::trading::SymbolResolver;

const PROBE_SYMBOLS: &[&str] = &["XAUUSD", "XAGUSD", "EURUSD", "BTCUSD"];

fn section(title: &str) {
    info!("{}", "=".repeat(50));
    info!("{}", title);
    info!("{}", "=".repeat(50));
}

fn check_environment(cfg: &Config) -> bool {
    section("Environment");
    if Path::new(".env").exists() {
        info!("OK   .env found");
    } else {
        warn!("--   no .env file, using process environment and defaults");
    }
    info!("     broker mode: {}", cfg.broker_mode);

    if cfg.broker_mode == BrokerMode::Bridge {
        let mut ok = true;
        for (key, value) in [
            ("BRIDGE_API_KEY", &cfg.bridge_api_key),
            ("BRIDGE_API_SECRET", &cfg.bridge_api_secret),
        ] {
            if value.is_empty() || value.starts_with("your_") {
                error!("FAIL {} is not set", key);
                ok = false;
            } else {
                info!("OK   {} set", key);
            }
        }
        return ok;
    }
    true
}

fn check_storage(cfg: &Config) -> bool {
    section("Storage");
    if let Err(e) = std::fs::create_dir_all(&cfg.data_dir) {
        error!("FAIL cannot create {}: {}", cfg.data_dir, e);
        return false;
    }
    let probe = Path::new(&cfg.data_dir).join(".write_test");
    if let Err(e) = std::fs::write(&probe, b"ok") {
        error!("FAIL {} is not writable: {}", cfg.data_dir, e);
        return false;
    }
    let _ = std::fs::remove_file(&probe);
    info!("OK   {} writable", cfg.data_dir);

    match TradingSettings::load(&cfg.settings_file()) {
        Ok(s) => {
            info!(
                "OK   settings: auto_trade={} lot={} trailing={}",
                s.auto_trade, s.default_lot_size, s.enable_trailing_stop
            );
            true
        }
        Err(e) => {
            error!("FAIL {}: {}", cfg.settings_file().display(), e);
            false
        }
    }
}

async fn check_broker(cfg: &Config, broker: Arc<dyn Broker>) -> bool {
    section("Broker");
    let terminal = match broker.terminal_info().await {
        Ok(t) => t,
        Err(e) => {
            error!("FAIL terminal unreachable: {}", e);
            return false;
        }
    };
    if !terminal.connected {
        error!("FAIL terminal is not connected to the trade server");
        return false;
    }
    info!("OK   terminal connected");
    if terminal.trade_allowed {
        info!("OK   automated trading enabled");
    } else {
        warn!("--   automated trading is disabled in the terminal");
    }

    match broker.account_info().await {
        Ok(a) => info!(
            "OK   account {} balance {:.2} {} leverage 1:{}",
            a.login, a.balance, a.currency, a.leverage
        ),
        Err(e) => warn!("--   account info unavailable: {}", e),
    }

    let resolver = SymbolResolver::new(broker.clone());
    let mut captured = Vec::new();
    for symbol in PROBE_SYMBOLS {
        match SymbolProperties::capture(broker.as_ref(), &resolver, symbol).await {
            Some(p) => {
                info!(
                    "OK   {} -> {} (spread {}, stops {}, lots {}-{} step {})",
                    symbol,
                    p.actual_symbol,
                    p.spread,
                    p.stops_level,
                    p.volume_min,
                    p.volume_max,
                    p.volume_step
                );
                captured.push(p);
            }
            None => warn!("--   {} not offered by this broker", symbol),
        }
    }
    if let Err(e) = save_all(&captured, &cfg.symbols_file()) {
        warn!("--   could not save symbol snapshots: {}", e);
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let mut ok = check_environment(&cfg);
    ok &= check_storage(&cfg);

    let broker: Option<Arc<dyn Broker>> = match cfg.broker_mode {
        BrokerMode::Paper => Some(Arc::new(PaperBroker::with_default_catalog(cfg.initial_balance))),
        BrokerMode::Bridge => match BridgeBroker::new(&cfg) {
            Ok(b) => Some(Arc::new(b)),
            Err(e) => {
                error!("FAIL bridge client: {}", e);
                None
            }
        },
    };
    ok &= match broker {
        Some(b) => check_broker(&cfg, b).await,
        None => false,
    };

    section("Result");
    if ok {
        info!("All checks passed");
        Ok(())
    } else {
        error!("Some checks failed");
        std::process::exit(1);
    }
}
