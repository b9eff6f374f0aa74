use crate::broker::{SymbolInfo, TradeMode, FILLING_FOK, FILLING_IOC};
use crate::config::{BrokerMode, Config, TradingSettings};
use crate::models::{Action, Entry, OrderType, Signal};

/// Paper-mode config with short background delays. `data_dir` points at a
/// throwaway location; tests that persist should override it with a tempdir.
pub fn default_test_config() -> Config {
    Config {
        broker_mode: BrokerMode::Paper,
        bridge_url: "http://127.0.0.1:8228".to_string(),
        bridge_api_key: String::new(),
        bridge_api_secret: String::new(),
        initial_balance: 10_000.0,
        deviation: 20,
        magic_number: 234_000,
        active_channels: Vec::new(),
        trailing_poll_secs: 2,
        trailing_error_backoff_secs: 5,
        retry_poll_millis: 10,
        retry_delay_secs: 10,
        market_closed_delay_secs: 60,
        max_retry_attempts: 3,
        retry_all_spacing_ms: 0,
        shutdown_timeout_secs: 1,
        stats_timezone: "UTC".to_string(),
        data_dir: std::env::temp_dir()
            .join("signal-copy-bot-unit")
            .to_string_lossy()
            .to_string(),
        log_level: "ERROR".to_string(),
        settings: TradingSettings::default(),
    }
}

/// Tradable, visible symbol with the usual retail volume constraints.
pub fn symbol_info(name: &str, digits: u32, point: f64, stops_level: u32) -> SymbolInfo {
    SymbolInfo {
        name: name.to_string(),
        visible: true,
        trade_mode: TradeMode::Full,
        trade_expert: true,
        volume_min: 0.01,
        volume_max: 100.0,
        volume_step: 0.01,
        stops_level,
        digits,
        point,
        spread: 0,
        filling_mode: FILLING_FOK | FILLING_IOC,
        contract_size: 1.0,
    }
}

pub fn market_signal(symbol: &str, action: Action, entry: f64, tps: &[f64], sl: f64) -> Signal {
    Signal::new(
        symbol,
        action,
        OrderType::Market,
        Entry::Price(entry),
        tps.to_vec(),
        sl,
        Some("test".to_string()),
        format!("{} {} {}", symbol, action, entry),
    )
}

pub fn pending_signal(
    symbol: &str,
    action: Action,
    order_type: OrderType,
    entry: f64,
    tps: &[f64],
    sl: f64,
) -> Signal {
    Signal::new(
        symbol,
        action,
        order_type,
        Entry::Price(entry),
        tps.to_vec(),
        sl,
        Some("test".to_string()),
        format!("{} {} {}", symbol, order_type, entry),
    )
}

/// Config whose files live under `dir`.
pub fn config_in(dir: &std::path::Path) -> Config {
    Config {
        data_dir: dir.to_string_lossy().to_string(),
        ..default_test_config()
    }
}
