use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ConfigError;

pub type SharedConfig = Arc<RwLock<Config>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerMode {
    Paper,
    Bridge,
}

impl BrokerMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "paper" => Some(BrokerMode::Paper),
            "bridge" | "live" => Some(BrokerMode::Bridge),
            _ => None,
        }
    }
}

impl fmt::Display for BrokerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerMode::Paper => write!(f, "PAPER"),
            BrokerMode::Bridge => write!(f, "BRIDGE"),
        }
    }
}

/// Operator-editable trading switches, kept in `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSettings {
    pub auto_trade: bool,
    pub auto_connect: bool,
    /// Percent of balance.
    pub max_risk_per_trade: f64,
    pub default_lot_size: f64,
    pub enable_trailing_stop: bool,
    pub enable_notifications: bool,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            auto_trade: true,
            auto_connect: true,
            max_risk_per_trade: 2.0,
            default_lot_size: 0.01,
            enable_trailing_stop: true,
            enable_notifications: true,
        }
    }
}

impl TradingSettings {
    /// Reads settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let settings: TradingSettings = serde_json::from_str(&content)?;
        settings.check()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.default_lot_size.is_nan() || self.default_lot_size <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "default_lot_size".to_string(),
                value: self.default_lot_size.to_string(),
            });
        }
        if self.max_risk_per_trade.is_nan()
            || self.max_risk_per_trade <= 0.0
            || self.max_risk_per_trade > 100.0
        {
            return Err(ConfigError::InvalidValue {
                key: "max_risk_per_trade".to_string(),
                value: self.max_risk_per_trade.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Broker
    pub broker_mode: BrokerMode,
    pub bridge_url: String,
    pub bridge_api_key: String,
    pub bridge_api_secret: String,
    pub initial_balance: f64,

    // Orders
    pub deviation: u32,
    pub magic_number: u64,

    // Messaging
    pub active_channels: Vec<String>,

    // Background loops
    pub trailing_poll_secs: u64,
    pub trailing_error_backoff_secs: u64,
    pub retry_poll_millis: u64,
    pub retry_delay_secs: u64,
    pub market_closed_delay_secs: u64,
    pub max_retry_attempts: u32,
    pub retry_all_spacing_ms: u64,
    pub shutdown_timeout_secs: u64,

    // Statistics
    pub stats_timezone: String,

    // Storage
    pub data_dir: String,

    // Logging
    pub log_level: String,

    pub settings: TradingSettings,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let active_channels = env("ACTIVE_CHANNELS", "")
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        Config {
            broker_mode: BrokerMode::parse(&env("BROKER_MODE", "paper")).unwrap_or(BrokerMode::Paper),
            bridge_url: env("BRIDGE_URL", "http://127.0.0.1:8228"),
            bridge_api_key: env("BRIDGE_API_KEY", ""),
            bridge_api_secret: env("BRIDGE_API_SECRET", ""),
            initial_balance: env("INITIAL_BALANCE", "10000").parse().unwrap_or(10_000.0),
            deviation: 20,
            magic_number: 234_000,
            active_channels,
            trailing_poll_secs: env("TRAILING_POLL_SECS", "2").parse().unwrap_or(2),
            trailing_error_backoff_secs: 5,
            retry_poll_millis: 500,
            retry_delay_secs: env("RETRY_DELAY_SECS", "10").parse().unwrap_or(10),
            market_closed_delay_secs: env("MARKET_CLOSED_DELAY_SECS", "60").parse().unwrap_or(60),
            max_retry_attempts: env("MAX_RETRY_ATTEMPTS", "3").parse().unwrap_or(3),
            retry_all_spacing_ms: env("RETRY_ALL_SPACING_MS", "2000").parse().unwrap_or(2000),
            shutdown_timeout_secs: 5,
            stats_timezone: env("STATS_TIMEZONE", "UTC"),
            data_dir: env("DATA_DIR", "data"),
            log_level: env("LOG_LEVEL", "INFO"),
            settings: TradingSettings::default(),
        }
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    /// Re-reads `settings.json`. On error the previous settings stay in place.
    pub fn reload_settings(&mut self) -> Result<(), ConfigError> {
        self.settings = TradingSettings::load(&self.settings_file())?;
        Ok(())
    }

    /// Channels are all active when none are configured.
    pub fn is_active_channel(&self, channel: &str) -> bool {
        self.active_channels.is_empty()
            || self
                .active_channels
                .iter()
                .any(|c| c.eq_ignore_ascii_case(channel))
    }

    fn data_path(&self, file: &str) -> PathBuf {
        Path::new(&self.data_dir).join(file)
    }

    pub fn trades_file(&self) -> PathBuf {
        self.data_path("trades.json")
    }

    pub fn pending_file(&self) -> PathBuf {
        self.data_path("pending_trades.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_path("settings.json")
    }

    pub fn signals_file(&self) -> PathBuf {
        self.data_path("signals.json")
    }

    pub fn symbols_file(&self) -> PathBuf {
        self.data_path("symbols_info.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::default_test_config;

    #[test]
    fn missing_settings_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = default_test_config();
        cfg.data_dir = dir.path().to_string_lossy().to_string();
        cfg.reload_settings().unwrap();
        assert_eq!(cfg.settings, TradingSettings::default());
    }

    #[test]
    fn reload_picks_up_saved_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = default_test_config();
        cfg.data_dir = dir.path().to_string_lossy().to_string();

        let edited = TradingSettings {
            auto_trade: false,
            default_lot_size: 0.05,
            ..TradingSettings::default()
        };
        edited.save(&cfg.settings_file()).unwrap();

        cfg.reload_settings().unwrap();
        assert!(!cfg.settings.auto_trade);
        assert!((cfg.settings.default_lot_size - 0.05).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_positive_lot_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"default_lot_size": 0}"#).unwrap();
        let err = TradingSettings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn active_channel_match_is_case_insensitive() {
        let mut cfg = default_test_config();
        assert!(cfg.is_active_channel("anything"));
        cfg.active_channels = vec!["GoldSignals".to_string()];
        assert!(cfg.is_active_channel("goldsignals"));
        assert!(!cfg.is_active_channel("forex"));
    }
}
