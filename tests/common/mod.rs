use std::sync::Arc;

use signal_copy_bot::broker::PaperBroker;
use signal_copy_bot::config::{BrokerMode, Config, SharedConfig, TradingSettings};
use signal_copy_bot::copier::SignalCopier;
use signal_copy_bot::trading::{
    OrderExecutor, PositionBook, RetryCoordinator, SignalJournal, SymbolResolver,
    TrailingStopEngine,
};

/// Paper-mode config writing into `data_dir`.
pub fn test_config(data_dir: &std::path::Path) -> Config {
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
        data_dir: data_dir.to_string_lossy().to_string(),
        log_level: "ERROR".to_string(),
        settings: TradingSettings::default(),
    }
}

/// Every component wired over one paper broker, as the binary wires them.
#[allow(dead_code)]
pub struct Stack {
    pub dir: tempfile::TempDir,
    pub config: SharedConfig,
    pub broker: Arc<PaperBroker>,
    pub resolver: Arc<SymbolResolver>,
    pub book: Arc<PositionBook>,
    pub executor: Arc<OrderExecutor>,
    pub retry: Arc<RetryCoordinator>,
    pub trailing: Arc<TrailingStopEngine>,
    pub journal: Arc<SignalJournal>,
    pub copier: SignalCopier,
}

impl Stack {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::in_dir(dir)
    }

    pub fn in_dir(dir: tempfile::TempDir) -> Self {
        let cfg = test_config(dir.path());
        let broker = Arc::new(PaperBroker::with_default_catalog(cfg.initial_balance));
        let resolver = Arc::new(SymbolResolver::new(broker.clone()));
        let book = Arc::new(PositionBook::open(cfg.trades_file()));
        let executor = Arc::new(OrderExecutor::new(
            broker.clone(),
            resolver.clone(),
            book.clone(),
            &cfg,
        ));
        let retry = Arc::new(RetryCoordinator::new(executor.clone(), &cfg));
        let trailing = Arc::new(TrailingStopEngine::new(broker.clone(), book.clone(), &cfg));
        let journal = Arc::new(SignalJournal::open(cfg.signals_file()));
        let config = cfg.shared();
        let copier = SignalCopier::new(config.clone(), journal.clone(), retry.clone());
        Self {
            dir,
            config,
            broker,
            resolver,
            book,
            executor,
            retry,
            trailing,
            journal,
            copier,
        }
    }
}
