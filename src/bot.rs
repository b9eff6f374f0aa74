use anyhow::Result;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use signal_copy_bot::broker::Broker;
use signal_copy_bot::config::SharedConfig;
use signal_copy_bot::copier::SignalCopier;
use signal_copy_bot::messaging::{ChannelMessage, MessageSource};
use signal_copy_bot::shutdown::Shutdown;
use signal_copy_bot::trading::statistics::{account_snapshot, log_summary, today_statistics};
use signal_copy_bot::trading::{
    OrderExecutor, PositionBook, RetryCoordinator, SignalJournal, SymbolResolver,
    TrailingStopEngine,
};

pub struct SignalBot {
    config: SharedConfig,
    broker: Arc<dyn Broker>,
    book: Arc<PositionBook>,
    retry: Arc<RetryCoordinator>,
    trailing: Arc<TrailingStopEngine>,
    copier: SignalCopier,
    source: Box<dyn MessageSource>,
    shutdown: Shutdown,
    retry_task: Option<JoinHandle<()>>,
}

impl SignalBot {
    pub async fn new(
        config: SharedConfig,
        broker: Arc<dyn Broker>,
        source: Box<dyn MessageSource>,
    ) -> Self {
        let cfg = config.read().await;

        info!("{}", "=".repeat(60));
        info!("Signal copy bot starting up");
        info!("Broker: {}", cfg.broker_mode);
        if cfg.active_channels.is_empty() {
            info!("Channels: all");
        } else {
            info!("Channels: {}", cfg.active_channels.join(", "));
        }
        info!(
            "Auto trade: {} | Lot: {} | Trailing stop: {}",
            cfg.settings.auto_trade, cfg.settings.default_lot_size, cfg.settings.enable_trailing_stop
        );
        info!("Data dir: {}", cfg.data_dir);
        info!("{}", "=".repeat(60));

        let book = Arc::new(PositionBook::open(cfg.trades_file()));
        let resolver = Arc::new(SymbolResolver::new(broker.clone()));
        let executor = Arc::new(OrderExecutor::new(
            broker.clone(),
            resolver,
            book.clone(),
            &cfg,
        ));
        let retry = Arc::new(RetryCoordinator::new(executor, &cfg));
        let trailing = Arc::new(TrailingStopEngine::new(broker.clone(), book.clone(), &cfg));
        let journal = Arc::new(SignalJournal::open(cfg.signals_file()));

        drop(cfg);

        let copier = SignalCopier::new(config.clone(), journal, retry.clone());

        Self {
            config,
            broker,
            book,
            retry,
            trailing,
            copier,
            source,
            shutdown: Shutdown::new(),
            retry_task: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let (trailing_enabled, retry_poll) = {
            let cfg = self.config.read().await;
            (
                cfg.settings.enable_trailing_stop,
                Duration::from_millis(cfg.retry_poll_millis),
            )
        };

        if trailing_enabled {
            self.trailing.start();
        }
        let retry = self.retry.clone();
        let shutdown = self.shutdown.clone();
        self.retry_task = Some(tokio::spawn(async move { retry.run(retry_poll, shutdown).await }));

        info!("Bot is now running. Press Ctrl+C to stop.");
        info!("Type /retry or /retry SYMBOL to resubmit queued trades.");
        self.print_status().await;

        let mut source_open = true;
        loop {
            let next = if source_open {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    msg = self.source.next_message() => msg,
                }
            } else {
                let _ = tokio::signal::ctrl_c().await;
                break;
            };

            match next {
                Ok(Some(msg)) => self.handle(msg).await,
                Ok(None) => {
                    info!("Message source closed; managing open trades until Ctrl+C");
                    source_open = false;
                }
                Err(e) => {
                    error!("Message source failed: {:#}", e);
                    source_open = false;
                }
            }
        }

        self.stop().await;
        Ok(())
    }

    async fn handle(&self, msg: ChannelMessage) {
        let outcome = self.copier.handle(&msg).await;
        tracing::debug!("{} -> {:?}", msg.channel, outcome);
    }

    async fn print_status(&self) {
        let tz_name = self.config.read().await.stats_timezone.clone();
        let tz: Tz = tz_name.parse().unwrap_or_else(|_| {
            warn!("Unknown timezone {}, using UTC", tz_name);
            Tz::UTC
        });

        let stats = match today_statistics(self.broker.as_ref(), tz, None).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Statistics unavailable: {}", e);
                return;
            }
        };
        let account = account_snapshot(self.broker.as_ref()).await.ok();
        log_summary(&stats, account.as_ref());
        info!(
            "Open trades: {} | Pending retries: {}",
            self.book.active_count(),
            self.retry.len()
        );
    }

    async fn stop(&mut self) {
        info!("Shutting down...");
        self.shutdown.trigger();
        self.trailing.stop().await;

        let timeout = Duration::from_secs(self.config.read().await.shutdown_timeout_secs);
        if let Some(task) = self.retry_task.take() {
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!("Retry coordinator did not stop within {:?}", timeout);
            }
        }

        self.print_status().await;
        info!("Bot stopped.");
    }
}
