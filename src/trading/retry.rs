use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::broker::{RetCode, RetryClass};
use crate::config::Config;
use crate::models::{PendingStatus, Signal};
use crate::shutdown::Shutdown;
use crate::trading::executor::{ExecutionResult, OrderExecutor};
use crate::trading::trade_record::PendingTrade;

/// What happened to a signal after a submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Completed,
    Scheduled {
        retry_count: u32,
        at: DateTime<Utc>,
    },
    AwaitingManualFix,
    GivenUp,
}

/// Owns the failed-submission queue, at most one entry per symbol.
///
/// Entries are retried by a single poll loop once their `next_attempt_at`
/// passes. An entry is taken out of the queue while its attempt is in flight
/// and put back (or dropped) by [`RetryCoordinator::record_outcome`].
pub struct RetryCoordinator {
    executor: Arc<OrderExecutor>,
    pending: Mutex<BTreeMap<String, PendingTrade>>,
    path: PathBuf,
    retry_delay: ChronoDuration,
    market_closed_delay: ChronoDuration,
    max_attempts: u32,
    spacing: Duration,
}

impl RetryCoordinator {
    pub fn new(executor: Arc<OrderExecutor>, cfg: &Config) -> Self {
        let path = cfg.pending_file();
        let pending = load_pending(&path);
        if !pending.is_empty() {
            info!("Loaded {} pending trades from {}", pending.len(), path.display());
        }
        Self {
            executor,
            pending: Mutex::new(pending),
            path,
            retry_delay: ChronoDuration::seconds(cfg.retry_delay_secs as i64),
            market_closed_delay: ChronoDuration::seconds(cfg.market_closed_delay_secs as i64),
            max_attempts: cfg.max_retry_attempts,
            spacing: Duration::from_millis(cfg.retry_all_spacing_ms),
        }
    }

    fn save_locked(&self, pending: &BTreeMap<String, PendingTrade>) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let entries: Vec<&PendingTrade> = pending.values().collect();
        if let Ok(json) = serde_json::to_string_pretty(&entries) {
            if let Err(e) = fs::write(&self.path, json) {
                warn!("Failed to save {}: {}", self.path.display(), e);
            }
        }
    }

    pub fn pending(&self) -> Vec<PendingTrade> {
        self.pending.lock().values().cloned().collect()
    }

    pub fn get(&self, symbol: &str) -> Option<PendingTrade> {
        self.pending.lock().get(symbol).cloned()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drops the entry for `symbol` without retrying it.
    pub fn remove(&self, symbol: &str) -> Option<PendingTrade> {
        let mut pending = self.pending.lock();
        let removed = pending.remove(symbol);
        if removed.is_some() {
            self.save_locked(&pending);
        }
        removed
    }

    fn take(&self, symbol: &str) -> Option<PendingTrade> {
        self.pending.lock().remove(symbol)
    }

    /// First submission of a freshly parsed signal.
    pub async fn submit(&self, signal: &Signal, lot_size: f64) -> ExecutionResult {
        let result = self.executor.submit(signal, lot_size).await;
        self.record_outcome(signal, lot_size, 0, &result, Utc::now());
        result
    }

    /// Files the result of an attempt that ran with `retry_count` retries
    /// already spent.
    pub fn record_outcome(
        &self,
        signal: &Signal,
        lot_size: f64,
        retry_count: u32,
        result: &ExecutionResult,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        let symbol = signal.symbol().to_string();
        let mut pending = self.pending.lock();

        if result.success {
            if pending.remove(&symbol).is_some() {
                info!("Pending trade for {} completed", symbol);
            }
            self.save_locked(&pending);
            return RetryDecision::Completed;
        }

        let error = result.error.clone().unwrap_or_else(|| "unknown error".to_string());
        let class = result
            .error_code
            .map(|c| c.retry_class())
            .unwrap_or(RetryClass::Transient);

        let decision = match class {
            RetryClass::ManualIntervention => {
                warn!(
                    "{}: automated trading is disabled; enable it and retry manually",
                    symbol
                );
                pending.insert(
                    symbol.clone(),
                    pending_entry(signal, lot_size, 0, &error, result.error_code, PendingStatus::AwaitingManualFix, None, now),
                );
                RetryDecision::AwaitingManualFix
            }
            RetryClass::Permanent => {
                error!("{}: {} (not retried)", symbol, error);
                pending.remove(&symbol);
                RetryDecision::GivenUp
            }
            RetryClass::DelayedRetry | RetryClass::Transient | RetryClass::Done => {
                let (status, delay) = if class == RetryClass::DelayedRetry {
                    (PendingStatus::MarketClosed, self.market_closed_delay)
                } else {
                    (PendingStatus::Retrying, self.retry_delay)
                };
                if retry_count < self.max_attempts {
                    let next = retry_count + 1;
                    let at = now + delay;
                    warn!(
                        "{}: {} (retry {}/{} in {}s)",
                        symbol,
                        error,
                        next,
                        self.max_attempts,
                        delay.num_seconds()
                    );
                    pending.insert(
                        symbol.clone(),
                        pending_entry(signal, lot_size, next, &error, result.error_code, status, Some(at), now),
                    );
                    RetryDecision::Scheduled {
                        retry_count: next,
                        at,
                    }
                } else {
                    error!(
                        "{}: giving up after {} retries: {}",
                        symbol, retry_count, error
                    );
                    pending.remove(&symbol);
                    RetryDecision::GivenUp
                }
            }
        };
        self.save_locked(&pending);
        decision
    }

    /// Runs every entry whose retry time has passed. Returns how many were
    /// attempted.
    pub async fn process_due(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<String> = self
            .pending
            .lock()
            .values()
            .filter(|p| p.next_attempt_at.is_some_and(|at| at <= now))
            .map(|p| p.symbol().to_string())
            .collect();

        let mut attempted = 0;
        for symbol in due {
            let Some(entry) = self.take(&symbol) else {
                continue;
            };
            info!(
                "Retrying {} (attempt {}/{})",
                symbol, entry.retry_count, self.max_attempts
            );
            let result = self.executor.submit(&entry.signal, entry.lot_size).await;
            self.record_outcome(&entry.signal, entry.lot_size, entry.retry_count, &result, Utc::now());
            attempted += 1;
        }
        attempted
    }

    /// Resubmits every queued entry now, oldest symbol first, with counts
    /// reset. Returns the number of successful submissions.
    pub async fn retry_all(&self) -> usize {
        let symbols: Vec<String> = self.pending.lock().keys().cloned().collect();
        if symbols.is_empty() {
            info!("No pending trades to retry");
            return 0;
        }
        info!("Retrying all {} pending trades", symbols.len());

        let mut succeeded = 0;
        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && !self.spacing.is_zero() {
                tokio::time::sleep(self.spacing).await;
            }
            if let Some(result) = self.manual_retry(symbol).await {
                if result.success {
                    succeeded += 1;
                }
            }
        }
        succeeded
    }

    /// Operator-triggered retry of one symbol with its count reset to zero.
    pub async fn manual_retry(&self, symbol: &str) -> Option<ExecutionResult> {
        let entry = self.take(symbol)?;
        info!("Manual retry for {}", symbol);
        let result = self.executor.submit(&entry.signal, entry.lot_size).await;
        self.record_outcome(&entry.signal, entry.lot_size, 0, &result, Utc::now());
        Some(result)
    }

    /// Poll loop; exits when `shutdown` fires.
    pub async fn run(self: Arc<Self>, poll: Duration, shutdown: Shutdown) {
        info!("Retry coordinator started");
        loop {
            if shutdown.is_triggered() {
                break;
            }
            self.process_due(Utc::now()).await;
            if !shutdown.sleep(poll).await {
                break;
            }
        }
        info!("Retry coordinator stopped");
    }
}

#[allow(clippy::too_many_arguments)]
fn pending_entry(
    signal: &Signal,
    lot_size: f64,
    retry_count: u32,
    error: &str,
    code: Option<RetCode>,
    status: PendingStatus,
    next_attempt_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> PendingTrade {
    PendingTrade {
        signal: signal.clone(),
        lot_size,
        retry_count,
        last_error: error.to_string(),
        error_code: code,
        status,
        created_at: now,
        next_attempt_at,
    }
}

fn load_pending(path: &Path) -> BTreeMap<String, PendingTrade> {
    let Ok(content) = fs::read_to_string(path) else {
        return BTreeMap::new();
    };
    match serde_json::from_str::<Vec<PendingTrade>>(&content) {
        Ok(entries) => entries
            .into_iter()
            .map(|p| (p.symbol().to_string(), p))
            .collect(),
        Err(e) => {
            warn!("Ignoring unreadable {}: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}
