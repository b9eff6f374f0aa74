use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broker::retcode::RetCode;
use crate::models::{PendingStatus, Signal, TradeStatus};

/// A position opened from a signal. Only the trailing-stop engine mutates
/// `current_tp_index` and `status`, and only through the position book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ticket: u64,
    pub signal: Signal,
    pub actual_symbol: String,
    pub entry_price: f64,
    pub lot_size: f64,
    /// Number of take-profit levels already crossed.
    #[serde(default)]
    pub current_tp_index: usize,
    pub status: TradeStatus,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl TradeRecord {
    pub fn new(
        ticket: u64,
        signal: Signal,
        actual_symbol: impl Into<String>,
        entry_price: f64,
        lot_size: f64,
    ) -> Self {
        Self {
            ticket,
            signal,
            actual_symbol: actual_symbol.into(),
            entry_price,
            lot_size,
            current_tp_index: 0,
            status: TradeStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    /// The next take-profit level that has not been crossed yet.
    pub fn next_take_profit(&self) -> Option<f64> {
        self.signal
            .take_profits()
            .get(self.current_tp_index)
            .copied()
    }
}

/// A signal whose submission failed and may be resubmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTrade {
    pub signal: Signal,
    pub lot_size: f64,
    pub retry_count: u32,
    pub last_error: String,
    #[serde(default)]
    pub error_code: Option<RetCode>,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
    /// None while the entry waits for an operator (autotrading disabled).
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl PendingTrade {
    pub fn symbol(&self) -> &str {
        self.signal.symbol()
    }

    pub fn requires_manual_fix(&self) -> bool {
        self.status == PendingStatus::AwaitingManualFix
    }
}
