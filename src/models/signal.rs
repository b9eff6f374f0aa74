use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Action, OrderType, SignalStatus};

/// Entry instruction of a signal: a single price or an inclusive (min, max) zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry {
    Price(f64),
    Range(f64, f64),
}

impl Entry {
    /// Builds a range with its bounds ordered.
    pub fn range(a: f64, b: f64) -> Self {
        Entry::Range(a.min(b), a.max(b))
    }

    /// Price used for directional checks: the price itself or the zone midpoint.
    pub fn reference(&self) -> f64 {
        match *self {
            Entry::Price(p) => p,
            Entry::Range(lo, hi) => (lo + hi) / 2.0,
        }
    }

    pub fn price(&self) -> Option<f64> {
        match *self {
            Entry::Price(p) => Some(p),
            Entry::Range(..) => None,
        }
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        match *self {
            Entry::Price(_) => None,
            Entry::Range(lo, hi) => Some((lo, hi)),
        }
    }
}

/// A parsed trade instruction. Fields are private so a signal cannot be
/// altered after the parser accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    symbol: String,
    action: Action,
    order_type: OrderType,
    entry: Entry,
    take_profits: Vec<f64>,
    stop_loss: f64,
    #[serde(default)]
    channel_name: Option<String>,
    #[serde(default)]
    raw_message: String,
    timestamp: DateTime<Utc>,
}

impl Signal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        action: Action,
        order_type: OrderType,
        entry: Entry,
        take_profits: Vec<f64>,
        stop_loss: f64,
        channel_name: Option<String>,
        raw_message: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            action,
            order_type,
            entry,
            take_profits,
            stop_loss,
            channel_name,
            raw_message: raw_message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn entry(&self) -> Entry {
        self.entry
    }

    pub fn entry_price(&self) -> Option<f64> {
        self.entry.price()
    }

    pub fn entry_price_range(&self) -> Option<(f64, f64)> {
        self.entry.bounds()
    }

    pub fn reference_price(&self) -> f64 {
        self.entry.reference()
    }

    pub fn take_profits(&self) -> &[f64] {
        &self.take_profits
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.channel_name.as_deref()
    }

    pub fn raw_message(&self) -> &str {
        &self.raw_message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// One-line summary used in logs.
    pub fn summary(&self) -> String {
        let entry = match self.entry {
            Entry::Price(p) => format!("{}", p),
            Entry::Range(lo, hi) => format!("{}-{}", lo, hi),
        };
        let tps: Vec<String> = self.take_profits.iter().map(|t| t.to_string()).collect();
        format!(
            "{} {} {} @ {} TP [{}] SL {}",
            self.symbol,
            self.action,
            self.order_type,
            entry,
            tps.join(", "),
            self.stop_loss
        )
    }
}

/// Journal entry for a received signal and what became of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEntry {
    pub signal: Signal,
    pub status: SignalStatus,
    #[serde(default)]
    pub ticket: Option<u64>,
    #[serde(default)]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_orders_bounds_and_midpoint() {
        let e = Entry::range(3345.0, 3343.0);
        assert_eq!(e.bounds(), Some((3343.0, 3345.0)));
        assert!((e.reference() - 3344.0).abs() < 1e-9);
        assert_eq!(e.price(), None);
    }

    #[test]
    fn signal_roundtrips_through_json() {
        let s = Signal::new(
            "XAUUSD",
            Action::Sell,
            OrderType::SellLimit,
            Entry::Price(4078.0),
            vec![4046.0, 4056.0, 4068.0],
            4093.0,
            Some("gold room".to_string()),
            "Gold sell limit",
        );
        let json = serde_json::to_string(&s).unwrap();
        let back: Signal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
