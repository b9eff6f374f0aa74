use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
        }
    }

    /// +1 for BUY, -1 for SELL. Multiplying a price offset by this moves it
    /// in the trade's favour.
    pub fn sign(&self) -> f64 {
        match self {
            Action::Buy => 1.0,
            Action::Sell => -1.0,
        }
    }

    /// True when `price` has reached `target` in the profitable direction.
    pub fn reached(&self, price: f64, target: f64) -> bool {
        match self {
            Action::Buy => price >= target,
            Action::Sell => price <= target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::BuyLimit => write!(f, "BUY_LIMIT"),
            OrderType::SellLimit => write!(f, "SELL_LIMIT"),
            OrderType::BuyStop => write!(f, "BUY_STOP"),
            OrderType::SellStop => write!(f, "SELL_STOP"),
        }
    }
}

impl OrderType {
    pub fn is_pending(&self) -> bool {
        !matches!(self, OrderType::Market)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pending,
    Executed,
    Failed,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStatus::Pending => write!(f, "pending"),
            SignalStatus::Executed => write!(f, "executed"),
            SignalStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "open"),
            TradeStatus::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Retrying,
    MarketClosed,
    AwaitingManualFix,
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingStatus::Retrying => write!(f, "retrying"),
            PendingStatus::MarketClosed => write!(f, "market_closed"),
            PendingStatus::AwaitingManualFix => write!(f, "awaiting_manual_fix"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reached_respects_direction() {
        assert!(Action::Buy.reached(101.0, 100.0));
        assert!(Action::Buy.reached(100.0, 100.0));
        assert!(!Action::Buy.reached(99.9, 100.0));
        assert!(Action::Sell.reached(99.0, 100.0));
        assert!(!Action::Sell.reached(100.1, 100.0));
    }

    #[test]
    fn order_type_serializes_screaming() {
        let json = serde_json::to_string(&OrderType::SellLimit).unwrap();
        assert_eq!(json, "\"SELL_LIMIT\"");
        assert!(OrderType::BuyStop.is_pending());
        assert!(!OrderType::Market.is_pending());
    }
}
