//! Trade server return codes.
//!
//! Every code the server can answer with maps to one variant, a human
//! readable message and a [`RetryClass`]. The retry coordinator decides
//! exclusively from [`RetCode::retry_class`].

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum RetCode {
    Requote,
    Rejected,
    Cancelled,
    Placed,
    Done,
    DonePartial,
    Error,
    Timeout,
    InvalidRequest,
    InvalidVolume,
    InvalidPrice,
    InvalidStops,
    TradeDisabled,
    MarketClosed,
    NoMoney,
    PriceChanged,
    PriceOff,
    InvalidExpiration,
    OrderChanged,
    TooManyRequests,
    NoChanges,
    ServerDisablesAutoTrading,
    AutoTradingDisabled,
    Locked,
    Frozen,
    InvalidFill,
    Connection,
    OnlyReal,
    LimitOrders,
    LimitVolume,
    InvalidOrder,
    PositionClosed,
    Unknown(u32),
}

/// How a failed submission should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    /// The request went through.
    Done,
    /// Retrying cannot help.
    Permanent,
    /// Retry once after the market-closed delay.
    DelayedRetry,
    /// Wait for the operator, then retry on demand.
    ManualIntervention,
    /// Retry after the short generic delay.
    Transient,
}

impl RetCode {
    pub fn code(&self) -> u32 {
        match *self {
            RetCode::Requote => 10004,
            RetCode::Rejected => 10006,
            RetCode::Cancelled => 10007,
            RetCode::Placed => 10008,
            RetCode::Done => 10009,
            RetCode::DonePartial => 10010,
            RetCode::Error => 10011,
            RetCode::Timeout => 10012,
            RetCode::InvalidRequest => 10013,
            RetCode::InvalidVolume => 10014,
            RetCode::InvalidPrice => 10015,
            RetCode::InvalidStops => 10016,
            RetCode::TradeDisabled => 10017,
            RetCode::MarketClosed => 10018,
            RetCode::NoMoney => 10019,
            RetCode::PriceChanged => 10020,
            RetCode::PriceOff => 10021,
            RetCode::InvalidExpiration => 10022,
            RetCode::OrderChanged => 10023,
            RetCode::TooManyRequests => 10024,
            RetCode::NoChanges => 10025,
            RetCode::ServerDisablesAutoTrading => 10026,
            RetCode::AutoTradingDisabled => 10027,
            RetCode::Locked => 10028,
            RetCode::Frozen => 10029,
            RetCode::InvalidFill => 10030,
            RetCode::Connection => 10031,
            RetCode::OnlyReal => 10032,
            RetCode::LimitOrders => 10033,
            RetCode::LimitVolume => 10034,
            RetCode::InvalidOrder => 10035,
            RetCode::PositionClosed => 10036,
            RetCode::Unknown(code) => code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.retry_class() == RetryClass::Done
    }

    pub fn retry_class(&self) -> RetryClass {
        match self {
            RetCode::Done | RetCode::Placed | RetCode::DonePartial => RetryClass::Done,
            RetCode::NoMoney => RetryClass::Permanent,
            RetCode::MarketClosed => RetryClass::DelayedRetry,
            RetCode::AutoTradingDisabled | RetCode::ServerDisablesAutoTrading => {
                RetryClass::ManualIntervention
            }
            RetCode::Requote
            | RetCode::Rejected
            | RetCode::Cancelled
            | RetCode::Error
            | RetCode::Timeout
            | RetCode::InvalidRequest
            | RetCode::InvalidVolume
            | RetCode::InvalidPrice
            | RetCode::InvalidStops
            | RetCode::TradeDisabled
            | RetCode::PriceChanged
            | RetCode::PriceOff
            | RetCode::InvalidExpiration
            | RetCode::OrderChanged
            | RetCode::TooManyRequests
            | RetCode::NoChanges
            | RetCode::Locked
            | RetCode::Frozen
            | RetCode::InvalidFill
            | RetCode::Connection
            | RetCode::OnlyReal
            | RetCode::LimitOrders
            | RetCode::LimitVolume
            | RetCode::InvalidOrder
            | RetCode::PositionClosed
            | RetCode::Unknown(_) => RetryClass::Transient,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RetCode::Requote => "requote",
            RetCode::Rejected => "request rejected",
            RetCode::Cancelled => "request cancelled by trader",
            RetCode::Placed => "order placed",
            RetCode::Done => "request completed",
            RetCode::DonePartial => "request partially completed",
            RetCode::Error => "request processing error",
            RetCode::Timeout => "request timed out",
            RetCode::InvalidRequest => "invalid request",
            RetCode::InvalidVolume => "invalid volume",
            RetCode::InvalidPrice => "invalid price",
            RetCode::InvalidStops => "invalid stops",
            RetCode::TradeDisabled => "trading disabled for symbol",
            RetCode::MarketClosed => "market closed",
            RetCode::NoMoney => "insufficient funds",
            RetCode::PriceChanged => "price changed",
            RetCode::PriceOff => "no quotes to process the request",
            RetCode::InvalidExpiration => "invalid order expiration",
            RetCode::OrderChanged => "order state changed",
            RetCode::TooManyRequests => "too many requests",
            RetCode::NoChanges => "no changes in request",
            RetCode::ServerDisablesAutoTrading => "autotrading disabled by server",
            RetCode::AutoTradingDisabled => "autotrading disabled in terminal",
            RetCode::Locked => "request locked for processing",
            RetCode::Frozen => "order or position frozen",
            RetCode::InvalidFill => "unsupported filling mode",
            RetCode::Connection => "no connection to trade server",
            RetCode::OnlyReal => "operation allowed only for live accounts",
            RetCode::LimitOrders => "pending order limit reached",
            RetCode::LimitVolume => "volume limit for symbol reached",
            RetCode::InvalidOrder => "invalid or prohibited order type",
            RetCode::PositionClosed => "position already closed",
            RetCode::Unknown(_) => "unknown trade server error",
        }
    }
}

impl From<u32> for RetCode {
    fn from(code: u32) -> Self {
        match code {
            10004 => RetCode::Requote,
            10006 => RetCode::Rejected,
            10007 => RetCode::Cancelled,
            10008 => RetCode::Placed,
            10009 => RetCode::Done,
            10010 => RetCode::DonePartial,
            10011 => RetCode::Error,
            10012 => RetCode::Timeout,
            10013 => RetCode::InvalidRequest,
            10014 => RetCode::InvalidVolume,
            10015 => RetCode::InvalidPrice,
            10016 => RetCode::InvalidStops,
            10017 => RetCode::TradeDisabled,
            10018 => RetCode::MarketClosed,
            10019 => RetCode::NoMoney,
            10020 => RetCode::PriceChanged,
            10021 => RetCode::PriceOff,
            10022 => RetCode::InvalidExpiration,
            10023 => RetCode::OrderChanged,
            10024 => RetCode::TooManyRequests,
            10025 => RetCode::NoChanges,
            10026 => RetCode::ServerDisablesAutoTrading,
            10027 => RetCode::AutoTradingDisabled,
            10028 => RetCode::Locked,
            10029 => RetCode::Frozen,
            10030 => RetCode::InvalidFill,
            10031 => RetCode::Connection,
            10032 => RetCode::OnlyReal,
            10033 => RetCode::LimitOrders,
            10034 => RetCode::LimitVolume,
            10035 => RetCode::InvalidOrder,
            10036 => RetCode::PositionClosed,
            other => RetCode::Unknown(other),
        }
    }
}

impl From<RetCode> for u32 {
    fn from(rc: RetCode) -> Self {
        rc.code()
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}
