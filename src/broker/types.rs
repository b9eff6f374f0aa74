use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broker::retcode::RetCode;
use crate::models::{Action, OrderType};

pub const FILLING_FOK: u32 = 1;
pub const FILLING_IOC: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
    Disabled,
    LongOnly,
    ShortOnly,
    CloseOnly,
    Full,
}

impl TradeMode {
    pub fn permits(&self, action: Action) -> bool {
        match self {
            TradeMode::Full => true,
            TradeMode::LongOnly => action == Action::Buy,
            TradeMode::ShortOnly => action == Action::Sell,
            TradeMode::Disabled | TradeMode::CloseOnly => false,
        }
    }
}

/// Live symbol metadata as reported by the trading terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub visible: bool,
    pub trade_mode: TradeMode,
    /// Expert advisors / API clients may trade this symbol.
    pub trade_expert: bool,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    /// Minimum distance of stops from the price, in points.
    pub stops_level: u32,
    pub digits: u32,
    pub point: f64,
    /// Current spread, in points.
    pub spread: u32,
    /// Bit flags of supported filling policies (FILLING_FOK | FILLING_IOC).
    #[serde(default)]
    pub filling_mode: u32,
    #[serde(default = "default_contract_size")]
    pub contract_size: f64,
}

fn default_contract_size() -> f64 {
    1.0
}

impl SymbolInfo {
    pub fn spread_price(&self) -> f64 {
        self.spread as f64 * self.point
    }

    pub fn min_stop_distance(&self) -> f64 {
        self.stops_level as f64 * self.point
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl Tick {
    /// Price at which an order in `action` direction would be filled.
    pub fn entry_price(&self, action: Action) -> f64 {
        match action {
            Action::Buy => self.ask,
            Action::Sell => self.bid,
        }
    }

    /// Price at which a position in `action` direction would be closed.
    pub fn exit_price(&self, action: Action) -> f64 {
        match action {
            Action::Buy => self.bid,
            Action::Sell => self.ask,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalInfo {
    pub connected: bool,
    /// The terminal's global "Algo Trading" switch.
    pub trade_allowed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    /// Immediate market execution.
    Deal,
    /// Place a pending order.
    Pending,
    /// Modify stop-loss / take-profit of an open position.
    Sltp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOrderType {
    Buy,
    Sell,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
}

impl BrokerOrderType {
    pub fn from_signal(action: Action, order_type: OrderType) -> Self {
        match (order_type, action) {
            (OrderType::Market, Action::Buy) => BrokerOrderType::Buy,
            (OrderType::Market, Action::Sell) => BrokerOrderType::Sell,
            (OrderType::BuyLimit, _) => BrokerOrderType::BuyLimit,
            (OrderType::SellLimit, _) => BrokerOrderType::SellLimit,
            (OrderType::BuyStop, _) => BrokerOrderType::BuyStop,
            (OrderType::SellStop, _) => BrokerOrderType::SellStop,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            BrokerOrderType::Buy | BrokerOrderType::BuyLimit | BrokerOrderType::BuyStop => {
                Action::Buy
            }
            BrokerOrderType::Sell | BrokerOrderType::SellLimit | BrokerOrderType::SellStop => {
                Action::Sell
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    Fok,
    Ioc,
    Return,
}

impl FillPolicy {
    /// Picks a policy the symbol supports, preferring fill-or-kill.
    pub fn supported_by(info: &SymbolInfo) -> Self {
        if info.filling_mode & FILLING_FOK != 0 {
            FillPolicy::Fok
        } else if info.filling_mode & FILLING_IOC != 0 {
            FillPolicy::Ioc
        } else {
            FillPolicy::Return
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub action: TradeAction,
    pub symbol: String,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub order_type: Option<BrokerOrderType>,
    #[serde(default)]
    pub price: f64,
    pub sl: f64,
    pub tp: f64,
    #[serde(default)]
    pub deviation: u32,
    pub magic: u64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub filling: Option<FillPolicy>,
    /// Target position for `TradeAction::Sltp`.
    #[serde(default)]
    pub position: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub retcode: RetCode,
    /// Order ticket; for market deals this is also the position ticket.
    #[serde(default)]
    pub order: u64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub side: Action,
    pub volume: f64,
    pub price_open: f64,
    pub price_current: f64,
    pub sl: f64,
    pub tp: f64,
    #[serde(default)]
    pub profit: f64,
    pub time: DateTime<Utc>,
}

/// A pending order resting at the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub ticket: u64,
    pub symbol: String,
    pub order_type: BrokerOrderType,
    pub volume: f64,
    pub price: f64,
    pub sl: f64,
    pub tp: f64,
}

impl PendingOrder {
    /// True when `tick` reaches the order's activation price.
    pub fn triggered_by(&self, tick: &Tick) -> bool {
        match self.order_type {
            BrokerOrderType::BuyLimit => tick.ask <= self.price,
            BrokerOrderType::SellLimit => tick.bid >= self.price,
            BrokerOrderType::BuyStop => tick.ask >= self.price,
            BrokerOrderType::SellStop => tick.bid <= self.price,
            BrokerOrderType::Buy | BrokerOrderType::Sell => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub ticket: u64,
    #[serde(default)]
    pub position: u64,
    pub symbol: String,
    pub profit: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: u64,
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub margin_free: f64,
    pub profit: f64,
    pub leverage: u32,
    #[serde(default)]
    pub currency: String,
}
