use std::sync::Arc;
use tracing::{error, info, warn};

use crate::broker::{
    Broker, BrokerOrderType, FillPolicy, OrderRequest, RetCode, SymbolInfo, Tick, TradeAction,
};
use crate::config::Config;
use crate::models::{OrderType, Signal};
use crate::trading::position_book::PositionBook;
use crate::trading::symbol_resolver::SymbolResolver;
use crate::trading::trade_record::TradeRecord;
use crate::trading::validator::{TradeValidator, ValidationRequest, ValidationResult};

/// Broker comments are limited to 31 ASCII characters.
pub const MAX_COMMENT_LEN: usize = 31;
/// Pending prices may sit this fraction on the wrong side of the market.
pub const PENDING_SIDE_TOLERANCE: f64 = 0.001;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub ticket: Option<u64>,
    pub price: Option<f64>,
    pub actual_symbol: Option<String>,
    pub error: Option<String>,
    /// Set when the failure came back from the trade server.
    pub error_code: Option<RetCode>,
}

impl ExecutionResult {
    fn failed(error: impl Into<String>, code: Option<RetCode>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            error_code: code,
            ..Self::default()
        }
    }
}

/// ASCII-only order comment that fits the broker's length limit.
pub fn order_comment(signal: &Signal) -> String {
    let raw = match signal.channel_name() {
        Some(channel) => format!("Signal: {} from {}", signal.symbol(), channel),
        None => format!("Signal: {}", signal.symbol()),
    };
    raw.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .take(MAX_COMMENT_LEN)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Checks that a pending price sits on the side of the market its order type
/// needs, allowing a small tolerance band.
pub fn pending_side_ok(order_type: OrderType, price: f64, tick: &Tick) -> Result<(), String> {
    let ok = match order_type {
        OrderType::BuyLimit => price <= tick.ask * (1.0 + PENDING_SIDE_TOLERANCE),
        OrderType::SellLimit => price >= tick.bid * (1.0 - PENDING_SIDE_TOLERANCE),
        OrderType::BuyStop => price >= tick.ask * (1.0 - PENDING_SIDE_TOLERANCE),
        OrderType::SellStop => price <= tick.bid * (1.0 + PENDING_SIDE_TOLERANCE),
        OrderType::Market => true,
    };
    if ok {
        return Ok(());
    }
    let (side, reference) = match order_type {
        OrderType::BuyLimit => ("below the ask", tick.ask),
        OrderType::SellLimit => ("above the bid", tick.bid),
        OrderType::BuyStop => ("above the ask", tick.ask),
        _ => ("below the bid", tick.bid),
    };
    Err(format!(
        "{} price {} must be {} {}",
        order_type, price, side, reference
    ))
}

/// Builds and submits orders, then hands successful ones to the position book.
pub struct OrderExecutor {
    broker: Arc<dyn Broker>,
    validator: TradeValidator,
    book: Arc<PositionBook>,
    deviation: u32,
    magic: u64,
}

impl OrderExecutor {
    pub fn new(
        broker: Arc<dyn Broker>,
        resolver: Arc<SymbolResolver>,
        book: Arc<PositionBook>,
        cfg: &Config,
    ) -> Self {
        Self {
            validator: TradeValidator::new(broker.clone(), resolver),
            broker,
            book,
            deviation: cfg.deviation,
            magic: cfg.magic_number,
        }
    }

    pub fn validator(&self) -> &TradeValidator {
        &self.validator
    }

    pub fn book(&self) -> &Arc<PositionBook> {
        &self.book
    }

    pub async fn submit(&self, signal: &Signal, lot_size: f64) -> ExecutionResult {
        if let Err(result) = self.check_terminal().await {
            return result;
        }
        let result = if signal.order_type().is_pending() {
            self.submit_pending(signal, lot_size).await
        } else {
            self.submit_market(signal, lot_size).await
        };
        match (result.success, &result.error) {
            (true, _) => info!(
                "Order placed: {} #{} @ {}",
                signal.summary(),
                result.ticket.unwrap_or_default(),
                result.price.unwrap_or_default()
            ),
            (false, Some(e)) => error!("Order failed for {}: {}", signal.symbol(), e),
            (false, None) => error!("Order failed for {}", signal.symbol()),
        }
        result
    }

    async fn check_terminal(&self) -> Result<(), ExecutionResult> {
        match self.broker.terminal_info().await {
            Ok(t) if !t.connected => Err(ExecutionResult::failed(
                "Trading terminal is not connected",
                None,
            )),
            Ok(t) if !t.trade_allowed => Err(ExecutionResult::failed(
                "Automated trading is disabled in the terminal",
                Some(RetCode::AutoTradingDisabled),
            )),
            Ok(_) => Ok(()),
            Err(e) => Err(ExecutionResult::failed(e.to_string(), None)),
        }
    }

    fn request_for(signal: &Signal, lot_size: f64, entry: Option<f64>) -> ValidationRequest {
        ValidationRequest {
            symbol: signal.symbol().to_string(),
            action: signal.action(),
            lot_size,
            entry_price: entry,
            stop_loss: signal.stop_loss(),
            // The furthest target rests at the broker; the trailing engine
            // manages the ones before it.
            take_profit: signal.take_profits().last().copied(),
            order_type: signal.order_type(),
        }
    }

    async fn validated(
        &self,
        req: &ValidationRequest,
    ) -> Result<(String, SymbolInfo, Tick), ExecutionResult> {
        let v: ValidationResult = self.validator.validate(req).await;
        for warning in &v.warnings {
            warn!("{}", warning);
        }
        if !v.valid {
            return Err(ExecutionResult {
                actual_symbol: v.symbol.clone(),
                ..ExecutionResult::failed(v.errors.join("; "), None)
            });
        }
        match (v.symbol, v.symbol_info, v.tick) {
            (Some(symbol), Some(info), Some(tick)) => {
                self.activate(&symbol, &info).await?;
                Ok((symbol, info, tick))
            }
            _ => Err(ExecutionResult::failed("Validation returned no market data", None)),
        }
    }

    async fn activate(&self, symbol: &str, info: &SymbolInfo) -> Result<(), ExecutionResult> {
        if info.visible {
            return Ok(());
        }
        match self.broker.symbol_select(symbol, true).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ExecutionResult::failed(
                format!("Failed to activate symbol {}", symbol),
                None,
            )),
            Err(e) => Err(ExecutionResult::failed(
                format!("Failed to activate symbol {}: {}", symbol, e),
                None,
            )),
        }
    }

    async fn submit_market(&self, signal: &Signal, lot_size: f64) -> ExecutionResult {
        let req = Self::request_for(signal, lot_size, signal.entry_price());
        let (symbol, _info, tick) = match self.validated(&req).await {
            Ok(v) => v,
            Err(result) => return result,
        };

        let price = tick.entry_price(signal.action());
        let order = OrderRequest {
            action: TradeAction::Deal,
            symbol: symbol.clone(),
            volume: lot_size,
            order_type: Some(BrokerOrderType::from_signal(signal.action(), OrderType::Market)),
            price,
            sl: req.stop_loss,
            tp: req.take_profit.unwrap_or(0.0),
            deviation: self.deviation,
            magic: self.magic,
            comment: order_comment(signal),
            filling: Some(FillPolicy::Ioc),
            position: None,
        };
        self.send(signal, lot_size, symbol, order, price).await
    }

    async fn submit_pending(&self, signal: &Signal, lot_size: f64) -> ExecutionResult {
        let Some(entry) = signal.entry_price() else {
            return ExecutionResult::failed(
                format!("{} orders need a single entry price", signal.order_type()),
                None,
            );
        };
        let req = Self::request_for(signal, lot_size, Some(entry));
        let (symbol, info, tick) = match self.validated(&req).await {
            Ok(v) => v,
            Err(result) => return result,
        };
        if let Err(e) = pending_side_ok(signal.order_type(), entry, &tick) {
            return ExecutionResult {
                actual_symbol: Some(symbol),
                ..ExecutionResult::failed(e, None)
            };
        }

        let order = OrderRequest {
            action: TradeAction::Pending,
            symbol: symbol.clone(),
            volume: lot_size,
            order_type: Some(BrokerOrderType::from_signal(signal.action(), signal.order_type())),
            price: entry,
            sl: req.stop_loss,
            tp: req.take_profit.unwrap_or(0.0),
            deviation: self.deviation,
            magic: self.magic,
            comment: order_comment(signal),
            filling: Some(FillPolicy::supported_by(&info)),
            position: None,
        };
        self.send(signal, lot_size, symbol, order, entry).await
    }

    async fn send(
        &self,
        signal: &Signal,
        lot_size: f64,
        symbol: String,
        order: OrderRequest,
        requested_price: f64,
    ) -> ExecutionResult {
        let reply = match self.broker.order_send(&order).await {
            Ok(reply) => reply,
            Err(e) => {
                return ExecutionResult {
                    actual_symbol: Some(symbol),
                    ..ExecutionResult::failed(e.to_string(), None)
                }
            }
        };
        if !reply.retcode.is_success() {
            return ExecutionResult {
                actual_symbol: Some(symbol),
                ..ExecutionResult::failed(
                    format!("Order rejected: {}", reply.retcode),
                    Some(reply.retcode),
                )
            };
        }

        let price = if reply.price > 0.0 {
            reply.price
        } else {
            requested_price
        };
        self.book.insert(TradeRecord::new(
            reply.order,
            signal.clone(),
            symbol.clone(),
            price,
            lot_size,
        ));
        ExecutionResult {
            success: true,
            ticket: Some(reply.order),
            price: Some(price),
            actual_symbol: Some(symbol),
            error: None,
            error_code: None,
        }
    }
}
