use std::sync::Arc;
use tracing::debug;

use crate::broker::{Broker, SymbolInfo, Tick};
use crate::models::{Action, OrderType};
use crate::trading::symbol_resolver::SymbolResolver;

/// Spread above which a warning is attached, in points.
pub const SPREAD_WARNING_POINTS: u32 = 50;
/// Suggested stops are placed this many minimum distances away.
pub const STOP_SUGGESTION_FACTOR: f64 = 1.5;
const VOLUME_TOLERANCE: f64 = 1e-6;

/// An order as it would be submitted, before any broker checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRequest {
    pub symbol: String,
    pub action: Action,
    pub lot_size: f64,
    /// Required for pending orders; ignored for market orders.
    pub entry_price: Option<f64>,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub order_type: OrderType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub symbol: Option<String>,
    /// Market price the order would fill at (ask for BUY, bid for SELL).
    pub current_price: Option<f64>,
    pub min_stop_distance: f64,
    pub suggested_lot: Option<f64>,
    pub suggested_stop_loss: Option<f64>,
    pub suggested_take_profit: Option<f64>,
    pub symbol_info: Option<SymbolInfo>,
    pub tick: Option<Tick>,
}

impl ValidationResult {
    fn fail(mut self, error: String) -> Self {
        self.errors.push(error);
        self.valid = false;
        self
    }
}

fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

fn step_decimals(step: f64) -> u32 {
    let mut decimals = 0;
    let mut scaled = step;
    while decimals < 8 && (scaled - scaled.round()).abs() > VOLUME_TOLERANCE {
        scaled *= 10.0;
        decimals += 1;
    }
    decimals
}

/// Nearest multiple of the volume step, clamped to the broker's bounds.
pub fn nearest_valid_lot(lot: f64, info: &SymbolInfo) -> f64 {
    let step = if info.volume_step > 0.0 { info.volume_step } else { 0.01 };
    let snapped = (lot / step).round() * step;
    round_to(snapped.clamp(info.volume_min, info.volume_max), step_decimals(step))
}

/// Checks an order against live broker constraints without submitting it.
pub struct TradeValidator {
    broker: Arc<dyn Broker>,
    resolver: Arc<SymbolResolver>,
}

impl TradeValidator {
    pub fn new(broker: Arc<dyn Broker>, resolver: Arc<SymbolResolver>) -> Self {
        Self { broker, resolver }
    }

    pub fn resolver(&self) -> &Arc<SymbolResolver> {
        &self.resolver
    }

    pub async fn validate(&self, req: &ValidationRequest) -> ValidationResult {
        let result = ValidationResult::default();

        let Some(actual) = self.resolver.resolve(&req.symbol).await else {
            return result.fail(format!("Symbol {} is not available at the broker", req.symbol));
        };
        let mut result = ValidationResult {
            symbol: Some(actual.clone()),
            ..result
        };

        let info = match self.broker.symbol_info(&actual).await {
            Ok(Some(info)) => info,
            Ok(None) => return result.fail(format!("No symbol information for {}", actual)),
            Err(e) => return result.fail(format!("Failed to read symbol {}: {}", actual, e)),
        };

        if !info.visible {
            result.warnings.push(format!(
                "Symbol {} is hidden in Market Watch and will be activated",
                actual
            ));
        }
        if !info.trade_mode.permits(req.action) {
            result.errors.push(format!(
                "Trading {} is not permitted on {} (mode {:?})",
                req.action, actual, info.trade_mode
            ));
        }
        if !info.trade_expert {
            result
                .errors
                .push(format!("Automated trading is not permitted on {}", actual));
        }

        self.check_volume(req.lot_size, &info, &mut result);

        let tick = match self.broker.symbol_tick(&actual).await {
            Ok(Some(tick)) => tick,
            Ok(None) => {
                result.symbol_info = Some(info);
                return result.fail(format!("No current price for {}", actual));
            }
            Err(e) => {
                result.symbol_info = Some(info);
                return result.fail(format!("Failed to read price for {}: {}", actual, e));
            }
        };
        let market_price = tick.entry_price(req.action);
        result.current_price = Some(market_price);
        result.tick = Some(tick);

        let reference = if req.order_type.is_pending() {
            match req.entry_price {
                Some(price) => price,
                None => {
                    result
                        .errors
                        .push("Pending orders need an explicit entry price".to_string());
                    market_price
                }
            }
        } else {
            market_price
        };

        let min_distance = info.min_stop_distance();
        result.min_stop_distance = min_distance;
        self.check_stops(req, reference, min_distance, info.digits, &mut result);

        if info.spread > SPREAD_WARNING_POINTS {
            result.warnings.push(format!(
                "Spread on {} is high: {} points",
                actual, info.spread
            ));
        }

        result.symbol_info = Some(info);
        result.valid = result.errors.is_empty();
        debug!(
            "Validated {} {} {}: {} errors, {} warnings",
            req.action,
            req.lot_size,
            actual,
            result.errors.len(),
            result.warnings.len()
        );
        result
    }

    fn check_volume(&self, lot: f64, info: &SymbolInfo, result: &mut ValidationResult) {
        let mut bad = false;
        if lot < info.volume_min {
            result.errors.push(format!(
                "Lot size {} is below the minimum {}",
                lot, info.volume_min
            ));
            bad = true;
        }
        if lot > info.volume_max {
            result.errors.push(format!(
                "Lot size {} is above the maximum {}",
                lot, info.volume_max
            ));
            bad = true;
        }
        if info.volume_step > 0.0 {
            let steps = lot / info.volume_step;
            if (steps - steps.round()).abs() > VOLUME_TOLERANCE {
                result.errors.push(format!(
                    "Lot size {} is not a multiple of the volume step {}",
                    lot, info.volume_step
                ));
                bad = true;
            }
        }
        if bad {
            let suggestion = nearest_valid_lot(lot, info);
            result.errors.push(format!("Suggested lot size: {}", suggestion));
            result.suggested_lot = Some(suggestion);
        }
    }

    fn check_stops(
        &self,
        req: &ValidationRequest,
        reference: f64,
        min_distance: f64,
        digits: u32,
        result: &mut ValidationResult,
    ) {
        let sign = req.action.sign();

        let sl_side_ok = match req.action {
            Action::Buy => req.stop_loss < reference,
            Action::Sell => req.stop_loss > reference,
        };
        if !sl_side_ok {
            let side = if req.action == Action::Buy { "below" } else { "above" };
            result.errors.push(format!(
                "Stop loss {} must be {} the entry price {} for {}",
                req.stop_loss, side, reference, req.action
            ));
        }
        if min_distance > 0.0 && (reference - req.stop_loss).abs() < min_distance {
            let suggestion = round_to(reference - sign * min_distance * STOP_SUGGESTION_FACTOR, digits);
            result.errors.push(format!(
                "Stop loss {} is closer than the minimum distance {} (suggested {})",
                req.stop_loss, min_distance, suggestion
            ));
            result.suggested_stop_loss = Some(suggestion);
        }

        let Some(tp) = req.take_profit else {
            return;
        };
        let tp_side_ok = match req.action {
            Action::Buy => tp > reference,
            Action::Sell => tp < reference,
        };
        if !tp_side_ok {
            let side = if req.action == Action::Buy { "above" } else { "below" };
            result.errors.push(format!(
                "Take profit {} must be {} the entry price {} for {}",
                tp, side, reference, req.action
            ));
        }
        if min_distance > 0.0 && (tp - reference).abs() < min_distance {
            let suggestion = round_to(reference + sign * min_distance * STOP_SUGGESTION_FACTOR, digits);
            result.errors.push(format!(
                "Take profit {} is closer than the minimum distance {} (suggested {})",
                tp, min_distance, suggestion
            ));
            result.suggested_take_profit = Some(suggestion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{PaperBroker, TradeMode};

    fn validator() -> (Arc<PaperBroker>, TradeValidator) {
        let broker = Arc::new(PaperBroker::with_default_catalog(10_000.0));
        let resolver = Arc::new(SymbolResolver::new(broker.clone()));
        (broker.clone(), TradeValidator::new(broker, resolver))
    }

    fn btc_buy(lot: f64, sl: f64, tp: f64) -> ValidationRequest {
        ValidationRequest {
            symbol: "BTCUSD".to_string(),
            action: Action::Buy,
            lot_size: lot,
            entry_price: Some(117_200.0),
            stop_loss: sl,
            take_profit: Some(tp),
            order_type: OrderType::Market,
        }
    }

    #[tokio::test]
    async fn accepts_a_sound_market_order() {
        let (_, v) = validator();
        let r = v.validate(&btc_buy(0.01, 116_700.0, 117_900.0)).await;
        assert!(r.valid, "{:?}", r.errors);
        assert_eq!(r.symbol.as_deref(), Some("BTCUSD"));
        assert_eq!(r.current_price, Some(117_215.0));
        assert!((r.min_stop_distance - 1.0).abs() < 1e-9);
        assert!(r.warnings.iter().any(|w| w.contains("hidden")));
    }

    #[tokio::test]
    async fn rejects_buy_with_stop_above_entry() {
        let (_, v) = validator();
        let r = v.validate(&btc_buy(0.01, 117_300.0, 117_900.0)).await;
        assert!(!r.valid);
        assert!(r
            .errors
            .iter()
            .any(|e| e.contains("Stop loss") && e.contains("below the entry price")));
    }

    #[tokio::test]
    async fn undersized_lot_gets_step_multiple_suggestion() {
        let (_, v) = validator();
        let r = v.validate(&btc_buy(0.004, 116_700.0, 117_900.0)).await;
        assert!(!r.valid);
        assert!(r.errors.iter().any(|e| e.contains("below the minimum")));
        assert_eq!(r.suggested_lot, Some(0.01));

        let r = v.validate(&btc_buy(0.027, 116_700.0, 117_900.0)).await;
        assert!(r.errors.iter().any(|e| e.contains("multiple")));
        assert_eq!(r.suggested_lot, Some(0.03));
    }

    #[tokio::test]
    async fn stops_inside_stop_level_are_rejected_with_suggestion() {
        let (_, v) = validator();
        // XAUUSDm: stops level 30 points of 0.01 => 0.30
        let req = ValidationRequest {
            symbol: "XAUUSD".to_string(),
            action: Action::Sell,
            lot_size: 0.01,
            entry_price: None,
            stop_loss: 3340.10,
            take_profit: Some(3339.90),
            order_type: OrderType::Market,
        };
        let r = v.validate(&req).await;
        assert!(!r.valid);
        assert_eq!(r.suggested_stop_loss, Some(3340.45));
        assert_eq!(r.suggested_take_profit, Some(3339.55));
    }

    #[tokio::test]
    async fn pending_order_is_checked_against_its_own_price() {
        let (_, v) = validator();
        let req = ValidationRequest {
            symbol: "XAUUSD".to_string(),
            action: Action::Sell,
            lot_size: 0.01,
            entry_price: Some(3360.0),
            stop_loss: 3370.0,
            take_profit: Some(3350.0),
            order_type: OrderType::SellLimit,
        };
        let r = v.validate(&req).await;
        assert!(r.valid, "{:?}", r.errors);
    }

    #[tokio::test]
    async fn collects_permission_errors_and_spread_warning() {
        let (broker, v) = validator();
        broker.update_symbol("BTCUSD", |info| {
            info.trade_mode = TradeMode::ShortOnly;
            info.trade_expert = false;
        });
        broker.set_tick("BTCUSD", 117_200.0, 117_201.0);
        let r = v.validate(&btc_buy(0.01, 116_700.0, 117_900.0)).await;
        assert!(!r.valid);
        assert_eq!(r.errors.len(), 2);
        assert!(r.warnings.iter().any(|w| w.contains("Spread")));
    }

    #[tokio::test]
    async fn unknown_symbol_is_fatal() {
        let (_, v) = validator();
        let mut req = btc_buy(0.01, 116_700.0, 117_900.0);
        req.symbol = "QQQZZZ".to_string();
        let r = v.validate(&req).await;
        assert!(!r.valid);
        assert_eq!(r.errors.len(), 1);
        assert!(r.symbol.is_none());
    }
}
