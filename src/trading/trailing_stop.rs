//! Stop-loss ladder for open positions.
//!
//! Each time the live price crosses the next take-profit level, the stop is
//! moved according to [`next_stop_loss`]. The engine owns no trade state: it
//! reads snapshots from the [`PositionBook`] and writes index changes and
//! closures back through it.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerResult, OrderRequest, Position, TradeAction};
use crate::config::Config;
use crate::models::Action;
use crate::shutdown::Shutdown;
use crate::trading::position_book::PositionBook;
use crate::trading::trade_record::TradeRecord;

/// Stop-loss to set after take-profit number `crossed` (0-based) is hit.
///
/// * first target: entry moved by the spread into profit (break-even)
/// * second target: no change
/// * later targets: the target two levels back
pub fn next_stop_loss(
    action: Action,
    entry: f64,
    spread: f64,
    take_profits: &[f64],
    crossed: usize,
) -> Option<f64> {
    match crossed {
        0 => Some(entry + action.sign() * spread),
        1 => None,
        k if k < take_profits.len() => Some(take_profits[k - 2]),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub advanced: usize,
    pub modified: usize,
    pub closed: usize,
}

pub struct TrailingStopEngine {
    broker: Arc<dyn Broker>,
    book: Arc<PositionBook>,
    magic: u64,
    poll: Duration,
    error_backoff: Duration,
    join_timeout: Duration,
    shutdown: Shutdown,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TrailingStopEngine {
    pub fn new(broker: Arc<dyn Broker>, book: Arc<PositionBook>, cfg: &Config) -> Self {
        Self {
            broker,
            book,
            magic: cfg.magic_number,
            poll: Duration::from_secs(cfg.trailing_poll_secs),
            error_backoff: Duration::from_secs(cfg.trailing_error_backoff_secs),
            join_timeout: Duration::from_secs(cfg.shutdown_timeout_secs),
            shutdown: Shutdown::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Spawns the polling task. Calling it while running does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let engine = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { engine.run().await }));
        info!("Trailing stop engine started (poll {}s)", self.poll.as_secs());
    }

    /// Signals the task and waits up to the configured timeout for it to exit.
    pub async fn stop(&self) {
        self.shutdown.trigger();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(self.join_timeout, handle).await {
                Ok(_) => info!("Trailing stop engine stopped"),
                Err(_) => warn!("Trailing stop engine did not stop within {:?}", self.join_timeout),
            }
        }
    }

    async fn run(&self) {
        while !self.shutdown.is_triggered() {
            let pause = match self.run_cycle().await {
                Ok(report) => {
                    if report.advanced > 0 || report.closed > 0 {
                        debug!("Trailing cycle: {:?}", report);
                    }
                    self.poll
                }
                Err(e) => {
                    warn!("Trailing cycle failed: {}", e);
                    self.error_backoff
                }
            };
            if !self.shutdown.sleep(pause).await {
                break;
            }
        }
    }

    /// One pass over every open trade.
    pub async fn run_cycle(&self) -> BrokerResult<CycleReport> {
        let mut report = CycleReport::default();
        for record in self.book.snapshot() {
            report.checked += 1;
            match self.broker.position(record.ticket).await? {
                Some(position) => {
                    if let Some(modified) = self.check_levels(&record, &position).await {
                        report.advanced += 1;
                        if modified {
                            report.modified += 1;
                        }
                    }
                }
                None => {
                    if self.broker.order(record.ticket).await?.is_some() {
                        continue;
                    }
                    if self.book.close(record.ticket).is_some() {
                        info!(
                            "Trade #{} {} closed at the broker",
                            record.ticket, record.actual_symbol
                        );
                        report.closed += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    /// Returns None when no level was crossed, else whether the stop moved.
    async fn check_levels(&self, record: &TradeRecord, position: &Position) -> Option<bool> {
        let target = record.next_take_profit()?;
        let action = record.signal.action();
        if !action.reached(position.price_current, target) {
            return None;
        }
        let crossed = record.current_tp_index;
        self.book.advance(record.ticket, crossed)?;
        info!(
            "Trade #{} {} reached TP{} at {}",
            record.ticket,
            record.actual_symbol,
            crossed + 1,
            position.price_current
        );

        let (spread, digits) = match self.broker.symbol_info(&record.actual_symbol).await {
            Ok(Some(info)) => (info.spread_price(), Some(info.digits)),
            Ok(None) => (0.0, None),
            Err(e) => {
                warn!("No symbol info for {}: {}", record.actual_symbol, e);
                (0.0, None)
            }
        };

        let Some(candidate) = next_stop_loss(
            action,
            record.entry_price,
            spread,
            record.signal.take_profits(),
            crossed,
        ) else {
            return Some(false);
        };
        let new_sl = match digits {
            Some(d) => round_price(candidate, d),
            None => candidate,
        };
        if (new_sl - position.sl).abs() < f64::EPSILON {
            return Some(false);
        }
        Some(self.modify_stop(position, new_sl).await)
    }

    async fn modify_stop(&self, position: &Position, sl: f64) -> bool {
        let request = OrderRequest {
            action: TradeAction::Sltp,
            symbol: position.symbol.clone(),
            volume: 0.0,
            order_type: None,
            price: 0.0,
            sl,
            tp: position.tp,
            deviation: 0,
            magic: self.magic,
            comment: String::new(),
            filling: None,
            position: Some(position.ticket),
        };
        match self.broker.order_send(&request).await {
            Ok(reply) if reply.retcode.is_success() => {
                info!(
                    "Trade #{} stop moved {} -> {}",
                    position.ticket, position.sl, sl
                );
                true
            }
            Ok(reply) => {
                warn!("Failed to move stop on #{}: {}", position.ticket, reply.retcode);
                false
            }
            Err(e) => {
                warn!("Failed to move stop on #{}: {}", position.ticket, e);
                false
            }
        }
    }
}

fn round_price(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{PaperBroker, RetCode};
    use crate::models::OrderType;
    use crate::test_helpers::{default_test_config, market_signal, pending_signal};
    use crate::trading::executor::OrderExecutor;
    use crate::trading::symbol_resolver::SymbolResolver;

    #[test]
    fn ladder_for_buy_and_sell() {
        let tps = [3345.0, 3350.0, 3355.0, 3360.0];
        assert_eq!(next_stop_loss(Action::Buy, 3340.0, 0.25, &tps, 0), Some(3340.25));
        assert_eq!(next_stop_loss(Action::Buy, 3340.0, 0.25, &tps, 1), None);
        assert_eq!(next_stop_loss(Action::Buy, 3340.0, 0.25, &tps, 2), Some(3345.0));
        assert_eq!(next_stop_loss(Action::Buy, 3340.0, 0.25, &tps, 3), Some(3350.0));
        assert_eq!(next_stop_loss(Action::Buy, 3340.0, 0.25, &tps, 4), None);

        let sell = [4068.0, 4056.0, 4046.0];
        assert_eq!(next_stop_loss(Action::Sell, 4078.0, 0.3, &sell, 0), Some(4077.7));
        assert_eq!(next_stop_loss(Action::Sell, 4078.0, 0.3, &sell, 2), Some(4068.0));
        assert_eq!(next_stop_loss(Action::Sell, 4078.0, 0.3, &[4068.0], 1), None);
    }

    struct Fixture {
        broker: Arc<PaperBroker>,
        exec: OrderExecutor,
        engine: Arc<TrailingStopEngine>,
    }

    fn fixture() -> Fixture {
        let cfg = default_test_config();
        let broker = Arc::new(PaperBroker::with_default_catalog(10_000.0));
        let book = Arc::new(PositionBook::in_memory());
        let resolver = Arc::new(SymbolResolver::new(broker.clone()));
        let exec = OrderExecutor::new(broker.clone(), resolver, book.clone(), &cfg);
        let engine = Arc::new(TrailingStopEngine::new(broker.clone(), book, &cfg));
        Fixture {
            broker,
            exec,
            engine,
        }
    }

    #[tokio::test]
    async fn buy_walks_up_the_ladder() {
        let f = fixture();
        let signal = market_signal(
            "BTCUSD",
            Action::Buy,
            117_200.0,
            &[117_400.0, 117_600.0, 117_800.0, 118_000.0],
            116_700.0,
        );
        let ticket = f.exec.submit(&signal, 0.01).await.ticket.unwrap();

        // TP1: stop to entry plus spread (fill 117215, spread 15.00)
        f.broker.set_tick("BTCUSD", 117_410.0, 117_425.0);
        let r = f.engine.run_cycle().await.unwrap();
        assert_eq!((r.advanced, r.modified), (1, 1));
        let pos = f.broker.position(ticket).await.unwrap().unwrap();
        assert_eq!(pos.sl, 117_230.0);
        assert_eq!(pos.tp, 118_000.0);

        // No new level: nothing happens.
        let r = f.engine.run_cycle().await.unwrap();
        assert_eq!(r.advanced, 0);

        // TP2: index advances, stop unchanged.
        f.broker.set_tick("BTCUSD", 117_610.0, 117_625.0);
        let r = f.engine.run_cycle().await.unwrap();
        assert_eq!((r.advanced, r.modified), (1, 0));
        assert_eq!(f.exec.book().get(ticket).unwrap().current_tp_index, 2);

        // TP3: stop to TP1.
        f.broker.set_tick("BTCUSD", 117_810.0, 117_825.0);
        f.engine.run_cycle().await.unwrap();
        let pos = f.broker.position(ticket).await.unwrap().unwrap();
        assert_eq!(pos.sl, 117_400.0);
    }

    #[tokio::test]
    async fn vanished_position_is_moved_to_history() {
        let f = fixture();
        let signal = market_signal("XAUUSD", Action::Sell, 3340.0, &[3335.0, 3330.0], 3350.0);
        let ticket = f.exec.submit(&signal, 0.01).await.ticket.unwrap();

        assert!(f.broker.close_position(ticket));
        let r = f.engine.run_cycle().await.unwrap();
        assert_eq!(r.closed, 1);
        assert!(f.exec.book().get(ticket).is_none());
        assert_eq!(f.exec.book().history().len(), 1);
    }

    #[tokio::test]
    async fn resting_order_is_left_alone_until_triggered() {
        let f = fixture();
        let signal = pending_signal(
            "XAUUSD",
            Action::Sell,
            OrderType::SellLimit,
            3360.0,
            &[3350.0, 3345.0],
            3370.0,
        );
        let ticket = f.exec.submit(&signal, 0.01).await.ticket.unwrap();
        let r = f.engine.run_cycle().await.unwrap();
        assert_eq!(r.closed, 0);
        assert!(f.exec.book().contains(ticket));

        f.broker.set_tick("XAUUSDm", 3361.0, 3361.25);
        assert!(f.broker.position(ticket).await.unwrap().is_some());
        f.broker.set_tick("XAUUSDm", 3349.5, 3349.75);
        let r = f.engine.run_cycle().await.unwrap();
        assert_eq!(r.advanced, 1);
        let pos = f.broker.position(ticket).await.unwrap().unwrap();
        assert_eq!(pos.sl, 3359.75);
    }

    #[tokio::test]
    async fn failed_modify_is_not_retried_at_same_step() {
        let f = fixture();
        let signal = market_signal("XAUUSD", Action::Buy, 3340.0, &[3341.0, 3342.0], 3330.0);
        let ticket = f.exec.submit(&signal, 0.01).await.ticket.unwrap();

        f.broker.fail_next(RetCode::Frozen);
        f.broker.set_tick("XAUUSDm", 3341.5, 3341.75);
        let r = f.engine.run_cycle().await.unwrap();
        assert_eq!((r.advanced, r.modified), (1, 0));
        let r = f.engine.run_cycle().await.unwrap();
        assert_eq!(r.advanced, 0);
        assert_eq!(f.broker.position(ticket).await.unwrap().unwrap().sl, 3330.0);
    }

    #[tokio::test]
    async fn broker_outage_fails_the_cycle() {
        let f = fixture();
        let signal = market_signal("XAUUSD", Action::Buy, 3340.0, &[3345.0], 3330.0);
        f.exec.submit(&signal, 0.01).await;
        f.broker.set_connected(false);
        assert!(f.engine.run_cycle().await.is_err());
        assert_eq!(f.exec.book().active_count(), 1);
    }

    #[tokio::test]
    async fn start_and_stop_are_bounded() {
        let f = fixture();
        f.engine.start();
        assert!(f.engine.is_running());
        f.engine.stop().await;
        assert!(!f.engine.is_running());
    }
}
