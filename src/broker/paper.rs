use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::broker::{
    AccountInfo, Broker, BrokerResult, Deal, OrderRequest, OrderResult, PendingOrder, Position,
    RetCode, SymbolInfo, TerminalInfo, Tick, TradeAction, TradeMode, FILLING_FOK, FILLING_IOC,
};
use crate::error::BrokerError;
use crate::models::Action;

const FIRST_TICKET: u64 = 50_000_001;

struct PaperState {
    symbols: BTreeMap<String, SymbolInfo>,
    ticks: HashMap<String, Tick>,
    positions: BTreeMap<u64, Position>,
    orders: BTreeMap<u64, PendingOrder>,
    deals: Vec<Deal>,
    next_ticket: u64,
    trade_allowed: bool,
    connected: bool,
    scripted: VecDeque<RetCode>,
    balance: f64,
    leverage: u32,
}

/// In-memory brokerage used for paper trading and tests.
///
/// Market orders fill at the current ask/bid, pending orders rest until a
/// tick crosses their price, and positions close when a tick crosses their
/// stop-loss or take-profit.
pub struct PaperBroker {
    state: Mutex<PaperState>,
    catalog_fetches: AtomicUsize,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new(10_000.0)
    }
}

impl PaperBroker {
    pub fn new(balance: f64) -> Self {
        Self {
            state: Mutex::new(PaperState {
                symbols: BTreeMap::new(),
                ticks: HashMap::new(),
                positions: BTreeMap::new(),
                orders: BTreeMap::new(),
                deals: Vec::new(),
                next_ticket: FIRST_TICKET,
                trade_allowed: true,
                connected: true,
                scripted: VecDeque::new(),
                balance,
                leverage: 100,
            }),
            catalog_fetches: AtomicUsize::new(0),
        }
    }

    /// A broker offering common instruments under typical retail decorations.
    pub fn with_default_catalog(balance: f64) -> Self {
        let broker = Self::new(balance);
        let catalog: &[(&str, u32, f64, u32, f64, f64, f64)] = &[
            // name, digits, point, stops_level, contract, bid, ask
            ("XAUUSDm", 2, 0.01, 30, 100.0, 3340.00, 3340.25),
            ("XAGUSDm", 3, 0.001, 30, 5000.0, 31.000, 31.030),
            ("BTCUSD", 2, 0.01, 100, 1.0, 117_200.00, 117_215.00),
            ("ETHUSD", 2, 0.01, 100, 1.0, 3500.00, 3501.50),
            ("EURUSD.", 5, 0.00001, 10, 100_000.0, 1.08500, 1.08512),
            ("GBPUSD.", 5, 0.00001, 10, 100_000.0, 1.27000, 1.27015),
            ("USDJPY.", 3, 0.001, 10, 100_000.0, 155.000, 155.012),
            ("NAS100", 2, 0.01, 50, 1.0, 18_000.00, 18_001.50),
            ("US30.cash", 2, 0.01, 50, 1.0, 39_000.00, 39_002.00),
            ("USOIL", 2, 0.01, 20, 1000.0, 78.00, 78.03),
        ];
        for &(name, digits, point, stops, contract, bid, ask) in catalog {
            broker.add_symbol(
                SymbolInfo {
                    name: name.to_string(),
                    visible: false,
                    trade_mode: TradeMode::Full,
                    trade_expert: true,
                    volume_min: 0.01,
                    volume_max: 100.0,
                    volume_step: 0.01,
                    stops_level: stops,
                    digits,
                    point,
                    spread: 0,
                    filling_mode: FILLING_FOK | FILLING_IOC,
                    contract_size: contract,
                },
                bid,
                ask,
            );
        }
        broker
    }

    pub fn add_symbol(&self, mut info: SymbolInfo, bid: f64, ask: f64) {
        let mut st = self.state.lock();
        info.spread = spread_points(bid, ask, info.point);
        st.ticks.insert(
            info.name.clone(),
            Tick {
                bid,
                ask,
                time: Some(Utc::now()),
            },
        );
        st.symbols.insert(info.name.clone(), info);
    }

    pub fn remove_symbol(&self, name: &str) {
        let mut st = self.state.lock();
        st.symbols.remove(name);
        st.ticks.remove(name);
    }

    pub fn update_symbol<F: FnOnce(&mut SymbolInfo)>(&self, name: &str, f: F) {
        if let Some(info) = self.state.lock().symbols.get_mut(name) {
            f(info);
        }
    }

    /// Number of full catalog listings served so far.
    pub fn catalog_fetch_count(&self) -> usize {
        self.catalog_fetches.load(Ordering::SeqCst)
    }

    pub fn set_trade_allowed(&self, allowed: bool) {
        self.state.lock().trade_allowed = allowed;
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// The next `order_send` answers with `code` instead of executing.
    pub fn fail_next(&self, code: RetCode) {
        self.state.lock().scripted.push_back(code);
    }

    pub fn open_position_count(&self) -> usize {
        self.state.lock().positions.len()
    }

    pub fn resting_order_count(&self) -> usize {
        self.state.lock().orders.len()
    }

    pub fn balance(&self) -> f64 {
        self.state.lock().balance
    }

    /// Moves the market. Triggers resting orders and closes positions whose
    /// stops were crossed. Returns the tickets closed by this tick.
    pub fn set_tick(&self, symbol: &str, bid: f64, ask: f64) -> Vec<u64> {
        let mut st = self.state.lock();
        let tick = Tick {
            bid,
            ask,
            time: Some(Utc::now()),
        };
        st.ticks.insert(symbol.to_string(), tick);
        if let Some(info) = st.symbols.get_mut(symbol) {
            info.spread = spread_points(bid, ask, info.point);
        }

        let triggered: Vec<u64> = st
            .orders
            .values()
            .filter(|o| o.symbol == symbol && o.triggered_by(&tick))
            .map(|o| o.ticket)
            .collect();
        for ticket in triggered {
            if let Some(order) = st.orders.remove(&ticket) {
                let side = order.order_type.action();
                debug!("Paper order #{} triggered at {}", ticket, tick.entry_price(side));
                st.positions.insert(
                    ticket,
                    Position {
                        ticket,
                        symbol: order.symbol,
                        side,
                        volume: order.volume,
                        price_open: order.price,
                        price_current: tick.exit_price(side),
                        sl: order.sl,
                        tp: order.tp,
                        profit: 0.0,
                        time: Utc::now(),
                    },
                );
            }
        }

        let contract = st
            .symbols
            .get(symbol)
            .map(|s| s.contract_size)
            .unwrap_or(1.0);
        let mut to_close = Vec::new();
        for pos in st.positions.values_mut().filter(|p| p.symbol == symbol) {
            let exit = tick.exit_price(pos.side);
            pos.price_current = exit;
            pos.profit = (exit - pos.price_open) * pos.side.sign() * pos.volume * contract;

            let hit_sl = pos.sl > 0.0
                && match pos.side {
                    Action::Buy => exit <= pos.sl,
                    Action::Sell => exit >= pos.sl,
                };
            let hit_tp = pos.tp > 0.0 && pos.side.reached(exit, pos.tp);
            if hit_sl || hit_tp {
                to_close.push(pos.ticket);
            }
        }
        for &ticket in &to_close {
            close_locked(&mut st, ticket);
        }
        to_close
    }

    /// Closes a position at the current market price, as a manual close in the
    /// terminal would.
    pub fn close_position(&self, ticket: u64) -> bool {
        let mut st = self.state.lock();
        close_locked(&mut st, ticket)
    }

    fn execute(&self, st: &mut PaperState, request: &OrderRequest) -> OrderResult {
        if let Some(code) = st.scripted.pop_front() {
            return reply(code, 0, 0.0, 0.0);
        }

        match request.action {
            TradeAction::Sltp => {
                let Some(ticket) = request.position else {
                    return reply(RetCode::InvalidRequest, 0, 0.0, 0.0);
                };
                match st.positions.get_mut(&ticket) {
                    Some(pos) => {
                        if pos.sl == request.sl && pos.tp == request.tp {
                            return reply(RetCode::NoChanges, ticket, 0.0, 0.0);
                        }
                        pos.sl = request.sl;
                        pos.tp = request.tp;
                        reply(RetCode::Done, ticket, 0.0, 0.0)
                    }
                    None => reply(RetCode::PositionClosed, ticket, 0.0, 0.0),
                }
            }
            TradeAction::Deal | TradeAction::Pending => {
                if !st.trade_allowed {
                    return reply(RetCode::AutoTradingDisabled, 0, 0.0, 0.0);
                }
                let Some(info) = st.symbols.get(&request.symbol).cloned() else {
                    return reply(RetCode::InvalidRequest, 0, 0.0, 0.0);
                };
                if !info.trade_mode.permits(
                    request
                        .order_type
                        .map(|t| t.action())
                        .unwrap_or(Action::Buy),
                ) {
                    return reply(RetCode::TradeDisabled, 0, 0.0, 0.0);
                }
                if request.volume < info.volume_min || request.volume > info.volume_max {
                    return reply(RetCode::InvalidVolume, 0, 0.0, 0.0);
                }
                let Some(tick) = st.ticks.get(&request.symbol).copied() else {
                    return reply(RetCode::PriceOff, 0, 0.0, 0.0);
                };
                let Some(order_type) = request.order_type else {
                    return reply(RetCode::InvalidOrder, 0, 0.0, 0.0);
                };
                let side = order_type.action();
                let price = if request.action == TradeAction::Deal {
                    tick.entry_price(side)
                } else {
                    request.price
                };

                let margin = request.volume * info.contract_size * price / st.leverage as f64;
                if margin > st.balance {
                    return reply(RetCode::NoMoney, 0, 0.0, 0.0);
                }

                let ticket = st.next_ticket;
                st.next_ticket += 1;

                if request.action == TradeAction::Pending {
                    st.orders.insert(
                        ticket,
                        PendingOrder {
                            ticket,
                            symbol: request.symbol.clone(),
                            order_type,
                            volume: request.volume,
                            price,
                            sl: request.sl,
                            tp: request.tp,
                        },
                    );
                    info!("Paper pending order #{} {:?} @ {}", ticket, order_type, price);
                    return reply(RetCode::Placed, ticket, price, request.volume);
                }

                st.positions.insert(
                    ticket,
                    Position {
                        ticket,
                        symbol: request.symbol.clone(),
                        side,
                        volume: request.volume,
                        price_open: price,
                        price_current: tick.exit_price(side),
                        sl: request.sl,
                        tp: request.tp,
                        profit: 0.0,
                        time: Utc::now(),
                    },
                );
                info!(
                    "Paper deal #{} {} {} {} @ {}",
                    ticket, side, request.volume, request.symbol, price
                );
                reply(RetCode::Done, ticket, price, request.volume)
            }
        }
    }
}

fn spread_points(bid: f64, ask: f64, point: f64) -> u32 {
    if point <= 0.0 {
        return 0;
    }
    ((ask - bid) / point).round().max(0.0) as u32
}

fn reply(retcode: RetCode, order: u64, price: f64, volume: f64) -> OrderResult {
    OrderResult {
        retcode,
        order,
        price,
        volume,
        comment: retcode.description().to_string(),
    }
}

fn close_locked(st: &mut PaperState, ticket: u64) -> bool {
    let Some(pos) = st.positions.remove(&ticket) else {
        return false;
    };
    st.balance += pos.profit;
    let deal_ticket = st.next_ticket;
    st.next_ticket += 1;
    info!(
        "Paper position #{} closed @ {} PnL {:+.2}",
        ticket, pos.price_current, pos.profit
    );
    st.deals.push(Deal {
        ticket: deal_ticket,
        position: ticket,
        symbol: pos.symbol,
        profit: pos.profit,
        time: Utc::now(),
    });
    true
}

#[async_trait]
impl Broker for PaperBroker {
    async fn symbol_names(&self) -> BrokerResult<Vec<String>> {
        self.catalog_fetches.fetch_add(1, Ordering::SeqCst);
        let st = self.state.lock();
        if !st.connected {
            return Err(BrokerError::Connectivity("paper terminal offline".to_string()));
        }
        Ok(st.symbols.keys().cloned().collect())
    }

    async fn symbol_info(&self, symbol: &str) -> BrokerResult<Option<SymbolInfo>> {
        let st = self.state.lock();
        if !st.connected {
            return Err(BrokerError::Connectivity("paper terminal offline".to_string()));
        }
        Ok(st.symbols.get(symbol).cloned())
    }

    async fn symbol_select(&self, symbol: &str, enable: bool) -> BrokerResult<bool> {
        let mut st = self.state.lock();
        match st.symbols.get_mut(symbol) {
            Some(info) => {
                info.visible = enable;
                Ok(true)
            }
            None => Err(BrokerError::UnknownSymbol(symbol.to_string())),
        }
    }

    async fn symbol_tick(&self, symbol: &str) -> BrokerResult<Option<Tick>> {
        Ok(self.state.lock().ticks.get(symbol).copied())
    }

    async fn terminal_info(&self) -> BrokerResult<TerminalInfo> {
        let st = self.state.lock();
        Ok(TerminalInfo {
            connected: st.connected,
            trade_allowed: st.trade_allowed,
        })
    }

    async fn order_send(&self, request: &OrderRequest) -> BrokerResult<OrderResult> {
        let mut st = self.state.lock();
        if !st.connected {
            return Err(BrokerError::Connectivity("paper terminal offline".to_string()));
        }
        Ok(self.execute(&mut st, request))
    }

    async fn position(&self, ticket: u64) -> BrokerResult<Option<Position>> {
        let st = self.state.lock();
        if !st.connected {
            return Err(BrokerError::Connectivity("paper terminal offline".to_string()));
        }
        Ok(st.positions.get(&ticket).cloned())
    }

    async fn order(&self, ticket: u64) -> BrokerResult<Option<PendingOrder>> {
        Ok(self.state.lock().orders.get(&ticket).cloned())
    }

    async fn positions(&self) -> BrokerResult<Vec<Position>> {
        Ok(self.state.lock().positions.values().cloned().collect())
    }

    async fn history_deals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BrokerResult<Vec<Deal>> {
        Ok(self
            .state
            .lock()
            .deals
            .iter()
            .filter(|d| d.time >= from && d.time <= to)
            .cloned()
            .collect())
    }

    async fn account_info(&self) -> BrokerResult<AccountInfo> {
        let st = self.state.lock();
        let floating: f64 = st.positions.values().map(|p| p.profit).sum();
        let margin: f64 = st
            .positions
            .values()
            .map(|p| {
                let contract = st
                    .symbols
                    .get(&p.symbol)
                    .map(|s| s.contract_size)
                    .unwrap_or(1.0);
                p.volume * contract * p.price_open / st.leverage as f64
            })
            .sum();
        let equity = st.balance + floating;
        Ok(AccountInfo {
            login: 1,
            balance: st.balance,
            equity,
            margin,
            margin_free: equity - margin,
            profit: floating,
            leverage: st.leverage,
            currency: "USD".to_string(),
        })
    }
}
