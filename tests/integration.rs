mod common;

use chrono::{Duration, Utc};

use signal_copy_bot::broker::{Broker, RetCode};
use signal_copy_bot::copier::CopyOutcome;
use signal_copy_bot::messaging::{ChannelMessage, JsonLinesSource, MessageSource};
use signal_copy_bot::models::{Action, OrderType, PendingStatus, SignalStatus};
use signal_copy_bot::parsing::SignalParser;
use signal_copy_bot::trading::{TradeValidator, ValidationRequest};

use common::Stack;

const SCENARIO_A: &str = "BTCUSD buy NOW 117200\nTP 117500\nTP 117700\nTP 117900\nSL 116700";
const SCENARIO_B: &str = "GOLD sell NOW 3343 - 45\nTP 3340\nTP 3337\nTP 3333\nSL 3351";

fn ticket_of(outcome: CopyOutcome) -> u64 {
    match outcome {
        CopyOutcome::Executed { ticket } => ticket,
        other => panic!("expected execution, got {:?}", other),
    }
}

#[tokio::test]
async fn scenario_a_executes_and_trails_to_break_even() {
    let stack = Stack::new();
    let ticket = ticket_of(
        stack
            .copier
            .handle(&ChannelMessage::new("crypto", SCENARIO_A))
            .await,
    );

    let record = stack.book.get(ticket).unwrap();
    assert_eq!(record.actual_symbol, "BTCUSD");
    assert_eq!(record.signal.take_profits(), &[117_500.0, 117_700.0, 117_900.0]);

    stack.broker.set_tick("BTCUSD", 117_520.0, 117_535.0);
    stack.trailing.run_cycle().await.unwrap();
    let pos = stack.broker.position(ticket).await.unwrap().unwrap();
    assert!(pos.sl > record.entry_price);
    assert_eq!(pos.tp, 117_900.0);

    // Final target closes the position at the broker; the next cycle files it.
    stack.broker.set_tick("BTCUSD", 117_950.0, 117_965.0);
    let report = stack.trailing.run_cycle().await.unwrap();
    assert_eq!(report.closed, 1);
    assert_eq!(stack.book.history()[0].ticket, ticket);
    assert_eq!(stack.journal.entries()[0].status, SignalStatus::Executed);
}

#[tokio::test]
async fn scenario_b_range_sell_on_decorated_gold() {
    let stack = Stack::new();
    let signal = SignalParser::new().parse(SCENARIO_B, None).unwrap();
    assert_eq!(signal.symbol(), "XAUUSD");
    assert_eq!(signal.entry_price_range(), Some((3343.0, 3345.0)));

    let ticket = ticket_of(
        stack
            .copier
            .handle(&ChannelMessage::new("gold", SCENARIO_B))
            .await,
    );
    let pos = stack.broker.position(ticket).await.unwrap().unwrap();
    assert_eq!(pos.symbol, "XAUUSDm");
    assert_eq!(pos.side, Action::Sell);
    assert_eq!(pos.sl, 3351.0);
    assert_eq!(pos.tp, 3333.0);
}

#[test]
fn scenario_c_percentage_is_never_a_target() {
    let text = "XAUUSD SELL NOW 4289\nTP 4280\nTake profit reached, 100% Sure Signal\nSL 4299.00";
    let signal = SignalParser::new().parse(text, None).unwrap();
    assert!(!signal.take_profits().contains(&100.0));
    assert_eq!(signal.stop_loss(), 4299.0);
}

#[tokio::test]
async fn scenario_d_validator_explains_rejections() {
    let stack = Stack::new();
    let validator = TradeValidator::new(stack.broker.clone(), stack.resolver.clone());

    let bad_stop = ValidationRequest {
        symbol: "XAUUSD".to_string(),
        action: Action::Buy,
        lot_size: 0.01,
        entry_price: None,
        stop_loss: 3345.0,
        take_profit: Some(3350.0),
        order_type: OrderType::Market,
    };
    let r = validator.validate(&bad_stop).await;
    assert!(!r.valid);
    assert!(r.errors.iter().any(|e| e.contains("Stop loss") && e.contains("entry price")));

    let small_lot = ValidationRequest {
        lot_size: 0.001,
        stop_loss: 3330.0,
        ..bad_stop
    };
    let r = validator.validate(&small_lot).await;
    assert!(!r.valid);
    assert_eq!(r.suggested_lot, Some(0.01));
}

#[tokio::test]
async fn scenario_e_sell_limit_rests_then_trails() {
    let stack = Stack::new();
    let text = "Gold sell limit\n\nEntry 3360\nSl 3370\nTp 3350\nTp 3345";
    let signal = SignalParser::new().parse(text, None).unwrap();
    assert_eq!(signal.order_type(), OrderType::SellLimit);
    assert_eq!(signal.action(), Action::Sell);

    let ticket = ticket_of(stack.copier.handle(&ChannelMessage::new("gold", text)).await);
    assert!(stack.broker.order(ticket).await.unwrap().is_some());

    // Resting order: the engine leaves it alone.
    let report = stack.trailing.run_cycle().await.unwrap();
    assert_eq!((report.closed, report.advanced), (0, 0));

    stack.broker.set_tick("XAUUSDm", 3360.5, 3360.75);
    stack.broker.set_tick("XAUUSDm", 3349.0, 3349.25);
    let report = stack.trailing.run_cycle().await.unwrap();
    assert_eq!(report.modified, 1);
    let pos = stack.broker.position(ticket).await.unwrap().unwrap();
    assert!(pos.sl < 3360.0);
}

#[tokio::test]
async fn market_closed_is_retried_after_delay() {
    let stack = Stack::new();
    stack.broker.fail_next(RetCode::MarketClosed);
    let outcome = stack
        .copier
        .handle(&ChannelMessage::new("crypto", SCENARIO_A))
        .await;
    assert!(matches!(outcome, CopyOutcome::Failed { .. }));

    let entry = stack.retry.get("BTCUSD").unwrap();
    assert_eq!(entry.status, PendingStatus::MarketClosed);
    assert_eq!(entry.retry_count, 1);

    assert_eq!(stack.retry.process_due(Utc::now()).await, 0);
    let later = Utc::now() + Duration::seconds(61);
    assert_eq!(stack.retry.process_due(later).await, 1);
    assert!(stack.retry.is_empty());
    assert_eq!(stack.book.active_count(), 1);
}

#[tokio::test]
async fn autotrading_off_then_retry_all() {
    let stack = Stack::new();
    stack.broker.set_trade_allowed(false);
    for text in [SCENARIO_A, SCENARIO_B] {
        stack
            .copier
            .handle(&ChannelMessage::new("mixed", text))
            .await;
    }
    assert_eq!(stack.retry.len(), 2);
    assert!(stack.retry.pending().iter().all(|p| p.requires_manual_fix()));

    stack.broker.set_trade_allowed(true);
    assert_eq!(stack.retry.retry_all().await, 2);
    assert_eq!(stack.retry.retry_all().await, 0);
    assert_eq!(stack.broker.open_position_count(), 2);
}

#[tokio::test]
async fn state_survives_restart() {
    let stack = Stack::new();
    let ticket = ticket_of(
        stack
            .copier
            .handle(&ChannelMessage::new("crypto", SCENARIO_A))
            .await,
    );
    stack.broker.fail_next(RetCode::Requote);
    stack
        .copier
        .handle(&ChannelMessage::new("gold", SCENARIO_B))
        .await;

    let Stack { dir, .. } = stack;
    let restarted = Stack::in_dir(dir);
    assert!(restarted.book.contains(ticket));
    assert_eq!(restarted.retry.get("XAUUSD").unwrap().retry_count, 1);
    assert_eq!(restarted.journal.len(), 2);
}

#[tokio::test]
async fn json_lines_feed_drives_the_copier() {
    let stack = Stack::new();
    let feed = concat!(
        "{\"channel\": \"crypto\", \"text\": \"BTCUSD buy NOW 117200\\nTP 117500\\nSL 116700\"}\n",
        "{\"channel\": \"crypto\", \"text\": \"Target hit! 50 pips profit!\"}\n",
    );
    let mut source = JsonLinesSource::new(feed.as_bytes());
    let mut outcomes = Vec::new();
    while let Some(msg) = source.next_message().await.unwrap() {
        outcomes.push(stack.copier.handle(&msg).await);
    }
    assert!(matches!(outcomes[0], CopyOutcome::Executed { .. }));
    assert_eq!(outcomes[1], CopyOutcome::Filtered);
}
