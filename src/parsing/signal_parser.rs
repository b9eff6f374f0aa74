use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::models::{Action, Entry, OrderType, Signal};
use crate::parsing::symbols::{extract_symbol, plausible_prices};

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+(?:[.,][0-9]+)*").expect("literal pattern"));

static PENDING_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(BUY|SELL)[ \t]+(LIMIT|STOP)\b([ \t\-]*LOSS)?").expect("literal pattern")
});

static BUY_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(BUY|LONG|CALL|BUYING)\b").expect("literal pattern"));

static SELL_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(SELL|SHORT|PUT|SELLING)\b").expect("literal pattern"));

static STOP_LOSS_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bSL\b|\bSTOP[ \t]*-?[ \t]*LOSS\b|\bSTOPLOSS\b|\bSTOP\b|\bS\.L\b|\bS L\b")
        .expect("literal pattern")
});

const BUY_GLYPHS: &[&str] = &["🟢", "⬆", "📈", "🔼"];
const SELL_GLYPHS: &[&str] = &["🔴", "⬇", "📉", "🔽"];

const ENTRY_MARKERS: &[&str] = &["NOW", "PRICE", "ENTRY", "@"];

static TAKE_PROFIT_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bTP\d*\b|\bT\.[ \t]?P\b|\bTAKE[ \t\-]*PROFIT|\bTARGET|\bOBJETIVO\b|\bGOAL\b")
        .expect("literal pattern")
});

const PROMO_WORDS: &[&str] = &["SURE", "SIGNAL"];

/// Why a message did not produce a signal.
#[derive(Debug, Error, PartialEq)]
pub enum ParseRejection {
    #[error("no instrument found")]
    NoSymbol,
    #[error("no trade direction found")]
    NoAction,
    #[error("no entry price found")]
    NoEntry,
    #[error("no take-profit found")]
    NoTakeProfit,
    #[error("no stop-loss found")]
    NoStopLoss,
    #[error("no take-profit on the {0} side of the entry")]
    TakeProfitsWrongSide(Action),
    #[error("stop-loss {stop_loss} is not on the losing side of {reference}")]
    StopLossWrongSide { stop_loss: f64, reference: f64 },
}

/// Turns free-text trade alerts into [`Signal`]s.
#[derive(Debug, Default, Clone)]
pub struct SignalParser;

impl SignalParser {
    pub fn new() -> Self {
        Self
    }

    /// Returns `None` when the message is not an actionable signal.
    pub fn parse(&self, text: &str, channel: Option<&str>) -> Option<Signal> {
        match self.try_parse(text, channel) {
            Ok(signal) => Some(signal),
            Err(reason) => {
                debug!("Message rejected: {}", reason);
                None
            }
        }
    }

    pub fn try_parse(&self, text: &str, channel: Option<&str>) -> Result<Signal, ParseRejection> {
        let symbol = extract_symbol(text).ok_or(ParseRejection::NoSymbol)?;
        let (action, order_type) = extract_action(text).ok_or(ParseRejection::NoAction)?;
        let entry = extract_entry(text, &symbol).ok_or(ParseRejection::NoEntry)?;
        let take_profits = extract_take_profits(text, &symbol);
        if take_profits.is_empty() {
            return Err(ParseRejection::NoTakeProfit);
        }
        let stop_loss = extract_stop_loss(text, &symbol).ok_or(ParseRejection::NoStopLoss)?;

        let reference = entry.reference();
        let mut take_profits: Vec<f64> = take_profits
            .into_iter()
            .filter(|tp| match action {
                Action::Buy => *tp >= reference,
                Action::Sell => *tp <= reference,
            })
            .collect();
        if take_profits.is_empty() {
            return Err(ParseRejection::TakeProfitsWrongSide(action));
        }
        // Targets in the order price reaches them.
        if action == Action::Sell {
            take_profits.reverse();
        }

        let stop_ok = match action {
            Action::Buy => stop_loss < reference,
            Action::Sell => stop_loss > reference,
        };
        if !stop_ok {
            return Err(ParseRejection::StopLossWrongSide {
                stop_loss,
                reference,
            });
        }

        Ok(Signal::new(
            symbol,
            action,
            order_type,
            entry,
            take_profits,
            stop_loss,
            channel.map(str::to_string),
            text.to_string(),
        ))
    }
}

/// All numeric tokens in `text`. Comma thousands separators are dropped, a
/// lone decimal comma becomes a dot.
pub fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER
        .find_iter(text)
        .filter_map(|m| normalize_number(m.as_str()).parse::<f64>().ok())
        .collect()
}

fn normalize_number(token: &str) -> String {
    if !token.contains(',') {
        return token.to_string();
    }
    let int_part = token.split('.').next().unwrap_or(token);
    let mut groups = int_part.split(',');
    let lead_ok = groups.next().map(|g| g.len() <= 3).unwrap_or(false);
    if lead_ok && groups.all(|g| g.len() == 3) {
        return token.replace(',', "");
    }
    if token.matches(',').count() == 1 && !token.contains('.') {
        return token.replace(',', ".");
    }
    token.replace(',', "")
}

fn extract_action(text: &str) -> Option<(Action, OrderType)> {
    let upper = text.to_uppercase();

    for caps in PENDING_PHRASE.captures_iter(&upper) {
        if caps.get(3).is_some() {
            continue;
        }
        let order_type = match (&caps[1], &caps[2]) {
            ("BUY", "LIMIT") => OrderType::BuyLimit,
            ("SELL", "LIMIT") => OrderType::SellLimit,
            ("BUY", "STOP") => OrderType::BuyStop,
            _ => OrderType::SellStop,
        };
        let action = if &caps[1] == "BUY" {
            Action::Buy
        } else {
            Action::Sell
        };
        return Some((action, order_type));
    }

    let buy_at = BUY_WORD.find(&upper).map(|m| m.start());
    let sell_at = SELL_WORD.find(&upper).map(|m| m.start());
    let action = match (buy_at, sell_at) {
        (Some(b), Some(s)) if s < b => Action::Sell,
        (Some(_), _) => Action::Buy,
        (None, Some(_)) => Action::Sell,
        (None, None) => {
            if BUY_GLYPHS.iter().any(|g| text.contains(g)) {
                Action::Buy
            } else if SELL_GLYPHS.iter().any(|g| text.contains(g)) {
                Action::Sell
            } else {
                return None;
            }
        }
    };
    Some((action, OrderType::Market))
}

/// Reads an entry from one line: one plausible number is a price, two are a
/// range. A short trailing number completes the leading digits of the first,
/// so "3343 - 45" reads as 3343..3345.
fn entry_from_line(line: &str, symbol: &str) -> Option<Entry> {
    let numbers = extract_numbers(line);
    let plausible = plausible_prices(&numbers, symbol);
    match plausible.as_slice() {
        [price] => {
            let completed = numbers
                .iter()
                .skip_while(|n| *n != price)
                .skip(1)
                .find_map(|short| complete_shorthand(*price, *short))
                .filter(|full| plausible_prices(&[*full], symbol).len() == 1);
            match completed {
                Some(other) => Some(Entry::range(*price, other)),
                None => Some(Entry::Price(*price)),
            }
        }
        [a, b] => Some(Entry::range(*a, *b)),
        _ => None,
    }
}

fn complete_shorthand(price: f64, short: f64) -> Option<f64> {
    if short.fract() != 0.0 || short <= 0.0 || price < 100.0 {
        return None;
    }
    let short = short as u64;
    let digits = short.to_string().len() as u32;
    let whole = price.trunc() as u64;
    if digits >= whole.to_string().len() as u32 {
        return None;
    }
    let scale = 10u64.checked_pow(digits)?;
    let completed = (whole / scale).checked_mul(scale)?.checked_add(short)?;
    Some(completed as f64)
}

fn extract_entry(text: &str, symbol: &str) -> Option<Entry> {
    for line in text.lines().take(3) {
        let upper = line.to_uppercase();
        if ENTRY_MARKERS.iter().any(|m| upper.contains(m)) {
            if let Some(entry) = entry_from_line(line, symbol) {
                return Some(entry);
            }
        }
    }

    if let Some(entry) = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .and_then(|first| entry_from_line(first, symbol))
    {
        return Some(entry);
    }

    let numbers = extract_numbers(text);
    plausible_prices(&numbers, symbol)
        .first()
        .or(numbers.first())
        .map(|p| Entry::Price(*p))
}

fn is_promo_line(line: &str, upper: &str) -> bool {
    line.contains('%') || PROMO_WORDS.iter().any(|w| upper.contains(w))
}

fn mentions_take_profit(upper: &str) -> bool {
    TAKE_PROFIT_WORD.is_match(upper)
}

fn extract_take_profits(text: &str, symbol: &str) -> Vec<f64> {
    let mut targets = Vec::new();

    for line in text.lines() {
        let upper = line.to_uppercase();
        if is_promo_line(line, &upper) {
            continue;
        }
        // Stop-loss lines only count when they also name a target.
        if !mentions_take_profit(&upper) {
            continue;
        }
        if let Some(last) = plausible_prices(&extract_numbers(line), symbol).last() {
            targets.push(*last);
        }
    }

    if targets.is_empty() {
        let all = plausible_prices(&extract_numbers(text), symbol);
        if all.len() >= 3 {
            targets = all[1..all.len() - 1].to_vec();
        }
    }

    targets.sort_by(|a, b| a.total_cmp(b));
    targets
}

fn extract_stop_loss(text: &str, symbol: &str) -> Option<f64> {
    for line in text.lines() {
        let upper = line.to_uppercase();
        if is_promo_line(line, &upper) {
            continue;
        }
        // "SELL STOP" is an order type, not a stop-loss.
        let upper = PENDING_PHRASE.replace_all(&upper, |caps: &regex::Captures| {
            if caps.get(3).is_some() {
                caps[0].to_string()
            } else {
                String::new()
            }
        });
        if !STOP_LOSS_WORD.is_match(&upper) {
            continue;
        }
        if let Some(last) = plausible_prices(&extract_numbers(line), symbol).last() {
            return Some(*last);
        }
    }

    let all = plausible_prices(&extract_numbers(text), symbol);
    if all.len() >= 2 {
        return all.last().copied();
    }
    None
}
