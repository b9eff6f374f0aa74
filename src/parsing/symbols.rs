//! Instrument aliases, canonical names and per-instrument price bands.

use once_cell::sync::Lazy;
use regex::Regex;

/// Aliases recognised in alert text, checked in this order.
pub const ALIASES: &[&str] = &[
    // Gold
    "XAUUSD", "GOLD", "XAUUSD_GOLD", "XAU",
    // Silver
    "XAGUSD", "SILVER", "XAG",
    // Majors
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD",
    // Crosses
    "EURJPY", "GBPJPY", "EURGBP", "AUDJPY", "NZDJPY", "CADJPY", "EURAUD", "EURCHF", "GBPAUD",
    "GBPCHF",
    // Crypto
    "BTCUSD", "ETHUSD", "XRPUSD", "LTCUSD", "BCHUSD", "ADAUSD", "BTC", "ETH", "XRP", "LTC",
    // Indices
    "US30", "US100", "US500", "NAS100", "NASDAQ", "SPX500", "DJI30", "GER30", "UK100", "JPN225",
    // Oil
    "OIL", "USOIL", "UKOIL", "CRUDE", "WTI", "BRENT",
];

static ALIAS_WORDS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    ALIASES
        .iter()
        .map(|alias| {
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(alias)))
                .expect("alias pattern is a literal");
            (*alias, re)
        })
        .collect()
});

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[#@_\-]").expect("literal pattern"));

static PAIR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{6,7}\b").expect("literal pattern"));

const NOT_SYMBOLS: &[&str] = &[
    "BUYING", "SELLING", "PROFIT", "TARGET", "SIGNAL", "MARKET", "SIGNALS", "UPDATE",
];

/// Maps any alias of an instrument to its canonical code.
///
/// `normalize(normalize(x)) == normalize(x)` for every input.
pub fn normalize(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();

    if upper.contains("GOLD") || upper.contains("XAU") {
        return "XAUUSD".to_string();
    }
    if upper.contains("SILVER") || upper.contains("XAG") {
        return "XAGUSD".to_string();
    }
    if upper.contains("BTC") {
        return "BTCUSD".to_string();
    }

    let stripped: String = upper
        .chars()
        .filter(|c| !matches!(c, '#' | '_' | '-') && !c.is_whitespace())
        .filter(|c| c.is_ascii())
        .collect();

    match stripped.as_str() {
        "ETH" => "ETHUSD".to_string(),
        "XRP" => "XRPUSD".to_string(),
        "LTC" => "LTCUSD".to_string(),
        "NASDAQ" => "NAS100".to_string(),
        "OIL" | "CRUDE" | "WTI" => "USOIL".to_string(),
        "BRENT" => "UKOIL".to_string(),
        _ => stripped,
    }
}

/// Finds the instrument mentioned in `text` and returns its canonical code.
pub fn extract_symbol(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    let cleaned = SEPARATORS.replace_all(&upper, " ");

    for (alias, word) in ALIAS_WORDS.iter() {
        if word.is_match(&upper) || word.is_match(&cleaned) {
            return Some(normalize(alias));
        }
    }

    // Aliases glued to other tokens, e.g. "XAUUSDSELL".
    for alias in ALIASES {
        if upper.contains(alias) {
            return Some(normalize(alias));
        }
    }

    PAIR_TOKEN
        .find_iter(&cleaned)
        .map(|m| m.as_str())
        .find(|token| !NOT_SYMBOLS.contains(token))
        .map(normalize)
}

/// Magnitude band a quoted price must fall in for an instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceBand {
    Between(f64, f64),
    Above(f64),
}

impl PriceBand {
    pub fn for_symbol(canonical: &str) -> Self {
        match canonical {
            "XAUUSD" => PriceBand::Between(1_000.0, 10_000.0),
            "XAGUSD" => PriceBand::Between(10.0, 100.0),
            "BTCUSD" => PriceBand::Between(1_000.0, 200_000.0),
            "ETHUSD" => PriceBand::Between(100.0, 20_000.0),
            "EURUSD" | "GBPUSD" | "AUDUSD" | "NZDUSD" | "USDCHF" | "USDCAD" | "EURGBP"
            | "EURAUD" | "EURCHF" | "GBPAUD" | "GBPCHF" => PriceBand::Between(0.5, 2.0),
            s if s.ends_with("JPY") => PriceBand::Between(50.0, 200.0),
            "US30" | "US100" | "US500" | "NAS100" | "SPX500" | "DJI30" | "GER30" | "UK100"
            | "JPN225" => PriceBand::Between(1_000.0, 50_000.0),
            "USOIL" | "UKOIL" => PriceBand::Between(20.0, 200.0),
            _ => PriceBand::Above(100.0),
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        match *self {
            PriceBand::Between(lo, hi) => price >= lo && price <= hi,
            PriceBand::Above(lo) => price > lo,
        }
    }
}

/// Keeps only the numbers plausible as a price of `canonical`.
pub fn plausible_prices(numbers: &[f64], canonical: &str) -> Vec<f64> {
    let band = PriceBand::for_symbol(canonical);
    numbers.iter().copied().filter(|n| band.contains(*n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gold_aliases_collapse_to_one_code() {
        for alias in ["GOLD", "xau", "XAUUSD_GOLD", "#XAUUSD", "Gold"] {
            assert_eq!(normalize(alias), "XAUUSD");
        }
        assert_eq!(normalize("BTC"), "BTCUSD");
        assert_eq!(normalize("silver"), "XAGUSD");
        assert_eq!(normalize("EUR-USD"), "EURUSD");
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = ALIASES
            .iter()
            .map(|s| s.to_string())
            .chain(["eur_usd", " #gbpjpy ", "nasdaq", "crude", "🔵XAUUSD", "ABCDEF"].map(String::from));
        for input in inputs {
            let once = normalize(&input);
            assert_eq!(normalize(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn extracts_symbol_glued_to_separators() {
        assert_eq!(extract_symbol("#XAUUSD_SELL now").as_deref(), Some("XAUUSD"));
        assert_eq!(extract_symbol("btcusd buy").as_deref(), Some("BTCUSD"));
        assert_eq!(extract_symbol("Gold sell limit").as_deref(), Some("XAUUSD"));
        assert_eq!(extract_symbol("USDSGD buy 1.35").as_deref(), Some("USDSGD"));
        assert_eq!(extract_symbol("buying selling"), None);
    }

    #[test]
    fn bands_discard_implausible_numbers() {
        assert_eq!(plausible_prices(&[45.0, 3343.0, 100.0], "XAUUSD"), vec![3343.0]);
        assert_eq!(plausible_prices(&[1.0, 1.0850, 3.0], "EURUSD"), vec![1.0, 1.0850]);
        assert_eq!(plausible_prices(&[30.0, 39_000.0], "US30"), vec![39_000.0]);
        assert_eq!(plausible_prices(&[100.0, 100.5], "ABCDEF"), vec![100.5]);
    }
}
