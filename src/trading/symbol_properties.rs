use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::broker::{Broker, TradeMode, FILLING_FOK, FILLING_IOC};
use crate::error::ConfigError;
use crate::trading::symbol_resolver::SymbolResolver;

const FILLING_RETURN: u32 = 4;

/// Point-in-time trading properties of one broker symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolProperties {
    pub symbol: String,
    pub actual_symbol: String,
    pub trade_allowed: bool,
    pub expert_allowed: bool,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    pub digits: u32,
    pub point: f64,
    pub contract_size: f64,
    pub spread: u32,
    pub stops_level: u32,
    pub filling_modes: Vec<String>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

fn filling_names(flags: u32) -> Vec<String> {
    [
        (FILLING_FOK, "FOK"),
        (FILLING_IOC, "IOC"),
        (FILLING_RETURN, "RETURN"),
    ]
    .iter()
    .filter(|(bit, _)| flags & bit != 0)
    .map(|(_, name)| name.to_string())
    .collect()
}

impl SymbolProperties {
    /// Resolves `canonical` and reads its current properties. None when the
    /// broker does not list it or cannot be reached.
    pub async fn capture(
        broker: &dyn Broker,
        resolver: &SymbolResolver,
        canonical: &str,
    ) -> Option<Self> {
        let actual = resolver.resolve(canonical).await?;
        let info = match broker.symbol_info(&actual).await {
            Ok(Some(info)) => info,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", actual, e);
                return None;
            }
        };
        let tick = broker.symbol_tick(&actual).await.ok().flatten();
        Some(Self {
            symbol: canonical.to_string(),
            actual_symbol: actual,
            trade_allowed: info.trade_mode != TradeMode::Disabled,
            expert_allowed: info.trade_expert,
            volume_min: info.volume_min,
            volume_max: info.volume_max,
            volume_step: info.volume_step,
            digits: info.digits,
            point: info.point,
            contract_size: info.contract_size,
            spread: info.spread,
            stops_level: info.stops_level,
            filling_modes: filling_names(info.filling_mode),
            bid: tick.map(|t| t.bid),
            ask: tick.map(|t| t.ask),
            timestamp: Utc::now(),
        })
    }

    /// Merges this snapshot into the JSON map at `path`, keyed by canonical
    /// symbol.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        save_all(std::slice::from_ref(self), path)
    }
}

/// Captures every symbol in the broker catalog.
pub async fn capture_all(broker: &dyn Broker, resolver: &SymbolResolver) -> Vec<SymbolProperties> {
    let names = match broker.symbol_names().await {
        Ok(names) => names,
        Err(e) => {
            warn!("Failed to list symbols: {}", e);
            return Vec::new();
        }
    };
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if let Some(props) = SymbolProperties::capture(broker, resolver, &name).await {
            out.push(props);
        }
    }
    out
}

pub fn save_all(props: &[SymbolProperties], path: &Path) -> Result<(), ConfigError> {
    let mut saved: BTreeMap<String, SymbolProperties> = match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => BTreeMap::new(),
    };
    for p in props {
        saved.insert(p.symbol.clone(), p.clone());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(&saved)?)?;
    info!("Saved {} symbol snapshots to {}", props.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use std::sync::Arc;

    #[tokio::test]
    async fn captures_and_merges_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols_info.json");
        let broker = Arc::new(PaperBroker::with_default_catalog(10_000.0));
        let resolver = SymbolResolver::new(broker.clone());

        let gold = SymbolProperties::capture(broker.as_ref(), &resolver, "XAUUSD")
            .await
            .unwrap();
        assert_eq!(gold.actual_symbol, "XAUUSDm");
        assert_eq!(gold.spread, 25);
        assert_eq!(gold.filling_modes, vec!["FOK", "IOC"]);
        gold.save(&path).unwrap();

        let all = capture_all(broker.as_ref(), &resolver).await;
        assert_eq!(all.len(), 10);
        save_all(&all, &path).unwrap();

        let saved: BTreeMap<String, SymbolProperties> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.len(), 11);
        assert!(saved.contains_key("XAUUSD"));
        assert!(saved.contains_key("US30.cash"));
    }

    #[tokio::test]
    async fn unknown_symbol_captures_nothing() {
        let broker = Arc::new(PaperBroker::with_default_catalog(10_000.0));
        let resolver = SymbolResolver::new(broker.clone());
        assert!(SymbolProperties::capture(broker.as_ref(), &resolver, "ZZZZZZ")
            .await
            .is_none());
    }
}
