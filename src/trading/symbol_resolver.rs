use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::broker::Broker;

/// Decorations brokers append to canonical names, tried in order.
pub const DECORATIONS: &[&str] = &["", "+", "#", "-", ".", "m", "pro", "a", "b", "c", "_", "i", "f"];

/// Longest extra tail accepted by the catalog prefix scan.
const MAX_SUFFIX_LEN: usize = 4;

/// Maps canonical instrument codes to the names this broker trades them under.
pub struct SymbolResolver {
    broker: Arc<dyn Broker>,
    cache: Mutex<HashMap<String, String>>,
}

impl SymbolResolver {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached(&self, canonical: &str) -> Option<String> {
        self.cache.lock().get(canonical).cloned()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        info!("Symbol cache cleared");
    }

    async fn exists(&self, name: &str) -> Option<bool> {
        match self.broker.symbol_info(name).await {
            Ok(info) => Some(info.is_some()),
            Err(e) => {
                warn!("Symbol lookup for {} failed: {}", name, e);
                None
            }
        }
    }

    fn remember(&self, canonical: &str, actual: &str) {
        self.cache
            .lock()
            .insert(canonical.to_string(), actual.to_string());
    }

    /// Returns the broker symbol for `canonical`, or `None` when the broker
    /// does not list it.
    pub async fn resolve(&self, canonical: &str) -> Option<String> {
        if let Some(cached) = self.cached(canonical) {
            match self.exists(&cached).await {
                Some(true) => return Some(cached),
                Some(false) => {
                    debug!("Cached symbol {} no longer listed", cached);
                    self.cache.lock().remove(canonical);
                }
                None => return None,
            }
        }

        for decoration in DECORATIONS {
            let candidate = format!("{}{}", canonical, decoration);
            match self.exists(&candidate).await {
                Some(true) => {
                    if candidate != canonical {
                        info!("Symbol resolved: {} -> {}", canonical, candidate);
                    }
                    self.remember(canonical, &candidate);
                    return Some(candidate);
                }
                Some(false) => {}
                None => return None,
            }
        }

        debug!("Scanning broker catalog for {}", canonical);
        let catalog = match self.broker.symbol_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to fetch symbol catalog: {}", e);
                return None;
            }
        };

        let wanted = canonical.to_lowercase();
        let by_prefix = catalog.iter().find(|name| {
            let lower = name.to_lowercase();
            lower.starts_with(&wanted) && lower.len() - wanted.len() <= MAX_SUFFIX_LEN
        });
        if let Some(name) = by_prefix {
            info!("Symbol resolved: {} -> {}", canonical, name);
            self.remember(canonical, name);
            return Some(name.clone());
        }

        if let Some(name) = catalog
            .iter()
            .find(|name| name.to_lowercase().contains(&wanted))
        {
            warn!(
                "Symbol {} loosely matched {} (not cached, verify manually)",
                canonical, name
            );
            return Some(name.clone());
        }

        let stem: String = wanted.chars().take(4).collect();
        let similar: Vec<&str> = catalog
            .iter()
            .filter(|name| name.to_lowercase().contains(&stem))
            .take(5)
            .map(String::as_str)
            .collect();
        if similar.is_empty() {
            warn!("Symbol {} not found at broker", canonical);
        } else {
            warn!(
                "Symbol {} not found at broker; similar: {}",
                canonical,
                similar.join(", ")
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use crate::test_helpers::symbol_info;

    fn resolver_with(broker: &Arc<PaperBroker>) -> SymbolResolver {
        SymbolResolver::new(broker.clone())
    }

    #[tokio::test]
    async fn decoration_hit_is_cached_without_catalog_scan() {
        let broker = Arc::new(PaperBroker::with_default_catalog(10_000.0));
        let resolver = resolver_with(&broker);

        assert_eq!(resolver.resolve("XAUUSD").await.as_deref(), Some("XAUUSDm"));
        assert_eq!(resolver.resolve("EURUSD").await.as_deref(), Some("EURUSD."));
        assert_eq!(resolver.cached("XAUUSD").as_deref(), Some("XAUUSDm"));
        assert_eq!(broker.catalog_fetch_count(), 0);
    }

    #[tokio::test]
    async fn second_resolve_does_not_rescan_catalog() {
        let broker = Arc::new(PaperBroker::with_default_catalog(10_000.0));
        broker.add_symbol(symbol_info("GBPJPY.raw", 3, 0.001, 10), 195.0, 195.02);
        let resolver = resolver_with(&broker);

        assert_eq!(resolver.resolve("GBPJPY").await.as_deref(), Some("GBPJPY.raw"));
        assert_eq!(broker.catalog_fetch_count(), 1);

        assert_eq!(resolver.resolve("GBPJPY").await.as_deref(), Some("GBPJPY.raw"));
        assert_eq!(broker.catalog_fetch_count(), 1);
    }

    #[tokio::test]
    async fn loose_match_is_returned_but_not_cached() {
        let broker = Arc::new(PaperBroker::with_default_catalog(10_000.0));
        let resolver = resolver_with(&broker);

        assert_eq!(resolver.resolve("US30").await.as_deref(), Some("US30.cash"));
        assert!(resolver.cached("US30").is_none());
        resolver.resolve("US30").await;
        assert_eq!(broker.catalog_fetch_count(), 2);
    }

    #[tokio::test]
    async fn stale_cache_entry_is_replaced() {
        let broker = Arc::new(PaperBroker::with_default_catalog(10_000.0));
        let resolver = resolver_with(&broker);
        assert_eq!(resolver.resolve("XAUUSD").await.as_deref(), Some("XAUUSDm"));

        broker.remove_symbol("XAUUSDm");
        broker.add_symbol(symbol_info("XAUUSD+", 2, 0.01, 30), 3340.0, 3340.3);
        assert_eq!(resolver.resolve("XAUUSD").await.as_deref(), Some("XAUUSD+"));
        assert_eq!(resolver.cached("XAUUSD").as_deref(), Some("XAUUSD+"));
    }

    #[tokio::test]
    async fn unknown_symbol_resolves_to_none() {
        let broker = Arc::new(PaperBroker::with_default_catalog(10_000.0));
        let resolver = resolver_with(&broker);
        assert!(resolver.resolve("ZZZYYY").await.is_none());
        resolver.clear_cache();
        assert!(resolver.cached("XAUUSD").is_none());
    }
}
