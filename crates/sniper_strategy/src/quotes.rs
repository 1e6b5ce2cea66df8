//! Quote book — pipeline-side view over the shared price cache.

use std::time::Duration;

use kalshi_client::{PriceCache, PriceEntry};

/// Read-only helpers over the WebSocket-fed price cache.
#[derive(Clone)]
pub struct QuoteBook {
    cache: PriceCache,
}

impl QuoteBook {
    pub fn new(cache: PriceCache) -> Self {
        Self { cache }
    }

    /// Get the underlying PriceCache (for the WS client / diagnostics).
    pub fn inner(&self) -> &PriceCache {
        &self.cache
    }

    /// Get a single quote for a ticker.
    pub async fn get(&self, ticker: &str) -> Option<PriceEntry> {
        let cache = self.cache.read().await;
        cache.get(ticker).cloned()
    }

    /// Get a quote only if it is fresher than `max_age_secs`.
    pub async fn fresh(&self, ticker: &str, max_age_secs: u64) -> Option<PriceEntry> {
        let cache = self.cache.read().await;
        let entry = cache.get(ticker)?;
        if entry.updated_at.elapsed() > Duration::from_secs(max_age_secs) {
            return None;
        }
        Some(entry.clone())
    }

    /// Number of tickers with a cached quote.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kalshi_client::new_price_cache;
    use std::time::Instant;

    async fn make_cache_with(entries: Vec<(&str, i64, i64)>) -> PriceCache {
        let cache = new_price_cache();
        {
            let mut map = cache.write().await;
            for (ticker, bid, ask) in entries {
                map.insert(
                    ticker.to_string(),
                    PriceEntry {
                        yes_bid: bid,
                        yes_ask: ask,
                        last_price: (bid + ask) / 2,
                        updated_at: Instant::now(),
                    },
                );
            }
        }
        cache
    }

    #[tokio::test]
    async fn test_get_present_and_missing() {
        let cache = make_cache_with(vec![("A", 40, 45)]).await;
        let qb = QuoteBook::new(cache);
        assert_eq!(qb.get("A").await.unwrap().yes_ask, 45);
        assert!(qb.get("B").await.is_none());
    }

    #[tokio::test]
    async fn test_fresh_rejects_old_quote() {
        let cache = make_cache_with(vec![("A", 40, 45)]).await;
        {
            let mut map = cache.write().await;
            map.get_mut("A").unwrap().updated_at = Instant::now() - Duration::from_secs(120);
        }
        let qb = QuoteBook::new(cache);
        assert!(qb.fresh("A", 60).await.is_none());
        assert!(qb.fresh("A", 300).await.is_some());
    }

    #[tokio::test]
    async fn test_len() {
        let cache = make_cache_with(vec![("A", 40, 45), ("B", 50, 55)]).await;
        let qb = QuoteBook::new(cache);
        assert_eq!(qb.len().await, 2);
        assert!(!qb.is_empty().await);
    }
}
