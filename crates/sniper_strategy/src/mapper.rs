//! Market mapper — resolves free-text team names to Kalshi contracts.
//!
//! Loads the open-market catalog once, splits each title into candidate
//! team names, and serves fuzzy lookups against an immutable snapshot.
//! A reload builds a fresh snapshot and swaps it atomically, so in-flight
//! lookups never observe a half-built index.

use std::sync::Arc;

use common::{Error, MarketInfo};
use kalshi_client::KalshiRestClient;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

const CATALOG_PAGE_LIMIT: u32 = 200;

/// A tradeable contract from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub ticker: String,
    pub title: String,
    pub teams: Vec<String>,
}

/// Immutable index built from one catalog load.
#[derive(Debug, Default)]
struct MapperSnapshot {
    contracts: Vec<Contract>,
    /// Flat (team name, contract index) pairs for fuzzy lookup.
    team_index: Vec<(String, usize)>,
}

/// Resolves team names to contracts without network I/O per lookup.
pub struct MarketMapper {
    min_match_score: u32,
    /// One-time-load guard: true once a catalog has been installed via `load`.
    load_lock: Mutex<bool>,
    snapshot: RwLock<Arc<MapperSnapshot>>,
}

impl MarketMapper {
    pub fn new(min_match_score: u32) -> Self {
        Self {
            min_match_score,
            load_lock: Mutex::new(false),
            snapshot: RwLock::new(Arc::new(MapperSnapshot::default())),
        }
    }

    /// Fetch the open-contract catalog and build the index.
    ///
    /// Idempotent: a second call while already loaded is a no-op.
    pub async fn load(&self, client: &KalshiRestClient) -> Result<usize, Error> {
        let mut loaded = self.load_lock.lock().await;
        if *loaded {
            debug!("Market catalog already loaded; skipping");
            return Ok(self.contract_count().await);
        }

        let markets = client.get_markets(Some("open"), CATALOG_PAGE_LIMIT).await?;
        let count = self.install_catalog(markets).await;
        *loaded = true;
        Ok(count)
    }

    /// Fetch a fresh catalog and atomically replace the index.
    pub async fn reload(&self, client: &KalshiRestClient) -> Result<usize, Error> {
        let mut loaded = self.load_lock.lock().await;
        let markets = client.get_markets(Some("open"), CATALOG_PAGE_LIMIT).await?;
        let count = self.install_catalog(markets).await;
        *loaded = true;
        Ok(count)
    }

    /// Build a snapshot from raw markets and swap it in.
    ///
    /// Markets whose titles yield no team names are excluded.
    pub async fn install_catalog(&self, markets: Vec<MarketInfo>) -> usize {
        let mut contracts = Vec::new();
        let mut team_index = Vec::new();

        for market in markets {
            let teams = extract_teams(&market.title);
            if teams.is_empty() {
                continue;
            }
            let idx = contracts.len();
            for team in &teams {
                team_index.push((team.clone(), idx));
            }
            contracts.push(Contract {
                ticker: market.ticker,
                title: market.title,
                teams,
            });
        }

        let count = contracts.len();
        info!(
            "Market catalog indexed: {} contracts, {} team names",
            count,
            team_index.len()
        );

        let snapshot = Arc::new(MapperSnapshot {
            contracts,
            team_index,
        });
        *self.snapshot.write().await = snapshot;
        count
    }

    /// Resolve a free-text team name to the best-matching contract.
    ///
    /// Returns `None` for an empty index, no candidate at all, or a best
    /// match scoring below the configured minimum — a low-confidence match
    /// must never resolve, because resolution feeds capital deployment.
    pub async fn resolve(&self, name: &str) -> Option<Contract> {
        let snapshot = self.snapshot.read().await.clone();
        if snapshot.team_index.is_empty() {
            return None;
        }

        let mut best_score = 0u32;
        let mut best_idx: Option<usize> = None;
        for (team, idx) in &snapshot.team_index {
            let score = weighted_ratio(name, team);
            if score > best_score {
                best_score = score;
                best_idx = Some(*idx);
            }
        }

        let idx = best_idx?;
        if best_score < self.min_match_score {
            debug!(
                "Low-confidence match skipped: '{}' → '{}' (score {} < {})",
                name, snapshot.contracts[idx].title, best_score, self.min_match_score
            );
            return None;
        }

        Some(snapshot.contracts[idx].clone())
    }

    /// Tickers of all indexed contracts (for WS subscription).
    pub async fn tickers(&self) -> Vec<String> {
        let snapshot = self.snapshot.read().await.clone();
        snapshot.contracts.iter().map(|c| c.ticker.clone()).collect()
    }

    /// Number of indexed contracts.
    pub async fn contract_count(&self) -> usize {
        self.snapshot.read().await.contracts.len()
    }
}

/// Split a market title into candidate team names.
///
/// The separator is a whole token ("vs", "vs.", "v.", "@") — substring
/// splitting would mangle names like "Mavs".
fn extract_teams(title: &str) -> Vec<String> {
    let mut teams = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for token in title.split_whitespace() {
        let lowered = token.to_ascii_lowercase();
        if matches!(lowered.as_str(), "vs" | "vs." | "v." | "@") {
            if !current.is_empty() {
                teams.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(token);
        }
    }
    if !current.is_empty() {
        teams.push(current.join(" "));
    }

    teams
}

/// Lowercase, strip punctuation, collapse whitespace.
fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if ch.is_whitespace() && !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.trim().to_string()
}

fn token_sort(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Weighted-ratio similarity on a 0-100 scale.
///
/// Takes the best of direct and token-sorted normalized Levenshtein
/// similarity, with a floor of 90 when one normalized name contains the
/// other (word-order and abbreviation tolerance for team names).
pub(crate) fn weighted_ratio(query: &str, candidate: &str) -> u32 {
    let a = normalize(query);
    let b = normalize(candidate);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let direct = strsim::normalized_levenshtein(&a, &b);
    let sorted = strsim::normalized_levenshtein(&token_sort(&a), &token_sort(&b));
    let mut best = direct.max(sorted);

    // Containment only counts for substantial names; a stray short token
    // must not score as a near-match against every title containing it.
    let min_len = a.len().min(b.len());
    if min_len >= 4 && (a.contains(&b) || b.contains(&a)) {
        best = best.max(0.9);
    }

    (best * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_market(ticker: &str, title: &str) -> MarketInfo {
        MarketInfo {
            ticker: ticker.into(),
            title: title.into(),
            status: "open".into(),
            yes_bid: 40,
            yes_ask: 45,
            last_price: 42,
        }
    }

    async fn loaded_mapper() -> MarketMapper {
        let mapper = MarketMapper::new(80);
        mapper
            .install_catalog(vec![
                make_market("CHIEFS-WIN", "Kansas City Chiefs vs Las Vegas Raiders"),
                make_market("BILLS-WIN", "Buffalo Bills @ Miami Dolphins"),
            ])
            .await;
        mapper
    }

    #[test]
    fn test_extract_teams_vs_and_at() {
        assert_eq!(
            extract_teams("Kansas City Chiefs vs Las Vegas Raiders"),
            vec!["Kansas City Chiefs", "Las Vegas Raiders"]
        );
        assert_eq!(
            extract_teams("Buffalo Bills @ Miami Dolphins"),
            vec!["Buffalo Bills", "Miami Dolphins"]
        );
    }

    #[test]
    fn test_extract_teams_does_not_split_inside_words() {
        assert_eq!(
            extract_teams("Dallas Mavs vs Los Angeles Lakers"),
            vec!["Dallas Mavs", "Los Angeles Lakers"]
        );
    }

    #[test]
    fn test_weighted_ratio_exact_and_garbage() {
        assert_eq!(weighted_ratio("Kansas City Chiefs", "Kansas City Chiefs"), 100);
        assert!(weighted_ratio("Zzyzx Nonexistent Team", "Kansas City Chiefs") < 50);
    }

    #[test]
    fn test_weighted_ratio_containment() {
        assert!(weighted_ratio("Chiefs", "Kansas City Chiefs") >= 90);
    }

    #[tokio::test]
    async fn test_resolve_exact_team() {
        let mapper = loaded_mapper().await;
        let contract = mapper.resolve("Kansas City Chiefs").await.expect("should resolve");
        assert_eq!(contract.ticker, "CHIEFS-WIN");
    }

    #[tokio::test]
    async fn test_resolve_away_team_of_at_title() {
        let mapper = loaded_mapper().await;
        let contract = mapper.resolve("Miami Dolphins").await.expect("should resolve");
        assert_eq!(contract.ticker, "BILLS-WIN");
    }

    #[tokio::test]
    async fn test_resolve_unknown_team_is_none() {
        let mapper = loaded_mapper().await;
        assert!(mapper.resolve("Zzyzx Nonexistent Team").await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_empty_index_is_none() {
        let mapper = MarketMapper::new(80);
        assert!(mapper.resolve("Kansas City Chiefs").await.is_none());
    }

    #[tokio::test]
    async fn test_titleless_markets_excluded() {
        let mapper = MarketMapper::new(80);
        let count = mapper
            .install_catalog(vec![make_market("BLANK", ""), make_market("OK", "A vs B")])
            .await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_reload_swaps_catalog() {
        let mapper = loaded_mapper().await;
        mapper
            .install_catalog(vec![make_market("JETS-WIN", "New York Jets vs New England Patriots")])
            .await;
        assert!(mapper.resolve("Kansas City Chiefs").await.is_none());
        assert!(mapper.resolve("New York Jets").await.is_some());
        assert_eq!(mapper.tickers().await, vec!["JETS-WIN".to_string()]);
    }
}
