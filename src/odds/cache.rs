//! Time-bounded memoization of the odds fetch.
//!
//! The provider meters requests, so repeated cycles inside the TTL reuse the
//! previous response. The slot lock is held across the provider call, which
//! also keeps two fetches from ever overlapping. Failures are returned as-is
//! and never cached; a stale slate is never served in place of an error.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::normalize::Game;
use super::OddsSource;
use crate::error::OddsError;
use crate::store::models::MarketKind;

#[derive(Clone)]
pub struct CachedOdds {
    source: Arc<dyn OddsSource>,
    ttl: Duration,
    slot: Arc<Mutex<Option<CacheEntry>>>,
}

struct CacheEntry {
    markets: Vec<MarketKind>,
    fetched_at: Instant,
    games: Arc<Vec<Game>>,
}

impl CachedOdds {
    pub fn new(source: Arc<dyn OddsSource>, ttl: Duration) -> Self {
        CachedOdds {
            source,
            ttl,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Return the memoized games for `markets`, fetching when absent or expired.
    pub async fn fetch(&self, markets: &[MarketKind]) -> Result<Arc<Vec<Game>>, OddsError> {
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.as_ref() {
            if entry.markets == markets && entry.fetched_at.elapsed() < self.ttl {
                debug!(
                    "Serving cached odds ({}s old)",
                    entry.fetched_at.elapsed().as_secs()
                );
                return Ok(Arc::clone(&entry.games));
            }
        }

        let games = Arc::new(self.source.fetch_games(markets).await?);
        info!(
            "Refreshed odds from {} ({} games, cached for {:?})",
            self.source.name(),
            games.len(),
            self.ttl
        );
        *slot = Some(CacheEntry {
            markets: markets.to_vec(),
            fetched_at: Instant::now(),
            games: Arc::clone(&games),
        });
        Ok(games)
    }

    /// Drop the memoized response so the next fetch goes upstream.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}
