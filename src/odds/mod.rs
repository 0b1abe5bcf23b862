pub mod cache;
pub mod client;
pub mod normalize;

pub use cache::CachedOdds;
pub use client::OddsApiClient;
pub use normalize::{drop_longshots, normalize_games, Game};

use async_trait::async_trait;

use crate::error::OddsError;
use crate::store::models::MarketKind;

/// Trait that every odds provider must implement.
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Fetch every upcoming game with its bookmaker quotes for `markets`.
    async fn fetch_games(&self, markets: &[MarketKind]) -> Result<Vec<Game>, OddsError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
