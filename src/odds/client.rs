use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::normalize::Game;
use super::OddsSource;
use crate::error::OddsError;
use crate::store::models::MarketKind;

/// Client for The Odds API v4 (`/sports/{sport}/odds`).
#[derive(Clone)]
pub struct OddsApiClient {
    http: Client,
    base_url: String,
    api_key: String,
    sport: String,
    regions: String,
}

impl OddsApiClient {
    pub fn new(base_url: &str, api_key: &str, sport: &str, regions: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(OddsApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            sport: sport.to_string(),
            regions: regions.to_string(),
        })
    }

    fn odds_url(&self) -> String {
        format!("{}/sports/{}/odds", self.base_url, self.sport)
    }
}

/// Comma-joined provider keys, e.g. `h2h,spreads,totals`.
pub fn market_param(markets: &[MarketKind]) -> String {
    markets
        .iter()
        .map(|m| m.api_key())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl OddsSource for OddsApiClient {
    fn name(&self) -> &str {
        "TheOddsAPI"
    }

    async fn fetch_games(&self, markets: &[MarketKind]) -> Result<Vec<Game>, OddsError> {
        let url = self.odds_url();
        let markets = market_param(markets);
        debug!("Fetching odds from {} (markets={})", url, markets);

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("regions", self.regions.as_str()),
                ("markets", markets.as_str()),
                ("oddsFormat", "decimal"),
                ("dateFormat", "iso"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if let Some(remaining) = resp
            .headers()
            .get("x-requests-remaining")
            .and_then(|v| v.to_str().ok())
        {
            debug!("Odds API requests remaining: {}", remaining);
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OddsError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let games: Vec<Game> = serde_json::from_str(&body)?;
        info!("Fetched {} {} game(s) from The Odds API", games.len(), self.sport);
        Ok(games)
    }
}
