//! Flattening of provider game objects into individual quotes.
//!
//! One quote is produced per (game, bookmaker, market, outcome). Outcomes
//! that cannot be priced or labelled are dropped individually so that one bad
//! record never costs the rest of the slate.

use serde::Deserialize;
use tracing::debug;

use crate::store::models::{MarketKind, Quote};

/// A game as returned by the odds provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Game {
    pub id: String,
    pub commence_time: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Bookmaker {
    pub key: String,
    pub title: Option<String>,
    pub markets: Vec<Market>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Market {
    pub key: String,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Outcome {
    pub name: Option<String>,
    /// Decimal odds
    pub price: Option<f64>,
    /// Spread or total line; absent for moneylines
    pub point: Option<f64>,
}

/// Build the display label for an outcome.
///
/// Spreads carry an explicit sign (`"Yankees +1.5"`), totals the bare line
/// (`"Over 8.5"`). Whole-number points keep one decimal (`"Over 7.0"`) so
/// labels match records written by earlier tooling. Returns `None` when a
/// spread or total has no point.
pub fn bet_label(market: MarketKind, name: &str, point: Option<f64>) -> Option<String> {
    match market {
        MarketKind::Moneyline => Some(name.to_string()),
        MarketKind::Spread => {
            let p = point?;
            // -0.0 would otherwise render as "+-0.0"
            let p = if p == 0.0 { 0.0 } else { p };
            let sign = if p >= 0.0 { "+" } else { "" };
            Some(format!("{} {}{}", name, sign, format_point(p)))
        }
        MarketKind::Total => point.map(|p| format!("{} {}", name, format_point(p.abs()))),
    }
}

fn format_point(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("{:.1}", p)
    } else {
        p.to_string()
    }
}

/// Flatten games into quotes for the requested markets.
pub fn normalize_games(games: &[Game], markets: &[MarketKind]) -> Vec<Quote> {
    let mut quotes = Vec::new();
    let mut skipped = 0usize;

    for game in games {
        let (Some(home), Some(away)) = (game.home_team.as_deref(), game.away_team.as_deref()) else {
            debug!("Skipping game {} without team names", game.id);
            continue;
        };
        let matchup = format!("{} @ {}", away, home);

        for bookmaker in &game.bookmakers {
            let Some(book) = bookmaker.title.as_deref() else {
                skipped += bookmaker.markets.iter().map(|m| m.outcomes.len()).sum::<usize>();
                continue;
            };
            for market in &bookmaker.markets {
                let kind = match market.key.parse::<MarketKind>() {
                    Ok(k) if markets.contains(&k) => k,
                    _ => {
                        debug!("Ignoring market '{}' from {}", market.key, book);
                        continue;
                    }
                };
                for outcome in &market.outcomes {
                    let quote = outcome_quote(&matchup, book, kind, outcome);
                    match quote {
                        Some(q) => quotes.push(q),
                        None => skipped += 1,
                    }
                }
            }
        }
    }

    if skipped > 0 {
        debug!("Skipped {} malformed outcome(s)", skipped);
    }
    quotes
}

fn outcome_quote(matchup: &str, book: &str, market: MarketKind, outcome: &Outcome) -> Option<Quote> {
    let name = outcome.name.as_deref()?;
    let price = outcome.price?;
    let label = bet_label(market, name, outcome.point)?;
    Quote::new(matchup, book, market, label, price).ok()
}

/// Remove extreme longshots (`odds > max_odds`) from the pool.
pub fn drop_longshots(quotes: Vec<Quote>, max_odds: f64) -> Vec<Quote> {
    quotes.into_iter().filter(|q| q.odds <= max_odds).collect()
}
