//! Edge scoring.
//!
//! `edge = (projection − implied_probability) × book_weight`
//!
//! This is a crude filter, not a pricing model: the projection is either a
//! flat constant or the consensus of the books themselves. The only promise
//! is determinism for a given quote table and weight table.
use std::collections::HashMap;
use std::str::FromStr;

use crate::store::models::{Line, MarketKind, Quote};

/// Where the estimated win probability for a quote comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionStrategy {
    /// Same projection for every line.
    Fixed(f64),
    /// Mean implied probability over every quote for the same game and market.
    MarketMean,
}

impl Default for ProjectionStrategy {
    fn default() -> Self {
        ProjectionStrategy::Fixed(DEFAULT_PROJECTION)
    }
}

pub const DEFAULT_PROJECTION: f64 = 0.55;

/// Per-book trust multipliers; unlisted books weigh 1.0.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookWeights {
    weights: HashMap<String, f64>,
}

impl BookWeights {
    pub fn weight(&self, book: &str) -> f64 {
        self.weights.get(book).copied().unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Every book with an explicit weight.
    pub fn books(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }
}

/// Sharp-book uplift table used when none is configured.
pub const DEFAULT_BOOK_WEIGHTS: &str =
    "DraftKings=1.15,BetMGM=1.12,Caesars=1.10,PointsBet=1.08,FanDuel=1.05";

impl FromStr for BookWeights {
    type Err = String;

    /// Parse `Book=1.1,Other Book=1.05`. Weights below 1.0 are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut weights = HashMap::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (book, w) = pair
                .rsplit_once('=')
                .ok_or_else(|| format!("expected Book=weight, got '{}'", pair))?;
            let w: f64 = w
                .trim()
                .parse()
                .map_err(|_| format!("invalid weight in '{}'", pair))?;
            if !w.is_finite() || w < 1.0 {
                return Err(format!("weight for '{}' must be >= 1.0", book.trim()));
            }
            weights.insert(book.trim().to_string(), w);
        }
        Ok(BookWeights { weights })
    }
}

/// Score quotes into lines, preserving input order.
pub fn score_quotes(
    quotes: Vec<Quote>,
    strategy: ProjectionStrategy,
    weights: &BookWeights,
) -> Vec<Line> {
    let means = match strategy {
        ProjectionStrategy::Fixed(_) => HashMap::new(),
        ProjectionStrategy::MarketMean => market_means(&quotes),
    };

    quotes
        .into_iter()
        .map(|q| {
            let projection = match strategy {
                ProjectionStrategy::Fixed(p) => p,
                ProjectionStrategy::MarketMean => means
                    .get(&(q.matchup.clone(), q.market))
                    .copied()
                    .unwrap_or(q.implied_probability),
            };
            let weight = weights.weight(&q.book);
            Line::score(q, projection, weight)
        })
        .collect()
}

fn market_means(quotes: &[Quote]) -> HashMap<(String, MarketKind), f64> {
    let mut sums: HashMap<(String, MarketKind), (f64, usize)> = HashMap::new();
    for q in quotes {
        let entry = sums.entry((q.matchup.clone(), q.market)).or_default();
        entry.0 += q.implied_probability;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect()
}
