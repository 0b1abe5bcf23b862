use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OddsError;

/// Bet category as keyed by the odds provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketKind {
    #[serde(rename = "h2h")]
    Moneyline,
    #[serde(rename = "spreads")]
    Spread,
    #[serde(rename = "totals")]
    Total,
}

impl MarketKind {
    pub const ALL: [MarketKind; 3] = [MarketKind::Moneyline, MarketKind::Spread, MarketKind::Total];

    /// Provider market key ("h2h", "spreads", "totals").
    pub fn api_key(self) -> &'static str {
        match self {
            MarketKind::Moneyline => "h2h",
            MarketKind::Spread => "spreads",
            MarketKind::Total => "totals",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            MarketKind::Moneyline => "Moneyline",
            MarketKind::Spread => "Spread",
            MarketKind::Total => "Over/Under",
        }
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_key())
    }
}

impl FromStr for MarketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "h2h" | "moneyline" => Ok(MarketKind::Moneyline),
            "spreads" | "spread" => Ok(MarketKind::Spread),
            "totals" | "total" => Ok(MarketKind::Total),
            other => Err(format!("unknown market key '{}'", other)),
        }
    }
}

/// One quoted betting line as offered by a single book, before scoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    /// "{away} @ {home}"
    pub matchup: String,
    /// Sportsbook title, e.g. "DraftKings"
    pub book: String,
    pub market: MarketKind,
    /// Team or side, with the point value for spreads and totals
    pub selection: String,
    /// Decimal payout multiplier (> 1.0)
    pub odds: f64,
    /// 1 / odds, no vig adjustment
    pub implied_probability: f64,
}

impl Quote {
    /// Build a quote, rejecting rows with a missing label or unusable price.
    pub fn new(
        matchup: impl Into<String>,
        book: impl Into<String>,
        market: MarketKind,
        selection: impl Into<String>,
        odds: f64,
    ) -> Result<Self, OddsError> {
        let matchup = matchup.into();
        let book = book.into();
        let selection = selection.into();
        if matchup.trim().is_empty() {
            return Err(OddsError::InvalidQuote("empty matchup".into()));
        }
        if book.trim().is_empty() {
            return Err(OddsError::InvalidQuote(format!("empty book for {}", matchup)));
        }
        if selection.trim().is_empty() {
            return Err(OddsError::InvalidQuote(format!("empty selection for {}", matchup)));
        }
        if !odds.is_finite() || odds <= 1.0 {
            return Err(OddsError::InvalidQuote(format!(
                "odds {} out of range for {} / {}",
                odds, matchup, selection
            )));
        }
        Ok(Quote {
            matchup,
            book,
            market,
            selection,
            odds,
            implied_probability: 1.0 / odds,
        })
    }
}

/// A quote with its projection, book weight and edge computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub matchup: String,
    pub book: String,
    pub market: MarketKind,
    pub selection: String,
    pub odds: f64,
    pub implied_probability: f64,
    /// Estimated true win probability
    pub projection: f64,
    /// Trust multiplier for the book (>= 1.0)
    pub book_weight: f64,
    /// (projection - implied_probability) * book_weight
    pub edge: f64,
}

impl Line {
    pub fn score(quote: Quote, projection: f64, book_weight: f64) -> Self {
        let edge = (projection - quote.implied_probability) * book_weight;
        Line {
            matchup: quote.matchup,
            book: quote.book,
            market: quote.market,
            selection: quote.selection,
            odds: quote.odds,
            implied_probability: quote.implied_probability,
            projection,
            book_weight,
            edge,
        }
    }
}

/// Manually annotated outcome of a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetResult {
    #[serde(rename = "W")]
    Win,
    #[serde(rename = "L")]
    Loss,
    #[serde(rename = "P")]
    Push,
}

impl BetResult {
    /// Parse a record cell; blanks and unknown markers are unannotated.
    pub fn parse(cell: &str) -> Option<Self> {
        match cell.trim().to_uppercase().as_str() {
            "W" => Some(BetResult::Win),
            "L" => Some(BetResult::Loss),
            "P" => Some(BetResult::Push),
            _ => None,
        }
    }
}

/// A selected line tracked for a given day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pick {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub line: Line,
    pub result: Option<BetResult>,
}

impl Pick {
    pub fn new(date: NaiveDate, line: Line) -> Self {
        Pick {
            date,
            line,
            result: None,
        }
    }

    /// Units won or lost on a one-unit stake; `None` until annotated.
    pub fn unit_return(&self) -> Option<f64> {
        self.result.map(|r| match r {
            BetResult::Win => self.line.odds - 1.0,
            BetResult::Loss => -1.0,
            BetResult::Push => 0.0,
        })
    }
}

/// All picks persisted for one calendar date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub picks: Vec<Pick>,
}

/// One row of the historical performance log: a book's graded results on a
/// single Daily Record date. The log holds at most one row per (date, book).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    /// Daily Record date the results belong to
    pub date: NaiveDate,
    /// When the row was last computed
    pub recorded_at: DateTime<Utc>,
    pub book: String,
    pub bets: u32,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    /// wins / (wins + losses), blank when no decided bets
    pub win_rate: Option<f64>,
    pub roi: f64,
}
