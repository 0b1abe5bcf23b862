use clap::{Parser, ValueEnum};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::engine::edge::{BookWeights, ProjectionStrategy, DEFAULT_BOOK_WEIGHTS, DEFAULT_PROJECTION};
use crate::engine::selection::DedupScope;
use crate::engine::threshold::DEFAULT_EDGE_THRESHOLD;
use crate::engine::EngineSettings;
use crate::store::models::MarketKind;
use crate::store::RecordPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProjectionKind {
    /// Constant projection from FIXED_PROJECTION
    Fixed,
    /// Consensus implied probability across books for the same game and market
    MarketMean,
}

/// Daily sportsbook edge finder and pick tracker
#[derive(Parser, Debug, Clone)]
#[command(name = "daily-locks", version, about)]
pub struct Config {
    /// Run a single generation cycle, print the board and exit
    #[arg(long)]
    pub once: bool,

    /// The Odds API key
    #[arg(long, env = "ODDS_API_KEY", hide_env_values = true)]
    pub odds_api_key: String,

    /// The Odds API base URL
    #[arg(long, env = "ODDS_API_URL", default_value = "https://api.the-odds-api.com/v4")]
    pub odds_api_url: String,

    /// Sport key to pull odds for
    #[arg(long, env = "SPORT_KEY", default_value = "baseball_mlb")]
    pub sport_key: String,

    /// Bookmaker regions (comma separated)
    #[arg(long, env = "ODDS_REGIONS", default_value = "us")]
    pub odds_regions: String,

    /// Dashboard listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    /// Directory holding one YYYY-MM-DD.csv record per day
    #[arg(long, env = "DAILY_BETS_DIR", default_value = "daily_bets")]
    pub daily_bets_dir: PathBuf,

    /// Historical per-book performance log
    #[arg(
        long,
        env = "PERFORMANCE_LOG_PATH",
        default_value = "data/book_performance_log.csv"
    )]
    pub performance_log_path: PathBuf,

    /// Write every scored line (pre-filter) here on each cycle
    #[arg(long, env = "EXPORT_PATH")]
    pub export_path: Option<PathBuf>,

    /// How each line's win probability is projected
    #[arg(long, env = "PROJECTION", value_enum, default_value = "fixed")]
    pub projection: ProjectionKind,

    /// Projection used by the fixed strategy (0.0–1.0)
    #[arg(long, env = "FIXED_PROJECTION", default_value_t = DEFAULT_PROJECTION)]
    pub fixed_projection: f64,

    /// Book trust multipliers, e.g. "DraftKings=1.15,FanDuel=1.05"
    #[arg(long, env = "BOOK_WEIGHTS", default_value = DEFAULT_BOOK_WEIGHTS)]
    pub book_weights: BookWeights,

    /// Books eligible for selection (comma separated); empty falls back to the weighted books
    #[arg(
        long,
        env = "TRUSTED_BOOKS",
        value_delimiter = ',',
        default_value = "FanDuel,DraftKings,BetMGM"
    )]
    pub trusted_books: Vec<String>,

    /// Only select lines from trusted books
    #[arg(
        long,
        env = "RESTRICT_TO_TRUSTED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub restrict_to_trusted: bool,

    /// One pick per game and market, or one per game overall
    #[arg(long, env = "DEDUP", value_enum, default_value = "per-market")]
    pub dedup: DedupScope,

    /// Picks shown per market
    #[arg(long, env = "TOP_N", default_value = "5")]
    pub top_n: usize,

    /// Drop quotes priced above this decimal multiplier
    #[arg(long, env = "MAX_ODDS", default_value = "3.0")]
    pub max_odds: f64,

    /// Fixed minimum edge; overrides the threshold derived from history
    #[arg(long, env = "MIN_EDGE")]
    pub min_edge: Option<f64>,

    /// Threshold used when history is missing or inconclusive
    #[arg(long, env = "DEFAULT_EDGE_THRESHOLD", default_value_t = DEFAULT_EDGE_THRESHOLD)]
    pub default_edge_threshold: f64,

    /// Keep the first record written for a day, or replace it every cycle
    #[arg(long, env = "RECORD_POLICY", value_enum, default_value = "write-once")]
    pub record_policy: RecordPolicy,

    /// How long fetched odds are reused (seconds)
    #[arg(long, env = "CACHE_TTL_SECS", default_value = "3600")]
    pub cache_ttl_secs: u64,

    /// Background generation interval for the dashboard (seconds)
    #[arg(long, env = "CYCLE_INTERVAL_SECS", default_value = "3600")]
    pub cycle_interval_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.odds_api_key.trim().is_empty() {
            anyhow::bail!("ODDS_API_KEY must not be empty");
        }
        if !(0.0..=1.0).contains(&self.fixed_projection) {
            anyhow::bail!("fixed_projection must be between 0.0 and 1.0");
        }
        if self.max_odds.is_nan() || self.max_odds <= 1.0 {
            anyhow::bail!("max_odds must be greater than 1.0");
        }
        if self.top_n == 0 {
            anyhow::bail!("top_n must be at least 1");
        }
        if let Some(e) = self.min_edge {
            if !e.is_finite() {
                anyhow::bail!("min_edge must be a finite number");
            }
        }
        if !(0.08..=0.10).contains(&self.default_edge_threshold) {
            anyhow::bail!("default_edge_threshold must be between 0.08 and 0.10");
        }
        if self.cycle_interval_secs == 0 {
            anyhow::bail!("cycle_interval_secs must be positive");
        }
        if self.restrict_to_trusted && self.trusted_books.is_empty() && self.book_weights.is_empty() {
            anyhow::bail!("RESTRICT_TO_TRUSTED needs TRUSTED_BOOKS or BOOK_WEIGHTS");
        }
        Ok(())
    }

    pub fn projection_strategy(&self) -> ProjectionStrategy {
        match self.projection {
            ProjectionKind::Fixed => ProjectionStrategy::Fixed(self.fixed_projection),
            ProjectionKind::MarketMean => ProjectionStrategy::MarketMean,
        }
    }

    /// The selection allow-list, or `None` when every book is eligible.
    pub fn allowed_books(&self) -> Option<HashSet<String>> {
        if !self.restrict_to_trusted {
            return None;
        }
        if self.trusted_books.is_empty() {
            return Some(self.book_weights.books().map(str::to_string).collect());
        }
        Some(
            self.trusted_books
                .iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect(),
        )
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            markets: MarketKind::ALL.to_vec(),
            max_odds: self.max_odds,
            projection: self.projection_strategy(),
            book_weights: self.book_weights.clone(),
            trusted_books: self.allowed_books(),
            dedup: self.dedup,
            top_n: self.top_n,
            min_edge: self.min_edge,
            default_threshold: self.default_edge_threshold,
            record_policy: self.record_policy,
            export_path: self.export_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["daily-locks", "--odds-api-key", "k"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_validate() {
        let c = parse(&[]);
        c.validate().unwrap();
        assert_eq!(c.projection_strategy(), ProjectionStrategy::Fixed(0.55));
        assert_eq!(c.record_policy, RecordPolicy::WriteOnce);
        assert_eq!(c.dedup, DedupScope::PerMarket);

        let s = c.engine_settings();
        assert_eq!(s.top_n, 5);
        assert_eq!(s.markets, MarketKind::ALL.to_vec());
        let books = s.trusted_books.unwrap();
        assert_eq!(books.len(), 3);
        assert!(books.contains("DraftKings") && books.contains("BetMGM"));
        assert!(!books.contains("Caesars"));
    }

    #[test]
    fn explicit_trusted_books_and_unrestricted() {
        let c = parse(&["--trusted-books", "FanDuel, BetMGM"]);
        let books = c.allowed_books().unwrap();
        assert_eq!(books.len(), 2);
        assert!(books.contains("BetMGM"));

        let c = parse(&["--restrict-to-trusted", "false"]);
        assert!(c.allowed_books().is_none());
    }

    #[test]
    fn value_enums_parse() {
        let c = parse(&[
            "--projection",
            "market-mean",
            "--dedup",
            "global",
            "--record-policy",
            "overwrite",
        ]);
        assert_eq!(c.projection_strategy(), ProjectionStrategy::MarketMean);
        assert_eq!(c.dedup, DedupScope::Global);
        assert_eq!(c.record_policy, RecordPolicy::Overwrite);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--fixed-projection", "1.5"]).validate().is_err());
        assert!(parse(&["--max-odds", "1.0"]).validate().is_err());
        assert!(parse(&["--top-n", "0"]).validate().is_err());
        assert!(parse(&["--default-edge-threshold", "0.2"]).validate().is_err());
        assert!(Config::try_parse_from(["daily-locks", "--odds-api-key", "k", "--book-weights", "Bovada=0.9"]).is_err());
    }
}
