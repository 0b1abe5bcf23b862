use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

use super::edge::{score_quotes, BookWeights, ProjectionStrategy};
use super::performance::{daily_book_snapshots, summarize, PerformanceFilter};
use super::selection::{select_lines, top_per_market, DedupScope, MarketPicks, SelectionPolicy};
use super::threshold::{derive_threshold, EdgeThreshold};
use crate::odds::{drop_longshots, normalize_games, CachedOdds};
use crate::store::models::{Line, MarketKind};
use crate::store::{export_lines, Ledger, LogOutcome, RecordPolicy};

/// Tunables for one generation cycle.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub markets: Vec<MarketKind>,
    /// Quotes priced above this are dropped as longshots.
    pub max_odds: f64,
    pub projection: ProjectionStrategy,
    pub book_weights: BookWeights,
    /// Restrict selection to these books when set.
    pub trusted_books: Option<HashSet<String>>,
    pub dedup: DedupScope,
    pub top_n: usize,
    /// Constant cutoff; `None` derives it from the performance log.
    pub min_edge: Option<f64>,
    pub default_threshold: f64,
    pub record_policy: RecordPolicy,
    /// Where to write the full scored line table each cycle.
    pub export_path: Option<PathBuf>,
}

/// Output of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub generated_at: DateTime<Utc>,
    pub date: NaiveDate,
    pub threshold: EdgeThreshold,
    pub dedup: DedupScope,
    pub games: usize,
    /// Every scored line, before filtering.
    #[serde(skip)]
    pub lines: Vec<Line>,
    /// Lines surviving threshold and dedup, best first.
    #[serde(skip)]
    pub selected: Vec<Line>,
    pub line_count: usize,
    pub selected_count: usize,
    pub board: Vec<MarketPicks>,
    pub record: LogOutcome,
}

/// Runs fetch → normalize → score → select → log, and the aggregation that
/// feeds the next cycle's threshold.
pub struct PickEngine {
    settings: EngineSettings,
    odds: CachedOdds,
    ledger: Ledger,
}

impl PickEngine {
    pub fn new(settings: EngineSettings, odds: CachedOdds, ledger: Ledger) -> Self {
        PickEngine {
            settings,
            odds,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn odds(&self) -> &CachedOdds {
        &self.odds
    }

    /// Threshold for the next selection pass, from configuration or the log.
    pub fn current_threshold(&self) -> EdgeThreshold {
        if let Some(min_edge) = self.settings.min_edge {
            return EdgeThreshold::configured(min_edge);
        }
        match self.ledger.read_performance_log() {
            Ok(history) => derive_threshold(&history, self.settings.default_threshold),
            Err(e) => {
                warn!(
                    "Performance log unreadable, using default threshold {:.2}: {:#}",
                    self.settings.default_threshold, e
                );
                EdgeThreshold::fallback(self.settings.default_threshold)
            }
        }
    }

    /// Summarize all Daily Records, upsert one performance row per graded
    /// date and book, then derive the threshold.
    ///
    /// Rerunning on unchanged records leaves the log as it was. Failures here
    /// only degrade the threshold to its default.
    pub fn aggregate(&self, now: DateTime<Utc>) -> EdgeThreshold {
        match self.ledger.load_all_records() {
            Ok(records) => {
                let summary = summarize(&records, &PerformanceFilter::default());
                let rows = daily_book_snapshots(&records, now);
                if !rows.is_empty() {
                    if let Err(e) = self.ledger.upsert_performance_snapshots(&rows) {
                        warn!("Failed to update performance log: {:#}", e);
                    }
                }
                info!(
                    "Performance: {} graded bet(s) over {} day(s), ROI {}",
                    summary.overall.bets,
                    summary.days_tracked,
                    summary
                        .overall
                        .roi
                        .map(|r| format!("{:+.1}%", r * 100.0))
                        .unwrap_or_else(|| "n/a".into())
                );
            }
            Err(e) => warn!("Could not load daily records: {:#}", e),
        }
        self.current_threshold()
    }

    /// Run one generation cycle for `today`.
    pub async fn run_cycle(&self, today: NaiveDate) -> Result<CycleReport> {
        let s = &self.settings;
        let games = self
            .odds
            .fetch(&s.markets)
            .await
            .context("Odds fetch failed")?;

        let now = Utc::now();
        let threshold = self.aggregate(now);

        let quotes = drop_longshots(normalize_games(&games, &s.markets), s.max_odds);
        let lines = score_quotes(quotes, s.projection, &s.book_weights);

        let policy = SelectionPolicy {
            threshold,
            allowed_books: s.trusted_books.clone(),
            dedup: s.dedup,
        };
        let selected = select_lines(&lines, &policy);
        let board = top_per_market(&selected, &s.markets, s.top_n);

        let picks: Vec<Line> = board.iter().flat_map(|m| m.lines.iter().cloned()).collect();
        let record = self
            .ledger
            .log_daily_picks(today, &picks, s.record_policy)
            .context("Failed to log daily picks")?;

        if let Some(path) = &s.export_path {
            if let Err(e) = export_lines(path, &lines) {
                warn!("Line export to {} failed: {:#}", path.display(), e);
            }
        }

        info!(
            "Cycle {}: {} game(s), {} line(s), {} selected at edge >= {:.3} ({:?}), {} pick(s) on board",
            today,
            games.len(),
            lines.len(),
            selected.len(),
            threshold.value,
            threshold.source,
            picks.len()
        );

        Ok(CycleReport {
            generated_at: now,
            date: today,
            threshold,
            dedup: s.dedup,
            games: games.len(),
            line_count: lines.len(),
            selected_count: selected.len(),
            lines,
            selected,
            board,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::edge::DEFAULT_BOOK_WEIGHTS;
    use crate::engine::threshold::ThresholdSource;
    use crate::error::OddsError;
    use crate::odds::{Game, OddsSource};
    use crate::store::models::BetResult;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;

    struct FixtureSource {
        games: Option<serde_json::Value>,
    }

    #[async_trait]
    impl OddsSource for FixtureSource {
        fn name(&self) -> &str {
            "fixture"
        }

        async fn fetch_games(&self, _markets: &[MarketKind]) -> Result<Vec<Game>, OddsError> {
            match &self.games {
                Some(v) => Ok(serde_json::from_value(v.clone())?),
                None => Err(OddsError::Provider {
                    status: 401,
                    body: "{\"message\":\"invalid api key\"}".into(),
                }),
            }
        }
    }

    fn book(title: &str, home: f64, away: f64, total_point: f64) -> serde_json::Value {
        serde_json::json!({
            "key": title.to_lowercase(),
            "title": title,
            "markets": [
                { "key": "h2h", "outcomes": [
                    { "name": "Home", "price": home },
                    { "name": "Away", "price": away }
                ]},
                { "key": "totals", "outcomes": [
                    { "name": "Over", "price": 2.05, "point": total_point },
                    { "name": "Under", "price": 1.80, "point": total_point }
                ]}
            ]
        })
    }

    fn slate() -> serde_json::Value {
        serde_json::json!([
            {
                "id": "g1", "home_team": "Yankees", "away_team": "Mets",
                "bookmakers": [book("FanDuel", 1.70, 2.20, 8.5), book("DraftKings", 1.75, 2.25, 8.5)]
            },
            {
                "id": "g2", "home_team": "Reds", "away_team": "Cubs",
                "bookmakers": [book("BetMGM", 1.95, 1.95, 9.0), book("Bovada", 3.40, 1.30, 9.0)]
            }
        ])
    }

    fn settings(dir: &tempfile::TempDir, policy: RecordPolicy) -> EngineSettings {
        EngineSettings {
            markets: MarketKind::ALL.to_vec(),
            max_odds: 3.0,
            projection: ProjectionStrategy::Fixed(0.55),
            book_weights: DEFAULT_BOOK_WEIGHTS.parse().unwrap(),
            trusted_books: Some(
                ["FanDuel", "DraftKings", "BetMGM"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            dedup: DedupScope::PerMarket,
            top_n: 5,
            min_edge: None,
            default_threshold: 0.10,
            record_policy: policy,
            export_path: Some(dir.path().join("logged_bets.csv")),
        }
    }

    fn engine(dir: &tempfile::TempDir, games: Option<serde_json::Value>, policy: RecordPolicy) -> PickEngine {
        let ledger = Ledger::open(dir.path().join("daily_bets"), dir.path().join("perf.csv")).unwrap();
        let odds = CachedOdds::new(Arc::new(FixtureSource { games }), Duration::from_secs(3600));
        PickEngine::new(settings(dir, policy), odds, ledger)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()
    }

    #[tokio::test]
    async fn cycle_selects_logs_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Some(slate()), RecordPolicy::WriteOnce);

        let report = engine.run_cycle(today()).await.unwrap();
        assert_eq!(report.games, 2);
        assert_eq!(report.threshold.source, ThresholdSource::Fallback);
        // Bovada's 3.40 is a longshot; everything else is scored.
        assert_eq!(report.lines.len(), 15);
        assert!(report.selected.iter().all(|l| l.edge >= 0.10));
        assert!(report.selected.iter().all(|l| l.book != "Bovada"));

        let moneyline = &report.board[0];
        assert_eq!(moneyline.market, MarketKind::Moneyline);
        // Mets @ Yankees: DraftKings Away 2.25 → (0.55 - 0.444) * 1.15
        assert_eq!(moneyline.lines[0].book, "DraftKings");
        assert_eq!(moneyline.lines[0].selection, "Away");
        let mut seen = HashSet::new();
        assert!(moneyline.lines.iter().all(|l| seen.insert(l.matchup.clone())));
        assert!(matches!(report.record, LogOutcome::Written(_)));

        let saved = engine.ledger().read_daily_record(today()).unwrap();
        let on_board: usize = report.board.iter().map(|m| m.lines.len()).sum();
        assert_eq!(saved.picks.len(), on_board);
        assert!(saved.picks.iter().all(|p| p.result.is_none()));

        let export = fs::read_to_string(dir.path().join("logged_bets.csv")).unwrap();
        assert_eq!(export.lines().count(), 16);

        let again = engine.run_cycle(today()).await.unwrap();
        assert!(matches!(again.record, LogOutcome::Kept(_)));
    }

    #[tokio::test]
    async fn provider_failure_fails_cycle_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, None, RecordPolicy::Overwrite);

        let err = engine.run_cycle(today()).await.unwrap_err();
        let provider = err.downcast_ref::<OddsError>().expect("odds error in chain");
        assert!(matches!(provider, OddsError::Provider { status: 401, .. }));
        assert!(!engine.ledger().record_path(today()).exists());
        assert!(!dir.path().join("logged_bets.csv").exists());
    }

    fn moneyline(book: &str, odds: f64) -> Line {
        let q = crate::store::models::Quote::new("A @ B", book, MarketKind::Moneyline, "B", odds).unwrap();
        Line::score(q, 0.55, 1.0)
    }

    /// Log `picks` for `date` and fill in each result column in order.
    fn grade(ledger: &Ledger, date: NaiveDate, picks: &[Line], results: &[&str]) {
        ledger.log_daily_picks(date, picks, RecordPolicy::Overwrite).unwrap();
        let path = ledger.record_path(date);
        let text = fs::read_to_string(&path).unwrap();
        let blank = format!(",,{}", date);
        let graded: Vec<String> = text
            .lines()
            .enumerate()
            .map(|(i, l)| match i.checked_sub(1).and_then(|r| results.get(r)) {
                Some(res) => l.replace(&blank, &format!(",{},{}", res, date)),
                None => l.to_string(),
            })
            .collect();
        fs::write(&path, graded.join("\n") + "\n").unwrap();
    }

    fn july(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    #[tokio::test]
    async fn aggregation_upserts_snapshot_and_feeds_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Some(slate()), RecordPolicy::Overwrite);
        let ledger = engine.ledger().clone();

        // One graded day: FanDuel wins big, BetMGM loses.
        let picks = [moneyline("FanDuel", 2.0), moneyline("FanDuel", 1.9), moneyline("BetMGM", 1.9)];
        grade(&ledger, july(30), &picks, &["W", "W", "L"]);

        let threshold = engine.aggregate(Utc::now());
        let log = ledger.read_performance_log().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|s| s.date == july(30)));
        let fanduel = log.iter().find(|s| s.book == "FanDuel").unwrap();
        assert_eq!(fanduel.wins, 2);
        assert_eq!(fanduel.win_rate, Some(1.0));
        let betmgm = log.iter().find(|s| s.book == "BetMGM").unwrap();
        assert_eq!(betmgm.win_rate, Some(0.0));

        // FanDuel ROI 0.95 at win rate 1.0 outweighs BetMGM's -1.0 at 0.0.
        assert_eq!(threshold.source, ThresholdSource::History);
        assert!((threshold.value - 0.20).abs() < 1e-12);

        let picks = ledger.read_daily_record(july(30)).unwrap().picks;
        assert_eq!(picks[2].result, Some(BetResult::Loss));
    }

    #[tokio::test]
    async fn threshold_ignores_days_outside_recent_window() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Some(slate()), RecordPolicy::Overwrite);
        let ledger = engine.ledger().clone();

        // BetMGM loses on the first five days, FanDuel wins on the last five.
        for d in 1..=5 {
            grade(&ledger, july(d), &[moneyline("BetMGM", 1.9)], &["L"]);
        }
        for d in 6..=10 {
            grade(&ledger, july(d), &[moneyline("FanDuel", 2.0)], &["W"]);
        }

        // Only winners in the last five graded days, so nothing to compare.
        let threshold = engine.aggregate(Utc::now());
        assert_eq!(threshold, EdgeThreshold::fallback(0.10));
        assert_eq!(ledger.read_performance_log().unwrap().len(), 10);

        let again = engine.aggregate(Utc::now());
        assert_eq!(again, threshold);
        assert_eq!(ledger.read_performance_log().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn threshold_counts_every_book_on_a_day() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Some(slate()), RecordPolicy::Overwrite);
        let ledger = engine.ledger().clone();

        // Seven books in one day; the winners sort first by name.
        let books = ["Aaa", "Bbb", "Ccc", "Ddd", "Eee", "Fff", "Ggg"];
        let picks: Vec<Line> = books.iter().map(|b| moneyline(b, 2.0)).collect();
        grade(&ledger, july(12), &picks, &["W", "W", "L", "L", "L", "L", "L"]);

        let threshold = engine.aggregate(Utc::now());
        assert_eq!(threshold.source, ThresholdSource::History);
        assert!((threshold.value - 0.20).abs() < 1e-12);
        assert_eq!(ledger.read_performance_log().unwrap().len(), 7);

        engine.aggregate(Utc::now());
        let log = ledger.read_performance_log().unwrap();
        assert_eq!(log.len(), 7);
        assert_eq!(log.iter().filter(|s| s.win_rate == Some(1.0)).count(), 2);
    }

    #[tokio::test]
    async fn configured_min_edge_overrides_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir, Some(slate()), RecordPolicy::Overwrite);
        engine.settings.min_edge = Some(0.0);
        engine.settings.trusted_books = None;
        engine.settings.dedup = DedupScope::Global;

        let report = engine.run_cycle(today()).await.unwrap();
        assert_eq!(report.threshold, EdgeThreshold::configured(0.0));
        let mut seen = HashSet::new();
        assert!(report.selected.iter().all(|l| seen.insert(l.matchup.clone())));
        assert_eq!(report.selected.len(), 2);
    }
}
