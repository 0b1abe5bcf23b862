//! Win/loss and ROI aggregation over Daily Records.
//!
//! Only annotated picks (W/L/P) count. A win returns `odds - 1` units, a loss
//! `-1`, a push `0`. Win rate ignores pushes; ROI divides total units by every
//! annotated bet, pushes included.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::store::models::{BetResult, DailyRecord, MarketKind, PerformanceSnapshot, Pick};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub key: String,
    pub bets: u32,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub units: f64,
    /// wins / (wins + losses)
    pub win_rate: Option<f64>,
    /// units / bets
    pub roi: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct Tally {
    bets: u32,
    wins: u32,
    losses: u32,
    pushes: u32,
    units: f64,
}

impl Tally {
    fn add(&mut self, result: BetResult, units: f64) {
        self.bets += 1;
        match result {
            BetResult::Win => self.wins += 1,
            BetResult::Loss => self.losses += 1,
            BetResult::Push => self.pushes += 1,
        }
        self.units += units;
    }

    fn finish(self, key: impl Into<String>) -> GroupStats {
        let decided = self.wins + self.losses;
        GroupStats {
            key: key.into(),
            bets: self.bets,
            wins: self.wins,
            losses: self.losses,
            pushes: self.pushes,
            units: self.units,
            win_rate: (decided > 0).then(|| self.wins as f64 / decided as f64),
            roi: (self.bets > 0).then(|| self.units / self.bets as f64),
        }
    }
}

/// Restricts a summary to chosen dates and markets; `None` means all.
#[derive(Debug, Clone, Default)]
pub struct PerformanceFilter {
    pub dates: Option<HashSet<NaiveDate>>,
    pub markets: Option<HashSet<MarketKind>>,
}

impl PerformanceFilter {
    fn admits(&self, pick: &Pick) -> bool {
        self.dates.as_ref().map_or(true, |d| d.contains(&pick.date))
            && self
                .markets
                .as_ref()
                .map_or(true, |m| m.contains(&pick.line.market))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    /// Distinct dates with at least one annotated pick
    pub days_tracked: usize,
    /// Picks still waiting for a result
    pub unannotated: usize,
    pub overall: GroupStats,
    pub by_date: Vec<GroupStats>,
    pub by_market: Vec<GroupStats>,
    pub by_book: Vec<GroupStats>,
    /// Q1 holds the lowest-edge quarter of annotated picks
    pub by_edge_quartile: Vec<GroupStats>,
}

/// Aggregate all records. Recomputed from scratch on every call.
pub fn summarize(records: &[DailyRecord], filter: &PerformanceFilter) -> PerformanceSummary {
    let picks: Vec<&Pick> = records
        .iter()
        .flat_map(|r| r.picks.iter())
        .filter(|p| filter.admits(p))
        .collect();

    let unannotated = picks.iter().filter(|p| p.result.is_none()).count();
    let graded: Vec<(&Pick, BetResult, f64)> = picks
        .iter()
        .filter_map(|p| Some((*p, p.result?, p.unit_return()?)))
        .collect();

    let mut overall = Tally::default();
    let mut by_date: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
    let mut by_market: BTreeMap<MarketKind, Tally> = BTreeMap::new();
    let mut by_book: BTreeMap<String, Tally> = BTreeMap::new();
    let mut by_quartile: BTreeMap<usize, Tally> = BTreeMap::new();

    let mut edges: Vec<f64> = graded.iter().map(|(p, _, _)| p.line.edge).collect();
    edges.sort_by(f64::total_cmp);
    let cuts = [
        quantile(&edges, 0.25),
        quantile(&edges, 0.50),
        quantile(&edges, 0.75),
    ];

    for (pick, result, units) in &graded {
        overall.add(*result, *units);
        by_date.entry(pick.date).or_default().add(*result, *units);
        by_market.entry(pick.line.market).or_default().add(*result, *units);
        by_book
            .entry(pick.line.book.clone())
            .or_default()
            .add(*result, *units);
        let bucket = cuts
            .iter()
            .position(|c| pick.line.edge <= *c)
            .unwrap_or(cuts.len());
        by_quartile.entry(bucket).or_default().add(*result, *units);
    }

    PerformanceSummary {
        days_tracked: by_date.len(),
        unannotated,
        overall: overall.finish("all"),
        by_date: by_date
            .into_iter()
            .map(|(d, t)| t.finish(d.format("%Y-%m-%d").to_string()))
            .collect(),
        by_market: by_market
            .into_iter()
            .map(|(m, t)| t.finish(m.api_key()))
            .collect(),
        by_book: by_book.into_iter().map(|(b, t)| t.finish(b)).collect(),
        by_edge_quartile: by_quartile
            .into_iter()
            .map(|(q, t)| t.finish(format!("Q{}", q + 1)))
            .collect(),
    }
}

/// Linear-interpolated quantile of sorted values; 0.0 for an empty slice.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// One log row per (date, book) for every record with graded picks.
///
/// Each row covers that single date only, never a running total, so the
/// threshold window can pick whole recent days out of the log.
pub fn daily_book_snapshots(records: &[DailyRecord], recorded_at: DateTime<Utc>) -> Vec<PerformanceSnapshot> {
    let mut rows = Vec::new();
    for record in records {
        let day = summarize(std::slice::from_ref(record), &PerformanceFilter::default());
        rows.extend(day.by_book.into_iter().map(|g| PerformanceSnapshot {
            date: record.date,
            recorded_at,
            book: g.key,
            bets: g.bets,
            wins: g.wins,
            losses: g.losses,
            pushes: g.pushes,
            win_rate: g.win_rate,
            roi: g.roi.unwrap_or(0.0),
        }));
    }
    rows
}

/// Annotated picks, newest date first, then market, then highest edge.
pub fn bet_history(records: &[DailyRecord], filter: &PerformanceFilter) -> Vec<Pick> {
    let mut picks: Vec<Pick> = records
        .iter()
        .flat_map(|r| r.picks.iter())
        .filter(|p| p.result.is_some() && filter.admits(p))
        .cloned()
        .collect();
    picks.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then(a.line.market.cmp(&b.line.market))
            .then(b.line.edge.total_cmp(&a.line.edge))
    });
    picks
}
