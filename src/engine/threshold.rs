use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::store::models::PerformanceSnapshot;

/// Number of most recent graded dates in the log considered.
pub const THRESHOLD_WINDOW: usize = 5;
/// Bounds for a threshold derived from history.
pub const MIN_DERIVED_THRESHOLD: f64 = 0.05;
pub const MAX_DERIVED_THRESHOLD: f64 = 0.20;
/// Fallback when history is missing or uninformative.
pub const DEFAULT_EDGE_THRESHOLD: f64 = 0.10;

/// Minimum edge for the current selection pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeThreshold {
    pub value: f64,
    pub source: ThresholdSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    /// Fixed by configuration, history ignored.
    Configured,
    /// Derived from the performance log.
    History,
    /// History absent, unreadable or inconclusive.
    Fallback,
}

impl EdgeThreshold {
    pub fn configured(value: f64) -> Self {
        EdgeThreshold {
            value,
            source: ThresholdSource::Configured,
        }
    }

    pub fn fallback(value: f64) -> Self {
        EdgeThreshold {
            value,
            source: ThresholdSource::Fallback,
        }
    }
}

/// Derive the next edge cutoff from the historical performance log.
///
/// The window is every row from the last [`THRESHOLD_WINDOW`] dates that have
/// at least one row with a win rate; rows are per (date, book), so a day with
/// many books still counts once. If books winning more than half their
/// decided bets also returned more on average than the rest, the
/// win-rate-weighted ROI of the window becomes the cutoff, clamped to
/// `[MIN_DERIVED_THRESHOLD, MAX_DERIVED_THRESHOLD]`. Anything else, including
/// a window lacking either group, yields `default`.
pub fn derive_threshold(history: &[PerformanceSnapshot], default: f64) -> EdgeThreshold {
    let graded: Vec<(NaiveDate, f64, f64)> = history
        .iter()
        .filter_map(|s| s.win_rate.map(|w| (s.date, w, s.roi)))
        .filter(|(_, w, roi)| w.is_finite() && roi.is_finite())
        .collect();
    let dates: BTreeSet<NaiveDate> = graded.iter().map(|(d, _, _)| *d).collect();
    let recent: BTreeSet<NaiveDate> = dates.into_iter().rev().take(THRESHOLD_WINDOW).collect();
    let window: Vec<(f64, f64)> = graded
        .iter()
        .filter(|(d, _, _)| recent.contains(d))
        .map(|(_, w, r)| (*w, *r))
        .collect();

    let (winning, losing): (Vec<_>, Vec<_>) = window.iter().partition(|(w, _)| *w > 0.5);
    if winning.is_empty() || losing.is_empty() {
        return EdgeThreshold::fallback(default);
    }

    let mean_roi = |rows: &[&(f64, f64)]| rows.iter().map(|(_, r)| r).sum::<f64>() / rows.len() as f64;
    if mean_roi(&winning) <= mean_roi(&losing) {
        return EdgeThreshold::fallback(default);
    }

    let weight_sum: f64 = window.iter().map(|(w, _)| w).sum();
    let weighted_roi = window.iter().map(|(w, r)| w * r).sum::<f64>() / weight_sum;
    EdgeThreshold {
        value: weighted_roi.clamp(MIN_DERIVED_THRESHOLD, MAX_DERIVED_THRESHOLD),
        source: ThresholdSource::History,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn snap(day: u32, book: &str, win_rate: Option<f64>, roi: f64) -> PerformanceSnapshot {
        PerformanceSnapshot {
            date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            recorded_at: Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap(),
            book: book.into(),
            bets: 10,
            wins: 5,
            losses: 5,
            pushes: 0,
            win_rate,
            roi,
        }
    }

    #[test]
    fn empty_history_falls_back() {
        let t = derive_threshold(&[], DEFAULT_EDGE_THRESHOLD);
        assert_eq!(t.source, ThresholdSource::Fallback);
        assert_relative_eq!(t.value, 0.10);
    }

    #[test]
    fn winning_books_outperforming_uses_weighted_roi() {
        let history = vec![snap(1, "FanDuel", Some(0.6), 0.15), snap(1, "BetMGM", Some(0.4), -0.10)];
        let t = derive_threshold(&history, DEFAULT_EDGE_THRESHOLD);
        assert_eq!(t.source, ThresholdSource::History);
        // (0.6 * 0.15 + 0.4 * -0.10) / 1.0 = 0.05
        assert_relative_eq!(t.value, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn derived_value_is_clamped() {
        let high = vec![snap(1, "A", Some(0.9), 0.60), snap(2, "B", Some(0.45), 0.10)];
        assert_relative_eq!(derive_threshold(&high, 0.1).value, MAX_DERIVED_THRESHOLD);

        let low = vec![snap(1, "A", Some(0.55), 0.02), snap(2, "B", Some(0.3), -0.4)];
        assert_relative_eq!(derive_threshold(&low, 0.1).value, MIN_DERIVED_THRESHOLD);
    }

    #[test]
    fn losing_books_outperforming_falls_back() {
        let history = vec![snap(1, "A", Some(0.6), -0.05), snap(1, "B", Some(0.4), 0.20)];
        let t = derive_threshold(&history, 0.08);
        assert_eq!(t, EdgeThreshold::fallback(0.08));
    }

    #[test]
    fn only_the_last_five_graded_dates_count() {
        // A losing day six dates back drops out, leaving only winners.
        let mut history = vec![snap(1, "BetMGM", Some(0.2), -0.5)];
        history.extend((2..=6).map(|d| snap(d, "FanDuel", Some(0.7), 0.12)));
        assert_eq!(derive_threshold(&history, 0.1).source, ThresholdSource::Fallback);

        // Dates whose rows lack a win rate are not part of the window.
        let mut history = vec![snap(1, "BetMGM", Some(0.2), -0.5)];
        history.extend((2..=5).map(|d| snap(d, "FanDuel", Some(0.7), 0.12)));
        history.push(snap(6, "FanDuel", None, 0.0));
        assert_eq!(derive_threshold(&history, 0.1).source, ThresholdSource::History);
    }

    #[test]
    fn every_book_on_a_window_date_is_included() {
        // Seven books on one day; the two winners sort first by name.
        let mut history = vec![snap(1, "Aaa", Some(1.0), 1.0), snap(1, "Bbb", Some(1.0), 1.0)];
        history.extend(["Ccc", "Ddd", "Eee", "Fff", "Ggg"].iter().map(|b| snap(1, b, Some(0.0), -1.0)));
        let t = derive_threshold(&history, 0.1);
        assert_eq!(t.source, ThresholdSource::History);
        // (1.0 + 1.0) / 2.0 = 1.0, clamped
        assert_relative_eq!(t.value, MAX_DERIVED_THRESHOLD);
    }
}
