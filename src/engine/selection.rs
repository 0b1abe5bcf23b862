use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use super::threshold::EdgeThreshold;
use crate::store::models::{Line, MarketKind};

/// Granularity of the one-line-per-key rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DedupScope {
    /// Best line per (matchup, market).
    PerMarket,
    /// Best line per matchup across all markets.
    Global,
}

#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    pub threshold: EdgeThreshold,
    /// When set, only lines from these books are considered.
    pub allowed_books: Option<HashSet<String>>,
    pub dedup: DedupScope,
}

/// Filter, rank and deduplicate scored lines.
///
/// Order matters: book allow-list, then `edge >= threshold`, then a stable
/// descending sort by edge, then dedup keeping the first (highest-edge) line
/// for each key. Ties keep their input order.
pub fn select_lines(lines: &[Line], policy: &SelectionPolicy) -> Vec<Line> {
    let mut kept: Vec<Line> = lines
        .iter()
        .filter(|l| {
            policy
                .allowed_books
                .as_ref()
                .map_or(true, |books| books.contains(&l.book))
        })
        .filter(|l| l.edge >= policy.threshold.value)
        .cloned()
        .collect();

    kept.sort_by(|a, b| b.edge.total_cmp(&a.edge));

    let before = kept.len();
    let mut seen: HashSet<(String, Option<MarketKind>)> = HashSet::new();
    kept.retain(|l| {
        let market = match policy.dedup {
            DedupScope::PerMarket => Some(l.market),
            DedupScope::Global => None,
        };
        seen.insert((l.matchup.clone(), market))
    });

    debug!(
        "Selection: {} of {} line(s) cleared edge >= {:.3}, {} after {:?} dedup",
        before,
        lines.len(),
        policy.threshold.value,
        kept.len(),
        policy.dedup
    );
    kept
}

/// Top lines for one market, highest edge first.
#[derive(Debug, Clone, Serialize)]
pub struct MarketPicks {
    pub market: MarketKind,
    pub title: &'static str,
    pub lines: Vec<Line>,
}

/// Split ranked lines by market and keep the first `n` of each.
///
/// Every requested market gets an entry, possibly empty. Input order is kept
/// within a market, so pass the output of [`select_lines`].
pub fn top_per_market(ranked: &[Line], markets: &[MarketKind], n: usize) -> Vec<MarketPicks> {
    markets
        .iter()
        .map(|&market| MarketPicks {
            market,
            title: market.display_name(),
            lines: ranked
                .iter()
                .filter(|l| l.market == market)
                .take(n)
                .cloned()
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::threshold::ThresholdSource;
    use crate::store::models::Quote;
    use std::collections::HashMap;

    fn line(matchup: &str, book: &str, market: MarketKind, sel: &str, edge: f64) -> Line {
        let q = Quote::new(matchup, book, market, sel, 2.0).unwrap();
        let mut l = Line::score(q, 0.55, 1.0);
        l.edge = edge;
        l
    }

    fn policy(threshold: f64, dedup: DedupScope) -> SelectionPolicy {
        SelectionPolicy {
            threshold: EdgeThreshold {
                value: threshold,
                source: ThresholdSource::Configured,
            },
            allowed_books: None,
            dedup,
        }
    }

    fn slate() -> Vec<Line> {
        vec![
            line("A @ B", "FanDuel", MarketKind::Moneyline, "B", 0.07),
            line("A @ B", "DraftKings", MarketKind::Moneyline, "B", 0.09),
            line("A @ B", "FanDuel", MarketKind::Total, "Over 8", 0.12),
            line("C @ D", "BetMGM", MarketKind::Moneyline, "C", 0.09),
            line("C @ D", "Bovada", MarketKind::Spread, "C +1.5", 0.15),
            line("E @ F", "FanDuel", MarketKind::Spread, "F -1.5", 0.02),
        ]
    }

    #[test]
    fn threshold_scenario_with_equal_edges() {
        let lines: Vec<Line> = ["A @ B", "C @ D"]
            .iter()
            .map(|m| {
                let q = Quote::new(*m, "Unibet", MarketKind::Moneyline, "Home", 2.0).unwrap();
                Line::score(q, 0.55, 1.0)
            })
            .collect();
        assert_eq!(select_lines(&lines, &policy(0.05, DedupScope::PerMarket)).len(), 2);
        assert!(select_lines(&lines, &policy(0.06, DedupScope::PerMarket)).is_empty());
    }

    #[test]
    fn per_market_dedup_keeps_best_line_per_game_and_market() {
        let out = select_lines(&slate(), &policy(0.05, DedupScope::PerMarket));
        let keys: Vec<_> = out.iter().map(|l| (l.matchup.as_str(), l.market, l.book.as_str())).collect();
        assert_eq!(
            keys,
            vec![
                ("C @ D", MarketKind::Spread, "Bovada"),
                ("A @ B", MarketKind::Total, "FanDuel"),
                ("A @ B", MarketKind::Moneyline, "DraftKings"),
                ("C @ D", MarketKind::Moneyline, "BetMGM"),
            ]
        );
        let mut seen = HashSet::new();
        assert!(out.iter().all(|l| seen.insert((l.matchup.clone(), l.market))));
    }

    #[test]
    fn global_dedup_keeps_one_pick_per_game() {
        let out = select_lines(&slate(), &policy(0.0, DedupScope::Global));
        let matchups: Vec<_> = out.iter().map(|l| l.matchup.as_str()).collect();
        assert_eq!(matchups, vec!["C @ D", "A @ B", "E @ F"]);
        assert_eq!(out[0].market, MarketKind::Spread);
        assert_eq!(out[1].market, MarketKind::Total);
    }

    #[test]
    fn ties_keep_input_order() {
        let lines = vec![
            line("A @ B", "FanDuel", MarketKind::Moneyline, "B", 0.09),
            line("A @ B", "DraftKings", MarketKind::Moneyline, "B", 0.09),
        ];
        let out = select_lines(&lines, &policy(0.0, DedupScope::PerMarket));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].book, "FanDuel");
    }

    #[test]
    fn book_allow_list_applies_before_ranking() {
        let mut p = policy(0.05, DedupScope::PerMarket);
        p.allowed_books = Some(
            ["FanDuel", "DraftKings", "BetMGM"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let out = select_lines(&slate(), &p);
        assert!(out.iter().all(|l| l.book != "Bovada"));
        assert!(out.iter().all(|l| l.market != MarketKind::Spread));
    }

    #[test]
    fn top_per_market_truncates_and_orders() {
        let mut lines = Vec::new();
        for i in 0..8 {
            let edge = 0.05 + i as f64 * 0.01;
            lines.push(line(&format!("T{} @ H{}", i, i), "FanDuel", MarketKind::Moneyline, "H", edge));
            lines.push(line(&format!("T{} @ H{}", i, i), "FanDuel", MarketKind::Total, "Over 9", edge / 2.0));
        }
        let ranked = select_lines(&lines, &policy(0.0, DedupScope::PerMarket));
        let board = top_per_market(&ranked, &MarketKind::ALL, 5);

        assert_eq!(board.len(), 3);
        let by_market: HashMap<_, _> = board.iter().map(|m| (m.market, m)).collect();
        assert_eq!(by_market[&MarketKind::Moneyline].lines.len(), 5);
        assert_eq!(by_market[&MarketKind::Total].lines.len(), 5);
        assert!(by_market[&MarketKind::Spread].lines.is_empty());
        for group in &board {
            assert!(group.lines.len() <= 5);
            assert!(group.lines.windows(2).all(|w| w[0].edge >= w[1].edge));
            assert!(group.lines.iter().all(|l| l.market == group.market));
        }
    }
}
