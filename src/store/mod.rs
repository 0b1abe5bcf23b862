use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub mod models;
use models::*;

/// How today's Daily Record is treated when a cycle runs again the same day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RecordPolicy {
    /// Leave an existing record alone so hand-entered results survive.
    WriteOnce,
    /// Regenerate the record on every cycle.
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "path", rename_all = "snake_case")]
pub enum LogOutcome {
    Written(PathBuf),
    /// A record for the date already existed and was left untouched.
    Kept(PathBuf),
}

/// Flat-file store for Daily Records and the historical performance log.
///
/// Writes are serialized through a single in-process writer lock; nothing
/// guards against a second process writing the same directory.
#[derive(Clone)]
pub struct Ledger {
    daily_dir: PathBuf,
    performance_log: PathBuf,
    writer: Arc<Mutex<()>>,
}

impl Ledger {
    /// Open the store, creating the daily record directory if needed.
    pub fn open(daily_dir: impl Into<PathBuf>, performance_log: impl Into<PathBuf>) -> Result<Self> {
        let daily_dir = daily_dir.into();
        let performance_log = performance_log.into();
        fs::create_dir_all(&daily_dir)
            .with_context(|| format!("Failed to create {}", daily_dir.display()))?;
        Ok(Ledger {
            daily_dir,
            performance_log,
            writer: Arc::new(Mutex::new(())),
        })
    }

    pub fn record_path(&self, date: NaiveDate) -> PathBuf {
        self.daily_dir.join(format!("{}.csv", date.format("%Y-%m-%d")))
    }

    pub fn performance_log_path(&self) -> &Path {
        &self.performance_log
    }

    // ── Daily records ─────────────────────────────────────────────────────────

    /// Persist the day's picks with blank results according to `policy`.
    pub fn log_daily_picks(
        &self,
        date: NaiveDate,
        lines: &[Line],
        policy: RecordPolicy,
    ) -> Result<LogOutcome> {
        let _guard = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("ledger writer lock poisoned"))?;

        let path = self.record_path(date);
        if policy == RecordPolicy::WriteOnce && path.exists() {
            debug!("Daily record {} already exists, keeping it", path.display());
            return Ok(LogOutcome::Kept(path));
        }

        let tmp = path.with_extension("csv.tmp");
        {
            let mut wtr = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            wtr.write_record(PICK_COLUMNS)?;
            for line in lines {
                wtr.serialize(PickRow::blank(date, line))?;
            }
            wtr.flush()?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move record into {}", path.display()))?;

        info!("Saved {} pick(s) to {}", lines.len(), path.display());
        Ok(LogOutcome::Written(path))
    }

    /// Read one day's record. Rows missing a required column are dropped.
    pub fn read_daily_record(&self, date: NaiveDate) -> Result<DailyRecord> {
        let path = self.record_path(date);
        let mut rdr = csv::Reader::from_path(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut picks = Vec::new();
        for (i, row) in rdr.deserialize::<PickRow>().enumerate() {
            let parsed = row
                .map_err(anyhow::Error::from)
                .and_then(|r| r.into_pick(date));
            match parsed {
                Ok(pick) => picks.push(pick),
                Err(e) => warn!("Dropping row {} of {}: {}", i + 1, path.display(), e),
            }
        }
        Ok(DailyRecord { date, picks })
    }

    /// Load every `YYYY-MM-DD.csv` record in the daily directory, oldest first.
    /// Unreadable files are skipped with a warning.
    pub fn load_all_records(&self) -> Result<Vec<DailyRecord>> {
        let entries = match fs::read_dir(&self.daily_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", self.daily_dir.display()))
            }
        };

        let mut dates = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let date = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            match date {
                Some(d) => dates.push(d),
                None => debug!("Ignoring {} (not a dated record)", path.display()),
            }
        }
        dates.sort();

        let mut records = Vec::with_capacity(dates.len());
        for date in dates {
            match self.read_daily_record(date) {
                Ok(r) => records.push(r),
                Err(e) => warn!("Could not read record for {}: {:#}", date, e),
            }
        }
        Ok(records)
    }

    // ── Historical performance log ────────────────────────────────────────────

    /// Merge snapshot rows into the log. Every date present in `rows` has its
    /// previous rows replaced, so re-running on unchanged records is a no-op.
    pub fn upsert_performance_snapshots(&self, rows: &[PerformanceSnapshot]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let _guard = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("ledger writer lock poisoned"))?;

        let replaced: HashSet<NaiveDate> = rows.iter().map(|r| r.date).collect();
        let mut merged: Vec<PerformanceSnapshot> = self
            .read_performance_log()?
            .into_iter()
            .filter(|r| !replaced.contains(&r.date))
            .collect();
        merged.extend(rows.iter().cloned());
        merged.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.book.cmp(&b.book)));

        if let Some(parent) = self.performance_log.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let tmp = self.performance_log.with_extension("csv.tmp");
        {
            let mut wtr = csv::Writer::from_path(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            for row in &merged {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
        }
        fs::rename(&tmp, &self.performance_log).with_context(|| {
            format!("Failed to move log into {}", self.performance_log.display())
        })?;
        debug!(
            "Performance log now holds {} row(s) over {} replaced date(s)",
            merged.len(),
            replaced.len()
        );
        Ok(())
    }

    /// Read the historical performance log; an absent log reads as empty.
    pub fn read_performance_log(&self) -> Result<Vec<PerformanceSnapshot>> {
        if !self.performance_log.exists() {
            return Ok(vec![]);
        }
        let mut rdr = csv::Reader::from_path(&self.performance_log)
            .with_context(|| format!("Failed to open {}", self.performance_log.display()))?;
        let mut rows = Vec::new();
        for (i, row) in rdr.deserialize::<PerformanceSnapshot>().enumerate() {
            match row {
                Ok(r) => rows.push(r),
                Err(e) => warn!("Skipping performance log row {}: {}", i + 1, e),
            }
        }
        Ok(rows)
    }
}

// ── Line export ────────────────────────────────────────────────────────────────

/// Render a full line table as CSV text (header always present).
pub fn lines_to_csv(lines: &[Line]) -> Result<String> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(LINE_COLUMNS)?;
    for line in lines {
        wtr.serialize(LineRow::from(line))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to finish CSV export: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Write a full line table to `path`, replacing any previous export.
pub fn export_lines(path: &Path, lines: &[Line]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, lines_to_csv(lines)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Exported {} line(s) to {}", lines.len(), path.display());
    Ok(())
}

// ── Row layouts ────────────────────────────────────────────────────────────────

const PICK_COLUMNS: [&str; 11] = [
    "matchup",
    "book",
    "market",
    "team_or_player",
    "odds",
    "implied_prob",
    "projection",
    "edge",
    "book_weight",
    "result",
    "date",
];

const LINE_COLUMNS: [&str; 9] = [
    "matchup",
    "book",
    "market",
    "team_or_player",
    "odds",
    "implied_prob",
    "projection",
    "edge",
    "book_weight",
];

fn default_book_weight() -> f64 {
    1.0
}

#[derive(Debug, Serialize, Deserialize)]
struct PickRow {
    matchup: String,
    book: String,
    market: String,
    team_or_player: String,
    odds: f64,
    implied_prob: f64,
    projection: f64,
    edge: f64,
    #[serde(default = "default_book_weight")]
    book_weight: f64,
    #[serde(default)]
    result: String,
    #[serde(default)]
    date: String,
}

impl PickRow {
    fn blank(date: NaiveDate, line: &Line) -> Self {
        PickRow {
            matchup: line.matchup.clone(),
            book: line.book.clone(),
            market: line.market.api_key().to_string(),
            team_or_player: line.selection.clone(),
            odds: line.odds,
            implied_prob: line.implied_probability,
            projection: line.projection,
            edge: line.edge,
            book_weight: line.book_weight,
            result: String::new(),
            date: date.format("%Y-%m-%d").to_string(),
        }
    }

    /// Rebuild a pick; the record's file date wins over the `date` cell.
    fn into_pick(self, date: NaiveDate) -> Result<Pick> {
        let market: MarketKind = self.market.parse().map_err(anyhow::Error::msg)?;
        if !self.projection.is_finite() || !self.book_weight.is_finite() {
            anyhow::bail!("non-numeric projection or book_weight");
        }
        let quote = Quote::new(self.matchup, self.book, market, self.team_or_player, self.odds)?;
        let line = Line::score(quote, self.projection, self.book_weight);
        Ok(Pick {
            result: BetResult::parse(&self.result),
            ..Pick::new(date, line)
        })
    }
}

#[derive(Debug, Serialize)]
struct LineRow<'a> {
    matchup: &'a str,
    book: &'a str,
    market: &'static str,
    team_or_player: &'a str,
    odds: f64,
    implied_prob: f64,
    projection: f64,
    edge: f64,
    book_weight: f64,
}

impl<'a> From<&'a Line> for LineRow<'a> {
    fn from(line: &'a Line) -> Self {
        LineRow {
            matchup: &line.matchup,
            book: &line.book,
            market: line.market.api_key(),
            team_or_player: &line.selection,
            odds: line.odds,
            implied_prob: line.implied_probability,
            projection: line.projection,
            edge: line.edge,
            book_weight: line.book_weight,
        }
    }
}
