use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::engine::performance::{bet_history, summarize, PerformanceFilter, PerformanceSummary};
use crate::engine::threshold::EdgeThreshold;
use crate::engine::{CycleReport, PickEngine};
use crate::store::lines_to_csv;
use crate::store::models::MarketKind;

/// Outcome of the most recent generation cycle.
#[derive(Debug, Clone)]
pub enum CycleStatus {
    Pending,
    Ready(Arc<CycleReport>),
    Failed { at: DateTime<Utc>, message: String },
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PickEngine>,
    pub status: Arc<RwLock<CycleStatus>>,
}

impl AppState {
    pub fn new(engine: Arc<PickEngine>) -> Self {
        AppState {
            engine,
            status: Arc::new(RwLock::new(CycleStatus::Pending)),
        }
    }

    /// Run a cycle for `today` and publish its outcome to the handlers.
    pub async fn refresh(&self, today: NaiveDate) -> Result<Arc<CycleReport>, String> {
        match self.engine.run_cycle(today).await {
            Ok(report) => {
                let report = Arc::new(report);
                *self.status.write().await = CycleStatus::Ready(Arc::clone(&report));
                Ok(report)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!("Cycle failed: {}", message);
                *self.status.write().await = CycleStatus::Failed {
                    at: Utc::now(),
                    message: message.clone(),
                };
                Err(message)
            }
        }
    }

    async fn latest(&self) -> Result<Arc<CycleReport>, (StatusCode, String)> {
        match &*self.status.read().await {
            CycleStatus::Ready(report) => Ok(Arc::clone(report)),
            CycleStatus::Pending => Err((
                StatusCode::SERVICE_UNAVAILABLE,
                "No picks generated yet".to_string(),
            )),
            CycleStatus::Failed { at, message } => Err((
                StatusCode::BAD_GATEWAY,
                format!("Last cycle failed at {}: {}", at.to_rfc3339(), message),
            )),
        }
    }
}

/// Build the Axum router for the dashboard.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/picks", get(picks_handler))
        .route("/api/lines.csv", get(lines_csv_handler))
        .route("/api/performance", get(performance_handler))
        .route("/api/history", get(history_handler))
        .route("/api/refresh", post(refresh_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn index_handler() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

fn to_json<T: Serialize>(value: &T) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// GET /api/picks
async fn picks_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let report = state.latest().await?;
    to_json(report.as_ref())
}

#[derive(Debug, Deserialize)]
struct LinesQuery {
    stage: Option<String>,
}

/// GET /api/lines.csv?stage=all|filtered
async fn lines_csv_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LinesQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let report = state.latest().await?;
    let stage = q.stage.as_deref().unwrap_or("filtered");
    let lines = match stage {
        "all" => &report.lines,
        "filtered" => &report.selected,
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("unknown stage '{}', expected all or filtered", other),
            ))
        }
    };
    let body = lines_to_csv(lines).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let disposition = format!("attachment; filename=\"lines_{}_{}.csv\"", stage, report.date);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct FilterQuery {
    /// Comma-separated YYYY-MM-DD dates
    dates: Option<String>,
    /// Comma-separated market keys
    markets: Option<String>,
}

impl FilterQuery {
    fn into_filter(self) -> Result<PerformanceFilter, (StatusCode, String)> {
        let bad = |msg: String| (StatusCode::BAD_REQUEST, msg);
        let dates = match self.dates.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(list) => Some(
                list.split(',')
                    .map(|d| {
                        NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                            .map_err(|_| bad(format!("invalid date '{}'", d.trim())))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            None => None,
        };
        let markets = match self.markets.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(list) => Some(
                list.split(',')
                    .map(|m| m.trim().parse::<MarketKind>().map_err(|e| bad(e.to_string())))
                    .collect::<Result<_, _>>()?,
            ),
            None => None,
        };
        Ok(PerformanceFilter { dates, markets })
    }
}

#[derive(Serialize)]
struct PerformanceResponse {
    threshold: EdgeThreshold,
    summary: PerformanceSummary,
}

/// GET /api/performance?dates=..&markets=..
async fn performance_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FilterQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let filter = q.into_filter()?;
    let records = state
        .engine
        .ledger()
        .load_all_records()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    to_json(&PerformanceResponse {
        threshold: state.engine.current_threshold(),
        summary: summarize(&records, &filter),
    })
}

/// GET /api/history?dates=..&markets=..
async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FilterQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let filter = q.into_filter()?;
    state
        .engine
        .ledger()
        .load_all_records()
        .map(|records| Json(bet_history(&records, &filter)))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct RefreshQuery {
    /// Bypass the odds cache
    #[serde(default)]
    force: bool,
}

/// POST /api/refresh?force=true
async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RefreshQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if q.force {
        info!("Forced refresh, dropping cached odds");
        state.engine.odds().invalidate().await;
    }
    let report = state
        .refresh(Local::now().date_naive())
        .await
        .map_err(|m| (StatusCode::BAD_GATEWAY, m))?;
    to_json(report.as_ref())
}

/// Embedded single-file dashboard (HTML + CSS + JS)
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Daily Locks</title>
<style>
  :root {
    --bg: #0f1117;
    --card: #1a1d27;
    --border: #2a2d3a;
    --accent: #6c63ff;
    --green: #00c896;
    --red: #ff4f6a;
    --text: #e0e0e0;
    --muted: #8888aa;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; }
  .badge { padding: .2rem .6rem; border-radius: 4px; font-size: .75rem; font-weight: 700; background: var(--accent); color: #fff; }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .stats-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(170px, 1fr)); gap: 1rem; }
  .stat-card { background: var(--card); border: 1px solid var(--border); border-radius: 10px; padding: 1.2rem; }
  .stat-card .label { color: var(--muted); font-size: .8rem; text-transform: uppercase; letter-spacing: .06em; margin-bottom: .4rem; }
  .stat-card .value { font-size: 1.6rem; font-weight: 700; }
  .pos { color: var(--green); }
  .neg { color: var(--red); }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; overflow: hidden; }
  .panel-header { padding: .9rem 1.2rem; border-bottom: 1px solid var(--border); font-weight: 600; display: flex; justify-content: space-between; align-items: center; }
  table { width: 100%; border-collapse: collapse; }
  th { padding: .7rem 1rem; text-align: left; font-size: .75rem; text-transform: uppercase; color: var(--muted); border-bottom: 1px solid var(--border); }
  td { padding: .65rem 1rem; font-size: .88rem; border-bottom: 1px solid #1e2130; }
  tr:last-child td { border-bottom: none; }
  .three-col { display: grid; grid-template-columns: repeat(3, 1fr); gap: 1.5rem; }
  .two-col { display: grid; grid-template-columns: 1fr 1fr; gap: 1.5rem; }
  @media (max-width: 1100px) { .three-col, .two-col { grid-template-columns: 1fr; } }
  .empty { color: var(--muted); text-align: center; padding: 2rem; font-size: .9rem; }
  .error { color: var(--red); padding: 1rem 1.2rem; }
  .btn { background: none; border: 1px solid var(--border); color: var(--muted); padding: .3rem .8rem; border-radius: 6px; cursor: pointer; font-size: .8rem; text-decoration: none; }
  .btn:hover { border-color: var(--accent); color: var(--accent); }
</style>
</head>
<body>
<header>
  <h1>🔒 Daily Locks</h1>
  <span class="badge" id="threshold-badge">edge ≥ …</span>
  <span style="margin-left:auto;color:var(--muted);font-size:.8rem;" id="generated"></span>
  <a class="btn" href="/api/lines.csv?stage=filtered">⬇ Filtered CSV</a>
  <a class="btn" href="/api/lines.csv?stage=all">⬇ All lines CSV</a>
  <button class="btn" onclick="refreshNow()">↻ Refresh</button>
</header>

<main>
  <div id="board-error"></div>
  <div class="three-col" id="board"></div>

  <div class="stats-grid">
    <div class="stat-card"><div class="label">Days Tracked</div><div class="value" id="s-days">–</div></div>
    <div class="stat-card"><div class="label">Graded Bets</div><div class="value" id="s-bets">–</div></div>
    <div class="stat-card"><div class="label">Record</div><div class="value" id="s-record">–</div></div>
    <div class="stat-card"><div class="label">Win Rate</div><div class="value" id="s-winrate">–</div></div>
    <div class="stat-card"><div class="label">ROI</div><div class="value" id="s-roi">–</div></div>
    <div class="stat-card"><div class="label">Ungraded</div><div class="value" id="s-ungraded">–</div></div>
  </div>

  <div class="two-col">
    <div class="panel">
      <div class="panel-header">ROI by Market</div>
      <table>
        <thead><tr><th>Market</th><th>Bets</th><th>W-L-P</th><th>Win Rate</th><th>ROI</th></tr></thead>
        <tbody id="market-tbody"><tr><td colspan="5" class="empty">Loading…</td></tr></tbody>
      </table>
    </div>
    <div class="panel">
      <div class="panel-header">ROI by Book</div>
      <table>
        <thead><tr><th>Book</th><th>Bets</th><th>W-L-P</th><th>Win Rate</th><th>ROI</th></tr></thead>
        <tbody id="book-tbody"><tr><td colspan="5" class="empty">Loading…</td></tr></tbody>
      </table>
    </div>
  </div>

  <div class="panel">
    <div class="panel-header">ROI by Edge Quartile</div>
    <table>
      <thead><tr><th>Quartile</th><th>Bets</th><th>W-L-P</th><th>Win Rate</th><th>ROI</th></tr></thead>
      <tbody id="quartile-tbody"><tr><td colspan="5" class="empty">Loading…</td></tr></tbody>
    </table>
  </div>

  <div class="panel">
    <div class="panel-header">Bet History</div>
    <table>
      <thead><tr><th>Date</th><th>Market</th><th>Matchup</th><th>Pick</th><th>Book</th><th>Odds</th><th>Edge</th><th>Result</th></tr></thead>
      <tbody id="history-tbody"><tr><td colspan="8" class="empty">Loading…</td></tr></tbody>
    </table>
  </div>
</main>

<script>
const pct = v => v == null ? '–' : (v * 100).toFixed(1) + '%';
const signed = v => v == null ? '–' : (v >= 0 ? '+' : '') + (v * 100).toFixed(1) + '%';
const cls = v => v == null ? '' : (v >= 0 ? 'pos' : 'neg');
const marketNames = { h2h: 'Moneyline', spreads: 'Spread', totals: 'Over/Under' };

function renderBoard(report) {
  const badge = document.getElementById('threshold-badge');
  badge.textContent = `edge ≥ ${report.threshold.value.toFixed(3)} (${report.threshold.source})`;
  document.getElementById('generated').textContent =
    'Generated ' + new Date(report.generated_at).toLocaleTimeString() + ` · ${report.games} games`;
  document.getElementById('board').innerHTML = report.board.map(m => {
    const rows = m.lines.length
      ? m.lines.map(l => `<tr>
          <td>${l.matchup}</td>
          <td>${l.selection}</td>
          <td>${l.book}</td>
          <td>${l.odds.toFixed(2)}</td>
          <td class="pos">${signed(l.edge)}</td>
        </tr>`).join('')
      : `<tr><td colspan="5" class="empty">No ${m.title} bets available</td></tr>`;
    return `<div class="panel">
      <div class="panel-header">Top ${m.title}</div>
      <table>
        <thead><tr><th>Matchup</th><th>Pick</th><th>Book</th><th>Odds</th><th>Edge</th></tr></thead>
        <tbody>${rows}</tbody>
      </table>
    </div>`;
  }).join('');
}

async function loadPicks() {
  const r = await fetch('/api/picks');
  const err = document.getElementById('board-error');
  if (!r.ok) {
    err.innerHTML = `<div class="panel error">${await r.text()}</div>`;
    return;
  }
  err.innerHTML = '';
  renderBoard(await r.json());
}

function groupRows(groups, label) {
  if (!groups.length) return '<tr><td colspan="5" class="empty">No graded bets yet</td></tr>';
  return groups.map(g => `<tr>
    <td>${label(g.key)}</td>
    <td>${g.bets}</td>
    <td>${g.wins}-${g.losses}-${g.pushes}</td>
    <td>${pct(g.win_rate)}</td>
    <td class="${cls(g.roi)}">${signed(g.roi)}</td>
  </tr>`).join('');
}

async function loadPerformance() {
  const r = await fetch('/api/performance');
  if (!r.ok) return;
  const { summary: s } = await r.json();
  const o = s.overall;
  document.getElementById('s-days').textContent = s.days_tracked;
  document.getElementById('s-bets').textContent = o.bets;
  document.getElementById('s-record').textContent = `${o.wins}-${o.losses}-${o.pushes}`;
  document.getElementById('s-winrate').textContent = pct(o.win_rate);
  const roiEl = document.getElementById('s-roi');
  roiEl.textContent = signed(o.roi);
  roiEl.className = 'value ' + cls(o.roi);
  document.getElementById('s-ungraded').textContent = s.unannotated;
  document.getElementById('market-tbody').innerHTML = groupRows(s.by_market, k => marketNames[k] || k);
  document.getElementById('book-tbody').innerHTML = groupRows(s.by_book, k => k);
  document.getElementById('quartile-tbody').innerHTML = groupRows(s.by_edge_quartile, k => k);
}

async function loadHistory() {
  const r = await fetch('/api/history');
  if (!r.ok) return;
  const picks = await r.json();
  const tbody = document.getElementById('history-tbody');
  if (!picks.length) { tbody.innerHTML = '<tr><td colspan="8" class="empty">No graded bets yet</td></tr>'; return; }
  tbody.innerHTML = picks.slice(0, 100).map(p => `<tr>
    <td>${p.date}</td>
    <td>${marketNames[p.market] || p.market}</td>
    <td>${p.matchup}</td>
    <td>${p.selection}</td>
    <td>${p.book}</td>
    <td>${p.odds.toFixed(2)}</td>
    <td>${signed(p.edge)}</td>
    <td class="${p.result === 'W' ? 'pos' : p.result === 'L' ? 'neg' : ''}">${p.result}</td>
  </tr>`).join('');
}

async function refreshNow() {
  await fetch('/api/refresh', { method: 'POST' });
  await loadAll();
}

async function loadAll() {
  await Promise.all([loadPicks(), loadPerformance(), loadHistory()]);
}

loadAll();
setInterval(loadAll, 60000);
</script>
</body>
</html>"#;
