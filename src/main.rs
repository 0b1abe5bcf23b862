use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod config;
mod dashboard;
mod engine;
mod error;
mod odds;
mod store;

use config::Config;
use dashboard::AppState;
use engine::{CycleReport, PickEngine};
use odds::{CachedOdds, OddsApiClient, OddsSource};
use store::Ledger;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let ledger = Ledger::open(&config.daily_bets_dir, &config.performance_log_path)?;
    info!(
        "Daily records in {}, performance log at {}",
        config.daily_bets_dir.display(),
        ledger.performance_log_path().display()
    );

    let client = OddsApiClient::new(
        &config.odds_api_url,
        &config.odds_api_key,
        &config.sport_key,
        &config.odds_regions,
    )?;
    info!(
        "Odds source: {} ({}, regions {})",
        client.name(),
        config.sport_key,
        config.odds_regions
    );
    let odds = CachedOdds::new(Arc::new(client), Duration::from_secs(config.cache_ttl_secs));

    let engine = Arc::new(PickEngine::new(config.engine_settings(), odds, ledger));
    let settings = engine.settings();
    info!(
        "{} weighted book(s), projection {:?}, dedup {:?}",
        settings.book_weights.len(),
        settings.projection,
        settings.dedup
    );
    match &settings.trusted_books {
        Some(books) => info!("Selecting from {} trusted book(s)", books.len()),
        None => info!("Selecting from every book"),
    }

    if config.once {
        let report = engine
            .run_cycle(Local::now().date_naive())
            .await
            .context("Generation cycle failed")?;
        print_board(&report);
        return Ok(());
    }

    let state = AppState::new(Arc::clone(&engine));
    let app = dashboard::router(state.clone());
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    info!("Dashboard listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Background generation loop; the first tick fires immediately
    let interval_secs = config.cycle_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if state.refresh(Local::now().date_naive()).await.is_err() {
                warn!("Keeping the dashboard on the failure until the next cycle in {}s", interval_secs);
            }
        }
    });

    // Run dashboard server (blocks until shutdown)
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_board(report: &CycleReport) {
    println!(
        "Picks for {} (edge >= {:.3}, {:?})",
        report.date, report.threshold.value, report.threshold.source
    );
    for market in &report.board {
        println!();
        println!("Top {}", market.title);
        if market.lines.is_empty() {
            println!("  No {} bets available", market.title);
            continue;
        }
        for line in &market.lines {
            println!(
                "  {:<32} {:<24} {:<12} {:>5.2}  edge {:+.3}",
                line.matchup, line.selection, line.book, line.odds, line.edge
            );
        }
    }
}
