mod catalog;
mod config;
mod core;
mod gate;
mod pipeline;
mod report;
mod social;
mod trends;

use crate::catalog::anilist::AniListClient;
use crate::catalog::client::CatalogClient;
use crate::config::config::{AppCfg, DemandSourceKind, LoggingCfg};
use crate::gate::market_gate::MarketGate;
use crate::pipeline::processor::DataProcessor;
use crate::social::client::MentionSource;
use crate::social::reddit::RedditClient;
use crate::trends::cache::SignalCache;
use crate::trends::google::GoogleTrendsSource;
use crate::trends::normalizer::AnchorNormalizer;
use crate::trends::simulator::SimDemandSource;
use crate::trends::source::DemandSource;
use anyhow::{Context, Result};
use reqwest::Client;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing(cfg: &LoggingCfg) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.filter));

    let file_layer = match &cfg.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cfg = match std::env::args().nth(1) {
        Some(path) => AppCfg::load(&path, true)?,
        None => AppCfg::load("config.yml", false)?,
    };
    init_tracing(&cfg.logging)?;

    let span = info_span!(
        "Batch",
        pid = %std::process::id(),
        version = env!("CARGO_PKG_VERSION"),
    );

    match run(cfg).instrument(span).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Batch failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cfg: AppCfg) -> Result<()> {
    info!("Starting IP Research weekly batch");

    let missing = cfg.missing_reddit_vars();
    if !missing.is_empty() {
        warn!(
            "Missing environment variables: {}. Reddit mentions disabled.",
            missing.join(", ")
        );
    }

    let client = Client::builder()
        .user_agent(cfg.http.user_agent.clone())
        .pool_idle_timeout(cfg.http.pool_idle_timeout)
        .pool_max_idle_per_host(cfg.http.pool_max_idle_per_host)
        .timeout(cfg.http.timeout)
        .cookie_store(true)
        .build()
        .context("building http client")?;

    info!("Step 1: Fetching candidates from AniList...");
    let anilist = AniListClient::new(cfg.anilist.clone(), client.clone());
    let candidates = anilist.get_candidates(cfg.anilist.target_count).await;
    if candidates.is_empty() {
        warn!("No candidates found. Exiting.");
        return Ok(());
    }

    info!("Step 2: Enriching candidates with demand signals...");
    let source: Arc<dyn DemandSource> = match cfg.trends.source {
        DemandSourceKind::Google => {
            Arc::new(GoogleTrendsSource::new(cfg.trends.clone(), client.clone()))
        }
        DemandSourceKind::Sim => {
            info!("Using simulated demand source");
            Arc::new(SimDemandSource::new(cfg.trends.anchors.clone()))
        }
    };
    let cache = SignalCache::open(cfg.trends.cache_path.clone(), cfg.trends.cache_ttl);
    let normalizer = AnchorNormalizer::new(source, cache, &cfg.trends);
    let social = RedditClient::from_cfg(&cfg.reddit, client.clone())
        .map(|r| Arc::new(r) as Arc<dyn MentionSource>);

    let mut processor = DataProcessor::new(normalizer, social);
    let scored = processor
        .process(candidates, cfg.pipeline.trends_limit)
        .await;

    info!("Step 3: Generating {}...", cfg.report.report_path.display());
    crate::report::reporter::write_report(&cfg.report.report_path, &scored)?;

    info!("Step 4: Running Market Gate ({})...", cfg.report.buy_list_path.display());
    MarketGate::new().process_file(&cfg.report.report_path, &cfg.report.buy_list_path)?;

    info!(
        "Batch completed successfully. {} demand signals cached.",
        processor.cached_signals()
    );
    Ok(())
}
