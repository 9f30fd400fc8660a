use crate::config::config::TrendsCfg;
use crate::core::types::{DemandSignal, SignalStatus};
use crate::trends::cache::SignalCache;
use crate::trends::source::{DemandSource, InterestTable, SourceError};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Query layout for one anchor attempt, in the order sent to the source.
struct AnchorQuery {
    term: String,
    anchor: String,
    manga: String,
    figure: String,
    merch: String,
}

impl AnchorQuery {
    fn new(term: &str, anchor: &str) -> Self {
        Self {
            term: term.to_string(),
            anchor: anchor.to_string(),
            manga: format!("{term} manga"),
            figure: format!("{term} figure"),
            merch: format!("{term} merch"),
        }
    }

    fn terms(&self) -> Vec<String> {
        vec![
            self.term.clone(),
            self.anchor.clone(),
            self.manga.clone(),
            self.figure.clone(),
            self.merch.clone(),
        ]
    }
}

/// Scores a search term as a share of a high-volume anchor term queried in the same batch.
///
/// Anchors are tried in order; an anchor whose own recent volume is below the
/// health threshold is skipped, since it cannot serve as a denominator.
pub struct AnchorNormalizer {
    source: Arc<dyn DemandSource>,
    cache: SignalCache,
    anchors: Vec<String>,
    window: usize,
    health_threshold: f64,
    delay_min: Duration,
    delay_max: Duration,
}

impl AnchorNormalizer {
    pub fn new(source: Arc<dyn DemandSource>, cache: SignalCache, cfg: &TrendsCfg) -> Self {
        Self {
            source,
            cache,
            anchors: cfg.anchors.clone(),
            window: cfg.window,
            health_threshold: cfg.anchor_health_threshold,
            delay_min: cfg.delay_min,
            delay_max: cfg.delay_max,
        }
    }

    pub fn cache(&self) -> &SignalCache {
        &self.cache
    }

    /// Never fails: every error path yields a signal with unknown values and a descriptive status.
    pub async fn get_signal(&mut self, term: &str) -> DemandSignal {
        if let Some(hit) = self.cache.lookup(term) {
            info!("Using cached Trends data for '{}'", term);
            return hit;
        }

        self.pause().await;

        let signal = self.fetch_live(term).await;
        if signal.status == SignalStatus::Success {
            self.cache.store(term, signal.clone());
        }
        signal
    }

    async fn pause(&self) {
        let wait = if self.delay_max > self.delay_min {
            rand::thread_rng().gen_range(self.delay_min..=self.delay_max)
        } else {
            self.delay_min
        };
        if !wait.is_zero() {
            info!("Sleeping {:.2}s before Trends request", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }

    async fn fetch_live(&self, term: &str) -> DemandSignal {
        let mut outcome = SignalStatus::ErrorNoAnchor;

        for anchor in &self.anchors {
            if anchor.eq_ignore_ascii_case(term) {
                debug!("Skipping anchor '{}': same as the search term", anchor);
                continue;
            }

            let query = AnchorQuery::new(term, anchor);
            let table = match self.source.interest_over_time(&query.terms()).await {
                Ok(table) => table,
                Err(SourceError::RateLimited(msg)) => {
                    error!("Trends rate limited for [{}, {}]: {}", term, anchor, msg);
                    outcome = SignalStatus::ErrorApi;
                    break;
                }
                Err(e) => {
                    error!("Trends API error for [{}, {}]: {}", term, anchor, e);
                    outcome = SignalStatus::ErrorUnknown;
                    continue;
                }
            };

            if table.is_empty() {
                warn!("No data returned for [{}, {}]", term, anchor);
                outcome = SignalStatus::NoData;
                break;
            }
            debug!("{} observations for [{}, {}]", table.len(), term, anchor);

            match self.score_against_anchor(&table, &query) {
                Some(signal) => {
                    info!(
                        "Trends success for '{}' via '{}': score {:.1}",
                        term,
                        anchor,
                        signal.normalized_score.unwrap_or_default()
                    );
                    return signal;
                }
                None => continue,
            }
        }

        DemandSignal::failed(outcome)
    }

    /// `None` when the anchor is dead (or its column is missing).
    fn score_against_anchor(&self, table: &InterestTable, q: &AnchorQuery) -> Option<DemandSignal> {
        let mean = |t: &str| table.trailing_mean(t, self.window).unwrap_or(0.0);

        let anchor_avg = mean(&q.anchor);
        if anchor_avg < self.health_threshold {
            warn!(
                "Anchor '{}' has near-zero volume ({:.3}). Trying next anchor...",
                q.anchor, anchor_avg
            );
            return None;
        }

        let share = |v: f64| v / anchor_avg * 100.0;
        let merch_raw = mean(&q.figure).max(mean(&q.merch));

        Some(DemandSignal {
            normalized_score: Some(share(mean(&q.term))),
            intent_manga: Some(share(mean(&q.manga))),
            intent_merch: Some(share(merch_raw)),
            velocity: table.column(&q.term).and_then(|s| velocity(&s)),
            status: SignalStatus::Success,
            anchor_term: Some(q.anchor.clone()),
            anchor_value: Some(anchor_avg),
        })
    }
}

/// Change between the second- and third-most-recent observations.
/// The latest point is left out because it may cover a partial period.
pub fn velocity(series: &[f64]) -> Option<f64> {
    let n = series.len();
    if n < 3 {
        return None;
    }
    let current = series[n - 2];
    let prev = series[n - 3];
    let v = if prev > 0.0 {
        (current - prev) / prev
    } else if current > 0.0 {
        1.0
    } else {
        0.0
    };
    Some(v)
}
