use crate::core::types::{Candidate, DemandSignal, MentionSignal, SignalStatus};
use crate::pipeline::sku;
use crate::pipeline::types::{ScoredCandidate, TriagedCandidate};
use crate::social::client::MentionSource;
use crate::trends::normalizer::AnchorNormalizer;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub const QUALITY_FAILED: f64 = 0.1;
pub const QUALITY_SKIPPED: f64 = 0.5;
pub const QUALITY_CACHED: f64 = 0.8;
pub const QUALITY_LIVE: f64 = 1.0;

const INTENT_MANGA_WEIGHT: f64 = 1.5;
const VELOCITY_CAP: f64 = 2.0;
const VELOCITY_WEIGHT: f64 = 50.0;
/// Below this normalized demand a velocity ratio is mostly noise.
const VELOCITY_MIN_DEMAND: f64 = 0.5;

/// Two-stage scorer: cheap catalog triage for everyone, demand lookups for the top slice.
pub struct DataProcessor {
    normalizer: AnchorNormalizer,
    social: Option<Arc<dyn MentionSource>>,
}

impl DataProcessor {
    pub fn new(normalizer: AnchorNormalizer, social: Option<Arc<dyn MentionSource>>) -> Self {
        Self { normalizer, social }
    }

    pub fn cached_signals(&self) -> usize {
        self.normalizer.cache().len()
    }

    pub async fn process(&mut self, candidates: Vec<Candidate>, trends_limit: usize) -> Vec<ScoredCandidate> {
        let mut triaged: Vec<TriagedCandidate> = candidates.into_iter().map(triage).collect();
        triaged.sort_by(|a, b| {
            b.score_anilist
                .partial_cmp(&a.score_anilist)
                .unwrap_or(Ordering::Equal)
        });

        let checked_count = triaged.len().min(trends_limit);
        info!(
            "Checking demand for top {} of {} candidates",
            checked_count,
            triaged.len()
        );

        let mut results = Vec::with_capacity(triaged.len());
        for (idx, entry) in triaged.into_iter().enumerate() {
            let checked = idx < trends_limit;

            let (signal, mentions) = if checked {
                info!("[{}/{}] Checking '{}'", idx + 1, checked_count, entry.search_term);
                let signal = self.normalizer.get_signal(&entry.search_term).await;
                let mentions = match &self.social {
                    Some(social) => match social.search_mentions(&entry.search_term).await {
                        Ok(m) => Some(m),
                        Err(e) => {
                            warn!("Reddit search failed for {}: {:#}", entry.search_term, e);
                            None
                        }
                    },
                    None => None,
                };
                (signal, mentions)
            } else {
                (DemandSignal::skipped(), None)
            };

            results.push(score(entry, signal, mentions));
        }

        results.sort_by(|a, b| {
            b.score_total
                .partial_cmp(&a.score_total)
                .unwrap_or(Ordering::Equal)
        });
        results
    }
}

pub fn anilist_score(popularity: u64, trending: u64) -> f64 {
    popularity as f64 / 1000.0 + trending as f64 / 10.0
}

pub fn triage(candidate: Candidate) -> TriagedCandidate {
    TriagedCandidate {
        search_term: candidate.titles.search_term(),
        adaptation: candidate.adaptation_status(),
        score_anilist: anilist_score(candidate.popularity, candidate.trending),
        candidate,
    }
}

/// Known and finite, otherwise zero.
fn known(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

fn is_known(v: Option<f64>) -> bool {
    v.is_some_and(f64::is_finite)
}

pub fn data_quality(signal: &DemandSignal) -> f64 {
    if signal.status == SignalStatus::Skipped {
        QUALITY_SKIPPED
    } else if !is_known(signal.normalized_score) {
        QUALITY_FAILED
    } else if signal.status == SignalStatus::Cached {
        QUALITY_CACHED
    } else {
        QUALITY_LIVE
    }
}

pub fn velocity_score(signal: &DemandSignal) -> f64 {
    if signal.status == SignalStatus::Skipped {
        return 0.0;
    }
    match (signal.velocity, signal.normalized_score) {
        (Some(v), Some(norm)) if v.is_finite() && norm.is_finite() && norm >= VELOCITY_MIN_DEMAND => {
            v.min(VELOCITY_CAP) * VELOCITY_WEIGHT
        }
        _ => 0.0,
    }
}

fn score(
    entry: TriagedCandidate,
    signal: DemandSignal,
    mentions: Option<MentionSignal>,
) -> ScoredCandidate {
    let quality = data_quality(&signal);
    let intent_manga = known(signal.intent_manga);
    let intent_merch = known(signal.intent_merch);
    let velocity = known(signal.velocity);
    let vel_score = velocity_score(&signal);

    let blended = if quality < QUALITY_SKIPPED || signal.status == SignalStatus::Skipped {
        entry.score_anilist
    } else {
        entry.score_anilist + intent_manga * INTENT_MANGA_WEIGHT + vel_score
    };
    let score_total = if blended.is_finite() { blended } else { entry.score_anilist };

    let notes = format!("Vel: {:.1}%, Status: {}", velocity * 100.0, signal.status);

    ScoredCandidate {
        sku_manga: sku::manga_sku(entry.candidate.publication),
        sku_goods: sku::goods_skus(intent_merch, velocity, entry.adaptation),
        candidate: entry.candidate,
        search_term: entry.search_term,
        adaptation: entry.adaptation,
        signal,
        mentions,
        score_anilist: entry.score_anilist,
        score_intent_manga: intent_manga,
        score_intent_merch: intent_merch,
        score_velocity: vel_score,
        score_total,
        data_quality: quality,
        notes,
    }
}
