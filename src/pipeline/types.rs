use crate::core::types::{AdaptationStatus, Candidate, DemandSignal, MentionSignal};

/// Stage-one view of a candidate: catalog metrics only.
#[derive(Debug, Clone)]
pub struct TriagedCandidate {
    pub candidate: Candidate,
    pub search_term: String,
    pub adaptation: AdaptationStatus,
    pub score_anilist: f64,
}

/// Final per-candidate result. Every score here is finite.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub search_term: String,
    pub adaptation: AdaptationStatus,
    pub signal: DemandSignal,
    pub mentions: Option<MentionSignal>,

    pub score_anilist: f64,
    pub score_intent_manga: f64,
    pub score_intent_merch: f64,
    pub score_velocity: f64,
    pub score_total: f64,
    pub data_quality: f64,

    pub sku_manga: &'static str,
    pub sku_goods: Vec<&'static str>,
    pub notes: String,
}
