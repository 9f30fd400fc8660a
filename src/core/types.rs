use serde::{Deserialize, Serialize};
use std::fmt;

// ----------- Catalog -----------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Titles {
    #[serde(default)]
    pub romaji: Option<String>,
    #[serde(default)]
    pub english: Option<String>,
    #[serde(default)]
    pub native: Option<String>,
}

impl Titles {
    /// English title when the catalog has one, romaji otherwise.
    pub fn search_term(&self) -> String {
        self.english
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.romaji.as_deref().filter(|t| !t.trim().is_empty()))
            .unwrap_or("Unknown")
            .to_string()
    }

    pub fn native_or_empty(&self) -> &str {
        self.native.as_deref().unwrap_or("")
    }
}

/// Release state of a catalog entry, as reported by AniList.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaStatus {
    Finished,
    Releasing,
    NotYetReleased,
    Cancelled,
    Hiatus,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Anime,
    Manga,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelatedWork {
    pub relation_type: String,
    pub media_type: MediaType,
    pub status: Option<MediaStatus>,
}

impl RelatedWork {
    fn is_anime_adaptation(&self) -> bool {
        self.relation_type == "ADAPTATION" && self.media_type == MediaType::Anime
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: u64,
    pub titles: Titles,
    pub popularity: u64,
    pub trending: u64,
    pub publication: MediaStatus,
    #[serde(default)]
    pub relations: Vec<RelatedWork>,
}

impl Candidate {
    pub fn adaptation_status(&self) -> AdaptationStatus {
        AdaptationStatus::resolve(&self.relations)
    }
}

/// Anime adaptation stage of a manga, resolved from its related works.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdaptationStatus {
    #[default]
    None,
    Announced,
    Airing,
    Finished,
}

impl AdaptationStatus {
    fn rank(self) -> u8 {
        match self {
            AdaptationStatus::None => 0,
            AdaptationStatus::Finished => 1,
            AdaptationStatus::Announced => 2,
            AdaptationStatus::Airing => 3,
        }
    }

    /// Highest-priority status among anime adaptations: Airing > Announced > Finished > None.
    pub fn resolve(relations: &[RelatedWork]) -> Self {
        let mut best = AdaptationStatus::None;
        for work in relations.iter().filter(|w| w.is_anime_adaptation()) {
            let status = match work.status {
                Some(MediaStatus::Releasing) => AdaptationStatus::Airing,
                Some(MediaStatus::NotYetReleased) => AdaptationStatus::Announced,
                Some(MediaStatus::Finished) => AdaptationStatus::Finished,
                _ => continue,
            };
            if status == AdaptationStatus::Airing {
                return status;
            }
            if status.rank() > best.rank() {
                best = status;
            }
        }
        best
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptationStatus::None => "None",
            AdaptationStatus::Announced => "Announced",
            AdaptationStatus::Airing => "Airing",
            AdaptationStatus::Finished => "Finished",
        }
    }
}

impl fmt::Display for AdaptationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------- Demand signal -----------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Success,
    Cached,
    Skipped,
    NoData,
    ErrorApi,
    ErrorUnknown,
    ErrorNoAnchor,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Success => "success",
            SignalStatus::Cached => "cached",
            SignalStatus::Skipped => "skipped",
            SignalStatus::NoData => "no_data",
            SignalStatus::ErrorApi => "error_api",
            SignalStatus::ErrorUnknown => "error_unknown",
            SignalStatus::ErrorNoAnchor => "error_no_anchor",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anchor-normalized demand for one search term. `None` means unknown, never zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandSignal {
    pub normalized_score: Option<f64>,
    pub intent_manga: Option<f64>,
    pub intent_merch: Option<f64>,
    pub velocity: Option<f64>,
    pub status: SignalStatus,
    pub anchor_term: Option<String>,
    pub anchor_value: Option<f64>,
}

impl DemandSignal {
    pub fn failed(status: SignalStatus) -> Self {
        Self {
            normalized_score: None,
            intent_manga: None,
            intent_merch: None,
            velocity: None,
            status,
            anchor_term: None,
            anchor_value: None,
        }
    }

    /// Placeholder for candidates past the lookup cutoff. Zeros, not unknowns: skipping is policy.
    pub fn skipped() -> Self {
        Self {
            normalized_score: Some(0.0),
            intent_manga: Some(0.0),
            intent_merch: Some(0.0),
            velocity: Some(0.0),
            status: SignalStatus::Skipped,
            anchor_term: None,
            anchor_value: None,
        }
    }

    pub fn anchor_label(&self) -> &str {
        self.anchor_term.as_deref().unwrap_or("None")
    }
}

// ----------- Social mentions -----------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MentionSignal {
    pub post_count: u32,
    pub score_sum: i64,
    pub intent_score: i64,
    pub query: String,
}
