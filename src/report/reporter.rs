use crate::core::types::{AdaptationStatus, SignalStatus};
use crate::pipeline::types::ScoredCandidate;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One line of `report.csv`. Unknown demand values are written as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub title_native: String,
    pub title_en: String,
    pub anilist_id: u64,
    pub anilist_popularity: u64,
    pub anilist_trending: u64,
    pub score_total: f64,
    pub score_anilist: f64,
    pub score_intent_manga: f64,
    pub score_intent_merch: f64,
    pub score_velocity: f64,
    pub trends_normalized: f64,
    pub trends_status: SignalStatus,
    pub data_quality: f64,
    pub anchor_term: String,
    pub anime_adaptation: AdaptationStatus,
    pub recommended_sku_manga: String,
    pub recommended_sku_goods: String,
    #[serde(default)]
    pub reddit_posts: u32,
    #[serde(default)]
    pub reddit_intent: i64,
    #[serde(default)]
    pub notes: String,
}

impl From<&ScoredCandidate> for ReportRecord {
    fn from(row: &ScoredCandidate) -> Self {
        let (reddit_posts, reddit_intent) = row
            .mentions
            .as_ref()
            .map(|m| (m.post_count, m.intent_score))
            .unwrap_or((0, 0));
        let normalized = row
            .signal
            .normalized_score
            .filter(|v| v.is_finite())
            .unwrap_or(0.0);

        Self {
            title_native: row.candidate.titles.native_or_empty().to_string(),
            title_en: row.search_term.clone(),
            anilist_id: row.candidate.id,
            anilist_popularity: row.candidate.popularity,
            anilist_trending: row.candidate.trending,
            score_total: round2(row.score_total),
            score_anilist: round2(row.score_anilist),
            score_intent_manga: round2(row.score_intent_manga),
            score_intent_merch: round2(row.score_intent_merch),
            score_velocity: round2(row.score_velocity),
            trends_normalized: round2(normalized),
            trends_status: row.signal.status,
            data_quality: row.data_quality,
            anchor_term: row.signal.anchor_label().to_string(),
            anime_adaptation: row.adaptation,
            recommended_sku_manga: row.sku_manga.to_string(),
            recommended_sku_goods: row.sku_goods.join(", "),
            reddit_posts,
            reddit_intent,
            notes: row.notes.clone(),
        }
    }
}

/// One line of `buy_list.csv`. The `[MANUAL]` columns are left for the buyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyListRecord {
    #[serde(rename = "Tier")]
    pub tier: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Anime")]
    pub anime: String,
    #[serde(rename = "Actionable Score")]
    pub actionable_score: String,
    #[serde(rename = "Bonus")]
    pub bonus: String,
    #[serde(rename = "Pri Score")]
    pub pri_score: String,
    #[serde(rename = "Trends Norm")]
    pub trends_norm: String,
    #[serde(rename = "Test SKU 1")]
    pub test_sku_1: String,
    #[serde(rename = "Test SKU 2")]
    pub test_sku_2: String,
    #[serde(rename = "eBay Query")]
    pub ebay_query: String,
    #[serde(rename = "Mercari Keywords (JP)")]
    pub mercari_keywords: String,
    #[serde(rename = "[MANUAL] Sold 30d")]
    pub manual_sold_30d: String,
    #[serde(rename = "[MANUAL] Price Range")]
    pub manual_price_range: String,
    #[serde(rename = "[MANUAL] Result (Pass/Fail)")]
    pub manual_result: String,
    #[serde(rename = "Notes")]
    pub notes: String,
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Writes `report.csv`. Nothing is written for an empty batch.
pub fn write_report(path: &Path, rows: &[ScoredCandidate]) -> Result<usize> {
    if rows.is_empty() {
        warn!("No data to report.");
        return Ok(0);
    }
    let records: Vec<ReportRecord> = rows.iter().map(ReportRecord::from).collect();
    write_csv(path, &records)?;
    info!("Report generated successfully: {}", path.display());
    Ok(records.len())
}

/// Serializes `rows` with a header line, prefixed by a UTF-8 BOM so spreadsheet apps pick the encoding.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(UTF8_BOM)
        .with_context(|| format!("writing {}", path.display()))?;

    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("writing row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

/// Reads a CSV written by [`write_csv`]. Each row deserializes independently so
/// the caller decides what to do with bad ones.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<csv::Result<T>>> {
    let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let body = raw.strip_prefix(UTF8_BOM).unwrap_or(&raw);

    let mut reader = csv::Reader::from_reader(body);
    Ok(reader.deserialize().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Candidate, DemandSignal, MediaStatus, MentionSignal, Titles};
    use tempfile::tempdir;

    fn scored() -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                id: 154587,
                titles: Titles {
                    romaji: Some("Sousou no Frieren".to_string()),
                    english: Some("Frieren: Beyond Journey's End".to_string()),
                    native: Some("葬送のフリーレン".to_string()),
                },
                popularity: 120_345,
                trending: 87,
                publication: MediaStatus::Releasing,
                relations: vec![],
            },
            search_term: "Frieren: Beyond Journey's End".to_string(),
            adaptation: AdaptationStatus::Finished,
            signal: DemandSignal::failed(SignalStatus::ErrorApi),
            mentions: Some(MentionSignal {
                post_count: 4,
                score_sum: 17,
                intent_score: 57,
                query: "\"Frieren\"".to_string(),
            }),
            score_anilist: 129.046,
            score_intent_manga: 0.0,
            score_intent_merch: 0.0,
            score_velocity: 0.0,
            score_total: 129.046,
            data_quality: 0.1,
            sku_manga: "Vol 1 (New)",
            sku_goods: vec!["Acrylic Stand", "Preorder Bonus"],
            notes: "Vel: 0.0%, Status: error_api".to_string(),
        }
    }

    #[test]
    fn test_record_flattens_unknowns() {
        let rec = ReportRecord::from(&scored());
        assert_eq!(rec.trends_normalized, 0.0);
        assert_eq!(rec.anchor_term, "None");
        assert_eq!(rec.score_total, 129.05);
        assert_eq!(rec.recommended_sku_goods, "Acrylic Stand, Preorder Bonus");
        assert_eq!(rec.reddit_posts, 4);
        assert_eq!(rec.reddit_intent, 57);
        assert_eq!(rec.title_native, "葬送のフリーレン");
    }

    #[test]
    fn test_report_written_with_bom_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.csv");

        assert_eq!(write_report(&path, &[scored()]).unwrap(), 1);

        let raw = fs::read(&path).unwrap();
        assert!(raw.starts_with(UTF8_BOM));
        let text = String::from_utf8(raw[UTF8_BOM.len()..].to_vec()).unwrap();
        assert!(text.starts_with("title_native,title_en,anilist_id,"));
        assert!(text.contains(",error_api,"));
        assert!(text.contains(",Finished,"));

        let rows: Vec<csv::Result<ReportRecord>> = read_csv(&path).unwrap();
        assert_eq!(rows.len(), 1);
        let back = rows.into_iter().next().unwrap().unwrap();
        assert_eq!(back, ReportRecord::from(&scored()));
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.csv");
        assert_eq!(write_report(&path, &[]).unwrap(), 0);
        assert!(!path.exists());
    }
}
