use crate::core::types::AdaptationStatus;
use crate::report::reporter::{self, BuyListRecord, ReportRecord};
use anyhow::Result;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

const TIER_A_MIN_SCORE: f64 = 150.0;
const TIER_A_MIN_DEMAND: f64 = 10.0;
const TIER_B_MIN_SCORE: f64 = 80.0;
const BONUS_SKU_MIN_ACTIONABLE: f64 = 50.0;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("non-finite {field} for '{title}'")]
    NonFinite { field: &'static str, title: String },
    #[error("malformed report row: {0}")]
    Malformed(#[from] csv::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    A,
    B,
    C,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatedRow {
    pub title: String,
    pub title_native: String,
    pub adaptation: AdaptationStatus,
    pub tier: Tier,
    pub score_actionable: f64,
    pub priority_bonus: f64,
    pub score_prioritized: f64,
    pub trends_normalized: f64,
    pub skus: Vec<&'static str>,
    pub ebay_query: String,
    pub mercari_keywords: String,
    pub data_quality: f64,
}

impl GatedRow {
    pub fn to_buy_list(&self) -> BuyListRecord {
        BuyListRecord {
            tier: self.tier.to_string(),
            title: self.title.clone(),
            anime: self.adaptation.to_string(),
            actionable_score: format!("{:.1}", self.score_actionable),
            bonus: format!("{:.0}", self.priority_bonus),
            pri_score: format!("{:.1}", self.score_prioritized),
            trends_norm: format!("{:.1}", self.trends_normalized),
            test_sku_1: self.skus.first().copied().unwrap_or_default().to_string(),
            test_sku_2: self.skus.get(1).copied().unwrap_or_default().to_string(),
            ebay_query: self.ebay_query.clone(),
            mercari_keywords: self.mercari_keywords.clone(),
            manual_sold_30d: String::new(),
            manual_price_range: String::new(),
            manual_result: String::new(),
            notes: format!("Qual: {:.1}", self.data_quality),
        }
    }
}

/// Pre-adaptation titles rank ahead of ones whose anime already aired.
pub fn priority_bonus(adaptation: AdaptationStatus) -> f64 {
    match adaptation {
        AdaptationStatus::None => 20.0,
        AdaptationStatus::Announced => 10.0,
        AdaptationStatus::Airing | AdaptationStatus::Finished => 0.0,
    }
}

pub fn tier_for(score_prioritized: f64, trends_normalized: f64) -> Tier {
    if score_prioritized > TIER_A_MIN_SCORE && trends_normalized > TIER_A_MIN_DEMAND {
        Tier::A
    } else if score_prioritized > TIER_B_MIN_SCORE {
        Tier::B
    } else {
        Tier::C
    }
}

/// Turns scored report rows into a tiered buy list.
#[derive(Default)]
pub struct MarketGate;

impl MarketGate {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, rec: &ReportRecord) -> Result<GatedRow, GateError> {
        for (field, value) in [
            ("score_total", rec.score_total),
            ("data_quality", rec.data_quality),
            ("trends_normalized", rec.trends_normalized),
        ] {
            if !value.is_finite() {
                return Err(GateError::NonFinite {
                    field,
                    title: rec.title_en.clone(),
                });
            }
        }

        let score_actionable = rec.score_total * rec.data_quality;
        let bonus = priority_bonus(rec.anime_adaptation);
        let score_prioritized = score_actionable + bonus;
        let tier = tier_for(score_prioritized, rec.trends_normalized);

        let mut skus = vec!["Vol 1 First Print (Obi)"];
        if score_actionable > BONUS_SKU_MIN_ACTIONABLE {
            skus.push("Store Bonus Card/Paper");
        }
        if tier == Tier::A {
            skus.push("Limited Acrylic Stand");
        }

        let mercari_keywords = if rec.title_native.is_empty() {
            String::new()
        } else {
            format!("{0} 特典 | {0} 初版", rec.title_native)
        };

        Ok(GatedRow {
            title: rec.title_en.clone(),
            title_native: rec.title_native.clone(),
            adaptation: rec.anime_adaptation,
            tier,
            score_actionable,
            priority_bonus: bonus,
            score_prioritized,
            trends_normalized: rec.trends_normalized,
            skus,
            ebay_query: format!("{} manga", rec.title_en),
            mercari_keywords,
            data_quality: rec.data_quality,
        })
    }

    /// Drops rows that fail to parse or classify, then orders by tier and prioritized score.
    pub fn classify_all(
        &self,
        rows: impl IntoIterator<Item = Result<ReportRecord, csv::Error>>,
    ) -> Vec<GatedRow> {
        let mut gated: Vec<GatedRow> = rows
            .into_iter()
            .filter_map(|row| {
                let result = row
                    .map_err(GateError::from)
                    .and_then(|rec| self.classify(&rec));
                match result {
                    Ok(g) => Some(g),
                    Err(e) => {
                        warn!("Skipping row: {}", e);
                        None
                    }
                }
            })
            .collect();

        gated.sort_by(|a, b| {
            a.tier.cmp(&b.tier).then(
                b.score_prioritized
                    .partial_cmp(&a.score_prioritized)
                    .unwrap_or(Ordering::Equal),
            )
        });
        gated
    }

    /// Reads `report_path`, writes `buy_list_path`. A missing report is logged, not fatal.
    pub fn process_file(&self, report_path: &Path, buy_list_path: &Path) -> Result<usize> {
        if !report_path.exists() {
            error!("Input file not found: {}", report_path.display());
            return Ok(0);
        }

        let rows = reporter::read_csv::<ReportRecord>(report_path)?;
        let gated = self.classify_all(rows);
        if gated.is_empty() {
            warn!("Market Gate produced no rows; {} not written", buy_list_path.display());
            return Ok(0);
        }

        let records: Vec<BuyListRecord> = gated.iter().map(GatedRow::to_buy_list).collect();
        reporter::write_csv(buy_list_path, &records)?;
        info!(
            "Market Gate processed {} items. Saved to {}",
            records.len(),
            buy_list_path.display()
        );
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SignalStatus;
    use std::fs;
    use tempfile::tempdir;

    fn record(title: &str, total: f64, quality: f64, anime: AdaptationStatus, norm: f64) -> ReportRecord {
        ReportRecord {
            title_native: "チェンソーマン".to_string(),
            title_en: title.to_string(),
            anilist_id: 1,
            anilist_popularity: 100_000,
            anilist_trending: 50,
            score_total: total,
            score_anilist: total,
            score_intent_manga: 0.0,
            score_intent_merch: 0.0,
            score_velocity: 0.0,
            trends_normalized: norm,
            trends_status: SignalStatus::Success,
            data_quality: quality,
            anchor_term: "Naruto".to_string(),
            anime_adaptation: anime,
            recommended_sku_manga: "Vol 1 (New)".to_string(),
            recommended_sku_goods: "General Merch".to_string(),
            reddit_posts: 0,
            reddit_intent: 0,
            notes: String::new(),
        }
    }

    #[test]
    fn test_no_anime_high_demand_is_tier_a() {
        let gate = MarketGate::new();
        let row = gate
            .classify(&record("Chainsaw Man", 200.0, 1.0, AdaptationStatus::None, 15.0))
            .unwrap();

        assert_eq!(row.score_actionable, 200.0);
        assert_eq!(row.priority_bonus, 20.0);
        assert_eq!(row.score_prioritized, 220.0);
        assert_eq!(row.tier, Tier::A);
        assert_eq!(
            row.skus,
            vec!["Vol 1 First Print (Obi)", "Store Bonus Card/Paper", "Limited Acrylic Stand"]
        );
        assert_eq!(row.ebay_query, "Chainsaw Man manga");
        assert_eq!(row.mercari_keywords, "チェンソーマン 特典 | チェンソーマン 初版");
    }

    #[test]
    fn test_airing_mid_score_is_tier_b() {
        let gate = MarketGate::new();
        let row = gate
            .classify(&record("Chainsaw Man", 90.0, 1.0, AdaptationStatus::Airing, 2.0))
            .unwrap();
        assert_eq!(row.priority_bonus, 0.0);
        assert_eq!(row.score_prioritized, 90.0);
        assert_eq!(row.tier, Tier::B);
    }

    #[test]
    fn test_high_score_without_demand_is_not_tier_a() {
        let row = MarketGate::new()
            .classify(&record("X", 300.0, 1.0, AdaptationStatus::None, 10.0))
            .unwrap();
        assert_eq!(row.tier, Tier::B);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let gate = MarketGate::new();
        let rec = record("Sakamoto Days", 120.0, 0.8, AdaptationStatus::Announced, 12.0);
        let a = gate.classify(&rec).unwrap();
        let b = gate.classify(&rec).unwrap();
        assert_eq!(a.tier, b.tier);
        assert_eq!(a.score_prioritized, b.score_prioritized);
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_finite_rows_are_rejected() {
        let gate = MarketGate::new();
        let rec = record("Broken", f64::NAN, 1.0, AdaptationStatus::None, 1.0);
        assert!(matches!(
            gate.classify(&rec),
            Err(GateError::NonFinite { field: "score_total", .. })
        ));

        let rows = vec![
            Ok(rec),
            Ok(record("Fine", 10.0, 1.0, AdaptationStatus::Finished, 1.0)),
        ];
        let gated = gate.classify_all(rows);
        assert_eq!(gated.len(), 1);
        assert_eq!(gated[0].title, "Fine");
        assert_eq!(gated[0].tier, Tier::C);
        assert_eq!(gated[0].mercari_keywords, "チェンソーマン 特典 | チェンソーマン 初版");
    }

    #[test]
    fn test_sorted_by_tier_then_score() {
        let gate = MarketGate::new();
        let rows = vec![
            Ok(record("c-low", 10.0, 1.0, AdaptationStatus::Airing, 0.0)),
            Ok(record("b-low", 85.0, 1.0, AdaptationStatus::Airing, 0.0)),
            Ok(record("a", 200.0, 1.0, AdaptationStatus::None, 50.0)),
            Ok(record("b-high", 120.0, 1.0, AdaptationStatus::Finished, 1.0)),
            Ok(record("c-high", 60.0, 1.0, AdaptationStatus::Announced, 0.0)),
        ];
        let titles: Vec<String> = gate.classify_all(rows).into_iter().map(|g| g.title).collect();
        assert_eq!(titles, vec!["a", "b-high", "b-low", "c-high", "c-low"]);
    }

    #[test]
    fn test_buy_list_formatting() {
        let mut rec = record("Dandadan", 100.0, 0.5, AdaptationStatus::Announced, 3.27);
        rec.title_native.clear();
        let row = MarketGate::new().classify(&rec).unwrap();
        let out = row.to_buy_list();

        assert_eq!(out.tier, "C");
        assert_eq!(out.anime, "Announced");
        assert_eq!(out.actionable_score, "50.0");
        assert_eq!(out.bonus, "10");
        assert_eq!(out.pri_score, "60.0");
        assert_eq!(out.trends_norm, "3.3");
        assert_eq!(out.test_sku_1, "Vol 1 First Print (Obi)");
        assert_eq!(out.test_sku_2, "");
        assert_eq!(out.mercari_keywords, "");
        assert_eq!(out.notes, "Qual: 0.5");
    }

    #[test]
    fn test_process_file_drops_malformed_rows() {
        let dir = tempdir().unwrap();
        let report = dir.path().join("report.csv");
        let buy_list = dir.path().join("buy_list.csv");

        let good = record("Kagurabachi", 180.0, 1.0, AdaptationStatus::None, 22.0);
        reporter::write_csv(&report, &[good]).unwrap();

        // append a row whose score cannot be parsed
        let mut text = fs::read_to_string(&report).unwrap();
        text.push_str(
            "ネイティブ,Bad Row,2,10,1,not-a-number,1.0,0,0,0,0,success,1.0,Naruto,None,Vol 1 (New),General Merch,0,0,\n",
        );
        fs::write(&report, text).unwrap();

        let written = MarketGate::new().process_file(&report, &buy_list).unwrap();
        assert_eq!(written, 1);

        let rows: Vec<BuyListRecord> = reporter::read_csv(&buy_list)
            .unwrap()
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Kagurabachi");
        assert_eq!(rows[0].tier, "A");
        assert_eq!(rows[0].pri_score, "200.0");
        assert_eq!(rows[0].test_sku_2, "Store Bonus Card/Paper");
        assert_eq!(rows[0].manual_sold_30d, "");
    }

    #[test]
    fn test_missing_report_is_not_fatal() {
        let dir = tempdir().unwrap();
        let written = MarketGate::new()
            .process_file(&dir.path().join("nope.csv"), &dir.path().join("out.csv"))
            .unwrap();
        assert_eq!(written, 0);
        assert!(!dir.path().join("out.csv").exists());
    }
}
