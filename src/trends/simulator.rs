use crate::trends::source::{DemandSource, InterestPoint, InterestTable, SourceError};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;

const WEEKS: usize = 52;

/// Offline demand source: deterministic weekly series derived from the term text.
///
/// Known anchors get a steady high level; everything else lands somewhere in
/// 0..40 with a gentle seasonal wave. Intent variants ("x manga", "x figure",
/// "x merch") follow their base term at a fraction of its volume.
pub struct SimDemandSource {
    anchors: Vec<String>,
    fixed: HashMap<String, Vec<f64>>,
}

impl SimDemandSource {
    pub fn new(anchors: Vec<String>) -> Self {
        Self {
            anchors,
            fixed: HashMap::new(),
        }
    }

    /// Pins the series returned for `term`; shorter series are left-padded with zeros.
    pub fn with_series(mut self, term: &str, series: Vec<f64>) -> Self {
        self.fixed.insert(term.to_string(), series);
        self
    }

    fn series(&self, term: &str) -> Vec<f64> {
        if let Some(fixed) = self.fixed.get(term) {
            let tail = &fixed[fixed.len().saturating_sub(WEEKS)..];
            let mut padded = vec![0.0; WEEKS - tail.len()];
            padded.extend_from_slice(tail);
            return padded;
        }

        for (suffix, share) in [(" manga", 0.4), (" figure", 0.15), (" merch", 0.1)] {
            if let Some(base) = term.strip_suffix(suffix) {
                return self.series(base).iter().map(|v| (v * share).round()).collect();
            }
        }

        let seed = fnv1a(term);
        let level = if self.anchors.iter().any(|a| a == term) {
            60.0 + (seed % 30) as f64
        } else {
            (seed % 40) as f64
        };
        (0..WEEKS)
            .map(|week| {
                let wave = (week as f64 / 8.0 + (seed % 7) as f64).sin() * level * 0.15;
                (level + wave).clamp(0.0, 100.0).round()
            })
            .collect()
    }
}

#[async_trait]
impl DemandSource for SimDemandSource {
    async fn interest_over_time(&self, terms: &[String]) -> Result<InterestTable, SourceError> {
        let columns: Vec<Vec<f64>> = terms.iter().map(|t| self.series(t)).collect();
        let start = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();

        let rows = (0..WEEKS)
            .map(|week| InterestPoint {
                time: start + Duration::weeks(week as i64),
                values: columns.iter().map(|c| c[week]).collect(),
            })
            .collect();
        InterestTable::new(terms.to_vec(), rows)
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf29ce484222325, |h, b| {
        (h ^ b as u64).wrapping_mul(0x100000001b3)
    })
}
