use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Google Trends accepts at most five keywords per comparison.
pub const MAX_TERMS_PER_QUERY: usize = 5;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Upstream throttled us; retrying with other terms will not help.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response shape: {0}")]
    Shape(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            SourceError::RateLimited(e.to_string())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

#[async_trait]
pub trait DemandSource: Send + Sync + 'static {
    /// Interest over the configured trailing window, one column per term.
    /// An empty table means the source had no data for the batch.
    async fn interest_over_time(&self, terms: &[String]) -> Result<InterestTable, SourceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterestPoint {
    pub time: DateTime<Utc>,
    pub values: Vec<f64>,
}

/// Time-indexed interest values; `rows[i].values[j]` belongs to `terms[j]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterestTable {
    terms: Vec<String>,
    rows: Vec<InterestPoint>,
}

impl InterestTable {
    pub fn new(terms: Vec<String>, rows: Vec<InterestPoint>) -> Result<Self, SourceError> {
        if let Some(bad) = rows.iter().find(|r| r.values.len() != terms.len()) {
            return Err(SourceError::Shape(format!(
                "row at {} has {} values for {} terms",
                bad.time,
                bad.values.len(),
                terms.len()
            )));
        }
        Ok(Self { terms, rows })
    }

    pub fn empty(terms: Vec<String>) -> Self {
        Self {
            terms,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, term: &str) -> Option<Vec<f64>> {
        let idx = self.terms.iter().position(|t| t == term)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Mean of the last `window` observations of `term`.
    pub fn trailing_mean(&self, term: &str, window: usize) -> Option<f64> {
        let series = self.column(term)?;
        let start = series.len().saturating_sub(window);
        let tail = &series[start..];
        if tail.is_empty() {
            return None;
        }
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }
}
