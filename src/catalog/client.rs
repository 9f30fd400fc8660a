use crate::core::types::Candidate;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaSort {
    TrendingDesc,
    PopularityDesc,
}

impl MediaSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSort::TrendingDesc => "TRENDING_DESC",
            MediaSort::PopularityDesc => "POPULARITY_DESC",
        }
    }
}

#[async_trait]
pub trait CatalogClient: Send + Sync + 'static {
    async fn fetch_list(&self, sort: MediaSort, limit: u32) -> Result<Vec<Candidate>>;

    /// Half trending, half popular, deduplicated by id. A failed list contributes nothing.
    async fn get_candidates(&self, target_count: u32) -> Vec<Candidate> {
        let batch = target_count / 2;

        let mut lists = Vec::with_capacity(2);
        for sort in [MediaSort::TrendingDesc, MediaSort::PopularityDesc] {
            match self.fetch_list(sort, batch).await {
                Ok(list) => lists.push(list),
                Err(e) => {
                    error!("Catalog fetch {} failed: {:#}", sort.as_str(), e);
                    lists.push(Vec::new());
                }
            }
        }

        let sizes: Vec<usize> = lists.iter().map(Vec::len).collect();
        let merged = merge_unique(lists);
        info!(
            "Merged candidates: {} unique items (from {} trending, {} popular)",
            merged.len(),
            sizes[0],
            sizes[1]
        );
        merged
    }
}

/// Concatenates lists keeping the first occurrence of each id.
pub fn merge_unique(lists: impl IntoIterator<Item = Vec<Candidate>>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|c| seen.insert(c.id))
        .collect()
}
