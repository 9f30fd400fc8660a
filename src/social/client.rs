use crate::core::types::MentionSignal;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait MentionSource: Send + Sync + 'static {
    async fn search_mentions(&self, term: &str) -> Result<MentionSignal>;
}
