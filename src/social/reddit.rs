use crate::config::config::RedditCfg;
use crate::core::types::MentionSignal;
use crate::social::client::MentionSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Words that mark a post as purchase-minded.
const INTENT_CLAUSE: &str = "(buy OR merch OR figure OR goods OR box OR price)";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    score: i64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// App-only (client credentials) Reddit search over the collector subreddits.
pub struct RedditClient {
    client: Client,
    cfg: RedditCfg,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    pub fn new(cfg: RedditCfg, client: Client) -> Self {
        Self {
            client,
            cfg,
            token: Mutex::new(None),
        }
    }

    /// Returns a client only when both credentials are configured.
    pub fn from_cfg(cfg: &RedditCfg, client: Client) -> Option<Self> {
        if !cfg.has_credentials() {
            debug!("Reddit credentials missing. Reddit client disabled.");
            return None;
        }
        Some(Self::new(cfg.clone(), client))
    }

    pub fn query_for(term: &str) -> String {
        format!("\"{}\" {}", term, INTENT_CLAUSE)
    }

    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let resp = self
            .client
            .post(&self.cfg.auth_url)
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .header(reqwest::header::USER_AGENT, &self.cfg.user_agent)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("requesting reddit token")?;

        if !resp.status().is_success() {
            anyhow::bail!("Reddit auth error: {}", resp.status());
        }

        let token: TokenResponse = resp.json().await.context("parsing reddit token")?;
        debug!("Reddit token acquired, expires in {}s", token.expires_in);

        // Refresh a minute early.
        let ttl = Duration::from_secs(token.expires_in.saturating_sub(60));
        *guard = Some(AccessToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl MentionSource for RedditClient {
    async fn search_mentions(&self, term: &str) -> Result<MentionSignal> {
        let token = self.access_token().await?;
        let query = Self::query_for(term);
        let limit = self.cfg.limit.to_string();
        let url = format!(
            "{}/r/{}/search",
            self.cfg.api_url,
            self.cfg.subreddits.join("+")
        );

        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, &self.cfg.user_agent)
            .query(&[
                ("q", query.as_str()),
                ("restrict_sr", "1"),
                ("sort", "new"),
                ("t", "month"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("searching reddit for {}", term))?;

        if !resp.status().is_success() {
            anyhow::bail!("Reddit search error: {}", resp.status());
        }

        let listing: Listing = resp.json().await.context("parsing reddit listing")?;
        let post_count = listing.data.children.len() as u32;
        let score_sum: i64 = listing.data.children.iter().map(|c| c.data.score).sum();

        Ok(MentionSignal {
            post_count,
            score_sum,
            intent_score: post_count as i64 * 10 + score_sum,
            query,
        })
    }
}
