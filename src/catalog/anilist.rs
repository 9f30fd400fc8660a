use crate::catalog::client::{CatalogClient, MediaSort};
use crate::config::config::AniListCfg;
use crate::core::types::{Candidate, MediaStatus, MediaType, RelatedWork, Titles};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

/// AniList caps `perPage` at 50.
const MAX_PER_PAGE: u32 = 50;

const MEDIA_QUERY: &str = r#"
query ($page: Int, $perPage: Int, $sort: [MediaSort]) {
  Page (page: $page, perPage: $perPage) {
    pageInfo { hasNextPage }
    media (type: MANGA, sort: $sort, countryOfOrigin: "JP", isAdult: false) {
      id
      title { romaji english native }
      status
      popularity
      trending
      relations {
        edges {
          relationType
          node { type status }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<PageData>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: Option<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(rename = "pageInfo")]
    page_info: Option<PageInfo>,
    #[serde(default)]
    media: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage", default)]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct Media {
    id: u64,
    #[serde(default)]
    title: Titles,
    status: Option<MediaStatus>,
    popularity: Option<u64>,
    trending: Option<u64>,
    relations: Option<Relations>,
}

#[derive(Debug, Deserialize)]
struct Relations {
    #[serde(default)]
    edges: Vec<RelationEdge>,
}

#[derive(Debug, Deserialize)]
struct RelationEdge {
    #[serde(rename = "relationType")]
    relation_type: Option<String>,
    node: Option<RelationNode>,
}

#[derive(Debug, Deserialize)]
struct RelationNode {
    #[serde(rename = "type")]
    media_type: Option<MediaType>,
    status: Option<MediaStatus>,
}

impl From<Media> for Candidate {
    fn from(m: Media) -> Self {
        let relations = m
            .relations
            .map(|r| r.edges)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|edge| {
                let node = edge.node?;
                Some(RelatedWork {
                    relation_type: edge.relation_type.unwrap_or_default(),
                    media_type: node.media_type.unwrap_or_default(),
                    status: node.status,
                })
            })
            .collect();

        Candidate {
            id: m.id,
            titles: m.title,
            popularity: m.popularity.unwrap_or(0),
            trending: m.trending.unwrap_or(0),
            publication: m.status.unwrap_or_default(),
            relations,
        }
    }
}

pub struct AniListClient {
    client: Client,
    cfg: AniListCfg,
}

impl AniListClient {
    pub fn new(cfg: AniListCfg, client: Client) -> Self {
        Self { client, cfg }
    }

    async fn fetch_page(&self, sort: MediaSort, page: u32, per_page: u32) -> Result<Page> {
        let body = json!({
            "query": MEDIA_QUERY,
            "variables": { "page": page, "perPage": per_page, "sort": sort.as_str() }
        });

        let resp = self
            .client
            .post(&self.cfg.api_url)
            .json(&body)
            .send()
            .await
            .context("requesting anilist page")?;

        let remaining = resp
            .headers()
            .get("X-RateLimit-Remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());
        if let Some(remaining) = remaining {
            if remaining < self.cfg.low_quota_threshold {
                warn!(
                    "AniList rate limit low ({}). Sleeping {:?}...",
                    remaining, self.cfg.low_quota_pause
                );
                tokio::time::sleep(self.cfg.low_quota_pause).await;
            }
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("AniList API error: status={}, body={}", status, text);
        }

        let parsed: GraphQlResponse = resp.json().await.context("parsing anilist response")?;
        if let Some(errors) = parsed.errors {
            error!("GraphQL errors: {}", errors);
            anyhow::bail!("AniList returned GraphQL errors");
        }

        parsed
            .data
            .and_then(|d| d.page)
            .context("AniList response missing Page")
    }
}

#[async_trait]
impl CatalogClient for AniListClient {
    async fn fetch_list(&self, sort: MediaSort, limit: u32) -> Result<Vec<Candidate>> {
        info!("Fetching {} items sorted by {}...", limit, sort.as_str());

        let mut rows: Vec<Candidate> = Vec::new();
        let mut page = 1;
        while (rows.len() as u32) < limit {
            let per_page = (limit - rows.len() as u32).min(MAX_PER_PAGE);
            let fetched = match self.fetch_page(sort, page, per_page).await {
                Ok(fetched) => fetched,
                Err(e) if rows.is_empty() => return Err(e),
                Err(e) => {
                    warn!(
                        "Page {} of {} list failed, keeping {} items: {:#}",
                        page,
                        sort.as_str(),
                        rows.len(),
                        e
                    );
                    break;
                }
            };

            let has_next = fetched.page_info.is_some_and(|p| p.has_next_page);
            let count = fetched.media.len();
            rows.extend(fetched.media.into_iter().map(Candidate::from));

            if !has_next || count == 0 {
                break;
            }
            page += 1;
        }
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AdaptationStatus;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg(server: &MockServer) -> AniListCfg {
        AniListCfg {
            api_url: server.uri(),
            target_count: 4,
            low_quota_threshold: 10,
            low_quota_pause: Duration::from_millis(1),
        }
    }

    fn media(id: u64, english: Option<&str>, anime_status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": { "romaji": format!("Romaji {id}"), "english": english, "native": "ネイティブ" },
            "status": "RELEASING",
            "popularity": 12000 + id,
            "trending": 40,
            "relations": { "edges": [
                { "relationType": "ADAPTATION", "node": { "type": "ANIME", "status": anime_status } },
                { "relationType": "SIDE_STORY", "node": { "type": "MANGA", "status": "FINISHED" } }
            ]}
        })
    }

    fn page(items: Vec<serde_json::Value>, has_next: bool) -> serde_json::Value {
        json!({ "data": { "Page": { "pageInfo": { "hasNextPage": has_next }, "media": items } } })
    }

    #[tokio::test]
    async fn test_get_candidates_merges_and_dedups() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_string_contains("TRENDING_DESC"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-RateLimit-Remaining", "5")
                    .set_body_json(page(
                        vec![
                            media(1, Some("First"), "NOT_YET_RELEASED"),
                            media(2, None, "RELEASING"),
                        ],
                        false,
                    )),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("POPULARITY_DESC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![media(2, None, "RELEASING"), media(3, Some("Third"), "FINISHED")],
                false,
            )))
            .mount(&server)
            .await;

        let client = AniListClient::new(cfg(&server), Client::new());
        let candidates = client.get_candidates(4).await;

        let ids: Vec<u64> = candidates.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let first = &candidates[0];
        assert_eq!(first.titles.search_term(), "First");
        assert_eq!(first.popularity, 12001);
        assert_eq!(first.publication, MediaStatus::Releasing);
        assert_eq!(first.adaptation_status(), AdaptationStatus::Announced);
        assert_eq!(candidates[1].titles.search_term(), "Romaji 2");
        assert_eq!(candidates[1].adaptation_status(), AdaptationStatus::Airing);
        assert_eq!(candidates[2].adaptation_status(), AdaptationStatus::Finished);
    }

    #[tokio::test]
    async fn test_graphql_errors_fail_the_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{ "message": "Invalid token", "status": 400 }]
            })))
            .mount(&server)
            .await;

        let client = AniListClient::new(cfg(&server), Client::new());
        assert!(client.fetch_list(MediaSort::TrendingDesc, 10).await.is_err());
        assert!(client.get_candidates(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = AniListClient::new(cfg(&server), Client::new());
        let err = client
            .fetch_list(MediaSort::PopularityDesc, 5)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("AniList API error"));
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_earlier_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"page\":1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![media(1, Some("First"), "RELEASING"), media(2, None, "FINISHED")],
                true,
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"page\":2"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let client = AniListClient::new(cfg(&server), Client::new());
        let rows = client.fetch_list(MediaSort::TrendingDesc, 4).await.unwrap();
        let ids: Vec<u64> = rows.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
