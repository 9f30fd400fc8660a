use crate::config::config::TrendsCfg;
use crate::trends::source::{
    DemandSource, InterestPoint, InterestTable, MAX_TERMS_PER_QUERY, SourceError,
};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    #[serde(default)]
    widgets: Vec<Widget>,
}

#[derive(Debug, Deserialize)]
struct Widget {
    id: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    request: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MultilineResponse {
    default: TimelineBody,
}

#[derive(Debug, Deserialize)]
struct TimelineBody {
    #[serde(rename = "timelineData", default)]
    timeline_data: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    time: String,
    #[serde(default)]
    value: Vec<f64>,
}

/// Interest-over-time client for the (unofficial) Google Trends web API.
///
/// Two calls per batch: `explore` hands out a signed widget request for the
/// comparison, `widgetdata/multiline` returns the time series for it.
pub struct GoogleTrendsSource {
    client: Client,
    cfg: TrendsCfg,
    warmed: OnceCell<()>,
}

impl GoogleTrendsSource {
    pub fn new(cfg: TrendsCfg, client: Client) -> Self {
        Self {
            client,
            cfg,
            warmed: OnceCell::new(),
        }
    }

    /// Trends rejects cookieless API calls; one landing-page hit sets the session cookie.
    async fn warm_up(&self) {
        self.warmed
            .get_or_init(|| async {
                let geo = if self.cfg.geo.is_empty() { "US" } else { self.cfg.geo.as_str() };
                let url = format!("{}/?geo={}", self.cfg.base_url, geo);
                match self.client.get(&url).send().await {
                    Ok(resp) => debug!("Trends session warm-up: {}", resp.status()),
                    Err(e) => debug!("Trends session warm-up failed: {}", e),
                }
            })
            .await;
    }

    fn explore_request(&self, terms: &[String]) -> serde_json::Value {
        let items: Vec<_> = terms
            .iter()
            .map(|t| json!({ "keyword": t, "time": self.cfg.timeframe, "geo": self.cfg.geo }))
            .collect();
        json!({ "comparisonItem": items, "category": 0, "property": "" })
    }

    async fn get_guarded(&self, url: &str, query: &[(&str, String)]) -> Result<String, SourceError> {
        let resp = self.client.get(url).query(query).send().await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited(format!("{} returned 429", url)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Transport(format!(
                "status={}, url={}, body={}",
                status,
                url,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(resp.text().await?)
    }

    async fn timeseries_widget(&self, terms: &[String]) -> Result<Widget, SourceError> {
        let url = format!("{}/api/explore", self.cfg.base_url);
        let query = [
            ("hl", self.cfg.hl.clone()),
            ("tz", self.cfg.tz.to_string()),
            ("req", self.explore_request(terms).to_string()),
        ];
        let body = self.get_guarded(&url, &query).await?;
        let explore: ExploreResponse = serde_json::from_str(strip_guard(&body))
            .map_err(|e| SourceError::Shape(format!("explore: {}", e)))?;

        explore
            .widgets
            .into_iter()
            .find(|w| w.id == "TIMESERIES")
            .ok_or_else(|| SourceError::Shape("explore: no TIMESERIES widget".to_string()))
    }
}

#[async_trait]
impl DemandSource for GoogleTrendsSource {
    async fn interest_over_time(&self, terms: &[String]) -> Result<InterestTable, SourceError> {
        if terms.len() > MAX_TERMS_PER_QUERY {
            return Err(SourceError::Shape(format!(
                "{} terms exceeds the limit of {}",
                terms.len(),
                MAX_TERMS_PER_QUERY
            )));
        }
        self.warm_up().await;

        let widget = self.timeseries_widget(terms).await?;

        let url = format!("{}/api/widgetdata/multiline", self.cfg.base_url);
        let query = [
            ("hl", self.cfg.hl.clone()),
            ("tz", self.cfg.tz.to_string()),
            ("req", widget.request.to_string()),
            ("token", widget.token),
        ];
        let body = self.get_guarded(&url, &query).await?;
        let multiline: MultilineResponse = serde_json::from_str(strip_guard(&body))
            .map_err(|e| SourceError::Shape(format!("multiline: {}", e)))?;

        let points = multiline.default.timeline_data;
        if points.is_empty() {
            info!("Trends returned no data for {:?}", terms);
            return Ok(InterestTable::empty(terms.to_vec()));
        }

        let rows = points
            .into_iter()
            .map(|p| -> Result<InterestPoint, SourceError> {
                let secs: i64 = p
                    .time
                    .parse()
                    .map_err(|_| SourceError::Shape(format!("bad timestamp '{}'", p.time)))?;
                let time = DateTime::from_timestamp(secs, 0)
                    .ok_or_else(|| SourceError::Shape(format!("timestamp out of range: {}", secs)))?;
                Ok(InterestPoint {
                    time,
                    values: p.value,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("Trends returned {} points for {:?}", rows.len(), terms);
        InterestTable::new(terms.to_vec(), rows)
    }
}

/// Trends prefixes JSON bodies with `)]}'` to defeat script inclusion.
fn strip_guard(body: &str) -> &str {
    body.find('{').map(|i| &body[i..]).unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn terms() -> Vec<String> {
        ["Dandadan", "Naruto", "Dandadan manga", "Dandadan figure", "Dandadan merch"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn source(server: &MockServer) -> GoogleTrendsSource {
        let cfg = TrendsCfg {
            base_url: format!("{}/trends", server.uri()),
            ..TrendsCfg::default()
        };
        GoogleTrendsSource::new(cfg, Client::new())
    }

    async fn mount_explore(server: &MockServer) {
        let body = format!(
            ")]}}'\n{}",
            json!({
                "widgets": [
                    { "id": "GEO_MAP", "token": "geo-token", "request": {} },
                    { "id": "TIMESERIES", "token": "ts-token", "request": { "time": "today 12-m" } }
                ]
            })
        );
        Mock::given(method("GET"))
            .and(path("/trends/api/explore"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_parses_timeline() {
        let server = MockServer::start().await;
        mount_explore(&server).await;

        let body = format!(
            ")]}}',\n{}",
            json!({
                "default": {
                    "timelineData": [
                        { "time": "1700000000", "formattedTime": "Nov 2023", "value": [10, 80, 3, 1, 0], "hasData": [true, true, true, true, false] },
                        { "time": "1700604800", "formattedTime": "Nov 2023", "value": [12, 78, 4, 2, 1], "hasData": [true, true, true, true, true] }
                    ]
                }
            })
        );
        Mock::given(method("GET"))
            .and(path("/trends/api/widgetdata/multiline"))
            .and(query_param("token", "ts-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let table = source(&server)
            .interest_over_time(&terms())
            .await
            .expect("table");

        assert_eq!(table.len(), 2);
        assert_eq!(table.column("Naruto").unwrap(), vec![80.0, 78.0]);
        assert_eq!(table.column("Dandadan merch").unwrap(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_empty_timeline_is_empty_table() {
        let server = MockServer::start().await;
        mount_explore(&server).await;
        Mock::given(method("GET"))
            .and(path("/trends/api/widgetdata/multiline"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(")]}',\n{\"default\":{\"timelineData\":[]}}"),
            )
            .mount(&server)
            .await;

        let table = source(&server).interest_over_time(&terms()).await.unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trends/api/explore"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = source(&server)
            .interest_over_time(&terms())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trends/api/explore"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let err = source(&server)
            .interest_over_time(&terms())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }

    #[tokio::test]
    async fn test_missing_timeseries_widget_is_shape_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trends/api/explore"))
            .respond_with(ResponseTemplate::new(200).set_body_string(")]}'\n{\"widgets\":[]}"))
            .mount(&server)
            .await;

        let err = source(&server)
            .interest_over_time(&terms())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Shape(_)));
    }

    #[test]
    fn test_strip_guard() {
        assert_eq!(strip_guard(")]}'\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_guard("{}"), "{}");
    }
}
