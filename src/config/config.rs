use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub anilist: AniListCfg,
    #[serde(default)]
    pub trends: TrendsCfg,
    #[serde(default)]
    pub reddit: RedditCfg,
    #[serde(default)]
    pub pipeline: PipelineCfg,
    #[serde(default)]
    pub report: ReportCfg,
    #[serde(default)]
    pub logging: LoggingCfg,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpCfg {
    #[serde(default = "default_ua")]
    pub user_agent: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_pool_idle")]
    pub pool_idle_timeout: Duration,
    #[serde(default = "default_pool")]
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            user_agent: default_ua(),
            timeout: default_timeout(),
            pool_idle_timeout: default_pool_idle(),
            pool_max_idle_per_host: default_pool(),
        }
    }
}
fn default_ua() -> String {
    "ip-scout/0.1".into()
}
fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_pool_idle() -> Duration {
    Duration::from_secs(90)
}
fn default_pool() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct AniListCfg {
    #[serde(default = "default_anilist_url")]
    pub api_url: String,
    /// Total candidates requested, split evenly between the trending and popular lists.
    #[serde(default = "default_target_count")]
    pub target_count: u32,
    #[serde(default = "default_low_quota")]
    pub low_quota_threshold: u32,
    #[serde(with = "humantime_serde", default = "default_low_quota_pause")]
    pub low_quota_pause: Duration,
}

impl Default for AniListCfg {
    fn default() -> Self {
        Self {
            api_url: default_anilist_url(),
            target_count: default_target_count(),
            low_quota_threshold: default_low_quota(),
            low_quota_pause: default_low_quota_pause(),
        }
    }
}
fn default_anilist_url() -> String {
    "https://graphql.anilist.co".to_string()
}
fn default_target_count() -> u32 {
    200
}
fn default_low_quota() -> u32 {
    10
}
fn default_low_quota_pause() -> Duration {
    Duration::from_secs(2)
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DemandSourceKind {
    #[default]
    Google,
    Sim,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrendsCfg {
    #[serde(default)]
    pub source: DemandSourceKind,
    #[serde(default = "default_trends_url")]
    pub base_url: String,
    #[serde(default = "default_hl")]
    pub hl: String,
    #[serde(default = "default_tz")]
    pub tz: i32,
    #[serde(default)]
    pub geo: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_anchors")]
    pub anchors: Vec<String>,
    /// Trailing observations averaged per series.
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_anchor_health")]
    pub anchor_health_threshold: f64,
    #[serde(with = "humantime_serde", default = "default_delay_min")]
    pub delay_min: Duration,
    #[serde(with = "humantime_serde", default = "default_delay_max")]
    pub delay_max: Duration,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub cache_ttl: Duration,
}

impl Default for TrendsCfg {
    fn default() -> Self {
        Self {
            source: DemandSourceKind::default(),
            base_url: default_trends_url(),
            hl: default_hl(),
            tz: default_tz(),
            geo: String::new(),
            timeframe: default_timeframe(),
            anchors: default_anchors(),
            window: default_window(),
            anchor_health_threshold: default_anchor_health(),
            delay_min: default_delay_min(),
            delay_max: default_delay_max(),
            cache_path: default_cache_path(),
            cache_ttl: default_cache_ttl(),
        }
    }
}
fn default_trends_url() -> String {
    "https://trends.google.com/trends".to_string()
}
fn default_hl() -> String {
    "en-US".to_string()
}
fn default_tz() -> i32 {
    360
}
fn default_timeframe() -> String {
    "today 12-m".to_string()
}
fn default_anchors() -> Vec<String> {
    [
        "One Piece",
        "Jujutsu Kaisen",
        "Naruto",
        "Attack on Titan",
        "Demon Slayer",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_window() -> usize {
    4
}
fn default_anchor_health() -> f64 {
    0.1
}
fn default_delay_min() -> Duration {
    Duration::from_secs(3)
}
fn default_delay_max() -> Duration {
    Duration::from_secs(6)
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("trends_cache.json")
}
fn default_cache_ttl() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedditCfg {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_reddit_ua")]
    pub user_agent: String,
    #[serde(default = "default_reddit_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_reddit_api_url")]
    pub api_url: String,
    #[serde(default = "default_subreddits")]
    pub subreddits: Vec<String>,
    #[serde(default = "default_reddit_limit")]
    pub limit: u32,
}

impl Default for RedditCfg {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            user_agent: default_reddit_ua(),
            auth_url: default_reddit_auth_url(),
            api_url: default_reddit_api_url(),
            subreddits: default_subreddits(),
            limit: default_reddit_limit(),
        }
    }
}

impl RedditCfg {
    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

fn default_reddit_ua() -> String {
    "rust:ip-scout:v0.1".to_string()
}
fn default_reddit_auth_url() -> String {
    "https://www.reddit.com/api/v1/access_token".to_string()
}
fn default_reddit_api_url() -> String {
    "https://oauth.reddit.com".to_string()
}
fn default_subreddits() -> Vec<String> {
    ["manga", "anime", "AnimeFigures", "MangaCollectors"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_reddit_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineCfg {
    /// Only this many top catalog candidates get a live demand lookup.
    #[serde(default = "default_trends_limit")]
    pub trends_limit: usize,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            trends_limit: default_trends_limit(),
        }
    }
}
fn default_trends_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportCfg {
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
    #[serde(default = "default_buy_list_path")]
    pub buy_list_path: PathBuf,
}

impl Default for ReportCfg {
    fn default() -> Self {
        Self {
            report_path: default_report_path(),
            buy_list_path: default_buy_list_path(),
        }
    }
}
fn default_report_path() -> PathBuf {
    PathBuf::from("report.csv")
}
fn default_buy_list_path() -> PathBuf {
    PathBuf::from("buy_list.csv")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingCfg {
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingCfg {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            filter: default_log_filter(),
        }
    }
}
fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("ip_research.log"))
}
fn default_log_filter() -> String {
    "info".to_string()
}

impl AppCfg {
    /// `required` is set when the path was given explicitly; a missing default file falls back to defaults.
    pub fn load(path: &str, required: bool) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::with_name(path).required(required))
            .add_source(config::Environment::default().separator("__"))
            .build()
            .with_context(|| format!("building config from {}", path))?;

        let mut app: AppCfg = cfg.try_deserialize().context("deserializing config")?;
        app.apply_env_fallbacks();
        app.validate()?;
        Ok(app)
    }

    /// Picks up the flat `REDDIT_CLIENT_ID` / `REDDIT_CLIENT_SECRET` names used in `.env` files.
    fn apply_env_fallbacks(&mut self) {
        if self.reddit.client_id.is_empty() {
            if let Ok(id) = std::env::var("REDDIT_CLIENT_ID") {
                self.reddit.client_id = id;
            }
        }
        if self.reddit.client_secret.is_empty() {
            if let Ok(secret) = std::env::var("REDDIT_CLIENT_SECRET") {
                self.reddit.client_secret = secret;
            }
        }
        if let Ok(ua) = std::env::var("REDDIT_USER_AGENT") {
            self.reddit.user_agent = ua;
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.anilist.api_url.is_empty(), "anilist.api_url missing");
        anyhow::ensure!(
            self.anilist.target_count > 0,
            "anilist.target_count must be > 0"
        );
        anyhow::ensure!(!self.trends.anchors.is_empty(), "trends.anchors must not be empty");
        anyhow::ensure!(self.trends.window > 0, "trends.window must be > 0");
        anyhow::ensure!(
            self.trends.anchor_health_threshold > 0.0,
            "trends.anchor_health_threshold must be > 0"
        );
        anyhow::ensure!(
            self.trends.delay_min <= self.trends.delay_max,
            "trends.delay_min must not exceed trends.delay_max"
        );
        if self.trends.source == DemandSourceKind::Google {
            anyhow::ensure!(!self.trends.base_url.is_empty(), "trends.base_url missing");
        }

        Ok(())
    }

    /// Reddit variables that are still unset after env fallbacks.
    pub fn missing_reddit_vars(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.reddit.client_id.is_empty() {
            missing.push("REDDIT_CLIENT_ID");
        }
        if self.reddit.client_secret.is_empty() {
            missing.push("REDDIT_CLIENT_SECRET");
        }
        missing
    }
}
