use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    error::{ReelsmithError, Result, truncate_body},
    retry::{RetryConfig, retry_async},
    types::Candidate,
};

const SERVICE: &str = "youtube-data";
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Raw catalog endpoints. Both calls are idempotent reads.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn search_list(&self, params: &[(&str, String)]) -> Result<Value>;
    async fn videos_list(&self, ids: &[String]) -> Result<Value>;
}

/// YouTube Data API v3 with capped exponential backoff on throttling and
/// server errors.
#[derive(Debug, Clone)]
pub struct YoutubeDataApi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryConfig,
}

impl YoutubeDataApi {
    pub fn new(api_key: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::new(SERVICE).with_max_retries(max_retries),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn get_once(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .query(&[("key", &self.api_key)])
            .send()
            .await
            .map_err(ReelsmithError::transport(SERVICE))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReelsmithError::UpstreamStatus {
                service: SERVICE,
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        response
            .json()
            .await
            .map_err(ReelsmithError::transport(SERVICE))
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        retry_async(&self.retry, || self.get_once(path, params)).await
    }
}

#[async_trait]
impl CatalogApi for YoutubeDataApi {
    async fn search_list(&self, params: &[(&str, String)]) -> Result<Value> {
        self.get("/search", params).await
    }

    async fn videos_list(&self, ids: &[String]) -> Result<Value> {
        let params = [
            ("part", "snippet,contentDetails,statistics".to_string()),
            ("id", ids.join(",")),
        ];
        self.get("/videos", &params).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendingQuery {
    pub topic: String,
    pub limit: usize,
    pub region: String,
    /// RFC3339 timestamp, normalized to UTC before the call.
    pub published_after: String,
    pub shorts_only: bool,
}

/// Accepts RFC3339 with `Z` or a numeric offset and renders it in UTC with a
/// `Z` suffix, the only form the search endpoint accepts reliably.
pub fn normalize_published_after(raw: &str) -> Result<String> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| {
        ReelsmithError::Config(format!("published_after {raw:?} is not RFC3339: {e}"))
    })?;
    Ok(parsed
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    #[serde(default)]
    snippet: Snippet,
    #[serde(default)]
    statistics: Statistics,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    #[serde(default)]
    view_count: Option<Value>,
    #[serde(default)]
    like_count: Option<Value>,
}

/// Counters arrive as decimal strings; hidden counters are absent.
fn count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

/// Ranked candidates for a topic: at most `limit`, unique by video id, in the
/// order the search endpoint ranked them.
#[instrument(skip_all, fields(topic = %query.topic, limit = query.limit))]
pub async fn search_trending(api: &dyn CatalogApi, query: &TrendingQuery) -> Result<Vec<Candidate>> {
    if query.limit == 0 {
        return Ok(Vec::new());
    }
    let published_after = normalize_published_after(&query.published_after)?;

    let mut params = vec![
        ("part", "snippet".to_string()),
        ("type", "video".to_string()),
        ("order", "viewCount".to_string()),
        ("q", query.topic.clone()),
        ("publishedAfter", published_after),
        ("regionCode", query.region.clone()),
        ("maxResults", query.limit.clamp(5, 50).to_string()),
    ];
    if query.shorts_only {
        params.push(("videoDuration", "short".to_string()));
    }

    let search = api.search_list(&params).await?;
    let mut seen = HashSet::new();
    let ids: Vec<String> = search["items"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item["id"]["videoId"].as_str())
        .filter(|id| seen.insert(id.to_string()))
        .take(query.limit)
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        info!("search returned no videos");
        return Ok(Vec::new());
    }

    let videos = api.videos_list(&ids).await?;
    let items: Vec<VideoItem> = match videos.get("items") {
        Some(items) => serde_json::from_value(items.clone()).map_err(|e| {
            ReelsmithError::Normalization {
                capability: SERVICE,
                reason: format!("unreadable videos.list items: {e}"),
            }
        })?,
        None => Vec::new(),
    };

    let candidates: Vec<Candidate> = ids
        .iter()
        .filter_map(|id| items.iter().find(|item| &item.id == id))
        .filter_map(|item| {
            let published_at = item.snippet.published_at?;
            Some(Candidate {
                video_id: item.id.clone(),
                title: item.snippet.title.clone(),
                channel_title: item.snippet.channel_title.clone(),
                published_at,
                view_count: count(item.statistics.view_count.as_ref()),
                like_count: count(item.statistics.like_count.as_ref()),
                is_shorts: query.shorts_only,
            })
        })
        .collect();

    info!(found = candidates.len(), "trending candidates ready");
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    struct FakeCatalog {
        search: Value,
        videos: Value,
        search_params: Mutex<Vec<(String, String)>>,
        requested_ids: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        fn new(search: Value, videos: Value) -> Self {
            Self {
                search,
                videos,
                search_params: Mutex::new(Vec::new()),
                requested_ids: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CatalogApi for FakeCatalog {
        async fn search_list(&self, params: &[(&str, String)]) -> Result<Value> {
            *self.search_params.lock().unwrap() = params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            Ok(self.search.clone())
        }

        async fn videos_list(&self, ids: &[String]) -> Result<Value> {
            *self.requested_ids.lock().unwrap() = ids.to_vec();
            Ok(self.videos.clone())
        }
    }

    fn video(id: &str, views: &str) -> Value {
        json!({
            "id": id,
            "snippet": {"title": format!("title {id}"), "channelTitle": "chan", "publishedAt": "2025-01-02T03:04:05Z"},
            "statistics": {"viewCount": views, "likeCount": "7"}
        })
    }

    fn query(limit: usize) -> TrendingQuery {
        TrendingQuery {
            topic: "coffee".into(),
            limit,
            region: "RU".into(),
            published_after: "2025-01-01T03:00:00+03:00".into(),
            shorts_only: true,
        }
    }

    #[test]
    fn published_after_is_normalized_to_utc() {
        assert_eq!(
            normalize_published_after("2025-01-01T03:00:00+03:00").unwrap(),
            "2025-01-01T00:00:00Z"
        );
        assert_eq!(
            normalize_published_after("2025-01-01T00:00:00Z").unwrap(),
            "2025-01-01T00:00:00Z"
        );
        assert!(matches!(
            normalize_published_after("yesterday"),
            Err(ReelsmithError::Config(_))
        ));
    }

    #[tokio::test]
    async fn unique_ranked_and_limited() {
        let api = FakeCatalog::new(
            json!({"items": [
                {"id": {"videoId": "b"}},
                {"id": {"videoId": "a"}},
                {"id": {"videoId": "b"}},
                {"id": {"kind": "youtube#channel"}},
                {"id": {"videoId": "c"}}
            ]}),
            // Detail lookup answers out of order.
            json!({"items": [video("a", "10"), video("b", "2000")]}),
        );

        let found = search_trending(&api, &query(2)).await.unwrap();

        let ids: Vec<&str> = found.iter().map(|c| c.video_id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(found[0].view_count, 2000);
        assert_eq!(found[0].like_count, 7);
        assert!(found[0].is_shorts);
        assert_eq!(*api.requested_ids.lock().unwrap(), ["b", "a"]);
    }

    #[tokio::test]
    async fn search_parameters() {
        let api = FakeCatalog::new(json!({"items": []}), json!({}));
        let found = search_trending(&api, &query(3)).await.unwrap();
        assert!(found.is_empty());

        let params = api.search_params.lock().unwrap().clone();
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("order").as_deref(), Some("viewCount"));
        assert_eq!(get("maxResults").as_deref(), Some("5"));
        assert_eq!(get("videoDuration").as_deref(), Some("short"));
        assert_eq!(get("publishedAfter").as_deref(), Some("2025-01-01T00:00:00Z"));
        assert!(api.requested_ids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_counters_default_to_zero() {
        let api = FakeCatalog::new(
            json!({"items": [{"id": {"videoId": "a"}}]}),
            json!({"items": [{"id": "a", "snippet": {"title": "t", "publishedAt": "2025-01-02T03:04:05Z"}}]}),
        );
        let found = search_trending(&api, &query(1)).await.unwrap();
        assert_eq!(found[0].view_count, 0);
        assert_eq!(found[0].channel_title, "");
    }
}
