//! 外部ニュースソース

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::models::{truncate_chars, NewsItem};
use crate::config::NewsConfig;
use crate::error::{GeoError, Result};

const SUMMARY_MAX_CHARS: usize = 200;

/// ニュースソースの共通インターフェース
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// レスポンスのグループ名
    fn name(&self) -> &'static str;

    /// 最新のニュースを取得
    async fn fetch(&self, client: &Client) -> Result<Vec<NewsItem>>;
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// 配列の要素を1件ずつデコードし、壊れた要素だけを捨てる
fn lenient_items<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();

    Ok(values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!("Skipping malformed news item: {}", e);
                None
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// NewsAPI

pub struct NewsApiSource {
    base_url: String,
    api_key: Option<String>,
    limit: usize,
}

impl NewsApiSource {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, limit: usize) -> Self {
        Self { base_url: base_url.into(), api_key, limit }
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default, deserialize_with = "lenient_items")]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
    url_to_image: Option<String>,
}

#[async_trait]
impl NewsSource for NewsApiSource {
    fn name(&self) -> &'static str {
        "NewsAPI"
    }

    async fn fetch(&self, client: &Client) -> Result<Vec<NewsItem>> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GeoError::Config("NEWS_API_KEY is not set".to_string()))?;

        let page_size = self.limit.to_string();
        let response: NewsApiResponse = client
            .get(endpoint(&self.base_url, "/v2/everything"))
            .query(&[
                ("q", "climate change"),
                ("language", "en"),
                ("pageSize", page_size.as_str()),
                ("apiKey", api_key),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .articles
            .into_iter()
            .take(self.limit)
            .filter_map(|a| {
                NewsItem::new(
                    self.name(),
                    a.title.unwrap_or_default(),
                    a.url.as_deref()?,
                    a.description,
                    a.url_to_image.as_deref(),
                )
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ReliefWeb

pub struct ReliefWebSource {
    base_url: String,
    limit: usize,
}

impl ReliefWebSource {
    pub fn new(base_url: impl Into<String>, limit: usize) -> Self {
        Self { base_url: base_url.into(), limit }
    }
}

#[derive(Debug, Deserialize)]
struct ReliefWebResponse {
    #[serde(default, deserialize_with = "lenient_items")]
    data: Vec<ReliefWebReport>,
}

#[derive(Debug, Deserialize)]
struct ReliefWebReport {
    #[serde(default)]
    fields: Option<ReliefWebFields>,
}

#[derive(Debug, Deserialize)]
struct ReliefWebFields {
    title: Option<String>,
    url: Option<String>,
    #[serde(rename = "body-html")]
    body_html: Option<String>,
}

#[async_trait]
impl NewsSource for ReliefWebSource {
    fn name(&self) -> &'static str {
        "ReliefWeb"
    }

    async fn fetch(&self, client: &Client) -> Result<Vec<NewsItem>> {
        let limit = self.limit.to_string();
        let response: ReliefWebResponse = client
            .get(endpoint(&self.base_url, "/v1/reports"))
            .query(&[
                ("appname", "climawatch"),
                ("query[value]", "climate"),
                ("limit", limit.as_str()),
                ("profile", "full"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .data
            .into_iter()
            .take(self.limit)
            .filter_map(|report| {
                let f = report.fields?;
                NewsItem::new(
                    self.name(),
                    f.title.unwrap_or_default(),
                    f.url.as_deref()?,
                    f.body_html.map(|body| truncate_chars(&body, SUMMARY_MAX_CHARS)),
                    None,
                )
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// UNFCCC (RSS)

pub struct UnfcccRssSource {
    feed_url: String,
    limit: usize,
}

impl UnfcccRssSource {
    pub fn new(feed_url: impl Into<String>, limit: usize) -> Self {
        Self { feed_url: feed_url.into(), limit }
    }
}

#[async_trait]
impl NewsSource for UnfcccRssSource {
    fn name(&self) -> &'static str {
        "UNFCCC"
    }

    async fn fetch(&self, client: &Client) -> Result<Vec<NewsItem>> {
        let body = client
            .get(&self.feed_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let channel = rss::Channel::read_from(&body[..])
            .map_err(|e| GeoError::Upstream(format!("Invalid RSS feed: {}", e)))?;

        debug!("UNFCCC feed returned {} items", channel.items().len());

        Ok(channel
            .items()
            .iter()
            .take(self.limit)
            .filter_map(|item| {
                NewsItem::new(
                    self.name(),
                    item.title().unwrap_or_default(),
                    item.link()?,
                    item.description().map(str::to_string),
                    None,
                )
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Eventbrite

pub struct EventbriteSource {
    base_url: String,
    token: Option<String>,
    limit: usize,
}

impl EventbriteSource {
    pub fn new(base_url: impl Into<String>, token: Option<String>, limit: usize) -> Self {
        Self { base_url: base_url.into(), token, limit }
    }
}

#[derive(Debug, Deserialize)]
struct EventbriteResponse {
    #[serde(default, deserialize_with = "lenient_items")]
    events: Vec<EventbriteEvent>,
}

#[derive(Debug, Deserialize)]
struct EventbriteEvent {
    name: Option<EventbriteText>,
    url: Option<String>,
    description: Option<EventbriteText>,
}

#[derive(Debug, Deserialize)]
struct EventbriteText {
    text: Option<String>,
}

#[async_trait]
impl NewsSource for EventbriteSource {
    fn name(&self) -> &'static str {
        "Eventbrite"
    }

    async fn fetch(&self, client: &Client) -> Result<Vec<NewsItem>> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GeoError::Config("EVENTBRITE_API_KEY is not set".to_string()))?;

        let page_size = self.limit.to_string();
        let response: EventbriteResponse = client
            .get(endpoint(&self.base_url, "/v3/events/search/"))
            .bearer_auth(token)
            .query(&[
                ("q", "climate"),
                ("sort_by", "date"),
                ("page_size", page_size.as_str()),
                ("expand", "venue"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .events
            .into_iter()
            .take(self.limit)
            .filter_map(|event| {
                NewsItem::new(
                    self.name(),
                    event.name.and_then(|n| n.text).unwrap_or_default(),
                    event.url.as_deref()?,
                    event
                        .description
                        .and_then(|d| d.text)
                        .map(|text| truncate_chars(&text, SUMMARY_MAX_CHARS)),
                    None,
                )
            })
            .collect())
    }
}

/// 設定から4つの標準ソースを構築
pub fn default_sources(config: &NewsConfig) -> Vec<Box<dyn NewsSource>> {
    let limit = config.items_per_source;
    vec![
        Box::new(NewsApiSource::new(&config.newsapi_base_url, config.news_api_key.clone(), limit)),
        Box::new(ReliefWebSource::new(&config.reliefweb_base_url, limit)),
        Box::new(UnfcccRssSource::new(&config.unfccc_rss_url, limit)),
        Box::new(EventbriteSource::new(&config.eventbrite_base_url, config.eventbrite_api_key.clone(), limit)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_newsapi_maps_articles() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v2/everything")
                .query_param("apiKey", "secret")
                .query_param("language", "en")
                .query_param("pageSize", "5");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "status": "ok",
                    "articles": [
                        {"title": "Sea levels rise", "url": "https://news.example/1",
                         "description": "Coastal update", "urlToImage": "https://img.example/1.jpg"},
                        {"title": "Broken link", "url": "/relative", "description": null, "urlToImage": null}
                    ]
                }));
        });

        let source = NewsApiSource::new(server.base_url(), Some("secret".to_string()), 5);
        let items = source.fetch(&Client::new()).await.unwrap();

        mock.assert();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, "NewsAPI");
        assert_eq!(items[0].summary.as_deref(), Some("Coastal update"));
        assert_eq!(items[0].image.as_ref().map(|u| u.as_str()), Some("https://img.example/1.jpg"));
    }

    #[tokio::test]
    async fn test_newsapi_without_key_fails() {
        let source = NewsApiSource::new("http://127.0.0.1:9", None, 5);
        let result = source.fetch(&Client::new()).await;
        assert!(matches!(result, Err(GeoError::Config(_))));
    }

    #[tokio::test]
    async fn test_reliefweb_truncates_body() {
        let server = MockServer::start();
        let long_body = "x".repeat(500);
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/reports")
                .query_param("appname", "climawatch")
                .query_param("query[value]", "climate")
                .query_param("profile", "full");
            then.status(200).json_body(serde_json::json!({
                "data": [
                    {"fields": {"title": "Flood report", "url": "https://reliefweb.int/r/1", "body-html": long_body}}
                ]
            }));
        });

        let items = ReliefWebSource::new(server.base_url(), 5).fetch(&Client::new()).await.unwrap();

        mock.assert();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].summary.as_ref().unwrap().chars().count(), 200);
    }

    #[tokio::test]
    async fn test_reliefweb_skips_reports_without_fields() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/reports");
            then.status(200).json_body(serde_json::json!({
                "data": [
                    {"id": 1},
                    {"fields": null},
                    {"fields": {"title": "Good", "url": "https://reliefweb.int/r/2"}}
                ]
            }));
        });

        let items = ReliefWebSource::new(server.base_url(), 5).fetch(&Client::new()).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Good");
        assert_eq!(items[0].link.as_str(), "https://reliefweb.int/r/2");
    }

    #[tokio::test]
    async fn test_newsapi_skips_malformed_articles() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/everything");
            then.status(200).json_body(serde_json::json!({
                "articles": [
                    null,
                    {"title": 42, "url": "https://news.example/bad"},
                    {"title": "Heat record", "url": "https://news.example/2"}
                ]
            }));
        });

        let source = NewsApiSource::new(server.base_url(), Some("secret".to_string()), 5);
        let items = source.fetch(&Client::new()).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Heat record");
    }

    #[tokio::test]
    async fn test_eventbrite_skips_malformed_events() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v3/events/search/");
            then.status(200).json_body(serde_json::json!({
                "events": [
                    {"name": "not an object", "url": "https://eventbrite.example/e/0"},
                    {"name": {"text": "Tree planting"}, "url": "https://eventbrite.example/e/2"}
                ]
            }));
        });

        let source = EventbriteSource::new(server.base_url(), Some("token-1".to_string()), 5);
        let items = source.fetch(&Client::new()).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Tree planting");
    }

    #[tokio::test]
    async fn test_unfccc_reads_rss_items() {
        let server = MockServer::start();
        let mut items_xml = String::new();
        for i in 0..7 {
            items_xml.push_str(&format!(
                "<item><title>Story {i}</title><link>https://unfccc.int/news/{i}</link><description>About {i}</description></item>"
            ));
        }
        let feed = format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>UNFCCC</title><link>https://unfccc.int</link><description>News</description>{}</channel></rss>"#,
            items_xml
        );
        server.mock(|when, then| {
            when.method(GET).path("/rss.xml");
            then.status(200).header("Content-Type", "application/rss+xml").body(feed);
        });

        let source = UnfcccRssSource::new(server.url("/rss.xml"), 5);
        let items = source.fetch(&Client::new()).await.unwrap();

        assert_eq!(items.len(), 5);
        assert_eq!(items[0].title, "Story 0");
        assert_eq!(items[4].link.as_str(), "https://unfccc.int/news/4");
    }

    #[tokio::test]
    async fn test_unfccc_invalid_feed_is_upstream_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rss.xml");
            then.status(200).body("<html>not rss</html>");
        });

        let result = UnfcccRssSource::new(server.url("/rss.xml"), 5).fetch(&Client::new()).await;
        assert!(matches!(result, Err(GeoError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_eventbrite_sends_bearer_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v3/events/search/")
                .header("Authorization", "Bearer token-1")
                .query_param("expand", "venue");
            then.status(200).json_body(serde_json::json!({
                "events": [
                    {"name": {"text": "Climate meetup"}, "url": "https://eventbrite.example/e/1",
                     "description": {"text": "Talks"}}
                ]
            }));
        });

        let source = EventbriteSource::new(server.base_url(), Some("token-1".to_string()), 5);
        let items = source.fetch(&Client::new()).await.unwrap();

        mock.assert();
        assert_eq!(items[0].title, "Climate meetup");
        assert_eq!(items[0].summary.as_deref(), Some("Talks"));
    }

    #[tokio::test]
    async fn test_http_error_status_is_propagated() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/reports");
            then.status(503);
        });

        let result = ReliefWebSource::new(server.base_url(), 5).fetch(&Client::new()).await;
        let err = result.unwrap_err();
        assert!(matches!(err, GeoError::Http(_)));
        assert_eq!(err.status_code(), 502);
    }
}
