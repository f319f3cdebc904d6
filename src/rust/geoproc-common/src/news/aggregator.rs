//! ニュースアグリゲーター
//!
//! 全ソースへ並行にリクエストし、成功した結果だけを集める。

use futures::future::join_all;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use super::models::{group_by_source, GroupedNews, NewsItem};
use super::sources::{default_sources, NewsSource};
use crate::config::NewsConfig;
use crate::error::{GeoError, Result};

pub struct NewsAggregator {
    client: Client,
    sources: Vec<Box<dyn NewsSource>>,
}

impl NewsAggregator {
    pub fn new(client: Client, sources: Vec<Box<dyn NewsSource>>) -> Self {
        Self { client, sources }
    }

    /// 設定からクライアントと標準ソースを構築
    pub fn from_config(config: &NewsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeoError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::new(client, default_sources(config)))
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// 全ソースから取得（失敗したソースはログに残して無視）
    pub async fn fetch_all(&self) -> Vec<NewsItem> {
        let results = join_all(self.sources.iter().map(|source| source.fetch(&self.client))).await;

        let mut items = Vec::new();
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(mut fetched) => {
                    debug!("{} returned {} items", source.name(), fetched.len());
                    items.append(&mut fetched);
                }
                Err(e) => warn!("News source {} failed: {}", source.name(), e),
            }
        }
        items
    }

    pub async fn fetch_grouped(&self) -> GroupedNews {
        group_by_source(self.fetch_all().await)
    }
}
