//! ニュース項目のデータモデル

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// ソース名ごとにまとめたニュース
pub type GroupedNews = BTreeMap<String, Vec<NewsItem>>;

/// 1件のニュース項目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub source: String,
    pub title: String,
    pub link: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Url>,
}

impl NewsItem {
    /// リンクが http(s) の絶対URLでなければ None
    pub fn new(
        source: &str,
        title: impl Into<String>,
        link: &str,
        summary: Option<String>,
        image: Option<&str>,
    ) -> Option<Self> {
        let link = parse_http_url(link)?;
        let image = image.and_then(parse_http_url);
        let summary = summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        Some(Self {
            source: source.to_string(),
            title: title.into().trim().to_string(),
            link,
            summary,
            image,
        })
    }
}

fn parse_http_url(raw: &str) -> Option<Url> {
    Url::parse(raw.trim())
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

/// ソースごとにグループ化（取得順を保持）
pub fn group_by_source(items: Vec<NewsItem>) -> GroupedNews {
    let mut grouped = GroupedNews::new();
    for item in items {
        grouped.entry(item.source.clone()).or_default().push(item);
    }
    grouped
}

/// 先頭 `max` 文字で切り詰める
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
