//! アプリケーション共有状態

use std::time::Instant;

use crate::config::Settings;
use crate::error::Result;
use crate::news::NewsAggregator;

pub struct AppState {
    pub settings: Settings,
    pub news: NewsAggregator,
    pub started_at: Instant,
    /// ビルド番号（サーバーバイナリから渡される）
    pub build: String,
}

impl AppState {
    pub fn new(settings: Settings, build: impl Into<String>) -> Result<Self> {
        let news = NewsAggregator::from_config(&settings.news)?;
        Ok(Self::with_news(settings, news, build))
    }

    pub fn with_news(settings: Settings, news: NewsAggregator, build: impl Into<String>) -> Self {
        AppState {
            settings,
            news,
            started_at: Instant::now(),
            build: build.into(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
