//! 気候ニュース集約モジュール

pub mod aggregator;
pub mod models;
pub mod sources;

pub use aggregator::NewsAggregator;
pub use models::{group_by_source, GroupedNews, NewsItem};
pub use sources::NewsSource;
