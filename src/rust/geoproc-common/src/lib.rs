//! geoproc 共通ライブラリ
//!
//! 地理空間ファイル変換と気候ニュース集約のHTTPサービスを構成する。

pub mod api;
pub mod config;
pub mod error;
pub mod news;
pub mod raster;
pub mod state;
pub mod vector;

// バージョン情報
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

// 主要な型の再エクスポート
pub use config::Settings;
pub use error::{GeoError, Result};
pub use news::{NewsAggregator, NewsItem};
pub use state::AppState;
