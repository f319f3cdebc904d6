//! 共通設定管理モジュール

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use crate::error::{GeoError, Result};

/// サーバー設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// バインドするホストアドレス
    pub host: String,

    /// ポート番号
    pub port: u16,

    /// ワーカースレッド数
    pub workers: Option<usize>,

    /// リクエストタイムアウト（秒）
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            workers: None,
            request_timeout_secs: 60,
        }
    }
}

/// ロギング設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// ログレベル（EnvFilter書式も可）
    pub level: String,

    /// ログ出力先（"stdout" または "file"）
    pub output: String,

    /// ログファイルパス（ファイル出力の場合）
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            output: "stdout".to_string(),
            file_path: None,
        }
    }
}

impl LoggingConfig {
    /// ファイル出力時のパス（未指定なら logs/app.log）
    pub fn resolved_file_path(&self) -> PathBuf {
        self.file_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs").join("app.log"))
    }
}

/// API設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// CORS許可オリジン
    pub cors_origins: Vec<String>,

    /// 最大リクエストボディサイズ（バイト）
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            cors_origins: vec!["http://localhost:5173".to_string()],
            max_body_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// ファイル保存先設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// /static として公開するディレクトリ
    pub static_dir: String,

    /// static_dir 配下のプレビュー画像ディレクトリ名
    pub preview_subdir: String,

    /// エクスポート済みラスターの置き場所
    pub raster_export_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            static_dir: "static".to_string(),
            preview_subdir: "previews".to_string(),
            raster_export_dir: "raster_exports".to_string(),
        }
    }
}

impl StorageConfig {
    /// プレビューPNGの保存先
    pub fn preview_dir(&self) -> PathBuf {
        PathBuf::from(&self.static_dir).join(&self.preview_subdir)
    }

    /// プレビューPNGの公開URL
    pub fn preview_url(&self, file_name: &str) -> String {
        format!("/static/{}/{}", self.preview_subdir, file_name)
    }

    /// 起動時に必要なディレクトリを作成
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.preview_dir())?;
        std::fs::create_dir_all(&self.raster_export_dir)?;
        Ok(())
    }
}

/// ラスタープレビュー設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RasterConfig {
    /// プレビュー画像の最大辺（ピクセル）
    pub preview_max_dimension: u32,

    /// colormap未指定時のカラーマップ
    pub default_colormap: String,
}

impl Default for RasterConfig {
    fn default() -> Self {
        RasterConfig {
            preview_max_dimension: 2048,
            default_colormap: "viridis".to_string(),
        }
    }
}

/// ニュース取得設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NewsConfig {
    /// NewsAPI キー
    pub news_api_key: Option<String>,

    /// Eventbrite トークン
    pub eventbrite_api_key: Option<String>,

    /// ソースごとのHTTPタイムアウト（秒）
    pub timeout_secs: u64,

    /// ソースごとの最大件数
    pub items_per_source: usize,

    pub newsapi_base_url: String,
    pub reliefweb_base_url: String,
    pub unfccc_rss_url: String,
    pub eventbrite_base_url: String,
}

impl Default for NewsConfig {
    fn default() -> Self {
        NewsConfig {
            news_api_key: None,
            eventbrite_api_key: None,
            timeout_secs: 10,
            items_per_source: 5,
            newsapi_base_url: "https://newsapi.org".to_string(),
            reliefweb_base_url: "https://api.reliefweb.int".to_string(),
            unfccc_rss_url: "https://unfccc.int/rss.xml".to_string(),
            eventbrite_base_url: "https://www.eventbriteapi.com".to_string(),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// サーバー設定
    pub server: ServerConfig,

    /// ロギング設定
    pub logging: LoggingConfig,

    /// API設定
    pub api: ApiConfig,

    /// ファイル保存先設定
    pub storage: StorageConfig,

    /// ラスタープレビュー設定
    pub raster: RasterConfig,

    /// ニュース取得設定
    pub news: NewsConfig,
}

impl Settings {
    /// 設定を読み込む
    ///
    /// 読み込み優先順位：
    /// 1. 環境変数
    /// 2. 設定ファイル（CONFIG_FILE が指定された場合）
    /// 3. デフォルト値
    pub fn new() -> Result<Self> {
        let mut settings = Self::default();

        if let Ok(config_path) = env::var("CONFIG_FILE") {
            settings = Self::from_file(&config_path)?;
        }

        settings.override_from_env();

        Ok(settings)
    }

    /// 設定ファイルから読み込む
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GeoError::Config(format!("Failed to read config file: {}", e)))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .map_err(|e| GeoError::Config(format!("Failed to parse JSON config: {}", e)))
        } else if path.ends_with(".toml") {
            toml::from_str(&content)
                .map_err(|e| GeoError::Config(format!("Failed to parse TOML config: {}", e)))
        } else if path.ends_with(".yaml") || path.ends_with(".yml") {
            serde_yaml::from_str(&content)
                .map_err(|e| GeoError::Config(format!("Failed to parse YAML config: {}", e)))
        } else {
            Err(GeoError::Config("Unsupported config file format".to_string()))
        }
    }

    /// 環境変数で設定を上書き
    fn override_from_env(&mut self) {
        self.override_from(|key| env::var(key).ok());
    }

    /// 任意のキー参照関数で設定を上書き
    pub fn override_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // サーバー設定
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(workers) = lookup("WORKERS").and_then(|w| w.parse().ok()) {
            self.server.workers = Some(workers);
        }

        // ロギング設定
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(output) = lookup("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Some(file) = lookup("LOG_FILE") {
            self.logging.file_path = Some(file);
        }

        // API設定
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.api.cors_origins = origins.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(size) = lookup("MAX_BODY_SIZE").and_then(|s| s.parse().ok()) {
            self.api.max_body_size = size;
        }

        // 保存先
        if let Some(dir) = lookup("STATIC_DIR") {
            self.storage.static_dir = dir;
        }
        if let Some(dir) = lookup("RASTER_EXPORT_DIR") {
            self.storage.raster_export_dir = dir;
        }

        // ラスター
        if let Some(dim) = lookup("PREVIEW_MAX_DIMENSION").and_then(|d| d.parse().ok()) {
            self.raster.preview_max_dimension = dim;
        }

        // ニュース
        if let Some(key) = lookup("NEWS_API_KEY").filter(|k| !k.is_empty()) {
            self.news.news_api_key = Some(key);
        }
        if let Some(key) = lookup("EVENTBRITE_API_KEY").filter(|k| !k.is_empty()) {
            self.news.eventbrite_api_key = Some(key);
        }
        if let Some(timeout) = lookup("NEWS_TIMEOUT").and_then(|t| t.parse().ok()) {
            self.news.timeout_secs = timeout;
        }
    }

    /// 設定を検証
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(GeoError::Config("Invalid port number: 0".to_string()));
        }

        if self.api.max_body_size == 0 {
            return Err(GeoError::Config("max_body_size must be greater than 0".to_string()));
        }

        if self.raster.preview_max_dimension == 0 {
            return Err(GeoError::Config("preview_max_dimension must be greater than 0".to_string()));
        }

        if crate::raster::ColorScheme::from_name(&self.raster.default_colormap).is_none() {
            return Err(GeoError::Config(format!(
                "Unknown default colormap: {}", self.raster.default_colormap
            )));
        }

        if !matches!(self.logging.output.as_str(), "stdout" | "file") {
            return Err(GeoError::Config(format!(
                "Unsupported log output: {}", self.logging.output
            )));
        }

        Ok(())
    }

    /// 設定をファイルに保存
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let content = if path.ends_with(".json") {
            serde_json::to_string_pretty(self)
                .map_err(|e| GeoError::Config(format!("Failed to serialize to JSON: {}", e)))?
        } else if path.ends_with(".toml") {
            toml::to_string_pretty(self)
                .map_err(|e| GeoError::Config(format!("Failed to serialize to TOML: {}", e)))?
        } else if path.ends_with(".yaml") || path.ends_with(".yml") {
            serde_yaml::to_string(self)
                .map_err(|e| GeoError::Config(format!("Failed to serialize to YAML: {}", e)))?
        } else {
            return Err(GeoError::Config("Unsupported config file format".to_string()));
        };

        std::fs::write(path, content)
            .map_err(|e| GeoError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
