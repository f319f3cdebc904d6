//! 共通エラー型定義

use thiserror::Error;

/// geoproc共通エラー型
#[derive(Debug, Error)]
pub enum GeoError {
    /// 無効なアップロード（ファイル欠落、拡張子不正など）
    #[error("{0}")]
    InvalidUpload(String),

    /// 無効なZIPアーカイブ
    #[error("The uploaded file is not a valid zip archive: {0}")]
    InvalidArchive(String),

    /// シェープファイル構成ファイルの欠落
    #[error("Missing .shp, .shx or .dbf in uploaded zip.")]
    MissingShapefileParts,

    /// シェープファイル読み込みエラー
    #[error("Shapefile read error: {0}")]
    ShapefileRead(String),

    /// シェープファイル書き込みエラー
    #[error("Shapefile write error: {0}")]
    ShapefileWrite(String),

    /// 無効なGeoJSON
    #[error("Invalid GeoJSON: {0}")]
    InvalidGeoJson(String),

    /// フィーチャーが空
    #[error("GeoJSON has no features.")]
    EmptyFeatureCollection,

    /// 書き出し可能なジオメトリがない
    #[error("GeoJSON contains no geometries that can be written to a shapefile.")]
    NoSupportedGeometries,

    /// 無効なパラメータ
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// サポートされていない形式
    #[error("{0}")]
    UnsupportedFormat(String),

    /// ラスターのデコード失敗
    #[error("Raster decode error: {0}")]
    RasterDecode(String),

    /// プレビュー画像の生成失敗
    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    /// アップロードサイズ超過
    #[error("Uploaded file is too large: {0} bytes (max: {1} bytes)")]
    FileTooLarge(usize, usize),

    /// リソースが見つからない
    #[error("{0}")]
    NotFound(String),

    /// 外部ニュースソースのエラー
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// 設定エラー
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO エラー
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON エラー
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ZIP書き込みエラー
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// CSV エラー
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTPクライアントエラー
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// その他のエラー
    #[error("Other error: {0}")]
    Other(String),
}

/// Result型のエイリアス
pub type Result<T> = std::result::Result<T, GeoError>;

impl GeoError {
    /// HTTPステータスコードを返す
    pub fn status_code(&self) -> u16 {
        match self {
            GeoError::InvalidUpload(_) |
            GeoError::InvalidArchive(_) |
            GeoError::MissingShapefileParts |
            GeoError::ShapefileRead(_) |
            GeoError::InvalidGeoJson(_) |
            GeoError::EmptyFeatureCollection |
            GeoError::NoSupportedGeometries |
            GeoError::InvalidParameter(_) |
            GeoError::UnsupportedFormat(_) |
            GeoError::RasterDecode(_) => 400,
            GeoError::NotFound(_) => 404,
            GeoError::FileTooLarge(_, _) => 413,
            GeoError::Upstream(_) |
            GeoError::Http(_) => 502,
            GeoError::ShapefileWrite(_) |
            GeoError::ImageProcessing(_) |
            GeoError::Config(_) |
            GeoError::Io(_) |
            GeoError::Json(_) |
            GeoError::Zip(_) |
            GeoError::Csv(_) |
            GeoError::Other(_) => 500,
        }
    }

    /// エラーコードを返す（APIレスポンス用）
    pub fn error_code(&self) -> &str {
        match self {
            GeoError::InvalidUpload(_) => "INVALID_UPLOAD",
            GeoError::InvalidArchive(_) => "INVALID_ARCHIVE",
            GeoError::MissingShapefileParts => "MISSING_SHAPEFILE_PARTS",
            GeoError::ShapefileRead(_) => "SHAPEFILE_READ_ERROR",
            GeoError::ShapefileWrite(_) => "SHAPEFILE_WRITE_ERROR",
            GeoError::InvalidGeoJson(_) => "INVALID_GEOJSON",
            GeoError::EmptyFeatureCollection => "EMPTY_FEATURE_COLLECTION",
            GeoError::NoSupportedGeometries => "NO_SUPPORTED_GEOMETRIES",
            GeoError::InvalidParameter(_) => "INVALID_PARAMETER",
            GeoError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            GeoError::RasterDecode(_) => "RASTER_DECODE_ERROR",
            GeoError::ImageProcessing(_) => "IMAGE_PROCESSING_ERROR",
            GeoError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            GeoError::NotFound(_) => "NOT_FOUND",
            GeoError::Upstream(_) => "UPSTREAM_ERROR",
            GeoError::Config(_) => "CONFIG_ERROR",
            GeoError::Io(_) => "IO_ERROR",
            GeoError::Json(_) => "JSON_ERROR",
            GeoError::Zip(_) => "ZIP_ERROR",
            GeoError::Csv(_) => "CSV_ERROR",
            GeoError::Http(_) => "HTTP_ERROR",
            GeoError::Other(_) => "UNKNOWN_ERROR",
        }
    }

    /// クライアント起因のエラーかどうか
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
