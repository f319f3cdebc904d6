//! 共通APIモデル定義

use serde::{Deserialize, Serialize};

use crate::error::GeoError;
use crate::raster::DecodedRaster;

/// 共通レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(error: ApiError) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// APIエラー
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// サーバー側のエラーは詳細を出さず `generic` を返す
    pub fn from_geo_error(err: &GeoError, generic: &str) -> Self {
        let message = if err.is_client_error() {
            err.to_string()
        } else {
            generic.to_string()
        };

        ApiError {
            code: err.error_code().to_string(),
            message,
            details: None,
        }
    }
}

/// `GET /` のレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// `GET /health` のレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build: String,
    pub platform: String,
    pub uptime_seconds: u64,
    pub news_sources: Vec<String>,
}

/// ラスターメタデータ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterMeta {
    pub width: u32,
    pub height: u32,
    pub crs: Option<String>,
    pub dtype: String,
    /// [left, bottom, right, top]
    pub bbox: [f64; 4],
    pub band_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
}

impl From<&DecodedRaster> for RasterMeta {
    fn from(raster: &DecodedRaster) -> Self {
        RasterMeta {
            width: raster.width,
            height: raster.height,
            crs: raster.crs.clone(),
            dtype: raster.dtype.clone(),
            bbox: raster.bbox(),
            band_count: raster.band_count,
            nodata: raster.nodata,
        }
    }
}

/// `POST /preview/raster` のレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct RasterPreviewResponse {
    pub meta: RasterMeta,
    /// `/static/previews/<uuid>.png`
    pub preview: String,
}

/// `POST /upload-shp` のレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ShapefileUploadResponse {
    pub filename: String,
    pub files: Vec<String>,
    /// 見つかった `.shp` のファイル名
    pub shp_found: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
}

fn default_export_format() -> String {
    "geotiff".to_string()
}

/// `GET /api/raster/export` のクエリパラメータ
#[derive(Debug, Deserialize, Serialize)]
pub struct RasterExportQuery {
    #[serde(rename = "datasetId")]
    pub dataset_id: String,
    #[serde(default = "default_export_format")]
    pub format: String,
    /// 受け付けるが未使用
    pub colormap: Option<String>,
}
