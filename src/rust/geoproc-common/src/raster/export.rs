//! 運用側が配置したラスターのエクスポート

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{GeoError, Result};

pub const TIFF_MEDIA_TYPE: &str = "image/tiff";

/// ダウンロード対象のラスターファイル
#[derive(Debug, Clone, PartialEq)]
pub struct RasterExport {
    pub path: PathBuf,
    pub file_name: String,
}

/// 出力フォーマット名から拡張子を解決
pub fn export_extension(format: &str) -> Result<&'static str> {
    match format.trim().to_ascii_lowercase().as_str() {
        "geotiff" | "tif" | "tiff" => Ok("tif"),
        _ => Err(GeoError::UnsupportedFormat(format!("Unsupported raster format: {}", format))),
    }
}

fn validate_dataset_id(dataset_id: &str) -> Result<()> {
    let invalid = dataset_id.trim().is_empty()
        || dataset_id.contains(['/', '\\', '\0'])
        || dataset_id.contains("..");

    if invalid {
        return Err(GeoError::InvalidParameter(format!("Invalid datasetId: {:?}", dataset_id)));
    }
    Ok(())
}

/// `<dir>/<dataset_id>.<ext>` を解決する
pub fn resolve_export(dir: &Path, dataset_id: &str, format: &str) -> Result<RasterExport> {
    let extension = export_extension(format)?;
    validate_dataset_id(dataset_id)?;

    let file_name = format!("{}.{}", dataset_id, extension);
    let path = dir.join(&file_name);
    debug!("Resolving raster export {}", path.display());

    if !path.is_file() {
        return Err(GeoError::NotFound("Raster file not found".to_string()));
    }

    Ok(RasterExport { path, file_name })
}
