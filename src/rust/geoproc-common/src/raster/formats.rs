//! ラスターフォーマット検出

use crate::error::{GeoError, Result};

/// ラスターフォーマットをマジックバイトから検出
pub fn detect_format(data: &[u8]) -> &'static str {
    if data.len() < 4 {
        return "unknown";
    }

    match &data[0..4] {
        // TIFF (little endian): 49 49 2A 00
        [0x49, 0x49, 0x2A, 0x00] => "tiff",

        // TIFF (big endian): 4D 4D 00 2A
        [0x4D, 0x4D, 0x00, 0x2A] => "tiff",

        // BigTIFF: 49 49 2B 00 / 4D 4D 00 2B
        [0x49, 0x49, 0x2B, 0x00] | [0x4D, 0x4D, 0x00, 0x2B] => "bigtiff",

        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47] => "png",

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, _] => "jpeg",

        _ => "unknown",
    }
}

/// デコード可能なラスターかどうか
pub fn is_supported_raster(data: &[u8]) -> bool {
    matches!(detect_format(data), "tiff" | "bigtiff")
}

/// ファイルサイズ制限チェック
pub fn validate_size(data: &[u8], max_size: usize) -> Result<()> {
    if data.len() > max_size {
        return Err(GeoError::FileTooLarge(data.len(), max_size));
    }

    Ok(())
}
