//! ラスタープレビュー生成パイプライン

use image::{imageops, ImageFormat, RgbaImage};
use std::path::Path;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use super::colormap::ColorScheme;
use super::decode::{decode_raster, DecodedRaster};
use crate::error::{GeoError, Result};

const EPSILON: f64 = 1e-8;

/// プレビュー生成結果
#[derive(Debug, Clone)]
pub struct RasterPreview {
    pub raster: DecodedRaster,
    /// 保存したPNGのファイル名（`<uuid>.png`）
    pub file_name: String,
    pub processing_time_ms: u64,
}

pub struct PreviewRenderer {
    max_dimension: u32,
}

impl PreviewRenderer {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension: max_dimension.max(1) }
    }

    /// アップロードされたラスターをデコードしてPNGを書き出す
    pub fn process(&self, data: &[u8], scheme: ColorScheme, out_dir: &Path) -> Result<RasterPreview> {
        let start = Instant::now();

        // 1. フォーマット検証
        let format = super::formats::detect_format(data);
        if !super::formats::is_supported_raster(data) {
            return Err(GeoError::UnsupportedFormat(format!(
                "Unsupported raster format: {}", format
            )));
        }

        // 2. デコード
        let raster = decode_raster(data)?;

        // 3. カラーマップ適用 + 縮小
        let image = render_preview(&raster.band, raster.width, raster.height, raster.nodata, scheme, self.max_dimension)?;

        // 4. 保存
        let file_name = save_preview(&image, out_dir)?;

        let processing_time_ms = start.elapsed().as_millis() as u64;
        info!(
            "Rendered {}x{} raster preview {} ({}, {}ms)",
            raster.width, raster.height, file_name, scheme.name(), processing_time_ms
        );

        Ok(RasterPreview { raster, file_name, processing_time_ms })
    }
}

/// NaN は 0、±∞ は有限値の最大/最小に置き換える
pub fn nan_to_num(band: &[f64]) -> Vec<f64> {
    let (lo, hi) = finite_range(band.iter().copied()).unwrap_or((0.0, 0.0));
    band.iter()
        .map(|&v| {
            if v.is_nan() {
                0.0
            } else if v == f64::INFINITY {
                hi
            } else if v == f64::NEG_INFINITY {
                lo
            } else {
                v
            }
        })
        .collect()
}

fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// バンドをRGBA画像に変換
///
/// nodata に一致する画素は透明になり、値域の計算からも除外される。
pub fn render_preview(
    band: &[f64],
    width: u32,
    height: u32,
    nodata: Option<f64>,
    scheme: ColorScheme,
    max_dim: u32,
) -> Result<RgbaImage> {
    let pixels = width as usize * height as usize;
    if width == 0 || height == 0 || band.len() < pixels {
        return Err(GeoError::ImageProcessing(format!(
            "Band has {} samples for a {}x{} raster", band.len(), width, height
        )));
    }

    let is_nodata = |v: f64| nodata.map_or(false, |nd| v == nd || (nd.is_nan() && v.is_nan()));
    let cleaned = nan_to_num(&band[..pixels]);

    let (min, max) = finite_range(
        band[..pixels].iter().zip(&cleaned).filter(|(raw, _)| !is_nodata(**raw)).map(|(_, v)| *v),
    )
    .unwrap_or((0.0, 0.0));

    let mut rgba = Vec::with_capacity(pixels * 4);
    for (raw, value) in band[..pixels].iter().zip(&cleaned) {
        if is_nodata(*raw) {
            rgba.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        let t = (value - min) / (max - min + EPSILON);
        let c = scheme.evaluate(t);
        rgba.extend_from_slice(&[c.r, c.g, c.b, 255]);
    }

    let image = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| GeoError::ImageProcessing("RGBA buffer size mismatch".to_string()))?;

    Ok(downscale(image, max_dim))
}

/// 長辺が `max_dim` を超える場合のみ最近傍で縮小
fn downscale(image: RgbaImage, max_dim: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if longest <= max_dim {
        return image;
    }

    let scale = max_dim as f64 / longest as f64;
    let new_w = ((w as f64 * scale).round() as u32).clamp(1, max_dim);
    let new_h = ((h as f64 * scale).round() as u32).clamp(1, max_dim);
    imageops::resize(&image, new_w, new_h, imageops::FilterType::Nearest)
}

/// `<uuid>.png` として保存しファイル名を返す
pub fn save_preview(image: &RgbaImage, dir: &Path) -> Result<String> {
    std::fs::create_dir_all(dir)?;

    let file_name = format!("{}.png", Uuid::new_v4());
    image
        .save_with_format(dir.join(&file_name), ImageFormat::Png)
        .map_err(|e| GeoError::ImageProcessing(format!("Failed to write PNG: {}", e)))?;

    Ok(file_name)
}
