//! GeoTIFF デコード
//!
//! `tiff` クレートで1バンド目とジオリファレンス情報を読み出す。

use std::io::{Cursor, Read, Seek};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{GeoError, Result};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// アフィン変換（回転なし）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// 北が上なら負値
    pub pixel_height: f64,
}

/// デコード済みラスター（1バンド目のみ保持）
#[derive(Debug, Clone)]
pub struct DecodedRaster {
    pub width: u32,
    pub height: u32,
    pub band_count: u32,
    pub dtype: String,
    /// 行優先の1バンド目
    pub band: Vec<f64>,
    pub transform: Option<GeoTransform>,
    pub crs: Option<String>,
    pub nodata: Option<f64>,
}

impl DecodedRaster {
    /// [left, bottom, right, top]
    ///
    /// ジオリファレンスが無い場合は恒等変換のピクセル座標になる。
    pub fn bbox(&self) -> [f64; 4] {
        let (w, h) = (self.width as f64, self.height as f64);
        match self.transform {
            Some(gt) => {
                let x0 = gt.origin_x;
                let x1 = gt.origin_x + w * gt.pixel_width;
                let y0 = gt.origin_y;
                let y1 = gt.origin_y + h * gt.pixel_height;
                [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]
            }
            None => [0.0, h, w, 0.0],
        }
    }
}

/// バイト列からラスターをデコード
pub fn decode_raster(data: &[u8]) -> Result<DecodedRaster> {
    let mut decoder = Decoder::new(Cursor::new(data))
        .map_err(|e| GeoError::RasterDecode(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder.dimensions()
        .map_err(|e| GeoError::RasterDecode(format!("Cannot read dimensions: {}", e)))?;

    let samples = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1).max(1);
    let planar = decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1);

    let result = decoder.read_image()
        .map_err(|e| GeoError::RasterDecode(format!("Cannot read image data: {}", e)))?;

    let layout = BandLayout {
        pixels: width as usize * height as usize,
        samples: samples as usize,
        planar: planar == 2,
    };

    let (dtype, band) = match result {
        DecodingResult::U8(buf) => ("uint8", layout.first_band(&buf, |v| v as f64)),
        DecodingResult::U16(buf) => ("uint16", layout.first_band(&buf, |v| v as f64)),
        DecodingResult::U32(buf) => ("uint32", layout.first_band(&buf, |v| v as f64)),
        DecodingResult::U64(buf) => ("uint64", layout.first_band(&buf, |v| v as f64)),
        DecodingResult::I8(buf) => ("int8", layout.first_band(&buf, |v| v as f64)),
        DecodingResult::I16(buf) => ("int16", layout.first_band(&buf, |v| v as f64)),
        DecodingResult::I32(buf) => ("int32", layout.first_band(&buf, |v| v as f64)),
        DecodingResult::I64(buf) => ("int64", layout.first_band(&buf, |v| v as f64)),
        DecodingResult::F32(buf) => ("float32", layout.first_band(&buf, |v| v as f64)),
        DecodingResult::F64(buf) => ("float64", layout.first_band(&buf, |v| v)),
        #[allow(unreachable_patterns)]
        _ => return Err(GeoError::RasterDecode("Unsupported TIFF pixel format".to_string())),
    };
    let band = band?;

    let transform = read_geotransform(&mut decoder);
    let crs = read_crs(&mut decoder);
    let nodata = read_nodata(&mut decoder);

    debug!(
        "Decoded raster {}x{} ({} band(s), {}), crs={:?}",
        width, height, samples, dtype, crs
    );

    Ok(DecodedRaster {
        width,
        height,
        band_count: samples,
        dtype: dtype.to_string(),
        band,
        transform,
        crs,
        nodata,
    })
}

/// サンプルの並び方
struct BandLayout {
    pixels: usize,
    samples: usize,
    planar: bool,
}

impl BandLayout {
    fn first_band<T: Copy>(&self, buf: &[T], convert: impl Fn(T) -> f64) -> Result<Vec<f64>> {
        let expected = if self.planar { self.pixels } else { self.pixels * self.samples };
        if buf.len() < expected {
            return Err(GeoError::RasterDecode(format!(
                "Unexpected sample count: {} (expected at least {})", buf.len(), expected
            )));
        }

        let band = if self.planar || self.samples == 1 {
            buf[..self.pixels].iter().map(|&v| convert(v)).collect()
        } else {
            buf.iter().step_by(self.samples).take(self.pixels).map(|&v| convert(v)).collect()
        };
        Ok(band)
    }
}

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// ModelPixelScale + ModelTiepoint、なければ ModelTransformation から取得
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok();
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok();

    if let (Some(scale), Some(tiepoint)) = (scale, tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z]
            return Some(GeoTransform {
                origin_x: tiepoint[3] - tiepoint[0] * scale[0],
                origin_y: tiepoint[4] + tiepoint[1] * scale[1],
                pixel_width: scale[0],
                pixel_height: -scale[1],
            });
        }
    }

    let matrix = decoder.get_tag_f64_vec(tag(MODEL_TRANSFORMATION)).ok()?;
    if matrix.len() >= 16 {
        return Some(GeoTransform {
            origin_x: matrix[3],
            origin_y: matrix[7],
            pixel_width: matrix[0],
            pixel_height: matrix[5],
        });
    }

    None
}

/// GeoKeyDirectory から EPSG コードを取り出す
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<String> {
    let keys = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)).ok()?;
    parse_epsg(&keys).map(|code| format!("EPSG:{}", code))
}

/// GeoKeyDirectory のエントリを走査（投影系を優先）
pub(crate) fn parse_epsg(keys: &[u16]) -> Option<u16> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;

    let lookup = |wanted: u16| {
        keys[4..]
            .chunks_exact(4)
            .take(count)
            .find(|entry| entry[0] == wanted && entry[1] == 0)
            .map(|entry| entry[3])
            .filter(|code| *code != 0 && *code != USER_DEFINED)
    };

    lookup(PROJECTED_CS_TYPE_GEO_KEY).or_else(|| lookup(GEOGRAPHIC_TYPE_GEO_KEY))
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let raw = decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?;
    raw.trim_matches(char::from(0)).trim().parse().ok()
}
