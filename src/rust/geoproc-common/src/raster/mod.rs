//! ラスター処理モジュール

pub mod colormap;
pub mod decode;
pub mod export;
pub mod formats;
pub mod preview;

pub use colormap::{ColorScheme, Rgb};
pub use decode::{decode_raster, DecodedRaster, GeoTransform};
pub use export::{resolve_export, RasterExport, TIFF_MEDIA_TYPE};
pub use preview::{PreviewRenderer, RasterPreview};
