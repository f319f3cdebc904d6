//! ベクターデータ変換モジュール

pub mod archive;
pub mod csv_export;
pub mod geojson_to_shp;
pub mod shp_to_geojson;

pub use archive::{extract_archive, ExtractedArchive, ShapefileParts};
pub use csv_export::feature_collection_to_csv;
pub use geojson_to_shp::{parse_geojson, write_shapefile, ShapeKind, ShapefileExport};
pub use shp_to_geojson::{read_feature_collection, ShapefileSummary};
