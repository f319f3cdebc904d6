//! GeoJSON → CSV 変換

use geojson::FeatureCollection;

use super::geojson_to_shp::{property_keys, stringify_value};
use crate::error::{GeoError, Result};

const GEOMETRY_COLUMN: &str = "geometry";

/// 1フィーチャー1行、末尾に `geometry` 列（GeoJSON文字列）
pub fn feature_collection_to_csv(collection: &FeatureCollection) -> Result<Vec<u8>> {
    let columns: Vec<String> = property_keys(collection)
        .into_iter()
        .filter(|k| k != GEOMETRY_COLUMN)
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = columns.iter().map(String::as_str).collect();
    header.push(GEOMETRY_COLUMN);
    writer.write_record(&header)?;

    for feature in &collection.features {
        let mut row: Vec<String> = columns
            .iter()
            .map(|col| stringify_value(feature.properties.as_ref().and_then(|p| p.get(col))))
            .collect();

        let geometry = match &feature.geometry {
            Some(g) => serde_json::to_string(g)?,
            None => "null".to_string(),
        };
        row.push(geometry);

        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| GeoError::Other(format!("CSV flush failed: {}", e)))
}
