//! GeoJSON → シェープファイル変換

use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue, Position, Value};
use shapefile::dbase::{self, FieldName, FieldValue, TableWriterBuilder};
use shapefile::{Point, Polygon, PolygonRing, Polyline};
use std::collections::HashSet;
use std::convert::TryFrom;
use std::path::Path;
use tracing::{debug, warn};

use super::archive::bundle_shapefile;
use crate::error::{GeoError, Result};

const OUTPUT_STEM: &str = "output";
const MAX_FIELD_NAME_LEN: usize = 10;
const MAX_FIELD_WIDTH: usize = 254;
const MAX_FIELD_COUNT: usize = 255;
/// 削除フラグ1バイト + 各フィールド幅（ヘッダー上は u16）
const MAX_RECORD_LEN: usize = u16::MAX as usize;

/// GeoJSON座標は RFC 7946 により WGS84
pub const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// シェープファイル1つに格納できるジオメトリ系統
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Point,
    Polyline,
    Polygon,
}

impl ShapeKind {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Point(_) | Value::MultiPoint(_) => Some(Self::Point),
            Value::LineString(_) | Value::MultiLineString(_) => Some(Self::Polyline),
            Value::Polygon(_) | Value::MultiPolygon(_) => Some(Self::Polygon),
            Value::GeometryCollection(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::Polyline => "Polyline",
            Self::Polygon => "Polygon",
        }
    }
}

/// エクスポート結果
#[derive(Debug)]
pub struct ShapefileExport {
    /// `.shp/.shx/.dbf/.prj` を含むZIP
    pub archive: Vec<u8>,
    /// 書き出したレコード数
    pub written: usize,
    /// スキップしたフィーチャー数
    pub skipped: usize,
    pub shape_kind: ShapeKind,
}

enum Converted {
    Points(Vec<Point>),
    Polyline(Polyline),
    Polygons(Vec<Polygon>),
}

impl Converted {
    fn record_count(&self) -> usize {
        match self {
            Converted::Points(points) => points.len(),
            Converted::Polyline(_) => 1,
            Converted::Polygons(polygons) => polygons.len(),
        }
    }
}

/// FeatureCollection / Feature / Geometry のいずれかを受け付ける
pub fn parse_geojson(data: &[u8]) -> Result<FeatureCollection> {
    let text = std::str::from_utf8(data)
        .map_err(|e| GeoError::InvalidGeoJson(e.to_string()))?;
    let geojson: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| GeoError::InvalidGeoJson(e.to_string()))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(feature) => FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        },
        GeoJson::Geometry(geometry) => FeatureCollection {
            bbox: None,
            features: vec![geojson::Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        },
    };

    if collection.features.is_empty() {
        return Err(GeoError::EmptyFeatureCollection);
    }
    Ok(collection)
}

/// プロパティキーの和集合（出現順）
pub fn property_keys(collection: &FeatureCollection) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for props in collection.features.iter().filter_map(|f| f.properties.as_ref()) {
        for key in props.keys() {
            if seen.insert(key.clone()) {
                keys.push(key.clone());
            }
        }
    }
    keys
}

/// プロパティ値を文字列化（文字列はそのまま、null は空）
pub fn stringify_value(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// DBFのフィールド定義
#[derive(Debug, Clone, PartialEq)]
struct DbfField {
    key: String,
    name: String,
    width: usize,
}

/// DBFフィールド名は10バイト以下のASCII
fn sanitize_field_names(keys: &[String]) -> Vec<String> {
    let mut used = HashSet::new();
    let mut names = Vec::with_capacity(keys.len());

    for key in keys {
        let mut base: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .take(MAX_FIELD_NAME_LEN)
            .collect();
        if base.is_empty() {
            base = "field".to_string();
        }

        let mut name = base.clone();
        let mut n = 1;
        while !used.insert(name.to_ascii_lowercase()) {
            let suffix = format!("_{}", n);
            let keep = MAX_FIELD_NAME_LEN.saturating_sub(suffix.len()).min(base.len());
            name = format!("{}{}", &base[..keep], suffix);
            n += 1;
        }
        names.push(name);
    }
    names
}

fn build_fields(collection: &FeatureCollection) -> Result<Vec<DbfField>> {
    let keys = property_keys(collection);
    if keys.len() > MAX_FIELD_COUNT {
        return Err(GeoError::InvalidGeoJson(format!(
            "{} property keys exceed the shapefile limit of {} fields",
            keys.len(),
            MAX_FIELD_COUNT
        )));
    }
    let names = sanitize_field_names(&keys);

    let fields: Vec<DbfField> = keys
        .into_iter()
        .zip(names)
        .map(|(key, name)| {
            let longest = collection
                .features
                .iter()
                .map(|f| stringify_value(f.properties.as_ref().and_then(|p| p.get(&key))).len())
                .max()
                .unwrap_or(0);
            DbfField { key, name, width: longest.clamp(1, MAX_FIELD_WIDTH) }
        })
        .collect();

    let record_len = 1 + fields.iter().map(|f| f.width).sum::<usize>();
    if record_len > MAX_RECORD_LEN {
        return Err(GeoError::InvalidGeoJson(format!(
            "Attribute record of {} bytes exceeds the DBF limit of {} bytes",
            record_len, MAX_RECORD_LEN
        )));
    }

    Ok(fields)
}

fn truncate_to_width(mut value: String, width: usize) -> String {
    if value.len() > width {
        let mut end = width;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        value.truncate(end);
    }
    value
}

fn build_record(fields: &[DbfField], properties: Option<&JsonObject>) -> dbase::Record {
    let mut record = dbase::Record::default();
    for field in fields {
        let value = stringify_value(properties.and_then(|p| p.get(&field.key)));
        record.insert(
            field.name.clone(),
            FieldValue::Character(Some(truncate_to_width(value, field.width))),
        );
    }
    record
}

fn to_point(position: &Position) -> Option<Point> {
    match position.as_slice() {
        [x, y, ..] => Some(Point::new(*x, *y)),
        _ => None,
    }
}

fn to_points(positions: &[Position]) -> Option<Vec<Point>> {
    positions.iter().map(to_point).collect()
}

fn to_polygon(rings: &[Vec<Position>]) -> Option<Polygon> {
    let mut converted = Vec::with_capacity(rings.len());
    for (i, ring) in rings.iter().enumerate() {
        let points = to_points(ring).filter(|p| p.len() >= 3);
        match (i, points) {
            (0, None) => return None,
            (0, Some(points)) => converted.push(PolygonRing::Outer(points)),
            (_, Some(points)) => converted.push(PolygonRing::Inner(points)),
            (_, None) => warn!("Dropping degenerate interior ring"),
        }
    }
    if converted.is_empty() {
        return None;
    }
    Some(Polygon::with_rings(converted))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// ジオメトリをシェープに変換（退化したジオメトリは None）
fn convert(value: &Value) -> Option<Converted> {
    match value {
        Value::Point(p) => to_point(p).map(|p| Converted::Points(vec![p])),
        Value::MultiPoint(ps) => to_points(ps).filter(|v| !v.is_empty()).map(Converted::Points),
        Value::LineString(line) => to_points(line)
            .filter(|v| v.len() >= 2)
            .map(|v| Converted::Polyline(Polyline::new(v))),
        Value::MultiLineString(lines) => {
            let parts: Vec<Vec<Point>> = lines
                .iter()
                .filter_map(|l| to_points(l))
                .filter(|v| v.len() >= 2)
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(Converted::Polyline(Polyline::with_parts(parts)))
            }
        }
        Value::Polygon(rings) => to_polygon(rings).map(|p| Converted::Polygons(vec![p])),
        Value::MultiPolygon(polygons) => {
            let converted: Vec<Polygon> = polygons.iter().filter_map(|p| to_polygon(p)).collect();
            if converted.is_empty() {
                None
            } else {
                Some(Converted::Polygons(converted))
            }
        }
        Value::GeometryCollection(_) => None,
    }
}

/// FeatureCollection をシェープファイル一式（ZIP）に書き出す
pub fn write_shapefile(collection: &FeatureCollection) -> Result<ShapefileExport> {
    let mut kind: Option<ShapeKind> = None;
    let mut rows = Vec::new();
    let mut skipped = 0;

    for (index, feature) in collection.features.iter().enumerate() {
        let Some(geometry) = feature.geometry.as_ref() else {
            debug!("Skipping feature {} without geometry", index);
            skipped += 1;
            continue;
        };

        let Some(feature_kind) = ShapeKind::of(&geometry.value) else {
            warn!("Skipping feature {}: unsupported geometry {}", index, type_name(&geometry.value));
            skipped += 1;
            continue;
        };

        if let Some(expected) = kind {
            if expected != feature_kind {
                warn!(
                    "Skipping feature {}: {} does not match shapefile type {}",
                    index, feature_kind.name(), expected.name()
                );
                skipped += 1;
                continue;
            }
        }

        match convert(&geometry.value) {
            Some(shape) => {
                kind.get_or_insert(feature_kind);
                rows.push((shape, feature.properties.as_ref()));
            }
            None => {
                warn!("Skipping feature {}: degenerate {}", index, type_name(&geometry.value));
                skipped += 1;
            }
        }
    }

    let kind = kind.ok_or(GeoError::NoSupportedGeometries)?;

    let mut fields = build_fields(collection)?;
    let use_index_field = fields.is_empty();
    if use_index_field {
        fields.push(DbfField { key: "id".to_string(), name: "id".to_string(), width: 10 });
    }

    let dir = tempfile::Builder::new().prefix("geoproc-export-").tempdir()?;
    let written = write_rows(dir.path(), &fields, &rows, use_index_field)?;
    std::fs::write(dir.path().join(format!("{}.prj", OUTPUT_STEM)), WGS84_PRJ)?;

    let archive = bundle_shapefile(dir.path(), OUTPUT_STEM)?;

    debug!(
        "Wrote {} {} record(s), skipped {} feature(s)",
        written, kind.name(), skipped
    );

    Ok(ShapefileExport { archive, written, skipped, shape_kind: kind })
}

fn write_rows(
    dir: &Path,
    fields: &[DbfField],
    rows: &[(Converted, Option<&JsonObject>)],
    use_index_field: bool,
) -> Result<usize> {
    let mut table = TableWriterBuilder::new();
    for field in fields {
        let name = FieldName::try_from(field.name.as_str())
            .map_err(|e| GeoError::ShapefileWrite(format!("Invalid field name {}: {:?}", field.name, e)))?;
        table = table.add_character_field(name, field.width as u8);
    }

    let shp = dir.join(format!("{}.shp", OUTPUT_STEM));
    let mut writer = shapefile::Writer::from_path(&shp, table)
        .map_err(|e| GeoError::ShapefileWrite(e.to_string()))?;

    let write_err = |e: shapefile::Error| GeoError::ShapefileWrite(e.to_string());
    let mut written = 0;

    for (row, (shape, properties)) in rows.iter().enumerate() {
        let record = if use_index_field {
            let mut record = dbase::Record::default();
            record.insert("id".to_string(), FieldValue::Character(Some(row.to_string())));
            record
        } else {
            build_record(fields, *properties)
        };

        match shape {
            Converted::Points(points) => {
                for point in points {
                    writer.write_shape_and_record(point, &record).map_err(write_err)?;
                }
            }
            Converted::Polyline(line) => {
                writer.write_shape_and_record(line, &record).map_err(write_err)?;
            }
            Converted::Polygons(polygons) => {
                for polygon in polygons {
                    writer.write_shape_and_record(polygon, &record).map_err(write_err)?;
                }
            }
        }
        written += shape.record_count();
    }

    drop(writer);
    Ok(written)
}
