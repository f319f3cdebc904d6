//! シェープファイル → GeoJSON 変換

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Position, Value};
use shapefile::dbase::{self, FieldValue};
use shapefile::{Point, PointM, PointZ, PolygonRing, Shape, ShapeReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

use super::archive::ShapefileParts;
use crate::error::{GeoError, Result};

/// ヘッダー情報
#[derive(Debug, Clone, PartialEq)]
pub struct ShapefileSummary {
    pub shape_type: String,
    /// [min_x, min_y, max_x, max_y]
    pub bbox: [f64; 4],
}

/// 全フィーチャーを読み込んで FeatureCollection にする
pub fn read_feature_collection(parts: &ShapefileParts) -> Result<FeatureCollection> {
    let fields = read_fields(&parts.dbf)?;

    // 構成ファイルの拡張子は大文字小文字が揃っていない場合がある
    let shapes = ShapeReader::with_shx(open(&parts.shp)?, open(&parts.shx)?)
        .map_err(|e| GeoError::ShapefileRead(e.to_string()))?;
    let table = dbase::Reader::new(open(&parts.dbf)?)
        .map_err(|e| GeoError::ShapefileRead(e.to_string()))?;
    let mut reader = shapefile::Reader::new(shapes, table);

    let mut features = Vec::new();
    for item in reader.iter_shapes_and_records() {
        let (shape, record) = item.map_err(|e| GeoError::ShapefileRead(e.to_string()))?;

        let geometry = shape_to_geometry(&shape);
        if geometry.is_none() && !matches!(shape, Shape::NullShape) {
            warn!("Unsupported shape {:?} emitted with null geometry", shape.shapetype());
        }

        features.push(Feature {
            bbox: None,
            geometry,
            id: None,
            properties: Some(record_to_properties(&record, &fields)),
            foreign_members: None,
        });
    }

    debug!("Read {} features from {}", features.len(), parts.shp.display());

    Ok(FeatureCollection { bbox: None, features, foreign_members: None })
}

/// DBFのフィールド名（宣言順）
pub fn read_fields(dbf: &Path) -> Result<Vec<String>> {
    let reader = dbase::Reader::new(open(dbf)?)
        .map_err(|e| GeoError::ShapefileRead(e.to_string()))?;

    Ok(reader
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .filter(|name| name != "DeletionFlag")
        .collect())
}

/// ヘッダーからジオメトリ種別と範囲を取得
pub fn read_summary(shp: &Path) -> Result<ShapefileSummary> {
    let reader = ShapeReader::new(open(shp)?)
        .map_err(|e| GeoError::ShapefileRead(e.to_string()))?;

    let header = reader.header();
    Ok(ShapefileSummary {
        shape_type: format!("{:?}", header.shape_type),
        bbox: [header.bbox.min.x, header.bbox.min.y, header.bbox.max.x, header.bbox.max.y],
    })
}

/// `.prj` の WKT から座標系名を取り出す（例: `GCS_WGS_1984`）
pub fn read_crs_name(prj: &Path) -> Option<String> {
    let wkt = std::fs::read_to_string(prj).ok()?;
    let start = wkt.find('"')? + 1;
    let len = wkt[start..].find('"')?;
    Some(wkt[start..start + len].to_string()).filter(|s| !s.is_empty())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

fn record_to_properties(record: &dbase::Record, fields: &[String]) -> JsonObject {
    let mut properties = JsonObject::new();
    for name in fields {
        let value = record.get(name).map(field_to_json).unwrap_or(JsonValue::Null);
        properties.insert(name.clone(), value);
    }
    properties
}

fn field_to_json(value: &FieldValue) -> JsonValue {
    match value {
        FieldValue::Character(Some(s)) => JsonValue::from(s.trim_end()),
        FieldValue::Character(None) => JsonValue::Null,
        FieldValue::Memo(s) if s.is_empty() => JsonValue::Null,
        FieldValue::Memo(s) => JsonValue::from(s.as_str()),
        FieldValue::Numeric(Some(n)) => number(*n),
        FieldValue::Numeric(None) => JsonValue::Null,
        FieldValue::Float(Some(f)) => number(*f as f64),
        FieldValue::Float(None) => JsonValue::Null,
        FieldValue::Integer(i) => JsonValue::from(*i),
        FieldValue::Double(d) => number(*d),
        FieldValue::Currency(c) => number(*c),
        FieldValue::Logical(Some(b)) => JsonValue::from(*b),
        FieldValue::Logical(None) => JsonValue::Null,
        FieldValue::Date(Some(d)) => {
            JsonValue::from(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }
        FieldValue::Date(None) => JsonValue::Null,
        other => JsonValue::from(format!("{:?}", other)),
    }
}

/// 整数値は整数として出力
fn number(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(JsonValue::Number).unwrap_or(JsonValue::Null)
    }
}

trait ToPosition {
    fn to_position(&self) -> Position;
}

impl ToPosition for Point {
    fn to_position(&self) -> Position {
        vec![self.x, self.y]
    }
}

impl ToPosition for PointM {
    fn to_position(&self) -> Position {
        vec![self.x, self.y]
    }
}

impl ToPosition for PointZ {
    fn to_position(&self) -> Position {
        vec![self.x, self.y, self.z]
    }
}

fn positions<P: ToPosition>(points: &[P]) -> Vec<Position> {
    points.iter().map(ToPosition::to_position).collect()
}

fn lines<P: ToPosition>(parts: &[Vec<P>]) -> Value {
    match parts {
        [single] => Value::LineString(positions(single)),
        _ => Value::MultiLineString(parts.iter().map(|p| positions(p)).collect()),
    }
}

/// 内側リングは直前の外側リングに属する
fn polygons<P: ToPosition>(rings: &[PolygonRing<P>]) -> Value {
    let mut groups: Vec<Vec<Vec<Position>>> = Vec::new();

    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => groups.push(vec![positions(points)]),
            PolygonRing::Inner(points) => match groups.last_mut() {
                Some(group) => group.push(positions(points)),
                // 外側リングのない穴はそのまま外側リングとして扱う
                None => groups.push(vec![positions(points)]),
            },
        }
    }

    if groups.len() == 1 {
        Value::Polygon(groups.remove(0))
    } else {
        Value::MultiPolygon(groups)
    }
}

/// シェープを GeoJSON ジオメトリに変換（NullShape / Multipatch は None）
pub fn shape_to_geometry(shape: &Shape) -> Option<Geometry> {
    let value = match shape {
        Shape::NullShape | Shape::Multipatch(_) => return None,
        Shape::Point(p) => Value::Point(p.to_position()),
        Shape::PointM(p) => Value::Point(p.to_position()),
        Shape::PointZ(p) => Value::Point(p.to_position()),
        Shape::Multipoint(mp) => Value::MultiPoint(positions(mp.points())),
        Shape::MultipointM(mp) => Value::MultiPoint(positions(mp.points())),
        Shape::MultipointZ(mp) => Value::MultiPoint(positions(mp.points())),
        Shape::Polyline(l) => lines(l.parts()),
        Shape::PolylineM(l) => lines(l.parts()),
        Shape::PolylineZ(l) => lines(l.parts()),
        Shape::Polygon(p) => polygons(p.rings()),
        Shape::PolygonM(p) => polygons(p.rings()),
        Shape::PolygonZ(p) => polygons(p.rings()),
    };
    Some(Geometry::new(value))
}
