//! HTTP エンドポイントの結合テスト

use actix_web::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use actix_web::{test, web, App};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::Point;
use std::convert::TryFrom;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tiff::encoder::{colortype::Gray8, TiffEncoder};

use geoproc_common::news::NewsSource;
use geoproc_common::vector::archive::bundle_files;
use geoproc_common::{api, AppState, NewsAggregator, NewsItem, Result, Settings};

const BOUNDARY: &str = "----geoproc-test-boundary";

struct StaticSource;

#[async_trait]
impl NewsSource for StaticSource {
    fn name(&self) -> &'static str {
        "Static"
    }

    async fn fetch(&self, _client: &Client) -> Result<Vec<NewsItem>> {
        Ok(NewsItem::new("Static", "Heatwave alert", "https://example.org/heat", None, None)
            .into_iter()
            .collect())
    }
}

/// 一時ディレクトリを保存先にした設定
struct TestEnv {
    _static_dir: TempDir,
    export_dir: TempDir,
    settings: Settings,
}

impl TestEnv {
    fn new() -> Self {
        let static_dir = tempfile::tempdir().unwrap();
        let export_dir = tempfile::tempdir().unwrap();

        let mut settings = Settings::default();
        settings.storage.static_dir = static_dir.path().to_string_lossy().into_owned();
        settings.storage.raster_export_dir = export_dir.path().to_string_lossy().into_owned();
        settings.storage.ensure_dirs().unwrap();

        TestEnv { _static_dir: static_dir, export_dir, settings }
    }

    fn state(&self, sources: Vec<Box<dyn NewsSource>>) -> web::Data<AppState> {
        web::Data::new(AppState::with_news(
            self.settings.clone(),
            NewsAggregator::new(Client::new(), sources),
            "test",
        ))
    }
}

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state)
                .app_data(web::PayloadConfig::new(10 * 1024 * 1024))
                .configure(api::configure),
        )
        .await
    };
}

fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(uri: &str, body: Vec<u8>) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header((CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY)))
        .set_payload(body)
}

/// 2点のポイントシェープファイルを書き出し、構成ファイルのパスを返す
fn write_sites_shapefile(dir: &Path) -> Vec<PathBuf> {
    let shp = dir.join("sites.shp");
    let table = TableWriterBuilder::new()
        .add_character_field(FieldName::try_from("name").unwrap(), 20)
        .add_numeric_field(FieldName::try_from("elev").unwrap(), 10, 0);

    let mut writer = shapefile::Writer::from_path(&shp, table).unwrap();
    for (x, y, name, elev) in [(37.0, -0.5, "Kirinyaga", 1200.0), (34.75, 0.28, "Kakamega", 1535.0)] {
        let mut record = Record::default();
        record.insert("name".to_string(), FieldValue::Character(Some(name.to_string())));
        record.insert("elev".to_string(), FieldValue::Numeric(Some(elev)));
        writer.write_shape_and_record(&Point::new(x, y), &record).unwrap();
    }
    drop(writer);

    ["shp", "shx", "dbf"].iter().map(|ext| shp.with_extension(ext)).collect()
}

fn shapefile_zip(include_all_parts: bool) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let mut files = write_sites_shapefile(dir.path());
    if !include_all_parts {
        files.truncate(1);
    }
    bundle_files(&files).unwrap()
}

fn gray_tiff(width: u32, height: u32) -> Vec<u8> {
    let pixels: Vec<u8> = (0..width * height).map(|v| (v * 10) as u8).collect();
    let mut buf = Vec::new();
    {
        let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
        encoder.write_image::<Gray8>(width, height, &pixels).unwrap();
    }
    buf
}

fn sample_geojson() -> Value {
    json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [36.8, -1.3]},
                "properties": {"name": "Nairobi", "rain_mm": 42.5}
            },
            {
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]},
                "properties": {"name": "Road"}
            }
        ]
    })
}

#[actix_web::test]
async fn test_root_reports_running() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let req = test::TestRequest::get().uri("/").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Geoproc backend is running.");
}

#[actix_web::test]
async fn test_health_lists_news_sources() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![Box::new(StaticSource)]));

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["build"], "test");
    assert_eq!(body["data"]["news_sources"], json!(["Static"]));
}

#[actix_web::test]
async fn test_convert_shp_returns_feature_collection() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let zip = shapefile_zip(true);
    let req = multipart_request("/convert/shp", multipart_body(&[("file", Some("sites.zip"), &zip)]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["type"], "FeatureCollection");
    assert_eq!(body["features"].as_array().unwrap().len(), 2);
    assert_eq!(body["features"][0]["properties"]["name"], "Kirinyaga");
    assert_eq!(body["features"][0]["geometry"]["type"], "Point");
}

#[actix_web::test]
async fn test_convert_shp_rejects_invalid_zip() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let req = multipart_request(
        "/convert/shp",
        multipart_body(&[("file", Some("sites.zip"), b"definitely not a zip")]),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"]["message"].as_str().unwrap().contains("not a valid zip"));
}

#[actix_web::test]
async fn test_convert_shp_requires_all_parts() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let zip = shapefile_zip(false);
    let req = multipart_request("/convert/shp", multipart_body(&[("file", Some("sites.zip"), &zip)]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Missing .shp, .shx or .dbf in uploaded zip.");
}

#[actix_web::test]
async fn test_convert_shp_without_file_field() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let req = multipart_request("/convert/shp", multipart_body(&[("note", None, b"hello")])).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "No file uploaded.");
}

#[actix_web::test]
async fn test_upload_shp_describes_archive() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let zip = shapefile_zip(true);
    let req = multipart_request("/upload-shp", multipart_body(&[("zip_file", Some("sites.zip"), &zip)]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["filename"], "sites.zip");
    assert_eq!(body["shp_found"], "sites.shp");
    assert_eq!(body["feature_count"], 2);
    assert_eq!(body["fields"], json!(["name", "elev"]));
    assert_eq!(body["files"].as_array().unwrap().len(), 3);
}

#[actix_web::test]
async fn test_upload_shp_rejects_non_zip_name() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let zip = shapefile_zip(true);
    let req = multipart_request("/upload-shp", multipart_body(&[("zip_file", Some("sites.rar"), &zip)]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Only .zip files are accepted.");
}

#[actix_web::test]
async fn test_preview_raster_writes_png() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let tiff = gray_tiff(4, 3);
    let req = multipart_request(
        "/preview/raster",
        multipart_body(&[("file", Some("dem.tif"), &tiff), ("colormap", None, b"terrain")]),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["meta"]["width"], 4);
    assert_eq!(body["meta"]["height"], 3);
    assert_eq!(body["meta"]["dtype"], "uint8");
    assert_eq!(body["meta"]["bbox"], json!([0.0, 3.0, 4.0, 0.0]));

    let url = body["preview"].as_str().unwrap();
    assert!(url.starts_with("/static/previews/"));
    assert!(url.ends_with(".png"));

    let file_name = url.rsplit('/').next().unwrap();
    assert!(env.settings.storage.preview_dir().join(file_name).is_file());
}

#[actix_web::test]
async fn test_preview_raster_rejects_png_input() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    let req = multipart_request("/preview/raster", multipart_body(&[("file", Some("map.png"), png)]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Unsupported raster format: png");
}

#[actix_web::test]
async fn test_preview_raster_rejects_unknown_colormap() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let tiff = gray_tiff(2, 2);
    let req = multipart_request(
        "/preview/raster",
        multipart_body(&[("file", Some("dem.tif"), &tiff), ("colormap", None, b"rainbow")]),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn test_export_shapefile_returns_zip() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let req = test::TestRequest::post()
        .uri("/export/shapefile")
        .set_json(sample_geojson())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/zip");
    assert!(resp
        .headers()
        .get(CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("exported_shapefile.zip"));
    assert_eq!(resp.headers().get("X-Skipped-Features").unwrap(), "1");

    let body = test::read_body(resp).await;
    let archive = zip::ZipArchive::new(Cursor::new(body.to_vec())).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.iter().any(|n| n.ends_with(".shp")));
    assert!(names.iter().any(|n| n.ends_with(".dbf")));
    assert!(names.iter().any(|n| n.ends_with(".prj")));
}

#[actix_web::test]
async fn test_export_shapefile_rejects_empty_collection() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let req = test::TestRequest::post()
        .uri("/export/shapefile")
        .set_json(json!({"type": "FeatureCollection", "features": []}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn test_export_csv_returns_attachment() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let req = test::TestRequest::post()
        .uri("/export/csv")
        .set_json(sample_geojson())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert!(resp
        .headers()
        .get(CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(resp
        .headers()
        .get(CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("exported_data.csv"));

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.contains("name"));
    assert!(header.contains("geometry"));
    assert_eq!(text.lines().count(), 3);
}

#[actix_web::test]
async fn test_export_csv_rejects_invalid_json() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let req = test::TestRequest::post()
        .uri("/export/csv")
        .insert_header((CONTENT_TYPE, "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn test_raster_export_serves_file() {
    let env = TestEnv::new();
    std::fs::write(env.export_dir.path().join("rainfall.tif"), gray_tiff(2, 2)).unwrap();
    let app = init_app!(env.state(vec![]));

    let req = test::TestRequest::get()
        .uri("/api/raster/export?datasetId=rainfall&format=geotiff")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "image/tiff");
    assert!(resp
        .headers()
        .get(CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("rainfall.tif"));
}

#[actix_web::test]
async fn test_raster_export_missing_dataset() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![]));

    let req = test::TestRequest::get()
        .uri("/api/raster/export?datasetId=unknown")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Raster file not found");
}

#[actix_web::test]
async fn test_raster_export_rejects_bad_input() {
    let env = TestEnv::new();
    std::fs::write(env.export_dir.path().join("rainfall.tif"), gray_tiff(2, 2)).unwrap();
    let app = init_app!(env.state(vec![]));

    for uri in [
        "/api/raster/export?datasetId=rainfall&format=png",
        "/api/raster/export?datasetId=..%2Fsecret",
    ] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400, "{}", uri);
    }
}

#[actix_web::test]
async fn test_news_groups_by_source() {
    let env = TestEnv::new();
    let app = init_app!(env.state(vec![Box::new(StaticSource)]));

    let req = test::TestRequest::get().uri("/news").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["Static"][0]["title"], "Heatwave alert");
    assert_eq!(body["Static"][0]["link"], "https://example.org/heat");
}
