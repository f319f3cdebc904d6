//! 共通APIハンドラー実装

use actix_files::NamedFile;
use actix_multipart::{Field, Multipart};
use actix_web::http::header::{ContentDisposition, HeaderValue, CONTENT_TYPE};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::stream::StreamExt as _;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::models::{
    ApiError, ApiResponse, HealthResponse, MessageResponse, RasterExportQuery, RasterMeta,
    RasterPreviewResponse, ShapefileUploadResponse,
};
use crate::error::{GeoError, Result};
use crate::raster::{self, ColorScheme, PreviewRenderer};
use crate::state::AppState;
use crate::vector::{self, shp_to_geojson};

const SHP_CONVERSION_FAILED: &str = "SHP conversion failed.";
const SHP_UPLOAD_FAILED: &str = "Shapefile upload failed.";
const RASTER_PREVIEW_FAILED: &str = "Raster preview failed.";
const EXPORT_SHAPEFILE_FAILED: &str = "Export to shapefile failed.";
const EXPORT_CSV_FAILED: &str = "Export to CSV failed.";
const RASTER_EXPORT_FAILED: &str = "Raster export failed.";

/// colormap などテキストフィールドの上限
const TEXT_FIELD_LIMIT: usize = 1024;

/// アップロードされたファイル
#[derive(Debug)]
struct UploadedFile {
    filename: String,
    data: Vec<u8>,
}

/// multipart/form-data の内容
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    colormap: Option<String>,
}

impl UploadForm {
    fn require_file(self) -> Result<(UploadedFile, Option<String>)> {
        let file = self
            .file
            .ok_or_else(|| GeoError::InvalidUpload("No file uploaded.".to_string()))?;
        if file.data.is_empty() {
            return Err(GeoError::InvalidUpload("Uploaded file is empty.".to_string()));
        }
        Ok((file, self.colormap))
    }
}

/// エラーをログに出して共通エンベロープで返す
fn error_response(err: &GeoError, generic: &str) -> HttpResponse {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        error!("{}: {}", generic, err);
    } else {
        warn!("Rejected request: {}", err);
    }

    HttpResponse::build(status).json(ApiResponse::<()>::error(ApiError::from_geo_error(err, generic)))
}

/// ブロッキング処理をスレッドプールで実行
async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    web::block(f)
        .await
        .map_err(|e| GeoError::Other(format!("Blocking task failed: {}", e)))?
}

/// フィールドデータを読み取る補助関数（サイズ上限付き）
async fn read_field_data(field: &mut Field, max_size: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();

    while let Some(chunk_result) = field.next().await {
        let chunk = chunk_result.map_err(|e| {
            error!("Field chunk read error: {}", e);
            GeoError::InvalidUpload(format!("Field read error: {}", e))
        })?;
        data.extend_from_slice(&chunk);
        raster::formats::validate_size(&data, max_size)?;
    }

    debug!("Read field data: {} bytes", data.len());
    Ok(data)
}

/// multipart を読み取る（`file_fields` のいずれかをファイルとして扱う）
async fn read_multipart(mut payload: Multipart, file_fields: &[&str], max_size: usize) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field_result) = payload.next().await {
        let mut field = field_result.map_err(|e| {
            error!("Multipart field error: {}", e);
            GeoError::InvalidUpload(format!("Multipart error: {}", e))
        })?;

        let field_name = field.name().to_string();
        debug!("Processing field: {}", field_name);

        match field_name.as_str() {
            name if file_fields.contains(&name) && form.file.is_none() => {
                let filename = field
                    .content_disposition()
                    .get_filename()
                    .unwrap_or_default()
                    .to_string();
                let data = read_field_data(&mut field, max_size).await?;
                info!("File {:?} received, size: {} bytes", filename, data.len());
                form.file = Some(UploadedFile { filename, data });
            }
            "colormap" => {
                let data = read_field_data(&mut field, TEXT_FIELD_LIMIT).await?;
                let value = String::from_utf8_lossy(&data).trim().to_string();
                debug!("Colormap parameter: {}", value);
                form.colormap = Some(value).filter(|v| !v.is_empty());
            }
            _ => {
                read_field_data(&mut field, max_size).await?;
                debug!("Unknown field ignored: {}", field_name);
            }
        }
    }

    Ok(form)
}

/// GET /
pub async fn health_root() -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse {
        message: "Geoproc backend is running.".to_string(),
    })
}

/// GET /health
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        build: state.build.clone(),
        platform: std::env::consts::OS.to_string(),
        uptime_seconds: state.uptime_seconds(),
        news_sources: state.news.source_names().into_iter().map(str::to_string).collect(),
    };

    HttpResponse::Ok().json(ApiResponse::success(response))
}

/// POST /convert/shp
pub async fn convert_shp(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    info!("Processing shapefile conversion request");
    let start = Instant::now();

    let result = async {
        let (file, _) = read_multipart(payload, &["file"], state.settings.api.max_body_size)
            .await?
            .require_file()?;

        run_blocking(move || {
            let archive = vector::extract_archive(&file.data)?;
            let parts = archive.shapefile_parts()?;
            vector::read_feature_collection(&parts)
        })
        .await
    }
    .await;

    match result {
        Ok(collection) => {
            info!(
                "Converted shapefile with {} features in {}ms",
                collection.features.len(),
                start.elapsed().as_millis()
            );
            HttpResponse::Ok().json(collection)
        }
        Err(e) => error_response(&e, SHP_CONVERSION_FAILED),
    }
}

/// POST /upload-shp
pub async fn upload_shp(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    info!("Processing shapefile upload request");

    let result = async {
        let (file, _) = read_multipart(payload, &["zip_file", "file"], state.settings.api.max_body_size)
            .await?
            .require_file()?;

        if !file.filename.to_ascii_lowercase().ends_with(".zip") {
            return Err(GeoError::InvalidUpload("Only .zip files are accepted.".to_string()));
        }

        run_blocking(move || describe_upload(file)).await
    }
    .await;

    match result {
        Ok(metadata) => {
            info!("Shapefile uploaded successfully: {}", metadata.filename);
            HttpResponse::Ok().json(metadata)
        }
        Err(e) => error_response(&e, SHP_UPLOAD_FAILED),
    }
}

fn describe_upload(file: UploadedFile) -> Result<ShapefileUploadResponse> {
    let archive = vector::extract_archive(&file.data)?;

    let shp = archive
        .first_shp()?
        .ok_or_else(|| GeoError::InvalidUpload("No .shp file found in the uploaded zip.".to_string()))?;

    let mut response = ShapefileUploadResponse {
        filename: file.filename,
        files: archive.entries().to_vec(),
        shp_found: shp
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        shape_type: None,
        feature_count: None,
        fields: None,
        bbox: None,
        crs: None,
    };

    match archive.shapefile_parts() {
        Ok(parts) => {
            let summary = shp_to_geojson::read_summary(&parts.shp)?;
            let collection = vector::read_feature_collection(&parts)?;

            response.shape_type = Some(summary.shape_type);
            response.bbox = Some(summary.bbox);
            response.feature_count = Some(collection.features.len());
            response.fields = Some(shp_to_geojson::read_fields(&parts.dbf)?);
            response.crs = parts.prj.as_deref().and_then(shp_to_geojson::read_crs_name);
        }
        Err(GeoError::MissingShapefileParts) => {
            debug!("Upload {} has no .shx/.dbf; returning file listing only", response.filename);
        }
        Err(e) => return Err(e),
    }

    Ok(response)
}

/// POST /preview/raster
pub async fn preview_raster(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    info!("Processing raster preview request");

    let result = async {
        let (file, colormap) = read_multipart(payload, &["file"], state.settings.api.max_body_size)
            .await?
            .require_file()?;

        let colormap = colormap.unwrap_or_else(|| state.settings.raster.default_colormap.clone());
        let scheme = ColorScheme::from_name(&colormap)
            .ok_or_else(|| GeoError::InvalidParameter(format!("Unknown colormap: {}", colormap)))?;

        let renderer = PreviewRenderer::new(state.settings.raster.preview_max_dimension);
        let preview_dir = state.settings.storage.preview_dir();

        run_blocking(move || renderer.process(&file.data, scheme, &preview_dir)).await
    }
    .await;

    match result {
        Ok(preview) => HttpResponse::Ok().json(RasterPreviewResponse {
            meta: RasterMeta::from(&preview.raster),
            preview: state.settings.storage.preview_url(&preview.file_name),
        }),
        Err(e) => error_response(&e, RASTER_PREVIEW_FAILED),
    }
}

/// POST /export/shapefile
pub async fn export_shapefile(body: web::Bytes) -> HttpResponse {
    info!("Processing shapefile export request: {} bytes", body.len());

    let result = run_blocking(move || {
        let collection = vector::parse_geojson(&body)?;
        vector::write_shapefile(&collection)
    })
    .await;

    match result {
        Ok(export) => {
            info!(
                "Exported {} {} record(s), skipped {} feature(s)",
                export.written,
                export.shape_kind.name(),
                export.skipped
            );
            HttpResponse::Ok()
                .content_type("application/zip")
                .insert_header(ContentDisposition::attachment("exported_shapefile.zip"))
                .insert_header(("X-Skipped-Features", export.skipped.to_string()))
                .body(export.archive)
        }
        Err(e) => error_response(&e, EXPORT_SHAPEFILE_FAILED),
    }
}

/// POST /export/csv
pub async fn export_csv(body: web::Bytes) -> HttpResponse {
    info!("Processing CSV export request: {} bytes", body.len());

    let result = run_blocking(move || {
        let collection = vector::parse_geojson(&body)?;
        vector::feature_collection_to_csv(&collection)
    })
    .await;

    match result {
        Ok(csv) => HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header(ContentDisposition::attachment("exported_data.csv"))
            .body(csv),
        Err(e) => error_response(&e, EXPORT_CSV_FAILED),
    }
}

/// GET /api/raster/export
pub async fn export_raster(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<RasterExportQuery>,
) -> HttpResponse {
    info!("Processing raster export request: {:?}", query);

    let dir = PathBuf::from(&state.settings.storage.raster_export_dir);
    let export = match raster::resolve_export(&dir, &query.dataset_id, &query.format) {
        Ok(export) => export,
        Err(e) => return error_response(&e, RASTER_EXPORT_FAILED),
    };

    match NamedFile::open_async(&export.path).await {
        Ok(file) => {
            let mut response = file
                .set_content_disposition(ContentDisposition::attachment(export.file_name))
                .into_response(&req);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(raster::TIFF_MEDIA_TYPE));
            response
        }
        Err(e) => error_response(&GeoError::Io(e), RASTER_EXPORT_FAILED),
    }
}

/// GET /news
pub async fn get_news(state: web::Data<AppState>) -> HttpResponse {
    info!("Processing news request");

    let grouped = state.news.fetch_grouped().await;
    debug!("Returning news from {} source(s)", grouped.len());

    HttpResponse::Ok().json(grouped)
}
