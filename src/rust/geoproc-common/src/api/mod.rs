//! 共通APIモジュール

pub mod handlers;
pub mod models;

use actix_web::web;

// 再エクスポート
pub use models::{ApiError, ApiResponse};

/// ルーティング定義
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::health_root))
        .route("/health", web::get().to(handlers::health))
        .route("/convert/shp", web::post().to(handlers::convert_shp))
        .route("/upload-shp", web::post().to(handlers::upload_shp))
        .route("/preview/raster", web::post().to(handlers::preview_raster))
        .route("/export/shapefile", web::post().to(handlers::export_shapefile))
        .route("/export/csv", web::post().to(handlers::export_csv))
        .route("/api/raster/export", web::get().to(handlers::export_raster))
        .route("/news", web::get().to(handlers::get_news));
}
