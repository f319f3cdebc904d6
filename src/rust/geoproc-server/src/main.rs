//! geoproc サーバー

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use geoproc_common::config::{ApiConfig, LoggingConfig};
use geoproc_common::{api, AppState, Settings, VERSION};

mod platform;

const BUILD_NUMBER: &str = env!("BUILD_NUMBER");
const GIT_HASH: &str = env!("GIT_HASH");
const BUILD_TIME: &str = env!("BUILD_TIME");
const BUILD_PROFILE: &str = env!("BUILD_PROFILE");

/// ログ初期化
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level: {}", config.level))?;

    if config.output == "file" {
        let path = config.resolved_file_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}

/// 設定されたオリジンからCORSを構築
fn build_cors(config: &ApiConfig) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

    if config.cors_origins.iter().any(|o| o == "*") {
        return cors.allow_any_origin();
    }

    config
        .cors_origins
        .iter()
        .fold(cors.supports_credentials(), |cors, origin| cors.allowed_origin(origin))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::new().context("failed to load configuration")?;
    init_logging(&settings.logging)?;

    info!("geoproc server starting (version {}, build #{}, {})", VERSION, BUILD_NUMBER, GIT_HASH);
    info!("Built {} ({} profile)", BUILD_TIME, BUILD_PROFILE);
    info!("Platform: {} ({} CPUs)", std::env::consts::OS, platform::cpu_count());

    settings.validate()?;
    info!("Configuration validated successfully");

    settings.storage.ensure_dirs()?;
    info!(
        "Serving previews from {} and raster exports from {}",
        settings.storage.preview_dir().display(),
        settings.storage.raster_export_dir
    );

    let state = web::Data::new(AppState::new(settings.clone(), BUILD_NUMBER)?);
    info!("News sources: {:?}", state.news.source_names());

    let bind_address = format!("{}:{}", settings.server.host, settings.server.port);
    let api_config = settings.api.clone();
    let static_dir = settings.storage.static_dir.clone();

    let shutdown_receiver = platform::setup_shutdown_handler()?;

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(api_config.max_body_size))
            .wrap(middleware::Logger::default())
            .wrap(build_cors(&api_config))
            .configure(api::configure)
            .service(Files::new("/static", &static_dir))
    })
    .client_request_timeout(Duration::from_secs(settings.server.request_timeout_secs));

    if let Some(workers) = settings.server.workers {
        server = server.workers(workers);
    }

    let server = server
        .bind(&bind_address)
        .with_context(|| format!("failed to bind {}", bind_address))?
        .run();

    info!("Server running at http://{}", bind_address);

    let server_handle = server.handle();

    let shutdown_task = async move {
        shutdown_receiver.wait().await;
        info!("Shutdown signal received, stopping server...");
        server_handle.stop(true).await;
        info!("Server stopped");
    };

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_task => {
            info!("Shutdown completed");
        }
    }

    Ok(())
}
