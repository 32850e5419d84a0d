pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod rooms;
pub mod websocket;

use std::sync::Arc;
use actix_web::{web, HttpResponse};
use tracing::{info, warn};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::Settings;

pub use auth::AuthService;
pub use db::{DbOperations, DocumentStore, JsonFileStore, MemoryStore};
pub use rooms::RoomRegistry;
pub use websocket::Gateway;

use crate::config::StorageBackend;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Registers every route of the service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health_check))
        .route("/api/register", web::post().to(auth::handlers::register))
        .route("/api/login", web::post().to(auth::handlers::login))
        .route("/api/me", web::get().to(auth::handlers::me))
        .route("/api/rooms/{room_id}", web::get().to(rooms::handlers::get_room_history))
        .route("/ws", web::get().to(websocket::websocket_route));
}

/// Body errors (wrong content type, unparseable or mistyped JSON) use the
/// same JSON error shape as every other failure.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        warn!("Rejected request body: {}", err);
        AppError::ValidationError("Missing fields".into()).into()
    })
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth_service: Arc<AuthService>,
    pub rooms: Arc<RoomRegistry>,
    pub gateway: Arc<Gateway>,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        let store: Arc<dyn DocumentStore> = match config.storage.backend {
            StorageBackend::Json => {
                info!("Using JSON file storage in {}", config.storage.data_dir.display());
                Arc::new(JsonFileStore::new(config.storage.data_dir.clone()))
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage");
                Arc::new(MemoryStore::new())
            }
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: Settings, store: Arc<dyn DocumentStore>) -> Self {
        let db = DbOperations::new(store);
        let auth_service = Arc::new(AuthService::new(db.clone(), config.auth.token_expiry_hours));
        let rooms = Arc::new(RoomRegistry::new(db));
        let gateway = Arc::new(Gateway::new(auth_service.clone(), rooms.clone()));

        Self {
            config: Arc::new(config),
            auth_service,
            rooms,
            gateway,
        }
    }
}
