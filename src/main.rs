use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use chatroom_server::{configure, AppError, AppState, Settings};
use chatroom_server::config::CorsConfig;
use dotenv::dotenv;
use std::net::TcpListener;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn build_cors(config: &CorsConfig) -> Cors {
    let cors = if config.allows_any_origin() {
        Cors::default().allow_any_origin()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec!["Authorization", "Content-Type"])
        .max_age(config.max_age as usize)
}

#[actix_web::main]
async fn main() -> chatroom_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new()?;
    info!("Configuration loaded successfully ({})", config.environment);

    let state = web::Data::new(AppState::new(config.clone()));

    let sweep_secs = config.auth.session_sweep_interval_secs;
    if sweep_secs > 0 {
        let sweep_state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs));
            loop {
                interval.tick().await;
                if let Err(e) = sweep_state.auth_service.purge_expired_sessions().await {
                    error!("Session sweep failed: {}", e);
                }
            }
        });
        info!("Expired sessions are swept every {}s", sweep_secs);
    }

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    info!(
        "Server listening on http://{}:{} (websocket at /ws)",
        config.server.host, config.server.port
    );

    let cors_config = config.cors.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_config))
            .app_data(state.clone())
            .configure(configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
