use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Json,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub token_expiry_hours: i64,
    /// Zero disables the background sweep; expiry is then purely lazy.
    pub session_sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSocketConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub websocket: WebSocketConfig,
}

fn with_defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("environment", environment)?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 4000)?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("storage.backend", "json")?
        .set_default("storage.data_dir", "data")?
        .set_default("auth.token_expiry_hours", 24)?
        .set_default("auth.session_sweep_interval_secs", 0)?
        .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
        .set_default("cors.max_age", 3600)?
        .set_default("websocket.heartbeat_interval_secs", 5)?
        .set_default("websocket.client_timeout_secs", 10)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        with_defaults("development")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            // Plain `PORT` wins over everything else, as hosting platforms expect.
            .set_override_option("server.port", env::var("PORT").ok())?
            .build()?
            .try_deserialize()
    }

    /// Settings for tests: in-memory storage and no file or environment sources.
    pub fn for_test() -> Result<Self, ConfigError> {
        with_defaults("test")?
            .set_override("storage.backend", "memory")?
            .set_override("server.port", 0)?
            .set_override("server.workers", 1)?
            .set_override("cors.allowed_origins", vec!["*"])?
            .build()?
            .try_deserialize()
    }
}
