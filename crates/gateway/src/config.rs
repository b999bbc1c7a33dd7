use std::path::PathBuf;

use common::config::{Environment, LogLevel};
use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub uploads_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub label_map_path: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
}

#[derive(Deserialize, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model_id: String,
    pub api_key: String,
}

#[derive(Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub remote: RemoteConfig,
    pub log_level: LogLevel,
    pub environment: Environment,
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("app.host", "0.0.0.0")?
        .set_default("app.port", 8000)?
        .set_default("app.uploads_dir", "uploads")?
        .set_default("app.checkpoint_path", "ssd_attention.safetensors")?
        .set_default("remote.base_url", "https://detect.roboflow.com")?
        .set_default("remote.model_id", "leaf-hole/1")?
        .set_default("remote.api_key", "")?
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    Ok(config)
}
