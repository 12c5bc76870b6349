use crate::error::AppError;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Local,
    Bucket,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub puzzles_directory: String,
    pub output_directory: String,
    pub sink: SinkKind,
    pub render_root: String,
    pub render_page: String,
    pub direct_base_url: String,
    pub maps_api_key: Option<String>,
    pub browser_pool_size: usize,
    pub screenshot_width: u32,
    pub screenshot_height: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub thumbnail_quality: u8,
    pub darkness_threshold: f32,
    pub direct_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub default_capture_date: String,
    pub bucket_prefix: String,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            puzzles_directory: "ui/public/puzzles".into(),
            output_directory: "pano/img".into(),
            sink: SinkKind::Local,
            render_root: "static".into(),
            render_page: "download.html".into(),
            direct_base_url: "https://geonections.com/pano/img/".into(),
            maps_api_key: None,
            browser_pool_size: 2,
            screenshot_width: 2400,
            screenshot_height: 1600,
            thumbnail_width: 400,
            thumbnail_height: 300,
            thumbnail_quality: 85,
            darkness_threshold: 10.0,
            direct_timeout_secs: 10,
            navigation_timeout_secs: 60,
            render_timeout_secs: 30,
            settle_delay_ms: 1000,
            default_capture_date: "2024-01".into(),
            bucket_prefix: "img/".into(),
            log_level: "info".into(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("PANO"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        if config.maps_api_key.as_deref().map_or(true, str::is_empty) {
            config.maps_api_key = std::env::var("GOOGLE_MAPS_API_KEY")
                .ok()
                .filter(|key| !key.is_empty());
        }
        Ok(config)
    }

    pub fn direct_timeout(&self) -> Duration {
        Duration::from_secs(self.direct_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Connection settings for an S3-compatible bucket. Never read from the
/// config files; only the environment carries them.
#[derive(Debug, Clone)]
pub struct BucketCredentials {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

impl BucketCredentials {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            endpoint: required_env("R2_URL")?,
            access_key_id: required_env("R2_ACCESS_KEY_ID")?,
            secret_access_key: required_env("R2_SECRET_ACCESS_KEY")?,
            bucket: required_env("R2_BUCKET_NAME")?,
        })
    }
}

fn required_env(name: &str) -> Result<String, AppError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::ConfigurationMissing(name.to_string())),
    }
}
