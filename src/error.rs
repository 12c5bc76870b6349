use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing configuration: {0}")]
    ConfigurationMissing(String),

    #[error("Walkdir error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("Not an image: {0}")]
    NotAnImage(String),

    #[error("Object storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Timed out waiting for {0}")]
    RenderTimeout(String),

    #[error("Tokio join error: {0}")]
    Join(#[from] JoinError),

    #[error("No panoId found in tile data")]
    MissingIdentifier,

    #[error("Invalid number for {0}")]
    InvalidNumber(&'static str),

    #[error("Unrecognized puzzle document shape: {0}")]
    UnrecognizedShape(String),

    #[error("Invalid asset name: {0}")]
    InvalidAssetName(String),

    #[error("Resource pool is closed")]
    PoolClosed,

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(e.to_string())
    }
}
