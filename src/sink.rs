use crate::error::AppError;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Where finished assets live. Names are canonical asset names; each sink
/// maps them onto its own layout.
#[async_trait]
pub trait AssetSink: Send + Sync {
    fn describe(&self) -> String;
    async fn list_assets(&self) -> Result<BTreeSet<String>, AppError>;
    async fn read_asset(&self, name: &str) -> Result<Vec<u8>, AppError>;
    async fn write_asset(&self, name: &str, bytes: Vec<u8>) -> Result<(), AppError>;
    async fn delete_asset(&self, name: &str) -> Result<(), AppError>;
}
