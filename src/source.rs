use crate::error::AppError;
use crate::naming::AssetName;
use crate::tile::Tile;
use async_trait::async_trait;

/// One way of obtaining the raw image bytes for a tile.
#[async_trait]
pub trait ImageSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, tile: &Tile, asset: &AssetName) -> Result<Vec<u8>, AppError>;
}
