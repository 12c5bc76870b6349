use crate::error::AppError;
use crate::naming::is_asset;
use crate::sink::AssetSink;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub struct LocalSink {
    directory: PathBuf,
}

impl LocalSink {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, AppError> {
        let directory = directory.into();
        if !directory.exists() {
            std::fs::create_dir_all(&directory)?;
            log::debug!("Created output directory: {:?}", directory);
        }
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, AppError> {
        // Names come from puzzle data; keep them inside the output directory.
        if name.contains('/') || name.contains('\\') || name == ".." {
            return Err(AppError::InvalidAssetName(name.to_string()));
        }
        Ok(self.directory.join(name))
    }
}

#[async_trait]
impl AssetSink for LocalSink {
    fn describe(&self) -> String {
        format!("local directory {}", self.directory().display())
    }

    async fn list_assets(&self) -> Result<BTreeSet<String>, AppError> {
        let mut names = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if is_asset(&name) {
                names.insert(name);
            }
        }
        log::debug!("Found {} assets in {:?}", names.len(), self.directory);
        Ok(names)
    }

    async fn read_asset(&self, name: &str) -> Result<Vec<u8>, AppError> {
        Ok(tokio::fs::read(self.path_for(name)?).await?)
    }

    async fn write_asset(&self, name: &str, bytes: Vec<u8>) -> Result<(), AppError> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, bytes).await?;
        log::trace!("Wrote {:?}", path);
        Ok(())
    }

    async fn delete_asset(&self, name: &str) -> Result<(), AppError> {
        tokio::fs::remove_file(self.path_for(name)?).await?;
        Ok(())
    }
}
