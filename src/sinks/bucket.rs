use crate::config::BucketCredentials;
use crate::error::AppError;
use crate::naming::is_asset;
use crate::sink::AssetSink;
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct BucketSink {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl BucketSink {
    pub fn new(credentials: &BucketCredentials, prefix: &str) -> Result<Self, AppError> {
        let store = AmazonS3Builder::new()
            .with_endpoint(&credentials.endpoint)
            .with_access_key_id(&credentials.access_key_id)
            .with_secret_access_key(&credentials.secret_access_key)
            .with_bucket_name(&credentials.bucket)
            .with_region("auto")
            .build()?;
        log::info!("Using bucket {} at {}", credentials.bucket, credentials.endpoint);
        Ok(Self::with_store(Arc::new(store), &credentials.bucket, prefix))
    }

    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: &str, prefix: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// `parse` keeps characters such as `~` verbatim instead of
    /// percent-encoding them the way `ObjectPath::from` would.
    fn key(&self, name: &str) -> Result<ObjectPath, AppError> {
        let raw = if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        };
        ObjectPath::parse(&raw).map_err(|_| AppError::InvalidAssetName(name.to_string()))
    }
}

#[async_trait]
impl AssetSink for BucketSink {
    fn describe(&self) -> String {
        format!("bucket {} under {}/", self.bucket, self.prefix)
    }

    async fn list_assets(&self) -> Result<BTreeSet<String>, AppError> {
        let root = ObjectPath::parse(&self.prefix)
            .map_err(|_| AppError::InvalidAssetName(self.prefix.clone()))?;
        let prefix = (!self.prefix.is_empty()).then_some(&root);
        let objects: Vec<_> = self.store.list(prefix).try_collect().await?;

        let names: BTreeSet<String> = objects
            .iter()
            .filter_map(|meta| {
                let relative = meta.location.prefix_match(&root)?;
                let parts: Vec<_> = relative.collect();
                // Only direct children of the prefix are assets.
                match parts.as_slice() {
                    [name] => Some(AsRef::<str>::as_ref(name).to_string()),
                    _ => None,
                }
            })
            .filter(|name| is_asset(name))
            .collect();
        log::debug!("Found {} assets in bucket {}", names.len(), self.bucket);
        Ok(names)
    }

    async fn read_asset(&self, name: &str) -> Result<Vec<u8>, AppError> {
        let bytes = self.store.get(&self.key(name)?).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn write_asset(&self, name: &str, bytes: Vec<u8>) -> Result<(), AppError> {
        let content_type = mime_guess::from_path(name).first_or_octet_stream();
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.essence_str().to_string().into());
        let mut options = PutOptions::default();
        options.attributes = attributes;

        let key = self.key(name)?;
        self.store
            .put_opts(&key, PutPayload::from(bytes), options)
            .await?;
        log::debug!("Uploaded {} ({})", key, content_type);
        Ok(())
    }

    async fn delete_asset(&self, name: &str) -> Result<(), AppError> {
        self.store.delete(&self.key(name)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn sink() -> (Arc<InMemory>, BucketSink) {
        let store = Arc::new(InMemory::new());
        let sink = BucketSink::with_store(store.clone(), "assets", "img/");
        (store, sink)
    }

    #[tokio::test]
    async fn uploads_under_prefix_with_jpeg_content_type() {
        let (store, sink) = sink();
        sink.write_asset("P~d2024-01~h0~p0~z0.jpg", vec![9, 9]).await.unwrap();

        let result = store
            .get(&ObjectPath::parse("img/P~d2024-01~h0~p0~z0.jpg").unwrap())
            .await
            .unwrap();
        assert_eq!(
            result.attributes.get(&Attribute::ContentType).map(|v| AsRef::<str>::as_ref(v)),
            Some("image/jpeg")
        );
        assert_eq!(result.bytes().await.unwrap().to_vec(), vec![9, 9]);
    }

    #[tokio::test]
    async fn listing_only_returns_assets_directly_under_prefix() {
        let (store, sink) = sink();
        sink.write_asset("a.jpg", vec![1]).await.unwrap();
        sink.write_asset("a~thumb.jpg", vec![1]).await.unwrap();
        store.put(&ObjectPath::from("img/notes.txt"), PutPayload::from(vec![1])).await.unwrap();
        store.put(&ObjectPath::from("img/old/b.jpg"), PutPayload::from(vec![1])).await.unwrap();
        store.put(&ObjectPath::from("other/c.jpg"), PutPayload::from(vec![1])).await.unwrap();

        let names: Vec<_> = sink.list_assets().await.unwrap().into_iter().collect();
        assert_eq!(names, vec!["a.jpg", "a~thumb.jpg"]);

        assert_eq!(sink.read_asset("a.jpg").await.unwrap(), vec![1]);
        sink.delete_asset("a.jpg").await.unwrap();
        assert_eq!(sink.list_assets().await.unwrap().len(), 1);
    }
}
