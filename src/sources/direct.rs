use crate::error::AppError;
use crate::naming::AssetName;
use crate::source::ImageSource;
use crate::tile::Tile;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Fetches pre-rendered images straight from the asset host.
pub struct DirectSource {
    client: Client,
    base: Url,
}

impl DirectSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn url_for(&self, asset: &AssetName) -> Result<Url, AppError> {
        Ok(self.base.join(&asset.full)?)
    }
}

fn is_image(content_type: &str) -> bool {
    content_type
        .parse::<mime::Mime>()
        .map(|m| m.type_() == mime::IMAGE)
        .unwrap_or(false)
}

#[async_trait]
impl ImageSource for DirectSource {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn fetch(&self, _tile: &Tile, asset: &AssetName) -> Result<Vec<u8>, AppError> {
        let url = self.url_for(asset)?;
        log::info!("Trying direct download: {}", url);

        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(AppError::UnexpectedStatus(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_image(&content_type) {
            return Err(AppError::NotAnImage(content_type));
        }

        let bytes = response.bytes().await?;
        log::debug!("Direct download of {} returned {} bytes", asset.full, bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::tests::jpeg;
    use crate::render_server::RenderServer;
    use serde_json::json;

    fn asset(id: &str) -> (Tile, AssetName) {
        let tile: Tile = serde_json::from_value(json!({"panoId": id, "heading": 90, "zoom": 1, "extra": {"panoDate": "2023-05"}})).unwrap();
        let name = AssetName::for_tile(&tile, "2024-01").unwrap();
        (tile, name)
    }

    #[test]
    fn content_type_must_be_an_image() {
        assert!(is_image("image/jpeg"));
        assert!(is_image("image/png; charset=binary"));
        assert!(!is_image("text/html; charset=utf-8"));
        assert!(!is_image(""));
    }

    #[test]
    fn url_is_built_from_the_asset_name() {
        let source = DirectSource::new("https://example.com/pano/img", Duration::from_secs(1)).unwrap();
        let (_, name) = asset("ABC123");
        assert_eq!(
            source.url_for(&name).unwrap().as_str(),
            "https://example.com/pano/img/ABC123~d2023-05~h90~p0~z1.jpg"
        );
        assert_eq!(source.name(), "direct");
    }

    #[tokio::test]
    async fn fetches_from_a_live_server() {
        let root = tempfile::tempdir().unwrap();
        let img = root.path().join("pano/img");
        std::fs::create_dir_all(&img).unwrap();
        let (tile, found) = asset("FOUND");
        std::fs::write(img.join(&found.full), jpeg(32, 32, 100)).unwrap();

        let server = RenderServer::start(root.path()).await.unwrap();
        let source = DirectSource::new(&server.url("pano/img/").unwrap().to_string(), Duration::from_secs(5)).unwrap();

        let bytes = source.fetch(&tile, &found).await.unwrap();
        assert_eq!(bytes, jpeg(32, 32, 100));

        let (_, missing) = asset("MISSING");
        let err = source.fetch(&tile, &missing).await.unwrap_err();
        assert!(matches!(err, AppError::UnexpectedStatus(404)), "{err}");

        server.stop().await;
    }
}
