//! Two-tier acquisition: direct fetch, then browser render.
//!
//! A tier succeeds only when its bytes decode and a thumbnail can be
//! derived from them. Any error fails the tier and the next one is tried;
//! nothing is retried within a tier.

use crate::error::AppError;
use crate::naming::AssetName;
use crate::processor::{self, Rendition, ThumbnailSettings};
use crate::source::ImageSource;
use crate::tile::Tile;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Direct,
    Browser,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Direct => write!(f, "direct"),
            Tier::Browser => write!(f, "browser"),
        }
    }
}

#[derive(Debug)]
pub struct Acquired {
    pub tier: Tier,
    pub rendition: Rendition,
}

pub struct Acquirer {
    direct: Option<Arc<dyn ImageSource>>,
    browser: Option<Arc<dyn ImageSource>>,
    thumbnails: ThumbnailSettings,
    darkness_threshold: f32,
}

impl Acquirer {
    pub fn new(thumbnails: ThumbnailSettings, darkness_threshold: f32) -> Self {
        Self {
            direct: None,
            browser: None,
            thumbnails,
            darkness_threshold,
        }
    }

    pub fn with_direct(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.direct = Some(source);
        self
    }

    pub fn with_browser(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.browser = Some(source);
        self
    }

    pub async fn acquire(&self, tile: &Tile, asset: &AssetName) -> Option<Acquired> {
        if let Some(direct) = &self.direct {
            match self.attempt(direct.as_ref(), tile, asset).await {
                Ok(rendition) => {
                    log::info!("Direct download: {} + {}", asset.full, asset.thumb);
                    return Some(Acquired { tier: Tier::Direct, rendition });
                }
                Err(e) => log::warn!("No {} download for {}: {}", direct.name(), asset.pano_id, e),
            }
        } else {
            log::debug!("Skipping direct download for {}", asset.pano_id);
        }

        let Some(browser) = &self.browser else {
            log::debug!("No browser fallback configured for {}", asset.pano_id);
            return None;
        };
        log::info!("Falling back to {} render for {}", browser.name(), asset.pano_id);
        match self.attempt(browser.as_ref(), tile, asset).await {
            Ok(rendition) => {
                if rendition.brightness < self.darkness_threshold {
                    log::warn!(
                        "Screenshot appears to be black/dark for {} (avg brightness: {:.1})",
                        asset.pano_id,
                        rendition.brightness
                    );
                }
                log::info!("Rendered: {} + {}", asset.full, asset.thumb);
                Some(Acquired { tier: Tier::Browser, rendition })
            }
            Err(e) => {
                log::error!("Failed to acquire {} via {}: {}", asset.pano_id, browser.name(), e);
                None
            }
        }
    }

    async fn attempt(
        &self,
        source: &dyn ImageSource,
        tile: &Tile,
        asset: &AssetName,
    ) -> Result<Rendition, AppError> {
        let bytes = source.fetch(tile, asset).await?;
        let settings = self.thumbnails;
        tokio::task::spawn_blocking(move || processor::derive(bytes, settings)).await?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::processor::tests::jpeg;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted source that counts how often it was asked.
    pub(crate) struct FakeSource {
        pub calls: AtomicUsize,
        respond: Box<dyn Fn() -> Result<Vec<u8>, AppError> + Send + Sync>,
    }

    impl FakeSource {
        pub(crate) fn new(respond: impl Fn() -> Result<Vec<u8>, AppError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                respond: Box::new(respond),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch(&self, _tile: &Tile, _asset: &AssetName) -> Result<Vec<u8>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.respond)()
        }
    }

    pub(crate) fn settings() -> ThumbnailSettings {
        ThumbnailSettings { width: 40, height: 30, quality: 85 }
    }

    fn scenario() -> (Tile, AssetName) {
        let tile: Tile = serde_json::from_value(json!({"panoId": "ABC123", "heading": 90, "pitch": 0, "zoom": 1, "extra": {"panoDate": "2023-05"}})).unwrap();
        let asset = AssetName::for_tile(&tile, "2024-01").unwrap();
        (tile, asset)
    }

    #[tokio::test]
    async fn direct_success_never_touches_the_browser() {
        let direct = FakeSource::new(|| Ok(jpeg(80, 60, 120)));
        let browser = FakeSource::new(|| Ok(jpeg(80, 60, 120)));
        let acquirer = Acquirer::new(settings(), 10.0)
            .with_direct(direct.clone())
            .with_browser(browser.clone());

        let (tile, asset) = scenario();
        let acquired = acquirer.acquire(&tile, &asset).await.unwrap();
        assert_eq!(acquired.tier, Tier::Direct);
        assert_eq!(direct.calls(), 1);
        assert_eq!(browser.calls(), 0);
    }

    #[tokio::test]
    async fn not_found_falls_back_once_then_fails() {
        let direct = FakeSource::new(|| Err(AppError::UnexpectedStatus(404)));
        let browser = FakeSource::new(|| Err(AppError::RenderTimeout("navigation".into())));
        let acquirer = Acquirer::new(settings(), 10.0)
            .with_direct(direct.clone())
            .with_browser(browser.clone());

        let (tile, asset) = scenario();
        assert!(acquirer.acquire(&tile, &asset).await.is_none());
        assert_eq!(direct.calls(), 1);
        assert_eq!(browser.calls(), 1);
    }

    #[tokio::test]
    async fn undecodable_direct_bytes_fall_through() {
        let direct = FakeSource::new(|| Ok(b"<html>".to_vec()));
        let browser = FakeSource::new(|| Ok(jpeg(80, 60, 0)));
        let acquirer = Acquirer::new(settings(), 10.0)
            .with_direct(direct.clone())
            .with_browser(browser.clone());

        let (tile, asset) = scenario();
        let acquired = acquirer.acquire(&tile, &asset).await.unwrap();
        assert_eq!(acquired.tier, Tier::Browser);
        // A dark capture is still a success.
        assert!(acquired.rendition.brightness < 10.0);
        let thumb = image::load_from_memory(&acquired.rendition.thumb).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (40, 30));
    }

    #[tokio::test]
    async fn without_direct_only_the_browser_is_used() {
        let browser = FakeSource::new(|| Ok(jpeg(80, 60, 200)));
        let acquirer = Acquirer::new(settings(), 10.0).with_browser(browser.clone());

        let (tile, asset) = scenario();
        assert_eq!(acquirer.acquire(&tile, &asset).await.unwrap().tier, Tier::Browser);
        assert_eq!(browser.calls(), 1);

        let nothing = Acquirer::new(settings(), 10.0);
        assert!(nothing.acquire(&tile, &asset).await.is_none());
    }
}
