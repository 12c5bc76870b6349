use crate::config::AppConfig;
use crate::error::AppError;
use crate::naming::AssetName;
use crate::pool::Pool;
use crate::source::ImageSource;
use crate::tile::Tile;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use url::Url;

const PANO_SELECTOR: &str = "#pano";
const LOADED_FLAG: &str = "window.panoLoaded === true";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const CHROME_ARGS: [&str; 5] = [
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor",
    "--memory-pressure-off",
];

/// A launched browser together with the task driving its CDP connection.
pub struct BrowserInstance {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserInstance {
    async fn launch(width: u32, height: u32) -> Result<Self, AppError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .args(CHROME_ARGS)
            .build()
            .map_err(AppError::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::trace!("Browser handler event error: {}", e);
                }
            }
        });
        Ok(Self { browser, handler })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            log::warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            log::debug!("Browser process wait failed: {}", e);
        }
        self.handler.abort();
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub page_url: Url,
    pub api_key: String,
    pub navigation_timeout: Duration,
    pub render_timeout: Duration,
    pub settle_delay: Duration,
}

impl RenderSettings {
    pub fn new(config: &AppConfig, page_url: Url, api_key: String) -> Self {
        Self {
            page_url,
            api_key,
            navigation_timeout: config.navigation_timeout(),
            render_timeout: config.render_timeout(),
            settle_delay: config.settle_delay(),
        }
    }

    pub fn url_for(&self, tile: &Tile, asset: &AssetName) -> Url {
        let mut url = self.page_url.clone();
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("heading", &tile.heading().to_string())
            .append_pair("pitch", &tile.pitch().to_string())
            .append_pair("zoom", &tile.view_zoom().to_string())
            .append_pair("pano", &asset.pano_id);
        url
    }
}

/// Renders the panorama in a pooled headless browser and screenshots it.
pub struct BrowserSource {
    pool: Pool<BrowserInstance>,
    settings: RenderSettings,
}

impl BrowserSource {
    pub async fn launch(config: &AppConfig, pool_size: usize, settings: RenderSettings) -> Result<Self, AppError> {
        log::info!("Launching {} browser instances", pool_size);
        let mut instances = Vec::with_capacity(pool_size);
        for _ in 0..pool_size.max(1) {
            match BrowserInstance::launch(config.screenshot_width, config.screenshot_height).await {
                Ok(instance) => instances.push(instance),
                Err(e) => {
                    for instance in instances {
                        instance.close().await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self {
            pool: Pool::new(instances),
            settings,
        })
    }

    pub async fn close(self) {
        log::debug!("Closing {} browser instances", self.pool.size());
        let instances = self.pool.into_items();
        for instance in instances {
            instance.close().await;
        }
    }

    async fn navigate(&self, page: &Page, url: &Url) -> Result<(), AppError> {
        let navigation = async {
            page.goto(url.as_str()).await?;
            page.wait_for_navigation().await?;
            Ok::<(), AppError>(())
        };
        match timeout(self.settings.navigation_timeout, navigation).await {
            Ok(result) => result,
            Err(_) => Err(AppError::RenderTimeout("navigation".into())),
        }
    }

    async fn capture(&self, page: &Page, pano_id: &str) -> Result<Vec<u8>, AppError> {
        let element = wait_for_element(page, PANO_SELECTOR, self.settings.render_timeout).await?;

        match wait_for_flag(page, LOADED_FLAG, self.settings.render_timeout).await {
            Ok(()) => sleep(self.settings.settle_delay).await,
            Err(e) => log::warn!("Panorama may not have loaded properly for {}: {}", pano_id, e),
        }

        Ok(element.screenshot(CaptureScreenshotFormat::Jpeg).await?)
    }
}

async fn wait_for_element(page: &Page, selector: &str, limit: Duration) -> Result<Element, AppError> {
    let deadline = Instant::now() + limit;
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(element);
        }
        if Instant::now() >= deadline {
            return Err(AppError::RenderTimeout(format!("selector {}", selector)));
        }
        sleep(POLL_INTERVAL).await;
    }
}

async fn wait_for_flag(page: &Page, expression: &str, limit: Duration) -> Result<(), AppError> {
    let deadline = Instant::now() + limit;
    loop {
        let ready = page
            .evaluate(expression)
            .await
            .ok()
            .and_then(|result| result.into_value::<bool>().ok())
            .unwrap_or(false);
        if ready {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(AppError::RenderTimeout(expression.to_string()));
        }
        sleep(POLL_INTERVAL).await;
    }
}

#[async_trait]
impl ImageSource for BrowserSource {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch(&self, tile: &Tile, asset: &AssetName) -> Result<Vec<u8>, AppError> {
        let url = self.settings.url_for(tile, asset);
        let instance = self.pool.acquire().await?;
        log::debug!("Rendering {} ({} browsers idle)", asset.pano_id, self.pool.available());

        let page = match timeout(self.settings.navigation_timeout, instance.browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(AppError::RenderTimeout(format!("new page for {}", asset.pano_id))),
        };

        let result = match self.navigate(&page, &url).await {
            Ok(()) => self.capture(&page, &asset.pano_id).await,
            Err(e) => {
                log::warn!("Navigation failed for {}: {}", asset.pano_id, e);
                Err(e)
            }
        };
        if let Err(e) = page.close().await {
            log::warn!("Failed to close page for {}: {}", asset.pano_id, e);
        }
        instance.release();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_url_carries_tile_parameters() {
        let settings = RenderSettings::new(
            &AppConfig::default(),
            Url::parse("http://127.0.0.1:4000/download.html").unwrap(),
            "secret".into(),
        );
        let tile: Tile = serde_json::from_value(json!({"extra": {"panoId": "P 1"}, "heading": 12.5, "pitch": -3, "zoom": 1.7})).unwrap();
        let asset = AssetName::for_tile(&tile, "2024-01").unwrap();

        let url = settings.url_for(&tile, &asset);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("key".into(), "secret".into()),
                ("heading".into(), "12.5".into()),
                ("pitch".into(), "-3".into()),
                ("zoom".into(), "1.7".into()),
                ("pano".into(), "P 1".into()),
            ]
        );
        assert_eq!(url.path(), "/download.html");
        assert!(asset.full.ends_with("~z1.jpg"));
        assert_eq!(settings.navigation_timeout, Duration::from_secs(60));
        assert_eq!(settings.render_timeout, Duration::from_secs(30));
    }
}
