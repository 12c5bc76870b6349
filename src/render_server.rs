use actix_web::dev::ServerHandle;
use actix_web::{middleware, App, HttpServer};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Static file server on a loopback port, used to host the panorama render
/// page for the browser tier.
pub struct RenderServer {
    addr: SocketAddr,
    handle: ServerHandle,
    task: tokio::task::JoinHandle<()>,
}

impl RenderServer {
    pub async fn start(root: &Path) -> std::io::Result<Self> {
        let root: PathBuf = root.to_path_buf();
        log::debug!("Serving render files from {:?}", root);

        let server = HttpServer::new(move || {
            App::new()
                .wrap(middleware::Logger::new("%r %s").log_target("render_server"))
                .service(actix_files::Files::new("/", root.clone()))
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))?;

        let addr = server
            .addrs()
            .first()
            .copied()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no bound address"))?;

        let server = server.run();
        let handle = server.handle();
        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                log::error!("Render server error: {}", e);
            }
        });

        Ok(Self { addr, handle, task })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}/", self.addr))?.join(path)
    }

    /// Checks that `page` is served. Failures are reported, not fatal.
    pub async fn probe(&self, page: &str) -> bool {
        let url = match self.url(page) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Render page path {:?} is not a valid URL: {}", page, e);
                return false;
            }
        };
        let client = match reqwest::Client::builder().timeout(Duration::from_secs(5)).build() {
            Ok(client) => client,
            Err(e) => {
                log::warn!("Render server test failed: {}", e);
                return false;
            }
        };
        match client.get(url.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                log::info!("Render server is responding correctly at {}", url);
                true
            }
            Ok(response) => {
                log::warn!("Render server returned status {} for {}", response.status(), url);
                false
            }
            Err(e) => {
                log::warn!("Render server test failed: {}", e);
                false
            }
        }
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
        if let Err(e) = self.task.await {
            log::debug!("Render server task ended abnormally: {}", e);
        }
        log::debug!("Render server on port {} stopped", self.addr.port());
    }
}
