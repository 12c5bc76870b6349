mod acquire;
mod config;
mod error;
mod job;
mod naming;
mod pool;
mod processor;
mod reconcile;
mod render_server;
mod sink;
mod sinks;
mod source;
mod sources;
mod tile;
mod walker;

use crate::acquire::Acquirer;
use crate::config::{AppConfig, BucketCredentials, SinkKind};
use crate::error::AppError;
use crate::job::Pipeline;
use crate::naming::AssetName;
use crate::processor::ThumbnailSettings;
use crate::render_server::RenderServer;
use crate::sink::AssetSink;
use crate::source::ImageSource;
use crate::sinks::{bucket::BucketSink, local::LocalSink};
use crate::sources::browser::{BrowserSource, RenderSettings};
use crate::sources::direct::DirectSource;
use crate::walker::PuzzleFile;
use anyhow::Result;
use clap::Parser;
use log::info;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Download panorama images referenced by puzzle files, trying a direct
/// download first and a rendered screenshot second.
#[derive(Parser, Debug)]
#[command(name = "pano_fetcher", version)]
struct Cli {
    /// Skip direct download, use the browser method only
    #[arg(long)]
    no_direct: bool,

    /// Show what would be downloaded without downloading
    #[arg(long, group = "mode")]
    dry_run: bool,

    /// Interactive orphan cleanup
    #[arg(long, group = "mode")]
    prune: bool,

    /// Non-interactive orphan cleanup
    #[arg(long, group = "mode")]
    delete_orphans: bool,

    /// Process a single pano ID
    #[arg(long, group = "mode", value_name = "PANO_ID")]
    single: Option<String>,

    /// Process only this puzzle file, by name or number (`3` for `3.json`)
    #[arg(long, value_name = "NAME", conflicts_with_all = ["prune", "delete_orphans"])]
    puzzle: Option<String>,

    /// Where images are stored (overrides the configured sink)
    #[arg(long, value_enum)]
    sink: Option<SinkKind>,

    /// Directory holding the puzzle JSON files
    #[arg(long)]
    puzzles: Option<PathBuf>,

    /// Output directory for the local sink
    #[arg(long)]
    output: Option<PathBuf>,
}

fn build_sink(config: &AppConfig) -> Result<Arc<dyn AssetSink>, AppError> {
    Ok(match config.sink {
        SinkKind::Local => Arc::new(LocalSink::new(&config.output_directory)?),
        SinkKind::Bucket => Arc::new(BucketSink::new(
            &BucketCredentials::from_env()?,
            &config.bucket_prefix,
        )?),
    })
}

fn ask(prompt: &str) -> String {
    print!("{}", prompt);
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if let Err(e) = std::io::stdin().read_line(&mut answer) {
        log::warn!("Could not read answer: {}", e);
    }
    answer.trim().to_string()
}

fn resolve_api_key(config: &AppConfig) -> Result<String, AppError> {
    if let Some(key) = config.maps_api_key.clone() {
        return Ok(key);
    }
    let key = ask("Enter your Google Maps API key: ");
    if key.is_empty() {
        return Err(AppError::ConfigurationMissing("GOOGLE_MAPS_API_KEY".into()));
    }
    Ok(key)
}

/// Render server plus browser pool, started only when a tile needs them.
struct BrowserSession {
    server: RenderServer,
    browser: Arc<BrowserSource>,
}

impl BrowserSession {
    async fn start(config: &AppConfig, pool_size: usize) -> Result<Self, AppError> {
        let api_key = resolve_api_key(config)?;
        let server = RenderServer::start(Path::new(&config.render_root)).await?;
        info!("Started render server on port {}", server.port());
        server.probe(&config.render_page).await;

        let page_url = match server.url(&config.render_page) {
            Ok(url) => url,
            Err(e) => {
                server.stop().await;
                return Err(e.into());
            }
        };
        let settings = RenderSettings::new(config, page_url, api_key);
        match BrowserSource::launch(config, pool_size, settings).await {
            Ok(browser) => {
                info!("Using {} concurrent browser instances", pool_size);
                Ok(Self {
                    server,
                    browser: Arc::new(browser),
                })
            }
            Err(e) => {
                server.stop().await;
                Err(e)
            }
        }
    }

    fn source(&self) -> Arc<dyn ImageSource> {
        self.browser.clone()
    }

    async fn shutdown(self) {
        match Arc::try_unwrap(self.browser) {
            Ok(browser) => browser.close().await,
            Err(_) => log::warn!("Browser pool still referenced at shutdown"),
        }
        self.server.stop().await;
    }
}

async fn run_downloads(
    config: &AppConfig,
    sink: Arc<dyn AssetSink>,
    files: &[PuzzleFile],
    single: Option<&str>,
    skip_direct: bool,
) -> Result<()> {
    let started = Instant::now();
    if skip_direct {
        info!("Direct download disabled - using browser method only");
    }

    let thumbnails = ThumbnailSettings::from(config);
    let direct: Option<Arc<dyn ImageSource>> = if skip_direct {
        None
    } else {
        let source = DirectSource::new(&config.direct_base_url, config.direct_timeout())?;
        Some(Arc::new(source) as Arc<dyn ImageSource>)
    };
    let acquirer = || Acquirer::new(thumbnails, config.darkness_threshold);
    let pipeline = |acquirer: Acquirer| {
        Pipeline::new(acquirer, sink.clone(), thumbnails, config.default_capture_date.as_str())
    };

    let written = match single {
        Some(id) => {
            let tile = walker::find_tile(files, id)
                .ok_or_else(|| AppError::NotFound(format!("Pano ID {} not found in any JSON files", id)))?;
            info!("Found tile data: {:?}", tile);
            let asset = AssetName::for_tile(tile, &config.default_capture_date)?;
            let asset_ref = &asset;

            let direct_only = direct.map(|d| pipeline(acquirer().with_direct(d)));
            let written = job::download_single(direct_only.as_ref(), tile, &asset, move || async move {
                let session = BrowserSession::start(config, 1).await?;
                let result = pipeline(acquirer().with_browser(session.source()))
                    .download(tile, asset_ref)
                    .await;
                session.shutdown().await;
                result
            })
            .await?;
            info!("Successfully downloaded: {:?}", written);
            written.len()
        }
        None => {
            let session = BrowserSession::start(config, config.browser_pool_size).await?;
            let mut both = acquirer().with_browser(session.source());
            if let Some(direct) = direct {
                both = both.with_direct(direct);
            }
            let outcome = pipeline(both).process_all(files).await;
            session.shutdown().await;

            let summary = outcome?;
            if summary.failed_tiles > 0 {
                log::warn!("{} tiles could not be processed", summary.failed_tiles);
            }
            summary.written.len()
        }
    };

    let total = sink.list_assets().await.map(|s| s.len()).unwrap_or_default();
    info!("Download complete!");
    info!("New images written: {}", written);
    info!("Total images: {}", total);
    info!("Total time: {:.1}s", started.elapsed().as_secs_f64());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::new()?;
    if let Some(sink) = cli.sink {
        config.sink = sink;
    }
    if let Some(dir) = &cli.puzzles {
        config.puzzles_directory = dir.to_string_lossy().to_string();
    }
    if let Some(dir) = &cli.output {
        config.output_directory = dir.to_string_lossy().to_string();
    }

    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .filter_module("chromiumoxide", log::LevelFilter::Warn)
        .init();

    info!("Starting pano_fetcher");

    let sink = build_sink(&config)?;
    info!("Storing images in {}", sink.describe());

    let puzzles = Path::new(&config.puzzles_directory);
    let files = match &cli.puzzle {
        Some(name) => vec![walker::load_named(puzzles, name)?],
        None => walker::load_all(puzzles)?,
    };
    if files.is_empty() {
        log::warn!("No *.json files found in {}", config.puzzles_directory);
        return Ok(());
    }

    if cli.dry_run {
        info!("DRY RUN - No images will be downloaded");
        let stored = sink.list_assets().await?;
        job::dry_run(&files, &stored, &config.default_capture_date).log();
    } else if cli.prune || cli.delete_orphans {
        let force = cli.delete_orphans;
        job::prune(sink.as_ref(), &files, &config.default_capture_date, |orphans| {
            if force {
                return true;
            }
            let answer = ask(&format!(
                "These {} files are not referenced by any JSON files.\nDo you want to delete them? (y/N): ",
                orphans.len()
            ));
            matches!(answer.to_lowercase().as_str(), "y" | "yes")
        })
        .await?;
    } else {
        run_downloads(&config, sink, &files, cli.single.as_deref(), cli.no_direct).await?;
    }

    info!("pano_fetcher finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn mode_flags_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["pano_fetcher", "--dry-run", "--prune"]).is_err());
        let cli = Cli::try_parse_from(["pano_fetcher", "--single", "ABC", "--no-direct", "--sink", "bucket"]).unwrap();
        assert_eq!(cli.single.as_deref(), Some("ABC"));
        assert!(cli.no_direct);
        assert_eq!(cli.sink, Some(SinkKind::Bucket));

        let cli = Cli::try_parse_from(["pano_fetcher", "--puzzle", "3", "--dry-run"]).unwrap();
        assert_eq!(cli.puzzle.as_deref(), Some("3"));
        assert!(cli.dry_run);
        assert!(Cli::try_parse_from(["pano_fetcher", "--puzzle", "3", "--prune"]).is_err());
        assert!(Cli::try_parse_from(["pano_fetcher", "--puzzle", "3", "--delete-orphans"]).is_err());
    }
}
