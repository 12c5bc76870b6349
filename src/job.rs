use crate::acquire::Acquirer;
use crate::error::AppError;
use crate::naming::AssetName;
use crate::processor::{self, ThumbnailSettings};
use crate::reconcile::{expected_assets, plan_file, Reconciliation};
use crate::sink::AssetSink;
use crate::tile::Tile;
use crate::walker::PuzzleFile;
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;

const REPORT_LIMIT: usize = 10;

pub struct Pipeline {
    acquirer: Acquirer,
    sink: Arc<dyn AssetSink>,
    thumbnails: ThumbnailSettings,
    default_date: String,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub written: Vec<String>,
    pub failed_tiles: usize,
}

impl Pipeline {
    pub fn new(
        acquirer: Acquirer,
        sink: Arc<dyn AssetSink>,
        thumbnails: ThumbnailSettings,
        default_date: impl Into<String>,
    ) -> Self {
        Self {
            acquirer,
            sink,
            thumbnails,
            default_date: default_date.into(),
        }
    }

    pub async fn process_all(&self, files: &[PuzzleFile]) -> Result<RunSummary, AppError> {
        let mut stored: HashSet<String> = self.sink.list_assets().await?.into_iter().collect();
        log::info!("Found {} existing assets in {}", stored.len(), self.sink.describe());

        let mut summary = RunSummary::default();
        for file in files {
            self.process_file(file, &mut stored, &mut summary).await;
        }
        Ok(summary)
    }

    /// Per-tile errors are logged and counted; they never stop the file.
    pub async fn process_file(
        &self,
        file: &PuzzleFile,
        stored: &mut HashSet<String>,
        summary: &mut RunSummary,
    ) {
        let name = file.name();
        log::info!("Processing {} ({} tiles)", name, file.tiles.len());
        if file.tiles.is_empty() {
            log::info!("No tiles found in {}", name);
            return;
        }

        let plan = plan_file(&file.tiles, stored, &self.default_date);
        if plan.is_empty() {
            log::info!("All images already exist for {}", name);
            return;
        }
        let before = summary.written.len();

        if !plan.download.is_empty() {
            log::info!("Need to download {} images from {}", plan.download.len(), name);
            let total = plan.download.len();
            for (i, (tile, asset)) in plan.download.iter().enumerate() {
                log::info!("  [{}/{}] Processing {}", i + 1, total, asset.pano_id);
                match self.download(tile, asset).await {
                    Ok(names) => {
                        stored.extend(names.iter().cloned());
                        summary.written.extend(names);
                    }
                    Err(e) => {
                        log::warn!("Tile {} left unprocessed: {}", asset.pano_id, e);
                        summary.failed_tiles += 1;
                    }
                }
            }
        }

        if !plan.thumbnail_only.is_empty() {
            log::info!(
                "Generating {} thumbnails from existing full images...",
                plan.thumbnail_only.len()
            );
            let (written, failed) = self.regenerate_thumbnails(&plan.thumbnail_only).await;
            stored.extend(written.iter().cloned());
            summary.written.extend(written);
            summary.failed_tiles += failed;
        }

        log::info!("Processed {} images from {}", summary.written.len() - before, name);
    }

    /// Both tiers for one tile, then full image and thumbnail to the sink.
    pub async fn download(&self, tile: &Tile, asset: &AssetName) -> Result<Vec<String>, AppError> {
        let acquired = self
            .acquirer
            .acquire(tile, asset)
            .await
            .ok_or_else(|| AppError::NotFound(format!("no tier produced {}", asset.full)))?;

        self.sink.write_asset(&asset.full, acquired.rendition.full).await?;
        self.sink.write_asset(&asset.thumb, acquired.rendition.thumb).await?;
        log::debug!("Stored {} via {} tier", asset.full, acquired.tier);
        Ok(vec![asset.full.clone(), asset.thumb.clone()])
    }

    async fn regenerate_thumbnails(&self, assets: &[AssetName]) -> (Vec<String>, usize) {
        let mut failed = 0;
        let mut sources = Vec::with_capacity(assets.len());
        for asset in assets {
            match self.sink.read_asset(&asset.full).await {
                Ok(bytes) => sources.push((asset.thumb.clone(), bytes)),
                Err(e) => {
                    log::warn!("Could not read {} for thumbnail: {}", asset.full, e);
                    failed += 1;
                }
            }
        }

        let settings = self.thumbnails;
        let results = match tokio::task::spawn_blocking(move || {
            processor::regenerate_thumbnails(sources, settings)
        })
        .await
        {
            Ok(results) => results,
            Err(e) => {
                log::error!("Thumbnail regeneration failed: {}", e);
                return (Vec::new(), assets.len());
            }
        };

        let total = results.len();
        let mut written = Vec::new();
        for (i, (thumb, result)) in results.into_iter().enumerate() {
            let outcome = match result {
                Ok(bytes) => self.sink.write_asset(&thumb, bytes).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    log::info!("  [{}/{}] Generated: {}", i + 1, total, thumb);
                    written.push(thumb);
                }
                Err(e) => {
                    log::warn!("  [{}/{}] Error generating {}: {}", i + 1, total, thumb, e);
                    failed += 1;
                }
            }
        }
        (written, failed)
    }
}

/// Fetches one tile through `direct` when given. `fallback` starts the
/// browser tier and is only called when that fails.
pub async fn download_single<F, Fut>(
    direct: Option<&Pipeline>,
    tile: &Tile,
    asset: &AssetName,
    fallback: F,
) -> Result<Vec<String>, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<String>, AppError>>,
{
    if let Some(pipeline) = direct {
        match pipeline.download(tile, asset).await {
            Ok(written) => return Ok(written),
            Err(e) => log::info!("Direct download failed for {} ({}), starting browser", asset.pano_id, e),
        }
    }
    fallback().await
}

#[derive(Debug)]
pub struct DryRunReport {
    pub total_tiles: usize,
    pub expected: usize,
    pub actual: usize,
    pub reconciliation: Reconciliation,
}

pub fn dry_run(files: &[PuzzleFile], stored: &BTreeSet<String>, default_date: &str) -> DryRunReport {
    let expected = expected_assets(files.iter().flat_map(|f| f.tiles.iter()), default_date);
    DryRunReport {
        total_tiles: files.iter().map(|f| f.tiles.len()).sum(),
        expected: expected.len(),
        actual: stored.len(),
        reconciliation: Reconciliation::compute(&expected, stored),
    }
}

impl DryRunReport {
    pub fn log(&self) {
        let r = &self.reconciliation;
        log::info!("Found {} expected files from {} tiles", self.expected, self.total_tiles);
        log::info!("Found {} actual JPG files", self.actual);
        log::info!("Missing files: {}", r.missing.len());
        log::info!("  - Full images: {}", r.missing_full());
        log::info!("  - Thumbnails: {}", r.missing_thumbnails());
        log::info!("Orphaned files: {}", r.orphaned.len());
        log_sample("missing", &r.missing);
        log_sample("orphaned", &r.orphaned);
    }
}

fn log_sample(label: &str, names: &BTreeSet<String>) {
    if names.is_empty() {
        return;
    }
    log::info!("First {} {} files:", REPORT_LIMIT.min(names.len()), label);
    for (i, name) in names.iter().take(REPORT_LIMIT).enumerate() {
        log::info!("  {:2}. {}", i + 1, name);
    }
    if names.len() > REPORT_LIMIT {
        log::info!("  ... and {} more", names.len() - REPORT_LIMIT);
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub orphaned: usize,
    pub deleted: usize,
}

/// Deletes stored assets no tile refers to. `confirm` sees the orphan list
/// and decides whether anything is removed.
pub async fn prune<F>(
    sink: &dyn AssetSink,
    files: &[PuzzleFile],
    default_date: &str,
    confirm: F,
) -> Result<PruneOutcome, AppError>
where
    F: FnOnce(&[String]) -> bool,
{
    let expected = expected_assets(files.iter().flat_map(|f| f.tiles.iter()), default_date);
    log::info!("Found {} expected files", expected.len());
    let stored = sink.list_assets().await?;
    log::info!("Found {} actual JPG files", stored.len());

    let orphaned: Vec<String> = Reconciliation::compute(&expected, &stored)
        .orphaned
        .into_iter()
        .collect();
    if orphaned.is_empty() {
        log::info!("No orphaned files found!");
        return Ok(PruneOutcome::default());
    }

    log::info!("Found {} orphaned files:", orphaned.len());
    for (i, name) in orphaned.iter().enumerate() {
        log::info!("  {:3}. {}", i + 1, name);
    }

    let mut outcome = PruneOutcome {
        orphaned: orphaned.len(),
        deleted: 0,
    };
    if !confirm(&orphaned) {
        log::info!("No files deleted");
        return Ok(outcome);
    }

    for name in &orphaned {
        match sink.delete_asset(name).await {
            Ok(()) => {
                log::info!("Deleted: {}", name);
                outcome.deleted += 1;
            }
            Err(e) => log::warn!("Error deleting {}: {}", name, e),
        }
    }
    log::info!("Deleted {} orphaned files", outcome.deleted);
    Ok(outcome)
}
