use crate::naming::{is_thumbnail, AssetName};
use crate::tile::Tile;
use std::collections::{BTreeSet, HashSet};

pub fn expected_assets<'a, I>(tiles: I, default_date: &str) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Tile>,
{
    let mut expected = BTreeSet::new();
    for tile in tiles {
        match AssetName::for_tile(tile, default_date) {
            Ok(name) => {
                expected.insert(name.full);
                expected.insert(name.thumb);
            }
            Err(e) => log::warn!("Could not generate filename for tile: {}", e),
        }
    }
    expected
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub missing: BTreeSet<String>,
    pub orphaned: BTreeSet<String>,
}

impl Reconciliation {
    pub fn compute(expected: &BTreeSet<String>, actual: &BTreeSet<String>) -> Self {
        Self {
            missing: expected.difference(actual).cloned().collect(),
            orphaned: actual.difference(expected).cloned().collect(),
        }
    }

    pub fn missing_full(&self) -> usize {
        self.missing.iter().filter(|n| !is_thumbnail(n)).count()
    }

    pub fn missing_thumbnails(&self) -> usize {
        self.missing.iter().filter(|n| is_thumbnail(n)).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileWork {
    /// Full image absent; fetch it and derive a fresh thumbnail.
    Download,
    /// Full image stored, thumbnail absent.
    ThumbnailOnly,
    Skip,
}

pub fn classify(name: &AssetName, stored: &HashSet<String>) -> TileWork {
    match (stored.contains(&name.full), stored.contains(&name.thumb)) {
        (false, _) => TileWork::Download,
        (true, false) => TileWork::ThumbnailOnly,
        (true, true) => TileWork::Skip,
    }
}

#[derive(Debug, Default)]
pub struct FilePlan {
    pub download: Vec<(Tile, AssetName)>,
    pub thumbnail_only: Vec<AssetName>,
    pub skipped: usize,
}

impl FilePlan {
    pub fn is_empty(&self) -> bool {
        self.download.is_empty() && self.thumbnail_only.is_empty()
    }
}

pub fn plan_file(tiles: &[Tile], stored: &HashSet<String>, default_date: &str) -> FilePlan {
    let mut plan = FilePlan::default();
    let mut seen = HashSet::new();

    for tile in tiles {
        let name = match AssetName::for_tile(tile, default_date) {
            Ok(name) => name,
            Err(e) => {
                log::warn!("Skipping tile: {} ({:?})", e, tile);
                continue;
            }
        };
        if !seen.insert(name.full.clone()) {
            log::debug!("Duplicate asset {} in the same file", name.full);
            continue;
        }
        match classify(&name, stored) {
            TileWork::Download => plan.download.push((tile.clone(), name)),
            TileWork::ThumbnailOnly => plan.thumbnail_only.push(name),
            TileWork::Skip => plan.skipped += 1,
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tile(id: &str, heading: f64) -> Tile {
        serde_json::from_value(json!({"panoId": id, "heading": heading, "extra": {"panoDate": "2022-02"}})).unwrap()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn expected_set_holds_full_and_thumb_and_ignores_bad_tiles() {
        let tiles = vec![tile("A", 1.0), Tile::default(), tile("A", 1.0)];
        let expected = expected_assets(&tiles, "2024-01");
        assert_eq!(
            expected,
            set(&["A~d2022-02~h1~p0~z0.jpg", "A~d2022-02~h1~p0~z0~thumb.jpg"])
        );
    }

    #[test]
    fn missing_and_orphaned_partition_the_difference() {
        let expected = set(&["a.jpg", "a~thumb.jpg", "b.jpg", "b~thumb.jpg"]);
        let actual = set(&["a.jpg", "b~thumb.jpg", "old.jpg"]);
        let r = Reconciliation::compute(&expected, &actual);

        assert_eq!(r.missing, set(&["a~thumb.jpg", "b.jpg"]));
        assert_eq!(r.orphaned, set(&["old.jpg"]));
        assert!(r.missing.is_disjoint(&actual));
        assert!(r.orphaned.is_disjoint(&expected));
        assert_eq!(r.missing_full(), 1);
        assert_eq!(r.missing_thumbnails(), 1);
    }

    #[test]
    fn plan_splits_download_and_thumbnail_work() {
        let tiles = vec![tile("NEW", 0.0), tile("HALF", 0.0), tile("THUMBONLY", 0.0), tile("DONE", 0.0), tile("NEW", 0.0)];
        let name = |id: &str| AssetName::for_tile(&tile(id, 0.0), "2024-01").unwrap();

        let mut stored = HashSet::new();
        stored.insert(name("HALF").thumb);
        stored.insert(name("THUMBONLY").full);
        stored.insert(name("DONE").full);
        stored.insert(name("DONE").thumb);

        let plan = plan_file(&tiles, &stored, "2024-01");
        let downloads: Vec<_> = plan.download.iter().map(|(_, n)| n.pano_id.as_str()).collect();
        assert_eq!(downloads, vec!["NEW", "HALF"]);
        assert_eq!(plan.thumbnail_only, vec![name("THUMBONLY")]);
        assert_eq!(plan.skipped, 1);
        assert!(!plan.is_empty());
    }
}
