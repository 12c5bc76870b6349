use crate::error::AppError;
use crate::tile::{parse_document, Tile};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct PuzzleFile {
    pub path: PathBuf,
    pub tiles: Vec<Tile>,
}

impl PuzzleFile {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

pub fn discover_puzzle_files(directory: &Path) -> Result<Vec<PathBuf>, AppError> {
    log::info!("Starting puzzle discovery in {:?}", directory);

    let mut files = Vec::new();
    for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            log::trace!("Skipping non-file entry: {:?}", entry.path());
            continue;
        }
        let path = entry.path();
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => {
                log::debug!("Discovered puzzle file: {:?}", path);
                files.push(path.to_path_buf());
            }
            _ => log::trace!("Skipping non-JSON file: {:?}", path),
        }
    }

    files.sort();
    log::info!("Found {} puzzle JSON files.", files.len());
    Ok(files)
}

pub fn load_puzzle_file(path: &Path) -> Result<PuzzleFile, AppError> {
    let contents = std::fs::read(path)?;
    let value: serde_json::Value = serde_json::from_slice(&contents)?;
    let tiles = parse_document(value)?;
    log::debug!("{:?}: {} tiles", path, tiles.len());
    Ok(PuzzleFile {
        path: path.to_path_buf(),
        tiles,
    })
}

/// Loads every puzzle file; files that cannot be read or parsed are logged
/// and left out.
pub fn load_all(directory: &Path) -> Result<Vec<PuzzleFile>, AppError> {
    let mut loaded = Vec::new();
    for path in discover_puzzle_files(directory)? {
        match load_puzzle_file(&path) {
            Ok(file) => loaded.push(file),
            Err(e) => log::error!("Error reading {:?}: {}", path, e),
        }
    }
    Ok(loaded)
}

/// Loads the one puzzle file whose stem is `name`, so `3` selects `3.json`.
pub fn load_named(directory: &Path, name: &str) -> Result<PuzzleFile, AppError> {
    let stem = name.strip_suffix(".json").unwrap_or(name);
    let path = discover_puzzle_files(directory)?
        .into_iter()
        .find(|p| p.file_stem().and_then(|s| s.to_str()) == Some(stem))
        .ok_or_else(|| AppError::NotFound(format!("{}.json not found in {:?}", stem, directory)))?;
    load_puzzle_file(&path)
}

pub fn find_tile<'a>(files: &'a [PuzzleFile], pano_id: &str) -> Option<&'a Tile> {
    files
        .iter()
        .flat_map(|f| f.tiles.iter())
        .find(|t| t.has_pano_id(pano_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn discovers_only_top_level_json_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.json", "[]");
        write(dir.path(), "a.JSON", "[]");
        write(dir.path(), "notes.txt", "x");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write(&dir.path().join("nested"), "c.json", "[]");

        let files = discover_puzzle_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.JSON", "b.json"]);
    }

    #[test]
    fn bad_files_are_skipped_and_tiles_can_be_found() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.json", r#"{"customCoordinates": [{"extra": {"panoId": "P1"}}]}"#);
        write(dir.path(), "broken.json", "{not json");
        write(dir.path(), "odd.json", r#"{"locations": []}"#);

        let files = load_all(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name(), "good.json");
        assert!(find_tile(&files, "P1").is_some());
        assert!(find_tile(&files, "P2").is_none());
    }

    #[test]
    fn a_single_puzzle_file_can_be_selected_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "3.json", r#"[{"panoId": "THREE"}]"#);
        write(dir.path(), "13.json", r#"[{"panoId": "THIRTEEN"}]"#);

        let file = load_named(dir.path(), "3").unwrap();
        assert_eq!(file.name(), "3.json");
        assert_eq!(file.tiles.len(), 1);
        assert!(file.tiles[0].has_pano_id("THREE"));

        assert_eq!(load_named(dir.path(), "13.json").unwrap().name(), "13.json");
        assert!(matches!(load_named(dir.path(), "4"), Err(AppError::NotFound(_))));
    }
}
