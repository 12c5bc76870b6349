//! Canonical asset names.
//!
//! Every stored image is identified only by its name:
//! `{panoId}~d{date}~h{heading}~p{pitch}~z{zoom}.jpg`, with the thumbnail
//! at the same name plus `~thumb` before the extension.

use crate::error::AppError;
use crate::tile::Tile;

const EXTENSION: &str = ".jpg";
const THUMB_SUFFIX: &str = "~thumb.jpg";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetName {
    pub pano_id: String,
    pub full: String,
    pub thumb: String,
}

impl AssetName {
    pub fn for_tile(tile: &Tile, default_date: &str) -> Result<Self, AppError> {
        let pano_id = tile.pano_id().ok_or(AppError::MissingIdentifier)?;

        let date = match tile.capture_date() {
            Some(date) if !date.is_empty() => date,
            Some(_) => {
                log::warn!("No panoDate found for {}, using {}", pano_id, default_date);
                default_date
            }
            None => default_date,
        };

        let heading = finite(tile.heading(), "heading")?;
        let pitch = finite(tile.pitch(), "pitch")?;

        let full = format!(
            "{}~d{}~h{}~p{}~z{}{}",
            pano_id,
            date,
            round_number(heading),
            round_number(pitch),
            tile.zoom(),
            EXTENSION
        );
        Ok(Self {
            pano_id: pano_id.to_string(),
            thumb: thumbnail_name(&full),
            full,
        })
    }
}

fn finite(value: f64, field: &'static str) -> Result<f64, AppError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AppError::InvalidNumber(field))
    }
}

/// Rounds to two decimals and drops trailing zeros.
///
/// The formatter rounds the exact binary value half to even, so `0.015`
/// (stored just below the tie) becomes `0.01`.
pub fn round_number(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        _ => trimmed.to_string(),
    }
}

pub fn thumbnail_name(full: &str) -> String {
    match full.strip_suffix(EXTENSION) {
        Some(stem) => format!("{}{}", stem, THUMB_SUFFIX),
        None => format!("{}{}", full, THUMB_SUFFIX),
    }
}

pub fn is_thumbnail(name: &str) -> bool {
    name.ends_with(THUMB_SUFFIX)
}

pub fn is_asset(name: &str) -> bool {
    name.ends_with(EXTENSION)
}
