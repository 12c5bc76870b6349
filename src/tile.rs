// src/tile.rs

use crate::error::AppError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One requested panorama capture as it appears in a puzzle file.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    #[serde(default)]
    pub pano_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub heading: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pitch: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub zoom: Option<f64>,
    #[serde(default)]
    pub extra: Option<TileExtra>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TileExtra {
    #[serde(default)]
    pub pano_id: Option<String>,
    #[serde(default)]
    pub pano_date: Option<String>,
}

impl Tile {
    pub fn pano_id(&self) -> Option<&str> {
        non_empty(self.pano_id.as_deref())
            .or_else(|| non_empty(self.extra.as_ref().and_then(|e| e.pano_id.as_deref())))
    }

    /// `None` when the record has no `extra.panoDate` at all; `Some("")` is
    /// preserved so callers can tell an explicitly blank date apart.
    pub fn capture_date(&self) -> Option<&str> {
        self.extra.as_ref().and_then(|e| e.pano_date.as_deref())
    }

    pub fn heading(&self) -> f64 {
        self.heading.unwrap_or(0.0)
    }

    pub fn pitch(&self) -> f64 {
        self.pitch.unwrap_or(0.0)
    }

    /// Zoom as written in the puzzle, for rendering the view.
    pub fn view_zoom(&self) -> f64 {
        self.zoom.filter(|z| z.is_finite()).unwrap_or(0.0)
    }

    /// Whole zoom level used in asset names.
    pub fn zoom(&self) -> i64 {
        self.zoom.filter(|z| z.is_finite()).map_or(0, |z| z.trunc() as i64)
    }

    /// Matches either the top-level or the nested identifier.
    pub fn has_pano_id(&self, pano_id: &str) -> bool {
        self.pano_id.as_deref() == Some(pano_id)
            || self.extra.as_ref().and_then(|e| e.pano_id.as_deref()) == Some(pano_id)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Numeric>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Numeric::Number(n)) => Ok(Some(n)),
        Some(Numeric::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Recognized top-level layouts of a puzzle file, tried in this order.
#[derive(Debug)]
pub enum PuzzleDocument {
    Bare(Vec<Value>),
    CustomCoordinates(Vec<Value>),
    Tiles(Vec<Value>),
    Data(Vec<Value>),
}

impl PuzzleDocument {
    const KEYS: [&'static str; 3] = ["customCoordinates", "tiles", "data"];

    pub fn from_value(value: Value) -> Result<Self, AppError> {
        let mut map = match value {
            Value::Array(records) => return Ok(PuzzleDocument::Bare(records)),
            Value::Object(map) => map,
            other => return Err(AppError::UnrecognizedShape(describe(&other).into())),
        };

        for key in Self::KEYS {
            let Some(inner) = map.remove(key) else {
                continue;
            };
            let records = match inner {
                Value::Array(records) => records,
                other => {
                    return Err(AppError::UnrecognizedShape(format!(
                        "\"{}\" holds {} instead of an array",
                        key,
                        describe(&other)
                    )))
                }
            };
            return Ok(match key {
                "customCoordinates" => PuzzleDocument::CustomCoordinates(records),
                "tiles" => PuzzleDocument::Tiles(records),
                _ => PuzzleDocument::Data(records),
            });
        }

        Err(AppError::UnrecognizedShape(format!(
            "object without any of {:?}",
            Self::KEYS
        )))
    }

    pub fn into_records(self) -> Vec<Value> {
        match self {
            PuzzleDocument::Bare(r)
            | PuzzleDocument::CustomCoordinates(r)
            | PuzzleDocument::Tiles(r)
            | PuzzleDocument::Data(r) => r,
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn parse_document(value: Value) -> Result<Vec<Tile>, AppError> {
    let records = PuzzleDocument::from_value(value)?.into_records();
    let mut tiles = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<Tile>(record) {
            Ok(tile) => tiles.push(tile),
            Err(e) => log::warn!("Skipping malformed tile #{}: {}", index, e),
        }
    }
    Ok(tiles)
}
