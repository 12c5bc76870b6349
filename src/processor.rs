use crate::config::AppConfig;
use crate::error::AppError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use rayon::prelude::*;
use std::io::Cursor;

#[derive(Debug, Clone, Copy)]
pub struct ThumbnailSettings {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl From<&AppConfig> for ThumbnailSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            width: config.thumbnail_width,
            height: config.thumbnail_height,
            quality: config.thumbnail_quality,
        }
    }
}

/// A fetched image and everything derived from it, ready for the sink.
#[derive(Debug, Clone)]
pub struct Rendition {
    pub full: Vec<u8>,
    pub thumb: Vec<u8>,
    pub brightness: f32,
}

pub fn derive(bytes: Vec<u8>, settings: ThumbnailSettings) -> Result<Rendition, AppError> {
    let image = image::load_from_memory(&bytes)?;
    log::trace!("Decoded {}x{} image", image.width(), image.height());
    let brightness = average_brightness(&image);
    let thumb = encode_thumbnail(&image, settings)?;
    Ok(Rendition {
        full: bytes,
        thumb,
        brightness,
    })
}

pub fn make_thumbnail(bytes: &[u8], settings: ThumbnailSettings) -> Result<Vec<u8>, AppError> {
    let image = image::load_from_memory(bytes)?;
    encode_thumbnail(&image, settings)
}

fn encode_thumbnail(image: &DynamicImage, settings: ThumbnailSettings) -> Result<Vec<u8>, AppError> {
    let thumbnail = image.resize_exact(settings.width, settings.height, FilterType::Lanczos3);
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(thumbnail.to_rgb8())
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, settings.quality))?;
    Ok(out.into_inner())
}

/// Mean of the 8-bit luma channel, 0.0 (black) to 255.0 (white).
pub fn average_brightness(image: &DynamicImage) -> f32 {
    let luma = image.to_luma8();
    let count = luma.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let total: u64 = luma.as_raw().iter().map(|&v| v as u64).sum();
    (total as f64 / count as f64) as f32
}

/// Regenerates thumbnails for a batch of stored full images in parallel.
/// Results keep the input order and carry their own errors.
pub fn regenerate_thumbnails(
    items: Vec<(String, Vec<u8>)>,
    settings: ThumbnailSettings,
) -> Vec<(String, Result<Vec<u8>, AppError>)> {
    log::debug!("Regenerating {} thumbnails", items.len());
    items
        .into_par_iter()
        .map(|(name, bytes)| {
            let thumb = make_thumbnail(&bytes, settings);
            (name, thumb)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    pub(crate) fn jpeg(width: u32, height: u32, value: u8) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([value, value, value]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 90))
            .unwrap();
        out.into_inner()
    }

    fn settings() -> ThumbnailSettings {
        ThumbnailSettings { width: 400, height: 300, quality: 85 }
    }

    #[test]
    fn derive_keeps_original_and_resizes_thumbnail() {
        let bytes = jpeg(1200, 800, 200);
        let rendition = derive(bytes.clone(), settings()).unwrap();
        assert_eq!(rendition.full, bytes);

        let thumb = image::load_from_memory(&rendition.thumb).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (400, 300));
        assert!(rendition.brightness > 150.0);
    }

    #[test]
    fn dark_images_have_low_brightness() {
        let rendition = derive(jpeg(64, 64, 0), settings()).unwrap();
        assert!(rendition.brightness < 10.0, "{}", rendition.brightness);
    }

    #[test]
    fn garbage_bytes_are_an_image_error() {
        let err = derive(b"<html>not found</html>".to_vec(), settings()).unwrap_err();
        assert!(matches!(err, AppError::Image(_)));
    }

    #[test]
    fn batch_regeneration_reports_per_item() {
        let items = vec![
            ("a.jpg".to_string(), jpeg(800, 600, 128)),
            ("b.jpg".to_string(), b"broken".to_vec()),
        ];
        let results = regenerate_thumbnails(items, settings());
        assert_eq!(results[0].0, "a.jpg");
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }
}
