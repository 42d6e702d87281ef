//! Decoding and encoding helpers shared by the image steps.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage};

use super::types::{ImagingError, ImagingResult};
use crate::storage::atomic_write;

/// Decode any supported image file.
pub fn open_image(path: &Path) -> ImagingResult<DynamicImage> {
    image::open(path).map_err(|e| ImagingError::decode(path, e))
}

/// Bits per channel of a decoded image.
pub fn bits_per_channel(img: &DynamicImage) -> u16 {
    let color = img.color();
    color.bits_per_pixel() / u16::from(color.channel_count().max(1))
}

/// Encode `img` as a baseline JPEG at `quality` and write it atomically.
///
/// JPEG has no alpha and no 16-bit mode, so the pixels are reduced to
/// 8-bit gray or RGB first.
pub fn save_jpeg(img: &DynamicImage, path: &Path, quality: u8) -> ImagingResult<()> {
    let flattened = match img.color() {
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16 => {
            DynamicImage::ImageLuma8(img.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    };

    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    flattened
        .write_with_encoder(encoder)
        .map_err(|e| ImagingError::encode(path, e))?;

    atomic_write(path, buffer.get_ref()).map_err(|e| ImagingError::io(path, e))
}

/// Decode `src` and write it as a JPEG at `dst`.
pub fn convert_to_jpeg(src: &Path, dst: &Path, quality: u8) -> ImagingResult<()> {
    let img = open_image(src)?;
    save_jpeg(&img, dst, quality)
}

/// Byte-identical copy, creating the destination directory if needed.
pub fn copy_unchanged(src: &Path, dst: &Path) -> ImagingResult<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| ImagingError::io(parent, e))?;
    }
    fs::copy(src, dst).map_err(|e| ImagingError::io(src, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::tempdir;

    #[test]
    fn jpeg_round_trip_keeps_dimensions() {
        let dir = tempdir().unwrap();
        let png = dir.path().join("in.png");
        RgbImage::from_pixel(40, 30, Rgb([200, 10, 10]))
            .save(&png)
            .unwrap();

        let jpg = dir.path().join("out.jpg");
        convert_to_jpeg(&png, &jpg, 90).unwrap();

        let decoded = open_image(&jpg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
        assert!(!dir.path().join("out.jpg.tmp").exists());
    }

    #[test]
    fn alpha_is_flattened_for_jpeg() {
        let dir = tempdir().unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 128])));
        let jpg = dir.path().join("alpha.jpg");
        save_jpeg(&img, &jpg, 80).unwrap();
        assert_eq!(open_image(&jpg).unwrap().color(), ColorType::Rgb8);
    }

    #[test]
    fn bits_per_channel_reports_depth() {
        let img8 = DynamicImage::new_rgb8(2, 2);
        let img16 = DynamicImage::new_rgb16(2, 2);
        assert_eq!(bits_per_channel(&img8), 8);
        assert_eq!(bits_per_channel(&img16), 16);
    }

    #[test]
    fn decode_error_names_the_file() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("bogus.tif");
        fs::write(&bogus, b"not an image").unwrap();
        let err = open_image(&bogus).unwrap_err();
        assert!(err.to_string().contains("bogus.tif"));
    }
}
