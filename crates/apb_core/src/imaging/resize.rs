//! Bounded, aspect-preserving resize.

use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;

use super::codec::{copy_unchanged, open_image, save_jpeg};
use super::types::{ImagingError, ImagingResult, ResizeSpec};

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// Already within bounds; copied byte for byte.
    Unchanged { width: u32, height: u32 },
    Resized { from: (u32, u32), to: (u32, u32) },
}

/// Output dimensions for a `width` x `height` image bounded by `max_dimension`.
///
/// The longer side becomes exactly `max_dimension`; the shorter side is
/// scaled by the same factor and rounded. Images already inside the bound
/// keep their size.
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let long = width.max(height);
    if long <= max_dimension || max_dimension == 0 {
        return (width, height);
    }

    let scale_short = |short: u32| -> u32 {
        let scaled = (u64::from(short) * u64::from(max_dimension) + u64::from(long) / 2)
            / u64::from(long);
        (scaled as u32).max(1)
    };

    if width >= height {
        (max_dimension, scale_short(height))
    } else {
        (scale_short(width), max_dimension)
    }
}

/// Resize `img` to fit `spec`. Returns `None` when no resize is needed.
pub fn resize_image(img: &DynamicImage, spec: ResizeSpec) -> Option<DynamicImage> {
    let (width, height) = (img.width(), img.height());
    let (new_width, new_height) = bounded_dimensions(width, height, spec.max_dimension);
    if (new_width, new_height) == (width, height) {
        return None;
    }
    Some(img.resize_exact(new_width, new_height, FilterType::Lanczos3))
}

/// Resize the JPEG at `src` into `dst`.
pub fn resize_file(
    src: &Path,
    dst: &Path,
    spec: ResizeSpec,
    quality: u8,
) -> ImagingResult<ResizeOutcome> {
    if spec.max_dimension == 0 {
        return Err(ImagingError::InvalidSpec(
            "max_dimension must be positive".to_string(),
        ));
    }

    let img = open_image(src)?;
    let from = (img.width(), img.height());

    match resize_image(&img, spec) {
        None => {
            copy_unchanged(src, dst)?;
            Ok(ResizeOutcome::Unchanged {
                width: from.0,
                height: from.1,
            })
        }
        Some(resized) => {
            let to = (resized.width(), resized.height());
            save_jpeg(&resized, dst, quality)?;
            Ok(ResizeOutcome::Resized { from, to })
        }
    }
}
