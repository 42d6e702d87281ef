//! Watermark compositing for restricted images.
//!
//! The overlay is scaled by one uniform factor so that it covers the whole
//! target, then center-cropped to the target size. Scaling each axis to
//! the target independently would distort a square overlay on any
//! non-square photo.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use super::codec::{copy_unchanged, open_image, save_jpeg};
use super::types::{ImagingError, ImagingResult, WatermarkSpec};

/// How an overlay is fitted onto a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayPlacement {
    pub scale_x: f64,
    pub scale_y: f64,
    /// Overlay size after scaling (always covers the target).
    pub scaled: (u32, u32),
    /// Offset of the crop window inside the scaled overlay.
    pub crop_origin: (u32, u32),
}

/// Uniform cover scale for an overlay of `overlay` size onto `target`.
///
/// For a square overlay this is `max(target) / side`.
pub fn overlay_scale(overlay: (u32, u32), target: (u32, u32)) -> f64 {
    let sx = f64::from(target.0) / f64::from(overlay.0.max(1));
    let sy = f64::from(target.1) / f64::from(overlay.1.max(1));
    sx.max(sy)
}

/// Plan the scale and crop for placing `overlay` on `target`.
pub fn plan_overlay(overlay: (u32, u32), target: (u32, u32)) -> OverlayPlacement {
    let scale = overlay_scale(overlay, target);
    let scaled_w = ((f64::from(overlay.0) * scale).ceil() as u32).max(target.0);
    let scaled_h = ((f64::from(overlay.1) * scale).ceil() as u32).max(target.1);

    OverlayPlacement {
        scale_x: scale,
        scale_y: scale,
        scaled: (scaled_w, scaled_h),
        crop_origin: ((scaled_w - target.0) / 2, (scaled_h - target.1) / 2),
    }
}

/// Scale and crop `overlay` to exactly `target` size.
pub fn fit_overlay(overlay: &RgbaImage, target: (u32, u32)) -> RgbaImage {
    let placement = plan_overlay(overlay.dimensions(), target);
    let scaled = imageops::resize(
        overlay,
        placement.scaled.0,
        placement.scaled.1,
        FilterType::Lanczos3,
    );
    imageops::crop_imm(
        &scaled,
        placement.crop_origin.0,
        placement.crop_origin.1,
        target.0,
        target.1,
    )
    .to_image()
}

/// Alpha-blend `overlay` (already fitted) over `base` with `opacity`.
pub fn composite(base: &DynamicImage, overlay: &RgbaImage, opacity: f64) -> DynamicImage {
    let opacity = opacity.clamp(0.0, 1.0);
    let keep_alpha = base.color().has_alpha();
    let mut out = base.to_rgba8();

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let Some(over) = overlay.get_pixel_checked(x, y) else {
            continue;
        };
        let alpha = f64::from(over[3]) / 255.0 * opacity;
        if alpha <= 0.0 {
            continue;
        }
        for c in 0..3 {
            let blended = f64::from(pixel[c]) * (1.0 - alpha) + f64::from(over[c]) * alpha;
            pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }

    if keep_alpha {
        DynamicImage::ImageRgba8(out)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(out).to_rgb8())
    }
}

/// Load an overlay asset as RGBA.
pub fn load_overlay(path: &Path) -> ImagingResult<RgbaImage> {
    let overlay = open_image(path)?.to_rgba8();
    if overlay.width() == 0 || overlay.height() == 0 {
        return Err(ImagingError::InvalidSpec(format!(
            "overlay {} is empty",
            path.display()
        )));
    }
    Ok(overlay)
}

/// Watermark the JPEG at `src` into `dst`.
///
/// Opacity 0 copies the file unchanged.
pub fn watermark_file(
    src: &Path,
    dst: &Path,
    spec: &WatermarkSpec,
    overlay: &RgbaImage,
    quality: u8,
) -> ImagingResult<()> {
    if spec.is_noop() {
        return copy_unchanged(src, dst);
    }

    let base = open_image(src)?;
    let fitted = fit_overlay(overlay, (base.width(), base.height()));
    let marked = composite(&base, &fitted, spec.opacity);
    save_jpeg(&marked, dst, quality)
}
