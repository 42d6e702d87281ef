//! Bit-depth normalization for TIFF masters.
//!
//! Scans arrive as 16-bit TIFFs. Downstream tools expect 8 bits per
//! channel, but the reduction must not reset the print resolution:
//! XResolution, YResolution and ResolutionUnit are read from the source
//! and written into the converted file.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use image::DynamicImage;
use tiff::decoder::ifd::Value;
use tiff::decoder::Decoder;
use tiff::encoder::{colortype, Rational, TiffEncoder};
use tiff::tags::{ResolutionUnit, Tag};

use super::codec::{bits_per_channel, copy_unchanged, open_image};
use super::types::{ImagingError, ImagingResult};
use crate::storage::atomic_write;

/// Print resolution as stored in TIFF tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub x: (u32, u32),
    pub y: (u32, u32),
    /// Raw ResolutionUnit value (1 = none, 2 = inch, 3 = centimeter).
    pub unit: u16,
}

impl Resolution {
    /// Horizontal resolution as a float, for logging.
    pub fn x_value(&self) -> f64 {
        rational_value(self.x)
    }

    /// Vertical resolution as a float, for logging.
    pub fn y_value(&self) -> f64 {
        rational_value(self.y)
    }
}

fn rational_value((n, d): (u32, u32)) -> f64 {
    if d == 0 {
        0.0
    } else {
        f64::from(n) / f64::from(d)
    }
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq)]
pub enum DepthOutcome {
    /// Already 8-bit; copied byte for byte.
    Copied,
    /// Reduced to 8 bits per channel.
    Converted {
        from_bits: u16,
        resolution: Option<Resolution>,
    },
}

/// Read the resolution tags of a TIFF file. `None` when the tags are absent.
pub fn read_resolution(path: &Path) -> ImagingResult<Option<Resolution>> {
    let file = File::open(path).map_err(|e| ImagingError::io(path, e))?;
    let mut decoder =
        Decoder::new(BufReader::new(file)).map_err(|e| ImagingError::tags(path, e))?;

    let x = decoder
        .find_tag(Tag::XResolution)
        .map_err(|e| ImagingError::tags(path, e))?
        .and_then(as_rational);
    let y = decoder
        .find_tag(Tag::YResolution)
        .map_err(|e| ImagingError::tags(path, e))?
        .and_then(as_rational);
    let unit = decoder
        .find_tag_unsigned::<u16>(Tag::ResolutionUnit)
        .map_err(|e| ImagingError::tags(path, e))?
        .unwrap_or(2);

    Ok(match (x, y) {
        (Some(x), Some(y)) => Some(Resolution { x, y, unit }),
        (Some(x), None) => Some(Resolution { x, y: x, unit }),
        _ => None,
    })
}

fn as_rational(value: Value) -> Option<(u32, u32)> {
    match value {
        Value::Rational(n, d) => Some((n, d)),
        Value::List(values) => values.into_iter().next().and_then(as_rational),
        Value::Short(v) => Some((u32::from(v), 1)),
        Value::Unsigned(v) => Some((v, 1)),
        _ => None,
    }
}

/// Reduce an image to 8 bits per channel, keeping its channel layout.
pub fn to_eight_bit(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(img.to_luma8()),
        // The TIFF encoder has no gray+alpha layout; RGBA keeps the alpha.
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageRgba8(img.to_rgba8())
        }
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgb32F(_) => {
            DynamicImage::ImageRgb8(img.to_rgb8())
        }
        DynamicImage::ImageRgba16(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba8(img.to_rgba8())
        }
        other => other,
    }
}

/// Normalize `src` to 8 bits per channel and write the result to `dst`.
///
/// 8-bit sources are copied unchanged; deeper sources are converted and
/// the source resolution tags are carried into the output.
pub fn normalize_file(src: &Path, dst: &Path) -> ImagingResult<DepthOutcome> {
    let img = open_image(src)?;
    let from_bits = bits_per_channel(&img);

    if from_bits <= 8 {
        copy_unchanged(src, dst)?;
        return Ok(DepthOutcome::Copied);
    }

    let resolution = read_resolution(src)?;
    let reduced = to_eight_bit(img);
    let bytes = encode_tiff(&reduced, resolution).map_err(|e| ImagingError::encode(dst, e))?;
    atomic_write(dst, &bytes).map_err(|e| ImagingError::io(dst, e))?;

    Ok(DepthOutcome::Converted {
        from_bits,
        resolution,
    })
}

/// Encode an 8-bit image as TIFF, optionally with resolution tags.
pub fn encode_tiff(
    img: &DynamicImage,
    resolution: Option<Resolution>,
) -> Result<Vec<u8>, tiff::TiffError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor)?;
        let (width, height) = (img.width(), img.height());
        match img {
            DynamicImage::ImageLuma8(buf) => {
                let mut image = encoder.new_image::<colortype::Gray8>(width, height)?;
                apply_resolution(&mut image, resolution);
                image.write_data(buf.as_raw())?;
            }
            DynamicImage::ImageRgba8(buf) => {
                let mut image = encoder.new_image::<colortype::RGBA8>(width, height)?;
                apply_resolution(&mut image, resolution);
                image.write_data(buf.as_raw())?;
            }
            other => {
                let rgb = other.to_rgb8();
                let mut image = encoder.new_image::<colortype::RGB8>(width, height)?;
                apply_resolution(&mut image, resolution);
                image.write_data(rgb.as_raw())?;
            }
        }
    }
    Ok(cursor.into_inner())
}

fn apply_resolution<W, C, K>(
    image: &mut tiff::encoder::ImageEncoder<'_, W, C, K>,
    resolution: Option<Resolution>,
) where
    W: std::io::Write + std::io::Seek,
    C: colortype::ColorType,
    K: tiff::encoder::TiffKind,
{
    let Some(res) = resolution else {
        return;
    };
    image.x_resolution(Rational {
        n: res.x.0,
        d: res.x.1,
    });
    image.y_resolution(Rational {
        n: res.y.0,
        d: res.y.1,
    });
    image.resolution_unit(ResolutionUnit::from_u16(res.unit).unwrap_or(ResolutionUnit::Inch));
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::tempdir;

    fn write_sixteen_bit(path: &Path, resolution: Option<Resolution>) {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
            let data: Vec<u16> = (0..(6 * 4 * 3)).map(|i| (i * 900) as u16).collect();
            let mut image = encoder.new_image::<colortype::RGB16>(6, 4).unwrap();
            apply_resolution(&mut image, resolution);
            image.write_data(&data).unwrap();
        }
        std::fs::write(path, cursor.into_inner()).unwrap();
    }

    #[test]
    fn sixteen_bit_is_reduced_and_keeps_resolution() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("scan.tif");
        let dst = dir.path().join("out.tif");
        let res = Resolution {
            x: (600, 1),
            y: (600, 1),
            unit: 2,
        };
        write_sixteen_bit(&src, Some(res));

        let outcome = normalize_file(&src, &dst).unwrap();
        assert_eq!(
            outcome,
            DepthOutcome::Converted {
                from_bits: 16,
                resolution: Some(res)
            }
        );

        let out = open_image(&dst).unwrap();
        assert_eq!(bits_per_channel(&out), 8);
        assert_eq!((out.width(), out.height()), (6, 4));

        let kept = read_resolution(&dst).unwrap().unwrap();
        assert_eq!(kept.x_value(), 600.0);
        assert_eq!(kept.y_value(), 600.0);
        assert_eq!(kept.unit, 2);
    }

    #[test]
    fn eight_bit_is_copied_byte_for_byte() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("already.tif");
        let dst = dir.path().join("copy.tif");
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(3, 3, Rgb([9, 9, 9]));
        let bytes = encode_tiff(&DynamicImage::ImageRgb8(img), None).unwrap();
        std::fs::write(&src, &bytes).unwrap();

        assert_eq!(normalize_file(&src, &dst).unwrap(), DepthOutcome::Copied);
        assert_eq!(std::fs::read(&dst).unwrap(), bytes);
    }

    #[test]
    fn sixteen_bit_gray_stays_gray() {
        let img = DynamicImage::new_luma16(4, 4);
        assert!(matches!(to_eight_bit(img), DynamicImage::ImageLuma8(_)));
    }
}
