//! Pixel-level operations on batch images.
//!
//! Every operation reads a source file and writes a new output file; the
//! only in-place mutation in the pipeline is metadata embedding.

mod bit_depth;
mod codec;
mod resize;
mod restriction;
mod types;
mod watermark;

pub use bit_depth::{encode_tiff, normalize_file, read_resolution, to_eight_bit, DepthOutcome, Resolution};
pub use codec::{bits_per_channel, convert_to_jpeg, copy_unchanged, open_image, save_jpeg};
pub use resize::{bounded_dimensions, resize_file, resize_image, ResizeOutcome};
pub use restriction::{is_restricted, RESTRICTED_TOKEN};
pub use types::{ImagingError, ImagingResult, ResizeSpec, WatermarkSpec};
pub use watermark::{
    composite, fit_overlay, load_overlay, overlay_scale, plan_overlay, watermark_file,
    OverlayPlacement,
};
