//! The eight pipeline steps, in slot order.

mod common;
mod convert_jpeg;
mod embed_metadata;
mod initialize;
mod map_spreadsheet;
mod match_images;
mod normalize_depth;
mod resize;
mod watermark;

pub use convert_jpeg::ConvertJpegStep;
pub use embed_metadata::EmbedMetadataStep;
pub use initialize::InitializeStep;
pub use map_spreadsheet::MapSpreadsheetStep;
pub use match_images::MatchImagesStep;
pub use normalize_depth::NormalizeDepthStep;
pub use resize::ResizeStep;
pub use watermark::WatermarkStep;

#[cfg(test)]
pub(crate) use common::testing;
