//! Codec trait and shared error type.
//!
//! The [`Codec`] trait is the seam between the size-targeting engine and the
//! pixel work: decode, encode, resize, grayscale, palette quantization and
//! header probing. The engine never touches an encoder directly, so its
//! search logic can be tested against the recording mock in [`tests`].
//!
//! The production implementation is
//! [`RustCodec`](super::rust_codec::RustCodec).

use super::params::EncodeParams;
use crate::formats::{Format, FormatError, FormatInfo};
use image::DynamicImage;
use image::imageops::FilterType;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("{format} encode failed: {reason}")]
    Encode { format: Format, reason: String },
    #[error("Color quantization failed: {0}")]
    Quantize(String),
    #[error(transparent)]
    Probe(#[from] FormatError),
}

/// Image codec operations used by the compression pipeline.
///
/// `Sync` so one codec can be shared by rayon workers during batch runs.
pub trait Codec: Sync {
    /// Decode a file into pixels.
    fn decode(&self, path: &Path) -> Result<DynamicImage, CodecError>;

    /// Encode pixels into an in-memory file of the requested format.
    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError>;

    /// Resize to exact dimensions.
    fn resize(&self, image: &DynamicImage, width: u32, height: u32, filter: FilterType)
    -> DynamicImage;

    /// Single-channel copy of the image (alpha dropped).
    fn to_grayscale(&self, image: &DynamicImage) -> DynamicImage;

    /// Reduce the image to at most `palette_size` colors.
    fn quantize_colors(
        &self,
        image: &DynamicImage,
        palette_size: u16,
    ) -> Result<DynamicImage, CodecError>;

    /// Identify format and dimensions without decoding pixels.
    fn probe(&self, path: &Path) -> Result<FormatInfo, CodecError>;
}
