//! Pixel work: decode, encode, resize, grayscale and palette reduction.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (JPEG, PNG, WebP, GIF, BMP, TIFF) |
//! | **Encode → WebP** | `webp` (libwebp) with quality and method |
//! | **Encode → other** | `image` encoders (JPEG, PNG, AVIF, GIF, BMP, TIFF) |
//! | **Resize** | Lanczos3 `resize_exact` |
//! | **Palette** | `imagequant` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and scale math (unit testable)
//! - **Parameters**: Data structures describing one encode
//! - **Backend**: [`Codec`] trait + [`RustCodec`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_codec;

pub use backend::{Codec, CodecError};
pub use calculations::{
    LAST_RESORT_MIN_EDGE, MIN_SCALE, initial_downscale, last_resort_dimensions, next_downscale,
    scale_dimensions,
};
pub use params::{ColorMode, Effort, EncodeParams, Quality};
pub use rust_codec::RustCodec;
