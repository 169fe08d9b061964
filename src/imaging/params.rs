//! Parameter types for codec operations.
//!
//! These structs describe *what* to encode, not *how*. They are the interface
//! between the size-targeting engine (which decides what to try) and the
//! [`Codec`](super::backend::Codec) (which does the pixel work), so the engine
//! can be exercised against a mock codec.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (0–100). Clamped on construction.
//! - [`Effort`]: Encoder compression effort (0 = fastest, 6 = smallest).
//! - [`ColorMode`]: Color depth of the pixels handed to the encoder.
//! - [`EncodeParams`]: Full specification for one encode.

use crate::formats::Format;
use serde::Serialize;

/// Quality setting for lossy image encoding (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Quality(u8);

impl Quality {
    /// Lowest setting the lossy encoder accepts.
    pub const MIN: Quality = Quality(0);
    /// Lower bound of the quality search.
    pub const SEARCH_FLOOR: Quality = Quality(1);
    /// Upper bound of the quality search.
    pub const SEARCH_CEILING: Quality = Quality(95);

    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Compression effort (libwebp `method`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effort(u8);

impl Effort {
    pub const FASTEST: Effort = Effort(0);
    pub const SMALLEST: Effort = Effort(6);

    pub fn new(value: u8) -> Self {
        Self(value.min(6))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Effort {
    fn default() -> Self {
        Self(4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Truecolor,
    Grayscale,
    Paletted,
}

/// Parameters for a single encode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: Format,
    pub quality: Quality,
    /// Ask for lossless output where the format has both modes (WebP).
    pub lossless: bool,
    pub effort: Effort,
}

impl EncodeParams {
    /// Lossy encode at `quality` with default effort.
    pub fn lossy(format: Format, quality: Quality) -> Self {
        Self {
            format,
            quality,
            lossless: false,
            effort: Effort::default(),
        }
    }
}
