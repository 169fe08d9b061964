//! Supported image containers and their aliases.
//!
//! Every format the tool can write is listed in [`Format::ALL`]. Decoding is
//! a subset: AVIF is encode-only because the `image` crate's `"avif"` feature
//! ships the rav1e encoder but no decoder.
//!
//! | Format | Extensions | Lossy | Palette | Decode |
//! |---|---|---|---|---|
//! | JPEG | jpg, jpeg | yes | no | yes |
//! | PNG | png | no | yes | yes |
//! | WebP | webp | yes | no | yes |
//! | GIF | gif | no | yes | yes |
//! | BMP | bmp | no | no | yes |
//! | TIFF | tiff, tif | no | no | yes |
//! | AVIF | avif | yes | no | no |

use image::{ColorType, ImageDecoder, ImageReader};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Unsupported format '{name}'. Supported formats: {supported}")]
    Unknown { name: String, supported: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot read image header of {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
    Tiff,
    Avif,
}

impl Format {
    pub const ALL: [Format; 7] = [
        Format::Jpeg,
        Format::Png,
        Format::WebP,
        Format::Gif,
        Format::Bmp,
        Format::Tiff,
        Format::Avif,
    ];

    /// Canonical upper-case name, as accepted by `--format`.
    pub fn name(self) -> &'static str {
        match self {
            Format::Jpeg => "JPEG",
            Format::Png => "PNG",
            Format::WebP => "WEBP",
            Format::Gif => "GIF",
            Format::Bmp => "BMP",
            Format::Tiff => "TIFF",
            Format::Avif => "AVIF",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Format::Jpeg => "image/jpeg",
            Format::Png => "image/png",
            Format::WebP => "image/webp",
            Format::Gif => "image/gif",
            Format::Bmp => "image/bmp",
            Format::Tiff => "image/tiff",
            Format::Avif => "image/avif",
        }
    }

    /// File extensions, primary first.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Format::Jpeg => &["jpg", "jpeg"],
            Format::Png => &["png"],
            Format::WebP => &["webp"],
            Format::Gif => &["gif"],
            Format::Bmp => &["bmp"],
            Format::Tiff => &["tiff", "tif"],
            Format::Avif => &["avif"],
        }
    }

    pub fn primary_extension(self) -> &'static str {
        self.extensions()[0]
    }

    /// Whether encoding takes a quality parameter.
    pub fn is_lossy(self) -> bool {
        matches!(self, Format::Jpeg | Format::WebP | Format::Avif)
    }

    /// Containers that benefit from palette reduction.
    pub fn supports_palette(self) -> bool {
        matches!(self, Format::Png | Format::Gif)
    }

    pub fn can_decode(self) -> bool {
        !matches!(self, Format::Avif)
    }

    pub fn from_extension(ext: &str) -> Option<Format> {
        let ext = ext.to_ascii_lowercase();
        Format::ALL
            .into_iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
    }

    pub fn from_path(path: &Path) -> Option<Format> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Format::from_extension)
    }

    pub(crate) fn from_image_format(format: image::ImageFormat) -> Option<Format> {
        match format {
            image::ImageFormat::Jpeg => Some(Format::Jpeg),
            image::ImageFormat::Png => Some(Format::Png),
            image::ImageFormat::WebP => Some(Format::WebP),
            image::ImageFormat::Gif => Some(Format::Gif),
            image::ImageFormat::Bmp => Some(Format::Bmp),
            image::ImageFormat::Tiff => Some(Format::Tiff),
            image::ImageFormat::Avif => Some(Format::Avif),
            _ => None,
        }
    }

    pub(crate) fn image_format(self) -> image::ImageFormat {
        match self {
            Format::Jpeg => image::ImageFormat::Jpeg,
            Format::Png => image::ImageFormat::Png,
            Format::WebP => image::ImageFormat::WebP,
            Format::Gif => image::ImageFormat::Gif,
            Format::Bmp => image::ImageFormat::Bmp,
            Format::Tiff => image::ImageFormat::Tiff,
            Format::Avif => image::ImageFormat::Avif,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = FormatError;

    /// Case-insensitive; accepts `JPG` and `TIF` as aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().trim_start_matches('.').to_ascii_uppercase();
        let canonical = match upper.as_str() {
            "JPG" => "JPEG",
            "TIF" => "TIFF",
            other => other,
        };
        Format::ALL
            .into_iter()
            .find(|f| f.name() == canonical)
            .ok_or_else(|| FormatError::Unknown {
                name: s.to_string(),
                supported: supported_names(),
            })
    }
}

fn supported_names() -> String {
    Format::ALL
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extensions a directory scan should pick up.
pub fn supported_input_extensions() -> Vec<&'static str> {
    Format::ALL
        .into_iter()
        .filter(|f| f.can_decode())
        .flat_map(|f| f.extensions().iter().copied())
        .collect()
}

pub fn is_supported_input(path: &Path) -> bool {
    Format::from_path(path).is_some_and(Format::can_decode)
}

/// Result of sniffing an image file without decoding its pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatInfo {
    /// Format detected from the file contents, if recognised.
    pub format: Option<Format>,
    /// Format implied by the file extension, if any.
    pub detected_by_extension: Option<Format>,
    pub supported: bool,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
    pub color: String,
    pub file_bytes: u64,
}

/// Read the header of `path` and report what it is.
pub fn probe(path: &Path) -> Result<FormatInfo, FormatError> {
    let file_bytes = std::fs::metadata(path)?.len();
    let detected_by_extension = Format::from_path(path);

    let unreadable = |reason: String| FormatError::Unreadable {
        path: path.display().to_string(),
        reason,
    };

    let reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(|e| unreadable(e.to_string()))?;
    let format = reader.format().and_then(Format::from_image_format);
    let decoder = reader.into_decoder().map_err(|e| unreadable(e.to_string()))?;
    let (width, height) = decoder.dimensions();

    Ok(FormatInfo {
        format,
        detected_by_extension,
        supported: format.is_some_and(Format::can_decode),
        mime: format.map(Format::mime).unwrap_or("unknown"),
        width,
        height,
        color: color_label(decoder.color_type()).to_string(),
        file_bytes,
    })
}

fn color_label(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 | ColorType::L16 => "grayscale",
        ColorType::La8 | ColorType::La16 => "grayscale+alpha",
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "rgb",
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "rgba",
        _ => "other",
    }
}
