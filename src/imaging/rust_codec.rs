//! Production codec built on the `image` crate ecosystem.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP, GIF, BMP, TIFF) | `image::ImageReader` with content sniffing |
//! | Encode → WebP (lossy) | `webp` (libwebp), `WebPConfig` quality + method |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → PNG | `image::codecs::png::PngEncoder`, best compression |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → GIF, BMP, TIFF | `DynamicImage::write_to` |
//! | Resize | `DynamicImage::resize_exact` |
//! | Palette reduction | `imagequant` (libimagequant) |
//! | Probe | [`formats::probe`](crate::formats::probe) |

use super::backend::{Codec, CodecError};
use super::params::EncodeParams;
use crate::formats::{self, Format, FormatInfo};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// AVIF encoder speed (0 slowest/smallest, 10 fastest).
const AVIF_SPEED: u8 = 6;

/// Background used when dropping alpha for formats without transparency.
const FLATTEN_BACKGROUND: [u8; 3] = [255, 255, 255];

/// Codec backed by pure-Rust decoders plus libwebp and libimagequant.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustCodec;

impl RustCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_failed(format: Format, reason: impl ToString) -> CodecError {
    CodecError::Encode {
        format,
        reason: reason.to_string(),
    }
}

/// Lossy (or lossless) WebP through libwebp. Alpha is dropped.
fn encode_webp(image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
    let rgb = image.to_rgb8();
    let encoder = webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height());

    let mut config = webp::WebPConfig::new()
        .map_err(|_| encode_failed(Format::WebP, "failed to initialise WebPConfig"))?;
    config.quality = f32::from(params.quality.value());
    config.lossless = i32::from(params.lossless);
    config.method = i32::from(params.effort.value());

    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| encode_failed(Format::WebP, format!("{e:?}")))?;
    Ok(memory.to_vec())
}

fn encode_jpeg(image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
    let rgb = if image.color().has_alpha() {
        DynamicImage::ImageRgb8(flatten_alpha(image))
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    };
    let grayscale = image.color().channel_count() <= 2;
    let pixels = if grayscale {
        DynamicImage::ImageLuma8(rgb.to_luma8())
    } else {
        rgb
    };

    let mut buffer = Vec::new();
    // JPEG quality 0 is not meaningful; the encoder's floor is 1.
    let quality = params.quality.value().max(1);
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    pixels
        .write_with_encoder(encoder)
        .map_err(|e| encode_failed(Format::Jpeg, e))?;
    Ok(buffer)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, CodecError> {
    let mut buffer = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, PngFilter::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| encode_failed(Format::Png, e))?;
    Ok(buffer)
}

fn encode_avif(image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
    let pixels = match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image.clone(),
        _ if image.color().has_alpha() => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    };
    let mut buffer = Vec::new();
    let quality = params.quality.value().max(1);
    let encoder = AvifEncoder::new_with_speed_quality(&mut buffer, AVIF_SPEED, quality);
    pixels
        .write_with_encoder(encoder)
        .map_err(|e| encode_failed(Format::Avif, e))?;
    Ok(buffer)
}

/// GIF, BMP and TIFF have no quality knob; write through the generic path.
fn encode_plain(image: &DynamicImage, format: Format) -> Result<Vec<u8>, CodecError> {
    let pixels = match format {
        Format::Gif => DynamicImage::ImageRgba8(image.to_rgba8()),
        Format::Bmp if image.color().has_alpha() => DynamicImage::ImageRgba8(image.to_rgba8()),
        Format::Bmp | Format::Tiff => match image.color().channel_count() {
            1 => DynamicImage::ImageLuma8(image.to_luma8()),
            2 | 4 => DynamicImage::ImageRgba8(image.to_rgba8()),
            _ => DynamicImage::ImageRgb8(image.to_rgb8()),
        },
        _ => image.clone(),
    };
    let mut cursor = Cursor::new(Vec::new());
    pixels
        .write_to(&mut cursor, format.image_format())
        .map_err(|e| encode_failed(format, e))?;
    Ok(cursor.into_inner())
}

/// Composite onto [`FLATTEN_BACKGROUND`], discarding alpha.
fn flatten_alpha(image: &DynamicImage) -> image::RgbImage {
    let rgba = image.to_rgba8();
    let [br, bg, bb] = FLATTEN_BACKGROUND.map(u32::from);
    image::RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let a = u32::from(a);
        let blend = |c: u8, bgc: u32| ((u32::from(c) * a + bgc * (255 - a) + 127) / 255) as u8;
        image::Rgb([blend(r, br), blend(g, bg), blend(b, bb)])
    })
}

impl Codec for RustCodec {
    fn decode(&self, path: &Path) -> Result<DynamicImage, CodecError> {
        let decode_failed = |reason: String| CodecError::Decode {
            path: path.display().to_string(),
            reason,
        };
        ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| decode_failed(e.to_string()))
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
        match params.format {
            Format::WebP => encode_webp(image, params),
            Format::Jpeg => encode_jpeg(image, params),
            Format::Png => encode_png(image),
            Format::Avif => encode_avif(image, params),
            format @ (Format::Gif | Format::Bmp | Format::Tiff) => encode_plain(image, format),
        }
    }

    fn resize(
        &self,
        image: &DynamicImage,
        width: u32,
        height: u32,
        filter: FilterType,
    ) -> DynamicImage {
        image.resize_exact(width, height, filter)
    }

    fn to_grayscale(&self, image: &DynamicImage) -> DynamicImage {
        DynamicImage::ImageLuma8(image.to_luma8())
    }

    fn quantize_colors(
        &self,
        image: &DynamicImage,
        palette_size: u16,
    ) -> Result<DynamicImage, CodecError> {
        let quantize_failed = |e: imagequant::Error| CodecError::Quantize(e.to_string());

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels: Vec<rgb::RGBA8> = rgba
            .pixels()
            .map(|p| rgb::RGBA8::new(p[0], p[1], p[2], p[3]))
            .collect();

        let mut attr = imagequant::Attributes::new();
        attr.set_max_colors(u32::from(palette_size.clamp(2, 256)))
            .map_err(quantize_failed)?;
        let mut liq_image = imagequant::Image::new(
            &attr,
            pixels.as_slice(),
            width as usize,
            height as usize,
            0.0,
        )
        .map_err(quantize_failed)?;
        let mut result = attr.quantize(&mut liq_image).map_err(quantize_failed)?;
        result.set_dithering_level(1.0).map_err(quantize_failed)?;
        let (palette, indices) = result.remapped(&mut liq_image).map_err(quantize_failed)?;

        // Expand the palette back to RGBA; PNG/GIF encoders repack it.
        let mut expanded = Vec::with_capacity(indices.len() * 4);
        for idx in indices {
            let p = palette[usize::from(idx)];
            expanded.extend_from_slice(&[p.r, p.g, p.b, p.a]);
        }
        RgbaImage::from_raw(width, height, expanded)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| CodecError::Quantize("remapped buffer has wrong length".into()))
    }

    fn probe(&self, path: &Path) -> Result<FormatInfo, CodecError> {
        Ok(formats::probe(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;
    use image::{GenericImageView, RgbImage};

    /// Gradient with some texture so lossy encoders have real work to do.
    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 251) as u8])
        }))
    }

    fn decode_bytes(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn webp_roundtrip_keeps_dimensions() {
        let codec = RustCodec::new();
        let bytes = codec
            .encode(
                &gradient(64, 48),
                &EncodeParams::lossy(Format::WebP, Quality::new(80)),
            )
            .unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
        assert_eq!(decode_bytes(&bytes).dimensions(), (64, 48));
    }

    #[test]
    fn webp_quality_zero_is_accepted() {
        let codec = RustCodec::new();
        let bytes = codec
            .encode(
                &codec.to_grayscale(&gradient(32, 32)),
                &EncodeParams::lossy(Format::WebP, Quality::MIN),
            )
            .unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn jpeg_flattens_alpha() {
        let codec = RustCodec::new();
        let transparent = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            16,
            16,
            Rgba([0, 0, 0, 0]),
        ));
        let bytes = codec
            .encode(
                &transparent,
                &EncodeParams::lossy(Format::Jpeg, Quality::new(90)),
            )
            .unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        let decoded = decode_bytes(&bytes).to_rgb8();
        // Fully transparent black becomes white.
        assert!(decoded.get_pixel(8, 8).0.iter().all(|&c| c > 240));
    }

    #[test]
    fn jpeg_quality_zero_is_clamped() {
        let codec = RustCodec::new();
        let result = codec.encode(
            &gradient(16, 16),
            &EncodeParams::lossy(Format::Jpeg, Quality::MIN),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn png_and_plain_formats_encode() {
        let codec = RustCodec::new();
        let img = gradient(20, 10);
        for format in [Format::Png, Format::Gif, Format::Bmp, Format::Tiff] {
            let bytes = codec
                .encode(&img, &EncodeParams::lossy(format, Quality::default()))
                .unwrap();
            let decoded = decode_bytes(&bytes);
            assert_eq!(decoded.dimensions(), (20, 10), "{format}");
        }
    }

    #[test]
    fn grayscale_is_single_channel() {
        let codec = RustCodec::new();
        let gray = codec.to_grayscale(&gradient(8, 8));
        assert_eq!(gray.color(), image::ColorType::L8);
    }

    #[test]
    fn resize_is_exact() {
        let codec = RustCodec::new();
        let resized = codec.resize(&gradient(100, 80), 33, 77, FilterType::Lanczos3);
        assert_eq!(resized.dimensions(), (33, 77));
    }

    #[test]
    fn quantize_limits_palette() {
        let codec = RustCodec::new();
        let quantized = codec.quantize_colors(&gradient(64, 64), 16).unwrap();
        let colors: std::collections::HashSet<[u8; 4]> =
            quantized.to_rgba8().pixels().map(|p| p.0).collect();
        assert!(colors.len() <= 16, "got {} colors", colors.len());
        assert_eq!(quantized.dimensions(), (64, 64));
    }

    #[test]
    fn decode_missing_file_is_io_error() {
        let codec = RustCodec::new();
        let result = codec.decode(Path::new("/nonexistent/image.png"));
        assert!(matches!(result, Err(CodecError::Io(_))));
    }

    #[test]
    fn decode_garbage_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really").unwrap();
        let codec = RustCodec::new();
        assert!(matches!(
            codec.decode(&path),
            Err(CodecError::Decode { .. })
        ));
    }
}
