//! Quality-mode compression: one re-encode at a fixed quality.
//!
//! The output container is the requested format, or the source's own format
//! when none is requested. Encoder settings per container:
//!
//! | Container | Settings |
//! |---|---|
//! | WebP | lossy at `quality`, maximum effort |
//! | JPEG | `quality`, alpha flattened onto white |
//! | AVIF | `quality`, speed 6 |
//! | PNG | best compression, adaptive filtering |
//! | GIF, BMP, TIFF | lossless |

use crate::formats::Format;
use crate::imaging::{Codec, CodecError, Effort, EncodeParams, Quality, RustCodec};
use crate::scratch::{self, ScratchError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_SUFFIX: &str = "_compressed";

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Cannot decode {path}: {source}")]
    Decode { path: String, source: CodecError },
    #[error("Encoding failed: {0}")]
    Encode(CodecError),
    #[error(transparent)]
    Io(#[from] ScratchError),
}

#[derive(Debug, Clone)]
pub struct CompressRequest {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub quality: Quality,
    pub format: Option<Format>,
}

impl CompressRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: None,
            quality: Quality::default(),
            format: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// The explicit destination, or the default one. A requested format
    /// always sets the extension.
    pub fn destination_path(&self) -> PathBuf {
        match (&self.destination, self.format) {
            (Some(dest), Some(f)) => dest.with_extension(f.primary_extension()),
            (Some(dest), None) => dest.clone(),
            (None, format) => default_destination(&self.source, format),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressOutcome {
    pub final_path: PathBuf,
    pub format: Format,
    pub quality: Quality,
    pub original_bytes: u64,
    pub final_bytes: u64,
}

/// `photo.png` → `photo_compressed.png`; with a target format the extension
/// becomes that format's primary extension.
pub fn default_destination(source: &Path, format: Option<Format>) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = match format {
        Some(f) => Some(f.primary_extension().to_string()),
        None => source
            .extension()
            .map(|e| e.to_string_lossy().into_owned()),
    };
    let name = match ext {
        Some(ext) => format!("{stem}{DEFAULT_SUFFIX}.{ext}"),
        None => format!("{stem}{DEFAULT_SUFFIX}"),
    };
    source.with_file_name(name)
}

pub fn compress(request: &CompressRequest) -> Result<CompressOutcome, CompressError> {
    compress_with(&RustCodec::new(), request)
}

pub fn compress_with(
    codec: &impl Codec,
    request: &CompressRequest,
) -> Result<CompressOutcome, CompressError> {
    if request.quality < Quality::SEARCH_FLOOR {
        return Err(CompressError::InvalidInput(format!(
            "quality must be 1-100, got {}",
            request.quality.value()
        )));
    }
    if !request.source.is_file() {
        return Err(CompressError::InvalidInput(format!(
            "source not found: {}",
            request.source.display()
        )));
    }

    let format = match request.format {
        Some(f) => f,
        None => source_format(codec, &request.source)?,
    };
    let original_bytes = scratch::file_size(&request.source)?;

    let image = codec
        .decode(&request.source)
        .map_err(|source| CompressError::Decode {
            path: request.source.display().to_string(),
            source,
        })?;
    let params = EncodeParams {
        effort: Effort::SMALLEST,
        ..EncodeParams::lossy(format, request.quality)
    };
    let bytes = codec.encode(&image, &params).map_err(CompressError::Encode)?;

    let final_path = request.destination_path();
    let final_bytes = scratch::write_atomically(&final_path, &bytes)?;
    Ok(CompressOutcome {
        final_path,
        format,
        quality: request.quality,
        original_bytes,
        final_bytes,
    })
}

/// Sniffed format of the source, falling back to its extension.
fn source_format(codec: &impl Codec, source: &Path) -> Result<Format, CompressError> {
    let sniffed = codec.probe(source).ok().and_then(|info| info.format);
    sniffed
        .or_else(|| Format::from_path(source))
        .ok_or_else(|| {
            CompressError::InvalidInput(format!(
                "cannot tell the format of {}; pass a target format",
                source.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockCodec, RecordedOp};
    use std::fs;
    use tempfile::TempDir;

    fn create_dummy_source(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![0u8; 1000]).unwrap();
        path
    }

    #[test]
    fn default_destination_keeps_extension() {
        assert_eq!(
            default_destination(Path::new("/a/photo.png"), None),
            PathBuf::from("/a/photo_compressed.png")
        );
    }

    #[test]
    fn default_destination_swaps_extension_for_format() {
        assert_eq!(
            default_destination(Path::new("/a/photo.png"), Some(Format::Jpeg)),
            PathBuf::from("/a/photo_compressed.jpg")
        );
    }

    #[test]
    fn explicit_destination_takes_format_extension() {
        let tmp = TempDir::new().unwrap();
        let src = create_dummy_source(tmp.path(), "photo.png");
        let request = CompressRequest::new(&src)
            .with_destination(tmp.path().join("out.png"))
            .with_format(Format::WebP);

        let outcome = compress_with(&MockCodec::new(), &request).unwrap();

        assert_eq!(outcome.final_path, tmp.path().join("out.webp"));
        assert_eq!(Format::from_path(&outcome.final_path), Some(outcome.format));
        assert!(!tmp.path().join("out.png").exists());
    }

    #[test]
    fn explicit_destination_kept_without_format() {
        let request = CompressRequest::new("/a/photo.png").with_destination("/b/out.png");
        assert_eq!(request.destination_path(), PathBuf::from("/b/out.png"));
    }

    #[test]
    fn uses_probed_format_when_none_requested() {
        let tmp = TempDir::new().unwrap();
        let src = create_dummy_source(tmp.path(), "photo.png");
        let codec = MockCodec::new();

        let outcome = compress_with(&codec, &CompressRequest::new(&src)).unwrap();

        // MockCodec::probe always reports PNG.
        assert_eq!(outcome.format, Format::Png);
        assert_eq!(outcome.final_path, tmp.path().join("photo_compressed.png"));
        assert_eq!(outcome.original_bytes, 1000);
        assert_eq!(
            outcome.final_bytes,
            fs::metadata(&outcome.final_path).unwrap().len()
        );
    }

    #[test]
    fn requested_format_and_quality_reach_encoder() {
        let tmp = TempDir::new().unwrap();
        let src = create_dummy_source(tmp.path(), "photo.png");
        let codec = MockCodec::new();
        let request = CompressRequest::new(&src)
            .with_format(Format::WebP)
            .with_quality(Quality::new(60));

        let outcome = compress_with(&codec, &request).unwrap();

        assert_eq!(outcome.final_path, tmp.path().join("photo_compressed.webp"));
        assert_eq!(
            codec.encodes(),
            vec![RecordedOp::Encode {
                format: Format::WebP,
                quality: 60,
                width: 800,
                height: 600,
                grayscale: false,
            }]
        );
    }

    #[test]
    fn quality_zero_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let src = create_dummy_source(tmp.path(), "photo.png");
        let request = CompressRequest::new(&src).with_quality(Quality::MIN);
        assert!(matches!(
            compress_with(&MockCodec::new(), &request),
            Err(CompressError::InvalidInput(_))
        ));
    }

    #[test]
    fn encode_failure_leaves_no_output() {
        let tmp = TempDir::new().unwrap();
        let src = create_dummy_source(tmp.path(), "photo.png");
        let codec = MockCodec::new().failing_format(Format::Png);

        let result = compress_with(&codec, &CompressRequest::new(&src));

        assert!(matches!(result, Err(CompressError::Encode(_))));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn decode_failure_is_reported() {
        let tmp = TempDir::new().unwrap();
        let src = create_dummy_source(tmp.path(), "photo.png");
        let codec = MockCodec::new().decode_failure();
        assert!(matches!(
            compress_with(&codec, &CompressRequest::new(&src).with_format(Format::Jpeg)),
            Err(CompressError::Decode { .. })
        ));
    }
}
