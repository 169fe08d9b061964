//! Size-targeted compression.
//!
//! Given a source image and a byte budget, produce a file whose size falls
//! inside a [`ToleranceWindow`] around the budget, degrading fidelity only as
//! far as needed.
//!
//! ## Pipeline
//!
//! ```text
//! decode ─► [pre-scale] ─► Phase 1: WebP quality search (95 first, then 1..=94)
//!                          Phase 2: grayscale + progressive downscale at q0
//!                          Phase 3: last resort, a fifth of each edge at q0
//!                       ─► finalize: scratch file beside destination, rename
//! ```
//!
//! Each phase runs only if the previous one produced nothing acceptable. The
//! phases are plain functions with one signature (see [`phases`]) driven by a
//! single loop in [`fit_to_size_with`].
//!
//! ## Finalization
//!
//! The search always works in WebP. When the destination names another
//! container the accepted pixels are re-encoded once into it. PNG and GIF get
//! one more try with a 256-color palette when the truecolor encode is over
//! budget. If the container cannot hold the result (encode error, or over
//! budget and larger than the WebP bytes) the WebP bytes are written next to
//! the destination with a `.webp` extension instead and a
//! [`FormatFallback`] is reported.
//!
//! All encoding happens in memory; the only file written is the final one,
//! through [`ScratchFile`](crate::scratch::ScratchFile).

pub mod phases;
mod window;

pub use window::ToleranceWindow;

use crate::events::{self, Event};
use crate::formats::Format;
use crate::imaging::{
    Codec, CodecError, ColorMode, EncodeParams, Quality, RustCodec, scale_dimensions,
};
use crate::scratch::{self, ScratchError};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use phases::FitContext;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use thiserror::Error;

/// Smallest accepted pre-scale factor.
pub const MIN_SCALE_FACTOR: f64 = 0.1;

/// Palette size used when retrying PNG/GIF output.
const RETRY_PALETTE: u16 = 256;

/// Suffix appended to the source stem when no destination is given.
const DEFAULT_SUFFIX: &str = "_target_size";

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Cannot decode {path}: {source}")]
    Decode { path: String, source: CodecError },
    #[error("Encoding failed: {0}")]
    Encode(CodecError),
    #[error(transparent)]
    Io(#[from] ScratchError),
    #[error("Cancelled")]
    Cancelled,
}

/// One size-targeted compression job. Immutable once the search begins.
#[derive(Debug, Clone)]
pub struct FitRequest {
    pub source: PathBuf,
    /// Defaults to [`default_destination`] of the source.
    pub destination: Option<PathBuf>,
    pub target_bytes: u64,
    pub tolerance_percent: f64,
    /// Resize once by this factor before searching. `None` or `1.0` keeps
    /// the source dimensions.
    pub scale_factor: Option<f64>,
    /// Report every probe as an [`Event::Probe`].
    pub verbose: bool,
}

impl FitRequest {
    pub fn new(source: impl Into<PathBuf>, target_bytes: u64) -> Self {
        Self {
            source: source.into(),
            destination: None,
            target_bytes,
            tolerance_percent: 5.0,
            scale_factor: None,
            verbose: false,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_tolerance(mut self, percent: f64) -> Self {
        self.tolerance_percent = percent;
        self
    }

    pub fn with_scale(mut self, factor: f64) -> Self {
        self.scale_factor = Some(factor);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn destination_path(&self) -> PathBuf {
        self.destination
            .clone()
            .unwrap_or_else(|| default_destination(&self.source))
    }

    pub fn window(&self) -> ToleranceWindow {
        ToleranceWindow::new(self.target_bytes, self.tolerance_percent)
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if self.target_bytes == 0 {
            return Err(FitError::InvalidInput(
                "target size must be greater than 0".into(),
            ));
        }
        if !(self.tolerance_percent.is_finite() && self.tolerance_percent > 0.0) {
            return Err(FitError::InvalidInput(format!(
                "tolerance must be a positive percentage, got {}",
                self.tolerance_percent
            )));
        }
        if let Some(scale) = self.scale_factor {
            if !(MIN_SCALE_FACTOR..=1.0).contains(&scale) {
                return Err(FitError::InvalidInput(format!(
                    "scale factor must be in 0.1-1.0, got {scale}"
                )));
            }
        }
        if !self.source.is_file() {
            return Err(FitError::InvalidInput(format!(
                "source not found: {}",
                self.source.display()
            )));
        }
        Ok(())
    }
}

/// `photo.jpg` → `photo_target_size.jpg`, in the same directory.
pub fn default_destination(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match source.extension() {
        Some(ext) => format!("{stem}{DEFAULT_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{DEFAULT_SUFFIX}"),
    };
    source.with_file_name(name)
}

/// Degradation tier that produced the accepted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Quality,
    Downscale,
    LastResort,
}

impl Phase {
    pub fn number(self) -> u8 {
        match self {
            Phase::Quality => 1,
            Phase::Downscale => 2,
            Phase::LastResort => 3,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Quality => "quality search",
            Phase::Downscale => "downscale",
            Phase::LastResort => "last resort",
        })
    }
}

/// One encoded candidate together with the pixels that produced it.
#[derive(Debug, Clone)]
pub struct EncodeAttempt {
    pub format: Format,
    /// `None` for lossless encodes.
    pub quality: Option<Quality>,
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    pub bytes: Vec<u8>,
    pub pixels: DynamicImage,
}

impl EncodeAttempt {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Cursor and bookkeeping shared by the phases of one request.
///
/// While searching `low <= high`; `best`, when set, is within the window.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub low: u8,
    pub high: u8,
    pub best: Option<EncodeAttempt>,
    /// Smallest size any probe has produced so far.
    pub smallest_probe: Option<u64>,
    pub probes: u32,
    pub failed_probes: u32,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            low: Quality::SEARCH_FLOOR.value(),
            high: Quality::SEARCH_CEILING.value(),
            best: None,
            smallest_probe: None,
            probes: 0,
            failed_probes: 0,
        }
    }
}

impl SearchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_size(&mut self, size: u64) {
        self.probes += 1;
        self.smallest_probe = Some(self.smallest_probe.map_or(size, |s| s.min(size)));
    }

    pub(crate) fn record_failure(&mut self) {
        self.probes += 1;
        self.failed_probes += 1;
    }
}

/// The WebP result was kept because the requested container could not be.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatFallback {
    pub requested: Option<Format>,
    pub kept: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitOutcome {
    pub final_path: PathBuf,
    pub final_bytes: u64,
    pub phase_reached: Phase,
    pub format: Format,
    pub quality: Option<Quality>,
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    pub probes: u32,
    pub format_fallback: Option<FormatFallback>,
}

/// Run a request with the production codec, no progress and no cancellation.
pub fn fit_to_size(request: &FitRequest) -> Result<FitOutcome, FitError> {
    fit_to_size_with(&RustCodec::new(), request, None, None)
}

/// Run a request against `codec`.
///
/// `cancel` is checked between probes; once set the request stops with
/// [`FitError::Cancelled`] and nothing is written.
pub fn fit_to_size_with(
    codec: &impl Codec,
    request: &FitRequest,
    progress: Option<&Sender<Event>>,
    cancel: Option<&AtomicBool>,
) -> Result<FitOutcome, FitError> {
    request.validate()?;
    let source_bytes = scratch::file_size(&request.source)?;

    let ctx = FitContext {
        codec,
        request,
        window: request.window(),
        source_bytes,
        progress,
        cancel,
    };
    ctx.check_cancelled()?;

    // Decoded fully before anything is written, so source == destination is safe.
    let decoded = codec
        .decode(&request.source)
        .map_err(|source| FitError::Decode {
            path: request.source.display().to_string(),
            source,
        })?;
    let base = pre_scale(&ctx, decoded);

    let mut state = SearchState::new();
    for (phase, handler) in phases::PHASES {
        ctx.check_cancelled()?;
        if let Some(attempt) = handler(&ctx, &base, &mut state)? {
            return finalize(&ctx, phase, attempt, &state);
        }
    }

    Err(FitError::Encode(CodecError::Encode {
        format: Format::WebP,
        reason: "no phase produced an encodable result".into(),
    }))
}

fn pre_scale(ctx: &FitContext<'_>, image: DynamicImage) -> DynamicImage {
    let factor = match ctx.request.scale_factor {
        Some(f) if (f - 1.0).abs() > f64::EPSILON => f,
        _ => return image,
    };
    let from = image.dimensions();
    let (width, height) = scale_dimensions(from, factor);
    let scaled = ctx.codec.resize(&image, width, height, FilterType::Lanczos3);
    events::emit(
        ctx.progress,
        Event::PreScaled {
            file: ctx.request.source.clone(),
            from,
            to: (width, height),
        },
    );
    scaled
}

/// Write the accepted attempt to its destination.
fn finalize(
    ctx: &FitContext<'_>,
    phase: Phase,
    attempt: EncodeAttempt,
    state: &SearchState,
) -> Result<FitOutcome, FitError> {
    let dest = ctx.request.destination_path();
    let requested = Format::from_path(&dest);

    let converted = match requested {
        Some(Format::WebP) => Ok(None),
        Some(format) => match convert(ctx, &attempt, format) {
            Ok(bytes)
                if ctx.window.admits(bytes.len() as u64) || bytes.len() <= attempt.bytes.len() =>
            {
                Ok(Some((format, bytes)))
            }
            Ok(bytes) => Err(format!(
                "{format} output is {} bytes, over the {} byte limit and larger than WebP ({} bytes)",
                bytes.len(),
                ctx.window.upper,
                attempt.size()
            )),
            Err(e) => Err(e.to_string()),
        },
        None => Err("destination has no known image extension".to_string()),
    };

    let (final_path, format, bytes, format_fallback) = match converted {
        Ok(None) => (dest, Format::WebP, attempt.bytes.as_slice(), None),
        Ok(Some((format, ref bytes))) => (dest, format, bytes.as_slice(), None),
        Err(reason) => {
            let kept = dest.with_extension(Format::WebP.primary_extension());
            events::emit(
                ctx.progress,
                Event::FormatFallback {
                    file: ctx.request.source.clone(),
                    requested,
                    kept: kept.clone(),
                    reason: reason.clone(),
                },
            );
            let fallback = FormatFallback {
                requested,
                kept: kept.clone(),
                reason,
            };
            (kept, Format::WebP, attempt.bytes.as_slice(), Some(fallback))
        }
    };

    let final_bytes = scratch::write_atomically(&final_path, bytes)?;
    Ok(FitOutcome {
        final_path,
        final_bytes,
        phase_reached: phase,
        format,
        quality: attempt.quality,
        width: attempt.width,
        height: attempt.height,
        color_mode: attempt.color_mode,
        probes: state.probes,
        format_fallback,
    })
}

/// Re-encode the accepted pixels into `format`.
fn convert(
    ctx: &FitContext<'_>,
    attempt: &EncodeAttempt,
    format: Format,
) -> Result<Vec<u8>, CodecError> {
    let params = EncodeParams::lossy(format, attempt.quality.unwrap_or(Quality::MIN));
    let bytes = ctx.codec.encode(&attempt.pixels, &params)?;

    if format.supports_palette()
        && attempt.color_mode == ColorMode::Truecolor
        && !ctx.window.admits(bytes.len() as u64)
    {
        let paletted = ctx.codec.quantize_colors(&attempt.pixels, RETRY_PALETTE)?;
        let reduced = ctx.codec.encode(&paletted, &params)?;
        if reduced.len() < bytes.len() {
            return Ok(reduced);
        }
    }
    Ok(bytes)
}
