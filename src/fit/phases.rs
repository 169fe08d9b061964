//! The degradation tiers of the size search.
//!
//! Every phase has the same shape, [`PhaseHandler`]: it gets the request
//! context, the working image (already pre-scaled) and the shared
//! [`SearchState`], and returns the attempt to keep or `None` to hand over
//! to the next phase. Codec errors on individual probes are absorbed here;
//! only the last resort turns one into a failure.

use super::{EncodeAttempt, FitError, FitRequest, Phase, SearchState, ToleranceWindow};
use crate::events::{self, Event, ProbeOutcome, ProbeSetting};
use crate::formats::Format;
use crate::imaging::{
    Codec, ColorMode, EncodeParams, MIN_SCALE, Quality, initial_downscale, last_resort_dimensions,
    next_downscale, scale_dimensions,
};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

/// Maximum resize-and-encode rounds in the downscale phase.
pub const DOWNSCALE_ITERATIONS: usize = 10;

pub type PhaseHandler =
    fn(&FitContext<'_>, &DynamicImage, &mut SearchState) -> Result<Option<EncodeAttempt>, FitError>;

/// Phases in the order they are tried.
pub const PHASES: [(Phase, PhaseHandler); 3] = [
    (Phase::Quality, quality_search),
    (Phase::Downscale, progressive_downscale),
    (Phase::LastResort, last_resort),
];

/// Everything a phase needs besides the image and the search state.
pub struct FitContext<'a> {
    pub codec: &'a dyn Codec,
    pub request: &'a FitRequest,
    pub window: ToleranceWindow,
    /// Size of the source file on disk.
    pub source_bytes: u64,
    pub progress: Option<&'a Sender<Event>>,
    pub cancel: Option<&'a AtomicBool>,
}

impl FitContext<'_> {
    pub fn check_cancelled(&self) -> Result<(), FitError> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(FitError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Encode `image` as WebP at `quality`, recording the result.
    ///
    /// A codec error abandons this probe only and yields `None`.
    fn probe(
        &self,
        phase: Phase,
        image: &DynamicImage,
        quality: Quality,
        setting: ProbeSetting,
        state: &mut SearchState,
    ) -> Option<Vec<u8>> {
        let params = EncodeParams::lossy(Format::WebP, quality);
        let (result, outcome) = match self.codec.encode(image, &params) {
            Ok(bytes) => {
                let size = bytes.len() as u64;
                state.record_size(size);
                (Some(bytes), ProbeOutcome::Size(size))
            }
            Err(e) => {
                state.record_failure();
                (None, ProbeOutcome::Failed(e.to_string()))
            }
        };
        if self.request.verbose {
            events::emit(
                self.progress,
                Event::Probe {
                    file: self.request.source.clone(),
                    phase,
                    setting,
                    outcome,
                },
            );
        }
        result
    }
}

fn webp_attempt(
    bytes: Vec<u8>,
    quality: Quality,
    color_mode: ColorMode,
    pixels: DynamicImage,
) -> EncodeAttempt {
    let (width, height) = pixels.dimensions();
    EncodeAttempt {
        format: Format::WebP,
        quality: Some(quality),
        width,
        height,
        color_mode,
        bytes,
        pixels,
    }
}

/// Phase 1: binary search over WebP quality at full resolution.
///
/// The ceiling is probed first so an already-small image costs one encode.
/// Feasible means at or below the target; the highest feasible quality wins.
pub fn quality_search(
    ctx: &FitContext<'_>,
    image: &DynamicImage,
    state: &mut SearchState,
) -> Result<Option<EncodeAttempt>, FitError> {
    let ceiling = Quality::SEARCH_CEILING;
    if let Some(bytes) = ctx.probe(
        Phase::Quality,
        image,
        ceiling,
        ProbeSetting::Quality(ceiling.value()),
        state,
    ) {
        if ctx.window.is_feasible(bytes.len() as u64) {
            return Ok(Some(webp_attempt(
                bytes,
                ceiling,
                ColorMode::Truecolor,
                image.clone(),
            )));
        }
    }

    state.low = Quality::SEARCH_FLOOR.value();
    state.high = ceiling.value() - 1;
    while state.low <= state.high {
        ctx.check_cancelled()?;
        let mid = state.low + (state.high - state.low) / 2;
        let quality = Quality::new(mid);
        let probed = ctx.probe(
            Phase::Quality,
            image,
            quality,
            ProbeSetting::Quality(mid),
            state,
        );
        match probed {
            Some(bytes) if ctx.window.is_feasible(bytes.len() as u64) => {
                state.best = Some(webp_attempt(
                    bytes,
                    quality,
                    ColorMode::Truecolor,
                    image.clone(),
                ));
                state.low = mid + 1;
            }
            // Too large, or the encode failed: look lower.
            _ => state.high = mid - 1,
        }
    }

    Ok(state.best.take())
}

/// Phase 2: grayscale, then shrink geometrically at minimum quality.
///
/// The initial scale is measured against the smallest size Phase 1 produced,
/// not the source file size; the source size is used only when every probe
/// failed. A source much larger than its WebP encode therefore starts this
/// phase at a larger scale.
pub fn progressive_downscale(
    ctx: &FitContext<'_>,
    image: &DynamicImage,
    state: &mut SearchState,
) -> Result<Option<EncodeAttempt>, FitError> {
    let gray = ctx.codec.to_grayscale(image);
    let reference = state.smallest_probe.unwrap_or(ctx.source_bytes);
    let mut scale = initial_downscale(ctx.window.target, reference);

    for _ in 0..DOWNSCALE_ITERATIONS {
        ctx.check_cancelled()?;
        let (width, height) = scale_dimensions(gray.dimensions(), scale);
        let resized = ctx.codec.resize(&gray, width, height, FilterType::Lanczos3);
        let setting = ProbeSetting::Scale {
            factor: scale,
            width,
            height,
        };
        if let Some(bytes) = ctx.probe(Phase::Downscale, &resized, Quality::MIN, setting, state) {
            if ctx.window.admits(bytes.len() as u64) {
                return Ok(Some(webp_attempt(
                    bytes,
                    Quality::MIN,
                    ColorMode::Grayscale,
                    resized,
                )));
            }
        }
        // Nothing left to shrink.
        if scale <= MIN_SCALE {
            break;
        }
        scale = next_downscale(scale);
    }

    Ok(None)
}

/// Phase 3: a fifth of each edge, grayscale, minimum quality. Always accepted.
pub fn last_resort(
    ctx: &FitContext<'_>,
    image: &DynamicImage,
    state: &mut SearchState,
) -> Result<Option<EncodeAttempt>, FitError> {
    let (width, height) = last_resort_dimensions(image.dimensions());
    let resized = ctx.codec.resize(image, width, height, FilterType::Lanczos3);
    let gray = ctx.codec.to_grayscale(&resized);

    let params = EncodeParams::lossy(Format::WebP, Quality::MIN);
    let encoded = ctx.codec.encode(&gray, &params);
    let outcome = match &encoded {
        Ok(bytes) => ProbeOutcome::Size(bytes.len() as u64),
        Err(e) => ProbeOutcome::Failed(e.to_string()),
    };
    if ctx.request.verbose {
        events::emit(
            ctx.progress,
            Event::Probe {
                file: ctx.request.source.clone(),
                phase: Phase::LastResort,
                setting: ProbeSetting::Scale {
                    factor: f64::from(width) / f64::from(image.width().max(1)),
                    width,
                    height,
                },
                outcome,
            },
        );
    }

    match encoded {
        Ok(bytes) => {
            state.record_size(bytes.len() as u64);
            Ok(Some(webp_attempt(
                bytes,
                Quality::MIN,
                ColorMode::Grayscale,
                gray,
            )))
        }
        Err(e) => {
            state.record_failure();
            Err(FitError::Encode(e))
        }
    }
}
