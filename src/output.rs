//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Per file
//!
//! ```text
//! ✓ 001 beach.jpg - saved 71.42%
//! ```
//!
//! With `--verbose` each file gets a block, and size-mode probes are listed
//! as they happen:
//!
//! ```text
//!     phase 1 quality 95: 48.21 KB
//!     phase 1 quality 47: 19.87 KB
//! ✓ 001 beach.jpg
//!     Output: beach_target_size.jpg
//!     Mode: target 20.00 KB ±5%
//!     Phase: 1 (quality search)
//!     Original: 1.20 MB
//!     Final: 19.87 KB
//!     Saved: 98.38%
//! ```
//!
//! ## Batch summary
//!
//! ```text
//! Processed 12 of 13 images (1 failed)
//!     Original: 24.10 MB
//!     Final: 3.02 MB
//!     Saved: 87.47%
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and, where the binary needs one, a `print_*` wrapper that
//! writes to stdout. Format functions are pure: no I/O, no side effects.

use crate::batch::{BatchReport, FileReport};
use crate::events::{Event, ProbeOutcome, ProbeSetting};
use crate::formats::FormatInfo;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Percent of the original saved, rounded to two decimals.
///
/// Zero when the original is empty; negative when the output grew.
pub fn compression_ratio(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let ratio = (original as f64 - compressed as f64) / original as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

/// Byte count as `B`, `KB` or `MB` (1024-based, two decimals above bytes).
pub fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    }
}

// ============================================================================
// Per-file output
// ============================================================================

/// Format a finished job.
pub fn format_file_report(index: usize, report: &FileReport, verbose: bool) -> Vec<String> {
    let name = file_name(&report.source);
    if !verbose {
        return vec![format!(
            "\u{2713} {} {} - saved {:.2}%",
            format_index(index),
            name,
            report.ratio
        )];
    }

    let pad = indent(1);
    let mut lines = vec![
        format!("\u{2713} {} {}", format_index(index), name),
        format!("{pad}Output: {}", report.output.display()),
        format!("{pad}Mode: {}", report.mode),
    ];
    if let Some(phase) = report.phase {
        lines.push(format!("{pad}Phase: {} ({phase})", phase.number()));
    }
    if report.format_fallback {
        lines.push(format!("{pad}Format: {} (fallback)", report.format));
    }
    if report.output_clash {
        lines.push(format!("{pad}Warning: output replaced another file's result"));
    }
    lines.push(format!("{pad}Original: {}", human_size(report.original_bytes)));
    lines.push(format!("{pad}Final: {}", human_size(report.final_bytes)));
    lines.push(format!("{pad}Saved: {:.2}%", report.ratio));
    lines
}

pub fn format_failure(index: usize, source: &Path, error: &str) -> Vec<String> {
    vec![format!(
        "\u{2717} {} {} - {}",
        format_index(index),
        file_name(source),
        error
    )]
}

// ============================================================================
// Progress events
// ============================================================================

/// Format a single progress event as display lines.
pub fn format_event(event: &Event, verbose: bool) -> Vec<String> {
    match event {
        Event::BatchStarted { total } => vec![format!("Found {total} images")],
        Event::PreScaled { file, from, to } => vec![format!(
            "{}{}: pre-scaled {}x{} \u{2192} {}x{}",
            indent(1),
            file_name(file),
            from.0,
            from.1,
            to.0,
            to.1
        )],
        Event::Probe {
            phase,
            setting,
            outcome,
            ..
        } => {
            let what = match setting {
                ProbeSetting::Quality(q) => format!("quality {q}"),
                ProbeSetting::Scale {
                    factor,
                    width,
                    height,
                } => format!("scale {factor:.2} ({width}x{height})"),
            };
            let result = match outcome {
                ProbeOutcome::Size(bytes) => human_size(*bytes),
                ProbeOutcome::Failed(reason) => format!("failed ({reason})"),
            };
            vec![format!(
                "{}phase {} {}: {}",
                indent(1),
                phase.number(),
                what,
                result
            )]
        }
        Event::FormatFallback {
            file,
            requested,
            kept,
            reason,
        } => {
            let requested = requested.map_or("unknown".to_string(), |f| f.to_string());
            vec![
                format!(
                    "{}{}: kept WebP instead of {} \u{2192} {}",
                    indent(1),
                    file_name(file),
                    requested,
                    kept.display()
                ),
                format!("{}{}", indent(2), reason),
            ]
        }
        Event::OutputClash { file, output } => vec![format!(
            "{}\u{26a0} {}: {} was already written by another file and has been replaced",
            indent(1),
            file_name(file),
            output.display()
        )],
        Event::FileFinished { index, report, .. } => format_file_report(*index, report, verbose),
        Event::FileFailed {
            index,
            source,
            error,
            ..
        } => format_failure(*index, source, error),
    }
}

// ============================================================================
// Summaries
// ============================================================================

pub fn format_batch_summary(report: &BatchReport) -> Vec<String> {
    let done = report.succeeded.len();
    let mut header = format!("Processed {done} of {} images", report.total);
    if !report.failed.is_empty() {
        header.push_str(&format!(" ({} failed)", report.failed.len()));
    }
    let mut lines = vec![header];
    if done > 0 {
        let original = report.original_bytes();
        let compressed = report.final_bytes();
        lines.push(format!("{}Original: {}", indent(1), human_size(original)));
        lines.push(format!("{}Final: {}", indent(1), human_size(compressed)));
        lines.push(format!(
            "{}Saved: {:.2}%",
            indent(1),
            compression_ratio(original, compressed)
        ));
    }
    lines
}

pub fn print_batch_summary(report: &BatchReport) {
    for line in format_batch_summary(report) {
        println!("{}", line);
    }
}

/// Format the result of `info`.
pub fn format_info(path: &Path, info: &FormatInfo) -> Vec<String> {
    let pad = indent(1);
    let detected = info.format.map_or("unknown".to_string(), |f| f.to_string());
    let mut lines = vec![
        file_name(path),
        format!("{pad}Format: {detected} ({})", info.mime),
    ];
    if let Some(by_ext) = info.detected_by_extension {
        if info.format != Some(by_ext) {
            lines.push(format!("{pad}Extension says: {by_ext}"));
        }
    }
    lines.push(format!("{pad}Dimensions: {}x{}", info.width, info.height));
    lines.push(format!("{pad}Color: {}", info.color));
    lines.push(format!("{pad}Size: {}", human_size(info.file_bytes)));
    lines.push(format!(
        "{pad}Supported: {}",
        if info.supported { "yes" } else { "no" }
    ));
    lines
}

pub fn print_info(path: &Path, info: &FormatInfo) {
    for line in format_info(path, info) {
        println!("{}", line);
    }
}
