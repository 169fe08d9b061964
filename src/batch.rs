//! Directory batches.
//!
//! Collects every decodable image under an input directory and runs one job
//! per file on the rayon pool. Outputs mirror the input layout under the
//! output directory (default `<input_dir>_compressed`, a sibling of the
//! input). A failing file is recorded in the report and does not stop the
//! others.
//!
//! Two inputs can land on one output, e.g. `a.png` and `a.jpg` both falling
//! back to `a.webp`. The later one wins; its report is marked with
//! `output_clash` and an [`Event::OutputClash`] is sent.
//!
//! ```text
//! photos/                    photos_compressed/
//! ├── a.jpg          ──►     ├── a.jpg
//! └── trips/                 └── trips/
//!     └── b.png                  └── b.png
//! ```

use crate::compress::{self, CompressError, CompressRequest};
use crate::events::{self, Event};
use crate::fit::{self, FitError, FitRequest, Phase};
use crate::formats::{self, Format};
use crate::imaging::{Codec, Quality, RustCodec};
use crate::scratch;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::Sender;
use thiserror::Error;
use walkdir::WalkDir;

const OUTPUT_DIR_SUFFIX: &str = "_compressed";

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Error from a single job, in either mode.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Compress(#[from] CompressError),
}

/// What to do with each file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Re-encode once at a fixed quality.
    Compress {
        quality: Quality,
        format: Option<Format>,
    },
    /// Search for the best result under a byte budget.
    Fit {
        target_bytes: u64,
        tolerance_percent: f64,
        scale_factor: Option<f64>,
    },
}

impl Mode {
    pub fn label(&self) -> String {
        match self {
            Mode::Compress { quality, format } => match format {
                Some(f) => format!("quality {} → {f}", quality.value()),
                None => format!("quality {}", quality.value()),
            },
            Mode::Fit {
                target_bytes,
                tolerance_percent,
                ..
            } => format!(
                "target {} ±{tolerance_percent}%",
                crate::output::human_size(*target_bytes)
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub mode: Mode,
    pub output_dir: Option<PathBuf>,
    pub recursive: bool,
    pub verbose: bool,
}

/// Result of one successful job, in either mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub mode: String,
    pub format: Format,
    pub original_bytes: u64,
    pub final_bytes: u64,
    /// Percent saved relative to the original.
    pub ratio: f64,
    /// Size mode only.
    pub phase: Option<Phase>,
    pub format_fallback: bool,
    /// Another file in the same batch already wrote this output.
    pub output_clash: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFile {
    pub source: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: Vec<FileReport>,
    pub failed: Vec<FailedFile>,
}

impl BatchReport {
    pub fn original_bytes(&self) -> u64 {
        self.succeeded.iter().map(|r| r.original_bytes).sum()
    }

    pub fn final_bytes(&self) -> u64 {
        self.succeeded.iter().map(|r| r.final_bytes).sum()
    }
}

/// `photos` → `photos_compressed`, next to it.
pub fn default_output_dir(input_dir: &Path) -> PathBuf {
    let name = input_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "images".to_string());
    input_dir.with_file_name(format!("{name}{OUTPUT_DIR_SUFFIX}"))
}

/// Decodable images in `dir`, sorted. Top level only unless `recursive`.
pub fn collect_images(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, BatchError> {
    if !dir.is_dir() {
        return Err(BatchError::NotADirectory(dir.to_path_buf()));
    }
    let walker = WalkDir::new(dir).min_depth(1);
    let walker = if recursive { walker } else { walker.max_depth(1) };

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file()
            && formats::is_supported_input(path)
            && !scratch::is_scratch_file(path)
        {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Where `file` (inside `input_dir`) goes under `output_dir`.
///
/// Compress mode with a target format swaps the extension.
pub fn output_path_for(input_dir: &Path, output_dir: &Path, file: &Path, mode: &Mode) -> PathBuf {
    let relative = file.strip_prefix(input_dir).unwrap_or(file);
    let out = output_dir.join(relative);
    match mode {
        Mode::Compress {
            format: Some(f), ..
        } => out.with_extension(f.primary_extension()),
        _ => out,
    }
}

/// Run one job. `destination` `None` uses the mode's default naming.
pub fn run_job(
    codec: &impl Codec,
    source: &Path,
    destination: Option<PathBuf>,
    mode: &Mode,
    verbose: bool,
    progress: Option<&Sender<Event>>,
) -> Result<FileReport, JobError> {
    match *mode {
        Mode::Compress { quality, format } => {
            let request = CompressRequest {
                source: source.to_path_buf(),
                destination,
                quality,
                format,
            };
            let outcome = compress::compress_with(codec, &request)?;
            Ok(FileReport {
                source: source.to_path_buf(),
                output: outcome.final_path,
                mode: mode.label(),
                format: outcome.format,
                original_bytes: outcome.original_bytes,
                final_bytes: outcome.final_bytes,
                ratio: crate::output::compression_ratio(
                    outcome.original_bytes,
                    outcome.final_bytes,
                ),
                phase: None,
                format_fallback: false,
                output_clash: false,
            })
        }
        Mode::Fit {
            target_bytes,
            tolerance_percent,
            scale_factor,
        } => {
            let request = FitRequest {
                source: source.to_path_buf(),
                destination,
                target_bytes,
                tolerance_percent,
                scale_factor,
                verbose,
            };
            let original_bytes = scratch::file_size(source).map_err(FitError::from)?;
            let outcome = fit::fit_to_size_with(codec, &request, progress, None)?;
            Ok(FileReport {
                source: source.to_path_buf(),
                output: outcome.final_path,
                mode: mode.label(),
                format: outcome.format,
                original_bytes,
                final_bytes: outcome.final_bytes,
                ratio: crate::output::compression_ratio(original_bytes, outcome.final_bytes),
                phase: Some(outcome.phase_reached),
                format_fallback: outcome.format_fallback.is_some(),
                output_clash: false,
            })
        }
    }
}

/// Process a directory with the production codec.
pub fn run_batch(
    input_dir: &Path,
    options: &BatchOptions,
    progress: Option<Sender<Event>>,
) -> Result<BatchReport, BatchError> {
    run_batch_with(&RustCodec::new(), input_dir, options, progress)
}

pub fn run_batch_with(
    codec: &impl Codec,
    input_dir: &Path,
    options: &BatchOptions,
    progress: Option<Sender<Event>>,
) -> Result<BatchReport, BatchError> {
    let files = collect_images(input_dir, options.recursive)?;
    let output_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(input_dir));
    let total = files.len();
    events::emit(progress.as_ref(), Event::BatchStarted { total });
    let written: Mutex<HashSet<PathBuf>> = Mutex::new(HashSet::new());

    let results: Vec<Result<FileReport, FailedFile>> = files
        .par_iter()
        .enumerate()
        .map(|(i, file)| {
            let dest = output_path_for(input_dir, &output_dir, file, &options.mode);
            let index = i + 1;
            match run_job(
                codec,
                file,
                Some(dest),
                &options.mode,
                options.verbose,
                progress.as_ref(),
            ) {
                Ok(mut report) => {
                    report.output_clash = written
                        .lock()
                        .map(|mut seen| !seen.insert(report.output.clone()))
                        .unwrap_or(false);
                    if report.output_clash {
                        events::emit(
                            progress.as_ref(),
                            Event::OutputClash {
                                file: file.clone(),
                                output: report.output.clone(),
                            },
                        );
                    }
                    events::emit(
                        progress.as_ref(),
                        Event::FileFinished {
                            index,
                            total,
                            report: report.clone(),
                        },
                    );
                    Ok(report)
                }
                Err(e) => {
                    events::emit(
                        progress.as_ref(),
                        Event::FileFailed {
                            index,
                            total,
                            source: file.clone(),
                            error: e.to_string(),
                        },
                    );
                    Err(FailedFile {
                        source: file.clone(),
                        error: e.to_string(),
                    })
                }
            }
        })
        .collect();

    let mut report = BatchReport {
        total,
        ..Default::default()
    };
    for result in results {
        match result {
            Ok(r) => report.succeeded.push(r),
            Err(f) => report.failed.push(f),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockCodec;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; 2048]).unwrap();
    }

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("photos");
        touch(&input.join("b.png"));
        touch(&input.join("a.JPG"));
        touch(&input.join("notes.txt"));
        touch(&input.join("render.avif"));
        touch(&input.join("trips/c.webp"));
        touch(&input.join(".imgfit-x1y2.tmp"));
        tmp
    }

    fn compress_mode() -> Mode {
        Mode::Compress {
            quality: Quality::new(70),
            format: None,
        }
    }

    #[test]
    fn collects_top_level_only_by_default() {
        let tmp = fixture();
        let input = tmp.path().join("photos");
        let files = collect_images(&input, false).unwrap();
        assert_eq!(files, vec![input.join("a.JPG"), input.join("b.png")]);
    }

    #[test]
    fn collects_recursively() {
        let tmp = fixture();
        let input = tmp.path().join("photos");
        let files = collect_images(&input, true).unwrap();
        assert_eq!(
            files,
            vec![
                input.join("a.JPG"),
                input.join("b.png"),
                input.join("trips/c.webp")
            ]
        );
    }

    #[test]
    fn collect_rejects_file() {
        let tmp = fixture();
        let result = collect_images(&tmp.path().join("photos/b.png"), false);
        assert!(matches!(result, Err(BatchError::NotADirectory(_))));
    }

    #[test]
    fn default_output_dir_is_sibling() {
        assert_eq!(
            default_output_dir(Path::new("/data/photos")),
            PathBuf::from("/data/photos_compressed")
        );
    }

    #[test]
    fn output_path_preserves_layout() {
        let mode = compress_mode();
        assert_eq!(
            output_path_for(
                Path::new("/in"),
                Path::new("/out"),
                Path::new("/in/trips/c.png"),
                &mode
            ),
            PathBuf::from("/out/trips/c.png")
        );
        let to_webp = Mode::Compress {
            quality: Quality::default(),
            format: Some(Format::WebP),
        };
        assert_eq!(
            output_path_for(
                Path::new("/in"),
                Path::new("/out"),
                Path::new("/in/c.png"),
                &to_webp
            ),
            PathBuf::from("/out/c.webp")
        );
    }

    #[test]
    fn batch_writes_mirrored_outputs() {
        let tmp = fixture();
        let input = tmp.path().join("photos");
        let options = BatchOptions {
            mode: compress_mode(),
            output_dir: None,
            recursive: true,
            verbose: false,
        };

        let report = run_batch_with(&MockCodec::new(), &input, &options, None).unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded.len(), 3);
        assert!(report.failed.is_empty());
        let out = tmp.path().join("photos_compressed");
        assert!(out.join("a.JPG").exists());
        assert!(out.join("b.png").exists());
        assert!(out.join("trips/c.webp").exists());
    }

    #[test]
    fn one_failure_does_not_stop_batch() {
        let tmp = fixture();
        let input = tmp.path().join("photos");
        let options = BatchOptions {
            mode: Mode::Compress {
                quality: Quality::new(70),
                format: Some(Format::Png),
            },
            output_dir: Some(tmp.path().join("out")),
            recursive: false,
            verbose: false,
        };
        let codec = MockCodec::new().failing_format(Format::Png);
        let (tx, rx) = mpsc::channel();

        let report = run_batch_with(&codec, &input, &options, Some(tx)).unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.failed.len(), 2);
        let events: Vec<Event> = rx.into_iter().collect();
        assert_eq!(events[0], Event::BatchStarted { total: 2 });
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, Event::FileFailed { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn fit_mode_reports_phase() {
        let tmp = fixture();
        let input = tmp.path().join("photos");
        let options = BatchOptions {
            mode: Mode::Fit {
                target_bytes: 50_000_000,
                tolerance_percent: 5.0,
                scale_factor: None,
            },
            output_dir: None,
            recursive: false,
            verbose: false,
        };

        let report = run_batch_with(&MockCodec::new(), &input, &options, None).unwrap();

        assert_eq!(report.succeeded.len(), 2);
        for file in &report.succeeded {
            assert_eq!(file.phase, Some(Phase::Quality));
            assert_eq!(file.original_bytes, 2048);
        }
    }

    #[test]
    fn shared_output_is_flagged() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("photos");
        touch(&input.join("a.png"));
        touch(&input.join("a.jpg"));
        touch(&input.join("b.png"));
        let options = BatchOptions {
            mode: Mode::Compress {
                quality: Quality::new(70),
                format: Some(Format::WebP),
            },
            output_dir: None,
            recursive: false,
            verbose: false,
        };
        let (tx, rx) = mpsc::channel();

        let report = run_batch_with(&MockCodec::new(), &input, &options, Some(tx)).unwrap();

        assert_eq!(report.succeeded.len(), 3);
        let clashed: Vec<&FileReport> =
            report.succeeded.iter().filter(|r| r.output_clash).collect();
        assert_eq!(clashed.len(), 1);
        assert_eq!(
            clashed[0].output,
            tmp.path().join("photos_compressed/a.webp")
        );
        let clash_events = rx
            .into_iter()
            .filter(|e| matches!(e, Event::OutputClash { .. }))
            .count();
        assert_eq!(clash_events, 1);
    }

    #[test]
    fn distinct_outputs_are_not_flagged() {
        let tmp = fixture();
        let input = tmp.path().join("photos");
        let options = BatchOptions {
            mode: compress_mode(),
            output_dir: None,
            recursive: true,
            verbose: false,
        };

        let report = run_batch_with(&MockCodec::new(), &input, &options, None).unwrap();

        assert!(report.succeeded.iter().all(|r| !r.output_clash));
    }

    #[test]
    fn totals_sum_successes() {
        let report = BatchReport {
            total: 2,
            succeeded: vec![FileReport {
                source: "a.png".into(),
                output: "out/a.png".into(),
                mode: "quality 80".into(),
                format: Format::Png,
                original_bytes: 1000,
                final_bytes: 250,
                ratio: 75.0,
                phase: None,
                format_fallback: false,
                output_clash: false,
            }],
            failed: vec![FailedFile {
                source: "b.png".into(),
                error: "boom".into(),
            }],
        };
        assert_eq!(report.original_bytes(), 1000);
        assert_eq!(report.final_bytes(), 250);
    }
}
