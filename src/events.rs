//! Progress events sent from library code to the CLI.
//!
//! Library functions never print. They take an optional
//! `std::sync::mpsc::Sender<Event>` and the binary formats whatever arrives
//! with [`crate::output::format_event`] on a printer thread.

use crate::batch::FileReport;
use crate::fit::Phase;
use crate::formats::Format;
use std::path::PathBuf;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A directory run found `total` images.
    BatchStarted { total: usize },
    /// The source was resized once before the search.
    PreScaled {
        file: PathBuf,
        from: (u32, u32),
        to: (u32, u32),
    },
    /// One encode of the size search. Only sent for verbose requests.
    Probe {
        file: PathBuf,
        phase: Phase,
        setting: ProbeSetting,
        outcome: ProbeOutcome,
    },
    /// The destination container could not hold the result; WebP was kept.
    FormatFallback {
        file: PathBuf,
        requested: Option<Format>,
        kept: PathBuf,
        reason: String,
    },
    /// `output` had already been written by another file of the batch and
    /// was replaced.
    OutputClash { file: PathBuf, output: PathBuf },
    FileFinished {
        index: usize,
        total: usize,
        report: FileReport,
    },
    FileFailed {
        index: usize,
        total: usize,
        source: PathBuf,
        error: String,
    },
}

/// What a probe varied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeSetting {
    Quality(u8),
    Scale { factor: f64, width: u32, height: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Size(u64),
    Failed(String),
}

/// Send if there is a listener. A dropped receiver is not an error.
pub(crate) fn emit(progress: Option<&Sender<Event>>, event: Event) {
    if let Some(tx) = progress {
        tx.send(event).ok();
    }
}
