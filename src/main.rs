use clap::{Args, Parser, Subcommand};
use imgfit::batch::{self, BatchOptions, Mode};
use imgfit::config::{self, ToolConfig};
use imgfit::events::Event;
use imgfit::formats::{self, Format};
use imgfit::imaging::{Quality, RustCodec};
use imgfit::output;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;

fn version_string() -> &'static str {
    let on_tag = env!("IMGFIT_ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("IMGFIT_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once; called a single time at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "imgfit")]
#[command(about = "Compress images to a quality or squeeze them under a byte budget")]
#[command(long_about = "\
Compress images to a quality or squeeze them under a byte budget

Two modes:

  compress   Re-encode once at a fixed quality, optionally converting format.
  fit        Find the best result under a size budget. Tries WebP quality
             first, then grayscale + downscaling, then a last-resort shrink.

INPUT may be a file or a directory. Directories are processed in parallel
and written to <INPUT>_compressed/ unless -o is given; -r descends into
subdirectories and keeps their layout.

Examples:

  imgfit compress photo.png -q 70 -f webp
  imgfit fit photo.jpg -s 200 -t 5
  imgfit fit photos/ -s 100 -c 0.5 -r -o small/

Settings can also come from ./imgfit.toml (or --config). Flags win.
Run 'imgfit gen-config' to generate a documented config file.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (default: ./imgfit.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show per-file details and every size probe
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Parallel workers for directory inputs (capped at CPU cores)
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-encode at a fixed quality
    Compress(CompressArgs),
    /// Compress under a target file size
    Fit(FitArgs),
    /// Show format, dimensions and size of an image
    Info {
        input: PathBuf,
    },
    /// Print a stock imgfit.toml with all options documented
    GenConfig,
}

#[derive(Args)]
struct CompressArgs {
    /// Image file or directory
    input: PathBuf,

    /// Output file, or output directory for directory inputs
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Quality 1-100 [config default: 85]
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Output format (JPEG, PNG, WEBP, GIF, BMP, TIFF, AVIF)
    #[arg(short, long, value_parser = parse_format)]
    format: Option<Format>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,
}

#[derive(Args)]
struct FitArgs {
    /// Image file or directory
    input: PathBuf,

    /// Output file, or output directory for directory inputs
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target size in KiB [config default: 200]
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=config::MAX_TARGET_KB))]
    size: Option<u64>,

    /// Tolerance in percent [config default: 5]
    #[arg(short, long, value_parser = parse_tolerance)]
    tolerance: Option<f64>,

    /// Pre-scale factor 0.1-1.0
    #[arg(short = 'c', long, value_parser = parse_scale)]
    scale: Option<f64>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,
}

fn parse_format(s: &str) -> Result<Format, String> {
    s.parse().map_err(|e: formats::FormatError| e.to_string())
}

fn parse_tolerance(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("tolerance must be greater than 0, got {value}"))
    }
}

fn parse_scale(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if (imgfit::fit::MIN_SCALE_FACTOR..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("scale must be between 0.1 and 1.0, got {value}"))
    }
}

/// Flags shared by every command that processes images.
struct RunFlags {
    verbose: bool,
    json: bool,
    jobs: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let flags = RunFlags {
        verbose: cli.verbose,
        json: cli.json,
        jobs: cli.jobs,
    };

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Info { input } => {
            let info = formats::probe(&input)?;
            if flags.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                output::print_info(&input, &info);
            }
        }
        Command::Compress(args) => {
            let config = config::load_config(Path::new("."), cli.config.as_deref())?;
            let mode = Mode::Compress {
                quality: Quality::new(args.quality.unwrap_or(config.compress.quality)),
                format: match args.format {
                    Some(f) => Some(f),
                    None => config.compress.format()?,
                },
            };
            run(&args.input, args.output, args.recursive, mode, &flags, &config)?;
        }
        Command::Fit(args) => {
            let config = config::load_config(Path::new("."), cli.config.as_deref())?;
            let target_kb = args.size.unwrap_or(config.fit.target_kb);
            let target_bytes = target_kb
                .checked_mul(1024)
                .ok_or_else(|| format!("target size {target_kb} KiB is too large"))?;
            let mode = Mode::Fit {
                target_bytes,
                tolerance_percent: args.tolerance.unwrap_or(config.fit.tolerance),
                scale_factor: args.scale.or(config.fit.scale),
            };
            run(&args.input, args.output, args.recursive, mode, &flags, &config)?;
        }
    }

    Ok(())
}

/// Process a file or directory in `mode`. Errors if any file failed.
fn run(
    input: &Path,
    output: Option<PathBuf>,
    recursive: bool,
    mode: Mode,
    flags: &RunFlags,
    config: &ToolConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel();
    let printer = spawn_printer(rx, flags);

    if input.is_dir() {
        let mut processing = config.processing.clone();
        if flags.jobs.is_some() {
            processing.max_processes = flags.jobs;
        }
        init_thread_pool(&processing);

        let options = BatchOptions {
            mode,
            output_dir: output,
            recursive,
            verbose: flags.verbose,
        };
        let report = batch::run_batch(input, &options, Some(tx))?;
        join_printer(printer)?;

        if flags.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            output::print_batch_summary(&report);
        }
        if !report.failed.is_empty() {
            return Err(format!("{} of {} files failed", report.failed.len(), report.total).into());
        }
        return Ok(());
    }

    let result = batch::run_job(
        &RustCodec::new(),
        input,
        output,
        &mode,
        flags.verbose,
        Some(&tx),
    );
    drop(tx);
    join_printer(printer)?;

    match result {
        Ok(report) => {
            if flags.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for line in output::format_file_report(1, &report, flags.verbose) {
                    println!("{}", line);
                }
            }
            Ok(())
        }
        Err(e) => {
            for line in output::format_failure(1, input, &e.to_string()) {
                eprintln!("{}", line);
            }
            Err(e.into())
        }
    }
}

/// Print progress events as they arrive. With `--json` they go to stderr so
/// stdout stays machine-readable.
fn spawn_printer(rx: Receiver<Event>, flags: &RunFlags) -> JoinHandle<()> {
    let verbose = flags.verbose;
    let to_stderr = flags.json;
    std::thread::spawn(move || {
        for event in rx {
            for line in output::format_event(&event, verbose) {
                if to_stderr {
                    eprintln!("{}", line);
                } else {
                    println!("{}", line);
                }
            }
        }
    })
}

fn join_printer(printer: JoinHandle<()>) -> Result<(), Box<dyn std::error::Error>> {
    printer
        .join()
        .map_err(|_| "progress printer thread panicked".into())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
