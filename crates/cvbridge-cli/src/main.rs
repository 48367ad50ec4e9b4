//! cvbridge CLI: chessboard calibration and ArUco detection over image files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cvbridge::io::{CalibrationConfig, CalibrationReport, DetectionReport, IoError};
use cvbridge::{BoardSpec, BridgeError, CvBridge, ImageView};
use cvbridge_opencv::{ArucoDictionary, OpenCvBackend, OpenCvConfig, UnknownDictionary};
use log::LevelFilter;

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("failed to open image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Dictionary(#[from] UnknownDictionary),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
    #[error("chessboard not found in any of {0} images")]
    NoBoard(usize),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "cvbridge")]
#[command(about = "Chessboard camera calibration and ArUco marker detection via OpenCV")]
#[command(version)]
struct Cli {
    /// Log verbosity on stderr [default: $CVBRIDGE_LOG, else info].
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect ArUco markers in one image.
    Detect(DetectArgs),

    /// Calibrate a camera from chessboard images.
    Calibrate(CalibrateArgs),
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Input image.
    #[arg(long)]
    image: PathBuf,

    /// Predefined dictionary name, e.g. DICT_6X6_250.
    #[arg(long, default_value = "DICT_6X6_250")]
    dictionary: String,

    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// JSON calibration config (`images`, `board`, `output_path`). The board
    /// comes from the file, so board flags cannot be combined with it.
    #[arg(
        long,
        conflicts_with_all = [
            "images",
            "corners_wide",
            "corners_high",
            "corner_length",
            "corner_separation",
        ]
    )]
    config: Option<PathBuf>,

    /// Calibration images, in capture order.
    #[arg(long, num_args = 1..)]
    images: Vec<PathBuf>,

    #[command(flatten)]
    board: BoardArgs,

    /// Sub-pixel refinement half-window in pixels; 0 disables refinement.
    #[arg(long, default_value_t = 11)]
    subpix_window: u32,

    /// Report path; overrides the config's `output_path`.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Copy)]
struct BoardArgs {
    /// Inner corners along the board width.
    #[arg(long, default_value_t = 6)]
    corners_wide: u32,
    /// Inner corners along the board height.
    #[arg(long, default_value_t = 9)]
    corners_high: u32,
    /// Square side length in board units.
    #[arg(long, default_value_t = 0.024)]
    corner_length: f32,
    /// Distance between adjacent corners in board units.
    #[arg(long, default_value_t = 0.024)]
    corner_separation: f32,
}

impl BoardArgs {
    fn to_spec(self) -> BoardSpec {
        BoardSpec {
            corner_count_wide: self.corners_wide,
            corner_count_high: self.corners_high,
            corner_length: self.corner_length,
            corner_separation: self.corner_separation,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Decoded RGBA image kept alive for the duration of the native calls.
struct LoadedImage {
    path: PathBuf,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl LoadedImage {
    fn open(path: &Path) -> CliResult<Self> {
        let rgba = image::open(path)
            .map_err(|source| CliError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        log::debug!("loaded {} ({width}x{height})", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            rgba: rgba.into_raw(),
        })
    }

    fn view(&self) -> CliResult<ImageView<'_>> {
        Ok(ImageView::from_bytes(self.width, self.height, &self.rgba)?)
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let logger = match cli.log_level {
        Some(level) => cvbridge::core::init_with_level(level.into()),
        None => cvbridge::core::init_from_env(LevelFilter::Info),
    };
    if let Err(err) = logger {
        eprintln!("logger: {err}");
    }

    let outcome = match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::Calibrate(args) => run_calibrate(&args),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

// ── detect ─────────────────────────────────────────────────────────────

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let dictionary: ArucoDictionary = args.dictionary.parse()?;
    let image = LoadedImage::open(&args.image)?;

    let backend = OpenCvBackend::new(OpenCvConfig {
        dictionary,
        ..OpenCvConfig::default()
    })?;
    let bridge = CvBridge::new(&backend);
    let detection = bridge.detect_markers(image.view()?)?;
    log::info!(
        "{}: {} markers, {} rejected candidates",
        image.name(),
        detection.marker_ids.len(),
        detection.rejected_candidates.len()
    );

    let report = DetectionReport {
        image_path: image.name(),
        backend: bridge.backend_name().to_owned(),
        width: image.width,
        height: image.height,
        detection,
    };
    match &args.out {
        Some(path) => {
            report.write_json(path)?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

// ── calibrate ──────────────────────────────────────────────────────────

fn resolve_calibration(args: &CalibrateArgs) -> CliResult<(CalibrationConfig, PathBuf)> {
    let config = match &args.config {
        Some(path) => CalibrationConfig::load_json(path)?,
        None => CalibrationConfig {
            images: args.images.iter().map(|p| p.display().to_string()).collect(),
            board: args.board.to_spec(),
            output_path: None,
        },
    };
    if config.images.is_empty() {
        return Err(CliError::Usage(
            "no calibration images; pass --images or --config".to_owned(),
        ));
    }
    let out = args.out.clone().unwrap_or_else(|| config.output_path());
    Ok((config, out))
}

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let (config, out) = resolve_calibration(args)?;
    let images = config
        .images
        .iter()
        .map(|p| LoadedImage::open(Path::new(p)))
        .collect::<CliResult<Vec<_>>>()?;

    let backend = OpenCvBackend::new(OpenCvConfig {
        subpix_window: args.subpix_window,
        ..OpenCvConfig::default()
    })?;
    let bridge = CvBridge::new(&backend);
    let mut report = CalibrationReport::new(bridge.backend_name(), config.board, images.len());

    let mut points = bridge.corner_accumulator()?;
    let mut last_found = None;
    for image in &images {
        if bridge.find_chessboard_corners(image.view()?, &config.board, &mut points)? {
            log::info!("{}: board found", image.name());
            report.views_found.push(image.name());
            last_found = Some(image);
        } else {
            log::info!("{}: board not found", image.name());
        }
    }

    let Some(reference) = last_found else {
        let err = CliError::NoBoard(images.len());
        report.set_error(&err);
        report.write_json(&out)?;
        return Err(err);
    };

    match bridge.calibrate_camera(reference.view()?, points) {
        Ok(calibration) => {
            log::info!(
                "calibrated from {} of {} views",
                report.views_found.len(),
                images.len()
            );
            report.set_calibration(calibration.into_data());
            report.write_json(&out)?;
            log::info!("report written to {}", out.display());
            Ok(())
        }
        Err(err) => {
            report.set_error(&err);
            report.write_json(&out)?;
            Err(err.into())
        }
    }
}
