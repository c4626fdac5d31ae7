// This is free and unencumbered software released into the public domain.

#[cfg(not(feature = "std"))]
compile_error!("asimov-camera-holder requires the 'std' feature");

use asimov_camera_holder::{
    cli,
    shared::{
        CameraConfig, CameraError, CameraHolder, CameraRegistry, CaptureSize, Facing, Frame,
        FrameSink, open_platform,
    },
};
use asimov_module::SysexitsError::{self, *};
use clap::Parser;
use clientele::StandardOptions;
use serde_json::json;
use std::{
    error::Error as StdError,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    flags: StandardOptions,

    /// Camera backend to use
    #[arg(long, default_value = if cfg!(feature = "ffmpeg") { "ffmpeg" } else { "synthetic" })]
    driver: String,

    /// Which way the camera should face: front or back
    #[arg(long, default_value = "back")]
    facing: Facing,

    /// Fail instead of falling back to the first camera when none faces the right way
    #[arg(long)]
    strict_facing: bool,

    /// Upper bound for the negotiated preview size
    #[arg(short, long, default_value = "1024x768")]
    size: CaptureSize,

    /// Accept any aspect ratio instead of preferring 4:3
    #[arg(long)]
    no_force_ratio: bool,

    /// Allowed deviation from the 4:3 aspect ratio
    #[arg(long, default_value_t = 0.05)]
    tolerance: f64,

    #[arg(long, value_parser = parse_frequency, default_value = "30")]
    fps: f64,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Save the first frame as an image
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
}

pub fn main() -> Result<SysexitsError, Box<dyn StdError>> {
    asimov_module::dotenv().ok();
    let args = asimov_module::args_os()?;
    let options = Options::parse_from(args);

    if options.flags.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(EX_OK);
    }

    if options.flags.license {
        print!("{}", include_str!("../../UNLICENSE"));
        return Ok(EX_OK);
    }

    #[cfg(feature = "tracing")]
    asimov_module::init_tracing_subscriber(&options.flags).expect("failed to initialize logging");

    let exit_code = match run_holder(&options) {
        Ok(()) => EX_OK,
        Err(err) => cli::handle_error(&err, &options.flags),
    };

    Ok(exit_code)
}

fn run_holder(opts: &Options) -> Result<(), CameraError> {
    let config = CameraConfig::default()
        .with_facing(opts.facing)
        .with_target(opts.size)
        .with_force_ratio(!opts.no_force_ratio)
        .with_aspect_ratio(4.0 / 3.0, opts.tolerance)
        .with_fps(opts.fps)
        .with_fallback_to_first_device(!opts.strict_facing)
        .with_diagnostics(opts.flags.debug || opts.flags.verbose >= 3);
    config.validate()?;

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit2 = Arc::clone(&quit);
        ctrlc::set_handler(move || {
            quit2.store(true, Ordering::SeqCst);
        })
        .map_err(|e| CameraError::other(format!("{e}")))?;
    }

    let platform = open_platform(&opts.driver, &config)?;
    cli::info_user(
        &opts.flags,
        &format!("using the {} camera driver", platform.name()),
    );

    let registry = CameraRegistry::new();
    let holder = registry.replace(CameraHolder::new(platform, config));

    let sink = frame_sink(opts, Arc::clone(&quit));

    {
        let mut holder = holder.lock().unwrap_or_else(|p| p.into_inner());
        holder.set_sink(sink);
        holder.open(opts.facing)?;
        holder.start_capture()?;

        if let Some(size) = holder.resolved_size() {
            cli::info_user(
                &opts.flags,
                &format!(
                    "capturing {size} from camera #{}",
                    holder.device_index().unwrap_or_default()
                ),
            );
        }
    }

    while !quit.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }

    let closed = registry.with_active(|holder| {
        holder.stop_capture();
        let counts = holder.stats();
        if counts.dropped > 0 {
            cli::warn_user(
                &opts.flags,
                &format!("dropped {} frames under backpressure", counts.dropped),
            );
        }
        holder.close()
    });
    registry.shutdown();

    closed.transpose().map(|_| ())
}

fn frame_sink(opts: &Options, quit: Arc<AtomicBool>) -> FrameSink {
    let limit = opts.frames;
    let snapshot = Mutex::new(opts.snapshot.clone());
    let seen = AtomicU64::new(0);

    Arc::new(move |frame: Frame| {
        if quit.load(Ordering::SeqCst) {
            return;
        }

        if let Some(path) = snapshot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            save_snapshot(&frame, &path);
        }

        let line = json!({
            "device": frame.device_index,
            "facing": if frame.is_front_facing { "front" } else { "back" },
            "width": frame.width,
            "height": frame.height,
            "format": frame.pixel_format.to_string(),
            "sequence": frame.sequence,
            "timestamp_ns": frame.timestamp_ns,
            "bytes": frame.data.len(),
        });

        let mut out = io::stdout().lock();
        if let Err(err) = writeln!(&mut out, "{line}") {
            if err.kind() == io::ErrorKind::BrokenPipe {
                quit.store(true, Ordering::SeqCst);
            }
        }

        let count = seen.fetch_add(1, Ordering::Relaxed) + 1;
        if limit.is_some_and(|n| count >= n) {
            quit.store(true, Ordering::SeqCst);
        }
    })
}

fn save_snapshot(frame: &Frame, path: &Path) {
    let Some(image) = frame.to_rgb8() else {
        tracing::warn!(target: "asimov_camera_holder", "frame could not be converted to RGB");
        return;
    };
    if let Err(err) = image.save(path) {
        tracing::warn!(target: "asimov_camera_holder", %err, path = %path.display(), "failed to save snapshot");
    }
}

fn parse_frequency(s: &str) -> Result<f64, String> {
    let freq: f64 = s.parse().map_err(|_| format!("Invalid frequency: {s}"))?;

    if freq <= 0.0 {
        return Err("Frequency must be positive".to_string());
    }
    if freq > 240.0 {
        return Err(format!("Frequency {freq} Hz exceeds reasonable maximum (240 Hz)"));
    }
    if freq < 0.1 {
        return Err(format!("Frequency {freq} Hz is below reasonable minimum (0.1 Hz)"));
    }

    Ok(freq)
}
