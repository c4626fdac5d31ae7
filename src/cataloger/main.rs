// This is free and unencumbered software released into the public domain.

#[cfg(not(feature = "std"))]
compile_error!("asimov-camera-cataloger requires the 'std' feature");

use asimov_camera_holder::{
    cli,
    shared::{CameraConfig, CameraError, CaptureSize, open_platform},
};
use asimov_module::SysexitsError::{self, *};
use clap::Parser;
use clientele::StandardOptions;
use serde_json::json;
use std::error::Error as StdError;

#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    flags: StandardOptions,

    /// Camera backend to enumerate
    #[arg(long, default_value = if cfg!(feature = "ffmpeg") { "ffmpeg" } else { "synthetic" })]
    driver: String,

    #[arg(
        value_name = "FORMAT",
        short = 'o',
        long = "output",
        value_enum,
        default_value = "text"
    )]
    output: OutputFormat,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Jsonl,
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

    let exit_code = match run_cataloger(&options) {
        Ok(()) => EX_OK,
        Err(err) => cli::handle_error(&err, &options.flags),
    };

    Ok(exit_code)
}

fn run_cataloger(options: &Options) -> Result<(), CameraError> {
    cli::info_user(&options.flags, "enumerating camera devices");

    let platform = open_platform(&options.driver, &CameraConfig::default())?;
    let devices = platform.devices()?;
    if devices.is_empty() {
        cli::warn_user(&options.flags, "no camera devices found");
        return Ok(());
    }

    for d in devices {
        // Opening can fail for busy devices; list them without sizes.
        let sizes: Vec<CaptureSize> = match platform.open_device(d.index) {
            Ok(mut device) => {
                let sizes = device.supported_sizes().unwrap_or_default();
                if let Err(err) = device.release() {
                    cli::warn_user(
                        &options.flags,
                        &format!("failed to release camera #{}: {err}", d.index),
                    );
                }
                sizes
            },
            Err(err) => {
                cli::warn_user(
                    &options.flags,
                    &format!("could not open camera #{}: {err}", d.index),
                );
                Vec::new()
            },
        };

        match options.output {
            OutputFormat::Text => {
                let sizes = sizes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{}: {} [{}] {}", d.index, d.name, d.facing, sizes);
            },
            OutputFormat::Jsonl => {
                let sizes = sizes.iter().map(ToString::to_string).collect::<Vec<_>>();
                println!(
                    "{}",
                    json!({
                        "index": d.index,
                        "name": d.name,
                        "facing": d.facing.to_string(),
                        "sizes": sizes,
                    })
                );
            },
        }
    }

    Ok(())
}
