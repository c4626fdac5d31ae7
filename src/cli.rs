// This is free and unencumbered software released into the public domain.

//! Error reporting and user messages for the command-line tools.

use crate::shared::{CameraError, DRIVERS};
use asimov_module::SysexitsError::{self, *};
use clientele::StandardOptions;

/// Reports `err` on stderr (with its causes when verbose, and a hint when
/// one applies) and returns the matching exit code.
pub fn handle_error(err: &CameraError, flags: &StandardOptions) -> SysexitsError {
    use std::error::Error as _;

    #[cfg(feature = "tracing")]
    asimov_module::tracing::error!(target: "asimov_camera_holder", %err, "camera command failed");

    eprintln!("ERROR: {err}");
    if flags.debug || flags.verbose >= 2 {
        let mut source = err.source();
        while let Some(cause) = source {
            eprintln!("  Caused by: {cause}");
            source = cause.source();
        }
    }
    if let Some(hint) = hint(err) {
        eprintln!("HINT: {hint}");
    }

    map_error_to_sysexit(err)
}

pub fn info_user(flags: &StandardOptions, msg: &str) {
    if flags.debug || flags.verbose >= 1 {
        eprintln!("INFO: {msg}");
    }

    #[cfg(feature = "tracing")]
    asimov_module::tracing::info!(target: "asimov_camera_holder", "{msg}");
}

pub fn warn_user(flags: &StandardOptions, msg: &str) {
    if flags.debug || flags.verbose >= 1 {
        eprintln!("WARN: {msg}");
    }

    #[cfg(feature = "tracing")]
    asimov_module::tracing::warn!(target: "asimov_camera_holder", "{msg}");
}

/// What the user can try next, for failures caused by their setup rather
/// than by a bug.
pub fn hint(err: &CameraError) -> Option<String> {
    match err {
        CameraError::NoDriver => Some(format!("pass --driver with one of: {}", DRIVERS.join(", "))),
        CameraError::NoMatchingDevice { .. } => Some(
            "try the other --facing, or drop --strict-facing to use the first camera".into(),
        ),
        CameraError::Acquisition { .. } => {
            Some("the camera may be busy in another program, or access was denied".into())
        },
        CameraError::InvalidConfig(_) => Some("check --size, --tolerance and --fps".into()),
        _ => None,
    }
}

pub fn map_error_to_sysexit(err: &CameraError) -> SysexitsError {
    match err {
        CameraError::NoDriver
        | CameraError::NoMatchingDevice { .. }
        | CameraError::Acquisition { .. }
        | CameraError::Unsupported(_) => EX_UNAVAILABLE,
        CameraError::InvalidConfig(_) => EX_USAGE,
        CameraError::Release { .. } | CameraError::Closed => EX_IOERR,
        CameraError::NotOpen | CameraError::DriverError { .. } | CameraError::Other(_) => {
            EX_SOFTWARE
        },
    }
}
