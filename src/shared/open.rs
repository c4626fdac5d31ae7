// This is free and unencumbered software released into the public domain.

use super::{CameraConfig, CameraError, CameraPlatform};
use std::sync::Arc;

/// Driver names accepted by [`open_platform`], in preference order.
pub const DRIVERS: &[&str] = &[
    #[cfg(feature = "ffmpeg")]
    "ffmpeg",
    "synthetic",
];

/// Opens the camera platform named `driver` (`"ffmpeg"` or `"synthetic"`).
#[cfg_attr(not(feature = "ffmpeg"), allow(unused_variables))]
pub fn open_platform(
    driver: impl AsRef<str>,
    config: &CameraConfig,
) -> Result<Arc<dyn CameraPlatform>, CameraError> {
    match driver.as_ref() {
        #[cfg(feature = "ffmpeg")]
        "ffmpeg" => Ok(Arc::new(super::drivers::ffmpeg::FfmpegPlatform::new(config))),
        "synthetic" => Ok(Arc::new(super::drivers::synthetic::SyntheticPlatform::demo())),
        _ => Err(CameraError::NoDriver),
    }
}

/// Opens the first available driver.
pub fn open_default_platform(config: &CameraConfig) -> Result<Arc<dyn CameraPlatform>, CameraError> {
    let driver = DRIVERS.first().ok_or(CameraError::NoDriver)?;
    open_platform(driver, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_the_synthetic_driver() {
        let platform = open_platform("synthetic", &CameraConfig::default()).unwrap();
        assert_eq!(platform.name(), "synthetic");
        assert_eq!(platform.devices().unwrap().len(), 2);
    }

    #[test]
    fn rejects_unknown_drivers() {
        assert!(matches!(
            open_platform("v4l1", &CameraConfig::default()),
            Err(CameraError::NoDriver)
        ));
    }
}
