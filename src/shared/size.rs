// This is free and unencumbered software released into the public domain.

use crate::shared::CameraError;
use derive_more::Display;
use std::str::FromStr;

/// Nominal aspect ratio requested from the device when ratio matching is on.
pub const DEFAULT_ASPECT_RATIO: f64 = 4.0 / 3.0;

/// How far a candidate's width/height may stray from the requested ratio.
pub const DEFAULT_ASPECT_TOLERANCE: f64 = 0.05;

/// A capture resolution, either device-supported or requested.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
#[display("{width}x{height}")]
pub struct CaptureSize {
    pub width: u32,
    pub height: u32,
}

impl CaptureSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Whether this size fits within `bounds` in both dimensions.
    #[inline]
    pub fn fits_within(&self, bounds: CaptureSize) -> bool {
        self.width <= bounds.width && self.height <= bounds.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for CaptureSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl FromStr for CaptureSize {
    type Err = CameraError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim().replace('×', "x");
        let parts: Vec<&str> = s.split(['x', 'X']).map(|t| t.trim()).collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(CameraError::invalid_config(format!(
                "invalid size '{input}', use WxH (e.g., 1024x768)"
            )));
        }

        let width: u32 = parts[0]
            .parse()
            .map_err(|_| CameraError::invalid_config(format!("invalid width: {}", parts[0])))?;
        let height: u32 = parts[1]
            .parse()
            .map_err(|_| CameraError::invalid_config(format!("invalid height: {}", parts[1])))?;

        let size = CaptureSize { width, height };
        if size.is_empty() {
            return Err(CameraError::invalid_config(format!(
                "size {size} has a zero dimension"
            )));
        }
        Ok(size)
    }
}

/// Whether the negotiator must honor an aspect ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AspectRatioPolicy {
    /// Any supported size within the target bounds.
    Unconstrained,
    /// Only sizes whose width/height is within `tolerance` of `ratio`,
    /// falling back to unconstrained matching when none qualifies.
    ForceRatio { ratio: f64, tolerance: f64 },
}

impl Default for AspectRatioPolicy {
    fn default() -> Self {
        Self::ForceRatio {
            ratio: DEFAULT_ASPECT_RATIO,
            tolerance: DEFAULT_ASPECT_TOLERANCE,
        }
    }
}

impl AspectRatioPolicy {
    pub fn force_ratio(ratio: f64, tolerance: f64) -> Result<Self, CameraError> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(CameraError::invalid_config(format!(
                "aspect ratio must be positive, got {ratio}"
            )));
        }
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(CameraError::invalid_config(format!(
                "aspect tolerance must be positive, got {tolerance}"
            )));
        }
        Ok(Self::ForceRatio { ratio, tolerance })
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, Self::ForceRatio { .. })
    }
}
