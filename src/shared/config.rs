// This is free and unencumbered software released into the public domain.

use crate::shared::{
    AspectRatioPolicy, CameraError, CaptureSize, DEFAULT_ASPECT_RATIO, DEFAULT_ASPECT_TOLERANCE,
    Facing,
};

#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub facing: Facing,
    pub width: u32,
    pub height: u32,
    pub force_ratio: bool,
    pub aspect_ratio: f64,
    pub aspect_tolerance: f64,
    pub fps: f64,
    pub buffer_frames: usize,
    /// Use device #0 when no device has the requested facing.
    pub fallback_to_first_device: bool,
    pub diagnostics: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing: Facing::Back,
            width: 1024,
            height: 768,
            force_ratio: true,
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            aspect_tolerance: DEFAULT_ASPECT_TOLERANCE,
            fps: 30.0,
            buffer_frames: 2,
            fallback_to_first_device: false,
            diagnostics: false,
        }
    }
}

impl CameraConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = facing;
        self
    }

    pub fn with_target(mut self, size: CaptureSize) -> Self {
        self.width = size.width;
        self.height = size.height;
        self
    }

    pub fn with_force_ratio(mut self, enabled: bool) -> Self {
        self.force_ratio = enabled;
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: f64, tolerance: f64) -> Self {
        self.aspect_ratio = ratio;
        self.aspect_tolerance = tolerance;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_buffer_frames(mut self, n: usize) -> Self {
        self.buffer_frames = n.max(1);
        self
    }

    pub fn with_fallback_to_first_device(mut self, enabled: bool) -> Self {
        self.fallback_to_first_device = enabled;
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn target(&self) -> CaptureSize {
        CaptureSize::new(self.width, self.height)
    }

    pub fn policy(&self) -> AspectRatioPolicy {
        if self.force_ratio {
            AspectRatioPolicy::ForceRatio {
                ratio: self.aspect_ratio,
                tolerance: self.aspect_tolerance,
            }
        } else {
            AspectRatioPolicy::Unconstrained
        }
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        if self.target().is_empty() {
            return Err(CameraError::invalid_config(format!(
                "target size {} has a zero dimension",
                self.target()
            )));
        }
        if self.force_ratio {
            AspectRatioPolicy::force_ratio(self.aspect_ratio, self.aspect_tolerance)?;
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(CameraError::invalid_config(format!(
                "frame rate must be positive, got {}",
                self.fps
            )));
        }
        Ok(())
    }
}
