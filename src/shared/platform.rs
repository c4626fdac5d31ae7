// This is free and unencumbered software released into the public domain.

use crate::shared::{CameraError, CaptureSize, DeviceInfo, FrameProducer, PixelFormat};
use std::{
    borrow::Cow,
    sync::atomic::{AtomicU64, Ordering},
};

/// A camera backend: device enumeration and acquisition.
pub trait CameraPlatform: Send + Sync {
    fn name(&self) -> Cow<'_, str>;

    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError>;

    fn open_device(&self, index: usize) -> Result<Box<dyn CameraDevice>, CameraError>;

    fn create_surface(&self) -> Result<Box<dyn TargetSurface>, CameraError> {
        Ok(Box::new(OffscreenSurface::new()))
    }
}

/// An opened camera device.
pub trait CameraDevice: Send {
    fn index(&self) -> usize;

    fn supported_sizes(&self) -> Result<Vec<CaptureSize>, CameraError>;

    /// Requests a preview size. The device may refuse it, or silently settle
    /// on a different one; read [`CameraDevice::preview_size`] afterwards.
    fn set_preview_size(&mut self, size: CaptureSize) -> Result<(), CameraError>;

    /// The size the device will actually stream, if it has settled on one.
    fn preview_size(&self) -> Option<CaptureSize>;

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Nv21
    }

    fn bind_surface(&mut self, surface: &dyn TargetSurface) -> Result<(), CameraError>;

    fn start_streaming(&mut self, producer: FrameProducer) -> Result<(), CameraError>;

    /// Halts streaming. Once this returns the device pushes no more frames.
    fn stop_streaming(&mut self) -> Result<(), CameraError>;

    fn release(&mut self) -> Result<(), CameraError>;
}

/// The surface a device renders its preview into.
pub trait TargetSurface: Send {
    fn id(&self) -> u64;

    fn release(&mut self) -> Result<(), CameraError>;
}

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// A surface nobody displays.
#[derive(Debug)]
pub struct OffscreenSurface {
    id: u64,
    released: bool,
}

impl OffscreenSurface {
    pub fn new() -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Default for OffscreenSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetSurface for OffscreenSurface {
    fn id(&self) -> u64 {
        self.id
    }

    fn release(&mut self) -> Result<(), CameraError> {
        self.released = true;
        Ok(())
    }
}
