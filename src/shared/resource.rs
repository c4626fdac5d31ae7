// This is free and unencumbered software released into the public domain.

use crate::shared::{CameraDevice, CameraError, CameraPlatform, Facing, TargetSurface};
use scopeguard::{ScopeGuard, guard};

/// An opened device together with the surface bound to it.
///
/// Releasing (explicitly or on drop) releases the surface, then the device.
/// Both releases are always attempted.
pub struct CameraResource {
    device: Box<dyn CameraDevice>,
    surface: Box<dyn TargetSurface>,
    facing: Facing,
    released: bool,
}

impl core::fmt::Debug for CameraResource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CameraResource")
            .field("index", &self.device.index())
            .field("surface", &self.surface.id())
            .field("facing", &self.facing)
            .finish()
    }
}

impl CameraResource {
    /// Opens device `index` and binds a fresh surface to it.
    ///
    /// Anything acquired before a failure is released before returning.
    pub fn acquire(
        platform: &dyn CameraPlatform,
        index: usize,
        facing: Facing,
    ) -> Result<Self, CameraError> {
        let device = platform
            .open_device(index)
            .map_err(|e| CameraError::acquisition(index, e))?;
        let mut device = guard(device, |mut device| {
            if let Err(err) = device.release() {
                tracing::warn!(target: "asimov_camera_holder", %err, "could not release camera device");
            }
        });

        let surface = platform
            .create_surface()
            .map_err(|e| CameraError::acquisition(index, e))?;
        let surface = guard(surface, |mut surface| {
            if let Err(err) = surface.release() {
                tracing::warn!(target: "asimov_camera_holder", %err, "could not release camera surface");
            }
        });

        device
            .bind_surface(&**surface)
            .map_err(|e| CameraError::acquisition(index, e))?;

        Ok(Self {
            surface: ScopeGuard::into_inner(surface),
            device: ScopeGuard::into_inner(device),
            facing,
            released: false,
        })
    }

    pub fn index(&self) -> usize {
        self.device.index()
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn device(&self) -> &dyn CameraDevice {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> &mut dyn CameraDevice {
        self.device.as_mut()
    }

    /// Releases the surface, then the device.
    ///
    /// A single failure is logged and swallowed; only when both releases fail
    /// is an error returned.
    pub fn release(mut self) -> Result<(), CameraError> {
        self.release_all()
    }

    fn release_all(&mut self) -> Result<(), CameraError> {
        self.released = true;

        let surface = self.surface.release();
        if let Err(ref err) = surface {
            tracing::warn!(target: "asimov_camera_holder", %err, "could not release camera surface");
        }

        let device = self.device.release();
        if let Err(ref err) = device {
            tracing::warn!(target: "asimov_camera_holder", %err, "could not release camera device");
        }

        match (surface, device) {
            (Err(surface), Err(device)) => Err(CameraError::Release {
                surface: Box::new(surface),
                device: Box::new(device),
            }),
            _ => Ok(()),
        }
    }
}

impl Drop for CameraResource {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.release_all();
        }
    }
}
