// This is free and unencumbered software released into the public domain.

use crate::shared::{
    AspectRatioPolicy, CameraConfig, CameraError, CameraPlatform, CameraResource, CaptureCounts,
    CaptureSize, CaptureStats, Dispatcher, Facing, FrameGate, FrameSink, Registration,
    find_facing_device, select,
};
use derive_more::Display;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Closed,
    Idle,
    Capturing,
}

/// Owns one camera device and streams its frames to a [`FrameSink`].
///
/// Lifecycle: [`open`](Self::open) → [`start_capture`](Self::start_capture)
/// (which negotiates the preview size) → frames → [`stop_capture`](Self::stop_capture)
/// → [`close`](Self::close). Control calls take `&mut self` and are meant for
/// a single control thread; frames are delivered on a dispatcher thread.
pub struct CameraHolder {
    platform: Arc<dyn CameraPlatform>,
    config: CameraConfig,
    state: ControllerState,
    resource: Option<CameraResource>,
    resolved: Option<CaptureSize>,
    device_index: Option<usize>,
    is_front_facing: bool,
    sink: Option<FrameSink>,
    gate: Arc<FrameGate>,
    dispatcher: Option<Dispatcher>,
    stats: Arc<CaptureStats>,
}

impl core::fmt::Debug for CameraHolder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CameraHolder")
            .field("platform", &self.platform.name())
            .field("state", &self.state)
            .field("resource", &self.resource)
            .field("resolved", &self.resolved)
            .field("device_index", &self.device_index)
            .field("is_front_facing", &self.is_front_facing)
            .field("sink", &self.sink.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

impl CameraHolder {
    pub fn new(platform: Arc<dyn CameraPlatform>, config: CameraConfig) -> Self {
        let stats = Arc::new(CaptureStats::default());
        Self {
            platform,
            config,
            state: ControllerState::Closed,
            resource: None,
            resolved: None,
            device_index: None,
            is_front_facing: false,
            sink: None,
            gate: Arc::new(FrameGate::new(Arc::clone(&stats))),
            dispatcher: None,
            stats,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn platform(&self) -> &dyn CameraPlatform {
        self.platform.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.resource.is_some()
    }

    /// The preview size the device accepted during the last configuration.
    pub fn resolved_size(&self) -> Option<CaptureSize> {
        self.resolved
    }

    pub fn resolved_width(&self) -> u32 {
        self.resolved.map(|s| s.width).unwrap_or(0)
    }

    pub fn resolved_height(&self) -> u32 {
        self.resolved.map(|s| s.height).unwrap_or(0)
    }

    pub fn device_index(&self) -> Option<usize> {
        self.device_index
    }

    pub fn is_front_facing(&self) -> bool {
        self.is_front_facing
    }

    pub fn stats(&self) -> CaptureCounts {
        self.stats.snapshot()
    }

    /// Sets the consumer of captured frames. Takes effect immediately when
    /// capturing.
    pub fn set_sink(&mut self, sink: FrameSink) {
        if self.dispatcher.is_some() {
            if let Some(registration) = self.registration(Arc::clone(&sink)) {
                self.gate.open(registration);
            }
        }
        self.sink = Some(sink);
    }

    pub fn clear_sink(&mut self) {
        self.gate.close();
        self.sink = None;
    }

    /// Acquires the first device facing `facing` and binds a target surface
    /// to it.
    ///
    /// On failure nothing stays acquired and the holder remains `Closed`.
    /// Calling this while a device is already held does nothing.
    pub fn open(&mut self, facing: Facing) -> Result<(), CameraError> {
        if self.resource.is_some() {
            tracing::debug!(target: "asimov_camera_holder", "camera already open");
            return Ok(());
        }

        let devices = self.platform.devices()?;
        let device = match find_facing_device(&devices, facing) {
            Some(index) => devices.iter().find(|d| d.index == index),
            None if self.config.fallback_to_first_device => {
                let first = devices.first();
                if let Some(d) = first {
                    tracing::warn!(
                        target: "asimov_camera_holder",
                        %facing,
                        index = d.index,
                        "no device with the requested facing, using the first device"
                    );
                }
                first
            },
            None => None,
        };
        let Some(device) = device else {
            tracing::error!(target: "asimov_camera_holder", %facing, "no matching camera device");
            return Err(CameraError::NoMatchingDevice { facing });
        };

        let resource = CameraResource::acquire(self.platform.as_ref(), device.index, device.facing)
            .inspect_err(|err| {
                tracing::error!(target: "asimov_camera_holder", %err, "error opening camera");
            })?;

        self.device_index = Some(resource.index());
        self.is_front_facing = resource.facing().is_front();
        self.resolved = None;
        self.resource = Some(resource);
        self.state = ControllerState::Idle;
        tracing::info!(
            target: "asimov_camera_holder",
            platform = %self.platform.name(),
            index = device.index,
            name = %device.name,
            facing = %device.facing,
            "opened camera"
        );
        Ok(())
    }

    /// Negotiates a preview size against the device's supported sizes,
    /// applies it, and records the size the device actually accepted.
    ///
    /// Device rejections are logged, not returned: the resolved size is
    /// whatever the device reports afterwards. If the device lists no sizes
    /// or reports none afterwards, the previous resolved size is kept.
    /// While capturing, the running session keeps its size and this returns
    /// it unchanged; stop capture to renegotiate.
    pub fn configure(
        &mut self,
        target: CaptureSize,
        policy: AspectRatioPolicy,
    ) -> Result<Option<CaptureSize>, CameraError> {
        let Some(resource) = self.resource.as_mut() else {
            return Err(CameraError::NotOpen);
        };
        if self.dispatcher.is_some() {
            tracing::warn!(
                target: "asimov_camera_holder",
                %target,
                resolved = ?self.resolved,
                "capture is running, keeping the negotiated preview size"
            );
            return Ok(self.resolved);
        }
        let device = resource.device_mut();

        let supported = device.supported_sizes().unwrap_or_else(|err| {
            tracing::warn!(target: "asimov_camera_holder", %err, "could not read supported sizes");
            Vec::new()
        });
        if supported.is_empty() {
            tracing::warn!(
                target: "asimov_camera_holder",
                %target,
                resolved = ?self.resolved,
                "device lists no preview sizes, keeping the resolved size"
            );
            return Ok(self.resolved);
        }
        // Every listed size exceeding the target leaves the pick to the device.
        let requested = select(&supported, target, policy).unwrap_or(target);

        if let Err(err) = device.set_preview_size(requested) {
            tracing::warn!(
                target: "asimov_camera_holder",
                %requested,
                %err,
                "device rejected the preview size"
            );
        }

        match device.preview_size() {
            Some(actual) => {
                if actual != requested {
                    tracing::info!(
                        target: "asimov_camera_holder",
                        %requested,
                        %actual,
                        "device settled on a different preview size"
                    );
                }
                self.resolved = Some(actual);
            },
            None => {
                tracing::debug!(target: "asimov_camera_holder", "device reports no preview size");
            },
        }

        tracing::info!(
            target: "asimov_camera_holder",
            %target,
            resolved = ?self.resolved,
            "configured camera"
        );
        Ok(self.resolved)
    }

    /// Configures the device from [`CameraConfig`] and starts streaming to
    /// the sink.
    ///
    /// Does nothing when no device is open or capture is already running.
    pub fn start_capture(&mut self) -> Result<(), CameraError> {
        if self.resource.is_none() {
            tracing::debug!(target: "asimov_camera_holder", "no camera open, not starting capture");
            return Ok(());
        }
        if self.dispatcher.is_some() {
            tracing::debug!(target: "asimov_camera_holder", "capture already running");
            return Ok(());
        }

        self.configure(self.config.target(), self.config.policy())?;
        if self.resolved.is_none() {
            tracing::warn!(
                target: "asimov_camera_holder",
                "device reported no preview size, frames will carry 0x0"
            );
        }

        let mut dispatcher = Dispatcher::spawn(self.config.buffer_frames, Arc::clone(&self.gate))?;
        match self.sink.clone().and_then(|sink| self.registration(sink)) {
            Some(registration) => self.gate.open(registration),
            None => {
                tracing::warn!(
                    target: "asimov_camera_holder",
                    "no frame sink registered, frames will be discarded"
                );
            },
        }

        let Some(resource) = self.resource.as_mut() else {
            return Err(CameraError::NotOpen);
        };
        if let Err(err) = resource.device_mut().start_streaming(dispatcher.producer()) {
            self.gate.close();
            dispatcher.stop();
            tracing::error!(target: "asimov_camera_holder", %err, "could not start capture");
            return Err(err);
        }

        self.dispatcher = Some(dispatcher);
        self.state = ControllerState::Capturing;
        tracing::info!(
            target: "asimov_camera_holder",
            width = self.resolved_width(),
            height = self.resolved_height(),
            "started capture"
        );
        Ok(())
    }

    /// Halts streaming and deregisters the sink.
    ///
    /// Blocks until a sink call already in progress has returned; no sink
    /// call begins after this returns. Does nothing unless capturing.
    pub fn stop_capture(&mut self) {
        let Some(mut dispatcher) = self.dispatcher.take() else {
            tracing::debug!(target: "asimov_camera_holder", "not capturing, nothing to stop");
            return;
        };

        if let Some(resource) = self.resource.as_mut() {
            if let Err(err) = resource.device_mut().stop_streaming() {
                tracing::warn!(target: "asimov_camera_holder", %err, "could not stop capture");
            }
        }

        // Must happen after the device stops streaming.
        self.gate.close();
        dispatcher.stop();

        self.state = if self.resource.is_some() {
            ControllerState::Idle
        } else {
            ControllerState::Closed
        };
        tracing::info!(target: "asimov_camera_holder", stats = ?self.stats(), "stopped capture");
    }

    /// Stops capture if needed, then releases the surface and the device.
    ///
    /// Both releases are always attempted; an error is returned only if both
    /// fail. The holder ends up `Closed` either way. Closing a closed holder
    /// does nothing.
    pub fn close(&mut self) -> Result<(), CameraError> {
        self.stop_capture();

        let Some(resource) = self.resource.take() else {
            self.state = ControllerState::Closed;
            return Ok(());
        };
        self.state = ControllerState::Closed;

        let result = resource.release();
        match result {
            Ok(()) => tracing::info!(target: "asimov_camera_holder", "closed camera"),
            Err(ref err) => tracing::error!(target: "asimov_camera_holder", %err, "error closing camera"),
        }
        result
    }

    /// Marks the holder `Closed` without touching the device, for holders
    /// whose resources were already torn down.
    pub fn destroy(&mut self) {
        self.state = ControllerState::Closed;
    }

    fn registration(&self, sink: FrameSink) -> Option<Registration> {
        let resource = self.resource.as_ref()?;
        Some(Registration::new(
            sink,
            self.resolved.unwrap_or_default(),
            resource.index(),
            self.is_front_facing,
            resource.device().pixel_format(),
        ))
    }
}

impl Drop for CameraHolder {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(target: "asimov_camera_holder", %err, "error closing camera on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::drivers::synthetic::{SyntheticDevice, SyntheticPlatform};

    fn holder(devices: Vec<SyntheticDevice>) -> CameraHolder {
        CameraHolder::new(
            Arc::new(SyntheticPlatform::new(devices)),
            CameraConfig::default(),
        )
    }

    #[test]
    fn starts_closed() {
        let holder = holder(Vec::new());
        assert_eq!(holder.state(), ControllerState::Closed);
        assert_eq!(holder.resolved_width(), 0);
        assert_eq!(holder.resolved_height(), 0);
        assert_eq!(holder.device_index(), None);
    }

    #[test]
    fn open_without_matching_facing_stays_closed() {
        let mut holder = holder(vec![SyntheticDevice::new("rear", Facing::Back)]);
        let err = holder.open(Facing::Front).unwrap_err();
        assert!(matches!(err, CameraError::NoMatchingDevice { facing: Facing::Front }));
        assert_eq!(holder.state(), ControllerState::Closed);
        assert!(!holder.is_open());
    }

    #[test]
    fn fallback_uses_the_first_device() {
        let platform = Arc::new(SyntheticPlatform::new(vec![SyntheticDevice::new(
            "rear",
            Facing::Back,
        )]));
        let config = CameraConfig::default().with_fallback_to_first_device(true);
        let mut holder = CameraHolder::new(platform, config);
        holder.open(Facing::Front).unwrap();
        assert_eq!(holder.state(), ControllerState::Idle);
        assert_eq!(holder.device_index(), Some(0));
        assert!(!holder.is_front_facing());
    }

    #[test]
    fn configure_requires_an_open_camera() {
        let mut holder = holder(Vec::new());
        assert!(matches!(
            holder.configure(CaptureSize::new(640, 480), AspectRatioPolicy::Unconstrained),
            Err(CameraError::NotOpen)
        ));
    }

    #[test]
    fn destroy_only_marks_closed() {
        let mut holder = holder(vec![SyntheticDevice::new("rear", Facing::Back)]);
        holder.open(Facing::Back).unwrap();
        holder.destroy();
        assert_eq!(holder.state(), ControllerState::Closed);
        assert!(holder.is_open());
        holder.close().unwrap();
        assert!(!holder.is_open());
    }
}
