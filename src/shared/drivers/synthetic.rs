// This is free and unencumbered software released into the public domain.

//! In-process camera backend producing NV21 test patterns.
//!
//! Devices are described up front, including which operations should fail,
//! so the holder can be driven through every lifecycle path without
//! hardware. A [`SyntheticHandle`] plays the role of the camera driver's
//! callback thread.

use crate::shared::{
    CameraDevice, CameraError, CameraPlatform, CaptureSize, DeviceInfo, Facing, FrameProducer,
    PixelFormat, TargetSurface,
};
use std::{
    borrow::Cow,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Description of one synthetic device.
#[derive(Clone, Debug)]
pub struct SyntheticDevice {
    pub name: String,
    pub facing: Facing,
    pub sizes: Vec<CaptureSize>,
    pub initial_size: Option<CaptureSize>,
    /// Frames per second generated on a driver thread; `None` means frames
    /// only arrive through [`SyntheticHandle::emit_frame`].
    pub fps: Option<f64>,
    pub reject_unsupported_sizes: bool,
    /// Lists `sizes` on the first query only and nothing afterwards.
    pub list_sizes_once: bool,
    pub fail_open: bool,
    pub fail_bind: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub fail_release: bool,
}

impl SyntheticDevice {
    pub fn new(name: impl Into<String>, facing: Facing) -> Self {
        Self {
            name: name.into(),
            facing,
            sizes: Vec::new(),
            initial_size: None,
            fps: None,
            reject_unsupported_sizes: false,
            list_sizes_once: false,
            fail_open: false,
            fail_bind: false,
            fail_start: false,
            fail_stop: false,
            fail_release: false,
        }
    }

    pub fn with_sizes(mut self, sizes: &[(u32, u32)]) -> Self {
        self.sizes = sizes.iter().copied().map(CaptureSize::from).collect();
        self
    }

    pub fn with_initial_size(mut self, size: CaptureSize) -> Self {
        self.initial_size = Some(size);
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn rejecting_unsupported_sizes(mut self) -> Self {
        self.reject_unsupported_sizes = true;
        self
    }

    pub fn listing_sizes_once(mut self) -> Self {
        self.list_sizes_once = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_bind(mut self) -> Self {
        self.fail_bind = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }
}

#[derive(Debug)]
struct Streaming {
    index: usize,
    size: CaptureSize,
    producer: FrameProducer,
}

#[derive(Debug, Default)]
struct SyntheticState {
    journal: Vec<String>,
    open_devices: usize,
    streaming: Option<Streaming>,
    frames_emitted: u64,
}

type SharedState = Arc<Mutex<SyntheticState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SyntheticState> {
    state.lock().unwrap_or_else(|p| p.into_inner())
}

fn record(state: &SharedState, event: String) {
    tracing::trace!(target: "asimov_camera_holder", %event, "synthetic camera");
    lock(state).journal.push(event);
}

/// A platform whose devices are [`SyntheticDevice`] descriptions.
#[derive(Debug)]
pub struct SyntheticPlatform {
    devices: Vec<SyntheticDevice>,
    state: SharedState,
    fail_surface_create: bool,
    fail_surface_release: bool,
}

impl SyntheticPlatform {
    pub fn new(devices: Vec<SyntheticDevice>) -> Self {
        Self {
            devices,
            state: SharedState::default(),
            fail_surface_create: false,
            fail_surface_release: false,
        }
    }

    /// A back camera with common 4:3 and 16:9 sizes and a smaller front
    /// camera, both streaming at 30 fps.
    pub fn demo() -> Self {
        Self::new(vec![
            SyntheticDevice::new("synthetic back camera", Facing::Back)
                .with_sizes(&[
                    (176, 144),
                    (320, 240),
                    (352, 288),
                    (640, 480),
                    (800, 600),
                    (1280, 720),
                    (1280, 960),
                    (1920, 1080),
                ])
                .with_initial_size(CaptureSize::new(640, 480))
                .with_fps(30.0)
                .rejecting_unsupported_sizes(),
            SyntheticDevice::new("synthetic front camera", Facing::Front)
                .with_sizes(&[(320, 240), (640, 480), (1280, 720)])
                .with_initial_size(CaptureSize::new(640, 480))
                .with_fps(30.0)
                .rejecting_unsupported_sizes(),
        ])
    }

    pub fn failing_surface_create(mut self) -> Self {
        self.fail_surface_create = true;
        self
    }

    pub fn failing_surface_release(mut self) -> Self {
        self.fail_surface_release = true;
        self
    }

    pub fn handle(&self) -> SyntheticHandle {
        SyntheticHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl CameraPlatform for SyntheticPlatform {
    fn name(&self) -> Cow<'_, str> {
        "synthetic".into()
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        Ok(self
            .devices
            .iter()
            .enumerate()
            .map(|(index, d)| DeviceInfo::new(index, d.facing, d.name.clone()))
            .collect())
    }

    fn open_device(&self, index: usize) -> Result<Box<dyn CameraDevice>, CameraError> {
        let profile = self
            .devices
            .get(index)
            .ok_or_else(|| CameraError::other(format!("no synthetic device #{index}")))?;
        if profile.fail_open {
            record(&self.state, format!("device-open-failed:{index}"));
            return Err(CameraError::other("synthetic device is busy"));
        }

        lock(&self.state).open_devices += 1;
        record(&self.state, format!("device-opened:{index}"));

        Ok(Box::new(SyntheticCameraDevice {
            index,
            profile: profile.clone(),
            current: profile.initial_size,
            size_queries: AtomicU64::new(0),
            state: Arc::clone(&self.state),
            generator: None,
            streaming: false,
            released: false,
        }))
    }

    fn create_surface(&self) -> Result<Box<dyn TargetSurface>, CameraError> {
        if self.fail_surface_create {
            record(&self.state, "surface-create-failed".into());
            return Err(CameraError::other("synthetic surface unavailable"));
        }
        let surface = SyntheticSurface {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            state: Arc::clone(&self.state),
            fail_release: self.fail_surface_release,
            released: false,
        };
        record(&self.state, format!("surface-created:{}", surface.id));
        Ok(Box::new(surface))
    }
}

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct SyntheticSurface {
    id: u64,
    state: SharedState,
    fail_release: bool,
    released: bool,
}

impl TargetSurface for SyntheticSurface {
    fn id(&self) -> u64 {
        self.id
    }

    fn release(&mut self) -> Result<(), CameraError> {
        if self.released {
            return Ok(());
        }
        if self.fail_release {
            record(&self.state, format!("surface-release-failed:{}", self.id));
            return Err(CameraError::other("synthetic surface release failed"));
        }
        self.released = true;
        record(&self.state, format!("surface-released:{}", self.id));
        Ok(())
    }
}

struct Generator {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

struct SyntheticCameraDevice {
    index: usize,
    profile: SyntheticDevice,
    current: Option<CaptureSize>,
    size_queries: AtomicU64,
    state: SharedState,
    generator: Option<Generator>,
    streaming: bool,
    released: bool,
}

impl SyntheticCameraDevice {
    fn halt(&mut self) {
        {
            let mut state = lock(&self.state);
            if state.streaming.as_ref().is_some_and(|s| s.index == self.index) {
                state.streaming = None;
            }
        }
        if let Some(generator) = self.generator.take() {
            generator.stop.store(true, Ordering::Relaxed);
            let _ = generator.join.join();
        }
        if self.streaming {
            self.streaming = false;
            record(&self.state, format!("streaming-stopped:{}", self.index));
        }
    }
}

impl CameraDevice for SyntheticCameraDevice {
    fn index(&self) -> usize {
        self.index
    }

    fn supported_sizes(&self) -> Result<Vec<CaptureSize>, CameraError> {
        let queries = self.size_queries.fetch_add(1, Ordering::Relaxed);
        if self.profile.list_sizes_once && queries > 0 {
            return Ok(Vec::new());
        }
        Ok(self.profile.sizes.clone())
    }

    fn set_preview_size(&mut self, size: CaptureSize) -> Result<(), CameraError> {
        if self.profile.reject_unsupported_sizes && !self.profile.sizes.contains(&size) {
            return Err(CameraError::unsupported(format!(
                "preview size {size} not supported by {}",
                self.profile.name
            )));
        }
        self.current = Some(size);
        Ok(())
    }

    fn preview_size(&self) -> Option<CaptureSize> {
        self.current
    }

    fn bind_surface(&mut self, surface: &dyn TargetSurface) -> Result<(), CameraError> {
        if self.profile.fail_bind {
            record(&self.state, format!("surface-bind-failed:{}", surface.id()));
            return Err(CameraError::other("synthetic device refused the surface"));
        }
        record(&self.state, format!("surface-bound:{}", surface.id()));
        Ok(())
    }

    fn start_streaming(&mut self, producer: FrameProducer) -> Result<(), CameraError> {
        if self.profile.fail_start {
            return Err(CameraError::other("synthetic device failed to start"));
        }
        let size = self.current.unwrap_or_default();

        if let Some(fps) = self.profile.fps.filter(|fps| *fps > 0.0) {
            let stop = Arc::new(AtomicBool::new(false));
            let stop2 = Arc::clone(&stop);
            let producer = producer.clone();
            let interval = Duration::from_secs_f64(1.0 / fps);
            let join = std::thread::Builder::new()
                .name("synthetic-camera".into())
                .spawn(move || {
                    let mut sequence = 0u64;
                    while !stop2.load(Ordering::Relaxed) {
                        sequence += 1;
                        if !producer.push(test_pattern(size, sequence), now_ns()) {
                            break;
                        }
                        std::thread::sleep(interval);
                    }
                })
                .map_err(|e| CameraError::driver("spawning the synthetic camera", e))?;
            self.generator = Some(Generator { stop, join });
        }

        lock(&self.state).streaming = Some(Streaming {
            index: self.index,
            size,
            producer,
        });
        self.streaming = true;
        record(&self.state, format!("streaming-started:{}", self.index));
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<(), CameraError> {
        self.halt();
        if self.profile.fail_stop {
            return Err(CameraError::other("synthetic device reported a stop failure"));
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), CameraError> {
        if self.released {
            return Ok(());
        }
        self.halt();
        if self.profile.fail_release {
            record(&self.state, format!("device-release-failed:{}", self.index));
            return Err(CameraError::other("synthetic device release failed"));
        }
        self.released = true;
        lock(&self.state).open_devices -= 1;
        record(&self.state, format!("device-released:{}", self.index));
        Ok(())
    }
}

impl Drop for SyntheticCameraDevice {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Lets a caller act as the camera driver and inspect what happened.
#[derive(Clone, Debug)]
pub struct SyntheticHandle {
    state: SharedState,
}

impl SyntheticHandle {
    /// Pushes one test-pattern frame from the streaming device. Returns
    /// `false` if no device is streaming.
    pub fn emit_frame(&self) -> bool {
        let (producer, size, sequence) = {
            let mut state = lock(&self.state);
            let Some(streaming) = state.streaming.as_ref() else {
                return false;
            };
            let (producer, size) = (streaming.producer.clone(), streaming.size);
            state.frames_emitted += 1;
            (producer, size, state.frames_emitted)
        };
        producer.push(test_pattern(size, sequence), now_ns())
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.state).streaming.is_some()
    }

    pub fn open_devices(&self) -> usize {
        lock(&self.state).open_devices
    }

    /// Lifecycle events in the order they happened, e.g. `device-opened:0`,
    /// `surface-released:3`.
    pub fn journal(&self) -> Vec<String> {
        lock(&self.state).journal.clone()
    }
}

/// An NV21 frame with a diagonal luma gradient shifted by `sequence`.
fn test_pattern(size: CaptureSize, sequence: u64) -> Vec<u8> {
    let (w, h) = (size.width as usize, size.height as usize);
    let mut data = Vec::with_capacity(PixelFormat::Nv21.frame_len(size.width, size.height));
    for y in 0..h {
        for x in 0..w {
            data.push(((x + y) as u64).wrapping_add(sequence) as u8);
        }
    }
    data.resize(PixelFormat::Nv21.frame_len(size.width, size.height), 128);
    data
}

#[inline]
fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
