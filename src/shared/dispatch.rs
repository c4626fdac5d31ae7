// This is free and unencumbered software released into the public domain.

use crate::shared::{CameraError, CaptureSize, Frame, PixelFormat};
use bytes::Bytes;
use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError, sync_channel},
    },
    thread::JoinHandle,
    time::Duration,
};

pub type FrameSink = Arc<dyn Fn(Frame) + Send + Sync + 'static>;

/// Pixel data as handed over by a driver, before metadata is attached.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub data: Bytes,
    pub timestamp_ns: u64,
}

#[derive(Debug)]
pub enum FrameMsg {
    Frame(RawFrame),
    Stop,
}

#[derive(Debug, Default)]
pub struct CaptureStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`CaptureStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureCounts {
    /// Frames handed to the sink.
    pub delivered: u64,
    /// Frames lost because the channel was full.
    pub dropped: u64,
    /// Frames that reached the gate while no sink was registered.
    pub discarded: u64,
}

impl CaptureStats {
    pub fn snapshot(&self) -> CaptureCounts {
        CaptureCounts {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Driver-side end of the frame channel.
#[derive(Clone, Debug)]
pub struct FrameProducer {
    tx: SyncSender<FrameMsg>,
    stats: Arc<CaptureStats>,
}

impl FrameProducer {
    /// Queues a frame without blocking the driver.
    ///
    /// A full channel drops the frame. Returns `false` once the consuming
    /// side is gone, at which point the driver should stop producing.
    pub fn push(&self, data: impl Into<Bytes>, timestamp_ns: u64) -> bool {
        let frame = RawFrame {
            data: data.into(),
            timestamp_ns,
        };
        match self.tx.try_send(FrameMsg::Frame(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(target: "asimov_camera_holder", "frame channel full, frame dropped");
                true
            },
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Sink plus the metadata resolved when capture started.
pub struct Registration {
    pub sink: FrameSink,
    pub size: CaptureSize,
    pub device_index: usize,
    pub is_front_facing: bool,
    pub pixel_format: PixelFormat,
    sequence: u64,
}

impl Registration {
    pub fn new(
        sink: FrameSink,
        size: CaptureSize,
        device_index: usize,
        is_front_facing: bool,
        pixel_format: PixelFormat,
    ) -> Self {
        Self {
            sink,
            size,
            device_index,
            is_front_facing,
            pixel_format,
            sequence: 0,
        }
    }
}

impl core::fmt::Debug for Registration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registration")
            .field("size", &self.size)
            .field("device_index", &self.device_index)
            .field("is_front_facing", &self.is_front_facing)
            .field("pixel_format", &self.pixel_format)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Guards frame delivery.
///
/// Every delivery runs with the registration lock held, and [`FrameGate::close`]
/// takes the same lock. Once `close` returns, no delivery is in flight and none
/// can begin.
#[derive(Debug, Default)]
pub struct FrameGate {
    registration: Mutex<Option<Registration>>,
    stats: Arc<CaptureStats>,
}

impl FrameGate {
    pub fn new(stats: Arc<CaptureStats>) -> Self {
        Self {
            registration: Mutex::new(None),
            stats,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Registration>> {
        self.registration.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn open(&self, registration: Registration) {
        *self.lock() = Some(registration);
    }

    /// Deregisters the sink, waiting for an in-flight delivery to finish.
    /// Returns whether a sink was registered.
    pub fn close(&self) -> bool {
        self.lock().take().is_some()
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Hands `raw` to the registered sink. Returns `false` if none is registered.
    pub fn deliver(&self, raw: RawFrame) -> bool {
        let mut guard = self.lock();
        let Some(registration) = guard.as_mut() else {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        registration.sequence += 1;
        let frame = Frame {
            data: raw.data,
            width: registration.size.width,
            height: registration.size.height,
            device_index: registration.device_index,
            is_front_facing: registration.is_front_facing,
            pixel_format: registration.pixel_format,
            sequence: registration.sequence,
            timestamp_ns: raw.timestamp_ns,
        };
        (registration.sink)(frame);
        self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// Controller-side end of the frame channel: a thread draining it into a
/// [`FrameGate`].
pub struct Dispatcher {
    tx: SyncSender<FrameMsg>,
    stats: Arc<CaptureStats>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("running", &self.join.is_some())
            .finish()
    }
}

impl Dispatcher {
    pub fn spawn(capacity: usize, gate: Arc<FrameGate>) -> Result<Self, CameraError> {
        let (tx, rx) = sync_channel::<FrameMsg>(capacity.max(1));
        let stats = Arc::clone(&gate.stats);
        let stop = Arc::new(AtomicBool::new(false));

        let stop2 = Arc::clone(&stop);
        let join = std::thread::Builder::new()
            .name("camera-dispatch".into())
            .spawn(move || run(rx, gate, stop2))
            .map_err(|e| CameraError::driver("spawning the frame dispatcher", e))?;

        Ok(Self {
            tx,
            stats,
            stop,
            join: Some(join),
        })
    }

    pub fn producer(&self) -> FrameProducer {
        FrameProducer {
            tx: self.tx.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    pub fn is_running(&self) -> bool {
        self.join.is_some()
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.tx.try_send(FrameMsg::Stop);
        if let Some(j) = self.join.take() {
            if j.join().is_err() {
                tracing::warn!(target: "asimov_camera_holder", "frame dispatcher panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(rx: Receiver<FrameMsg>, gate: Arc<FrameGate>, stop: Arc<AtomicBool>) {
    tracing::debug!(target: "asimov_camera_holder", "frame dispatcher started");

    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(FrameMsg::Frame(frame)) => {
                gate.deliver(frame);
            },
            Ok(FrameMsg::Stop) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::debug!(target: "asimov_camera_holder", "frame dispatcher stopped");
}
