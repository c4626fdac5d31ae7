// This is free and unencumbered software released into the public domain.

use asimov_camera_holder::shared::{
    AspectRatioPolicy, CameraConfig, CameraError, CameraHolder, CaptureSize, ControllerState,
    Facing, Frame, FrameSink, PixelFormat,
    drivers::synthetic::{SyntheticDevice, SyntheticHandle, SyntheticPlatform},
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

fn back_camera() -> SyntheticDevice {
    SyntheticDevice::new("back", Facing::Back)
        .with_sizes(&[(320, 240), (640, 480), (800, 600), (1280, 720), (1280, 960)])
        .with_initial_size(CaptureSize::new(320, 240))
        .rejecting_unsupported_sizes()
}

fn front_camera() -> SyntheticDevice {
    SyntheticDevice::new("front", Facing::Front)
        .with_sizes(&[(320, 240), (640, 480)])
        .with_initial_size(CaptureSize::new(320, 240))
}

fn holder_with(platform: SyntheticPlatform) -> (CameraHolder, SyntheticHandle) {
    let handle = platform.handle();
    let config = CameraConfig::default().with_buffer_frames(16);
    (CameraHolder::new(Arc::new(platform), config), handle)
}

fn collecting_sink() -> (FrameSink, Arc<Mutex<Vec<Frame>>>) {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let frames2 = Arc::clone(&frames);
    let sink: FrameSink = Arc::new(move |frame: Frame| frames2.lock().unwrap().push(frame));
    (sink, frames)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn opens_the_first_camera_with_the_requested_facing() {
    let platform = SyntheticPlatform::new(vec![back_camera(), front_camera(), front_camera()]);
    let (mut holder, handle) = holder_with(platform);

    holder.open(Facing::Front).unwrap();
    assert_eq!(holder.state(), ControllerState::Idle);
    assert_eq!(holder.device_index(), Some(1));
    assert!(holder.is_front_facing());
    assert_eq!(handle.open_devices(), 1);

    // A second open on an open holder acquires nothing.
    holder.open(Facing::Back).unwrap();
    assert_eq!(holder.device_index(), Some(1));
    assert_eq!(handle.open_devices(), 1);
}

#[test]
fn frames_carry_the_negotiated_metadata() {
    let platform = SyntheticPlatform::new(vec![back_camera()]);
    let (mut holder, handle) = holder_with(platform);
    let (sink, frames) = collecting_sink();

    holder.set_sink(sink);
    holder.open(Facing::Back).unwrap();
    holder.start_capture().unwrap();
    assert_eq!(holder.state(), ControllerState::Capturing);
    assert_eq!(holder.resolved_size(), Some(CaptureSize::new(800, 600)));

    for _ in 0..3 {
        assert!(handle.emit_frame());
    }
    assert!(wait_until(|| frames.lock().unwrap().len() == 3));

    let frames = frames.lock().unwrap();
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.size(), CaptureSize::new(800, 600));
        assert_eq!(frame.device_index, 0);
        assert!(!frame.is_front_facing);
        assert_eq!(frame.pixel_format, PixelFormat::Nv21);
        assert_eq!(frame.sequence, i as u64 + 1);
        assert_eq!(frame.data.len(), PixelFormat::Nv21.frame_len(800, 600));
    }
}

#[test]
fn start_capture_while_closed_does_nothing() {
    let (mut holder, handle) = holder_with(SyntheticPlatform::new(vec![back_camera()]));
    holder.start_capture().unwrap();
    assert_eq!(holder.state(), ControllerState::Closed);
    assert!(!handle.is_streaming());
}

#[test]
fn stop_capture_while_idle_does_nothing() {
    let (mut holder, handle) = holder_with(SyntheticPlatform::new(vec![back_camera()]));
    holder.open(Facing::Back).unwrap();
    holder.stop_capture();
    assert_eq!(holder.state(), ControllerState::Idle);
    assert!(
        !handle
            .journal()
            .iter()
            .any(|e| e.starts_with("streaming-stopped"))
    );
}

#[test]
fn stop_capture_waits_for_the_sink_and_silences_it() {
    let (mut holder, handle) = holder_with(SyntheticPlatform::new(vec![back_camera()]));

    let entered = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));
    let sink: FrameSink = {
        let (entered, finished, calls) = (
            Arc::clone(&entered),
            Arc::clone(&finished),
            Arc::clone(&calls),
        );
        Arc::new(move |_frame: Frame| {
            calls.fetch_add(1, Ordering::SeqCst);
            entered.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            finished.store(true, Ordering::SeqCst);
        })
    };

    holder.set_sink(sink);
    holder.open(Facing::Back).unwrap();
    holder.start_capture().unwrap();
    assert!(handle.emit_frame());
    assert!(wait_until(|| entered.load(Ordering::SeqCst)));

    holder.stop_capture();
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(holder.state(), ControllerState::Idle);

    let after_stop = calls.load(Ordering::SeqCst);
    assert!(!handle.emit_frame());
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), after_stop);
}

#[test]
fn capture_can_restart_after_stop() {
    let (mut holder, handle) = holder_with(SyntheticPlatform::new(vec![back_camera()]));
    let (sink, frames) = collecting_sink();
    holder.set_sink(sink);
    holder.open(Facing::Back).unwrap();

    holder.start_capture().unwrap();
    holder.stop_capture();
    holder.start_capture().unwrap();
    assert!(handle.emit_frame());
    assert!(wait_until(|| frames.lock().unwrap().len() == 1));
    assert_eq!(frames.lock().unwrap()[0].sequence, 1);
}

#[test]
fn close_releases_the_surface_before_the_device() {
    let (mut holder, handle) = holder_with(SyntheticPlatform::new(vec![back_camera()]));
    holder.open(Facing::Back).unwrap();
    holder.start_capture().unwrap();
    holder.close().unwrap();

    assert_eq!(holder.state(), ControllerState::Closed);
    assert_eq!(handle.open_devices(), 0);

    let journal = handle.journal();
    let position = |prefix: &str| journal.iter().position(|e| e.starts_with(prefix));
    let stopped = position("streaming-stopped").unwrap();
    let surface = position("surface-released").unwrap();
    let device = position("device-released").unwrap();
    assert!(stopped < surface);
    assert!(surface < device);
}

#[test]
fn closing_twice_is_harmless() {
    let (mut holder, handle) = holder_with(SyntheticPlatform::new(vec![back_camera()]));
    holder.open(Facing::Back).unwrap();
    holder.close().unwrap();
    holder.close().unwrap();
    assert_eq!(holder.state(), ControllerState::Closed);

    let releases = handle
        .journal()
        .iter()
        .filter(|e| e.starts_with("device-released"))
        .count();
    assert_eq!(releases, 1);
}

#[test]
fn one_failed_release_is_absorbed() {
    let platform =
        SyntheticPlatform::new(vec![back_camera().failing_release()]).failing_surface_release();
    let (mut holder, _handle) = holder_with(platform);
    holder.open(Facing::Back).unwrap();
    assert!(matches!(holder.close(), Err(CameraError::Release { .. })));
    assert_eq!(holder.state(), ControllerState::Closed);

    let platform = SyntheticPlatform::new(vec![back_camera()]).failing_surface_release();
    let (mut holder, handle) = holder_with(platform);
    holder.open(Facing::Back).unwrap();
    holder.close().unwrap();
    assert_eq!(handle.open_devices(), 0);
}

#[test]
fn failed_bind_releases_the_device() {
    let platform = SyntheticPlatform::new(vec![back_camera().failing_bind()]);
    let (mut holder, handle) = holder_with(platform);

    let err = holder.open(Facing::Back).unwrap_err();
    assert!(err.is_acquisition_failure());
    assert_eq!(holder.state(), ControllerState::Closed);
    assert_eq!(handle.open_devices(), 0);

    let journal = handle.journal();
    let surface = journal.iter().position(|e| e.starts_with("surface-released"));
    let device = journal.iter().position(|e| e.starts_with("device-released"));
    assert!(surface.is_some() && device.is_some());
    assert!(surface < device);
}

#[test]
fn failed_surface_creation_releases_the_device() {
    let platform = SyntheticPlatform::new(vec![back_camera()]).failing_surface_create();
    let (mut holder, handle) = holder_with(platform);

    assert!(holder.open(Facing::Back).unwrap_err().is_acquisition_failure());
    assert_eq!(holder.state(), ControllerState::Closed);
    assert_eq!(handle.open_devices(), 0);
}

#[test]
fn busy_device_leaves_the_holder_closed() {
    let platform = SyntheticPlatform::new(vec![back_camera().failing_open()]);
    let (mut holder, handle) = holder_with(platform);

    assert!(holder.open(Facing::Back).unwrap_err().is_acquisition_failure());
    assert_eq!(holder.state(), ControllerState::Closed);
    assert!(!holder.is_open());
    assert_eq!(handle.open_devices(), 0);
}

#[test]
fn failed_start_stays_idle() {
    let platform = SyntheticPlatform::new(vec![back_camera().failing_start()]);
    let (mut holder, handle) = holder_with(platform);
    holder.open(Facing::Back).unwrap();

    assert!(holder.start_capture().is_err());
    assert_eq!(holder.state(), ControllerState::Idle);
    assert!(!handle.is_streaming());
}

#[test]
fn stop_failure_still_stops_capture() {
    let platform = SyntheticPlatform::new(vec![back_camera().failing_stop()]);
    let (mut holder, handle) = holder_with(platform);
    holder.open(Facing::Back).unwrap();
    holder.start_capture().unwrap();

    holder.stop_capture();
    assert_eq!(holder.state(), ControllerState::Idle);
    assert!(!handle.is_streaming());
}

#[test]
fn empty_size_list_leaves_the_device_alone() {
    let platform = SyntheticPlatform::new(vec![
        SyntheticDevice::new("bare", Facing::Back).with_initial_size(CaptureSize::new(352, 288)),
    ]);
    let (mut holder, _handle) = holder_with(platform);
    holder.open(Facing::Back).unwrap();

    let first = holder
        .configure(CaptureSize::new(640, 480), AspectRatioPolicy::default())
        .unwrap();
    let second = holder
        .configure(CaptureSize::new(1024, 768), AspectRatioPolicy::default())
        .unwrap();
    assert_eq!(first, None);
    assert_eq!(second, first);
    assert_eq!(holder.resolved_size(), None);
}

#[test]
fn size_list_going_empty_keeps_the_prior_resolution() {
    let platform = SyntheticPlatform::new(vec![
        SyntheticDevice::new("flaky", Facing::Back)
            .with_sizes(&[(640, 480), (320, 240)])
            .listing_sizes_once(),
    ]);
    let (mut holder, _handle) = holder_with(platform);
    holder.open(Facing::Back).unwrap();

    let first = holder
        .configure(CaptureSize::new(1024, 768), AspectRatioPolicy::default())
        .unwrap();
    assert_eq!(first, Some(CaptureSize::new(640, 480)));

    // The device would accept any size now; nothing may be requested.
    let second = holder
        .configure(CaptureSize::new(1920, 1080), AspectRatioPolicy::Unconstrained)
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(holder.resolved_size(), Some(CaptureSize::new(640, 480)));
}

#[test]
fn out_of_bounds_sizes_resolve_to_what_the_device_reports() {
    let platform = SyntheticPlatform::new(vec![
        SyntheticDevice::new("strict", Facing::Back)
            .with_sizes(&[(1280, 720), (1920, 1080)])
            .with_initial_size(CaptureSize::new(1280, 720))
            .rejecting_unsupported_sizes(),
    ]);
    let (mut holder, _handle) = holder_with(platform);
    holder.open(Facing::Back).unwrap();

    let resolved = holder
        .configure(CaptureSize::new(1024, 768), AspectRatioPolicy::default())
        .unwrap();
    assert_eq!(resolved, Some(CaptureSize::new(1280, 720)));
    assert_eq!(holder.resolved_width(), 1280);
    assert_eq!(holder.resolved_height(), 720);
}

#[test]
fn out_of_bounds_target_is_requested_as_is() {
    let platform = SyntheticPlatform::new(vec![
        SyntheticDevice::new("lenient", Facing::Back).with_sizes(&[(1280, 720)]),
    ]);
    let (mut holder, _handle) = holder_with(platform);
    holder.open(Facing::Back).unwrap();

    let resolved = holder
        .configure(CaptureSize::new(1024, 768), AspectRatioPolicy::default())
        .unwrap();
    assert_eq!(resolved, Some(CaptureSize::new(1024, 768)));
}

#[test]
fn configure_while_capturing_keeps_the_session_size() {
    let (mut holder, handle) = holder_with(SyntheticPlatform::new(vec![back_camera()]));
    let (sink, frames) = collecting_sink();
    holder.set_sink(sink);
    holder.open(Facing::Back).unwrap();
    holder.start_capture().unwrap();
    assert_eq!(holder.resolved_size(), Some(CaptureSize::new(800, 600)));

    let resolved = holder
        .configure(CaptureSize::new(320, 240), AspectRatioPolicy::Unconstrained)
        .unwrap();
    assert_eq!(resolved, Some(CaptureSize::new(800, 600)));
    assert_eq!(holder.resolved_size(), Some(CaptureSize::new(800, 600)));

    assert!(handle.emit_frame());
    assert!(wait_until(|| frames.lock().unwrap().len() == 1));
    let frame = frames.lock().unwrap()[0].clone();
    assert_eq!(frame.size(), holder.resolved_size().unwrap());
    assert_eq!(frame.data.len(), PixelFormat::Nv21.frame_len(800, 600));

    holder.stop_capture();
    let renegotiated = holder
        .configure(CaptureSize::new(320, 240), AspectRatioPolicy::Unconstrained)
        .unwrap();
    assert_eq!(renegotiated, Some(CaptureSize::new(320, 240)));
}

#[test]
fn rejected_renegotiation_keeps_the_prior_resolution() {
    let platform = SyntheticPlatform::new(vec![
        SyntheticDevice::new("silent", Facing::Back)
            .with_sizes(&[(640, 480)])
            .rejecting_unsupported_sizes(),
    ]);
    let (mut holder, _handle) = holder_with(platform);
    holder.open(Facing::Back).unwrap();

    let first = holder
        .configure(CaptureSize::new(1024, 768), AspectRatioPolicy::default())
        .unwrap();
    assert_eq!(first, Some(CaptureSize::new(640, 480)));

    let second = holder
        .configure(CaptureSize::new(100, 100), AspectRatioPolicy::default())
        .unwrap();
    assert_eq!(second, first);
}

#[test]
fn device_without_a_preview_size_resolves_to_nothing() {
    let platform = SyntheticPlatform::new(vec![
        SyntheticDevice::new("mute", Facing::Back)
            .with_sizes(&[(1280, 720)])
            .rejecting_unsupported_sizes(),
    ]);
    let (mut holder, _handle) = holder_with(platform);
    holder.open(Facing::Back).unwrap();

    let resolved = holder
        .configure(CaptureSize::new(640, 480), AspectRatioPolicy::Unconstrained)
        .unwrap();
    assert_eq!(resolved, None);
    assert_eq!(holder.resolved_width(), 0);
    assert_eq!(holder.resolved_height(), 0);
}

#[test]
fn sink_can_be_swapped_while_capturing() {
    let (mut holder, handle) = holder_with(SyntheticPlatform::new(vec![back_camera()]));
    let (first_sink, first) = collecting_sink();
    let (second_sink, second) = collecting_sink();

    holder.set_sink(first_sink);
    holder.open(Facing::Back).unwrap();
    holder.start_capture().unwrap();
    assert!(handle.emit_frame());
    assert!(wait_until(|| first.lock().unwrap().len() == 1));

    holder.set_sink(second_sink);
    assert!(handle.emit_frame());
    assert!(wait_until(|| second.lock().unwrap().len() == 1));
    assert_eq!(first.lock().unwrap().len(), 1);
}

#[test]
fn dropping_the_holder_releases_the_camera() {
    let (mut holder, handle) = holder_with(SyntheticPlatform::new(vec![back_camera()]));
    holder.open(Facing::Back).unwrap();
    holder.start_capture().unwrap();
    drop(holder);
    assert_eq!(handle.open_devices(), 0);
    assert!(!handle.is_streaming());
}
