// This is free and unencumbered software released into the public domain.

use asimov_camera_holder::shared::{
    CameraConfig, CameraHolder, CameraRegistry, CaptureSize, ControllerState, Facing,
    drivers::synthetic::{SyntheticDevice, SyntheticPlatform},
};
use std::sync::Arc;

fn platform() -> SyntheticPlatform {
    SyntheticPlatform::new(vec![
        SyntheticDevice::new("back", Facing::Back)
            .with_sizes(&[(640, 480)])
            .with_initial_size(CaptureSize::new(640, 480)),
    ])
}

#[test]
fn replacing_closes_the_previous_holder_first() {
    let platform = Arc::new(platform());
    let handle = platform.handle();
    let registry = CameraRegistry::new();

    let first = registry.replace(CameraHolder::new(platform.clone(), CameraConfig::default()));
    {
        let mut first = first.lock().unwrap();
        first.open(Facing::Back).unwrap();
        first.start_capture().unwrap();
        assert_eq!(first.state(), ControllerState::Capturing);
    }

    let second = registry.replace(CameraHolder::new(platform, CameraConfig::default()));
    assert_eq!(first.lock().unwrap().state(), ControllerState::Closed);
    assert!(!first.lock().unwrap().is_open());
    assert_eq!(handle.open_devices(), 0);

    second.lock().unwrap().open(Facing::Back).unwrap();
    assert_eq!(second.lock().unwrap().state(), ControllerState::Idle);
    assert_eq!(handle.open_devices(), 1);

    let journal = handle.journal();
    let released = journal.iter().position(|e| e == "device-released:0").unwrap();
    let reopened = journal.iter().rposition(|e| e == "device-opened:0").unwrap();
    assert!(released < reopened);
}

#[test]
fn the_registry_tracks_the_latest_holder() {
    let registry = CameraRegistry::new();
    assert!(registry.active().is_none());
    assert_eq!(registry.with_active(|h| h.state()), None);

    let holder = registry.replace(CameraHolder::new(
        Arc::new(platform()),
        CameraConfig::default(),
    ));
    let active = registry.active().unwrap();
    assert!(Arc::ptr_eq(&holder, &active));

    registry.with_active(|h| h.open(Facing::Back)).unwrap().unwrap();
    assert_eq!(holder.lock().unwrap().state(), ControllerState::Idle);
}

#[test]
fn shutdown_closes_and_uninstalls() {
    let platform = Arc::new(platform());
    let handle = platform.handle();
    let registry = CameraRegistry::new();
    let holder = registry.replace(CameraHolder::new(platform, CameraConfig::default()));
    holder.lock().unwrap().open(Facing::Back).unwrap();

    registry.shutdown();
    assert!(registry.active().is_none());
    assert_eq!(holder.lock().unwrap().state(), ControllerState::Closed);
    assert_eq!(handle.open_devices(), 0);
}
