// This is free and unencumbered software released into the public domain.

use crate::shared::CameraHolder;
use std::sync::{Arc, Mutex, MutexGuard};

pub type SharedHolder = Arc<Mutex<CameraHolder>>;

/// Tracks the one holder allowed to own the camera hardware.
///
/// The host keeps a registry and installs holders through
/// [`replace`](Self::replace), which fully closes the previous holder first.
#[derive(Debug, Default)]
pub struct CameraRegistry {
    active: Mutex<Option<SharedHolder>>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<SharedHolder>> {
        self.active.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Installs `holder` as the active holder, stopping, closing and
    /// destroying the previous one before returning.
    pub fn replace(&self, holder: CameraHolder) -> SharedHolder {
        let mut active = self.lock();
        if let Some(prior) = active.take() {
            retire(&prior);
        }
        let shared = Arc::new(Mutex::new(holder));
        *active = Some(Arc::clone(&shared));
        shared
    }

    pub fn active(&self) -> Option<SharedHolder> {
        self.lock().clone()
    }

    /// Runs `f` on the active holder, if there is one.
    pub fn with_active<R>(&self, f: impl FnOnce(&mut CameraHolder) -> R) -> Option<R> {
        let holder = self.active()?;
        let mut holder = holder.lock().unwrap_or_else(|p| p.into_inner());
        Some(f(&mut holder))
    }

    /// Stops, closes and destroys the active holder and uninstalls it.
    pub fn shutdown(&self) {
        if let Some(prior) = self.lock().take() {
            retire(&prior);
        }
    }
}

fn retire(holder: &SharedHolder) {
    let mut holder = holder.lock().unwrap_or_else(|p| p.into_inner());
    holder.stop_capture();
    if let Err(err) = holder.close() {
        tracing::warn!(target: "asimov_camera_holder", %err, "error closing replaced camera holder");
    }
    holder.destroy();
    tracing::debug!(target: "asimov_camera_holder", "retired camera holder");
}
