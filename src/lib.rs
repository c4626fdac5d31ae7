// This is free and unencumbered software released into the public domain.

//! Camera lifecycle and capture-resolution negotiation for frame trackers.
//!
//! The [`shared::CameraHolder`] owns one camera device at a time, negotiates
//! a preview size with [`shared::select`], and streams raw frames to a
//! registered [`shared::FrameSink`]. Hosts keep the active holder in a
//! [`shared::CameraRegistry`].

#[cfg(feature = "cli")]
pub mod cli;
pub mod shared;
