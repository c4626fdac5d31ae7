// This is free and unencumbered software released into the public domain.

use crate::shared::CameraError;
use derive_more::Display;
use std::str::FromStr;

/// Which way a camera device points.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum Facing {
    /// Toward the user.
    Front,
    /// Away from the user.
    #[default]
    Back,
}

impl Facing {
    pub fn is_front(&self) -> bool {
        matches!(self, Facing::Front)
    }
}

impl FromStr for Facing {
    type Err = CameraError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            s if s.eq_ignore_ascii_case("front") => Ok(Facing::Front),
            s if s.eq_ignore_ascii_case("back") => Ok(Facing::Back),
            other => Err(CameraError::invalid_config(format!(
                "unknown camera facing '{other}', expected Front or Back"
            ))),
        }
    }
}

/// A camera device as reported by platform enumeration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: usize,
    pub facing: Facing,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(index: usize, facing: Facing, name: impl Into<String>) -> Self {
        Self {
            index,
            facing,
            name: name.into(),
        }
    }
}

/// Index of the first device whose facing matches `facing`.
pub fn find_facing_device(devices: &[DeviceInfo], facing: Facing) -> Option<usize> {
    devices.iter().find(|d| d.facing == facing).map(|d| d.index)
}
