// This is free and unencumbered software released into the public domain.

use crate::shared::Facing;
use std::error::Error as StdError;
use thiserror::Error;

pub type BoxedError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no suitable camera backend available")]
    NoDriver,

    #[error("no {facing}-facing camera device available")]
    NoMatchingDevice { facing: Facing },

    #[error("failed to acquire camera device #{index}")]
    Acquisition {
        index: usize,
        #[source]
        source: BoxedError,
    },

    #[error("camera is not open")]
    NotOpen,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to release camera surface ({surface}) and device ({device})")]
    Release {
        surface: BoxedError,
        device: BoxedError,
    },

    #[error("stream closed")]
    Closed,

    #[error("driver error while {context}")]
    DriverError {
        context: &'static str,
        #[source]
        source: BoxedError,
    },

    #[error("{0}")]
    Other(String),
}

impl CameraError {
    #[inline]
    pub fn driver(context: &'static str, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::DriverError {
            context,
            source: Box::new(source),
        }
    }

    #[inline]
    pub fn acquisition(index: usize, source: impl Into<BoxedError>) -> Self {
        Self::Acquisition {
            index,
            source: source.into(),
        }
    }

    #[inline]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    #[inline]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the error means the camera could not be acquired at all.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(self, Self::NoMatchingDevice { .. } | Self::Acquisition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_keeps_its_source() {
        let err = CameraError::acquisition(3, CameraError::other("device busy"));
        assert!(err.is_acquisition_failure());
        assert_eq!(err.to_string(), "failed to acquire camera device #3");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("device busy"));
    }

    #[test]
    fn release_reports_both_failures() {
        let err = CameraError::Release {
            surface: "surface gone".into(),
            device: "device gone".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to release camera surface (surface gone) and device (device gone)"
        );
        assert!(!err.is_acquisition_failure());
    }
}
