// This is free and unencumbered software released into the public domain.

//! Preview-size negotiation.
//!
//! Device-reported size lists are unreliable and frequently omit the ideal
//! 4:3 match, so selection degrades to "closest within bounds" rather than
//! failing outright.

use crate::shared::{AspectRatioPolicy, CaptureSize};

/// Picks the supported size that best matches `target` under `policy`.
///
/// Returns `None` when `supported` is empty or every entry exceeds the target
/// bounds; the caller should then request `target` itself and accept whatever
/// the device settles on.
pub fn select(
    supported: &[CaptureSize],
    target: CaptureSize,
    policy: AspectRatioPolicy,
) -> Option<CaptureSize> {
    if supported.is_empty() {
        tracing::debug!(target: "asimov_camera_holder", %target, "no supported sizes reported");
        return None;
    }

    let ratio_match = match policy {
        AspectRatioPolicy::ForceRatio { ratio, tolerance } => {
            select_by_ratio(supported, target, ratio, tolerance)
        },
        AspectRatioPolicy::Unconstrained => None,
    };
    if let Some(size) = ratio_match {
        tracing::debug!(target: "asimov_camera_holder", %target, %size, "ratio match");
        return Some(size);
    }

    let fallback = select_by_slack(supported, target);
    match fallback {
        Some(size) if policy.is_forced() => {
            tracing::info!(
                target: "asimov_camera_holder",
                %target,
                %size,
                "no size matches the requested aspect ratio, using closest size within bounds"
            );
        },
        Some(size) => {
            tracing::debug!(target: "asimov_camera_holder", %target, %size, "closest size within bounds");
        },
        None => {
            tracing::info!(
                target: "asimov_camera_holder",
                %target,
                "every supported size exceeds the target bounds"
            );
        },
    }
    fallback
}

/// Bounded sizes within `tolerance` of `ratio`, closest in height to the
/// target. The first minimal entry wins.
fn select_by_ratio(
    supported: &[CaptureSize],
    target: CaptureSize,
    ratio: f64,
    tolerance: f64,
) -> Option<CaptureSize> {
    let mut best: Option<(CaptureSize, u32)> = None;
    for &size in supported {
        if !size.fits_within(target) || size.height == 0 {
            continue;
        }
        if (size.aspect_ratio() - ratio).abs() > tolerance {
            continue;
        }
        tracing::trace!(target: "asimov_camera_holder", %size, "checking size");
        let diff = size.height.abs_diff(target.height);
        if best.is_none_or(|(_, min)| diff < min) {
            best = Some((size, diff));
        }
    }
    best.map(|(size, _)| size)
}

/// Bounded sizes with the smallest combined slack
/// `(target.height - height) + (target.width - width)`. The first minimal
/// entry wins.
fn select_by_slack(supported: &[CaptureSize], target: CaptureSize) -> Option<CaptureSize> {
    let mut best: Option<(CaptureSize, i64)> = None;
    for &size in supported {
        if !size.fits_within(target) {
            continue;
        }
        let slack = (target.height as i64 - size.height as i64)
            + (target.width as i64 - size.width as i64);
        if best.is_none_or(|(_, min)| slack < min) {
            best = Some((size, slack));
        }
    }
    best.map(|(size, _)| size)
}
