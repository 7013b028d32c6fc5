//! Hold-time policy for videos.
//!
//! Playback starts before the duration is known. The policy waits a short,
//! fixed time for the surface to report it and then picks one of three
//! branches; short and unknown clips are looped until their hold expires.

use log::{debug, info, warn};
use std::time::Duration;

use crate::errors::MediaError;
use crate::video::VideoSurface;

/// How long to wait for the stream duration before treating it as unknown.
pub const METADATA_WAIT: Duration = Duration::from_millis(1000);
/// No video leaves the screen sooner than this.
pub const MIN_VIDEO_DISPLAY: Duration = Duration::from_millis(10_000);
/// Long videos are stopped this much before their natural end.
pub const VIDEO_END_MARGIN: Duration = Duration::from_millis(1000);
/// Hold for videos whose duration never became known.
pub const UNKNOWN_DURATION_HOLD: Duration = Duration::from_millis(3000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DwellBranch {
    /// Known duration under the display floor.
    Short,
    /// Known duration at or above the display floor.
    Sufficient,
    /// No usable duration: timed out, zero, or NaN.
    Unknown,
}

/// What to do with a video once its duration question is settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DwellPlan {
    pub branch: DwellBranch,
    pub hold: Duration,
    pub temp_loop: bool,
}

impl DwellPlan {
    pub fn for_duration(duration: Option<Duration>) -> DwellPlan {
        match duration {
            None => DwellPlan {
                branch: DwellBranch::Unknown,
                hold: UNKNOWN_DURATION_HOLD,
                temp_loop: true,
            },
            Some(d) if d < MIN_VIDEO_DISPLAY => {
                DwellPlan { branch: DwellBranch::Short, hold: MIN_VIDEO_DISPLAY, temp_loop: true }
            }
            Some(d) => DwellPlan {
                branch: DwellBranch::Sufficient,
                hold: MIN_VIDEO_DISPLAY.max(d.saturating_sub(VIDEO_END_MARGIN)),
                temp_loop: false,
            },
        }
    }
}

/// Converts a reported duration in seconds. Zero, negative, NaN and infinite
/// durations are not usable.
pub fn usable_duration(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Plays `url` on `surface` and holds it for the duration the policy picks.
///
/// `temp_loop` mirrors the surface's temporary-loop flag in the cycle state; it
/// is always false again when this returns. The surface is stopped in every
/// branch.
pub async fn play_video(
    surface: &mut dyn VideoSurface,
    url: &str,
    temp_loop: &mut bool,
) -> Result<DwellPlan, MediaError> {
    // Starting a new stream drops the previous duration sender, which cancels
    // any metadata wait that was still pending on it.
    let duration_rx = surface.start(url)?;

    let duration = match tokio::time::timeout(METADATA_WAIT, duration_rx).await {
        Ok(Ok(secs)) => {
            let usable = usable_duration(secs);
            if usable.is_none() {
                debug!("Video {} reported unusable duration {}", url, secs);
            }
            usable
        }
        Ok(Err(_)) => {
            warn!("Video {} closed before reporting a duration", url);
            None
        }
        Err(_) => {
            debug!("No duration for {} after {:?}", url, METADATA_WAIT);
            None
        }
    };

    let plan = DwellPlan::for_duration(duration);
    info!("Video {} dwell: {:?} branch, holding {:?}", url, plan.branch, plan.hold);
    if plan.temp_loop {
        surface.set_temp_loop(true);
        *temp_loop = true;
    }

    tokio::time::sleep(plan.hold).await;

    surface.set_temp_loop(false);
    *temp_loop = false;
    surface.stop();
    Ok(plan)
}
