//! Joining two clips end to end: search both clips for the best-matching
//! windows, re-base the second clip onto the splice pose, and cross-fade the
//! overlap with an ease-in/out curve.

use crate::mn_error::MnError;
use crate::motion::Motion;
use crate::util;
use log::debug;

/// Match distance above which a connection is refused when
/// `ConnectOptions::distance_check` is on.
pub const DIST_THRESHOLD: f32 = 15.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchDirection {
    /// Keep the first clip intact and trim the head of the second.
    Forward,
    /// Keep the second clip intact and trim the tail of the first.
    Backward,
}

#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub direction: MatchDirection,
    /// Refuse the connection when the matched windows are farther apart
    /// than [`DIST_THRESHOLD`].
    pub distance_check: bool,
    /// How many candidate window positions are searched.
    pub search_frames: usize,
    /// Blend window length; should be odd so the match centers cleanly.
    pub window: usize,
    /// Per-bone weights for the distance search; `None` uses the skeleton's
    /// DOF-derived weights.
    pub joint_weights: Option<Vec<f32>>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            direction: MatchDirection::Forward,
            distance_check: true,
            search_frames: 50,
            window: 5,
            joint_weights: None,
        }
    }
}

/// Connects `m2` onto the end of `m1`, blending the matched windows.
/// Returns `false` (with `m1` untouched) when the distance check rejects
/// the best match.
///
/// # Errors
/// `MnError` if the clips are built on different skeletons, either clip is
/// shorter than the window, or the window is smaller than 2 frames.
pub fn connect(
    m1: &mut Motion,
    m2: Motion,
    options: &ConnectOptions,
) -> Result<bool, MnError> {
    let window = options.window;
    if window < 2 {
        return Err(MnError::BlendWindowTooLarge);
    }
    if window > m1.frame_count() || window > m2.frame_count() {
        return Err(MnError::InvalidFrameRange);
    }
    if m1.skeleton().bone_count() != m2.skeleton().bone_count() {
        return Err(MnError::SkeletonMismatch);
    }

    let joint_weights = options
        .joint_weights
        .clone()
        .unwrap_or_else(|| m1.skeleton().dof_joint_weights());
    let frame_weights = vec![1.0 / window as f32; window];
    let blend_weights = util::ease_in_out_weights(window);
    let half_span = (window - 1) / 2;
    let mut m2 = m2;

    match options.direction {
        MatchDirection::Forward => {
            // Slide m1's closing window over m2's head.
            let target =
                m1.sub_range(m1.frame_count() - window, m1.frame_count())?;
            let (closest, dist) = m2.window_distance_matching(
                &target,
                0,
                options.search_frames,
                &frame_weights,
                &joint_weights,
            )?;
            debug!("forward search: closest frame {closest} distance {dist}");
            if options.distance_check && dist > DIST_THRESHOLD {
                return Ok(false);
            }

            let splice_pose = m1
                .posture(m1.frame_count() - window)
                .ok_or(MnError::InvalidFrameRange)?
                .clone();
            m2.remove(0, closest - half_span)?;
            m2.transform(
                &splice_pose.bone_rotations[0],
                &splice_pose.bone_translations[0],
            );
        }
        MatchDirection::Backward => {
            // Slide m2's opening window over m1's tail.
            let target = m2.sub_range(0, window)?;
            let begin =
                m1.frame_count().saturating_sub(options.search_frames);
            let (closest, dist) = m1.window_distance_matching(
                &target,
                begin,
                m1.frame_count(),
                &frame_weights,
                &joint_weights,
            )?;
            debug!("backward search: closest frame {closest} distance {dist}");
            if options.distance_check && dist > DIST_THRESHOLD {
                return Ok(false);
            }

            let splice_pose = m1
                .posture(closest - half_span)
                .ok_or(MnError::InvalidFrameRange)?
                .clone();
            m2.transform(
                &splice_pose.bone_rotations[0],
                &splice_pose.bone_translations[0],
            );
            m1.remove(closest + half_span + 1, m1.frame_count())?;
        }
    }

    let blended = m1.blending(&m2, &blend_weights)?;
    let frames = m1.frame_count();
    m1.remove(frames - window, frames)?;
    m2.remove(0, window)?;
    m1.concatenate(&blended)?;
    m1.concatenate(&m2)?;
    Ok(true)
}
