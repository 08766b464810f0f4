//! Motion clips: an owned skeleton plus a sequence of posture frames.

use crate::kinematics::{self, IkChain};
use crate::mn_error::MnError;
use crate::posture::Posture;
use crate::skeleton::Skeleton;
use crate::util;
use nalgebra_glm as glm;

/// A clip of captured (or synthesized) animation sampled at a fixed frame
/// rate. The skeleton is owned exclusively; every stored posture is exactly
/// as long as the skeleton's bone count.
#[derive(Clone, Debug)]
pub struct Motion {
    skeleton: Skeleton,
    postures: Vec<Posture>,
}

impl Motion {
    /// # Errors
    /// `MnError::PostureLengthMismatch` if any posture does not match the
    /// skeleton's bone count.
    pub fn new(
        skeleton: Skeleton,
        postures: Vec<Posture>,
    ) -> Result<Self, MnError> {
        if postures
            .iter()
            .any(|p| p.bone_count() != skeleton.bone_count())
        {
            return Err(MnError::PostureLengthMismatch);
        }
        Ok(Self { skeleton, postures })
    }

    #[must_use]
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.postures.len()
    }

    #[must_use]
    pub fn posture(&self, frame: usize) -> Option<&Posture> {
        self.postures.get(frame)
    }

    #[must_use]
    pub fn postures(&self) -> &[Posture] {
        &self.postures
    }

    /// Overwrites one frame.
    ///
    /// # Errors
    /// `MnError` if `frame` is out of range or the posture does not match
    /// the skeleton.
    pub fn set_posture(
        &mut self,
        frame: usize,
        posture: Posture,
    ) -> Result<(), MnError> {
        if posture.bone_count() != self.skeleton.bone_count() {
            return Err(MnError::PostureLengthMismatch);
        }
        let slot = self
            .postures
            .get_mut(frame)
            .ok_or(MnError::InvalidFrameRange)?;
        *slot = posture;
        Ok(())
    }

    /// Frames `begin..end` copied into a new motion over a cloned skeleton.
    ///
    /// # Errors
    /// `MnError::InvalidFrameRange` on an empty or out-of-bounds range —
    /// this is a caller bug and fails fast.
    pub fn sub_range(&self, begin: usize, end: usize) -> Result<Self, MnError> {
        if begin >= end || end > self.postures.len() {
            return Err(MnError::InvalidFrameRange);
        }
        Ok(Self {
            skeleton: self.skeleton.clone(),
            postures: self.postures[begin..end].to_vec(),
        })
    }

    /// Deletes frames `begin..end`.
    ///
    /// # Errors
    /// `MnError::InvalidFrameRange` when the range is out of bounds.
    pub fn remove(&mut self, begin: usize, end: usize) -> Result<(), MnError> {
        if begin > end || end > self.postures.len() {
            return Err(MnError::InvalidFrameRange);
        }
        self.postures.drain(begin..end);
        Ok(())
    }

    /// Appends every frame of `other`.
    ///
    /// # Errors
    /// `MnError::SkeletonMismatch` if the bone counts differ.
    pub fn concatenate(&mut self, other: &Self) -> Result<(), MnError> {
        if other.skeleton.bone_count() != self.skeleton.bone_count() {
            return Err(MnError::SkeletonMismatch);
        }
        self.postures.extend_from_slice(&other.postures);
        Ok(())
    }

    /// Runs forward kinematics for one frame, leaving the skeleton's world
    /// caches matching that frame.
    ///
    /// # Errors
    /// `MnError::InvalidFrameRange` if the frame does not exist.
    pub fn forward_kinematics(
        &mut self,
        frame_idx: usize,
    ) -> Result<(), MnError> {
        let posture = self
            .postures
            .get(frame_idx)
            .ok_or(MnError::InvalidFrameRange)?;
        kinematics::forward_solver(posture, &mut self.skeleton);
        Ok(())
    }

    /// Solves inverse kinematics for one frame, one chain per target.
    ///
    /// On a stable solve the adjusted posture is committed back into the
    /// motion as the frame's new baseline and `true` is returned. When the
    /// solver fails to converge the stored frame is left untouched, the
    /// skeleton is re-solved from it, and `false` is returned.
    ///
    /// # Errors
    /// Anything [`kinematics::inverse_jacobian_solver`] reports, plus
    /// `MnError::InvalidFrameRange` if the frame does not exist.
    pub fn inverse_kinematics(
        &mut self,
        targets: &[glm::Vec4],
        chains: &[IkChain],
        frame_idx: usize,
    ) -> Result<bool, MnError> {
        let mut working = self
            .postures
            .get(frame_idx)
            .ok_or(MnError::InvalidFrameRange)?
            .clone();
        kinematics::forward_solver(&working, &mut self.skeleton);
        let stable = kinematics::inverse_jacobian_solver(
            &mut self.skeleton,
            &mut working,
            targets,
            chains,
        )?;
        if stable {
            self.postures[frame_idx] = working;
        }
        Ok(stable)
    }

    /// Hands the skeleton's current world-space transforms to a
    /// caller-supplied renderer. The crate never draws anything itself;
    /// this is the only seam a renderer needs after
    /// [`Motion::forward_kinematics`] has run.
    pub fn render(&self, renderer: &mut impl FnMut(&Skeleton)) {
        renderer(&self.skeleton);
    }

    /// Rigidly re-bases the whole clip so the first frame's root sits at
    /// `new_position` facing `new_facing` (both posture-style entries). Only
    /// the yaw difference between the facings is applied, about the first
    /// frame's root position, so the motion stays continuous and upright.
    pub fn transform(
        &mut self,
        new_facing: &glm::Vec4,
        new_position: &glm::Vec4,
    ) {
        let Some(first) = self.postures.first() else {
            return;
        };
        let init_facing = first.bone_rotations[0];
        let init_position = first.bone_translations[0];

        let up = glm::vec3(0.0, 1.0, 0.0);
        let heading = |facing: &glm::Vec4| {
            let dir =
                glm::quat_rotate_vec3(&util::euler_deg_to_quat(facing), &up);
            dir.x.atan2(dir.z)
        };
        let theta = heading(new_facing) - heading(&init_facing);
        let align = glm::quat_angle_axis(theta, &up);

        for posture in &mut self.postures {
            let rotated =
                align * util::euler_deg_to_quat(&posture.bone_rotations[0]);
            let euler = util::quat_to_euler_deg(&rotated);
            posture.bone_rotations[0] = util::to_vec4(&euler);

            let rel = util::to_vec3(&posture.bone_translations[0])
                - util::to_vec3(&init_position);
            let placed = glm::quat_rotate_vec3(&align, &rel)
                + util::to_vec3(new_position);
            posture.bone_translations[0] = util::to_vec4(&placed);
        }
    }

    /// Blends this clip's closing window against the opening window of `m2`
    /// (already aligned by [`Motion::transform`]) and returns the blended
    /// window, `blend_weights.len()` frames long.
    ///
    /// # Errors
    /// `MnError` if either clip is shorter than the window or the skeletons
    /// differ.
    pub fn blending(
        &self,
        m2: &Self,
        blend_weights: &[f32],
    ) -> Result<Self, MnError> {
        let window = blend_weights.len();
        if window > self.frame_count() || window > m2.frame_count() {
            return Err(MnError::InvalidFrameRange);
        }
        let bm1 =
            self.sub_range(self.frame_count() - window, self.frame_count())?;
        let bm2 = m2.sub_range(0, window)?;
        blend(&bm1, &bm2, blend_weights)
    }

    /// Slides `target` (one window's worth of frames) across this clip and
    /// returns the center frame of the best-matching window together with
    /// its distance. Window start frames in `search_begin..search_end` are
    /// tried; the range is clamped to the clip.
    ///
    /// # Errors
    /// `MnError::InvalidFrameRange` when target and frame weights disagree
    /// or no window fits the search range.
    pub fn window_distance_matching(
        &self,
        target: &Self,
        search_begin: usize,
        search_end: usize,
        frame_weights: &[f32],
        joint_weights: &[f32],
    ) -> Result<(usize, f32), MnError> {
        let window = frame_weights.len();
        if window == 0
            || window != target.frame_count()
            || window > self.frame_count()
        {
            return Err(MnError::InvalidFrameRange);
        }
        let last_start = self.frame_count() - window;
        let end = search_end.min(last_start + 1);
        let begin = search_begin.min(end);

        let mut best: Option<(usize, f32)> = None;
        for start in begin..end {
            let mut dist = 0.0;
            for (f, weight) in frame_weights.iter().enumerate() {
                dist += self.postures[start + f]
                    .pose_dist(&target.postures[f], joint_weights)
                    * weight;
            }
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((start + (window - 1) / 2, dist));
            }
        }
        best.ok_or(MnError::InvalidFrameRange)
    }
}

/// Frame-by-frame blend of two equal-length clips: quaternion slerp of each
/// bone's Euler rotation, linear interpolation of translations, weighted
/// towards `m2` as the weights rise.
///
/// # Errors
/// `MnError` if lengths, weights, or skeletons disagree.
pub fn blend(
    m1: &Motion,
    m2: &Motion,
    weights: &[f32],
) -> Result<Motion, MnError> {
    if m1.frame_count() != m2.frame_count()
        || weights.len() != m1.frame_count()
    {
        return Err(MnError::InvalidFrameRange);
    }
    let bone_count = m1.skeleton.bone_count();
    if m2.skeleton.bone_count() != bone_count {
        return Err(MnError::SkeletonMismatch);
    }

    let mut result = m1.clone();
    for (frame, &weight) in weights.iter().enumerate() {
        let p1 = &m1.postures[frame];
        let p2 = &m2.postures[frame];
        let mut blended = Posture::new(bone_count);
        for bone in 0..bone_count {
            let q1 = util::euler_deg_to_quat(&p1.bone_rotations[bone]);
            let q2 = util::euler_deg_to_quat(&p2.bone_rotations[bone]);
            let euler =
                util::quat_to_euler_deg(&glm::quat_slerp(&q1, &q2, weight));
            blended.bone_rotations[bone] = util::to_vec4(&euler);
            blended.bone_translations[bone] = p1.bone_translations[bone]
                * (1.0 - weight)
                + p2.bone_translations[bone] * weight;
        }
        result.postures[frame] = blended;
    }
    Ok(result)
}
