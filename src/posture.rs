//! Per-frame joint angles and root translation.

use nalgebra_glm as glm;

/// One animation frame.
///
/// Rotations are Euler angles in degrees stored in the x/y/z components of a
/// `Vec4`; the fourth component is unused and kept at zero so frame data
/// lines up with the homogeneous coordinates used on the rendering side.
/// Entries are indexed by bone index and the vectors are always exactly as
/// long as the skeleton's bone count. Only the root (bone 0) normally
/// carries a translation.
#[derive(Clone, Debug, PartialEq)]
pub struct Posture {
    pub bone_rotations: Vec<glm::Vec4>,
    pub bone_translations: Vec<glm::Vec4>,
}

impl Posture {
    #[must_use]
    pub fn new(bone_count: usize) -> Self {
        Self {
            bone_rotations: vec![glm::Vec4::zeros(); bone_count],
            bone_translations: vec![glm::Vec4::zeros(); bone_count],
        }
    }

    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bone_rotations.len()
    }

    /// Root yaw in degrees.
    #[must_use]
    pub fn facing_angle(&self) -> f32 {
        self.bone_rotations.first().map_or(0.0, |r| r.y)
    }

    /// Weighted angular distance to another posture. The root's orientation
    /// is ignored so that the same motion walked in two directions still
    /// compares as similar; every other bone contributes the Euclidean norm
    /// of its wrapped per-axis angle differences scaled by its joint weight.
    #[must_use]
    pub fn pose_dist(&self, other: &Self, joint_weights: &[f32]) -> f32 {
        let mut dist = 0.0;
        let pairs = self
            .bone_rotations
            .iter()
            .zip(&other.bone_rotations)
            .zip(joint_weights)
            .skip(1);
        for ((r1, r2), weight) in pairs {
            let diff = glm::vec3(
                angular_difference(r1.x, r2.x),
                angular_difference(r1.y, r2.y),
                angular_difference(r1.z, r2.z),
            );
            dist += glm::length(&diff) * weight;
        }
        dist
    }
}

/// Smallest signed difference between two angles in degrees, in [-180, 180).
#[must_use]
pub fn angular_difference(angle1: f32, angle2: f32) -> f32 {
    (angle2 - angle1 + 180.0).rem_euclid(360.0) - 180.0
}
