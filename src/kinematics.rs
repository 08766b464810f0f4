//! Forward and inverse kinematics over a skeleton arena.

use crate::mn_error::MnError;
use crate::posture::Posture;
use crate::skeleton::Skeleton;
use crate::util;
use log::debug;
use nalgebra::linalg::SVD;
use nalgebra::{DMatrix, DVector};
use nalgebra_glm as glm;
use smallvec::SmallVec;

const MAX_ITERATION: usize = 1000;
const EPSILON: f32 = 1.0e-3;
const STEP: f32 = 0.1;

/// Applies `posture` to the skeleton, rewriting every bone's cached world
/// start/end positions and accumulated rotation.
///
/// The root's start is the posture's root translation and its rotation is
/// the decoded root Euler angles; any other bone starts where its parent
/// ends with rotation `parent * rest * decoded local angles`. Bones are
/// walked child/sibling from the root so a bone is never visited before its
/// parent. Zero-length bones end where they start.
pub fn forward_solver(posture: &Posture, skeleton: &mut Skeleton) {
    debug_assert_eq!(posture.bone_count(), skeleton.bone_count());
    let mut stack: Vec<usize> = vec![0];
    while let Some(idx) = stack.pop() {
        let local = util::euler_deg_to_quat(&posture.bone_rotations[idx]);
        let (start, rotation) = match skeleton.bones[idx].parent {
            Some(p) => {
                let parent = &skeleton.bones[p];
                let rest = skeleton.bones[idx].rest_rotation;
                (parent.end_position, parent.rotation * rest * local)
            }
            None => (util::to_vec3(&posture.bone_translations[idx]), local),
        };
        let bone = &mut skeleton.bones[idx];
        let segment = if bone.length > 0.0 && glm::length(&bone.dir) > f32::EPSILON {
            glm::normalize(&bone.dir) * bone.length
        } else {
            glm::Vec3::zeros()
        };
        bone.start_position = start;
        bone.rotation = rotation;
        bone.end_position = start + glm::quat_rotate_vec3(&rotation, &segment);
        if let Some(sibling) = bone.sibling {
            stack.push(sibling);
        }
        if let Some(child) = bone.child {
            stack.push(child);
        }
    }
}

/// One independent chain handled by the inverse solver: the path of bones
/// from a moving end effector up to (and including) a fixed base.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IkChain {
    pub end_bone: usize,
    pub base_bone: usize,
}

/// Least-squares solve of `jacobian * x = desired` through a singular value
/// decomposition, the pseudo-inverse construction.
fn pseudo_inverse_solve(
    jacobian: &DMatrix<f32>,
    desired: &DVector<f32>,
) -> Result<DVector<f32>, MnError> {
    SVD::new(jacobian.clone(), true, true)
        .solve(desired, 1.0e-6)
        .map_err(|_| MnError::SolverFailed)
}

fn collect_chain(
    skeleton: &Skeleton,
    chain: IkChain,
) -> Result<SmallVec<[usize; 8]>, MnError> {
    let mut bones = SmallVec::new();
    let mut idx = chain.end_bone;
    loop {
        if idx >= skeleton.bone_count() {
            return Err(MnError::BoneIndexOutOfRange);
        }
        bones.push(idx);
        if idx == chain.base_bone {
            return Ok(bones);
        }
        idx = skeleton.bones[idx]
            .parent
            .ok_or(MnError::ChainNotConnected)?;
    }
}

/// Joint world positions for a chain: entry 0 is the effector tip (the end
/// bone's end position) followed by each chain bone's start position, so the
/// last entry is the chain's fixed base joint.
fn chain_joints(
    skeleton: &Skeleton,
    bones: &[usize],
) -> SmallVec<[glm::Vec3; 8]> {
    let mut joints = SmallVec::with_capacity(bones.len() + 1);
    joints.push(skeleton.bones[bones[0]].end_position);
    for &b in bones {
        joints.push(skeleton.bones[b].start_position);
    }
    joints
}

/// Iteratively adjusts `posture` so that each chain's end effector reaches
/// its target, within a fixed position tolerance and iteration cap.
///
/// Each iteration builds the 4 x (3 * chain length) Jacobian — one column
/// per active rotational degree of freedom, `world axis x (effector -
/// joint)`, inactive columns left zero — solves the damped least-squares
/// problem through the pseudo-inverse, folds the scaled solution into the
/// posture's angles (degrees, active axes only), clamps every axis to the
/// bone's limits, and re-runs [`forward_solver`] so the next Jacobian sees
/// the updated pose. The first chain additionally keeps its base joint
/// pinned by counter-translating the root.
///
/// Returns whether every chain converged. On a `false` result the posture
/// has been rolled back to its pre-call state and the skeleton re-solved
/// from it, so the caller always observes a self-consistent skeleton.
///
/// # Errors
/// `MnError` if the target and chain counts differ, a chain references a
/// bone out of range or not connected to its base, or the least-squares
/// solve fails.
pub fn inverse_jacobian_solver(
    skeleton: &mut Skeleton,
    posture: &mut Posture,
    targets: &[glm::Vec4],
    chains: &[IkChain],
) -> Result<bool, MnError> {
    if targets.len() != chains.len() {
        return Err(MnError::TargetCountMismatch);
    }
    let original = posture.clone();

    for (chain_idx, (&chain, target)) in chains.iter().zip(targets).enumerate() {
        let bones = collect_chain(skeleton, chain)?;
        let bone_num = bones.len();
        let target = util::to_vec3(target);
        let fixed_base_pos = skeleton.bones[bones[bone_num - 1]].start_position;

        for _ in 0..MAX_ITERATION {
            let joints = chain_joints(skeleton, &bones);
            let desired = target - joints[0];
            if glm::length(&desired) < EPSILON {
                break;
            }

            let mut jacobian = DMatrix::<f32>::zeros(4, 3 * bone_num);
            for (i, &bone_idx) in bones.iter().enumerate() {
                let arm = joints[0] - joints[i + 1];
                let bone = &skeleton.bones[bone_idx];
                for axis in 0..3 {
                    if !bone.has_dof(axis) {
                        continue;
                    }
                    let mut unit = glm::Vec3::zeros();
                    unit[axis] = 1.0;
                    let world_axis = glm::quat_rotate_vec3(&bone.rotation, &unit);
                    let column = glm::cross(&world_axis, &arm);
                    jacobian
                        .fixed_view_mut::<3, 1>(0, 3 * i + axis)
                        .copy_from(&column);
                }
            }

            let rhs = DVector::from_column_slice(&[
                desired.x, desired.y, desired.z, 0.0,
            ]);
            let delta = pseudo_inverse_solve(&jacobian, &rhs)? * STEP;

            for (i, &bone_idx) in bones.iter().enumerate() {
                let (limit_min, limit_max) = {
                    let bone = &skeleton.bones[bone_idx];
                    (bone.limit_min, bone.limit_max)
                };
                for axis in 0..3 {
                    if skeleton.bones[bone_idx].has_dof(axis) {
                        posture.bone_rotations[bone_idx][axis] +=
                            delta[3 * i + axis].to_degrees();
                    }
                }
                // Clamp all three axes; inactive ones stay at their clamped
                // rest value.
                for axis in 0..3 {
                    let angle = posture.bone_rotations[bone_idx][axis];
                    posture.bone_rotations[bone_idx][axis] =
                        angle.clamp(limit_min[axis], limit_max[axis]);
                }
            }

            forward_solver(posture, skeleton);
            if chain_idx == 0 {
                // Counter-translate the root so the first chain's base joint
                // does not drift while only non-root joints are meant to
                // move. Takes effect at the next solve of the posture.
                let base_now =
                    skeleton.bones[bones[bone_num - 1]].start_position;
                let correction = fixed_base_pos - base_now;
                posture.bone_translations[0] += util::to_vec4(&correction);
            }
        }
    }

    let mut stable = true;
    for (&chain, target) in chains.iter().zip(targets) {
        let bones = collect_chain(skeleton, chain)?;
        let effector = skeleton.bones[bones[0]].end_position;
        if glm::length(&(util::to_vec3(target) - effector)) > EPSILON {
            stable = false;
        }
    }

    if stable {
        Ok(true)
    } else {
        debug!("ik did not converge, rolling the posture back");
        *posture = original;
        forward_solver(posture, skeleton);
        Ok(false)
    }
}
