//! Skeleton data: a tree of bones stored as an index arena.
//!
//! Bones reference each other only by index into the owning [`Skeleton`];
//! `parent` points up, `child` points at the first child, and further
//! children of the same parent hang off the first child's `sibling` chain.
//! The capture-file reader living outside this crate produces the bone
//! descriptions; here they are only validated and cached.

use crate::mn_error::MnError;
use ahash::{HashMap, HashMapExt};
use nalgebra_glm as glm;

/// One rigid link of the hierarchy.
///
/// `dir` and `length` describe the rest-pose segment in the bone's local
/// frame and `rest_rotation` orients that frame relative to the parent's.
/// `start_position`, `end_position` and `rotation` are world-space caches
/// rewritten by every kinematics pass; they carry no meaning before the
/// first [`crate::kinematics::forward_solver`] call.
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub idx: usize,
    pub parent: Option<usize>,
    pub child: Option<usize>,
    pub sibling: Option<usize>,
    pub dir: glm::Vec3,
    pub length: f32,
    pub rest_rotation: glm::Quat,
    pub dof_rx: bool,
    pub dof_ry: bool,
    pub dof_rz: bool,
    /// Per-axis rotation limits in degrees.
    pub limit_min: glm::Vec3,
    pub limit_max: glm::Vec3,
    pub start_position: glm::Vec3,
    pub end_position: glm::Vec3,
    pub rotation: glm::Quat,
}

impl Bone {
    /// Whether the rotational degree of freedom on `axis` (0 = x, 1 = y,
    /// 2 = z) is active.
    #[must_use]
    pub const fn has_dof(&self, axis: usize) -> bool {
        match axis {
            0 => self.dof_rx,
            1 => self.dof_ry,
            2 => self.dof_rz,
            _ => false,
        }
    }

    /// Number of active rotational degrees of freedom.
    #[must_use]
    pub const fn rotational_dof_count(&self) -> usize {
        self.dof_rx as usize + self.dof_ry as usize + self.dof_rz as usize
    }
}

/// Construction-time description of a bone. World-space caches start zeroed
/// and the arena links are filled in by the builder.
#[derive(Clone, Debug)]
pub struct BoneSpec {
    pub name: String,
    pub parent: Option<String>,
    pub dir: glm::Vec3,
    pub length: f32,
    pub rest_rotation: glm::Quat,
    pub dof_rx: bool,
    pub dof_ry: bool,
    pub dof_rz: bool,
    pub limit_min: glm::Vec3,
    pub limit_max: glm::Vec3,
}

impl Default for BoneSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent: None,
            dir: glm::Vec3::zeros(),
            length: 0.0,
            rest_rotation: glm::Quat::identity(),
            dof_rx: false,
            dof_ry: false,
            dof_rz: false,
            limit_min: glm::vec3(-180.0, -180.0, -180.0),
            limit_max: glm::vec3(180.0, 180.0, 180.0),
        }
    }
}

/// Sole owner of a bone arena.
#[derive(Clone, Debug)]
pub struct Skeleton {
    pub(crate) bones: Vec<Bone>,
    name_to_idx: HashMap<String, usize>,
}

impl Skeleton {
    /// Validates a prelinked arena and takes ownership of it.
    ///
    /// # Errors
    /// `MnError` if the arena is empty, an index is stale or out of range,
    /// bone 0 is not the parentless root, names collide, or the links do not
    /// form a single tree reaching every bone exactly once.
    pub fn from_bones(bones: Vec<Bone>) -> Result<Self, MnError> {
        if bones.is_empty() {
            return Err(MnError::EmptySkeleton);
        }
        if bones[0].parent.is_some() {
            return Err(MnError::RootMustBeFirst);
        }
        let mut name_to_idx = HashMap::with_capacity(bones.len());
        for (i, bone) in bones.iter().enumerate() {
            if bone.idx != i {
                return Err(MnError::BoneIndexOutOfRange);
            }
            let in_range = |link: Option<usize>| match link {
                Some(l) => l < bones.len() && l != i,
                None => true,
            };
            if !(in_range(bone.parent)
                && in_range(bone.child)
                && in_range(bone.sibling))
            {
                return Err(MnError::BrokenBoneLink);
            }
            if name_to_idx.insert(bone.name.clone(), i).is_some() {
                return Err(MnError::DuplicateBoneName);
            }
        }

        // Every bone must be reached exactly once walking child/sibling
        // links from the root, with a parent field matching the walk.
        let mut visited = vec![false; bones.len()];
        let mut stack = vec![0_usize];
        let mut count = 0_usize;
        while let Some(idx) = stack.pop() {
            if visited[idx] {
                return Err(MnError::BrokenBoneLink);
            }
            visited[idx] = true;
            count += 1;
            if let Some(child) = bones[idx].child {
                if bones[child].parent != Some(idx) {
                    return Err(MnError::BrokenBoneLink);
                }
                stack.push(child);
            }
            if let Some(sibling) = bones[idx].sibling {
                if bones[sibling].parent != bones[idx].parent {
                    return Err(MnError::BrokenBoneLink);
                }
                stack.push(sibling);
            }
        }
        if count != bones.len() {
            return Err(MnError::BrokenBoneLink);
        }

        Ok(Self { bones, name_to_idx })
    }

    #[must_use]
    pub fn builder() -> SkeletonBuilder {
        SkeletonBuilder::new()
    }

    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    #[must_use]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[must_use]
    pub fn bone(&self, idx: usize) -> Option<&Bone> {
        self.bones.get(idx)
    }

    #[must_use]
    pub fn bone_by_name(&self, name: &str) -> Option<&Bone> {
        self.index_of(name).map(|i| &self.bones[i])
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_idx.get(name).copied()
    }

    /// Normalized per-bone weights for pose-distance sums: every bone with
    /// at least one rotational degree of freedom contributes equally, dummy
    /// bones not at all.
    #[must_use]
    pub fn dof_joint_weights(&self) -> Vec<f32> {
        let mut weights: Vec<f32> = self
            .bones
            .iter()
            .map(|b| if b.rotational_dof_count() > 0 { 1.0 } else { 0.0 })
            .collect();
        let sum: f32 = weights.iter().sum();
        if sum > 0.0 {
            for w in &mut weights {
                *w /= sum;
            }
        }
        weights
    }
}

/// Builds a [`Skeleton`] bone by bone, maintaining the child/sibling chains
/// as bones are appended under their named parents.
#[derive(Debug, Default)]
pub struct SkeletonBuilder {
    bones: Vec<Bone>,
    name_to_idx: HashMap<String, usize>,
}

impl SkeletonBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bones: Vec::new(),
            name_to_idx: HashMap::new(),
        }
    }

    /// Appends a bone. The first bone appended must be the parentless root;
    /// every later bone names an already-appended parent.
    ///
    /// # Errors
    /// `MnError` on duplicate names, an unknown parent, or a root/parent
    /// arrangement that breaks the tree shape.
    pub fn bone(mut self, spec: BoneSpec) -> Result<Self, MnError> {
        let idx = self.bones.len();
        let parent = match (&spec.parent, idx) {
            (None, 0) => None,
            (None, _) | (Some(_), 0) => return Err(MnError::RootMustBeFirst),
            (Some(name), _) => Some(
                self.name_to_idx
                    .get(name.as_str())
                    .copied()
                    .ok_or(MnError::UnknownParentBone)?,
            ),
        };
        if self.name_to_idx.insert(spec.name.clone(), idx).is_some() {
            return Err(MnError::DuplicateBoneName);
        }
        if let Some(p) = parent {
            // Hang the new bone off the parent's child pointer, or append to
            // the sibling chain when a first child already exists.
            match self.bones[p].child {
                None => self.bones[p].child = Some(idx),
                Some(first) => {
                    let mut tail = first;
                    while let Some(next) = self.bones[tail].sibling {
                        tail = next;
                    }
                    self.bones[tail].sibling = Some(idx);
                }
            }
        }
        self.bones.push(Bone {
            name: spec.name,
            idx,
            parent,
            child: None,
            sibling: None,
            dir: spec.dir,
            length: spec.length,
            rest_rotation: spec.rest_rotation,
            dof_rx: spec.dof_rx,
            dof_ry: spec.dof_ry,
            dof_rz: spec.dof_rz,
            limit_min: spec.limit_min,
            limit_max: spec.limit_max,
            start_position: glm::Vec3::zeros(),
            end_position: glm::Vec3::zeros(),
            rotation: glm::Quat::identity(),
        });
        Ok(self)
    }

    /// Finishes the build.
    ///
    /// # Errors
    /// `MnError::EmptySkeleton` if no bone was appended.
    pub fn finish(self) -> Result<Skeleton, MnError> {
        if self.bones.is_empty() {
            return Err(MnError::EmptySkeleton);
        }
        Ok(Skeleton {
            bones: self.bones,
            name_to_idx: self.name_to_idx,
        })
    }
}
