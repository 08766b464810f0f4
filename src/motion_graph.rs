//! Motion graph: slice clips into fixed-length segments, connect segments
//! whose blend windows are close, and walk the graph producing a continuous
//! stream of postures with blended transitions at every jump.

use crate::mn_error::MnError;
use crate::motion::Motion;
use crate::util;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Transition edges out of one segment node as `(target, weight)` pairs.
/// After [`MotionGraph::construct_graph`] the weights of a node with any
/// edges sum to 1.0; clip-terminal segments with no transition cheap enough
/// keep an empty edge list.
#[derive(Clone, Debug, Default)]
pub struct MotionNode {
    pub edges: Vec<(usize, f32)>,
}

impl MotionNode {
    pub fn add_edge_to(&mut self, node: usize, weight: f32) {
        self.edges.push((node, weight));
    }
}

/// Graph of fixed-length motion segments with two playback cursors.
///
/// `curr_segment` and `next_segment` are full motions rather than indices
/// because a traversal may already have produced blended, re-based frames
/// that no raw segment contains. Both cursors are replaced wholesale by
/// every [`MotionGraph::traverse`] call — callers must not hold references
/// into them across a call, and earlier segments are re-based in place
/// during a jump.
pub struct MotionGraph {
    pub curr_idx: usize,
    pub next_idx: usize,
    pub curr_segment: Motion,
    pub next_segment: Motion,
    graph: Vec<MotionNode>,
    segment_list: Vec<Motion>,
    end_segments: Vec<usize>,
    joint_weights: Vec<f32>,
    blend_weights: Vec<f32>,
    dist_matrix: Vec<Vec<f32>>,
    blend_window_size: usize,
    edge_cost_threshold: f32,
    rng: StdRng,
}

impl MotionGraph {
    /// Slices every clip into `segment_size`-frame segments (a final
    /// remainder shorter than one segment is absorbed into the clip's last
    /// segment instead of forming a short one) and records which segments
    /// are clip-terminal. Joint weights default to the skeleton's
    /// DOF-derived weights; blend weights follow the ease-in/out curve.
    ///
    /// # Errors
    /// `MnError` if the motion list is empty, the skeletons disagree, any
    /// clip is shorter than one segment, or the blend window is not at
    /// least 2 and at most half the segment size (a promoted, trimmed
    /// segment must still contain a full window).
    pub fn new(
        motion_list: &[Motion],
        segment_size: usize,
        blend_window_size: usize,
        edge_cost_threshold: f32,
    ) -> Result<Self, MnError> {
        let Some(first_motion) = motion_list.first() else {
            return Err(MnError::EmptyMotionList);
        };
        if blend_window_size < 2 || blend_window_size * 2 > segment_size {
            return Err(MnError::BlendWindowTooLarge);
        }
        let bone_count = first_motion.skeleton().bone_count();

        let mut segment_list = Vec::new();
        let mut end_segments = Vec::new();
        for motion in motion_list {
            if motion.skeleton().bone_count() != bone_count {
                return Err(MnError::SkeletonMismatch);
            }
            let total = motion.frame_count();
            if total < segment_size {
                return Err(MnError::MotionTooShort);
            }
            let mut begin = 0;
            let mut end = segment_size;
            while end <= total {
                if total - end < segment_size {
                    end = total;
                }
                segment_list.push(motion.sub_range(begin, end)?);
                begin += segment_size;
                end += segment_size;
            }
            end_segments.push(segment_list.len() - 1);
        }

        let node_count = segment_list.len();
        debug!(
            "sliced {} clips into {node_count} segments",
            motion_list.len()
        );
        Ok(Self {
            curr_idx: 0,
            next_idx: 0,
            curr_segment: segment_list[0].clone(),
            next_segment: segment_list[0].clone(),
            graph: Vec::new(),
            joint_weights: first_motion.skeleton().dof_joint_weights(),
            blend_weights: util::ease_in_out_weights(blend_window_size),
            dist_matrix: vec![vec![0.0; node_count]; node_count],
            segment_list,
            end_segments,
            blend_window_size,
            edge_cost_threshold,
            rng: StdRng::from_os_rng(),
        })
    }

    /// Reseeds the traversal RNG, making every walk reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Replaces the DOF-derived joint weights used by the distance matrix.
    ///
    /// # Errors
    /// `MnError::PostureLengthMismatch` when the length is not the bone
    /// count.
    pub fn set_joint_weights(
        &mut self,
        weights: Vec<f32>,
    ) -> Result<(), MnError> {
        if weights.len() != self.joint_weights.len() {
            return Err(MnError::PostureLengthMismatch);
        }
        self.joint_weights = weights;
        Ok(())
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segment_list.len()
    }

    #[must_use]
    pub fn segments(&self) -> &[Motion] {
        &self.segment_list
    }

    #[must_use]
    pub fn nodes(&self) -> &[MotionNode] {
        &self.graph
    }

    /// Whether segment `idx` is the last segment of its source clip.
    #[must_use]
    pub fn is_end_segment(&self, idx: usize) -> bool {
        self.end_segments.contains(&idx)
    }

    /// `dist_matrix[i][j]`: summed weighted pose distance between segment
    /// i's closing blend window and segment j's opening one. The diagonal is
    /// pinned to the edge-cost threshold so a self loop never wins on cost.
    fn compute_dist_matrix(&mut self) {
        let node_count = self.segment_list.len();
        let window = self.blend_window_size;
        let segments = &self.segment_list;
        let joint_weights = &self.joint_weights;
        let threshold = self.edge_cost_threshold;

        #[cfg(feature = "rayon")]
        let it = (0..node_count).into_par_iter();
        #[cfg(not(feature = "rayon"))]
        let it = 0..node_count;
        self.dist_matrix = it
            .map(|i| {
                debug!("calculating transition costs for segment {i}");
                let tail = &segments[i];
                let tail_frames = tail.frame_count();
                (0..node_count)
                    .map(|j| {
                        if i == j {
                            return threshold;
                        }
                        let head = &segments[j];
                        (0..window)
                            .map(|f| {
                                tail.postures()[tail_frames - window + f]
                                    .pose_dist(
                                        &head.postures()[f],
                                        joint_weights,
                                    )
                            })
                            .sum()
                    })
                    .collect()
            })
            .collect();
    }

    /// Rebuilds every node and edge from scratch. An edge to the following
    /// segment (large fixed weight) exists unless the node is clip-terminal;
    /// an edge to every segment whose distance beats the threshold carries
    /// that distance as its raw weight; each node's outgoing weights are
    /// then normalized to sum to 1.0.
    pub fn construct_graph(&mut self) {
        self.compute_dist_matrix();
        let node_count = self.segment_list.len();
        self.graph = vec![MotionNode::default(); node_count];
        for i in 0..node_count {
            let mut total_weight = 0.0;
            if !self.is_end_segment(i) && i + 1 < node_count {
                self.graph[i].add_edge_to(i + 1, 1000.0);
                total_weight += 1000.0;
            }
            for j in 0..node_count {
                if i != j && self.dist_matrix[i][j] < self.edge_cost_threshold
                {
                    let weight = self.dist_matrix[i][j];
                    self.graph[i].add_edge_to(j, weight);
                    total_weight += weight;
                }
            }
            if total_weight > 0.0 {
                for (_, weight) in &mut self.graph[i].edges {
                    *weight /= total_weight;
                }
            }
        }
    }

    /// Advances playback by exactly one segment.
    ///
    /// Promotes the next cursor to current, draws the following segment from
    /// the current node's edge distribution (a node with no edges falls back
    /// to segment 0), and prepares the new next cursor. The trivial adjacent
    /// transition reuses the raw segment; a jump re-bases the target segment
    /// onto the current segment's blend-window-start pose, propagates that
    /// re-basing through the target clip's remaining segments, blends the
    /// overlapping windows with the ease curve, and splices — the current
    /// cursor trades its closing window for the blended one and the next
    /// cursor drops its opening window. Exactly one window's worth of
    /// original frames is consumed per jump, never more.
    ///
    /// # Errors
    /// `MnError` only when [`MotionGraph::construct_graph`] has not been run
    /// or internal segment bookkeeping is broken; a validated graph never
    /// returns one.
    pub fn traverse(&mut self) -> Result<(), MnError> {
        self.curr_idx = self.next_idx;
        self.curr_segment = self.next_segment.clone();

        let prob: f32 = self.rng.random();
        let edges = self
            .graph
            .get(self.curr_idx)
            .map_or(&[][..], |node| node.edges.as_slice());
        self.next_idx = if edges.is_empty() {
            0
        } else {
            // Cumulative draw; float rounding at the top of the range falls
            // through to the last edge.
            let mut pick = edges[edges.len() - 1].0;
            let mut sum = 0.0;
            for &(target, weight) in edges {
                sum += weight;
                if sum >= prob {
                    pick = target;
                    break;
                }
            }
            pick
        };

        if self.next_idx == self.curr_idx + 1 {
            self.next_segment = self.segment_list[self.next_idx].clone();
            return Ok(());
        }

        debug!(
            "graph jump from segment {} to segment {}",
            self.curr_idx, self.next_idx
        );
        let window = self.blend_window_size;
        let splice_frame = self.curr_segment.frame_count() - window;
        let splice_pose = self
            .curr_segment
            .posture(splice_frame)
            .ok_or(MnError::InvalidFrameRange)?
            .clone();

        let facing = splice_pose.bone_rotations[0];
        let position = splice_pose.bone_translations[0];
        self.segment_list[self.next_idx].transform(&facing, &position);
        self.next_segment = self.segment_list[self.next_idx].clone();
        let blended =
            self.curr_segment.blending(&self.next_segment, &self.blend_weights)?;

        // Drag the rest of the target clip along so already-committed
        // segments stay spatially consistent with the re-based one.
        let mut idx = self.next_idx;
        while !self.is_end_segment(idx) {
            let tail_pose = self.segment_list[idx]
                .posture(self.segment_list[idx].frame_count() - 1)
                .ok_or(MnError::InvalidFrameRange)?
                .clone();
            idx += 1;
            let facing = tail_pose.bone_rotations[0];
            let position = tail_pose.bone_translations[0];
            self.segment_list[idx].transform(&facing, &position);
        }

        let frames = self.curr_segment.frame_count();
        self.curr_segment.remove(frames - window, frames)?;
        self.curr_segment.concatenate(&blended)?;
        self.next_segment.remove(0, window)?;
        Ok(())
    }
}
