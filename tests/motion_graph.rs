//! Tests for motion-graph construction and traversal.
//!
//! The skeleton is a two-bone rig whose only weighted joint is "spine", so
//! pose distances reduce to plain angle differences and edge sets can be
//! steered precisely through the cost threshold.

use log::info;
use marionette::motion::Motion;
use marionette::motion_graph::MotionGraph;
use marionette::posture::Posture;
use marionette::skeleton::{BoneSpec, Skeleton};
use nalgebra_glm as glm;
use std::sync::Once;

const EPSILON: f32 = 0.0005;
static INIT: Once = Once::new();

fn init_tests() {
    INIT.call_once(|| {
        env_logger::init();
    });
}

fn rig() -> Skeleton {
    Skeleton::builder()
        .bone(BoneSpec {
            name: "root".to_string(),
            ..BoneSpec::default()
        })
        .unwrap()
        .bone(BoneSpec {
            name: "spine".to_string(),
            parent: Some("root".to_string()),
            dir: glm::vec3(0.0, 1.0, 0.0),
            length: 1.0,
            dof_rz: true,
            ..BoneSpec::default()
        })
        .unwrap()
        .finish()
        .unwrap()
}

/// One frame per entry: spine z angle from `angles`, root walking +z.
fn clip(angles: &[f32]) -> Motion {
    let postures = angles
        .iter()
        .enumerate()
        .map(|(i, &angle)| {
            let mut posture = Posture::new(2);
            posture.bone_rotations[1] = glm::vec4(0.0, 0.0, angle, 0.0);
            posture.bone_translations[0] =
                glm::vec4(0.0, 0.0, i as f32, 0.0);
            posture
        })
        .collect();
    Motion::new(rig(), postures).unwrap()
}

fn ramp(frames: usize, start: f32, step: f32) -> Vec<f32> {
    (0..frames).map(|i| start + step * i as f32).collect()
}

#[test]
fn remainder_frames_are_absorbed_into_the_last_segment() {
    let graph =
        MotionGraph::new(&[clip(&ramp(10, 0.0, 1.0))], 4, 2, 1.0).unwrap();
    assert_eq!(graph.segment_count(), 2);
    assert_eq!(graph.segments()[0].frame_count(), 4);
    // 10 = 4 + 6: the two-frame remainder joins the final segment
    assert_eq!(graph.segments()[1].frame_count(), 6);
    assert!(graph.is_end_segment(1));
    assert!(!graph.is_end_segment(0));
}

#[test]
fn edge_weights_sum_to_one_or_the_node_is_terminal() {
    init_tests();
    let clips = [clip(&ramp(8, 0.0, 1.0)), clip(&ramp(8, 0.5, 1.0))];
    let mut graph = MotionGraph::new(&clips, 4, 2, 10.0).unwrap();
    graph.construct_graph();

    for (i, node) in graph.nodes().iter().enumerate() {
        if node.edges.is_empty() {
            assert!(
                graph.is_end_segment(i),
                "non-terminal node {i} has no edges"
            );
        } else {
            let sum: f32 = node.edges.iter().map(|&(_, w)| w).sum();
            info!("node {i}: {} edges, weight sum {sum}", node.edges.len());
            assert!((sum - 1.0).abs() < EPSILON);
        }
    }
}

#[test]
fn adjacent_transitions_keep_both_cursors_full() {
    // A tiny threshold leaves only the adjacent edges, so the walk through
    // one 12-frame clip is fully deterministic without seeding.
    let mut graph =
        MotionGraph::new(&[clip(&ramp(12, 0.0, 5.0))], 4, 2, 1.0e-6).unwrap();
    graph.construct_graph();

    graph.traverse().unwrap();
    assert_eq!((graph.curr_idx, graph.next_idx), (0, 1));
    assert_eq!(graph.curr_segment.frame_count(), 4);
    assert_eq!(graph.next_segment.frame_count(), 4);

    graph.traverse().unwrap();
    assert_eq!((graph.curr_idx, graph.next_idx), (1, 2));
    assert_eq!(
        graph.curr_segment.frame_count() + graph.next_segment.frame_count(),
        8
    );
}

#[test]
fn a_jump_consumes_exactly_one_blend_window() {
    let window = 2;
    let mut graph =
        MotionGraph::new(&[clip(&ramp(12, 0.0, 5.0))], 4, window, 1.0e-6)
            .unwrap();
    graph.construct_graph();

    graph.traverse().unwrap(); // 0 -> 1
    graph.traverse().unwrap(); // 1 -> 2

    // Node 2 is clip-terminal with no cheap transitions, so the next draw
    // falls back to segment 0: a jump.
    let splice_reference = graph
        .curr_segment
        .posture(graph.curr_segment.frame_count() - window)
        .unwrap()
        .clone();
    graph.traverse().unwrap();
    assert_eq!((graph.curr_idx, graph.next_idx), (2, 0));
    // The promoted cursor keeps its length (tail window swapped for the
    // blended window), the next cursor loses its head window, and nothing
    // else is dropped.
    assert_eq!(graph.curr_segment.frame_count(), 4);
    assert_eq!(graph.next_segment.frame_count(), 4 - window);

    // The first blended frame carries full weight for the old tail, so the
    // splice is continuous.
    let spliced = graph
        .curr_segment
        .posture(graph.curr_segment.frame_count() - window)
        .unwrap();
    assert!(
        (spliced.bone_rotations[1].z - splice_reference.bone_rotations[1].z)
            .abs()
            < 0.1
    );

    // After the jump the walk resumes with adjacent transitions and no
    // further frames go missing.
    graph.traverse().unwrap();
    assert_eq!((graph.curr_idx, graph.next_idx), (0, 1));
    assert_eq!(graph.curr_segment.frame_count(), 4 - window);
    assert_eq!(graph.next_segment.frame_count(), 4);
}

#[test]
fn seeded_walks_are_reproducible() {
    let clips = [clip(&ramp(16, 0.0, 3.0)), clip(&ramp(16, 1.0, 3.0))];
    let mut first = MotionGraph::new(&clips, 4, 2, 50.0)
        .unwrap()
        .with_seed(7);
    let mut second = MotionGraph::new(&clips, 4, 2, 50.0)
        .unwrap()
        .with_seed(7);
    first.construct_graph();
    second.construct_graph();

    for _ in 0..10 {
        first.traverse().unwrap();
        second.traverse().unwrap();
        assert_eq!(first.curr_idx, second.curr_idx);
        assert_eq!(first.next_idx, second.next_idx);
        assert_eq!(
            first.next_segment.frame_count(),
            second.next_segment.frame_count()
        );
    }
}

#[test]
fn joint_weight_override_must_match_the_bone_count() {
    let mut graph =
        MotionGraph::new(&[clip(&ramp(8, 0.0, 1.0))], 4, 2, 1.0).unwrap();
    assert!(graph.set_joint_weights(vec![0.0, 1.0]).is_ok());
    assert!(graph.set_joint_weights(vec![1.0]).is_err());
}
