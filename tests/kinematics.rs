//! Tests for the forward and inverse kinematics solvers.
//!
//! The chains used here are small enough to check against geometry done by
//! hand: unit-length bones along +x, so a straight chain of two bones ends
//! at (2, 0, 0) and a 90° z rotation on the first bone folds the whole
//! chain onto +y.

use log::info;
use marionette::kinematics::{self, IkChain};
use marionette::motion::Motion;
use marionette::posture::Posture;
use marionette::skeleton::{BoneSpec, Skeleton};
use nalgebra_glm as glm;
use std::sync::Once;

const EPSILON: f32 = 0.0005; // Small value for float comparisons
const IK_EPSILON: f32 = 2.0e-3; // Solver tolerance plus float slack
static INIT: Once = Once::new();

/// Initializes logging in a "once per test run" manner. Call at the start of
/// each test that needs logging.
fn init_tests() {
    INIT.call_once(|| {
        env_logger::init();
    });
}

fn compare(v1: &glm::Vec3, v2: &glm::Vec3) {
    assert!(
        glm::length(&(v1 - v2)) < EPSILON,
        "expected {v2:?}, got {v1:?}"
    );
}

/// Zero-length root at the origin with `lengths.len()` bones chained along
/// +x, all rotational degrees of freedom enabled.
fn chain(lengths: &[f32]) -> Skeleton {
    let mut builder = Skeleton::builder()
        .bone(BoneSpec {
            name: "root".to_string(),
            ..BoneSpec::default()
        })
        .unwrap();
    let mut parent = "root".to_string();
    for (i, &length) in lengths.iter().enumerate() {
        let name = format!("bone{i}");
        builder = builder
            .bone(BoneSpec {
                name: name.clone(),
                parent: Some(parent),
                dir: glm::vec3(1.0, 0.0, 0.0),
                length,
                dof_rx: true,
                dof_ry: true,
                dof_rz: true,
                ..BoneSpec::default()
            })
            .unwrap();
        parent = name;
    }
    builder.finish().unwrap()
}

#[test]
fn rest_pose_is_a_straight_line() {
    let mut skeleton = chain(&[1.0, 1.0]);
    let posture = Posture::new(3);
    kinematics::forward_solver(&posture, &mut skeleton);

    compare(&skeleton.bones()[0].start_position, &glm::Vec3::zeros());
    compare(&skeleton.bones()[0].end_position, &glm::Vec3::zeros());
    compare(&skeleton.bones()[1].start_position, &glm::Vec3::zeros());
    compare(&skeleton.bones()[1].end_position, &glm::vec3(1.0, 0.0, 0.0));
    compare(&skeleton.bones()[2].start_position, &glm::vec3(1.0, 0.0, 0.0));
    compare(&skeleton.bones()[2].end_position, &glm::vec3(2.0, 0.0, 0.0));
}

#[test]
fn forward_solver_is_deterministic() {
    let mut skeleton = chain(&[1.0, 1.0]);
    let mut posture = Posture::new(3);
    posture.bone_rotations[1] = glm::vec4(10.0, 20.0, 30.0, 0.0);
    posture.bone_rotations[2] = glm::vec4(-15.0, 5.0, 45.0, 0.0);
    posture.bone_translations[0] = glm::vec4(0.3, -0.2, 0.9, 0.0);

    kinematics::forward_solver(&posture, &mut skeleton);
    let first: Vec<_> = skeleton
        .bones()
        .iter()
        .map(|b| (b.start_position, b.end_position, b.rotation))
        .collect();

    kinematics::forward_solver(&posture, &mut skeleton);
    let second: Vec<_> = skeleton
        .bones()
        .iter()
        .map(|b| (b.start_position, b.end_position, b.rotation))
        .collect();

    // Identical input must reproduce bit-identical output
    assert_eq!(first, second);
}

#[test]
fn root_translation_moves_the_chain() {
    let mut skeleton = chain(&[1.0, 1.0]);
    let mut posture = Posture::new(3);
    posture.bone_translations[0] = glm::vec4(1.0, 2.0, 3.0, 0.0);
    kinematics::forward_solver(&posture, &mut skeleton);

    compare(&skeleton.bones()[0].start_position, &glm::vec3(1.0, 2.0, 3.0));
    compare(&skeleton.bones()[2].end_position, &glm::vec3(3.0, 2.0, 3.0));
}

#[test]
fn first_bone_rotation_folds_the_chain_up() {
    let mut skeleton = chain(&[1.0, 1.0]);
    let mut posture = Posture::new(3);
    posture.bone_rotations[1] = glm::vec4(0.0, 0.0, 90.0, 0.0);
    kinematics::forward_solver(&posture, &mut skeleton);

    compare(&skeleton.bones()[1].end_position, &glm::vec3(0.0, 1.0, 0.0));
    // The second bone inherits the accumulated rotation
    compare(&skeleton.bones()[2].end_position, &glm::vec3(0.0, 2.0, 0.0));
}

#[test]
fn ik_reaches_a_target_inside_the_workspace() {
    init_tests();
    let mut skeleton = chain(&[1.0, 1.0]);
    let mut posture = Posture::new(3);
    kinematics::forward_solver(&posture, &mut skeleton);

    let target = glm::vec4(1.2, 0.8, 0.0, 0.0);
    let chains = [IkChain {
        end_bone: 2,
        base_bone: 1,
    }];
    let stable = kinematics::inverse_jacobian_solver(
        &mut skeleton,
        &mut posture,
        &[target],
        &chains,
    )
    .unwrap();
    assert!(stable);

    let effector = skeleton.bones()[2].end_position;
    let error = glm::length(&(effector - glm::vec3(1.2, 0.8, 0.0)));
    info!("ik error after solve: {error}");
    assert!(error < IK_EPSILON);
    // The chain base must not have drifted
    compare(&skeleton.bones()[1].start_position, &glm::Vec3::zeros());
}

#[test]
fn ik_rolls_back_when_the_target_is_out_of_reach() {
    let mut skeleton = chain(&[1.0, 1.0]);
    let mut posture = Posture::new(3);
    posture.bone_rotations[2] = glm::vec4(0.0, 0.0, 15.0, 0.0);
    kinematics::forward_solver(&posture, &mut skeleton);
    let original = posture.clone();

    // Total reach is 2, the target sits at 5
    let target = glm::vec4(5.0, 0.0, 0.0, 0.0);
    let chains = [IkChain {
        end_bone: 2,
        base_bone: 1,
    }];
    let stable = kinematics::inverse_jacobian_solver(
        &mut skeleton,
        &mut posture,
        &[target],
        &chains,
    )
    .unwrap();
    assert!(!stable);
    // The posture is exactly the pre-call posture and the skeleton has been
    // re-solved from it
    assert_eq!(posture, original);
    let bent = glm::vec3(
        1.0 + 15.0_f32.to_radians().cos(),
        15.0_f32.to_radians().sin(),
        0.0,
    );
    compare(&skeleton.bones()[2].end_position, &bent);
}

#[test]
fn ik_only_turns_active_axes() {
    let mut builder = Skeleton::builder()
        .bone(BoneSpec {
            name: "root".to_string(),
            ..BoneSpec::default()
        })
        .unwrap();
    for (name, parent) in [("bone0", "root"), ("bone1", "bone0")] {
        builder = builder
            .bone(BoneSpec {
                name: name.to_string(),
                parent: Some(parent.to_string()),
                dir: glm::vec3(1.0, 0.0, 0.0),
                length: 1.0,
                dof_rz: true,
                ..BoneSpec::default()
            })
            .unwrap();
    }
    let mut skeleton = builder.finish().unwrap();
    let mut posture = Posture::new(3);
    kinematics::forward_solver(&posture, &mut skeleton);

    let stable = kinematics::inverse_jacobian_solver(
        &mut skeleton,
        &mut posture,
        &[glm::vec4(1.2, 0.8, 0.0, 0.0)],
        &[IkChain {
            end_bone: 2,
            base_bone: 1,
        }],
    )
    .unwrap();
    assert!(stable);
    // A z-only chain may never pick up x or y rotation
    for idx in 1..3 {
        assert!(posture.bone_rotations[idx].x.abs() < EPSILON);
        assert!(posture.bone_rotations[idx].y.abs() < EPSILON);
    }
}

#[test]
fn motion_commits_stable_ik_solves_only() {
    let skeleton = chain(&[1.0, 1.0]);
    let mut motion =
        Motion::new(skeleton, vec![Posture::new(3)]).unwrap();
    let chains = [IkChain {
        end_bone: 2,
        base_bone: 1,
    }];

    let stable = motion
        .inverse_kinematics(&[glm::vec4(1.2, 0.8, 0.0, 0.0)], &chains, 0)
        .unwrap();
    assert!(stable);
    let solved = motion.posture(0).unwrap().clone();
    assert!(solved.bone_rotations[1] != glm::Vec4::zeros());

    // A failed solve must leave the committed frame untouched
    let stable = motion
        .inverse_kinematics(&[glm::vec4(9.0, 0.0, 0.0, 0.0)], &chains, 0)
        .unwrap();
    assert!(!stable);
    assert_eq!(motion.posture(0).unwrap(), &solved);
}
