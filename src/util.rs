//! Angle and weight helpers shared by the animation code.

use nalgebra_glm as glm;
use std::f32::consts::PI;

/// Converts Euler angles in radians to a quaternion.
///
/// The decode order is ZYX intrinsic: the z angle is applied first, then y,
/// then x, i.e. `R = Rx(x) * Ry(y) * Rz(z)`. Capture data stores joint
/// angles in this convention, so every decode in the crate must agree on it.
#[must_use]
pub fn euler_rad_to_quat(angles: &glm::Vec3) -> glm::Quat {
    let qx = glm::quat_angle_axis(angles.x, &glm::vec3(1.0, 0.0, 0.0));
    let qy = glm::quat_angle_axis(angles.y, &glm::vec3(0.0, 1.0, 0.0));
    let qz = glm::quat_angle_axis(angles.z, &glm::vec3(0.0, 0.0, 1.0));
    qx * qy * qz
}

/// Converts the x/y/z Euler angles of a posture entry (degrees) to a
/// quaternion. The unused w component is ignored. See [`euler_rad_to_quat`]
/// for the rotation order.
#[must_use]
pub fn euler_deg_to_quat(angles: &glm::Vec4) -> glm::Quat {
    euler_rad_to_quat(&glm::vec3(
        angles.x.to_radians(),
        angles.y.to_radians(),
        angles.z.to_radians(),
    ))
}

/// Extracts Euler angles in degrees from a quaternion, inverting
/// [`euler_deg_to_quat`]. Near the y = ±90° singularity the z angle is
/// pinned to zero and the remaining rotation is folded into x.
#[must_use]
pub fn quat_to_euler_deg(q: &glm::Quat) -> glm::Vec3 {
    let m = glm::quat_to_mat3(&glm::quat_normalize(q));
    let sy = m[(0, 2)].clamp(-1.0, 1.0);
    let (x, y, z) = if sy.abs() > 1.0 - 1.0e-6 {
        // Gimbal lock: only x + z is observable, attribute it all to x
        (m[(1, 0)].atan2(m[(1, 1)]), sy.asin(), 0.0)
    } else {
        (
            (-m[(1, 2)]).atan2(m[(2, 2)]),
            sy.asin(),
            (-m[(0, 1)]).atan2(m[(0, 0)]),
        )
    };
    glm::vec3(x.to_degrees(), y.to_degrees(), z.to_degrees())
}

/// Drops the unused homogeneous component of a posture entry.
#[must_use]
pub fn to_vec3(v: &glm::Vec4) -> glm::Vec3 {
    glm::vec3(v.x, v.y, v.z)
}

/// Widens a vector to the posture representation, w kept at zero.
#[must_use]
pub fn to_vec4(v: &glm::Vec3) -> glm::Vec4 {
    glm::vec4(v.x, v.y, v.z, 0.0)
}

/// Ease-in/out weights over a blend window: 0 at the first frame rising
/// smoothly to 1 at the last.
#[must_use]
pub fn ease_in_out_weights(len: usize) -> Vec<f32> {
    let n = len.saturating_sub(1).max(1) as f32;
    (0..len)
        .map(|i| (1.0 + ((i as f32) / n * PI - PI / 2.0).sin()) / 2.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0005;

    fn compare(v1: &glm::Vec3, v2: &glm::Vec3) {
        assert!(glm::length(&(v1 - v2)) < EPSILON, "{v1:?} != {v2:?}");
    }

    #[test]
    fn euler_round_trip() {
        let angles = glm::vec4(10.0, 20.0, 30.0, 0.0);
        let q = euler_deg_to_quat(&angles);
        compare(&quat_to_euler_deg(&q), &glm::vec3(10.0, 20.0, 30.0));
    }

    /// The z angle must be applied first: yawing +90° about z takes +x to +y
    /// no matter what the x and y angles would do afterwards to other axes.
    #[test]
    fn decode_order_is_zyx() {
        let q = euler_deg_to_quat(&glm::vec4(0.0, 0.0, 90.0, 0.0));
        let v = glm::quat_rotate_vec3(&q, &glm::vec3(1.0, 0.0, 0.0));
        compare(&v, &glm::vec3(0.0, 1.0, 0.0));

        // x applied last: (x=90, z=90) maps +x to +z, not to -x
        let q = euler_deg_to_quat(&glm::vec4(90.0, 0.0, 90.0, 0.0));
        let v = glm::quat_rotate_vec3(&q, &glm::vec3(1.0, 0.0, 0.0));
        compare(&v, &glm::vec3(0.0, 0.0, 1.0));
    }

    #[test]
    fn ease_curve_endpoints() {
        let w = ease_in_out_weights(5);
        assert!(w[0].abs() < EPSILON);
        assert!((w[4] - 1.0).abs() < EPSILON);
        assert!((w[2] - 0.5).abs() < EPSILON);
        assert!(w.windows(2).all(|p| p[0] <= p[1]));
    }
}
