//! Time integration of particle state.
//!
//! Four interchangeable schemes advance the position and velocity of every
//! particle in every body by one fixed timestep. All but explicit Euler
//! re-invoke a caller-supplied force evaluation between sub-stages so that
//! accelerations reflect the perturbed trial states. None of the schemes
//! validate the timestep or the callback — a no-op callback handed to a
//! multi-stage scheme is a caller contract violation, not a recoverable
//! error.

use crate::particle::Particles;
use itertools::izip;
use nalgebra::Matrix3xX;
use nalgebra_glm as glm;

/// The closed set of time-stepping schemes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IntegrationMethod {
    ExplicitEuler,
    SemiImplicitEuler,
    Midpoint,
    RungeKutta4,
}

/// Per-step simulation controls, passed in by the driving loop every frame
/// instead of living in mutable globals. `pins` and `sphere_velocity` are
/// plain data for the caller's force step; the integrators themselves only
/// read `method` and `delta_time`.
#[derive(Clone, Copy, Debug)]
pub struct SimulationParams {
    pub method: IntegrationMethod,
    pub delta_time: f32,
    /// Which cloth corners the force step should hold in place.
    pub pins: [bool; 4],
    /// Velocity the force step applies to the collision sphere.
    pub sphere_velocity: glm::Vec3,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            method: IntegrationMethod::ExplicitEuler,
            delta_time: 0.001,
            pins: [true; 4],
            sphere_velocity: glm::Vec3::zeros(),
        }
    }
}

/// Advances every body by one timestep using the method named in `params`.
pub fn step(
    params: &SimulationParams,
    bodies: &mut [Particles],
    simulate_one_step: impl FnMut(&mut [Particles]),
) {
    params
        .method
        .integrate(params.delta_time, bodies, simulate_one_step);
}

impl IntegrationMethod {
    /// Advances every body by one timestep `dt`. `simulate_one_step` must
    /// recompute accelerations from the bodies' current positions and
    /// velocities; explicit Euler never calls it.
    pub fn integrate(
        self,
        dt: f32,
        bodies: &mut [Particles],
        simulate_one_step: impl FnMut(&mut [Particles]),
    ) {
        match self {
            Self::ExplicitEuler => explicit_euler(dt, bodies),
            Self::SemiImplicitEuler => {
                semi_implicit_euler(dt, bodies, simulate_one_step);
            }
            Self::Midpoint => midpoint(dt, bodies, simulate_one_step),
            Self::RungeKutta4 => runge_kutta4(dt, bodies, simulate_one_step),
        }
    }
}

/// First-order step. Position integrates the velocity from *before* this
/// step's velocity update — the two lines must stay in this order, since
/// swapping them changes the energy behaviour of the scheme.
fn explicit_euler(dt: f32, bodies: &mut [Particles]) {
    for body in bodies.iter_mut() {
        body.position += &body.velocity * dt;
        body.velocity += &body.acceleration * dt;
    }
}

/// Trial explicit-Euler step, force re-evaluation at the trial state, then a
/// corrected step from the snapshot using the trial velocity for position
/// and the trial-state acceleration for velocity.
fn semi_implicit_euler(
    dt: f32,
    bodies: &mut [Particles],
    mut simulate_one_step: impl FnMut(&mut [Particles]),
) {
    let backup: Vec<Particles> = bodies.to_vec();
    explicit_euler(dt, bodies);
    simulate_one_step(bodies);
    for (body, saved) in izip!(bodies.iter_mut(), &backup) {
        body.position = &saved.position + &body.velocity * dt;
        body.velocity = &saved.velocity + &body.acceleration * dt;
    }
}

/// Forces are evaluated at the pre-integration state, a half step builds the
/// midpoint velocity estimate, and the full step from the snapshot uses that
/// estimate for position.
fn midpoint(
    dt: f32,
    bodies: &mut [Particles],
    mut simulate_one_step: impl FnMut(&mut [Particles]),
) {
    let backup: Vec<Particles> = bodies.to_vec();
    simulate_one_step(bodies);
    for body in bodies.iter_mut() {
        body.position += &body.velocity * (dt * 0.5);
        body.velocity += &body.acceleration * (dt * 0.5);
    }
    for (body, saved) in izip!(bodies.iter_mut(), &backup) {
        body.position = &saved.position + &body.velocity * dt;
        body.velocity = &saved.velocity + &body.acceleration * dt;
    }
}

struct StageDerivative {
    position: Matrix3xX<f32>,
    velocity: Matrix3xX<f32>,
}

/// Classic (1, 2, 2, 1)/6 stage combination with the force callback invoked
/// after each of the first three stages.
///
/// Stages 1-3 each advance the trial state by half-step offsets from the
/// snapshot and record their derivative from the post-advance velocity and
/// the pre-callback acceleration. Stage 4 performs no further advance and
/// samples whatever state stage 3's callback left behind — a deliberate
/// departure from the textbook full-step k4 that is kept for compatibility
/// with the behaviour this scheme was measured against.
fn runge_kutta4(
    dt: f32,
    bodies: &mut [Particles],
    mut simulate_one_step: impl FnMut(&mut [Particles]),
) {
    let backup: Vec<Particles> = bodies.to_vec();
    let mut stages: [Vec<StageDerivative>; 4] = Default::default();

    for slot in stages.iter_mut().take(3) {
        for (body, saved) in izip!(bodies.iter_mut(), &backup) {
            body.position = &saved.position + &body.velocity * (dt * 0.5);
            body.velocity = &saved.velocity + &body.acceleration * (dt * 0.5);
            slot.push(StageDerivative {
                position: &body.velocity * dt,
                velocity: &body.acceleration * dt,
            });
        }
        simulate_one_step(bodies);
    }
    for body in bodies.iter() {
        stages[3].push(StageDerivative {
            position: &body.velocity * dt,
            velocity: &body.acceleration * dt,
        });
    }

    let [k1, k2, k3, k4] = stages;
    for (body, saved, s1, s2, s3, s4) in
        izip!(bodies.iter_mut(), &backup, &k1, &k2, &k3, &k4)
    {
        body.position = &saved.position
            + (&s1.position
                + &s2.position * 2.0
                + &s3.position * 2.0
                + &s4.position)
                / 6.0;
        body.velocity = &saved.velocity
            + (&s1.velocity
                + &s2.velocity * 2.0
                + &s3.velocity * 2.0
                + &s4.velocity)
                / 6.0;
    }
}
