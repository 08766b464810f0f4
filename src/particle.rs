//! Particle state storage shared by every simulated body.

use nalgebra::{DVector, Matrix3xX};
use nalgebra_glm as glm;

/// State block for one simulated body (a cloth mesh, a sphere, ...).
///
/// Each quantity is a single contiguous matrix with one column per particle
/// so an integrator can advance a whole body with matrix arithmetic instead
/// of per-particle loops. The block is sized once at construction and never
/// resized during simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct Particles {
    pub mass: DVector<f32>,
    pub position: Matrix3xX<f32>,
    pub velocity: Matrix3xX<f32>,
    pub acceleration: Matrix3xX<f32>,
}

impl Particles {
    /// A body of `count` unit-mass particles at rest at the origin.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            mass: DVector::from_element(count, 1.0),
            position: Matrix3xX::zeros(count),
            velocity: Matrix3xX::zeros(count),
            acceleration: Matrix3xX::zeros(count),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.position.ncols()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position.ncols() == 0
    }

    #[must_use]
    pub fn mass_of(&self, i: usize) -> f32 {
        self.mass[i]
    }

    pub fn set_mass_of(&mut self, i: usize, mass: f32) {
        self.mass[i] = mass;
    }

    #[must_use]
    pub fn position_of(&self, i: usize) -> glm::Vec3 {
        self.position.column(i).clone_owned()
    }

    pub fn set_position_of(&mut self, i: usize, position: &glm::Vec3) {
        self.position.set_column(i, position);
    }

    #[must_use]
    pub fn velocity_of(&self, i: usize) -> glm::Vec3 {
        self.velocity.column(i).clone_owned()
    }

    pub fn set_velocity_of(&mut self, i: usize, velocity: &glm::Vec3) {
        self.velocity.set_column(i, velocity);
    }

    #[must_use]
    pub fn acceleration_of(&self, i: usize) -> glm::Vec3 {
        self.acceleration.column(i).clone_owned()
    }

    pub fn set_acceleration_of(&mut self, i: usize, acceleration: &glm::Vec3) {
        self.acceleration.set_column(i, acceleration);
    }
}
