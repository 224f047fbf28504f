//! Muscles with constant moment arms.
//!
//! Force is proportional to activation (`F = a · F_max`) and is mapped to
//! generalized torques through a constant moment-arm vector. There is no
//! force-length or force-velocity dependency.

use nalgebra::DVector;

use crate::activation::ActivationDynamics;

/// A linear muscle acting on the generalized coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearMuscle {
    /// Display name.
    pub name: String,
    /// Maximum isometric force (N).
    pub max_isometric_force: f64,
    /// Moment arm on each generalized velocity (m).
    pub moment_arms: DVector<f64>,
    /// Excitation-to-activation filter.
    pub activation: ActivationDynamics,
}

impl LinearMuscle {
    /// Create a muscle with default activation dynamics.
    #[must_use]
    pub fn new(name: impl Into<String>, max_isometric_force: f64, moment_arms: DVector<f64>) -> Self {
        Self {
            name: name.into(),
            max_isometric_force,
            moment_arms,
            activation: ActivationDynamics::default(),
        }
    }

    /// Replace the activation dynamics.
    #[must_use]
    pub fn with_activation(mut self, activation: ActivationDynamics) -> Self {
        self.activation = activation;
        self
    }

    /// Tendon force at `activation`.
    #[must_use]
    pub fn force(&self, activation: f64) -> f64 {
        activation * self.max_isometric_force
    }

    /// Generalized torque contribution at `activation`.
    #[must_use]
    pub fn joint_torque(&self, activation: f64) -> DVector<f64> {
        &self.moment_arms * self.force(activation)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_torque() {
        let muscle = LinearMuscle::new("biceps", 200.0, DVector::from_vec(vec![0.0, 0.03]));
        let tau = muscle.joint_torque(0.5);
        assert_eq!(tau.as_slice(), &[0.0, 3.0]);
    }
}
