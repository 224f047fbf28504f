//! Muscle activation dynamics.
//!
//! Activation lags behind the neural excitation (the control). The lag is a
//! first-order filter whose time constant depends on the direction of change
//! and on the current activation level:
//!
//! ```text
//! da/dt = (u − a) / τ(u, a)
//!
//! τ = τ_act · (0.5 + 1.5·a)      if u > a   (activating)
//!   = τ_deact / (0.5 + 1.5·a)    otherwise  (deactivating)
//! ```
//!
//! The derivative is smooth in `u` and `a` away from `u = a`, which keeps it
//! usable inside collocation defects. Values are not clamped.

use nalgebra::DVector;
use ocp_types::{OcpError, Result};

/// Excitation-to-activation filter of one muscle.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActivationDynamics {
    /// Activation time constant (s).
    pub tau_activation: f64,
    /// Deactivation time constant (s).
    pub tau_deactivation: f64,
}

impl Default for ActivationDynamics {
    fn default() -> Self {
        Self {
            tau_activation: 0.01,
            tau_deactivation: 0.04,
        }
    }
}

impl ActivationDynamics {
    /// Create activation dynamics with custom time constants.
    ///
    /// Time constants below 1 ms are raised to 1 ms.
    #[must_use]
    pub fn new(tau_activation: f64, tau_deactivation: f64) -> Self {
        Self {
            tau_activation: tau_activation.max(0.001),
            tau_deactivation: tau_deactivation.max(0.001),
        }
    }

    /// Effective time constant at `(excitation, activation)`.
    #[must_use]
    pub fn time_constant(&self, excitation: f64, activation: f64) -> f64 {
        let shape = 0.5 + 1.5 * activation;
        if excitation > activation {
            self.tau_activation * shape
        } else {
            self.tau_deactivation / shape
        }
    }

    /// Activation derivative (1/s).
    #[must_use]
    pub fn derivative(&self, excitation: f64, activation: f64) -> f64 {
        (excitation - activation) / self.time_constant(excitation, activation)
    }
}

/// Activation derivatives of a set of muscles.
pub fn activation_dot(
    dynamics: &[ActivationDynamics],
    excitations: &DVector<f64>,
    activations: &DVector<f64>,
) -> Result<DVector<f64>> {
    if excitations.len() != dynamics.len() {
        return Err(OcpError::dimension_mismatch(
            "excitations",
            dynamics.len(),
            excitations.len(),
        ));
    }
    if activations.len() != dynamics.len() {
        return Err(OcpError::dimension_mismatch(
            "activations",
            dynamics.len(),
            activations.len(),
        ));
    }
    Ok(DVector::from_iterator(
        dynamics.len(),
        dynamics
            .iter()
            .zip(excitations.iter().zip(activations.iter()))
            .map(|(d, (&u, &a))| d.derivative(u, a)),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_activation_faster_than_deactivation() {
        let dynamics = ActivationDynamics::default();
        let rise = dynamics.derivative(1.0, 0.5);
        let fall = dynamics.derivative(0.0, 0.5);
        assert!(rise > 0.0);
        assert!(fall < 0.0);
        assert!(rise.abs() > fall.abs());
    }

    #[test]
    fn test_time_constant_shape() {
        let dynamics = ActivationDynamics::new(0.01, 0.04);
        assert_relative_eq!(dynamics.time_constant(1.0, 0.0), 0.005);
        assert_relative_eq!(dynamics.time_constant(0.0, 1.0), 0.02);
    }

    #[test]
    fn test_equilibrium() {
        let dynamics = ActivationDynamics::default();
        assert_eq!(dynamics.derivative(0.3, 0.3), 0.0);
    }

    #[test]
    fn test_minimum_time_constant() {
        let dynamics = ActivationDynamics::new(0.0, -1.0);
        assert_eq!(dynamics.tau_activation, 0.001);
        assert_eq!(dynamics.tau_deactivation, 0.001);
    }

    #[test]
    fn test_vector_form_checks_sizes() {
        let dynamics = vec![ActivationDynamics::default(); 2];
        let err = activation_dot(
            &dynamics,
            &DVector::from_vec(vec![0.5]),
            &DVector::from_vec(vec![0.1, 0.2]),
        )
        .unwrap_err();
        assert!(err.is_config_error());

        let out = activation_dot(
            &dynamics,
            &DVector::from_vec(vec![0.5, 0.0]),
            &DVector::from_vec(vec![0.1, 0.2]),
        )
        .unwrap();
        assert!(out[0] > 0.0 && out[1] < 0.0);
    }
}
