//! Call contract of the biomechanical model collaborator.
//!
//! The transcription never computes rigid-body quantities itself. Every
//! forward/inverse dynamics call, every muscle computation and the
//! position-rate map go through [`BiomechanicalModel`]. Each method takes
//! generalized positions/velocities (and torques, accelerations or external
//! forces as relevant) at full model dimension and returns one result.

use nalgebra::DVector;

use crate::{OcpError, Result};

/// One set of external forces applied during a forward/inverse dynamics call.
///
/// The interpretation of `values` belongs to the model (the reference model
/// reads them as generalized forces).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExternalForceSet {
    /// Label used in logs.
    pub name: String,
    /// Force values, model-defined layout.
    pub values: DVector<f64>,
}

impl ExternalForceSet {
    /// Create a named external force set.
    #[must_use]
    pub fn new(name: impl Into<String>, values: DVector<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Accelerations and contact forces from a constrained forward dynamics call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedDynamics {
    /// Generalized accelerations.
    pub qddot: DVector<f64>,
    /// Contact forces, one per contact constraint row.
    pub contact_forces: DVector<f64>,
}

/// Rigid-body and muscle computations consumed by the dynamics evaluator.
///
/// Muscle-related methods have default implementations that report the model
/// as torque-only.
pub trait BiomechanicalModel {
    /// Number of generalized coordinates.
    fn nb_q(&self) -> usize;

    /// Number of generalized velocities.
    fn nb_qdot(&self) -> usize;

    /// Number of generalized accelerations.
    fn nb_qddot(&self) -> usize {
        self.nb_qdot()
    }

    /// Number of generalized torques.
    fn nb_tau(&self) -> usize;

    /// Number of free-floating root degrees of freedom.
    fn nb_root(&self) -> usize {
        0
    }

    /// Number of muscles.
    fn nb_muscles(&self) -> usize {
        0
    }

    /// Number of contact constraint rows.
    fn nb_contacts(&self) -> usize {
        0
    }

    /// Time derivative of the generalized coordinates.
    ///
    /// Identity for Euclidean coordinates, the model's own rate map otherwise.
    fn compute_qdot(&self, q: &DVector<f64>, qdot: &DVector<f64>) -> Result<DVector<f64>>;

    /// Unconstrained forward dynamics.
    fn forward_dynamics(
        &self,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
        tau: &DVector<f64>,
        external_forces: Option<&ExternalForceSet>,
    ) -> Result<DVector<f64>>;

    /// Forward dynamics with the model's contact constraints enforced.
    fn forward_dynamics_constraints_direct(
        &self,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
        tau: &DVector<f64>,
        external_forces: Option<&ExternalForceSet>,
    ) -> Result<ConstrainedDynamics>;

    /// Torques producing `qddot`.
    fn inverse_dynamics(
        &self,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
        qddot: &DVector<f64>,
        external_forces: Option<&ExternalForceSet>,
    ) -> Result<DVector<f64>>;

    /// Torques generated by torque actuators at the given activations.
    fn torque(
        &self,
        activations: &DVector<f64>,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
    ) -> Result<DVector<f64>>;

    /// Root accelerations of a free-floating base given joint accelerations.
    fn forward_dynamics_free_floating_base(
        &self,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
        qddot_joints: &DVector<f64>,
    ) -> Result<DVector<f64>>;

    /// Time derivative of muscle activations given excitations.
    fn muscle_activation_dot(
        &self,
        excitations: &DVector<f64>,
        activations: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        let _ = (excitations, activations);
        Err(OcpError::model("model has no muscles"))
    }

    /// Generalized torques produced by muscles at the given activations.
    fn muscular_joint_torque(
        &self,
        activations: &DVector<f64>,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        let _ = (activations, q, qdot);
        Err(OcpError::model("model has no muscles"))
    }

    /// Contact forces that keep the contact points still.
    fn contact_forces(
        &self,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
        tau: &DVector<f64>,
        external_forces: Option<&ExternalForceSet>,
    ) -> Result<DVector<f64>> {
        Ok(self
            .forward_dynamics_constraints_direct(q, qdot, tau, external_forces)?
            .contact_forces)
    }
}
