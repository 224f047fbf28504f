//! Articulated model with a constant mass matrix.
//!
//! Equations of motion:
//!
//! ```text
//! s·M · q̈ = τ + f_ext − D · q̇ − g(q)
//!
//! g_i(q) = γ · c_i            (translation)
//!        = γ · c_i · sin(q_i) (rotation)
//! ```
//!
//! with `s` the mass scale, `D` a diagonal damping, `γ` the gravity magnitude
//! and `c_i` per-DOF gravity coefficients. The first `n_root` DOFs form an
//! unactuated free-floating base. Contacts lock individual DOFs (`q̈_c = 0`)
//! and their forces are the Lagrange multipliers of that constraint.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ocp_types::{BiomechanicalModel, ConstrainedDynamics, ExternalForceSet, OcpError, Result};
use tracing::debug;

use crate::activation::{self, ActivationDynamics};
use crate::muscle::LinearMuscle;

/// Kind of a generalized coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DofKind {
    /// Prismatic coordinate, gravity is constant.
    Translation,
    /// Revolute coordinate, gravity varies with `sin(q)`.
    Rotation,
}

/// Reference implementation of [`BiomechanicalModel`].
#[derive(Debug, Clone)]
pub struct ArticulatedModel {
    mass_matrix: DMatrix<f64>,
    factor: Cholesky<f64, Dyn>,
    mass_scale: f64,
    damping: DVector<f64>,
    dof_kinds: Vec<DofKind>,
    gravity_coefficients: DVector<f64>,
    gravity: f64,
    n_root: usize,
    max_torque: DVector<f64>,
    muscles: Vec<LinearMuscle>,
    contacts: Vec<usize>,
}

impl ArticulatedModel {
    /// Standard gravity (m/s²).
    pub const STANDARD_GRAVITY: f64 = 9.81;

    /// Create a model from a symmetric positive-definite mass matrix.
    ///
    /// All DOFs are rotations with no damping, no gravity, no root, unit
    /// maximal torque, no muscle and no contact.
    pub fn new(mass_matrix: DMatrix<f64>) -> Result<Self> {
        let n = mass_matrix.nrows();
        if mass_matrix.ncols() != n || n == 0 {
            return Err(OcpError::dimension_mismatch("mass matrix columns", n, mass_matrix.ncols()));
        }
        let factor = mass_matrix
            .clone()
            .cholesky()
            .ok_or_else(|| OcpError::model("mass matrix is not positive definite"))?;
        Ok(Self {
            mass_matrix,
            factor,
            mass_scale: 1.0,
            damping: DVector::zeros(n),
            dof_kinds: vec![DofKind::Rotation; n],
            gravity_coefficients: DVector::zeros(n),
            gravity: Self::STANDARD_GRAVITY,
            n_root: 0,
            max_torque: DVector::from_element(n, 1.0),
            muscles: Vec::new(),
            contacts: Vec::new(),
        })
    }

    /// Set viscous damping per DOF.
    pub fn with_damping(mut self, damping: DVector<f64>) -> Result<Self> {
        self.check_dof_vector("damping", &damping)?;
        self.damping = damping;
        Ok(self)
    }

    /// Set DOF kinds.
    pub fn with_dof_kinds(mut self, kinds: Vec<DofKind>) -> Result<Self> {
        if kinds.len() != self.n_dof() {
            return Err(OcpError::dimension_mismatch("dof kinds", self.n_dof(), kinds.len()));
        }
        self.dof_kinds = kinds;
        Ok(self)
    }

    /// Set gravity coefficients per DOF.
    pub fn with_gravity_coefficients(mut self, coefficients: DVector<f64>) -> Result<Self> {
        self.check_dof_vector("gravity coefficients", &coefficients)?;
        self.gravity_coefficients = coefficients;
        Ok(self)
    }

    /// Declare the first `n_root` DOFs as a free-floating base.
    pub fn with_root(mut self, n_root: usize) -> Result<Self> {
        if n_root >= self.n_dof() {
            return Err(OcpError::invalid_config(format!(
                "{n_root} root DOFs leave no joint in a {}-DOF model",
                self.n_dof()
            )));
        }
        self.n_root = n_root;
        Ok(self)
    }

    /// Set the torque produced at unit torque activation, per DOF.
    pub fn with_max_torque(mut self, max_torque: DVector<f64>) -> Result<Self> {
        self.check_dof_vector("max torque", &max_torque)?;
        self.max_torque = max_torque;
        Ok(self)
    }

    /// Add a muscle.
    pub fn with_muscle(mut self, muscle: LinearMuscle) -> Result<Self> {
        self.check_dof_vector("moment arms", &muscle.moment_arms)?;
        self.muscles.push(muscle);
        Ok(self)
    }

    /// Lock `dof` with a contact.
    pub fn with_contact(mut self, dof: usize) -> Result<Self> {
        if dof >= self.n_dof() {
            return Err(OcpError::invalid_config(format!("contact on unknown DOF {dof}")));
        }
        if !self.contacts.contains(&dof) {
            self.contacts.push(dof);
        }
        Ok(self)
    }

    fn check_dof_vector(&self, what: &str, v: &DVector<f64>) -> Result<()> {
        if v.len() == self.n_dof() {
            Ok(())
        } else {
            Err(OcpError::dimension_mismatch(what, self.n_dof(), v.len()))
        }
    }

    // ====== Factories ======

    /// Cart-pole style pendulum: a translation and a rotation.
    pub fn pendulum() -> Result<Self> {
        Self::new(DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]))?
            .with_dof_kinds(vec![DofKind::Translation, DofKind::Rotation])?
            .with_gravity_coefficients(DVector::from_vec(vec![0.0, 0.5]))?
            .with_damping(DVector::from_vec(vec![0.1, 0.05]))?
            .with_max_torque(DVector::from_vec(vec![100.0, 100.0]))
    }

    /// Planar chain of `n` revolute joints.
    pub fn chain(n: usize) -> Result<Self> {
        let mass = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                2.0
            } else if i.abs_diff(j) == 1 {
                0.5
            } else {
                0.0
            }
        });
        Self::new(mass)?.with_gravity_coefficients(DVector::from_element(n, 1.0))
    }

    /// Free-floating base (x, z, rotation) carrying `n_joints` revolute joints.
    pub fn floating(n_joints: usize) -> Result<Self> {
        let n = 3 + n_joints;
        let mass = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                if i < 3 { 5.0 } else { 1.0 }
            } else if i.abs_diff(j) == 1 && i.max(j) >= 3 {
                0.2
            } else {
                0.0
            }
        });
        let mut kinds = vec![DofKind::Translation, DofKind::Translation];
        kinds.extend(std::iter::repeat(DofKind::Rotation).take(n - 2));
        let mut gravity = DVector::zeros(n);
        gravity[1] = 5.0;
        Self::new(mass)?
            .with_dof_kinds(kinds)?
            .with_gravity_coefficients(gravity)?
            .with_root(3)
    }

    /// Two revolute joints driven by three muscles.
    pub fn arm() -> Result<Self> {
        Self::chain(2)?
            .with_muscle(LinearMuscle::new("flexor", 500.0, DVector::from_vec(vec![0.04, 0.0])))?
            .with_muscle(LinearMuscle::new("extensor", 500.0, DVector::from_vec(vec![-0.04, 0.0])))?
            .with_muscle(LinearMuscle::new("biarticular", 300.0, DVector::from_vec(vec![0.02, 0.03])))
    }

    // ====== Mutable parameters ======

    /// Gravity magnitude.
    #[must_use]
    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    /// Set the gravity magnitude.
    pub fn set_gravity(&mut self, gravity: f64) {
        self.gravity = gravity;
    }

    /// Mass scale.
    #[must_use]
    pub fn mass_scale(&self) -> f64 {
        self.mass_scale
    }

    /// Scale the mass matrix. Must be strictly positive.
    pub fn set_mass_scale(&mut self, scale: f64) -> Result<()> {
        if scale <= 0.0 || !scale.is_finite() {
            return Err(OcpError::model(format!("mass scale must be positive, got {scale}")));
        }
        self.mass_scale = scale;
        Ok(())
    }

    // ====== Internals ======

    /// Number of DOFs.
    #[must_use]
    pub fn n_dof(&self) -> usize {
        self.mass_matrix.nrows()
    }

    /// Muscles in declaration order.
    #[must_use]
    pub fn muscles(&self) -> &[LinearMuscle] {
        &self.muscles
    }

    /// Scaled mass matrix.
    #[must_use]
    pub fn mass_matrix(&self) -> DMatrix<f64> {
        &self.mass_matrix * self.mass_scale
    }

    fn check_len(&self, what: &str, v: &DVector<f64>) -> Result<()> {
        self.check_dof_vector(what, v)
    }

    fn generalized_force(&self, external_forces: Option<&ExternalForceSet>) -> Result<DVector<f64>> {
        match external_forces {
            Some(set) => {
                if set.values.len() != self.n_dof() {
                    return Err(OcpError::dimension_mismatch(
                        format!("external force set {}", set.name),
                        self.n_dof(),
                        set.values.len(),
                    ));
                }
                Ok(set.values.clone())
            }
            None => Ok(DVector::zeros(self.n_dof())),
        }
    }

    /// `D·q̇ + g(q)`.
    fn bias(&self, q: &DVector<f64>, qdot: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(self.n_dof(), |i, _| {
            let g = match self.dof_kinds[i] {
                DofKind::Translation => self.gravity_coefficients[i],
                DofKind::Rotation => self.gravity_coefficients[i] * q[i].sin(),
            };
            self.damping[i] * qdot[i] + self.gravity * g
        })
    }

    fn solve_mass(&self, rhs: &DVector<f64>) -> DVector<f64> {
        self.factor.solve(rhs) / self.mass_scale
    }

    fn check_state(&self, q: &DVector<f64>, qdot: &DVector<f64>) -> Result<()> {
        self.check_len("q", q)?;
        self.check_len("qdot", qdot)
    }
}

impl BiomechanicalModel for ArticulatedModel {
    fn nb_q(&self) -> usize {
        self.n_dof()
    }

    fn nb_qdot(&self) -> usize {
        self.n_dof()
    }

    fn nb_tau(&self) -> usize {
        self.n_dof()
    }

    fn nb_root(&self) -> usize {
        self.n_root
    }

    fn nb_muscles(&self) -> usize {
        self.muscles.len()
    }

    fn nb_contacts(&self) -> usize {
        self.contacts.len()
    }

    fn compute_qdot(&self, q: &DVector<f64>, qdot: &DVector<f64>) -> Result<DVector<f64>> {
        self.check_state(q, qdot)?;
        Ok(qdot.clone())
    }

    fn forward_dynamics(
        &self,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
        tau: &DVector<f64>,
        external_forces: Option<&ExternalForceSet>,
    ) -> Result<DVector<f64>> {
        self.check_state(q, qdot)?;
        self.check_len("tau", tau)?;
        let rhs = tau + self.generalized_force(external_forces)? - self.bias(q, qdot);
        Ok(self.solve_mass(&rhs))
    }

    fn forward_dynamics_constraints_direct(
        &self,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
        tau: &DVector<f64>,
        external_forces: Option<&ExternalForceSet>,
    ) -> Result<ConstrainedDynamics> {
        let free = self.forward_dynamics(q, qdot, tau, external_forces)?;
        if self.contacts.is_empty() {
            return Ok(ConstrainedDynamics {
                qddot: free,
                contact_forces: DVector::zeros(0),
            });
        }

        // J selects the locked DOFs. Schur complement S = J M⁻¹ Jᵀ.
        let n = self.n_dof();
        let m = self.contacts.len();
        let jacobian = DMatrix::from_fn(m, n, |r, c| if self.contacts[r] == c { 1.0 } else { 0.0 });
        let m_inv_jt = DMatrix::from_columns(
            &(0..m)
                .map(|r| self.solve_mass(&jacobian.row(r).transpose()))
                .collect::<Vec<_>>(),
        );
        let schur = &jacobian * &m_inv_jt;
        let lambda = schur
            .cholesky()
            .ok_or_else(|| OcpError::model("contact system is singular"))?
            .solve(&(-(&jacobian * &free)));

        Ok(ConstrainedDynamics {
            qddot: free + m_inv_jt * &lambda,
            contact_forces: lambda,
        })
    }

    fn inverse_dynamics(
        &self,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
        qddot: &DVector<f64>,
        external_forces: Option<&ExternalForceSet>,
    ) -> Result<DVector<f64>> {
        self.check_state(q, qdot)?;
        self.check_len("qddot", qddot)?;
        Ok(self.mass_matrix() * qddot + self.bias(q, qdot) - self.generalized_force(external_forces)?)
    }

    fn torque(
        &self,
        activations: &DVector<f64>,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        self.check_state(q, qdot)?;
        self.check_len("torque activations", activations)?;
        Ok(activations.component_mul(&self.max_torque))
    }

    fn forward_dynamics_free_floating_base(
        &self,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
        qddot_joints: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        self.check_state(q, qdot)?;
        let nr = self.n_root;
        if nr == 0 {
            return Err(OcpError::model("model has no free-floating base"));
        }
        let nj = self.n_dof() - nr;
        if qddot_joints.len() != nj {
            return Err(OcpError::dimension_mismatch("qddot_joints", nj, qddot_joints.len()));
        }

        // M_rr q̈_r = −(M_rj q̈_j + bias_r)
        let mass = self.mass_matrix();
        let m_rr = mass.view((0, 0), (nr, nr)).into_owned();
        let m_rj = mass.view((0, nr), (nr, nj));
        let bias = self.bias(q, qdot);
        let rhs = -(m_rj * qddot_joints + bias.rows(0, nr));
        let qddot_root = m_rr
            .cholesky()
            .ok_or_else(|| OcpError::model("root mass block is not positive definite"))?
            .solve(&rhs);
        debug!(n_root = nr, n_joints = nj, "free-floating base solved");
        Ok(qddot_root)
    }

    fn muscle_activation_dot(
        &self,
        excitations: &DVector<f64>,
        activations: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        if self.muscles.is_empty() {
            return Err(OcpError::model("model has no muscles"));
        }
        let dynamics: Vec<ActivationDynamics> = self.muscles.iter().map(|m| m.activation).collect();
        activation::activation_dot(&dynamics, excitations, activations)
    }

    fn muscular_joint_torque(
        &self,
        activations: &DVector<f64>,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        self.check_state(q, qdot)?;
        if activations.len() != self.muscles.len() {
            return Err(OcpError::dimension_mismatch(
                "muscle activations",
                self.muscles.len(),
                activations.len(),
            ));
        }
        Ok(self
            .muscles
            .iter()
            .zip(activations.iter())
            .fold(DVector::zeros(self.n_dof()), |acc, (muscle, &a)| {
                acc + muscle.joint_torque(a)
            }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    #[test]
    fn test_forward_inverse_consistency() {
        let model = ArticulatedModel::pendulum().unwrap();
        let q = v(&[0.1, 0.7]);
        let qdot = v(&[-0.3, 1.2]);
        let tau = v(&[2.0, -1.0]);
        let qddot = model.forward_dynamics(&q, &qdot, &tau, None).unwrap();
        let back = model.inverse_dynamics(&q, &qdot, &qddot, None).unwrap();
        assert_relative_eq!(back, tau, epsilon = 1e-10);
    }

    #[test]
    fn test_external_forces_add_to_tau() {
        let model = ArticulatedModel::chain(2).unwrap();
        let q = v(&[0.0, 0.0]);
        let qdot = v(&[0.0, 0.0]);
        let f = ExternalForceSet::new("push", v(&[1.0, 0.0]));
        let with = model.forward_dynamics(&q, &qdot, &v(&[0.0, 0.0]), Some(&f)).unwrap();
        let without = model.forward_dynamics(&q, &qdot, &v(&[1.0, 0.0]), None).unwrap();
        assert_relative_eq!(with, without, epsilon = 1e-12);
    }

    #[test]
    fn test_contact_locks_dof() {
        let model = ArticulatedModel::chain(3).unwrap().with_contact(0).unwrap();
        let q = v(&[0.3, -0.2, 0.1]);
        let qdot = v(&[0.0, 0.0, 0.0]);
        let out = model
            .forward_dynamics_constraints_direct(&q, &qdot, &v(&[1.0, 0.5, 0.0]), None)
            .unwrap();
        assert_relative_eq!(out.qddot[0], 0.0, epsilon = 1e-12);
        assert_eq!(out.contact_forces.len(), 1);

        // Contact force added as a generalized force reproduces the constrained motion
        let mut tau = v(&[1.0, 0.5, 0.0]);
        tau[0] += out.contact_forces[0];
        let free = model.forward_dynamics(&q, &qdot, &tau, None).unwrap();
        assert_relative_eq!(free, out.qddot, epsilon = 1e-10);
    }

    #[test]
    fn test_free_floating_base_matches_forward_dynamics() {
        let model = ArticulatedModel::floating(2).unwrap();
        let q = v(&[0.0, 0.1, 0.2, 0.3, -0.4]);
        let qdot = v(&[0.1, 0.0, -0.2, 0.5, 0.0]);
        let tau = v(&[0.0, 0.0, 0.0, 1.5, -0.5]);
        let qddot = model.forward_dynamics(&q, &qdot, &tau, None).unwrap();
        let root = model
            .forward_dynamics_free_floating_base(&q, &qdot, &qddot.rows(3, 2).into_owned())
            .unwrap();
        assert_relative_eq!(root, qddot.rows(0, 3).into_owned(), epsilon = 1e-10);
    }

    #[test]
    fn test_no_root_is_model_error() {
        let model = ArticulatedModel::chain(2).unwrap();
        let z = v(&[0.0, 0.0]);
        assert!(matches!(
            model.forward_dynamics_free_floating_base(&z, &z, &z),
            Err(OcpError::Model { .. })
        ));
    }

    #[test]
    fn test_muscular_joint_torque() {
        let model = ArticulatedModel::arm().unwrap();
        let z = v(&[0.0, 0.0]);
        let tau = model.muscular_joint_torque(&v(&[1.0, 0.0, 0.5]), &z, &z).unwrap();
        assert_relative_eq!(tau[0], 20.0 + 3.0, epsilon = 1e-12);
        assert_relative_eq!(tau[1], 4.5, epsilon = 1e-12);
    }

    #[test]
    fn test_torque_activation() {
        let model = ArticulatedModel::pendulum().unwrap();
        let z = v(&[0.0, 0.0]);
        let tau = model.torque(&v(&[0.5, -0.1]), &z, &z).unwrap();
        assert_eq!(tau.as_slice(), &[50.0, -10.0]);
    }

    #[test]
    fn test_mass_scale() {
        let mut model = ArticulatedModel::chain(1).unwrap();
        let z = v(&[0.0]);
        let a1 = model.forward_dynamics(&z, &z, &v(&[1.0]), None).unwrap()[0];
        model.set_mass_scale(2.0).unwrap();
        let a2 = model.forward_dynamics(&z, &z, &v(&[1.0]), None).unwrap()[0];
        assert_relative_eq!(a1, 2.0 * a2, epsilon = 1e-12);
        assert!(model.set_mass_scale(0.0).is_err());
    }

    #[test]
    fn test_not_spd_rejected() {
        let err = ArticulatedModel::new(DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0])).unwrap_err();
        assert!(matches!(err, OcpError::Model { .. }));
    }
}
