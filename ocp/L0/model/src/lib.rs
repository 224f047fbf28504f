//! Reference articulated model for optimal-control transcription.
//!
//! [`ArticulatedModel`] implements [`ocp_types::BiomechanicalModel`] with
//! closed-form, dense linear algebra:
//!
//! - constant symmetric positive-definite mass matrix (Cholesky)
//! - viscous damping and per-DOF gravity
//! - optional free-floating base
//! - torque actuators with maximal torques
//! - [`LinearMuscle`]s with constant moment arms and [`ActivationDynamics`]
//! - contacts locking individual DOFs
//!
//! It is small enough to reason about by hand, which makes it the model of
//! choice for tests and benchmarks. Real musculoskeletal engines plug in
//! through the same trait.
//!
//! # Example
//!
//! ```
//! use ocp_model::ArticulatedModel;
//! use ocp_types::{BiomechanicalModel, DVector};
//!
//! let model = ArticulatedModel::pendulum().unwrap();
//! let q = DVector::from_vec(vec![0.0, 0.3]);
//! let qdot = DVector::zeros(2);
//! let tau = DVector::zeros(2);
//!
//! let qddot = model.forward_dynamics(&q, &qdot, &tau, None).unwrap();
//! assert_eq!(qddot.len(), model.nb_qddot());
//! ```

#![doc(html_root_url = "https://docs.rs/ocp-model/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::missing_errors_doc,       // Error docs added where non-obvious
    clippy::module_name_repetitions,
    clippy::many_single_char_names,   // q, m, n, r follow the equations of motion
)]

pub mod activation;
mod articulated;
mod muscle;

pub use activation::ActivationDynamics;
pub use articulated::{ArticulatedModel, DofKind};
pub use muscle::LinearMuscle;
