//! Multi-phase optimization-vector assembly and dynamics evaluation.
//!
//! This crate turns a declarative description of a direct optimal control
//! problem into what an NLP solver consumes:
//!
//! - [`PhaseLayout`] - Named state/control slots of one phase, its sample grid
//!   and its sharing with earlier phases
//! - [`DynamicsEvaluator`] - `dxdt = f(x, u, p)` for a closed set of dynamics
//!   variants, fatigue rows appended
//! - [`OptimizationVector`] - The flat decision vector, its scaled bounds and
//!   initial guess, and the way back to named values
//! - [`transcription`] - Shooting and collocation residuals
//! - [`OptimalControlProgram`] - All of the above wired together
//!
//! The model is reached through [`ocp_types::BiomechanicalModel`]; the solver
//! is not part of this crate.
//!
//! # Example
//!
//! ```
//! use ocp_core::prelude::*;
//! use ocp_model::ArticulatedModel;
//!
//! let model = ArticulatedModel::pendulum().unwrap();
//! let phase = PhaseDefinition::new(
//!     PhaseConfig::new(3, 1.0),
//!     Dynamics::new(DynamicsVariant::torque_driven()),
//! );
//! let mut ocp = OptimalControlProgram::new(model, vec![phase], ParameterList::new()).unwrap();
//!
//! // q, qdot (2 + 2) at 4 nodes, tau (2) at 3 intervals
//! let problem = ocp.nlp_problem().unwrap();
//! assert_eq!(problem.len(), 22);
//!
//! let residuals = ocp.equality_residuals(&problem.x0).unwrap();
//! assert_eq!(residuals.len(), 12);
//! ```
//!
//! # Features
//!
//! - `parallel`: run [`MultiStart`] starts on the rayon pool
//! - `serde`: serialize configuration and plain-data types

#![doc(html_root_url = "https://docs.rs/ocp-core/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::cast_precision_loss,      // usize to f64 is fine for node indices
    clippy::missing_errors_doc,       // Error docs added where non-obvious
    clippy::module_name_repetitions,
    clippy::similar_names,            // q, qdot, qddot follow the equations of motion
    clippy::too_many_lines,           // Variant dispatch reads best in one match
)]

pub mod callbacks;
pub mod collocation;
pub mod dynamics;
pub mod interpolation;
pub mod layout;
pub mod mapping;
pub mod multistart;
pub mod parameters;
pub mod path;
pub mod program;
pub mod scaling;
pub mod transcription;
pub mod variable;
pub mod vector;

pub use callbacks::{Callback, DynamicsFn, ParameterFn, SeriesFn};
pub use dynamics::configure::{configure, VariableDecls};
pub use dynamics::{
    CustomDynamics, CustomInputs, Dynamics, DynamicsEvaluation, DynamicsEvaluator, DynamicsVariant,
    PhaseVariables,
};
pub use interpolation::InterpolatedSeries;
pub use layout::{PhaseLayout, PhaseSpec, VariableSharing};
pub use mapping::{BiMapping, IndexMapping};
pub use multistart::{MultiStart, StartResult};
pub use parameters::{Parameter, ParameterBlock, ParameterList};
pub use path::{Bounds, InitialGuess, NoiseConfig};
pub use program::{OptimalControlProgram, PhaseDefinition, Solution};
pub use scaling::{ScalingTable, VariableScaling};
pub use variable::{SlotDecl, VariableSet, VariableSlot};
pub use vector::{
    AssemblerState, DecisionVariable, NlpProblem, OcpValues, OptimizationVector, ValueSpace,
    VariableData, VariableKind,
};

/// Everything needed to declare and assemble a program.
pub mod prelude {
    // ========================================================================
    // Shared vocabulary from ocp-types
    // ========================================================================

    pub use ocp_types::{
        BiomechanicalModel, CollocationScheme, ControlType, DefectType, ExternalForceSet,
        InterpolationKind, MagnitudeType, OcpError, PhaseConfig, PhaseTime, Result,
        RigidBodyDynamics, Transcription,
    };

    // Fatigue
    pub use ocp_fatigue::{EffortPerception, FatigueList, FatigueTarget, MultiFatigueModel, XiaFatigue};

    // ========================================================================
    // Assembly
    // ========================================================================

    pub use crate::{
        BiMapping, Bounds, CustomDynamics, Dynamics, DynamicsEvaluator, DynamicsVariant,
        InitialGuess, InterpolatedSeries, MultiStart, NoiseConfig, OcpValues, OptimalControlProgram,
        OptimizationVector, Parameter, ParameterList, PhaseDefinition, PhaseLayout, PhaseSpec,
        SlotDecl, ValueSpace, VariableScaling, VariableSharing,
    };
}
