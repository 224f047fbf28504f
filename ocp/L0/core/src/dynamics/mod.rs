//! Phase dynamics: `dxdt = f(x, u, p)` and implicit defects.
//!
//! The set of dynamics is closed ([`DynamicsVariant`]); each variant knows
//! which slots it needs ([`configure`]) and how to evaluate them. An evaluation
//! runs in two steps:
//!
//! 1. parameters are written into the model (exclusive borrow)
//! 2. the variant is evaluated against the model (shared borrow)
//!
//! ```text
//! dxdt rows:  [ base states (slot order) | fatigue rows (group order) ]
//! dxdt cols:  one per external-force set, one when there is none
//! ```

pub mod configure;
mod functions;

use std::fmt;

use hashbrown::HashMap;
use nalgebra::{DMatrix, DVector};
use ocp_fatigue::{FatigueList, FatigueSource, FatigueTarget};
use ocp_types::{BiomechanicalModel, ExternalForceSet, OcpError, Result, RigidBodyDynamics};
use tracing::debug;

use crate::callbacks::{Callback, DynamicsFn};
use crate::layout::PhaseLayout;
use crate::mapping::BiMapping;
use crate::parameters::ParameterList;
use crate::variable::SlotDecl;

pub use functions::{
    contact_forces_from_muscle_driven, contact_forces_from_torque_activation_driven,
    contact_forces_from_torque_driven,
};

// ============================================================================
// Variants
// ============================================================================

/// User dynamics over user-declared slots.
pub struct CustomDynamics<M> {
    /// State slots.
    pub states: Vec<SlotDecl>,
    /// Control slots.
    pub controls: Vec<SlotDecl>,
    /// Evaluation function.
    pub function: DynamicsFn<M>,
}

impl<M> CustomDynamics<M> {
    /// Wrap `function` over the given slots.
    pub fn new(
        states: Vec<SlotDecl>,
        controls: Vec<SlotDecl>,
        function: impl Fn(&M, &CustomInputs<'_>) -> Result<DynamicsEvaluation> + Send + Sync + 'static,
    ) -> Self {
        Self {
            states,
            controls,
            function: Callback(std::sync::Arc::new(function)),
        }
    }
}

impl<M> Clone for CustomDynamics<M> {
    fn clone(&self) -> Self {
        Self {
            states: self.states.clone(),
            controls: self.controls.clone(),
            function: self.function.clone(),
        }
    }
}

impl<M> fmt::Debug for CustomDynamics<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomDynamics")
            .field("states", &self.states)
            .field("controls", &self.controls)
            .finish_non_exhaustive()
    }
}

/// Closed set of dynamics.
pub enum DynamicsVariant<M> {
    /// Generalized torques as controls.
    TorqueDriven {
        /// Enforce the model's contacts.
        with_contact: bool,
        /// Explicit or DAE formulation.
        rigidbody_dynamics: RigidBodyDynamics,
    },
    /// Torque-actuator activations as controls.
    TorqueActivationsDriven {
        /// Enforce the model's contacts.
        with_contact: bool,
    },
    /// Torques as states, their derivatives as controls.
    TorqueDerivativeDriven {
        /// Enforce the model's contacts.
        with_contact: bool,
        /// Explicit or DAE formulation.
        rigidbody_dynamics: RigidBodyDynamics,
    },
    /// Muscle activations (or excitations) as controls.
    MuscleDriven {
        /// Enforce the model's contacts.
        with_contact: bool,
        /// Excitations are controls and activations are states.
        with_excitations: bool,
        /// Add residual joint torques as controls.
        with_residual_torque: bool,
        /// Explicit or DAE formulation.
        rigidbody_dynamics: RigidBodyDynamics,
    },
    /// Joint accelerations of a free-floating body as controls.
    JointsAccelerationDriven {
        /// Only the explicit formulation is supported.
        rigidbody_dynamics: RigidBodyDynamics,
    },
    /// User-defined dynamics.
    Custom(CustomDynamics<M>),
}

impl<M> Clone for DynamicsVariant<M> {
    fn clone(&self) -> Self {
        match self {
            Self::TorqueDriven {
                with_contact,
                rigidbody_dynamics,
            } => Self::TorqueDriven {
                with_contact: *with_contact,
                rigidbody_dynamics: *rigidbody_dynamics,
            },
            Self::TorqueActivationsDriven { with_contact } => Self::TorqueActivationsDriven {
                with_contact: *with_contact,
            },
            Self::TorqueDerivativeDriven {
                with_contact,
                rigidbody_dynamics,
            } => Self::TorqueDerivativeDriven {
                with_contact: *with_contact,
                rigidbody_dynamics: *rigidbody_dynamics,
            },
            Self::MuscleDriven {
                with_contact,
                with_excitations,
                with_residual_torque,
                rigidbody_dynamics,
            } => Self::MuscleDriven {
                with_contact: *with_contact,
                with_excitations: *with_excitations,
                with_residual_torque: *with_residual_torque,
                rigidbody_dynamics: *rigidbody_dynamics,
            },
            Self::JointsAccelerationDriven { rigidbody_dynamics } => Self::JointsAccelerationDriven {
                rigidbody_dynamics: *rigidbody_dynamics,
            },
            Self::Custom(custom) => Self::Custom(custom.clone()),
        }
    }
}

impl<M> fmt::Debug for DynamicsVariant<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TorqueDriven {
                with_contact,
                rigidbody_dynamics,
            } => f
                .debug_struct("TorqueDriven")
                .field("with_contact", with_contact)
                .field("rigidbody_dynamics", rigidbody_dynamics)
                .finish(),
            Self::TorqueActivationsDriven { with_contact } => f
                .debug_struct("TorqueActivationsDriven")
                .field("with_contact", with_contact)
                .finish(),
            Self::TorqueDerivativeDriven {
                with_contact,
                rigidbody_dynamics,
            } => f
                .debug_struct("TorqueDerivativeDriven")
                .field("with_contact", with_contact)
                .field("rigidbody_dynamics", rigidbody_dynamics)
                .finish(),
            Self::MuscleDriven {
                with_contact,
                with_excitations,
                with_residual_torque,
                rigidbody_dynamics,
            } => f
                .debug_struct("MuscleDriven")
                .field("with_contact", with_contact)
                .field("with_excitations", with_excitations)
                .field("with_residual_torque", with_residual_torque)
                .field("rigidbody_dynamics", rigidbody_dynamics)
                .finish(),
            Self::JointsAccelerationDriven { rigidbody_dynamics } => f
                .debug_struct("JointsAccelerationDriven")
                .field("rigidbody_dynamics", rigidbody_dynamics)
                .finish(),
            Self::Custom(custom) => custom.fmt(f),
        }
    }
}

impl<M> DynamicsVariant<M> {
    /// Explicit torque-driven dynamics without contact.
    #[must_use]
    pub fn torque_driven() -> Self {
        Self::TorqueDriven {
            with_contact: false,
            rigidbody_dynamics: RigidBodyDynamics::Ode,
        }
    }

    /// Explicit muscle-driven dynamics, activations as controls.
    #[must_use]
    pub fn muscle_driven() -> Self {
        Self::MuscleDriven {
            with_contact: false,
            with_excitations: false,
            with_residual_torque: false,
            rigidbody_dynamics: RigidBodyDynamics::Ode,
        }
    }

    /// Whether the contacts are enforced.
    #[must_use]
    pub fn with_contact(&self) -> bool {
        match self {
            Self::TorqueDriven { with_contact, .. }
            | Self::TorqueActivationsDriven { with_contact }
            | Self::TorqueDerivativeDriven { with_contact, .. }
            | Self::MuscleDriven { with_contact, .. } => *with_contact,
            Self::JointsAccelerationDriven { .. } | Self::Custom(_) => false,
        }
    }

    /// Rigid-body formulation, `Ode` for variants without a choice.
    #[must_use]
    pub fn rigidbody_dynamics(&self) -> RigidBodyDynamics {
        match self {
            Self::TorqueDriven {
                rigidbody_dynamics, ..
            }
            | Self::TorqueDerivativeDriven {
                rigidbody_dynamics, ..
            }
            | Self::MuscleDriven {
                rigidbody_dynamics, ..
            }
            | Self::JointsAccelerationDriven { rigidbody_dynamics } => *rigidbody_dynamics,
            Self::TorqueActivationsDriven { .. } | Self::Custom(_) => RigidBodyDynamics::Ode,
        }
    }

    /// Short name for logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TorqueDriven { .. } => "torque_driven",
            Self::TorqueActivationsDriven { .. } => "torque_activations_driven",
            Self::TorqueDerivativeDriven { .. } => "torque_derivative_driven",
            Self::MuscleDriven { .. } => "muscle_driven",
            Self::JointsAccelerationDriven { .. } => "joints_acceleration_driven",
            Self::Custom(_) => "custom",
        }
    }

    /// Fatigue targets this variant can carry.
    fn accepts_fatigue(&self, target: FatigueTarget) -> bool {
        match (self, target) {
            (Self::TorqueDriven { .. }, FatigueTarget::Torque) => true,
            (
                Self::MuscleDriven {
                    with_residual_torque,
                    ..
                },
                FatigueTarget::Torque,
            ) => *with_residual_torque,
            (Self::MuscleDriven { .. }, FatigueTarget::Muscle) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Dynamics declaration
// ============================================================================

/// Dynamics of one phase: a variant plus fatigue, external forces and slot mappings.
pub struct Dynamics<M> {
    /// Variant.
    pub variant: DynamicsVariant<M>,
    /// Fatigue groups, rows appended after the base states.
    pub fatigue: Option<FatigueList>,
    /// External forces, one set per shooting interval, or none.
    pub external_forces: Vec<ExternalForceSet>,
    /// Mappings by slot name (`q`, `qdot`, `tau`, ...).
    pub mappings: HashMap<String, BiMapping>,
}

impl<M> Clone for Dynamics<M> {
    fn clone(&self) -> Self {
        Self {
            variant: self.variant.clone(),
            fatigue: self.fatigue.clone(),
            external_forces: self.external_forces.clone(),
            mappings: self.mappings.clone(),
        }
    }
}

impl<M> fmt::Debug for Dynamics<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dynamics")
            .field("variant", &self.variant)
            .field("fatigue", &self.fatigue)
            .field("external_forces", &self.external_forces.len())
            .field("mappings", &self.mappings)
            .finish()
    }
}

impl<M> Dynamics<M> {
    /// Dynamics of `variant`, without fatigue, external forces or mappings.
    #[must_use]
    pub fn new(variant: DynamicsVariant<M>) -> Self {
        Self {
            variant,
            fatigue: None,
            external_forces: Vec::new(),
            mappings: HashMap::new(),
        }
    }

    /// Attach fatigue groups.
    #[must_use]
    pub fn with_fatigue(mut self, fatigue: FatigueList) -> Self {
        self.fatigue = Some(fatigue);
        self
    }

    /// Attach one external-force set per shooting interval.
    #[must_use]
    pub fn with_external_forces(mut self, forces: Vec<ExternalForceSet>) -> Self {
        self.external_forces = forces;
        self
    }

    /// Map slot `name` (`q`, `qdot`, `tau`, `muscles`, ...).
    #[must_use]
    pub fn with_mapping(mut self, name: impl Into<String>, mapping: BiMapping) -> Self {
        self.mappings.insert(name.into(), mapping);
        self
    }

    /// Non-empty fatigue groups.
    fn fatigue_list(&self) -> Option<&FatigueList> {
        self.fatigue.as_ref().filter(|f| !f.is_empty())
    }

    /// Check fatigue groups against the variant.
    pub fn validate(&self) -> Result<()> {
        let Some(fatigue) = self.fatigue_list() else {
            return Ok(());
        };
        fatigue.validate()?;
        for group in fatigue.groups() {
            if !self.variant.accepts_fatigue(group.target()) {
                return Err(OcpError::not_implemented(format!(
                    "{} fatigue with {} dynamics",
                    group.target(),
                    self.variant.name()
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Evaluation types
// ============================================================================

/// Result of one dynamics evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicsEvaluation {
    /// State derivatives, one column per external-force set.
    pub dxdt: DMatrix<f64>,
    /// Implicit defects, when the formulation provides them.
    pub defects: Option<DMatrix<f64>>,
}

impl DynamicsEvaluation {
    /// Explicit evaluation from a single column.
    #[must_use]
    pub fn explicit(dxdt: DVector<f64>) -> Self {
        let n = dxdt.len();
        Self {
            dxdt: DMatrix::from_column_slice(n, 1, dxdt.as_slice()),
            defects: None,
        }
    }

    /// First column of `dxdt`.
    #[must_use]
    pub fn first_column(&self) -> DVector<f64> {
        self.dxdt.column(0).into_owned()
    }
}

/// Inputs handed to custom dynamics.
#[derive(Debug, Clone, Copy)]
pub struct CustomInputs<'a> {
    /// Phase index.
    pub phase: usize,
    /// Layout of the phase.
    pub layout: &'a PhaseLayout,
    /// Physical states.
    pub states: &'a DVector<f64>,
    /// Physical controls.
    pub controls: &'a DVector<f64>,
    /// Physical parameters.
    pub parameters: &'a DVector<f64>,
    /// Implicit state derivatives, when provided.
    pub states_dot: Option<&'a DVector<f64>>,
}

impl CustomInputs<'_> {
    /// State slot `name` at model dimension.
    pub fn state(&self, name: &str) -> Result<DVector<f64>> {
        self.layout.states().slot(name)?.get_full(self.states)
    }

    /// Control slot `name` at model dimension.
    pub fn control(&self, name: &str) -> Result<DVector<f64>> {
        self.layout.controls().slot(name)?.get_full(self.controls)
    }
}

/// Named access to one sample of a phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseVariables<'a> {
    layout: &'a PhaseLayout,
    states: &'a DVector<f64>,
    controls: &'a DVector<f64>,
}

impl<'a> PhaseVariables<'a> {
    /// Bind buffers to `layout`, checking their sizes.
    pub fn new(layout: &'a PhaseLayout, states: &'a DVector<f64>, controls: &'a DVector<f64>) -> Result<Self> {
        if states.len() != layout.n_states() {
            return Err(OcpError::dimension_mismatch("state sample", layout.n_states(), states.len()));
        }
        if controls.len() != layout.n_controls() {
            return Err(OcpError::dimension_mismatch(
                "control sample",
                layout.n_controls(),
                controls.len(),
            ));
        }
        Ok(Self {
            layout,
            states,
            controls,
        })
    }

    /// Layout of the phase.
    #[must_use]
    pub fn layout(&self) -> &'a PhaseLayout {
        self.layout
    }

    /// Whether a state slot `name` exists.
    #[must_use]
    pub fn has_state(&self, name: &str) -> bool {
        self.layout.states().contains(name)
    }

    /// Whether a control slot `name` exists.
    #[must_use]
    pub fn has_control(&self, name: &str) -> bool {
        self.layout.controls().contains(name)
    }

    /// State slot `name` at model dimension.
    pub fn state_full(&self, name: &str) -> Result<DVector<f64>> {
        self.layout.states().slot(name)?.get_full(self.states)
    }

    /// Control slot `name` at model dimension.
    pub fn control_full(&self, name: &str) -> Result<DVector<f64>> {
        self.layout.controls().slot(name)?.get_full(self.controls)
    }

    /// Slot `name` from the states, or from the controls when it is not a state.
    pub fn get(&self, name: &str) -> Result<DVector<f64>> {
        if self.has_state(name) {
            self.state_full(name)
        } else {
            self.control_full(name)
        }
    }
}

fn component(values: &DVector<f64>, name: &str, index: usize) -> Result<f64> {
    values
        .get(index)
        .copied()
        .ok_or_else(|| OcpError::unknown(format!("{name}[{index}]")))
}

impl FatigueSource for PhaseVariables<'_> {
    fn control(&self, name: &str, index: usize) -> Result<f64> {
        component(&self.control_full(name)?, name, index)
    }

    fn state(&self, name: &str, index: usize) -> Result<f64> {
        component(&self.state_full(name)?, name, index)
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// Evaluates the dynamics of one phase.
pub struct DynamicsEvaluator<M> {
    layout: PhaseLayout,
    dynamics: Dynamics<M>,
    parameters: ParameterList<M>,
}

impl<M> Clone for DynamicsEvaluator<M> {
    fn clone(&self) -> Self {
        Self {
            layout: self.layout.clone(),
            dynamics: self.dynamics.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl<M> fmt::Debug for DynamicsEvaluator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicsEvaluator")
            .field("phase", &self.layout.phase())
            .field("dynamics", &self.dynamics)
            .finish_non_exhaustive()
    }
}

impl<M: BiomechanicalModel> DynamicsEvaluator<M> {
    /// Evaluator for `layout`.
    ///
    /// Fatigue groups are validated here, so a heterogeneous group fails
    /// before any dynamics is evaluated.
    pub fn new(layout: &PhaseLayout, dynamics: Dynamics<M>, parameters: ParameterList<M>) -> Result<Self> {
        dynamics.validate()?;
        let n_forces = dynamics.external_forces.len();
        if n_forces != 0 && n_forces != layout.n_shooting() {
            return Err(OcpError::dimension_mismatch(
                format!("external force sets of phase {}", layout.phase()),
                layout.n_shooting(),
                n_forces,
            ));
        }
        let fatigue_rows = dynamics.fatigue_list().map_or(0, FatigueList::n_rows);
        if let Some(fatigue) = dynamics.fatigue_list() {
            let declared = fatigue_state_size(layout, fatigue)?;
            if declared != fatigue_rows {
                return Err(OcpError::dimension_mismatch(
                    format!("fatigue rows of phase {}", layout.phase()),
                    declared,
                    fatigue_rows,
                ));
            }
        }
        debug!(
            phase = layout.phase(),
            variant = dynamics.variant.name(),
            fatigue_rows,
            external_forces = n_forces,
            "dynamics evaluator built"
        );
        Ok(Self {
            layout: layout.clone(),
            dynamics,
            parameters,
        })
    }

    /// Phase layout.
    #[must_use]
    pub fn layout(&self) -> &PhaseLayout {
        &self.layout
    }

    /// Dynamics declaration.
    #[must_use]
    pub fn dynamics(&self) -> &Dynamics<M> {
        &self.dynamics
    }

    /// Parameters applied before each evaluation.
    #[must_use]
    pub fn parameters(&self) -> &ParameterList<M> {
        &self.parameters
    }

    /// Write the physical parameter values into `model`.
    pub fn apply_parameters(&self, model: &mut M, parameters: &DVector<f64>) -> Result<()> {
        self.parameters.apply(model, parameters)
    }

    /// Apply the parameters, then evaluate with every external-force set.
    pub fn evaluate(
        &self,
        model: &mut M,
        states: &DVector<f64>,
        controls: &DVector<f64>,
        parameters: &DVector<f64>,
        states_dot: Option<&DVector<f64>>,
    ) -> Result<DynamicsEvaluation> {
        self.apply_parameters(model, parameters)?;
        self.evaluate_with(model, None, states, controls, parameters, states_dot)
    }

    /// Apply the parameters, then evaluate with the force set of interval `node`.
    pub fn evaluate_node(
        &self,
        model: &mut M,
        node: usize,
        states: &DVector<f64>,
        controls: &DVector<f64>,
        parameters: &DVector<f64>,
        states_dot: Option<&DVector<f64>>,
    ) -> Result<DynamicsEvaluation> {
        self.apply_parameters(model, parameters)?;
        self.evaluate_with(model, Some(node), states, controls, parameters, states_dot)
    }

    /// Evaluate against a model whose parameters are already applied.
    ///
    /// `node` selects one external-force set; `None` evaluates them all.
    pub fn evaluate_with(
        &self,
        model: &M,
        node: Option<usize>,
        states: &DVector<f64>,
        controls: &DVector<f64>,
        parameters: &DVector<f64>,
        states_dot: Option<&DVector<f64>>,
    ) -> Result<DynamicsEvaluation> {
        let vars = PhaseVariables::new(&self.layout, states, controls)?;
        let forces = self.force_sets(node)?;
        let fatigue = self.dynamics.fatigue_list();

        let evaluation = match &self.dynamics.variant {
            DynamicsVariant::TorqueDriven {
                with_contact,
                rigidbody_dynamics,
            } => functions::torque_driven(
                model,
                &vars,
                &forces,
                *with_contact,
                *rigidbody_dynamics,
                fatigue,
                states_dot,
            )?,
            DynamicsVariant::TorqueActivationsDriven { with_contact } => {
                functions::torque_activations_driven(model, &vars, &forces, *with_contact)?
            }
            DynamicsVariant::TorqueDerivativeDriven {
                with_contact,
                rigidbody_dynamics,
            } => functions::torque_derivative_driven(model, &vars, &forces, *with_contact, *rigidbody_dynamics)?,
            DynamicsVariant::MuscleDriven {
                with_contact,
                with_excitations,
                with_residual_torque,
                rigidbody_dynamics,
            } => functions::muscle_driven(
                model,
                &vars,
                &forces,
                &functions::MuscleOptions {
                    with_contact: *with_contact,
                    with_excitations: *with_excitations,
                    with_residual_torque: *with_residual_torque,
                    rigidbody_dynamics: *rigidbody_dynamics,
                },
                fatigue,
            )?,
            DynamicsVariant::JointsAccelerationDriven { rigidbody_dynamics } => {
                functions::joints_acceleration_driven(model, &vars, *rigidbody_dynamics)?
            }
            DynamicsVariant::Custom(custom) => {
                let inputs = CustomInputs {
                    phase: self.layout.phase(),
                    layout: &self.layout,
                    states,
                    controls,
                    parameters,
                    states_dot,
                };
                let evaluation = (custom.function.0)(model, &inputs)?;
                if evaluation.dxdt.nrows() != self.layout.n_states() {
                    return Err(OcpError::dimension_mismatch(
                        "custom dynamics rows",
                        self.layout.n_states(),
                        evaluation.dxdt.nrows(),
                    ));
                }
                return Ok(evaluation);
            }
        };

        self.append_fatigue(evaluation, &vars)
    }

    /// Contact forces at one sample, one column per external-force set.
    pub fn contact_forces(
        &self,
        model: &mut M,
        node: Option<usize>,
        states: &DVector<f64>,
        controls: &DVector<f64>,
        parameters: &DVector<f64>,
    ) -> Result<DMatrix<f64>> {
        if !self.dynamics.variant.with_contact() {
            return Err(OcpError::invalid_config(format!(
                "{} dynamics of phase {} has no contact",
                self.dynamics.variant.name(),
                self.layout.phase()
            )));
        }
        self.apply_parameters(model, parameters)?;
        let vars = PhaseVariables::new(&self.layout, states, controls)?;
        let forces = self.force_sets(node)?;
        match &self.dynamics.variant {
            DynamicsVariant::TorqueDriven { .. } | DynamicsVariant::TorqueDerivativeDriven { .. } => {
                contact_forces_from_torque_driven(model, &vars, &forces)
            }
            DynamicsVariant::TorqueActivationsDriven { .. } => {
                contact_forces_from_torque_activation_driven(model, &vars, &forces)
            }
            DynamicsVariant::MuscleDriven { .. } => contact_forces_from_muscle_driven(model, &vars, &forces),
            DynamicsVariant::JointsAccelerationDriven { .. } | DynamicsVariant::Custom(_) => Err(
                OcpError::not_implemented(format!("contact forces of {}", self.dynamics.variant.name())),
            ),
        }
    }

    fn force_sets(&self, node: Option<usize>) -> Result<Vec<Option<&ExternalForceSet>>> {
        let all = &self.dynamics.external_forces;
        if all.is_empty() {
            return Ok(vec![None]);
        }
        match node {
            None => Ok(all.iter().map(Some).collect()),
            Some(k) => all
                .get(k.min(all.len() - 1))
                .map(|f| vec![Some(f)])
                .ok_or_else(|| OcpError::unknown(format!("external force set {k}"))),
        }
    }

    fn append_fatigue(
        &self,
        evaluation: DynamicsEvaluation,
        vars: &PhaseVariables<'_>,
    ) -> Result<DynamicsEvaluation> {
        let n_states = self.layout.n_states();
        let Some(fatigue) = self.dynamics.fatigue_list() else {
            return check_rows(evaluation, n_states);
        };
        let mut columns = Vec::with_capacity(evaluation.dxdt.ncols());
        for column in evaluation.dxdt.column_iter() {
            columns.push(fatigue.dynamics(column.into_owned(), vars)?);
        }
        let dxdt = DMatrix::from_columns(&columns);
        check_rows(
            DynamicsEvaluation {
                dxdt,
                defects: evaluation.defects,
            },
            n_states,
        )
    }
}

/// Total size of the fatigue state slots `layout` declares for `fatigue`.
fn fatigue_state_size(layout: &PhaseLayout, fatigue: &FatigueList) -> Result<usize> {
    let mut size = 0;
    for group in fatigue.groups() {
        for slot in group.state_slots()? {
            size += layout
                .states()
                .get(&slot.name)
                .ok_or_else(|| OcpError::unknown(format!("fatigue state {}", slot.name)))?
                .size();
        }
    }
    Ok(size)
}

fn check_rows(evaluation: DynamicsEvaluation, n_states: usize) -> Result<DynamicsEvaluation> {
    if evaluation.dxdt.nrows() == n_states {
        Ok(evaluation)
    } else {
        Err(OcpError::dimension_mismatch("dynamics rows", n_states, evaluation.dxdt.nrows()))
    }
}
