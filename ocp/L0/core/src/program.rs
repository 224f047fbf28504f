//! A multi-phase optimal control program.
//!
//! [`OptimalControlProgram`] owns the model, one [`DynamicsEvaluator`] per
//! phase and the [`OptimizationVector`]. It hands the solver an
//! [`NlpProblem`], evaluates the equality residuals at any iterate and decodes
//! the solution.
//!
//! # Examples
//!
//! ```ignore
//! use ocp_core::prelude::*;
//! use ocp_model::ArticulatedModel;
//!
//! let model = ArticulatedModel::pendulum()?;
//! let phase = PhaseDefinition::new(PhaseConfig::new(30, 1.0), Dynamics::new(DynamicsVariant::torque_driven()));
//! let mut ocp = OptimalControlProgram::new(model, vec![phase], ParameterList::new())?;
//!
//! let problem = ocp.nlp_problem()?;
//! let residuals = ocp.equality_residuals(&problem.x0)?;
//! ```

use nalgebra::{DMatrix, DVector};
use ocp_types::{BiomechanicalModel, OcpError, PhaseConfig, PhaseTime, Result};
use tracing::debug;

use crate::dynamics::configure::configure;
use crate::dynamics::{Dynamics, DynamicsEvaluator};
use crate::layout::{PhaseLayout, PhaseSpec, VariableSharing};
use crate::parameters::ParameterList;
use crate::path::{Bounds, InitialGuess};
use crate::scaling::{ScalingTable, VariableScaling};
use crate::transcription::{phase_residuals, PhaseIterate};
use crate::variable::SlotDecl;
use crate::vector::{NlpProblem, OcpValues, OptimizationVector, ValueSpace};

/// Declaration of one phase.
pub struct PhaseDefinition<M> {
    config: PhaseConfig,
    dynamics: Dynamics<M>,
    state_bounds: Option<Bounds>,
    control_bounds: Option<Bounds>,
    state_init: Option<InitialGuess>,
    control_init: Option<InitialGuess>,
    state_scaling: VariableScaling,
    control_scaling: VariableScaling,
    state_sharing: Option<VariableSharing>,
    control_sharing: Option<VariableSharing>,
}

impl<M> PhaseDefinition<M> {
    /// Phase with default bounds, initial guesses and unit scaling.
    #[must_use]
    pub fn new(config: PhaseConfig, dynamics: Dynamics<M>) -> Self {
        Self {
            config,
            dynamics,
            state_bounds: None,
            control_bounds: None,
            state_init: None,
            control_init: None,
            state_scaling: VariableScaling::new(),
            control_scaling: VariableScaling::new(),
            state_sharing: None,
            control_sharing: None,
        }
    }

    /// State bounds over the whole phase.
    #[must_use]
    pub fn state_bounds(mut self, bounds: Bounds) -> Self {
        self.state_bounds = Some(bounds);
        self
    }

    /// Control bounds over the whole phase.
    #[must_use]
    pub fn control_bounds(mut self, bounds: Bounds) -> Self {
        self.control_bounds = Some(bounds);
        self
    }

    /// State initial guess.
    #[must_use]
    pub fn state_init(mut self, init: InitialGuess) -> Self {
        self.state_init = Some(init);
        self
    }

    /// Control initial guess.
    #[must_use]
    pub fn control_init(mut self, init: InitialGuess) -> Self {
        self.control_init = Some(init);
        self
    }

    /// Per-slot state scaling.
    #[must_use]
    pub fn state_scaling(mut self, scaling: VariableScaling) -> Self {
        self.state_scaling = scaling;
        self
    }

    /// Per-slot control scaling.
    #[must_use]
    pub fn control_scaling(mut self, scaling: VariableScaling) -> Self {
        self.control_scaling = scaling;
        self
    }

    /// Reuse states of an earlier phase.
    #[must_use]
    pub fn share_states(mut self, sharing: VariableSharing) -> Self {
        self.state_sharing = Some(sharing);
        self
    }

    /// Reuse controls of an earlier phase.
    #[must_use]
    pub fn share_controls(mut self, sharing: VariableSharing) -> Self {
        self.control_sharing = Some(sharing);
        self
    }
}

/// Decoded solution.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Physical values.
    pub values: OcpValues,
    /// `[0, T_0, T_1, ...]`.
    pub phase_times: Vec<f64>,
}

/// Slot defaults, or `(-inf, inf)` / `0` for slots without defaults.
fn default_bounds(decls: &[SlotDecl]) -> Result<Bounds> {
    let mut min = Vec::new();
    let mut max = Vec::new();
    for decl in decls {
        match &decl.default_bounds {
            Some((lo, hi)) => {
                min.extend_from_slice(lo);
                max.extend_from_slice(hi);
            }
            None => {
                min.extend(std::iter::repeat(f64::NEG_INFINITY).take(decl.size()));
                max.extend(std::iter::repeat(f64::INFINITY).take(decl.size()));
            }
        }
    }
    Bounds::constant(min, max)
}

fn default_init(decls: &[SlotDecl]) -> InitialGuess {
    let mut values = Vec::new();
    for decl in decls {
        match &decl.default_init {
            Some(init) => values.extend_from_slice(init),
            None => values.extend(std::iter::repeat(0.0).take(decl.size())),
        }
    }
    InitialGuess::constant(values)
}

/// Model, evaluators and decision vector of a program.
pub struct OptimalControlProgram<M> {
    model: M,
    evaluators: Vec<DynamicsEvaluator<M>>,
    state_scales: Vec<ScalingTable>,
    parameters: ParameterList<M>,
    vector: OptimizationVector,
}

impl<M: BiomechanicalModel> OptimalControlProgram<M> {
    /// Configure, lay out and allocate every phase.
    ///
    /// Optimized phase durations are added to `parameters` as `"time"`.
    pub fn new(model: M, phases: Vec<PhaseDefinition<M>>, mut parameters: ParameterList<M>) -> Result<Self> {
        if phases.is_empty() {
            return Err(OcpError::invalid_config("a program needs at least one phase"));
        }
        for (i, phase) in phases.iter().enumerate() {
            if let PhaseTime::Optimized { initial, min, max } = phase.config.final_time {
                parameters.add_phase_time(i, initial, min, max)?;
            }
        }

        let mut vector = OptimizationVector::new();
        let mut evaluators = Vec::with_capacity(phases.len());
        let mut state_scales = Vec::with_capacity(phases.len());
        let mut state_bounds = Vec::with_capacity(phases.len());
        let mut control_bounds = Vec::with_capacity(phases.len());
        let mut state_init = Vec::with_capacity(phases.len());
        let mut control_init = Vec::with_capacity(phases.len());

        for (i, phase) in phases.into_iter().enumerate() {
            let decls = configure(&model, &phase.dynamics)?;
            state_bounds.push(phase.state_bounds.map_or_else(|| default_bounds(&decls.states), Ok)?);
            control_bounds.push(phase.control_bounds.map_or_else(|| default_bounds(&decls.controls), Ok)?);
            state_init.push(phase.state_init.unwrap_or_else(|| default_init(&decls.states)));
            control_init.push(phase.control_init.unwrap_or_else(|| default_init(&decls.controls)));

            let mut spec = PhaseSpec::new(i, phase.config, decls.states, decls.controls);
            spec.state_sharing = phase.state_sharing;
            spec.control_sharing = phase.control_sharing;
            let layout = PhaseLayout::build(spec)?;

            state_scales.push(phase.state_scaling.table_for(layout.states())?);
            evaluators.push(DynamicsEvaluator::new(&layout, phase.dynamics, parameters.clone())?);
            vector.add_phase(layout, phase.state_scaling, phase.control_scaling)?;
        }
        for block in parameters.blocks() {
            vector.add_parameter(block)?;
        }

        vector.define_shooting_points()?;
        vector.define_bounds(state_bounds, control_bounds)?;
        vector.define_initial_guess(state_init, control_init)?;
        debug!(
            phases = evaluators.len(),
            parameters = parameters.len(),
            variables = vector.len()?,
            "optimal control program built"
        );

        Ok(Self {
            model,
            evaluators,
            state_scales,
            parameters,
            vector,
        })
    }

    /// The model.
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Declared parameters, phase durations included.
    #[must_use]
    pub fn parameters(&self) -> &ParameterList<M> {
        &self.parameters
    }

    /// The decision vector.
    #[must_use]
    pub fn vector(&self) -> &OptimizationVector {
        &self.vector
    }

    /// Evaluator of `phase`.
    #[must_use]
    pub fn evaluator(&self, phase: usize) -> Option<&DynamicsEvaluator<M>> {
        self.evaluators.get(phase)
    }

    /// Number of phases.
    #[must_use]
    pub fn n_phases(&self) -> usize {
        self.evaluators.len()
    }

    /// Bounds and initial guess for the solver.
    pub fn nlp_problem(&mut self) -> Result<NlpProblem> {
        self.vector.assemble()
    }

    /// Continuity and collocation residuals of every phase at the scaled iterate `flat`.
    pub fn equality_residuals(&mut self, flat: &DVector<f64>) -> Result<DVector<f64>> {
        let values = self.vector.to_dictionaries(flat, ValueSpace::Physical)?;
        let times = self.vector.extract_phase_time(flat)?;
        let parameters = values.parameters.all.column(0).into_owned();

        let mut out = Vec::new();
        for (p, evaluator) in self.evaluators.iter().enumerate() {
            let iterate = PhaseIterate {
                states: &values.states[p].all,
                controls: &values.controls[p].all,
                parameters: &parameters,
                duration: times[p + 1],
            };
            let residuals = phase_residuals(&mut self.model, evaluator, &iterate, &self.state_scales[p])?;
            out.extend(residuals.iter().copied());
        }
        Ok(DVector::from_vec(out))
    }

    /// Contact forces of `phase` at every shooting node of the scaled iterate `flat`.
    pub fn contact_forces(&mut self, phase: usize, flat: &DVector<f64>) -> Result<Vec<DMatrix<f64>>> {
        let evaluator = self
            .evaluators
            .get(phase)
            .ok_or_else(|| OcpError::invalid_config(format!("phase {phase} does not exist")))?;
        let values = self.vector.to_dictionaries(flat, ValueSpace::Physical)?;
        let parameters = values.parameters.all.column(0).into_owned();
        let layout = evaluator.layout();
        let controls = &values.controls[phase].all;
        (0..layout.n_shooting())
            .map(|k| {
                let x = values.states[phase].sample(layout.state_sample_index(k, 0));
                let u = controls.column(k.min(controls.ncols().saturating_sub(1))).into_owned();
                evaluator.contact_forces(&mut self.model, Some(k), &x, &u, &parameters)
            })
            .collect()
    }

    /// Physical values and phase times of a solver output.
    pub fn decode(&mut self, flat: &DVector<f64>) -> Result<Solution> {
        let values = self.vector.decode(flat)?;
        let phase_times = self.vector.extract_phase_time(flat)?;
        Ok(Solution { values, phase_times })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::dynamics::DynamicsVariant;
    use crate::parameters::Parameter;
    use approx::assert_relative_eq;
    use ocp_model::ArticulatedModel;

    fn pendulum_phase(n: usize) -> PhaseDefinition<ArticulatedModel> {
        PhaseDefinition::new(PhaseConfig::new(n, 1.0), Dynamics::new(DynamicsVariant::torque_driven()))
    }

    #[test]
    fn test_pendulum_program_sizes() {
        let model = ArticulatedModel::pendulum().unwrap();
        let mut ocp = OptimalControlProgram::new(model, vec![pendulum_phase(3)], ParameterList::new()).unwrap();
        let problem = ocp.nlp_problem().unwrap();
        assert_eq!(problem.len(), 22);
        assert!(problem.lbx.iter().all(|v| v.is_infinite()));
        let residuals = ocp.equality_residuals(&problem.x0).unwrap();
        assert_eq!(residuals.len(), 3 * 4);
    }

    #[test]
    fn test_optimized_time_becomes_parameter() {
        let model = ArticulatedModel::pendulum().unwrap();
        let phase = PhaseDefinition::new(
            PhaseConfig::new(2, 1.0).optimized_time(1.0, 0.5, 2.0),
            Dynamics::new(DynamicsVariant::torque_driven()),
        );
        let mut ocp = OptimalControlProgram::new(model, vec![phase], ParameterList::new()).unwrap();
        assert_eq!(ocp.parameters().time_index(0), Some(0));
        let mut problem = ocp.nlp_problem().unwrap();
        let n = problem.len();
        assert_eq!((problem.lbx[n - 1], problem.ubx[n - 1]), (0.5, 2.0));
        problem.x0[n - 1] = 1.25;
        let solution = ocp.decode(&problem.x0).unwrap();
        assert_eq!(solution.phase_times, vec![0.0, 1.25]);
    }

    #[test]
    fn test_parameter_callback_reaches_model() {
        let model = ArticulatedModel::pendulum().unwrap();
        let gravity = Parameter::new("gravity", 1)
            .bounds(vec![-20.0], vec![0.0])
            .init(vec![-9.81])
            .callback(|m: &mut ArticulatedModel, v| {
                m.set_gravity(v[0]);
                Ok(())
            });
        let params = ParameterList::new().with(gravity).unwrap();
        let mut ocp = OptimalControlProgram::new(model, vec![pendulum_phase(2)], params).unwrap();
        let mut problem = ocp.nlp_problem().unwrap();
        let n = problem.len();
        problem.x0[n - 1] = -3.0;
        ocp.equality_residuals(&problem.x0).unwrap();
        assert_relative_eq!(ocp.model().gravity(), -3.0);
    }

    #[test]
    fn test_user_bounds_override_defaults() {
        let model = ArticulatedModel::pendulum().unwrap();
        let phase = pendulum_phase(2).control_bounds(Bounds::constant(vec![-5.0; 2], vec![5.0; 2]).unwrap());
        let mut ocp = OptimalControlProgram::new(model, vec![phase], ParameterList::new()).unwrap();
        let problem = ocp.nlp_problem().unwrap();
        assert_eq!(problem.lbx[12], -5.0);
        assert_eq!(problem.ubx[15], 5.0);
    }
}
