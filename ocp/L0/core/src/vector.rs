//! The flat decision vector of a multi-phase program.
//!
//! ```text
//! [ states  phase 0 | states  phase 1 | ... ]   node-major, component-minor
//! [ controls phase 0 | controls phase 1 | ... ]
//! [ parameters (declaration order) ]
//! ```
//!
//! Components a phase shares with another phase are not allocated again:
//! they alias the owner's entry (resolved transitively) and carry the
//! owner's scale.
//!
//! # Lifecycle
//!
//! ```text
//! Unbuilt ──define_shooting_points──▶ LayoutsDefined
//!         ──define_bounds + define_initial_guess──▶ BoundsAndInitDefined
//!         ──assemble──▶ VectorReady ──decode──▶ Decoded
//! ```
//!
//! Adding a phase, replacing a layout, changing a control type or adding a
//! parameter sends the assembler back to `Unbuilt`.

use hashbrown::HashMap;
use nalgebra::{DMatrix, DVector};
use ocp_types::{InterpolationKind, OcpError, Result};
use tracing::{debug, warn};

use crate::layout::{PhaseLayout, VariableSharing};
use crate::parameters::ParameterBlock;
use crate::path::{Bounds, InitialGuess};
use crate::scaling::{ScalingTable, VariableScaling};
use crate::variable::VariableSet;

/// Build step of an [`OptimizationVector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AssemblerState {
    /// Phases or parameters changed since the last build.
    Unbuilt,
    /// Entries are allocated.
    LayoutsDefined,
    /// Bounds and initial guesses are bound to the grids.
    BoundsAndInitDefined,
    /// The NLP problem was produced.
    VectorReady,
    /// A solution was decoded.
    Decoded,
}

impl AssemblerState {
    /// Name used in errors.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Unbuilt => "unbuilt",
            Self::LayoutsDefined => "layouts defined",
            Self::BoundsAndInitDefined => "bounds and init defined",
            Self::VectorReady => "vector ready",
            Self::Decoded => "decoded",
        }
    }
}

/// Block a decision variable belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VariableKind {
    /// Phase state.
    State,
    /// Phase control.
    Control,
    /// Global parameter.
    Parameter,
}

/// One entry of the decision vector, described at its owner.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecisionVariable {
    /// Block.
    pub kind: VariableKind,
    /// Owning phase (for the phase-duration parameter, the timed phase).
    pub phase: Option<usize>,
    /// Shooting node.
    pub node: usize,
    /// Collocation point inside the node, 0 outside collocation.
    pub point: usize,
    /// Flat sample index inside the phase.
    pub sample: usize,
    /// Component inside the sample (inside the parameter vector for parameters).
    pub component: usize,
    /// Slot or parameter name.
    pub name: String,
    /// Scale factor.
    pub scale: f64,
}

/// Whether values are the solver's (scaled) or the model's (physical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueSpace {
    /// `physical / scale`.
    Scaled,
    /// Model units.
    #[default]
    Physical,
}

/// Values of one block, whole and by slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableData {
    /// One column per sample.
    pub all: DMatrix<f64>,
    /// Rows of `all` by slot name.
    pub slots: HashMap<String, DMatrix<f64>>,
}

impl VariableData {
    fn from_all(all: DMatrix<f64>, ranges: impl Iterator<Item = (String, usize, usize)>) -> Self {
        let slots = ranges
            .map(|(name, start, len)| (name, all.rows(start, len).into_owned()))
            .collect();
        Self { all, slots }
    }

    /// Slot `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DMatrix<f64>> {
        self.slots.get(name)
    }

    /// Column `j` of `all`.
    #[must_use]
    pub fn sample(&self, j: usize) -> DVector<f64> {
        self.all.column(j).into_owned()
    }
}

/// Named values of the whole decision vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OcpValues {
    /// States per phase (`n_states × n_state_samples`).
    pub states: Vec<VariableData>,
    /// Controls per phase (`n_controls × n_control_samples`).
    pub controls: Vec<VariableData>,
    /// Parameters (`n_parameters × 1`).
    pub parameters: VariableData,
}

/// What the solver receives.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NlpProblem {
    /// Initial guess (scaled).
    pub x0: DVector<f64>,
    /// Lower bounds (scaled).
    pub lbx: DVector<f64>,
    /// Upper bounds (scaled).
    pub ubx: DVector<f64>,
}

impl NlpProblem {
    /// Number of decision variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x0.len()
    }

    /// Whether the problem has no variable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x0.is_empty()
    }
}

#[derive(Debug, Clone)]
struct PhaseEntry {
    layout: PhaseLayout,
    state_scaling: VariableScaling,
    control_scaling: VariableScaling,
}

/// Phase-local `(sample, component)` to global index, per phase.
#[derive(Debug, Clone, Default)]
struct BlockIndex {
    per_phase: Vec<Vec<usize>>,
    widths: Vec<usize>,
}

impl BlockIndex {
    fn get(&self, phase: usize, sample: usize, component: usize) -> Option<usize> {
        let width = *self.widths.get(phase)?;
        if component >= width {
            return None;
        }
        self.per_phase.get(phase)?.get(sample * width + component).copied()
    }
}

#[derive(Debug, Clone)]
struct Allocation {
    vars: Vec<DecisionVariable>,
    states: BlockIndex,
    controls: BlockIndex,
    parameter_offset: usize,
}

#[derive(Clone, Copy)]
struct BlockDims {
    samples: usize,
    width: usize,
}

/// Assembles the decision vector, its bounds and its initial guess.
#[derive(Debug, Clone)]
pub struct OptimizationVector {
    phases: Vec<PhaseEntry>,
    parameters: Vec<ParameterBlock>,
    state: AssemblerState,
    allocation: Option<Allocation>,
    state_bounds: Option<Vec<Bounds>>,
    control_bounds: Option<Vec<Bounds>>,
    state_init: Option<Vec<InitialGuess>>,
    control_init: Option<Vec<InitialGuess>>,
}

impl Default for OptimizationVector {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationVector {
    /// Empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phases: Vec::new(),
            parameters: Vec::new(),
            state: AssemblerState::Unbuilt,
            allocation: None,
            state_bounds: None,
            control_bounds: None,
            state_init: None,
            control_init: None,
        }
    }

    // ====== Declaration ======

    fn reset(&mut self) {
        if self.state != AssemblerState::Unbuilt {
            debug!(from = self.state.name(), "optimization vector reset");
        }
        self.state = AssemblerState::Unbuilt;
        self.allocation = None;
        self.state_bounds = None;
        self.control_bounds = None;
        self.state_init = None;
        self.control_init = None;
    }

    /// Append a phase. Its index must be the number of phases already added.
    pub fn add_phase(
        &mut self,
        layout: PhaseLayout,
        state_scaling: VariableScaling,
        control_scaling: VariableScaling,
    ) -> Result<()> {
        if layout.phase() != self.phases.len() {
            return Err(OcpError::invalid_config(format!(
                "phase {} added at position {}",
                layout.phase(),
                self.phases.len()
            )));
        }
        self.phases.push(PhaseEntry {
            layout,
            state_scaling,
            control_scaling,
        });
        self.reset();
        Ok(())
    }

    /// Replace the layout of `phase`, keeping its scaling.
    pub fn replace_layout(&mut self, phase: usize, layout: PhaseLayout) -> Result<()> {
        if layout.phase() != phase {
            return Err(OcpError::invalid_config(format!(
                "layout of phase {} given for phase {phase}",
                layout.phase()
            )));
        }
        self.entry_mut(phase)?.layout = layout;
        self.reset();
        Ok(())
    }

    /// Change the control parameterization of `phase`.
    pub fn set_control_type(&mut self, phase: usize, control_type: ocp_types::ControlType) -> Result<()> {
        let entry = self.entry_mut(phase)?;
        entry.layout = entry.layout.with_control_type(control_type)?;
        self.reset();
        Ok(())
    }

    /// Add a parameter block, concatenated onto an existing block of the same name.
    pub fn add_parameter(&mut self, block: ParameterBlock) -> Result<()> {
        match self.parameters.iter_mut().find(|b| b.name == block.name) {
            Some(existing) => existing.merge(&block)?,
            None => self.parameters.push(block),
        }
        self.reset();
        Ok(())
    }

    fn entry_mut(&mut self, phase: usize) -> Result<&mut PhaseEntry> {
        let n = self.phases.len();
        self.phases
            .get_mut(phase)
            .ok_or_else(|| OcpError::invalid_config(format!("phase {phase} does not exist ({n} phases)")))
    }

    // ====== Accessors ======

    /// Current build step.
    #[must_use]
    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Number of phases.
    #[must_use]
    pub fn n_phases(&self) -> usize {
        self.phases.len()
    }

    /// Layout of `phase`.
    #[must_use]
    pub fn layout(&self, phase: usize) -> Option<&PhaseLayout> {
        self.phases.get(phase).map(|e| &e.layout)
    }

    /// Parameter blocks in vector order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterBlock] {
        &self.parameters
    }

    /// Number of parameter components.
    #[must_use]
    pub fn n_parameters(&self) -> usize {
        self.parameters.iter().map(ParameterBlock::size).sum()
    }

    fn require(&self, at_least: AssemblerState) -> Result<&Allocation> {
        match &self.allocation {
            Some(allocation) if self.state >= at_least => Ok(allocation),
            _ => Err(OcpError::InvalidState {
                expected: at_least.name(),
                actual: self.state.name(),
            }),
        }
    }

    // ====== Shooting points ======

    /// Allocate every entry of the vector.
    pub fn define_shooting_points(&mut self) -> Result<()> {
        if self.phases.is_empty() {
            return Err(OcpError::invalid_config("a program needs at least one phase"));
        }
        let mut vars = Vec::new();

        let state_tables = self
            .phases
            .iter()
            .map(|e| e.state_scaling.table_for(e.layout.states()))
            .collect::<Result<Vec<_>>>()?;
        let control_tables = self
            .phases
            .iter()
            .map(|e| e.control_scaling.table_for(e.layout.controls()))
            .collect::<Result<Vec<_>>>()?;

        let states = self.allocate_block(VariableKind::State, &state_tables, &mut vars)?;
        let controls = self.allocate_block(VariableKind::Control, &control_tables, &mut vars)?;

        let parameter_offset = vars.len();
        let mut component = 0;
        for block in &self.parameters {
            ScalingTable::new(&block.name, block.scaling.clone())?;
            for (j, &scale) in block.scaling.iter().enumerate() {
                vars.push(DecisionVariable {
                    kind: VariableKind::Parameter,
                    phase: block.phases.as_ref().and_then(|p| p.get(j).copied()),
                    node: 0,
                    point: 0,
                    sample: 0,
                    component,
                    name: block.name.clone(),
                    scale,
                });
                component += 1;
            }
        }

        debug!(
            phases = self.phases.len(),
            states = controls_start(&vars),
            controls = parameter_offset - controls_start(&vars),
            parameters = vars.len() - parameter_offset,
            total = vars.len(),
            "decision vector allocated"
        );
        self.allocation = Some(Allocation {
            vars,
            states,
            controls,
            parameter_offset,
        });
        self.state_bounds = None;
        self.control_bounds = None;
        self.state_init = None;
        self.control_init = None;
        self.state = AssemblerState::LayoutsDefined;
        Ok(())
    }

    fn block_dims(&self, kind: VariableKind) -> Vec<BlockDims> {
        self.phases
            .iter()
            .map(|e| match kind {
                VariableKind::State => BlockDims {
                    samples: e.layout.n_state_samples(),
                    width: e.layout.n_states(),
                },
                _ => BlockDims {
                    samples: e.layout.n_control_samples(),
                    width: e.layout.n_controls(),
                },
            })
            .collect()
    }

    fn sharing_of(&self, kind: VariableKind, phase: usize) -> Option<&VariableSharing> {
        let layout = &self.phases[phase].layout;
        match kind {
            VariableKind::State => layout.state_sharing(),
            _ => layout.control_sharing(),
        }
    }

    fn allocate_block(
        &self,
        kind: VariableKind,
        tables: &[ScalingTable],
        vars: &mut Vec<DecisionVariable>,
    ) -> Result<BlockIndex> {
        let dims = self.block_dims(kind);
        let block_name = if kind == VariableKind::State { "state" } else { "control" };

        // Owned entries, in phase order.
        let mut index: Vec<Vec<Option<usize>>> = Vec::with_capacity(self.phases.len());
        for (p, entry) in self.phases.iter().enumerate() {
            let layout = &entry.layout;
            let set: &VariableSet = match kind {
                VariableKind::State => layout.states(),
                _ => layout.controls(),
            };
            let sharing = self.sharing_of(kind, p);
            let BlockDims { samples, width } = dims[p];
            let mut local = vec![None; samples * width];
            for s in 0..samples {
                let (node, point) = match kind {
                    VariableKind::State => layout.state_sample_position(s),
                    _ => (s, 0),
                };
                for c in 0..width {
                    if sharing.is_some_and(|sh| sh.shares(c)) {
                        continue;
                    }
                    local[s * width + c] = Some(vars.len());
                    vars.push(DecisionVariable {
                        kind,
                        phase: Some(p),
                        node,
                        point,
                        sample: s,
                        component: c,
                        name: set.slot_of(c).map(|slot| slot.name().to_string()).unwrap_or_default(),
                        scale: tables[p].get(c).unwrap_or(1.0),
                    });
                }
            }
            index.push(local);
        }

        // Aliases, resolved along the sharing chain.
        for p in 0..self.phases.len() {
            for local in 0..index[p].len() {
                if index[p][local].is_some() {
                    continue;
                }
                let mut chain = vec![p];
                let mut current = p;
                let global = loop {
                    if let Some(g) = index[current][local] {
                        break g;
                    }
                    let source = self
                        .sharing_of(kind, current)
                        .map(|sh| sh.source_phase)
                        .ok_or_else(|| OcpError::invalid_config(format!("unallocated {block_name} entry")))?;
                    if source >= self.phases.len() {
                        return Err(OcpError::invalid_config(format!(
                            "phase {current} shares {block_name}s with missing phase {source}"
                        )));
                    }
                    if chain.contains(&source) {
                        return Err(OcpError::SharingCycle {
                            phase: p,
                            block: block_name,
                        });
                    }
                    if dims[source].samples != dims[current].samples {
                        return Err(OcpError::dimension_mismatch(
                            format!("{block_name} samples shared by phase {current}"),
                            dims[current].samples,
                            dims[source].samples,
                        ));
                    }
                    if dims[source].width != dims[current].width {
                        return Err(OcpError::dimension_mismatch(
                            format!("{block_name}s shared by phase {current}"),
                            dims[current].width,
                            dims[source].width,
                        ));
                    }
                    chain.push(source);
                    current = source;
                };
                index[p][local] = Some(global);
            }
        }

        let per_phase = index
            .into_iter()
            .map(|local| local.into_iter().map(|g| g.unwrap_or(usize::MAX)).collect())
            .collect();
        Ok(BlockIndex {
            per_phase,
            widths: dims.iter().map(|d| d.width).collect(),
        })
    }

    /// Allocated entries.
    pub fn vector(&self) -> Result<&[DecisionVariable]> {
        Ok(&self.require(AssemblerState::LayoutsDefined)?.vars)
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize> {
        Ok(self.vector()?.len())
    }

    /// Global index of a state entry, aliases resolved.
    #[must_use]
    pub fn state_index(&self, phase: usize, sample: usize, component: usize) -> Option<usize> {
        self.allocation.as_ref()?.states.get(phase, sample, component)
    }

    /// Global index of a control entry, aliases resolved.
    #[must_use]
    pub fn control_index(&self, phase: usize, sample: usize, component: usize) -> Option<usize> {
        self.allocation.as_ref()?.controls.get(phase, sample, component)
    }

    // ====== Bounds and initial guesses ======

    fn state_grid(layout: &PhaseLayout, kind: InterpolationKind) -> Result<usize> {
        if kind == InterpolationKind::AllPoints {
            if !layout.is_collocation() {
                return Err(OcpError::invalid_config(format!(
                    "AllPoints states in phase {} which is not transcribed by collocation",
                    layout.phase()
                )));
            }
            return Ok(layout.n_state_samples() - 1);
        }
        Ok(layout.n_shooting())
    }

    fn control_grid(layout: &PhaseLayout, kind: InterpolationKind) -> Result<usize> {
        if kind == InterpolationKind::AllPoints {
            return Err(OcpError::invalid_config(format!(
                "AllPoints controls in phase {}",
                layout.phase()
            )));
        }
        Ok(layout.n_control_samples().saturating_sub(1))
    }

    fn check_count<T>(&self, what: &str, items: &[T]) -> Result<()> {
        if items.len() == self.phases.len() {
            Ok(())
        } else {
            Err(OcpError::dimension_mismatch(what, self.phases.len(), items.len()))
        }
    }

    fn update_bound_state(&mut self) {
        let complete = self.state_bounds.is_some() && self.state_init.is_some();
        self.state = if complete {
            AssemblerState::BoundsAndInitDefined
        } else {
            AssemblerState::LayoutsDefined
        };
    }

    /// Bind one state and one control bound series per phase.
    pub fn define_bounds(&mut self, mut states: Vec<Bounds>, mut controls: Vec<Bounds>) -> Result<()> {
        self.require(AssemblerState::LayoutsDefined)?;
        self.check_count("state bounds", &states)?;
        self.check_count("control bounds", &controls)?;
        for (entry, bounds) in self.phases.iter().zip(states.iter_mut()) {
            let grid = Self::state_grid(&entry.layout, bounds.kind())?;
            bounds.check_and_adjust_dimensions(entry.layout.n_states(), grid)?;
        }
        for (entry, bounds) in self.phases.iter().zip(controls.iter_mut()) {
            let grid = Self::control_grid(&entry.layout, bounds.kind())?;
            bounds.check_and_adjust_dimensions(entry.layout.n_controls(), grid)?;
        }
        self.state_bounds = Some(states);
        self.control_bounds = Some(controls);
        self.update_bound_state();
        Ok(())
    }

    /// Bind one state and one control initial guess per phase.
    pub fn define_initial_guess(
        &mut self,
        mut states: Vec<InitialGuess>,
        mut controls: Vec<InitialGuess>,
    ) -> Result<()> {
        self.require(AssemblerState::LayoutsDefined)?;
        self.check_count("state initial guesses", &states)?;
        self.check_count("control initial guesses", &controls)?;
        for (entry, init) in self.phases.iter().zip(states.iter_mut()) {
            let grid = Self::state_grid(&entry.layout, init.kind())?;
            init.check_and_adjust_dimensions(entry.layout.n_states(), grid)?;
        }
        for (entry, init) in self.phases.iter().zip(controls.iter_mut()) {
            let grid = Self::control_grid(&entry.layout, init.kind())?;
            init.check_and_adjust_dimensions(entry.layout.n_controls(), grid)?;
        }
        self.state_init = Some(states);
        self.control_init = Some(controls);
        self.update_bound_state();
        Ok(())
    }

    /// Node at which bounds of state sample `(node, point)` are evaluated.
    fn state_bound_node(node: usize, point: usize) -> f64 {
        if node == 0 && point > 0 {
            1.0
        } else {
            node as f64
        }
    }

    /// Scaled `(lbx, ubx)`.
    pub fn bounds(&self) -> Result<(DVector<f64>, DVector<f64>)> {
        let allocation = self.require(AssemblerState::LayoutsDefined)?;
        let (Some(state_bounds), Some(control_bounds)) = (&self.state_bounds, &self.control_bounds) else {
            return Err(OcpError::InvalidState {
                expected: "bounds defined",
                actual: self.state.name(),
            });
        };
        let n = allocation.vars.len();
        let mut lbx = DVector::from_element(n, f64::NEG_INFINITY);
        let mut ubx = DVector::from_element(n, f64::INFINITY);

        for (p, entry) in self.phases.iter().enumerate() {
            let layout = &entry.layout;
            let bounds = &state_bounds[p];
            for s in 0..layout.n_state_samples() {
                let (node, point) = layout.state_sample_position(s);
                let at = if bounds.kind() == InterpolationKind::AllPoints {
                    s as f64
                } else {
                    Self::state_bound_node(node, point)
                };
                let (min, max) = bounds.evaluate_at(at)?;
                write_owned(allocation, VariableKind::State, p, s, &min, &max, &mut lbx, &mut ubx);
            }
            let bounds = &control_bounds[p];
            for j in 0..layout.n_control_samples() {
                let (min, max) = bounds.evaluate_at(j as f64)?;
                write_owned(allocation, VariableKind::Control, p, j, &min, &max, &mut lbx, &mut ubx);
            }
        }

        let mut g = allocation.parameter_offset;
        for block in &self.parameters {
            for j in 0..block.size() {
                lbx[g] = block.min[j] / block.scaling[j];
                ubx[g] = block.max[j] / block.scaling[j];
                g += 1;
            }
        }

        if let Some(i) = (0..n).find(|&i| lbx[i] > ubx[i]) {
            let var = &allocation.vars[i];
            warn!(
                index = i,
                name = %var.name,
                phase = ?var.phase,
                node = var.node,
                min = lbx[i],
                max = ubx[i],
                "lower bound above upper bound"
            );
        }
        Ok((lbx, ubx))
    }

    /// Scaled initial guess.
    pub fn init(&self) -> Result<DVector<f64>> {
        let allocation = self.require(AssemblerState::LayoutsDefined)?;
        let (Some(state_init), Some(control_init)) = (&self.state_init, &self.control_init) else {
            return Err(OcpError::InvalidState {
                expected: "initial guess defined",
                actual: self.state.name(),
            });
        };
        let n = allocation.vars.len();
        let mut x0 = DVector::zeros(n);

        for (p, entry) in self.phases.iter().enumerate() {
            let layout = &entry.layout;
            let init = &state_init[p];
            let fractions = layout.time_fractions();
            for s in 0..layout.n_state_samples() {
                let (node, point) = layout.state_sample_position(s);
                let value = match init.kind() {
                    InterpolationKind::AllPoints => init.evaluate_at(s as f64)?,
                    InterpolationKind::EachFrame if point > 0 => {
                        let start = init.evaluate_at(node as f64)?;
                        let end = init.evaluate_at((node + 1) as f64)?;
                        let tau = fractions.get(point).copied().unwrap_or(0.0);
                        &start + (end - &start) * tau
                    }
                    _ => init.evaluate_at(Self::state_bound_node(node, point))?,
                };
                write_owned_single(allocation, VariableKind::State, p, s, &value, &mut x0);
            }
            let init = &control_init[p];
            for j in 0..layout.n_control_samples() {
                let value = init.evaluate_at(j as f64)?;
                write_owned_single(allocation, VariableKind::Control, p, j, &value, &mut x0);
            }
        }

        let mut g = allocation.parameter_offset;
        for block in &self.parameters {
            for j in 0..block.size() {
                x0[g] = block.init[j] / block.scaling[j];
                g += 1;
            }
        }
        Ok(x0)
    }

    /// Bounds and initial guess for the solver.
    pub fn assemble(&mut self) -> Result<NlpProblem> {
        self.require(AssemblerState::BoundsAndInitDefined)?;
        let (lbx, ubx) = self.bounds()?;
        let x0 = self.init()?;
        self.state = AssemblerState::VectorReady;
        debug!(len = x0.len(), "nlp problem assembled");
        Ok(NlpProblem { x0, lbx, ubx })
    }

    // ====== Decoding ======

    fn check_len(allocation: &Allocation, flat: &DVector<f64>) -> Result<()> {
        if flat.len() == allocation.vars.len() {
            Ok(())
        } else {
            Err(OcpError::SolutionLength {
                expected: allocation.vars.len(),
                actual: flat.len(),
            })
        }
    }

    /// Split `flat` into named per-phase values.
    pub fn to_dictionaries(&self, flat: &DVector<f64>, space: ValueSpace) -> Result<OcpValues> {
        let allocation = self.require(AssemblerState::LayoutsDefined)?;
        Self::check_len(allocation, flat)?;
        let value = |g: usize| match space {
            ValueSpace::Scaled => flat[g],
            ValueSpace::Physical => flat[g] * allocation.vars[g].scale,
        };

        let mut states = Vec::with_capacity(self.phases.len());
        let mut controls = Vec::with_capacity(self.phases.len());
        for (p, entry) in self.phases.iter().enumerate() {
            let layout = &entry.layout;
            for (kind, set, samples, index, out) in [
                (
                    VariableKind::State,
                    layout.states(),
                    layout.n_state_samples(),
                    &allocation.states,
                    &mut states,
                ),
                (
                    VariableKind::Control,
                    layout.controls(),
                    layout.n_control_samples(),
                    &allocation.controls,
                    &mut controls,
                ),
            ] {
                let mut all = DMatrix::zeros(set.len(), samples);
                for s in 0..samples {
                    for c in 0..set.len() {
                        let g = index
                            .get(p, s, c)
                            .ok_or_else(|| OcpError::unknown(format!("{kind:?} ({p}, {s}, {c})")))?;
                        all[(c, s)] = value(g);
                    }
                }
                let ranges = set
                    .slots()
                    .iter()
                    .map(|slot| (slot.name().to_string(), slot.range().start, slot.size()));
                out.push(VariableData::from_all(all, ranges));
            }
        }

        let n_params = allocation.vars.len() - allocation.parameter_offset;
        let all = DMatrix::from_fn(n_params, 1, |i, _| value(allocation.parameter_offset + i));
        let mut offset = 0;
        let mut ranges = Vec::with_capacity(self.parameters.len());
        for block in &self.parameters {
            ranges.push((block.name.clone(), offset, block.size()));
            offset += block.size();
        }
        let parameters = VariableData::from_all(all, ranges.into_iter());

        Ok(OcpValues {
            states,
            controls,
            parameters,
        })
    }

    /// Flat vector from named values, the inverse of [`to_dictionaries`](Self::to_dictionaries).
    pub fn from_dictionaries(&self, values: &OcpValues, space: ValueSpace) -> Result<DVector<f64>> {
        let allocation = self.require(AssemblerState::LayoutsDefined)?;
        self.check_count("state dictionaries", &values.states)?;
        self.check_count("control dictionaries", &values.controls)?;
        let mut flat = DVector::zeros(allocation.vars.len());
        for (g, var) in allocation.vars.iter().enumerate() {
            let matrix = match (var.kind, var.phase) {
                (VariableKind::State, Some(p)) => &values.states[p].all,
                (VariableKind::Control, Some(p)) => &values.controls[p].all,
                (VariableKind::Parameter, _) => &values.parameters.all,
                (_, None) => return Err(OcpError::unknown(format!("owner of entry {g}"))),
            };
            let (row, col) = match var.kind {
                VariableKind::Parameter => (var.component, 0),
                _ => (var.component, var.sample),
            };
            let v = *matrix.get((row, col)).ok_or_else(|| {
                OcpError::dimension_mismatch(
                    format!("{} values", var.name),
                    row + 1,
                    matrix.nrows(),
                )
            })?;
            flat[g] = match space {
                ValueSpace::Scaled => v,
                ValueSpace::Physical => v / var.scale,
            };
        }
        Ok(flat)
    }

    /// Physical values of a solution.
    pub fn decode(&mut self, flat: &DVector<f64>) -> Result<OcpValues> {
        self.require(AssemblerState::VectorReady)?;
        let values = self.to_dictionaries(flat, ValueSpace::Physical)?;
        self.state = AssemblerState::Decoded;
        Ok(values)
    }

    /// `[0, T_0, T_1, ...]`, optimized durations read from `flat`.
    pub fn extract_phase_time(&self, flat: &DVector<f64>) -> Result<Vec<f64>> {
        let allocation = self.require(AssemblerState::LayoutsDefined)?;
        Self::check_len(allocation, flat)?;
        let mut times = Vec::with_capacity(self.phases.len() + 1);
        times.push(0.0);
        for (p, entry) in self.phases.iter().enumerate() {
            let optimized = allocation.vars[allocation.parameter_offset..]
                .iter()
                .position(|v| v.name == crate::parameters::TIME && v.phase == Some(p))
                .map(|i| allocation.parameter_offset + i);
            times.push(match optimized {
                Some(g) => flat[g] * allocation.vars[g].scale,
                None => entry.layout.config().final_time.nominal(),
            });
        }
        Ok(times)
    }
}

fn controls_start(vars: &[DecisionVariable]) -> usize {
    vars.iter()
        .position(|v| v.kind != VariableKind::State)
        .unwrap_or(vars.len())
}

fn block_of(allocation: &Allocation, kind: VariableKind) -> &BlockIndex {
    match kind {
        VariableKind::State => &allocation.states,
        _ => &allocation.controls,
    }
}

fn is_owner(var: &DecisionVariable, kind: VariableKind, phase: usize, sample: usize) -> bool {
    var.kind == kind && var.phase == Some(phase) && var.sample == sample
}

#[allow(clippy::too_many_arguments)]
fn write_owned(
    allocation: &Allocation,
    kind: VariableKind,
    phase: usize,
    sample: usize,
    min: &DVector<f64>,
    max: &DVector<f64>,
    lbx: &mut DVector<f64>,
    ubx: &mut DVector<f64>,
) {
    let index = block_of(allocation, kind);
    for c in 0..min.len() {
        if let Some(g) = index.get(phase, sample, c) {
            let var = &allocation.vars[g];
            if is_owner(var, kind, phase, sample) {
                lbx[g] = min[c] / var.scale;
                ubx[g] = max[c] / var.scale;
            }
        }
    }
}

fn write_owned_single(
    allocation: &Allocation,
    kind: VariableKind,
    phase: usize,
    sample: usize,
    value: &DVector<f64>,
    out: &mut DVector<f64>,
) {
    let index = block_of(allocation, kind);
    for c in 0..value.len() {
        if let Some(g) = index.get(phase, sample, c) {
            let var = &allocation.vars[g];
            if is_owner(var, kind, phase, sample) {
                out[g] = value[c] / var.scale;
            }
        }
    }
}
