//! Per-phase variable layout.
//!
//! A [`PhaseLayout`] fixes, for one phase, the state and control slots, the
//! number of samples of each, and the optional reuse of another phase's
//! variables:
//!
//! ```text
//! states:   node 0: D+1 samples | node 1: D+1 | ... | node N: 1 sample
//! controls: node 0 .. N−1 (Constant) or 0 .. N (LinearContinuous)
//! ```
//!
//! `D` is the collocation degree (0 outside collocation, so one sample per
//! node).

use ocp_types::{ControlType, OcpError, PhaseConfig, Result, Transcription};
use tracing::debug;

use crate::collocation::time_fractions;
use crate::variable::{SlotDecl, VariableSet};

/// Reuse of another phase's variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSharing {
    /// Phase owning the variables.
    pub source_phase: usize,
    /// Shared components, `None` for all of them.
    pub indices: Option<Vec<usize>>,
}

impl VariableSharing {
    /// Share every component with `source_phase`.
    #[must_use]
    pub fn all(source_phase: usize) -> Self {
        Self {
            source_phase,
            indices: None,
        }
    }

    /// Share the listed components with `source_phase`.
    #[must_use]
    pub fn components(source_phase: usize, indices: Vec<usize>) -> Self {
        Self {
            source_phase,
            indices: Some(indices),
        }
    }

    /// Whether component `c` is shared.
    #[must_use]
    pub fn shares(&self, c: usize) -> bool {
        self.indices.as_ref().map_or(true, |idx| idx.contains(&c))
    }

    fn validate(&self, phase: usize, n: usize, block: &'static str) -> Result<()> {
        if self.source_phase == phase {
            return Err(OcpError::SharingCycle { phase, block });
        }
        if let Some(idx) = &self.indices {
            if let Some(bad) = idx.iter().find(|&&i| i >= n) {
                return Err(OcpError::invalid_config(format!(
                    "phase {phase} shares {block} component {bad}, only {n} exist"
                )));
            }
        }
        Ok(())
    }
}

/// Declarative description of one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSpec {
    /// Phase index.
    pub phase: usize,
    /// Shooting and transcription configuration.
    pub config: PhaseConfig,
    /// State slots, in buffer order.
    pub states: Vec<SlotDecl>,
    /// Control slots, in buffer order.
    pub controls: Vec<SlotDecl>,
    /// States reused from another phase.
    pub state_sharing: Option<VariableSharing>,
    /// Controls reused from another phase.
    pub control_sharing: Option<VariableSharing>,
}

impl PhaseSpec {
    /// A phase without sharing.
    #[must_use]
    pub fn new(phase: usize, config: PhaseConfig, states: Vec<SlotDecl>, controls: Vec<SlotDecl>) -> Self {
        Self {
            phase,
            config,
            states,
            controls,
            state_sharing: None,
            control_sharing: None,
        }
    }

    /// Reuse states of another phase.
    #[must_use]
    pub fn share_states(mut self, sharing: VariableSharing) -> Self {
        self.state_sharing = Some(sharing);
        self
    }

    /// Reuse controls of another phase.
    #[must_use]
    pub fn share_controls(mut self, sharing: VariableSharing) -> Self {
        self.control_sharing = Some(sharing);
        self
    }
}

/// Validated layout of one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseLayout {
    spec: PhaseSpec,
    states: VariableSet,
    controls: VariableSet,
    n_control_samples: usize,
    fractions: Vec<f64>,
}

impl PhaseLayout {
    /// Validate `spec` and lay out its slots.
    pub fn build(spec: PhaseSpec) -> Result<Self> {
        spec.config.validate()?;
        let n_shooting = spec.config.n_shooting;
        let n_control_samples = spec.config.control_type.n_samples(n_shooting).ok_or_else(|| {
            OcpError::not_implemented(format!(
                "control type {:?} (phase {})",
                spec.config.control_type, spec.phase
            ))
        })?;

        let states = VariableSet::build(&spec.states)?;
        let controls = VariableSet::build(&spec.controls)?;
        if let Some(sharing) = &spec.state_sharing {
            sharing.validate(spec.phase, states.len(), "state")?;
        }
        if let Some(sharing) = &spec.control_sharing {
            sharing.validate(spec.phase, controls.len(), "control")?;
        }

        let fractions = match spec.config.transcription {
            Transcription::Collocation {
                polynomial_degree,
                scheme,
                ..
            } => time_fractions(polynomial_degree, scheme)?,
            _ => vec![0.0],
        };

        let layout = Self {
            spec,
            states,
            controls,
            n_control_samples,
            fractions,
        };
        debug!(
            phase = layout.phase(),
            n_states = layout.n_states(),
            n_controls = layout.n_controls(),
            state_samples = layout.n_state_samples(),
            control_samples = layout.n_control_samples(),
            "phase layout built"
        );
        Ok(layout)
    }

    /// Same layout with another control parameterization.
    pub fn with_control_type(&self, control_type: ControlType) -> Result<Self> {
        let mut spec = self.spec.clone();
        spec.config.control_type = control_type;
        Self::build(spec)
    }

    /// Declaration this layout was built from.
    #[must_use]
    pub fn spec(&self) -> &PhaseSpec {
        &self.spec
    }

    /// Phase index.
    #[must_use]
    pub fn phase(&self) -> usize {
        self.spec.phase
    }

    /// Phase configuration.
    #[must_use]
    pub fn config(&self) -> &PhaseConfig {
        &self.spec.config
    }

    /// Number of shooting intervals.
    #[must_use]
    pub fn n_shooting(&self) -> usize {
        self.spec.config.n_shooting
    }

    /// Control parameterization.
    #[must_use]
    pub fn control_type(&self) -> ControlType {
        self.spec.config.control_type
    }

    /// Collocation degree, 0 outside collocation.
    #[must_use]
    pub fn polynomial_degree(&self) -> usize {
        self.spec.config.transcription.polynomial_degree()
    }

    /// Whether the phase is transcribed by collocation.
    #[must_use]
    pub fn is_collocation(&self) -> bool {
        self.spec.config.transcription.is_direct_collocation()
    }

    /// Time fractions of the samples inside one interval, `[0]` outside collocation.
    #[must_use]
    pub fn time_fractions(&self) -> &[f64] {
        &self.fractions
    }

    /// State slots.
    #[must_use]
    pub fn states(&self) -> &VariableSet {
        &self.states
    }

    /// Control slots.
    #[must_use]
    pub fn controls(&self) -> &VariableSet {
        &self.controls
    }

    /// State components per sample.
    #[must_use]
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    /// Control components per sample.
    #[must_use]
    pub fn n_controls(&self) -> usize {
        self.controls.len()
    }

    /// Samples at each non-terminal node.
    #[must_use]
    pub fn samples_per_interval(&self) -> usize {
        self.polynomial_degree() + 1
    }

    /// State samples in the phase.
    #[must_use]
    pub fn n_state_samples(&self) -> usize {
        self.n_shooting() * self.samples_per_interval() + 1
    }

    /// Control samples in the phase.
    #[must_use]
    pub fn n_control_samples(&self) -> usize {
        self.n_control_samples
    }

    /// State samples at `node`.
    #[must_use]
    pub fn samples_at_node(&self, node: usize) -> usize {
        if node < self.n_shooting() {
            self.samples_per_interval()
        } else if node == self.n_shooting() {
            1
        } else {
            0
        }
    }

    /// Flat sample index of sample `p` at `node`.
    #[must_use]
    pub fn state_sample_index(&self, node: usize, p: usize) -> usize {
        node * self.samples_per_interval() + p
    }

    /// `(node, p)` of flat state sample `s`.
    #[must_use]
    pub fn state_sample_position(&self, s: usize) -> (usize, usize) {
        let per = self.samples_per_interval();
        (s / per, s % per)
    }

    /// States reused from another phase.
    #[must_use]
    pub fn state_sharing(&self) -> Option<&VariableSharing> {
        self.spec.state_sharing.as_ref()
    }

    /// Controls reused from another phase.
    #[must_use]
    pub fn control_sharing(&self) -> Option<&VariableSharing> {
        self.spec.control_sharing.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn spec(config: PhaseConfig) -> PhaseSpec {
        PhaseSpec::new(
            0,
            config,
            vec![SlotDecl::new("q", 2), SlotDecl::new("qdot", 2)],
            vec![SlotDecl::new("tau", 2)],
        )
    }

    #[test]
    fn test_control_samples_by_type() {
        let constant = PhaseLayout::build(spec(PhaseConfig::new(3, 1.0))).unwrap();
        assert_eq!(constant.n_control_samples(), 3);
        let linear = constant.with_control_type(ControlType::LinearContinuous).unwrap();
        assert_eq!(linear.n_control_samples(), 4);
        let err = constant
            .with_control_type(ControlType::ConstantWithLastNode)
            .unwrap_err();
        assert!(err.is_not_implemented());
    }

    #[test]
    fn test_collocation_samples() {
        let layout = PhaseLayout::build(spec(
            PhaseConfig::new(5, 1.0).transcription(Transcription::collocation(3)),
        ))
        .unwrap();
        assert_eq!(layout.n_state_samples(), 5 * 4 + 1);
        assert_eq!(layout.samples_at_node(0), 4);
        assert_eq!(layout.samples_at_node(5), 1);
        assert_eq!(layout.time_fractions().len(), 4);
        assert_eq!(layout.state_sample_position(layout.state_sample_index(2, 3)), (2, 3));
        assert_eq!(layout.state_sample_position(20), (5, 0));
    }

    #[test]
    fn test_self_sharing_is_a_cycle() {
        let err = PhaseLayout::build(spec(PhaseConfig::new(3, 1.0)).share_states(VariableSharing::all(0)))
            .unwrap_err();
        assert!(matches!(err, OcpError::SharingCycle { phase: 0, .. }));
    }

    #[test]
    fn test_sharing_indices_checked() {
        let mut s = spec(PhaseConfig::new(3, 1.0)).share_controls(VariableSharing::components(1, vec![5]));
        s.phase = 2;
        assert!(PhaseLayout::build(s).unwrap_err().is_config_error());
    }
}
