//! Per-actuator fatigue groups.
//!
//! A [`FatigueGroup`] holds one [`MultiFatigueModel`] per actuator of a
//! target (`tau` or `muscles`). Members must agree on their suffixes, law
//! capabilities and flags so the group can be laid out as whole slots:
//!
//! ```text
//! slot                     rows
//! tau_minus_ma   [a0 a1 a2]
//! tau_minus_mr   [a0 a1 a2]
//! tau_minus_mf   [a0 a1 a2]
//! tau_plus_ma    [a0 a1 a2]
//! ...
//! ```
//!
//! i.e. suffix-major, then law state, then actuator.

use nalgebra::DVector;
use ocp_types::{OcpError, Result};
use tracing::debug;

use crate::law::{FatigueCapabilities, FatigueLaw, FatigueSource, FatigueTarget};
use crate::multi::MultiFatigueModel;

/// One fatigue state slot of a group, with per-actuator defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct FatigueStateSlot {
    /// Slot name (`tau_minus_ma`, `muscles_mf`, ...).
    pub name: String,
    /// Lower bound per actuator.
    pub min: Vec<f64>,
    /// Upper bound per actuator.
    pub max: Vec<f64>,
    /// Initial guess per actuator.
    pub init: Vec<f64>,
}

impl FatigueStateSlot {
    /// Number of actuators.
    #[must_use]
    pub fn size(&self) -> usize {
        self.init.len()
    }
}

/// Fatigue models of every actuator of one target.
#[derive(Debug, Clone)]
pub struct FatigueGroup {
    target: FatigueTarget,
    members: Vec<Option<MultiFatigueModel>>,
}

impl FatigueGroup {
    /// Empty group for `target`.
    #[must_use]
    pub fn new(target: FatigueTarget) -> Self {
        Self {
            target,
            members: Vec::new(),
        }
    }

    /// Target of this group.
    #[must_use]
    pub fn target(&self) -> FatigueTarget {
        self.target
    }

    /// Number of actuator slots (including unfilled ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no actuator has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Append a model for the next actuator.
    pub fn push(&mut self, model: MultiFatigueModel) {
        self.members.push(Some(model));
    }

    /// Place a model at `actuator`, replacing any previous one.
    pub fn insert(&mut self, model: MultiFatigueModel, actuator: usize) {
        if actuator >= self.members.len() {
            self.members.resize(actuator + 1, None);
        }
        self.members[actuator] = Some(model);
    }

    /// Model of `actuator`.
    #[must_use]
    pub fn get(&self, actuator: usize) -> Option<&MultiFatigueModel> {
        self.members.get(actuator).and_then(Option::as_ref)
    }

    fn first(&self) -> Result<&MultiFatigueModel> {
        self.get(0).ok_or_else(|| {
            OcpError::invalid_config(format!("fatigue group {} has no model for actuator 0", self.target))
        })
    }

    fn heterogeneous(&self, reason: impl Into<String>) -> OcpError {
        OcpError::HeterogeneousFatigue {
            group: self.target.key().to_string(),
            reason: reason.into(),
        }
    }

    /// Check that every actuator has a model and that all models agree.
    pub fn validate(&self) -> Result<()> {
        let first = self.first()?;
        let suffixes: Vec<&str> = first.suffixes().collect();
        let caps: Vec<FatigueCapabilities> = first.laws().map(|(_, l)| l.capabilities()).collect();

        for (i, member) in self.members.iter().enumerate() {
            let member = member.as_ref().ok_or_else(|| {
                OcpError::invalid_config(format!(
                    "fatigue group {} has no model for actuator {i}",
                    self.target
                ))
            })?;
            member.validate()?;

            if member.target() != self.target {
                return Err(self.heterogeneous(format!(
                    "actuator {i} targets {} instead of {}",
                    member.target(),
                    self.target
                )));
            }
            if member.suffixes().ne(suffixes.iter().copied()) {
                return Err(self.heterogeneous(format!("actuator {i} declares different suffixes")));
            }
            if member.is_state_only() != first.is_state_only() {
                return Err(self.heterogeneous("state_only must be the same for every actuator"));
            }
            if member.applies_to_joint_dynamics() != first.applies_to_joint_dynamics() {
                return Err(self.heterogeneous(
                    "apply_to_joint_dynamics must be the same for every actuator",
                ));
            }
            if member.splits_controls() != first.splits_controls() {
                return Err(self.heterogeneous("split_controls must be the same for every actuator"));
            }
            for ((_, law), expected) in member.laws().zip(&caps) {
                let actual = law.capabilities();
                if actual.dynamics_suffix != expected.dynamics_suffix
                    || actual.fatigue_suffix != expected.fatigue_suffix
                {
                    return Err(self.heterogeneous(format!(
                        "actuator {i} mixes dynamics/fatigue suffixes ({}/{} vs {}/{})",
                        actual.dynamics_suffix,
                        actual.fatigue_suffix,
                        expected.dynamics_suffix,
                        expected.fatigue_suffix
                    )));
                }
                if actual != *expected {
                    return Err(self.heterogeneous(format!(
                        "actuator {i} uses law {} where {} is expected",
                        actual.type_name, expected.type_name
                    )));
                }
            }
        }

        if self.target == FatigueTarget::Torque && first.applies_to_joint_dynamics() {
            return Err(OcpError::not_implemented(
                "apply_to_joint_dynamics for torque fatigue",
            ));
        }

        debug!(
            group = %self.target,
            actuators = self.members.len(),
            rows = self.n_rows(),
            "fatigue group validated"
        );
        Ok(())
    }

    // ====== Shared flags (read from actuator 0) ======

    /// Whether fatigue states only observe the actuators.
    #[must_use]
    pub fn is_state_only(&self) -> bool {
        self.get(0).is_some_and(MultiFatigueModel::is_state_only)
    }

    /// Whether the fatigued fraction reduces the actuator output.
    #[must_use]
    pub fn applies_to_joint_dynamics(&self) -> bool {
        self.get(0).is_some_and(MultiFatigueModel::applies_to_joint_dynamics)
    }

    /// Whether each suffix has its own control.
    #[must_use]
    pub fn splits_controls(&self) -> bool {
        self.get(0).is_some_and(MultiFatigueModel::splits_controls)
    }

    /// Suffixes in declaration order.
    #[must_use]
    pub fn suffixes(&self) -> Vec<String> {
        self.get(0)
            .map(|m| m.suffixes().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Number of fatigue rows appended to the dynamics.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.get(0).map_or(0, |m| m.n_states() * self.members.len())
    }

    // ====== Layout ======

    /// State slots in row order, with per-actuator bounds and initial guesses.
    pub fn state_slots(&self) -> Result<Vec<FatigueStateSlot>> {
        let first = self.first()?;
        let mut slots = Vec::with_capacity(first.n_states());
        for (suffix, law) in first.laws() {
            for (k, state) in law.state_suffixes().iter().enumerate() {
                let mut slot = FatigueStateSlot {
                    name: first.state_name(suffix, state),
                    min: Vec::with_capacity(self.len()),
                    max: Vec::with_capacity(self.len()),
                    init: Vec::with_capacity(self.len()),
                };
                for actuator in 0..self.len() {
                    let member_law = self.member_law(actuator, suffix)?;
                    let (min, max) = member_law.default_bounds();
                    let init = member_law.default_initial_guess();
                    slot.min.push(min.get(k).copied().unwrap_or(f64::NEG_INFINITY));
                    slot.max.push(max.get(k).copied().unwrap_or(f64::INFINITY));
                    slot.init.push(init.get(k).copied().unwrap_or(0.0));
                }
                slots.push(slot);
            }
        }
        Ok(slots)
    }

    /// Extra control slots introduced by split torque controls.
    #[must_use]
    pub fn control_slots(&self) -> Vec<String> {
        match self.get(0) {
            Some(first) if self.target == FatigueTarget::Torque && first.splits_controls() => {
                first.suffixes().map(|s| first.control_name(s)).collect()
            }
            _ => Vec::new(),
        }
    }

    fn member_law(&self, actuator: usize, suffix: &str) -> Result<&dyn FatigueLaw> {
        self.get(actuator)
            .and_then(|m| m.law(suffix))
            .ok_or_else(|| OcpError::unknown(format!("{}[{actuator}] {suffix}", self.target)))
    }

    // ====== Dynamics ======

    /// Append the group's fatigue derivatives to `dxdt`.
    pub fn dynamics(&self, dxdt: DVector<f64>, source: &dyn FatigueSource) -> Result<DVector<f64>> {
        // actuator -> suffix -> law state
        let per_actuator: Vec<Vec<Vec<f64>>> = (0..self.len())
            .map(|a| {
                self.get(a)
                    .ok_or_else(|| OcpError::unknown(format!("{}[{a}]", self.target)))?
                    .derivatives(a, source)
            })
            .collect::<Result<_>>()?;

        let n_rows = self.n_rows();
        let base = dxdt.len();
        let mut out = dxdt.resize_vertically(base + n_rows, 0.0);
        let mut row = base;
        let first = self.first()?;
        for (s, (_, law)) in first.laws().enumerate() {
            for k in 0..law.n_states() {
                for derivatives in &per_actuator {
                    out[row] = derivatives[s][k];
                    row += 1;
                }
            }
        }
        Ok(out)
    }

    /// Generalized torque after fatigue.
    ///
    /// Without split controls `tau` is returned unchanged. In state-only mode
    /// the split controls are summed. Otherwise each suffix contributes its
    /// dynamics state times the law scaling.
    pub fn fatigable_tau(&self, tau: &DVector<f64>, source: &dyn FatigueSource) -> Result<DVector<f64>> {
        if !self.splits_controls() {
            return Ok(tau.clone());
        }
        let state_only = self.is_state_only();
        let mut out = DVector::zeros(tau.len());
        for i in 0..tau.len().min(self.len()) {
            let member = self
                .get(i)
                .ok_or_else(|| OcpError::unknown(format!("tau[{i}]")))?;
            for (suffix, law) in member.laws() {
                out[i] += if state_only {
                    source.control(&member.control_name(suffix), i)?
                } else {
                    source.state(&member.state_name(suffix, law.dynamics_suffix()), i)? * law.scaling()
                };
            }
        }
        Ok(out)
    }

    /// Muscle activations after fatigue.
    ///
    /// In state-only mode `activations` is returned unchanged. Otherwise the
    /// dynamics state replaces it, multiplied by `1 − fatigue` when the group
    /// applies to the joint dynamics.
    pub fn fatigable_activations(
        &self,
        activations: &DVector<f64>,
        source: &dyn FatigueSource,
    ) -> Result<DVector<f64>> {
        if self.is_state_only() {
            return Ok(activations.clone());
        }
        let apply = self.applies_to_joint_dynamics();
        let mut out = activations.clone();
        for i in 0..activations.len().min(self.len()) {
            let member = self
                .get(i)
                .ok_or_else(|| OcpError::unknown(format!("muscles[{i}]")))?;
            let (suffix, law) = member
                .laws()
                .next()
                .ok_or_else(|| OcpError::invalid_config("muscle fatigue without law"))?;
            let mut a = source.state(&member.state_name(suffix, law.dynamics_suffix()), i)?;
            if apply {
                a *= 1.0 - source.state(&member.state_name(suffix, law.fatigue_suffix()), i)?;
            }
            out[i] = a;
        }
        Ok(out)
    }
}

/// Fatigue groups of a phase, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FatigueList {
    groups: Vec<FatigueGroup>,
}

impl FatigueList {
    /// Empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn group_mut(&mut self, target: FatigueTarget) -> &mut FatigueGroup {
        let index = match self.groups.iter().position(|g| g.target == target) {
            Some(index) => index,
            None => {
                self.groups.push(FatigueGroup::new(target));
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }

    /// Append `model` as the next actuator of its target group.
    pub fn add(&mut self, model: MultiFatigueModel) {
        self.group_mut(model.target()).push(model);
    }

    /// Place `model` at `actuator` in its target group.
    pub fn insert(&mut self, model: MultiFatigueModel, actuator: usize) {
        self.group_mut(model.target()).insert(model, actuator);
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, model: MultiFatigueModel) -> Self {
        self.add(model);
        self
    }

    /// Group for `target`.
    #[must_use]
    pub fn group(&self, target: FatigueTarget) -> Option<&FatigueGroup> {
        self.groups.iter().find(|g| g.target == target)
    }

    /// Whether a group exists for `target`.
    #[must_use]
    pub fn contains(&self, target: FatigueTarget) -> bool {
        self.group(target).is_some()
    }

    /// Groups in declaration order.
    pub fn groups(&self) -> impl Iterator<Item = &FatigueGroup> {
        self.groups.iter()
    }

    /// Whether the list has no group.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Validate every group.
    pub fn validate(&self) -> Result<()> {
        self.groups.iter().try_for_each(FatigueGroup::validate)
    }

    /// Total number of fatigue rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.groups.iter().map(FatigueGroup::n_rows).sum()
    }

    /// Append the derivatives of every group, in declaration order.
    pub fn dynamics(&self, dxdt: DVector<f64>, source: &dyn FatigueSource) -> Result<DVector<f64>> {
        self.groups
            .iter()
            .try_fold(dxdt, |acc, group| group.dynamics(acc, source))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::effort::EffortPerception;
    use crate::test_support::Source;
    use crate::xia::XiaFatigue;
    use approx::assert_relative_eq;

    fn torque_list(n: usize) -> FatigueList {
        let mut list = FatigueList::new();
        for _ in 0..n {
            list.add(MultiFatigueModel::xia_torque(XiaFatigue::default(), 10.0));
        }
        list
    }

    #[test]
    fn test_heterogeneous_state_only_rejected() {
        let mut list = torque_list(1);
        list.add(MultiFatigueModel::xia_torque(XiaFatigue::default(), 10.0).state_only(true));
        let err = list.validate().unwrap_err();
        assert!(err.is_config_error());
        assert!(matches!(err, OcpError::HeterogeneousFatigue { .. }));
    }

    #[test]
    fn test_torque_apply_to_joint_dynamics_not_implemented() {
        let list = FatigueList::new()
            .with(MultiFatigueModel::xia_torque(XiaFatigue::default(), 1.0).apply_to_joint_dynamics(true));
        assert!(list.validate().unwrap_err().is_not_implemented());
    }

    #[test]
    fn test_mixed_laws_rejected() {
        let list = FatigueList::new()
            .with(MultiFatigueModel::muscle(XiaFatigue::default()).state_only(true))
            .with(MultiFatigueModel::muscle(EffortPerception::default()));
        assert!(list.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_gap_rejected() {
        let mut list = FatigueList::new();
        list.insert(MultiFatigueModel::muscle(XiaFatigue::default()), 1);
        assert!(list.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_state_slots_are_suffix_major() {
        let list = torque_list(2);
        let slots = list.group(FatigueTarget::Torque).unwrap().state_slots().unwrap();
        let names: Vec<_> = slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "tau_minus_ma",
                "tau_minus_mr",
                "tau_minus_mf",
                "tau_plus_ma",
                "tau_plus_mr",
                "tau_plus_mf"
            ]
        );
        assert_eq!(slots[1].init, vec![1.0, 1.0]);
        assert_eq!(slots[0].size(), 2);
    }

    #[test]
    fn test_group_rows_are_actuator_minor() {
        let mut list = FatigueList::new();
        for _ in 0..2 {
            list.add(MultiFatigueModel::muscle(EffortPerception::new(0.0, 1.0, 1.0)));
        }
        let mut source = Source::default();
        source.controls.insert("muscles".into(), vec![0.2, 0.6]);
        source.states.insert("muscles_mf".into(), vec![0.0, 0.0]);

        let out = list.dynamics(DVector::from_vec(vec![1.0]), &source).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], 1.0);
        assert_relative_eq!(out[1], 0.2, epsilon = 1e-12);
        assert_relative_eq!(out[2], 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_fatigable_tau() {
        let list = torque_list(2);
        let group = list.group(FatigueTarget::Torque).unwrap();
        let mut source = Source::default();
        source.states.insert("tau_minus_ma".into(), vec![0.5, 0.0]);
        source.states.insert("tau_plus_ma".into(), vec![0.0, 0.3]);
        source.controls.insert("tau_minus".into(), vec![-1.0, 0.0]);
        source.controls.insert("tau_plus".into(), vec![0.0, 2.0]);

        let tau = group.fatigable_tau(&DVector::zeros(2), &source).unwrap();
        assert_relative_eq!(tau[0], -5.0, epsilon = 1e-12);
        assert_relative_eq!(tau[1], 3.0, epsilon = 1e-12);

        let state_only = FatigueList::new()
            .with(MultiFatigueModel::xia_torque(XiaFatigue::default(), 10.0).state_only(true))
            .with(MultiFatigueModel::xia_torque(XiaFatigue::default(), 10.0).state_only(true));
        let tau = state_only
            .group(FatigueTarget::Torque)
            .unwrap()
            .fatigable_tau(&DVector::zeros(2), &source)
            .unwrap();
        assert_eq!(tau.as_slice(), &[-1.0, 2.0]);
    }

    #[test]
    fn test_fatigable_activations() {
        let list = FatigueList::new().with(
            MultiFatigueModel::muscle(XiaFatigue::default()).apply_to_joint_dynamics(true),
        );
        let group = list.group(FatigueTarget::Muscle).unwrap();
        let mut source = Source::default();
        source.states.insert("muscles_ma".into(), vec![0.8]);
        source.states.insert("muscles_mf".into(), vec![0.25]);
        let a = group
            .fatigable_activations(&DVector::from_vec(vec![0.1]), &source)
            .unwrap();
        assert_relative_eq!(a[0], 0.6, epsilon = 1e-12);
    }
}
