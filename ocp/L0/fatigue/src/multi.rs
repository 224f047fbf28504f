//! Fatigue of one actuator, possibly made of several laws.
//!
//! A torque actuator is usually fatigued separately in each direction: one
//! law for the negative half (`minus`) and one for the positive half
//! (`plus`). A muscle has a single law (`fatigue`). Each `(suffix, law)` pair
//! contributes the law's states to the phase, and the suffixes are processed
//! in declaration order everywhere.

use std::sync::Arc;

use nalgebra::DVector;
use ocp_types::{OcpError, Result};

use crate::law::{FatigueLaw, FatigueSource, FatigueTarget};
use crate::xia::XiaFatigue;

/// Fatigue model of a single actuator.
#[derive(Debug, Clone)]
pub struct MultiFatigueModel {
    target: FatigueTarget,
    models: Vec<(String, Arc<dyn FatigueLaw>)>,
    state_only: bool,
    apply_to_joint_dynamics: bool,
    split_controls: bool,
}

impl MultiFatigueModel {
    /// Suffixes of a two-sided torque model.
    pub const TORQUE_SUFFIXES: [&'static str; 2] = ["minus", "plus"];

    /// Suffix of a muscle model.
    pub const MUSCLE_SUFFIX: &'static str = "fatigue";

    /// Two-sided torque fatigue. `minus` should carry a negative scaling.
    #[must_use]
    pub fn torque(minus: impl FatigueLaw + 'static, plus: impl FatigueLaw + 'static) -> Self {
        let state_only = minus.default_state_only();
        let apply_to_joint_dynamics = minus.default_apply_to_joint_dynamics();
        Self {
            target: FatigueTarget::Torque,
            models: vec![
                (Self::TORQUE_SUFFIXES[0].to_string(), Arc::new(minus)),
                (Self::TORQUE_SUFFIXES[1].to_string(), Arc::new(plus)),
            ],
            state_only,
            apply_to_joint_dynamics,
            split_controls: true,
        }
    }

    /// Two-sided Xia torque fatigue with symmetric limits `±tau_max`.
    #[must_use]
    pub fn xia_torque(law: XiaFatigue, tau_max: f64) -> Self {
        Self::torque(law.with_scaling(-tau_max), law.with_scaling(tau_max))
    }

    /// Muscle fatigue with a single law.
    #[must_use]
    pub fn muscle(law: impl FatigueLaw + 'static) -> Self {
        Self {
            target: FatigueTarget::Muscle,
            state_only: law.default_state_only(),
            apply_to_joint_dynamics: law.default_apply_to_joint_dynamics(),
            models: vec![(Self::MUSCLE_SUFFIX.to_string(), Arc::new(law))],
            split_controls: false,
        }
    }

    /// Custom suffix/law list for `target`.
    ///
    /// Flags default to the first law's defaults.
    pub fn from_laws(
        target: FatigueTarget,
        laws: Vec<(String, Arc<dyn FatigueLaw>)>,
    ) -> Result<Self> {
        let first = laws
            .first()
            .ok_or_else(|| OcpError::invalid_config("a fatigue model needs at least one law"))?;
        let state_only = first.1.default_state_only();
        let apply_to_joint_dynamics = first.1.default_apply_to_joint_dynamics();
        Ok(Self {
            target,
            models: laws,
            state_only,
            apply_to_joint_dynamics,
            split_controls: target == FatigueTarget::Torque,
        })
    }

    /// Set whether fatigue states only observe the actuator.
    #[must_use]
    pub fn state_only(mut self, state_only: bool) -> Self {
        self.state_only = state_only;
        self
    }

    /// Set whether the fatigued fraction reduces the actuator output.
    #[must_use]
    pub fn apply_to_joint_dynamics(mut self, apply: bool) -> Self {
        self.apply_to_joint_dynamics = apply;
        self
    }

    /// Set whether each suffix has its own control.
    #[must_use]
    pub fn split_controls(mut self, split: bool) -> Self {
        self.split_controls = split;
        self
    }

    // ====== Accessors ======

    /// Actuator family.
    #[must_use]
    pub fn target(&self) -> FatigueTarget {
        self.target
    }

    /// Whether fatigue states only observe the actuator.
    #[must_use]
    pub fn is_state_only(&self) -> bool {
        self.state_only
    }

    /// Whether the fatigued fraction reduces the actuator output.
    #[must_use]
    pub fn applies_to_joint_dynamics(&self) -> bool {
        self.apply_to_joint_dynamics
    }

    /// Whether each suffix has its own control.
    #[must_use]
    pub fn splits_controls(&self) -> bool {
        self.split_controls
    }

    /// Suffixes in declaration order.
    pub fn suffixes(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|(s, _)| s.as_str())
    }

    /// `(suffix, law)` pairs in declaration order.
    pub fn laws(&self) -> impl Iterator<Item = (&str, &dyn FatigueLaw)> {
        self.models.iter().map(|(s, l)| (s.as_str(), l.as_ref()))
    }

    /// Law registered under `suffix`.
    #[must_use]
    pub fn law(&self, suffix: &str) -> Option<&dyn FatigueLaw> {
        self.models
            .iter()
            .find(|(s, _)| s == suffix)
            .map(|(_, l)| l.as_ref())
    }

    /// Number of fatigue states of this actuator.
    #[must_use]
    pub fn n_states(&self) -> usize {
        self.models.iter().map(|(_, l)| l.n_states()).sum()
    }

    // ====== Naming ======

    /// State slot name of `state` under `suffix`.
    #[must_use]
    pub fn state_name(&self, suffix: &str, state: &str) -> String {
        match self.target {
            FatigueTarget::Torque => format!("tau_{suffix}_{state}"),
            FatigueTarget::Muscle => format!("muscles_{state}"),
        }
    }

    /// Control slot name driving `suffix`.
    #[must_use]
    pub fn control_name(&self, suffix: &str) -> String {
        match self.target {
            FatigueTarget::Torque if self.split_controls => format!("tau_{suffix}"),
            _ => self.target.key().to_string(),
        }
    }

    // ====== Dynamics ======

    /// Normalized load of `law` for `actuator`.
    ///
    /// With a shared (unsplit) torque control, each law only sees the half of
    /// the command matching the sign of its scaling.
    pub fn target_load(
        &self,
        suffix: &str,
        law: &dyn FatigueLaw,
        actuator: usize,
        source: &dyn FatigueSource,
    ) -> Result<f64> {
        let mut command = source.control(&self.control_name(suffix), actuator)?;
        if self.target == FatigueTarget::Torque && !self.split_controls {
            command = if law.scaling() < 0.0 {
                command.min(0.0)
            } else {
                command.max(0.0)
            };
        }
        Ok(command / law.scaling())
    }

    /// Current values of the states of `law` for `actuator`.
    pub fn law_states(
        &self,
        suffix: &str,
        law: &dyn FatigueLaw,
        actuator: usize,
        source: &dyn FatigueSource,
    ) -> Result<Vec<f64>> {
        law.state_suffixes()
            .iter()
            .map(|state| source.state(&self.state_name(suffix, state), actuator))
            .collect()
    }

    /// Derivatives of every fatigue state of `actuator`, suffix by suffix.
    pub fn derivatives(&self, actuator: usize, source: &dyn FatigueSource) -> Result<Vec<Vec<f64>>> {
        self.laws()
            .map(|(suffix, law)| {
                let load = self.target_load(suffix, law, actuator, source)?;
                let states = self.law_states(suffix, law, actuator, source)?;
                Ok(law.apply_dynamics(load, &states))
            })
            .collect()
    }

    /// Append this actuator's fatigue derivatives to `dxdt`.
    pub fn dynamics(
        &self,
        dxdt: DVector<f64>,
        actuator: usize,
        source: &dyn FatigueSource,
    ) -> Result<DVector<f64>> {
        let extra: Vec<f64> = self.derivatives(actuator, source)?.concat();
        let base = dxdt.len();
        let mut out = dxdt.resize_vertically(base + extra.len(), 0.0);
        out.rows_mut(base, extra.len()).copy_from_slice(&extra);
        Ok(out)
    }

    /// Check scalings and state sizes.
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(OcpError::invalid_config("a fatigue model needs at least one law"));
        }
        for (suffix, law) in &self.models {
            let scaling = law.scaling();
            if scaling == 0.0 || !scaling.is_finite() {
                return Err(OcpError::InvalidScaling {
                    name: self.control_name(suffix),
                    index: 0,
                    value: scaling,
                });
            }
            let (min, max) = law.default_bounds();
            let n = law.n_states();
            if min.len() != n || max.len() != n || law.default_initial_guess().len() != n {
                return Err(OcpError::dimension_mismatch(
                    format!("{} fatigue defaults", law.type_name()),
                    n,
                    min.len(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::effort::EffortPerception;
    use approx::assert_relative_eq;
    use crate::test_support::Source;

    #[test]
    fn test_torque_naming() {
        let model = MultiFatigueModel::xia_torque(XiaFatigue::default(), 5.0);
        assert_eq!(model.suffixes().collect::<Vec<_>>(), vec!["minus", "plus"]);
        assert_eq!(model.state_name("minus", "ma"), "tau_minus_ma");
        assert_eq!(model.control_name("plus"), "tau_plus");
        assert_eq!(model.clone().split_controls(false).control_name("plus"), "tau");
        assert_eq!(model.n_states(), 6);
    }

    #[test]
    fn test_muscle_naming() {
        let model = MultiFatigueModel::muscle(XiaFatigue::default());
        assert_eq!(model.state_name("fatigue", "mf"), "muscles_mf");
        assert_eq!(model.control_name("fatigue"), "muscles");
    }

    #[test]
    fn test_unsplit_torque_load_uses_signed_half() {
        let model = MultiFatigueModel::xia_torque(XiaFatigue::default(), 10.0).split_controls(false);
        let mut source = Source::default();
        source.controls.insert("tau".into(), vec![-4.0]);
        let minus = model.law("minus").unwrap();
        let plus = model.law("plus").unwrap();
        assert_relative_eq!(model.target_load("minus", minus, 0, &source).unwrap(), 0.4);
        assert_relative_eq!(model.target_load("plus", plus, 0, &source).unwrap(), 0.0);
    }

    #[test]
    fn test_dynamics_appends_rows_in_suffix_order() {
        let model = MultiFatigueModel::torque(
            EffortPerception::new(0.0, 1.0, -2.0),
            EffortPerception::new(0.0, 1.0, 2.0),
        );
        let mut source = Source::default();
        source.controls.insert("tau_minus".into(), vec![-1.0]);
        source.controls.insert("tau_plus".into(), vec![0.5]);
        source.states.insert("tau_minus_mf".into(), vec![0.0]);
        source.states.insert("tau_plus_mf".into(), vec![0.0]);

        let base = DVector::from_vec(vec![7.0, 8.0]);
        let out = model.dynamics(base, 0, &source).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 7.0);
        assert_eq!(out[1], 8.0);
        assert_relative_eq!(out[2], 0.5, epsilon = 1e-12);
        assert_relative_eq!(out[3], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_scaling_rejected() {
        let model = MultiFatigueModel::muscle(XiaFatigue::default().with_scaling(0.0));
        assert!(model.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_defaults_follow_law() {
        assert!(MultiFatigueModel::muscle(EffortPerception::default()).is_state_only());
        assert!(!MultiFatigueModel::muscle(XiaFatigue::default()).is_state_only());
    }
}
