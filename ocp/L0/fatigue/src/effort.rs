//! Single-state perceived-effort law.
//!
//! Perceived effort `mf` rises while the load exceeds a threshold and decays
//! otherwise:
//!
//! ```text
//! load = |TL|
//! dmf/dt = k · (load − θ) / (1 − θ) · (1 − mf)   if load > θ
//!        = −k · mf                                otherwise
//! ```

use crate::law::FatigueLaw;

/// Perceived-effort law with one state (`mf`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffortPerception {
    /// Load fraction above which effort accumulates, in `[0, 1)`.
    pub effort_threshold: f64,
    /// Accumulation and decay rate (1/s).
    pub effort_factor: f64,
    /// Command-to-load factor.
    pub scaling: f64,
}

impl Default for EffortPerception {
    fn default() -> Self {
        Self {
            effort_threshold: 0.2,
            effort_factor: 0.1,
            scaling: 1.0,
        }
    }
}

impl EffortPerception {
    const STATES: [&'static str; 1] = ["mf"];

    /// Create a perceived-effort law.
    #[must_use]
    pub fn new(effort_threshold: f64, effort_factor: f64, scaling: f64) -> Self {
        Self {
            effort_threshold,
            effort_factor,
            scaling,
        }
    }

    /// Same law, different scaling.
    #[must_use]
    pub fn with_scaling(mut self, scaling: f64) -> Self {
        self.scaling = scaling;
        self
    }
}

impl FatigueLaw for EffortPerception {
    fn type_name(&self) -> &'static str {
        "effort"
    }

    fn state_suffixes(&self) -> &'static [&'static str] {
        &Self::STATES
    }

    fn dynamics_suffix(&self) -> &'static str {
        "mf"
    }

    fn fatigue_suffix(&self) -> &'static str {
        "mf"
    }

    fn scaling(&self) -> f64 {
        self.scaling
    }

    fn default_state_only(&self) -> bool {
        true
    }

    fn default_apply_to_joint_dynamics(&self) -> bool {
        false
    }

    fn default_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        (vec![0.0], vec![1.0])
    }

    fn default_initial_guess(&self) -> Vec<f64> {
        vec![0.0]
    }

    fn apply_dynamics(&self, target_load: f64, states: &[f64]) -> Vec<f64> {
        let mf = states.first().copied().unwrap_or(0.0);
        let load = target_load.abs();
        let delta = load - self.effort_threshold;
        let dmf = if delta > 0.0 {
            self.effort_factor * delta / (1.0 - self.effort_threshold) * (1.0 - mf)
        } else {
            -self.effort_factor * mf
        };
        vec![dmf]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_effort_grows_above_threshold() {
        let law = EffortPerception::new(0.2, 1.0, 1.0);
        let d = law.apply_dynamics(0.6, &[0.0]);
        assert_relative_eq!(d[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_effort_decays_below_threshold() {
        let law = EffortPerception::new(0.2, 0.5, 1.0);
        let d = law.apply_dynamics(0.1, &[0.4]);
        assert_relative_eq!(d[0], -0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_load_uses_magnitude() {
        let law = EffortPerception::new(0.2, 1.0, -1.0);
        assert_eq!(law.apply_dynamics(-0.6, &[0.3]), law.apply_dynamics(0.6, &[0.3]));
    }
}
