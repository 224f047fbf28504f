//! The fatigue law interface.
//!
//! A fatigue law is a first-order model of how an actuator's capacity
//! degrades and recovers. It owns a fixed list of states (for example the
//! active/resting/fatigued fractions of a motor-unit pool) and returns their
//! time derivatives for a given target load.
//!
//! ```text
//! target load ──► ┌────────────┐
//!                 │ FatigueLaw │ ──► d(states)/dt
//! states ───────► └────────────┘
//! ```
//!
//! Laws are registered by capability, not by type: groups compare
//! [`FatigueCapabilities`] to decide whether their members are compatible.

use std::fmt;

use ocp_types::Result;

/// Actuator family a fatigue group applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FatigueTarget {
    /// Generalized torque actuators (slot `tau`).
    Torque,
    /// Muscles (slot `muscles`).
    Muscle,
}

impl FatigueTarget {
    /// Name of the actuator slot this target reads from.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Torque => "tau",
            Self::Muscle => "muscles",
        }
    }
}

impl fmt::Display for FatigueTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// What a law declares about itself, compared across group members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatigueCapabilities {
    /// Law type tag.
    pub type_name: &'static str,
    /// State names in row order.
    pub state_suffixes: &'static [&'static str],
    /// State carrying the effective activation.
    pub dynamics_suffix: &'static str,
    /// State carrying the fatigued fraction.
    pub fatigue_suffix: &'static str,
}

/// A first-order fatigue law for one actuator.
pub trait FatigueLaw: fmt::Debug + Send + Sync {
    /// Type tag (`"xia"`, `"effort"`, ...).
    fn type_name(&self) -> &'static str;

    /// Names of the law's states, in derivative row order.
    fn state_suffixes(&self) -> &'static [&'static str];

    /// The state that replaces the actuator activation in the dynamics.
    fn dynamics_suffix(&self) -> &'static str;

    /// The state that holds the fatigued fraction.
    fn fatigue_suffix(&self) -> &'static str;

    /// Factor converting the actuator command into a normalized load.
    fn scaling(&self) -> f64;

    /// Default for `state_only` when the caller does not choose.
    fn default_state_only(&self) -> bool;

    /// Default for `apply_to_joint_dynamics` when the caller does not choose.
    fn default_apply_to_joint_dynamics(&self) -> bool;

    /// Default `(min, max)` bounds, one entry per state.
    fn default_bounds(&self) -> (Vec<f64>, Vec<f64>);

    /// Default initial guess, one entry per state.
    fn default_initial_guess(&self) -> Vec<f64>;

    /// State derivatives for a normalized target load.
    ///
    /// `states` has one entry per [`state_suffixes`](Self::state_suffixes)
    /// entry and the result has the same length.
    fn apply_dynamics(&self, target_load: f64, states: &[f64]) -> Vec<f64>;

    /// Number of states.
    fn n_states(&self) -> usize {
        self.state_suffixes().len()
    }

    /// Capabilities used for homogeneity checks.
    fn capabilities(&self) -> FatigueCapabilities {
        FatigueCapabilities {
            type_name: self.type_name(),
            state_suffixes: self.state_suffixes(),
            dynamics_suffix: self.dynamics_suffix(),
            fatigue_suffix: self.fatigue_suffix(),
        }
    }
}

/// Read access to the current phase variables, by slot name.
///
/// Implemented by the dynamics evaluator over its state/control buffers.
/// Values are physical (unscaled) and indexed per actuator.
pub trait FatigueSource {
    /// Control `name`, component `index`.
    fn control(&self, name: &str, index: usize) -> Result<f64>;

    /// State `name`, component `index`.
    fn state(&self, name: &str, index: usize) -> Result<f64>;
}
