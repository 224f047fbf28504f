//! Configuration types for phase transcription.
//!
//! This module provides the plain-data configuration that controls how one
//! phase is transcribed (shooting count, duration, control parameterization
//! and transcription scheme), plus the enums shared with the dynamics and the
//! bounds/initial-guess series.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{OcpError, Result};

/// How controls are parameterized over a shooting interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ControlType {
    /// Piecewise constant: one sample per interval, none at the final node.
    #[default]
    Constant,
    /// Piecewise linear and continuous: one sample per node.
    LinearContinuous,
    /// Piecewise constant with an extra sample at the final node.
    ConstantWithLastNode,
    /// No control at all.
    None,
}

impl ControlType {
    /// Number of control samples for `n_shooting` intervals.
    ///
    /// Returns `None` for parameterizations the transcription does not support.
    #[must_use]
    pub fn n_samples(self, n_shooting: usize) -> Option<usize> {
        match self {
            Self::Constant => Some(n_shooting),
            Self::LinearContinuous => Some(n_shooting + 1),
            Self::ConstantWithLastNode | Self::None => None,
        }
    }

    /// Whether node `k` carries a control sample.
    #[must_use]
    pub fn has_sample_at(self, node: usize, n_shooting: usize) -> bool {
        match self {
            Self::Constant => node < n_shooting,
            Self::LinearContinuous => node <= n_shooting,
            Self::ConstantWithLastNode | Self::None => false,
        }
    }
}

/// Rigid-body dynamics formulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RigidBodyDynamics {
    /// Explicit ODE: accelerations from forward dynamics.
    #[default]
    Ode,
    /// Accelerations are controls, consistency through forward dynamics.
    DaeForwardDynamics,
    /// Accelerations are controls, consistency through inverse dynamics.
    DaeInverseDynamics,
    /// Accelerations are states and jerks are controls (forward dynamics).
    DaeForwardDynamicsJerk,
    /// Accelerations are states and jerks are controls (inverse dynamics).
    DaeInverseDynamicsJerk,
}

impl RigidBodyDynamics {
    /// Whether accelerations are decision variables instead of forward-dynamics results.
    #[must_use]
    pub fn is_dae(self) -> bool {
        !matches!(self, Self::Ode)
    }

    /// Whether accelerations are states and jerks are controls.
    #[must_use]
    pub fn is_jerk(self) -> bool {
        matches!(
            self,
            Self::DaeForwardDynamicsJerk | Self::DaeInverseDynamicsJerk
        )
    }
}

/// Collocation polynomial family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CollocationScheme {
    /// Gauss-Legendre points (interior only).
    #[default]
    Legendre,
    /// Gauss-Radau points (right end point included).
    Radau,
}

/// How collocation defects are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DefectType {
    /// `polynomial_derivative - h * f(x, u) = 0`.
    #[default]
    Explicit,
    /// The polynomial derivative is handed to the dynamics as `states_dot`
    /// and the dynamics' own defects are added to the residuals.
    Implicit,
}

/// Transcription scheme of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Transcription {
    /// Every node is integrated from the first one.
    SingleShooting {
        /// RK4 sub-steps per interval.
        steps: usize,
    },
    /// States at every node, continuity enforced per interval.
    MultipleShooting {
        /// RK4 sub-steps per interval.
        steps: usize,
    },
    /// Orthogonal collocation: `degree + 1` state samples per interval.
    Collocation {
        /// Polynomial degree.
        polynomial_degree: usize,
        /// Point family.
        scheme: CollocationScheme,
        /// Defect formulation.
        defect_type: DefectType,
    },
}

impl Default for Transcription {
    fn default() -> Self {
        Self::MultipleShooting { steps: 5 }
    }
}

impl Transcription {
    /// Orthogonal collocation with Legendre points and explicit defects.
    #[must_use]
    pub fn collocation(polynomial_degree: usize) -> Self {
        Self::Collocation {
            polynomial_degree,
            scheme: CollocationScheme::Legendre,
            defect_type: DefectType::Explicit,
        }
    }

    /// Whether the scheme adds collocation samples inside each interval.
    #[must_use]
    pub fn is_direct_collocation(&self) -> bool {
        matches!(self, Self::Collocation { .. })
    }

    /// Collocation degree, 0 for shooting schemes.
    #[must_use]
    pub fn polynomial_degree(&self) -> usize {
        match self {
            Self::Collocation {
                polynomial_degree, ..
            } => *polynomial_degree,
            _ => 0,
        }
    }

    /// State samples per non-terminal node.
    #[must_use]
    pub fn samples_per_interval(&self) -> usize {
        self.polynomial_degree() + 1
    }

    /// Total number of state samples over `n_shooting` intervals.
    #[must_use]
    pub fn n_state_samples(&self, n_shooting: usize) -> usize {
        n_shooting * self.samples_per_interval() + 1
    }

    /// Validate scheme parameters.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SingleShooting { steps } | Self::MultipleShooting { steps } if *steps == 0 => Err(
                OcpError::invalid_config("integration needs at least one sub-step"),
            ),
            Self::Collocation {
                polynomial_degree, ..
            } if *polynomial_degree == 0 => Err(OcpError::invalid_config(
                "collocation needs a polynomial degree of at least 1",
            )),
            _ => Ok(()),
        }
    }
}

/// Interpolation kind of a bounds or initial-guess series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InterpolationKind {
    /// One column for every node.
    #[default]
    Constant,
    /// First column at node 0, last at the final node, middle elsewhere.
    ConstantWithFirstAndLastDifferent,
    /// Evenly spaced columns blended linearly.
    Linear,
    /// One column per shooting node.
    EachFrame,
    /// One column per collocation sample.
    AllPoints,
    /// Natural cubic spline through columns at given positions.
    Spline,
    /// User function of the node.
    Custom,
}

impl InterpolationKind {
    /// Kinds that only answer at nodes they explicitly define.
    #[must_use]
    pub fn is_strict(self) -> bool {
        matches!(self, Self::EachFrame | Self::AllPoints)
    }
}

/// How noise magnitude is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MagnitudeType {
    /// Fraction of the bound range.
    #[default]
    Relative,
    /// Absolute value.
    Absolute,
}

/// Duration of a phase.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PhaseTime {
    /// Known duration (seconds).
    Fixed(f64),
    /// Duration is part of the decision vector (parameter `"time"`).
    Optimized {
        /// Initial guess (seconds).
        initial: f64,
        /// Lower bound (seconds).
        min: f64,
        /// Upper bound (seconds).
        max: f64,
    },
}

impl PhaseTime {
    /// The fixed value, or the initial guess when optimized.
    #[must_use]
    pub fn nominal(&self) -> f64 {
        match self {
            Self::Fixed(t) => *t,
            Self::Optimized { initial, .. } => *initial,
        }
    }

    /// Whether the duration is optimized.
    #[must_use]
    pub fn is_optimized(&self) -> bool {
        matches!(self, Self::Optimized { .. })
    }
}

/// Configuration of one phase.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseConfig {
    /// Number of shooting intervals.
    pub n_shooting: usize,
    /// Phase duration.
    pub final_time: PhaseTime,
    /// Control parameterization.
    pub control_type: ControlType,
    /// Transcription scheme.
    pub transcription: Transcription,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            n_shooting: 30,
            final_time: PhaseTime::Fixed(1.0),
            control_type: ControlType::Constant,
            transcription: Transcription::default(),
        }
    }
}

impl PhaseConfig {
    /// Create a phase with `n_shooting` intervals over `final_time` seconds.
    #[must_use]
    pub fn new(n_shooting: usize, final_time: f64) -> Self {
        Self {
            n_shooting,
            final_time: PhaseTime::Fixed(final_time),
            ..Default::default()
        }
    }

    /// Set the control parameterization.
    #[must_use]
    pub fn control_type(mut self, control_type: ControlType) -> Self {
        self.control_type = control_type;
        self
    }

    /// Set the transcription scheme.
    #[must_use]
    pub fn transcription(mut self, transcription: Transcription) -> Self {
        self.transcription = transcription;
        self
    }

    /// Make the phase duration a decision variable.
    #[must_use]
    pub fn optimized_time(mut self, initial: f64, min: f64, max: f64) -> Self {
        self.final_time = PhaseTime::Optimized { initial, min, max };
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.n_shooting == 0 {
            return Err(OcpError::invalid_config(
                "a phase needs at least one shooting interval",
            ));
        }
        match self.final_time {
            PhaseTime::Fixed(t) if !t.is_finite() || t <= 0.0 => {
                return Err(OcpError::invalid_config(format!(
                    "phase duration {t} must be positive and finite"
                )));
            }
            PhaseTime::Optimized { initial, min, max }
                if !(min > 0.0 && min <= initial && initial <= max && max.is_finite()) =>
            {
                return Err(OcpError::invalid_config(format!(
                    "optimized phase time needs 0 < min <= initial <= max, got {min} <= {initial} <= {max}"
                )));
            }
            _ => {}
        }
        self.transcription.validate()
    }

    /// Number of state samples.
    #[must_use]
    pub fn n_state_samples(&self) -> usize {
        self.transcription.n_state_samples(self.n_shooting)
    }

    /// Nominal duration of one shooting interval.
    #[must_use]
    pub fn interval_duration(&self) -> f64 {
        self.final_time.nominal() / self.n_shooting as f64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_control_samples() {
        assert_eq!(ControlType::Constant.n_samples(3), Some(3));
        assert_eq!(ControlType::LinearContinuous.n_samples(3), Some(4));
        assert_eq!(ControlType::ConstantWithLastNode.n_samples(3), None);
        assert!(ControlType::Constant.has_sample_at(2, 3));
        assert!(!ControlType::Constant.has_sample_at(3, 3));
        assert!(ControlType::LinearContinuous.has_sample_at(3, 3));
    }

    #[test]
    fn test_collocation_sample_count() {
        let t = Transcription::collocation(4);
        assert!(t.is_direct_collocation());
        assert_eq!(t.samples_per_interval(), 5);
        assert_eq!(t.n_state_samples(10), 51);

        let t = Transcription::MultipleShooting { steps: 5 };
        assert_eq!(t.n_state_samples(10), 11);
    }

    #[test]
    fn test_phase_config_validation() {
        assert!(PhaseConfig::new(10, 1.0).validate().is_ok());
        assert!(PhaseConfig::new(0, 1.0).validate().is_err());
        assert!(PhaseConfig::new(10, -1.0).validate().is_err());
        assert!(
            PhaseConfig::new(10, 1.0)
                .optimized_time(1.0, 2.0, 3.0)
                .validate()
                .is_err()
        );
        assert!(
            PhaseConfig::new(10, 1.0)
                .transcription(Transcription::collocation(0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_rigidbody_flags() {
        assert!(!RigidBodyDynamics::Ode.is_dae());
        assert!(RigidBodyDynamics::DaeInverseDynamics.is_dae());
        assert!(RigidBodyDynamics::DaeForwardDynamicsJerk.is_jerk());
        assert!(!RigidBodyDynamics::DaeForwardDynamics.is_jerk());
    }

    #[test]
    fn test_interval_duration() {
        let cfg = PhaseConfig::new(4, 2.0);
        assert_eq!(cfg.interval_duration(), 0.5);
    }
}
