//! Three-compartment fatigue (Xia & Frey Law).
//!
//! Motor units are split into active (`ma`), resting (`mr`) and fatigued
//! (`mf`) fractions that always sum to one:
//!
//! ```text
//!            C(t)           F
//!   mr ───────────► ma ─────────► mf
//!    ▲                              │
//!    └──────────────────────────────┘
//!                   R
//!
//! C = LD · (TL − ma)   if ma < TL and mr > TL − ma
//!   = LD · mr          if ma < TL and mr ≤ TL − ma
//!   = LR · (TL − ma)   if ma ≥ TL
//!
//! dma/dt = C − F·ma
//! dmr/dt = −C + R·mf
//! dmf/dt = F·ma − R·mf
//! ```
//!
//! `TL` is the target load (command divided by the law scaling).

use crate::law::FatigueLaw;

/// Xia three-compartment fatigue law.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct XiaFatigue {
    /// Development factor (1/s), recruitment toward the target.
    pub ld: f64,
    /// Relaxation factor (1/s), de-recruitment toward the target.
    pub lr: f64,
    /// Fatigue rate (1/s).
    pub f: f64,
    /// Recovery rate (1/s).
    pub r: f64,
    /// Command-to-load factor (negative for the negative half of a torque).
    pub scaling: f64,
}

impl Default for XiaFatigue {
    fn default() -> Self {
        Self {
            ld: 10.0,
            lr: 10.0,
            f: 0.01,
            r: 0.002,
            scaling: 1.0,
        }
    }
}

impl XiaFatigue {
    const STATES: [&'static str; 3] = ["ma", "mr", "mf"];

    /// Create a Xia law with the given rates and scaling.
    #[must_use]
    pub fn new(ld: f64, lr: f64, f: f64, r: f64, scaling: f64) -> Self {
        Self {
            ld,
            lr,
            f,
            r,
            scaling,
        }
    }

    /// Same rates, different scaling.
    #[must_use]
    pub fn with_scaling(mut self, scaling: f64) -> Self {
        self.scaling = scaling;
        self
    }

    /// Recruitment flow from resting to active.
    #[must_use]
    pub fn recruitment(&self, target_load: f64, ma: f64, mr: f64) -> f64 {
        if ma < target_load {
            if mr > target_load - ma {
                self.ld * (target_load - ma)
            } else {
                self.ld * mr
            }
        } else {
            self.lr * (target_load - ma)
        }
    }
}

impl FatigueLaw for XiaFatigue {
    fn type_name(&self) -> &'static str {
        "xia"
    }

    fn state_suffixes(&self) -> &'static [&'static str] {
        &Self::STATES
    }

    fn dynamics_suffix(&self) -> &'static str {
        "ma"
    }

    fn fatigue_suffix(&self) -> &'static str {
        "mf"
    }

    fn scaling(&self) -> f64 {
        self.scaling
    }

    fn default_state_only(&self) -> bool {
        false
    }

    fn default_apply_to_joint_dynamics(&self) -> bool {
        false
    }

    fn default_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        (vec![0.0; 3], vec![1.0; 3])
    }

    fn default_initial_guess(&self) -> Vec<f64> {
        vec![0.0, 1.0, 0.0]
    }

    fn apply_dynamics(&self, target_load: f64, states: &[f64]) -> Vec<f64> {
        let ma = states.first().copied().unwrap_or(0.0);
        let mr = states.get(1).copied().unwrap_or(0.0);
        let mf = states.get(2).copied().unwrap_or(0.0);

        let c = self.recruitment(target_load, ma, mr);
        vec![
            c - self.f * ma,
            -c + self.r * mf,
            self.f * ma - self.r * mf,
        ]
    }
}
