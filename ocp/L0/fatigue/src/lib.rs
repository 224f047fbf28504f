//! Actuator fatigue for optimal-control dynamics.
//!
//! Fatigue adds states to a phase and rewrites how actuators drive the
//! joints:
//!
//! - [`FatigueLaw`] - A first-order law (e.g. [`XiaFatigue`], [`EffortPerception`])
//! - [`MultiFatigueModel`] - The laws of one actuator, one per suffix
//! - [`FatigueGroup`] - Every actuator of a target, checked for homogeneity
//! - [`FatigueList`] - The groups of a phase
//!
//! # Example
//!
//! ```
//! use ocp_fatigue::{FatigueList, FatigueTarget, MultiFatigueModel, XiaFatigue};
//!
//! let mut list = FatigueList::new();
//! for _ in 0..2 {
//!     list.add(MultiFatigueModel::xia_torque(XiaFatigue::default(), 50.0));
//! }
//! list.validate().unwrap();
//!
//! let group = list.group(FatigueTarget::Torque).unwrap();
//! assert_eq!(group.n_rows(), 12);
//! assert_eq!(group.control_slots(), vec!["tau_minus", "tau_plus"]);
//! ```

#![doc(html_root_url = "https://docs.rs/ocp-fatigue/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_errors_doc,  // Error docs added where non-obvious
    clippy::module_name_repetitions,
    clippy::similar_names,       // ma, mr, mf are the conventional names
)]

mod effort;
mod law;
mod list;
mod multi;
mod xia;

pub use effort::EffortPerception;
pub use law::{FatigueCapabilities, FatigueLaw, FatigueSource, FatigueTarget};
pub use list::{FatigueGroup, FatigueList, FatigueStateSlot};
pub use multi::MultiFatigueModel;
pub use xia::XiaFatigue;

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use ocp_types::{OcpError, Result};

    use crate::law::FatigueSource;

    /// Name-keyed buffers standing in for a phase.
    #[derive(Default)]
    pub struct Source {
        pub controls: BTreeMap<String, Vec<f64>>,
        pub states: BTreeMap<String, Vec<f64>>,
    }

    impl FatigueSource for Source {
        fn control(&self, name: &str, index: usize) -> Result<f64> {
            self.controls
                .get(name)
                .and_then(|v| v.get(index).copied())
                .ok_or_else(|| OcpError::unknown(name))
        }

        fn state(&self, name: &str, index: usize) -> Result<f64> {
            self.states
                .get(name)
                .and_then(|v| v.get(index).copied())
                .ok_or_else(|| OcpError::unknown(name))
        }
    }
}
