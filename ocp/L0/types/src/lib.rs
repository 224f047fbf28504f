//! Core types for optimal-control transcription.
//!
//! This crate provides the shared vocabulary of the `ocp-*` crates:
//!
//! - [`OcpError`] - The error taxonomy (configuration, not-implemented, missing value)
//! - [`PhaseConfig`] - Shooting count, duration, control type, transcription
//! - [`BiomechanicalModel`] - The call contract of the rigid-body/muscle model
//!
//! # Design Philosophy
//!
//! These types are **pure data** plus one trait. They hold no layout logic and
//! no dynamics. They are the common language between:
//!
//! - The layout and vector assembly (`ocp-core`)
//! - Fatigue laws (`ocp-fatigue`)
//! - Model implementations (`ocp-model` or an external engine)
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **zero engine dependencies**.
//!
//! # Example
//!
//! ```
//! use ocp_types::{ControlType, PhaseConfig, Transcription};
//!
//! let config = PhaseConfig::new(3, 1.0)
//!     .control_type(ControlType::Constant)
//!     .transcription(Transcription::MultipleShooting { steps: 5 });
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.n_state_samples(), 4);
//! ```

#![doc(html_root_url = "https://docs.rs/ocp-types/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
    clippy::module_name_repetitions,
)]

mod config;
mod error;
mod model;

pub use config::{
    CollocationScheme, ControlType, DefectType, InterpolationKind, MagnitudeType, PhaseConfig,
    PhaseTime, RigidBodyDynamics, Transcription,
};
pub use error::OcpError;
pub use model::{BiomechanicalModel, ConstrainedDynamics, ExternalForceSet};

// Re-export math types for convenience
pub use nalgebra::{DMatrix, DVector};

/// Result type for transcription operations.
pub type Result<T> = std::result::Result<T, OcpError>;
