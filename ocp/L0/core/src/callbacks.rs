//! User-supplied hooks.
//!
//! Hooks are `Arc<dyn Fn>` so that the types holding them stay `Clone` and can
//! be shared across multi-start threads:
//!
//! - `Fn` (not `FnMut`): evaluation never mutates the hook
//! - `Send + Sync`: programs can be built and evaluated on the rayon pool
//! - identity is pointer identity ([`Callback::same_as`]), used to merge
//!   parameters declared twice

use std::fmt;
use std::sync::Arc;

use nalgebra::DVector;
use ocp_types::Result;

use crate::dynamics::{CustomInputs, DynamicsEvaluation};

/// Thread-safe callback wrapper that implements Debug.
pub struct Callback<F: ?Sized>(pub Arc<F>);

impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(<fn>)")
    }
}

impl<F: ?Sized> Callback<F> {
    /// Whether both callbacks wrap the same function object.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// ==================== Callback Type Aliases ====================

/// Parameter hook: writes the (physical) parameter values into the model.
pub type ParameterFn<M> = Callback<dyn Fn(&mut M, &DVector<f64>) -> Result<()> + Send + Sync>;

/// Custom series: `(node, n_shooting) -> values`.
pub type SeriesFn = Callback<dyn Fn(f64, usize) -> DVector<f64> + Send + Sync>;

/// Custom dynamics: `(model, inputs) -> evaluation`.
pub type DynamicsFn<M> = Callback<dyn Fn(&M, &CustomInputs<'_>) -> Result<DynamicsEvaluation> + Send + Sync>;
