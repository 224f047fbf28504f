//! Per-component scale factors.
//!
//! The solver sees internal values; the model sees physical values:
//!
//! ```text
//! internal = physical / scale
//! physical = internal · scale
//! ```
//!
//! Scales are declared per slot name ([`VariableScaling`]) and flattened into
//! a [`ScalingTable`] following the slot order of a [`VariableSet`].

use hashbrown::HashMap;
use nalgebra::DVector;
use ocp_types::{OcpError, Result};

use crate::variable::VariableSet;

/// Strictly positive factors, one per component.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingTable {
    scale: DVector<f64>,
}

impl ScalingTable {
    /// Validate and wrap `factors`. `name` is used in errors.
    pub fn new(name: &str, factors: Vec<f64>) -> Result<Self> {
        if let Some((index, &value)) = factors
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && **v > 0.0))
        {
            return Err(OcpError::InvalidScaling {
                name: name.to_string(),
                index,
                value,
            });
        }
        Ok(Self {
            scale: DVector::from_vec(factors),
        })
    }

    /// Unit scaling.
    #[must_use]
    pub fn ones(n: usize) -> Self {
        Self {
            scale: DVector::from_element(n, 1.0),
        }
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scale.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scale.is_empty()
    }

    /// Factor of component `i`.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<f64> {
        self.scale.get(i).copied()
    }

    /// Factors as a vector.
    #[must_use]
    pub fn as_vector(&self) -> &DVector<f64> {
        &self.scale
    }

    fn check(&self, x: &DVector<f64>) -> Result<()> {
        if x.len() == self.len() {
            Ok(())
        } else {
            Err(OcpError::dimension_mismatch("scaled vector", self.len(), x.len()))
        }
    }

    /// `x / scale`, elementwise.
    pub fn to_internal(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        self.check(x)?;
        Ok(x.component_div(&self.scale))
    }

    /// `y · scale`, elementwise.
    pub fn to_physical(&self, y: &DVector<f64>) -> Result<DVector<f64>> {
        self.check(y)?;
        Ok(y.component_mul(&self.scale))
    }
}

/// Scale factors declared by slot name.
///
/// Slots without an entry are unscaled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableScaling {
    by_name: HashMap<String, Vec<f64>>,
}

impl VariableScaling {
    /// No scaling.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare factors for `name`, validated immediately.
    pub fn add(&mut self, name: impl Into<String>, factors: Vec<f64>) -> Result<()> {
        let name = name.into();
        ScalingTable::new(&name, factors.clone())?;
        self.by_name.insert(name, factors);
        Ok(())
    }

    /// Builder form of [`add`](Self::add).
    pub fn with(mut self, name: impl Into<String>, factors: Vec<f64>) -> Result<Self> {
        self.add(name, factors)?;
        Ok(self)
    }

    /// Factors declared for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.by_name.get(name).map(Vec::as_slice)
    }

    /// Flatten along the slots of `set`.
    ///
    /// Declared factors must match the stored size of their slot. Names that
    /// are not slots of `set` are an error.
    pub fn table_for(&self, set: &VariableSet) -> Result<ScalingTable> {
        if let Some(name) = self.by_name.keys().find(|n| !set.contains(n)) {
            return Err(OcpError::unknown(format!("scaling for {name}")));
        }
        let mut factors = Vec::with_capacity(set.len());
        for slot in set.slots() {
            match self.by_name.get(slot.name()) {
                Some(f) if f.len() == slot.size() => factors.extend_from_slice(f),
                Some(f) => {
                    return Err(OcpError::dimension_mismatch(
                        format!("scaling of {}", slot.name()),
                        slot.size(),
                        f.len(),
                    ));
                }
                None => factors.extend(std::iter::repeat(1.0).take(slot.size())),
            }
        }
        ScalingTable::new("table", factors)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::variable::SlotDecl;
    use approx::assert_relative_eq;

    #[test]
    fn test_invalid_factors() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = ScalingTable::new("q", vec![1.0, bad]).unwrap_err();
            assert!(matches!(err, OcpError::InvalidScaling { index: 1, .. }));
            assert!(err.is_config_error());
        }
    }

    #[test]
    fn test_round_trip() {
        let table = ScalingTable::new("x", vec![2.0, 0.5, 10.0]).unwrap();
        let x = DVector::from_vec(vec![1.0, -3.0, 25.0]);
        let y = table.to_internal(&x).unwrap();
        assert_relative_eq!(y[0], 0.5);
        assert_relative_eq!(table.to_physical(&y).unwrap(), x, epsilon = 1e-12);
    }

    #[test]
    fn test_table_for_defaults_to_one() {
        let set = VariableSet::build(&[SlotDecl::new("q", 2), SlotDecl::new("qdot", 2)]).unwrap();
        let scaling = VariableScaling::new().with("qdot", vec![5.0, 5.0]).unwrap();
        let table = scaling.table_for(&set).unwrap();
        assert_eq!(table.as_vector().as_slice(), &[1.0, 1.0, 5.0, 5.0]);
    }

    #[test]
    fn test_table_for_checks_sizes_and_names() {
        let set = VariableSet::build(&[SlotDecl::new("q", 2)]).unwrap();
        let wrong_size = VariableScaling::new().with("q", vec![1.0]).unwrap();
        assert!(wrong_size.table_for(&set).unwrap_err().is_config_error());
        let wrong_name = VariableScaling::new().with("tau", vec![1.0]).unwrap();
        assert!(matches!(
            wrong_name.table_for(&set),
            Err(OcpError::UnknownVariable { .. })
        ));
    }
}
