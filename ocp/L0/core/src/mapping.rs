//! Index mappings between reduced and full variable vectors.
//!
//! A slot may store fewer components than the model uses, for instance when
//! two joints are driven by the same torque or when a DOF is not actuated:
//!
//! ```text
//! reduced  [a, b]
//!              │ to_second: [Some(0), None, Some(1), Some(0)], oppose [3]
//!              ▼
//! full     [a, 0, b, −a]
//!              │ to_first: [0, 2]
//!              ▼
//! reduced  [a, b]
//! ```

use nalgebra::DVector;
use ocp_types::{OcpError, Result};

/// One-directional index map with dropped and sign-opposed entries.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexMapping {
    map_idx: Vec<Option<usize>>,
    oppose: Vec<usize>,
}

impl IndexMapping {
    /// Output entry `i` reads input entry `map_idx[i]` (zero when `None`).
    #[must_use]
    pub fn new(map_idx: Vec<Option<usize>>) -> Self {
        Self {
            map_idx,
            oppose: Vec::new(),
        }
    }

    /// `0..n` onto itself.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self::new((0..n).map(Some).collect())
    }

    /// Negate the given output entries.
    #[must_use]
    pub fn with_oppose(mut self, oppose: Vec<usize>) -> Self {
        self.oppose = oppose;
        self
    }

    /// Output size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map_idx.len()
    }

    /// Whether the output is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map_idx.is_empty()
    }

    /// Raw index table.
    #[must_use]
    pub fn map_idx(&self) -> &[Option<usize>] {
        &self.map_idx
    }

    /// Opposed output entries.
    #[must_use]
    pub fn oppose(&self) -> &[usize] {
        &self.oppose
    }

    /// Largest input index read, plus one.
    #[must_use]
    pub fn input_len(&self) -> usize {
        self.map_idx.iter().flatten().map(|i| i + 1).max().unwrap_or(0)
    }

    /// Apply the map to `input`.
    pub fn map(&self, input: &DVector<f64>) -> Result<DVector<f64>> {
        let needed = self.input_len();
        if input.len() < needed {
            return Err(OcpError::dimension_mismatch("mapped vector", needed, input.len()));
        }
        let mut out = DVector::from_iterator(
            self.map_idx.len(),
            self.map_idx.iter().map(|i| i.map_or(0.0, |i| input[i])),
        );
        for &i in &self.oppose {
            if let Some(v) = out.get_mut(i) {
                *v = -*v;
            }
        }
        Ok(out)
    }
}

/// Pair of mappings: reduced to full (`to_second`) and back (`to_first`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BiMapping {
    to_second: IndexMapping,
    to_first: IndexMapping,
}

impl BiMapping {
    /// Create a mapping from its two directions.
    ///
    /// `to_second` has one entry per full component, `to_first` one entry per
    /// reduced component.
    pub fn new(to_second: Vec<Option<usize>>, to_first: Vec<usize>) -> Result<Self> {
        let mapping = Self {
            to_second: IndexMapping::new(to_second),
            to_first: IndexMapping::new(to_first.into_iter().map(Some).collect()),
        };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Identity on `n` components.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self {
            to_second: IndexMapping::identity(n),
            to_first: IndexMapping::identity(n),
        }
    }

    /// Negate the given full components when expanding.
    #[must_use]
    pub fn with_oppose(mut self, oppose: Vec<usize>) -> Self {
        self.to_second = self.to_second.with_oppose(oppose);
        self
    }

    /// Reduced-to-full direction.
    #[must_use]
    pub fn to_second(&self) -> &IndexMapping {
        &self.to_second
    }

    /// Full-to-reduced direction.
    #[must_use]
    pub fn to_first(&self) -> &IndexMapping {
        &self.to_first
    }

    /// Number of stored components.
    #[must_use]
    pub fn reduced_len(&self) -> usize {
        self.to_first.len()
    }

    /// Number of model components.
    #[must_use]
    pub fn full_len(&self) -> usize {
        self.to_second.len()
    }

    /// Check that both directions stay inside each other's range.
    pub fn validate(&self) -> Result<()> {
        if self.to_second.input_len() > self.reduced_len() {
            return Err(OcpError::invalid_config(format!(
                "to_second reads reduced index {} of {}",
                self.to_second.input_len() - 1,
                self.reduced_len()
            )));
        }
        if self.to_first.input_len() > self.full_len() {
            return Err(OcpError::invalid_config(format!(
                "to_first reads full index {} of {}",
                self.to_first.input_len() - 1,
                self.full_len()
            )));
        }
        if self.to_second.oppose().iter().any(|&i| i >= self.full_len()) {
            return Err(OcpError::invalid_config("opposed index outside the full vector"));
        }
        Ok(())
    }

    /// Reduced values to model dimension.
    pub fn expand(&self, reduced: &DVector<f64>) -> Result<DVector<f64>> {
        self.to_second.map(reduced)
    }

    /// Model values to stored dimension.
    pub fn reduce(&self, full: &DVector<f64>) -> Result<DVector<f64>> {
        self.to_first.map(full)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_with_dropped_and_opposed() {
        let mapping = BiMapping::new(vec![Some(0), None, Some(1), Some(0)], vec![0, 2])
            .unwrap()
            .with_oppose(vec![3]);
        let full = mapping.expand(&DVector::from_vec(vec![2.0, 5.0])).unwrap();
        assert_eq!(full.as_slice(), &[2.0, 0.0, 5.0, -2.0]);
        let reduced = mapping.reduce(&full).unwrap();
        assert_eq!(reduced.as_slice(), &[2.0, 5.0]);
        assert_eq!(mapping.reduced_len(), 2);
        assert_eq!(mapping.full_len(), 4);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(BiMapping::new(vec![Some(2)], vec![0]).is_err());
        assert!(BiMapping::new(vec![Some(0)], vec![3]).is_err());
    }

    #[test]
    fn test_short_input_rejected() {
        let mapping = IndexMapping::new(vec![Some(3)]);
        assert!(mapping.map(&DVector::zeros(2)).unwrap_err().is_config_error());
    }
}
