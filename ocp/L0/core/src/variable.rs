//! Named views into a phase's state or control buffer.
//!
//! A [`VariableSet`] partitions one sample of the phase buffer into
//! contiguous [`VariableSlot`]s, in declaration order:
//!
//! ```text
//! index   0   1   2   3   4   5
//!       [ q0  q1 | qd0 qd1 | ma0 ma1 ]
//!         └─ q ─┘ └─ qdot┘  └─ ... ─┘
//! ```
//!
//! Ranges never overlap and their union is the whole buffer.

use std::ops::Range;

use nalgebra::DVector;
use ocp_types::{OcpError, Result};

use crate::mapping::BiMapping;

/// Declaration of a slot, before layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDecl {
    /// Slot name.
    pub name: String,
    /// Model dimension of the slot.
    pub physical_size: usize,
    /// Optional reduction of the model dimension.
    pub mapping: Option<BiMapping>,
    /// Default `(min, max)` per stored component, when the slot has natural bounds.
    pub default_bounds: Option<(Vec<f64>, Vec<f64>)>,
    /// Default initial guess per stored component.
    pub default_init: Option<Vec<f64>>,
}

impl SlotDecl {
    /// A slot of `physical_size` components without mapping.
    #[must_use]
    pub fn new(name: impl Into<String>, physical_size: usize) -> Self {
        Self {
            name: name.into(),
            physical_size,
            mapping: None,
            default_bounds: None,
            default_init: None,
        }
    }

    /// Attach a mapping.
    #[must_use]
    pub fn with_mapping(mut self, mapping: Option<BiMapping>) -> Self {
        self.mapping = mapping;
        self
    }

    /// Attach default bounds and initial guess.
    #[must_use]
    pub fn with_defaults(mut self, min: Vec<f64>, max: Vec<f64>, init: Vec<f64>) -> Self {
        self.default_bounds = Some((min, max));
        self.default_init = Some(init);
        self
    }

    /// Number of stored components.
    #[must_use]
    pub fn size(&self) -> usize {
        self.mapping
            .as_ref()
            .map_or(self.physical_size, BiMapping::reduced_len)
    }
}

/// A named, contiguous range of a phase buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSlot {
    name: String,
    range: Range<usize>,
    physical_size: usize,
    mapping: Option<BiMapping>,
}

impl VariableSlot {
    /// Slot name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index range inside the phase buffer.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Number of stored components.
    #[must_use]
    pub fn size(&self) -> usize {
        self.range.len()
    }

    /// Model dimension.
    #[must_use]
    pub fn physical_size(&self) -> usize {
        self.physical_size
    }

    /// Mapping between stored and model components.
    #[must_use]
    pub fn mapping(&self) -> Option<&BiMapping> {
        self.mapping.as_ref()
    }

    /// Stored components of this slot in `buffer`.
    pub fn get(&self, buffer: &DVector<f64>) -> Result<DVector<f64>> {
        if buffer.len() < self.range.end {
            return Err(OcpError::dimension_mismatch(
                format!("buffer holding {}", self.name),
                self.range.end,
                buffer.len(),
            ));
        }
        Ok(buffer.rows(self.range.start, self.size()).into_owned())
    }

    /// Slot value at model dimension.
    pub fn get_full(&self, buffer: &DVector<f64>) -> Result<DVector<f64>> {
        let stored = self.get(buffer)?;
        match &self.mapping {
            Some(mapping) => mapping.expand(&stored),
            None => Ok(stored),
        }
    }

    /// Model-dimension value reduced to stored components.
    pub fn reduce(&self, full: &DVector<f64>) -> Result<DVector<f64>> {
        match &self.mapping {
            Some(mapping) => mapping.reduce(full),
            None if full.len() == self.size() => Ok(full.clone()),
            None => Err(OcpError::dimension_mismatch(
                format!("derivative of {}", self.name),
                self.size(),
                full.len(),
            )),
        }
    }
}

/// Ordered slots of one kind for one phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableSet {
    slots: Vec<VariableSlot>,
    len: usize,
}

impl VariableSet {
    /// Lay out `decls` contiguously.
    ///
    /// Fails on duplicate names and on mappings whose full size disagrees
    /// with the declared model dimension.
    pub fn build(decls: &[SlotDecl]) -> Result<Self> {
        let mut slots: Vec<VariableSlot> = Vec::with_capacity(decls.len());
        let mut offset = 0;
        for decl in decls {
            if slots.iter().any(|s| s.name == decl.name) {
                return Err(OcpError::invalid_config(format!(
                    "slot {} declared twice",
                    decl.name
                )));
            }
            if let Some(mapping) = &decl.mapping {
                mapping.validate()?;
                if mapping.full_len() != decl.physical_size {
                    return Err(OcpError::dimension_mismatch(
                        format!("mapping of {}", decl.name),
                        decl.physical_size,
                        mapping.full_len(),
                    ));
                }
            }
            let size = decl.size();
            slots.push(VariableSlot {
                name: decl.name.clone(),
                range: offset..offset + size,
                physical_size: decl.physical_size,
                mapping: decl.mapping.clone(),
            });
            offset += size;
        }
        Ok(Self { slots, len: offset })
    }

    /// Buffer size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the set has no component.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slots in order.
    #[must_use]
    pub fn slots(&self) -> &[VariableSlot] {
        &self.slots
    }

    /// Slot names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(VariableSlot::name)
    }

    /// Slot called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&VariableSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Slot called `name`, as an error when missing.
    pub fn slot(&self, name: &str) -> Result<&VariableSlot> {
        self.get(name).ok_or_else(|| OcpError::unknown(name))
    }

    /// Whether a slot called `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Slot owning component `index`.
    #[must_use]
    pub fn slot_of(&self, index: usize) -> Option<&VariableSlot> {
        self.slots.iter().find(|s| s.range.contains(&index))
    }
}
