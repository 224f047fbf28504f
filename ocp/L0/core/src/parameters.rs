//! Global parameters of a program.
//!
//! Parameters live at the end of the decision vector, in declaration order.
//! Each one may carry a callback that writes its values into the model before
//! the dynamics are evaluated. An optimized phase duration is a parameter
//! named [`TIME`], one element per timed phase.

use std::fmt;

use nalgebra::DVector;
use ocp_types::{OcpError, Result};
use tracing::warn;

use crate::callbacks::{Callback, ParameterFn};
use crate::scaling::ScalingTable;

/// Name of the phase-duration parameter.
pub const TIME: &str = "time";

/// One named parameter block.
pub struct Parameter<M> {
    name: String,
    size: usize,
    scaling: Vec<f64>,
    min: Vec<f64>,
    max: Vec<f64>,
    init: Vec<f64>,
    callback: Option<ParameterFn<M>>,
    phases: Option<Vec<usize>>,
}

impl<M> Clone for Parameter<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            size: self.size,
            scaling: self.scaling.clone(),
            min: self.min.clone(),
            max: self.max.clone(),
            init: self.init.clone(),
            callback: self.callback.clone(),
            phases: self.phases.clone(),
        }
    }
}

impl<M> fmt::Debug for Parameter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("scaling", &self.scaling)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("init", &self.init)
            .field("callback", &self.callback)
            .field("phases", &self.phases)
            .finish()
    }
}

impl<M> Parameter<M> {
    /// A parameter of `size` components, unbounded, zero-initialized, unscaled.
    #[must_use]
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            scaling: vec![1.0; size],
            min: vec![f64::NEG_INFINITY; size],
            max: vec![f64::INFINITY; size],
            init: vec![0.0; size],
            callback: None,
            phases: None,
        }
    }

    /// Set physical bounds.
    #[must_use]
    pub fn bounds(mut self, min: Vec<f64>, max: Vec<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the physical initial guess.
    #[must_use]
    pub fn init(mut self, init: Vec<f64>) -> Self {
        self.init = init;
        self
    }

    /// Set scale factors.
    #[must_use]
    pub fn scaling(mut self, scaling: Vec<f64>) -> Self {
        self.scaling = scaling;
        self
    }

    /// Set the callback that writes the values into the model.
    #[must_use]
    pub fn callback(mut self, f: impl Fn(&mut M, &DVector<f64>) -> Result<()> + Send + Sync + 'static) -> Self {
        self.callback = Some(Callback(std::sync::Arc::new(f)));
        self
    }

    /// Reuse an existing callback (same identity).
    #[must_use]
    pub fn with_callback(mut self, callback: ParameterFn<M>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of components.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Callback, if any.
    #[must_use]
    pub fn hook(&self) -> Option<&ParameterFn<M>> {
        self.callback.as_ref()
    }

    fn validate(&self) -> Result<()> {
        for (what, len) in [
            ("scaling", self.scaling.len()),
            ("min", self.min.len()),
            ("max", self.max.len()),
            ("init", self.init.len()),
        ] {
            if len != self.size {
                return Err(OcpError::dimension_mismatch(
                    format!("{what} of parameter {}", self.name),
                    self.size,
                    len,
                ));
            }
        }
        ScalingTable::new(&self.name, self.scaling.clone())?;
        if let Some(phases) = &self.phases {
            if phases.len() != self.size {
                return Err(OcpError::dimension_mismatch(
                    format!("phase map of {}", self.name),
                    self.size,
                    phases.len(),
                ));
            }
        }
        Ok(())
    }
}

/// Non-generic view of a parameter, as stored in the decision vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBlock {
    /// Parameter name.
    pub name: String,
    /// Scale factors.
    pub scaling: Vec<f64>,
    /// Physical lower bounds.
    pub min: Vec<f64>,
    /// Physical upper bounds.
    pub max: Vec<f64>,
    /// Physical initial guess.
    pub init: Vec<f64>,
    /// Phase of each element, for the phase-duration parameter.
    pub phases: Option<Vec<usize>>,
}

impl ParameterBlock {
    /// Number of components.
    #[must_use]
    pub fn size(&self) -> usize {
        self.scaling.len()
    }

    /// Concatenate `other` onto this block.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        self.phases = match (&self.phases, &other.phases) {
            (None, None) => None,
            (Some(a), Some(b)) => Some([a.as_slice(), b.as_slice()].concat()),
            _ => {
                return Err(OcpError::invalid_config(format!(
                    "parameter {} merges timed and untimed blocks",
                    self.name
                )));
            }
        };
        self.scaling.extend_from_slice(&other.scaling);
        self.min.extend_from_slice(&other.min);
        self.max.extend_from_slice(&other.max);
        self.init.extend_from_slice(&other.init);
        Ok(())
    }
}

/// Ordered, name-unique parameters.
pub struct ParameterList<M> {
    params: Vec<Parameter<M>>,
}

impl<M> Default for ParameterList<M> {
    fn default() -> Self {
        Self { params: Vec::new() }
    }
}

impl<M> Clone for ParameterList<M> {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
        }
    }
}

impl<M> fmt::Debug for ParameterList<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.params).finish()
    }
}

impl<M> ParameterList<M> {
    /// No parameter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `param`, or concatenate it onto the parameter of the same name.
    ///
    /// Same-name parameters must share their callback.
    pub fn add(&mut self, param: Parameter<M>) -> Result<()> {
        param.validate()?;
        if param.callback.is_none() && param.name != TIME {
            warn!(name = %param.name, "parameter has no callback, the model will not see it");
        }
        let Some(existing) = self.params.iter_mut().find(|p| p.name == param.name) else {
            self.params.push(param);
            return Ok(());
        };
        let same_callback = match (&existing.callback, &param.callback) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_as(b),
            _ => false,
        };
        if !same_callback {
            return Err(OcpError::invalid_config(format!(
                "parameter {} declared twice with different callbacks",
                param.name
            )));
        }
        existing.phases = match (&existing.phases, &param.phases) {
            (None, None) => None,
            (Some(a), Some(b)) => Some([a.as_slice(), b.as_slice()].concat()),
            _ => {
                return Err(OcpError::invalid_config(format!(
                    "parameter {} merges timed and untimed blocks",
                    param.name
                )));
            }
        };
        existing.size += param.size;
        existing.scaling.extend(param.scaling);
        existing.min.extend(param.min);
        existing.max.extend(param.max);
        existing.init.extend(param.init);
        Ok(())
    }

    /// Builder form of [`add`](Self::add).
    pub fn with(mut self, param: Parameter<M>) -> Result<Self> {
        self.add(param)?;
        Ok(self)
    }

    /// Declare the duration of `phase` as optimized.
    pub fn add_phase_time(&mut self, phase: usize, initial: f64, min: f64, max: f64) -> Result<()> {
        if self.time_index(phase).is_some() {
            return Err(OcpError::invalid_config(format!(
                "duration of phase {phase} is already optimized"
            )));
        }
        let mut param = Parameter::new(TIME, 1).bounds(vec![min], vec![max]).init(vec![initial]);
        param.phases = Some(vec![phase]);
        self.add(param)
    }

    /// Total number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.iter().map(Parameter::size).sum()
    }

    /// Whether no parameter is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameters in order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter<M>> {
        self.params.iter()
    }

    /// Parameter called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter<M>> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Offset of `name` in the parameter vector.
    #[must_use]
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        for p in &self.params {
            if p.name == name {
                return Some(offset);
            }
            offset += p.size;
        }
        None
    }

    /// Index of the duration of `phase` in the parameter vector.
    #[must_use]
    pub fn time_index(&self, phase: usize) -> Option<usize> {
        let offset = self.offset_of(TIME)?;
        let phases = self.get(TIME)?.phases.as_ref()?;
        phases.iter().position(|&p| p == phase).map(|j| offset + j)
    }

    /// Scale factors in vector order.
    pub fn scaling(&self) -> Result<ScalingTable> {
        ScalingTable::new("parameters", self.params.iter().flat_map(|p| p.scaling.iter().copied()).collect())
    }

    /// Blocks for the decision vector.
    #[must_use]
    pub fn blocks(&self) -> Vec<ParameterBlock> {
        self.params
            .iter()
            .map(|p| ParameterBlock {
                name: p.name.clone(),
                scaling: p.scaling.clone(),
                min: p.min.clone(),
                max: p.max.clone(),
                init: p.init.clone(),
                phases: p.phases.clone(),
            })
            .collect()
    }

    /// Write the physical `values` into `model`, parameter by parameter.
    ///
    /// Parameters without a callback are skipped but still consume their
    /// slice of `values`.
    pub fn apply(&self, model: &mut M, values: &DVector<f64>) -> Result<()> {
        if values.len() != self.len() {
            return Err(OcpError::dimension_mismatch("parameter values", self.len(), values.len()));
        }
        let mut offset = 0;
        for p in &self.params {
            if let Some(callback) = &p.callback {
                let slice = values.rows(offset, p.size).into_owned();
                (callback.0)(model, &slice)?;
            }
            offset += p.size;
        }
        Ok(())
    }
}
