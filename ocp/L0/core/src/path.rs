//! Path bounds and initial guesses.
//!
//! Both are [`InterpolatedSeries`] over the shooting grid of a phase. An
//! initial guess can be perturbed with seeded uniform noise
//! ([`InitialGuess::noised`]) to build multi-start programs.

use nalgebra::{DMatrix, DVector};
use ocp_types::{InterpolationKind, MagnitudeType, OcpError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use crate::interpolation::InterpolatedSeries;

/// Lower and upper bound series.
#[derive(Debug, Clone)]
pub struct Bounds {
    min: InterpolatedSeries,
    max: InterpolatedSeries,
}

impl Bounds {
    /// Bounds from two series with the same number of rows.
    pub fn new(min: InterpolatedSeries, max: InterpolatedSeries) -> Result<Self> {
        if min.n_elements() != max.n_elements() {
            return Err(OcpError::dimension_mismatch(
                "max bound rows",
                min.n_elements(),
                max.n_elements(),
            ));
        }
        Ok(Self { min, max })
    }

    /// Same bounds at every node.
    pub fn constant(min: Vec<f64>, max: Vec<f64>) -> Result<Self> {
        Self::new(InterpolatedSeries::constant(min), InterpolatedSeries::constant(max))
    }

    /// Column-based bounds of `kind`.
    pub fn with_kind(kind: InterpolationKind, min: DMatrix<f64>, max: DMatrix<f64>) -> Result<Self> {
        if min.shape() != max.shape() {
            return Err(OcpError::dimension_mismatch("max bound columns", min.ncols(), max.ncols()));
        }
        Self::new(InterpolatedSeries::new(kind, min)?, InterpolatedSeries::new(kind, max)?)
    }

    /// `(−∞, +∞)` for `n` components.
    #[must_use]
    pub fn unbounded(n: usize) -> Self {
        Self {
            min: InterpolatedSeries::constant(vec![f64::NEG_INFINITY; n]),
            max: InterpolatedSeries::constant(vec![f64::INFINITY; n]),
        }
    }

    /// Lower bound series.
    #[must_use]
    pub fn min(&self) -> &InterpolatedSeries {
        &self.min
    }

    /// Upper bound series.
    #[must_use]
    pub fn max(&self) -> &InterpolatedSeries {
        &self.max
    }

    /// Interpolation kind (of the lower bound).
    #[must_use]
    pub fn kind(&self) -> InterpolationKind {
        self.min.kind()
    }

    /// Number of components.
    #[must_use]
    pub fn n_elements(&self) -> usize {
        self.min.n_elements()
    }

    /// Bind both series to the grid.
    pub fn check_and_adjust_dimensions(&mut self, n_elements: usize, n_shooting: usize) -> Result<()> {
        self.min.check_and_adjust_dimensions(n_elements, n_shooting)?;
        self.max.check_and_adjust_dimensions(n_elements, n_shooting)
    }

    /// `(min, max)` at `node`.
    pub fn evaluate_at(&self, node: f64) -> Result<(DVector<f64>, DVector<f64>)> {
        Ok((self.min.evaluate_at(node)?, self.max.evaluate_at(node)?))
    }

    /// Set `[min, max]` of component `row` at control point `column`.
    ///
    /// Only column-based kinds have control points.
    pub fn set(&mut self, row: usize, column: usize, min: f64, max: f64) -> Result<()> {
        set_entry(&mut self.min, row, column, min)?;
        set_entry(&mut self.max, row, column, max)
    }

    /// Pin component `row` to `value` at control point `column`.
    pub fn fix(&mut self, row: usize, column: usize, value: f64) -> Result<()> {
        self.set(row, column, value, value)
    }
}

fn set_entry(series: &mut InterpolatedSeries, row: usize, column: usize, value: f64) -> Result<()> {
    if matches!(series.kind(), InterpolationKind::Custom | InterpolationKind::Spline) {
        return Err(OcpError::invalid_config(format!(
            "{:?} bounds have no editable control points",
            series.kind()
        )));
    }
    let (rows, cols) = series.columns().shape();
    if row >= rows || column >= cols {
        return Err(OcpError::invalid_config(format!(
            "bound entry ({row}, {column}) outside {rows}x{cols}"
        )));
    }
    let mut columns = series.columns().clone();
    columns[(row, column)] = value;
    let mut updated = InterpolatedSeries::new(series.kind(), columns)?;
    if let Some(n) = series.n_shooting() {
        updated.check_and_adjust_dimensions(rows, n)?;
    }
    *series = updated;
    Ok(())
}

/// Seeded uniform noise applied to an initial guess.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseConfig {
    /// Noise amplitude, one value for all components or one per component.
    pub magnitude: Vec<f64>,
    /// Whether `magnitude` is relative to the bound range.
    pub magnitude_type: MagnitudeType,
    /// Distance kept from the bounds, as a fraction of the bound range.
    pub bound_push: f64,
    /// RNG seed, `None` for entropy.
    pub seed: Option<u64>,
    /// `EachFrame` (one column per node) or `AllPoints` (per collocation sample).
    pub output: InterpolationKind,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            magnitude: vec![0.1],
            magnitude_type: MagnitudeType::Relative,
            bound_push: 0.1,
            seed: None,
            output: InterpolationKind::EachFrame,
        }
    }
}

impl NoiseConfig {
    /// Relative noise of `magnitude` with `seed`.
    #[must_use]
    pub fn relative(magnitude: f64, seed: u64) -> Self {
        Self {
            magnitude: vec![magnitude],
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Absolute noise of `magnitude` with `seed`.
    #[must_use]
    pub fn absolute(magnitude: f64, seed: u64) -> Self {
        Self {
            magnitude: vec![magnitude],
            magnitude_type: MagnitudeType::Absolute,
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Set the output kind.
    #[must_use]
    pub fn output(mut self, output: InterpolationKind) -> Self {
        self.output = output;
        self
    }

    /// Set the bound push.
    #[must_use]
    pub fn bound_push(mut self, bound_push: f64) -> Self {
        self.bound_push = bound_push;
        self
    }

    fn magnitude_of(&self, row: usize, n_elements: usize) -> Result<f64> {
        match self.magnitude.len() {
            1 => Ok(self.magnitude[0]),
            n if n == n_elements => Ok(self.magnitude[row]),
            n => Err(OcpError::dimension_mismatch("noise magnitude", n_elements, n)),
        }
    }
}

/// Initial guess series.
#[derive(Debug, Clone)]
pub struct InitialGuess {
    series: InterpolatedSeries,
}

impl InitialGuess {
    /// Wrap a series.
    #[must_use]
    pub fn new(series: InterpolatedSeries) -> Self {
        Self { series }
    }

    /// Same guess at every node.
    #[must_use]
    pub fn constant(values: Vec<f64>) -> Self {
        Self::new(InterpolatedSeries::constant(values))
    }

    /// Zero for `n` components.
    #[must_use]
    pub fn zeros(n: usize) -> Self {
        Self::constant(vec![0.0; n])
    }

    /// Underlying series.
    #[must_use]
    pub fn series(&self) -> &InterpolatedSeries {
        &self.series
    }

    /// Interpolation kind.
    #[must_use]
    pub fn kind(&self) -> InterpolationKind {
        self.series.kind()
    }

    /// Number of components.
    #[must_use]
    pub fn n_elements(&self) -> usize {
        self.series.n_elements()
    }

    /// Bind the series to the grid.
    pub fn check_and_adjust_dimensions(&mut self, n_elements: usize, n_shooting: usize) -> Result<()> {
        self.series.check_and_adjust_dimensions(n_elements, n_shooting)
    }

    /// Guess at `node`.
    pub fn evaluate_at(&self, node: f64) -> Result<DVector<f64>> {
        self.series.evaluate_at(node)
    }

    /// This guess plus uniform noise, sampled on `n_columns` points.
    ///
    /// Column `j` perturbs the guess at node `j` by `U(−1, 1) · magnitude`
    /// (times the bound range when relative). Values falling outside
    /// `[min + push, max − push]`, with `push = bound_push · range`, are moved
    /// to that limit. The result has one column per point and the kind
    /// requested by `config.output`.
    pub fn noised(&self, bounds: &Bounds, n_columns: usize, config: &NoiseConfig) -> Result<Self> {
        if !config.output.is_strict() {
            return Err(OcpError::invalid_config(format!(
                "noised guesses are EachFrame or AllPoints, not {:?}",
                config.output
            )));
        }
        if n_columns == 0 {
            return Err(OcpError::invalid_config("noised guess needs at least one column"));
        }
        let n = self.n_elements();
        let grid = n_columns - 1;
        let mut init = self.series.clone();
        init.check_and_adjust_dimensions(n, grid)?;
        let mut bounds = bounds.clone();
        bounds.check_and_adjust_dimensions(n, grid)?;

        let mut rng = config
            .seed
            .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);

        let mut columns = DMatrix::zeros(n, n_columns);
        for j in 0..n_columns {
            let node = j as f64;
            let base = init.evaluate_at(node)?;
            let (min, max) = bounds.evaluate_at(node)?;
            for row in 0..n {
                let range = max[row] - min[row];
                let magnitude = config.magnitude_of(row, n)?;
                let amplitude = match config.magnitude_type {
                    MagnitudeType::Relative if range.is_finite() => magnitude * range,
                    MagnitudeType::Relative => {
                        return Err(OcpError::invalid_config(format!(
                            "relative noise needs finite bounds (component {row})"
                        )));
                    }
                    MagnitudeType::Absolute => magnitude,
                };
                let mut value = base[row] + rng.gen_range(-1.0..1.0) * amplitude;
                let push = if range.is_finite() { config.bound_push * range } else { 0.0 };
                if value < min[row] + push {
                    value = min[row] + push;
                }
                if value > max[row] - push {
                    value = max[row] - push;
                }
                if min[row] > max[row] {
                    warn!(row, column = j, "noised guess against inverted bounds");
                }
                columns[(row, j)] = value;
            }
        }
        Ok(Self::new(InterpolatedSeries::new(config.output, columns)?))
    }
}
