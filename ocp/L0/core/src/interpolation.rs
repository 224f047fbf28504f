//! Node-indexed series for bounds and initial guesses.
//!
//! An [`InterpolatedSeries`] holds control points (columns) and answers
//! [`evaluate_at`](InterpolatedSeries::evaluate_at) for any node of a
//! shooting grid. It must first be bound to the grid with
//! [`check_and_adjust_dimensions`](InterpolatedSeries::check_and_adjust_dimensions),
//! which checks the column count for the kind:
//!
//! | kind                                 | columns              |
//! |--------------------------------------|----------------------|
//! | `Constant`                           | 1                    |
//! | `ConstantWithFirstAndLastDifferent`  | 3                    |
//! | `Linear`                             | ≥ 2, evenly spaced   |
//! | `EachFrame` / `AllPoints`            | `n_shooting + 1`     |
//! | `Spline`                             | ≥ 2, at positions    |
//! | `Custom`                             | none (function)      |

use nalgebra::{DMatrix, DVector};
use ocp_types::{InterpolationKind, OcpError, Result};

use crate::callbacks::{Callback, SeriesFn};

/// A queryable function of a (possibly fractional) node.
#[derive(Debug, Clone)]
pub struct InterpolatedSeries {
    kind: InterpolationKind,
    columns: DMatrix<f64>,
    positions: Vec<f64>,
    second_derivatives: Option<DMatrix<f64>>,
    custom: Option<SeriesFn>,
    n_shooting: Option<usize>,
}

impl InterpolatedSeries {
    /// Series of `kind` over `columns` (one column per control point).
    ///
    /// Use [`spline`](Self::spline) and [`custom`](Self::custom) for the
    /// kinds that need more than columns.
    pub fn new(kind: InterpolationKind, columns: DMatrix<f64>) -> Result<Self> {
        if matches!(kind, InterpolationKind::Spline | InterpolationKind::Custom) {
            return Err(OcpError::invalid_config(format!(
                "{kind:?} series need a dedicated constructor"
            )));
        }
        Ok(Self {
            kind,
            columns,
            positions: Vec::new(),
            second_derivatives: None,
            custom: None,
            n_shooting: None,
        })
    }

    /// One value for every node.
    #[must_use]
    pub fn constant(values: Vec<f64>) -> Self {
        let n = values.len();
        Self {
            kind: InterpolationKind::Constant,
            columns: DMatrix::from_vec(n, 1, values),
            positions: Vec::new(),
            second_derivatives: None,
            custom: None,
            n_shooting: None,
        }
    }

    /// Natural cubic spline through `columns` at normalized `positions`.
    ///
    /// Positions start at 0, end at 1 and strictly increase.
    pub fn spline(columns: DMatrix<f64>, positions: Vec<f64>) -> Result<Self> {
        if positions.len() != columns.ncols() || positions.len() < 2 {
            return Err(OcpError::dimension_mismatch(
                "spline positions",
                columns.ncols().max(2),
                positions.len(),
            ));
        }
        let ordered = positions.windows(2).all(|w| w[0] < w[1]);
        let anchored = positions.first() == Some(&0.0) && positions.last() == Some(&1.0);
        if !ordered || !anchored {
            return Err(OcpError::invalid_config(
                "spline positions must increase strictly from 0 to 1",
            ));
        }
        let second_derivatives = natural_spline_second_derivatives(&columns, &positions);
        Ok(Self {
            kind: InterpolationKind::Spline,
            columns,
            positions,
            second_derivatives: Some(second_derivatives),
            custom: None,
            n_shooting: None,
        })
    }

    /// User function `(node, n_shooting) -> values` with `n_elements` rows.
    #[must_use]
    pub fn custom(
        n_elements: usize,
        function: impl Fn(f64, usize) -> DVector<f64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: InterpolationKind::Custom,
            columns: DMatrix::zeros(n_elements, 0),
            positions: Vec::new(),
            second_derivatives: None,
            custom: Some(Callback(std::sync::Arc::new(function))),
            n_shooting: None,
        }
    }

    /// Interpolation kind.
    #[must_use]
    pub fn kind(&self) -> InterpolationKind {
        self.kind
    }

    /// Number of rows.
    #[must_use]
    pub fn n_elements(&self) -> usize {
        self.columns.nrows()
    }

    /// Control points.
    #[must_use]
    pub fn columns(&self) -> &DMatrix<f64> {
        &self.columns
    }

    /// Grid the series is bound to.
    #[must_use]
    pub fn n_shooting(&self) -> Option<usize> {
        self.n_shooting
    }

    fn expected_columns(&self, n_shooting: usize) -> Option<usize> {
        match self.kind {
            InterpolationKind::Constant => Some(1),
            InterpolationKind::ConstantWithFirstAndLastDifferent => Some(3),
            InterpolationKind::EachFrame | InterpolationKind::AllPoints => Some(n_shooting + 1),
            InterpolationKind::Linear | InterpolationKind::Spline | InterpolationKind::Custom => None,
        }
    }

    /// Validate the shape for `n_elements` rows over `n_shooting` intervals
    /// and bind the series to that grid.
    ///
    /// A series may be re-bound to the same grid; binding it to a different
    /// grid is an error.
    pub fn check_and_adjust_dimensions(&mut self, n_elements: usize, n_shooting: usize) -> Result<()> {
        if let Some(bound) = self.n_shooting {
            if bound != n_shooting {
                return Err(OcpError::invalid_config(format!(
                    "series already bound to {bound} intervals, cannot rebind to {n_shooting}"
                )));
            }
        }

        if self.kind == InterpolationKind::Custom {
            let probe = self
                .custom
                .as_ref()
                .map(|f| (f.0)(0.0, n_shooting))
                .ok_or_else(|| OcpError::invalid_config("custom series without function"))?;
            if probe.len() != n_elements {
                return Err(OcpError::dimension_mismatch("custom series rows", n_elements, probe.len()));
            }
            self.columns = DMatrix::zeros(n_elements, 0);
            self.n_shooting = Some(n_shooting);
            return Ok(());
        }

        if self.columns.nrows() != n_elements {
            return Err(OcpError::dimension_mismatch(
                format!("{:?} series rows", self.kind),
                n_elements,
                self.columns.nrows(),
            ));
        }
        match self.expected_columns(n_shooting) {
            Some(expected) if expected != self.columns.ncols() => {
                return Err(OcpError::dimension_mismatch(
                    format!("{:?} series columns", self.kind),
                    expected,
                    self.columns.ncols(),
                ));
            }
            None if self.columns.ncols() < 2 => {
                return Err(OcpError::dimension_mismatch(
                    format!("{:?} series columns", self.kind),
                    2,
                    self.columns.ncols(),
                ));
            }
            _ => {}
        }
        self.n_shooting = Some(n_shooting);
        Ok(())
    }

    /// Value at `node`.
    ///
    /// Strict kinds (`EachFrame`, `AllPoints`) only answer integer nodes
    /// inside the grid and return [`OcpError::MissingValue`] otherwise.
    pub fn evaluate_at(&self, node: f64) -> Result<DVector<f64>> {
        let n = self.n_shooting.ok_or_else(|| {
            OcpError::invalid_config(format!("{:?} series is not bound to a grid", self.kind))
        })?;
        let n_f = n as f64;

        match self.kind {
            InterpolationKind::Constant => Ok(self.columns.column(0).into_owned()),
            InterpolationKind::ConstantWithFirstAndLastDifferent => {
                let col = if node <= 0.0 {
                    0
                } else if node >= n_f {
                    2
                } else {
                    1
                };
                Ok(self.columns.column(col).into_owned())
            }
            InterpolationKind::Linear => {
                let segments = (self.columns.ncols() - 1) as f64;
                let x = (if n == 0 { 0.0 } else { (node / n_f).clamp(0.0, 1.0) }) * segments;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let i = (x.floor() as usize).min(self.columns.ncols() - 2);
                let frac = x - i as f64;
                Ok(self.columns.column(i) * (1.0 - frac) + self.columns.column(i + 1) * frac)
            }
            InterpolationKind::EachFrame | InterpolationKind::AllPoints => {
                let available = self.columns.ncols();
                if node < 0.0 || node.fract() != 0.0 || node > n_f {
                    return Err(OcpError::MissingValue { node, available });
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let col = node as usize;
                Ok(self.columns.column(col).into_owned())
            }
            InterpolationKind::Spline => {
                let x = if n == 0 { 0.0 } else { (node / n_f).clamp(0.0, 1.0) };
                self.spline_at(x)
            }
            InterpolationKind::Custom => self
                .custom
                .as_ref()
                .map(|f| (f.0)(node, n))
                .ok_or_else(|| OcpError::invalid_config("custom series without function")),
        }
    }

    fn spline_at(&self, x: f64) -> Result<DVector<f64>> {
        let m = self
            .second_derivatives
            .as_ref()
            .ok_or_else(|| OcpError::invalid_config("spline without coefficients"))?;
        let p = &self.positions;
        let i = p
            .windows(2)
            .position(|w| x <= w[1])
            .unwrap_or(p.len() - 2);
        let h = p[i + 1] - p[i];
        let a = (p[i + 1] - x) / h;
        let b = (x - p[i]) / h;
        let y0 = self.columns.column(i);
        let y1 = self.columns.column(i + 1);
        let m0 = m.column(i);
        let m1 = m.column(i + 1);
        Ok(y0 * a
            + y1 * b
            + (m0 * (a * a * a - a) + m1 * (b * b * b - b)) * (h * h / 6.0))
    }
}

/// Second derivatives of a natural cubic spline, one column per knot.
fn natural_spline_second_derivatives(columns: &DMatrix<f64>, x: &[f64]) -> DMatrix<f64> {
    let n = x.len();
    let mut out = DMatrix::zeros(columns.nrows(), n);
    if n < 3 {
        return out;
    }
    // Thomas algorithm on the interior knots, M_0 = M_{n-1} = 0.
    for row in 0..columns.nrows() {
        let y = columns.row(row);
        let mut c_prime = vec![0.0; n];
        let mut d_prime = vec![0.0; n];
        for i in 1..n - 1 {
            let h0 = x[i] - x[i - 1];
            let h1 = x[i + 1] - x[i];
            let lower = h0 / 6.0;
            let diag = (h0 + h1) / 3.0;
            let upper = h1 / 6.0;
            let rhs = (y[i + 1] - y[i]) / h1 - (y[i] - y[i - 1]) / h0;
            let denom = diag - lower * c_prime[i - 1];
            c_prime[i] = upper / denom;
            d_prime[i] = (rhs - lower * d_prime[i - 1]) / denom;
        }
        for i in (1..n - 1).rev() {
            out[(row, i)] = d_prime[i] - c_prime[i] * out[(row, i + 1)];
        }
    }
    out
}
