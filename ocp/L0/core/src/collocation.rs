//! Collocation points and Lagrange bases on the unit interval.
//!
//! With `t = 2x − 1` and `P_d` the Legendre polynomial of degree `d`:
//!
//! ```text
//! Legendre: roots of P_D(t)              D points in (0, 1)
//! Radau:    roots of P_D(t) − P_{D−1}(t) D points in (0, 1], last one is 1
//! ```
//!
//! Each interval uses the time fractions `[0, τ_1, …, τ_D]`; the state is the
//! Lagrange polynomial through the samples at those fractions.

use ocp_types::{CollocationScheme, OcpError, Result};

/// Highest supported polynomial degree.
pub const MAX_DEGREE: usize = 9;

/// Legendre polynomial `P_n(t)` by the three-term recurrence.
fn legendre(n: usize, t: f64) -> f64 {
    match n {
        0 => 1.0,
        1 => t,
        _ => {
            let (mut p0, mut p1) = (1.0, t);
            for k in 1..n {
                let k = k as f64;
                let p2 = ((2.0 * k + 1.0) * t * p1 - k * p0) / (k + 1.0);
                p0 = p1;
                p1 = p2;
            }
            p1
        }
    }
}

fn bisect(f: &dyn Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> f64 {
    let mut f_lo = f(lo);
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        let f_mid = f(mid);
        if f_mid == 0.0 {
            return mid;
        }
        if (f_mid < 0.0) == (f_lo < 0.0) {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-15 {
            break;
        }
    }
    0.5 * (lo + hi)
}

/// Sign changes of `f` on the open interval (0, 1).
fn roots_in_unit_interval(f: &dyn Fn(f64) -> f64, resolution: usize) -> Vec<f64> {
    let mut roots = Vec::new();
    let mut prev_x = 0.0;
    let mut prev_f = f(prev_x);
    for i in 1..resolution {
        let x = i as f64 / resolution as f64;
        let fx = f(x);
        if fx == 0.0 {
            roots.push(x);
        } else if prev_f != 0.0 && (fx < 0.0) != (prev_f < 0.0) {
            roots.push(bisect(f, prev_x, x));
        }
        prev_x = x;
        prev_f = fx;
    }
    roots
}

/// The `degree` collocation points of `scheme` on (0, 1].
pub fn collocation_points(degree: usize, scheme: CollocationScheme) -> Result<Vec<f64>> {
    if degree == 0 || degree > MAX_DEGREE {
        return Err(OcpError::invalid_config(format!(
            "collocation degree must be in 1..={MAX_DEGREE}, got {degree}"
        )));
    }
    let resolution = 400 * degree;
    let mut points = match scheme {
        CollocationScheme::Legendre => {
            roots_in_unit_interval(&|x| legendre(degree, 2.0 * x - 1.0), resolution)
        }
        CollocationScheme::Radau => {
            let mut interior = roots_in_unit_interval(
                &|x| {
                    let t = 2.0 * x - 1.0;
                    legendre(degree, t) - legendre(degree - 1, t)
                },
                resolution,
            );
            interior.push(1.0);
            interior
        }
    };
    points.sort_by(f64::total_cmp);
    if points.len() != degree {
        return Err(OcpError::invalid_config(format!(
            "found {} collocation points for degree {degree}",
            points.len()
        )));
    }
    Ok(points)
}

/// `[0, τ_1, …, τ_D]`.
pub fn time_fractions(degree: usize, scheme: CollocationScheme) -> Result<Vec<f64>> {
    let mut fractions = Vec::with_capacity(degree + 1);
    fractions.push(0.0);
    fractions.extend(collocation_points(degree, scheme)?);
    Ok(fractions)
}

/// Lagrange basis over the time fractions of one interval.
#[derive(Debug, Clone, PartialEq)]
pub struct LagrangeBasis {
    tau: Vec<f64>,
    /// `derivative[j][r] = l_j'(τ_r)`.
    derivative: Vec<Vec<f64>>,
    /// `end[j] = l_j(1)`.
    end: Vec<f64>,
}

impl LagrangeBasis {
    /// Basis for `degree` and `scheme`.
    pub fn new(degree: usize, scheme: CollocationScheme) -> Result<Self> {
        let tau = time_fractions(degree, scheme)?;
        let n = tau.len();
        let mut derivative = vec![vec![0.0; n]; n];
        let mut end = vec![0.0; n];
        for j in 0..n {
            end[j] = Self::value_with(&tau, j, 1.0);
            for (r, &t) in tau.iter().enumerate() {
                derivative[j][r] = Self::derivative_with(&tau, j, t);
            }
        }
        Ok(Self {
            tau,
            derivative,
            end,
        })
    }

    fn value_with(tau: &[f64], j: usize, t: f64) -> f64 {
        tau.iter()
            .enumerate()
            .filter(|&(r, _)| r != j)
            .map(|(_, &tr)| (t - tr) / (tau[j] - tr))
            .product()
    }

    fn derivative_with(tau: &[f64], j: usize, t: f64) -> f64 {
        let mut sum = 0.0;
        for (m, &tm) in tau.iter().enumerate() {
            if m == j {
                continue;
            }
            let mut term = 1.0 / (tau[j] - tm);
            for (r, &tr) in tau.iter().enumerate() {
                if r != j && r != m {
                    term *= (t - tr) / (tau[j] - tr);
                }
            }
            sum += term;
        }
        sum
    }

    /// Time fractions `[0, τ_1, …, τ_D]`.
    #[must_use]
    pub fn fractions(&self) -> &[f64] {
        &self.tau
    }

    /// Polynomial degree.
    #[must_use]
    pub fn degree(&self) -> usize {
        self.tau.len() - 1
    }

    /// `l_j(t)`.
    #[must_use]
    pub fn value(&self, j: usize, t: f64) -> f64 {
        Self::value_with(&self.tau, j, t)
    }

    /// `l_j'(τ_r)`.
    #[must_use]
    pub fn derivative_at(&self, j: usize, r: usize) -> f64 {
        self.derivative[j][r]
    }

    /// `l_j(1)`, the continuity weights.
    #[must_use]
    pub fn end_weights(&self) -> &[f64] {
        &self.end
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_legendre_degree_two() {
        // Roots of P_2 mapped to (0, 1): 0.5 ± sqrt(3)/6
        let p = collocation_points(2, CollocationScheme::Legendre).unwrap();
        assert_relative_eq!(p[0], 0.5 - 3f64.sqrt() / 6.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 0.5 + 3f64.sqrt() / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_radau_degree_two() {
        // Right Radau, two points: 1/3 and 1
        let p = collocation_points(2, CollocationScheme::Radau).unwrap();
        assert_relative_eq!(p[0], 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(p[1], 1.0);
    }

    #[test]
    fn test_point_counts() {
        for d in 1..=MAX_DEGREE {
            for scheme in [CollocationScheme::Legendre, CollocationScheme::Radau] {
                let p = collocation_points(d, scheme).unwrap();
                assert_eq!(p.len(), d);
                assert!(p.windows(2).all(|w| w[0] < w[1]));
                assert!(p[0] > 0.0 && p[d - 1] <= 1.0);
            }
        }
        assert!(collocation_points(0, CollocationScheme::Legendre).is_err());
        assert!(collocation_points(MAX_DEGREE + 1, CollocationScheme::Radau).is_err());
    }

    #[test]
    fn test_basis_partition_of_unity() {
        let basis = LagrangeBasis::new(3, CollocationScheme::Legendre).unwrap();
        for &t in &[0.0, 0.3, 0.77, 1.0] {
            let sum: f64 = (0..=3).map(|j| basis.value(j, t)).sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(basis.end_weights().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        for r in 0..=3 {
            let d: f64 = (0..=3).map(|j| basis.derivative_at(j, r)).sum();
            assert_relative_eq!(d, 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_basis_differentiates_polynomials() {
        let basis = LagrangeBasis::new(3, CollocationScheme::Radau).unwrap();
        let tau = basis.fractions().to_vec();
        // f(t) = t^3, f'(t) = 3 t^2, exact for degree 3
        for (r, &t) in tau.iter().enumerate() {
            let d: f64 = (0..=3).map(|j| basis.derivative_at(j, r) * tau[j].powi(3)).sum();
            assert_relative_eq!(d, 3.0 * t * t, epsilon = 1e-9);
        }
    }
}
