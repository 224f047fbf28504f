//! Equality residuals of one phase.
//!
//! All residuals are evaluated at physical values and divided by the state
//! scale, so a solver sees them at the magnitude of the scaled states.
//!
//! | transcription     | residual block per interval `k`                          |
//! |-------------------|----------------------------------------------------------|
//! | multiple shooting | `x_{k+1} - RK4(x_k, u_k)`                                |
//! | single shooting   | `x_{k+1} - RK4(RK4(... x_0))`                            |
//! | collocation       | `D` collocation defects, then `x_{k+1} - Σ l_j(1) x_j`   |
//!
//! Implicit collocation hands the polynomial derivative to the dynamics as
//! `states_dot`. When the dynamics return defects, they replace the `q`/`qdot`
//! rows of the explicit defect; the other state rows stay explicit.

use nalgebra::{DMatrix, DVector};
use ocp_types::{BiomechanicalModel, ControlType, DefectType, OcpError, Result, Transcription};
use tracing::debug;

use crate::collocation::LagrangeBasis;
use crate::dynamics::DynamicsEvaluator;
use crate::scaling::ScalingTable;

/// Physical values of one phase at one solver iterate.
#[derive(Debug, Clone, Copy)]
pub struct PhaseIterate<'a> {
    /// `n_states × n_state_samples`.
    pub states: &'a DMatrix<f64>,
    /// `n_controls × n_control_samples`.
    pub controls: &'a DMatrix<f64>,
    /// All parameters, physical.
    pub parameters: &'a DVector<f64>,
    /// Phase duration.
    pub duration: f64,
}

impl PhaseIterate<'_> {
    fn state(&self, sample: usize) -> DVector<f64> {
        self.states.column(sample).into_owned()
    }

    /// Control at `fraction` of interval `node`.
    fn control(&self, control_type: ControlType, node: usize, fraction: f64) -> DVector<f64> {
        let cols = self.controls.ncols();
        if cols == 0 {
            return DVector::zeros(self.controls.nrows());
        }
        let start = self.controls.column(node.min(cols - 1)).into_owned();
        match control_type {
            ControlType::LinearContinuous if node + 1 < cols => {
                let end = self.controls.column(node + 1).into_owned();
                &start + (end - &start) * fraction
            }
            _ => start,
        }
    }
}

/// Residuals of one phase.
///
/// Parameters are applied to `model` once, then every node is evaluated
/// against the same model.
pub fn phase_residuals<M: BiomechanicalModel>(
    model: &mut M,
    evaluator: &DynamicsEvaluator<M>,
    iterate: &PhaseIterate<'_>,
    scale: &ScalingTable,
) -> Result<DVector<f64>> {
    let layout = evaluator.layout();
    if iterate.states.nrows() != layout.n_states() || iterate.states.ncols() != layout.n_state_samples() {
        return Err(OcpError::dimension_mismatch(
            format!("state samples of phase {}", layout.phase()),
            layout.n_state_samples(),
            iterate.states.ncols(),
        ));
    }
    if scale.len() != layout.n_states() {
        return Err(OcpError::dimension_mismatch("state scale", layout.n_states(), scale.len()));
    }
    evaluator.apply_parameters(model, iterate.parameters)?;
    let model: &M = model;

    let blocks = match layout.config().transcription {
        Transcription::MultipleShooting { steps } => shooting(model, evaluator, iterate, steps, false)?,
        Transcription::SingleShooting { steps } => shooting(model, evaluator, iterate, steps, true)?,
        Transcription::Collocation {
            polynomial_degree,
            scheme,
            defect_type,
        } => {
            let basis = LagrangeBasis::new(polynomial_degree, scheme)?;
            collocation(model, evaluator, iterate, &basis, defect_type)?
        }
    };

    let mut out = Vec::with_capacity(blocks.iter().map(|(v, _)| v.len()).sum());
    for (block, scaled) in blocks {
        if scaled {
            out.extend(block.iter().zip(scale.as_vector().iter()).map(|(r, s)| r / s));
        } else {
            out.extend(block.iter().copied());
        }
    }
    Ok(DVector::from_vec(out))
}

// ====== Shooting ======

fn derivative<M: BiomechanicalModel>(
    model: &M,
    evaluator: &DynamicsEvaluator<M>,
    node: usize,
    x: &DVector<f64>,
    u: &DVector<f64>,
    parameters: &DVector<f64>,
) -> Result<DVector<f64>> {
    Ok(evaluator
        .evaluate_with(model, Some(node), x, u, parameters, None)?
        .first_column())
}

/// Integrate interval `node` from `x0` with `steps` RK4 sub-steps.
fn integrate<M: BiomechanicalModel>(
    model: &M,
    evaluator: &DynamicsEvaluator<M>,
    iterate: &PhaseIterate<'_>,
    node: usize,
    x0: DVector<f64>,
    steps: usize,
) -> Result<DVector<f64>> {
    let layout = evaluator.layout();
    let control_type = layout.control_type();
    let steps = steps.max(1);
    let dt = iterate.duration / layout.n_shooting() as f64 / steps as f64;
    let p = iterate.parameters;
    let mut x = x0;
    for i in 0..steps {
        let t0 = i as f64 / steps as f64;
        let t_mid = (i as f64 + 0.5) / steps as f64;
        let t1 = (i + 1) as f64 / steps as f64;
        let u0 = iterate.control(control_type, node, t0);
        let u_mid = iterate.control(control_type, node, t_mid);
        let u1 = iterate.control(control_type, node, t1);

        let k1 = derivative(model, evaluator, node, &x, &u0, p)?;
        let k2 = derivative(model, evaluator, node, &(&x + &k1 * (dt / 2.0)), &u_mid, p)?;
        let k3 = derivative(model, evaluator, node, &(&x + &k2 * (dt / 2.0)), &u_mid, p)?;
        let k4 = derivative(model, evaluator, node, &(&x + &k3 * dt), &u1, p)?;
        x += (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0);
    }
    Ok(x)
}

fn shooting<M: BiomechanicalModel>(
    model: &M,
    evaluator: &DynamicsEvaluator<M>,
    iterate: &PhaseIterate<'_>,
    steps: usize,
    chained: bool,
) -> Result<Vec<(DVector<f64>, bool)>> {
    let n_shooting = evaluator.layout().n_shooting();
    let mut blocks = Vec::with_capacity(n_shooting);
    let mut carried = iterate.state(0);
    for k in 0..n_shooting {
        let start = if chained { carried } else { iterate.state(k) };
        let end = integrate(model, evaluator, iterate, k, start, steps)?;
        blocks.push((iterate.state(k + 1) - &end, true));
        carried = end;
    }
    Ok(blocks)
}

// ====== Collocation ======

fn collocation<M: BiomechanicalModel>(
    model: &M,
    evaluator: &DynamicsEvaluator<M>,
    iterate: &PhaseIterate<'_>,
    basis: &LagrangeBasis,
    defect_type: DefectType,
) -> Result<Vec<(DVector<f64>, bool)>> {
    let layout = evaluator.layout();
    let d = basis.degree();
    let h = iterate.duration / layout.n_shooting() as f64;
    let control_type = layout.control_type();
    let kept_rows: Vec<usize> = layout
        .states()
        .slots()
        .iter()
        .filter(|slot| slot.name() != "q" && slot.name() != "qdot")
        .flat_map(|slot| slot.range())
        .collect();
    let mut skipped = 0usize;

    let mut blocks = Vec::with_capacity(layout.n_shooting() * (d + 1));
    for k in 0..layout.n_shooting() {
        let points: Vec<DVector<f64>> = (0..=d)
            .map(|j| iterate.state(layout.state_sample_index(k, j)))
            .collect();

        for r in 1..=d {
            let slope = points
                .iter()
                .enumerate()
                .fold(DVector::zeros(layout.n_states()), |acc, (j, x)| {
                    acc + x * basis.derivative_at(j, r)
                });
            let u = iterate.control(control_type, k, basis.fractions()[r]);
            let states_dot = match defect_type {
                DefectType::Implicit => Some(&slope / h),
                DefectType::Explicit => None,
            };
            let evaluation = evaluator.evaluate_with(
                model,
                Some(k),
                &points[r],
                &u,
                iterate.parameters,
                states_dot.as_ref(),
            )?;
            let explicit = &slope - evaluation.first_column() * h;
            match (defect_type, evaluation.defects) {
                (DefectType::Implicit, Some(defects)) => {
                    blocks.push((defects.column(0).into_owned(), false));
                    if !kept_rows.is_empty() {
                        let rows = DVector::from_iterator(kept_rows.len(), kept_rows.iter().map(|&i| explicit[i]));
                        blocks.push((rows, false));
                    }
                }
                (DefectType::Implicit, None) => {
                    skipped += 1;
                    blocks.push((explicit, true));
                }
                (DefectType::Explicit, _) => blocks.push((explicit, true)),
            }
        }

        let end = points
            .iter()
            .zip(basis.end_weights())
            .fold(DVector::zeros(layout.n_states()), |acc, (x, w)| acc + x * *w);
        let next = iterate.state(layout.state_sample_index(k + 1, 0));
        blocks.push((next - end, true));
    }
    if skipped > 0 {
        debug!(
            phase = layout.phase(),
            points = skipped,
            "implicit collocation fell back to explicit defects"
        );
    }
    Ok(blocks)
}
