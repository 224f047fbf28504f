//! Per-variant dynamics.
//!
//! Every function reads slots at model dimension, calls the model, and writes
//! derivatives back through the slot mappings. Fatigue rows are appended by
//! the evaluator afterwards.

use nalgebra::{DMatrix, DVector};
use ocp_fatigue::{FatigueList, FatigueTarget};
use ocp_types::{BiomechanicalModel, ExternalForceSet, OcpError, Result, RigidBodyDynamics};
use tracing::debug;

use super::{DynamicsEvaluation, PhaseVariables};

type Forces<'f> = [Option<&'f ExternalForceSet>];

pub(super) struct MuscleOptions {
    pub with_contact: bool,
    pub with_excitations: bool,
    pub with_residual_torque: bool,
    pub rigidbody_dynamics: RigidBodyDynamics,
}

// ====== Helpers ======

/// Place model-dimension values into one `dxdt` column, reduced through the
/// state slot mappings.
fn column(vars: &PhaseVariables<'_>, parts: &[(&str, DVector<f64>)]) -> Result<DVector<f64>> {
    let states = vars.layout().states();
    let mut placed = Vec::with_capacity(parts.len());
    let mut len = 0;
    for (name, full) in parts {
        let slot = states.slot(name)?;
        let reduced = slot.reduce(full)?;
        len = len.max(slot.range().end);
        placed.push((slot.range().start, reduced));
    }
    let mut out = DVector::zeros(len);
    for (start, values) in placed {
        out.rows_mut(start, values.len()).copy_from(&values);
    }
    Ok(out)
}

fn matrix(columns: &[DVector<f64>]) -> Result<DMatrix<f64>> {
    if columns.is_empty() {
        return Err(OcpError::invalid_config("dynamics produced no column"));
    }
    Ok(DMatrix::from_columns(columns))
}

fn forward<M: BiomechanicalModel>(
    model: &M,
    q: &DVector<f64>,
    qdot: &DVector<f64>,
    tau: &DVector<f64>,
    force: Option<&ExternalForceSet>,
    with_contact: bool,
) -> Result<DVector<f64>> {
    if with_contact {
        Ok(model.forward_dynamics_constraints_direct(q, qdot, tau, force)?.qddot)
    } else {
        model.forward_dynamics(q, qdot, tau, force)
    }
}

/// Generalized torque after torque fatigue.
fn fatigable_tau<M: BiomechanicalModel>(
    model: &M,
    vars: &PhaseVariables<'_>,
    fatigue: Option<&FatigueList>,
) -> Result<DVector<f64>> {
    let tau = if vars.has_control("tau") {
        vars.control_full("tau")?
    } else if vars.has_state("tau") {
        vars.state_full("tau")?
    } else {
        DVector::zeros(model.nb_tau())
    };
    match fatigue.and_then(|f| f.group(FatigueTarget::Torque)) {
        Some(group) => group.fatigable_tau(&tau, vars),
        None => Ok(tau),
    }
}

/// `[states_dot_q − rate_map(q, qdot); tau − ID(q, qdot, states_dot_qdot)]`, at model dimension.
fn torque_defects<M: BiomechanicalModel>(
    model: &M,
    vars: &PhaseVariables<'_>,
    states_dot: &DVector<f64>,
    dq: &DVector<f64>,
    tau: &DVector<f64>,
    forces: &Forces<'_>,
) -> Result<DMatrix<f64>> {
    let states = vars.layout().states();
    let q = vars.state_full("q")?;
    let qdot = vars.state_full("qdot")?;
    let q_dot = states.slot("q")?.get_full(states_dot)?;
    let qdot_dot = states.slot("qdot")?.get_full(states_dot)?;
    let dq_defect = &q_dot - dq;

    let mut columns = Vec::with_capacity(forces.len());
    for force in forces {
        let tau_id = model.inverse_dynamics(&q, &qdot, &qdot_dot, *force)?;
        if tau_id.len() != tau.len() {
            return Err(OcpError::dimension_mismatch("inverse dynamics torque", tau.len(), tau_id.len()));
        }
        let mut c = DVector::zeros(dq_defect.len() + tau.len());
        c.rows_mut(0, dq_defect.len()).copy_from(&dq_defect);
        c.rows_mut(dq_defect.len(), tau.len()).copy_from(&(tau - tau_id));
        columns.push(c);
    }
    matrix(&columns)
}

// ====== Variants ======

pub(super) fn torque_driven<M: BiomechanicalModel>(
    model: &M,
    vars: &PhaseVariables<'_>,
    forces: &Forces<'_>,
    with_contact: bool,
    rigidbody_dynamics: RigidBodyDynamics,
    fatigue: Option<&FatigueList>,
    states_dot: Option<&DVector<f64>>,
) -> Result<DynamicsEvaluation> {
    let q = vars.state_full("q")?;
    let qdot = vars.state_full("qdot")?;
    let dq = model.compute_qdot(&q, &qdot)?;
    let tau = fatigable_tau(model, vars, fatigue)?;

    let columns = match rigidbody_dynamics {
        RigidBodyDynamics::DaeForwardDynamics | RigidBodyDynamics::DaeInverseDynamics => {
            vec![column(vars, &[("q", dq.clone()), ("qdot", vars.control_full("qddot")?)])?]
        }
        RigidBodyDynamics::DaeForwardDynamicsJerk | RigidBodyDynamics::DaeInverseDynamicsJerk => vec![column(
            vars,
            &[
                ("q", dq.clone()),
                ("qdot", vars.state_full("qddot")?),
                ("qddot", vars.control_full("qdddot")?),
            ],
        )?],
        RigidBodyDynamics::Ode => forces
            .iter()
            .map(|force| {
                let qddot = forward(model, &q, &qdot, &tau, *force, with_contact)?;
                column(vars, &[("q", dq.clone()), ("qdot", qddot)])
            })
            .collect::<Result<_>>()?,
    };

    let defects = match states_dot {
        Some(states_dot) if !with_contact && fatigue.is_none() => {
            Some(torque_defects(model, vars, states_dot, &dq, &tau, forces)?)
        }
        Some(_) => {
            debug!(
                phase = vars.layout().phase(),
                with_contact,
                fatigue = fatigue.is_some(),
                "implicit defects skipped"
            );
            None
        }
        None => None,
    };

    Ok(DynamicsEvaluation {
        dxdt: matrix(&columns)?,
        defects,
    })
}

pub(super) fn torque_activations_driven<M: BiomechanicalModel>(
    model: &M,
    vars: &PhaseVariables<'_>,
    forces: &Forces<'_>,
    with_contact: bool,
) -> Result<DynamicsEvaluation> {
    let q = vars.state_full("q")?;
    let qdot = vars.state_full("qdot")?;
    let tau = model.torque(&vars.control_full("tau")?, &q, &qdot)?;
    let dq = model.compute_qdot(&q, &qdot)?;
    let columns = forces
        .iter()
        .map(|force| {
            let qddot = forward(model, &q, &qdot, &tau, *force, with_contact)?;
            column(vars, &[("q", dq.clone()), ("qdot", qddot)])
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DynamicsEvaluation {
        dxdt: matrix(&columns)?,
        defects: None,
    })
}

pub(super) fn torque_derivative_driven<M: BiomechanicalModel>(
    model: &M,
    vars: &PhaseVariables<'_>,
    forces: &Forces<'_>,
    with_contact: bool,
    rigidbody_dynamics: RigidBodyDynamics,
) -> Result<DynamicsEvaluation> {
    let q = vars.state_full("q")?;
    let qdot = vars.state_full("qdot")?;
    let tau = vars.state_full("tau")?;
    let dq = model.compute_qdot(&q, &qdot)?;
    let dtau = vars.control_full("taudot")?;

    let columns = match rigidbody_dynamics {
        RigidBodyDynamics::DaeForwardDynamics | RigidBodyDynamics::DaeInverseDynamics => vec![column(
            vars,
            &[
                ("q", dq),
                ("qdot", vars.state_full("qddot")?),
                ("qddot", vars.control_full("qdddot")?),
                ("tau", dtau),
            ],
        )?],
        RigidBodyDynamics::Ode => forces
            .iter()
            .map(|force| {
                let qddot = forward(model, &q, &qdot, &tau, *force, with_contact)?;
                column(vars, &[("q", dq.clone()), ("qdot", qddot), ("tau", dtau.clone())])
            })
            .collect::<Result<_>>()?,
        jerk => {
            return Err(OcpError::not_implemented(format!(
                "{jerk:?} with torque derivative dynamics"
            )));
        }
    };
    Ok(DynamicsEvaluation {
        dxdt: matrix(&columns)?,
        defects: None,
    })
}

pub(super) fn muscle_driven<M: BiomechanicalModel>(
    model: &M,
    vars: &PhaseVariables<'_>,
    forces: &Forces<'_>,
    options: &MuscleOptions,
    fatigue: Option<&FatigueList>,
) -> Result<DynamicsEvaluation> {
    if options.rigidbody_dynamics.is_jerk() {
        return Err(OcpError::not_implemented(format!(
            "{:?} with muscle dynamics",
            options.rigidbody_dynamics
        )));
    }
    let q = vars.state_full("q")?;
    let qdot = vars.state_full("qdot")?;

    let mut activations = if options.with_excitations {
        vars.state_full("muscles")?
    } else {
        vars.control_full("muscles")?
    };
    if let Some(group) = fatigue.and_then(|f| f.group(FatigueTarget::Muscle)) {
        activations = group.fatigable_activations(&activations, vars)?;
    }
    let mut tau = model.muscular_joint_torque(&activations, &q, &qdot)?;
    if options.with_residual_torque {
        tau += fatigable_tau(model, vars, fatigue)?;
    }
    let dq = model.compute_qdot(&q, &qdot)?;

    let activation_dot = if options.with_excitations {
        Some(model.muscle_activation_dot(&vars.control_full("muscles")?, &vars.state_full("muscles")?)?)
    } else {
        None
    };
    let with_activation = |mut parts: Vec<(&'static str, DVector<f64>)>| {
        if let Some(adot) = &activation_dot {
            parts.push(("muscles", adot.clone()));
        }
        column(vars, &parts)
    };

    let columns = if options.rigidbody_dynamics.is_dae() {
        vec![with_activation(vec![("q", dq), ("qdot", vars.control_full("qddot")?)])?]
    } else {
        forces
            .iter()
            .map(|force| {
                let qddot = forward(model, &q, &qdot, &tau, *force, options.with_contact)?;
                with_activation(vec![("q", dq.clone()), ("qdot", qddot)])
            })
            .collect::<Result<_>>()?
    };
    Ok(DynamicsEvaluation {
        dxdt: matrix(&columns)?,
        defects: None,
    })
}

pub(super) fn joints_acceleration_driven<M: BiomechanicalModel>(
    model: &M,
    vars: &PhaseVariables<'_>,
    rigidbody_dynamics: RigidBodyDynamics,
) -> Result<DynamicsEvaluation> {
    if rigidbody_dynamics.is_dae() {
        return Err(OcpError::not_implemented(
            "implicit joints acceleration dynamics",
        ));
    }
    let q = vars.state_full("q")?;
    let qdot = vars.state_full("qdot")?;
    let qddot_joints = vars.control_full("qddot_joints")?;
    let qddot_root = model.forward_dynamics_free_floating_base(&q, &qdot, &qddot_joints)?;

    let n_root = qddot_root.len();
    let mut qddot = DVector::zeros(n_root + qddot_joints.len());
    qddot.rows_mut(0, n_root).copy_from(&qddot_root);
    qddot.rows_mut(n_root, qddot_joints.len()).copy_from(&qddot_joints);

    Ok(DynamicsEvaluation::explicit(column(
        vars,
        &[("q", qdot), ("qdot", qddot)],
    )?))
}

// ====== Contact forces ======

fn contact_columns<M: BiomechanicalModel>(
    model: &M,
    q: &DVector<f64>,
    qdot: &DVector<f64>,
    tau: &DVector<f64>,
    forces: &Forces<'_>,
) -> Result<DMatrix<f64>> {
    let columns = forces
        .iter()
        .map(|force| model.contact_forces(q, qdot, tau, *force))
        .collect::<Result<Vec<_>>>()?;
    matrix(&columns)
}

/// Contact forces of torque-driven dynamics, `tau` read from the states or the controls.
pub fn contact_forces_from_torque_driven<M: BiomechanicalModel>(
    model: &M,
    vars: &PhaseVariables<'_>,
    forces: &[Option<&ExternalForceSet>],
) -> Result<DMatrix<f64>> {
    let q = vars.get("q")?;
    let qdot = vars.get("qdot")?;
    let tau = vars.get("tau")?;
    contact_columns(model, &q, &qdot, &tau, forces)
}

/// Contact forces of torque-activation dynamics.
pub fn contact_forces_from_torque_activation_driven<M: BiomechanicalModel>(
    model: &M,
    vars: &PhaseVariables<'_>,
    forces: &[Option<&ExternalForceSet>],
) -> Result<DMatrix<f64>> {
    let q = vars.get("q")?;
    let qdot = vars.get("qdot")?;
    let tau = model.torque(&vars.get("tau")?, &q, &qdot)?;
    contact_columns(model, &q, &qdot, &tau, forces)
}

/// Contact forces of muscle dynamics, residual torques included when declared.
pub fn contact_forces_from_muscle_driven<M: BiomechanicalModel>(
    model: &M,
    vars: &PhaseVariables<'_>,
    forces: &[Option<&ExternalForceSet>],
) -> Result<DMatrix<f64>> {
    let q = vars.get("q")?;
    let qdot = vars.get("qdot")?;
    let mut tau = model.muscular_joint_torque(&vars.get("muscles")?, &q, &qdot)?;
    if vars.has_control("tau") {
        tau += vars.control_full("tau")?;
    }
    contact_columns(model, &q, &qdot, &tau, forces)
}
