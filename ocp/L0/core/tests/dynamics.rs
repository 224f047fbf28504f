//! Dynamics variants evaluated against the reference articulated model.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names,
    clippy::cast_precision_loss
)]

use approx::assert_relative_eq;
use nalgebra::DVector;
use ocp_core::prelude::*;
use ocp_core::{configure, DynamicsEvaluation};
use ocp_model::ArticulatedModel;

fn v(values: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(values)
}

fn evaluator(
    model: &ArticulatedModel,
    dynamics: Dynamics<ArticulatedModel>,
    n_shooting: usize,
    parameters: ParameterList<ArticulatedModel>,
) -> DynamicsEvaluator<ArticulatedModel> {
    let decls = configure(model, &dynamics).unwrap();
    let spec = PhaseSpec::new(0, PhaseConfig::new(n_shooting, 1.0), decls.states, decls.controls);
    let layout = PhaseLayout::build(spec).unwrap();
    DynamicsEvaluator::new(&layout, dynamics, parameters).unwrap()
}

fn no_params() -> DVector<f64> {
    DVector::zeros(0)
}

// ── Torque driven ─────────────────────────────────────────────────

#[test]
fn torque_driven_matches_forward_dynamics() {
    let mut model = ArticulatedModel::pendulum().unwrap();
    let ev = evaluator(&model, Dynamics::new(DynamicsVariant::torque_driven()), 3, ParameterList::new());
    let (q, qdot, tau) = (v(&[0.1, 0.3]), v(&[0.0, -0.2]), v(&[1.0, 2.0]));
    let x = v(&[0.1, 0.3, 0.0, -0.2]);

    let out = ev.evaluate(&mut model, &x, &tau, &no_params(), None).unwrap();
    assert_eq!(out.dxdt.shape(), (4, 1));
    assert!(out.defects.is_none());

    let dq = model.compute_qdot(&q, &qdot).unwrap();
    let qddot = model.forward_dynamics(&q, &qdot, &tau, None).unwrap();
    let dxdt = out.first_column();
    assert_relative_eq!(dxdt.rows(0, 2).into_owned(), dq, epsilon = 1e-12);
    assert_relative_eq!(dxdt.rows(2, 2).into_owned(), qddot, epsilon = 1e-12);
}

#[test]
fn dae_forward_reads_accelerations_and_returns_defects() {
    let mut model = ArticulatedModel::pendulum().unwrap();
    let variant = DynamicsVariant::TorqueDriven {
        with_contact: false,
        rigidbody_dynamics: RigidBodyDynamics::DaeForwardDynamics,
    };
    let ev = evaluator(&model, Dynamics::new(variant), 3, ParameterList::new());
    assert_eq!(ev.layout().n_controls(), 4);

    let (q, qdot, qddot) = (v(&[0.2, -0.1]), v(&[0.5, 0.0]), v(&[1.0, -2.0]));
    let tau = model.inverse_dynamics(&q, &qdot, &qddot, None).unwrap();
    let x = v(&[0.2, -0.1, 0.5, 0.0]);
    let u = v(&[tau[0], tau[1], qddot[0], qddot[1]]);

    let out = ev.evaluate(&mut model, &x, &u, &no_params(), None).unwrap();
    assert_relative_eq!(out.first_column().rows(2, 2).into_owned(), qddot, epsilon = 1e-12);

    let dq = model.compute_qdot(&q, &qdot).unwrap();
    let states_dot = v(&[dq[0], dq[1], qddot[0], qddot[1]]);
    let out = ev.evaluate(&mut model, &x, &u, &no_params(), Some(&states_dot)).unwrap();
    let defects = out.defects.unwrap();
    assert_eq!(defects.nrows(), 4);
    assert_relative_eq!(defects.norm(), 0.0, epsilon = 1e-10);
}

#[test]
fn implicit_defects_skipped_with_contact() {
    let mut model = ArticulatedModel::pendulum().unwrap().with_contact(0).unwrap();
    let variant = DynamicsVariant::TorqueDriven {
        with_contact: true,
        rigidbody_dynamics: RigidBodyDynamics::Ode,
    };
    let ev = evaluator(&model, Dynamics::new(variant), 2, ParameterList::new());
    let x = v(&[0.0, 0.1, 0.0, 0.0]);
    let out = ev
        .evaluate(&mut model, &x, &v(&[0.0, 0.0]), &no_params(), Some(&DVector::zeros(4)))
        .unwrap();
    assert!(out.defects.is_none());
    // the contact locks DOF 0
    assert_relative_eq!(out.first_column()[2], 0.0, epsilon = 1e-12);
}

#[test]
fn implicit_defects_skipped_with_fatigue() {
    let mut model = ArticulatedModel::pendulum().unwrap();
    let variant = DynamicsVariant::TorqueDriven {
        with_contact: false,
        rigidbody_dynamics: RigidBodyDynamics::DaeForwardDynamics,
    };
    let fatigue = FatigueList::new()
        .with(MultiFatigueModel::xia_torque(XiaFatigue::default(), 50.0).state_only(true))
        .with(MultiFatigueModel::xia_torque(XiaFatigue::default(), 50.0).state_only(true));
    let ev = evaluator(&model, Dynamics::new(variant).with_fatigue(fatigue), 2, ParameterList::new());
    // q, qdot, then ma/mr/mf for minus and plus
    assert_eq!(ev.layout().n_states(), 4 + 12);
    // tau_minus, tau_plus, qddot
    assert_eq!(ev.layout().n_controls(), 6);

    let mut x = DVector::zeros(16);
    for i in 0..2 {
        x[4 + 2 + i] = 1.0;
        x[10 + 2 + i] = 1.0;
    }
    let u = v(&[-1.0, -1.0, 2.0, 2.0, 0.5, -0.5]);
    let out = ev
        .evaluate(&mut model, &x, &u, &no_params(), Some(&DVector::zeros(16)))
        .unwrap();
    assert!(out.defects.is_none());

    let dxdt = out.first_column();
    assert_eq!(dxdt.len(), 16);
    assert_relative_eq!(dxdt.rows(2, 2).into_owned(), v(&[0.5, -0.5]), epsilon = 1e-12);
    // loads of 1/50 on fully rested actuators start activating
    assert!(dxdt.rows(4, 2).iter().all(|&d| d > 0.0));
    assert!(dxdt.rows(10, 2).iter().all(|&d| d > 0.0));
}

#[test]
fn torque_activations_scale_by_model_torque() {
    let mut model = ArticulatedModel::pendulum().unwrap();
    let ev = evaluator(
        &model,
        Dynamics::new(DynamicsVariant::TorqueActivationsDriven { with_contact: false }),
        2,
        ParameterList::new(),
    );
    let (q, qdot, act) = (v(&[0.0, 0.4]), v(&[0.1, 0.1]), v(&[0.5, -0.25]));
    let x = v(&[0.0, 0.4, 0.1, 0.1]);
    let out = ev.evaluate(&mut model, &x, &act, &no_params(), None).unwrap();

    let tau = model.torque(&act, &q, &qdot).unwrap();
    let qddot = model.forward_dynamics(&q, &qdot, &tau, None).unwrap();
    assert_relative_eq!(out.first_column().rows(2, 2).into_owned(), qddot, epsilon = 1e-12);
}

#[test]
fn torque_derivative_integrates_tau() {
    let mut model = ArticulatedModel::pendulum().unwrap();
    let variant = DynamicsVariant::TorqueDerivativeDriven {
        with_contact: false,
        rigidbody_dynamics: RigidBodyDynamics::Ode,
    };
    let ev = evaluator(&model, Dynamics::new(variant), 2, ParameterList::new());
    assert_eq!(ev.layout().n_states(), 6);
    let x = v(&[0.0, 0.0, 0.0, 0.0, 3.0, 1.0]);
    let out = ev.evaluate(&mut model, &x, &v(&[7.0, -7.0]), &no_params(), None).unwrap();
    let dxdt = out.first_column();
    assert_eq!((dxdt[4], dxdt[5]), (7.0, -7.0));
}

// ── Muscles and free-floating bases ───────────────────────────────

#[test]
fn muscle_excitations_append_activation_rows() {
    let mut model = ArticulatedModel::arm().unwrap();
    let variant = DynamicsVariant::MuscleDriven {
        with_contact: false,
        with_excitations: true,
        with_residual_torque: false,
        rigidbody_dynamics: RigidBodyDynamics::Ode,
    };
    let ev = evaluator(&model, Dynamics::new(variant), 2, ParameterList::new());
    assert_eq!(ev.layout().n_states(), 7);

    let (q, qdot) = (v(&[0.1, 0.2]), v(&[0.0, 0.0]));
    let activations = v(&[0.2, 0.4, 0.6]);
    let excitations = v(&[1.0, 0.0, 0.5]);
    let x = v(&[0.1, 0.2, 0.0, 0.0, 0.2, 0.4, 0.6]);
    let out = ev.evaluate(&mut model, &x, &excitations, &no_params(), None).unwrap();
    let dxdt = out.first_column();

    let tau = model.muscular_joint_torque(&activations, &q, &qdot).unwrap();
    let qddot = model.forward_dynamics(&q, &qdot, &tau, None).unwrap();
    let adot = model.muscle_activation_dot(&excitations, &activations).unwrap();
    assert_relative_eq!(dxdt.rows(2, 2).into_owned(), qddot, epsilon = 1e-12);
    assert_relative_eq!(dxdt.rows(4, 3).into_owned(), adot, epsilon = 1e-12);
}

#[test]
fn muscle_dae_reads_accelerations_from_controls() {
    for rigidbody_dynamics in [RigidBodyDynamics::DaeForwardDynamics, RigidBodyDynamics::DaeInverseDynamics] {
        let mut model = ArticulatedModel::arm().unwrap();
        let variant = DynamicsVariant::MuscleDriven {
            with_contact: false,
            with_excitations: false,
            with_residual_torque: false,
            rigidbody_dynamics,
        };
        let ev = evaluator(&model, Dynamics::new(variant), 2, ParameterList::new());
        let names: Vec<&str> = ev.layout().controls().names().collect();
        assert_eq!(names, vec!["qddot", "muscles"]);

        let x = v(&[0.1, 0.2, 0.3, 0.0]);
        let u = v(&[1.5, -0.5, 0.2, 0.4, 0.6]);
        let dxdt = ev.evaluate(&mut model, &x, &u, &no_params(), None).unwrap().first_column();
        assert_eq!(dxdt.len(), 4);
        assert_relative_eq!(dxdt.rows(2, 2).into_owned(), v(&[1.5, -0.5]), epsilon = 1e-12);
    }
}

#[test]
fn joints_acceleration_recovers_root() {
    let mut model = ArticulatedModel::floating(2).unwrap();
    let variant = DynamicsVariant::JointsAccelerationDriven {
        rigidbody_dynamics: RigidBodyDynamics::Ode,
    };
    let ev = evaluator(&model, Dynamics::new(variant), 2, ParameterList::new());
    assert_eq!(ev.layout().n_controls(), 2);

    let q = v(&[0.0, 1.0, 0.1, 0.2, -0.2]);
    let qdot = DVector::zeros(5);
    let joints = v(&[0.5, -0.5]);
    let mut x = DVector::zeros(10);
    x.rows_mut(0, 5).copy_from(&q);
    let out = ev.evaluate(&mut model, &x, &joints, &no_params(), None).unwrap();
    let dxdt = out.first_column();

    let root = model.forward_dynamics_free_floating_base(&q, &qdot, &joints).unwrap();
    assert_relative_eq!(dxdt.rows(5, 3).into_owned(), root, epsilon = 1e-12);
    assert_relative_eq!(dxdt.rows(8, 2).into_owned(), joints, epsilon = 1e-12);
}

// ── External forces, contacts, parameters ─────────────────────────

#[test]
fn one_column_per_external_force_set() {
    let mut model = ArticulatedModel::pendulum().unwrap();
    let forces = (0..3)
        .map(|k| ExternalForceSet::new(format!("push {k}"), v(&[k as f64, 0.0])))
        .collect();
    let dynamics = Dynamics::new(DynamicsVariant::torque_driven()).with_external_forces(forces);
    let ev = evaluator(&model, dynamics, 3, ParameterList::new());
    let x = DVector::zeros(4);
    let tau = DVector::zeros(2);

    let all = ev.evaluate(&mut model, &x, &tau, &no_params(), None).unwrap();
    assert_eq!(all.dxdt.ncols(), 3);
    for k in 0..3 {
        let one = ev.evaluate_node(&mut model, k, &x, &tau, &no_params(), None).unwrap();
        assert_relative_eq!(one.first_column(), all.dxdt.column(k).into_owned(), epsilon = 1e-12);
    }
    // terminal node reuses the last set
    let last = ev.evaluate_node(&mut model, 3, &x, &tau, &no_params(), None).unwrap();
    assert_relative_eq!(last.first_column(), all.dxdt.column(2).into_owned(), epsilon = 1e-12);
}

#[test]
fn external_force_count_must_match_shooting() {
    let model = ArticulatedModel::pendulum().unwrap();
    let forces = vec![ExternalForceSet::new("a", v(&[0.0, 0.0])); 2];
    let dynamics = Dynamics::new(DynamicsVariant::torque_driven()).with_external_forces(forces);
    let decls = configure(&model, &dynamics).unwrap();
    let layout = PhaseLayout::build(PhaseSpec::new(0, PhaseConfig::new(3, 1.0), decls.states, decls.controls)).unwrap();
    let err = DynamicsEvaluator::new(&layout, dynamics, ParameterList::new()).unwrap_err();
    assert!(matches!(err, OcpError::DimensionMismatch { .. }));
}

#[test]
fn contact_forces_follow_the_model() {
    let mut model = ArticulatedModel::pendulum().unwrap().with_contact(0).unwrap();
    let variant = DynamicsVariant::TorqueDriven {
        with_contact: true,
        rigidbody_dynamics: RigidBodyDynamics::Ode,
    };
    let ev = evaluator(&model, Dynamics::new(variant), 2, ParameterList::new());
    let (q, qdot, tau) = (v(&[0.0, 0.3]), v(&[0.0, 0.0]), v(&[2.0, 0.0]));
    let x = v(&[0.0, 0.3, 0.0, 0.0]);
    let forces = ev.contact_forces(&mut model, Some(0), &x, &tau, &no_params()).unwrap();
    let expected = model.contact_forces(&q, &qdot, &tau, None).unwrap();
    assert_eq!(forces.shape(), (1, 1));
    assert_relative_eq!(forces[(0, 0)], expected[0], epsilon = 1e-12);

    let free = evaluator(&model, Dynamics::new(DynamicsVariant::torque_driven()), 2, ParameterList::new());
    assert!(free.contact_forces(&mut model, Some(0), &x, &tau, &no_params()).is_err());
}

#[test]
fn parameters_are_applied_before_evaluation() {
    let mut model = ArticulatedModel::pendulum().unwrap();
    let params = ParameterList::new()
        .with(Parameter::new("mass", 1).init(vec![1.0]).callback(|m: &mut ArticulatedModel, p| {
            m.set_mass_scale(p[0])
        }))
        .unwrap();
    let ev = evaluator(&model, Dynamics::new(DynamicsVariant::torque_driven()), 2, params);
    let x = DVector::zeros(4);
    let tau = v(&[1.0, 0.0]);

    let light = ev.evaluate(&mut model, &x, &tau, &v(&[1.0]), None).unwrap().first_column();
    let heavy = ev.evaluate(&mut model, &x, &tau, &v(&[2.0]), None).unwrap().first_column();
    assert_eq!(model.mass_scale(), 2.0);
    assert!(heavy[2].abs() < light[2].abs());
    assert!(ev.evaluate(&mut model, &x, &tau, &no_params(), None).is_err());
}

#[test]
fn custom_dynamics_row_count_checked() {
    let mut model = ArticulatedModel::pendulum().unwrap();
    let custom = CustomDynamics::new(
        vec![SlotDecl::new("x", 2)],
        vec![SlotDecl::new("u", 1)],
        |_m: &ArticulatedModel, _inputs| Ok(DynamicsEvaluation::explicit(DVector::zeros(3))),
    );
    let ev = evaluator(&model, Dynamics::new(DynamicsVariant::Custom(custom)), 2, ParameterList::new());
    let err = ev
        .evaluate(&mut model, &DVector::zeros(2), &DVector::zeros(1), &no_params(), None)
        .unwrap_err();
    assert!(matches!(err, OcpError::DimensionMismatch { .. }));
}

// ── Unsupported combinations ──────────────────────────────────────

#[test]
fn unsupported_combinations_are_not_implemented() {
    let pendulum = ArticulatedModel::pendulum().unwrap();
    let jerk_derivative = Dynamics::new(DynamicsVariant::TorqueDerivativeDriven {
        with_contact: false,
        rigidbody_dynamics: RigidBodyDynamics::DaeInverseDynamicsJerk,
    });
    assert!(configure(&pendulum, &jerk_derivative).unwrap_err().is_not_implemented());

    let floating = ArticulatedModel::floating(1).unwrap();
    let implicit_joints = Dynamics::new(DynamicsVariant::JointsAccelerationDriven {
        rigidbody_dynamics: RigidBodyDynamics::DaeForwardDynamics,
    });
    assert!(configure(&floating, &implicit_joints).unwrap_err().is_not_implemented());

    let muscles_on_pendulum = Dynamics::new(DynamicsVariant::muscle_driven());
    assert!(configure(&pendulum, &muscles_on_pendulum).unwrap_err().is_config_error());
}
