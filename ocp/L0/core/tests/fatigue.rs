//! Fatigue-augmented dynamics through the evaluator and the program.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]

use approx::assert_relative_eq;
use nalgebra::DVector;
use ocp_core::prelude::*;
use ocp_core::{configure, PhaseVariables};
use ocp_model::ArticulatedModel;

const TAU_MAX: f64 = 50.0;

fn torque_fatigue(state_only: bool) -> FatigueList {
    let mut list = FatigueList::new();
    for _ in 0..2 {
        list.add(MultiFatigueModel::xia_torque(XiaFatigue::default(), TAU_MAX).state_only(state_only));
    }
    list
}

fn evaluator(model: &ArticulatedModel, dynamics: Dynamics<ArticulatedModel>) -> DynamicsEvaluator<ArticulatedModel> {
    let decls = configure(model, &dynamics).unwrap();
    let spec = PhaseSpec::new(0, PhaseConfig::new(4, 1.0), decls.states, decls.controls);
    DynamicsEvaluator::new(&PhaseLayout::build(spec).unwrap(), dynamics, ParameterList::new()).unwrap()
}

/// Pendulum state followed by the `minus` then `plus` fatigue states.
fn fatigued_state(q: &[f64; 2], qdot: &[f64; 2], ma: [[f64; 2]; 2], mr: f64, mf: f64) -> DVector<f64> {
    let mut x = vec![q[0], q[1], qdot[0], qdot[1]];
    for side in ma {
        x.extend_from_slice(&side);
        x.extend_from_slice(&[mr, mr]);
        x.extend_from_slice(&[mf, mf]);
    }
    DVector::from_vec(x)
}

#[test]
fn heterogeneous_state_only_is_a_configuration_error() {
    let mut list = FatigueList::new();
    list.add(MultiFatigueModel::xia_torque(XiaFatigue::default(), TAU_MAX).state_only(true));
    list.add(MultiFatigueModel::xia_torque(XiaFatigue::default(), TAU_MAX).state_only(false));
    let phase = PhaseDefinition::new(
        PhaseConfig::new(3, 1.0),
        Dynamics::new(DynamicsVariant::torque_driven()).with_fatigue(list),
    );
    let err = OptimalControlProgram::new(ArticulatedModel::pendulum().unwrap(), vec![phase], ParameterList::new())
        .err()
        .unwrap();
    assert!(err.is_config_error());
    assert!(matches!(err, OcpError::HeterogeneousFatigue { .. }));
}

#[test]
fn torque_fatigue_rows_follow_base_rows() {
    let mut model = ArticulatedModel::pendulum().unwrap();
    let dynamics = Dynamics::new(DynamicsVariant::torque_driven()).with_fatigue(torque_fatigue(true));
    let ev = evaluator(&model, dynamics);
    let layout = ev.layout().clone();
    assert_eq!(layout.n_states(), 4 + 12);
    let names: Vec<&str> = layout.controls().names().collect();
    assert_eq!(names, vec!["tau_minus", "tau_plus"]);

    let x = fatigued_state(&[0.0, 0.2], &[0.1, 0.0], [[0.1, 0.3], [0.1, 0.3]], 0.8, 0.1);
    let u = DVector::from_vec(vec![-10.0, -5.0, 0.0, 20.0]);
    let out = ev.evaluate(&mut model, &x, &u, &DVector::zeros(0), None).unwrap();
    let dxdt = out.first_column();
    assert_eq!(dxdt.len(), 16);

    // state_only: the split controls are summed
    let q = DVector::from_vec(vec![0.0, 0.2]);
    let qdot = DVector::from_vec(vec![0.1, 0.0]);
    let tau = DVector::from_vec(vec![-10.0, 15.0]);
    let qddot = model.forward_dynamics(&q, &qdot, &tau, None).unwrap();
    assert_relative_eq!(dxdt.rows(2, 2).into_owned(), qddot, epsilon = 1e-12);

    let vars = PhaseVariables::new(&layout, &x, &u).unwrap();
    let expected = torque_fatigue(true)
        .dynamics(dxdt.rows(0, 4).into_owned(), &vars)
        .unwrap();
    assert_relative_eq!(dxdt, expected, epsilon = 1e-12);
}

#[test]
fn fatigue_states_drive_torque_when_not_state_only() {
    let mut model = ArticulatedModel::pendulum().unwrap();
    let dynamics = Dynamics::new(DynamicsVariant::torque_driven()).with_fatigue(torque_fatigue(false));
    let ev = evaluator(&model, dynamics);

    let x = fatigued_state(&[0.0, 0.0], &[0.0, 0.0], [[0.2, 0.0], [0.0, 0.4]], 0.5, 0.0);
    let u = DVector::from_vec(vec![-1.0, -1.0, 1.0, 1.0]);
    let dxdt = ev
        .evaluate(&mut model, &x, &u, &DVector::zeros(0), None)
        .unwrap()
        .first_column();

    // minus scaling is -TAU_MAX, plus is TAU_MAX
    let tau = DVector::from_vec(vec![0.2 * -TAU_MAX, 0.4 * TAU_MAX]);
    let q = DVector::zeros(2);
    let qddot = model.forward_dynamics(&q, &q, &tau, None).unwrap();
    assert_relative_eq!(dxdt.rows(2, 2).into_owned(), qddot, epsilon = 1e-12);
}

#[test]
fn muscle_fatigue_replaces_activations() {
    let mut model = ArticulatedModel::arm().unwrap();
    let mut list = FatigueList::new();
    for _ in 0..3 {
        list.add(MultiFatigueModel::muscle(XiaFatigue::default()));
    }
    let ev = evaluator(&model, Dynamics::new(DynamicsVariant::muscle_driven()).with_fatigue(list));
    let layout = ev.layout();
    assert_eq!(layout.n_states(), 4 + 9);
    assert!(layout.states().contains("muscles_ma"));

    let mut x = DVector::zeros(13);
    x[4] = 0.3;
    x[5] = 0.6;
    x[6] = 0.9;
    let low = DVector::from_element(3, 0.1);
    let high = DVector::from_element(3, 0.9);
    let a = ev.evaluate(&mut model, &x, &low, &DVector::zeros(0), None).unwrap().first_column();
    let b = ev.evaluate(&mut model, &x, &high, &DVector::zeros(0), None).unwrap().first_column();
    // joint rows only see the fatigue states
    assert_relative_eq!(a.rows(0, 4).into_owned(), b.rows(0, 4).into_owned(), epsilon = 1e-12);
    // fatigue rows see the command
    assert!((a.rows(4, 9) - b.rows(4, 9)).norm() > 0.0);
}

#[test]
fn fatigue_group_size_must_match_actuators() {
    let model = ArticulatedModel::arm().unwrap();
    let list = FatigueList::new()
        .with(MultiFatigueModel::muscle(XiaFatigue::default()))
        .with(MultiFatigueModel::muscle(XiaFatigue::default()));
    let dynamics = Dynamics::new(DynamicsVariant::muscle_driven()).with_fatigue(list);
    assert!(matches!(
        configure(&model, &dynamics),
        Err(OcpError::DimensionMismatch { .. })
    ));
}

#[test]
fn torque_fatigue_on_activation_dynamics_is_not_implemented() {
    let model = ArticulatedModel::pendulum().unwrap();
    let dynamics = Dynamics::new(DynamicsVariant::TorqueActivationsDriven { with_contact: false })
        .with_fatigue(torque_fatigue(false));
    assert!(configure(&model, &dynamics).unwrap_err().is_not_implemented());
}

#[test]
fn fatigue_slots_are_checked_when_the_evaluator_is_built() {
    let model = ArticulatedModel::pendulum().unwrap();
    let dynamics = Dynamics::new(DynamicsVariant::torque_driven()).with_fatigue(torque_fatigue(true));
    let decls = configure(&model, &dynamics).unwrap();

    // last fatigue slot one actuator short
    let mut states = decls.states.clone();
    let last = states.pop().unwrap();
    states.push(SlotDecl::new(last.name, 1));
    let spec = PhaseSpec::new(0, PhaseConfig::new(4, 1.0), states, decls.controls.clone());
    let layout = PhaseLayout::build(spec).unwrap();
    let err = DynamicsEvaluator::new(&layout, dynamics.clone(), ParameterList::new()).unwrap_err();
    assert!(matches!(err, OcpError::DimensionMismatch { expected: 11, actual: 12, .. }));

    // fatigue slots missing altogether
    let plain = configure(&model, &Dynamics::new(DynamicsVariant::torque_driven())).unwrap();
    let spec = PhaseSpec::new(0, PhaseConfig::new(4, 1.0), plain.states, decls.controls);
    let layout = PhaseLayout::build(spec).unwrap();
    assert!(matches!(
        DynamicsEvaluator::new(&layout, dynamics, ParameterList::new()),
        Err(OcpError::UnknownVariable { .. })
    ));
}
