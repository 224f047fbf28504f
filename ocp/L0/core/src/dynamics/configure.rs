//! State and control slots required by each dynamics variant.
//!
//! Slots are sized from the model, mapped by name from
//! [`Dynamics::mappings`](super::Dynamics), and ordered so that fatigue states
//! come last, group by group, in the row order of the fatigue dynamics.

use ocp_fatigue::{FatigueGroup, FatigueTarget};
use ocp_types::{BiomechanicalModel, OcpError, Result, RigidBodyDynamics};
use tracing::debug;

use super::{Dynamics, DynamicsVariant};
use crate::variable::SlotDecl;

/// Slots of one phase, before layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableDecls {
    /// State slots in buffer order.
    pub states: Vec<SlotDecl>,
    /// Control slots in buffer order.
    pub controls: Vec<SlotDecl>,
}

impl VariableDecls {
    fn state(&mut self, decl: SlotDecl) {
        self.states.push(decl);
    }

    fn control(&mut self, decl: SlotDecl) {
        self.controls.push(decl);
    }
}

struct Declarer<'d, M> {
    dynamics: &'d Dynamics<M>,
}

impl<M> Declarer<'_, M> {
    fn slot(&self, name: &str, size: usize) -> SlotDecl {
        SlotDecl::new(name, size).with_mapping(self.dynamics.mappings.get(name).cloned())
    }

    fn bounded(&self, name: &str, size: usize, min: f64, max: f64, init: f64) -> SlotDecl {
        let decl = self.slot(name, size);
        let n = decl.size();
        decl.with_defaults(vec![min; n], vec![max; n], vec![init; n])
    }
}

/// Declare the slots of `dynamics` for `model`.
pub fn configure<M: BiomechanicalModel>(model: &M, dynamics: &Dynamics<M>) -> Result<VariableDecls> {
    dynamics.validate()?;
    let variant = &dynamics.variant;
    if variant.with_contact() && model.nb_contacts() == 0 {
        return Err(OcpError::invalid_config(format!(
            "{} with contact on a model without contact",
            variant.name()
        )));
    }

    let d = Declarer { dynamics };
    let mut decls = VariableDecls::default();
    let (nb_q, nb_qdot, nb_qddot, nb_tau) = (model.nb_q(), model.nb_qdot(), model.nb_qddot(), model.nb_tau());
    let tau_group = dynamics
        .fatigue_list()
        .and_then(|f| f.group(FatigueTarget::Torque));

    match variant {
        DynamicsVariant::TorqueDriven {
            rigidbody_dynamics, ..
        } => {
            decls.state(d.slot("q", nb_q));
            decls.state(d.slot("qdot", nb_qdot));
            if rigidbody_dynamics.is_jerk() {
                decls.state(d.slot("qddot", nb_qddot));
            }
            torque_controls(&d, &mut decls, tau_group, nb_tau)?;
            match rigidbody_dynamics {
                RigidBodyDynamics::DaeForwardDynamics | RigidBodyDynamics::DaeInverseDynamics => {
                    decls.control(d.slot("qddot", nb_qddot));
                }
                RigidBodyDynamics::DaeForwardDynamicsJerk | RigidBodyDynamics::DaeInverseDynamicsJerk => {
                    decls.control(d.slot("qdddot", nb_qddot));
                }
                RigidBodyDynamics::Ode => {}
            }
        }
        DynamicsVariant::TorqueActivationsDriven { .. } => {
            decls.state(d.slot("q", nb_q));
            decls.state(d.slot("qdot", nb_qdot));
            decls.control(d.bounded("tau", nb_tau, -1.0, 1.0, 0.0));
        }
        DynamicsVariant::TorqueDerivativeDriven {
            rigidbody_dynamics, ..
        } => {
            if rigidbody_dynamics.is_jerk() {
                return Err(OcpError::not_implemented(format!(
                    "{rigidbody_dynamics:?} with torque derivative dynamics"
                )));
            }
            decls.state(d.slot("q", nb_q));
            decls.state(d.slot("qdot", nb_qdot));
            decls.state(d.slot("tau", nb_tau));
            if rigidbody_dynamics.is_dae() {
                decls.state(d.slot("qddot", nb_qddot));
            }
            decls.control(d.slot("taudot", nb_tau));
            if rigidbody_dynamics.is_dae() {
                decls.control(d.slot("qdddot", nb_qddot));
            }
        }
        DynamicsVariant::MuscleDriven {
            with_excitations,
            with_residual_torque,
            rigidbody_dynamics,
            ..
        } => {
            if rigidbody_dynamics.is_jerk() {
                return Err(OcpError::not_implemented(format!(
                    "{rigidbody_dynamics:?} with muscle dynamics"
                )));
            }
            let nb_muscles = model.nb_muscles();
            if nb_muscles == 0 {
                return Err(OcpError::invalid_config("muscle dynamics on a model without muscles"));
            }
            decls.state(d.slot("q", nb_q));
            decls.state(d.slot("qdot", nb_qdot));
            if *with_excitations {
                decls.state(d.bounded("muscles", nb_muscles, 0.0, 1.0, 0.5));
            }
            if *with_residual_torque {
                torque_controls(&d, &mut decls, tau_group, nb_tau)?;
            }
            if rigidbody_dynamics.is_dae() {
                decls.control(d.slot("qddot", nb_qddot));
            }
            decls.control(d.bounded("muscles", nb_muscles, 0.0, 1.0, 0.5));
            if let Some(group) = dynamics.fatigue_list().and_then(|f| f.group(FatigueTarget::Muscle)) {
                check_group_size(group, nb_muscles)?;
            }
        }
        DynamicsVariant::JointsAccelerationDriven { rigidbody_dynamics } => {
            if rigidbody_dynamics.is_dae() {
                return Err(OcpError::not_implemented("implicit joints acceleration dynamics"));
            }
            let nb_root = model.nb_root();
            if nb_root == 0 || nb_root > nb_qddot {
                return Err(OcpError::invalid_config(format!(
                    "joints acceleration dynamics needs a free-floating root, model has {nb_root} root dofs"
                )));
            }
            decls.state(d.slot("q", nb_q));
            decls.state(d.slot("qdot", nb_qdot));
            decls.control(d.slot("qddot_joints", nb_qddot - nb_root));
        }
        DynamicsVariant::Custom(custom) => {
            decls.states.clone_from(&custom.states);
            decls.controls.clone_from(&custom.controls);
        }
    }

    if let Some(fatigue) = dynamics.fatigue_list() {
        for group in fatigue.groups() {
            for slot in group.state_slots()? {
                let size = slot.size();
                decls.state(SlotDecl::new(slot.name, size).with_defaults(slot.min, slot.max, slot.init));
            }
        }
    }

    if let Some(name) = dynamics
        .mappings
        .keys()
        .find(|name| !decls.states.iter().chain(&decls.controls).any(|s| &s.name == *name))
    {
        return Err(OcpError::unknown(format!("mapping of {name}")));
    }

    debug!(
        variant = variant.name(),
        states = decls.states.len(),
        controls = decls.controls.len(),
        "dynamics configured"
    );
    Ok(decls)
}

fn check_group_size(group: &FatigueGroup, expected: usize) -> Result<()> {
    if group.len() == expected {
        Ok(())
    } else {
        Err(OcpError::dimension_mismatch(
            format!("{} fatigue models", group.target()),
            expected,
            group.len(),
        ))
    }
}

/// `tau`, or one control per fatigue suffix when the torque group splits controls.
fn torque_controls<M>(
    d: &Declarer<'_, M>,
    decls: &mut VariableDecls,
    group: Option<&FatigueGroup>,
    nb_tau: usize,
) -> Result<()> {
    let Some(group) = group else {
        decls.control(d.slot("tau", nb_tau));
        return Ok(());
    };
    check_group_size(group, nb_tau)?;
    if !group.splits_controls() {
        decls.control(d.slot("tau", nb_tau));
        return Ok(());
    }
    let first = group
        .get(0)
        .ok_or_else(|| OcpError::invalid_config("empty torque fatigue group"))?;
    for suffix in first.suffixes() {
        let mut min = Vec::with_capacity(nb_tau);
        let mut max = Vec::with_capacity(nb_tau);
        for actuator in 0..nb_tau {
            let scaling = group
                .get(actuator)
                .and_then(|m| m.law(suffix))
                .map(|law| law.scaling())
                .ok_or_else(|| OcpError::unknown(format!("tau[{actuator}] {suffix}")))?;
            min.push(scaling.min(0.0));
            max.push(scaling.max(0.0));
        }
        decls.control(SlotDecl::new(first.control_name(suffix), nb_tau).with_defaults(
            min,
            max,
            vec![0.0; nb_tau],
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::mapping::BiMapping;
    use ocp_fatigue::{FatigueList, MultiFatigueModel, XiaFatigue};
    use ocp_model::ArticulatedModel;

    fn names(decls: &[SlotDecl]) -> Vec<&str> {
        decls.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_torque_driven_slots() {
        let model = ArticulatedModel::pendulum().unwrap();
        let decls = configure(&model, &Dynamics::new(DynamicsVariant::torque_driven())).unwrap();
        assert_eq!(names(&decls.states), ["q", "qdot"]);
        assert_eq!(names(&decls.controls), ["tau"]);

        let jerk = Dynamics::new(DynamicsVariant::TorqueDriven {
            with_contact: false,
            rigidbody_dynamics: RigidBodyDynamics::DaeInverseDynamicsJerk,
        });
        let decls = configure(&model, &jerk).unwrap();
        assert_eq!(names(&decls.states), ["q", "qdot", "qddot"]);
        assert_eq!(names(&decls.controls), ["tau", "qdddot"]);
    }

    #[test]
    fn test_split_torque_fatigue_slots() {
        let model = ArticulatedModel::pendulum().unwrap();
        let fatigue = FatigueList::new()
            .with(MultiFatigueModel::xia_torque(XiaFatigue::default(), 10.0))
            .with(MultiFatigueModel::xia_torque(XiaFatigue::default(), 5.0));
        let dynamics = Dynamics::new(DynamicsVariant::torque_driven()).with_fatigue(fatigue);
        let decls = configure(&model, &dynamics).unwrap();
        assert_eq!(names(&decls.controls), ["tau_minus", "tau_plus"]);
        assert_eq!(
            decls.controls[0].default_bounds,
            Some((vec![-10.0, -5.0], vec![0.0, 0.0]))
        );
        assert_eq!(
            names(&decls.states),
            [
                "q",
                "qdot",
                "tau_minus_ma",
                "tau_minus_mr",
                "tau_minus_mf",
                "tau_plus_ma",
                "tau_plus_mr",
                "tau_plus_mf"
            ]
        );
    }

    #[test]
    fn test_fatigue_group_size_checked() {
        let model = ArticulatedModel::pendulum().unwrap();
        let fatigue = FatigueList::new().with(MultiFatigueModel::xia_torque(XiaFatigue::default(), 1.0));
        let dynamics = Dynamics::new(DynamicsVariant::torque_driven()).with_fatigue(fatigue);
        let err = configure(&model, &dynamics).unwrap_err();
        assert!(matches!(err, OcpError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_unsupported_combinations() {
        let model = ArticulatedModel::pendulum().unwrap();
        let contact = Dynamics::new(DynamicsVariant::TorqueDriven {
            with_contact: true,
            rigidbody_dynamics: RigidBodyDynamics::Ode,
        });
        assert!(configure(&model, &contact).unwrap_err().is_config_error());

        let arm = ArticulatedModel::arm().unwrap();
        let jerk = Dynamics::new(DynamicsVariant::MuscleDriven {
            with_contact: false,
            with_excitations: false,
            with_residual_torque: false,
            rigidbody_dynamics: RigidBodyDynamics::DaeForwardDynamicsJerk,
        });
        assert!(configure(&arm, &jerk).unwrap_err().is_not_implemented());

        let implicit = Dynamics::new(DynamicsVariant::JointsAccelerationDriven {
            rigidbody_dynamics: RigidBodyDynamics::DaeInverseDynamics,
        });
        assert!(configure(&model, &implicit).unwrap_err().is_not_implemented());
    }

    #[test]
    fn test_mapping_attached_and_checked() {
        let model = ArticulatedModel::pendulum().unwrap();
        let mapping = BiMapping::new(vec![None, Some(0)], vec![1]).unwrap();
        let dynamics = Dynamics::new(DynamicsVariant::torque_driven()).with_mapping("tau", mapping.clone());
        let decls = configure(&model, &dynamics).unwrap();
        assert_eq!(decls.controls[0].size(), 1);

        let dynamics = Dynamics::new(DynamicsVariant::torque_driven()).with_mapping("muscles", mapping);
        assert!(matches!(
            configure(&model, &dynamics),
            Err(OcpError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn test_joints_acceleration_slots() {
        let model = ArticulatedModel::floating(2).unwrap();
        let dynamics = Dynamics::new(DynamicsVariant::JointsAccelerationDriven {
            rigidbody_dynamics: RigidBodyDynamics::Ode,
        });
        let decls = configure(&model, &dynamics).unwrap();
        assert_eq!(decls.controls[0].physical_size, 2);
        assert!(configure(&ArticulatedModel::pendulum().unwrap(), &dynamics).is_err());
    }
}
