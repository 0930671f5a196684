//! Prescribed velocity along a direction.
//!
//! Both joints enforce `v0(t) - d·v = 0` through a Lagrange multiplier `λ`,
//! the reaction, which loads the node with `-d λ`. The linear joint acts on
//! the node velocity with `d` fixed in space, the angular one on the node
//! angular velocity with `d` fixed in the node frame.

use tracing::debug;

use crate::config::ElementConfig;
use crate::context::AssemblyContext;
use crate::dof::DofHandle;
use crate::drive::DriveCaller;
use crate::element::*;
use crate::node::NodeId;
use crate::prelude::*;

/// Joint quantities at the last residual evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConstraintReaction {
    /// Lagrange multiplier, force or moment along the direction
    pub multiplier: f64,
    /// Prescribed value
    pub drive: f64,
    /// Direction in the global frame
    pub direction: Vector3,
}

/// Parameters shared by the joint constructors.
#[derive(Debug, Clone)]
pub struct JointParams {
    pub label: u32,
    pub node: NodeId,
    pub node_label: u32,
    pub direction: Vector3,
    pub drive: DriveCaller,
    /// Reaction unknown, one algebraic DOF
    pub dofs: DofHandle,
    pub output: bool,
}

//------------------------------------------------------------------------------
// LinearVelocityJoint
//------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LinearVelocityJoint {
    params: JointParams,
    reaction: ConstraintReaction,
}

impl LinearVelocityJoint {
    pub fn new(params: JointParams) -> Self {
        let reaction = ConstraintReaction {
            direction: params.direction,
            ..Default::default()
        };
        LinearVelocityJoint { params, reaction }
    }

    pub fn direction(&self) -> &Vector3 {
        &self.params.direction
    }

    pub fn reaction(&self) -> &ConstraintReaction {
        &self.reaction
    }

    fn evaluate(&self, ctx: &AssemblyContext, rows: usize) -> Evaluated {
        let d = &self.params.direction;
        let s = ctx.node_state(self.params.node);
        let index = ctx.dofs.first_index(self.params.dofs);
        let lambda = ctx.unknown(index);
        let v0 = self.params.drive.value(ctx.time);

        let mut wv = SubVector::new(4);
        wv.put_rows(0, rows, 3);
        wv.put_row_index(3, index);
        wv.add3(0, &(-d * lambda));
        wv.put_coef(3, v0 - d.dot(&s.v));
        Evaluated {
            residual: wv,
            reaction: Reaction::Constraint(ConstraintReaction {
                multiplier: lambda,
                drive: v0,
                direction: *d,
            }),
        }
    }

    fn jacobian(&self, ctx: &AssemblyContext, first: usize) -> SubMatrix {
        let d = &self.params.direction;
        let index = ctx.dofs.first_index(self.params.dofs);
        let mut wm = SubMatrix::new(4, 4);
        wm.put_rows(0, first, 3);
        wm.put_cols(0, first, 3);
        wm.put_row_index(3, index);
        wm.put_col_index(3, index);
        wm.add_col3(0, 3, d);
        wm.add_row3(3, 0, d);
        wm
    }
}

impl ElementBase for LinearVelocityJoint {
    fn label(&self) -> u32 {
        self.params.label
    }

    fn name(&self) -> &'static str {
        "LinearVelocity"
    }
}

impl Residual for LinearVelocityJoint {
    fn work_space_dim(&self) -> (usize, usize) {
        (4, 4)
    }

    /// Rows are the node force balance and the constraint.
    fn eval_res(&self, _coef: f64, ctx: &AssemblyContext) -> Evaluated {
        self.evaluate(ctx, ctx.momentum_index(self.params.node))
    }

    fn commit(&mut self, reaction: Reaction) {
        if let Reaction::Constraint(r) = reaction {
            self.reaction = r;
        }
    }
}

impl Jacobian for LinearVelocityJoint {
    /// Columns are the node position, whose rate is the constrained velocity,
    /// and the reaction.
    fn ass_jac(&self, _coef: f64, ctx: &AssemblyContext) -> SubMatrix {
        debug!(element = self.name(), label = self.label(), "ass_jac");
        let p = ctx.position_index(self.params.node);
        let mut wm = self.jacobian(ctx, p);
        wm.put_rows(0, ctx.momentum_index(self.params.node), 3);
        wm
    }
}

impl InitialAssembly for LinearVelocityJoint {
    fn initial_work_space_dim(&self) -> (usize, usize) {
        (4, 4)
    }

    /// The velocity is an unknown of the initial problem, rows and columns
    /// both sit on the node velocity block.
    fn initial_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix {
        self.jacobian(ctx, ctx.velocity_index(self.params.node))
    }

    fn initial_eval_res(&self, ctx: &AssemblyContext) -> Evaluated {
        self.evaluate(ctx, ctx.velocity_index(self.params.node))
    }
}

impl PrivateData for LinearVelocityJoint {
    fn private_data_names(&self) -> &'static [&'static str] {
        &["v", "F"]
    }

    fn private_data_value(&self, index: usize) -> f64 {
        match index {
            1 => self.reaction.drive,
            2 => self.reaction.multiplier,
            _ => panic!(
                "linear velocity({}): private data index {} out of range",
                self.params.label, index
            ),
        }
    }
}

impl Output for LinearVelocityJoint {
    fn output_enabled(&self) -> bool {
        self.params.output
    }

    fn set_output(&mut self, enabled: bool) {
        self.params.output = enabled;
    }

    fn output_record(&self) -> JointRecord {
        let r = &self.reaction;
        JointRecord::new(
            self.name(),
            self.params.label,
            &Vector3::new(r.multiplier, 0., 0.),
            &Vector3::zeros(),
            &(r.direction * r.multiplier),
            &Vector3::zeros(),
        )
        .with_extra(&[r.direction.x, r.direction.y, r.direction.z, r.drive])
    }
}

impl Restart for LinearVelocityJoint {
    fn config(&self) -> ElementConfig {
        ElementConfig::LinearVelocity {
            label: self.params.label,
            node: self.params.node_label,
            direction: self.params.direction.into(),
            drive: self.params.drive.config().clone(),
            output: self.params.output,
        }
    }
}

//------------------------------------------------------------------------------
// AngularVelocityJoint
//------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AngularVelocityJoint {
    params: JointParams,
    reaction: ConstraintReaction,
}

impl AngularVelocityJoint {
    pub fn new(params: JointParams) -> Self {
        AngularVelocityJoint {
            params,
            reaction: ConstraintReaction::default(),
        }
    }

    /// Direction in the node frame.
    pub fn direction(&self) -> &Vector3 {
        &self.params.direction
    }

    pub fn reaction(&self) -> &ConstraintReaction {
        &self.reaction
    }

    fn evaluate(&self, ctx: &AssemblyContext, rows: usize, dir: Vector3, w: &Vector3) -> Evaluated {
        let index = ctx.dofs.first_index(self.params.dofs);
        let lambda = ctx.unknown(index);
        let w0 = self.params.drive.value(ctx.time);

        let mut wv = SubVector::new(4);
        wv.put_rows(0, rows, 3);
        wv.put_row_index(3, index);
        wv.add3(0, &(-dir * lambda));
        wv.put_coef(3, w0 - dir.dot(w));
        Evaluated {
            residual: wv,
            reaction: Reaction::Constraint(ConstraintReaction {
                multiplier: lambda,
                drive: w0,
                direction: dir,
            }),
        }
    }
}

impl ElementBase for AngularVelocityJoint {
    fn label(&self) -> u32 {
        self.params.label
    }

    fn name(&self) -> &'static str {
        "AngularVelocity"
    }
}

impl Residual for AngularVelocityJoint {
    fn work_space_dim(&self) -> (usize, usize) {
        (4, 4)
    }

    fn eval_res(&self, _coef: f64, ctx: &AssemblyContext) -> Evaluated {
        let node = self.params.node;
        let s = ctx.node_state(node);
        self.evaluate(
            ctx,
            ctx.momentum_index(node) + 3,
            s.r * self.params.direction,
            &s.w,
        )
    }

    fn commit(&mut self, reaction: Reaction) {
        if let Reaction::Constraint(r) = reaction {
            self.reaction = r;
        }
    }
}

impl Jacobian for AngularVelocityJoint {
    /// Rows are the node moment balance and the constraint, columns the
    /// orientation parameter and the reaction.
    fn ass_jac(&self, coef: f64, ctx: &AssemblyContext) -> SubMatrix {
        debug!(element = self.name(), label = self.label(), "ass_jac");
        let node = self.params.node;
        let s = ctx.node_state(node);
        let index = ctx.dofs.first_index(self.params.dofs);
        let lambda = ctx.unknown(index);
        let dir = s.r * self.params.direction;

        let mut wm = SubMatrix::new(4, 4);
        wm.put_rows(0, ctx.momentum_index(node) + 3, 3);
        wm.put_cols(0, ctx.position_index(node) + 3, 3);
        wm.put_row_index(3, index);
        wm.put_col_index(3, index);

        // The direction follows the node: δ(R d) = -(R d)× T δg
        wm.add3x3(0, 0, &(dir.tilde() * s.t * (-coef * lambda)));
        wm.add_col3(0, 3, &dir);
        wm.add_row3(3, 0, &(dir + s.t.transpose() * dir.cross(&s.w) * coef));
        wm
    }
}

impl InitialAssembly for AngularVelocityJoint {
    fn initial_work_space_dim(&self) -> (usize, usize) {
        (4, 4)
    }

    /// Columns are the node angular velocity and the reaction.
    fn initial_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix {
        let node = self.params.node;
        let dir = ctx.node_reference(node) * self.params.direction;
        let index = ctx.dofs.first_index(self.params.dofs);
        let first = ctx.velocity_index(node) + 3;

        let mut wm = SubMatrix::new(4, 4);
        wm.put_rows(0, first, 3);
        wm.put_cols(0, first, 3);
        wm.put_row_index(3, index);
        wm.put_col_index(3, index);
        wm.add_col3(0, 3, &dir);
        wm.add_row3(3, 0, &dir);
        wm
    }

    /// The direction is taken at the reference orientation.
    fn initial_eval_res(&self, ctx: &AssemblyContext) -> Evaluated {
        let node = self.params.node;
        let s = ctx.node_state(node);
        self.evaluate(
            ctx,
            ctx.velocity_index(node) + 3,
            ctx.node_reference(node) * self.params.direction,
            &s.w,
        )
    }
}

impl PrivateData for AngularVelocityJoint {
    fn private_data_names(&self) -> &'static [&'static str] {
        &["w", "M"]
    }

    fn private_data_value(&self, index: usize) -> f64 {
        match index {
            1 => self.reaction.drive,
            2 => self.reaction.multiplier,
            _ => panic!(
                "angular velocity({}): private data index {} out of range",
                self.params.label, index
            ),
        }
    }
}

impl Output for AngularVelocityJoint {
    fn output_enabled(&self) -> bool {
        self.params.output
    }

    fn set_output(&mut self, enabled: bool) {
        self.params.output = enabled;
    }

    fn output_record(&self) -> JointRecord {
        let r = &self.reaction;
        JointRecord::new(
            self.name(),
            self.params.label,
            &Vector3::zeros(),
            &Vector3::new(r.multiplier, 0., 0.),
            &Vector3::zeros(),
            &(r.direction * r.multiplier),
        )
        .with_extra(&[r.direction.x, r.direction.y, r.direction.z, r.drive])
    }
}

impl Restart for AngularVelocityJoint {
    fn config(&self) -> ElementConfig {
        ElementConfig::AngularVelocity {
            label: self.params.label,
            node: self.params.node_label,
            direction: self.params.direction.into(),
            drive: self.params.drive.config().clone(),
            output: self.params.output,
        }
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::context::Phase;
    use crate::dof::{DofOrder, DofRegistry};
    use crate::node::{NodeConfig, NodeSet};

    struct Fixture {
        nodes: NodeSet,
        dofs: DofRegistry,
        joint: DofHandle,
    }

    fn fixture() -> Fixture {
        let mut dofs = DofRegistry::new();
        let mut nodes = NodeSet::new();
        nodes
            .add(
                &NodeConfig {
                    label: 1,
                    position: [0.; 3],
                    orientation: [0., 0., 0.3],
                    velocity: [0.; 3],
                    angular_velocity: [0.; 3],
                },
                &mut dofs,
            )
            .unwrap();
        let joint = dofs.allocate(10, 1, DofOrder::Algebraic);
        Fixture { nodes, dofs, joint }
    }

    fn params(f: &Fixture, direction: Vector3, v0: f64) -> JointParams {
        JointParams {
            label: 10,
            node: f.nodes.find(1).unwrap(),
            node_label: 1,
            direction,
            drive: DriveCaller::constant(v0),
            dofs: f.joint,
            output: true,
        }
    }

    #[test]
    fn test_linear_sign_convention() {
        let f = fixture();
        let d = Vector3::new(0., 2., 0.);
        let mut joint = LinearVelocityJoint::new(params(&f, d, 1.5));

        let mut x = VectorD::zeros(f.dofs.len());
        let mut xp = VectorD::zeros(f.dofs.len());
        x[12] = 4.;
        xp.fixed_rows_mut::<3>(0).copy_from(&Vector3::new(1., 0.25, 3.));
        let ctx = AssemblyContext::new(&f.nodes, &f.dofs, Phase::Regular, 0., &x, &xp);
        let wv = joint.ass_res(1., &ctx);

        assert_eq!(wv.rows(), &[6, 7, 8, 12]);
        assert_relative_eq!(wv.at(12), 1.5 - 0.5);
        assert_relative_eq!(wv.at(7), -8.);
        assert_relative_eq!(joint.private_data_value(joint.private_data_index("v")), 1.5);
        assert_relative_eq!(joint.private_data_value(joint.private_data_index("F")), 4.);
    }

    #[test]
    fn test_linear_jacobian_pattern() {
        let f = fixture();
        let joint = LinearVelocityJoint::new(params(&f, Vector3::x(), 0.));
        let x = VectorD::zeros(f.dofs.len());
        let ctx = AssemblyContext::new(&f.nodes, &f.dofs, Phase::Regular, 0., &x, &x);
        let wm = joint.ass_jac(0.1, &ctx);
        assert_eq!(wm.rows(), &[6, 7, 8, 12]);
        assert_eq!(wm.cols(), &[0, 1, 2, 12]);
        assert_relative_eq!(wm.at(6, 12), 1.);
        assert_relative_eq!(wm.at(12, 0), 1.);
    }

    #[test]
    fn test_angular_initial_uses_reference_direction() {
        let f = fixture();
        let joint = AngularVelocityJoint::new(params(&f, Vector3::x(), 0.));
        let mut x = VectorD::zeros(f.dofs.len());
        x.fixed_rows_mut::<3>(3).copy_from(&Vector3::new(0.5, 0., 0.));
        let ctx = AssemblyContext::new(&f.nodes, &f.dofs, Phase::Initial, 0., &x, &x);
        let wm = joint.initial_ass_jac(&ctx);
        let expected = Vector3::new(0., 0., 0.3).rotation() * Vector3::x();
        assert_eq!(wm.cols(), &[9, 10, 11, 12]);
        assert_relative_eq!(wm.at(12, 9), expected.x, epsilon = 1e-12);
        assert_relative_eq!(wm.at(10, 12), expected.y, epsilon = 1e-12);
    }
}
