//! Axial rods between two nodes.
//!
//! All three variants share one kernel. It evaluates the attachment points
//! `p_i = x_i + R_i f_i`, the strain `ε = l/L0 - 1` and, when the law needs
//! it, the strain rate `ε' = n·(ṗ2 - ṗ1)/L0`, then the wrench
//! `[f1, m1, f2, m2]` with `f1 = F n = -f2` and `m_i = o_i × f_i`.
//!
//! With the Jacobian requested the kernel also returns the derivative of that
//! wrench (12 rows) with respect to the per-node unknowns stacked as
//! `[x, g, v, ω]` for node 1 then node 2 (24 columns). Each variant picks the
//! rows and columns it owns in every phase.

use tracing::debug;

use crate::config::ElementConfig;
use crate::constitutive::ConstitutiveLaw;
use crate::context::{AssemblyContext, InverseDynamicsOrder};
use crate::element::*;
use crate::node::NodeId;
use crate::output::vtk::RodSegment;
use crate::prelude::*;

/// Rod quantities at the last residual evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RodReaction {
    /// Axial force, positive in tension
    pub force: f64,
    pub length: f64,
    pub length_rate: f64,
    pub strain: f64,
    pub strain_rate: f64,
    /// Attachment points
    pub points: [Vector3; 2],
}

impl RodReaction {
    /// Vector from the first to the second attachment point.
    pub fn span(&self) -> Vector3 {
        self.points[1] - self.points[0]
    }
}

const PRIVATE_DATA: [&str; 3] = ["F", "L", "LPrime"];

// Column offsets of the per-node unknowns in the kernel derivative
const X: usize = 0;
const G: usize = 3;
const V: usize = 6;
const W: usize = 9;

struct Kernel {
    reaction: RodReaction,
    /// [f1, m1, f2, m2]
    wrench: VectorD,
    /// ∂wrench/∂[x1, g1, v1, ω1, x2, g2, v2, ω2]
    derivative: Option<MatrixD>,
}

#[derive(Debug, Clone)]
struct RodCore {
    label: u32,
    nodes: [NodeId; 2],
    node_labels: [u32; 2],
    /// Attachment offsets in the node frames
    offsets: Option<[Vector3; 2]>,
    l0: f64,
    law: ConstitutiveLaw,
    rate: bool,
    output: bool,
    reaction: RodReaction,
    converged: RodReaction,
}

impl RodCore {
    fn evaluate(&self, ctx: &AssemblyContext, with_derivative: bool) -> Kernel {
        let s1 = ctx.node_state(self.nodes[0]);
        let s2 = ctx.node_state(self.nodes[1]);
        let [f1, f2] = self.offsets.unwrap_or_default();
        let o1 = s1.r * f1;
        let o2 = s2.r * f2;
        let p1 = s1.x + o1;
        let p2 = s2.x + o2;

        let d = p2 - p1;
        let l = d.norm();
        assert!(l > f64::EPSILON, "rod({}): null current length", self.label);
        let n = d / l;
        let d_dot = (s2.v + s2.w.cross(&o2)) - (s1.v + s1.w.cross(&o1));

        let strain = l / self.l0 - 1.;
        let strain_rate = if self.rate {
            n.dot(&d_dot) / self.l0
        } else {
            0.
        };
        let law = self.law.evaluate(strain, strain_rate);

        let f = n * law.force;
        let m1 = o1.cross(&f);
        let m2 = -o2.cross(&f);
        let mut wrench = VectorD::zeros(12);
        wrench.fixed_rows_mut::<3>(0).copy_from(&f);
        wrench.fixed_rows_mut::<3>(3).copy_from(&m1);
        wrench.fixed_rows_mut::<3>(6).copy_from(&(-f));
        wrench.fixed_rows_mut::<3>(9).copy_from(&m2);

        let derivative = with_derivative.then(|| {
            // δo_i = a_i δg_i
            let a1 = -o1.tilde() * s1.t;
            let a2 = -o2.tilde() * s2.t;

            let mut dd = Matrix3xX::zeros(24);
            dd.fixed_view_mut::<3, 3>(0, X).copy_from(&(-Matrix3::identity()));
            dd.fixed_view_mut::<3, 3>(0, G).copy_from(&(-a1));
            dd.fixed_view_mut::<3, 3>(0, 12 + X).copy_from(&Matrix3::identity());
            dd.fixed_view_mut::<3, 3>(0, 12 + G).copy_from(&a2);

            let p = Matrix3::identity() - n * n.transpose();
            let mut d_strain: Matrix1xX = n.transpose() * &dd / self.l0;
            d_strain *= law.stiffness;
            let mut d_force = d_strain;

            if self.rate {
                let mut dd_dot = Matrix3xX::zeros(24);
                dd_dot.fixed_view_mut::<3, 3>(0, G).copy_from(&(-(s1.w.tilde() * a1)));
                dd_dot.fixed_view_mut::<3, 3>(0, V).copy_from(&(-Matrix3::identity()));
                dd_dot.fixed_view_mut::<3, 3>(0, W).copy_from(&o1.tilde());
                dd_dot.fixed_view_mut::<3, 3>(0, 12 + G).copy_from(&(s2.w.tilde() * a2));
                dd_dot.fixed_view_mut::<3, 3>(0, 12 + V).copy_from(&Matrix3::identity());
                dd_dot.fixed_view_mut::<3, 3>(0, 12 + W).copy_from(&(-o2.tilde()));

                let d_rate: Matrix1xX =
                    (d_dot.transpose() * p * &dd / l + n.transpose() * &dd_dot) / self.l0;
                d_force += d_rate * law.damping;
            }

            let df1: Matrix3xX = n * &d_force + p * &dd * (law.force / l);
            let mut dm1: Matrix3xX = o1.tilde() * &df1;
            let mut dm2: Matrix3xX = -o2.tilde() * &df1;
            dm1.fixed_view_mut::<3, 3>(0, G)
                .add_assign(&(-f.tilde() * a1));
            dm2.fixed_view_mut::<3, 3>(0, 12 + G)
                .add_assign(&(f.tilde() * a2));

            let mut jac = MatrixD::zeros(12, 24);
            jac.view_mut((0, 0), (3, 24)).copy_from(&df1);
            jac.view_mut((3, 0), (3, 24)).copy_from(&dm1);
            jac.view_mut((6, 0), (3, 24)).copy_from(&(-&df1));
            jac.view_mut((9, 0), (3, 24)).copy_from(&dm2);
            jac
        });

        Kernel {
            reaction: RodReaction {
                force: law.force,
                length: l,
                length_rate: strain_rate * self.l0,
                strain,
                strain_rate,
                points: [p1, p2],
            },
            wrench,
            derivative,
        }
    }

    /// Residual rows of the wrench, `k` rows per node (3 forces only, 6 with
    /// moments) starting at the node's equilibrium index.
    fn residual(&self, ctx: &AssemblyContext, k: usize) -> Evaluated {
        let kernel = self.evaluate(ctx, false);
        let mut wv = SubVector::new(2 * k);
        for (i, &node) in self.nodes.iter().enumerate() {
            wv.put_rows(k * i, ctx.equilibrium_index(node), k);
            for a in 0..k {
                wv.put_coef(k * i + a, kernel.wrench[6 * i + a]);
            }
        }
        Evaluated {
            residual: wv,
            reaction: Reaction::Rod(kernel.reaction),
        }
    }

    /// Jacobian with `k` rows per node and the given columns.
    ///
    /// Each column is `(kernel column, kernel rate column, global index)`; the
    /// entry is `-(D[rate] + coef D[column])`.
    fn jacobian(
        &self,
        ctx: &AssemblyContext,
        k: usize,
        coef: f64,
        cols: &[(usize, Option<usize>, usize)],
    ) -> SubMatrix {
        let mut wm = SubMatrix::new(2 * k, cols.len());
        let Some(d) = self.evaluate(ctx, true).derivative else {
            return wm;
        };
        for (i, &node) in self.nodes.iter().enumerate() {
            wm.put_rows(k * i, ctx.equilibrium_index(node), k);
        }
        for (j, &(c, rate, global)) in cols.iter().enumerate() {
            wm.put_col_index(j, global);
            for i in 0..2 {
                for a in 0..k {
                    let r = 6 * i + a;
                    let value = rate.map_or(0., |cr| d[(r, cr)]) + coef * d[(r, c)];
                    wm.put_coef(k * i + a, j, -value);
                }
            }
        }
        wm
    }

    /// Regular phase columns, position (and orientation) of each node.
    fn regular_columns(&self, ctx: &AssemblyContext, k: usize) -> Vec<(usize, Option<usize>, usize)> {
        let mut cols = Vec::with_capacity(2 * k);
        for (j, &node) in self.nodes.iter().enumerate() {
            let p = ctx.position_index(node);
            for b in 0..k {
                cols.push((12 * j + b, Some(12 * j + V + b), p + b));
            }
        }
        cols
    }

    /// Position dependent columns without the rate part.
    fn static_columns(&self, ctx: &AssemblyContext, k: usize) -> Vec<(usize, Option<usize>, usize)> {
        self.regular_columns(ctx, k)
            .into_iter()
            .map(|(c, _, g)| (c, None, g))
            .collect()
    }

    fn commit(&mut self, reaction: Reaction) {
        if let Reaction::Rod(r) = reaction {
            self.reaction = r;
        }
    }

    fn private_data_value(&self, index: usize) -> f64 {
        match index {
            1 => self.reaction.force,
            2 => self.reaction.length,
            3 => self.reaction.length_rate,
            _ => panic!("rod({}): private data index {} out of range", self.label, index),
        }
    }

    fn output_record(&self, name: &'static str) -> JointRecord {
        let r = &self.converged;
        let span = r.span();
        let n = if r.length > 0. {
            span / r.length
        } else {
            Vector3::zeros()
        };
        JointRecord::new(
            name,
            self.label,
            &Vector3::new(r.force, 0., 0.),
            &Vector3::zeros(),
            &(n * r.force),
            &Vector3::zeros(),
        )
        .with_extra(&[r.length, span.x, span.y, span.z, r.length_rate])
    }

    fn config(&self) -> ElementConfig {
        ElementConfig::Rod {
            label: self.label,
            nodes: self.node_labels,
            length: Some(self.l0),
            law: self.law.clone(),
            offsets: self.offsets.map(|[f1, f2]| [f1.into(), f2.into()]),
            output: self.output,
        }
    }

    fn segment(&self) -> RodSegment {
        RodSegment {
            label: self.label,
            points: self.converged.points,
            force: self.converged.force,
        }
    }
}

/// Parameters shared by the rod constructors.
#[derive(Debug, Clone)]
pub struct RodParams {
    pub label: u32,
    pub nodes: [NodeId; 2],
    pub node_labels: [u32; 2],
    pub length: f64,
    pub law: ConstitutiveLaw,
    pub output: bool,
}

impl RodCore {
    fn new(params: RodParams, offsets: Option<[Vector3; 2]>, rate: bool) -> Self {
        RodCore {
            label: params.label,
            nodes: params.nodes,
            node_labels: params.node_labels,
            offsets,
            l0: params.length,
            rate,
            law: params.law,
            output: params.output,
            reaction: RodReaction::default(),
            converged: RodReaction::default(),
        }
    }
}

macro_rules! rod_common {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn reference_length(&self) -> f64 {
                self.0.l0
            }

            pub fn law(&self) -> &ConstitutiveLaw {
                &self.0.law
            }

            /// Quantities at the last residual evaluation.
            pub fn reaction(&self) -> &RodReaction {
                &self.0.reaction
            }

            /// Quantities at the last converged step.
            pub fn converged(&self) -> &RodReaction {
                &self.0.converged
            }

            pub fn segment(&self) -> RodSegment {
                self.0.segment()
            }
        }

        impl ElementBase for $t {
            fn label(&self) -> u32 {
                self.0.label
            }

            fn name(&self) -> &'static str {
                $name
            }
        }

        impl AfterConvergence for $t {
            fn after_convergence(&mut self, _ctx: &AssemblyContext) {
                debug!(element = $name, label = self.0.label, "after_convergence");
                self.0.converged = self.0.reaction;
            }
        }

        impl PrivateData for $t {
            fn private_data_names(&self) -> &'static [&'static str] {
                &PRIVATE_DATA
            }

            fn private_data_value(&self, index: usize) -> f64 {
                self.0.private_data_value(index)
            }
        }

        impl Output for $t {
            fn output_enabled(&self) -> bool {
                self.0.output
            }

            fn set_output(&mut self, enabled: bool) {
                self.0.output = enabled;
            }

            fn output_record(&self) -> JointRecord {
                self.0.output_record($name)
            }
        }

        impl Restart for $t {
            fn config(&self) -> ElementConfig {
                self.0.config()
            }
        }
    };
}

//------------------------------------------------------------------------------
// Rod
//------------------------------------------------------------------------------

/// Elastic rod between the node positions.
#[derive(Debug, Clone)]
pub struct Rod(RodCore);

impl Rod {
    pub fn new(params: RodParams) -> Self {
        Rod(RodCore::new(params, None, false))
    }
}

rod_common!(Rod, "Rod");

impl Residual for Rod {
    fn work_space_dim(&self) -> (usize, usize) {
        (6, 6)
    }

    fn eval_res(&self, _coef: f64, ctx: &AssemblyContext) -> Evaluated {
        self.0.residual(ctx, 3)
    }

    fn commit(&mut self, reaction: Reaction) {
        self.0.commit(reaction)
    }
}

impl Jacobian for Rod {
    fn ass_jac(&self, coef: f64, ctx: &AssemblyContext) -> SubMatrix {
        debug!(element = "Rod", label = self.0.label, "ass_jac");
        self.0.jacobian(ctx, 3, coef, &self.0.regular_columns(ctx, 3))
    }
}

impl InitialAssembly for Rod {
    fn initial_work_space_dim(&self) -> (usize, usize) {
        (6, 6)
    }

    fn initial_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix {
        self.0.jacobian(ctx, 3, 1., &self.0.static_columns(ctx, 3))
    }

    fn initial_eval_res(&self, ctx: &AssemblyContext) -> Evaluated {
        self.0.residual(ctx, 3)
    }
}

impl InverseDynamicsCapable for Rod {
    fn id_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix {
        self.0.jacobian(ctx, 3, 1., &self.0.static_columns(ctx, 3))
    }

    fn id_eval_res(&self, ctx: &AssemblyContext, order: InverseDynamicsOrder) -> Evaluated {
        match order {
            InverseDynamicsOrder::InverseDynamics => self.0.residual(ctx, 3),
            _ => Evaluated::empty(),
        }
    }
}

//------------------------------------------------------------------------------
// ViscoElasticRod
//------------------------------------------------------------------------------

/// Rod whose law also depends on the elongation rate.
#[derive(Debug, Clone)]
pub struct ViscoElasticRod(RodCore);

impl ViscoElasticRod {
    pub fn new(params: RodParams) -> Self {
        ViscoElasticRod(RodCore::new(params, None, true))
    }
}

rod_common!(ViscoElasticRod, "ViscoElasticRod");

impl Residual for ViscoElasticRod {
    fn work_space_dim(&self) -> (usize, usize) {
        (6, 6)
    }

    fn eval_res(&self, _coef: f64, ctx: &AssemblyContext) -> Evaluated {
        self.0.residual(ctx, 3)
    }

    fn commit(&mut self, reaction: Reaction) {
        self.0.commit(reaction)
    }
}

impl Jacobian for ViscoElasticRod {
    fn ass_jac(&self, coef: f64, ctx: &AssemblyContext) -> SubMatrix {
        debug!(element = "ViscoElasticRod", label = self.0.label, "ass_jac");
        self.0.jacobian(ctx, 3, coef, &self.0.regular_columns(ctx, 3))
    }
}

impl InitialAssembly for ViscoElasticRod {
    fn initial_work_space_dim(&self) -> (usize, usize) {
        (6, 12)
    }

    /// Columns are position then velocity of each node.
    fn initial_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix {
        let mut cols = Vec::with_capacity(12);
        for (j, &node) in self.0.nodes.iter().enumerate() {
            let p = ctx.position_index(node);
            let v = ctx.velocity_index(node);
            cols.extend((0..3).map(|b| (12 * j + X + b, None, p + b)));
            cols.extend((0..3).map(|b| (12 * j + V + b, None, v + b)));
        }
        self.0.jacobian(ctx, 3, 1., &cols)
    }

    fn initial_eval_res(&self, ctx: &AssemblyContext) -> Evaluated {
        self.0.residual(ctx, 3)
    }
}

impl InverseDynamicsCapable for ViscoElasticRod {
    fn id_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix {
        self.0.jacobian(ctx, 3, 1., &self.0.static_columns(ctx, 3))
    }

    fn id_eval_res(&self, ctx: &AssemblyContext, order: InverseDynamicsOrder) -> Evaluated {
        match order {
            InverseDynamicsOrder::InverseDynamics => self.0.residual(ctx, 3),
            _ => Evaluated::empty(),
        }
    }
}

//------------------------------------------------------------------------------
// RodWithOffset
//------------------------------------------------------------------------------

/// Rod attached at points offset from the nodes, loading their rotations too.
#[derive(Debug, Clone)]
pub struct RodWithOffset(RodCore);

impl RodWithOffset {
    pub fn new(params: RodParams, offsets: [Vector3; 2]) -> Self {
        let rate = params.law.has_rate();
        RodWithOffset(RodCore::new(params, Some(offsets), rate))
    }

    pub fn offsets(&self) -> [Vector3; 2] {
        self.0.offsets.unwrap_or_default()
    }
}

rod_common!(RodWithOffset, "RodWithOffset");

impl Residual for RodWithOffset {
    fn work_space_dim(&self) -> (usize, usize) {
        (12, 12)
    }

    fn eval_res(&self, _coef: f64, ctx: &AssemblyContext) -> Evaluated {
        self.0.residual(ctx, 6)
    }

    fn commit(&mut self, reaction: Reaction) {
        self.0.commit(reaction)
    }
}

impl Jacobian for RodWithOffset {
    fn ass_jac(&self, coef: f64, ctx: &AssemblyContext) -> SubMatrix {
        debug!(element = "RodWithOffset", label = self.0.label, "ass_jac");
        self.0.jacobian(ctx, 6, coef, &self.0.regular_columns(ctx, 6))
    }
}

impl InitialAssembly for RodWithOffset {
    fn initial_work_space_dim(&self) -> (usize, usize) {
        (12, 24)
    }

    /// Columns are the whole 12 unknown block of each node.
    fn initial_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix {
        let mut cols = Vec::with_capacity(24);
        for (j, &node) in self.0.nodes.iter().enumerate() {
            let p = ctx.position_index(node);
            cols.extend((0..12).map(|c| (12 * j + c, None, p + c)));
        }
        self.0.jacobian(ctx, 6, 1., &cols)
    }

    fn initial_eval_res(&self, ctx: &AssemblyContext) -> Evaluated {
        self.0.residual(ctx, 6)
    }
}

impl InverseDynamicsCapable for RodWithOffset {
    fn id_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix {
        self.0.jacobian(ctx, 6, 1., &self.0.static_columns(ctx, 6))
    }

    fn id_eval_res(&self, ctx: &AssemblyContext, order: InverseDynamicsOrder) -> Evaluated {
        match order {
            InverseDynamicsOrder::InverseDynamics => self.0.residual(ctx, 6),
            _ => Evaluated::empty(),
        }
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------
