//! Element contract.
//!
//! An element contributes local residual and Jacobian blocks addressed by
//! global indices. What an element can do is split into capability traits;
//! [`Element`] gathers the concrete elements and answers the optional
//! capabilities with `Option`.
//!
//! Residual evaluation is pure: [`Residual::eval_res`] returns the block and
//! the reaction the element should remember, [`Residual::commit`] stores it.
//! [`Residual::ass_res`] does both.

pub mod rod;
pub mod velocity;

use tracing::debug;

use crate::config::ElementConfig;
use crate::context::{AssemblyContext, InverseDynamicsOrder};
use crate::error::OutputResult;
use crate::output::vtk::RodSegment;
use crate::output::{Channel, JointRecord, OutputHandler};
use crate::workspace::{SubMatrix, SubVector};

pub use rod::{Rod, RodReaction, RodWithOffset, ViscoElasticRod};
pub use velocity::{AngularVelocityJoint, ConstraintReaction, LinearVelocityJoint};

/// Index returned by [`PrivateData::private_data_index`] for unknown names.
pub const PRIVATE_DATA_NOT_FOUND: usize = 0;

/// Bookkeeping update produced together with a residual block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reaction {
    None,
    Rod(RodReaction),
    Constraint(ConstraintReaction),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub residual: SubVector,
    pub reaction: Reaction,
}

impl Evaluated {
    pub fn empty() -> Self {
        Evaluated {
            residual: SubVector::empty(),
            reaction: Reaction::None,
        }
    }
}

/// Capability set of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub residual: bool,
    pub jacobian: bool,
    pub output: bool,
    pub initial_assembly: bool,
    pub inverse_dynamics: bool,
    pub private_data: bool,
    pub restart: bool,
    pub after_convergence: bool,
}

pub trait ElementBase {
    fn label(&self) -> u32;

    /// Element type name used in output records.
    fn name(&self) -> &'static str;
}

pub trait Residual: ElementBase {
    /// Size of the local blocks, (rows, cols).
    fn work_space_dim(&self) -> (usize, usize);

    fn eval_res(&self, coef: f64, ctx: &AssemblyContext) -> Evaluated;

    fn commit(&mut self, reaction: Reaction);

    fn ass_res(&mut self, coef: f64, ctx: &AssemblyContext) -> SubVector {
        debug!(element = self.name(), label = self.label(), "ass_res");
        let Evaluated { residual, reaction } = self.eval_res(coef, ctx);
        self.commit(reaction);
        residual
    }
}

pub trait Jacobian: ElementBase {
    /// Block of `-(∂R/∂XP + coef ∂R/∂X)`, `-∂R/∂X` on algebraic columns.
    fn ass_jac(&self, coef: f64, ctx: &AssemblyContext) -> SubMatrix;
}

pub trait InitialAssembly: Residual {
    fn initial_work_space_dim(&self) -> (usize, usize);

    fn initial_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix;

    fn initial_eval_res(&self, ctx: &AssemblyContext) -> Evaluated;

    fn initial_ass_res(&mut self, ctx: &AssemblyContext) -> SubVector {
        debug!(element = self.name(), label = self.label(), "initial_ass_res");
        let Evaluated { residual, reaction } = self.initial_eval_res(ctx);
        self.commit(reaction);
        residual
    }
}

pub trait InverseDynamicsCapable: Residual {
    fn id_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix;

    fn id_eval_res(&self, ctx: &AssemblyContext, order: InverseDynamicsOrder) -> Evaluated;

    fn id_ass_res(&mut self, ctx: &AssemblyContext, order: InverseDynamicsOrder) -> SubVector {
        debug!(element = self.name(), label = self.label(), ?order, "id_ass_res");
        let Evaluated { residual, reaction } = self.id_eval_res(ctx, order);
        self.commit(reaction);
        residual
    }
}

pub trait AfterConvergence {
    fn after_convergence(&mut self, ctx: &AssemblyContext);
}

/// Named scalars readable without knowing the element type.
///
/// Indices are 1-based, 0 means not found.
pub trait PrivateData {
    fn private_data_names(&self) -> &'static [&'static str];

    fn num_private_data(&self) -> usize {
        self.private_data_names().len()
    }

    fn private_data_index(&self, name: &str) -> usize {
        self.private_data_names()
            .iter()
            .position(|&n| n == name)
            .map_or(PRIVATE_DATA_NOT_FOUND, |i| i + 1)
    }

    /// Panics if `index` is not in `1..=num_private_data()`.
    fn private_data_value(&self, index: usize) -> f64;
}

pub trait Output: ElementBase {
    fn output_enabled(&self) -> bool;

    fn set_output(&mut self, enabled: bool);

    fn output_channel(&self) -> Channel {
        Channel::Joints
    }

    fn output_record(&self) -> JointRecord;

    /// Writes one record if output is enabled. Never changes the element.
    fn output(&self, oh: &mut OutputHandler) -> OutputResult<()> {
        if self.output_enabled() {
            oh.write_record(self.output_channel(), &self.output_record())?;
        }
        Ok(())
    }
}

pub trait Restart {
    /// Defining parameters of the element.
    fn config(&self) -> ElementConfig;

    fn restart(&self) -> String {
        self.config().restart()
    }
}

//------------------------------------------------------------------------------
// Element
//------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Element {
    Rod(Rod),
    ViscoElasticRod(ViscoElasticRod),
    RodWithOffset(RodWithOffset),
    LinearVelocity(LinearVelocityJoint),
    AngularVelocity(AngularVelocityJoint),
}

macro_rules! dispatch {
    ($self:expr, $e:ident => $body:expr) => {
        match $self {
            Element::Rod($e) => $body,
            Element::ViscoElasticRod($e) => $body,
            Element::RodWithOffset($e) => $body,
            Element::LinearVelocity($e) => $body,
            Element::AngularVelocity($e) => $body,
        }
    };
}

impl Element {
    pub fn label(&self) -> u32 {
        dispatch!(self, e => e.label())
    }

    pub fn name(&self) -> &'static str {
        dispatch!(self, e => e.name())
    }

    pub fn capabilities(&self) -> Capabilities {
        let is_rod = matches!(
            self,
            Element::Rod(_) | Element::ViscoElasticRod(_) | Element::RodWithOffset(_)
        );
        Capabilities {
            residual: true,
            jacobian: true,
            output: true,
            initial_assembly: true,
            inverse_dynamics: is_rod,
            private_data: true,
            restart: true,
            after_convergence: is_rod,
        }
    }

    pub fn work_space_dim(&self) -> (usize, usize) {
        dispatch!(self, e => e.work_space_dim())
    }

    pub fn ass_jac(&self, coef: f64, ctx: &AssemblyContext) -> SubMatrix {
        dispatch!(self, e => e.ass_jac(coef, ctx))
    }

    pub fn eval_res(&self, coef: f64, ctx: &AssemblyContext) -> Evaluated {
        dispatch!(self, e => e.eval_res(coef, ctx))
    }

    pub fn commit(&mut self, reaction: Reaction) {
        dispatch!(self, e => e.commit(reaction))
    }

    pub fn ass_res(&mut self, coef: f64, ctx: &AssemblyContext) -> SubVector {
        dispatch!(self, e => e.ass_res(coef, ctx))
    }

    pub fn initial_work_space_dim(&self) -> (usize, usize) {
        dispatch!(self, e => e.initial_work_space_dim())
    }

    pub fn initial_ass_jac(&self, ctx: &AssemblyContext) -> SubMatrix {
        dispatch!(self, e => e.initial_ass_jac(ctx))
    }

    pub fn initial_eval_res(&self, ctx: &AssemblyContext) -> Evaluated {
        dispatch!(self, e => e.initial_eval_res(ctx))
    }

    pub fn initial_ass_res(&mut self, ctx: &AssemblyContext) -> SubVector {
        dispatch!(self, e => e.initial_ass_res(ctx))
    }

    pub fn inverse_dynamics(&self) -> Option<&dyn InverseDynamicsCapable> {
        match self {
            Element::Rod(e) => Some(e),
            Element::ViscoElasticRod(e) => Some(e),
            Element::RodWithOffset(e) => Some(e),
            Element::LinearVelocity(_) | Element::AngularVelocity(_) => None,
        }
    }

    pub fn inverse_dynamics_mut(&mut self) -> Option<&mut dyn InverseDynamicsCapable> {
        match self {
            Element::Rod(e) => Some(e),
            Element::ViscoElasticRod(e) => Some(e),
            Element::RodWithOffset(e) => Some(e),
            Element::LinearVelocity(_) | Element::AngularVelocity(_) => None,
        }
    }

    /// Converged geometry of rods, for visualization.
    pub fn rod_segment(&self) -> Option<RodSegment> {
        match self {
            Element::Rod(e) => Some(e.segment()),
            Element::ViscoElasticRod(e) => Some(e.segment()),
            Element::RodWithOffset(e) => Some(e.segment()),
            Element::LinearVelocity(_) | Element::AngularVelocity(_) => None,
        }
    }

    pub fn after_convergence(&mut self, ctx: &AssemblyContext) {
        match self {
            Element::Rod(e) => e.after_convergence(ctx),
            Element::ViscoElasticRod(e) => e.after_convergence(ctx),
            Element::RodWithOffset(e) => e.after_convergence(ctx),
            Element::LinearVelocity(_) | Element::AngularVelocity(_) => {}
        }
    }

    pub fn private_data(&self) -> &dyn PrivateData {
        dispatch!(self, e => e as &dyn PrivateData)
    }

    pub fn output_enabled(&self) -> bool {
        dispatch!(self, e => e.output_enabled())
    }

    pub fn set_output(&mut self, enabled: bool) {
        dispatch!(self, e => e.set_output(enabled))
    }

    pub fn output(&self, oh: &mut OutputHandler) -> OutputResult<()> {
        dispatch!(self, e => e.output(oh))
    }

    pub fn config(&self) -> ElementConfig {
        dispatch!(self, e => e.config())
    }

    pub fn restart(&self) -> String {
        dispatch!(self, e => e.restart())
    }
}
