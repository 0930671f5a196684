//! Reference assembler.
//!
//! Elements are evaluated in parallel through their pure evaluation calls.
//! Reactions are then committed and blocks scattered sequentially in element
//! order, so the result does not depend on the thread count.

use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use tracing::debug;

use crate::context::{AssemblyContext, InverseDynamicsOrder, Phase};
use crate::element::{Element, Evaluated};
use crate::error::OutputResult;
use crate::output::OutputHandler;
use crate::prelude::*;
use crate::workspace::{SubMatrix, SubVector};

#[derive(Debug, Default)]
pub struct Assembler {
    step: u64,
}

fn check_residual(e: &Element, wv: &SubVector, rows: usize) {
    assert_eq!(
        wv.len(),
        rows,
        "{}({}): residual block has {} rows, work space declares {}",
        e.name(),
        e.label(),
        wv.len(),
        rows
    );
}

fn check_jacobian(e: &Element, wm: &SubMatrix, dims: (usize, usize)) {
    assert_eq!(
        wm.dims(),
        dims,
        "{}({}): jacobian block is {:?}, work space declares {:?}",
        e.name(),
        e.label(),
        wm.dims(),
        dims
    );
}

fn scatter_jacobian(n: usize, blocks: &[SubMatrix]) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(n, n);
    for wm in blocks {
        for (r, c, v) in wm.triplets() {
            coo.push(r, c, v);
        }
    }
    CsrMatrix::from(&coo)
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of converged steps seen so far.
    pub fn step(&self) -> u64 {
        self.step
    }

    fn commit(elements: &mut [Element], evaluated: Vec<Evaluated>, n: usize) -> VectorD {
        let mut r = VectorD::zeros(n);
        for (e, ev) in elements.iter_mut().zip(evaluated) {
            e.commit(ev.reaction);
            ev.residual.scatter(&mut r);
        }
        r
    }

    /// Residual of the regular phase, committing every element reaction.
    pub fn residual(&self, elements: &mut [Element], ctx: &AssemblyContext, coef: f64) -> VectorD {
        assert_eq!(ctx.phase, Phase::Regular);
        debug!(elements = elements.len(), coef, t = ctx.time, "assemble residual");
        let evaluated: Vec<Evaluated> = elements
            .par_iter()
            .map(|e| {
                let ev = e.eval_res(coef, ctx);
                check_residual(e, &ev.residual, e.work_space_dim().0);
                ev
            })
            .collect();
        Self::commit(elements, evaluated, ctx.dofs.len())
    }

    pub fn jacobian(&self, elements: &[Element], ctx: &AssemblyContext, coef: f64) -> CsrMatrix<f64> {
        assert_eq!(ctx.phase, Phase::Regular);
        debug!(elements = elements.len(), coef, t = ctx.time, "assemble jacobian");
        let blocks: Vec<SubMatrix> = elements
            .par_iter()
            .map(|e| {
                let wm = e.ass_jac(coef, ctx);
                check_jacobian(e, &wm, e.work_space_dim());
                wm
            })
            .collect();
        scatter_jacobian(ctx.dofs.len(), &blocks)
    }

    pub fn initial_residual(&self, elements: &mut [Element], ctx: &AssemblyContext) -> VectorD {
        assert_eq!(ctx.phase, Phase::Initial);
        debug!(elements = elements.len(), "assemble initial residual");
        let evaluated: Vec<Evaluated> = elements
            .par_iter()
            .map(|e| {
                let ev = e.initial_eval_res(ctx);
                check_residual(e, &ev.residual, e.initial_work_space_dim().0);
                ev
            })
            .collect();
        Self::commit(elements, evaluated, ctx.dofs.len())
    }

    pub fn initial_jacobian(&self, elements: &[Element], ctx: &AssemblyContext) -> CsrMatrix<f64> {
        assert_eq!(ctx.phase, Phase::Initial);
        debug!(elements = elements.len(), "assemble initial jacobian");
        let blocks: Vec<SubMatrix> = elements
            .par_iter()
            .map(|e| {
                let wm = e.initial_ass_jac(ctx);
                check_jacobian(e, &wm, e.initial_work_space_dim());
                wm
            })
            .collect();
        scatter_jacobian(ctx.dofs.len(), &blocks)
    }

    /// Inverse dynamics residual, elements without the capability are skipped.
    pub fn inverse_dynamics_residual(
        &self,
        elements: &mut [Element],
        ctx: &AssemblyContext,
        order: InverseDynamicsOrder,
    ) -> VectorD {
        assert_eq!(ctx.phase, Phase::InverseDynamics);
        debug!(elements = elements.len(), ?order, "assemble inverse dynamics residual");
        let evaluated: Vec<Evaluated> = elements
            .par_iter()
            .map(|e| match e.inverse_dynamics() {
                Some(id) => {
                    let ev = id.id_eval_res(ctx, order);
                    if !ev.residual.is_empty() {
                        check_residual(e, &ev.residual, e.work_space_dim().0);
                    }
                    ev
                }
                None => Evaluated::empty(),
            })
            .collect();
        Self::commit(elements, evaluated, ctx.dofs.len())
    }

    pub fn inverse_dynamics_jacobian(&self, elements: &[Element], ctx: &AssemblyContext) -> CsrMatrix<f64> {
        assert_eq!(ctx.phase, Phase::InverseDynamics);
        debug!(elements = elements.len(), "assemble inverse dynamics jacobian");
        let blocks: Vec<SubMatrix> = elements
            .par_iter()
            .filter_map(|e| {
                e.inverse_dynamics().map(|id| {
                    let wm = id.id_ass_jac(ctx);
                    check_jacobian(e, &wm, e.work_space_dim());
                    wm
                })
            })
            .collect();
        scatter_jacobian(ctx.dofs.len(), &blocks)
    }

    /// Forwards convergence of the current step to every element once.
    pub fn after_convergence(&mut self, elements: &mut [Element], ctx: &AssemblyContext) {
        for e in elements.iter_mut() {
            e.after_convergence(ctx);
        }
        self.step += 1;
        debug!(step = self.step, t = ctx.time, "after convergence");
    }

    pub fn output(&self, elements: &[Element], oh: &mut OutputHandler) -> OutputResult<()> {
        for e in elements {
            e.output(oh)?;
        }
        Ok(())
    }
}
