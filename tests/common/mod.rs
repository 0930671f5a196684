#![allow(dead_code)]

use approx::assert_relative_eq;
use itertools::Itertools;
use mbdae::{
    config::ModelConfig,
    context::{AssemblyContext, InverseDynamicsOrder, Phase},
    dof::DofOrder,
    element::Element,
    model::Model,
    prelude::*,
    workspace::{SubMatrix, SubVector},
};

/// Finite difference step
pub const H: f64 = 1e-6;

/// Builds a model without any stream drive sockets.
pub fn model(json: &str) -> Model {
    let config = ModelConfig::from_json(json).unwrap();
    Model::build_with(&config, |c| panic!("unexpected stream drive {}", c.label)).unwrap()
}

/// Two nodes with non-trivial reference orientations.
pub const TWO_NODES: &str = r#"[
    {"label": 1, "position": [0.0, 0.0, 0.0], "orientation": [0.1, -0.2, 0.3]},
    {"label": 2, "position": [1.2, 0.3, -0.1], "orientation": [-0.3, 0.2, 0.1]}
]"#;

pub fn two_node_model(elements: &str) -> Model {
    model(&format!(r#"{{"nodes": {TWO_NODES}, "elements": {elements}}}"#))
}

/// Seeds of the states the Jacobian is checked at.
pub const SEEDS: [u32; 4] = [0, 1, 2, 3];

/// Deterministic state away from the reference configuration.
pub fn perturbed_state(model: &Model, phase: Phase) -> (VectorD, VectorD) {
    seeded_state(model, phase, 0)
}

/// State away from the reference configuration, with per-seed phase offsets
/// so every seed visits a different point of the state space.
pub fn seeded_state(model: &Model, phase: Phase, seed: u32) -> (VectorD, VectorD) {
    let (mut x, mut xp) = model.initial_state(phase);
    let shift = 2.39996 * seed as f64;
    for i in 0..x.len() {
        x[i] += 0.05 * (0.7 * i as f64 + 0.3 + shift).sin();
        xp[i] += 0.4 * (1.3 * i as f64 + 0.1 + 1.7 * shift).cos();
    }
    (x, xp)
}

fn residual(element: &Element, ctx: &AssemblyContext, coef: f64) -> SubVector {
    match ctx.phase {
        Phase::Regular => element.eval_res(coef, ctx).residual,
        Phase::Initial => element.initial_eval_res(ctx).residual,
        Phase::InverseDynamics => {
            element
                .inverse_dynamics()
                .unwrap()
                .id_eval_res(ctx, InverseDynamicsOrder::InverseDynamics)
                .residual
        }
    }
}

pub fn analytic_jacobian(element: &Element, ctx: &AssemblyContext, coef: f64) -> SubMatrix {
    match ctx.phase {
        Phase::Regular => element.ass_jac(coef, ctx),
        Phase::Initial => element.initial_ass_jac(ctx),
        Phase::InverseDynamics => element.inverse_dynamics().unwrap().id_ass_jac(ctx),
    }
}

/// Central difference of the element residual at `rows` along one unknown.
#[allow(clippy::too_many_arguments)]
fn derivative(
    model: &Model,
    element: &Element,
    phase: Phase,
    x: &VectorD,
    xp: &VectorD,
    coef: f64,
    rows: &[usize],
    col: usize,
    rate: bool,
) -> Vec<f64> {
    let eval = |sign: f64| {
        let (mut x, mut xp) = (x.clone(), xp.clone());
        if rate {
            xp[col] += sign * H;
        } else {
            x[col] += sign * H;
        }
        let ctx = AssemblyContext::new(&model.nodes, &model.dofs, phase, 0.3, &x, &xp);
        let wv = residual(element, &ctx, coef);
        rows.iter().map(|&r| wv.at(r)).collect_vec()
    };
    let (plus, minus) = (eval(1.), eval(-1.));
    plus.iter()
        .zip(&minus)
        .map(|(p, m)| (p - m) / (2. * H))
        .collect()
}

/// Checks the element Jacobian against finite differences of its residual,
/// `-(∂R/∂XP + coef ∂R/∂X)` on differential columns of the regular phase
/// and `-∂R/∂X` everywhere else. Every seeded state is visited.
pub fn assert_jacobian_consistent(model: &Model, label: u32, phase: Phase, coef: f64) {
    for seed in SEEDS {
        assert_jacobian_consistent_at(model, label, phase, coef, seed);
    }
}

fn assert_jacobian_consistent_at(model: &Model, label: u32, phase: Phase, coef: f64, seed: u32) {
    let element = model.element(label).unwrap();
    let (x, xp) = seeded_state(model, phase, seed);
    let ctx = AssemblyContext::new(&model.nodes, &model.dofs, phase, 0.3, &x, &xp);
    let wm = analytic_jacobian(element, &ctx, coef);

    let rows = wm.rows().iter().copied().unique().collect_vec();
    for &col in wm.cols().iter().unique() {
        let dx = derivative(model, element, phase, &x, &xp, coef, &rows, col, false);
        let numeric = if phase == Phase::Regular && model.dofs.order_of(col) == DofOrder::Differential {
            let dxp = derivative(model, element, phase, &x, &xp, coef, &rows, col, true);
            dxp.iter().zip(&dx).map(|(a, b)| -(a + coef * b)).collect_vec()
        } else {
            dx.iter().map(|a| -a).collect_vec()
        };
        for (&row, &expected) in rows.iter().zip(&numeric) {
            assert_relative_eq!(
                wm.at(row, col),
                expected,
                epsilon = 1e-5,
                max_relative = 1e-5
            );
        }
    }
}
