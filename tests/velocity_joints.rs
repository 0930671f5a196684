mod common;

use approx::assert_relative_eq;
use common::*;
use mbdae::{
    assembly::Assembler,
    context::{AssemblyContext, Phase},
    element::PRIVATE_DATA_NOT_FOUND,
    model::Model,
    output::{Channel, OutputConfig, OutputHandler, SharedBuffer},
    prelude::*,
};

const JOINTS: &str = r#"{
    "nodes": [
        {"label": 1, "position": [0.0, 0.0, 0.0], "orientation": [0.0, 0.0, 0.5]}
    ],
    "elements": [
        {"type": "linear_velocity", "label": 7, "node": 1, "direction": [0.0, 3.0, 4.0],
         "drive": {"type": "const", "value": 2.0}},
        {"type": "angular_velocity", "label": 8, "node": 1, "direction": [1.0, 1.0, 0.0],
         "drive": {"type": "step", "initial_time": 1.0, "step_value": 0.5, "initial_value": -0.5}}
    ]
}"#;

// node unknowns, then one reaction per joint in declaration order
const LINEAR_LAMBDA: usize = 12;
const ANGULAR_LAMBDA: usize = 13;

fn state(model: &Model) -> (VectorD, VectorD) {
    let (mut x, mut xp) = model.initial_state(Phase::Regular);
    x[LINEAR_LAMBDA] = 0.8;
    x[ANGULAR_LAMBDA] = -1.5;
    xp.fixed_rows_mut::<3>(0).copy_from(&Vector3::new(0.3, 0.2, 0.1));
    xp.fixed_rows_mut::<3>(3).copy_from(&Vector3::new(-0.4, 0.6, 0.9));
    (x, xp)
}

#[test]
fn test_constraint_with_arbitrary_direction() {
    let model = model(JOINTS);
    let (x, xp) = state(&model);
    let ctx = AssemblyContext::new(&model.nodes, &model.dofs, Phase::Regular, 0., &x, &xp);

    // v0 - d·v, with d used as given
    let d = Vector3::new(0., 3., 4.);
    let wv = model.element(7).unwrap().eval_res(1., &ctx).residual;
    assert_relative_eq!(wv.at(LINEAR_LAMBDA), 2. - d.dot(&Vector3::new(0.3, 0.2, 0.1)));
    // reaction loads the node with -d λ
    assert_relative_eq!(wv.at(7), -3. * 0.8);
    assert_relative_eq!(wv.at(8), -4. * 0.8);

    // angular direction follows the node
    let dir = Vector3::new(0., 0., 0.5).rotation() * Vector3::new(1., 1., 0.);
    let w = Vector3::new(-0.4, 0.6, 0.9);
    let wv = model.element(8).unwrap().eval_res(1., &ctx).residual;
    assert_relative_eq!(wv.at(ANGULAR_LAMBDA), -0.5 - dir.dot(&w), epsilon = 1e-12);
    assert_relative_eq!(wv.at(9), -dir.x * -1.5, epsilon = 1e-12);
    assert_relative_eq!(wv.at(10), -dir.y * -1.5, epsilon = 1e-12);
}

#[test]
fn test_drive_is_evaluated_at_current_time() {
    let model = model(JOINTS);
    let (x, xp) = state(&model);
    let after = AssemblyContext::new(&model.nodes, &model.dofs, Phase::Regular, 2., &x, &xp);
    let before = AssemblyContext::new(&model.nodes, &model.dofs, Phase::Regular, 0.5, &x, &xp);
    let joint = model.element(8).unwrap();
    let r_after = joint.eval_res(1., &after).residual.at(ANGULAR_LAMBDA);
    let r_before = joint.eval_res(1., &before).residual.at(ANGULAR_LAMBDA);
    assert_relative_eq!(r_after - r_before, 1., epsilon = 1e-12);
}

#[test]
fn test_private_data_follows_last_residual() {
    let mut model = model(JOINTS);
    let (x, xp) = state(&model);
    let ctx = AssemblyContext::new(&model.nodes, &model.dofs, Phase::Regular, 3., &x, &xp);

    let linear = model.element(7).unwrap().private_data();
    assert_eq!(linear.num_private_data(), 2);
    assert_relative_eq!(linear.private_data_value(2), 0.);

    Assembler::new().residual(&mut model.elements, &ctx, 1.);

    let linear = model.element(7).unwrap().private_data();
    assert_relative_eq!(linear.private_data_value(linear.private_data_index("v")), 2.);
    assert_relative_eq!(linear.private_data_value(linear.private_data_index("F")), 0.8);
    assert_eq!(linear.private_data_index("w"), PRIVATE_DATA_NOT_FOUND);

    let angular = model.element(8).unwrap().private_data();
    assert_relative_eq!(angular.private_data_value(angular.private_data_index("w")), 0.5);
    assert_relative_eq!(angular.private_data_value(angular.private_data_index("M")), -1.5);
    assert_eq!(angular.private_data_index("v"), PRIVATE_DATA_NOT_FOUND);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_private_data_index_out_of_range() {
    let model = model(JOINTS);
    model.element(8).unwrap().private_data().private_data_value(3);
}

#[test]
fn test_output_record() {
    let mut model = model(JOINTS);
    let (x, xp) = state(&model);
    let ctx = AssemblyContext::new(&model.nodes, &model.dofs, Phase::Regular, 0., &x, &xp);
    let assembler = Assembler::new();
    assembler.residual(&mut model.elements, &ctx, 1.);

    let buf = SharedBuffer::new();
    let config = OutputConfig {
        structured: vec![Channel::Joints],
        ..Default::default()
    };
    let mut oh = OutputHandler::new(&config).unwrap();
    oh.open(Channel::Joints, Box::new(buf.clone()));
    model.element(7).unwrap().output(&mut oh).unwrap();

    let record: serde_json::Value = serde_json::from_str(buf.contents().trim()).unwrap();
    assert_eq!(record["label"], 7);
    assert_eq!(record["name"], "LinearVelocity");
    assert_relative_eq!(record["force_local"][0].as_f64().unwrap(), 0.8);
    assert_relative_eq!(record["force_global"][2].as_f64().unwrap(), 3.2, epsilon = 1e-12);
    assert_relative_eq!(record["extra"][3].as_f64().unwrap(), 2.);
}
