mod common;

use approx::assert_relative_eq;
use common::*;
use mbdae::{
    config::{ElementConfig, ModelConfig},
    model::Model,
    output::{Channel, OutputConfig, OutputHandler, SharedBuffer},
    restart::{parse, parse_elements, Statement},
    stream::{MemoryChannel, StreamDrive, StreamDriveConfig},
};

const MODEL: &str = r#"{
    "nodes": [
        {"label": 1, "position": [0.0, 0.0, 0.0], "orientation": [0.1, -0.2, 0.3]},
        {"label": 2, "position": [1.2, 0.3, -0.1], "orientation": [-0.3, 0.2, 0.1]}
    ],
    "stream_drives": [
        {"label": 4, "name": "loads", "host": "localhost", "port": 9100, "blocking": false,
         "input_every": 3, "receive_first": false, "timeout": 1.5, "channels": 2,
         "initial_values": [0.25, -1.0]}
    ],
    "elements": [
        {"type": "rod", "label": 10, "nodes": [1, 2],
         "law": {"type": "linear_visco_elastic", "stiffness": 80.0, "damping": 5.0}},
        {"type": "rod", "label": 11, "nodes": [1, 2], "length": 0.9,
         "law": {"type": "cubic_elastic", "e1": 100.0, "e2": -30.0, "e3": 400.0},
         "offsets": [[0.1, 0.2, -0.1], [-0.2, 0.05, 0.15]], "output": false},
        {"type": "linear_velocity", "label": 20, "node": 1, "direction": [0.3, -1.2, 0.5],
         "drive": {"type": "file", "drive": 4, "index": 2}},
        {"type": "angular_velocity", "label": 21, "node": 2, "direction": [0.0, 0.0, 1.0],
         "drive": {"type": "cosine", "initial_time": 0.5, "omega": 3.0, "amplitude": 0.1,
                   "cycles": {"half_cycles": 3}, "initial_value": 0.0}}
    ]
}"#;

fn open(c: &StreamDriveConfig) -> mbdae::error::ConfigResult<StreamDrive> {
    let (_tx, rx) = MemoryChannel::pair(&c.name);
    StreamDrive::new(c, Box::new(rx))
}

fn rebuild(nodes: &ModelConfig, text: &str) -> Model {
    let mut config = nodes.clone();
    config.stream_drives.clear();
    config.elements.clear();
    for statement in parse(text).unwrap() {
        match statement {
            Statement::StreamDrive(c) => config.stream_drives.push(c),
            Statement::Element(e) => config.elements.push(e),
        }
    }
    Model::build_with(&config, open).unwrap()
}

#[test]
fn test_restart_round_trip() {
    let config = ModelConfig::from_json(MODEL).unwrap();
    let model = Model::build_with(&config, open).unwrap();
    let text = model.restart();
    assert_eq!(text.lines().count(), 5);

    let rebuilt = rebuild(&config, &text);
    assert_eq!(rebuilt.restart(), text);
    assert_eq!(rebuilt.num_dofs(), model.num_dofs());
    assert_eq!(rebuilt.streams.get(4).unwrap().config(), model.streams.get(4).unwrap().config());
    for (a, b) in rebuilt.elements.iter().zip(&model.elements) {
        assert_eq!(a.config(), b.config());
    }
}

#[test]
fn test_length_from_nodes_is_written_once_measured() {
    let text = "joint: 3, rod, 1, 2, from nodes, linear elastic, 10.0;";
    let parsed = parse_elements(text).unwrap();
    assert!(matches!(parsed[0], ElementConfig::Rod { length: None, .. }));
    assert_eq!(parsed[0].restart(), text);

    let model = model(&format!(
        r#"{{"nodes": {TWO_NODES}, "elements": {}}}"#,
        serde_json::to_string(&parsed).unwrap()
    ));
    let ElementConfig::Rod { length: Some(l), .. } = model.elements[0].config() else {
        panic!("expected a measured rod length");
    };
    assert_relative_eq!(l, (1.2f64 * 1.2 + 0.3 * 0.3 + 0.1 * 0.1).sqrt(), epsilon = 1e-12);

    let first = model.restart();
    let config = ModelConfig::from_json(&format!(r#"{{"nodes": {TWO_NODES}, "elements": []}}"#))
        .unwrap();
    assert_eq!(rebuild(&config, &first).restart(), first);
}

#[test]
fn test_restart_channel() {
    let model = two_node_model(
        r#"[{"type": "rod", "label": 1, "nodes": [1, 2], "length": 2.0,
             "law": {"type": "linear_elastic", "stiffness": 3.0}}]"#,
    );
    let buf = SharedBuffer::new();
    let mut oh = OutputHandler::new(&OutputConfig::default()).unwrap();
    model.write_restart(&mut oh).unwrap();
    oh.open(Channel::Restart, Box::new(buf.clone()));
    model.write_restart(&mut oh).unwrap();
    assert_eq!(buf.contents(), "joint: 1, rod, 1, 2, 2.0, linear elastic, 3.0;\n");
}
