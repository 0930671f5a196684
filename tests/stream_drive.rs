use std::io::Write;
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use mbdae::{
    config::ModelConfig,
    context::{AssemblyContext, Phase},
    error::ChannelError,
    model::Model,
    output::SharedBuffer,
    stream::{EchoConfig, MemoryChannel, ServeStatus, StreamDrive, StreamDriveConfig},
};

fn config(channels: i64) -> StreamDriveConfig {
    StreamDriveConfig {
        label: 3,
        name: "loads".to_string(),
        create: false,
        path: None,
        host: Some("127.0.0.1".to_string()),
        port: None,
        blocking: true,
        input_every: 1,
        receive_first: true,
        timeout: 0.,
        echo: None,
        channels,
        initial_values: None,
    }
}

fn statuses(drive: &mut StreamDrive, steps: usize) -> Vec<ServeStatus> {
    (0..steps)
        .map(|i| drive.serve_pending(i as f64 * 0.1).unwrap())
        .collect()
}

#[test]
fn test_input_every_cadence() {
    use ServeStatus::*;

    let mut c = config(1);
    c.input_every = 2;
    let (tx, rx) = MemoryChannel::pair("loads");
    let mut drive = StreamDrive::new(&c, Box::new(rx)).unwrap();
    for v in 0..3 {
        tx.send(&[v as f64]);
    }
    assert_eq!(
        statuses(&mut drive, 5),
        vec![Updated, Idle, Updated, Idle, Updated]
    );
    assert_relative_eq!(drive.values().get(0), 2.);

    c.receive_first = false;
    let (tx, rx) = MemoryChannel::pair("loads");
    let mut drive = StreamDrive::new(&c, Box::new(rx)).unwrap();
    for v in 0..2 {
        tx.send(&[v as f64]);
    }
    assert_eq!(
        statuses(&mut drive, 5),
        vec![Idle, Idle, Updated, Idle, Updated]
    );
}

#[test]
fn test_abandoned_drive_keeps_last_values() {
    let mut c = config(2);
    c.initial_values = Some(vec![4., 5.]);
    let (tx, rx) = MemoryChannel::pair("loads");
    let mut drive = StreamDrive::new(&c, Box::new(rx)).unwrap();
    assert_eq!(drive.values().snapshot(), vec![4., 5.]);

    tx.send(&[1., -1.]);
    drop(tx);
    assert_eq!(drive.serve_pending(0.).unwrap(), ServeStatus::Updated);
    for t in [0.1, 0.2, 0.3] {
        assert_eq!(drive.serve_pending(t).unwrap(), ServeStatus::Abandoned);
    }
    assert!(drive.is_abandoned());
    assert_eq!(drive.values().snapshot(), vec![1., -1.]);
}

#[test]
fn test_non_blocking_idle() {
    let mut c = config(1);
    c.blocking = false;
    let (tx, rx) = MemoryChannel::pair("loads");
    let mut drive = StreamDrive::new(&c, Box::new(rx)).unwrap();
    assert_eq!(drive.serve_pending(0.).unwrap(), ServeStatus::Idle);
    tx.send(&[7.]);
    assert_eq!(drive.serve_pending(0.1).unwrap(), ServeStatus::Updated);
    assert_relative_eq!(drive.values().get(0), 7.);
    assert_eq!(drive.serve_pending(0.2).unwrap(), ServeStatus::Idle);
}

#[test]
fn test_blocking_timeout_is_an_error() {
    let mut c = config(1);
    c.timeout = 0.05;
    let (_tx, rx) = MemoryChannel::pair("loads");
    let mut drive = StreamDrive::new(&c, Box::new(rx)).unwrap();
    let err = drive.serve_pending(0.).unwrap_err();
    assert!(matches!(err, ChannelError::Timeout { .. }));
    assert!(err.to_string().contains("loads"));
}

#[test]
fn test_echo_on_change() {
    let mut c = config(2);
    c.echo = Some(EchoConfig {
        file: "loads.echo".to_string(),
        precision: 3,
        shift: 1.,
    });
    let buf = SharedBuffer::new();
    let (tx, rx) = MemoryChannel::pair("loads");
    let mut drive = StreamDrive::new(&c, Box::new(rx))
        .unwrap()
        .with_echo_sink(Box::new(buf.clone()));

    tx.send(&[2.5, -0.125]);
    tx.send(&[2.5, -0.125]);
    drive.serve_pending(0.5).unwrap();
    drive.serve_pending(0.6).unwrap();
    // unchanged values are not echoed again
    assert_eq!(buf.contents(), "1.500e0 2.500e0 -1.250e-1\n");
}

#[test]
fn test_file_drive_feeds_joint() {
    let json = r#"{
        "nodes": [{"label": 1, "position": [0.0, 0.0, 0.0]}],
        "stream_drives": [
            {"label": 5, "name": "vel", "channels": 2, "initial_values": [0.0, 0.75]}
        ],
        "elements": [
            {"type": "linear_velocity", "label": 9, "node": 1, "direction": [1.0, 0.0, 0.0],
             "drive": {"type": "file", "drive": 5, "index": 2}}
        ]
    }"#;
    let config = ModelConfig::from_json(json).unwrap();
    let (tx, rx) = MemoryChannel::pair("vel");
    let mut rx = Some(rx);
    let mut model = Model::build_with(&config, |c| {
        StreamDrive::new(c, Box::new(rx.take().expect("one stream drive")))
    })
    .unwrap();

    let constraint = |model: &Model| {
        let (x, xp) = model.initial_state(Phase::Regular);
        let ctx = AssemblyContext::new(&model.nodes, &model.dofs, Phase::Regular, 0., &x, &xp);
        model.element(9).unwrap().eval_res(1., &ctx).residual.at(12)
    };
    assert_relative_eq!(constraint(&model), 0.75);

    tx.send(&[3., -1.25]);
    assert_eq!(model.serve_pending(0.1).unwrap(), vec![ServeStatus::Updated]);
    assert_relative_eq!(constraint(&model), -1.25);

    drop(tx);
    assert_eq!(model.serve_pending(0.2).unwrap(), vec![ServeStatus::Abandoned]);
    assert_relative_eq!(constraint(&model), -1.25);
}

#[test]
fn test_unknown_stream_drive() {
    let json = r#"{
        "nodes": [{"label": 1, "position": [0.0, 0.0, 0.0]}],
        "elements": [
            {"type": "linear_velocity", "label": 9, "node": 1, "direction": [1.0, 0.0, 0.0],
             "drive": {"type": "file", "drive": 5, "index": 1}}
        ]
    }"#;
    let config = ModelConfig::from_json(json).unwrap();
    let err = Model::build_with(&config, |c| panic!("unexpected stream drive {}", c.label))
        .unwrap_err();
    assert!(err.to_string().contains("unknown stream drive 5"));
}

#[test]
fn test_tcp_socket_drive() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut bytes = Vec::new();
        for v in [1.5f64, -3.] {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        stream.write_all(&bytes).unwrap();
    });

    let mut c = config(2);
    c.port = Some(port);
    c.timeout = 5.;
    let mut drive = StreamDrive::connect(&c).unwrap();
    assert_eq!(drive.serve_pending(0.).unwrap(), ServeStatus::Updated);
    assert_eq!(drive.values().snapshot(), vec![1.5, -3.]);

    peer.join().unwrap();
    assert_eq!(drive.serve_pending(0.1).unwrap(), ServeStatus::Abandoned);
    assert_eq!(drive.serve_pending(0.2).unwrap(), ServeStatus::Abandoned);
    assert_eq!(drive.values().snapshot(), vec![1.5, -3.]);
}

#[test]
fn test_non_blocking_partial_message_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (sent_tx, sent_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        // first channel only, then stall with the connection open
        stream.write_all(&1.5f64.to_ne_bytes()).unwrap();
        sent_tx.send(()).unwrap();
        done_rx.recv().ok();
    });

    let mut c = config(2);
    c.port = Some(port);
    c.blocking = false;
    c.timeout = 0.1;
    let mut drive = StreamDrive::connect(&c).unwrap();
    sent_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));

    let err = drive.serve_pending(0.).unwrap_err();
    assert!(matches!(err, ChannelError::Timeout { .. }));
    done_tx.send(()).unwrap();
    peer.join().unwrap();
}
