use std::io::Write;
use std::net::TcpStream;
use std::sync::mpsc;
use std::time::Duration;

use vision_console::{ConnectionListener, ListenerConfig, MetadataEvent};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn spawn_listener() -> (vision_console::ListenerHandle, mpsc::Receiver<MetadataEvent>) {
    let (tx, rx) = mpsc::channel::<MetadataEvent>();
    let handle = ConnectionListener::spawn(
        ListenerConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        tx,
    )
    .expect("spawn listener");
    (handle, rx)
}

#[test]
fn decodes_payloads_from_a_connected_peer() {
    let (handle, rx) = spawn_listener();

    let mut peer = TcpStream::connect(handle.addr).expect("connect");
    peer.write_all(br#"{"label": "person", "confidence": 0.9}"#)
        .expect("send");

    match rx.recv_timeout(RECV_TIMEOUT).expect("event") {
        MetadataEvent::Record(record) => {
            assert_eq!(record.label, "person");
            assert!((record.confidence - 0.9).abs() < 1e-6);
        }
        MetadataEvent::DecodeError(reason) => panic!("unexpected decode error: {reason}"),
    }

    drop(peer);
    handle.stop().expect("stop listener");
}

#[test]
fn malformed_payload_becomes_decode_error_and_peer_survives() {
    let (handle, rx) = spawn_listener();

    let mut peer = TcpStream::connect(handle.addr).expect("connect");
    peer.write_all(b"not json at all").expect("send garbage");

    match rx.recv_timeout(RECV_TIMEOUT).expect("event") {
        MetadataEvent::DecodeError(reason) => assert!(reason.contains("invalid JSON")),
        MetadataEvent::Record(record) => panic!("expected decode error, got {record:?}"),
    }

    // Same connection keeps working after the bad payload.
    peer.write_all(br#"{"label": "car"}"#).expect("send valid");
    match rx.recv_timeout(RECV_TIMEOUT).expect("event") {
        MetadataEvent::Record(record) => assert_eq!(record.label, "car"),
        MetadataEvent::DecodeError(reason) => panic!("unexpected decode error: {reason}"),
    }

    drop(peer);
    handle.stop().expect("stop listener");
}

#[test]
fn accepts_a_new_peer_after_disconnect_on_the_same_port() {
    let (handle, rx) = spawn_listener();
    let addr = handle.addr;

    {
        let mut first = TcpStream::connect(addr).expect("first connect");
        first.write_all(br#"{"label": "first"}"#).expect("send");
        match rx.recv_timeout(RECV_TIMEOUT).expect("event") {
            MetadataEvent::Record(record) => assert_eq!(record.label, "first"),
            MetadataEvent::DecodeError(reason) => panic!("unexpected decode error: {reason}"),
        }
    }

    // The listener restarts its cycle; the port stays stable. Connection
    // attempts may race the rebind, so retry briefly.
    let deadline = std::time::Instant::now() + RECV_TIMEOUT;
    let mut second = loop {
        match TcpStream::connect(addr) {
            Ok(stream) => break stream,
            Err(err) if std::time::Instant::now() < deadline => {
                let _ = err;
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => panic!("reconnect failed: {err}"),
        }
    };
    second.write_all(br#"{"label": "second"}"#).expect("send");
    match rx.recv_timeout(RECV_TIMEOUT).expect("event") {
        MetadataEvent::Record(record) => assert_eq!(record.label, "second"),
        MetadataEvent::DecodeError(reason) => panic!("unexpected decode error: {reason}"),
    }

    handle.stop().expect("stop listener");
}
