//! Integration tests for a node's raw TCP proxy over real loopback sockets.
//!
//! ```text
//! TCP client ──bytes──▶ node ──write──▶ serial port
//! TCP client ◀──bytes── node ◀──poll─── serial port
//! ```

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use serial_bridge::application::node::DataSource;
use serial_bridge::infrastructure::events::{ChannelObserver, NodeEvent};
use serial_bridge::infrastructure::serial::MockPortOpener;
use tokio::sync::mpsc::UnboundedReceiver;

use common::{node, observed_node, wait_until};

fn connect(addr: std::net::SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("timeout");
    stream
}

fn events(rx: &mut UnboundedReceiver<NodeEvent>) -> Vec<NodeEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[test]
fn test_serial_output_reaches_every_client() {
    // Arrange
    let opener = Arc::new(MockPortOpener::new());
    let node = node(&opener, "uart", "COM1");
    node.connect().unwrap();
    node.serve().unwrap();
    let mut first = connect(node.local_addr());
    let mut second = connect(node.local_addr());
    assert!(wait_until(|| node.client_count() == 2));

    // Act
    opener.handle("COM1").inject(b"login: ");
    assert_eq!(node.poll().unwrap(), 7);

    // Assert
    for client in [&mut first, &mut second] {
        let mut buf = [0u8; 7];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"login: ");
    }
}

#[test]
fn test_client_input_is_written_to_serial_port() {
    let opener = Arc::new(MockPortOpener::new());
    let node = node(&opener, "uart", "COM2");
    node.connect().unwrap();
    node.serve().unwrap();
    let mut client = connect(node.local_addr());

    client.write_all(b"root\r").unwrap();

    assert!(wait_until(|| opener.handle("COM2").written() == b"root\r"));
}

#[test]
fn test_dead_client_does_not_stop_fan_out() {
    // Arrange
    let opener = Arc::new(MockPortOpener::new());
    let node = node(&opener, "uart", "COM3");
    node.connect().unwrap();
    node.serve().unwrap();
    let gone = connect(node.local_addr());
    let mut alive = connect(node.local_addr());
    assert!(wait_until(|| node.client_count() == 2));

    // Act
    drop(gone);
    assert!(wait_until(|| node.client_count() == 1));
    opener.handle("COM3").inject(b"ok");
    node.poll().unwrap();

    // Assert
    let mut buf = [0u8; 2];
    alive.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ok");
}

#[test]
fn test_observer_sees_connect_data_and_disconnect() {
    // Arrange
    let opener = Arc::new(MockPortOpener::new());
    let (observer, mut rx) = ChannelObserver::new();
    let node = observed_node(&opener, "uart", "COM4", Arc::new(observer));
    node.connect().unwrap();
    node.serve().unwrap();

    // Act
    let mut client = connect(node.local_addr());
    let local = client.local_addr().unwrap();
    client.write_all(b"x").unwrap();
    assert!(wait_until(|| opener.handle("COM4").written() == b"x"));
    drop(client);

    // Assert
    let mut seen = Vec::new();
    assert!(wait_until(|| {
        seen.extend(events(&mut rx));
        seen.len() == 3
    }));
    assert_eq!(
        seen,
        vec![
            NodeEvent::Connected {
                node: "uart".into(),
                remote: local,
            },
            NodeEvent::Data {
                node: "uart".into(),
                source: DataSource::Tcp,
                bytes: b"x".to_vec(),
            },
            NodeEvent::Disconnected {
                node: "uart".into(),
                remote: local,
            },
        ]
    );
}

#[test]
fn test_client_input_while_offline_is_dropped() {
    let opener = Arc::new(MockPortOpener::new());
    let (observer, mut rx) = ChannelObserver::new();
    let node = observed_node(&opener, "uart", "COM5", Arc::new(observer));
    node.serve().unwrap();
    let mut client = connect(node.local_addr());
    assert!(wait_until(|| node.client_count() == 1));

    client.write_all(b"lost").unwrap();
    client.flush().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    assert!(opener.handle("COM5").written().is_empty());
    assert!(events(&mut rx)
        .iter()
        .all(|e| !matches!(e, NodeEvent::Data { .. })));
}

#[test]
fn test_listener_survives_serial_reconnect() {
    let opener = Arc::new(MockPortOpener::new());
    let node = node(&opener, "uart", "COM6");
    let addr = node.local_addr();
    node.serve().unwrap();

    node.connect().unwrap();
    node.disconnect().unwrap();
    node.connect().unwrap();
    let mut client = connect(addr);
    client.write_all(b"again").unwrap();

    assert_eq!(node.local_addr(), addr);
    assert!(wait_until(|| opener.handle("COM6").written() == b"again"));
    assert_eq!(opener.handle("COM6").open_count(), 2);
}
