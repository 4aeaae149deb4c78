//! Smoke tests for the ATNA Collector
//!
//! These tests load a configuration the way the binary does, send audit
//! messages through real sockets, and check they reach the log file and
//! the forward target.

use std::sync::Arc;
use std::time::Duration;

use atna_actions::{ActionDeps, ActionRegistry};
use atna_config::Config;
use atna_pipeline::{EndpointListener, ListenerState};
use atna_transport::TransportRegistry;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

const AUDIT_MESSAGE: &str = "<85>1 2026-03-01T10:00:00Z pacs-01 ris 1200 IHE+RFC-3881 - \
     <AuditMessage><EventIdentification EventActionCode=\"R\"/></AuditMessage>";

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn build(config: &Config) -> Vec<EndpointListener> {
    let registry = Arc::new(
        TransportRegistry::with_builtin(config.forwarding.forward_options().unwrap()).unwrap(),
    );
    let actions = ActionRegistry::with_builtin();
    let deps = ActionDeps::default();

    config
        .endpoint_configs()
        .unwrap()
        .into_iter()
        .map(|endpoint| {
            EndpointListener::new(endpoint, Arc::clone(&registry), &actions, &deps)
                .unwrap()
                .with_restart_policy(config.supervisor.restart_policy())
        })
        .collect()
}

#[tokio::test]
async fn test_tcp_octet_counted_to_log_and_forward() {
    let dir = tempfile::TempDir::new().unwrap();
    let log_path = dir.path().join("tcp-in.log");
    let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let toml = format!(
        r#"
[[endpoints]]
name = "tcp-in"
address = "tcp://127.0.0.1:0"
actions = ["log", "store", "forward"]
log_path = "{}"
forward = ["udp://{}"]
"#,
        log_path.display(),
        upstream.local_addr().unwrap()
    );
    let config: Config = toml.parse().unwrap();
    let listeners = build(&config);
    let listener = &listeners[0];

    listener.start().unwrap();
    wait_for("bind", || listener.local_addr().is_some()).await;

    let mut client = TcpStream::connect(listener.local_addr().unwrap())
        .await
        .unwrap();
    let frame = format!("{} {}", AUDIT_MESSAGE.len(), AUDIT_MESSAGE);
    client.write_all(frame.as_bytes()).await.unwrap();
    client.flush().await.unwrap();

    let mut buf = vec![0u8; 4096];
    let (n, _) = timeout(Duration::from_secs(5), upstream.recv_from(&mut buf))
        .await
        .expect("forwarded datagram")
        .unwrap();
    assert_eq!(&buf[..n], AUDIT_MESSAGE.as_bytes());

    wait_for("dispatch", || listener.metrics().events_dispatched == 1).await;
    assert_eq!(listener.metrics().action_failures, 0);

    listener.stop();
    listener.wait().await;
    assert_eq!(listener.state(), ListenerState::Stopped);

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("[MESSAGE] endpoint=tcp-in"));
    assert!(contents.contains("hostname=pacs-01 process=ris"));
    assert!(contents.contains("msg_type=IHE+RFC-3881"));
}

#[tokio::test]
async fn test_udp_invalid_message_is_logged() {
    let dir = tempfile::TempDir::new().unwrap();
    let log_path = dir.path().join("udp-in.log");

    let toml = format!(
        r#"
[supervisor]
max_restarts = 1

[[endpoints]]
name = "udp-in"
address = "udp://127.0.0.1:0"
actions = ["log"]
log_path = "{}"
"#,
        log_path.display()
    );
    let config: Config = toml.parse().unwrap();
    let listeners = build(&config);
    let listener = &listeners[0];

    listener.start().unwrap();
    wait_for("bind", || listener.local_addr().is_some()).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    client.send_to(b"not syslog at all", addr).await.unwrap();
    client.send_to(AUDIT_MESSAGE.as_bytes(), addr).await.unwrap();

    wait_for("dispatch", || listener.metrics().events_dispatched == 2).await;
    listener.stop();
    listener.wait().await;

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("[INVALID] endpoint=udp-in"));
    assert!(lines[0].ends_with("body=not syslog at all"));
    assert!(lines[1].contains("[MESSAGE] endpoint=udp-in"));

    let transport = listener.transport_metrics();
    assert_eq!(transport.messages_received, 1);
    assert_eq!(transport.invalid_messages, 1);
}

#[tokio::test]
async fn test_every_endpoint_builds() {
    let dir = tempfile::TempDir::new().unwrap();
    let toml = format!(
        r#"
[[endpoints]]
name = "udp-in"
address = "udp://127.0.0.1:0"
actions = ["store"]

[[endpoints]]
name = "tcp-in"
address = "tcp://127.0.0.1:0"
actions = ["log", "store"]
log_path = "{}"

[[endpoints]]
name = "http-in"
address = "http://127.0.0.1:0"
actions = ["store"]
"#,
        dir.path().join("tcp.log").display()
    );
    let config: Config = toml.parse().unwrap();
    let listeners = build(&config);

    let names: Vec<&str> = listeners.iter().map(|l| l.name()).collect();
    assert_eq!(names, vec!["udp-in", "tcp-in", "http-in"]);
    assert_eq!(listeners[1].actions(), vec!["log", "store"]);
    assert!(listeners.iter().all(|l| l.state() == ListenerState::Created));
}
