use std::sync::Arc;
use std::time::{Duration, Instant};

use atna_transport::{ForwardOptions, TransportRegistry};
use tokio::net::UdpSocket;

use super::*;
use crate::test_support::{invalid_event, message_event};

fn context_with_builtin() -> ActionContext {
    let registry = TransportRegistry::with_builtin(ForwardOptions::default()).unwrap();
    ActionContext::new("relay", Arc::new(registry))
}

async fn receive(socket: &UdpSocket) -> String {
    let mut buf = vec![0u8; 2048];
    let n = tokio::time::timeout(Duration::from_secs(5), socket.recv(&mut buf))
        .await
        .expect("datagram not received")
        .unwrap();
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

#[test]
fn test_requires_a_target() {
    let err = ForwardAction::new(Vec::new()).err().unwrap();
    assert!(err.to_string().contains("at least one target"));
}

#[test]
fn test_factory_names_endpoint() {
    let config = EndpointConfig::new("edge", "udp://127.0.0.1:0".parse().unwrap());
    let err = ForwardFactory
        .create(&config, &ActionDeps::default())
        .err()
        .unwrap();
    assert!(err.to_string().contains("endpoint 'edge'"));

    let config = config.with_forward_targets(vec!["udp://127.0.0.1:514".parse().unwrap()]);
    let action = ForwardFactory.create(&config, &ActionDeps::default()).unwrap();
    assert_eq!(action.name(), "forward");
}

#[tokio::test]
async fn test_forwards_original_text() {
    let downstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target: Url = format!("udp://{}", downstream.local_addr().unwrap())
        .parse()
        .unwrap();
    let action = ForwardAction::new(vec![target]).unwrap();
    let ctx = context_with_builtin();

    let event = message_event("<AuditMessage/>");
    action.handle_message(&ctx, &event).await.unwrap();

    assert_eq!(receive(&downstream).await, event.message.original());
}

#[tokio::test]
async fn test_forwards_invalid_messages_too() {
    let downstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target: Url = format!("udp://{}", downstream.local_addr().unwrap())
        .parse()
        .unwrap();
    let action = ForwardAction::new(vec![target]).unwrap();

    action
        .handle_invalid(&context_with_builtin(), &invalid_event("<999>junk", "bad priority"))
        .await
        .unwrap();

    assert_eq!(receive(&downstream).await, "<999>junk");
}

#[tokio::test]
async fn test_unreachable_target_returns_immediately() {
    // Nothing listens on port 9 (discard) in the test environment
    let action = ForwardAction::new(vec![
        "tcp://127.0.0.1:9".parse().unwrap(),
        "ftp://127.0.0.1:21".parse().unwrap(),
    ])
    .unwrap();
    let ctx = context_with_builtin();

    let started = Instant::now();
    action
        .handle_message(&ctx, &message_event("x"))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));

    // Unknown scheme fails synchronously, the TCP send fails in the background
    assert_eq!(ctx.registry.metrics().submitted, 1);
    assert_eq!(ctx.registry.metrics().failed, 1);
}
