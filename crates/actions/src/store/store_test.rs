use super::*;
use crate::test_support::{context, invalid_event, message_event, security_alert};
use atna_protocol::{PeerCertificate, RawMessage};
use parking_lot::Mutex;

const AUDIT: &str = "<AuditMessage><EventIdentification/><ActiveParticipant/>\
                     <AuditSourceIdentification/></AuditMessage>";

/// Sink that keeps everything in memory
#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
    alerts: Mutex<Vec<AuditAlert>>,
    unavailable: bool,
}

impl AuditSink for MemorySink {
    fn store(&self, record: AuditRecord) -> SinkFuture<'_> {
        Box::pin(async move {
            if self.unavailable {
                return Err(AuditSinkError::Unavailable("database down".into()));
            }
            self.records.lock().push(record);
            Ok(())
        })
    }

    fn alert(&self, alert: AuditAlert) -> SinkFuture<'_> {
        Box::pin(async move {
            self.alerts.lock().push(alert);
            Ok(())
        })
    }
}

/// Decoder that always fails
struct BrokenDecoder;

impl AuditDecoder for BrokenDecoder {
    fn decode(&self, _message: &RawMessage) -> atna_protocol::ParseResult {
        atna_protocol::ParseResult::error("decoder crashed")
    }
}

fn action(sink: &Arc<MemorySink>) -> StoreAction {
    let sink: Arc<dyn AuditSink> = Arc::clone(sink) as _;
    StoreAction::new(Arc::new(AuditMessageDecoder::new()), sink)
}

#[tokio::test]
async fn test_accepted_message_is_stored() {
    let sink = Arc::new(MemorySink::default());
    let event = message_event(AUDIT).with_peer_certificate(Some(PeerCertificate {
        der: vec![0x30],
        thumbprint: "00FF".into(),
    }));

    action(&sink).handle_message(&context(), &event).await.unwrap();

    let records = sink.records.lock();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(&*record.endpoint, "test-endpoint");
    assert_eq!(record.message.body(), AUDIT);
    assert_eq!(record.solicitor, event.solicitor);
    assert_eq!(record.receiver, event.receiver);
    assert_eq!(record.received_at, event.timestamp);
    assert_eq!(record.peer_thumbprint.as_deref(), Some("00FF"));
    assert!(sink.alerts.lock().is_empty());
}

#[tokio::test]
async fn test_rejected_message_raises_alert() {
    let sink = Arc::new(MemorySink::default());

    action(&sink)
        .handle_message(&context(), &message_event("not xml at all"))
        .await
        .unwrap();

    assert!(sink.records.lock().is_empty());
    let alerts = sink.alerts.lock();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind(), "rejected");
    assert_eq!(alerts[0].reason(), "payload is not XML");
}

#[tokio::test]
async fn test_decoder_error_is_action_error() {
    let sink = Arc::new(MemorySink::default());
    let action = StoreAction::new(Arc::new(BrokenDecoder), Arc::clone(&sink) as _);

    let err = action
        .handle_message(&context(), &message_event(AUDIT))
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::Decode(ref m) if m == "decoder crashed"));
    assert!(sink.records.lock().is_empty());
    assert!(sink.alerts.lock().is_empty());
}

#[tokio::test]
async fn test_sink_failure_propagates() {
    let sink = Arc::new(MemorySink {
        unavailable: true,
        ..MemorySink::default()
    });

    let err = action(&sink)
        .handle_message(&context(), &message_event(AUDIT))
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::Sink(AuditSinkError::Unavailable(_))));
}

#[tokio::test]
async fn test_invalid_and_security_events_raise_alerts() {
    let sink = Arc::new(MemorySink::default());
    let action = action(&sink);
    let ctx = context();

    action
        .handle_invalid(&ctx, &invalid_event("<13>broken", "bad header"))
        .await
        .unwrap();
    action
        .handle_security_alert(&ctx, &security_alert("certificate not trusted"))
        .await
        .unwrap();

    let alerts = sink.alerts.lock();
    assert_eq!(alerts.len(), 2);
    match &alerts[0] {
        AuditAlert::Invalid {
            original, fault, ..
        } => {
            assert_eq!(original, "<13>broken");
            assert_eq!(fault, "bad header");
        }
        other => panic!("expected invalid alert, got {other:?}"),
    }
    assert_eq!(alerts[1].kind(), "security");
    assert_eq!(alerts[1].reason(), "certificate not trusted");
    assert_eq!(alerts[1].endpoint(), "test-endpoint");
}

#[tokio::test]
async fn test_tracing_sink_accepts_everything() {
    let sink = TracingAuditSink;
    let alert = AuditAlert::Security {
        endpoint: "e".into(),
        solicitor: crate::test_support::peer(),
        receiver: crate::test_support::local(),
        reason: "r".into(),
    };
    sink.alert(alert).await.unwrap();
}

#[test]
fn test_factory_uses_shared_deps() {
    let action = StoreFactory
        .create(
            &EndpointConfig::new("e", "tcp://127.0.0.1:0".parse().unwrap()),
            &ActionDeps::default(),
        )
        .unwrap();
    assert_eq!(action.name(), "store");
}
