//! End-to-end scenarios driven through the public [`Controller`] API against
//! an in-memory transport, covering the literal wire-format scenarios and
//! the tracker/dispatcher properties that need a running core to observe.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use velocitydrive_proto::coap::{self, Payload};
use velocitydrive_proto::mup1::{self, FrameType};
use velocitydrive_proto::{Controller, Result, Transport, VelocityConfig};

struct EchoTransport {
    out: mpsc::Sender<Bytes>,
}

#[async_trait]
impl Transport for EchoTransport {
    async fn send_bytes(&self, bytes: Bytes) -> Result<()> {
        let _ = self.out.send(bytes).await;
        Ok(())
    }
}

fn harness(config: VelocityConfig) -> (Arc<Controller>, mpsc::Receiver<Bytes>, mpsc::Sender<Bytes>) {
    let (to_device, from_core) = mpsc::channel(16);
    let (to_core, from_device) = mpsc::channel(16);
    let transport = Arc::new(EchoTransport { out: to_device });
    let controller = Controller::new(transport, from_device, config);
    (controller, from_core, to_core)
}

#[tokio::test]
async fn coap_fetch_round_trips_through_full_stack() {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();

    let (controller, mut from_core, to_core) = harness(VelocityConfig::default());

    let responder = tokio::spawn(async move {
        let outbound = from_core.recv().await.unwrap();
        let (frame_type, payload, checksum_ok) = mup1::decode(&outbound).unwrap();
        assert!(matches!(frame_type, FrameType::Coap));
        assert!(checksum_ok);
        let request = coap::parse(&payload).unwrap();

        // 2.05 Content, echoing the request's mid, with a CBOR reply.
        let mut response = vec![0x40, 0x45, (request.mid >> 8) as u8, (request.mid & 0xFF) as u8];
        response.push(0xFF);
        response.extend_from_slice(&velocitydrive_proto::cbor::encode(
            &velocitydrive_proto::cbor::Value::Bool(true),
        ));
        let frame = mup1::encode(FrameType::Coap, &response);
        to_core.send(Bytes::from(frame)).await.unwrap();
    });

    let handshake = velocitydrive_proto::cbor::Value::Array(vec![
        velocitydrive_proto::cbor::Value::Integer(0x7278.into()),
    ]);
    let result = controller.coap_fetch("c?d=a", Some(&handshake)).await.unwrap();
    match result {
        Some(Payload::Cbor(velocitydrive_proto::cbor::Value::Bool(b))) => assert!(b),
        other => panic!("expected CBOR bool payload, got {other:?}"),
    }

    responder.await.unwrap();
}

#[tokio::test]
async fn response_with_client_error_code_rejects_with_not_found() {
    let (controller, mut from_core, to_core) = harness(VelocityConfig::default());

    tokio::spawn(async move {
        let outbound = from_core.recv().await.unwrap();
        let (_, payload, _) = mup1::decode(&outbound).unwrap();
        let request = coap::parse(&payload).unwrap();

        let response = vec![
            0x40,
            0x84,
            (request.mid >> 8) as u8,
            (request.mid & 0xFF) as u8,
        ];
        let frame = mup1::encode(FrameType::Coap, &response);
        to_core.send(Bytes::from(frame)).await.unwrap();
    });

    let err = controller.coap_get("missing", None).await.unwrap_err();
    match err {
        velocitydrive_proto::Error::ResponseError { code, reason, .. } => {
            assert_eq!(code, 0x84);
            assert_eq!(reason, "Not Found");
        }
        other => panic!("expected ResponseError, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_requests_get_distinct_mids_and_resolve_independently() {
    let (controller, mut from_core, to_core) = harness(VelocityConfig::default());

    let responder = tokio::spawn(async move {
        let mut mids = Vec::new();
        for _ in 0..2 {
            let outbound = from_core.recv().await.unwrap();
            let (_, payload, _) = mup1::decode(&outbound).unwrap();
            let request = coap::parse(&payload).unwrap();
            mids.push(request.mid);
        }
        assert_ne!(mids[0], mids[1]);

        for mid in mids {
            let response = vec![0x40, 0x45, (mid >> 8) as u8, (mid & 0xFF) as u8];
            let frame = mup1::encode(FrameType::Coap, &response);
            to_core.send(Bytes::from(frame)).await.unwrap();
        }
    });

    let a = controller.coap_get("a", None);
    let b = controller.coap_get("b", None);
    let (ra, rb) = tokio::join!(a, b);
    assert!(ra.is_ok());
    assert!(rb.is_ok());
    responder.await.unwrap();
}

#[tokio::test]
async fn watch_status_does_not_affect_request_handling() {
    let (controller, mut from_core, to_core) = harness(VelocityConfig::default());
    let (status_tx, status_rx) = mpsc::channel(4);
    controller.watch_status(status_rx);
    status_tx.send(velocitydrive_proto::Status::Connected).await.unwrap();
    status_tx
        .send(velocitydrive_proto::Status::Error("link flap".into()))
        .await
        .unwrap();

    let responder = tokio::spawn(async move {
        let outbound = from_core.recv().await.unwrap();
        let (_, payload, _) = mup1::decode(&outbound).unwrap();
        let request = coap::parse(&payload).unwrap();
        let response = vec![0x40, 0x45, (request.mid >> 8) as u8, (request.mid & 0xFF) as u8];
        let frame = mup1::encode(FrameType::Coap, &response);
        to_core.send(Bytes::from(frame)).await.unwrap();
    });

    let result = controller.coap_get("x", None).await;
    assert!(result.is_ok());
    responder.await.unwrap();
}

#[tokio::test]
async fn timed_out_request_discards_late_response_per_spec_s6() {
    let mut config = VelocityConfig::default();
    config.request_timeout = Duration::from_millis(30);
    let (controller, mut from_core, to_core) = harness(config);

    let late_response_sent = tokio::spawn(async move {
        let outbound = from_core.recv().await.unwrap();
        let (_, payload, _) = mup1::decode(&outbound).unwrap();
        let request = coap::parse(&payload).unwrap();

        // Arrives well after the 30ms deadline.
        tokio::time::sleep(Duration::from_millis(80)).await;
        let response = vec![
            0x40,
            0x45,
            (request.mid >> 8) as u8,
            (request.mid & 0xFF) as u8,
        ];
        let frame = mup1::encode(FrameType::Coap, &response);
        to_core.send(Bytes::from(frame)).await.unwrap();
    });

    let result = controller.coap_get("slow", None).await;
    assert!(matches!(result, Err(velocitydrive_proto::Error::Timeout)));

    late_response_sent.await.unwrap();
    // Give the dispatcher a moment to process (and discard) the late frame.
    tokio::time::sleep(Duration::from_millis(20)).await;
}
