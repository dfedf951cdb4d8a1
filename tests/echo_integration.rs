//! Integration tests for C-ECHO against the mock SCP

mod common;

use common::{init_tracing, Behavior, Event, MockScp, Script};
use dicomtools_rust::io::{Association, AssociationOptions, AssociationState, DimseResponse};
use dicomtools_rust::protocol::types::{AssociateRj, RejectResult, RejectSource, ServiceUserReason};
use dicomtools_rust::protocol::{uid, AeTitle};
use dicomtools_rust::{ClientConfig, DicomClient, DicomError};
use futures::StreamExt;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

#[tokio::test]
async fn test_echo_success() {
    init_tracing();
    let scp = MockScp::spawn(Script::default()).await;
    let client = DicomClient::new(scp.config()).unwrap();

    let result = client.echo().await.unwrap();
    assert_eq!(result.status, "Success");
    assert!(result.is_success());
    assert_eq!(result.host, "127.0.0.1");
    assert_eq!(result.port, scp.port);

    let events = scp.events();
    assert_eq!(
        events[0],
        Event::Associated {
            calling_ae: "DICOMTOOLS-SCU".to_string(),
            max_pdu_length: Some(16384),
        }
    );
    assert_eq!(events[1], Event::Echo { message_id: 1 });
    assert_eq!(events[2], Event::ReleaseRequested);
}

#[tokio::test]
async fn test_echo_rejected_called_ae() {
    let scp = MockScp::spawn(Script {
        reject: Some(AssociateRj {
            result: RejectResult::Permanent,
            source: RejectSource::ServiceUser(ServiceUserReason::CalledAeTitleNotRecognized),
        }),
        ..Default::default()
    })
    .await;
    let client = DicomClient::new(scp.config()).unwrap();

    match client.echo().await {
        Err(DicomError::AssociationRejected { reason }) => {
            assert_eq!(
                reason,
                "permanent rejection by service user: called AE title not recognized"
            );
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    let report = client.echo_report().await;
    assert_eq!(
        report.status,
        "Association was rejected. Reason: permanent rejection by service user: called AE title not recognized"
    );
}

#[tokio::test]
async fn test_echo_timeout_report() {
    let scp = MockScp::spawn(Script {
        behavior: Behavior::Silent,
        ..Default::default()
    })
    .await;
    let client = DicomClient::new(ClientConfig {
        echo_timeout_ms: 300,
        ..scp.config()
    })
    .unwrap();

    let report = client.echo_report().await;
    assert_eq!(report.status, "Failed: Connection timeout");
    assert!(report.elapsed >= Duration::from_millis(300));
    assert!(report.elapsed < Duration::from_millis(800));

    // the silent peer sees the abort
    assert!(scp.wait_for(|events| events.contains(&Event::Aborted)).await);
}

#[tokio::test]
async fn test_association_request_unanswered() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    // accept and read, never answer A-ASSOCIATE-RQ
    let peer = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let _ = socket.read_to_end(&mut received).await;
        received
    });
    let client = DicomClient::new(ClientConfig {
        echo_timeout_ms: 300,
        ..ClientConfig::new("127.0.0.1", port)
    })
    .unwrap();

    match client.echo().await {
        Err(DicomError::Timeout { elapsed }) => {
            assert!(elapsed >= Duration::from_millis(300));
            assert!(elapsed < Duration::from_millis(800));
        }
        other => panic!("expected timeout, got {:?}", other),
    }

    // the request reached the peer and the connection was dropped afterwards
    let received = tokio::time::timeout(Duration::from_secs(2), peer)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.first(), Some(&0x01));
}

#[tokio::test]
async fn test_echo_failure_status() {
    let scp = MockScp::spawn(Script {
        final_status: 0x0122,
        ..Default::default()
    })
    .await;
    let client = DicomClient::new(scp.config()).unwrap();

    match client.echo().await {
        Err(DicomError::DimseFailure { status, .. }) => assert_eq!(status, 0x0122),
        other => panic!("expected failure status, got {:?}", other),
    }
    // failure status is a negative answer, the association is still released
    assert!(scp.wait_for(|events| events.contains(&Event::ReleaseRequested)).await);
}

#[tokio::test]
async fn test_verification_not_accepted() {
    let scp = MockScp::spawn(Script {
        accepted: vec![uid::STUDY_ROOT_QR_FIND.to_string()],
        ..Default::default()
    })
    .await;
    let client = DicomClient::new(scp.config()).unwrap();

    assert!(matches!(
        client.echo().await,
        Err(DicomError::NoAcceptedContext { .. })
    ));
}

#[tokio::test]
async fn test_association_states_through_release() {
    let scp = MockScp::spawn(Script {
        transfer_syntax: uid::TransferSyntax::ImplicitVrLittleEndian,
        max_pdu_length: 4096,
        ..Default::default()
    })
    .await;
    let options = AssociationOptions::new(
        AeTitle::new("ECHOSCU").unwrap(),
        AeTitle::new("ANY-SCP").unwrap(),
    )
    .with_abstract_syntax(uid::VERIFICATION);

    let association = Association::establish("127.0.0.1", scp.port, options)
        .await
        .unwrap();
    assert_eq!(association.state(), AssociationState::Established);
    assert_eq!(association.peer_max_pdu_length(), 4096);
    assert!(!association.is_tls());
    let context = association.context_for(uid::VERIFICATION).unwrap();
    assert_eq!(context.id, 1);
    assert_eq!(
        context.transfer_syntax,
        uid::TransferSyntax::ImplicitVrLittleEndian
    );

    let mut states = association.subscribe_state();
    let mut responses = association.send_echo().await.unwrap();
    assert_eq!(responses.next().await.unwrap().unwrap(), DimseResponse::Success);
    assert!(responses.next().await.is_none());

    association.release().await.unwrap();
    assert_eq!(*states.borrow_and_update(), AssociationState::Closed);
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = DicomClient::new(ClientConfig::new("127.0.0.1", port)).unwrap();
    assert!(matches!(
        client.echo().await,
        Err(DicomError::ConnectionError { .. })
    ));
}
