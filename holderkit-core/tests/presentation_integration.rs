#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{initialized_kit, requested, wait_for, MDL_DOC_TYPE, PID_DOC_TYPE};
use holderkit_core::engine::memory::{
    EngineCall, MemoryEngine, MemoryEngineFactory, MemoryProcessedRequest,
};
use holderkit_core::engine::{
    BrowserRequest, DisclosedDocument, DisclosedDocuments, EngineError, ProcessedRequest,
    ResultPayload, TransferEvent,
};
use holderkit_core::presentation::{BrowserOutcome, BrowserState, ProximityState, RemoteState};
use holderkit_core::trigger::ExternalTrigger;
use holderkit_core::{HolderConfig, HolderKit, HolderKitError};

fn browser_request() -> BrowserRequest {
    BrowserRequest {
        action: "androidx.credentials.registry.provider.action.GET_CREDENTIAL".to_string(),
        payload: br#"{"protocol":"openid4vp"}"#.to_vec(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proximity_request_shows_only_resolvable_documents() {
    let (engine, kit, root) = initialized_kit("proximity-request").await;
    engine.insert_issued_mdoc("pid-1", PID_DOC_TYPE);

    let session = kit.proximity_session().unwrap();
    session.start(()).await.unwrap();
    engine.emit(TransferEvent::QrEngagementReady {
        content: "mdoc:owBjMS4w".to_string(),
    });
    engine.emit(TransferEvent::Connected);

    let request: Arc<dyn ProcessedRequest> = Arc::new(
        MemoryProcessedRequest::new(vec![
            requested("pid-1", &["family_name", "birth_date"]),
            requested("mdl-1", &["portrait"]),
        ])
        .with_reader_name("Border Control"),
    );
    engine.emit(TransferEvent::RequestReceived(Ok(request)));

    let ProximityState::RequestReceived(shown) = session.state() else {
        panic!("expected a request, got {:?}", session.state());
    };
    assert_eq!(shown.verifier_name.as_deref(), Some("Border Control"));
    assert_eq!(shown.documents.len(), 1);
    assert_eq!(shown.documents["pid-1"].document.format.doc_type(), PID_DOC_TYPE);
    assert_eq!(shown.documents["pid-1"].requested.requested_items.len(), 2);
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_approve_discloses_every_requested_item() {
    let (engine, kit, root) = initialized_kit("proximity-approve").await;
    engine.insert_issued_mdoc("pid-1", PID_DOC_TYPE);
    engine.insert_issued_mdoc("mdl-1", MDL_DOC_TYPE);

    let session = kit.proximity_session().unwrap();
    session.start(()).await.unwrap();
    let request = Arc::new(MemoryProcessedRequest::new(vec![
        requested("pid-1", &["family_name", "birth_date"]),
        requested("mdl-1", &["portrait"]),
    ]));
    engine.emit(TransferEvent::RequestReceived(Ok(
        request.clone() as Arc<dyn ProcessedRequest>
    )));

    session.approve(&["pid-1".to_string()]).await.unwrap();
    assert_eq!(session.state(), ProximityState::SendingResponse);
    assert_eq!(
        request.last_disclosure(),
        Some(DisclosedDocuments {
            documents: vec![DisclosedDocument {
                document_id: "pid-1".to_string(),
                disclosed_items: vec!["family_name".to_string(), "birth_date".to_string()],
            }],
        })
    );
    assert_eq!(engine.sent_responses().len(), 1);

    engine.emit(TransferEvent::ResponseSent);
    assert_eq!(session.state(), ProximityState::ResponseSent);
    engine.emit(TransferEvent::Disconnected);
    assert_eq!(session.state(), ProximityState::Disconnected);
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_approve_without_request_does_not_touch_engine() {
    let (engine, kit, root) = initialized_kit("approve-none").await;
    let session = kit.proximity_session().unwrap();
    session.start(()).await.unwrap();

    let err = session.approve(&["pid-1".to_string()]).await.unwrap_err();
    assert_eq!(err, HolderKitError::NoActiveRequest);
    assert_eq!(
        session.state(),
        ProximityState::Error {
            message: "No active request to approve".to_string()
        }
    );
    assert!(engine.sent_responses().is_empty());
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_approve_is_rejected() {
    let (engine, kit, root) = initialized_kit("approve-twice").await;
    engine.insert_issued_mdoc("pid-1", PID_DOC_TYPE);
    let session = kit.remote_session().unwrap();
    session
        .start("openid4vp://?request_uri=https://verifier.example/r/1".to_string())
        .await
        .unwrap();

    let request = Arc::new(MemoryProcessedRequest::new(vec![requested(
        "pid-1",
        &["family_name"],
    )]));
    engine.emit(TransferEvent::RequestReceived(Ok(
        request.clone() as Arc<dyn ProcessedRequest>
    )));
    let ids = vec!["pid-1".to_string()];

    let (first, second) = tokio::join!(session.approve(&ids), session.approve(&ids));
    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );
    assert_eq!(request.generate_calls(), 1);
    assert_eq!(engine.sent_responses().len(), 1);
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_generation_failure_is_transfer_error() {
    let (engine, kit, root) = initialized_kit("generation-failure").await;
    engine.insert_issued_mdoc("pid-1", PID_DOC_TYPE);
    let session = kit.remote_session().unwrap();
    session.start("openid4vp://x".to_string()).await.unwrap();

    let request: Arc<dyn ProcessedRequest> = Arc::new(
        MemoryProcessedRequest::new(vec![requested("pid-1", &["family_name"])])
            .failing_generation(EngineError::failure("key unavailable")),
    );
    engine.emit(TransferEvent::RequestReceived(Ok(request)));

    let err = session.approve(&["pid-1".to_string()]).await.unwrap_err();
    assert_eq!(
        err,
        HolderKitError::Transfer {
            message: "Failed to send response: key unavailable".to_string()
        }
    );
    assert_eq!(
        session.state(),
        RemoteState::Error {
            message: "Failed to send response: key unavailable".to_string()
        }
    );
    assert!(engine.sent_responses().is_empty());
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_session_from_trigger() {
    let (engine, kit, root) = initialized_kit("remote-trigger").await;
    let link = "mdoc-openid4vp://?request_uri=https://verifier.example/r/7";
    let ExternalTrigger::PresentationRequest { uri } = ExternalTrigger::from_uri(link).unwrap()
    else {
        panic!("not a presentation request");
    };

    let session = kit.remote_session().unwrap();
    let mut states = session.watch();
    session.start(uri).await.unwrap();
    engine.emit(TransferEvent::RequestReceived(Err(EngineError::failure(
        "untrusted verifier",
    ))));

    let failed = wait_for(&mut states, |s| matches!(s, RemoteState::Error { .. })).await;
    assert_eq!(
        failed,
        RemoteState::Error {
            message: "Failed to process request: untrusted verifier".to_string()
        }
    );
    assert_eq!(engine.listener_count(), 0);
    assert_eq!(engine.calls(), vec![EngineCall::StartRemote(link.to_string())]);
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_browser_error_without_payload_is_cancelled() {
    let (engine, kit, root) = initialized_kit("browser-cancel").await;
    let session = kit.browser_session().unwrap();
    session.start(browser_request()).await.unwrap();

    engine.emit(TransferEvent::Error(EngineError::failure("no credentials")));
    assert_eq!(session.state().outcome(), BrowserOutcome::Cancelled);
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_browser_approve_returns_payload() {
    let (engine, kit, root) = initialized_kit("browser-approve").await;
    engine.insert_issued_mdoc("pid-1", PID_DOC_TYPE);
    let session = kit.browser_session().unwrap();
    session.start(browser_request()).await.unwrap();
    assert_eq!(
        engine.calls(),
        vec![EngineCall::StartBrowserMediated(browser_request())]
    );

    let request: Arc<dyn ProcessedRequest> = Arc::new(MemoryProcessedRequest::new(vec![
        requested("pid-1", &["age_over_18"]),
    ]));
    engine.emit(TransferEvent::RequestReceived(Ok(request)));
    session.approve(&["pid-1".to_string()]).await.unwrap();
    assert_eq!(session.state().outcome(), BrowserOutcome::Pending);

    let payload = ResultPayload::new(b"vp_token".to_vec());
    engine.emit(TransferEvent::IntentToSend(payload.clone()));
    assert_eq!(session.state(), BrowserState::ResponseReady(payload.clone()));
    assert_eq!(session.state().outcome(), BrowserOutcome::Completed(payload));
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deny_then_restart() {
    let (engine, kit, root) = initialized_kit("deny").await;
    engine.insert_issued_mdoc("pid-1", PID_DOC_TYPE);
    let session = kit.proximity_session().unwrap();
    session.start(()).await.unwrap();
    let request: Arc<dyn ProcessedRequest> =
        Arc::new(MemoryProcessedRequest::new(vec![requested("pid-1", &["family_name"])]));
    engine.emit(TransferEvent::RequestReceived(Ok(request)));

    session.deny();
    assert_eq!(session.state(), ProximityState::Idle);
    assert_eq!(engine.listener_count(), 0);
    assert_eq!(
        session.approve(&["pid-1".to_string()]).await.unwrap_err(),
        HolderKitError::NoActiveRequest
    );

    session.stop();
    session.start(()).await.unwrap();
    assert_eq!(session.state(), ProximityState::Initializing);
    assert_eq!(
        engine
            .calls()
            .iter()
            .filter(|call| **call == EngineCall::StartProximity)
            .count(),
        2
    );
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_approve_then_disconnect() {
    let (engine, kit, root) = initialized_kit("remote-approve").await;
    engine.insert_issued_mdoc("pid-1", PID_DOC_TYPE);
    let link = "openid4vp://?request_uri=https://verifier.example/r/9";

    let session = kit.remote_session().unwrap();
    let mut states = session.watch();
    session.start(link.to_string()).await.unwrap();
    assert_eq!(session.state(), RemoteState::ProcessingRequest);

    let request = Arc::new(
        MemoryProcessedRequest::new(vec![requested("pid-1", &["age_over_18"])])
            .with_reader_name("Online Shop"),
    );
    engine.emit(TransferEvent::RequestReceived(Ok(
        request.clone() as Arc<dyn ProcessedRequest>
    )));
    let RemoteState::RequestReceived(shown) =
        wait_for(&mut states, |s| matches!(s, RemoteState::RequestReceived(_))).await
    else {
        unreachable!();
    };
    assert_eq!(shown.verifier_name.as_deref(), Some("Online Shop"));

    session.approve(&["pid-1".to_string()]).await.unwrap();
    assert_eq!(session.state(), RemoteState::SendingResponse);
    assert_eq!(engine.sent_responses().len(), 1);
    assert_eq!(
        request.last_disclosure().map(|d| d.documents.len()),
        Some(1)
    );

    engine.emit(TransferEvent::ResponseSent);
    assert_eq!(session.state(), RemoteState::ResponseSent);
    engine.emit(TransferEvent::Disconnected);
    assert_eq!(session.state(), RemoteState::Idle);
    assert_eq!(engine.listener_count(), 0);
    assert_eq!(engine.calls().last(), Some(&EngineCall::StopRemote));
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_redirect_is_observable() {
    let (engine, kit, root) = initialized_kit("remote-redirect").await;
    engine.insert_issued_mdoc("pid-1", PID_DOC_TYPE);

    let session = kit.remote_session().unwrap();
    let mut states = session.watch();
    session
        .start("openid4vp://?request_uri=https://verifier.example/r/10".to_string())
        .await
        .unwrap();
    let request: Arc<dyn ProcessedRequest> =
        Arc::new(MemoryProcessedRequest::new(vec![requested("pid-1", &["family_name"])]));
    engine.emit(TransferEvent::RequestReceived(Ok(request)));
    session.approve(&["pid-1".to_string()]).await.unwrap();

    engine.emit(TransferEvent::ResponseSent);
    engine.emit(TransferEvent::Redirect {
        uri: "https://verifier.example/checkout/done".to_string(),
    });
    let redirected = wait_for(&mut states, |s| matches!(s, RemoteState::Redirect { .. })).await;
    assert_eq!(
        redirected,
        RemoteState::Redirect {
            uri: "https://verifier.example/checkout/done".to_string()
        }
    );
    common::cleanup_root(&root);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_browser_mediated_disabled() {
    common::init_tracing();
    let root = common::temp_root("browser-disabled");
    let json = serde_json::json!({
        "license_key": "test-license",
        "organization_url": "https://org.example",
        "storage_dir": root.join("no_backup"),
        "cache_dir": root.join("cache"),
        "browser_mediated_enabled": false,
    });
    let config = HolderConfig::from_json(&json.to_string()).unwrap();
    let engine = Arc::new(MemoryEngine::new());
    let kit = HolderKit::new(config, Arc::new(MemoryEngineFactory::new(Arc::clone(&engine))));
    kit.initialize().await.unwrap();

    let err = kit.browser_session().unwrap_err();
    assert!(err.is_configuration());
    assert!(kit
        .trigger_for_action(&browser_request().action, browser_request().payload)
        .is_none());
    assert!(engine.calls().is_empty());
    common::cleanup_root(&root);
}
