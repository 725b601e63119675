//! Register -> deliver -> deregister flow across the coordinator, dispatcher,
//! and HTTP surface, with the provider API mocked.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hookbridge_core::{AccessInfo, EndpointId, ProviderId, TriggerId, VerificationPolicy};
use hookbridge_webhook::{
    create_webhook_router, providers::ProviderClient, ChannelRunScheduler,
    GitHubWebhookIntegration, InMemoryRegistrationStore, InboundDispatcher, InboundWebhookRequest,
    InboundWebhookState, ProviderRegistry, RegistrationCoordinator, RegistrationSettings,
    RemoteCleanup, RoutingKeyIndex, StaticCredentialResolver, WebhookSigner,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOOKS_PATH: &str = "/repos/acme/widgets/hooks";

struct Harness {
    server: MockServer,
    coordinator: RegistrationCoordinator,
    dispatcher: Arc<InboundDispatcher>,
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOKS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1001})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/repos/acme/widgets/hooks/1001"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let credentials = Arc::new(StaticCredentialResolver::new().with_token("conn-1", "test-token"));
    let client = ProviderClient::new(reqwest::Client::new(), &server.uri(), credentials);
    let registry = Arc::new(
        ProviderRegistry::builder()
            .with(Arc::new(GitHubWebhookIntegration::new(client)))
            .build(),
    );
    let index = Arc::new(RoutingKeyIndex::new());
    let store = Arc::new(InMemoryRegistrationStore::new());

    let coordinator = RegistrationCoordinator::new(
        registry.clone(),
        index.clone(),
        store.clone(),
        RegistrationSettings::new("https://hooks.example.com"),
    );
    let dispatcher = Arc::new(InboundDispatcher::new(
        registry,
        index,
        store,
        VerificationPolicy::Strict,
    ));

    Harness {
        server,
        coordinator,
        dispatcher,
    }
}

fn source() -> serde_json::Value {
    json!({
        "subresource": "repository",
        "repo": "acme/widgets",
        "events": ["push", "pull_request"],
    })
}

/// The secret the provider was given at registration
async fn registered_secret(server: &MockServer) -> String {
    let requests = server.received_requests().await.unwrap_or_default();
    let create = requests
        .iter()
        .find(|r| r.url.path() == HOOKS_PATH)
        .expect("webhook was created");
    let body: serde_json::Value = serde_json::from_slice(&create.body).unwrap();
    body["config"]["secret"].as_str().unwrap().to_string()
}

fn push_delivery(secret: &str, body: &'static [u8]) -> InboundWebhookRequest {
    InboundWebhookRequest::new(
        ProviderId::new("github"),
        [
            ("X-GitHub-Event", "push".to_string()),
            ("X-GitHub-Delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958".to_string()),
            ("X-Hub-Signature-256", WebhookSigner::new(secret).sign(body)),
            ("Content-Type", "application/json".to_string()),
        ],
        body,
    )
}

#[tokio::test]
async fn test_register_deliver_deregister() {
    let h = harness().await;
    let trigger = TriggerId::new("workflow-1/trigger-1");

    let outcome = h
        .coordinator
        .register_trigger(
            &trigger,
            &ProviderId::new("github"),
            &source(),
            &AccessInfo::new("conn-1"),
        )
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.external_handle.as_str(), "1001");

    let secret = registered_secret(&h.server).await;
    assert!(secret.starts_with("whsec_"));

    let body: &'static [u8] = br#"{"ref":"refs/heads/main","commits":[]}"#;
    let dispatched = h
        .dispatcher
        .dispatch(&outcome.endpoint_id, &push_delivery(&secret, body))
        .await
        .unwrap();

    assert_eq!(dispatched.routed.len(), 1);
    let routed = &dispatched.routed[0];
    assert_eq!(routed.trigger_id, trigger);
    assert_eq!(routed.event.event_type, "push");
    assert_eq!(routed.event.payload.as_ref(), body);

    let removed = h.coordinator.deregister_trigger(&trigger).await.unwrap();
    assert_eq!(removed.remote, RemoteCleanup::Deleted);

    let late = h
        .dispatcher
        .dispatch(&outcome.endpoint_id, &push_delivery(&secret, body))
        .await
        .unwrap();
    assert!(late.routed.is_empty());
}

#[tokio::test]
async fn test_equivalent_sources_share_one_webhook() {
    let h = harness().await;
    let reordered = json!({
        "subresource": "repository",
        "repo": "Acme/Widgets",
        "events": ["pull_request", "push", "push"],
    });

    let first = h
        .coordinator
        .register_trigger(&"t1".into(), &"github".into(), &source(), &AccessInfo::new("conn-1"))
        .await
        .unwrap();
    let second = h
        .coordinator
        .register_trigger(&"t2".into(), &"github".into(), &reordered, &AccessInfo::new("conn-1"))
        .await
        .unwrap();

    assert_eq!(first.key, second.key);
    assert!(!second.created);

    let creates = h
        .server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == HOOKS_PATH)
        .count();
    assert_eq!(creates, 1);

    let secret = registered_secret(&h.server).await;
    let dispatched = h
        .dispatcher
        .dispatch(&first.endpoint_id, &push_delivery(&secret, b"{}"))
        .await
        .unwrap();
    assert_eq!(dispatched.routed.len(), 2);
}

#[tokio::test]
async fn test_http_delivery_round_trip() {
    let h = harness().await;
    let outcome = h
        .coordinator
        .register_trigger(&"t1".into(), &"github".into(), &source(), &AccessInfo::new("conn-1"))
        .await
        .unwrap();
    let secret = registered_secret(&h.server).await;

    let (scheduler, mut receiver) = ChannelRunScheduler::new(8);
    let router = create_webhook_router(Arc::new(InboundWebhookState::new(
        h.dispatcher.clone(),
        Arc::new(scheduler),
    )));

    let body: &'static [u8] = br#"{"action":"opened"}"#;
    let uri = format!("/webhooks/github/{}", outcome.endpoint_id);

    let signed = Request::builder()
        .method("POST")
        .uri(&uri)
        .header("x-github-event", "pull_request")
        .header("x-github-delivery", "d-100")
        .header("x-hub-signature-256", WebhookSigner::new(&secret).sign(body))
        .body(Body::from(body))
        .unwrap();
    let response = router.clone().oneshot(signed).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(receiver.recv().await.unwrap().event.event_type, "pull_request");

    let tampered = Request::builder()
        .method("POST")
        .uri(&uri)
        .header("x-github-event", "pull_request")
        .header("x-github-delivery", "d-101")
        .header("x-hub-signature-256", WebhookSigner::new(&secret).sign(body))
        .body(Body::from(&br#"{"action":"closed"}"#[..]))
        .unwrap();
    let response = router.clone().oneshot(tampered).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(receiver.try_recv().is_err());

    let unknown = Request::builder()
        .method("POST")
        .uri(format!("/webhooks/github/{}", EndpointId::new()))
        .header("x-github-event", "push")
        .header("x-github-delivery", "d-102")
        .body(Body::from(body))
        .unwrap();
    let response = router.oneshot(unknown).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
