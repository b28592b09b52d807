// ABOUTME: Integration tests for the push orchestrator.
// ABOUTME: Login abort, per-tag failure isolation, and proxy restoration.

mod support;

use std::sync::Arc;
use std::time::Duration;
use stevedore::classify::{ErrorKind, Operation};
use stevedore::images::{
    BatchStatus, PushErrorKind, PushRequest, push_batch, push_images, spawn_push,
};
use stevedore::proxy::{ProxyManager, ProxySettings, ProxyType};
use stevedore::runtime::{EngineConnector, RegistryCredentials};
use support::{FakeConnector, FakeEngine, MB, PushScript, RecordingHost, Step};

fn request(ids: &[&str]) -> PushRequest {
    PushRequest {
        image_ids: ids.iter().map(|s| s.to_string()).collect(),
        credentials: RegistryCredentials::new("alice", "s3cret"),
        proxy: None,
    }
}

fn with_proxy(mut req: PushRequest) -> PushRequest {
    req.proxy = Some(ProxySettings {
        proxy_type: ProxyType::Socks5,
        address: "socks5://10.0.0.1:1080".to_string(),
    });
    req
}

fn manager(host: &RecordingHost) -> ProxyManager {
    ProxyManager::new(Arc::new(host.clone())).with_settle(Duration::ZERO)
}

// =============================================================================
// Batch behaviour
// =============================================================================

#[tokio::test]
async fn pushes_every_tag_in_order() {
    support::init_tracing();
    let engine = FakeEngine::new()
        .with_image("img1", &["app:v1", "app:latest"], MB)
        .with_image("img2", &["registry.local:5000/tools/cli:2.0"], MB);

    let report = push_batch(&engine, &request(&["img1", "img2"])).await.unwrap();

    assert_eq!(report.status, BatchStatus::Success);
    assert_eq!(
        report.pushed,
        vec!["app:v1", "app:latest", "registry.local:5000/tools/cli:2.0"]
    );
    assert_eq!(report.total_count, 2);
    assert_eq!(engine.push_calls(), report.pushed);
}

#[tokio::test]
async fn login_happens_once_and_token_is_reused() {
    let engine = FakeEngine::new()
        .with_image("img1", &["app:v1", "app:v2"], MB)
        .with_image("img2", &["lib:1"], MB);

    push_batch(&engine, &request(&["img1", "img2"])).await.unwrap();

    assert_eq!(engine.login_count(), 1);
    let tokens = engine.push_tokens();
    assert_eq!(tokens.len(), 3);
    assert!(tokens.iter().all(|t| t == &tokens[0]));
}

#[tokio::test]
async fn invalid_credentials_abort_before_any_push() {
    let engine = FakeEngine::new()
        .with_image("img1", &["app:v1"], MB)
        .fail_login("incorrect username or password");

    let err = push_batch(&engine, &request(&["img1"])).await.unwrap_err();

    assert_eq!(err.kind(), PushErrorKind::Login);
    assert_eq!(err.structured().operation(), Operation::Login);
    assert_eq!(err.structured().kind(), ErrorKind::Unauthorized);
    assert!(engine.push_calls().is_empty());
}

#[tokio::test]
async fn error_event_fails_only_that_tag() {
    let engine = FakeEngine::new()
        .with_image("img1", &["app:v1", "app:v2"], MB)
        .script_push(
            "app:v1",
            PushScript::Stream(vec![
                Step::Status("Preparing"),
                Step::ErrorEvent("denied: requested access to the resource is denied"),
                Step::Status("never consumed"),
            ]),
        );

    let report = push_batch(&engine, &request(&["img1"])).await.unwrap();

    assert_eq!(report.status, BatchStatus::Partial);
    assert_eq!(report.pushed, vec!["app:v2"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].operation(), Operation::PushProgress);
    assert_eq!(report.errors[0].kind(), ErrorKind::PushFailed);
    assert_eq!(report.errors[0].image_id(), "app:v1");
}

#[tokio::test]
async fn decode_failure_is_read_progress_error() {
    let engine = FakeEngine::new()
        .with_image("img1", &["app:v1"], MB)
        .script_push(
            "app:v1",
            PushScript::Stream(vec![
                Step::Status("Preparing"),
                Step::DecodeFailure("expected value at line 1 column 1"),
            ]),
        );

    let report = push_batch(&engine, &request(&["img1"])).await.unwrap();

    assert_eq!(report.status, BatchStatus::Success);
    assert_eq!(report.total_count, 1);
    assert!(report.pushed.is_empty());
    assert_eq!(report.errors[0].operation(), Operation::ReadProgress);
}

#[tokio::test]
async fn rejected_push_and_missing_image_are_isolated() {
    let engine = FakeEngine::new()
        .with_image("img1", &["app:v1"], MB)
        .with_image("img3", &["lib:1"], MB)
        .script_push("app:v1", PushScript::Reject("dial tcp: connection refused"));

    let report = push_batch(&engine, &request(&["img1", "missing", "img3"]))
        .await
        .unwrap();

    assert_eq!(report.status, BatchStatus::Partial);
    assert_eq!(report.pushed, vec!["lib:1"]);

    let summary: Vec<_> = report
        .errors
        .iter()
        .map(|e| (e.operation(), e.image_id().to_string(), e.kind()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (
                Operation::PushImage,
                "app:v1".to_string(),
                ErrorKind::ConnectionRefused
            ),
            (
                Operation::InspectImage,
                "missing".to_string(),
                ErrorKind::NotFound
            ),
        ]
    );
}

#[tokio::test]
async fn untagged_image_pushes_nothing() {
    let engine = FakeEngine::new().with_image("img1", &[], MB);

    let report = push_batch(&engine, &request(&["img1"])).await.unwrap();

    assert_eq!(report.status, BatchStatus::Success);
    assert_eq!(report.total_count, 1);
    assert!(report.pushed.is_empty());
    assert!(report.errors.is_empty());
}

// =============================================================================
// Proxy session
// =============================================================================

#[tokio::test]
async fn proxy_is_restored_after_successful_batch() {
    let host = RecordingHost::new()
        .with_env("HTTPS_PROXY", "http://corp:3128")
        .with_daemon_config("[Service]\nEnvironment=\"HTTP_PROXY=http://corp:3128\"\n");
    let before_env = host.env();
    let before_config = host.daemon_config();

    let engine = FakeEngine::new().with_image("img1", &["app:v1"], MB);
    let connector = FakeConnector::new(engine.clone());

    let report = push_images(&connector, &manager(&host), &with_proxy(request(&["img1"])))
        .await
        .unwrap();

    assert_eq!(report.status, BatchStatus::Success);
    assert_eq!(host.env(), before_env);
    assert_eq!(host.daemon_config(), before_config);
    // Once on activation, once on deactivation.
    assert_eq!(host.reloads(), 2);
}

#[tokio::test]
async fn proxy_is_restored_after_login_failure() {
    let host = RecordingHost::new();
    let engine = FakeEngine::new()
        .with_image("img1", &["app:v1"], MB)
        .fail_login("unauthorized: authentication required");
    let connector = FakeConnector::new(engine.clone());

    let err = push_images(&connector, &manager(&host), &with_proxy(request(&["img1"])))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), PushErrorKind::Login);
    assert!(host.env().is_empty());
    assert_eq!(host.daemon_config(), None);
    assert_eq!(host.reloads(), 2);
    assert!(engine.push_calls().is_empty());
}

#[tokio::test]
async fn proxy_is_restored_when_client_cannot_be_created() {
    let host = RecordingHost::new();

    let err = push_images(
        &FakeConnector::unavailable(),
        &manager(&host),
        &with_proxy(request(&["img1"])),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), PushErrorKind::Connect);
    assert_eq!(err.structured().operation(), Operation::CreateClient);
    assert!(host.env().is_empty());
    assert_eq!(host.reloads(), 2);
}

#[tokio::test]
async fn no_proxy_requested_leaves_host_untouched() {
    let host = RecordingHost::new();
    let engine = FakeEngine::new().with_image("img1", &["app:v1"], MB);

    push_images(&FakeConnector::new(engine), &manager(&host), &request(&["img1"]))
        .await
        .unwrap();

    assert_eq!(host.reloads(), 0);
    assert_eq!(host.daemon_config(), None);
}

#[tokio::test]
async fn abandoned_push_still_runs_to_deactivation() {
    let host = RecordingHost::new();
    let proxy = Arc::new(
        ProxyManager::new(Arc::new(host.clone())).with_settle(Duration::from_millis(100)),
    );
    let engine = FakeEngine::new().with_image("img1", &["app:v1"], MB);
    let connector: Arc<dyn EngineConnector> = Arc::new(FakeConnector::new(engine.clone()));

    let handle = spawn_push(connector, proxy, with_proxy(request(&["img1"])));
    // Give up while activation is still settling; the handle is dropped.
    let waited = tokio::time::timeout(Duration::from_millis(20), handle).await;
    assert!(waited.is_err());

    host.wait_for_reloads(2).await;
    assert_eq!(host.reloads(), 2);
    assert_eq!(engine.push_calls(), vec!["app:v1".to_string()]);
    assert!(host.env().is_empty());
    assert_eq!(host.daemon_config(), None);
}
