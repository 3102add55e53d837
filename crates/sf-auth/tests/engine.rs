//! Engine state-machine tests against faked upstream services.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sf_auth::crypto::encrypt_password;
use sf_auth::{AuthConfig, AuthError, AuthenticationEngine, EncryptionKey, LegacyAuthClient};
use sf_core::{
    Account, AccountKind, AccountRepository, LogNotifier, MemoryAccountRepository, SecurityAnswer,
    TokenSource,
};
use sf_pool::{RequestThrottle, ThrottleConfig};

fn test_throttle(interval: std::time::Duration) -> Arc<RequestThrottle> {
    Arc::new(RequestThrottle::new(
        reqwest::Client::new(),
        ThrottleConfig::uniform(interval),
    ))
}

fn account(kind: AccountKind, key: &EncryptionKey) -> Account {
    let username = "worker@example.com".to_string();
    let password = encrypt_password(key, "hunter2", &username).unwrap();
    Account {
        id: 1,
        username,
        uuid: Uuid::new_v4(),
        kind,
        password: Some(password),
        access_token: None,
        refresh_token: None,
        token_expires_at: None,
        token_source: None,
        enabled: true,
        last_used: Utc::now(),
        last_selected: Utc::now(),
        server: None,
        previous_server: None,
        forced_timeout_at: None,
        created_at: Utc::now(),
        error_counter: 0,
        success_counter: 0,
        total_success: 0,
        total_errors: 0,
        last_error_code: None,
        same_texture_counter: 0,
        last_texture_url: None,
        security_answers: vec![],
        security_answer: None,
    }
}

async fn engine_for(
    server: &MockServer,
    key: EncryptionKey,
) -> (AuthenticationEngine, Arc<MemoryAccountRepository>) {
    let repo = Arc::new(MemoryAccountRepository::new());
    let engine = AuthenticationEngine::new(
        AuthConfig::with_base(&server.uri()),
        test_throttle(std::time::Duration::from_millis(1)),
        repo.clone(),
        Arc::new(LogNotifier),
        key,
        Some("node-1".to_string()),
    )
    .unwrap();
    (engine, repo)
}

fn mock_modern_chain(items: serde_json::Value) -> Vec<Mock> {
    vec![
        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ms-access",
                "refresh_token": "ms-refresh",
                "expires_in": 86400,
                "token_type": "bearer",
            }))),
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Token": "xbl-token",
                "DisplayClaims": { "xui": [{ "uhs": "user-hash" }] },
            }))),
        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Token": "xsts-token",
                "DisplayClaims": { "xui": [{ "uhs": "user-hash" }] },
            }))),
        Mock::given(method("POST"))
            .and(path("/authentication/login_with_xbox"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "mc-access",
                "expires_in": 86400,
            }))),
        Mock::given(method("GET"))
            .and(path("/entitlements/mcstore"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items)),
    ]
}

#[tokio::test]
async fn modern_login_walks_the_full_chain() {
    let server = MockServer::start().await;
    for mock in mock_modern_chain(json!({ "items": [{ "name": "product_minecraft" }] })) {
        mock.expect(1).mount(&server).await;
    }

    let key = EncryptionKey::generate();
    let (engine, repo) = engine_for(&server, key.clone()).await;
    let mut account = account(AccountKind::Microsoft, &key);

    let token = engine.authenticate(&mut account, None).await.unwrap();
    assert_eq!(token, "mc-access");
    assert_eq!(account.refresh_token.as_deref(), Some("ms-refresh"));
    assert_eq!(account.token_source, Some(TokenSource::Login));
    assert_eq!(account.server.as_deref(), Some("node-1"));

    // token state was persisted before returning
    let stored = repo.get(1).await.unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("mc-access"));
}

#[tokio::test]
async fn failed_ownership_check_is_fatal() {
    let server = MockServer::start().await;
    for mock in mock_modern_chain(json!({ "items": [] })) {
        mock.mount(&server).await;
    }

    let key = EncryptionKey::generate();
    let (engine, _repo) = engine_for(&server, key.clone()).await;
    let mut account = account(AccountKind::Microsoft, &key);

    let err = engine.authenticate(&mut account, None).await.unwrap_err();
    assert!(matches!(err, AuthError::DoesNotOwnMinecraft { account_id: 1 }));
}

#[tokio::test]
async fn expiring_token_forces_refresh_and_never_validates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "refreshed-token",
            "clientToken": "client-token",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/security/location"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let key = EncryptionKey::generate();
    let (engine, _repo) = engine_for(&server, key.clone()).await;
    let mut account = account(AccountKind::Legacy, &key);
    account.access_token = Some("old-token".to_string());
    account.token_expires_at = Some(Utc::now() + Duration::minutes(10));

    let token = engine.authenticate(&mut account, None).await.unwrap();
    assert_eq!(token, "refreshed-token");
    assert_eq!(account.token_source, Some(TokenSource::Refresh));
}

#[tokio::test]
async fn legacy_refresh_failure_triggers_exactly_one_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "ForbiddenOperationException",
            "errorMessage": "Invalid token",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "fresh-login-token",
            "clientToken": "client-token",
            "selectedProfile": { "id": "abcd", "name": "Worker" },
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/security/location"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let key = EncryptionKey::generate();
    let (engine, _repo) = engine_for(&server, key.clone()).await;
    let mut account = account(AccountKind::Legacy, &key);
    account.access_token = Some("stale-token".to_string());
    account.token_expires_at = Some(Utc::now() + Duration::minutes(5));

    let token = engine.authenticate(&mut account, None).await.unwrap();
    assert_eq!(token, "fresh-login-token");
    assert_eq!(account.token_source, Some(TokenSource::Login));
}

#[tokio::test]
async fn invalid_token_is_signed_out_then_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/signout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "refreshed-token",
            "clientToken": "client-token",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/security/location"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let key = EncryptionKey::generate();
    let (engine, _repo) = engine_for(&server, key.clone()).await;
    let mut account = account(AccountKind::Legacy, &key);
    account.access_token = Some("stale-token".to_string());
    // far from expiry, so the engine validates instead of force-refreshing
    account.token_expires_at = Some(Utc::now() + Duration::hours(20));

    let token = engine.authenticate(&mut account, None).await.unwrap();
    assert_eq!(token, "refreshed-token");
}

#[tokio::test]
async fn unknown_expiry_validates_instead_of_refreshing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let key = EncryptionKey::generate();
    let (engine, _repo) = engine_for(&server, key.clone()).await;
    let mut account = account(AccountKind::Legacy, &key);
    account.access_token = Some("opaque-token".to_string());
    // no stored expiry, so the token is validated rather than treated
    // as expiring
    account.token_expires_at = None;

    let token = engine.authenticate(&mut account, None).await.unwrap();
    assert_eq!(token, "opaque-token");
}

#[tokio::test]
async fn auth_calls_dispatch_with_minimum_spacing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "legacy-token",
            "clientToken": "client-token",
        })))
        .expect(3)
        .mount(&server)
        .await;

    let interval = std::time::Duration::from_millis(100);
    let client = LegacyAuthClient::new(
        AuthConfig::with_base(&server.uri()),
        test_throttle(interval),
    )
    .unwrap();

    let started = std::time::Instant::now();
    for _ in 0..3 {
        client
            .authenticate("worker@example.com", "hunter2", "client-token", None)
            .await
            .unwrap();
    }
    // three dispatches, two enforced gaps
    assert!(started.elapsed() >= interval * 2);
}

#[tokio::test]
async fn missing_password_is_fatal() {
    let server = MockServer::start().await;
    let key = EncryptionKey::generate();
    let (engine, _repo) = engine_for(&server, key.clone()).await;

    let mut account = account(AccountKind::Microsoft, &key);
    account.password = None;

    let err = engine.authenticate(&mut account, None).await.unwrap_err();
    assert!(matches!(err, AuthError::MissingCredentials { account_id: 1 }));
}

#[tokio::test]
async fn untrusted_location_answers_challenges_from_stored_answers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "legacy-token",
            "clientToken": "client-token",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/security/location"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/security/challenges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "answer": { "id": 101 }, "question": { "id": 1, "question": "Pet name?" } },
            { "answer": { "id": 202 }, "question": { "id": 2, "question": "Birth town?" } },
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/security/location"))
        .and(body_string_contains("Rex"))
        .and(body_string_contains("fallback-answer"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let key = EncryptionKey::generate();
    let (engine, _repo) = engine_for(&server, key.clone()).await;
    let mut account = account(AccountKind::Legacy, &key);
    account.security_answers = vec![SecurityAnswer {
        id: 101,
        answer: "Rex".to_string(),
    }];
    // id 202 has no stored match and falls back to the single answer
    account.security_answer = Some("fallback-answer".to_string());

    let token = engine.authenticate(&mut account, None).await.unwrap();
    assert_eq!(token, "legacy-token");
}

#[tokio::test]
async fn challenge_submission_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "legacy-token",
            "clientToken": "client-token",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/security/location"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/security/challenges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "answer": { "id": 101 }, "question": { "id": 1, "question": "Pet name?" } },
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/security/location"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let key = EncryptionKey::generate();
    let (engine, _repo) = engine_for(&server, key.clone()).await;
    let mut account = account(AccountKind::Legacy, &key);

    let err = engine.authenticate(&mut account, None).await.unwrap_err();
    assert!(matches!(err, AuthError::ChallengesFailed { .. }));
}
