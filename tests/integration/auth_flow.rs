//! Session and token invariants exercised at the service level

use std::sync::Arc;
use std::time::Duration;

use fleetwatch::auth::{
    AuthService, AuthStore, MemorySessionStore, NewUser, TokenSigner,
};

use crate::helpers::{seed_user, TestSystem};

async fn service_with_session_ttl(ttl: Duration) -> (tempfile::TempDir, AuthService) {
    let dir = tempfile::tempdir().unwrap();
    let store = AuthStore::connect(dir.path().join("auth.db").to_str().unwrap())
        .await
        .unwrap();
    let signer = TokenSigner::new(
        "ttl-test-secret",
        Duration::from_secs(900),
        Duration::from_secs(3600),
    );
    let service = AuthService::new(store, Arc::new(MemorySessionStore::new()), signer, ttl);
    (dir, service)
}

// After one refresh the new access token still identifies the same
// user and carries the user's current effective scopes.
#[tokio::test]
async fn refresh_preserves_identity_and_current_scopes() {
    let system = TestSystem::start().await;
    let user_id = seed_user(&system, "p1@example.com", &["servers:read", "scopes:read"]).await;

    let tokens = system.auth.login("p1@example.com", "pass-w0rd").await.unwrap();
    let refreshed = system.auth.refresh(&tokens.refresh_token).await.unwrap();

    let claims = system.auth.verify_access(&refreshed.access_token).unwrap();
    assert_eq!(claims.user_id, user_id);
    assert_eq!(claims.scopes, vec!["scopes:read", "servers:read"]);
}

// At most one refresh chain survives: replaying a rotated-out token
// kills the session, taking the legitimate successor with it.
#[tokio::test]
async fn at_most_one_refresh_chain_survives() {
    let system = TestSystem::start().await;
    seed_user(&system, "p2@example.com", &[]).await;

    let t1 = system.auth.login("p2@example.com", "pass-w0rd").await.unwrap();
    let t2 = system.auth.refresh(&t1.refresh_token).await.unwrap();
    let t3 = system.auth.refresh(&t2.refresh_token).await.unwrap();

    // Replay an old link of the chain.
    assert!(system.auth.refresh(&t1.refresh_token).await.is_err());
    // The newest link is dead too.
    assert!(system.auth.refresh(&t3.refresh_token).await.is_err());
}

// Refreshing does not slide the session TTL set at login.
#[tokio::test]
async fn refresh_does_not_extend_the_session() {
    let (_dir, service) = service_with_session_ttl(Duration::from_millis(1500)).await;
    service
        .register(NewUser {
            email: "p3@example.com".to_string(),
            password: "pass-w0rd".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            role_ids: vec![],
        })
        .await
        .unwrap();

    let t1 = service.login("p3@example.com", "pass-w0rd").await.unwrap();

    // Refresh well within the window...
    tokio::time::sleep(Duration::from_millis(700)).await;
    let t2 = service.refresh(&t1.refresh_token).await.unwrap();

    // ...but the original expiry still applies: ~1.5s after login the
    // session is gone even though the last refresh was recent.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(service.refresh(&t2.refresh_token).await.is_err());
}

// Scope changes take effect on the next refresh, not just next login.
#[tokio::test]
async fn refresh_picks_up_role_changes() {
    let system = TestSystem::start().await;
    let user_id = seed_user(&system, "p4@example.com", &["servers:read"]).await;

    let tokens = system.auth.login("p4@example.com", "pass-w0rd").await.unwrap();
    let before = system.auth.verify_access(&tokens.access_token).unwrap();
    assert_eq!(before.scopes, vec!["servers:read"]);

    // Strip all roles, then refresh.
    system
        .auth
        .update_user(
            &user_id,
            fleetwatch::auth::UserUpdate {
                first_name: None,
                last_name: None,
                role_ids: Some(vec![]),
            },
        )
        .await
        .unwrap();

    let refreshed = system.auth.refresh(&tokens.refresh_token).await.unwrap();
    let after = system.auth.verify_access(&refreshed.access_token).unwrap();
    assert!(after.scopes.is_empty());
}
