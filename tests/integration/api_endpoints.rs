//! HTTP surface: auth endpoints, scope gating, catalog CRUD,
//! import/export and uptime

use chrono::Utc;
use fleetwatch::{Observation, ServerStatus};

use crate::helpers::{login_http, refresh_cookie_value, seed_user, TestSystem};

const ALL_SERVER_SCOPES: &[&str] = &[
    "servers:create",
    "servers:read",
    "servers:update",
    "servers:delete",
];

// A wrong password and an unknown email must be indistinguishable:
// same status, same message, no email enumeration.
#[tokio::test]
async fn login_rejects_bad_credentials_without_detail_leaks() {
    let system = TestSystem::start().await;
    seed_user(&system, "op@example.com", &[]).await;
    let addr = system.start_api().await;
    let client = reqwest::Client::new();

    for email in ["op@example.com", "ghost@example.com"] {
        let response = client
            .post(format!("http://{addr}/auth/login"))
            .json(&serde_json::json!({"email": email, "password": "wrong"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401, "login as {email}");
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["message"], "Invalid credentials", "login as {email}");
    }
}

#[tokio::test]
async fn login_sets_refresh_cookie_scoped_to_refresh_path() {
    let system = TestSystem::start().await;
    seed_user(&system, "op@example.com", &[]).await;
    let addr = system.start_api().await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/auth/login"))
        .json(&serde_json::json!({"email": "op@example.com", "password": "pass-w0rd"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let set_cookie = response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("refresh_token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Path=/auth/refresh"));

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
}

// Spec scenario: refresh rotation with reuse detection over HTTP.
#[tokio::test]
async fn replayed_refresh_cookie_kills_the_session() {
    let system = TestSystem::start().await;
    seed_user(&system, "op@example.com", &[]).await;
    let addr = system.start_api().await;
    let client = reqwest::Client::new();

    let (_access, r1) = login_http(addr, "op@example.com").await;

    let refresh = |cookie: String| {
        let client = client.clone();
        async move {
            client
                .post(format!("http://{addr}/auth/refresh"))
                .header(reqwest::header::COOKIE, format!("refresh_token={cookie}"))
                .send()
                .await
                .unwrap()
        }
    };

    let response = refresh(r1.clone()).await;
    assert_eq!(response.status(), 200);
    let r2 = refresh_cookie_value(&response).unwrap();

    // Replaying R1 is a 401 with the canonical message...
    let response = refresh(r1).await;
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Invalid refresh token");

    // ...and R2 dies with the session.
    let response = refresh(r2).await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn refresh_without_cookie_is_unauthorized() {
    let system = TestSystem::start().await;
    let addr = system.start_api().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/auth/refresh"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Cookie not found");
}

#[tokio::test]
async fn verify_echoes_identity_headers() {
    let system = TestSystem::start().await;
    let user_id = seed_user(&system, "op@example.com", &["servers:read"]).await;
    let addr = system.start_api().await;

    let (access, _) = login_http(addr, "op@example.com").await;
    let response = reqwest::Client::new()
        .get(format!("http://{addr}/auth/verify"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(
        response.headers().get("X-User-ID").unwrap().to_str().unwrap(),
        user_id
    );
    assert_eq!(
        response
            .headers()
            .get("X-User-Scopes")
            .unwrap()
            .to_str()
            .unwrap(),
        "servers:read"
    );
}

#[tokio::test]
async fn scope_gate_answers_403_and_missing_token_401() {
    let system = TestSystem::start().await;
    seed_user(&system, "limited@example.com", &["scopes:read"]).await;
    let addr = system.start_api().await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/servers"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let (access, _) = login_http(addr, "limited@example.com").await;
    let response = reqwest::Client::new()
        .get(format!("http://{addr}/servers"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Permission denied");
}

#[tokio::test]
async fn server_crud_round_trip() {
    let system = TestSystem::start().await;
    seed_user(&system, "op@example.com", ALL_SERVER_SCOPES).await;
    let addr = system.start_api().await;
    let (access, _) = login_http(addr, "op@example.com").await;
    let client = reqwest::Client::new();

    let spec = serde_json::json!({
        "server_name": "web-01",
        "ipv4": "10.0.0.5",
        "port": 80,
        "health_endpoint": "/ping",
        "health_check_interval": 2
    });

    let response = client
        .post(format!("http://{addr}/servers"))
        .bearer_auth(&access)
        .json(&spec)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let created: serde_json::Value = response.json().await.unwrap();
    assert_eq!(created["status"], "pending");
    let id = created["id"].as_str().unwrap().to_string();

    // Duplicate name: exactly one creation wins.
    let response = client
        .post(format!("http://{addr}/servers"))
        .bearer_auth(&access)
        .json(&spec)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Server name already exists");

    let response = client
        .patch(format!("http://{addr}/servers/{id}"))
        .bearer_auth(&access)
        .json(&serde_json::json!({"health_check_interval": 30}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let updated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(updated["health_check_interval"], 30);

    let response = client
        .get(format!("http://{addr}/servers?server_name=web"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    let listed: serde_json::Value = response.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Delete twice: both succeed (idempotent).
    for _ in 0..2 {
        let response = client
            .delete(format!("http://{addr}/servers/{id}"))
            .bearer_auth(&access)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 204);
    }
}

#[tokio::test]
async fn listing_validates_filters_and_coerces_pagination() {
    let system = TestSystem::start().await;
    seed_user(&system, "op@example.com", ALL_SERVER_SCOPES).await;
    let addr = system.start_api().await;
    let (access, _) = login_http(addr, "op@example.com").await;
    let client = reqwest::Client::new();

    for (query, expected_message) in [
        ("status=meh", "Invalid status"),
        ("sort_by=id", "Invalid sort by"),
        ("sort_order=sideways", "Invalid sort order"),
        ("limit=lots", "Limit must be an integer"),
        ("offset=x", "Offset must be an integer"),
    ] {
        let response = client
            .get(format!("http://{addr}/servers?{query}"))
            .bearer_auth(&access)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "query {query}");
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["message"], expected_message);
    }

    // Out-of-range values coerce instead of failing.
    let response = client
        .get(format!("http://{addr}/servers?limit=-5&offset=-1"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

// Spec scenario: one malformed row is rejected, the rest import.
#[tokio::test]
async fn import_reports_imported_and_failed_rows() {
    let system = TestSystem::start().await;
    seed_user(&system, "op@example.com", ALL_SERVER_SCOPES).await;
    let addr = system.start_api().await;
    let (access, _) = login_http(addr, "op@example.com").await;

    let sheet = "server_name\tipv4\tport\thealth_endpoint\thealth_check_interval\n\
                 alpha\t10.0.0.1\t80\t/ping\t5\n\
                 beta\t10.0.0.2\tabc\t/ping\t5\n\
                 gamma\t10.0.0.3\t81\t/ping\t5\n";

    let part = reqwest::multipart::Part::bytes(sheet.as_bytes().to_vec())
        .file_name("servers.tsv")
        .mime_str("text/tab-separated-values")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("file", part);

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/servers/import"))
        .bearer_auth(&access)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["imported_count"], 2);
    assert_eq!(
        body["imported_servers"],
        serde_json::json!(["alpha", "gamma"])
    );
    assert_eq!(body["failed_count"], 1);
    assert_eq!(body["failed_servers"], serde_json::json!(["beta"]));
}

#[tokio::test]
async fn import_rejects_wrong_extension_and_missing_columns() {
    let system = TestSystem::start().await;
    seed_user(&system, "op@example.com", ALL_SERVER_SCOPES).await;
    let addr = system.start_api().await;
    let (access, _) = login_http(addr, "op@example.com").await;
    let client = reqwest::Client::new();

    let upload = |filename: &str, content: &str| {
        let part = reqwest::multipart::Part::bytes(content.as_bytes().to_vec())
            .file_name(filename.to_string());
        reqwest::multipart::Form::new().part("file", part)
    };

    let response = client
        .post(format!("http://{addr}/servers/import"))
        .bearer_auth(&access)
        .multipart(upload("servers.png", "x"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(format!("http://{addr}/servers/import"))
        .bearer_auth(&access)
        .multipart(upload(
            "servers.tsv",
            "server_name\tipv4\tport\thealth_endpoint\nweb\t10.0.0.1\t80\t/ping\n",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Missing required column");
}

#[tokio::test]
async fn export_streams_the_filtered_listing() {
    let system = TestSystem::start().await;
    seed_user(&system, "op@example.com", ALL_SERVER_SCOPES).await;
    let addr = system.start_api().await;
    let (access, _) = login_http(addr, "op@example.com").await;
    let client = reqwest::Client::new();

    for name in ["exp-1", "exp-2"] {
        let response = client
            .post(format!("http://{addr}/servers"))
            .bearer_auth(&access)
            .json(&serde_json::json!({
                "server_name": name,
                "ipv4": "10.0.0.9",
                "port": 80,
                "health_endpoint": "/ping",
                "health_check_interval": 5
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    let response = client
        .get(format!("http://{addr}/servers/export"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let disposition = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("attachment"));

    let body = response.text().await.unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("id\tserver_name\tstatus"));
    assert!(body.contains("exp-1"));
    assert!(body.contains("exp-2"));
}

#[tokio::test]
async fn uptime_endpoint_uses_inclusive_dates() {
    let system = TestSystem::start().await;
    seed_user(&system, "op@example.com", ALL_SERVER_SCOPES).await;
    let addr = system.start_api().await;
    let (access, _) = login_http(addr, "op@example.com").await;

    let now = Utc::now();
    system
        .observations
        .append(&Observation {
            server_id: "srv-1".to_string(),
            status: ServerStatus::Healthy,
            status_numeric: 1,
            timestamp: now,
            attempts: 1,
            interval_since_last_check_ms: 2000,
        })
        .await
        .unwrap();

    let today = now.format("%Y-%m-%d");
    let response = reqwest::Client::new()
        .get(format!(
            "http://{addr}/servers/srv-1/uptime?start_date={today}&end_date={today}"
        ))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!((body["uptime_percentage"].as_f64().unwrap() - 100.0).abs() < 1e-6);

    // Inverted window is a 400.
    let response = reqwest::Client::new()
        .get(format!(
            "http://{addr}/servers/srv-1/uptime?start_date=2030-01-02&end_date=2030-01-01"
        ))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn report_endpoint_mails_the_rollup() {
    let system = TestSystem::start().await;
    seed_user(&system, "op@example.com", ALL_SERVER_SCOPES).await;
    let addr = system.start_api().await;
    let (access, _) = login_http(addr, "op@example.com").await;

    let now = Utc::now();
    system
        .observations
        .append(&Observation {
            server_id: "srv-1".to_string(),
            status: ServerStatus::Healthy,
            status_numeric: 1,
            timestamp: now,
            attempts: 1,
            interval_since_last_check_ms: 2000,
        })
        .await
        .unwrap();

    let today = now.format("%Y-%m-%d");
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/servers/reports"))
        .bearer_auth(&access)
        .json(&serde_json::json!({
            "start_date": today.to_string(),
            "end_date": today.to_string(),
            "email": "boss@example.com"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // The report is generated off-request; wait for the mail.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let sent = system.mailer.sent().await;
        if !sent.is_empty() {
            assert_eq!(sent[0].to, vec!["boss@example.com"]);
            assert!(sent[0].text_body.contains("Total Servers: 1"));
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "report never sent");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn user_and_role_admin_round_trip() {
    let system = TestSystem::start().await;
    seed_user(
        &system,
        "admin@example.com",
        &[
            "users:create",
            "users:read",
            "users:roles:update",
            "roles:read",
            "roles:create",
            "scopes:read",
        ],
    )
    .await;
    let addr = system.start_api().await;
    let (access, _) = login_http(addr, "admin@example.com").await;
    let client = reqwest::Client::new();

    // Scopes are seeded by migration.
    let response = client
        .get(format!("http://{addr}/scopes?limit=50"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let scopes: serde_json::Value = response.json().await.unwrap();
    let read_scope = scopes
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "servers:read")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Create a role carrying one scope.
    let response = client
        .post(format!("http://{addr}/roles"))
        .bearer_auth(&access)
        .json(&serde_json::json!({"name": "watchers", "scope_ids": [read_scope]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let role: serde_json::Value = response.json().await.unwrap();
    let role_id = role["id"].as_str().unwrap().to_string();

    // Register a user with that role.
    let response = client
        .post(format!("http://{addr}/auth/register"))
        .bearer_auth(&access)
        .json(&serde_json::json!({
            "email": "watcher@example.com",
            "password": "pass-w0rd",
            "role_ids": [role_id]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let user: serde_json::Value = response.json().await.unwrap();
    assert_eq!(user["roles"][0]["name"], "watchers");

    // Unknown role ids are a 400.
    let response = client
        .post(format!("http://{addr}/auth/register"))
        .bearer_auth(&access)
        .json(&serde_json::json!({
            "email": "other@example.com",
            "password": "pass-w0rd",
            "role_ids": ["nope"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Invalid roles");

    // Self-service: /users/me reflects the caller.
    let (watcher_access, _) = login_http(addr, "watcher@example.com").await;
    let response = client
        .get(format!("http://{addr}/users/me"))
        .bearer_auth(&watcher_access)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let me: serde_json::Value = response.json().await.unwrap();
    assert_eq!(me["email"], "watcher@example.com");
}
