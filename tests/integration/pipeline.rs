//! End-to-end pipeline scenarios: catalog change → scheduler → probe
//! worker → ingestion → reporting, against wiremock probe targets.

use std::time::Duration;

use chrono::Utc;
use fleetwatch::{ServerSpec, ServerStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::TestSystem;

fn spec(name: &str, port: u16, interval: u32) -> ServerSpec {
    ServerSpec {
        server_name: name.to_string(),
        ipv4: "127.0.0.1".parse().unwrap(),
        port,
        health_endpoint: "/ping".to_string(),
        health_check_interval: interval,
    }
}

async fn wait_for_status(system: &TestSystem, id: &str, expected: ServerStatus, secs: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);
    loop {
        let server = system.catalog_store.get_server(id).await.unwrap();
        if server.status == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "server never became {expected}, stuck at {}",
            server.status
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

// Happy path: a healthy 2s-interval server accumulates observations
// and reports ~100% uptime.
#[tokio::test]
async fn healthy_server_accumulates_observations() {
    let system = TestSystem::start().await;
    let handles = system.start_pipeline();

    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let started = Utc::now();
    let server = system
        .catalog
        .create_server(&spec("web-01", target.address().port(), 2))
        .await
        .unwrap();

    wait_for_status(&system, &server.id, ServerStatus::Healthy, 10).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let observations = system
        .observations
        .observations_for_server(
            &server.id,
            started,
            Utc::now() + chrono::Duration::seconds(1),
        )
        .await
        .unwrap();

    // ~5s of 2s-interval checks plus the immediate first one.
    assert!(
        observations.len() >= 2,
        "expected at least 2 observations, got {}",
        observations.len()
    );
    assert!(observations.iter().all(|o| o.status == ServerStatus::Healthy));

    let uptime = system
        .reports
        .uptime_percentage(
            &server.id,
            started,
            Utc::now() + chrono::Duration::seconds(1),
        )
        .await
        .unwrap();
    assert!((uptime - 100.0).abs() < 1e-6, "uptime was {uptime}");

    handles.shutdown().await;
}

// Refused connections classify as inactive on the first attempt.
#[tokio::test]
async fn refused_server_becomes_inactive_without_retries() {
    let system = TestSystem::start().await;
    let handles = system.start_pipeline();

    // Port 1: nothing listens, connections are refused.
    let started = Utc::now();
    let server = system
        .catalog
        .create_server(&spec("dead-01", 1, 2))
        .await
        .unwrap();

    wait_for_status(&system, &server.id, ServerStatus::Inactive, 10).await;

    let observations = system
        .observations
        .observations_for_server(
            &server.id,
            started,
            Utc::now() + chrono::Duration::seconds(1),
        )
        .await
        .unwrap();
    assert!(!observations.is_empty());
    assert_eq!(observations[0].attempts, 1);
    assert_eq!(observations[0].status_numeric, 0);

    handles.shutdown().await;
}

// A 404 from the health endpoint is a configuration error.
#[tokio::test]
async fn not_found_health_endpoint_is_a_configuration_error() {
    let system = TestSystem::start().await;
    let handles = system.start_pipeline();

    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&target)
        .await;

    let started = Utc::now();
    let server = system
        .catalog
        .create_server(&spec("misconf-01", target.address().port(), 2))
        .await
        .unwrap();

    wait_for_status(&system, &server.id, ServerStatus::ConfigurationError, 10).await;

    let observations = system
        .observations
        .observations_for_server(
            &server.id,
            started,
            Utc::now() + chrono::Duration::seconds(1),
        )
        .await
        .unwrap();
    assert_eq!(observations[0].status_numeric, 0);

    handles.shutdown().await;
}

// 5xx responses are unhealthy, and the status follows recovery.
#[tokio::test]
async fn status_follows_the_target_across_restarts() {
    let system = TestSystem::start().await;
    let handles = system.start_pipeline();

    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&target)
        .await;

    let server = system
        .catalog
        .create_server(&spec("flappy-01", target.address().port(), 1))
        .await
        .unwrap();

    wait_for_status(&system, &server.id, ServerStatus::Unhealthy, 10).await;

    // The target recovers.
    target.reset().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    wait_for_status(&system, &server.id, ServerStatus::Healthy, 10).await;

    handles.shutdown().await;
}

// Change propagation: deleting a server stops its probes.
#[tokio::test]
async fn deleting_a_server_stops_scheduling() {
    let system = TestSystem::start().await;
    let handles = system.start_pipeline();

    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let server = system
        .catalog
        .create_server(&spec("gone-01", target.address().port(), 1))
        .await
        .unwrap();
    wait_for_status(&system, &server.id, ServerStatus::Healthy, 10).await;

    system.catalog.delete_server(&server.id).await.unwrap();
    // Give the delete event time to reach the schedule replica.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let count_at_quiesce = system
        .observations
        .observations_for_server(
            &server.id,
            Utc::now() - chrono::Duration::hours(1),
            Utc::now() + chrono::Duration::seconds(1),
        )
        .await
        .unwrap()
        .len();

    tokio::time::sleep(Duration::from_secs(3)).await;

    let count_later = system
        .observations
        .observations_for_server(
            &server.id,
            Utc::now() - chrono::Duration::hours(1),
            Utc::now() + chrono::Duration::seconds(1),
        )
        .await
        .unwrap()
        .len();

    assert_eq!(count_at_quiesce, count_later, "probes kept arriving after delete");

    handles.shutdown().await;
}

// Scheduling fairness: a healthy server with interval I produces
// about W/I observations over a window W.
#[tokio::test]
async fn check_cadence_matches_the_interval() {
    let system = TestSystem::start().await;
    let handles = system.start_pipeline();

    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let started = Utc::now();
    let server = system
        .catalog
        .create_server(&spec("steady-01", target.address().port(), 1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;
    handles.shutdown().await;

    let observations = system
        .observations
        .observations_for_server(
            &server.id,
            started,
            Utc::now() + chrono::Duration::seconds(1),
        )
        .await
        .unwrap();

    // 6 seconds at a 1s interval: allow generous slack for scheduler
    // start-up and CI jitter, but it must keep a steady cadence.
    assert!(
        (3..=8).contains(&observations.len()),
        "expected ~6 observations, got {}",
        observations.len()
    );
}
