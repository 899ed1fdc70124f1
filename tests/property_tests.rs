//! Property-based tests for pipeline invariants
//!
//! - Classification is total over every probe outcome and lands in
//!   the fixed taxonomy
//! - Partition assignment is stable and in range
//! - Weighted uptime is bounded and hits its extremes exactly

use chrono::Utc;
use fleetwatch::observation::ObservationStore;
use fleetwatch::prober::{classify, ProbeFailure, ProbeOutcome};
use fleetwatch::stream::partition_for;
use fleetwatch::{Observation, ServerStatus};
use proptest::prelude::*;

fn outcome(status_code: Option<u16>, failure: Option<ProbeFailure>) -> ProbeOutcome {
    ProbeOutcome {
        status_code,
        failure,
        attempts: 1,
        timestamp: Utc::now(),
    }
}

// Every HTTP status code classifies, and only 2xx means healthy.
proptest! {
    #[test]
    fn prop_every_status_code_classifies(code in 100u16..600) {
        let status = classify(&outcome(Some(code), None));

        let expected = if (200..300).contains(&code) {
            ServerStatus::Healthy
        } else if (400..500).contains(&code) {
            ServerStatus::ConfigurationError
        } else {
            ServerStatus::Unhealthy
        };
        prop_assert_eq!(status, expected);
    }
}

// Transport failures map onto exactly two statuses: refused is
// inactive, everything else is a network error.
proptest! {
    #[test]
    fn prop_transport_failures_classify(refused in any::<bool>(), detail in ".{0,40}") {
        let failure = if refused {
            ProbeFailure::ConnectionRefused
        } else {
            ProbeFailure::Transport(detail)
        };
        let status = classify(&outcome(None, Some(failure)));

        if refused {
            prop_assert_eq!(status, ServerStatus::Inactive);
        } else {
            prop_assert_eq!(status, ServerStatus::NetworkError);
        }
    }
}

// Classification never produces pending: pending is a catalog-only
// state, observations always carry a terminal status.
proptest! {
    #[test]
    fn prop_observed_status_is_terminal(code in prop::option::of(100u16..600), refused in any::<bool>()) {
        let failure = code.is_none().then(|| {
            if refused {
                ProbeFailure::ConnectionRefused
            } else {
                ProbeFailure::Transport("broken pipe".to_string())
            }
        });
        let status = classify(&outcome(code, failure));
        prop_assert_ne!(status, ServerStatus::Pending);
        // status_numeric is 1 exactly for healthy.
        prop_assert_eq!(status.numeric() == 1, status == ServerStatus::Healthy);
    }
}

// Keys always land on the same in-range partition.
proptest! {
    #[test]
    fn prop_partitioning_is_stable(key in ".{0,60}", partitions in 1u32..64) {
        let first = partition_for(&key, partitions);
        prop_assert!(first < partitions);
        prop_assert_eq!(first, partition_for(&key, partitions));
    }
}

fn status_from_index(index: u8) -> ServerStatus {
    match index % 5 {
        0 => ServerStatus::Healthy,
        1 => ServerStatus::Unhealthy,
        2 => ServerStatus::Inactive,
        3 => ServerStatus::ConfigurationError,
        _ => ServerStatus::NetworkError,
    }
}

// Weighted uptime stays in [0, 100], and all-healthy / no-healthy
// windows hit the bounds exactly.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]
    #[test]
    fn prop_uptime_is_bounded_and_exact_at_extremes(
        entries in prop::collection::vec((0u8..5, 1i64..1_000_000), 1..16)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = ObservationStore::connect(dir.path().join("obs.db").to_str().unwrap())
                .await
                .unwrap();

            let base = Utc::now();
            for (i, (status_index, weight)) in entries.iter().enumerate() {
                let status = status_from_index(*status_index);
                store
                    .append(&Observation {
                        server_id: "s1".to_string(),
                        status,
                        status_numeric: status.numeric(),
                        timestamp: base + chrono::Duration::milliseconds(i as i64),
                        attempts: 1,
                        interval_since_last_check_ms: *weight,
                    })
                    .await
                    .unwrap();
            }

            let uptime = store
                .uptime_percentage(
                    "s1",
                    base - chrono::Duration::seconds(1),
                    base + chrono::Duration::seconds(10),
                )
                .await
                .unwrap();

            assert!((0.0..=100.0 + 1e-9).contains(&uptime), "uptime {uptime} out of bounds");

            let all_healthy = entries.iter().all(|(s, _)| status_from_index(*s) == ServerStatus::Healthy);
            let none_healthy = entries.iter().all(|(s, _)| status_from_index(*s) != ServerStatus::Healthy);
            if all_healthy {
                assert!((uptime - 100.0).abs() < 1e-6);
            }
            if none_healthy {
                assert!(uptime.abs() < 1e-6);
            }
        });
    }
}
