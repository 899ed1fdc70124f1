//! Probe worker pool
//!
//! Consumes probe requests, executes retrying HTTP GETs against
//! `http://<ipv4>:<port><health_endpoint>` and publishes one
//! observation per request on the probe-result stream.
//!
//! ```text
//! probe-request stream → ProbeWorker → HTTP GET (retry/backoff)
//!                                        │
//!                                        ▼
//!                                  classification
//!                                        │
//!                                        ▼
//!                               probe-result stream
//! ```
//!
//! Workers scale by partition: each worker owns one partition reader
//! and drains it sequentially. The result write always precedes the
//! offset commit, so a crash between the two re-probes rather than
//! losing an observation.

pub mod client;
pub mod worker;

pub use client::{ProbeClient, ProbeFailure, ProbeOutcome};
pub use worker::{classify, ProbeWorkerHandle};
