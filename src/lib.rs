//! Hydra: a data-driven Kubernetes job orchestrator.
//!
//! See `SPEC_FULL.md` for the full module map. The binary in `src/main.rs`
//! wires these modules into a running service; this crate also exists as a
//! library so the scheduler/watcher/store can be exercised directly from
//! integration tests.

pub mod cluster;
pub mod config;
pub mod errors;
pub mod houston;
pub mod http;
pub mod ingest;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod watcher;
