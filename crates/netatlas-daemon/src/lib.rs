//! netatlas-daemon - HTTP surface and lifecycle for the netatlas
//! aggregation service.
//!
//! The daemon wires the domain library together: it restores persisted
//! state at startup, re-registers the fingerprint before serving any
//! certified query, and exposes the query and mutating surfaces over
//! axum. The fetch pipeline runs over a reqwest backend in production
//! and a scripted backend in tests.

pub mod backend;
pub mod handlers;
pub mod persist;
pub mod service;
pub mod state;
