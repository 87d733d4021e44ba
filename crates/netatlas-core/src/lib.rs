//! netatlas-core - domain logic for the netatlas aggregation service.
//!
//! This crate holds everything that can be tested without a network or a
//! filesystem:
//!
//! - [`generation`]: hardware generation tags and the two classification
//!   rules used by the different ingestion paths
//! - [`topology`]: node/subnet records, the inbound upload shape, and the
//!   correlator that joins a topology dataset with a hardware dataset
//! - [`stats`]: aggregate network statistics derived from subnet records
//! - [`canonical`]: the canonical byte layout of statistics and the
//!   SHA-256 fingerprint computed over it
//! - [`certify`]: the host certification seam (trait + local echo
//!   implementation) and the client-side verification protocol
//! - [`store`]: the certified aggregate store that keeps records, stats,
//!   fingerprint and certificate mutually consistent
//! - [`refresh`]: the rate-limited refresh controller
//! - [`fetch`]: the two-step external fetch pipeline over an injected
//!   HTTP backend
//! - [`config`]: TOML service configuration
//!
//! The daemon crate wires these together behind an axum HTTP surface.

pub mod canonical;
pub mod certify;
pub mod config;
pub mod fetch;
pub mod generation;
pub mod refresh;
pub mod stats;
pub mod store;
pub mod topology;

pub use canonical::{fingerprint, Fingerprint, FINGERPRINT_SIZE};
pub use certify::{CertificationProvider, CertifyError, EchoCertifier, MockCertifier};
pub use generation::{Generation, GenerationFallback};
pub use stats::NetworkStats;
pub use store::{CertifiedSnapshot, CertifiedStore, PersistedState, StoreError};
pub use topology::{NodeRecord, RawNodeRecord, SubnetFilter, SubnetRecord};
