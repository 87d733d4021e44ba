//! The certified aggregate store.
//!
//! Authoritative holder of subnet records and derived statistics. Every
//! mutation recomputes both statistics variants, fingerprints the
//! certified one, registers the fingerprint with the host certification
//! primitive, and only then swaps the new state in. Callers can never
//! observe statistics from one state paired with a fingerprint from
//! another.
//!
//! Ingestion is full-replace by design: the subnet map is rebuilt from
//! scratch and swapped in as a single update, so a node dropped by the
//! source cannot linger as a stale entry.
//!
//! The fingerprint and certificate are not part of persisted state; they
//! are deterministic functions of it and are recomputed and re-registered
//! via [`CertifiedStore::recertify`] immediately after a restore, before
//! any certified query is served.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::canonical::{fingerprint, Fingerprint};
use crate::certify::{CertificationProvider, CertifyError};
use crate::stats::NetworkStats;
use crate::topology::{SubnetFilter, SubnetRecord};

/// Store-level errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Query for a subnet id that does not exist.
    #[error("subnet not found: {subnet_id}")]
    SubnetNotFound {
        /// The id that was queried.
        subnet_id: String,
    },

    /// The host declined fingerprint registration; the previous
    /// certified snapshot remains in place.
    #[error("fingerprint registration failed: {source}")]
    CertificationExhausted {
        /// The underlying host error.
        #[source]
        source: CertifyError,
    },
}

/// Statistics bound to the fingerprint they were certified under, plus
/// whatever certificate the host currently produces for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertifiedSnapshot {
    /// The certified statistics (real subnets only).
    pub stats: NetworkStats,
    /// `fingerprint == hash(canonical(stats))` at registration time.
    pub fingerprint: Fingerprint,
    /// Host certificate for the fingerprint, if one is available.
    pub certificate: Option<Vec<u8>>,
}

/// The subset of store state that survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    /// Subnet id to record mapping.
    pub subnets: BTreeMap<String, SubnetRecord>,
    /// Timestamp of the last successful update (Unix nanos).
    pub last_updated_ns: u64,
}

/// The certified aggregate store.
pub struct CertifiedStore {
    provider: Arc<dyn CertificationProvider>,
    filter: SubnetFilter,
    subnets: BTreeMap<String, SubnetRecord>,
    stats_real: NetworkStats,
    stats_all: NetworkStats,
    fingerprint: Fingerprint,
}

impl CertifiedStore {
    /// Creates an empty store and certifies its zero statistics.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CertificationExhausted`] when the initial
    /// registration is declined.
    pub fn new(
        provider: Arc<dyn CertificationProvider>,
        filter: SubnetFilter,
        now_ns: u64,
    ) -> Result<Self, StoreError> {
        let stats = NetworkStats::zero(now_ns);
        let fp = fingerprint(&stats);
        provider
            .register(&fp)
            .map_err(|source| StoreError::CertificationExhausted { source })?;
        Ok(Self {
            provider,
            filter,
            subnets: BTreeMap::new(),
            stats_real: stats,
            stats_all: stats,
            fingerprint: fp,
        })
    }

    /// Atomically replaces the subnet map with the given records.
    ///
    /// Counts are rederived from each record's node list, both statistics
    /// variants are recomputed, and the new fingerprint is registered
    /// with the host *before* any field is swapped. A registration
    /// failure therefore leaves the previous snapshot fully intact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CertificationExhausted`] on registration
    /// failure; no state changes in that case.
    pub fn ingest(&mut self, records: Vec<SubnetRecord>, now_ns: u64) -> Result<(), StoreError> {
        let mut subnets = BTreeMap::new();
        for mut record in records {
            record.recount();
            subnets.insert(record.id.clone(), record);
        }

        let stats_real = NetworkStats::from_subnets(
            subnets.values().filter(|s| self.filter.is_real(s)),
            now_ns,
        );
        let stats_all = NetworkStats::from_subnets(subnets.values(), now_ns);
        let fp = fingerprint(&stats_real);

        self.provider
            .register(&fp)
            .map_err(|source| StoreError::CertificationExhausted { source })?;

        self.subnets = subnets;
        self.stats_real = stats_real;
        self.stats_all = stats_all;
        self.fingerprint = fp;
        info!(
            subnets = self.stats_all.total_subnets,
            nodes = self.stats_all.total_nodes,
            fingerprint = %hex::encode(fp),
            "store ingested new snapshot"
        );
        Ok(())
    }

    /// Empties the subnet map and certifies the zeroed statistics.
    ///
    /// # Errors
    ///
    /// Same failure semantics as [`CertifiedStore::ingest`].
    pub fn clear(&mut self, now_ns: u64) -> Result<(), StoreError> {
        self.ingest(Vec::new(), now_ns)
    }

    /// Recomputes and re-registers the fingerprint over the stored
    /// statistics without changing any data.
    ///
    /// Used after a restore and as a manual recovery operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CertificationExhausted`] on registration
    /// failure.
    pub fn recertify(&mut self) -> Result<(), StoreError> {
        let fp = fingerprint(&self.stats_real);
        self.provider
            .register(&fp)
            .map_err(|source| StoreError::CertificationExhausted { source })?;
        self.fingerprint = fp;
        debug!(fingerprint = %hex::encode(fp), "fingerprint re-registered");
        Ok(())
    }

    /// Returns the current certified snapshot.
    ///
    /// Side-effect-free: the statistics are returned exactly as stored at
    /// the last successful mutation, never recomputed, so the fingerprint
    /// a caller recomputes from them matches what the host certifies.
    #[must_use]
    pub fn snapshot(&self) -> CertifiedSnapshot {
        CertifiedSnapshot {
            stats: self.stats_real,
            fingerprint: self.fingerprint,
            certificate: self.provider.current_certificate(),
        }
    }

    /// Statistics over real subnets only (sentinel buckets excluded).
    #[must_use]
    pub const fn stats_real(&self) -> &NetworkStats {
        &self.stats_real
    }

    /// Statistics over every node regardless of bucket.
    #[must_use]
    pub const fn stats_all(&self) -> &NetworkStats {
        &self.stats_all
    }

    /// All subnet records in id order.
    #[must_use]
    pub fn subnets(&self) -> Vec<&SubnetRecord> {
        self.subnets.values().collect()
    }

    /// Looks up a single subnet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SubnetNotFound`] for an unknown id.
    pub fn subnet(&self, subnet_id: &str) -> Result<&SubnetRecord, StoreError> {
        self.subnets
            .get(subnet_id)
            .ok_or_else(|| StoreError::SubnetNotFound {
                subnet_id: subnet_id.to_string(),
            })
    }

    /// Whether the store holds any subnet records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty()
    }

    /// The state to persist across a restart. Fingerprint and
    /// certificate are deliberately excluded.
    #[must_use]
    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            subnets: self.subnets.clone(),
            last_updated_ns: self.stats_all.last_updated_ns,
        }
    }

    /// Restores persisted state and re-registers the derived fingerprint.
    ///
    /// Statistics are recomputed from the restored map with the persisted
    /// update time, which reproduces the exact pre-restart fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CertificationExhausted`] when re-registration
    /// fails; the store must not serve certified queries in that case.
    pub fn restore(&mut self, state: PersistedState) -> Result<(), StoreError> {
        let mut subnets = state.subnets;
        for record in subnets.values_mut() {
            record.recount();
        }

        let stats_real = NetworkStats::from_subnets(
            subnets.values().filter(|s| self.filter.is_real(s)),
            state.last_updated_ns,
        );
        let stats_all = NetworkStats::from_subnets(subnets.values(), state.last_updated_ns);
        let fp = fingerprint(&stats_real);

        self.provider
            .register(&fp)
            .map_err(|source| StoreError::CertificationExhausted { source })?;

        self.subnets = subnets;
        self.stats_real = stats_real;
        self.stats_all = stats_all;
        self.fingerprint = fp;
        info!(
            subnets = self.stats_all.total_subnets,
            "store restored from persisted state"
        );
        Ok(())
    }
}

impl std::fmt::Debug for CertifiedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertifiedStore")
            .field("provider", &self.provider.name())
            .field("subnets", &self.subnets.len())
            .field("fingerprint", &hex::encode(self.fingerprint))
            .finish_non_exhaustive()
    }
}
