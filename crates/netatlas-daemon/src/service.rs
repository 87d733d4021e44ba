//! Service orchestration.
//!
//! Ties the refresh controller, fetch pipeline, correlator and certified
//! store together. The refresh sequence is:
//!
//! 1. admission under the write lock (cooldown + in-flight check)
//! 2. both remote fetches with no lock held
//! 3. correlation, `ingest`, completion bookkeeping and persistence
//!    under the write lock again
//!
//! Any failure completes the controller on its failure path before the
//! error is surfaced, so a failed attempt neither mutates the store nor
//! moves the cooldown window.

use std::sync::Arc;

use netatlas_core::certify::CertificationProvider;
use netatlas_core::config::ServiceConfig;
use netatlas_core::fetch::{FetchError, FetchPipeline, HttpBackend, ResourceBudget};
use netatlas_core::refresh::{Freshness, RefreshController, RefreshError, RefreshPhase};
use netatlas_core::stats::NetworkStats;
use netatlas_core::store::{CertifiedSnapshot, CertifiedStore, StoreError};
use netatlas_core::topology::{correlate, from_raw_records, RawNodeRecord, SubnetFilter, SubnetRecord};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::persist::{self, PersistError};
use crate::state::{now_ns, ServiceHandle, ServiceState, SharedState};

/// Nanoseconds per second.
const NS_PER_SEC: u64 = 1_000_000_000;

/// Service-level errors, the union of the error taxonomy.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// Refresh rejected by the rate limiter; the pipeline never ran.
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// The fetch pipeline failed; no state changed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Store-level failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The mutation committed but the state file could not be written.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Result summary of a successful mutation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MutationSummary {
    /// Subnets now in the store (all buckets).
    pub total_subnets: u64,
    /// Nodes now in the store (all buckets).
    pub total_nodes: u64,
}

/// Health/status summary for the query surface.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    /// Always `"ok"` when the daemon can answer at all.
    pub status: &'static str,
    /// Daemon uptime in seconds.
    pub uptime_secs: u64,
    /// Refresh phase at the time of the query.
    pub phase: RefreshPhase,
    /// Subnets currently held (all buckets).
    pub total_subnets: u64,
    /// Nodes currently held (all buckets).
    pub total_nodes: u64,
    /// Whether the data exceeds the staleness threshold.
    pub stale: bool,
}

impl ServiceHandle {
    /// Builds the service from configuration: creates the store, restores
    /// the state file if one exists, and re-registers the fingerprint
    /// before anything is served.
    ///
    /// # Errors
    ///
    /// Returns an error when the initial certification, the state file
    /// load, or the restore re-registration fails. A daemon that cannot
    /// certify its state does not start.
    pub fn initialize(
        config: &ServiceConfig,
        backend: Arc<dyn HttpBackend>,
        provider: Arc<dyn CertificationProvider>,
    ) -> Result<SharedState, ServiceError> {
        let now = now_ns();
        let filter = SubnetFilter::sentinel_ids(config.store.sentinel_subnets.clone());
        let mut store = CertifiedStore::new(provider, filter, now)?;
        // Saturate rather than overflow on absurd configured durations.
        let mut controller = RefreshController::new(
            config.refresh.cooldown_secs.saturating_mul(NS_PER_SEC),
            config.refresh.staleness_threshold_secs.saturating_mul(NS_PER_SEC),
        );

        if let Some(persisted) = persist::load_state(&config.daemon.state_file)? {
            controller.seed_last_success(persisted.last_updated_ns);
            store.restore(persisted)?;
            info!(path = %config.daemon.state_file.display(), "restored persisted state");
        }

        let pipeline = FetchPipeline::new(
            backend,
            config.fetch.topology_url.clone(),
            config.fetch.hardware_url.clone(),
            ResourceBudget::new(config.fetch.available_budget, config.fetch.budget_floor),
        );
        let state = ServiceState {
            store,
            controller,
            fallback: config.store.generation_fallback,
            state_file: config.daemon.state_file.clone(),
        };
        Ok(Arc::new(Self::from_parts(state, pipeline)))
    }

    /// Runs a full refresh: admission, fetch, correlate, ingest, persist.
    ///
    /// # Errors
    ///
    /// Returns a rate-limit rejection without running the pipeline, or
    /// the pipeline/store error of the failing stage. On any failure the
    /// store and the cooldown window are unchanged.
    pub async fn refresh(&self, caller: Option<String>) -> Result<MutationSummary, ServiceError> {
        let ticket = {
            let mut inner = self.write().await;
            inner.controller.begin(now_ns(), caller.clone())?
        };
        info!(caller = caller.as_deref().unwrap_or("anonymous"), "refresh admitted");

        // Both remote calls run without the lock; reads interleave and
        // observe the previous committed snapshot.
        let fetched = self.pipeline.fetch_all().await;

        let mut inner = self.write().await;
        match fetched {
            Ok((topology, hardware)) => {
                let now = now_ns();
                let records = correlate(&topology, &hardware, inner.fallback);
                match inner.store.ingest(records, now) {
                    Ok(()) => {
                        inner.controller.complete_success(ticket, now);
                        let summary = summarize(&inner.store);
                        persist_state(&inner)?;
                        Ok(summary)
                    },
                    Err(error) => {
                        inner.controller.complete_failure(ticket);
                        Err(error.into())
                    },
                }
            },
            Err(error) => {
                warn!(%error, "refresh failed during fetch");
                inner.controller.complete_failure(ticket);
                Err(error.into())
            },
        }
    }

    /// Ingests uploaded raw node records (the upload collaborator's
    /// output contract). Not rate-limited; does not touch the refresh
    /// controller.
    ///
    /// # Errors
    ///
    /// Returns the store registration error or a persistence failure.
    pub async fn upload(&self, records: Vec<RawNodeRecord>) -> Result<MutationSummary, ServiceError> {
        let subnets = from_raw_records(records);
        let mut inner = self.write().await;
        inner.store.ingest(subnets, now_ns())?;
        let summary = summarize(&inner.store);
        persist_state(&inner)?;
        Ok(summary)
    }

    /// Empties the store and certifies the zeroed statistics.
    ///
    /// # Errors
    ///
    /// Same semantics as [`ServiceHandle::upload`].
    pub async fn clear(&self) -> Result<MutationSummary, ServiceError> {
        let mut inner = self.write().await;
        inner.store.clear(now_ns())?;
        let summary = summarize(&inner.store);
        persist_state(&inner)?;
        Ok(summary)
    }

    /// Recomputes and re-registers the fingerprint without changing
    /// stored data.
    ///
    /// # Errors
    ///
    /// Returns the store registration error.
    pub async fn recertify(&self) -> Result<(), ServiceError> {
        let mut inner = self.write().await;
        inner.store.recertify()?;
        Ok(())
    }

    /// The current certified snapshot.
    pub async fn certified(&self) -> CertifiedSnapshot {
        self.read().await.store.snapshot()
    }

    /// All subnet records.
    pub async fn subnets(&self) -> Vec<SubnetRecord> {
        self.read().await.store.subnets().into_iter().cloned().collect()
    }

    /// A single subnet by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SubnetNotFound`] for an unknown id.
    pub async fn subnet(&self, subnet_id: &str) -> Result<SubnetRecord, ServiceError> {
        Ok(self.read().await.store.subnet(subnet_id)?.clone())
    }

    /// Statistics over real subnets only.
    pub async fn stats_real(&self) -> NetworkStats {
        *self.read().await.store.stats_real()
    }

    /// Statistics over every node regardless of bucket.
    pub async fn stats_all(&self) -> NetworkStats {
        *self.read().await.store.stats_all()
    }

    /// Data-freshness report.
    pub async fn freshness(&self) -> Freshness {
        self.read().await.controller.freshness(now_ns())
    }

    /// Health/status summary.
    pub async fn health(&self) -> HealthSummary {
        let inner = self.read().await;
        let now = now_ns();
        let stats = inner.store.stats_all();
        HealthSummary {
            status: "ok",
            uptime_secs: self.uptime_secs(),
            phase: inner.controller.phase(now),
            total_subnets: stats.total_subnets,
            total_nodes: stats.total_nodes,
            stale: inner.controller.freshness(now).stale,
        }
    }
}

fn summarize(store: &CertifiedStore) -> MutationSummary {
    MutationSummary {
        total_subnets: store.stats_all().total_subnets,
        total_nodes: store.stats_all().total_nodes,
    }
}

fn persist_state(state: &ServiceState) -> Result<(), PersistError> {
    persist::save_state(&state.state_file, &state.store.persisted_state())
}
