//! Shared daemon state.
//!
//! [`ServiceHandle`] wraps the store and refresh controller behind a
//! `tokio` `RwLock`. The fetch pipeline sits outside the lock: its two
//! remote calls are the long suspension points of a refresh, and read
//! queries must be able to interleave with them, observing the previous
//! fully-committed snapshot until `ingest` swaps in the next one.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use netatlas_core::fetch::FetchPipeline;
use netatlas_core::generation::GenerationFallback;
use netatlas_core::refresh::RefreshController;
use netatlas_core::store::CertifiedStore;
use tokio::sync::RwLock;

/// Shared daemon state protected by `Arc`.
pub type SharedState = Arc<ServiceHandle>;

/// Mutable service state; always accessed through the handle's lock.
pub struct ServiceState {
    /// The certified aggregate store.
    pub store: CertifiedStore,
    /// The refresh rate limiter.
    pub controller: RefreshController,
    /// Policy for node ids missing from the hardware dataset.
    pub fallback: GenerationFallback,
    /// Path of the persisted state file.
    pub state_file: PathBuf,
}

/// Handle to the service with interior mutability.
pub struct ServiceHandle {
    pub(crate) inner: RwLock<ServiceState>,
    pub(crate) pipeline: FetchPipeline,
    shutdown: AtomicBool,
    started_at: DateTime<Utc>,
}

impl ServiceHandle {
    /// Wraps already-initialized state. Use [`Self::initialize`] to
    /// build one from configuration.
    #[must_use]
    pub(crate) fn from_parts(state: ServiceState, pipeline: FetchPipeline) -> Self {
        Self {
            inner: RwLock::new(state),
            pipeline,
            shutdown: AtomicBool::new(false),
            started_at: Utc::now(),
        }
    }

    /// Read access to the inner state.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, ServiceState> {
        self.inner.read().await
    }

    /// Write access to the inner state.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, ServiceState> {
        self.inner.write().await
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Requests shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Daemon uptime in seconds.
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // max(0) ensures non-negative
    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

/// Current wall-clock time as Unix nanoseconds.
#[must_use]
pub fn now_ns() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(0)
}
