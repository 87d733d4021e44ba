//! Host certification seam and client-side verification.
//!
//! The host platform offers a certification primitive with two
//! operations: register a fingerprint, and later produce a signed
//! certificate binding the registered fingerprint to this service's
//! identity. The actual certificate cryptography belongs to the host; the
//! store only has to use it correctly, so the primitive sits behind
//! [`CertificationProvider`]:
//!
//! ```text
//! CertificationProvider (trait)
//!     |
//!     +-- EchoCertifier (local stand-in: certificate == fingerprint)
//!     |
//!     +-- MockCertifier (for tests, with scripted registration failure)
//! ```
//!
//! [`verify_certified_stats`] implements the client side of the
//! protocol: recompute the fingerprint from the returned statistics and
//! require it to equal the fingerprint embedded in the certificate. A
//! mismatch is a hard failure, never "valid but stale".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use thiserror::Error;

use crate::canonical::{fingerprint, Fingerprint, FINGERPRINT_SIZE};
use crate::stats::NetworkStats;

/// Errors from the host certification primitive.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CertifyError {
    /// The host declined registration due to resource exhaustion.
    #[error("host certification resources exhausted: {message}")]
    ResourceExhausted {
        /// Host-provided description.
        message: String,
    },
}

/// Outcome of client-side snapshot verification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerificationError {
    /// No certificate was attached; the data must be treated as
    /// unverified.
    #[error("no host certificate present; data is unverified")]
    MissingCertificate,

    /// The certificate does not have the expected structure.
    #[error("malformed certificate: expected {expected} bytes, got {actual}")]
    MalformedCertificate {
        /// Expected certificate length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// The fingerprint embedded in the certificate does not match the
    /// fingerprint recomputed from the returned statistics.
    #[error("fingerprint mismatch: certified {certified}, recomputed {recomputed}")]
    FingerprintMismatch {
        /// Hex form of the fingerprint embedded in the certificate.
        certified: String,
        /// Hex form of the locally recomputed fingerprint.
        recomputed: String,
    },
}

/// Injected capability for registering fingerprints and obtaining
/// certificates from the host.
pub trait CertificationProvider: Send + Sync {
    /// Registers the fingerprint as this service's current certified
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`CertifyError::ResourceExhausted`] when the host cannot
    /// accept the registration.
    fn register(&self, fingerprint: &Fingerprint) -> Result<(), CertifyError>;

    /// The certificate the host is currently willing to produce for the
    /// registered fingerprint, if any.
    fn current_certificate(&self) -> Option<Vec<u8>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Local certification provider that echoes the registered fingerprint
/// back as the certificate.
///
/// Used when the platform primitive is not available. Verification
/// against an echo certificate still exercises the full client-side
/// protocol because the embedded fingerprint is the certificate itself.
#[derive(Debug, Default)]
pub struct EchoCertifier {
    registered: Mutex<Option<Fingerprint>>,
}

impl EchoCertifier {
    /// Creates a provider with no registered fingerprint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CertificationProvider for EchoCertifier {
    fn register(&self, fingerprint: &Fingerprint) -> Result<(), CertifyError> {
        if let Ok(mut slot) = self.registered.lock() {
            *slot = Some(*fingerprint);
        }
        Ok(())
    }

    fn current_certificate(&self) -> Option<Vec<u8>> {
        self.registered
            .lock()
            .ok()
            .and_then(|slot| slot.map(|fp| fp.to_vec()))
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

/// Test provider with scripted registration failure.
#[derive(Debug, Default)]
pub struct MockCertifier {
    inner: EchoCertifier,
    fail_next: AtomicBool,
}

impl MockCertifier {
    /// Creates a provider that behaves like [`EchoCertifier`] until a
    /// failure is scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `register` call fail with resource exhaustion.
    pub fn fail_next_registration(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl CertificationProvider for MockCertifier {
    fn register(&self, fingerprint: &Fingerprint) -> Result<(), CertifyError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CertifyError::ResourceExhausted {
                message: "scripted registration failure".to_string(),
            });
        }
        self.inner.register(fingerprint)
    }

    fn current_certificate(&self) -> Option<Vec<u8>> {
        self.inner.current_certificate()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Verifies returned statistics against a host certificate.
///
/// 1. An absent certificate fails with [`VerificationError::MissingCertificate`].
/// 2. The fingerprint is recomputed locally from `stats`.
/// 3. The fingerprint embedded in the certificate is extracted.
/// 4. Verification succeeds iff the two are equal.
///
/// # Errors
///
/// Returns the verification failure; callers must not treat any failure
/// as "valid but stale".
pub fn verify_certified_stats(
    stats: &NetworkStats,
    certificate: Option<&[u8]>,
) -> Result<(), VerificationError> {
    let certificate = certificate.ok_or(VerificationError::MissingCertificate)?;
    if certificate.len() != FINGERPRINT_SIZE {
        return Err(VerificationError::MalformedCertificate {
            expected: FINGERPRINT_SIZE,
            actual: certificate.len(),
        });
    }

    let recomputed = fingerprint(stats);
    if certificate != recomputed {
        return Err(VerificationError::FingerprintMismatch {
            certified: hex::encode(certificate),
            recomputed: hex::encode(recomputed),
        });
    }
    Ok(())
}
