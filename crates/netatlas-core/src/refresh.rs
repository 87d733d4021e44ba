//! Rate-limited refresh control.
//!
//! [`RefreshController`] gates when the fetch pipeline and correlator may
//! run. A refresh is admitted only when no refresh is in flight and the
//! cooldown window since the last *successful* refresh has elapsed.
//! Failed attempts neither shorten nor extend the window: only
//! [`RefreshController::complete_success`] records a success time.
//!
//! The in-flight rejection also provides the mutual exclusion the
//! execution model does not: the pipeline suspends at its two remote
//! calls, and a second refresh admitted across such a suspension point
//! would interleave mutations. Treating "in flight" like "not yet
//! eligible" closes that window. The flag is released by the
//! [`RefreshTicket`]'s drop guard, so a refresh future that is dropped
//! mid-fetch (the caller disconnected) counts as the failure path
//! instead of leaving the controller stuck in `Fetching`.
//!
//! All methods take explicit timestamps, which keeps the boundary cases
//! (`cooldown - 1ns` rejected, `cooldown` accepted) directly testable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Refresh admission errors. Both variants are rate-limit rejections,
/// not failures of the underlying pipeline, which never runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RefreshError {
    /// The cooldown window has not elapsed.
    #[error("refresh cooldown active: retry in {remaining_ns}ns")]
    CooldownActive {
        /// Time remaining until the next refresh is admissible.
        remaining_ns: u64,
    },

    /// A refresh is already running.
    #[error("a refresh is already in flight")]
    AlreadyInFlight,
}

/// Observable controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    /// No refresh running, cooldown elapsed.
    Idle,
    /// A refresh is running.
    Fetching,
    /// No refresh running, cooldown has not elapsed.
    CooldownActive,
}

/// Proof that a refresh was admitted; returned to one of the
/// `complete_*` methods on the normal paths.
///
/// Holds the in-flight flag and releases it on drop, so an admitted
/// refresh whose future never runs to completion still returns the
/// controller to `Idle` (as the failure path: no success is recorded).
#[derive(Debug)]
#[must_use = "an admitted refresh must be completed"]
pub struct RefreshTicket {
    caller: Option<String>,
    in_flight: Arc<AtomicBool>,
}

impl Drop for RefreshTicket {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Data-freshness report for the query surface.
#[derive(Debug, Clone, Serialize)]
pub struct Freshness {
    /// Age of the data since the last successful refresh, if any.
    pub age_ns: Option<u64>,
    /// Whether the age exceeds the staleness threshold. Data that has
    /// never been refreshed is stale.
    pub stale: bool,
    /// Remaining cooldown before the next refresh is admissible.
    pub cooldown_remaining_ns: u64,
    /// Caller that triggered the last successful refresh.
    pub last_triggered_by: Option<String>,
}

/// The refresh state machine.
#[derive(Debug)]
pub struct RefreshController {
    cooldown_ns: u64,
    staleness_threshold_ns: u64,
    in_flight: Arc<AtomicBool>,
    last_success_ns: Option<u64>,
    last_triggered_by: Option<String>,
}

impl RefreshController {
    /// Creates a controller with no prior success recorded.
    #[must_use]
    pub fn new(cooldown_ns: u64, staleness_threshold_ns: u64) -> Self {
        Self {
            cooldown_ns,
            staleness_threshold_ns,
            in_flight: Arc::new(AtomicBool::new(false)),
            last_success_ns: None,
            last_triggered_by: None,
        }
    }

    /// Seeds the last-success time, e.g. from restored persisted state,
    /// so a restart does not reopen the cooldown window early.
    pub fn seed_last_success(&mut self, last_success_ns: u64) {
        if last_success_ns > 0 {
            self.last_success_ns = Some(last_success_ns);
        }
    }

    /// Remaining cooldown at `now_ns`; zero when a refresh is admissible.
    #[must_use]
    pub fn cooldown_remaining_ns(&self, now_ns: u64) -> u64 {
        match self.last_success_ns {
            None => 0,
            Some(last) => {
                let elapsed = now_ns.saturating_sub(last);
                self.cooldown_ns.saturating_sub(elapsed)
            },
        }
    }

    /// Requests admission for a refresh.
    ///
    /// # Errors
    ///
    /// Returns [`RefreshError::AlreadyInFlight`] while a refresh is
    /// running and [`RefreshError::CooldownActive`] with the remaining
    /// wait while the window is open. No state changes on rejection.
    pub fn begin(
        &mut self,
        now_ns: u64,
        caller: Option<String>,
    ) -> Result<RefreshTicket, RefreshError> {
        if self.in_flight.load(Ordering::SeqCst) {
            return Err(RefreshError::AlreadyInFlight);
        }
        let remaining_ns = self.cooldown_remaining_ns(now_ns);
        if remaining_ns > 0 {
            return Err(RefreshError::CooldownActive { remaining_ns });
        }
        self.in_flight.store(true, Ordering::SeqCst);
        Ok(RefreshTicket {
            caller,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Records a fully successful refresh. The only place
    /// `last_success_ns` and `last_triggered_by` are updated.
    pub fn complete_success(&mut self, mut ticket: RefreshTicket, now_ns: u64) {
        self.last_success_ns = Some(now_ns);
        self.last_triggered_by = ticket.caller.take();
        // Dropping the ticket releases the in-flight flag.
    }

    /// Records a failed refresh. The cooldown window is unaffected.
    pub fn complete_failure(&mut self, ticket: RefreshTicket) {
        drop(ticket);
    }

    /// The current phase at `now_ns`.
    #[must_use]
    pub fn phase(&self, now_ns: u64) -> RefreshPhase {
        if self.in_flight.load(Ordering::SeqCst) {
            RefreshPhase::Fetching
        } else if self.cooldown_remaining_ns(now_ns) > 0 {
            RefreshPhase::CooldownActive
        } else {
            RefreshPhase::Idle
        }
    }

    /// Timestamp of the last successful refresh.
    #[must_use]
    pub const fn last_success_ns(&self) -> Option<u64> {
        self.last_success_ns
    }

    /// Caller that triggered the last successful refresh.
    #[must_use]
    pub fn last_triggered_by(&self) -> Option<&str> {
        self.last_triggered_by.as_deref()
    }

    /// Freshness report at `now_ns`.
    #[must_use]
    pub fn freshness(&self, now_ns: u64) -> Freshness {
        let age_ns = self.last_success_ns.map(|last| now_ns.saturating_sub(last));
        Freshness {
            age_ns,
            stale: age_ns.is_none_or(|age| age > self.staleness_threshold_ns),
            cooldown_remaining_ns: self.cooldown_remaining_ns(now_ns),
            last_triggered_by: self.last_triggered_by.clone(),
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    const COOLDOWN: u64 = 1_000_000;
    const STALE_AFTER: u64 = 10_000_000;

    fn controller() -> RefreshController {
        RefreshController::new(COOLDOWN, STALE_AFTER)
    }

    #[test]
    fn test_first_refresh_admitted_without_prior_success() {
        let mut c = controller();
        assert_eq!(c.phase(0), RefreshPhase::Idle);
        let ticket = c.begin(0, Some("caller-a".to_string())).unwrap();
        assert_eq!(c.phase(0), RefreshPhase::Fetching);
        c.complete_success(ticket, 0);
        assert_eq!(c.last_success_ns(), Some(0));
        assert_eq!(c.last_triggered_by(), Some("caller-a"));
    }

    #[test]
    fn test_cooldown_boundary() {
        let mut c = controller();
        let ticket = c.begin(100, None).unwrap();
        c.complete_success(ticket, 100);

        // One nanosecond early: rejected with a positive remaining wait.
        match c.begin(100 + COOLDOWN - 1, None) {
            Err(RefreshError::CooldownActive { remaining_ns }) => assert_eq!(remaining_ns, 1),
            other => panic!("expected cooldown rejection, got {other:?}"),
        }
        assert_eq!(c.phase(100 + COOLDOWN - 1), RefreshPhase::CooldownActive);

        // Exactly at the boundary: admitted.
        let ticket = c.begin(100 + COOLDOWN, None).unwrap();
        c.complete_failure(ticket);
    }

    #[test]
    fn test_in_flight_rejected_like_cooldown() {
        let mut c = controller();
        let ticket = c.begin(0, None).unwrap();
        assert!(matches!(
            c.begin(0, None),
            Err(RefreshError::AlreadyInFlight)
        ));
        c.complete_failure(ticket);
        assert!(c.begin(0, None).is_ok());
    }

    #[test]
    fn test_abandoned_ticket_releases_in_flight() {
        let mut c = controller();

        // The refresh future was dropped mid-fetch: the ticket goes away
        // without reaching either complete_* method.
        let ticket = c.begin(0, None).unwrap();
        drop(ticket);

        // The controller is back to Idle, not wedged in Fetching, and no
        // success was recorded.
        assert_eq!(c.phase(1), RefreshPhase::Idle);
        assert_eq!(c.last_success_ns(), None);
        let ticket = c.begin(1, None).unwrap();
        c.complete_success(ticket, 1);
        assert_eq!(c.last_success_ns(), Some(1));
    }

    #[test]
    fn test_failure_does_not_touch_cooldown() {
        let mut c = controller();
        let ticket = c.begin(100, Some("caller-a".to_string())).unwrap();
        c.complete_success(ticket, 100);

        // A failed attempt after the window reopens...
        let ticket = c.begin(100 + COOLDOWN, Some("caller-b".to_string())).unwrap();
        c.complete_failure(ticket);

        // ...does not move the success time: the next attempt is judged
        // against the old success, so it is immediately admissible, and
        // the last caller is still the successful one.
        assert_eq!(c.last_success_ns(), Some(100));
        assert_eq!(c.last_triggered_by(), Some("caller-a"));
        assert!(c.begin(100 + COOLDOWN + 1, None).is_ok());
    }

    #[test]
    fn test_failure_without_prior_success_leaves_no_cooldown() {
        let mut c = controller();
        let ticket = c.begin(0, None).unwrap();
        c.complete_failure(ticket);
        // No success ever happened, so no cooldown applies.
        assert!(c.begin(1, None).is_ok());
    }

    #[test]
    fn test_seed_last_success() {
        let mut c = controller();
        c.seed_last_success(500);
        assert!(matches!(
            c.begin(500 + COOLDOWN - 1, None),
            Err(RefreshError::CooldownActive { .. })
        ));
        assert!(c.begin(500 + COOLDOWN, None).is_ok());
    }

    #[test]
    fn test_freshness_report() {
        let mut c = controller();
        let report = c.freshness(0);
        assert!(report.age_ns.is_none());
        assert!(report.stale, "never-refreshed data is stale");

        let ticket = c.begin(100, Some("caller-a".to_string())).unwrap();
        c.complete_success(ticket, 100);

        let report = c.freshness(200);
        assert_eq!(report.age_ns, Some(100));
        assert!(!report.stale);
        assert_eq!(report.cooldown_remaining_ns, COOLDOWN - 100);
        assert_eq!(report.last_triggered_by.as_deref(), Some("caller-a"));

        let report = c.freshness(100 + STALE_AFTER + 1);
        assert!(report.stale);
    }
}
