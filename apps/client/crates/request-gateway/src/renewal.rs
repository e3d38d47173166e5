//! Single-flight credential renewal.
//!
//! At most one renewal is in flight at a time. Callers that ask for a
//! renewal while one is running are parked in a FIFO queue and released with
//! the same outcome once it settles. The in-flight flag is owned by a drop
//! guard so cancellation of the leading task or a panicking renewer never
//! leaves the coordinator stuck in "already renewing". A renewal that
//! settles after a login or logout replaced the credential is discarded.

use crate::credential::{AccessCredential, CredentialStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Definite negative result of a renewal attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct RenewalFailure {
    reason: String,
}

impl RenewalFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// What asked for the renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalTrigger {
    /// A request came back 401.
    Unauthorized,
    /// The proactive timer fired.
    Proactive,
    /// Cold-start session restoration.
    Restore,
}

impl RenewalTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalTrigger::Unauthorized => "unauthorized",
            RenewalTrigger::Proactive => "proactive",
            RenewalTrigger::Restore => "restore",
        }
    }
}

/// The network-level renewal routine.
///
/// Takes no input: the refresh capability travels as a cookie. Failure is a
/// value, never a panic or a transport error.
#[async_trait]
pub trait CredentialRenewer: Send + Sync {
    async fn renew(&self) -> Result<AccessCredential, RenewalFailure>;
}

/// Observer of renewal cycles. Only the leading caller of a cycle notifies.
pub trait RenewalListener: Send + Sync {
    fn renewal_started(&self, _trigger: RenewalTrigger) {}
    fn renewal_succeeded(&self, _trigger: RenewalTrigger) {}
    fn renewal_failed(&self, _trigger: RenewalTrigger, _failure: &RenewalFailure) {}
}

/// What the gateway needs from the session: the current credential and a
/// way to renew it.
#[async_trait]
pub trait SessionAuthority: Send + Sync {
    fn access_credential(&self) -> Option<AccessCredential>;
    async fn renew(&self, trigger: RenewalTrigger) -> Result<AccessCredential, RenewalFailure>;
}

type Waiter = oneshot::Sender<Result<AccessCredential, RenewalFailure>>;

#[derive(Default)]
struct Flight {
    in_progress: bool,
    pending: VecDeque<Waiter>,
}

/// Shared by the gateway's 401 path, the proactive timer and cold start.
pub struct RenewalCoordinator {
    renewer: Arc<dyn CredentialRenewer>,
    store: CredentialStore,
    listener: Option<Arc<dyn RenewalListener>>,
    flight: Mutex<Flight>,
    renewals: AtomicU64,
}

impl RenewalCoordinator {
    pub fn new(renewer: Arc<dyn CredentialRenewer>, store: CredentialStore) -> Self {
        Self {
            renewer,
            store,
            listener: None,
            flight: Mutex::new(Flight::default()),
            renewals: AtomicU64::new(0),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn RenewalListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn is_renewing(&self) -> bool {
        self.flight.lock().in_progress
    }

    /// Number of callers parked behind the current renewal.
    pub fn pending(&self) -> usize {
        self.flight.lock().pending.len()
    }

    /// Renewal cycles started since construction.
    pub fn renewals_started(&self) -> u64 {
        self.renewals.load(Ordering::Relaxed)
    }

    /// Renew the access credential, joining an in-flight renewal if any.
    pub async fn renew(
        &self,
        trigger: RenewalTrigger,
    ) -> Result<AccessCredential, RenewalFailure> {
        let queued = {
            let mut flight = self.flight.lock();
            if flight.in_progress {
                let (tx, rx) = oneshot::channel();
                flight.pending.push_back(tx);
                debug!(
                    trigger = trigger.as_str(),
                    waiters = flight.pending.len(),
                    "renewal in flight, waiting"
                );
                Some(rx)
            } else {
                flight.in_progress = true;
                None
            }
        };

        match queued {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(RenewalFailure::new("renewal abandoned before settling"))),
            None => self.lead(trigger).await,
        }
    }

    async fn lead(&self, trigger: RenewalTrigger) -> Result<AccessCredential, RenewalFailure> {
        let guard = InFlight {
            coordinator: self,
            settled: false,
        };
        let cycle = self.renewals.fetch_add(1, Ordering::Relaxed) + 1;
        info!(trigger = trigger.as_str(), cycle, "renewing access credential");

        let epoch = self.store.epoch();
        if let Some(listener) = &self.listener {
            listener.renewal_started(trigger);
        }

        let mut outcome = self.renewer.renew().await;
        let landed = match &outcome {
            Ok(credential) => self.store.set_in_epoch(epoch, Some(credential.clone())),
            Err(failure) => {
                warn!(trigger = trigger.as_str(), reason = %failure, "renewal failed");
                self.store.set_in_epoch(epoch, None)
            }
        };
        if !landed {
            info!(
                trigger = trigger.as_str(),
                "session replaced during renewal, discarding result"
            );
            outcome = Err(RenewalFailure::new("session ended during renewal"));
        }

        let released = guard.settle(&outcome);
        debug!(
            trigger = trigger.as_str(),
            waiters = released,
            success = outcome.is_ok(),
            "renewal settled"
        );

        // Whoever replaced the session already moved its state.
        if let (Some(listener), true) = (&self.listener, landed) {
            match &outcome {
                Ok(_) => listener.renewal_succeeded(trigger),
                Err(failure) => listener.renewal_failed(trigger, failure),
            }
        }

        outcome
    }

    /// Clear the flag and take every parked waiter in one step, so no caller
    /// can queue behind a renewal that has already been drained.
    fn finish(&self) -> VecDeque<Waiter> {
        let mut flight = self.flight.lock();
        flight.in_progress = false;
        std::mem::take(&mut flight.pending)
    }
}

#[async_trait]
impl SessionAuthority for RenewalCoordinator {
    fn access_credential(&self) -> Option<AccessCredential> {
        self.store.get()
    }

    async fn renew(&self, trigger: RenewalTrigger) -> Result<AccessCredential, RenewalFailure> {
        RenewalCoordinator::renew(self, trigger).await
    }
}

struct InFlight<'a> {
    coordinator: &'a RenewalCoordinator,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: &Result<AccessCredential, RenewalFailure>) -> usize {
        self.settled = true;
        let waiters = self.coordinator.finish();
        let released = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        released
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = self.coordinator.finish();
        warn!(waiters = waiters.len(), "renewal interrupted before settling");
        for waiter in waiters {
            let _ = waiter.send(Err(RenewalFailure::new("renewal interrupted")));
        }
    }
}
